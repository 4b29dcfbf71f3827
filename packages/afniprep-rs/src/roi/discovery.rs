use serde::Serialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::error::{AfniPrepError, Result};

/// GLM flavour, told apart by the datasets in its folder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum GlmKind {
    /// `stats*` present, no `iresp*`
    Gam,
    /// any `iresp*` present
    Tent,
}

/// One subject's folder under `subject_results`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubjectDir {
    /// Subject id (`subj.101` → `101`)
    pub id: String,
    pub path: PathBuf,
    /// afni_proc.py results folder inside the subject folder
    pub results_dir: PathBuf,
}

impl SubjectDir {
    pub fn glm_dir(&self, glm: &str) -> PathBuf {
        self.results_dir.join(glm)
    }

    pub fn has_glm(&self, glm: &str) -> bool {
        self.glm_dir(glm).is_dir()
    }
}

fn sorted_entries(dir: &Path) -> Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let name = entry?.file_name().to_string_lossy().to_string();
        if !name.starts_with('.') {
            names.push(name);
        }
    }
    names.sort();
    Ok(names)
}

/// Subject id from a folder name: the part after the first `.`, or the whole name.
pub fn subject_id(folder_name: &str) -> &str {
    folder_name
        .split_once('.')
        .map(|(_, id)| id)
        .unwrap_or(folder_name)
}

/// Subject folders (names containing `subj`), sorted; `only` restricts to the given ids.
pub fn list_subjects(subject_results: &Path, only: Option<&[String]>) -> Result<Vec<SubjectDir>> {
    if !subject_results.is_dir() {
        return Err(AfniPrepError::FileNotFound(subject_results.display().to_string()));
    }

    let mut subjects = Vec::new();
    for name in sorted_entries(subject_results)? {
        let path = subject_results.join(&name);
        if !name.contains("subj") || !path.is_dir() {
            continue;
        }
        let id = subject_id(&name).to_string();
        if let Some(only) = only {
            if !only.iter().any(|s| *s == id) {
                continue;
            }
        }

        let Some(results) = sorted_entries(&path)?.into_iter().next() else {
            log::warn!("{}: empty subject folder, skipped", path.display());
            continue;
        };
        subjects.push(SubjectDir {
            id,
            results_dir: path.join(results),
            path,
        });
    }

    if let Some(only) = only {
        for wanted in only {
            if !subjects.iter().any(|s| s.id == *wanted) {
                log::warn!("Subject {} not found in {}", wanted, subject_results.display());
            }
        }
    }
    Ok(subjects)
}

fn has_prefix(dir: &Path, prefix: &str) -> Result<bool> {
    Ok(sorted_entries(dir)?.iter().any(|n| n.starts_with(prefix)))
}

/// Classify a GLM folder; `None` when it holds neither stats nor iresp datasets.
pub fn classify_glm(dir: &Path) -> Result<Option<GlmKind>> {
    if !dir.is_dir() {
        return Ok(None);
    }
    if has_prefix(dir, "iresp")? {
        Ok(Some(GlmKind::Tent))
    } else if has_prefix(dir, "stats")? {
        Ok(Some(GlmKind::Gam))
    } else {
        Ok(None)
    }
}

/// Names of every GLM of `kind` found in any subject, sorted.
pub fn list_glms(subjects: &[SubjectDir], kind: GlmKind) -> Result<Vec<String>> {
    let mut glms = BTreeSet::new();
    for subject in subjects {
        if !subject.results_dir.is_dir() {
            continue;
        }
        for name in sorted_entries(&subject.results_dir)? {
            if classify_glm(&subject.results_dir.join(&name))? == Some(kind) {
                glms.insert(name);
            }
        }
    }
    Ok(glms.into_iter().collect())
}

/// Folder of `glm` in the first subject that has it
pub fn find_glm_dir(subjects: &[SubjectDir], glm: &str) -> Option<PathBuf> {
    subjects.iter().find(|s| s.has_glm(glm)).map(|s| s.glm_dir(glm))
}

/// Datasets in `dir` whose names start with `prefix` and end in `.HEAD`, sorted
pub fn datasets_with_prefix(dir: &Path, prefix: &str) -> Result<Vec<String>> {
    Ok(sorted_entries(dir)?
        .into_iter()
        .filter(|n| n.starts_with(prefix) && n.ends_with(".HEAD"))
        .collect())
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_subjects_and_glms() {
        let tmp = tempfile::tempdir().unwrap();
        fixtures::glm(tmp.path(), "102", "GLM_gam", &["stats.102+tlrc.HEAD"]);
        fixtures::glm(tmp.path(), "101", "GLM_gam", &["stats.101+tlrc.HEAD"]);
        fixtures::glm(
            tmp.path(),
            "101",
            "GLM_tent",
            &["stats.101+tlrc.HEAD", "iresp.hit.101+tlrc.HEAD"],
        );
        fixtures::glm(tmp.path(), "101", "logs", &["notes.txt"]);
        std::fs::create_dir(tmp.path().join("QC_AFNI")).unwrap();

        let subjects = list_subjects(tmp.path(), None).unwrap();
        let ids: Vec<&str> = subjects.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["101", "102"]);
        assert!(subjects[0].results_dir.ends_with("subj.101/101.results"));

        assert_eq!(list_glms(&subjects, GlmKind::Gam).unwrap(), vec!["GLM_gam"]);
        assert_eq!(list_glms(&subjects, GlmKind::Tent).unwrap(), vec!["GLM_tent"]);

        let only = vec!["102".to_string()];
        assert_eq!(list_subjects(tmp.path(), Some(&only)).unwrap().len(), 1);
    }

    #[test]
    fn test_subject_id() {
        assert_eq!(subject_id("subj.101"), "101");
        assert_eq!(subject_id("subj101"), "subj101");
    }
}
