use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::types::{session_label, Participant};

/// Name of the per-participant folder holding AFNI timing files
pub const TIMING_FOLDER: &str = "AFNI_timing_files";

/// Folders of one participant session (or of the participant, for single-session studies)
#[derive(Debug, Clone, PartialEq)]
pub struct SessionPaths {
    pub root: PathBuf,
    pub session: Option<u32>,
}

impl SessionPaths {
    pub fn anat(&self) -> PathBuf {
        self.root.join("anat")
    }

    pub fn fmap(&self) -> PathBuf {
        self.root.join("fmap")
    }

    pub fn func(&self) -> PathBuf {
        self.root.join("func")
    }

    /// Transient folder for downloaded DICOMs
    pub fn dicom(&self) -> PathBuf {
        self.root.join("DICOM")
    }

    /// Transient folder for dcm2niix output
    pub fn nifti(&self) -> PathBuf {
        self.root.join("NIfTI")
    }

    fn all(&self) -> [PathBuf; 5] {
        [self.anat(), self.fmap(), self.func(), self.dicom(), self.nifti()]
    }
}

pub fn participant_dir(bids_root: &Path, participant: &Participant) -> PathBuf {
    bids_root.join(participant.label())
}

pub fn timing_dir(bids_root: &Path, participant: &Participant) -> PathBuf {
    participant_dir(bids_root, participant).join(TIMING_FOLDER)
}

pub fn session_paths(bids_root: &Path, participant: &Participant, session: Option<u32>) -> SessionPaths {
    let base = participant_dir(bids_root, participant);
    let root = match session {
        Some(n) => base.join(session_label(n)),
        None => base,
    };
    SessionPaths { root, session }
}

/// `func/` folders of every session, in session order
pub fn func_dirs(bids_root: &Path, participant: &Participant, sessions: &[u32]) -> Vec<PathBuf> {
    if sessions.is_empty() {
        vec![session_paths(bids_root, participant, None).func()]
    } else {
        sessions
            .iter()
            .map(|&s| session_paths(bids_root, participant, Some(s)).func())
            .collect()
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct LayoutReport {
    pub participant: String,
    pub created: Vec<PathBuf>,
}

fn ensure_dir(path: &Path, report: &mut LayoutReport) -> Result<()> {
    if !path.exists() {
        std::fs::create_dir_all(path)?;
        log::debug!("Created {}", path.display());
        report.created.push(path.to_path_buf());
    }
    Ok(())
}

/// Create the BIDS folder skeleton for a participant.
///
/// An empty `sessions` slice means a single-session study: modality folders go directly
/// under `sub-…/`. Existing folders are left alone and not reported.
pub fn create_folders(bids_root: &Path, participant: &Participant, sessions: &[u32]) -> Result<LayoutReport> {
    let mut report = LayoutReport {
        participant: participant.label(),
        ..Default::default()
    };

    ensure_dir(&participant_dir(bids_root, participant), &mut report)?;

    let session_list: Vec<Option<u32>> = if sessions.is_empty() {
        vec![None]
    } else {
        sessions.iter().map(|&s| Some(s)).collect()
    };

    for session in session_list {
        let paths = session_paths(bids_root, participant, session);
        ensure_dir(&paths.root, &mut report)?;
        for dir in paths.all() {
            ensure_dir(&dir, &mut report)?;
        }
    }

    ensure_dir(&timing_dir(bids_root, participant), &mut report)?;

    if !report.created.is_empty() {
        log::info!(
            "Created {} folder(s) for {}",
            report.created.len(),
            participant.label()
        );
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_session_layout() {
        let tmp = tempfile::tempdir().unwrap();
        let p = Participant::new("abcd", 1);
        let report = create_folders(tmp.path(), &p, &[]).unwrap();

        let sub = tmp.path().join("sub-abcd001");
        for name in ["anat", "fmap", "func", "DICOM", "NIfTI", TIMING_FOLDER] {
            assert!(sub.join(name).is_dir(), "missing {}", name);
        }
        assert_eq!(report.created.len(), 7);
    }

    #[test]
    fn test_multi_session_layout_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let p = Participant::new("abcd", 12);
        create_folders(tmp.path(), &p, &[1, 2]).unwrap();

        assert!(tmp.path().join("sub-abcd012/ses-01/func").is_dir());
        assert!(tmp.path().join("sub-abcd012/ses-02/anat").is_dir());
        assert!(!tmp.path().join("sub-abcd012/func").exists());

        let again = create_folders(tmp.path(), &p, &[1, 2]).unwrap();
        assert!(again.created.is_empty());
    }

    #[test]
    fn test_func_dirs() {
        let p = Participant::new("x", 3);
        let dirs = func_dirs(Path::new("/data"), &p, &[1, 2]);
        assert_eq!(dirs[1], PathBuf::from("/data/sub-x003/ses-02/func"));
        let single = func_dirs(Path::new("/data"), &p, &[]);
        assert_eq!(single, vec![PathBuf::from("/data/sub-x003/func")]);
    }
}
