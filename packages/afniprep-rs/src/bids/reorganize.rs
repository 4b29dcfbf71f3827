//! Move dcm2niix output into the BIDS modality folders and rename it.
//!
//! dcm2niix names files `<protocol>_<series>.nii.gz` / `.json`. Protocol names decide the
//! modality; series numbers decide which repeat to keep and which file is the single-band
//! reference of a multi-band run.

use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use crate::bids::layout::SessionPaths;
use crate::error::{AfniPrepError, Result};
use crate::types::{session_fragment, session_label, task_from_filename, Participant};

const NII_EXT: &str = ".nii.gz";
const JSON_EXT: &str = ".json";

#[derive(Debug, Clone)]
pub struct ReorganizeRequest {
    pub participant: Participant,
    pub paths: SessionPaths,
    /// Marker present in the protocol name of every task BOLD scan
    pub task_code: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ReorganizeReport {
    pub renamed: Vec<(String, String)>,
    pub removed: Vec<String>,
    pub task_labels: Vec<String>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Modality {
    Anat,
    Fmap,
    Func,
}

/// Destination folder for a converted file, or `None` when it is not kept.
pub fn route(file_name: &str, task_code: &str) -> Option<Modality> {
    let lower = file_name.to_lowercase();
    if file_name.contains("T1") || file_name.contains("T2") {
        Some(Modality::Anat)
    } else if lower.contains("spinecho") || lower.contains("fieldmap") {
        Some(Modality::Fmap)
    } else if is_rest(file_name) {
        Some(Modality::Func)
    } else if !task_code.is_empty() && lower.contains(&task_code.to_lowercase()) {
        Some(Modality::Func)
    } else {
        None
    }
}

fn is_rest(file_name: &str) -> bool {
    let lower = file_name.to_lowercase();
    lower.contains("rsfc") || lower.contains("rest")
}

/// Series number of a dcm2niix stem (`BOLD_task_12` → 12)
pub fn series_number(stem: &str) -> Option<u32> {
    stem.rsplit('_').next()?.parse().ok()
}

/// Stem without the trailing `_<series>`
fn protocol_name(stem: &str) -> &str {
    match stem.rfind('_') {
        Some(idx) => &stem[..idx],
        None => stem,
    }
}

/// BIDS task label derived from a protocol name.
pub fn task_label(protocol: &str, task_code: &str) -> String {
    let lower = protocol.to_lowercase();
    let without_code = if task_code.is_empty() {
        lower
    } else {
        lower.replace(&task_code.to_lowercase(), "")
    };
    without_code
        .trim_start_matches(['_', '-', '.'])
        .chars()
        .filter(|c| c.is_alphanumeric())
        .collect()
}

/// Map a `PhaseEncodingDirection` value to a BIDS `dir-` label.
pub fn fieldmap_direction(raw: &str, single_pair: bool) -> String {
    if single_pair {
        return raw.to_string();
    }
    match raw {
        "j" => "PA".to_string(),
        "j-" => "AP".to_string(),
        other => other.to_string(),
    }
}

fn nii_stems(dir: &Path, filter: impl Fn(&str) -> bool) -> Result<Vec<String>> {
    let mut stems = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let name = entry?.file_name().to_string_lossy().to_string();
        if let Some(stem) = name.strip_suffix(NII_EXT) {
            if filter(&name) {
                stems.push(stem.to_string());
            }
        }
    }
    stems.sort();
    Ok(stems)
}

fn list_names(dir: &Path) -> Result<Vec<String>> {
    let mut names = Vec::new();
    if dir.is_dir() {
        for entry in std::fs::read_dir(dir)? {
            names.push(entry?.file_name().to_string_lossy().to_string());
        }
    }
    names.sort();
    Ok(names)
}

/// Read a JSON sidecar, apply `update`, and write it back with four-space indentation.
pub fn update_sidecar(path: &Path, update: impl FnOnce(&mut serde_json::Map<String, Value>)) -> Result<()> {
    let text = std::fs::read_to_string(path)?;
    let mut value: Value = serde_json::from_str(&text)?;
    let object = value
        .as_object_mut()
        .ok_or_else(|| AfniPrepError::ParseError(format!("{}: not a JSON object", path.display())))?;
    update(object);

    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    serde::Serialize::serialize(&value, &mut ser)?;
    std::fs::write(path, buf)?;
    Ok(())
}

struct Renamer<'a> {
    report: &'a mut ReorganizeReport,
}

impl Renamer<'_> {
    /// Rename `<stem>.nii.gz` and `<stem>.json` in `dir` to `<target>.*`.
    fn pair(&mut self, dir: &Path, stem: &str, target: &str) -> Result<()> {
        for ext in [NII_EXT, JSON_EXT] {
            let from = dir.join(format!("{}{}", stem, ext));
            if !from.exists() {
                continue;
            }
            let to_name = format!("{}{}", target, ext);
            std::fs::rename(&from, dir.join(&to_name))?;
            log::debug!("{}{} -> {}", stem, ext, to_name);
            self.report.renamed.push((format!("{}{}", stem, ext), to_name));
        }
        Ok(())
    }

    fn remove_stem(&mut self, dir: &Path, stem: &str) -> Result<()> {
        for name in list_names(dir)? {
            if name == format!("{}{}", stem, NII_EXT) || name == format!("{}{}", stem, JSON_EXT) {
                std::fs::remove_file(dir.join(&name))?;
                self.report.removed.push(name);
            }
        }
        Ok(())
    }
}

/// Reorganize one session's converted NIfTI files into BIDS form.
///
/// The DICOM and NIfTI folders are deleted afterwards, along with any modality folder
/// left empty.
pub fn reorganize_nifti(request: &ReorganizeRequest) -> Result<ReorganizeReport> {
    let paths = &request.paths;
    let nifti_dir = paths.nifti();
    if !nifti_dir.is_dir() {
        return Err(AfniPrepError::FileNotFound(nifti_dir.display().to_string()));
    }

    let dicom_dir = paths.dicom();
    if dicom_dir.exists() {
        std::fs::remove_dir_all(&dicom_dir)?;
    }

    let (anat, fmap, func) = (paths.anat(), paths.fmap(), paths.func());
    for dir in [&anat, &fmap, &func] {
        std::fs::create_dir_all(dir)?;
    }

    for name in list_names(&nifti_dir)? {
        let dest = match route(&name, &request.task_code) {
            Some(Modality::Anat) => &anat,
            Some(Modality::Fmap) => &fmap,
            Some(Modality::Func) => &func,
            None => continue,
        };
        std::fs::rename(nifti_dir.join(&name), dest.join(&name))?;
    }

    let base = format!(
        "{}{}",
        request.participant.label(),
        session_fragment(paths.session)
    );
    let mut report = ReorganizeReport::default();

    organize_anat(&anat, &base, &mut report)?;
    organize_tasks(&func, &base, &request.task_code, &mut report)?;
    organize_rest(&func, &base, &mut report)?;
    add_task_names(&func)?;
    let bold_runs = intended_for(&func, paths.session)?;
    organize_fieldmaps(&fmap, &base, &bold_runs, &mut report)?;

    std::fs::remove_dir_all(&nifti_dir)?;
    for dir in [&anat, &func, &fmap] {
        if list_names(dir)?.is_empty() {
            std::fs::remove_dir(dir)?;
        }
    }

    for warning in &report.warnings {
        log::warn!("{}", warning);
    }
    log::info!("{} NIfTI files relocated into BIDS folders", base);
    Ok(report)
}

fn organize_anat(anat: &Path, base: &str, report: &mut ReorganizeReport) -> Result<()> {
    for (marker, suffix) in [("T1", "T1w"), ("T2", "T2w")] {
        let stems = nii_stems(anat, |n| n.contains(marker))?;
        let Some(keep) = stems
            .iter()
            .filter_map(|s| series_number(s).map(|n| (n, s.clone())))
            .max()
            .map(|(_, s)| s)
        else {
            continue;
        };

        let mut renamer = Renamer { report: &mut *report };
        for stem in stems.iter().filter(|s| **s != keep) {
            renamer.remove_stem(anat, stem)?;
        }
        renamer.pair(anat, &keep, &format!("{}_{}", base, suffix))?;
    }
    Ok(())
}

fn organize_tasks(func: &Path, base: &str, task_code: &str, report: &mut ReorganizeReport) -> Result<()> {
    let stems = nii_stems(func, |n| !is_rest(n) && !n.starts_with("sub-"))?;

    let mut groups: BTreeMap<String, Vec<(u32, String)>> = BTreeMap::new();
    for stem in stems {
        match series_number(&stem) {
            Some(series) => groups
                .entry(protocol_name(&stem).to_string())
                .or_default()
                .push((series, stem)),
            None => report
                .warnings
                .push(format!("{}: no series number, left in place", stem)),
        }
    }

    for (protocol, mut runs) in groups {
        runs.sort();
        let label = task_label(&protocol, task_code);
        if label.is_empty() {
            report
                .warnings
                .push(format!("{}: empty task label after removing task code", protocol));
            continue;
        }

        let mut renamer = Renamer { report: &mut *report };
        if let Some((_, bold)) = runs.last() {
            renamer.pair(func, bold, &format!("{}_task-{}_bold", base, label))?;
        }
        if runs.len() > 1 {
            let (_, sbref) = &runs[0];
            renamer.pair(func, sbref, &format!("{}_task-{}_sbref", base, label))?;
        }
        report.task_labels.push(label);
    }
    Ok(())
}

fn organize_rest(func: &Path, base: &str, report: &mut ReorganizeReport) -> Result<()> {
    let by_series: BTreeMap<u32, String> = nii_stems(func, |n| is_rest(n) && !n.starts_with("sub-"))?
        .into_iter()
        .filter_map(|s| series_number(&s).map(|n| (n, s)))
        .collect();

    let bold_series: Vec<u32> = by_series
        .keys()
        .copied()
        .filter(|n| *n > 0 && by_series.contains_key(&(n - 1)))
        .collect();

    let multiple = bold_series.len() > 1;
    let mut renamer = Renamer { report: &mut *report };
    for (i, series) in bold_series.iter().enumerate() {
        let run = if multiple {
            format!("_run-0{}", i + 1)
        } else {
            String::new()
        };
        let bold = &by_series[series];
        let sbref = &by_series[&(series - 1)];
        renamer.pair(func, bold, &format!("{}_task-rest{}_bold", base, run))?;
        renamer.pair(func, sbref, &format!("{}_task-rest{}_sbref", base, run))?;
    }
    if !bold_series.is_empty() {
        report.task_labels.push("rest".to_string());
    }
    Ok(())
}

fn add_task_names(func: &Path) -> Result<()> {
    for name in list_names(func)? {
        if !name.ends_with(JSON_EXT) {
            continue;
        }
        if let Some(task) = task_from_filename(&name) {
            let task = task.to_string();
            update_sidecar(&func.join(&name), |obj| {
                obj.insert("TaskName".to_string(), Value::String(task));
            })?;
        }
    }
    Ok(())
}

/// BOLD NIfTIs relative to the subject folder, as BIDS `IntendedFor` expects.
fn intended_for(func: &Path, session: Option<u32>) -> Result<Vec<String>> {
    let prefix = match session {
        Some(n) => format!("{}/func/", session_label(n)),
        None => "func/".to_string(),
    };
    Ok(list_names(func)?
        .into_iter()
        .filter(|n| n.contains("bold") && n.ends_with(NII_EXT))
        .map(|n| format!("{}{}", prefix, n))
        .collect())
}

fn organize_fieldmaps(fmap: &Path, base: &str, bold_runs: &[String], report: &mut ReorganizeReport) -> Result<()> {
    let names: Vec<String> = list_names(fmap)?
        .into_iter()
        .filter(|n| {
            let lower = n.to_lowercase();
            lower.contains("spinecho") || lower.contains("fieldmap")
        })
        .collect();
    if names.is_empty() {
        return Ok(());
    }
    let single_pair = names.len() == 4;

    let mut targets = BTreeSet::new();
    let mut renamer = Renamer { report: &mut *report };
    for name in &names {
        let Some(stem) = name.strip_suffix(NII_EXT) else {
            continue;
        };
        let sidecar = fmap.join(format!("{}{}", stem, JSON_EXT));
        if !sidecar.exists() {
            return Err(AfniPrepError::FileNotFound(sidecar.display().to_string()));
        }
        let data: Value = serde_json::from_str(&std::fs::read_to_string(&sidecar)?)?;
        let raw = data
            .get("PhaseEncodingDirection")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                AfniPrepError::ParseError(format!("{}: missing PhaseEncodingDirection", sidecar.display()))
            })?;
        let target = format!("{}_dir-{}_epi", base, fieldmap_direction(raw, single_pair));
        if !targets.insert(target.clone()) {
            renamer.report.warnings.push(format!(
                "{}: {} already exists, left in place",
                stem, target
            ));
            continue;
        }
        renamer.pair(fmap, stem, &target)?;
    }

    for name in list_names(fmap)? {
        if name.contains("_epi") && name.ends_with(JSON_EXT) {
            let runs: Vec<Value> = bold_runs.iter().cloned().map(Value::String).collect();
            update_sidecar(&fmap.join(&name), |obj| {
                obj.insert("IntendedFor".to_string(), Value::Array(runs));
            })?;
        }
    }

    if names.len() > 4 {
        report.warnings.push(
            "Multiple fieldmap pairs acquired; edit IntendedFor in their sidecars to name the BOLD runs each one covers"
                .to_string(),
        );
    }
    Ok(())
}

/// Paths of the renamed BOLD runs, for callers that go on to write events.
pub fn bold_runs(func: &Path) -> Result<Vec<PathBuf>> {
    Ok(list_names(func)?
        .into_iter()
        .filter(|n| n.ends_with(&format!("_bold{}", NII_EXT)))
        .map(|n| func.join(n))
        .collect())
}
