use serde::Serialize;
use std::path::{Path, PathBuf};

use super::coding::{code_encoding, code_retrieval};
use super::psychopy::{parse_log, trial_onsets, SYNC_EVENT, TRIAL_EVENTS};
use super::subsequent::fill_subsequent_memory;
use super::tsv::{read_behavioral_csv, read_events, write_events};
use crate::bids::layout::{func_dirs, session_paths};
use crate::error::{AfniPrepError, Result};
use crate::study::StudyProfile;
use crate::types::{task_from_filename, Participant};

#[derive(Debug, Clone)]
pub struct EventsRequest {
    pub bids_root: PathBuf,
    /// Folder holding every participant's PsychoPy `.csv`/`.log` exports
    pub raw_dir: PathBuf,
    pub participant: Participant,
    /// Session being coded; `None` for single-session studies
    pub session: Option<u32>,
    /// Number of sessions in the study (1 for single-session)
    pub session_count: u32,
    pub study: StudyProfile,
}

impl EventsRequest {
    fn is_final_session(&self) -> bool {
        !matches!(self.session, Some(s) if s < self.session_count)
    }

    fn all_sessions(&self) -> Vec<u32> {
        if self.session.is_none() {
            Vec::new()
        } else {
            (1..=self.session_count).collect()
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct EventsReport {
    pub written: Vec<PathBuf>,
    pub subsequent_updated: Vec<PathBuf>,
    pub skipped: Vec<String>,
}

/// BOLD task runs in a func folder, as (file name, task label)
pub fn bold_task_runs(func_dir: &Path) -> Result<Vec<(String, String)>> {
    let mut runs = Vec::new();
    for entry in std::fs::read_dir(func_dir)? {
        let name = entry?.file_name().to_string_lossy().to_string();
        let excluded = ["task-rest", "sbref", "events", ".json", ".DS_Store"];
        if excluded.iter().any(|x| name.contains(x)) {
            continue;
        }
        if let Some(task) = task_from_filename(&name) {
            runs.push((name.clone(), task.to_string()));
        }
    }
    runs.sort();
    Ok(runs)
}

/// The participant's behavioral export for `task`; more than one candidate is an error.
pub fn find_behavioral_csv(raw_dir: &Path, participant: &Participant, task: &str) -> Result<Option<PathBuf>> {
    let prefix = participant.zero_padded();
    let mut matches = Vec::new();
    for entry in std::fs::read_dir(raw_dir)? {
        let name = entry?.file_name().to_string_lossy().to_string();
        if name.starts_with(&prefix) && name.to_lowercase().contains(task) && name.ends_with(".csv") {
            matches.push(raw_dir.join(name));
        }
    }
    match matches.len() {
        0 => Ok(None),
        1 => Ok(matches.pop()),
        _ => Err(AfniPrepError::InvalidParameter(format!(
            "{} has {} {} CSV files in {}; keep exactly one",
            participant.label(),
            matches.len(),
            task,
            raw_dir.display()
        ))),
    }
}

/// Events file written next to a BOLD run
pub fn events_path(func_dir: &Path, bold_name: &str) -> PathBuf {
    let stem = bold_name.strip_suffix("_bold.nii.gz").unwrap_or(bold_name);
    func_dir.join(format!("{}_events.tsv", stem))
}

/// Code every BOLD task run of one participant session into `*_events.tsv`.
///
/// On the last session the encoding files of all sessions are updated with subsequent
/// memory from their retrieval runs.
pub fn generate_event_files(request: &EventsRequest) -> Result<EventsReport> {
    let func_dir = session_paths(&request.bids_root, &request.participant, request.session).func();
    if !func_dir.is_dir() {
        return Err(AfniPrepError::FileNotFound(func_dir.display().to_string()));
    }
    if !request.raw_dir.is_dir() {
        return Err(AfniPrepError::FileNotFound(request.raw_dir.display().to_string()));
    }

    let mut report = EventsReport::default();

    for (bold_name, task) in bold_task_runs(&func_dir)? {
        let Some(csv_path) = find_behavioral_csv(&request.raw_dir, &request.participant, &task)? else {
            log::warn!("No behavioral CSV for {} task {}", request.participant, task);
            report.skipped.push(task);
            continue;
        };

        let log_path = csv_path.with_extension("log");
        if !log_path.exists() {
            return Err(AfniPrepError::FileNotFound(log_path.display().to_string()));
        }
        let entries = parse_log(&std::fs::read_to_string(&log_path)?);
        let onsets = trial_onsets(&entries, SYNC_EVENT, TRIAL_EVENTS)?;
        let rows = read_behavioral_csv(&csv_path)?;

        let coded = if task.contains("encoding") {
            code_encoding(&rows, &onsets, &request.participant, &request.study)?
        } else if task.contains("retrieval") {
            code_retrieval(&rows, &onsets, &request.participant, &request.study)?
        } else {
            log::warn!("Task {} is neither encoding nor retrieval; not coded", task);
            report.skipped.push(task);
            continue;
        };

        let out = events_path(&func_dir, &bold_name);
        write_events(&out, &coded)?;
        log::info!("Wrote {} ({} trials)", out.display(), coded.len());
        report.written.push(out);
    }

    if request.is_final_session() {
        report.subsequent_updated = apply_subsequent_memory(request)?;
    }

    Ok(report)
}

fn apply_subsequent_memory(request: &EventsRequest) -> Result<Vec<PathBuf>> {
    let mut events_files = Vec::new();
    for dir in func_dirs(&request.bids_root, &request.participant, &request.all_sessions()) {
        let pattern = dir.join("*events.tsv");
        let pattern = pattern.to_string_lossy();
        for path in glob::glob(&pattern)
            .map_err(|e| AfniPrepError::InvalidParameter(format!("{}: {}", pattern, e)))?
            .flatten()
        {
            events_files.push(path);
        }
    }

    let file_name = |p: &Path| p.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();

    let mut updated = Vec::new();
    for path in &events_files {
        let name = file_name(path);
        let Some(task) = task_from_filename(&name) else {
            continue;
        };
        if !task.starts_with("encoding") {
            continue;
        }
        let Some(block) = task.chars().last() else {
            continue;
        };

        let targets = [format!("task-retrieval{}a", block), format!("task-retrieval{}b", block)];
        let mut retrievals = Vec::new();
        for target in &targets {
            for candidate in events_files.iter().filter(|p| file_name(p).contains(target.as_str())) {
                retrievals.extend(read_events(candidate)?);
            }
        }
        if retrievals.is_empty() {
            log::warn!("{}: no retrieval{}a/b events yet, subsequent memory left pending", name, block);
            continue;
        }

        let mut encoding = read_events(path)?;
        let matched = fill_subsequent_memory(&mut encoding, &retrievals, &request.participant, &request.study);
        write_events(path, &encoding)?;
        log::info!("{}: subsequent memory for {}/{} items", name, matched, encoding.len());
        updated.push(path.clone());
    }
    Ok(updated)
}
