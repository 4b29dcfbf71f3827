//! AFNI stimulus timing files from coded BIDS events.
//!
//! One file per combination of covariate mode, trial type, run set, event and confidence.
//! Each file has one line per BOLD run in task order: `*` when the run is excluded, the
//! selected onsets (optionally married to RT as `onset*rt`) otherwise, or `-1` when the run
//! counts but has no matching trials.

use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::bids::layout::{func_dirs, timing_dir};
use crate::error::{AfniPrepError, Result};
use crate::events::{read_events, EventRow, NA};
use crate::report::{float_repr, round_to};
use crate::study::StudyProfile;
use crate::types::{task_from_filename, Participant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum RtMode {
    Rt,
    NoRt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum TrialType {
    All,
    Encoding,
    Retrieval,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum RunSet {
    AllRuns,
    Short1,
    Short2,
    BothShort,
    Long,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum EventKind {
    AllEvents,
    Hit,
    Miss,
    Cr,
    Fa,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum Confidence {
    All,
    High,
    Mod,
    Low,
    ModLow,
}

impl RtMode {
    pub const ALL: [RtMode; 2] = [RtMode::Rt, RtMode::NoRt];

    pub fn as_str(&self) -> &'static str {
        match self {
            RtMode::Rt => "rt",
            RtMode::NoRt => "nort",
        }
    }
}

impl TrialType {
    pub const ALL: [TrialType; 3] = [TrialType::All, TrialType::Encoding, TrialType::Retrieval];

    pub fn as_str(&self) -> &'static str {
        match self {
            TrialType::All => "all",
            TrialType::Encoding => "encoding",
            TrialType::Retrieval => "retrieval",
        }
    }

    fn includes(&self, task: &str) -> bool {
        *self == TrialType::All || task.contains(self.as_str())
    }
}

impl RunSet {
    pub const ALL: [RunSet; 5] = [
        RunSet::AllRuns,
        RunSet::Short1,
        RunSet::Short2,
        RunSet::BothShort,
        RunSet::Long,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RunSet::AllRuns => "allruns",
            RunSet::Short1 => "short1",
            RunSet::Short2 => "short2",
            RunSet::BothShort => "bothshort",
            RunSet::Long => "long",
        }
    }

    /// Blocks 1 and 3 are the short study lists, block 2 the long one.
    fn includes(&self, task: &str) -> bool {
        match self {
            RunSet::AllRuns => true,
            RunSet::Short1 => task.contains('1'),
            RunSet::Short2 => task.contains('3'),
            RunSet::BothShort => task.contains('1') || task.contains('3'),
            RunSet::Long => task.contains('2'),
        }
    }
}

impl EventKind {
    pub const ALL: [EventKind; 5] = [
        EventKind::AllEvents,
        EventKind::Hit,
        EventKind::Miss,
        EventKind::Cr,
        EventKind::Fa,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::AllEvents => "allevents",
            EventKind::Hit => "hit",
            EventKind::Miss => "miss",
            EventKind::Cr => "cr",
            EventKind::Fa => "fa",
        }
    }
}

impl Confidence {
    pub const ALL: [Confidence; 5] = [
        Confidence::All,
        Confidence::High,
        Confidence::Mod,
        Confidence::Low,
        Confidence::ModLow,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Confidence::All => "all",
            Confidence::High => "high",
            Confidence::Mod => "mod",
            Confidence::Low => "low",
            Confidence::ModLow => "modlow",
        }
    }
}

/// One timing file
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct TimingSpec {
    pub rt: RtMode,
    pub trial_type: TrialType,
    pub runs: RunSet,
    pub event: EventKind,
    pub conf: Confidence,
}

impl TimingSpec {
    /// `sub-<id>_<type>_<runs>_<event>_<conf>conf_<rt>.txt`; `all` confidence is spelled out too.
    pub fn file_name(&self, participant: &Participant) -> String {
        format!(
            "{}_{}_{}_{}_{}conf_{}.txt",
            participant.label(),
            self.trial_type.as_str(),
            self.runs.as_str(),
            self.event.as_str(),
            self.conf.as_str(),
            self.rt.as_str()
        )
    }

    /// Whether a run contributes trials (otherwise its line is `*`)
    pub fn applies_to(&self, task: &str) -> bool {
        self.trial_type.includes(task) && self.runs.includes(task)
    }

    pub fn selects(&self, row: &EventRow) -> bool {
        let event = self.event.as_str();
        match (self.event, self.conf) {
            (EventKind::AllEvents, _) => true,
            (_, Confidence::All) => {
                row.participant_response_type == event || row.participant_subsequent_type == event
            }
            (_, Confidence::ModLow) => {
                let modlow = |tc: &str| tc.contains(event) && (tc.contains("mod") || tc.contains("low"));
                modlow(&row.participant_response_type_conf) || modlow(&row.participant_subsequent_type_conf)
            }
            (_, conf) => {
                let wanted = format!("{}-{}", event, conf.as_str());
                row.participant_response_type_conf == wanted || row.participant_subsequent_type_conf == wanted
            }
        }
    }
}

/// Every timing file, in generation order. Encoding has no correct rejections or false alarms.
pub fn all_specs() -> Vec<TimingSpec> {
    let mut specs = Vec::new();
    for rt in RtMode::ALL {
        for trial_type in TrialType::ALL {
            for runs in RunSet::ALL {
                for event in EventKind::ALL {
                    if trial_type == TrialType::Encoding && matches!(event, EventKind::Cr | EventKind::Fa) {
                        continue;
                    }
                    for conf in Confidence::ALL {
                        specs.push(TimingSpec {
                            rt,
                            trial_type,
                            runs,
                            event,
                            conf,
                        });
                    }
                }
            }
        }
    }
    specs
}

fn format_value(value: f64) -> String {
    float_repr(round_to(value, 4))
}

/// Timing-file line for one run.
pub fn timing_line(
    spec: &TimingSpec,
    task: &str,
    rows: &[EventRow],
    participant: &Participant,
    study: &StudyProfile,
) -> String {
    if !spec.applies_to(task) {
        return "*".to_string();
    }

    let mut line = String::new();
    let mut count = 0;
    for row in rows {
        if study.is_omitted(participant, &row.filename) || !spec.selects(row) {
            continue;
        }
        line.push_str(&format_value(row.onset));
        match spec.rt {
            RtMode::Rt => {
                let rt = match row.participant_response_rt.as_str() {
                    NA => study.tr.clone(),
                    raw => raw.parse::<f64>().map(format_value).unwrap_or_else(|_| study.tr.clone()),
                };
                line.push('*');
                line.push_str(&rt);
                line.push(' ');
            }
            RtMode::NoRt => line.push(' '),
        }
        count += 1;
    }

    if count == 0 {
        line.push_str("-1");
        if spec.rt == RtMode::Rt {
            line.push('*');
            line.push_str(&study.tr);
        }
    }
    line
}

#[derive(Debug, Clone)]
pub struct TimingRequest {
    pub bids_root: PathBuf,
    pub participant: Participant,
    /// Session numbers; empty for single-session studies
    pub sessions: Vec<u32>,
    /// Output folder; defaults to the participant's `AFNI_timing_files/`
    pub onsets_dir: Option<PathBuf>,
    pub study: StudyProfile,
}

#[derive(Debug, Clone, Serialize)]
pub struct TimingReport {
    pub onsets_dir: PathBuf,
    pub runs: Vec<String>,
    pub files_written: usize,
}

/// Events files of a participant in task order, as (task, path)
pub fn ordered_events_files(
    bids_root: &Path,
    participant: &Participant,
    sessions: &[u32],
    task_order: &[String],
) -> Result<Vec<(String, PathBuf)>> {
    let mut found = Vec::new();
    for dir in func_dirs(bids_root, participant, sessions) {
        let pattern = dir.join("*events.tsv");
        let pattern = pattern.to_string_lossy();
        let paths = glob::glob(&pattern)
            .map_err(|e| AfniPrepError::InvalidParameter(format!("{}: {}", pattern, e)))?;
        found.extend(paths.flatten());
    }

    let mut ordered = Vec::new();
    for task in task_order {
        for path in &found {
            let name = path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
            if task_from_filename(&name) == Some(task.as_str()) {
                ordered.push((task.clone(), path.clone()));
            }
        }
    }

    if ordered.len() < found.len() {
        log::warn!(
            "{} events file(s) have tasks outside the task order and are ignored",
            found.len() - ordered.len()
        );
    }
    Ok(ordered)
}

/// Regenerate every timing file for a participant; existing files in the onsets folder are removed.
pub fn create_timing_files(request: &TimingRequest) -> Result<TimingReport> {
    let onsets_dir = request
        .onsets_dir
        .clone()
        .unwrap_or_else(|| timing_dir(&request.bids_root, &request.participant));

    let runs = ordered_events_files(
        &request.bids_root,
        &request.participant,
        &request.sessions,
        &request.study.task_order,
    )?;
    if runs.is_empty() {
        return Err(AfniPrepError::FileNotFound(format!(
            "no events files for {} under {}",
            request.participant,
            request.bids_root.display()
        )));
    }

    let mut run_events = Vec::with_capacity(runs.len());
    for (task, path) in &runs {
        run_events.push((task.as_str(), read_events(path)?));
    }

    if onsets_dir.exists() {
        for entry in std::fs::read_dir(&onsets_dir)? {
            let path = entry?.path();
            if path.is_file() {
                std::fs::remove_file(path)?;
            }
        }
    } else {
        std::fs::create_dir_all(&onsets_dir)?;
    }

    let mut contents: BTreeMap<TimingSpec, String> = BTreeMap::new();
    for spec in all_specs() {
        let text = contents.entry(spec).or_default();
        for (task, rows) in &run_events {
            text.push_str(&timing_line(&spec, task, rows, &request.participant, &request.study));
            text.push('\n');
        }
    }

    for (spec, text) in &contents {
        std::fs::write(onsets_dir.join(spec.file_name(&request.participant)), text)?;
    }

    log::info!(
        "AFNI timing files generated for {} ({} files, {} runs)",
        request.participant,
        contents.len(),
        runs.len()
    );

    Ok(TimingReport {
        onsets_dir,
        runs: runs.into_iter().map(|(task, _)| task).collect(),
        files_written: contents.len(),
    })
}
