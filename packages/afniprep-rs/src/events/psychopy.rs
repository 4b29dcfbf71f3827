use crate::error::{AfniPrepError, Result};

/// Event marking the first scanner sync pulse
pub const SYNC_EVENT: &str = "Keypress: 5";

/// Stimulus onsets that start a coded trial
pub const TRIAL_EVENTS: &[&str] = &[
    "encodingScene_1: autoDraw = True",
    "retrievalScene_1A: autoDraw = True",
];

/// One line of a PsychoPy `.log` file
#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    pub time: f64,
    pub event_type: String,
    pub event: String,
}

/// Parse a tab-separated PsychoPy log (`time \tLEVEL \tmessage`).
///
/// Continuation lines and lines without a numeric time are skipped.
pub fn parse_log(text: &str) -> Vec<LogEntry> {
    text.lines()
        .filter_map(|line| {
            let mut fields = line.split('\t');
            let time = fields.next()?.trim().parse::<f64>().ok()?;
            let event_type = fields.next()?.trim().to_string();
            let event = fields.next().unwrap_or("").trim().to_string();
            Some(LogEntry {
                time,
                event_type,
                event,
            })
        })
        .collect()
}

/// Onsets of `keep_events`, in seconds since the first `sync_event`.
pub fn trial_onsets(entries: &[LogEntry], sync_event: &str, keep_events: &[&str]) -> Result<Vec<f64>> {
    let start = entries
        .iter()
        .find(|e| e.event == sync_event)
        .map(|e| e.time)
        .ok_or_else(|| AfniPrepError::ParseError(format!("log: no '{}' sync pulse", sync_event)))?;

    let onsets: Vec<f64> = entries
        .iter()
        .filter(|e| keep_events.contains(&e.event.as_str()))
        .map(|e| e.time - start)
        .collect();

    log::debug!("{} trial onsets after sync at {:.4}s", onsets.len(), start);
    Ok(onsets)
}
