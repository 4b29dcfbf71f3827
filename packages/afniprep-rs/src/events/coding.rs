//! Translate PsychoPy trial exports into coded BIDS event rows.
//!
//! Key mapping is counterbalanced by participant number: encoding uses keys `6` (left index)
//! and `1` (right index); retrieval uses `6/7/8` on one hand and `1/2/3` on the other, with
//! the index finger meaning high or low confidence.

use std::collections::HashMap;

use super::{EventRow, NA, PENDING};
use crate::error::{AfniPrepError, Result};
use crate::study::StudyProfile;
use crate::types::Participant;

pub const ENCODING_DURATION: &str = "0.5";
pub const RETRIEVAL_DURATION: &str = "1.9";

const ENCODING_KEYS: &str = "encodingTrialResponse.keys";
const ENCODING_RT: &str = "encodingTrialResponse.rt";
const RETRIEVAL_KEYS: &str = "retrievalTrialResponse.keys";
const RETRIEVAL_RT: &str = "retrievalTrialResponse.rt";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
}

/// Side of the button box answering "old" at retrieval
pub fn old_side(participant_number: u32) -> Side {
    if (participant_number.saturating_sub(1) / 2) % 2 == 0 {
        Side::Left
    } else {
        Side::Right
    }
}

/// Confidence signalled by the index finger at retrieval (`"high"` or `"low"`)
pub fn index_confidence(participant_number: u32) -> &'static str {
    if participant_number.saturating_sub(1) % 2 == 0 {
        "high"
    } else {
        "low"
    }
}

fn column<'a>(row: &'a HashMap<String, String>, name: &str) -> Result<&'a str> {
    row.get(name)
        .map(|s| s.as_str())
        .ok_or_else(|| AfniPrepError::ParseError(format!("behavioral CSV: missing column '{}'", name)))
}

fn or_na(value: &str) -> String {
    if value.is_empty() {
        NA.to_string()
    } else {
        value.to_string()
    }
}

fn response_key(raw: &str) -> String {
    if raw == "None" {
        NA.to_string()
    } else {
        raw.to_string()
    }
}

fn onset_for(onsets: &[f64], trial: usize) -> Result<f64> {
    onsets.get(trial).copied().ok_or_else(|| {
        AfniPrepError::ParseError(format!(
            "behavioral CSV has more trials than the log has onsets ({})",
            onsets.len()
        ))
    })
}

/// Code an encoding run. Rows with an empty response-key cell are jitter trials and skipped.
pub fn code_encoding(
    rows: &[HashMap<String, String>],
    onsets: &[f64],
    participant: &Participant,
    study: &StudyProfile,
) -> Result<Vec<EventRow>> {
    let outdoor_left = study.left_outdoor_participants.contains(&participant.number);
    let mut coded = Vec::new();

    for row in rows {
        let keys = column(row, ENCODING_KEYS)?;
        if keys.is_empty() {
            continue;
        }
        let indoor_outdoor = column(row, "IndoorOutdoor")?;

        let mut event = EventRow::blank(onset_for(onsets, coded.len())?, ENCODING_DURATION, "encoding");
        event.encoding_block = column(row, "EncodingBlock")?.to_string();
        event.retrieval_block = column(row, "RetrievalBlock")?.to_string();
        event.old_new = "old".to_string();
        event.indoor_outdoor = indoor_outdoor.to_lowercase();
        event.filename = column(row, "Filename")?.to_lowercase();
        event.buttonbox_side = if outdoor_left {
            "outdoor | indoor"
        } else {
            "indoor | outdoor"
        }
        .to_string();

        let left_is_correct =
            (outdoor_left && indoor_outdoor == "Outdoor") || (!outdoor_left && indoor_outdoor == "Indoor");
        event.correct_key = if left_is_correct { "6" } else { "1" }.to_string();
        event.correct_response = indoor_outdoor.to_lowercase();
        event.participant_response_rt = or_na(column(row, ENCODING_RT)?);
        event.participant_response_key = response_key(keys);

        event.participant_response = if event.participant_response_key == NA {
            NA.to_string()
        } else if (outdoor_left && keys == "6") || (!outdoor_left && keys == "1") {
            "outdoor".to_string()
        } else {
            "indoor".to_string()
        };
        event.participant_response_scored = if event.participant_response_key == event.correct_key {
            "correct"
        } else {
            "incorrect"
        }
        .to_string();
        event.clear_subsequent(PENDING);

        coded.push(event);
    }

    log::debug!("Coded {} encoding trials", coded.len());
    Ok(coded)
}

/// Code a retrieval run, applying any per-participant rescoring of items as new.
pub fn code_retrieval(
    rows: &[HashMap<String, String>],
    onsets: &[f64],
    participant: &Participant,
    study: &StudyProfile,
) -> Result<Vec<EventRow>> {
    let old = old_side(participant.number);
    let index = index_confidence(participant.number);
    let mut coded = Vec::new();

    for row in rows {
        let keys = column(row, RETRIEVAL_KEYS)?;
        if keys.is_empty() {
            continue;
        }

        let mut event = EventRow::blank(onset_for(onsets, coded.len())?, RETRIEVAL_DURATION, "retrieval");
        event.encoding_block = or_na(column(row, "EncodingBlock")?);
        event.retrieval_block = column(row, "RetrievalBlock")?.to_string();
        event.old_new = if column(row, "OldTrue")? == "1" { "old" } else { "new" }.to_string();
        event.indoor_outdoor = column(row, "IndoorOutdoor")?.to_lowercase();
        event.filename = column(row, "Filename")?.to_lowercase();
        event.buttonbox_side = match old {
            Side::Left => "old | new",
            Side::Right => "new | old",
        }
        .to_string();
        event.fingers_side = if index == "high" {
            "l m h | h m l"
        } else {
            "h m l | l m h"
        }
        .to_string();

        let is_old = event.old_new == "old";
        let left_is_correct = (is_old && old == Side::Left) || (!is_old && old == Side::Right);
        event.correct_key = if left_is_correct { "6/7/8" } else { "1/2/3" }.to_string();
        event.correct_response = event.old_new.clone();
        event.participant_response_rt = or_na(column(row, RETRIEVAL_RT)?);
        event.participant_response_key = response_key(keys);

        score_retrieval(&mut event, old, index);

        if study.is_recoded_as_new(participant, &event.filename) {
            rescore_as_new(&mut event);
        }

        coded.push(event);
    }

    log::debug!("Coded {} retrieval trials", coded.len());
    Ok(coded)
}

fn score_retrieval(event: &mut EventRow, old: Side, index: &str) {
    let key = event.participant_response_key.as_str();
    if key == NA {
        event.participant_response_scored = "incorrect".to_string();
        return;
    }

    let correct = event.correct_key.contains(key);
    let judged_old = (old == Side::Left && ["6", "7", "8"].contains(&key))
        || (old == Side::Right && ["1", "2", "3"].contains(&key));
    let judgment = if judged_old { "old" } else { "new" };

    let is_old = event.old_new == "old";
    let response_type = match (correct, is_old) {
        (true, true) => "hit",
        (true, false) => "cr",
        (false, true) => "miss",
        (false, false) => "fa",
    };

    let conf = match key {
        "2" | "7" => "mod",
        "1" | "6" => index,
        _ if index == "high" => "low",
        _ => "high",
    };

    event.participant_response = format!("{}-{}", judgment, conf);
    event.participant_response_scored = if correct { "correct" } else { "incorrect" }.to_string();
    event.participant_response_judgment = judgment.to_string();
    event.participant_response_conf = conf.to_string();
    event.participant_response_type = response_type.to_string();
    event.participant_response_type_conf = format!("{}-{}", response_type, conf);
}

/// Score an item the participant never studied as a new item.
fn rescore_as_new(event: &mut EventRow) {
    event.encoding_block = NA.to_string();
    event.old_new = "new".to_string();
    event.correct_response = "new".to_string();

    let response = event.participant_response.clone();
    let (scored, judgment, response_type) = if response.contains("new") {
        ("correct", "new", "cr")
    } else if response.contains("old") {
        ("incorrect", "old", "fa")
    } else {
        (NA, NA, NA)
    };
    let conf = ["high", "mod", "low"]
        .into_iter()
        .find(|c| response.contains(c))
        .unwrap_or(NA);

    event.participant_response_scored = scored.to_string();
    event.participant_response_judgment = judgment.to_string();
    event.participant_response_type = response_type.to_string();
    event.participant_response_conf = conf.to_string();
    event.participant_response_type_conf = if scored == NA {
        NA.to_string()
    } else {
        format!("{}-{}", response_type, conf)
    };
}
