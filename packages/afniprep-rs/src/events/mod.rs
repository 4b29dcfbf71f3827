//! Behavioral coding into BIDS `*_events.tsv` files.

pub mod coding;
pub mod generate;
pub mod psychopy;
pub mod subsequent;
pub mod tsv;

use serde::{Deserialize, Serialize};

pub use coding::{code_encoding, code_retrieval};
pub use generate::{generate_event_files, EventsReport, EventsRequest};
pub use psychopy::{parse_log, trial_onsets, LogEntry};
pub use subsequent::fill_subsequent_memory;
pub use tsv::{read_events, write_events};

/// Missing-value marker required by BIDS
pub const NA: &str = "n/a";

/// Placeholder for encoding columns filled once retrieval is coded
pub const PENDING: &str = "?";

/// One trial of a BIDS events file; field order is the column order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRow {
    #[serde(serialize_with = "tsv::serialize_onset")]
    pub onset: f64,
    pub duration: String,
    pub trial_type: String,
    pub encoding_block: String,
    pub retrieval_block: String,
    pub old_new: String,
    pub indoor_outdoor: String,
    pub filename: String,
    pub buttonbox_side: String,
    pub fingers_side: String,
    pub correct_key: String,
    pub correct_response: String,
    pub participant_response_rt: String,
    pub participant_response_key: String,
    pub participant_response: String,
    pub participant_response_scored: String,
    pub participant_response_judgment: String,
    pub participant_response_conf: String,
    pub participant_response_type: String,
    pub participant_response_type_conf: String,
    pub participant_subsequent_judgment: String,
    pub participant_subsequent_conf: String,
    pub participant_subsequent_type: String,
    pub participant_subsequent_type_conf: String,
}

impl EventRow {
    /// A row with every optional column set to `n/a`
    pub fn blank(onset: f64, duration: &str, trial_type: &str) -> Self {
        let na = || NA.to_string();
        Self {
            onset,
            duration: duration.to_string(),
            trial_type: trial_type.to_string(),
            encoding_block: na(),
            retrieval_block: na(),
            old_new: na(),
            indoor_outdoor: na(),
            filename: na(),
            buttonbox_side: na(),
            fingers_side: na(),
            correct_key: na(),
            correct_response: na(),
            participant_response_rt: na(),
            participant_response_key: na(),
            participant_response: na(),
            participant_response_scored: na(),
            participant_response_judgment: na(),
            participant_response_conf: na(),
            participant_response_type: na(),
            participant_response_type_conf: na(),
            participant_subsequent_judgment: na(),
            participant_subsequent_conf: na(),
            participant_subsequent_type: na(),
            participant_subsequent_type_conf: na(),
        }
    }

    pub fn clear_subsequent(&mut self, value: &str) {
        self.participant_subsequent_judgment = value.to_string();
        self.participant_subsequent_conf = value.to_string();
        self.participant_subsequent_type = value.to_string();
        self.participant_subsequent_type_conf = value.to_string();
    }
}
