use serde::Serializer;
use std::collections::HashMap;
use std::path::Path;

use super::EventRow;
use crate::error::Result;
use crate::report::float_repr;

pub(crate) fn serialize_onset<S: Serializer>(onset: &f64, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_str(&float_repr(*onset))
}

/// Write events with a header row, tab-separated, columns in `EventRow` order.
pub fn write_events(path: &Path, rows: &[EventRow]) -> Result<()> {
    let mut writer = csv::WriterBuilder::new().delimiter(b'\t').from_path(path)?;
    if rows.is_empty() {
        // serde only emits the header alongside the first record
        writer.write_record(COLUMNS)?;
    }
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

pub fn read_events(path: &Path) -> Result<Vec<EventRow>> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .trim(csv::Trim::All)
        .from_path(path)?;
    let mut rows = Vec::new();
    for record in reader.deserialize() {
        rows.push(record?);
    }
    Ok(rows)
}

/// Read a comma-separated behavioral export as header → value maps, one per row.
pub fn read_behavioral_csv(path: &Path) -> Result<Vec<HashMap<String, String>>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_path(path)?;
    let mut rows = Vec::new();
    for record in reader.deserialize() {
        rows.push(record?);
    }
    Ok(rows)
}

pub const COLUMNS: [&str; 24] = [
    "onset",
    "duration",
    "trial_type",
    "encoding_block",
    "retrieval_block",
    "old_new",
    "indoor_outdoor",
    "filename",
    "buttonbox_side",
    "fingers_side",
    "correct_key",
    "correct_response",
    "participant_response_rt",
    "participant_response_key",
    "participant_response",
    "participant_response_scored",
    "participant_response_judgment",
    "participant_response_conf",
    "participant_response_type",
    "participant_response_type_conf",
    "participant_subsequent_judgment",
    "participant_subsequent_conf",
    "participant_subsequent_type",
    "participant_subsequent_type_conf",
];
