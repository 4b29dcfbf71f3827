use super::{EventRow, NA};
use crate::study::StudyProfile;
use crate::types::Participant;

/// Copy each item's retrieval outcome into the encoding row that studied it.
///
/// Items matched by filename; when an item appears more than once across `retrievals`
/// the last occurrence wins. Items omitted for the participant are set to `n/a`.
/// Returns the number of encoding rows that found a match.
pub fn fill_subsequent_memory(
    encoding: &mut [EventRow],
    retrievals: &[EventRow],
    participant: &Participant,
    study: &StudyProfile,
) -> usize {
    let mut matched = 0;
    for row in encoding.iter_mut() {
        if let Some(later) = retrievals.iter().rev().find(|r| r.filename == row.filename) {
            row.participant_subsequent_judgment = later.participant_response_judgment.clone();
            row.participant_subsequent_conf = later.participant_response_conf.clone();
            row.participant_subsequent_type = later.participant_response_type.clone();
            row.participant_subsequent_type_conf = later.participant_response_type_conf.clone();
            matched += 1;
        }
        if study.is_omitted(participant, &row.filename) {
            row.clear_subsequent(NA);
        }
    }
    matched
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::PENDING;

    fn encoding(file: &str) -> EventRow {
        let mut row = EventRow::blank(0.0, "0.5", "encoding");
        row.filename = file.to_string();
        row.clear_subsequent(PENDING);
        row
    }

    fn retrieval(file: &str, type_conf: &str) -> EventRow {
        let mut row = EventRow::blank(0.0, "1.9", "retrieval");
        row.filename = file.to_string();
        let (t, c) = type_conf.split_once('-').unwrap();
        row.participant_response_judgment = if t == "hit" { "old" } else { "new" }.to_string();
        row.participant_response_type = t.to_string();
        row.participant_response_conf = c.to_string();
        row.participant_response_type_conf = type_conf.to_string();
        row
    }

    #[test]
    fn test_fill_and_omit() {
        let study = StudyProfile::default();
        let p = Participant::new("erwd", 14);
        let mut enc = vec![
            encoding("indoor_ballroom.jpg"),
            encoding("outdoor_cebu_tops.jpg"),
            encoding("outdoor_dam.jpg"),
        ];
        let ret = vec![
            retrieval("indoor_ballroom.jpg", "hit-high"),
            retrieval("outdoor_cebu_tops.jpg", "miss-low"),
        ];

        let matched = fill_subsequent_memory(&mut enc, &ret, &p, &study);

        assert_eq!(matched, 2);
        assert_eq!(enc[0].participant_subsequent_type_conf, "hit-high");
        assert_eq!(enc[0].participant_subsequent_judgment, "old");
        assert_eq!(enc[1].participant_subsequent_type, NA);
        // unmatched rows keep the placeholder
        assert_eq!(enc[2].participant_subsequent_type, PENDING);
    }
}
