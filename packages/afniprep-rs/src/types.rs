use serde::{Deserialize, Serialize};
use std::fmt;

/// A study participant, e.g. prefix `erwd` and number `7` → `sub-erwd007`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Participant {
    pub prefix: String,
    pub number: u32,
}

impl Participant {
    pub fn new(prefix: impl Into<String>, number: u32) -> Self {
        Self {
            prefix: prefix.into(),
            number,
        }
    }

    /// Zero-padded participant number (`"007"`)
    pub fn zero_padded(&self) -> String {
        format!("{:03}", self.number)
    }

    /// BIDS subject label (`"sub-erwd007"`)
    pub fn label(&self) -> String {
        format!("sub-{}{}", self.prefix, self.zero_padded())
    }
}

impl fmt::Display for Participant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Session folder name (`"ses-01"`)
pub fn session_label(session: u32) -> String {
    format!("ses-0{}", session)
}

/// Session fragment used inside BIDS file names; empty for single-session studies.
pub fn session_fragment(session: Option<u32>) -> String {
    match session {
        Some(n) => format!("_{}", session_label(n)),
        None => String::new(),
    }
}

/// Extract the task label from a BIDS file name (`sub-x_task-encoding1_bold.nii.gz` → `encoding1`).
pub fn task_from_filename(name: &str) -> Option<&str> {
    name.split('_').find_map(|part| part.strip_prefix("task-"))
}

/// AFNI coordinate order of ROI centres
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CoordSystem {
    #[serde(rename = "LPI")]
    Lpi,
    #[serde(rename = "RAI")]
    Rai,
}

impl CoordSystem {
    pub fn as_str(&self) -> &'static str {
        match self {
            CoordSystem::Lpi => "LPI",
            CoordSystem::Rai => "RAI",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "LPI" => Some(Self::Lpi),
            "RAI" => Some(Self::Rai),
            _ => None,
        }
    }
}

impl fmt::Display for CoordSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_participant_labels() {
        let p = Participant::new("erwd", 7);
        assert_eq!(p.zero_padded(), "007");
        assert_eq!(p.label(), "sub-erwd007");
        assert_eq!(Participant::new("", 125).label(), "sub-125");
    }

    #[test]
    fn test_session_fragment() {
        assert_eq!(session_fragment(Some(2)), "_ses-02");
        assert_eq!(session_fragment(None), "");
    }

    #[test]
    fn test_task_from_filename() {
        assert_eq!(
            task_from_filename("sub-erwd001_ses-01_task-retrieval1a_events.tsv"),
            Some("retrieval1a")
        );
        assert_eq!(task_from_filename("sub-erwd001_T1w.nii.gz"), None);
    }

    #[test]
    fn test_coord_system_parse() {
        assert_eq!(CoordSystem::from_str("lpi"), Some(CoordSystem::Lpi));
        assert_eq!(CoordSystem::from_str("RAI"), Some(CoordSystem::Rai));
        assert_eq!(CoordSystem::from_str("RAS"), None);
    }
}
