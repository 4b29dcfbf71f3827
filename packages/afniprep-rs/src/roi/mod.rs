//! ROI magnitude and timecourse extraction from first-level GLM outputs.
//!
//! Expected layout (as written by afni_proc.py):
//! `subject_results/subj.<ID>/<ID>.results/<GLM>/{stats*,iresp*}`.

pub mod aggregate;
pub mod conditions;
pub mod coords;
pub mod discovery;
pub mod extract;
pub mod pipeline;
pub mod presets;
pub mod sources;
pub mod trials;

use serde::{Deserialize, Serialize};
use std::fmt;

pub use aggregate::{aggregate, write_master_csv, AverageFile, RoiKey, RoiSummary};
pub use conditions::{parse_coef_labels, select_unique, shorten_conditions};
pub use coords::{normalize_coordinate_file, parse_coordinate, Coordinate};
pub use discovery::{list_glms, list_subjects, GlmKind, SubjectDir};
pub use pipeline::{run_roi_analysis, RoiReport, RoiRequest};
pub use presets::RoiPresets;
pub use sources::{discover_rois, RoiSource};
pub use trials::{extract_trial_magnitudes, TrialsReport, TrialsRequest};

/// How the ROI is defined
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoiMethod {
    /// Sphere drawn around a coordinate
    Spherical,
    /// AFNI mask dataset
    PredefinedMask,
}

/// What is averaged inside the ROI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Measure {
    /// One GAM coefficient per condition
    Magnitudes,
    /// TENT impulse response per condition
    Timecourses,
}

impl RoiMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoiMethod::Spherical => "spherical",
            RoiMethod::PredefinedMask => "predefined_mask",
        }
    }
}

impl Measure {
    pub fn as_str(&self) -> &'static str {
        match self {
            Measure::Magnitudes => "magnitudes",
            Measure::Timecourses => "timecourses",
        }
    }

    /// Prefix of the datasets the measure is read from
    pub fn dataset_prefix(&self) -> &'static str {
        match self {
            Measure::Magnitudes => "stats",
            Measure::Timecourses => "iresp",
        }
    }

    pub fn glm_kind(&self) -> GlmKind {
        match self {
            Measure::Magnitudes => GlmKind::Gam,
            Measure::Timecourses => GlmKind::Tent,
        }
    }
}

/// One ROI analysis: a method paired with a measure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Analysis {
    pub method: RoiMethod,
    pub measure: Measure,
}

impl Analysis {
    pub const ALL: [Analysis; 4] = [
        Analysis {
            method: RoiMethod::Spherical,
            measure: Measure::Magnitudes,
        },
        Analysis {
            method: RoiMethod::Spherical,
            measure: Measure::Timecourses,
        },
        Analysis {
            method: RoiMethod::PredefinedMask,
            measure: Measure::Magnitudes,
        },
        Analysis {
            method: RoiMethod::PredefinedMask,
            measure: Measure::Timecourses,
        },
    ];

    /// Per-GLM folder holding each subject's ROI averages
    pub fn averages_folder(&self) -> String {
        format!("{}_ROI_averages_{}", self.method.as_str(), self.measure.as_str())
    }

    /// Study-level output folder under `subject_results`
    pub fn output_folder(&self) -> String {
        format!("Average_{}_ROI_{}", self.method.as_str(), self.measure.as_str())
    }
}

impl fmt::Display for Analysis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ROI {}", self.method.as_str(), self.measure.as_str())
    }
}
