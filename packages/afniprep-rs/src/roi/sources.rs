use serde::Serialize;
use std::path::{Path, PathBuf};

use super::RoiMethod;
use crate::error::{AfniPrepError, Result};

const MASK_SUFFIX: &str = "+tlrc.HEAD";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum RoiSource {
    Sphere { name: String, coordinate_file: PathBuf },
    /// `head_path` points at the `+tlrc.HEAD` half of the dataset
    Mask { name: String, head_path: PathBuf },
}

impl RoiSource {
    pub fn name(&self) -> &str {
        match self {
            RoiSource::Sphere { name, .. } | RoiSource::Mask { name, .. } => name,
        }
    }

    /// Dataset name AFNI accepts for a mask (`…/amygdala+tlrc`)
    pub fn mask_dataset(&self) -> Option<String> {
        match self {
            RoiSource::Mask { head_path, .. } => {
                let text = head_path.display().to_string();
                text.strip_suffix(".HEAD").map(|s| s.to_string())
            }
            RoiSource::Sphere { .. } => None,
        }
    }
}

/// Find ROIs for `method` in the masks folder: `*.txt` coordinate files or `*+tlrc.HEAD` masks.
///
/// File names with spaces are rejected, since AFNI commands split on them.
pub fn discover_rois(masks_dir: &Path, method: RoiMethod) -> Result<Vec<RoiSource>> {
    if !masks_dir.is_dir() {
        return Err(AfniPrepError::FileNotFound(masks_dir.display().to_string()));
    }

    let mut rois = Vec::new();
    for entry in std::fs::read_dir(masks_dir)? {
        let path = entry?.path();
        let Some(file_name) = path.file_name().map(|n| n.to_string_lossy().to_string()) else {
            continue;
        };
        if file_name.starts_with('.') {
            continue;
        }

        let source = match method {
            RoiMethod::Spherical => file_name.strip_suffix(".txt").map(|name| RoiSource::Sphere {
                name: name.to_string(),
                coordinate_file: path.clone(),
            }),
            RoiMethod::PredefinedMask => file_name.strip_suffix(MASK_SUFFIX).map(|name| RoiSource::Mask {
                name: name.to_string(),
                head_path: path.clone(),
            }),
        };

        if let Some(source) = source {
            if file_name.contains(' ') {
                return Err(AfniPrepError::InvalidParameter(format!(
                    "ROI file names may not contain spaces: '{}'",
                    file_name
                )));
            }
            rois.push(source);
        }
    }

    rois.sort_by(|a, b| a.name().cmp(b.name()));
    log::debug!("{} {} ROI(s) in {}", rois.len(), method.as_str(), masks_dir.display());
    Ok(rois)
}
