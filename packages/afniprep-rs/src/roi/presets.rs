use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::types::CoordSystem;

/// Remembered ROI inputs, so repeat runs need fewer flags
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoiPresets {
    pub subject_results_path: Option<PathBuf>,
    pub masks_path: Option<PathBuf>,
    pub coord_system: Option<CoordSystem>,
    pub sphere_radius: Option<u32>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl RoiPresets {
    /// `<config dir>/afniprep/roi_presets.json`
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("afniprep")
            .join("roi_presets.json")
    }

    /// Load presets; a missing file gives empty presets.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn save(&mut self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        self.updated_at = Some(Utc::now());
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        log::debug!("Saved ROI presets to {}", path.display());
        Ok(())
    }

    /// Values from `overrides` win; anything they leave unset falls back to `self`.
    pub fn merge(&self, overrides: &RoiPresets) -> RoiPresets {
        RoiPresets {
            subject_results_path: overrides
                .subject_results_path
                .clone()
                .or_else(|| self.subject_results_path.clone()),
            masks_path: overrides.masks_path.clone().or_else(|| self.masks_path.clone()),
            coord_system: overrides.coord_system.or(self.coord_system),
            sphere_radius: overrides.sphere_radius.or(self.sphere_radius),
            updated_at: self.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_load_merge() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nested").join("roi_presets.json");
        assert_eq!(RoiPresets::load(&path).unwrap(), RoiPresets::default());

        let mut saved = RoiPresets {
            subject_results_path: Some(PathBuf::from("/data/subject_results")),
            masks_path: Some(PathBuf::from("/data/masks")),
            coord_system: Some(CoordSystem::Rai),
            sphere_radius: Some(6),
            updated_at: None,
        };
        saved.save(&path).unwrap();
        let loaded = RoiPresets::load(&path).unwrap();
        assert_eq!(loaded.sphere_radius, Some(6));
        assert!(loaded.updated_at.is_some());

        let flags = RoiPresets {
            sphere_radius: Some(4),
            ..Default::default()
        };
        let merged = loaded.merge(&flags);
        assert_eq!(merged.sphere_radius, Some(4));
        assert_eq!(merged.coord_system, Some(CoordSystem::Rai));
        assert_eq!(merged.masks_path, Some(PathBuf::from("/data/masks")));
    }
}
