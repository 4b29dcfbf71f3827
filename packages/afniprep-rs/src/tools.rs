//! External program registry and discovery.

use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::{AfniPrepError, Result};

/// Environment variable pointing at the AFNI binary directory
pub const AFNI_HOME_ENV_VAR: &str = "AFNI_HOME";

/// Environment variable for an explicit dcm2niix path
pub const DCM2NIIX_ENV_VAR: &str = "DCM2NIIX_PATH";

/// Environment variable for the Workbench binary directory
pub const WORKBENCH_ENV_VAR: &str = "WORKBENCH_DIR";

/// Default search paths (in priority order)
pub const DEFAULT_TOOL_PATHS: &[&str] = &["~/abin", "~/.local/bin", "/usr/local/bin", "/opt/afni"];

/// Software suite a tool belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Suite {
    Afni,
    Dcm2niix,
    Workbench,
    System,
}

/// Every external program the toolkit invokes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Tool {
    Dcm2niix,
    ThreeDInfo,
    ThreeDMaskave,
    ThreeDUndump,
    ThreeDBucket,
    ThreeDClust,
    ThreeDCalc,
    ThreeDAfniToNifti,
    GenSsReviewScripts,
    GenSsReviewTable,
    SnapshotVolreg,
    OneDPlot,
    WbCommand,
    Nifti4dfp,
    Curl,
    Scp,
    Unzip,
}

pub const ALL_TOOLS: &[Tool] = &[
    Tool::Dcm2niix,
    Tool::ThreeDInfo,
    Tool::ThreeDMaskave,
    Tool::ThreeDUndump,
    Tool::ThreeDBucket,
    Tool::ThreeDClust,
    Tool::ThreeDCalc,
    Tool::ThreeDAfniToNifti,
    Tool::GenSsReviewScripts,
    Tool::GenSsReviewTable,
    Tool::SnapshotVolreg,
    Tool::OneDPlot,
    Tool::WbCommand,
    Tool::Nifti4dfp,
    Tool::Curl,
    Tool::Scp,
    Tool::Unzip,
];

impl Tool {
    pub fn program(&self) -> &'static str {
        match self {
            Tool::Dcm2niix => "dcm2niix",
            Tool::ThreeDInfo => "3dinfo",
            Tool::ThreeDMaskave => "3dmaskave",
            Tool::ThreeDUndump => "3dUndump",
            Tool::ThreeDBucket => "3dbucket",
            Tool::ThreeDClust => "3dclust",
            Tool::ThreeDCalc => "3dcalc",
            Tool::ThreeDAfniToNifti => "3dAFNItoNIFTI",
            Tool::GenSsReviewScripts => "gen_ss_review_scripts.py",
            Tool::GenSsReviewTable => "gen_ss_review_table.py",
            Tool::SnapshotVolreg => "@snapshot_volreg",
            Tool::OneDPlot => "1dplot",
            Tool::WbCommand => "wb_command",
            Tool::Nifti4dfp => "nifti_4dfp",
            Tool::Curl => "curl",
            Tool::Scp => "scp",
            Tool::Unzip => "unzip",
        }
    }

    pub fn suite(&self) -> Suite {
        match self {
            Tool::Dcm2niix => Suite::Dcm2niix,
            Tool::WbCommand => Suite::Workbench,
            Tool::Nifti4dfp | Tool::Curl | Tool::Scp | Tool::Unzip => Suite::System,
            _ => Suite::Afni,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Tool::Dcm2niix => "DICOM to NIfTI conversion",
            Tool::ThreeDInfo => "Dataset header queries (labels, orientation, history)",
            Tool::ThreeDMaskave => "Average a dataset over an ROI mask",
            Tool::ThreeDUndump => "Build spherical ROI masks from coordinates",
            Tool::ThreeDBucket => "Concatenate sub-bricks into a bucket dataset",
            Tool::ThreeDClust => "Cluster thresholding and mask export",
            Tool::ThreeDCalc => "Voxelwise arithmetic",
            Tool::ThreeDAfniToNifti => "AFNI to NIfTI conversion",
            Tool::GenSsReviewScripts => "Single-subject review script generation",
            Tool::GenSsReviewTable => "Group review table generation",
            Tool::SnapshotVolreg => "Alignment snapshot images",
            Tool::OneDPlot => "Motion and outlier plots",
            Tool::WbCommand => "Workbench volume-to-surface mapping",
            Tool::Nifti4dfp => "4dfp to NIfTI conversion",
            Tool::Curl => "Archive download",
            Tool::Scp => "Archive backup",
            Tool::Unzip => "Archive extraction",
        }
    }

    /// Per-tool environment variable naming an explicit location, if any.
    ///
    /// `DCM2NIIX_PATH` names the binary itself; the directory variables name the folder.
    fn env_override(&self) -> Option<(&'static str, bool)> {
        match self.suite() {
            Suite::Dcm2niix => Some((DCM2NIIX_ENV_VAR, false)),
            Suite::Workbench => Some((WORKBENCH_ENV_VAR, true)),
            Suite::Afni => Some((AFNI_HOME_ENV_VAR, true)),
            Suite::System => None,
        }
    }
}

fn expand_path(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

fn search_path_env(program: &str) -> Option<PathBuf> {
    let paths = std::env::var_os("PATH")?;
    std::env::split_paths(&paths)
        .map(|dir| dir.join(program))
        .find(|candidate| candidate.is_file())
}

/// Find an external tool.
///
/// Resolution order:
/// 1. Explicit path (file, or directory containing the program)
/// 2. Tool-specific environment variable
/// 3. `$PATH`
/// 4. Default search paths
pub fn find_tool(tool: Tool, explicit_path: Option<&str>) -> Option<PathBuf> {
    let program = tool.program();

    if let Some(path) = explicit_path {
        let p = expand_path(path);
        if p.is_dir() {
            let candidate = p.join(program);
            return candidate.exists().then_some(candidate);
        }
        return p.exists().then_some(p);
    }

    if let Some((var, is_dir)) = tool.env_override() {
        if let Ok(value) = std::env::var(var) {
            let base = expand_path(&value);
            let p = if is_dir { base.join(program) } else { base };
            if p.exists() {
                return Some(p);
            }
        }
    }

    if let Some(p) = search_path_env(program) {
        return Some(p);
    }

    for search_path in DEFAULT_TOOL_PATHS {
        let p = expand_path(search_path).join(program);
        if p.exists() {
            return Some(p);
        }
    }

    None
}

/// Same as `find_tool()` but returns an error if not found.
pub fn require_tool(tool: Tool, explicit_path: Option<&str>) -> Result<PathBuf> {
    find_tool(tool, explicit_path).ok_or_else(|| {
        AfniPrepError::ToolNotFound(format!(
            "'{}' not found on $PATH or in {:?}",
            tool.program(),
            DEFAULT_TOOL_PATHS
        ))
    })
}

/// Resolved program locations for one run.
///
/// Tools without a resolved location are spawned by bare name.
#[derive(Debug, Clone, Default)]
pub struct Toolbox {
    resolved: HashMap<Tool, PathBuf>,
}

impl Toolbox {
    /// Resolve every known tool, using `overrides` for explicit directories per suite.
    pub fn discover(overrides: &HashMap<Suite, String>) -> Self {
        let resolved = ALL_TOOLS
            .iter()
            .filter_map(|&tool| {
                let explicit = overrides.get(&tool.suite()).map(|s| s.as_str());
                find_tool(tool, explicit).map(|p| (tool, p))
            })
            .collect();
        Self { resolved }
    }

    pub fn with_path(mut self, tool: Tool, path: impl AsRef<Path>) -> Self {
        self.resolved.insert(tool, path.as_ref().to_path_buf());
        self
    }

    pub fn program(&self, tool: Tool) -> PathBuf {
        self.resolved
            .get(&tool)
            .cloned()
            .unwrap_or_else(|| PathBuf::from(tool.program()))
    }

    pub fn is_resolved(&self, tool: Tool) -> bool {
        self.resolved.contains_key(&tool)
    }

    /// Error out when any of `tools` could not be located.
    pub fn ensure(&self, tools: &[Tool]) -> Result<()> {
        let missing: Vec<&str> = tools
            .iter()
            .filter(|t| !self.is_resolved(**t))
            .map(|t| t.program())
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(AfniPrepError::ToolNotFound(missing.join(", ")))
        }
    }
}
