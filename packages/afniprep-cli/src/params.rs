use afniprep_rs::{AfniPrepError, Participant, StudyProfile, Suite, Tool, Toolbox};
use chrono::NaiveDate;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::cli::{ParticipantArgs, ToolArgs};
use crate::exit_codes;

/// Resolve every tool, honouring explicit locations given on the command line.
pub fn resolve_toolbox(args: &ToolArgs) -> Toolbox {
    let mut overrides = HashMap::new();
    if let Some(ref dir) = args.afni_dir {
        overrides.insert(Suite::Afni, dir.clone());
    }
    if let Some(ref path) = args.dcm2niix {
        overrides.insert(Suite::Dcm2niix, path.clone());
    }
    if let Some(ref dir) = args.workbench_dir {
        overrides.insert(Suite::Workbench, dir.clone());
    }
    Toolbox::discover(&overrides)
}

/// Resolve the toolbox and check that `tools` are all present.
pub fn require_tools(args: &ToolArgs, tools: &[Tool]) -> Result<Toolbox, String> {
    let toolbox = resolve_toolbox(args);
    toolbox.ensure(tools).map_err(|e| e.to_string())?;
    Ok(toolbox)
}

/// Exit code for a library error
pub fn exit_code(err: &AfniPrepError) -> i32 {
    match err {
        AfniPrepError::ToolNotFound(_) => exit_codes::TOOL_NOT_FOUND,
        AfniPrepError::FileNotFound(_) | AfniPrepError::InvalidParameter(_) => exit_codes::INPUT_ERROR,
        _ => exit_codes::EXECUTION_ERROR,
    }
}

/// Print a library error and map it to an exit code.
pub fn fail(err: AfniPrepError) -> i32 {
    eprintln!("Error: {}", err);
    exit_code(&err)
}

pub fn participant(args: &ParticipantArgs) -> Participant {
    Participant::new(args.prefix.clone(), args.participant)
}

/// Validate that the BIDS root exists.
pub fn bids_root(args: &ParticipantArgs) -> Result<PathBuf, String> {
    existing_dir(&args.bids_root, "BIDS root")
}

pub fn existing_dir(path: &str, what: &str) -> Result<PathBuf, String> {
    let p = Path::new(path);
    if !p.is_dir() {
        return Err(format!("{} not found: {}", what, path));
    }
    Ok(p.to_path_buf())
}

/// Built-in study profile, or the one in `path`.
pub fn load_study(path: &Option<String>) -> Result<StudyProfile, String> {
    match path {
        Some(p) => StudyProfile::load(Path::new(p))
            .map_err(|e| format!("Failed to load study profile '{}': {}", p, e)),
        None => Ok(StudyProfile::default()),
    }
}

/// Parse a scan date given as YYYY-MM-DD.
pub fn parse_date(s: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .map_err(|_| format!("Invalid date '{}': expected YYYY-MM-DD", s))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_date() {
        assert_eq!(
            parse_date("2023-04-09").unwrap(),
            NaiveDate::from_ymd_opt(2023, 4, 9).unwrap()
        );
        assert!(parse_date("04/09/23").is_err());
        assert!(parse_date("2023-13-01").is_err());
    }

    #[test]
    fn test_exit_code_mapping() {
        assert_eq!(
            exit_code(&AfniPrepError::ToolNotFound("3dinfo".into())),
            exit_codes::TOOL_NOT_FOUND
        );
        assert_eq!(
            exit_code(&AfniPrepError::InvalidParameter("nn".into())),
            exit_codes::INPUT_ERROR
        );
        assert_eq!(
            exit_code(&AfniPrepError::ExecutionFailed("3dclust".into())),
            exit_codes::EXECUTION_ERROR
        );
    }

    #[test]
    fn test_load_study_default_and_missing_file() {
        assert_eq!(load_study(&None).unwrap().tr, "1.1");
        assert!(load_study(&Some("/nonexistent/study.json".to_string())).is_err());
    }

    #[test]
    fn test_existing_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().display().to_string();
        assert!(existing_dir(&path, "folder").is_ok());
        assert!(existing_dir("/nonexistent/afniprep", "folder").is_err());
    }
}
