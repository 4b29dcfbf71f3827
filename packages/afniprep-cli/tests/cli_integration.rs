use afniprep_rs::events::{write_events, EventRow};
use assert_cmd::Command;
use predicates::prelude::*;
use std::path::Path;

fn afniprep() -> Command {
    let mut cmd = Command::cargo_bin("afniprep").unwrap();
    // keep tool discovery independent of the host environment
    cmd.env_remove("AFNI_HOME")
        .env_remove("DCM2NIIX_PATH")
        .env_remove("WORKBENCH_DIR")
        .env_remove("AFNIPREP_SURFACE_DIR");
    cmd
}

fn stdout_json(output: &assert_cmd::assert::Assert) -> serde_json::Value {
    let stdout = String::from_utf8(output.get_output().stdout.clone()).unwrap();
    serde_json::from_str(&stdout).unwrap()
}

fn glm_fixture(root: &Path, id: &str, glm: &str, files: &[&str]) {
    let dir = root
        .join(format!("subj.{}", id))
        .join(format!("{}.results", id))
        .join(glm);
    std::fs::create_dir_all(&dir).unwrap();
    for f in files {
        std::fs::write(dir.join(f), "").unwrap();
    }
}

// =============================================================================
// GENERAL
// =============================================================================

#[test]
fn test_no_args_shows_help() {
    afniprep()
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage:"));
}

#[test]
fn test_version_flag() {
    afniprep()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("afniprep"));
}

#[test]
fn test_help_lists_subcommands() {
    afniprep()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("roi-trials"))
        .stdout(predicate::str::contains("vol2surf"))
        .stdout(predicate::str::contains("timing"));
}

// =============================================================================
// INFO SUBCOMMAND
// =============================================================================

#[test]
fn test_info_subcommand() {
    afniprep()
        .arg("info")
        .assert()
        .success()
        .stdout(predicate::str::contains("afniprep CLI v"))
        .stdout(predicate::str::contains("3dmaskave"))
        .stdout(predicate::str::contains("wb_command"));
}

#[test]
fn test_info_json() {
    let output = afniprep().arg("info").arg("--json").assert().success();

    let parsed = stdout_json(&output);
    assert!(parsed.get("cli_version").is_some());
    assert!(parsed.get("platform").is_some());
    let tools = parsed.get("tools").unwrap().as_array().unwrap();
    assert_eq!(tools.len(), 17);
    assert!(tools
        .iter()
        .all(|t| t.get("found").unwrap().is_boolean()));
}

// =============================================================================
// SETUP SUBCOMMAND
// =============================================================================

#[test]
fn test_setup_creates_session_folders() {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path().to_str().unwrap();

    let output = afniprep()
        .args(["setup", "--bids-root", root, "--participant", "7", "--prefix", "erwd"])
        .args(["--sessions", "1", "2", "--json"])
        .assert()
        .success();

    let parsed = stdout_json(&output);
    assert_eq!(parsed["participant"], "sub-erwd007");
    assert_eq!(parsed["created"].as_array().unwrap().len(), 14);
    assert!(tmp.path().join("sub-erwd007/ses-02/func").is_dir());
    assert!(tmp.path().join("sub-erwd007/AFNI_timing_files").is_dir());

    // second run creates nothing
    let output = afniprep()
        .args(["setup", "--bids-root", root, "--participant", "7", "--prefix", "erwd"])
        .args(["--sessions", "1", "2", "--json"])
        .assert()
        .success();
    assert!(stdout_json(&output)["created"].as_array().unwrap().is_empty());
}

#[test]
fn test_setup_missing_root() {
    afniprep()
        .args(["setup", "--bids-root", "/nonexistent/bids", "--participant", "1"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("BIDS root not found"));
}

// =============================================================================
// TIMING SUBCOMMAND
// =============================================================================

#[test]
fn test_timing_writes_onset_files() {
    let tmp = tempfile::tempdir().unwrap();
    let func = tmp.path().join("sub-erwd001").join("func");
    std::fs::create_dir_all(&func).unwrap();

    let mut hit = EventRow::blank(12.5, "0.5", "encoding");
    hit.participant_subsequent_type = "hit".to_string();
    hit.participant_response_rt = "0.8123".to_string();
    let miss = {
        let mut row = EventRow::blank(20.0, "0.5", "encoding");
        row.participant_subsequent_type = "miss".to_string();
        row
    };
    write_events(
        &func.join("sub-erwd001_task-encoding1_events.tsv"),
        &[hit, miss],
    )
    .unwrap();

    let output = afniprep()
        .args(["timing", "--bids-root", tmp.path().to_str().unwrap()])
        .args(["--participant", "1", "--prefix", "erwd", "--json"])
        .assert()
        .success();
    let parsed = stdout_json(&output);
    assert_eq!(parsed["files_written"], 650);
    assert_eq!(parsed["runs"][0], "encoding1");

    let onsets = tmp.path().join("sub-erwd001").join("AFNI_timing_files");
    let hit_rt = std::fs::read_to_string(onsets.join("sub-erwd001_encoding_short1_hit_allconf_rt.txt")).unwrap();
    assert_eq!(hit_rt.trim(), "12.5*0.8123");
    let retrieval =
        std::fs::read_to_string(onsets.join("sub-erwd001_retrieval_allruns_allevents_allconf_nort.txt")).unwrap();
    assert_eq!(retrieval.trim(), "*");
}

#[test]
fn test_timing_without_events_files() {
    let tmp = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(tmp.path().join("sub-002").join("func")).unwrap();

    afniprep()
        .args(["timing", "--bids-root", tmp.path().to_str().unwrap(), "--participant", "2"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("no events files"));
}

// =============================================================================
// ROI / GLMS SUBCOMMANDS
// =============================================================================

#[test]
fn test_roi_requires_folders_without_presets() {
    let tmp = tempfile::tempdir().unwrap();
    let presets = tmp.path().join("presets.json");

    afniprep()
        .args(["roi", "--presets", presets.to_str().unwrap()])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("--subject-results and --masks are required"));
}

#[test]
fn test_roi_rejects_unknown_coord_system() {
    let tmp = tempfile::tempdir().unwrap();
    let presets = tmp.path().join("presets.json");

    afniprep()
        .args(["roi", "--presets", presets.to_str().unwrap(), "--coord-system", "RAS"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("expected LPI or RAI"));
}

#[test]
fn test_roi_reports_missing_tools() {
    let tmp = tempfile::tempdir().unwrap();
    let results = tmp.path().join("subject_results");
    let masks = tmp.path().join("masks");
    std::fs::create_dir_all(&results).unwrap();
    std::fs::create_dir_all(&masks).unwrap();

    afniprep()
        .args(["roi", "--presets", tmp.path().join("p.json").to_str().unwrap()])
        .args(["--subject-results", results.to_str().unwrap()])
        .args(["--masks", masks.to_str().unwrap()])
        .args(["--afni-dir", "/nonexistent/abin"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("3dmaskave"));
}

#[test]
fn test_glms_lists_gam_and_tent() {
    let tmp = tempfile::tempdir().unwrap();
    glm_fixture(tmp.path(), "101", "GLM_gam", &["stats.101+tlrc.HEAD"]);
    glm_fixture(
        tmp.path(),
        "102",
        "GLM_tent",
        &["stats.102+tlrc.HEAD", "iresp.hit.102+tlrc.HEAD"],
    );

    let output = afniprep()
        .args(["glms", "--subject-results", tmp.path().to_str().unwrap(), "--json"])
        .assert()
        .success();
    let parsed = stdout_json(&output);
    assert_eq!(parsed["subjects"], serde_json::json!(["101", "102"]));
    let glms = parsed["glms"].as_array().unwrap();
    assert_eq!(glms.len(), 2);
    assert_eq!(glms[0]["glm"], "GLM_gam");
    assert_eq!(glms[0]["measure"], "magnitudes");
    assert_eq!(glms[1]["glm"], "GLM_tent");
    assert!(glms[1].get("conditions").is_none());

    afniprep()
        .args(["glms", "--subject-results", tmp.path().to_str().unwrap()])
        .args(["--measure", "timecourses"])
        .assert()
        .success()
        .stdout(predicate::str::contains("GLM_tent"))
        .stdout(predicate::str::contains("GLM_gam").not());
}

#[test]
fn test_glms_without_subjects() {
    let tmp = tempfile::tempdir().unwrap();
    afniprep()
        .args(["glms", "--subject-results", tmp.path().to_str().unwrap()])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("No subject folders"));
}

// =============================================================================
// CLUSTER / VOL2SURF SUBCOMMANDS
// =============================================================================

#[test]
fn test_cluster_missing_dataset() {
    let tmp = tempfile::tempdir().unwrap();
    afniprep()
        .args(["cluster", "--input", tmp.path().join("stats+tlrc.HEAD").to_str().unwrap()])
        .args(["--surface-dir", tmp.path().to_str().unwrap(), "--p", "0.01"])
        .assert()
        .code(2);
}

#[test]
fn test_cluster_rejects_bad_nn() {
    let tmp = tempfile::tempdir().unwrap();
    std::fs::write(tmp.path().join("stats+tlrc.HEAD"), "").unwrap();
    afniprep()
        .args(["cluster", "--input", tmp.path().join("stats+tlrc.HEAD").to_str().unwrap()])
        .args(["--surface-dir", tmp.path().to_str().unwrap(), "--p", "0.01", "--nn", "4"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("NN must be 1, 2 or 3"));
}

#[test]
fn test_vol2surf_unknown_format() {
    let tmp = tempfile::tempdir().unwrap();
    let volume = tmp.path().join("map.mgz");
    std::fs::write(&volume, "").unwrap();
    afniprep()
        .args(["vol2surf", "--input", volume.to_str().unwrap()])
        .args(["--surface-dir", tmp.path().to_str().unwrap()])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("expected .nii"));
}

#[test]
fn test_vol2surf_missing_workbench() {
    let tmp = tempfile::tempdir().unwrap();
    let volume = tmp.path().join("map.nii.gz");
    std::fs::write(&volume, "").unwrap();
    afniprep()
        .args(["vol2surf", "--input", volume.to_str().unwrap()])
        .args(["--surface-dir", tmp.path().to_str().unwrap()])
        .args(["--workbench-dir", "/nonexistent/workbench"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("wb_command"));
}
