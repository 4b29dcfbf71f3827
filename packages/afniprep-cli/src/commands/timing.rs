use crate::cli::TimingArgs;
use crate::exit_codes;
use crate::output;
use crate::params;
use afniprep_rs::timing::{create_timing_files, TimingRequest};
use std::path::PathBuf;

pub fn execute(args: TimingArgs) -> i32 {
    let root = match params::bids_root(&args.ids) {
        Ok(r) => r,
        Err(msg) => {
            eprintln!("Error: {}", msg);
            return exit_codes::INPUT_ERROR;
        }
    };
    let study = match params::load_study(&args.study) {
        Ok(s) => s,
        Err(msg) => {
            eprintln!("Error: {}", msg);
            return exit_codes::INPUT_ERROR;
        }
    };
    if study.tr_seconds().is_none() {
        eprintln!("Error: Study TR '{}' is not a number", study.tr);
        return exit_codes::INPUT_ERROR;
    }

    let request = TimingRequest {
        bids_root: root,
        participant: params::participant(&args.ids),
        sessions: args.sessions.clone(),
        onsets_dir: args.onsets_dir.as_ref().map(PathBuf::from),
        study,
    };
    let report = match create_timing_files(&request) {
        Ok(r) => r,
        Err(e) => return params::fail(e),
    };

    if args.report.wants_json() {
        return output::emit_json(&report, &args.report);
    }
    if !args.report.quiet {
        eprintln!(
            "{}: {} timing file(s) from {} run(s) in {}",
            request.participant.label(),
            report.files_written,
            report.runs.len(),
            report.onsets_dir.display()
        );
    }
    exit_codes::SUCCESS
}
