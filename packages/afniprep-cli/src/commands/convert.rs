use crate::cli::ConvertArgs;
use crate::exit_codes;
use crate::output;
use crate::params;
use afniprep_rs::bids::{convert_dicoms, reorganize_nifti, session_paths, ReorganizeReport, ReorganizeRequest};
use afniprep_rs::{SystemRunner, Tool};
use serde::Serialize;

#[derive(Serialize)]
struct ConvertOutput {
    participant: String,
    session: Option<u32>,
    reorganized: Option<ReorganizeReport>,
}

pub async fn execute(args: ConvertArgs) -> i32 {
    let root = match params::bids_root(&args.ids) {
        Ok(r) => r,
        Err(msg) => {
            eprintln!("Error: {}", msg);
            return exit_codes::INPUT_ERROR;
        }
    };
    if args.task_code.trim().is_empty() {
        eprintln!("Error: --task-code must not be empty");
        return exit_codes::INPUT_ERROR;
    }

    let participant = params::participant(&args.ids);
    let paths = session_paths(&root, &participant, args.session);
    if !paths.dicom().is_dir() {
        eprintln!(
            "Error: DICOM folder not found: {} (run `afniprep setup` and `afniprep download` first)",
            paths.dicom().display()
        );
        return exit_codes::INPUT_ERROR;
    }

    let toolbox = match params::require_tools(&args.tools, &[Tool::Dcm2niix]) {
        Ok(t) => t,
        Err(msg) => {
            eprintln!("Error: {}", msg);
            return exit_codes::TOOL_NOT_FOUND;
        }
    };

    if !args.report.quiet {
        eprintln!("Converting DICOMs for {}...", participant.label());
    }
    let runner = SystemRunner::new();
    if let Err(e) = convert_dicoms(&runner, &toolbox, &paths.dicom(), &paths.nifti()).await {
        return params::fail(e);
    }

    let reorganized = if args.no_reorganize {
        None
    } else {
        let request = ReorganizeRequest {
            participant: participant.clone(),
            paths: paths.clone(),
            task_code: args.task_code.clone(),
        };
        match reorganize_nifti(&request) {
            Ok(report) => Some(report),
            Err(e) => return params::fail(e),
        }
    };

    let result = ConvertOutput {
        participant: participant.label(),
        session: args.session,
        reorganized,
    };
    if args.report.wants_json() {
        return output::emit_json(&result, &args.report);
    }
    if !args.report.quiet {
        if let Some(ref report) = result.reorganized {
            for (from, to) in &report.renamed {
                eprintln!("  {} -> {}", from, to);
            }
            for warning in &report.warnings {
                eprintln!("Warning: {}", warning);
            }
            eprintln!(
                "{}: {} file(s) renamed, tasks: {}",
                result.participant,
                report.renamed.len(),
                report.task_labels.join(", ")
            );
        } else {
            eprintln!("NIfTI files written to {}", paths.nifti().display());
        }
    }
    exit_codes::SUCCESS
}
