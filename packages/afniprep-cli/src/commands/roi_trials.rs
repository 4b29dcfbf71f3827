use crate::cli::RoiTrialsArgs;
use crate::exit_codes;
use crate::output;
use crate::params;
use afniprep_rs::roi::{extract_trial_magnitudes, TrialsRequest};
use afniprep_rs::{SystemRunner, Tool};

const TRIAL_TOOLS: &[Tool] = &[Tool::ThreeDInfo, Tool::ThreeDBucket, Tool::ThreeDMaskave];

pub async fn execute(args: RoiTrialsArgs) -> i32 {
    let subject_results = match params::existing_dir(&args.subject_results, "subject_results folder") {
        Ok(d) => d,
        Err(msg) => {
            eprintln!("Error: {}", msg);
            return exit_codes::INPUT_ERROR;
        }
    };
    let masks_dir = match params::existing_dir(&args.masks, "Masks folder") {
        Ok(d) => d,
        Err(msg) => {
            eprintln!("Error: {}", msg);
            return exit_codes::INPUT_ERROR;
        }
    };
    if args.glm.trim().is_empty() {
        eprintln!("Error: --glm must not be empty");
        return exit_codes::INPUT_ERROR;
    }

    let toolbox = match params::require_tools(&args.tools, TRIAL_TOOLS) {
        Ok(t) => t,
        Err(msg) => {
            eprintln!("Error: {}", msg);
            return exit_codes::TOOL_NOT_FOUND;
        }
    };

    let request = TrialsRequest {
        subject_results,
        masks_dir,
        glm: args.glm.clone(),
        subjects: args.subjects.clone(),
    };
    if !args.report.quiet {
        eprintln!("Extracting trial magnitudes from GLM {}...", request.glm);
    }
    let runner = SystemRunner::new();
    let report = match extract_trial_magnitudes(&runner, &toolbox, &request).await {
        Ok(r) => r,
        Err(e) => return params::fail(e),
    };

    if args.report.wants_json() {
        return output::emit_json(&report, &args.report);
    }
    if !args.report.quiet {
        eprintln!(
            "{} row(s) for {} subject(s) and {} ROI(s) written to {} in {}",
            report.rows,
            report.subjects.len(),
            report.rois.len(),
            report.csv_path.display(),
            report.elapsed
        );
    }
    exit_codes::SUCCESS
}
