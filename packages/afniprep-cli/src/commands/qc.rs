use crate::cli::QcArgs;
use crate::exit_codes;
use crate::output;
use crate::params;
use afniprep_rs::qc::{collect_qc, QcRequest, QC_TOOLS};
use afniprep_rs::SystemRunner;
use std::path::PathBuf;

pub async fn execute(args: QcArgs) -> i32 {
    let subject_results = match params::existing_dir(&args.subject_results, "subject_results folder") {
        Ok(d) => d,
        Err(msg) => {
            eprintln!("Error: {}", msg);
            return exit_codes::INPUT_ERROR;
        }
    };

    let mut request = QcRequest::new(subject_results);
    request.skip_large_glms = args.skip_large_glms;
    if let Some(ref dir) = args.template_dir {
        request.template_dir = PathBuf::from(dir);
    }

    let toolbox = match params::require_tools(&args.tools, QC_TOOLS) {
        Ok(t) => t,
        Err(msg) => {
            eprintln!("Error: {}", msg);
            return exit_codes::TOOL_NOT_FOUND;
        }
    };

    if !args.report.quiet {
        eprintln!("Collecting QC for {}...", request.subject_results.display());
    }
    let runner = SystemRunner::new();
    let report = match collect_qc(&runner, &toolbox, &request).await {
        Ok(r) => r,
        Err(e) => return params::fail(e),
    };

    let exit_code = if report.warnings.is_empty() {
        exit_codes::SUCCESS
    } else {
        exit_codes::PARTIAL_FAILURE
    };

    if args.report.wants_json() {
        let code = output::emit_json(&report, &args.report);
        return if code == exit_codes::SUCCESS { exit_code } else { code };
    }
    if !args.report.quiet {
        eprintln!("  proc outputs: {}", report.proc_outputs);
        eprintln!("  motion files: {}", report.dfiles);
        eprintln!("  review tables: {}", report.review_tables.len());
        eprintln!("  snapshots: {}", report.snapshots);
        eprintln!("  plots: {}", report.plots);
        for warning in &report.warnings {
            eprintln!("Warning: {}", warning);
        }
        eprintln!(
            "QC collected in {} ({})",
            report.qc_dir.display(),
            report.elapsed
        );
    }
    exit_code
}
