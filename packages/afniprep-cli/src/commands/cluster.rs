use crate::cli::ClusterArgs;
use crate::commands::vol2surf::surface_options;
use crate::exit_codes;
use crate::output;
use crate::params;
use afniprep_rs::cluster::{cluster_directory, run_cluster_correction, ClusterOptions, Threshold};
use afniprep_rs::surface::VolumeInput;
use afniprep_rs::{SystemRunner, Tool};
use std::path::Path;

const CLUSTER_TOOLS: &[Tool] = &[
    Tool::ThreeDClust,
    Tool::ThreeDCalc,
    Tool::ThreeDAfniToNifti,
    Tool::WbCommand,
];

pub async fn execute(args: ClusterArgs) -> i32 {
    let input = Path::new(&args.input);
    if !input.is_dir() {
        if let Err(e) = VolumeInput::detect(input) {
            eprintln!("Error: {}", e);
            return exit_codes::INPUT_ERROR;
        }
    }
    let threshold = match (args.p, args.z) {
        (Some(p), None) => Threshold::P(p),
        (None, Some(z)) => Threshold::Z(z),
        _ => {
            eprintln!("Error: Give exactly one of --p or --z");
            return exit_codes::INPUT_ERROR;
        }
    };
    let surface = match surface_options(&args.surface) {
        Ok(o) => o,
        Err(msg) => {
            eprintln!("Error: {}", msg);
            return exit_codes::INPUT_ERROR;
        }
    };

    let mut opts = ClusterOptions::new(threshold, surface);
    opts.alpha = args.alpha;
    opts.nn = args.nn;
    opts.bisided = !args.one_sided;
    opts.suffix = args.suffix.clone();
    opts.keep_afni = args.keep_afni;
    if let Err(e) = opts.validate() {
        eprintln!("Error: {}", e);
        return exit_codes::INPUT_ERROR;
    }

    let toolbox = match params::require_tools(&args.tools, CLUSTER_TOOLS) {
        Ok(t) => t,
        Err(msg) => {
            eprintln!("Error: {}", msg);
            return exit_codes::TOOL_NOT_FOUND;
        }
    };

    let runner = SystemRunner::new();
    let result = if input.is_dir() {
        if !args.report.quiet {
            eprintln!("Cluster-correcting every dataset in {}...", input.display());
        }
        cluster_directory(&runner, &toolbox, input, &opts).await
    } else {
        run_cluster_correction(&runner, &toolbox, input, &opts)
            .await
            .map(|report| vec![report])
    };
    let reports = match result {
        Ok(r) => r,
        Err(e) => return params::fail(e),
    };

    if args.report.wants_json() {
        return output::emit_json(&reports, &args.report);
    }
    if !args.report.quiet {
        for report in &reports {
            eprintln!(
                "{}: p={} (z={}), alpha={}, minimum {} voxels",
                report.dataset.display(),
                report.p,
                report.z,
                report.alpha,
                report.min_voxels
            );
            for surface in &report.surfaces {
                eprintln!("  wrote {}", surface.display());
            }
        }
    }
    exit_codes::SUCCESS
}
