use crate::cli::{HemisphereArg, MappingArg, SurfaceArgs, Vol2SurfArgs};
use crate::exit_codes;
use crate::output;
use crate::params;
use afniprep_rs::surface::{
    map_volume_to_surface, Hemisphere, MappingMethod, SurfaceOptions, VolumeFormat, VolumeInput,
};
use afniprep_rs::{SystemRunner, Tool};
use std::path::Path;

/// Validate the surface flags and turn them into mapping options.
pub fn surface_options(args: &SurfaceArgs) -> Result<SurfaceOptions, String> {
    let dir = params::existing_dir(&args.surface_dir, "Surface folder")?;
    let mut opts = SurfaceOptions::new(dir);
    opts.hemisphere = match args.hemisphere {
        HemisphereArg::Left => Hemisphere::Left,
        HemisphereArg::Right => Hemisphere::Right,
        HemisphereArg::Both => Hemisphere::Both,
    };
    opts.mapping = match args.mapping {
        MappingArg::Enclosing => MappingMethod::Enclosing,
        MappingArg::Trilinear => MappingMethod::Trilinear,
        MappingArg::RibbonConstrained => MappingMethod::RibbonConstrained,
    };
    opts.subbrick = args.subbrick;
    opts.keep_nifti = args.keep_nifti;
    Ok(opts)
}

fn required_tools(format: VolumeFormat) -> Vec<Tool> {
    match format {
        VolumeFormat::Afni => vec![Tool::ThreeDAfniToNifti, Tool::WbCommand],
        VolumeFormat::FourDfp => vec![Tool::Nifti4dfp, Tool::WbCommand],
        VolumeFormat::Nifti | VolumeFormat::NiftiGz => vec![Tool::WbCommand],
    }
}

pub async fn execute(args: Vol2SurfArgs) -> i32 {
    let volume = Path::new(&args.input);
    let input = match VolumeInput::detect(volume) {
        Ok(i) => i,
        Err(e) => {
            eprintln!("Error: {}", e);
            return exit_codes::INPUT_ERROR;
        }
    };
    let opts = match surface_options(&args.surface) {
        Ok(o) => o,
        Err(msg) => {
            eprintln!("Error: {}", msg);
            return exit_codes::INPUT_ERROR;
        }
    };

    let toolbox = match params::require_tools(&args.tools, &required_tools(input.format)) {
        Ok(t) => t,
        Err(msg) => {
            eprintln!("Error: {}", msg);
            return exit_codes::TOOL_NOT_FOUND;
        }
    };

    if !args.report.quiet {
        eprintln!("Mapping {} onto the surface...", volume.display());
    }
    let runner = SystemRunner::new();
    let report = match map_volume_to_surface(&runner, &toolbox, volume, &opts).await {
        Ok(r) => r,
        Err(e) => return params::fail(e),
    };

    if args.report.wants_json() {
        return output::emit_json(&report, &args.report);
    }
    if !args.report.quiet {
        for out in &report.outputs {
            eprintln!("  wrote {}", out.display());
        }
        if let Some(ref nifti) = report.nifti {
            eprintln!("  kept {}", nifti.display());
        }
    }
    exit_codes::SUCCESS
}
