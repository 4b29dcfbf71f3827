use crate::cli::{MeasureArg, MethodArg, RoiArgs};
use crate::exit_codes;
use crate::output;
use crate::params;
use afniprep_rs::roi::pipeline::ROI_TOOLS;
use afniprep_rs::roi::{run_roi_analysis, Analysis, Measure, RoiMethod, RoiPresets, RoiRequest};
use afniprep_rs::{CoordSystem, SystemRunner};
use std::path::PathBuf;

const DEFAULT_SPHERE_RADIUS: u32 = 5;

pub fn method(arg: MethodArg) -> RoiMethod {
    match arg {
        MethodArg::Spherical => RoiMethod::Spherical,
        MethodArg::Mask => RoiMethod::PredefinedMask,
    }
}

pub fn measure(arg: MeasureArg) -> Measure {
    match arg {
        MeasureArg::Magnitudes => Measure::Magnitudes,
        MeasureArg::Timecourses => Measure::Timecourses,
    }
}

/// Every requested method paired with every requested measure; empty lists mean all.
fn analyses(methods: &[MethodArg], measures: &[MeasureArg]) -> Vec<Analysis> {
    Analysis::ALL
        .iter()
        .copied()
        .filter(|a| methods.is_empty() || methods.iter().any(|&m| method(m) == a.method))
        .filter(|a| measures.is_empty() || measures.iter().any(|&m| measure(m) == a.measure))
        .collect()
}

/// Settings given on the command line, in presets form.
fn flag_presets(args: &RoiArgs) -> Result<RoiPresets, String> {
    let coord_system = match args.coord_system.as_deref() {
        Some(s) => Some(
            CoordSystem::from_str(s)
                .ok_or_else(|| format!("Invalid coordinate system '{}': expected LPI or RAI", s))?,
        ),
        None => None,
    };
    Ok(RoiPresets {
        subject_results_path: args.subject_results.as_ref().map(PathBuf::from),
        masks_path: args.masks.as_ref().map(PathBuf::from),
        coord_system,
        sphere_radius: args.radius,
        updated_at: None,
    })
}

pub async fn execute(args: RoiArgs) -> i32 {
    let presets_path = args
        .presets
        .as_ref()
        .map(PathBuf::from)
        .unwrap_or_else(RoiPresets::default_path);
    let saved = match RoiPresets::load(&presets_path) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Error: Failed to read presets '{}': {}", presets_path.display(), e);
            return exit_codes::INPUT_ERROR;
        }
    };
    let flags = match flag_presets(&args) {
        Ok(f) => f,
        Err(msg) => {
            eprintln!("Error: {}", msg);
            return exit_codes::INPUT_ERROR;
        }
    };
    let mut effective = saved.merge(&flags);

    let (Some(subject_results), Some(masks)) =
        (effective.subject_results_path.clone(), effective.masks_path.clone())
    else {
        eprintln!("Error: --subject-results and --masks are required (no saved presets)");
        return exit_codes::INPUT_ERROR;
    };
    for (dir, what) in [(&subject_results, "subject_results folder"), (&masks, "Masks folder")] {
        if !dir.is_dir() {
            eprintln!("Error: {} not found: {}", what, dir.display());
            return exit_codes::INPUT_ERROR;
        }
    }

    let mut request = RoiRequest::new(&subject_results, &masks);
    request.analyses = analyses(&args.method, &args.measure);
    request.subjects = args.subjects.clone();
    request.glms = args.glms.clone();
    request.conditions = args.conditions.clone();
    request.coord_system = effective.coord_system.unwrap_or(CoordSystem::Lpi);
    request.sphere_radius = effective.sphere_radius.unwrap_or(DEFAULT_SPHERE_RADIUS);
    request.allow_orientation_mismatch = args.allow_orientation_mismatch;

    let toolbox = match params::require_tools(&args.tools, ROI_TOOLS) {
        Ok(t) => t,
        Err(msg) => {
            eprintln!("Error: {}", msg);
            return exit_codes::TOOL_NOT_FOUND;
        }
    };

    if !args.report.quiet {
        let names: Vec<String> = request.analyses.iter().map(|a| a.to_string()).collect();
        eprintln!("Running ROI analysis: {}", names.join(", "));
        eprintln!(
            "  Spheres: {} mm, {} coordinates",
            request.sphere_radius, request.coord_system
        );
    }

    let runner = SystemRunner::new();
    let report = match run_roi_analysis(&runner, &toolbox, &request).await {
        Ok(r) => r,
        Err(e) => return params::fail(e),
    };

    if !args.no_save_presets {
        effective.coord_system = Some(request.coord_system);
        effective.sphere_radius = Some(request.sphere_radius);
        if let Err(e) = effective.save(&presets_path) {
            log::warn!("Could not save presets to {}: {}", presets_path.display(), e);
        }
    }

    if args.report.wants_json() {
        return output::emit_json(&report, &args.report);
    }
    if !args.report.quiet {
        for analysis in &report.analyses {
            match (&analysis.master_csv, &analysis.skipped) {
                (Some(csv), _) => eprintln!(
                    "  {}: {} ROI(s), {} average file(s) -> {}",
                    analysis.analysis,
                    analysis.rois.len(),
                    analysis.averages,
                    csv.display()
                ),
                (None, Some(reason)) => eprintln!("  {}: skipped ({})", analysis.analysis, reason),
                (None, None) => eprintln!("  {}: no results", analysis.analysis),
            }
        }
        for warning in &report.warnings {
            eprintln!("Warning: {}", warning);
        }
        eprintln!(
            "ROI analysis of {} subject(s) finished in {}",
            report.subjects.len(),
            report.elapsed
        );
    }
    exit_codes::SUCCESS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_analyses_defaults_to_all() {
        assert_eq!(analyses(&[], &[]).len(), 4);
    }

    #[test]
    fn test_analyses_filters_method_and_measure() {
        let picked = analyses(&[MethodArg::Mask], &[MeasureArg::Timecourses]);
        assert_eq!(
            picked,
            vec![Analysis {
                method: RoiMethod::PredefinedMask,
                measure: Measure::Timecourses,
            }]
        );
        assert_eq!(analyses(&[MethodArg::Spherical], &[]).len(), 2);
    }
}
