use std::path::{Path, PathBuf};

use super::aggregate::{AverageFile, RoiKey};
use super::conditions::{condition_from_label, select_options, stats_coef_labels, tent_condition};
use super::coords::normalize_coordinate_file;
use super::discovery::{datasets_with_prefix, SubjectDir};
use super::sources::RoiSource;
use super::{Analysis, Measure};
use crate::error::{AfniPrepError, Result};
use crate::runner::{Invocation, ToolRunner};
use crate::tools::{Tool, Toolbox};
use crate::types::CoordSystem;

/// Sphere geometry and the coordinate order the ROI centres are written in
#[derive(Debug, Clone, Copy)]
pub struct SphereSettings {
    pub coord_system: CoordSystem,
    pub radius_mm: u32,
    pub allow_orientation_mismatch: bool,
}

/// Extraction of every selected condition of one subject's GLM
pub struct ExtractJob<'a> {
    pub analysis: Analysis,
    pub subject: &'a SubjectDir,
    pub glm: &'a str,
    pub rois: &'a [RoiSource],
    /// Chosen (shortened) condition names; `None` takes every condition
    pub chosen: Option<&'a [String]>,
    /// Shortened names of every condition of this measure
    pub shortened: &'a [String],
    pub sphere: SphereSettings,
}

#[derive(Debug, Default)]
pub struct ExtractOutcome {
    pub files: Vec<AverageFile>,
    pub conditions: Vec<String>,
    pub warnings: Vec<String>,
}

/// A dataset sub-brick selection for one condition
struct ConditionInput {
    condition: String,
    /// Dataset without `.HEAD`, relative to the GLM folder
    dataset: String,
    /// Argument handed to 3dmaskave
    input: String,
}

fn strip_head(name: &str) -> String {
    name.strip_suffix(".HEAD").unwrap_or(name).to_string()
}

pub fn average_file_name(roi: &str, subject: &str, condition: &str) -> String {
    format!("{}.ave.{}.{}.txt", roi, subject, condition)
}

async fn condition_inputs<R: ToolRunner>(
    runner: &R,
    toolbox: &Toolbox,
    job: &ExtractJob<'_>,
    glm_dir: &Path,
) -> Result<Vec<ConditionInput>> {
    let prefix = job.analysis.measure.dataset_prefix();
    let datasets = datasets_with_prefix(glm_dir, prefix)?;
    if datasets.is_empty() {
        return Err(AfniPrepError::FileNotFound(format!("{}/{}*.HEAD", glm_dir.display(), prefix)));
    }

    let mut inputs = Vec::new();
    match job.analysis.measure {
        Measure::Magnitudes => {
            let stats = strip_head(&datasets[0]);
            let labels = stats_coef_labels(runner, toolbox, &glm_dir.join(&datasets[0])).await?;
            for label in select_options(&labels, job.chosen, job.shortened) {
                inputs.push(ConditionInput {
                    condition: condition_from_label(&label).to_string(),
                    dataset: stats.clone(),
                    input: format!("{}[{}]", stats, label),
                });
            }
        }
        Measure::Timecourses => {
            for name in select_options(&datasets, job.chosen, job.shortened) {
                let dataset = strip_head(&name);
                inputs.push(ConditionInput {
                    condition: tent_condition(&name).to_string(),
                    input: dataset.clone(),
                    dataset,
                });
            }
        }
    }

    inputs.dedup_by(|a, b| a.input == b.input);
    Ok(inputs)
}

/// Fail (or warn) when a dataset's orientation does not match the coordinate order.
async fn check_orientation<R: ToolRunner>(
    runner: &R,
    toolbox: &Toolbox,
    dataset: &Path,
    sphere: &SphereSettings,
    warnings: &mut Vec<String>,
) -> Result<()> {
    let inv = Invocation::new(toolbox, Tool::ThreeDInfo)
        .arg("-orient")
        .path_arg(dataset);
    let orient = runner.run(&inv).await?.stdout.trim().to_string();
    if orient.contains(sphere.coord_system.as_str()) {
        return Ok(());
    }

    let message = format!(
        "{}: coordinate system {} does not match dataset orientation {}",
        dataset.display(),
        sphere.coord_system,
        orient
    );
    if sphere.allow_orientation_mismatch {
        log::warn!("{}", message);
        warnings.push(message);
        Ok(())
    } else {
        Err(AfniPrepError::InvalidParameter(message))
    }
}

fn remove_temp_files(glm_dir: &Path) -> Result<()> {
    for entry in std::fs::read_dir(glm_dir)? {
        let entry = entry?;
        if entry.file_name().to_string_lossy().starts_with("temp_") {
            std::fs::remove_file(entry.path())?;
        }
    }
    Ok(())
}

/// Average every selected condition within every ROI for one subject GLM.
///
/// Results land in `<GLM>/<method>_ROI_averages_<measure>/`; `temp_*` files are removed
/// from the GLM folder whether or not extraction succeeds.
pub async fn extract_glm<R: ToolRunner>(runner: &R, toolbox: &Toolbox, job: &ExtractJob<'_>) -> Result<ExtractOutcome> {
    let glm_dir = job.subject.glm_dir(job.glm);
    if !glm_dir.is_dir() {
        return Err(AfniPrepError::FileNotFound(glm_dir.display().to_string()));
    }

    // leftovers from an interrupted run would shadow the masks built here
    remove_temp_files(&glm_dir)?;
    let result = run_extraction(runner, toolbox, job, &glm_dir).await;
    let cleanup = remove_temp_files(&glm_dir);
    let outcome = result?;
    cleanup?;
    Ok(outcome)
}

async fn run_extraction<R: ToolRunner>(
    runner: &R,
    toolbox: &Toolbox,
    job: &ExtractJob<'_>,
    glm_dir: &Path,
) -> Result<ExtractOutcome> {
    let averages_dir = glm_dir.join(job.analysis.averages_folder());
    std::fs::create_dir_all(&averages_dir)?;

    for roi in job.rois {
        if let RoiSource::Sphere { name, coordinate_file } = roi {
            let coordinate = normalize_coordinate_file(coordinate_file)?;
            std::fs::write(glm_dir.join(format!("temp_{}.txt", name)), coordinate.to_string())?;
        }
    }

    let inputs = condition_inputs(runner, toolbox, job, glm_dir).await?;
    let mut outcome = ExtractOutcome::default();

    let has_spheres = job.rois.iter().any(|r| matches!(r, RoiSource::Sphere { .. }));
    if has_spheres {
        let mut checked: Vec<&str> = Vec::new();
        for input in &inputs {
            if checked.contains(&input.dataset.as_str()) {
                continue;
            }
            check_orientation(
                runner,
                toolbox,
                &glm_dir.join(&input.dataset),
                &job.sphere,
                &mut outcome.warnings,
            )
            .await?;
            checked.push(&input.dataset);
        }
    }

    for input in &inputs {
        for roi in job.rois {
            let out_path = averages_dir.join(average_file_name(roi.name(), &job.subject.id, &input.condition));
            let mask = match roi {
                RoiSource::Sphere { name, .. } => {
                    let prefix = format!("temp_{}_mask_{}", name, input.condition);
                    let undump = Invocation::new(toolbox, Tool::ThreeDUndump)
                        .arg("-prefix")
                        .arg(&prefix)
                        .arg("-master")
                        .arg(&input.dataset)
                        .arg("-srad")
                        .arg(job.sphere.radius_mm.to_string())
                        .arg("-xyz")
                        .arg(format!("temp_{}.txt", name))
                        .current_dir(glm_dir);
                    runner.run(&undump).await?;
                    format!("{}+tlrc", prefix)
                }
                RoiSource::Mask { .. } => roi.mask_dataset().ok_or_else(|| {
                    AfniPrepError::InvalidParameter(format!("{}: mask without a +tlrc.HEAD file", roi.name()))
                })?,
            };

            let maskave = Invocation::new(toolbox, Tool::ThreeDMaskave)
                .arg("-mask")
                .arg(&mask)
                .arg(&input.input)
                .current_dir(glm_dir)
                .stdout_to(&out_path);
            runner.run(&maskave).await?;

            outcome.files.push(AverageFile {
                key: RoiKey::new(roi.name(), &input.condition),
                subject: job.subject.id.clone(),
                path: out_path,
            });
        }
        outcome.conditions.push(input.condition.clone());
    }

    log::info!(
        "{} {}: {} condition(s) x {} ROI(s)",
        job.subject.id,
        job.glm,
        outcome.conditions.len(),
        job.rois.len()
    );
    Ok(outcome)
}

/// Per-subject average folders created by an analysis, for cleanup
pub fn averages_dirs(subjects: &[SubjectDir], glms: &[String], analysis: Analysis) -> Vec<PathBuf> {
    subjects
        .iter()
        .flat_map(|s| glms.iter().map(move |g| s.glm_dir(g).join(analysis.averages_folder())))
        .filter(|p| p.is_dir())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::roi::discovery::{fixtures, list_subjects};
    use crate::roi::sources::discover_rois;
    use crate::roi::RoiMethod;
    use crate::runner::RecordingRunner;

    fn sphere(allow: bool) -> SphereSettings {
        SphereSettings {
            coord_system: CoordSystem::Lpi,
            radius_mm: 5,
            allow_orientation_mismatch: allow,
        }
    }

    fn afni_responder(orient: &'static str) -> RecordingRunner {
        RecordingRunner::with_responder(move |inv| {
            Ok(match (inv.tool, inv.args.first().map(|s| s.as_str())) {
                (Tool::ThreeDInfo, Some("-label")) => "hit#0_Coef|hit#0_Tstat|cr#0_Coef|hit-cr_GLT#0_Coef".to_string(),
                (Tool::ThreeDInfo, Some("-orient")) => format!("{}\n", orient),
                (Tool::ThreeDMaskave, _) => "0.4213 [33 voxels]\n".to_string(),
                _ => String::new(),
            })
        })
    }

    #[tokio::test]
    async fn test_sphere_magnitudes() {
        let tmp = tempfile::tempdir().unwrap();
        let results = tmp.path().join("subject_results");
        fixtures::glm(&results, "101", "GLM_gam", &["stats.101+tlrc.HEAD"]);
        let masks = tmp.path().join("masks");
        std::fs::create_dir(&masks).unwrap();
        std::fs::write(masks.join("precuneus.txt"), "-5,42,21").unwrap();

        let subjects = list_subjects(&results, None).unwrap();
        let rois = discover_rois(&masks, RoiMethod::Spherical).unwrap();
        let shortened: Vec<String> = ["hit", "cr", "hit-cr_GLT"].iter().map(|s| s.to_string()).collect();
        let chosen = vec!["hit".to_string()];
        let job = ExtractJob {
            analysis: Analysis::ALL[0],
            subject: &subjects[0],
            glm: "GLM_gam",
            rois: &rois,
            chosen: Some(&chosen),
            shortened: &shortened,
            sphere: sphere(false),
        };

        let runner = afni_responder("LPI");
        let outcome = extract_glm(&runner, &Toolbox::default(), &job).await.unwrap();

        assert_eq!(outcome.conditions, vec!["hit"]);
        let undump = &runner.calls_to(Tool::ThreeDUndump)[0];
        assert_eq!(undump.arg_after("-prefix"), Some("temp_precuneus_mask_hit"));
        assert_eq!(undump.arg_after("-master"), Some("stats.101+tlrc"));
        assert_eq!(undump.arg_after("-xyz"), Some("temp_precuneus.txt"));

        let maskave = &runner.calls_to(Tool::ThreeDMaskave)[0];
        assert_eq!(maskave.args.last().unwrap(), "stats.101+tlrc[hit#0_Coef]");

        let out = &outcome.files[0].path;
        assert!(out.ends_with("spherical_ROI_averages_magnitudes/precuneus.ave.101.hit.txt"));
        assert_eq!(std::fs::read_to_string(out).unwrap(), "0.4213 [33 voxels]\n");
        // coordinate file normalized in place, temp copy removed
        assert_eq!(std::fs::read_to_string(masks.join("precuneus.txt")).unwrap(), "-5 42 21");
        assert!(!subjects[0].glm_dir("GLM_gam").join("temp_precuneus.txt").exists());
    }

    #[tokio::test]
    async fn test_orientation_mismatch() {
        let tmp = tempfile::tempdir().unwrap();
        fixtures::glm(tmp.path(), "101", "GLM_gam", &["stats.101+tlrc.HEAD"]);
        let masks = tmp.path().join("masks");
        std::fs::create_dir(&masks).unwrap();
        std::fs::write(masks.join("acc.txt"), "0 20 30").unwrap();

        let subjects = list_subjects(tmp.path(), None).unwrap();
        let rois = discover_rois(&masks, RoiMethod::Spherical).unwrap();
        let mut job = ExtractJob {
            analysis: Analysis::ALL[0],
            subject: &subjects[0],
            glm: "GLM_gam",
            rois: &rois,
            chosen: None,
            shortened: &[],
            sphere: sphere(false),
        };

        let runner = afni_responder("RAI");
        let err = extract_glm(&runner, &Toolbox::default(), &job).await;
        assert!(matches!(err, Err(AfniPrepError::InvalidParameter(_))));

        job.sphere = sphere(true);
        let outcome = extract_glm(&runner, &Toolbox::default(), &job).await.unwrap();
        assert_eq!(outcome.warnings.len(), 1);
        assert_eq!(outcome.conditions.len(), 3);
    }

    #[tokio::test]
    async fn test_mask_timecourses() {
        let tmp = tempfile::tempdir().unwrap();
        fixtures::glm(
            tmp.path(),
            "101",
            "GLM_tent",
            &["iresp.hit.101+tlrc.HEAD", "iresp.miss.101+tlrc.HEAD", "stats.101+tlrc.HEAD"],
        );
        let masks = tmp.path().join("masks");
        std::fs::create_dir(&masks).unwrap();
        std::fs::write(masks.join("amygdala+tlrc.HEAD"), "").unwrap();

        let subjects = list_subjects(tmp.path(), None).unwrap();
        let rois = discover_rois(&masks, RoiMethod::PredefinedMask).unwrap();
        let job = ExtractJob {
            analysis: Analysis::ALL[3],
            subject: &subjects[0],
            glm: "GLM_tent",
            rois: &rois,
            chosen: None,
            shortened: &[],
            sphere: sphere(false),
        };

        let runner = afni_responder("LPI");
        let outcome = extract_glm(&runner, &Toolbox::default(), &job).await.unwrap();

        assert_eq!(outcome.conditions, vec!["hit", "miss"]);
        assert!(runner.calls_to(Tool::ThreeDUndump).is_empty());
        assert!(runner.calls_to(Tool::ThreeDInfo).is_empty());
        let maskave = &runner.calls_to(Tool::ThreeDMaskave)[1];
        assert!(maskave.arg_after("-mask").unwrap().ends_with("masks/amygdala+tlrc"));
        assert_eq!(maskave.args.last().unwrap(), "iresp.miss.101+tlrc");
    }
}
