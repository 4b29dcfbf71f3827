use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Instant;

use super::aggregate::{aggregate, clean_output_folder, write_master_csv, AverageFile};
use super::conditions::{condition_from_label, shorten_conditions, stats_coef_labels, tent_condition};
use super::discovery::{datasets_with_prefix, find_glm_dir, list_glms, list_subjects, SubjectDir};
use super::extract::{averages_dirs, extract_glm, ExtractJob, SphereSettings};
use super::sources::discover_rois;
use super::{Analysis, Measure};
use crate::error::{AfniPrepError, Result};
use crate::report::format_duration;
use crate::runner::ToolRunner;
use crate::tools::{Tool, Toolbox};
use crate::types::CoordSystem;

/// Tools `run_roi_analysis` needs on the system
pub const ROI_TOOLS: &[Tool] = &[Tool::ThreeDInfo, Tool::ThreeDMaskave, Tool::ThreeDUndump];

/// Parameters for one ROI run
#[derive(Debug, Clone, Serialize)]
pub struct RoiRequest {
    pub subject_results: PathBuf,
    pub masks_dir: PathBuf,
    pub analyses: Vec<Analysis>,
    /// Subject ids to include; `None` takes every subject folder
    pub subjects: Option<Vec<String>>,
    /// GLM folder names to include; `None` takes every GLM of the matching kind
    pub glms: Option<Vec<String>>,
    /// Shortened condition names; `None` takes every condition
    pub conditions: Option<Vec<String>>,
    pub coord_system: CoordSystem,
    pub sphere_radius: u32,
    pub allow_orientation_mismatch: bool,
}

impl RoiRequest {
    pub fn new(subject_results: impl Into<PathBuf>, masks_dir: impl Into<PathBuf>) -> Self {
        Self {
            subject_results: subject_results.into(),
            masks_dir: masks_dir.into(),
            analyses: Analysis::ALL.to_vec(),
            subjects: None,
            glms: None,
            conditions: None,
            coord_system: CoordSystem::Lpi,
            sphere_radius: 5,
            allow_orientation_mismatch: false,
        }
    }

    fn sphere(&self) -> SphereSettings {
        SphereSettings {
            coord_system: self.coord_system,
            radius_mm: self.sphere_radius,
            allow_orientation_mismatch: self.allow_orientation_mismatch,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    pub analysis: Analysis,
    pub rois: Vec<String>,
    /// Conditions extracted, per GLM
    pub conditions: BTreeMap<String, Vec<String>>,
    pub averages: usize,
    pub master_csv: Option<PathBuf>,
    pub skipped: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RoiReport {
    pub run_id: String,
    pub subjects: Vec<String>,
    pub analyses: Vec<AnalysisReport>,
    pub warnings: Vec<String>,
    pub elapsed: String,
}

/// Condition names of a GLM, read from the first subject that has it.
pub async fn glm_conditions<R: ToolRunner>(
    runner: &R,
    toolbox: &Toolbox,
    subjects: &[SubjectDir],
    glm: &str,
    measure: Measure,
) -> Result<Vec<String>> {
    let dir = find_glm_dir(subjects, glm)
        .ok_or_else(|| AfniPrepError::FileNotFound(format!("GLM folder '{}' in any subject", glm)))?;
    let datasets = datasets_with_prefix(&dir, measure.dataset_prefix())?;
    let Some(first) = datasets.first() else {
        return Err(AfniPrepError::FileNotFound(format!(
            "{}/{}*.HEAD",
            dir.display(),
            measure.dataset_prefix()
        )));
    };

    Ok(match measure {
        Measure::Magnitudes => stats_coef_labels(runner, toolbox, &dir.join(first))
            .await?
            .iter()
            .map(|l| condition_from_label(l).to_string())
            .collect(),
        Measure::Timecourses => datasets.iter().map(|d| tent_condition(d).to_string()).collect(),
    })
}

fn selected_glms(all: Vec<String>, only: Option<&[String]>) -> Vec<String> {
    match only {
        None => all,
        Some(only) => all.into_iter().filter(|g| only.contains(g)).collect(),
    }
}

/// Best effort; the error that stopped the run is the one reported.
fn discard_averages(subjects: &[SubjectDir], glms: &[String], analysis: Analysis) {
    for dir in averages_dirs(subjects, glms, analysis) {
        if let Err(e) = std::fs::remove_dir_all(&dir) {
            log::warn!("Could not remove {}: {}", dir.display(), e);
        }
    }
}

async fn run_analysis<R: ToolRunner>(
    runner: &R,
    toolbox: &Toolbox,
    req: &RoiRequest,
    subjects: &[SubjectDir],
    analysis: Analysis,
    warnings: &mut Vec<String>,
) -> Result<AnalysisReport> {
    let mut report = AnalysisReport {
        analysis,
        rois: Vec::new(),
        conditions: BTreeMap::new(),
        averages: 0,
        master_csv: None,
        skipped: None,
    };

    let rois = discover_rois(&req.masks_dir, analysis.method)?;
    if rois.is_empty() {
        report.skipped = Some(format!("no {} ROIs in {}", analysis.method.as_str(), req.masks_dir.display()));
        return Ok(report);
    }
    report.rois = rois.iter().map(|r| r.name().to_string()).collect();

    let glms = selected_glms(list_glms(subjects, analysis.measure.glm_kind())?, req.glms.as_deref());
    if glms.is_empty() {
        report.skipped = Some(format!("no {:?} GLMs selected", analysis.measure.glm_kind()));
        return Ok(report);
    }

    // a failure part way through must not leave earlier subjects' averages behind
    let produced: Result<Option<(usize, PathBuf)>> = async {
        let mut files: Vec<AverageFile> = Vec::new();
        for glm in &glms {
            let all = glm_conditions(runner, toolbox, subjects, glm, analysis.measure).await?;
            let shortened = shorten_conditions(&all);

            for subject in subjects.iter().filter(|s| s.has_glm(glm)) {
                let job = ExtractJob {
                    analysis,
                    subject,
                    glm,
                    rois: &rois,
                    chosen: req.conditions.as_deref(),
                    shortened: &shortened,
                    sphere: req.sphere(),
                };
                let outcome = extract_glm(runner, toolbox, &job).await?;
                warnings.extend(outcome.warnings);

                let conditions = report.conditions.entry(glm.clone()).or_default();
                for condition in outcome.conditions {
                    if !conditions.contains(&condition) {
                        conditions.push(condition);
                    }
                }
                files.extend(outcome.files);
            }
            if let Some(conditions) = report.conditions.get_mut(glm) {
                conditions.sort();
            }
        }

        if files.is_empty() {
            return Ok(None);
        }
        let summaries = aggregate(analysis.measure, &files)?;
        let csv = write_master_csv(&req.subject_results, analysis, &summaries)?;
        Ok(Some((files.len(), csv)))
    }
    .await;

    let produced = match produced {
        Ok(produced) => produced,
        Err(e) => {
            discard_averages(subjects, &glms, analysis);
            return Err(e);
        }
    };
    let Some((averages, master_csv)) = produced else {
        discard_averages(subjects, &glms, analysis);
        report.skipped = Some("no conditions matched the selection".to_string());
        return Ok(report);
    };
    report.averages = averages;
    report.master_csv = Some(master_csv);

    clean_output_folder(&req.subject_results, analysis)?;
    for dir in averages_dirs(subjects, &glms, analysis) {
        std::fs::remove_dir_all(&dir)?;
    }
    Ok(report)
}

/// Extract and aggregate ROI values for every requested analysis.
///
/// Each analysis writes one master CSV under `subject_results`. Analyses without ROIs or
/// GLMs of the matching kind are reported as skipped.
pub async fn run_roi_analysis<R: ToolRunner>(runner: &R, toolbox: &Toolbox, req: &RoiRequest) -> Result<RoiReport> {
    let start_time = Instant::now();
    let run_id = uuid::Uuid::new_v4().to_string();
    if req.sphere_radius == 0 {
        return Err(AfniPrepError::InvalidParameter("sphere radius must be at least 1 mm".to_string()));
    }

    let subjects = list_subjects(&req.subject_results, req.subjects.as_deref())?;
    if subjects.is_empty() {
        return Err(AfniPrepError::Layout(format!(
            "no subject folders in {}",
            req.subject_results.display()
        )));
    }
    log::info!("ROI run {}: {} subject(s)", run_id, subjects.len());

    let mut warnings = Vec::new();
    let mut analyses = Vec::new();
    for analysis in &req.analyses {
        let report = run_analysis(runner, toolbox, req, &subjects, *analysis, &mut warnings).await?;
        match report.skipped {
            Some(ref reason) => log::warn!("{} skipped: {}", analysis, reason),
            None => log::info!("{}: {} averages calculated", analysis, report.averages),
        }
        analyses.push(report);
    }

    let elapsed = format_duration(start_time.elapsed().as_secs());
    log::info!("ROI run finished in {}", elapsed);
    Ok(RoiReport {
        run_id,
        subjects: subjects.into_iter().map(|s| s.id).collect(),
        analyses,
        warnings,
        elapsed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::roi::discovery::fixtures;
    use crate::roi::RoiMethod;
    use crate::runner::RecordingRunner;

    #[tokio::test]
    async fn test_mask_magnitudes_end_to_end() {
        let tmp = tempfile::tempdir().unwrap();
        let results = tmp.path().join("subject_results");
        fixtures::glm(&results, "101", "GLM_gam", &["stats.101+tlrc.HEAD"]);
        fixtures::glm(&results, "102", "GLM_gam", &["stats.102+tlrc.HEAD"]);
        let masks = tmp.path().join("masks");
        std::fs::create_dir(&masks).unwrap();
        std::fs::write(masks.join("amygdala+tlrc.HEAD"), "").unwrap();

        let runner = RecordingRunner::with_responder(|inv| {
            Ok(match inv.tool {
                Tool::ThreeDInfo => "hit#0_Coef|miss#0_Coef".to_string(),
                Tool::ThreeDMaskave if inv.args.last().map(|a| a.starts_with("stats.101")).unwrap_or(false) => {
                    "1.0 [10 voxels]".to_string()
                }
                Tool::ThreeDMaskave => "3.0 [10 voxels]".to_string(),
                _ => String::new(),
            })
        });

        let mut req = RoiRequest::new(&results, &masks);
        req.analyses = vec![Analysis {
            method: RoiMethod::PredefinedMask,
            measure: Measure::Magnitudes,
        }];
        let report = run_roi_analysis(&runner, &Toolbox::default(), &req).await.unwrap();

        let analysis = &report.analyses[0];
        assert_eq!(analysis.averages, 4);
        assert_eq!(analysis.conditions["GLM_gam"], vec!["hit", "miss"]);
        let csv = std::fs::read_to_string(analysis.master_csv.as_ref().unwrap()).unwrap();
        assert_eq!(
            csv,
            "activation,subj_count,average,sem\namygdala_hit,2,2.0,1.0\namygdala_miss,2,2.0,1.0\n"
        );
        assert!(!results
            .join("subj.101/101.results/GLM_gam/predefined_mask_ROI_averages_magnitudes")
            .exists());
        assert_eq!(report.subjects, vec!["101", "102"]);
    }

    #[tokio::test]
    async fn test_failed_subject_removes_partial_averages() {
        let tmp = tempfile::tempdir().unwrap();
        let results = tmp.path().join("subject_results");
        fixtures::glm(&results, "101", "GLM_gam", &["stats.101+tlrc.HEAD"]);
        fixtures::glm(&results, "102", "GLM_gam", &["stats.102+tlrc.HEAD"]);
        let masks = tmp.path().join("masks");
        std::fs::create_dir(&masks).unwrap();
        std::fs::write(masks.join("amygdala+tlrc.HEAD"), "").unwrap();

        let runner = RecordingRunner::with_responder(|inv| match inv.tool {
            Tool::ThreeDInfo => Ok("hit#0_Coef".to_string()),
            Tool::ThreeDMaskave if inv.args.last().map(|a| a.starts_with("stats.102")).unwrap_or(false) => {
                Err(AfniPrepError::ExecutionFailed("3dmaskave exited with status 1".to_string()))
            }
            Tool::ThreeDMaskave => Ok("1.0 [10 voxels]".to_string()),
            _ => Ok(String::new()),
        });

        let mut req = RoiRequest::new(&results, &masks);
        req.analyses = vec![Analysis {
            method: RoiMethod::PredefinedMask,
            measure: Measure::Magnitudes,
        }];
        let err = run_roi_analysis(&runner, &Toolbox::default(), &req).await.unwrap_err();

        assert!(matches!(err, AfniPrepError::ExecutionFailed(_)));
        // subject 101 ran first and wrote its averages before 102 failed
        assert!(runner
            .calls_to(Tool::ThreeDMaskave)
            .iter()
            .any(|c| c.args.last().unwrap().starts_with("stats.101")));
        for id in ["101", "102"] {
            let dir = results.join(format!(
                "subj.{id}/{id}.results/GLM_gam/predefined_mask_ROI_averages_magnitudes"
            ));
            assert!(!dir.exists(), "{} left behind", dir.display());
        }
        assert!(!results.join("Average_predefined_mask_ROI_magnitudes").exists());
    }

    #[tokio::test]
    async fn test_skips_without_rois() {
        let tmp = tempfile::tempdir().unwrap();
        fixtures::glm(tmp.path(), "101", "GLM_gam", &["stats.101+tlrc.HEAD"]);
        let masks = tmp.path().join("masks");
        std::fs::create_dir(&masks).unwrap();

        let req = RoiRequest::new(tmp.path(), &masks);
        let report = run_roi_analysis(&RecordingRunner::new(), &Toolbox::default(), &req)
            .await
            .unwrap();
        assert_eq!(report.analyses.len(), 4);
        assert!(report.analyses.iter().all(|a| a.skipped.is_some()));
    }
}
