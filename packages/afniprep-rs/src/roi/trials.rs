//! Single-trial ROI magnitudes for linear mixed-effects models.

use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Instant;

use super::discovery::list_subjects;
use super::sources::discover_rois;
use super::RoiMethod;
use crate::error::{AfniPrepError, Result};
use crate::report::format_duration;
use crate::runner::{Invocation, ToolRunner};
use crate::tools::{Tool, Toolbox};

pub const LME_FOLDER: &str = "LME_results";
pub const MAGNITUDE_LIST: &str = "aaa_magnitude_list.csv";

#[derive(Debug, Clone, Serialize)]
pub struct TrialsRequest {
    pub subject_results: PathBuf,
    pub masks_dir: PathBuf,
    /// GLM folder holding the single-trial (stim_times_IM) model
    pub glm: String,
    pub subjects: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TrialsReport {
    pub csv_path: PathBuf,
    pub subjects: Vec<String>,
    pub rois: Vec<String>,
    pub rows: usize,
    pub elapsed: String,
}

/// Number of coefficient labels in `3dinfo -verb` output (tokens like `'trial#3_Coef'`).
pub fn count_trial_coefs(verb_output: &str) -> usize {
    verb_output
        .split_whitespace()
        .filter(|t| t.len() > 2 && t.starts_with('\'') && t.ends_with("_Coef'") && t.contains('#'))
        .count()
}

fn has_bucket(glm_dir: &Path, subject: &str) -> bool {
    let stem = format!("AllTrials_Betas_{}+tlrc.BRIK", subject);
    glm_dir.join(&stem).exists() || glm_dir.join(format!("{}.gz", stem)).exists()
}

fn first_token(path: &Path) -> Result<String> {
    let text = std::fs::read_to_string(path)?;
    text.split_whitespace()
        .next()
        .map(str::to_string)
        .ok_or_else(|| AfniPrepError::ParseError(format!("{}: empty 3dmaskave output", path.display())))
}

/// Average every mask over every trial beta of each subject and collect them in
/// `LME_results/aaa_magnitude_list.csv` (`Participant,Trial,<roi…>`).
pub async fn extract_trial_magnitudes<R: ToolRunner>(
    runner: &R,
    toolbox: &Toolbox,
    req: &TrialsRequest,
) -> Result<TrialsReport> {
    let start_time = Instant::now();
    let rois = discover_rois(&req.masks_dir, RoiMethod::PredefinedMask)?;
    if rois.is_empty() {
        return Err(AfniPrepError::FileNotFound(format!("{}/*+tlrc.HEAD", req.masks_dir.display())));
    }

    let subjects: Vec<_> = list_subjects(&req.subject_results, req.subjects.as_deref())?
        .into_iter()
        .filter_map(|s| {
            let glm_dir = s.path.join(format!("{}.results", s.id)).join(&req.glm);
            glm_dir.is_dir().then_some((s.id, glm_dir))
        })
        .collect();
    if subjects.is_empty() {
        return Err(AfniPrepError::Layout(format!(
            "no subject in {} has a '{}' GLM folder",
            req.subject_results.display(),
            req.glm
        )));
    }

    let output_dir = req.subject_results.join(LME_FOLDER);
    std::fs::create_dir_all(&output_dir)?;

    let mut rows: Vec<Vec<String>> = Vec::new();
    for (subject, glm_dir) in &subjects {
        log::info!("Participant {}", subject);
        let bucket = format!("AllTrials_Betas_{}", subject);
        if !has_bucket(glm_dir, subject) {
            let inv = Invocation::new(toolbox, Tool::ThreeDBucket)
                .arg("-prefix")
                .path_arg(glm_dir.join(&bucket))
                .arg(format!("{}[1..$(2)]", glm_dir.join(format!("stats.{}+tlrc", subject)).display()));
            runner.run(&inv).await?;
        }

        let info = Invocation::new(toolbox, Tool::ThreeDInfo)
            .arg("-verb")
            .arg(format!("stats.{}+tlrc", subject))
            .current_dir(glm_dir);
        let trials = count_trial_coefs(&runner.run(&info).await?.stdout);
        if trials == 0 {
            log::warn!("{}: no trial coefficients in stats.{}+tlrc", subject, subject);
            continue;
        }

        let mut subject_rows: Vec<Vec<String>> = (0..trials).map(|t| vec![subject.clone(), t.to_string()]).collect();
        for roi in &rois {
            let mask = roi.mask_dataset().ok_or_else(|| {
                AfniPrepError::InvalidParameter(format!("{}: not a mask dataset", roi.name()))
            })?;
            for (trial, row) in subject_rows.iter_mut().enumerate() {
                let out = output_dir.join(format!("{}.ave.{}.trial{}.txt", subject, roi.name(), trial));
                let inv = Invocation::new(toolbox, Tool::ThreeDMaskave)
                    .arg("-mask")
                    .arg(&mask)
                    .arg(format!("{}+tlrc[{}]", bucket, trial))
                    .current_dir(glm_dir)
                    .stdout_to(&out);
                runner.run(&inv).await?;
                row.push(first_token(&out)?);
            }
        }
        rows.extend(subject_rows);
    }

    let csv_path = output_dir.join(MAGNITUDE_LIST);
    let mut writer = csv::Writer::from_path(&csv_path)?;
    let mut header = vec!["Participant".to_string(), "Trial".to_string()];
    header.extend(rois.iter().map(|r| r.name().to_string()));
    writer.write_record(&header)?;
    for row in &rows {
        writer.write_record(row)?;
    }
    writer.flush()?;

    let elapsed = format_duration(start_time.elapsed().as_secs());
    log::info!("Wrote {} trial rows to {} in {}", rows.len(), csv_path.display(), elapsed);
    Ok(TrialsReport {
        csv_path,
        subjects: subjects.into_iter().map(|(id, _)| id).collect(),
        rois: rois.iter().map(|r| r.name().to_string()).collect(),
        rows: rows.len(),
        elapsed,
    })
}
