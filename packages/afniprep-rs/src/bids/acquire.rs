use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{AfniPrepError, Result};
use crate::runner::{Invocation, ToolRunner};
use crate::tools::{Tool, Toolbox};

pub const CNDA_BASE_URL: &str = "https://cnda.wustl.edu/REST/projects";
pub const DEFAULT_BACKUP_HOST: &str = "icarus.neuroimage.wustl.edu";

/// How the CNDA experiment is addressed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExperimentId {
    /// Experiment is named after the scan id alone
    Auto,
    /// Experiment carries the scan date (`<vc>_<MM><DD>_<YY>`)
    Dated(NaiveDate),
}

/// Everything needed to fetch one session's archive
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadRequest {
    /// Scan id, e.g. `vc12345`; also the archive name
    pub scan_id: String,
    pub project: String,
    pub login: String,
    #[serde(skip_serializing)]
    pub password: String,
    pub experiment: ExperimentId,
    pub dicom_dir: PathBuf,
}

impl DownloadRequest {
    pub fn experiment_name(&self) -> String {
        match &self.experiment {
            ExperimentId::Auto => self.scan_id.clone(),
            ExperimentId::Dated(date) => format!("{}_{}", self.scan_id, date.format("%m%d_%y")),
        }
    }

    pub fn url(&self) -> String {
        format!(
            "{}/{}/experiments/{}/DIR/SCANS?format=zip&recursive=true",
            CNDA_BASE_URL,
            self.project,
            self.experiment_name()
        )
    }

    pub fn archive_path(&self) -> PathBuf {
        archive_path(&self.dicom_dir, &self.scan_id)
    }
}

pub fn archive_path(dicom_dir: &Path, scan_id: &str) -> PathBuf {
    dicom_dir.join(format!("{}.zip", scan_id))
}

#[derive(Debug, Clone, Serialize)]
pub struct DownloadReport {
    pub archive: PathBuf,
    /// `false` when the archive was already present
    pub downloaded: bool,
}

/// Download the session archive (unless present) and extract it into the DICOM folder.
pub async fn download_dicoms<R: ToolRunner>(
    runner: &R,
    toolbox: &Toolbox,
    request: &DownloadRequest,
) -> Result<DownloadReport> {
    if !request.dicom_dir.is_dir() {
        return Err(AfniPrepError::FileNotFound(request.dicom_dir.display().to_string()));
    }

    let archive = request.archive_path();
    let downloaded = if archive.exists() {
        log::info!("{} already in folder", archive.display());
        false
    } else {
        log::info!("Downloading DICOM files for {} from CNDA", request.scan_id);
        let credentials = format!("{}:{}", request.login, request.password);
        let curl = Invocation::new(toolbox, Tool::Curl)
            .args(["-k", "--fail", "-s", "-u"])
            .arg(credentials)
            .arg(request.url())
            .arg("-o")
            .path_arg(&archive)
            .current_dir(&request.dicom_dir);
        if let Err(e) = runner.run(&curl).await {
            // curl leaves a partial file behind on HTTP errors
            let _ = std::fs::remove_file(&archive);
            return Err(e);
        }
        true
    };

    let unzip = Invocation::new(toolbox, Tool::Unzip)
        .args(["-o", "-q"])
        .path_arg(&archive)
        .arg("-d")
        .path_arg(&request.dicom_dir);
    runner.run(&unzip).await?;

    Ok(DownloadReport { archive, downloaded })
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupRequest {
    pub archive: PathBuf,
    pub login: String,
    pub host: String,
    pub remote_folder: String,
}

impl BackupRequest {
    pub fn destination(&self) -> String {
        format!("{}@{}:{}", self.login, self.host, self.remote_folder)
    }
}

/// Copy the archive to the backup host; the local zip is removed only after a successful copy.
pub async fn backup_archive<R: ToolRunner>(runner: &R, toolbox: &Toolbox, request: &BackupRequest) -> Result<()> {
    if !request.archive.is_file() {
        return Err(AfniPrepError::FileNotFound(request.archive.display().to_string()));
    }

    let scp = Invocation::new(toolbox, Tool::Scp)
        .path_arg(&request.archive)
        .arg(request.destination());

    match runner.run(&scp).await {
        Ok(_) => {
            log::info!(
                "{} backed up to {}",
                request.archive.display(),
                request.destination()
            );
            std::fs::remove_file(&request.archive)?;
            Ok(())
        }
        Err(e) => {
            log::warn!(
                "Backup failed; {} not deleted, try backup again",
                request.archive.display()
            );
            Err(e)
        }
    }
}

/// Convert a DICOM tree to gzipped NIfTI with BIDS sidecars, named `<protocol>_<series>`.
pub async fn convert_dicoms<R: ToolRunner>(
    runner: &R,
    toolbox: &Toolbox,
    dicom_dir: &Path,
    nifti_dir: &Path,
) -> Result<()> {
    if !dicom_dir.is_dir() {
        return Err(AfniPrepError::FileNotFound(dicom_dir.display().to_string()));
    }
    std::fs::create_dir_all(nifti_dir)?;

    let dcm2niix = Invocation::new(toolbox, Tool::Dcm2niix)
        .args(["-b", "y", "-ba", "y", "-z", "y", "-v", "n", "-o"])
        .path_arg(nifti_dir)
        .args(["-f", "%p_%s"])
        .path_arg(dicom_dir);
    let output = runner.run(&dcm2niix).await?;
    log::info!(
        "dcm2niix converted {} in {:.1}s",
        dicom_dir.display(),
        output.elapsed.as_secs_f64()
    );
    Ok(())
}
