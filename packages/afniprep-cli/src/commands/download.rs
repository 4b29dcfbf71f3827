use crate::cli::DownloadArgs;
use crate::exit_codes;
use crate::output;
use crate::params;
use afniprep_rs::bids::acquire::DownloadReport;
use afniprep_rs::bids::{backup_archive, download_dicoms, session_paths, BackupRequest, DownloadRequest, ExperimentId};
use afniprep_rs::{SystemRunner, Tool};
use serde::Serialize;

#[derive(Serialize)]
struct DownloadOutput {
    #[serde(flatten)]
    download: DownloadReport,
    experiment: String,
    backed_up: bool,
}

pub async fn execute(args: DownloadArgs) -> i32 {
    let root = match params::bids_root(&args.ids) {
        Ok(r) => r,
        Err(msg) => {
            eprintln!("Error: {}", msg);
            return exit_codes::INPUT_ERROR;
        }
    };
    let experiment = match args.date.as_deref().map(params::parse_date) {
        None => ExperimentId::Auto,
        Some(Ok(date)) => ExperimentId::Dated(date),
        Some(Err(msg)) => {
            eprintln!("Error: {}", msg);
            return exit_codes::INPUT_ERROR;
        }
    };
    if args.scan_id.trim().is_empty() || args.scan_id.contains('/') {
        eprintln!("Error: Invalid scan id '{}'", args.scan_id);
        return exit_codes::INPUT_ERROR;
    }

    let mut required = vec![Tool::Curl, Tool::Unzip];
    if args.backup {
        required.push(Tool::Scp);
    }
    let toolbox = match params::require_tools(&args.tools, &required) {
        Ok(t) => t,
        Err(msg) => {
            eprintln!("Error: {}", msg);
            return exit_codes::TOOL_NOT_FOUND;
        }
    };

    let participant = params::participant(&args.ids);
    let paths = session_paths(&root, &participant, args.session);
    let request = DownloadRequest {
        scan_id: args.scan_id.clone(),
        project: args.project.clone(),
        login: args.login.clone(),
        password: args.password.clone(),
        experiment,
        dicom_dir: paths.dicom(),
    };

    let runner = SystemRunner::new();
    if !args.report.quiet {
        eprintln!(
            "Fetching {} for {} into {}...",
            request.experiment_name(),
            participant.label(),
            request.dicom_dir.display()
        );
    }
    let download = match download_dicoms(&runner, &toolbox, &request).await {
        Ok(r) => r,
        Err(e) => return params::fail(e),
    };

    let mut exit_code = exit_codes::SUCCESS;
    let mut backed_up = false;
    if args.backup {
        let backup = BackupRequest {
            archive: download.archive.clone(),
            login: args.login.clone(),
            host: args.backup_host.clone(),
            remote_folder: args.backup_folder.clone(),
        };
        match backup_archive(&runner, &toolbox, &backup).await {
            Ok(()) => backed_up = true,
            Err(e) => {
                eprintln!("Error: Backup failed, archive kept: {}", e);
                exit_code = exit_codes::PARTIAL_FAILURE;
            }
        }
    }

    let result = DownloadOutput {
        download,
        experiment: request.experiment_name(),
        backed_up,
    };
    if args.report.wants_json() {
        let code = output::emit_json(&result, &args.report);
        return if code == exit_codes::SUCCESS { exit_code } else { code };
    }
    if !args.report.quiet {
        if result.download.downloaded {
            eprintln!("Downloaded and extracted {}", result.download.archive.display());
        } else {
            eprintln!("Extracted existing {}", result.download.archive.display());
        }
        if backed_up {
            eprintln!("Archive backed up to {}", args.backup_host);
        }
    }
    exit_code
}
