//! First-level quality-control collection into `subject_results/QC_AFNI/`.

use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::error::{AfniPrepError, Result};
use crate::report::format_duration;
use crate::roi::discovery::{list_subjects, SubjectDir};
use crate::runner::{Invocation, ToolRunner};
use crate::tools::{Tool, Toolbox};

pub const QC_FOLDER: &str = "QC_AFNI";
pub const RADIAL_SUMMARY: &str = "radial_correlate_summary.txt";

/// GLMs with more coefficient labels than this are skipped when `skip_large_glms` is set
pub const LARGE_GLM_COEFS: usize = 50;

const RADIAL_DELIMITER: &str = "============================================================";
const WARPED_ANAT: &str = "anat_mprage_unif_ns_shft+tlrc.HEAD";
const REVIEW_SCRIPTS: &[&str] = &["@ss_review_basic", "@ss_review_driver", "@ss_review_driver_commands"];

/// Tools `collect_qc` may call
pub const QC_TOOLS: &[Tool] = &[
    Tool::ThreeDInfo,
    Tool::GenSsReviewScripts,
    Tool::GenSsReviewTable,
    Tool::SnapshotVolreg,
    Tool::OneDPlot,
];

#[derive(Debug, Clone, Serialize)]
pub struct QcRequest {
    pub subject_results: PathBuf,
    pub skip_large_glms: bool,
    /// Where template datasets named in `-base` live (AFNI's `~/abin` by default)
    pub template_dir: PathBuf,
}

impl QcRequest {
    pub fn new(subject_results: impl Into<PathBuf>) -> Self {
        Self {
            subject_results: subject_results.into(),
            skip_large_glms: false,
            template_dir: dirs::home_dir().unwrap_or_default().join("abin"),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct QcReport {
    pub qc_dir: PathBuf,
    pub proc_outputs: usize,
    pub dfiles: usize,
    pub review_tables: Vec<PathBuf>,
    pub snapshots: usize,
    pub radial_summary: Option<PathBuf>,
    pub plots: usize,
    pub warnings: Vec<String>,
    pub elapsed: String,
}

impl QcReport {
    fn warn(&mut self, message: String) {
        log::warn!("{}", message);
        self.warnings.push(message);
    }
}

/// Copy `src` into `dir` unless a file of that name is already there (`cp -n`).
fn copy_no_clobber(src: &Path, dir: &Path) -> Result<bool> {
    let Some(name) = src.file_name() else {
        return Ok(false);
    };
    let dest = dir.join(name);
    if dest.exists() {
        return Ok(false);
    }
    std::fs::copy(src, &dest)?;
    Ok(true)
}

/// Move `name` from `from` into `to`, replacing any older copy.
fn relocate(from: &Path, name: &str, to: &Path) -> Result<bool> {
    let src = from.join(name);
    if !src.exists() {
        return Ok(false);
    }
    let dest = to.join(name);
    if std::fs::rename(&src, &dest).is_err() {
        std::fs::copy(&src, &dest)?;
        std::fs::remove_file(&src)?;
    }
    Ok(true)
}

fn glob_paths(pattern: &Path) -> Result<Vec<PathBuf>> {
    let pattern = pattern.display().to_string();
    let paths = glob::glob(&pattern)
        .map_err(|e| AfniPrepError::InvalidParameter(format!("glob '{}': {}", pattern, e)))?;
    let mut found: Vec<PathBuf> = paths.filter_map(|p| p.ok()).collect();
    found.sort();
    Ok(found)
}

fn remove_matching(pattern: &Path) -> Result<()> {
    for path in glob_paths(pattern)? {
        if path.is_file() {
            std::fs::remove_file(path)?;
        }
    }
    Ok(())
}

fn ensure_dir(path: PathBuf) -> Result<PathBuf> {
    std::fs::create_dir_all(&path)?;
    Ok(path)
}

/// Files next to `subject_results` whose names contain `output` (afni_proc.py logs).
fn copy_proc_outputs(subject_results: &Path, dest: &Path) -> Result<usize> {
    let Some(parent) = subject_results.parent() else {
        return Ok(0);
    };
    let mut copied = 0;
    for entry in std::fs::read_dir(parent)? {
        let path = entry?.path();
        let is_output = path
            .file_name()
            .map(|n| n.to_string_lossy().contains("output"))
            .unwrap_or(false);
        if is_output && path.is_file() && copy_no_clobber(&path, dest)? {
            copied += 1;
        }
    }
    Ok(copied)
}

fn copy_dfiles(subjects: &[SubjectDir], dest: &Path) -> Result<usize> {
    let mut copied = 0;
    for subject in subjects {
        for dfile in glob_paths(&subject.results_dir.join("*.dfile_rall.1D"))? {
            if copy_no_clobber(&dfile, dest)? {
                copied += 1;
            }
        }
    }
    Ok(copied)
}

/// Folders of a results directory holding a `stats*` dataset, sorted
fn stats_glms(results_dir: &Path) -> Result<Vec<String>> {
    let mut glms = Vec::new();
    for entry in std::fs::read_dir(results_dir)? {
        let path = entry?.path();
        if !path.is_dir() {
            continue;
        }
        let has_stats = std::fs::read_dir(&path)?
            .filter_map(|e| e.ok())
            .any(|e| e.file_name().to_string_lossy().starts_with("stats"));
        if has_stats {
            glms.push(path.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default());
        }
    }
    glms.sort();
    Ok(glms)
}

fn review_table_path(tables_dir: &Path, glm: &str) -> PathBuf {
    tables_dir.join(format!("review_table_{}.xls", glm))
}

async fn coef_count<R: ToolRunner>(runner: &R, toolbox: &Toolbox, stats: &Path) -> Result<usize> {
    let inv = Invocation::new(toolbox, Tool::ThreeDInfo).arg("-label").path_arg(stats);
    let output = runner.run(&inv).await?;
    Ok(output.stdout.split('|').filter(|l| l.contains("Coef")).count())
}

/// Arguments for `gen_ss_review_scripts.py`, relative to the subject's results folder
pub fn review_script_args(subject: &str, glm: &str) -> Vec<String> {
    let in_glm = |name: String| format!("{}/{}", glm, name);
    vec![
        "-mot_limit".into(),
        "0.3".into(),
        "-exit0".into(),
        "-out_limit".into(),
        "0.1".into(),
        "-uvar".into(),
        "xmat_uncensored".into(),
        in_glm("X.nocensor.xmat.1D".into()),
        "-uvar".into(),
        "stats_dset".into(),
        in_glm(format!("stats.{}+tlrc.HEAD", subject)),
        "-motion_dset".into(),
        format!("{}.dfile_rall.1D", subject),
        "-uvar".into(),
        "sum_ideal".into(),
        in_glm("sum_ideal.1D".into()),
        "-uvar".into(),
        "tsnr_dset".into(),
        in_glm(format!("TSNR.{}+tlrc.HEAD", subject)),
        "-uvar".into(),
        "gcor_dset".into(),
        in_glm("out.gcor.1D".into()),
        "-xmat_regress".into(),
        "X.xmat.1D".into(),
        "-censor_dset".into(),
        format!("motion_{}_censor.1D", subject),
        "-errts_dset".into(),
        in_glm(format!("errts.{}+tlrc.HEAD", subject)),
    ]
}

/// Generate and run the single-subject review scripts for one GLM.
async fn review_glm<R: ToolRunner>(runner: &R, toolbox: &Toolbox, subject: &SubjectDir, glm: &str) -> Result<()> {
    let results = &subject.results_dir;
    remove_matching(&results.join("out.ss_review.*"))?;
    remove_matching(&results.join("@ss_review*"))?;

    let review_dir = subject.glm_dir(glm).join("review_files");
    if review_dir.exists() {
        std::fs::remove_dir_all(&review_dir)?;
    }
    std::fs::create_dir_all(&review_dir)?;

    // the scripts expect the regression matrices next to the motion files
    for xmat in ["X.xmat.1D", "X.stim.xmat.1D"] {
        let src = subject.glm_dir(glm).join(xmat);
        if src.exists() {
            std::fs::copy(&src, results.join(xmat))?;
        }
    }

    let result = async {
        let scripts = Invocation::new(toolbox, Tool::GenSsReviewScripts)
            .args(review_script_args(&subject.id, glm))
            .current_dir(results);
        runner.run(&scripts).await?;

        let out_name = format!("out.ss_review.{}.{}.txt", subject.id, glm);
        let basic = Invocation::script(Tool::GenSsReviewScripts, results.join("@ss_review_basic"))
            .current_dir(results)
            .stdout_to(results.join(&out_name));
        runner.run(&basic).await?;

        relocate(results, &out_name, &review_dir)?;
        for script in REVIEW_SCRIPTS {
            relocate(results, script, &review_dir)?;
        }
        Ok::<(), AfniPrepError>(())
    }
    .await;

    remove_matching(&results.join("X*xmat.1D"))?;
    result
}

async fn build_review_tables<R: ToolRunner>(
    runner: &R,
    toolbox: &Toolbox,
    subjects: &[SubjectDir],
    req: &QcRequest,
    tables_dir: &Path,
    report: &mut QcReport,
) -> Result<()> {
    let mut all_glms: Vec<String> = Vec::new();

    for subject in subjects {
        let mut glms: Vec<String> = stats_glms(&subject.results_dir)?
            .into_iter()
            .filter(|g| !review_table_path(tables_dir, g).exists())
            .collect();

        if req.skip_large_glms {
            let mut kept = Vec::new();
            for glm in glms {
                let stats = subject.glm_dir(&glm).join(format!("stats.{}+tlrc.HEAD", subject.id));
                let coefs = coef_count(runner, toolbox, &stats).await?;
                if coefs > LARGE_GLM_COEFS {
                    log::info!("{} {}: {} coefficients, review skipped", subject.id, glm, coefs);
                } else {
                    kept.push(glm);
                }
            }
            glms = kept;
        }

        for glm in &glms {
            log::info!("Review files for {} {}", subject.id, glm);
            match review_glm(runner, toolbox, subject, glm).await {
                Ok(()) => {
                    if !all_glms.contains(glm) {
                        all_glms.push(glm.clone());
                    }
                }
                Err(e) => report.warn(format!("{} {}: review scripts failed: {}", subject.id, glm, e)),
            }
        }
    }

    let Some(parent) = req.subject_results.parent() else {
        return Ok(());
    };
    for glm in &all_glms {
        let infiles = glob_paths(&req.subject_results.join("*").join("*").join(glm).join("review_files").join("out.ss_review.*"))?;
        if infiles.is_empty() {
            continue;
        }
        let inv = Invocation::new(toolbox, Tool::GenSsReviewTable)
            .args(["-tablefile", "review_table.xls", "-overwrite", "-infiles"])
            .args(infiles.iter().map(|p| p.display().to_string()))
            .current_dir(parent);
        if let Err(e) = runner.run(&inv).await {
            report.warn(format!("{}: review table failed: {}", glm, e));
            continue;
        }

        let table = parent.join("review_table.xls");
        let dest = review_table_path(tables_dir, glm);
        if table.exists() {
            std::fs::rename(&table, &dest)?;
            report.review_tables.push(dest);
        }
    }
    Ok(())
}

/// Template named after `-base` in a `3dinfo -history` dump, without `.HEAD`
pub fn template_from_history(history: &str) -> Option<String> {
    let mut tokens = history.split_whitespace();
    while let Some(token) = tokens.next() {
        if token == "-base" {
            return tokens.next().map(|t| t.strip_suffix(".HEAD").unwrap_or(t).to_string());
        }
    }
    None
}

/// Motion-corrected EPI runs (`pb*volreg*.HEAD`), sorted
fn volreg_runs(results_dir: &Path) -> Result<Vec<String>> {
    let mut runs: Vec<String> = std::fs::read_dir(results_dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().to_string())
        .filter(|n| n.contains("pb") && n.contains("volreg") && n.ends_with(".HEAD"))
        .collect();
    runs.sort();
    Ok(runs)
}

async fn snapshot<R: ToolRunner>(
    runner: &R,
    toolbox: &Toolbox,
    results_dir: &Path,
    snapshots_dir: &Path,
    base: &str,
    overlay: &str,
    jpg: &str,
) -> Result<bool> {
    let inv = Invocation::new(toolbox, Tool::SnapshotVolreg)
        .args([base, overlay, jpg])
        .current_dir(results_dir);
    runner.run(&inv).await?;
    relocate(results_dir, &format!("{}.jpg", jpg), snapshots_dir)
}

async fn subject_snapshots<R: ToolRunner>(
    runner: &R,
    toolbox: &Toolbox,
    subject: &SubjectDir,
    req: &QcRequest,
    snapshots_dir: &Path,
) -> Result<usize> {
    let results = &subject.results_dir;
    let runs = volreg_runs(results)?;
    let anat_jpg = format!("{}_anat-template", subject.id);
    let run_jpgs: Vec<String> = (1..=runs.len())
        .map(|r| format!("{}_run{:02}-anat", subject.id, r))
        .collect();

    let missing = |jpg: &String| !snapshots_dir.join(format!("{}.jpg", jpg)).exists();
    if !missing(&anat_jpg) && !run_jpgs.iter().any(missing) {
        return Ok(0);
    }

    let info = Invocation::new(toolbox, Tool::ThreeDInfo)
        .arg("-history")
        .path_arg(results.join(WARPED_ANAT));
    let history = runner.run(&info).await?.stdout;
    let template = template_from_history(&history)
        .ok_or_else(|| AfniPrepError::ParseError(format!("{}: no -base in {} history", subject.id, WARPED_ANAT)))?;

    let mut copied = Vec::new();
    if !results.join(format!("{}.HEAD", template)).exists() {
        for src in glob_paths(&req.template_dir.join(format!("{}*", template)))? {
            if copy_no_clobber(&src, results)? {
                copied.extend(src.file_name().map(|n| results.join(n)));
            }
        }
    }

    let anat = format!("anat_final.{}+tlrc", subject.id);
    let mut made = 0;
    let result = async {
        if missing(&anat_jpg) && snapshot(runner, toolbox, results, snapshots_dir, &template, &anat, &anat_jpg).await? {
            made += 1;
        }
        for (run, jpg) in runs.iter().zip(&run_jpgs) {
            let epi = run.strip_suffix(".HEAD").unwrap_or(run);
            if missing(jpg) && snapshot(runner, toolbox, results, snapshots_dir, &anat, epi, jpg).await? {
                made += 1;
            }
        }
        Ok::<(), AfniPrepError>(())
    }
    .await;

    for path in copied {
        std::fs::remove_file(path)?;
    }
    result.map(|_| made)
}

/// The first `====` delimited block of an `@radial_correlate` log, delimiters included
pub fn radial_block(text: &str) -> Option<&str> {
    let start = text.find(RADIAL_DELIMITER)?;
    let after = start + RADIAL_DELIMITER.len();
    let end = text[after..].find(RADIAL_DELIMITER)? + after;
    let stop = (end + RADIAL_DELIMITER.len() + 1).min(text.len());
    text.get(start..stop)
}

fn radial_summary(subjects: &[SubjectDir], path: &Path, report: &mut QcReport) -> Result<()> {
    let mut summary = String::new();
    for subject in subjects {
        let Some(log_file) = glob_paths(&subject.results_dir.join("output.radial_correlate*"))?.into_iter().next() else {
            report.warn(format!("{}: no output.radial_correlate file", subject.id));
            continue;
        };
        let text = std::fs::read_to_string(&log_file)?;
        match radial_block(&text) {
            Some(block) => {
                summary.push_str(block);
                summary.push('\n');
            }
            None => report.warn(format!("{}: no delimited block", log_file.display())),
        }
    }
    std::fs::write(path, summary)?;
    Ok(())
}

/// Data rows in a 1D file (comment lines start with `#`)
fn timepoints_1d(path: &Path) -> Result<usize> {
    let text = std::fs::read_to_string(path)?;
    Ok(text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .count())
}

async fn subject_plots<R: ToolRunner>(
    runner: &R,
    toolbox: &Toolbox,
    subject: &SubjectDir,
    plots_dir: &Path,
) -> Result<usize> {
    let results = &subject.results_dir;
    let first = |pattern: &str| -> Result<PathBuf> {
        glob_paths(&results.join(pattern))?
            .into_iter()
            .next()
            .ok_or_else(|| AfniPrepError::FileNotFound(results.join(pattern).display().to_string()))
    };

    let censor = first("motion_*_censor.1D")?;
    let plots = [
        ("outliers", results.join("outcount_rall.1D"), "0.1"),
        ("motion", first("motion_*_enorm.1D")?, "0.3"),
    ];

    let mut made = 0;
    for (kind, data, limit) in plots {
        let name = format!("{}_{}", subject.id, kind);
        if plots_dir.join(format!("{}.jpg", name)).exists() {
            continue;
        }
        // horizontal limit line spanning the run
        let limit_line = format!("1D: {}@{}", timepoints_1d(&data)?, limit);
        let inv = Invocation::new(toolbox, Tool::OneDPlot)
            .args(["-one", "-plabel", name.as_str(), "-censor_RGB", "green", "-censor"])
            .path_arg(&censor)
            .args(["-jpg", name.as_str()])
            .path_arg(&data)
            .arg(limit_line)
            .current_dir(results);
        runner.run(&inv).await?;
        if relocate(results, &format!("{}.jpg", name), plots_dir)? {
            made += 1;
        }
    }
    Ok(made)
}

/// Gather proc logs, motion files, review tables, snapshots, radial-correlation and
/// motion/outlier plots for every subject. Existing outputs are kept; per-subject failures
/// become warnings.
pub async fn collect_qc<R: ToolRunner>(runner: &R, toolbox: &Toolbox, req: &QcRequest) -> Result<QcReport> {
    let start_time = Instant::now();
    let subjects = list_subjects(&req.subject_results, None)?;
    if subjects.is_empty() {
        return Err(AfniPrepError::Layout(format!(
            "no subject folders in {}",
            req.subject_results.display()
        )));
    }

    let qc_dir = ensure_dir(req.subject_results.join(QC_FOLDER))?;
    let mut report = QcReport {
        qc_dir: qc_dir.clone(),
        ..Default::default()
    };

    log::info!("Copying proc script output files");
    report.proc_outputs = copy_proc_outputs(&req.subject_results, &ensure_dir(qc_dir.join("proc_outputs"))?)?;
    log::info!("Copying subject motion files");
    report.dfiles = copy_dfiles(&subjects, &ensure_dir(qc_dir.join("dfiles"))?)?;

    let tables_dir = ensure_dir(qc_dir.join("review_tables"))?;
    build_review_tables(runner, toolbox, &subjects, req, &tables_dir, &mut report).await?;

    let snapshots_dir = ensure_dir(qc_dir.join("snapshots"))?;
    for subject in &subjects {
        match subject_snapshots(runner, toolbox, subject, req, &snapshots_dir).await {
            Ok(n) => report.snapshots += n,
            Err(e) => report.warn(format!("{}: snapshots failed: {}", subject.id, e)),
        }
    }

    let radial = qc_dir.join(RADIAL_SUMMARY);
    if !radial.exists() {
        radial_summary(&subjects, &radial, &mut report)?;
        report.radial_summary = Some(radial);
    }

    let plots_dir = ensure_dir(qc_dir.join("motion_outlier_plots"))?;
    for subject in &subjects {
        match subject_plots(runner, toolbox, subject, &plots_dir).await {
            Ok(n) => report.plots += n,
            Err(e) => report.warn(format!("{}: motion/outlier plots failed: {}", subject.id, e)),
        }
    }

    report.elapsed = format_duration(start_time.elapsed().as_secs());
    log::info!("QC collection finished in {}", report.elapsed);
    Ok(report)
}
