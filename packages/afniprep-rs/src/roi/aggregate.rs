//! Study-level averaging of per-subject ROI values.

use rayon::prelude::*;
use serde::Serialize;
use statrs::statistics::Statistics;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use super::{Analysis, Measure};
use crate::error::{AfniPrepError, Result};
use crate::report::float_repr;

/// An ROI paired with one GLM condition
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct RoiKey {
    pub roi: String,
    pub condition: String,
}

impl RoiKey {
    pub fn new(roi: &str, condition: &str) -> Self {
        Self {
            roi: roi.to_string(),
            condition: condition.to_string(),
        }
    }

    /// Row or column label in the master CSV
    pub fn label(&self) -> String {
        format!("{}_{}", self.roi, self.condition)
    }
}

/// A 3dmaskave output file for one subject
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AverageFile {
    pub key: RoiKey,
    pub subject: String,
    pub path: PathBuf,
}

/// Mean and standard error across subjects, one entry per timepoint
/// (a single entry for magnitudes).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoiSummary {
    pub subject_count: usize,
    pub mean: Vec<f64>,
    pub sem: Vec<f64>,
}

/// First whitespace-separated value of each non-empty line
fn parse_average_file(path: &Path, measure: Measure) -> Result<Vec<f64>> {
    let text = std::fs::read_to_string(path)?;
    let mut values = Vec::new();
    for line in text.lines() {
        let Some(token) = line.split_whitespace().next() else {
            continue;
        };
        let value = token
            .parse::<f64>()
            .map_err(|e| AfniPrepError::ParseError(format!("{}: '{}': {}", path.display(), token, e)))?;
        values.push(value);
        if measure == Measure::Magnitudes {
            break;
        }
    }
    if values.is_empty() {
        return Err(AfniPrepError::ParseError(format!("{}: no values", path.display())));
    }
    Ok(values)
}

/// Standard error of the mean with one degree of freedom; NaN for a single subject.
fn sem(samples: &[f64]) -> f64 {
    if samples.len() < 2 {
        return f64::NAN;
    }
    samples.std_dev() / (samples.len() as f64).sqrt()
}

fn summarize(series: &[Vec<f64>]) -> RoiSummary {
    let points = series.first().map(|s| s.len()).unwrap_or(0);
    let mut mean = Vec::with_capacity(points);
    let mut errors = Vec::with_capacity(points);
    for t in 0..points {
        let column: Vec<f64> = series.iter().map(|s| s[t]).collect();
        mean.push(column.iter().sum::<f64>() / column.len() as f64);
        errors.push(sem(&column));
    }
    RoiSummary {
        subject_count: series.len(),
        mean,
        sem: errors,
    }
}

/// Read every average file and summarize each ROI/condition across subjects.
///
/// Files for the same condition name in different GLMs are pooled. Timecourses of one key
/// must all have the same number of timepoints.
pub fn aggregate(measure: Measure, files: &[AverageFile]) -> Result<BTreeMap<RoiKey, RoiSummary>> {
    let parsed: Vec<(RoiKey, Vec<f64>)> = files
        .par_iter()
        .map(|f| parse_average_file(&f.path, measure).map(|values| (f.key.clone(), values)))
        .collect::<Result<_>>()?;

    let mut grouped: BTreeMap<RoiKey, Vec<Vec<f64>>> = BTreeMap::new();
    for (key, values) in parsed {
        let series = grouped.entry(key.clone()).or_default();
        if let Some(first) = series.first() {
            if first.len() != values.len() {
                return Err(AfniPrepError::ParseError(format!(
                    "{}: {} timepoints where earlier subjects had {}",
                    key.label(),
                    values.len(),
                    first.len()
                )));
            }
        }
        series.push(values);
    }

    Ok(grouped
        .into_iter()
        .map(|(key, series)| (key, summarize(&series)))
        .collect())
}

/// Path for a new master CSV; existing masters are never overwritten.
///
/// Numbering starts at the count of masters already present and skips any index still taken,
/// so deleting an earlier master cannot make a new run land on a later one.
pub fn master_csv_path(output_dir: &Path, analysis: Analysis) -> Result<PathBuf> {
    let stem = format!("master_{}_ROI_{}_file", analysis.method.as_str(), analysis.measure.as_str());
    let first = output_dir.join(format!("{}.csv", stem));
    if !first.exists() {
        return Ok(first);
    }

    let mut existing = 0;
    for entry in std::fs::read_dir(output_dir)? {
        if entry?.file_name().to_string_lossy().starts_with(&stem) {
            existing += 1;
        }
    }
    loop {
        let candidate = output_dir.join(format!("{}_{}.csv", stem, existing));
        if !candidate.exists() {
            return Ok(candidate);
        }
        existing += 1;
    }
}

/// Write the study-level CSV into `<subject_results>/Average_<method>_ROI_<measure>/`.
///
/// Magnitudes give one row per ROI/condition; timecourses give one row per timepoint with
/// count, average and SEM columns for each ROI/condition. Rows and columns are ordered by label.
pub fn write_master_csv(
    subject_results: &Path,
    analysis: Analysis,
    summaries: &BTreeMap<RoiKey, RoiSummary>,
) -> Result<PathBuf> {
    let output_dir = subject_results.join(analysis.output_folder());
    std::fs::create_dir_all(&output_dir)?;
    let path = master_csv_path(&output_dir, analysis)?;

    let mut ordered: Vec<(String, &RoiSummary)> = summaries.iter().map(|(k, s)| (k.label(), s)).collect();
    ordered.sort_by(|a, b| a.0.cmp(&b.0));

    let mut writer = csv::Writer::from_path(&path)?;
    match analysis.measure {
        Measure::Magnitudes => {
            writer.write_record(["activation", "subj_count", "average", "sem"])?;
            for (label, summary) in &ordered {
                writer.write_record([
                    label.clone(),
                    summary.subject_count.to_string(),
                    float_repr(summary.mean.first().copied().unwrap_or(f64::NAN)),
                    float_repr(summary.sem.first().copied().unwrap_or(f64::NAN)),
                ])?;
            }
        }
        Measure::Timecourses => {
            let mut header = vec!["timepoint".to_string()];
            for (label, _) in &ordered {
                header.push(format!("{}_subj_count", label));
                header.push(format!("{}_average", label));
                header.push(format!("{}_sem", label));
            }
            writer.write_record(&header)?;

            let points = ordered.iter().map(|(_, s)| s.mean.len()).max().unwrap_or(0);
            for t in 0..points {
                let mut row = vec![(t + 1).to_string()];
                for (_, summary) in &ordered {
                    row.push(summary.subject_count.to_string());
                    row.push(float_repr(summary.mean.get(t).copied().unwrap_or(f64::NAN)));
                    row.push(float_repr(summary.sem.get(t).copied().unwrap_or(f64::NAN)));
                }
                writer.write_record(&row)?;
            }
        }
    }
    writer.flush()?;

    log::info!("Wrote {} ({} ROI/condition pairs)", path.display(), ordered.len());
    Ok(path)
}

/// Remove everything in the output folder except master CSVs.
pub fn clean_output_folder(subject_results: &Path, analysis: Analysis) -> Result<usize> {
    let output_dir = subject_results.join(analysis.output_folder());
    if !output_dir.is_dir() {
        return Ok(0);
    }
    let mut removed = 0;
    for entry in std::fs::read_dir(&output_dir)? {
        let path = entry?.path();
        let keep = path
            .file_name()
            .map(|n| n.to_string_lossy().starts_with("master_"))
            .unwrap_or(false);
        if !keep && path.is_file() {
            std::fs::remove_file(&path)?;
            removed += 1;
        }
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_file(dir: &Path, name: &str, text: &str, roi: &str, cond: &str, subj: &str) -> AverageFile {
        let path = dir.join(name);
        std::fs::write(&path, text).unwrap();
        AverageFile {
            key: RoiKey::new(roi, cond),
            subject: subj.to_string(),
            path,
        }
    }

    #[test]
    fn test_magnitude_summary() {
        let tmp = tempfile::tempdir().unwrap();
        let files = vec![
            write_file(tmp.path(), "a.txt", "1.0 [30 voxels]\n", "acc", "hit", "101"),
            write_file(tmp.path(), "b.txt", "3.0 [30 voxels]\n", "acc", "hit", "102"),
            write_file(tmp.path(), "c.txt", "0.5 [30 voxels]\n", "acc", "miss", "101"),
        ];

        let summaries = aggregate(Measure::Magnitudes, &files).unwrap();
        let hit = &summaries[&RoiKey::new("acc", "hit")];
        assert_eq!(hit.subject_count, 2);
        assert_eq!(hit.mean, vec![2.0]);
        // sample sd of [1, 3] is sqrt(2); divided by sqrt(2)
        assert!((hit.sem[0] - 1.0).abs() < 1e-12);
        assert!(summaries[&RoiKey::new("acc", "miss")].sem[0].is_nan());
    }

    #[test]
    fn test_timecourse_length_mismatch() {
        let tmp = tempfile::tempdir().unwrap();
        let files = vec![
            write_file(tmp.path(), "a.txt", "1\n2\n3\n", "acc", "hit", "101"),
            write_file(tmp.path(), "b.txt", "1\n2\n", "acc", "hit", "102"),
        ];
        assert!(matches!(
            aggregate(Measure::Timecourses, &files),
            Err(AfniPrepError::ParseError(_))
        ));
    }

    #[test]
    fn test_master_csv_magnitudes() {
        let tmp = tempfile::tempdir().unwrap();
        let mut summaries = BTreeMap::new();
        summaries.insert(
            RoiKey::new("acc", "hit"),
            RoiSummary {
                subject_count: 2,
                mean: vec![2.0],
                sem: vec![1.0],
            },
        );
        let analysis = Analysis::ALL[0];

        let path = write_master_csv(tmp.path(), analysis, &summaries).unwrap();
        assert!(path.ends_with("Average_spherical_ROI_magnitudes/master_spherical_ROI_magnitudes_file.csv"));
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "activation,subj_count,average,sem\nacc_hit,2,2.0,1.0\n"
        );

        let second = write_master_csv(tmp.path(), analysis, &summaries).unwrap();
        assert!(second.ends_with("master_spherical_ROI_magnitudes_file_1.csv"));
    }

    #[test]
    fn test_master_csv_path_skips_taken_index() {
        let tmp = tempfile::tempdir().unwrap();
        let analysis = Analysis::ALL[0];
        // file_1 was removed by hand, file_2 is still there
        std::fs::write(tmp.path().join("master_spherical_ROI_magnitudes_file.csv"), "first").unwrap();
        std::fs::write(tmp.path().join("master_spherical_ROI_magnitudes_file_2.csv"), "third").unwrap();

        let path = master_csv_path(tmp.path(), analysis).unwrap();
        assert_eq!(path, tmp.path().join("master_spherical_ROI_magnitudes_file_3.csv"));
        assert_eq!(
            std::fs::read_to_string(tmp.path().join("master_spherical_ROI_magnitudes_file_2.csv")).unwrap(),
            "third"
        );
    }

    #[test]
    fn test_master_csv_timecourses() {
        let tmp = tempfile::tempdir().unwrap();
        let files = vec![
            write_file(tmp.path(), "a.txt", "1\n4\n", "acc", "hit", "101"),
            write_file(tmp.path(), "b.txt", "3\n4\n", "acc", "hit", "102"),
        ];
        let summaries = aggregate(Measure::Timecourses, &files).unwrap();

        let path = write_master_csv(tmp.path(), Analysis::ALL[1], &summaries).unwrap();
        let text = std::fs::read_to_string(path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "timepoint,acc_hit_subj_count,acc_hit_average,acc_hit_sem");
        assert_eq!(lines[1], "1,2,2.0,1.0");
        assert_eq!(lines[2], "2,2,4.0,0.0");
    }

    #[test]
    fn test_clean_output_folder() {
        let tmp = tempfile::tempdir().unwrap();
        let analysis = Analysis::ALL[2];
        let dir = tmp.path().join(analysis.output_folder());
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("master_predefined_mask_ROI_magnitudes_file.csv"), "").unwrap();
        std::fs::write(dir.join("amygdala.ave.101.hit.txt"), "").unwrap();

        assert_eq!(clean_output_folder(tmp.path(), analysis).unwrap(), 1);
        assert_eq!(std::fs::read_dir(&dir).unwrap().count(), 1);
    }
}
