//! Cluster correction from the 3dClustSim tables stored in a dataset header.

use serde::Serialize;
use statrs::function::erf::{erfc, erfc_inv};
use std::path::{Path, PathBuf};

use crate::error::{AfniPrepError, Result};
use crate::report::round_to;
use crate::runner::{Invocation, ToolRunner};
use crate::surface::{map_volume_to_surface, SurfaceOptions, VolumeFormat, VolumeInput};
use crate::tools::{Tool, Toolbox};

/// p-values 3dClustSim simulates by default
pub const P_OPTIONS: [f64; 29] = [
    0.1, 0.09, 0.08, 0.07, 0.06, 0.05, 0.04, 0.03, 0.02, 0.015, 0.01, 0.007, 0.005, 0.003, 0.002, 0.0015, 0.001,
    0.0007, 0.0005, 0.0003, 0.0002, 0.00015, 0.0001, 7e-05, 5e-05, 3e-05, 2e-05, 1.5e-05, 1e-05,
];

const CLUST_MASK: &str = "Clust_mask";

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum Threshold {
    P(f64),
    Z(f64),
}

/// Two-sided p for `z`, snapped to the nearest simulated p-value.
pub fn p_for_z(z: f64) -> f64 {
    let p = erfc(z / std::f64::consts::SQRT_2);
    P_OPTIONS
        .iter()
        .copied()
        .min_by(|a, b| (p - a).abs().total_cmp(&(p - b).abs()))
        .unwrap_or(p)
}

/// Two-sided z threshold for `p`, rounded to three decimals.
pub fn z_for_p(p: f64) -> f64 {
    round_to(std::f64::consts::SQRT_2 * erfc_inv(p), 3)
}

#[derive(Debug, Clone, Serialize)]
pub struct ClusterOptions {
    pub threshold: Threshold,
    pub alpha: f64,
    /// Neighbourhood: 1 faces, 2 faces or edges, 3 faces, edges or corners
    pub nn: u8,
    pub bisided: bool,
    pub suffix: String,
    pub keep_afni: bool,
    /// Surface mapping of the clustered dataset; `keep_nifti` lives here
    pub surface: SurfaceOptions,
}

impl ClusterOptions {
    pub fn new(threshold: Threshold, surface: SurfaceOptions) -> Self {
        Self {
            threshold,
            alpha: 0.05,
            nn: 3,
            bisided: true,
            suffix: String::new(),
            keep_afni: false,
            surface,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(1..=3).contains(&self.nn) {
            return Err(AfniPrepError::InvalidParameter(format!("NN must be 1, 2 or 3, got {}", self.nn)));
        }
        let value = match self.threshold {
            Threshold::P(p) if p <= 0.0 || p >= 1.0 => Some(format!("p={}", p)),
            Threshold::Z(z) if z <= 0.0 => Some(format!("z={}", z)),
            _ => None,
        };
        if let Some(value) = value {
            return Err(AfniPrepError::InvalidParameter(format!("threshold out of range: {}", value)));
        }
        if self.alpha <= 0.0 || self.alpha >= 1.0 {
            return Err(AfniPrepError::InvalidParameter(format!("alpha out of range: {}", self.alpha)));
        }
        Ok(())
    }

    /// Suffix with a leading separator (`_`, `.` or `-`)
    pub fn normalized_suffix(&self) -> String {
        match self.suffix.chars().next() {
            None => String::new(),
            Some('_' | '.' | '-') => self.suffix.clone(),
            Some(_) => format!("_{}", self.suffix),
        }
    }

    /// p-value used for thresholding
    pub fn p_value(&self) -> f64 {
        match self.threshold {
            Threshold::P(p) => p,
            Threshold::Z(z) => p_for_z(z),
        }
    }
}

/// Minimum cluster sizes from one `AFNI_CLUSTSIM_NN<k>_<sided>` attribute
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClustSimTable {
    pub pthr: Vec<f64>,
    pub athr: Vec<f64>,
    /// One row per `pthr`, one value per `athr`
    pub sizes: Vec<Vec<f64>>,
}

fn same(a: f64, b: f64) -> bool {
    (a - b).abs() <= 1e-9 * a.abs().max(b.abs()).max(1e-12)
}

fn quoted_list(line: &str, key: &str) -> Result<Vec<f64>> {
    let start = line
        .find(&format!("{}=\"", key))
        .map(|i| i + key.len() + 2)
        .ok_or_else(|| AfniPrepError::ParseError(format!("3dClustSim {}", key)))?;
    let rest = &line[start..];
    let end = rest.find('"').unwrap_or(rest.len());
    rest[..end]
        .split(',')
        .map(|v| {
            v.trim()
                .parse::<f64>()
                .map_err(|e| AfniPrepError::ParseError(format!("3dClustSim {} value '{}': {}", key, v, e)))
        })
        .collect()
}

fn values_row(line: &str) -> Option<Vec<f64>> {
    let row: Option<Vec<f64>> = line.split_whitespace().map(|t| t.parse().ok()).collect();
    row.filter(|r| !r.is_empty())
}

impl ClustSimTable {
    /// Minimum cluster size (voxels) for a p/alpha pair; unknown values list the valid ones.
    pub fn min_cluster_size(&self, p: f64, alpha: f64) -> Result<f64> {
        let row = self.pthr.iter().position(|v| same(*v, p)).ok_or_else(|| {
            AfniPrepError::InvalidParameter(format!(
                "p={} was not simulated; choose one of {}",
                p,
                join(&self.pthr)
            ))
        })?;
        let col = self.athr.iter().position(|v| same(*v, alpha)).ok_or_else(|| {
            AfniPrepError::InvalidParameter(format!(
                "alpha={} was not simulated; choose one of {}",
                alpha,
                join(&self.athr)
            ))
        })?;
        self.sizes
            .get(row)
            .and_then(|r| r.get(col))
            .copied()
            .ok_or_else(|| AfniPrepError::ParseError(format!("3dClustSim table has no entry for p={} alpha={}", p, alpha)))
    }
}

fn join(values: &[f64]) -> String {
    values.iter().map(|v| v.to_string()).collect::<Vec<_>>().join(", ")
}

/// Read the 3dClustSim table for `nn`/`bisided` out of a `.HEAD` file's text.
pub fn parse_clustsim(head_text: &str, nn: u8, bisided: bool) -> Result<ClustSimTable> {
    let sided = if bisided { "bisided" } else { "1sided" };
    let name = format!("name = AFNI_CLUSTSIM_NN{}_{}", nn, sided);
    let close = format!("</3dClustSim_NN{}>", nn);

    let mut started = false;
    let mut in_rows = false;
    let mut pthr = None;
    let mut athr = None;
    let mut sizes = Vec::new();

    for line in head_text.lines() {
        if line.contains(&name) {
            started = true;
            continue;
        }
        if !started {
            continue;
        }
        if line.contains(&close) {
            break;
        }
        if in_rows {
            if let Some(row) = values_row(line) {
                sizes.push(row);
            }
            continue;
        }
        if line.contains("pthr=\"") {
            pthr = Some(quoted_list(line, "pthr")?);
        }
        if line.contains("athr=\"") {
            athr = Some(quoted_list(line, "athr")?);
        }
        if line.contains("mask_count=") {
            in_rows = true;
        }
    }

    match (pthr, athr) {
        (Some(pthr), Some(athr)) if !sizes.is_empty() => Ok(ClustSimTable { pthr, athr, sizes }),
        _ => Err(AfniPrepError::ParseError(format!(
            "AFNI_CLUSTSIM_NN{}_{} table; run the t-test with -Clustsim so the header carries it",
            nn, sided
        ))),
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ClusterReport {
    pub dataset: PathBuf,
    pub p: f64,
    pub z: f64,
    pub alpha: f64,
    pub min_voxels: f64,
    /// Clustered dataset, when kept
    pub clustered: Option<PathBuf>,
    pub surfaces: Vec<PathBuf>,
}

fn afni_files(dir: &Path, prefix: &str) -> [PathBuf; 3] {
    [
        dir.join(format!("{}+tlrc.HEAD", prefix)),
        dir.join(format!("{}+tlrc.BRIK", prefix)),
        dir.join(format!("{}+tlrc.BRIK.gz", prefix)),
    ]
}

fn remove_afni(dir: &Path, prefix: &str) -> Result<()> {
    for path in afni_files(dir, prefix) {
        if path.exists() {
            std::fs::remove_file(path)?;
        }
    }
    Ok(())
}

/// Refuse to run over outputs of an earlier run.
fn check_leftovers(dir: &Path, out_prefix: &str) -> Result<()> {
    let mut leftovers: Vec<PathBuf> = afni_files(dir, CLUST_MASK).into_iter().filter(|p| p.exists()).collect();
    leftovers.extend(afni_files(dir, out_prefix).into_iter().filter(|p| p.exists()));
    for name in [
        format!("{}.nii", out_prefix),
        format!("{}_L.func.gii", out_prefix),
        format!("{}_R.func.gii", out_prefix),
    ] {
        let path = dir.join(name);
        if path.exists() {
            leftovers.push(path);
        }
    }

    match leftovers.first() {
        None => Ok(()),
        Some(first) => Err(AfniPrepError::Layout(format!(
            "{} remains from a previous run; delete it before continuing",
            first.display()
        ))),
    }
}

/// Threshold and cluster-correct one AFNI dataset, keep only surviving voxels and map
/// the result to the surface.
pub async fn run_cluster_correction<R: ToolRunner>(
    runner: &R,
    toolbox: &Toolbox,
    dataset: &Path,
    opts: &ClusterOptions,
) -> Result<ClusterReport> {
    opts.validate()?;
    let input = VolumeInput::detect(dataset)?;
    if input.format != VolumeFormat::Afni {
        return Err(AfniPrepError::InvalidParameter(format!(
            "{}: cluster correction needs an AFNI dataset",
            dataset.display()
        )));
    }
    let out_prefix = format!("{}_Clust{}", input.stem(), opts.normalized_suffix());
    check_leftovers(&input.dir, &out_prefix)?;

    let p = opts.p_value();
    let z = z_for_p(p);
    if let Threshold::Z(desired) = opts.threshold {
        log::info!("Desired z {}, z used {}, p used {}", desired, z, p);
    }

    let head = std::fs::read_to_string(input.dir.join(format!("{}.HEAD", input.name)))?;
    let table = parse_clustsim(&head, opts.nn, opts.bisided)?;
    let min_voxels = table.min_cluster_size(p, opts.alpha)?;
    log::info!("Cluster correction for {}: |z| > {}, {} voxels", input.name, z, min_voxels);

    let result = async {
        let clust = Invocation::new(toolbox, Tool::ThreeDClust)
            .args(["-1Dformat", "-nosum", "-1dindex", "0", "-1tindex", "1", "-2thresh"])
            .arg(format!("-{}", z))
            .arg(z.to_string())
            .args(["-dxyz=1", "-savemask", CLUST_MASK])
            .arg(format!("-NN{}", opts.nn))
            .arg(min_voxels.to_string())
            .arg(&input.name)
            .current_dir(&input.dir);
        runner.run(&clust).await?;

        let calc = Invocation::new(toolbox, Tool::ThreeDCalc)
            .arg("-a")
            .arg(format!("{}+tlrc", CLUST_MASK))
            .arg("-b")
            .arg(format!("{}[0]", input.name))
            .args(["-expr", "step(a)*b", "-prefix"])
            .arg(&out_prefix)
            .current_dir(&input.dir);
        runner.run(&calc).await?;

        let clustered = input.dir.join(format!("{}+tlrc", out_prefix));
        map_volume_to_surface(runner, toolbox, &clustered, &opts.surface).await
    }
    .await;

    remove_afni(&input.dir, CLUST_MASK)?;
    if !opts.keep_afni {
        remove_afni(&input.dir, &out_prefix)?;
    }
    let surface = result?;

    Ok(ClusterReport {
        dataset: input.dir.join(format!("{}.HEAD", input.name)),
        p,
        z,
        alpha: opts.alpha,
        min_voxels,
        clustered: opts.keep_afni.then(|| input.dir.join(format!("{}+tlrc.HEAD", out_prefix))),
        surfaces: surface.outputs,
    })
}

/// Cluster-correct every `.HEAD` dataset present in `dir` when the run starts.
pub async fn cluster_directory<R: ToolRunner>(
    runner: &R,
    toolbox: &Toolbox,
    dir: &Path,
    opts: &ClusterOptions,
) -> Result<Vec<ClusterReport>> {
    let mut datasets: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.extension().map(|x| x == "HEAD").unwrap_or(false))
        .collect();
    datasets.sort();
    if datasets.is_empty() {
        return Err(AfniPrepError::FileNotFound(format!("{}/*.HEAD", dir.display())));
    }

    let mut reports = Vec::new();
    for dataset in datasets {
        reports.push(run_cluster_correction(runner, toolbox, &dataset, opts).await?);
    }
    Ok(reports)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::RecordingRunner;
    use crate::surface::fixtures;

    const HEAD: &str = "\
type = string-attribute
name = AFNI_CLUSTSIM_NN1_bisided
count = 400
'<3dClustSim_NN1
  ni_type=\"4*float\"
  pthr=\"0.050000,0.010000,0.001000\"
  athr=\"0.100000,0.050000,0.010000\"
  mask_count=\"65000\" >
 210.5 260.1 380.0
 80.2 95.0 130.7
 25.1 30.4 42.9
</3dClustSim_NN1>~

type = string-attribute
name = AFNI_CLUSTSIM_NN3_bisided
count = 400
'<3dClustSim_NN3
  pthr=\"0.050000,0.001000\"
  athr=\"0.050000\"
  mask_count=\"65000\" >
 300.0
 40.0
</3dClustSim_NN3>~
";

    #[test]
    fn test_p_z_conversion() {
        assert_eq!(z_for_p(0.05), 1.96);
        assert_eq!(z_for_p(0.001), 3.291);
        assert_eq!(p_for_z(1.96), 0.05);
        assert_eq!(p_for_z(3.291), 0.001);
        assert_eq!(p_for_z(2.5), 0.01);
    }

    #[test]
    fn test_parse_clustsim() {
        let table = parse_clustsim(HEAD, 1, true).unwrap();
        assert_eq!(table.pthr, vec![0.05, 0.01, 0.001]);
        assert_eq!(table.sizes.len(), 3);
        assert_eq!(table.min_cluster_size(0.001, 0.05).unwrap(), 30.4);
        assert_eq!(parse_clustsim(HEAD, 3, true).unwrap().min_cluster_size(0.001, 0.05).unwrap(), 40.0);

        assert!(matches!(table.min_cluster_size(0.002, 0.05), Err(AfniPrepError::InvalidParameter(_))));
        assert!(matches!(table.min_cluster_size(0.01, 0.2), Err(AfniPrepError::InvalidParameter(_))));
        assert!(matches!(parse_clustsim(HEAD, 2, true), Err(AfniPrepError::ParseError(_))));
        assert!(matches!(parse_clustsim(HEAD, 1, false), Err(AfniPrepError::ParseError(_))));
    }

    #[test]
    fn test_suffix() {
        let mut opts = ClusterOptions::new(Threshold::P(0.001), SurfaceOptions::new("/tmp"));
        assert_eq!(opts.normalized_suffix(), "");
        opts.suffix = "v2".into();
        assert_eq!(opts.normalized_suffix(), "_v2");
        opts.suffix = "-v2".into();
        assert_eq!(opts.normalized_suffix(), "-v2");
        opts.nn = 4;
        assert!(opts.validate().is_err());
    }

    #[tokio::test]
    async fn test_cluster_correction() {
        let tmp = tempfile::tempdir().unwrap();
        let surf = tmp.path().join("surface_files");
        fixtures::surfaces(&surf);
        std::fs::write(tmp.path().join("ttest+tlrc.HEAD"), HEAD).unwrap();

        let runner = RecordingRunner::with_responder(|inv| {
            let dir = inv.cwd.clone().unwrap();
            match inv.tool {
                Tool::ThreeDClust => std::fs::write(dir.join("Clust_mask+tlrc.HEAD"), "").unwrap(),
                Tool::ThreeDCalc => std::fs::write(dir.join("ttest_Clust_a+tlrc.HEAD"), "").unwrap(),
                Tool::ThreeDAfniToNifti => std::fs::write(dir.join("ttest_Clust_a.nii"), "").unwrap(),
                _ => {}
            }
            Ok(String::new())
        });
        let mut opts = ClusterOptions::new(Threshold::Z(3.3), SurfaceOptions::new(&surf));
        opts.nn = 1;
        opts.suffix = "a".into();

        let report = run_cluster_correction(&runner, &Toolbox::default(), &tmp.path().join("ttest+tlrc.HEAD"), &opts)
            .await
            .unwrap();

        assert_eq!((report.p, report.z, report.min_voxels), (0.001, 3.291, 30.4));
        let clust = &runner.calls_to(Tool::ThreeDClust)[0];
        assert_eq!(clust.arg_after("-2thresh"), Some("-3.291"));
        assert_eq!(clust.arg_after("-NN1"), Some("30.4"));
        assert_eq!(clust.args.last().unwrap(), "ttest+tlrc");
        let calc = &runner.calls_to(Tool::ThreeDCalc)[0];
        assert_eq!(calc.arg_after("-b"), Some("ttest+tlrc[0]"));
        assert_eq!(calc.arg_after("-prefix"), Some("ttest_Clust_a"));

        assert_eq!(report.surfaces.len(), 2);
        assert!(!tmp.path().join("Clust_mask+tlrc.HEAD").exists());
        assert!(!tmp.path().join("ttest_Clust_a+tlrc.HEAD").exists());
        assert!(!tmp.path().join("ttest_Clust_a.nii").exists());
    }

    #[tokio::test]
    async fn test_refuses_leftovers() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("ttest+tlrc.HEAD"), HEAD).unwrap();
        std::fs::write(tmp.path().join("Clust_mask+tlrc.HEAD"), "").unwrap();
        let opts = ClusterOptions::new(Threshold::P(0.001), SurfaceOptions::new(tmp.path()));

        let result =
            run_cluster_correction(&RecordingRunner::new(), &Toolbox::default(), &tmp.path().join("ttest+tlrc.HEAD"), &opts)
                .await;
        assert!(matches!(result, Err(AfniPrepError::Layout(_))));
    }
}
