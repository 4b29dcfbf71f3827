//! Volume to GIfTI surface mapping with Workbench.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{AfniPrepError, Result};
use crate::runner::{Invocation, ToolRunner};
use crate::tools::{Tool, Toolbox};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Hemisphere {
    Left,
    Right,
    Both,
}

impl Hemisphere {
    /// Workbench hemisphere letters to map, in output order
    pub fn letters(&self) -> &'static [&'static str] {
        match self {
            Hemisphere::Left => &["L"],
            Hemisphere::Right => &["R"],
            Hemisphere::Both => &["L", "R"],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MappingMethod {
    Enclosing,
    Trilinear,
    RibbonConstrained,
}

impl MappingMethod {
    pub fn flag(&self) -> &'static str {
        match self {
            MappingMethod::Enclosing => "-enclosing",
            MappingMethod::Trilinear => "-trilinear",
            MappingMethod::RibbonConstrained => "-ribbon-constrained",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SurfaceOptions {
    pub hemisphere: Hemisphere,
    pub mapping: MappingMethod,
    /// Sub-brick converted from AFNI datasets
    pub subbrick: u32,
    pub keep_nifti: bool,
    /// Folder with the Conte69 32k_fs_LR surfaces
    pub surface_dir: PathBuf,
}

impl SurfaceOptions {
    pub fn new(surface_dir: impl Into<PathBuf>) -> Self {
        Self {
            hemisphere: Hemisphere::Both,
            mapping: MappingMethod::RibbonConstrained,
            subbrick: 0,
            keep_nifti: false,
            surface_dir: surface_dir.into(),
        }
    }
}

/// How the input volume is stored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum VolumeFormat {
    /// `.HEAD`/`.BRIK` pair
    Afni,
    Nifti,
    NiftiGz,
    /// FIDL `.4dfp.img`
    FourDfp,
}

/// An input volume split into folder, base name and format
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VolumeInput {
    pub dir: PathBuf,
    /// File name without format extensions; AFNI datasets keep their view (`x+tlrc`)
    pub name: String,
    pub format: VolumeFormat,
}

impl VolumeInput {
    /// Recognise a volume from a path, accepting AFNI prefixes without extension.
    pub fn detect(path: &Path) -> Result<Self> {
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| AfniPrepError::InvalidParameter(format!("not a file: {}", path.display())))?;

        let detected = [
            (".4dfp.img", VolumeFormat::FourDfp),
            (".nii.gz", VolumeFormat::NiftiGz),
            (".nii", VolumeFormat::Nifti),
            (".BRIK.gz", VolumeFormat::Afni),
            (".HEAD", VolumeFormat::Afni),
            (".BRIK", VolumeFormat::Afni),
        ]
        .iter()
        .find_map(|(ext, format)| file_name.strip_suffix(ext).map(|n| (n.to_string(), *format)));

        let (name, format) = match detected {
            Some(found) => found,
            None if dir.join(format!("{}.HEAD", file_name)).exists() => (file_name, VolumeFormat::Afni),
            None => {
                return Err(AfniPrepError::InvalidParameter(format!(
                    "{}: expected .nii, .nii.gz, .HEAD/.BRIK or .4dfp.img",
                    path.display()
                )))
            }
        };

        let input = Self { dir, name, format };
        if !input.source_path().exists() {
            return Err(AfniPrepError::FileNotFound(input.source_path().display().to_string()));
        }
        Ok(input)
    }

    fn source_path(&self) -> PathBuf {
        let file = match self.format {
            VolumeFormat::Afni => format!("{}.HEAD", self.name),
            VolumeFormat::Nifti => format!("{}.nii", self.name),
            VolumeFormat::NiftiGz => format!("{}.nii.gz", self.name),
            VolumeFormat::FourDfp => format!("{}.4dfp.img", self.name),
        };
        self.dir.join(file)
    }

    /// Base for output names (AFNI view suffix dropped)
    pub fn stem(&self) -> &str {
        match self.format {
            VolumeFormat::Afni => self
                .name
                .strip_suffix("+tlrc")
                .or_else(|| self.name.strip_suffix("+orig"))
                .unwrap_or(&self.name),
            _ => &self.name,
        }
    }
}

/// Conte69 surfaces for one hemisphere
#[derive(Debug, Clone, PartialEq)]
pub struct HemisphereSurfaces {
    pub midthickness: PathBuf,
    pub white: PathBuf,
    pub pial: PathBuf,
}

pub fn conte69_surfaces(surface_dir: &Path, hemisphere: &str) -> HemisphereSurfaces {
    let surface = |kind: &str| surface_dir.join(format!("Conte69.{}.{}.32k_fs_LR.surf.gii", hemisphere, kind));
    HemisphereSurfaces {
        midthickness: surface("midthickness"),
        white: surface("white"),
        pial: surface("pial"),
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SurfaceReport {
    pub volume: PathBuf,
    pub outputs: Vec<PathBuf>,
    /// Intermediate NIfTI, when it was kept
    pub nifti: Option<PathBuf>,
}

/// Map a volume onto the Conte69 midthickness surface of each requested hemisphere.
///
/// AFNI and 4dfp inputs are converted to NIfTI first; outputs are written next to the
/// input as `<stem>_<L|R>.func.gii`.
pub async fn map_volume_to_surface<R: ToolRunner>(
    runner: &R,
    toolbox: &Toolbox,
    volume: &Path,
    opts: &SurfaceOptions,
) -> Result<SurfaceReport> {
    let input = VolumeInput::detect(volume)?;

    let hemispheres: Vec<(&str, HemisphereSurfaces)> = opts
        .hemisphere
        .letters()
        .iter()
        .map(|h| (*h, conte69_surfaces(&opts.surface_dir, h)))
        .collect();
    for (_, surfaces) in &hemispheres {
        let mut needed = vec![&surfaces.midthickness];
        if opts.mapping == MappingMethod::RibbonConstrained {
            needed.extend([&surfaces.white, &surfaces.pial]);
        }
        if let Some(missing) = needed.into_iter().find(|p| !p.exists()) {
            return Err(AfniPrepError::FileNotFound(missing.display().to_string()));
        }
    }

    let nifti = input.dir.join(format!("{}.nii", input.stem()));
    let (mapped, intermediate) = match input.format {
        VolumeFormat::Afni => {
            let inv = Invocation::new(toolbox, Tool::ThreeDAfniToNifti)
                .arg(format!("{}[{}]", input.name, opts.subbrick))
                .current_dir(&input.dir);
            runner.run(&inv).await?;
            (nifti.clone(), true)
        }
        VolumeFormat::FourDfp => {
            let inv = Invocation::new(toolbox, Tool::Nifti4dfp)
                .arg("-n")
                .path_arg(input.source_path())
                .path_arg(&nifti)
                .current_dir(&input.dir);
            runner.run(&inv).await?;
            (nifti.clone(), true)
        }
        VolumeFormat::Nifti | VolumeFormat::NiftiGz => (input.source_path(), false),
    };

    let mut outputs = Vec::new();
    for (letter, surfaces) in &hemispheres {
        let out = input.dir.join(format!("{}_{}.func.gii", input.stem(), letter));
        let mut inv = Invocation::new(toolbox, Tool::WbCommand)
            .arg("-volume-to-surface-mapping")
            .path_arg(&mapped)
            .path_arg(&surfaces.midthickness)
            .path_arg(&out)
            .arg(opts.mapping.flag());
        if opts.mapping == MappingMethod::RibbonConstrained {
            inv = inv
                .path_arg(&surfaces.white)
                .path_arg(&surfaces.pial)
                .args(["-voxel-subdiv", "5"]);
        }
        runner.run(&inv.current_dir(&input.dir)).await?;
        log::info!("output: {}", out.display());
        outputs.push(out);
    }

    // 4dfp conversions are always temporary
    let keep = opts.keep_nifti && input.format == VolumeFormat::Afni;
    let nifti = match (intermediate, keep) {
        (true, false) => {
            if mapped.exists() {
                std::fs::remove_file(&mapped)?;
            }
            None
        }
        (true, true) => Some(mapped),
        (false, _) => None,
    };

    Ok(SurfaceReport {
        volume: input.source_path(),
        outputs,
        nifti,
    })
}
