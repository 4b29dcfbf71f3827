use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(
    name = "afniprep",
    version,
    about = "BIDS preparation, AFNI timing files and ROI summaries for fMRI studies",
    long_about = "Prepare, convert and summarize fMRI study data around AFNI and BIDS.\n\
                  Requires AFNI, dcm2niix and Workbench on $PATH, or set $AFNI_HOME,\n\
                  $DCM2NIIX_PATH and $WORKBENCH_DIR."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Subcommand)]
pub enum Command {
    /// Show external tool locations
    Info(InfoArgs),
    /// Create the BIDS folders of a participant
    Setup(SetupArgs),
    /// Download a session's DICOM archive from CNDA
    Download(DownloadArgs),
    /// Convert DICOMs to NIfTI and reorganize them into BIDS
    Convert(ConvertArgs),
    /// Code PsychoPy behavioral files into BIDS events files
    Events(EventsArgs),
    /// Write AFNI stimulus timing files from events files
    Timing(TimingArgs),
    /// Extract and average ROI magnitudes or timecourses
    Roi(RoiArgs),
    /// Extract per-trial ROI magnitudes for mixed-effects models
    RoiTrials(RoiTrialsArgs),
    /// List the GLMs (and their conditions) available for ROI analysis
    Glms(GlmsArgs),
    /// Collect first-level quality-control outputs
    Qc(QcArgs),
    /// Cluster-correct statistical maps and map them to the surface
    Cluster(ClusterArgs),
    /// Map a volume onto Conte69 surfaces
    Vol2surf(Vol2SurfArgs),
}

/// Explicit tool locations; each falls back to discovery when unset
#[derive(Args, Clone, Default)]
pub struct ToolArgs {
    /// AFNI binaries directory
    #[arg(long, env = "AFNI_HOME")]
    pub afni_dir: Option<String>,

    /// dcm2niix executable
    #[arg(long, env = "DCM2NIIX_PATH")]
    pub dcm2niix: Option<String>,

    /// Workbench binaries directory (holding wb_command)
    #[arg(long, env = "WORKBENCH_DIR")]
    pub workbench_dir: Option<String>,
}

/// Output flags shared by commands with a structured report
#[derive(Args, Clone, Default)]
pub struct OutputArgs {
    /// Print the report as JSON
    #[arg(long, default_value_t = false)]
    pub json: bool,

    /// Write the JSON report to a file instead of stdout (implies --json)
    #[arg(short, long)]
    pub output: Option<String>,

    /// Compact JSON output (no indentation)
    #[arg(long, default_value_t = false)]
    pub compact: bool,

    /// Suppress progress messages on stderr
    #[arg(long, default_value_t = false)]
    pub quiet: bool,
}

impl OutputArgs {
    pub fn wants_json(&self) -> bool {
        self.json || self.output.is_some()
    }
}

/// Which participant the command works on
#[derive(Args, Clone)]
pub struct ParticipantArgs {
    /// BIDS dataset root
    #[arg(long)]
    pub bids_root: String,

    /// Participant number (zero-padded to three digits in labels)
    #[arg(long)]
    pub participant: u32,

    /// Study prefix placed before the participant number (e.g. "erwd")
    #[arg(long, default_value = "")]
    pub prefix: String,
}

#[derive(Args)]
pub struct InfoArgs {
    #[command(flatten)]
    pub tools: ToolArgs,

    /// Output as JSON
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Args)]
pub struct SetupArgs {
    #[command(flatten)]
    pub ids: ParticipantArgs,

    /// Session numbers to create; omit for a single-session study
    #[arg(long, num_args = 1..)]
    pub sessions: Vec<u32>,

    #[command(flatten)]
    pub report: OutputArgs,
}

#[derive(Args)]
pub struct DownloadArgs {
    #[command(flatten)]
    pub ids: ParticipantArgs,

    /// Session number; omit for a single-session study
    #[arg(long)]
    pub session: Option<u32>,

    /// Scan id (vc number); also names the archive
    #[arg(long)]
    pub scan_id: String,

    /// CNDA project id
    #[arg(long)]
    pub project: String,

    /// CNDA login
    #[arg(long, env = "CNDA_LOGIN")]
    pub login: String,

    /// CNDA password
    #[arg(long, env = "CNDA_PASSWORD", hide_env_values = true)]
    pub password: String,

    /// Scan date (YYYY-MM-DD) when the experiment id carries it
    #[arg(long)]
    pub date: Option<String>,

    /// Copy the archive to a backup host with scp, removing it locally on success
    #[arg(long, default_value_t = false)]
    pub backup: bool,

    /// Backup host
    #[arg(long, default_value = afniprep_rs::bids::acquire::DEFAULT_BACKUP_HOST)]
    pub backup_host: String,

    /// Remote folder on the backup host
    #[arg(long, default_value = ".")]
    pub backup_folder: String,

    #[command(flatten)]
    pub tools: ToolArgs,

    #[command(flatten)]
    pub report: OutputArgs,
}

#[derive(Args)]
pub struct ConvertArgs {
    #[command(flatten)]
    pub ids: ParticipantArgs,

    /// Session number; omit for a single-session study
    #[arg(long)]
    pub session: Option<u32>,

    /// Marker present in the protocol name of every task BOLD scan
    #[arg(long)]
    pub task_code: String,

    /// Only run dcm2niix, leaving the NIfTI folder as written
    #[arg(long, default_value_t = false)]
    pub no_reorganize: bool,

    #[command(flatten)]
    pub tools: ToolArgs,

    #[command(flatten)]
    pub report: OutputArgs,
}

#[derive(Args)]
pub struct EventsArgs {
    #[command(flatten)]
    pub ids: ParticipantArgs,

    /// Folder holding the PsychoPy .csv/.log exports
    #[arg(long)]
    pub raw_dir: String,

    /// Session being coded; omit for a single-session study
    #[arg(long)]
    pub session: Option<u32>,

    /// Number of sessions in the study
    #[arg(long, default_value_t = 1)]
    pub session_count: u32,

    /// JSON file overriding the built-in study profile
    #[arg(long)]
    pub study: Option<String>,

    #[command(flatten)]
    pub report: OutputArgs,
}

#[derive(Args)]
pub struct TimingArgs {
    #[command(flatten)]
    pub ids: ParticipantArgs,

    /// Session numbers to collect events from; omit for a single-session study
    #[arg(long, num_args = 1..)]
    pub sessions: Vec<u32>,

    /// Output folder (default: the participant's AFNI_timing_files/)
    #[arg(long)]
    pub onsets_dir: Option<String>,

    /// JSON file overriding the built-in study profile
    #[arg(long)]
    pub study: Option<String>,

    #[command(flatten)]
    pub report: OutputArgs,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum MethodArg {
    /// Spheres around coordinates listed in .txt files
    Spherical,
    /// AFNI mask datasets (+tlrc.HEAD)
    Mask,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum MeasureArg {
    /// GAM coefficients
    Magnitudes,
    /// TENT impulse responses
    Timecourses,
}

#[derive(Args)]
pub struct RoiArgs {
    /// subject_results folder written by afni_proc.py (remembered between runs)
    #[arg(long)]
    pub subject_results: Option<String>,

    /// Folder with ROI coordinate files and masks (remembered between runs)
    #[arg(long)]
    pub masks: Option<String>,

    /// ROI methods to run (default: both)
    #[arg(long, value_enum, num_args = 1..)]
    pub method: Vec<MethodArg>,

    /// Measures to extract (default: both)
    #[arg(long, value_enum, num_args = 1..)]
    pub measure: Vec<MeasureArg>,

    /// Subject ids to include (default: all)
    #[arg(long, num_args = 1..)]
    pub subjects: Option<Vec<String>>,

    /// GLM folders to include (default: all of the matching kind)
    #[arg(long, num_args = 1..)]
    pub glms: Option<Vec<String>>,

    /// Conditions to extract (default: all)
    #[arg(long, num_args = 1..)]
    pub conditions: Option<Vec<String>>,

    /// Coordinate order of sphere centres: LPI or RAI
    #[arg(long)]
    pub coord_system: Option<String>,

    /// Sphere radius in mm
    #[arg(long)]
    pub radius: Option<u32>,

    /// Warn instead of failing when a dataset's orientation differs from --coord-system
    #[arg(long, default_value_t = false)]
    pub allow_orientation_mismatch: bool,

    /// Presets file (default: <config dir>/afniprep/roi_presets.json)
    #[arg(long)]
    pub presets: Option<String>,

    /// Do not write the effective settings back to the presets file
    #[arg(long, default_value_t = false)]
    pub no_save_presets: bool,

    #[command(flatten)]
    pub tools: ToolArgs,

    #[command(flatten)]
    pub report: OutputArgs,
}

#[derive(Args)]
pub struct RoiTrialsArgs {
    /// subject_results folder written by afni_proc.py
    #[arg(long)]
    pub subject_results: String,

    /// Folder with ROI mask datasets
    #[arg(long)]
    pub masks: String,

    /// GLM folder holding the single-trial betas
    #[arg(long)]
    pub glm: String,

    /// Subject ids to include (default: all)
    #[arg(long, num_args = 1..)]
    pub subjects: Option<Vec<String>>,

    #[command(flatten)]
    pub tools: ToolArgs,

    #[command(flatten)]
    pub report: OutputArgs,
}

#[derive(Args)]
pub struct GlmsArgs {
    /// subject_results folder written by afni_proc.py
    #[arg(long)]
    pub subject_results: String,

    /// Only list GLMs for this measure
    #[arg(long, value_enum)]
    pub measure: Option<MeasureArg>,

    /// Subject ids to look in (default: all)
    #[arg(long, num_args = 1..)]
    pub subjects: Option<Vec<String>>,

    /// Also list each GLM's conditions (runs 3dinfo)
    #[arg(long, default_value_t = false)]
    pub conditions: bool,

    #[command(flatten)]
    pub tools: ToolArgs,

    /// Output as JSON
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Args)]
pub struct QcArgs {
    /// subject_results folder written by afni_proc.py
    #[arg(long)]
    pub subject_results: String,

    /// Skip review tables for GLMs with more than 50 coefficients
    #[arg(long, default_value_t = false)]
    pub skip_large_glms: bool,

    /// Folder holding template datasets (default: ~/abin)
    #[arg(long)]
    pub template_dir: Option<String>,

    #[command(flatten)]
    pub tools: ToolArgs,

    #[command(flatten)]
    pub report: OutputArgs,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum HemisphereArg {
    Left,
    Right,
    Both,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum MappingArg {
    Enclosing,
    Trilinear,
    RibbonConstrained,
}

/// Volume-to-surface mapping flags
#[derive(Args, Clone)]
pub struct SurfaceArgs {
    /// Folder with the Conte69 32k_fs_LR surfaces
    #[arg(long, env = "AFNIPREP_SURFACE_DIR")]
    pub surface_dir: String,

    /// Hemispheres to map
    #[arg(long, value_enum, default_value_t = HemisphereArg::Both)]
    pub hemisphere: HemisphereArg,

    /// Workbench mapping method
    #[arg(long, value_enum, default_value_t = MappingArg::RibbonConstrained)]
    pub mapping: MappingArg,

    /// Sub-brick converted from AFNI datasets
    #[arg(long, default_value_t = 0)]
    pub subbrick: u32,

    /// Keep the intermediate NIfTI
    #[arg(long, default_value_t = false)]
    pub keep_nifti: bool,
}

#[derive(Args)]
pub struct ClusterArgs {
    /// Statistical dataset (+tlrc.HEAD), or a folder to process every dataset in it
    #[arg(long)]
    pub input: String,

    /// Voxelwise p threshold
    #[arg(long, conflicts_with = "z", required_unless_present = "z")]
    pub p: Option<f64>,

    /// Voxelwise z threshold (converted to the nearest tabulated p)
    #[arg(long)]
    pub z: Option<f64>,

    /// Cluster-level alpha
    #[arg(long, default_value_t = 0.05)]
    pub alpha: f64,

    /// Neighbourhood (1, 2 or 3)
    #[arg(long, default_value_t = 3)]
    pub nn: u8,

    /// Use the one-sided tables instead of the bi-sided ones
    #[arg(long, default_value_t = false)]
    pub one_sided: bool,

    /// Suffix appended to the clustered dataset name
    #[arg(long, default_value = "")]
    pub suffix: String,

    /// Keep the clustered AFNI dataset
    #[arg(long, default_value_t = false)]
    pub keep_afni: bool,

    #[command(flatten)]
    pub surface: SurfaceArgs,

    #[command(flatten)]
    pub tools: ToolArgs,

    #[command(flatten)]
    pub report: OutputArgs,
}

#[derive(Args)]
pub struct Vol2SurfArgs {
    /// Volume to map (AFNI +tlrc.HEAD, .nii, .nii.gz or .4dfp.img)
    #[arg(long)]
    pub input: String,

    #[command(flatten)]
    pub surface: SurfaceArgs,

    #[command(flatten)]
    pub tools: ToolArgs,

    #[command(flatten)]
    pub report: OutputArgs,
}
