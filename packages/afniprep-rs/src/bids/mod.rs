pub mod acquire;
pub mod layout;
pub mod reorganize;

pub use acquire::{backup_archive, convert_dicoms, download_dicoms, BackupRequest, DownloadRequest, ExperimentId};
pub use layout::{create_folders, session_paths, LayoutReport, SessionPaths};
pub use reorganize::{reorganize_nifti, ReorganizeReport, ReorganizeRequest};
