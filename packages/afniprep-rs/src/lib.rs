pub mod types;
pub mod tools;
pub mod runner;
pub mod error;
pub mod report;
pub mod study;
pub mod bids;
pub mod events;
pub mod timing;
pub mod roi;
pub mod qc;
pub mod surface;
pub mod cluster;

pub use types::*;
pub use tools::{find_tool, require_tool, Suite, Tool, Toolbox};
pub use runner::{Invocation, RecordingRunner, SystemRunner, ToolOutput, ToolRunner};
pub use error::{AfniPrepError, Result};
pub use study::StudyProfile;
