pub mod cluster;
pub mod convert;
pub mod download;
pub mod events;
pub mod glms;
pub mod info;
pub mod qc;
pub mod roi;
pub mod roi_trials;
pub mod setup;
pub mod timing;
pub mod vol2surf;
