pub mod composer;
pub mod config;
pub mod controller;
pub mod error;
pub mod exclusions;
pub mod host_info;
pub mod naming;
pub mod object_store;
pub mod progress;
pub mod run_log;
pub mod sidecars;
pub mod signals;
pub mod snapshot_index;
pub mod sparse;
pub mod tar_encoder;
pub mod upload_pipeline;
pub mod volume_label;

pub const APP_NAME: &str = "seqrun-upload";

pub use config::Config;
pub use controller::{RunOutcome, run};
pub use error::{Error, Result};
pub use object_store::{GcsObjectStore, InMemoryObjectStore, ObjectStore};
