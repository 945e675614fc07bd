pub mod config;
pub mod db;
pub mod detector;
pub mod dom;
pub mod registry;
pub mod settings;
pub mod simulate;
pub mod store;
pub mod submission;
pub mod summary;
pub mod tracker;
pub mod utils;

mod cli;

pub use cli::run;
pub use config::{BillingConfig, EntryDatePolicy, TrackerConfig};
pub use registry::{DetectionController, TrackerRegistry};
pub use tracker::{TrackerContext, TrackerEvent, TrackerHandle};
