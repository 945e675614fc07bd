pub mod controller;
pub mod events;
pub mod state;

pub use controller::{TrackerContext, TrackerHandle, TrackerObserver, TrackerSnapshot};
pub use events::{EventSink, LogSink, RecordingSink, TrackerEvent};
pub use state::{Escalation, StatusLabel, TrackerPhase, TrackerState, WarningStage};
