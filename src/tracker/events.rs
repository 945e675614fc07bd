use std::sync::Mutex;

use log::info;
use serde::Serialize;
use tokio::sync::mpsc;

use super::state::StatusLabel;

/// Everything the tracking core tells the UI layer.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum TrackerEvent {
    #[serde(rename_all = "camelCase")]
    IndicatorAdded { id: String, display_index: usize },
    #[serde(rename_all = "camelCase")]
    Repositioned { id: String, display_index: usize },
    /// Periodic refresh of the time readout.
    #[serde(rename_all = "camelCase")]
    Tick {
        id: String,
        elapsed_ms: u64,
        formatted: String,
        status: StatusLabel,
    },
    #[serde(rename_all = "camelCase")]
    StatusChanged {
        id: String,
        status: StatusLabel,
        elapsed_ms: u64,
    },
    #[serde(rename_all = "camelCase")]
    InactivityWarning { id: String, seconds_idle: u64, message: String },
    #[serde(rename_all = "camelCase")]
    AutoPaused { id: String, total_ms: u64, formatted: String },
    #[serde(rename_all = "camelCase")]
    Resumed { id: String },
    #[serde(rename_all = "camelCase")]
    Cleared { id: String },
    #[serde(rename_all = "camelCase")]
    Processing { id: String },
    #[serde(rename_all = "camelCase")]
    SubmissionSucceeded {
        id: String,
        entry_id: String,
        client: String,
        summary: String,
        hours: f64,
        platform_synced: bool,
    },
    #[serde(rename_all = "camelCase")]
    SubmissionFailed { id: String, message: String },
    #[serde(rename_all = "camelCase")]
    IndicatorRemoved { id: String },
}

impl TrackerEvent {
    pub fn name(&self) -> &'static str {
        match self {
            TrackerEvent::IndicatorAdded { .. } => "indicator-added",
            TrackerEvent::Repositioned { .. } => "repositioned",
            TrackerEvent::Tick { .. } => "tick",
            TrackerEvent::StatusChanged { .. } => "status-changed",
            TrackerEvent::InactivityWarning { .. } => "inactivity-warning",
            TrackerEvent::AutoPaused { .. } => "auto-paused",
            TrackerEvent::Resumed { .. } => "resumed",
            TrackerEvent::Cleared { .. } => "cleared",
            TrackerEvent::Processing { .. } => "processing",
            TrackerEvent::SubmissionSucceeded { .. } => "submission-succeeded",
            TrackerEvent::SubmissionFailed { .. } => "submission-failed",
            TrackerEvent::IndicatorRemoved { .. } => "indicator-removed",
        }
    }

    pub fn tracker_id(&self) -> &str {
        match self {
            TrackerEvent::IndicatorAdded { id, .. }
            | TrackerEvent::Repositioned { id, .. }
            | TrackerEvent::Tick { id, .. }
            | TrackerEvent::StatusChanged { id, .. }
            | TrackerEvent::InactivityWarning { id, .. }
            | TrackerEvent::AutoPaused { id, .. }
            | TrackerEvent::Resumed { id }
            | TrackerEvent::Cleared { id }
            | TrackerEvent::Processing { id }
            | TrackerEvent::SubmissionSucceeded { id, .. }
            | TrackerEvent::SubmissionFailed { id, .. }
            | TrackerEvent::IndicatorRemoved { id } => id,
        }
    }
}

/// Receives UI events. Emission must not block.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: TrackerEvent);
}

impl EventSink for mpsc::UnboundedSender<TrackerEvent> {
    fn emit(&self, event: TrackerEvent) {
        let _ = self.send(event);
    }
}

/// Writes events to the log; ticks are dropped.
#[derive(Debug, Default)]
pub struct LogSink;

impl EventSink for LogSink {
    fn emit(&self, event: TrackerEvent) {
        if matches!(event, TrackerEvent::Tick { .. }) {
            return;
        }
        match serde_json::to_string(&event) {
            Ok(payload) => info!("{} {}", event.name(), payload),
            Err(_) => info!("{} {:?}", event.name(), event),
        }
    }
}

/// Keeps every event in memory, in order.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<TrackerEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<TrackerEvent> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Recorded events without the periodic ticks.
    pub fn notable(&self) -> Vec<TrackerEvent> {
        self.events()
            .into_iter()
            .filter(|event| !matches!(event, TrackerEvent::Tick { .. }))
            .collect()
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: TrackerEvent) {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(event);
    }
}
