use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::config::TrackerConfig;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WarningStage {
    #[default]
    None,
    Warned30s,
    Warned45s,
}

/// Where the tracker sits in its lifecycle.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum TrackerPhase {
    /// Not tracking, nothing accumulated yet.
    Idle,
    Active,
    Warned30,
    Warned45,
    Paused,
    /// Clock frozen by a send; the submission task owns what happens next.
    Submitting,
    Destroyed,
}

/// The status label shown next to the elapsed time.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum StatusLabel {
    Paused,
    Active,
    #[serde(rename = "Warning-30")]
    Warning30,
    #[serde(rename = "Warning-45")]
    Warning45,
}

impl StatusLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatusLabel::Paused => "Paused",
            StatusLabel::Active => "Active",
            StatusLabel::Warning30 => "Warning-30",
            StatusLabel::Warning45 => "Warning-45",
        }
    }
}

/// What a countdown deadline did when it came due.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Escalation {
    Warned30,
    Warned45,
    /// Clock stopped; carries the accumulated total.
    Paused { total_ms: u64 },
}

#[derive(Debug, Clone)]
pub struct TrackerState {
    pub id: String,
    pub display_index: usize,
    pub is_tracking: bool,
    /// Time from completed sessions; the running session is added on read.
    pub total_accumulated_ms: u64,
    pub warning_stage: WarningStage,
    start_time: Option<Instant>,
    last_activity: Instant,
    submitting: bool,
    destroyed: bool,
}

impl TrackerState {
    pub fn new(id: String, display_index: usize, now: Instant) -> Self {
        Self {
            id,
            display_index,
            is_tracking: false,
            total_accumulated_ms: 0,
            warning_stage: WarningStage::None,
            start_time: None,
            last_activity: now,
            submitting: false,
            destroyed: false,
        }
    }

    pub fn start_time(&self) -> Option<Instant> {
        self.start_time
    }

    pub fn last_activity(&self) -> Instant {
        self.last_activity
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    pub fn is_submitting(&self) -> bool {
        self.submitting
    }

    /// Completed sessions plus the running one, if any. No side effects.
    pub fn calculate_elapsed(&self, now: Instant) -> u64 {
        let running = match (self.is_tracking, self.start_time) {
            (true, Some(start)) => now.saturating_duration_since(start).as_millis() as u64,
            _ => 0,
        };
        self.total_accumulated_ms.saturating_add(running)
    }

    pub fn phase(&self) -> TrackerPhase {
        if self.destroyed {
            TrackerPhase::Destroyed
        } else if self.submitting {
            TrackerPhase::Submitting
        } else if self.is_tracking {
            match self.warning_stage {
                WarningStage::None => TrackerPhase::Active,
                WarningStage::Warned30s => TrackerPhase::Warned30,
                WarningStage::Warned45s => TrackerPhase::Warned45,
            }
        } else if self.total_accumulated_ms == 0 {
            TrackerPhase::Idle
        } else {
            TrackerPhase::Paused
        }
    }

    pub fn status_label(&self) -> StatusLabel {
        if !self.is_tracking {
            return StatusLabel::Paused;
        }
        match self.warning_stage {
            WarningStage::None => StatusLabel::Active,
            WarningStage::Warned30s => StatusLabel::Warning30,
            WarningStage::Warned45s => StatusLabel::Warning45,
        }
    }

    /// Records an activity signal. Returns `true` when it started a new
    /// session. Ignored once the tracker is submitting or destroyed.
    pub fn register_activity(&mut self, now: Instant) -> bool {
        if self.destroyed || self.submitting {
            return false;
        }
        self.last_activity = now;
        self.warning_stage = WarningStage::None;
        if self.is_tracking {
            return false;
        }
        self.is_tracking = true;
        self.start_time = Some(now);
        true
    }

    /// Folds the running session into the total and stops the clock.
    /// Returns `false` if the clock was not running.
    pub fn pause(&mut self, now: Instant) -> bool {
        let Some(start) = self.start_time.take() else {
            self.is_tracking = false;
            return false;
        };
        self.total_accumulated_ms = self
            .total_accumulated_ms
            .saturating_add(now.saturating_duration_since(start).as_millis() as u64);
        self.is_tracking = false;
        self.warning_stage = WarningStage::None;
        true
    }

    /// When the next escalation is due, measured from the last activity.
    pub fn next_deadline(&self, config: &TrackerConfig) -> Option<Instant> {
        if self.destroyed || self.submitting || !self.is_tracking {
            return None;
        }
        let offset = match self.warning_stage {
            WarningStage::None => config.warn_after,
            WarningStage::Warned30s => config.strong_warn_after,
            WarningStage::Warned45s => config.pause_after,
        };
        Some(self.last_activity + offset)
    }

    /// Applies the escalation that is due at `now`, if any. Callers loop
    /// until `None` to catch up after a late wakeup.
    pub fn escalate(&mut self, now: Instant, config: &TrackerConfig) -> Option<Escalation> {
        let deadline = self.next_deadline(config)?;
        if now < deadline {
            return None;
        }
        match self.warning_stage {
            WarningStage::None => {
                self.warning_stage = WarningStage::Warned30s;
                Some(Escalation::Warned30)
            }
            WarningStage::Warned30s => {
                self.warning_stage = WarningStage::Warned45s;
                Some(Escalation::Warned45)
            }
            WarningStage::Warned45s => {
                // Idle time past the pause threshold is never billed.
                self.pause(deadline);
                Some(Escalation::Paused {
                    total_ms: self.total_accumulated_ms,
                })
            }
        }
    }

    /// Stops the clock for a send and returns the frozen elapsed time.
    pub fn freeze_for_submission(&mut self, now: Instant) -> Option<u64> {
        if self.destroyed || self.submitting {
            return None;
        }
        self.pause(now);
        self.submitting = true;
        Some(self.total_accumulated_ms)
    }

    /// Zeroes the accumulated time and stops the clock.
    pub fn clear(&mut self, now: Instant) {
        self.total_accumulated_ms = 0;
        self.start_time = None;
        self.is_tracking = false;
        self.warning_stage = WarningStage::None;
        self.last_activity = now;
    }

    /// Marks the tracker destroyed. Returns `false` if it already was.
    pub fn mark_destroyed(&mut self, now: Instant) -> bool {
        if self.destroyed {
            return false;
        }
        self.pause(now);
        self.destroyed = true;
        true
    }
}
