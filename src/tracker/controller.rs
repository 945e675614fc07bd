use std::{
    sync::{Arc, Weak},
    time::Duration,
};

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use tokio::{
    sync::{broadcast::error::RecvError, Mutex},
    time::{self, Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::{
    config::TrackerConfig,
    detector::{SurfaceDetector, CLAIM_ATTR},
    dom::{Document, DomEvent, EventKind, NodeId},
    submission::{SubmissionOutcome, SubmissionPipeline},
    utils::format_hms,
};
use crate::{log_debug, log_error, log_info, log_warn};

use super::{
    events::{EventSink, TrackerEvent},
    state::{Escalation, StatusLabel, TrackerPhase, TrackerState, WarningStage},
};

const ENABLE_LOGS: bool = true;

/// Everything a tracker needs from its surroundings, shared by all trackers
/// of one document.
pub struct TrackerContext {
    pub doc: Arc<dyn Document>,
    pub detector: Arc<SurfaceDetector>,
    pub config: TrackerConfig,
    pub sink: Arc<dyn EventSink>,
    pub pipeline: Arc<SubmissionPipeline>,
}

/// Told once when a tracker reaches `Destroyed`.
#[async_trait]
pub trait TrackerObserver: Send + Sync {
    async fn tracker_destroyed(&self, id: &str);
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackerSnapshot {
    pub id: String,
    pub surface: NodeId,
    pub display_index: usize,
    pub phase: TrackerPhase,
    pub status: StatusLabel,
    pub is_tracking: bool,
    pub warning_stage: WarningStage,
    pub total_accumulated_ms: u64,
    pub elapsed_ms: u64,
    pub formatted: String,
}

/// How an input event bears on one tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Signal {
    Send,
    Immediate,
    Global,
    Ignore,
}

struct TrackerShared {
    id: String,
    surface: NodeId,
    state: Mutex<TrackerState>,
    cancel: CancellationToken,
    ctx: Arc<TrackerContext>,
    observer: Weak<dyn TrackerObserver>,
}

/// Cheap, cloneable handle to one compose-surface tracker.
#[derive(Clone)]
pub struct TrackerHandle {
    shared: Arc<TrackerShared>,
}

impl TrackerHandle {
    /// Claims `surface` and starts its tracking task.
    pub fn spawn(
        ctx: Arc<TrackerContext>,
        surface: NodeId,
        display_index: usize,
        observer: Weak<dyn TrackerObserver>,
    ) -> Self {
        let id = new_tracker_id();
        // Subscribe before anything else so no early keystroke is missed.
        let events = ctx.doc.subscribe_events();
        ctx.doc.set_attribute(surface, CLAIM_ATTR, &id);

        let content_area = ctx.detector.content_area(ctx.doc.as_ref(), surface);
        if content_area.is_none() {
            log_warn!("tracker {id}: no content area found, relying on surface events");
        }
        if ctx.detector.send_control(ctx.doc.as_ref(), surface).is_none() {
            log_warn!("tracker {id}: no send control rendered yet");
        }

        let shared = Arc::new(TrackerShared {
            id: id.clone(),
            surface,
            state: Mutex::new(TrackerState::new(id.clone(), display_index, Instant::now())),
            cancel: CancellationToken::new(),
            ctx,
            observer,
        });

        shared.ctx.sink.emit(TrackerEvent::IndicatorAdded {
            id: id.clone(),
            display_index,
        });
        log_info!("tracker {id} attached to surface {:?} at index {display_index}", surface);

        let handle = Self { shared };
        tokio::spawn(run_tracker(handle.clone(), events, content_area));
        handle
    }

    pub fn id(&self) -> &str {
        &self.shared.id
    }

    pub fn surface(&self) -> NodeId {
        self.shared.surface
    }

    pub async fn snapshot(&self) -> TrackerSnapshot {
        let state = self.shared.state.lock().await;
        let elapsed_ms = state.calculate_elapsed(Instant::now());
        TrackerSnapshot {
            id: state.id.clone(),
            surface: self.shared.surface,
            display_index: state.display_index,
            phase: state.phase(),
            status: state.status_label(),
            is_tracking: state.is_tracking,
            warning_stage: state.warning_stage,
            total_accumulated_ms: state.total_accumulated_ms,
            elapsed_ms,
            formatted: format_hms(elapsed_ms),
        }
    }

    pub async fn elapsed_ms(&self) -> u64 {
        self.shared
            .state
            .lock()
            .await
            .calculate_elapsed(Instant::now())
    }

    pub async fn is_destroyed(&self) -> bool {
        self.shared.state.lock().await.is_destroyed()
    }

    /// Manual resume from the paused indicator.
    pub async fn resume(&self) {
        let was_tracking = self.shared.state.lock().await.is_tracking;
        self.on_activity().await;
        if !was_tracking && !self.is_destroyed().await {
            self.emit(TrackerEvent::Resumed {
                id: self.shared.id.clone(),
            });
        }
    }

    /// Drops all accumulated time and stops the clock.
    pub async fn clear(&self) {
        {
            let mut state = self.shared.state.lock().await;
            if state.is_destroyed() || state.is_submitting() {
                return;
            }
            state.clear(Instant::now());
        }
        self.emit_status().await;
        self.emit(TrackerEvent::Cleared {
            id: self.shared.id.clone(),
        });
    }

    /// Same as clicking the surface's send control. Returns `false` if the
    /// tracker is already submitting or gone.
    pub async fn trigger_send(&self) -> bool {
        self.begin_submission().await
    }

    pub(crate) async fn set_display_index(&self, index: usize) -> bool {
        let mut state = self.shared.state.lock().await;
        if state.is_destroyed() || state.display_index == index {
            return false;
        }
        state.display_index = index;
        true
    }

    /// Tears the tracker down. Safe to call any number of times; only the
    /// first call has effects.
    pub async fn destroy(&self) {
        {
            let mut state = self.shared.state.lock().await;
            if !state.mark_destroyed(Instant::now()) {
                return;
            }
        }

        self.shared.cancel.cancel();

        let doc = &self.shared.ctx.doc;
        if doc.attribute(self.shared.surface, CLAIM_ATTR).as_deref() == Some(self.shared.id.as_str()) {
            doc.remove_attribute(self.shared.surface, CLAIM_ATTR);
        }
        self.emit(TrackerEvent::IndicatorRemoved {
            id: self.shared.id.clone(),
        });
        log_info!("tracker {} destroyed", self.shared.id);

        if let Some(observer) = self.shared.observer.upgrade() {
            observer.tracker_destroyed(&self.shared.id).await;
        }
    }

    fn emit(&self, event: TrackerEvent) {
        self.shared.ctx.sink.emit(event);
    }

    async fn emit_status(&self) {
        let (status, elapsed_ms) = {
            let state = self.shared.state.lock().await;
            (state.status_label(), state.calculate_elapsed(Instant::now()))
        };
        self.emit(TrackerEvent::StatusChanged {
            id: self.shared.id.clone(),
            status,
            elapsed_ms,
        });
    }

    fn surface_is_valid(&self) -> bool {
        let ctx = &self.shared.ctx;
        ctx.detector.is_valid_surface(ctx.doc.as_ref(), self.shared.surface)
    }

    fn classify(&self, event: DomEvent, content_area: Option<NodeId>) -> Signal {
        let ctx = &self.shared.ctx;
        let doc = ctx.doc.as_ref();
        let surface = self.shared.surface;

        if event.kind == EventKind::Click && ctx.detector.is_send_target(doc, surface, event.target) {
            return Signal::Send;
        }

        let in_surface = doc.is_inside(event.target, surface);
        let in_content = content_area.is_some_and(|area| doc.is_inside(event.target, area));
        match event.kind {
            EventKind::Focus if in_content => Signal::Immediate,
            EventKind::Focus => Signal::Ignore,
            _ if in_surface => Signal::Immediate,
            EventKind::KeyDown | EventKind::Click => Signal::Global,
            _ => Signal::Ignore,
        }
    }

    async fn on_activity(&self) {
        if !self.surface_is_valid() {
            if !self.shared.state.lock().await.is_submitting() {
                log_info!("tracker {}: surface gone during activity update", self.shared.id);
                self.destroy().await;
            }
            return;
        }

        let (before, after, started) = {
            let mut state = self.shared.state.lock().await;
            if state.is_destroyed() || state.is_submitting() {
                return;
            }
            let before = state.status_label();
            let started = state.register_activity(Instant::now());
            (before, state.status_label(), started)
        };

        if started {
            log_debug!("tracker {}: session started", self.shared.id);
        }
        if before != after {
            self.emit_status().await;
        }
    }

    async fn on_deadline(&self) {
        if !self.surface_is_valid() {
            log_info!("tracker {}: surface gone at countdown, destroying", self.shared.id);
            self.destroy().await;
            return;
        }

        let config = &self.shared.ctx.config;
        let steps = {
            let mut state = self.shared.state.lock().await;
            if state.is_destroyed() {
                return;
            }
            let now = Instant::now();
            let mut steps = Vec::new();
            while let Some(step) = state.escalate(now, config) {
                steps.push(step);
            }
            steps
        };

        for step in steps {
            let id = self.shared.id.clone();
            match step {
                Escalation::Warned30 => self.emit(TrackerEvent::InactivityWarning {
                    id,
                    seconds_idle: config.warn_after.as_secs(),
                    message: format!(
                        "You have been inactive for {} seconds. Type or click in the draft to keep tracking.",
                        config.warn_after.as_secs()
                    ),
                }),
                Escalation::Warned45 => self.emit(TrackerEvent::InactivityWarning {
                    id,
                    seconds_idle: config.strong_warn_after.as_secs(),
                    message: format!(
                        "Auto-pause in {} seconds due to inactivity. Type or click in the draft to keep tracking.",
                        config.pause_after.saturating_sub(config.strong_warn_after).as_secs()
                    ),
                }),
                Escalation::Paused { total_ms } => {
                    log_info!(
                        "tracker {id}: paused for inactivity at {}",
                        format_hms(total_ms)
                    );
                    self.emit(TrackerEvent::AutoPaused {
                        id,
                        total_ms,
                        formatted: format_hms(total_ms),
                    });
                }
            }
            self.emit_status().await;
        }
    }

    async fn on_validity_tick(&self) {
        let snapshot = self.snapshot().await;
        if matches!(snapshot.phase, TrackerPhase::Destroyed | TrackerPhase::Submitting) {
            return;
        }
        if !self.surface_is_valid() {
            log_info!("tracker {}: surface no longer valid, destroying", self.shared.id);
            self.destroy().await;
            return;
        }
        self.emit(TrackerEvent::Tick {
            id: snapshot.id,
            elapsed_ms: snapshot.elapsed_ms,
            formatted: snapshot.formatted,
            status: snapshot.status,
        });
    }

    async fn begin_submission(&self) -> bool {
        let elapsed_ms = {
            let mut state = self.shared.state.lock().await;
            match state.freeze_for_submission(Instant::now()) {
                Some(elapsed) => elapsed,
                None => return false,
            }
        };
        log_info!(
            "tracker {}: send detected after {}",
            self.shared.id,
            format_hms(elapsed_ms)
        );
        self.emit_status().await;

        let ctx = &self.shared.ctx;
        let fields = ctx.pipeline.extract(ctx.doc.as_ref(), self.shared.surface);
        self.emit(TrackerEvent::Processing {
            id: self.shared.id.clone(),
        });

        let handle = self.clone();
        tokio::spawn(async move {
            let ctx = handle.shared.ctx.clone();
            let outcome = ctx.pipeline.process(fields, elapsed_ms).await;
            let linger = handle.report_outcome(outcome, &ctx.config);
            time::sleep(linger).await;
            handle.destroy().await;
        });
        true
    }

    fn report_outcome(&self, outcome: SubmissionOutcome, config: &TrackerConfig) -> Duration {
        let id = self.shared.id.clone();
        match outcome {
            SubmissionOutcome::Succeeded {
                entry,
                entry_id,
                platform_synced,
            } => {
                log_info!("tracker {id}: entry {entry_id} logged ({} h)", entry.hours);
                self.emit(TrackerEvent::SubmissionSucceeded {
                    id,
                    entry_id,
                    client: entry.client.clone(),
                    summary: entry.short_summary(),
                    hours: entry.hours,
                    platform_synced,
                });
                config.success_display
            }
            SubmissionOutcome::Failed { class, message } => {
                log_error!("tracker {id}: submission failed ({class:?}): {message}");
                self.emit(TrackerEvent::SubmissionFailed { id, message });
                config.failure_display
            }
        }
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => time::sleep_until(deadline).await,
        None => std::future::pending::<()>().await,
    }
}

async fn run_tracker(
    handle: TrackerHandle,
    mut events: tokio::sync::broadcast::Receiver<DomEvent>,
    content_area: Option<NodeId>,
) {
    let shared = handle.shared.clone();
    let config = shared.ctx.config.clone();

    let mut validity = time::interval_at(
        Instant::now() + config.validity_interval,
        config.validity_interval,
    );
    validity.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut debounce: Option<Instant> = None;

    loop {
        let deadline = shared.state.lock().await.next_deadline(&config);

        tokio::select! {
            _ = shared.cancel.cancelled() => break,
            _ = sleep_until_opt(deadline) => handle.on_deadline().await,
            _ = sleep_until_opt(debounce) => {
                debounce = None;
                handle.on_activity().await;
            }
            _ = validity.tick() => handle.on_validity_tick().await,
            received = events.recv() => match received {
                Ok(event) => match handle.classify(event, content_area) {
                    Signal::Send => {
                        handle.begin_submission().await;
                    }
                    Signal::Immediate => handle.on_activity().await,
                    Signal::Global => debounce = Some(Instant::now() + config.global_debounce),
                    Signal::Ignore => {}
                },
                Err(RecvError::Lagged(skipped)) => {
                    log_warn!("tracker {}: skipped {skipped} input events", shared.id);
                    // Whatever was dropped counts as a single activity signal.
                    handle.on_activity().await;
                }
                Err(RecvError::Closed) => {
                    log_warn!("tracker {}: document event stream closed", shared.id);
                    handle.destroy().await;
                    break;
                }
            },
        }
    }

    log_debug!("tracker {} task finished", shared.id);
}

fn new_tracker_id() -> String {
    let nonce = Uuid::new_v4().simple().to_string();
    format!(
        "billable-tracker-{}-{}",
        Utc::now().timestamp_millis(),
        &nonce[..8]
    )
}
