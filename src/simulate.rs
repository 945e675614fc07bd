//! Scripted compose session against an in-memory document.

use std::{sync::Arc, time::Duration};

use anyhow::{anyhow, Result};
use tokio::time::{self, Instant};

use crate::{
    config::TrackerConfig,
    detector::SurfaceDetector,
    dom::{ComposeFixture, Document, EventKind, MemoryDocument},
    registry::{DetectionController, TrackerRegistry},
    submission::SubmissionPipeline,
    tracker::{EventSink, TrackerContext},
};
use crate::log_info;

const ENABLE_LOGS: bool = true;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    ShowMain,
    OpenCompose,
    Type,
    Paste,
    ClickElsewhere,
    Send,
}

/// (seconds at real speed, step)
const SCRIPT: &[(f64, Step)] = &[
    (0.0, Step::ShowMain),
    (0.5, Step::OpenCompose),
    (2.0, Step::Type),
    (4.0, Step::Type),
    (9.0, Step::Paste),
    // Idle long enough to see both warnings and the auto-pause.
    (85.0, Step::Type),
    (95.0, Step::ClickElsewhere),
    (120.0, Step::Send),
];

/// Extra time after the last step so the outcome panel can close.
const SETTLE_SECS: f64 = 10.0;

#[derive(Debug, Clone)]
pub struct SimulationOptions {
    /// Divides every script and tracker delay.
    pub speedup: u32,
    pub recipient: String,
    pub subject: String,
    pub body: String,
}

impl Default for SimulationOptions {
    fn default() -> Self {
        Self {
            speedup: 10,
            recipient: "jane.doe@acme-legal.com".into(),
            subject: "Settlement draft".into(),
            body: "Attached is the revised settlement agreement for your review.".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulationReport {
    pub steps_run: usize,
    pub trackers_left: usize,
}

pub async fn run_simulation(
    options: &SimulationOptions,
    config: &TrackerConfig,
    pipeline: Arc<SubmissionPipeline>,
    sink: Arc<dyn EventSink>,
) -> Result<SimulationReport> {
    let speedup = options.speedup.max(1);
    let doc = Arc::new(MemoryDocument::new());
    let ctx = Arc::new(TrackerContext {
        doc: doc.clone(),
        detector: Arc::new(SurfaceDetector::new()?),
        config: config.compressed(speedup),
        sink,
        pipeline,
    });
    let registry = TrackerRegistry::new(ctx);
    let mut detection = DetectionController::new();
    detection.start(registry.clone())?;

    let scale = |secs: f64| Duration::from_secs_f64(secs / f64::from(speedup));
    let start = Instant::now();
    let mut fixture: Option<ComposeFixture> = None;

    for (at, step) in SCRIPT {
        time::sleep_until(start + scale(*at)).await;
        log_info!("simulate: {:?} at {at}s", step);
        match step {
            Step::ShowMain => {
                doc.append_element(doc.body(), "div", &[("role", "main")]);
            }
            Step::OpenCompose => {
                let compose =
                    doc.build_compose_window(doc.body(), &options.recipient, &options.subject);
                doc.set_text(compose.body_area, &options.body);
                fixture = Some(compose);
            }
            Step::Type | Step::Paste => {
                let compose = fixture.as_ref().ok_or_else(|| anyhow!("no compose window open"))?;
                let kind = if *step == Step::Paste {
                    EventKind::Paste
                } else {
                    EventKind::KeyDown
                };
                doc.dispatch(kind, compose.body_area);
            }
            Step::ClickElsewhere => doc.dispatch(EventKind::Click, doc.body()),
            Step::Send => {
                let compose = fixture.as_ref().ok_or_else(|| anyhow!("no compose window open"))?;
                doc.dispatch(EventKind::Click, compose.send_button);
            }
        }
    }

    time::sleep(scale(SETTLE_SECS)).await;
    detection.stop().await?;

    let report = SimulationReport {
        steps_run: SCRIPT.len(),
        trackers_left: registry.len().await,
    };
    registry.release_all().await;
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        settings::StaticToken,
        store::{EntryStore, SubmitResponse},
        submission::BillableEntry,
        summary::TemplateSummarizer,
        tracker::{RecordingSink, TrackerEvent},
    };
    use async_trait::async_trait;

    struct AcceptAll;

    #[async_trait]
    impl EntryStore for AcceptAll {
        async fn submit(&self, _entry: &BillableEntry, _token: Option<&str>) -> Result<SubmitResponse> {
            Ok(SubmitResponse {
                success: true,
                id: Some("sim-1".into()),
                error: None,
                platform_synced: false,
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn scripted_session_warns_pauses_and_bills() {
        let config = TrackerConfig::default();
        let pipeline = SubmissionPipeline::new(
            Arc::new(TemplateSummarizer),
            Arc::new(AcceptAll),
            Arc::new(StaticToken(None)),
            &config,
        )
        .unwrap();
        let sink = Arc::new(RecordingSink::new());
        let options = SimulationOptions {
            speedup: 1,
            ..Default::default()
        };

        let report = run_simulation(&options, &config, Arc::new(pipeline), sink.clone())
            .await
            .unwrap();
        assert_eq!(report.trackers_left, 0);

        let names: Vec<&str> = sink.notable().iter().map(TrackerEvent::name).collect();
        assert!(names.contains(&"indicator-added"));
        assert!(names.contains(&"inactivity-warning"));
        assert!(names.contains(&"auto-paused"));
        assert!(names.contains(&"submission-succeeded"));
        assert_eq!(names.last(), Some(&"indicator-removed"));

        let succeeded = sink
            .events()
            .into_iter()
            .find_map(|event| match event {
                TrackerEvent::SubmissionSucceeded { hours, client, .. } => Some((hours, client)),
                _ => None,
            })
            .unwrap();
        assert_eq!(succeeded, (0.1, "Jane doe".to_string()));
    }
}
