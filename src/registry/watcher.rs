use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tokio::{
    sync::broadcast::error::RecvError,
    task::JoinHandle,
    time,
};
use tokio_util::sync::CancellationToken;

use crate::dom::{Mutation, NodeId};
use crate::{log_info, log_warn};

use super::TrackerRegistry;

const ENABLE_LOGS: bool = true;

/// Runs the detection loop for one registry.
pub struct DetectionController {
    handle: Option<JoinHandle<()>>,
    cancel_token: Option<CancellationToken>,
}

impl DetectionController {
    pub fn new() -> Self {
        Self {
            handle: None,
            cancel_token: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    pub fn start(&mut self, registry: Arc<TrackerRegistry>) -> Result<()> {
        if self.handle.is_some() {
            bail!("detection already running");
        }

        let cancel_token = CancellationToken::new();
        let handle = tokio::spawn(watch_loop(registry, cancel_token.clone()));

        self.handle = Some(handle);
        self.cancel_token = Some(cancel_token);
        Ok(())
    }

    /// Stops watching. Live trackers are left alone.
    pub async fn stop(&mut self) -> Result<()> {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }

        if let Some(handle) = self.handle.take() {
            handle
                .await
                .context("detection loop task failed to join")
                .map(|_| ())
        } else {
            Ok(())
        }
    }
}

impl Default for DetectionController {
    fn default() -> Self {
        Self::new()
    }
}

/// Waits for the webmail shell, claims what is already open, then follows
/// document mutations until cancelled.
pub async fn watch_loop(registry: Arc<TrackerRegistry>, cancel_token: CancellationToken) {
    let ctx = registry.context().clone();
    let doc = ctx.doc.clone();
    let mut mutations = doc.subscribe_mutations();

    while !ctx.detector.is_ready(doc.as_ref()) {
        tokio::select! {
            _ = time::sleep(ctx.config.ready_poll) => {}
            _ = cancel_token.cancelled() => return,
        }
    }

    let claimed = scan(&registry, doc.body()).await;
    log_info!("detection started, {claimed} surface(s) already open");

    loop {
        tokio::select! {
            received = mutations.recv() => match received {
                Ok(mutation) => apply_mutation(&registry, mutation).await,
                Err(RecvError::Lagged(skipped)) => {
                    log_warn!("detection skipped {skipped} mutation batches, rescanning");
                    resync(&registry).await;
                }
                Err(RecvError::Closed) => {
                    log_warn!("document mutation stream closed");
                    break;
                }
            },
            _ = cancel_token.cancelled() => {
                log_info!("detection loop shutting down");
                break;
            }
        }
    }
}

async fn apply_mutation(registry: &TrackerRegistry, mutation: Mutation) {
    let ctx = registry.context();
    let doc = ctx.doc.as_ref();

    for removed in mutation.removed {
        for surface in ctx.detector.claimed_within(doc, removed) {
            if registry.release(surface).await {
                log_info!("surface {:?} removed from document", surface);
            }
        }
    }

    for added in mutation.added {
        if let Some(surface) = ctx.detector.enclosing_unclaimed(doc, added) {
            registry.claim(surface).await;
        }
        scan(registry, added).await;
    }
}

async fn scan(registry: &TrackerRegistry, root: NodeId) -> usize {
    let ctx = registry.context();
    let mut claimed = 0;
    // Claiming an outer surface shadows any candidate nested inside it.
    for surface in ctx.detector.find_unclaimed(ctx.doc.as_ref(), root) {
        if registry.claim(surface).await.is_some() {
            claimed += 1;
        }
    }
    claimed
}

/// Catches up after missed mutations: drops trackers whose surface left and
/// claims anything new.
async fn resync(registry: &TrackerRegistry) {
    let ctx = registry.context().clone();
    for handle in registry.handles().await {
        if !ctx.detector.is_valid_surface(ctx.doc.as_ref(), handle.surface()) {
            registry.release(handle.surface()).await;
        }
    }
    scan(registry, ctx.doc.body()).await;
}
