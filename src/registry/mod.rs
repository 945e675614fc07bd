//! Owns every live tracker in a document and keeps display slots compact.

mod watcher;

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use tokio::sync::Mutex;

pub use watcher::{watch_loop, DetectionController};

use crate::{
    dom::NodeId,
    tracker::{TrackerContext, TrackerEvent, TrackerHandle, TrackerObserver},
};
use crate::{log_debug, log_info};

const ENABLE_LOGS: bool = true;

pub struct TrackerRegistry {
    ctx: Arc<TrackerContext>,
    /// Creation order; position is the display index.
    trackers: Mutex<Vec<TrackerHandle>>,
    self_ref: Weak<TrackerRegistry>,
}

impl TrackerRegistry {
    pub fn new(ctx: Arc<TrackerContext>) -> Arc<Self> {
        Arc::new_cyclic(|self_ref| Self {
            ctx,
            trackers: Mutex::new(Vec::new()),
            self_ref: self_ref.clone(),
        })
    }

    pub fn context(&self) -> &Arc<TrackerContext> {
        &self.ctx
    }

    /// Starts tracking `surface`. Does nothing if it is already claimed or
    /// no longer a valid compose surface.
    pub async fn claim(&self, surface: NodeId) -> Option<TrackerHandle> {
        let doc = self.ctx.doc.as_ref();
        let detector = &self.ctx.detector;

        let mut trackers = self.trackers.lock().await;
        if trackers.iter().any(|handle| handle.surface() == surface)
            || detector.is_claimed(doc, surface)
            || !detector.is_valid_surface(doc, surface)
        {
            return None;
        }

        let observer: Weak<dyn TrackerObserver> = self.self_ref.clone();
        let handle = TrackerHandle::spawn(self.ctx.clone(), surface, trackers.len(), observer);
        trackers.push(handle.clone());
        log_info!("claimed surface {:?}, {} tracker(s) live", surface, trackers.len());
        Some(handle)
    }

    /// Destroys the tracker for `surface`. Returns `false` if none exists.
    pub async fn release(&self, surface: NodeId) -> bool {
        let handle = self
            .trackers
            .lock()
            .await
            .iter()
            .find(|handle| handle.surface() == surface)
            .cloned();

        match handle {
            // The tracker reports back through `tracker_destroyed`.
            Some(handle) => {
                handle.destroy().await;
                true
            }
            None => false,
        }
    }

    /// Reassigns display slots 0..n in creation order.
    pub async fn reindex(&self) {
        let trackers = self.trackers.lock().await;
        for (index, handle) in trackers.iter().enumerate() {
            if handle.set_display_index(index).await {
                self.ctx.sink.emit(TrackerEvent::Repositioned {
                    id: handle.id().to_string(),
                    display_index: index,
                });
            }
        }
    }

    /// Destroys every tracker.
    pub async fn release_all(&self) {
        let handles = self.handles().await;
        for handle in handles {
            handle.destroy().await;
        }
    }

    pub async fn len(&self) -> usize {
        self.trackers.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.trackers.lock().await.is_empty()
    }

    pub async fn handles(&self) -> Vec<TrackerHandle> {
        self.trackers.lock().await.clone()
    }

    pub async fn handle_for(&self, surface: NodeId) -> Option<TrackerHandle> {
        self.trackers
            .lock()
            .await
            .iter()
            .find(|handle| handle.surface() == surface)
            .cloned()
    }
}

#[async_trait]
impl TrackerObserver for TrackerRegistry {
    async fn tracker_destroyed(&self, id: &str) {
        let removed = {
            let mut trackers = self.trackers.lock().await;
            let before = trackers.len();
            trackers.retain(|handle| handle.id() != id);
            before != trackers.len()
        };
        if removed {
            log_debug!("tracker {id} left the registry");
            self.reindex().await;
        }
    }
}
