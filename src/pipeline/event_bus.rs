// src/pipeline/event_bus.rs
//
// Decoupled event system. The frame loop publishes, observers subscribe.
// Publishing never waits on a subscriber: a slow observer lags and loses
// its oldest events instead of stalling frame ingestion.

use crate::analysis::SightingId;
use crate::types::AccessDecision;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::broadcast;
use tracing::debug;

#[derive(Debug, Clone, Serialize)]
pub struct DecisionEvent {
    pub sighting_id: u64,
    pub frame_id: u64,
    #[serde(flatten)]
    pub decision: AccessDecision,
    /// PNG of the plate crop, base64, when debug imagery is enabled
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plate_image_b64: Option<String>,
}

#[derive(Debug, Clone)]
pub enum PipelineEvent {
    Decision(DecisionEvent),

    DecisionSuppressed {
        sighting: SightingId,
        key: String,
    },

    InvalidRead {
        sighting: SightingId,
        raw_text: String,
        confidence: f32,
    },
}

pub struct EventBus {
    sender: broadcast::Sender<PipelineEvent>,
    published: AtomicU64,
    undelivered: AtomicU64,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            published: AtomicU64::new(0),
            undelivered: AtomicU64::new(0),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.sender.subscribe()
    }

    /// Fire-and-forget. Returns how many subscribers will see the event.
    pub fn publish(&self, event: PipelineEvent) -> usize {
        self.published.fetch_add(1, Ordering::Relaxed);
        match self.sender.send(event) {
            Ok(n) => n,
            Err(_) => {
                self.undelivered.fetch_add(1, Ordering::Relaxed);
                debug!("Event published with no subscribers");
                0
            }
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    pub fn undelivered(&self) -> u64 {
        self.undelivered.load(Ordering::Relaxed)
    }
}
