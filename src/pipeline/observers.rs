// src/pipeline/observers.rs
//
// Decision consumers. Each runs as its own tokio task on a broadcast
// subscription, so none of them can hold up the frame loop. A task ends when
// the event bus is dropped.

use super::event_bus::{DecisionEvent, PipelineEvent};
use anyhow::{Context, Result};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Next decision on the channel, skipping other events. `None` once closed.
async fn next_decision(
    rx: &mut broadcast::Receiver<PipelineEvent>,
    observer: &str,
) -> Option<DecisionEvent> {
    loop {
        match rx.recv().await {
            Ok(PipelineEvent::Decision(event)) => return Some(event),
            Ok(_) => continue,
            Err(RecvError::Lagged(n)) => {
                warn!("{} observer fell behind, {} event(s) dropped", observer, n);
            }
            Err(RecvError::Closed) => return None,
        }
    }
}

// ============================================================================
// CONSOLE
// ============================================================================

/// Print every decision for the operator. Returns how many were shown.
pub fn spawn_console_observer(mut rx: broadcast::Receiver<PipelineEvent>) -> JoinHandle<u64> {
    tokio::spawn(async move {
        let mut shown = 0u64;
        while let Some(event) = next_decision(&mut rx, "console").await {
            let d = &event.decision;
            info!(
                "🚦 [{}] {} (match {}%)",
                d.timestamp.format("%H:%M:%S"),
                d,
                d.match_confidence
            );
            shown += 1;
        }
        shown
    })
}

// ============================================================================
// JSONL SINK
// ============================================================================

pub fn spawn_jsonl_sink(
    mut rx: broadcast::Receiver<PipelineEvent>,
    path: impl AsRef<Path>,
) -> Result<JoinHandle<u64>> {
    let path: PathBuf = path.as_ref().to_path_buf();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
    }
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    info!("💾 Decisions will be written to: {}", path.display());

    Ok(tokio::spawn(async move {
        let mut written = 0u64;
        while let Some(event) = next_decision(&mut rx, "jsonl").await {
            match write_event(&mut file, &event) {
                Ok(()) => written += 1,
                Err(e) => error!("💾 Failed to write decision to {}: {:#}", path.display(), e),
            }
        }
        written
    }))
}

fn write_event(file: &mut std::fs::File, event: &DecisionEvent) -> Result<()> {
    let json_line = serde_json::to_string(event)?;
    writeln!(file, "{}", json_line)?;
    file.flush()?;
    Ok(())
}

// ============================================================================
// WEBHOOK
// ============================================================================

pub struct WebhookClient {
    http_client: reqwest::Client,
    url: String,
}

impl WebhookClient {
    pub fn new(url: impl Into<String>, timeout_secs: u64) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            http_client,
            url: url.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// POST one decision. Failures are logged, never returned.
    pub async fn post(&self, event: &DecisionEvent) -> bool {
        match self.http_client.post(&self.url).json(event).send().await {
            Ok(response) if response.status().is_success() => {
                debug!("🌐 Decision for {} delivered", event.decision.code);
                true
            }
            Ok(response) => {
                let status = response.status();
                error!(
                    "🌐 Webhook returned {}: {}",
                    status,
                    response
                        .text()
                        .await
                        .unwrap_or_else(|_| "<no body>".to_string()),
                );
                false
            }
            Err(e) => {
                error!("🌐 Webhook request failed: {}", e);
                false
            }
        }
    }
}

/// Forward decisions to the webhook. Returns (delivered, failed).
pub fn spawn_webhook_observer(
    mut rx: broadcast::Receiver<PipelineEvent>,
    client: WebhookClient,
) -> JoinHandle<(u64, u64)> {
    info!("📡 Decisions will be posted to: {}", client.url());
    tokio::spawn(async move {
        let (mut delivered, mut failed) = (0u64, 0u64);
        while let Some(event) = next_decision(&mut rx, "webhook").await {
            if client.post(&event).await {
                delivered += 1;
            } else {
                failed += 1;
            }
        }
        (delivered, failed)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::SightingId;
    use crate::pipeline::EventBus;
    use crate::types::{AccessDecision, DecisionReason};
    use chrono::Utc;

    fn decision_event(code: &str) -> PipelineEvent {
        PipelineEvent::Decision(DecisionEvent {
            sighting_id: 1,
            frame_id: 2,
            decision: AccessDecision {
                code: code.to_string(),
                authorized: false,
                info: "unknown".into(),
                reason: DecisionReason::Unregistered,
                match_confidence: 0,
                timestamp: Utc::now(),
            },
            plate_image_b64: None,
        })
    }

    #[tokio::test]
    async fn test_jsonl_sink_writes_only_decisions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("decisions.jsonl");

        let bus = EventBus::new(16);
        let handle = spawn_jsonl_sink(bus.subscribe(), &path).unwrap();
        bus.publish(decision_event("XYZ9Q99"));
        bus.publish(PipelineEvent::InvalidRead {
            sighting: SightingId(3),
            raw_text: "AB".into(),
            confidence: 0.2,
        });
        bus.publish(decision_event("ABC1D23"));
        drop(bus);

        assert_eq!(handle.await.unwrap(), 2);
        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["code"], "XYZ9Q99");
        assert_eq!(first["reason"]["kind"], "unregistered");
    }

    #[tokio::test]
    async fn test_console_observer_ends_with_bus() {
        let bus = EventBus::new(16);
        let handle = spawn_console_observer(bus.subscribe());
        bus.publish(decision_event("XYZ9Q99"));
        drop(bus);
        assert_eq!(handle.await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_webhook_failure_is_counted_not_raised() {
        // Nothing listens on the discard port
        let client = WebhookClient::new("http://127.0.0.1:9/decisions", 1).unwrap();
        let bus = EventBus::new(4);
        let handle = spawn_webhook_observer(bus.subscribe(), client);
        bus.publish(decision_event("XYZ9Q99"));
        drop(bus);
        assert_eq!(handle.await.unwrap(), (0, 1));
    }
}
