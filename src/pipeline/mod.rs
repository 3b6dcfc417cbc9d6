// src/pipeline/mod.rs

pub mod event_bus;
pub mod frame_context;
pub mod metrics;
pub mod observers;
pub mod orchestrator;

pub use event_bus::{DecisionEvent, EventBus, PipelineEvent};
pub use frame_context::FrameContext;
pub use metrics::{MetricsSummary, PipelineMetrics};
pub use observers::{spawn_console_observer, spawn_jsonl_sink, spawn_webhook_observer, WebhookClient};
pub use orchestrator::{Clock, PipelineOrchestrator};
