// src/main.rs

use anyhow::Result;
use clap::Parser;
use plate_gate::access::MemoryRegistry;
use plate_gate::frame_source::open_source;
use plate_gate::interface::{Detector, FrameSource};
use plate_gate::pipeline::{
    spawn_console_observer, spawn_jsonl_sink, spawn_webhook_observer, MetricsSummary,
    PipelineOrchestrator, WebhookClient,
};
use plate_gate::plate_detection::FullFrameDetector;
use plate_gate::recognizer::TesseractRecognizer;
use plate_gate::types::{Config, DetectorBackend, DetectorConfig};
use plate_gate::GateError;
use std::path::Path;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "plate-gate", about = "License plate access gate")]
struct Args {
    /// YAML configuration file
    #[arg(long, default_value = "config.yaml")]
    config: String,

    /// Camera index, video file or image directory (overrides source.primary)
    #[arg(long)]
    source: Option<String>,

    /// Registry YAML file (overrides registry.path)
    #[arg(long)]
    registry: Option<String>,

    /// Stop after this many frames
    #[arg(long)]
    max_frames: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let (mut config, config_exists) = Config::load_or_default(&args.config)?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("🚗 Plate Gate Starting");
    if config_exists {
        info!("✓ Configuration loaded from {}", args.config);
    } else {
        warn!("⚠️  {} not found, using defaults", args.config);
    }

    if let Some(source) = args.source {
        config.source.primary = source;
        config.source.fallback = None;
    }
    if let Some(registry) = args.registry {
        config.registry.path = registry;
    }
    if let Some(max_frames) = args.max_frames {
        config.pipeline.max_frames = max_frames;
    }
    config.validate()?;

    info!(
        "Gate settings: grammar={}, cadence={}, confirm={}, timeout={} frames, cooldown={:.0}s, max_edit_distance={}",
        config.normalizer.grammar,
        config.pipeline.sampling_cadence,
        config.tracker.confirmation_threshold,
        config.tracker.timeout_frames,
        config.access.cooldown_window_secs,
        config.access.max_edit_distance
    );

    // Startup failures are fatal
    let registry = MemoryRegistry::open(
        &config.registry.path,
        Some(Path::new(&config.registry.access_log_path)),
    )
    .map_err(|e| GateError::startup("registry", e.to_string()))?;
    info!("✓ Registry ready");

    let detector = build_detector(&config.detector)?;
    let recognizer = TesseractRecognizer::new(&config.recognizer)?;
    let source = open_with_fallback(&config)?;

    let mut orchestrator = PipelineOrchestrator::new(
        &config,
        source,
        detector,
        Box::new(recognizer),
        Box::new(registry),
    );
    let metrics = orchestrator.metrics();

    let console = spawn_console_observer(orchestrator.subscribe());
    let jsonl = match &config.output.events_jsonl {
        Some(path) => Some(spawn_jsonl_sink(orchestrator.subscribe(), path)?),
        None => None,
    };
    let webhook = match &config.output.webhook_url {
        Some(url) => {
            let client = WebhookClient::new(url.clone(), config.output.webhook_timeout_secs)?;
            Some(spawn_webhook_observer(orchestrator.subscribe(), client))
        }
        None => None,
    };
    info!(
        "✓ {} observer(s) subscribed",
        orchestrator.events().subscriber_count()
    );

    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("🛑 Ctrl-C received, stopping after the current frame");
            let _ = cancel_tx.send(true);
        }
    });

    // The orchestrator owns the event bus; dropping it at the end of the task
    // closes the channel and lets the observers finish. A panic inside the loop
    // still releases resources when the orchestrator is dropped.
    let loop_task = tokio::spawn(async move {
        let summary = orchestrator.run(cancel_rx).await;
        let failures = orchestrator.shutdown();
        (summary, failures)
    });

    let loop_result = loop_task.await;
    let (summary, failures) = match loop_result {
        Ok(done) => done,
        Err(e) => {
            error!("❌ Pipeline loop aborted: {}", e);
            (metrics.summary(), Vec::new())
        }
    };

    if let Err(e) = console.await {
        warn!("Console observer ended abnormally: {}", e);
    }
    if let Some(handle) = jsonl {
        match handle.await {
            Ok(written) => info!("💾 {} decision(s) written to JSONL", written),
            Err(e) => warn!("JSONL sink ended abnormally: {}", e),
        }
    }
    if let Some(handle) = webhook {
        match handle.await {
            Ok((delivered, failed)) => {
                info!("📡 Webhook: {} delivered, {} failed", delivered, failed)
            }
            Err(e) => warn!("Webhook observer ended abnormally: {}", e),
        }
    }

    print_report(&summary);
    if !failures.is_empty() {
        error!("❌ {} resource(s) failed to release", failures.len());
    }
    info!("  Live FPS at exit: {:.1}", metrics.fps());

    Ok(())
}

fn build_detector(config: &DetectorConfig) -> Result<Box<dyn Detector>> {
    match config.backend {
        DetectorBackend::FullFrame => {
            info!("✓ Full-frame detector (frames are plate crops)");
            Ok(Box::new(FullFrameDetector))
        }
        #[cfg(feature = "onnx")]
        DetectorBackend::Yolo => Ok(Box::new(
            plate_gate::plate_detection::YoloPlateDetector::new(config)?,
        )),
        #[cfg(not(feature = "onnx"))]
        DetectorBackend::Yolo => Err(GateError::startup(
            "detector",
            "the YOLO backend needs the `onnx` feature; set detector.backend: full_frame or rebuild",
        )
        .into()),
    }
}

/// Primary source first, then the fallback. Both failing is fatal.
fn open_with_fallback(config: &Config) -> Result<Box<dyn FrameSource>> {
    let fps = config.pipeline.target_fps;
    let loop_video = config.source.loop_video;

    match open_source(&config.source.primary, fps, loop_video) {
        Ok(source) => {
            info!("✓ Frame source: {}", source.name());
            return Ok(source);
        }
        Err(e) => warn!("📷 Primary source {} failed: {:#}", config.source.primary, e),
    }

    let Some(fallback) = &config.source.fallback else {
        return Err(GateError::SourceUnavailable(config.source.primary.clone()).into());
    };
    let source = open_source(fallback, fps, loop_video).map_err(|e| {
        GateError::SourceUnavailable(format!(
            "{} and fallback {} both failed: {:#}",
            config.source.primary, fallback, e
        ))
    })?;
    info!("✓ Frame source (fallback): {}", source.name());
    Ok(source)
}

fn print_report(s: &MetricsSummary) {
    info!("\n📊 Final Report:");
    info!("  Frames processed: {}", s.total_frames);
    info!("  🔍 Detector runs: {} ({} plate box(es))", s.detector_runs, s.detections);
    info!(
        "  🆕 Sightings: {} created, {} expired, {} processed",
        s.sightings_created, s.sightings_expired, s.sightings_processed
    );
    info!("  ✅ Authorized: {}", s.decisions_authorized);
    info!("  ❌ Denied: {}", s.decisions_denied);
    info!("  ⏳ Suppressed by cooldown: {}", s.decisions_suppressed);
    info!("  🔤 Invalid reads: {}", s.invalid_reads);
    if s.log_failures > 0 {
        info!("  💾 Access log failures: {}", s.log_failures);
    }
    if s.transient_errors > 0 {
        info!("  ⚠️  Transient errors: {}", s.transient_errors);
    }
    info!("  ⏱️  Elapsed: {:.1}s", s.elapsed_secs);
    info!("  Processing Speed: {:.1} FPS", s.fps);
}
