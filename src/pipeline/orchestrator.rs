// src/pipeline/orchestrator.rs
//
// The frame loop: acquire frame -> detect (sampled) -> track -> process ready
// sightings -> publish -> housekeeping -> advance. One frame in flight at a
// time; the tracker and the cooldown ledger have a single writer.

use super::event_bus::{DecisionEvent, EventBus, PipelineEvent};
use super::frame_context::FrameContext;
use super::metrics::{MetricsSummary, PipelineMetrics};
use crate::access::{AccessResolver, Resolution};
use crate::analysis::{
    crop_region, expand_region, ConfusionTable, DetectionScheduler, PlateGrammar, PlateNormalizer,
    Sighting, SightingTracker,
};
use crate::interface::{Detector, FrameSource, Recognizer, Registry};
use crate::types::{Config, Frame, PipelineConfig};
use base64::{engine::general_purpose, Engine as _};
use chrono::{DateTime, Utc};
use image::RgbImage;
use std::io::Cursor;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, watch};
use tracing::{debug, error, info, warn};

pub type Clock = Box<dyn Fn() -> DateTime<Utc> + Send>;

pub struct PipelineOrchestrator {
    config: PipelineConfig,
    source: Box<dyn FrameSource>,
    detector: Box<dyn Detector>,
    recognizer: Box<dyn Recognizer>,
    registry: Box<dyn Registry>,
    scheduler: DetectionScheduler,
    tracker: SightingTracker,
    normalizer: PlateNormalizer,
    resolver: AccessResolver,
    events: Arc<EventBus>,
    metrics: PipelineMetrics,
    clock: Clock,
    frame_id: u64,
    released: bool,
}

impl PipelineOrchestrator {
    pub fn new(
        config: &Config,
        source: Box<dyn FrameSource>,
        detector: Box<dyn Detector>,
        recognizer: Box<dyn Recognizer>,
        registry: Box<dyn Registry>,
    ) -> Self {
        let grammar = PlateGrammar::parse(&config.normalizer.grammar).unwrap_or_else(|| {
            warn!(
                "⚠️  Unusable plate grammar '{}', falling back to LLLDLDD",
                config.normalizer.grammar
            );
            PlateGrammar::mercosur()
        });

        Self {
            config: config.pipeline.clone(),
            source,
            detector,
            recognizer,
            registry,
            scheduler: DetectionScheduler::new(config.pipeline.sampling_cadence),
            tracker: SightingTracker::new(config.tracker.clone()),
            normalizer: PlateNormalizer::new(grammar, ConfusionTable::standard(), &config.normalizer),
            resolver: AccessResolver::new(&config.access),
            events: Arc::new(EventBus::new(config.pipeline.event_capacity)),
            metrics: PipelineMetrics::new(),
            clock: Box::new(Utc::now),
            frame_id: 0,
            released: false,
        }
    }

    /// Replace the wall clock used for decision timestamps and cooldowns.
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.events.subscribe()
    }

    pub fn events(&self) -> Arc<EventBus> {
        Arc::clone(&self.events)
    }

    pub fn metrics(&self) -> PipelineMetrics {
        self.metrics.clone()
    }

    pub fn tracker(&self) -> &SightingTracker {
        &self.tracker
    }

    pub fn resolver(&self) -> &AccessResolver {
        &self.resolver
    }

    /// Drive the loop until the source ends, `max_frames` is reached, or
    /// `cancel` flips to true. Checked once per iteration.
    pub async fn run(&mut self, cancel: watch::Receiver<bool>) -> MetricsSummary {
        info!(
            "▶️  Pipeline started on {} (detect every {} frame(s))",
            self.source.name(),
            self.scheduler.cadence()
        );

        let frame_interval = (self.config.target_fps > 0)
            .then(|| Duration::from_secs_f64(1.0 / self.config.target_fps as f64));

        loop {
            if *cancel.borrow() {
                info!("🛑 Stop requested");
                break;
            }
            if self.config.max_frames > 0 && self.frame_id >= self.config.max_frames {
                info!("⏹️  Reached max_frames ({})", self.config.max_frames);
                break;
            }
            if !self.source.is_available() {
                warn!("📷 {} no longer available", self.source.name());
                break;
            }

            let frame = match self.source.next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => {
                    info!("🏁 End of stream from {}", self.source.name());
                    break;
                }
                Err(e) => {
                    error!("📷 Frame read failed on {}: {:#}", self.source.name(), e);
                    break;
                }
            };

            let started = Instant::now();
            self.process_frame(frame);

            match frame_interval {
                Some(interval) => {
                    let elapsed = started.elapsed();
                    if elapsed < interval {
                        tokio::time::sleep(interval - elapsed).await;
                    }
                }
                None => tokio::task::yield_now().await,
            }
        }

        self.metrics.summary()
    }

    /// Run one frame through detection, tracking and resolution.
    pub fn process_frame(&mut self, frame: Frame) -> FrameContext {
        let frame_id = self.frame_id;
        self.frame_id += 1;
        self.metrics.inc(&self.metrics.total_frames);

        // Empty frames still tick the scheduler and age the tracker
        let mut ctx = FrameContext::new(frame_id, frame);
        let detect_now = self.scheduler.should_detect();
        if ctx.frame.is_empty() {
            debug!("Frame {} is empty, no detection", frame_id);
        } else if detect_now {
            ctx.detector_ran = true;
            self.metrics.inc(&self.metrics.detector_runs);

            let t = Instant::now();
            ctx.detections = match self.detector.detect(&ctx.frame) {
                Ok(detections) => detections,
                Err(e) => {
                    warn!("⚠️  Detector failed on frame {}: {:#}", frame_id, e);
                    self.metrics.inc(&self.metrics.transient_errors);
                    Vec::new()
                }
            };
            self.metrics
                .set_timing(&self.metrics.detect_time_us, t.elapsed().as_micros() as u64);
            self.metrics
                .add(&self.metrics.detections, ctx.detections.len() as u64);
        }

        ctx.tracker_update = self.tracker.update(&ctx.detections);
        self.metrics.add(
            &self.metrics.sightings_created,
            ctx.tracker_update.created.len() as u64,
        );
        self.metrics.add(
            &self.metrics.sightings_expired,
            ctx.tracker_update.expired.len() as u64,
        );

        for id in self.tracker.ready_for_processing() {
            // Removed before the read: one attempt per sighting, whatever happens
            if let Some(sighting) = self.tracker.complete(id) {
                self.metrics.inc(&self.metrics.sightings_processed);
                self.process_sighting(&ctx, &sighting);
            }
        }

        let interval = self.config.housekeeping_interval_frames;
        if interval > 0 && (frame_id + 1) % interval == 0 {
            self.housekeeping();
        }

        ctx
    }

    fn process_sighting(&mut self, ctx: &FrameContext, sighting: &Sighting) {
        let bbox = sighting.last_detection.bbox;
        let crop = expand_region(
            &bbox,
            ctx.frame.width,
            ctx.frame.height,
            self.config.region_expansion,
        )
        .and_then(|region| crop_region(&ctx.frame, &region));

        let Some(crop) = crop else {
            debug!("{} has no usable region ({:?})", sighting.id, bbox);
            return;
        };

        let t = Instant::now();
        let (raw_text, confidence) = match self.recognizer.read(&crop) {
            Ok(read) => read,
            Err(e) => {
                warn!("⚠️  Recognizer failed for {}: {:#}", sighting.id, e);
                self.metrics.inc(&self.metrics.transient_errors);
                (String::new(), 0.0)
            }
        };
        self.metrics
            .set_timing(&self.metrics.recognize_time_us, t.elapsed().as_micros() as u64);

        let reading = self.normalizer.recognize(&raw_text, confidence);
        if !reading.is_valid {
            debug!(
                "{}: '{}' is not a valid plate, dropping sighting",
                sighting.id, reading.raw_text
            );
            self.metrics.inc(&self.metrics.invalid_reads);
            self.events.publish(PipelineEvent::InvalidRead {
                sighting: sighting.id,
                raw_text: reading.raw_text,
                confidence,
            });
            return;
        }

        let now = (self.clock)();
        let decision = match self
            .resolver
            .resolve(&reading.processed_text, &*self.registry, now)
        {
            Resolution::Decided(decision) => decision,
            Resolution::Suppressed { key } => {
                self.metrics.inc(&self.metrics.decisions_suppressed);
                self.events.publish(PipelineEvent::DecisionSuppressed {
                    sighting: sighting.id,
                    key,
                });
                return;
            }
        };

        if decision.authorized {
            self.metrics.inc(&self.metrics.decisions_authorized);
        } else {
            self.metrics.inc(&self.metrics.decisions_denied);
        }
        info!("{} ({})", decision, sighting.id);

        if let Err(e) = self.registry.log_decision(&decision) {
            error!("💾 Failed to log decision for {}: {}", decision.code, e);
            self.metrics.inc(&self.metrics.log_failures);
        }

        let plate_image_b64 = if self.config.attach_debug_image {
            encode_png_b64(&crop)
        } else {
            None
        };

        self.events.publish(PipelineEvent::Decision(DecisionEvent {
            sighting_id: sighting.id.0,
            frame_id: ctx.frame_id,
            decision,
            plate_image_b64,
        }));
    }

    fn housekeeping(&mut self) {
        let pruned = self.resolver.housekeeping((self.clock)());
        debug!(
            "🧹 Housekeeping at frame {}: {} cooldown record(s) pruned, {} live sighting(s)",
            self.frame_id,
            pruned,
            self.tracker.len()
        );
    }

    /// Release every external resource. Each release is attempted even if an
    /// earlier one failed; the failures are returned for reporting. Only the
    /// first call does anything; `Drop` calls it too.
    pub fn shutdown(&mut self) -> Vec<String> {
        if self.released {
            return Vec::new();
        }
        self.released = true;
        let mut failures = Vec::new();

        if let Err(e) = self.source.release() {
            failures.push(format!("frame source: {:#}", e));
        }
        if let Err(e) = self.detector.release() {
            failures.push(format!("detector: {:#}", e));
        }
        if let Err(e) = self.recognizer.release() {
            failures.push(format!("recognizer: {:#}", e));
        }
        if let Err(e) = self.registry.release() {
            failures.push(format!("registry: {}", e));
        }
        self.tracker.clear();

        for failure in &failures {
            error!("❌ Release failed: {}", failure);
        }
        info!("✓ Pipeline resources released");
        failures
    }
}

impl Drop for PipelineOrchestrator {
    fn drop(&mut self) {
        if !self.released {
            warn!("Pipeline dropped without shutdown, releasing resources");
            self.shutdown();
        }
    }
}

fn encode_png_b64(crop: &RgbImage) -> Option<String> {
    let mut png = Vec::new();
    match crop.write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png) {
        Ok(()) => Some(general_purpose::STANDARD.encode(&png)),
        Err(e) => {
            warn!("Failed to encode plate crop: {}", e);
            None
        }
    }
}
