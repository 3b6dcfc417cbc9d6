// src/analysis/sighting_tracker.rs
//
// Temporal confirmation filter for plate detections.
//
// The detector is noisy and may only run every Nth frame, so a single box is
// never trusted. Each unmatched detection opens a sighting; a sighting becomes
// ready for recognition once it has absorbed `confirmation_threshold`
// detections, and it is dropped after one recognition attempt or when it has
// gone `timeout_frames` frames without a match.
//
// Design:
//   - Dense store ordered by creation; ids are monotonic and never reused
//   - Association is a per-axis proximity test, first match wins (no IoU, no
//     global assignment)
//   - No sighting ever goes back from Confirmed to Pending

use crate::types::{RawDetection, TrackerConfig};
use tracing::{debug, info};

// ============================================================================
// TYPES
// ============================================================================

/// Stable handle to a sighting. Ids grow monotonically for the tracker's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SightingId(pub u64);

impl std::fmt::Display for SightingId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "S{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SightingState {
    Pending,
    Confirmed,
    Processed,
}

#[derive(Debug, Clone)]
pub struct Sighting {
    pub id: SightingId,
    pub last_detection: RawDetection,
    pub confirmation_count: u32,
    pub frames_since_last_detection: u32,
    pub processed: bool,
}

impl Sighting {
    fn new(id: SightingId, det: RawDetection) -> Self {
        Self {
            id,
            last_detection: det,
            confirmation_count: 1,
            frames_since_last_detection: 0,
            processed: false,
        }
    }

    fn absorb(&mut self, det: RawDetection) {
        self.confirmation_count += 1;
        self.last_detection = det;
        self.frames_since_last_detection = 0;
    }

    pub fn state(&self, confirmation_threshold: u32) -> SightingState {
        if self.processed {
            SightingState::Processed
        } else if self.confirmation_count >= confirmation_threshold {
            SightingState::Confirmed
        } else {
            SightingState::Pending
        }
    }
}

/// What changed during one `update` call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackerUpdate {
    pub created: Vec<SightingId>,
    pub expired: Vec<SightingId>,
    pub matched: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrackerStats {
    pub created: u64,
    pub expired: u64,
    pub processed: u64,
}

// ============================================================================
// MAIN TRACKER
// ============================================================================

pub struct SightingTracker {
    pub config: TrackerConfig,
    sightings: Vec<Sighting>,
    next_id: u64,
    stats: TrackerStats,
}

impl SightingTracker {
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            config,
            sightings: Vec::with_capacity(16),
            next_id: 1,
            stats: TrackerStats::default(),
        }
    }

    /// Advance one frame. `detections` is empty on frames the detector skipped.
    pub fn update(&mut self, detections: &[RawDetection]) -> TrackerUpdate {
        let mut result = TrackerUpdate::default();

        for sighting in &mut self.sightings {
            sighting.frames_since_last_detection += 1;
        }

        let timeout = self.config.timeout_frames;
        let expired = &mut result.expired;
        self.sightings.retain(|s| {
            if s.frames_since_last_detection > timeout {
                info!(
                    "⏱️  Sighting {} expired (no detection for {} frames)",
                    s.id, s.frames_since_last_detection
                );
                expired.push(s.id);
                return false;
            }
            true
        });
        self.stats.expired += result.expired.len() as u64;

        let tolerance = self.config.proximity_tolerance_px;
        for det in detections {
            let existing = self
                .sightings
                .iter_mut()
                .find(|s| det.bbox.is_near(&s.last_detection.bbox, tolerance));

            match existing {
                Some(sighting) => {
                    sighting.absorb(*det);
                    result.matched += 1;
                    debug!(
                        "🔍 Sighting {} confirmation {}/{}",
                        sighting.id, sighting.confirmation_count, self.config.confirmation_threshold
                    );
                }
                None => {
                    let id = SightingId(self.next_id);
                    self.next_id += 1;
                    info!(
                        "🆕 New sighting {} at [{}, {}, {}x{}] conf={:.2}",
                        id, det.bbox.x, det.bbox.y, det.bbox.w, det.bbox.h, det.confidence
                    );
                    self.sightings.push(Sighting::new(id, *det));
                    result.created.push(id);
                }
            }
        }
        self.stats.created += result.created.len() as u64;

        result
    }

    /// Confirmed sightings that have not had their recognition attempt yet
    pub fn ready_for_processing(&self) -> Vec<SightingId> {
        let threshold = self.config.confirmation_threshold;
        self.sightings
            .iter()
            .filter(|s| s.state(threshold) == SightingState::Confirmed)
            .map(|s| s.id)
            .collect()
    }

    /// Record the single recognition attempt for a sighting and drop it, so a
    /// plate still in view has to be confirmed again from scratch.
    pub fn complete(&mut self, id: SightingId) -> Option<Sighting> {
        let idx = self.index_of(id)?;
        let mut sighting = self.sightings.remove(idx);
        sighting.processed = true;
        self.stats.processed += 1;
        debug!("🗑️  Sighting {} processed and removed", id);
        Some(sighting)
    }

    pub fn get(&self, id: SightingId) -> Option<&Sighting> {
        self.index_of(id).map(|idx| &self.sightings[idx])
    }

    pub fn sightings(&self) -> &[Sighting] {
        &self.sightings
    }

    pub fn len(&self) -> usize {
        self.sightings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sightings.is_empty()
    }

    pub fn stats(&self) -> TrackerStats {
        self.stats
    }

    /// Forget every sighting. Ids keep counting up.
    pub fn clear(&mut self) {
        self.sightings.clear();
    }

    // Ids are pushed in increasing order and removal preserves order.
    fn index_of(&self, id: SightingId) -> Option<usize> {
        self.sightings.binary_search_by_key(&id, |s| s.id).ok()
    }
}

// ============================================================================
// TESTS
// ============================================================================
