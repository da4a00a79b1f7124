//! # Sync Metrics
//!
//! Counters over the lifetime of the engine: passes, outcomes, throughput.

use crate::shared::event::PassSummary;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Default)]
pub struct SyncMetrics {
    /// Passes that got past the pre-flight checks
    pub total_passes: u64,
    /// Passes that ran every eligible item without item failures
    pub successful_passes: u64,
    /// Passes that hit an unreachable service or ended with failed items
    pub failed_passes: u64,
    pub cancelled_passes: u64,
    pub items_synced: u64,
    pub assets_uploaded: u64,
    pub total_bytes_uploaded: u64,
    pub average_pass_duration: Duration,
    pub last_pass_duration: Option<Duration>,
    last_pass_start: Option<Instant>,
    timed_passes: u32,
}

impl SyncMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_pass_start(&mut self) {
        self.last_pass_start = Some(Instant::now());
        self.total_passes += 1;
    }

    /// The pass never reached an item
    pub fn record_pass_unreachable(&mut self) {
        self.last_pass_start = None;
        self.failed_passes += 1;
    }

    pub fn record_pass_finished(&mut self, summary: &PassSummary) {
        let Some(start) = self.last_pass_start.take() else {
            return;
        };
        let duration = start.elapsed();

        // Rolling average over passes that processed items
        let total_duration = self.average_pass_duration * self.timed_passes + duration;
        self.timed_passes += 1;
        self.average_pass_duration = total_duration / self.timed_passes;
        self.last_pass_duration = Some(duration);

        self.items_synced += u64::from(summary.items_synced);
        self.assets_uploaded += u64::from(summary.assets_uploaded);
        self.total_bytes_uploaded += summary.bytes_uploaded;

        if summary.cancelled {
            self.cancelled_passes += 1;
        } else if summary.had_failures() {
            self.failed_passes += 1;
        } else {
            self.successful_passes += 1;
        }
    }

    pub fn success_rate(&self) -> f64 {
        if self.total_passes == 0 {
            0.0
        } else {
            self.successful_passes as f64 / self.total_passes as f64
        }
    }
}
