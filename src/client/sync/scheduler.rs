//! # Sync Scheduler
//!
//! Owns the single sync pass.
//!
//! ## Features
//!
//! - **One pass at a time**: a guard flag turns concurrent `start_sync` calls
//!   into no-ops
//! - **Policy checks**: connectivity, WiFi-only and an empty backlog skip the pass
//! - **Pre-flight probe**: an unreachable service is noted on eligible items
//!   without consuming their retry budget
//! - **Sequential processing**: items are uploaded one after another
//! - **Cooperative cancellation**: checked between items and between assets
//! - **Auto-retry**: a remaining backlog re-schedules the pass with capped
//!   exponential backoff, up to a bounded number of attempts

use crate::client::offline::retry::{AutoRetryState, BackoffStrategy};
use crate::client::sync::upload::{ItemOutcome, OutcomeKind, UploadPipeline};
use crate::client::SyncEngine;
use crate::shared::event::{PassSummary, SyncEvent};
use crate::shared::progress::SyncProgress;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;

/// Why a pass did not start
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    AlreadySyncing,
    Offline,
    WifiRequired,
    NothingToSync,
    Disposed,
}

/// Result of `start_sync`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncReport {
    /// The pass did not run
    Skipped(SkipReason),
    /// The pre-flight probe failed; `next_retry` is the scheduled auto-retry delay
    Unreachable { next_retry: Option<Duration> },
    /// The pass processed items
    Finished {
        summary: PassSummary,
        next_retry: Option<Duration>,
    },
}

impl SyncReport {
    pub fn next_retry(&self) -> Option<Duration> {
        match self {
            Self::Skipped(_) => None,
            Self::Unreachable { next_retry } | Self::Finished { next_retry, .. } => *next_retry,
        }
    }
}

/// Clears the syncing flag when the pass ends, however it ends
pub struct PassGuard<'a> {
    syncing: &'a AtomicBool,
}

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        self.syncing.store(false, Ordering::SeqCst);
    }
}

fn locked<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Pass guard, cancellation flag and auto-retry timer
#[derive(Debug)]
pub struct SyncScheduler {
    syncing: AtomicBool,
    cancel: AtomicBool,
    disposed: AtomicBool,
    auto_retry: Mutex<AutoRetryState>,
    retry_timer: Mutex<Option<JoinHandle<()>>>,
}

impl SyncScheduler {
    pub fn new(strategy: BackoffStrategy, max_auto_retries: u32) -> Self {
        Self {
            syncing: AtomicBool::new(false),
            cancel: AtomicBool::new(false),
            disposed: AtomicBool::new(false),
            auto_retry: Mutex::new(AutoRetryState::new(strategy, max_auto_retries)),
            retry_timer: Mutex::new(None),
        }
    }

    /// Claim the pass; `None` if one is already running
    pub fn try_begin(&self) -> Option<PassGuard<'_>> {
        self.syncing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()?;
        self.cancel.store(false, Ordering::SeqCst);
        Some(PassGuard {
            syncing: &self.syncing,
        })
    }

    pub fn is_syncing(&self) -> bool {
        self.syncing.load(Ordering::SeqCst)
    }

    pub fn request_cancel(&self) -> bool {
        if self.is_syncing() {
            self.cancel.store(true, Ordering::SeqCst);
            true
        } else {
            false
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    pub fn cancel_flag(&self) -> &AtomicBool {
        &self.cancel
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    /// Next auto-retry delay, or `None` once the budget is spent
    pub fn next_retry_delay(&self) -> Option<Duration> {
        locked(&self.auto_retry).next_delay()
    }

    pub fn reset_retries(&self) {
        locked(&self.auto_retry).reset();
    }

    pub fn auto_retry_attempts(&self) -> u32 {
        locked(&self.auto_retry).attempts()
    }

    /// Install a new timer, aborting the previous one
    pub fn replace_timer(&self, handle: JoinHandle<()>) {
        if let Some(previous) = locked(&self.retry_timer).replace(handle) {
            previous.abort();
        }
    }

    pub fn abort_timer(&self) {
        if let Some(timer) = locked(&self.retry_timer).take() {
            timer.abort();
        }
    }

    pub fn has_pending_retry(&self) -> bool {
        locked(&self.retry_timer)
            .as_ref()
            .is_some_and(|timer| !timer.is_finished())
    }

    /// Stop for good: cancel the running pass and drop the timer
    pub fn dispose(&self) {
        self.disposed.store(true, Ordering::SeqCst);
        self.cancel.store(true, Ordering::SeqCst);
        self.abort_timer();
    }
}

impl SyncEngine {
    /// Run one sync pass over every eligible item
    pub async fn start_sync(&self) -> SyncReport {
        if self.scheduler.is_disposed() {
            return SyncReport::Skipped(SkipReason::Disposed);
        }
        self.initialize().await;

        let Some(_pass) = self.scheduler.try_begin() else {
            tracing::debug!("[SYNC] Pass already running, ignoring start");
            return SyncReport::Skipped(SkipReason::AlreadySyncing);
        };

        let settings = self.settings.current().await;
        let network = self.network.current();
        if !network.allows_sync(settings.wifi_only) {
            let reason = if network.connected {
                SkipReason::WifiRequired
            } else {
                SkipReason::Offline
            };
            tracing::info!("[SYNC] Skipping pass: {:?}", reason);
            return SyncReport::Skipped(reason);
        }

        let eligible = self.items.eligible(settings.max_retries).await;
        if eligible.is_empty() {
            self.scheduler.reset_retries();
            tracing::debug!("[SYNC] Nothing to sync");
            return SyncReport::Skipped(SkipReason::NothingToSync);
        }

        self.metrics.write().await.record_pass_start();
        tracing::info!("[SYNC] Starting pass over {} items", eligible.len());
        self.durable.emit(SyncEvent::SyncStarted {
            eligible_items: eligible.len(),
        });

        if let Err(error) = self.api.check_health().await {
            if error.is_retryable() {
                let message = error.user_message();
                tracing::warn!("[SYNC] Archive unreachable: {}", error);
                let ids: Vec<String> = eligible.iter().map(|item| item.local_id.clone()).collect();
                self.items.annotate_unreachable(&ids, &message).await;
                self.metrics.write().await.record_pass_unreachable();

                let next_retry = self.schedule_auto_retry();
                self.durable.emit(SyncEvent::SyncError {
                    message,
                    retry_in_ms: next_retry.map(|delay| delay.as_millis() as u64),
                });
                return SyncReport::Unreachable { next_retry };
            }
            tracing::warn!("[SYNC] Health probe rejected, continuing: {}", error);
        }

        let files_total = eligible.iter().map(|item| item.pending_assets().count() as u32).sum();
        let bytes_total = eligible.iter().map(|item| item.pending_bytes()).sum();
        self.publish_progress(self.progress.begin(files_total, bytes_total).await);

        let pipeline = UploadPipeline::new(
            self.api.as_ref(),
            &self.items,
            &self.progress,
            self.scheduler.cancel_flag(),
            settings.clone(),
            self.config.app().max_asset_backoff,
        );

        let mut summary = PassSummary::default();
        for item in &eligible {
            if self.scheduler.is_cancelled() {
                summary.cancelled = true;
                break;
            }
            let outcome = pipeline.process(&item.local_id).await;
            if self.record_outcome(&mut summary, outcome) {
                break;
            }
        }
        // A cancel raised during the last upload still counts
        if self.scheduler.is_cancelled() {
            summary.cancelled = true;
        }

        self.publish_progress(self.progress.finish(!summary.cancelled).await);
        self.metrics.write().await.record_pass_finished(&summary);
        tracing::info!(
            "[SYNC] Pass finished: {} synced, {} partial, {} failed, {} bytes{}",
            summary.items_synced,
            summary.items_partial,
            summary.items_failed,
            summary.bytes_uploaded,
            if summary.cancelled { " (cancelled)" } else { "" }
        );
        self.durable.emit(SyncEvent::SyncCompleted {
            summary: summary.clone(),
        });

        let next_retry = if summary.cancelled {
            None
        } else if self.items.eligible(settings.max_retries).await.is_empty() {
            self.scheduler.reset_retries();
            None
        } else {
            self.schedule_auto_retry()
        };

        SyncReport::Finished { summary, next_retry }
    }

    fn publish_progress(&self, progress: SyncProgress) {
        self.durable.emit(SyncEvent::ProgressUpdated { progress });
    }

    /// Fold one item outcome into the summary; returns `true` on cancellation
    fn record_outcome(&self, summary: &mut PassSummary, outcome: ItemOutcome) -> bool {
        summary.assets_uploaded += outcome.assets_uploaded;
        summary.bytes_uploaded += outcome.bytes_uploaded;

        match outcome.kind {
            OutcomeKind::Synced { remote_id } => {
                summary.items_synced += 1;
                tracing::info!("[SYNC] {} synced as {}", outcome.local_id, remote_id);
                self.durable.emit(SyncEvent::ItemSynced {
                    local_id: outcome.local_id,
                    remote_id,
                });
            }
            OutcomeKind::Partial { error, retryable } => {
                summary.items_partial += 1;
                self.durable.emit(SyncEvent::ItemFailed {
                    local_id: outcome.local_id,
                    error,
                    retryable,
                });
            }
            OutcomeKind::Failed { error, retryable } => {
                summary.items_failed += 1;
                self.durable.emit(SyncEvent::ItemFailed {
                    local_id: outcome.local_id,
                    error,
                    retryable,
                });
            }
            OutcomeKind::Cancelled => {
                summary.cancelled = true;
                return true;
            }
            OutcomeKind::Requeued | OutcomeKind::Skipped => {}
        }
        false
    }

    /// Schedule the next automatic pass; returns the delay used
    pub(crate) fn schedule_auto_retry(&self) -> Option<Duration> {
        let Some(delay) = self.scheduler.next_retry_delay() else {
            tracing::warn!(
                "[SYNC] Auto-retry budget spent after {} attempts; waiting for a manual sync",
                self.scheduler.auto_retry_attempts()
            );
            return None;
        };

        let engine = self.weak.clone();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(engine) = engine.upgrade() {
                engine.spawn_sync();
            }
        });
        self.scheduler.replace_timer(timer);
        tracing::info!("[SYNC] Auto-retry scheduled in {:?}", delay);
        Some(delay)
    }

    /// Ask the running pass to stop at the next item or asset boundary
    pub fn cancel_sync(&self) -> bool {
        let requested = self.scheduler.request_cancel();
        if requested {
            tracing::info!("[SYNC] Cancellation requested");
        }
        requested
    }

    pub fn is_syncing(&self) -> bool {
        self.scheduler.is_syncing()
    }
}
