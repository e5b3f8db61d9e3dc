//! Batched, cancellable restore driver
//!
//! The selected path list is cut into batches of at most
//! [`RESTORE_BATCH_SIZE`] and sent to the helper one batch at a time.
//! Progress and the final outcome are reported as [`RestoreEvent`]s over a
//! channel supplied by the caller.

use async_channel::Sender;
use retrace_common::{RESTORE_BATCH_SIZE, RestoreError, validate_config_name};
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Snapshot coordinate a restore reads from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoreTarget {
    pub config: String,
    pub snapshot: u32,
}

impl RestoreTarget {
    pub fn new(config: impl Into<String>, snapshot: u32) -> Self {
        Self {
            config: config.into(),
            snapshot,
        }
    }

    fn validate(&self) -> Result<(), RestoreError> {
        validate_config_name(&self.config).map_err(RestoreError::InvalidArgument)?;
        if self.snapshot == 0 {
            return Err(RestoreError::InvalidArgument(
                "Snapshot 0 is the live system".to_string(),
            ));
        }
        Ok(())
    }
}

/// Events emitted while a restore session runs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestoreEvent {
    /// Overall progress; `current` counts paths across all batches
    Progress {
        current: usize,
        total: usize,
        label: String,
    },
    Error(String),
    /// Terminal event, sent exactly once per session
    Completed(bool),
}

/// Cooperative cancellation flag shared between the caller and a running session
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Something that can restore one batch of paths from a snapshot
pub trait RestoreTransport {
    /// Fails with `ServiceUnavailable` when the helper cannot be reached
    fn check_available(&self) -> impl Future<Output = Result<(), RestoreError>> + Send;

    /// Restore `paths` from `target`
    ///
    /// `on_step(current, total, name)` is called for every step the helper
    /// reports while the batch is in flight; `current` is 1-based within the batch.
    fn restore_batch(
        &self,
        target: &RestoreTarget,
        paths: &[String],
        on_step: &mut (dyn FnMut(usize, usize, &str) + Send),
    ) -> impl Future<Output = Result<(), RestoreError>> + Send;
}

/// State of one restore run
#[derive(Debug)]
pub struct RestoreSession {
    pub batches: Vec<Vec<String>>,
    pub current_batch: usize,
    pub total: usize,
    pub processed: usize,
    pub has_error: bool,
    cancel: CancelToken,
}

impl RestoreSession {
    /// Partition `paths` into contiguous batches of at most `batch_size`
    pub fn new(paths: Vec<String>, batch_size: usize, cancel: CancelToken) -> Self {
        let total = paths.len();
        let batches = paths
            .chunks(batch_size.max(1))
            .map(|chunk| chunk.to_vec())
            .collect();
        Self {
            batches,
            current_batch: 0,
            total,
            processed: 0,
            has_error: false,
            cancel,
        }
    }

    pub fn cancel_requested(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// Outcome of [`RestoreOrchestrator::run`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestoreSummary {
    pub total: usize,
    pub processed: usize,
    pub batches_sent: usize,
    pub failed_batches: usize,
    pub cancelled: bool,
    pub success: bool,
}

pub struct RestoreOrchestrator<T> {
    transport: T,
    batch_size: usize,
}

impl<T: RestoreTransport> RestoreOrchestrator<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            batch_size: RESTORE_BATCH_SIZE,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Restore `paths` from `target`, sending events to `events`
    ///
    /// Batches run strictly one after another. A failed batch marks the
    /// session as failed but the remaining batches are still sent. The token
    /// is checked before each batch; a batch already in flight always finishes.
    pub async fn run(
        &self,
        target: &RestoreTarget,
        paths: Vec<String>,
        events: &Sender<RestoreEvent>,
        cancel: &CancelToken,
    ) -> RestoreSummary {
        let mut summary = RestoreSummary {
            total: paths.len(),
            ..Default::default()
        };

        if let Err(e) = self.preflight(target, &paths).await {
            log::warn!("Restore not started: {}", e);
            emit(events, RestoreEvent::Error(e.to_string()));
            emit(events, RestoreEvent::Completed(false));
            return summary;
        }

        let mut session = RestoreSession::new(paths, self.batch_size, cancel.clone());
        let batch_count = session.batches.len();
        log::info!(
            "Restoring {} paths from {} snapshot {} in {} batches",
            session.total,
            target.config,
            target.snapshot,
            batch_count
        );

        while session.current_batch < batch_count {
            if session.cancel_requested() {
                log::info!(
                    "Restore cancelled before batch {}/{}",
                    session.current_batch + 1,
                    batch_count
                );
                summary.cancelled = true;
                summary.processed = session.processed;
                emit(events, RestoreEvent::Completed(false));
                return summary;
            }

            let batch = &session.batches[session.current_batch];
            let base = session.processed;
            let total = session.total;
            let batch_end = (base + batch.len()).min(total);

            // The batch-completed event reports `batch_end` itself
            let mut on_step = |current: usize, _steps: usize, name: &str| {
                let current = (base + current).min(total);
                if current >= batch_end {
                    return;
                }
                emit(
                    events,
                    RestoreEvent::Progress {
                        current,
                        total,
                        label: name.to_string(),
                    },
                );
            };

            let result = self
                .transport
                .restore_batch(target, batch, &mut on_step)
                .await;
            summary.batches_sent += 1;

            if let Err(e) = result {
                log::error!(
                    "Batch {}/{} failed: {}",
                    session.current_batch + 1,
                    batch_count,
                    e
                );
                session.has_error = true;
                summary.failed_batches += 1;
                emit(events, RestoreEvent::Error(e.to_string()));
            }

            session.processed += batch.len();
            session.current_batch += 1;
            emit(
                events,
                RestoreEvent::Progress {
                    current: session.processed,
                    total: session.total,
                    label: format!("Batch {}/{} completed", session.current_batch, batch_count),
                },
            );
        }

        summary.processed = session.processed;
        summary.success = !session.has_error;
        emit(events, RestoreEvent::Completed(summary.success));
        summary
    }

    async fn preflight(&self, target: &RestoreTarget, paths: &[String]) -> Result<(), RestoreError> {
        if paths.is_empty() {
            return Err(RestoreError::InvalidArgument(
                "No files selected for restore".to_string(),
            ));
        }
        target.validate()?;
        self.transport.check_available().await
    }
}

/// Events are dropped rather than awaited so step callbacks stay synchronous;
/// callers should pass an unbounded channel.
fn emit(events: &Sender<RestoreEvent>, event: RestoreEvent) {
    if let Err(e) = events.try_send(event) {
        log::debug!("Dropping restore event: {}", e);
    }
}
