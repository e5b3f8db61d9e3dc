//! The `org.retrace.Operations` bus object

use crate::authority::{Caller, PolkitGate};
use crate::operations::{Operations, RestoreProgress};
use crate::snapshots::{BtrfsSnapshots, CreateRequest};
use retrace_common::{CleanupAlgorithm, RestoreError, SnapshotType};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{Notify, mpsc};
use zbus::{Connection, interface};

/// Progress events buffered between the step loop and the signal emitter
const PROGRESS_QUEUE: usize = 64;

/// Bus errors, named `org.retrace.Error.<Variant>`
#[derive(Debug, zbus::DBusError)]
#[zbus(prefix = "org.retrace.Error")]
pub enum ServiceError {
    #[zbus(error)]
    ZBus(zbus::Error),
    AuthorizationDenied(String),
    ServiceUnavailable(String),
    SnapshotNotFound(String),
    InvalidArgument(String),
    NoDiff(String),
    PartialRestoreFailure(String),
    UnexpectedException(String),
    Cancelled(String),
}

impl From<RestoreError> for ServiceError {
    fn from(error: RestoreError) -> Self {
        let detail = error.detail();
        match error {
            RestoreError::AuthorizationDenied(_) => ServiceError::AuthorizationDenied(detail),
            RestoreError::ServiceUnavailable(_) => ServiceError::ServiceUnavailable(detail),
            RestoreError::SnapshotNotFound(_) => ServiceError::SnapshotNotFound(detail),
            RestoreError::InvalidArgument(_) => ServiceError::InvalidArgument(detail),
            RestoreError::NoDiff => ServiceError::NoDiff(detail),
            RestoreError::PartialRestoreFailure { .. } => ServiceError::PartialRestoreFailure(detail),
            RestoreError::UnexpectedException(_) => ServiceError::UnexpectedException(detail),
            RestoreError::Cancelled => ServiceError::Cancelled(detail),
        }
    }
}

/// Tracks calls so the helper can exit when nobody needs it
#[derive(Debug, Default)]
pub struct Activity {
    touched: Notify,
    quit: Notify,
    in_flight: AtomicUsize,
}

/// Marks one call as running until dropped
pub struct CallGuard(Arc<Activity>);

impl Drop for CallGuard {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.0.touched.notify_one();
    }
}

impl Activity {
    pub fn begin(self: &Arc<Self>) -> CallGuard {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        self.touched.notify_one();
        CallGuard(Arc::clone(self))
    }

    pub fn request_quit(&self) {
        self.quit.notify_one();
    }

    /// Resolve after `idle_timeout` without calls, or when quit is requested
    ///
    /// A call still running keeps the helper alive.
    pub async fn idle_or_quit(&self, idle_timeout: Duration) {
        loop {
            tokio::select! {
                _ = self.quit.notified() => {
                    log::info!("Quit requested");
                    return;
                }
                _ = self.touched.notified() => {}
                _ = tokio::time::sleep(idle_timeout) => {
                    if self.in_flight.load(Ordering::SeqCst) == 0 {
                        log::info!("No calls for {} seconds", idle_timeout.as_secs());
                        return;
                    }
                }
            }
        }
    }
}

pub struct RetraceService {
    ops: Operations<PolkitGate, BtrfsSnapshots>,
    activity: Arc<Activity>,
}

impl RetraceService {
    pub fn new(ops: Operations<PolkitGate, BtrfsSnapshots>, activity: Arc<Activity>) -> Self {
        Self { ops, activity }
    }

    async fn caller(hdr: &zbus::message::Header<'_>, connection: &Connection) -> Result<Caller, ServiceError> {
        Caller::from_header(hdr, connection).await.map_err(|e| {
            log::warn!("Cannot identify caller: {:#}", e);
            ServiceError::AuthorizationDenied("Cannot identify caller".to_string())
        })
    }

    async fn emit_progress(ctxt: &zbus::SignalContext<'_>, (current, total, path): RestoreProgress) {
        let current = i32::try_from(current).unwrap_or(i32::MAX);
        let total = i32::try_from(total).unwrap_or(i32::MAX);
        if let Err(e) = Self::restore_progress(ctxt, current, total, &path).await {
            log::error!("Failed to emit RestoreProgress signal: {}", e);
        }
    }
}

#[interface(name = "org.retrace.Operations")]
impl RetraceService {
    /// Emitted before each undo step of a RestoreFiles call
    #[zbus(signal)]
    async fn restore_progress(
        ctxt: &zbus::SignalContext<'_>,
        current: i32,
        total: i32,
        path: &str,
    ) -> zbus::Result<()>;

    async fn list_snapshots(
        &self,
        #[zbus(header)] hdr: zbus::message::Header<'_>,
        #[zbus(connection)] connection: &Connection,
    ) -> Result<String, ServiceError> {
        let _call = self.activity.begin();
        let caller = Self::caller(&hdr, connection).await?;
        Ok(self.ops.list_snapshots(&caller).await?)
    }

    async fn create_snapshot(
        &self,
        #[zbus(header)] hdr: zbus::message::Header<'_>,
        #[zbus(connection)] connection: &Connection,
        snapshot_type: String,
        description: String,
        pre_number: i32,
        cleanup: String,
        important: bool,
    ) -> Result<String, ServiceError> {
        let _call = self.activity.begin();
        let caller = Self::caller(&hdr, connection).await?;

        let snapshot_type: SnapshotType = snapshot_type
            .parse()
            .map_err(ServiceError::InvalidArgument)?;
        let cleanup: CleanupAlgorithm = cleanup.parse().map_err(ServiceError::InvalidArgument)?;
        let pre_number = u32::try_from(pre_number)
            .map_err(|_| ServiceError::InvalidArgument(format!("Invalid pre number {pre_number}")))?;

        let request = CreateRequest {
            snapshot_type,
            description,
            pre_number,
            cleanup,
            important,
            user: 0,
        };
        Ok(self.ops.create_snapshot(&caller, request).await?)
    }

    async fn delete_snapshot(
        &self,
        #[zbus(header)] hdr: zbus::message::Header<'_>,
        #[zbus(connection)] connection: &Connection,
        number: i32,
    ) -> Result<bool, ServiceError> {
        let _call = self.activity.begin();
        let caller = Self::caller(&hdr, connection).await?;
        Ok(self.ops.delete_snapshot(&caller, number).await?)
    }

    async fn rollback_snapshot(
        &self,
        #[zbus(header)] hdr: zbus::message::Header<'_>,
        #[zbus(connection)] connection: &Connection,
        number: i32,
    ) -> Result<bool, ServiceError> {
        let _call = self.activity.begin();
        let caller = Self::caller(&hdr, connection).await?;
        Ok(self.ops.rollback_snapshot(&caller, number).await?)
    }

    async fn get_file_changes(
        &self,
        #[zbus(header)] hdr: zbus::message::Header<'_>,
        #[zbus(connection)] connection: &Connection,
        config_name: String,
        snapshot_number: i32,
    ) -> Result<String, ServiceError> {
        let _call = self.activity.begin();
        let caller = Self::caller(&hdr, connection).await?;
        Ok(self
            .ops
            .get_file_changes(&caller, &config_name, snapshot_number)
            .await?)
    }

    async fn get_file_diff(
        &self,
        #[zbus(header)] hdr: zbus::message::Header<'_>,
        #[zbus(connection)] connection: &Connection,
        config_name: String,
        snapshot_number: i32,
        path: String,
    ) -> Result<String, ServiceError> {
        let _call = self.activity.begin();
        let caller = Self::caller(&hdr, connection).await?;
        Ok(self
            .ops
            .get_file_diff(&caller, &config_name, snapshot_number, &path)
            .await?)
    }

    /// Restore one batch of paths; progress goes out as RestoreProgress signals
    async fn restore_files(
        &self,
        #[zbus(header)] hdr: zbus::message::Header<'_>,
        #[zbus(connection)] connection: &Connection,
        #[zbus(signal_context)] ctxt: zbus::SignalContext<'_>,
        config_name: String,
        snapshot_number: i32,
        paths: Vec<String>,
    ) -> Result<bool, ServiceError> {
        let _call = self.activity.begin();
        let caller = Self::caller(&hdr, connection).await?;

        let (tx, mut rx) = mpsc::channel(PROGRESS_QUEUE);
        let work = self
            .ops
            .restore_files(&caller, &config_name, snapshot_number, paths, tx);
        tokio::pin!(work);

        let result = loop {
            tokio::select! {
                biased;
                Some(progress) = rx.recv() => Self::emit_progress(&ctxt, progress).await,
                result = &mut work => break result,
            }
        };

        // Signals must go out before the reply
        while let Ok(progress) = rx.try_recv() {
            Self::emit_progress(&ctxt, progress).await;
        }

        result?;
        Ok(true)
    }

    /// Exit once the current calls finish
    async fn quit(&self) {
        log::info!("Quit called");
        self.activity.request_quit();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zbus::DBusError;

    #[test]
    fn test_error_names_match_taxonomy() {
        let cases = [
            RestoreError::AuthorizationDenied("x".to_string()),
            RestoreError::SnapshotNotFound("x".to_string()),
            RestoreError::InvalidArgument("x".to_string()),
            RestoreError::PartialRestoreFailure { failed: 1, total: 4 },
            RestoreError::UnexpectedException("x".to_string()),
            RestoreError::Cancelled,
        ];

        for error in cases {
            let expected = error.error_name();
            let service: ServiceError = error.into();
            assert_eq!(service.name().as_str(), expected);
        }
    }

    #[test]
    fn test_partial_failure_detail_round_trips() {
        let service: ServiceError = RestoreError::PartialRestoreFailure { failed: 2, total: 9 }.into();
        let back = RestoreError::from_error_name(
            service.name().as_str(),
            service.description().unwrap_or_default(),
        );
        assert_eq!(back.failure_count(), Some((2, 9)));
    }

    #[tokio::test]
    async fn test_idle_timeout_fires_without_calls() {
        let activity = Arc::new(Activity::default());
        tokio::time::timeout(
            Duration::from_secs(5),
            activity.idle_or_quit(Duration::from_millis(20)),
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_running_call_keeps_helper_alive() {
        let activity = Arc::new(Activity::default());
        let guard = activity.begin();

        let waited = tokio::time::timeout(
            Duration::from_millis(150),
            activity.idle_or_quit(Duration::from_millis(20)),
        )
        .await;
        assert!(waited.is_err());

        drop(guard);
        activity.request_quit();
        tokio::time::timeout(
            Duration::from_secs(5),
            activity.idle_or_quit(Duration::from_secs(60)),
        )
        .await
        .unwrap();
    }
}
