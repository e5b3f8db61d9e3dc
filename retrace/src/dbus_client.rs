//! D-Bus client for the retrace-helper privileged service
//!
//! # Architecture
//! - Client (unprivileged) ↔ system bus ↔ retrace-helper (root)
//! - Every call is authorized by the helper through Polkit
//! - Bus errors are mapped back into [`RestoreError`] by error name
//!
//! # Example
//! ```no_run
//! use retrace::dbus_client::HelperClient;
//!
//! # async fn demo() -> Result<(), retrace_common::RestoreError> {
//! let client = HelperClient::new().await?;
//! let changes = client.get_file_changes("root", 12).await?;
//! println!("{changes}");
//! # Ok(())
//! # }
//! ```

use crate::orchestrator::{RestoreTarget, RestoreTransport};
use futures_util::{FutureExt, StreamExt};
use retrace_common::*;
use std::pin::pin;
use zbus::{Connection, DBusError, Proxy};

/// Async client for retrace-helper
#[derive(Clone)]
pub struct HelperClient {
    connection: Connection,
}

/// Convert a zbus error into the shared taxonomy
///
/// Error replies keep their meaning; everything else is a transport problem.
fn map_bus_error(err: zbus::Error) -> RestoreError {
    match err {
        zbus::Error::MethodError(name, description, _) => {
            RestoreError::from_error_name(name.as_str(), description.as_deref().unwrap_or_default())
        }
        zbus::Error::FDO(fdo) => {
            RestoreError::from_error_name(fdo.name().as_str(), fdo.description().unwrap_or_default())
        }
        other => RestoreError::ServiceUnavailable(other.to_string()),
    }
}

impl HelperClient {
    /// Connect to the system bus
    pub async fn new() -> Result<Self, RestoreError> {
        let connection = Connection::system()
            .await
            .map_err(|e| RestoreError::ServiceUnavailable(format!("Failed to connect to system bus: {e}")))?;

        Ok(Self { connection })
    }

    /// Use an existing connection (e.g. a session bus in integration setups)
    pub fn with_connection(connection: Connection) -> Self {
        Self { connection }
    }

    async fn proxy(&self) -> Result<Proxy<'static>, RestoreError> {
        Proxy::new(
            &self.connection,
            DBUS_SERVICE_NAME,
            DBUS_OBJECT_PATH,
            DBUS_INTERFACE_NAME,
        )
        .await
        .map_err(map_bus_error)
    }

    /// Ping the helper, starting it through bus activation if needed
    pub async fn ping(&self) -> Result<(), RestoreError> {
        let peer = Proxy::new(
            &self.connection,
            DBUS_SERVICE_NAME,
            DBUS_OBJECT_PATH,
            "org.freedesktop.DBus.Peer",
        )
        .await
        .map_err(map_bus_error)?;

        let _: () = peer.call("Ping", &()).await.map_err(|e| match map_bus_error(e) {
            RestoreError::UnexpectedException(msg) => RestoreError::ServiceUnavailable(msg),
            other => other,
        })?;
        Ok(())
    }

    /// List snapshots of the default configuration
    pub async fn list_snapshots(&self) -> Result<Vec<SnapshotInfo>, RestoreError> {
        let proxy = self.proxy().await?;
        let csv: String = proxy
            .call("ListSnapshots", &())
            .await
            .map_err(map_bus_error)?;

        Ok(snapshots_from_csv(&csv))
    }

    /// Create a snapshot and return its metadata
    ///
    /// `pre_number` is only used for post snapshots.
    pub async fn create_snapshot(
        &self,
        snapshot_type: SnapshotType,
        description: &str,
        pre_number: u32,
        cleanup: CleanupAlgorithm,
        important: bool,
    ) -> Result<SnapshotInfo, RestoreError> {
        let proxy = self.proxy().await?;
        let pre_number = i32::try_from(pre_number)
            .map_err(|_| RestoreError::InvalidArgument(format!("Invalid pre number {pre_number}")))?;

        let csv: String = proxy
            .call(
                "CreateSnapshot",
                &(
                    snapshot_type.as_str(),
                    description,
                    pre_number,
                    cleanup.as_str(),
                    important,
                ),
            )
            .await
            .map_err(map_bus_error)?;

        snapshots_from_csv(&csv).into_iter().next().ok_or_else(|| {
            RestoreError::UnexpectedException("Helper returned no snapshot".to_string())
        })
    }

    pub async fn delete_snapshot(&self, number: u32) -> Result<bool, RestoreError> {
        let proxy = self.proxy().await?;
        proxy
            .call("DeleteSnapshot", &(to_wire_number(number)?,))
            .await
            .map_err(map_bus_error)
    }

    pub async fn rollback_snapshot(&self, number: u32) -> Result<bool, RestoreError> {
        let proxy = self.proxy().await?;
        proxy
            .call("RollbackSnapshot", &(to_wire_number(number)?,))
            .await
            .map_err(map_bus_error)
    }

    /// Raw `<status> <path>` lines between `snapshot` and the live system
    pub async fn get_file_changes(&self, config: &str, snapshot: u32) -> Result<String, RestoreError> {
        let proxy = self.proxy().await?;
        proxy
            .call("GetFileChanges", &(config, to_wire_number(snapshot)?))
            .await
            .map_err(map_bus_error)
    }

    /// Unified diff of one path; empty if the path did not change
    pub async fn get_file_diff(
        &self,
        config: &str,
        snapshot: u32,
        path: &str,
    ) -> Result<String, RestoreError> {
        let proxy = self.proxy().await?;
        proxy
            .call("GetFileDiff", &(config, to_wire_number(snapshot)?, path))
            .await
            .map_err(map_bus_error)
    }

    /// Restore one batch of paths, forwarding progress signals to `on_step`
    ///
    /// The signal subscription is set up before the call so no step of this
    /// batch is missed.
    pub async fn restore_files(
        &self,
        config: &str,
        snapshot: u32,
        paths: &[String],
        on_step: &mut (dyn FnMut(usize, usize, &str) + Send),
    ) -> Result<(), RestoreError> {
        let proxy = self.proxy().await?;
        let mut progress = proxy
            .receive_signal(RESTORE_PROGRESS_SIGNAL)
            .await
            .map_err(map_bus_error)?;

        let snapshot = to_wire_number(snapshot)?;
        let body = (config, snapshot, paths);
        let mut call = pin!(proxy.call::<_, _, bool>("RestoreFiles", &body));

        let result = loop {
            tokio::select! {
                biased;
                Some(message) = progress.next() => forward_progress(&message, on_step),
                result = &mut call => break result,
            }
        };

        // Signals emitted just before the reply may still be queued
        while let Some(Some(message)) = progress.next().now_or_never() {
            forward_progress(&message, on_step);
        }

        match result.map_err(map_bus_error)? {
            true => Ok(()),
            false => Err(RestoreError::UnexpectedException(
                "Helper reported restore failure".to_string(),
            )),
        }
    }
}

fn forward_progress(message: &zbus::Message, on_step: &mut (dyn FnMut(usize, usize, &str) + Send)) {
    match message.body().deserialize::<(i32, i32, String)>() {
        Ok((current, total, path)) => {
            on_step(current.max(0) as usize, total.max(0) as usize, &path);
        }
        Err(e) => log::warn!("Ignoring malformed {} signal: {}", RESTORE_PROGRESS_SIGNAL, e),
    }
}

fn to_wire_number(number: u32) -> Result<i32, RestoreError> {
    i32::try_from(number)
        .map_err(|_| RestoreError::InvalidArgument(format!("Invalid snapshot number {number}")))
}

impl RestoreTransport for HelperClient {
    async fn check_available(&self) -> Result<(), RestoreError> {
        self.ping().await
    }

    async fn restore_batch(
        &self,
        target: &RestoreTarget,
        paths: &[String],
        on_step: &mut (dyn FnMut(usize, usize, &str) + Send),
    ) -> Result<(), RestoreError> {
        self.restore_files(&target.config, target.snapshot, paths, on_step)
            .await
    }
}
