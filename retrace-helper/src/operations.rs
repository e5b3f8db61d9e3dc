//! Helper operations: authorize, then act
//!
//! Nothing here knows about the bus. The service layer resolves the caller,
//! forwards progress as signals and maps [`RestoreError`] to bus errors.

use crate::audit;
use crate::authority::{AuthorizationGate, Caller, Capability};
use crate::comparison::{Comparison, ComparisonRoots};
use crate::restore::{RestoreReport, restore_paths};
use crate::snapshots::{CreateRequest, SnapshotBackend};
use anyhow::Context;
use retrace_common::{
    RestoreError, RetraceConfig, SnapperConfig, snapshots_to_csv, validate_config_name,
    validate_snapshot_number,
};
use std::collections::HashMap;
use std::process::Command;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard, mpsc};

/// Configuration used by the snapshot lifecycle methods, which carry no name
pub const DEFAULT_CONFIG: &str = "root";

/// `(current, total, path)` before each applied undo step
pub type RestoreProgress = (usize, usize, String);

pub struct Operations<G, B> {
    config: Arc<RetraceConfig>,
    gate: G,
    backend: Arc<B>,
    /// One lock per configuration name, held while a comparison is in use
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl<G, B> Operations<G, B>
where
    G: AuthorizationGate,
    B: SnapshotBackend + 'static,
{
    pub fn new(config: RetraceConfig, gate: G, backend: B) -> Self {
        Self {
            config: Arc::new(config),
            gate,
            backend: Arc::new(backend),
            locks: Mutex::new(HashMap::new()),
        }
    }

    async fn authorize(&self, caller: &Caller, capability: Capability, operation: &str) -> Result<(), RestoreError> {
        if let Err(e) = self.gate.check(caller, capability).await {
            audit::log_auth_failure(caller, operation, &e.detail());
            return Err(e);
        }
        Ok(())
    }

    fn snapper_config(&self, name: &str) -> Result<SnapperConfig, RestoreError> {
        validate_config_name(name).map_err(RestoreError::InvalidArgument)?;
        self.config
            .snapper_config(name)
            .cloned()
            .ok_or_else(|| RestoreError::InvalidArgument(format!("Unknown configuration '{name}'")))
    }

    async fn lock_config(&self, name: &str) -> OwnedMutexGuard<()> {
        let lock = self
            .locks
            .lock()
            .await
            .entry(name.to_string())
            .or_default()
            .clone();
        lock.lock_owned().await
    }

    /// Resolve the comparison coordinates for `(config, snapshot)`
    fn comparison_roots(&self, config: &SnapperConfig, number: u32) -> Result<ComparisonRoots, RestoreError> {
        if !self.backend.exists(config, number) {
            return Err(RestoreError::SnapshotNotFound(format!(
                "Snapshot {number} not found"
            )));
        }

        Ok(ComparisonRoots {
            pre: config.snapshot_root(number),
            system: config.subvolume.clone(),
            skip: vec![config.snapshot_dir.clone()],
        })
    }

    pub async fn list_snapshots(&self, caller: &Caller) -> Result<String, RestoreError> {
        self.authorize(caller, Capability::List, "list_snapshots").await?;

        let config = self.snapper_config(DEFAULT_CONFIG)?;
        let backend = Arc::clone(&self.backend);
        run_blocking(move || {
            let snapshots = backend.list(&config)?;
            snapshots_to_csv(&snapshots)
        })
        .await
    }

    /// Create a snapshot and return the CSV header plus its row
    pub async fn create_snapshot(&self, caller: &Caller, mut request: CreateRequest) -> Result<String, RestoreError> {
        self.authorize(caller, Capability::Create, "create_snapshot").await?;

        request.user = caller.uid.unwrap_or(0);
        let config = self.snapper_config(DEFAULT_CONFIG)?;
        let backend = Arc::clone(&self.backend);
        let resource = format!("{} snapshot", request.snapshot_type);

        let result = run_blocking(move || {
            let info = backend.create(&config, &request)?;
            snapshots_to_csv([&info])
        })
        .await;

        audit::log_snapshot_create(caller, &resource, result.as_ref().err().map(|e| e.detail()).as_deref());
        result
    }

    pub async fn delete_snapshot(&self, caller: &Caller, number: i32) -> Result<bool, RestoreError> {
        self.authorize(caller, Capability::Delete, "delete_snapshot").await?;

        let number = validate_snapshot_number(number).map_err(RestoreError::InvalidArgument)?;
        let config = self.snapper_config(DEFAULT_CONFIG)?;
        let _guard = self.lock_config(DEFAULT_CONFIG).await;
        let backend = Arc::clone(&self.backend);

        let result = run_blocking(move || backend.delete(&config, number)).await;

        audit::log_snapshot_delete(caller, &number.to_string(), result.as_ref().err().map(|e| e.detail()).as_deref());
        result.map(|()| true)
    }

    pub async fn rollback_snapshot(&self, caller: &Caller, number: i32) -> Result<bool, RestoreError> {
        self.authorize(caller, Capability::Rollback, "rollback_snapshot").await?;

        let number = validate_snapshot_number(number).map_err(RestoreError::InvalidArgument)?;
        let config = self.snapper_config(DEFAULT_CONFIG)?;
        let backend = Arc::clone(&self.backend);

        let result = run_blocking(move || backend.rollback(&config, number)).await;

        audit::log_snapshot_rollback(caller, &number.to_string(), result.as_ref().err().map(|e| e.detail()).as_deref());
        result.map(|()| true)
    }

    /// `<status> <path>` lines for every entry that differs from the live system
    pub async fn get_file_changes(&self, caller: &Caller, config_name: &str, number: i32) -> Result<String, RestoreError> {
        self.authorize(caller, Capability::List, "get_file_changes").await?;

        let number = validate_snapshot_number(number).map_err(RestoreError::InvalidArgument)?;
        let config = self.snapper_config(config_name)?;
        let _guard = self.lock_config(config_name).await;
        let roots = self.comparison_roots(&config, number)?;

        run_blocking(move || {
            let comparison = Comparison::build(roots, &config.subvolume)?;
            Ok(comparison.files().to_change_lines())
        })
        .await
    }

    /// Unified diff from the snapshot side to the live side of one entry
    ///
    /// An empty string means the path is not part of the comparison.
    pub async fn get_file_diff(
        &self,
        caller: &Caller,
        config_name: &str,
        number: i32,
        path: &str,
    ) -> Result<String, RestoreError> {
        self.authorize(caller, Capability::List, "get_file_diff").await?;

        let number = validate_snapshot_number(number).map_err(RestoreError::InvalidArgument)?;
        let config = self.snapper_config(config_name)?;
        let _guard = self.lock_config(config_name).await;
        let roots = self.comparison_roots(&config, number)?;
        let path = path.to_string();

        run_blocking(move || {
            let comparison = Comparison::build(roots, &config.subvolume)?;
            let files = comparison.files();
            let Some(file) = files
                .find_absolute(&path)
                .or_else(|| files.find(&path))
                .and_then(|i| files.get(i))
            else {
                return Ok(String::new());
            };

            let pre = comparison.roots().pre_path(file.name());
            let system = comparison.roots().system_path(file.name());
            unified_diff(&pre, &system)
        })
        .await
    }

    /// Restore `paths` of `snapshot` into the live system
    ///
    /// Progress is sent on `progress` before each step. A full channel
    /// blocks the step loop; a closed one drops the events.
    pub async fn restore_files(
        &self,
        caller: &Caller,
        config_name: &str,
        number: i32,
        paths: Vec<String>,
        progress: mpsc::Sender<RestoreProgress>,
    ) -> Result<RestoreReport, RestoreError> {
        self.authorize(caller, Capability::Rollback, "restore_files").await?;

        if paths.is_empty() {
            return Err(RestoreError::InvalidArgument(
                "No files specified for restore".to_string(),
            ));
        }

        let number = validate_snapshot_number(number).map_err(RestoreError::InvalidArgument)?;
        let config = self.snapper_config(config_name)?;
        let _guard = self.lock_config(config_name).await;
        let roots = self.comparison_roots(&config, number)?;
        let requested = paths.len();

        log::info!(
            "Restoring {} paths from snapshot {} of '{}'",
            requested,
            number,
            config_name
        );

        let result = run_blocking(move || {
            let mut comparison = Comparison::build(roots, &config.subvolume)?;
            let (files, roots) = comparison.split_mut();
            let report = restore_paths(files, roots, &paths, |current, total, name| {
                let _ = progress.blocking_send((current, total, name.to_string()));
            })?;
            Ok(report)
        })
        .await;

        let result = result.and_then(RestoreReport::into_result);

        let resource = format!("{config_name}:{number}");
        match &result {
            Ok(report) => audit::log_restore(caller, &resource, requested, 0, report.total_steps, None),
            Err(e) => {
                let (failed, total) = e.failure_count().unwrap_or((0, 0));
                audit::log_restore(caller, &resource, requested, failed, total, Some(&e.detail()));
            }
        }

        result
    }
}

/// Run filesystem work off the async workers and map its error for clients
async fn run_blocking<T, F>(work: F) -> Result<T, RestoreError>
where
    T: Send + 'static,
    F: FnOnce() -> anyhow::Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| RestoreError::UnexpectedException(format!("Worker task failed: {e}")))?
        .map_err(|e| to_client_error(&e))
}

/// Keep typed errors, sanitize everything else
fn to_client_error(error: &anyhow::Error) -> RestoreError {
    match error.downcast_ref::<RestoreError>() {
        Some(typed) => typed.clone(),
        None => RestoreError::UnexpectedException(sanitize_error_for_client(error)),
    }
}

/// Strip system paths from error text sent to unprivileged callers
///
/// The full error is logged for administrators.
pub fn sanitize_error_for_client(error: &anyhow::Error) -> String {
    let full_error = format!("{error:#}");
    log::error!("Operation failed: {}", full_error);

    let sanitized = full_error
        .replace("/home/", "<home>/")
        .replace("/root/", "<root>/")
        .replace("/etc/", "<etc>/")
        .replace("/var/", "<var>/")
        .replace("/usr/", "<usr>/")
        .replace("/opt/", "<opt>/")
        .replace("/tmp/", "<tmp>/")
        .replace("/.snapshots/", "<snapshots>/");

    if sanitized.len() > 500 {
        let mut end = 500;
        while !sanitized.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}... (see system logs for details)", &sanitized[..end])
    } else {
        sanitized
    }
}

/// `diff -u` of two paths; missing sides compare as empty
fn unified_diff(pre: &std::path::Path, system: &std::path::Path) -> anyhow::Result<String> {
    let output = Command::new("diff")
        .arg("-u")
        .arg("-N")
        .arg(pre)
        .arg(system)
        .output()
        .context("Failed to run diff")?;

    // 0: identical, 1: differences, 2: trouble
    match output.status.code() {
        Some(0) | Some(1) => Ok(String::from_utf8_lossy(&output.stdout).to_string()),
        _ => {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("diff failed: {}", stderr.trim())
        }
    }
}
