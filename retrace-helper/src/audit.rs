//! Structured audit logging for security events

use crate::authority::Caller;
use chrono::Utc;

/// Audit log entry for security-relevant events
#[derive(Debug, serde::Serialize)]
struct AuditEvent {
    timestamp: String,
    user_id: String,
    user_name: Option<String>,
    process_id: u32,
    operation: String,
    resource: String,
    result: String,
    details: Option<String>,
}

impl AuditEvent {
    fn new(caller: &Caller, operation: &str, resource: &str, result: &str) -> Self {
        let user_id = caller.uid_string();
        let user_name = caller.uid.and_then(get_username_from_uid);

        Self {
            timestamp: Utc::now().to_rfc3339(),
            user_id,
            user_name,
            process_id: caller.pid.unwrap_or(0),
            operation: operation.to_string(),
            resource: resource.to_string(),
            result: result.to_string(),
            details: None,
        }
    }

    fn with_details(mut self, details: String) -> Self {
        self.details = Some(details);
        self
    }

    /// One JSON object per line under the `audit` target
    fn log(&self) {
        if let Ok(json) = serde_json::to_string(self) {
            log::info!(target: "audit", "{json}");
        } else {
            log::info!(
                target: "audit",
                "user={} pid={} operation={} resource={} result={}",
                self.user_id,
                self.process_id,
                self.operation,
                self.resource,
                self.result
            );
        }
    }
}

/// Best effort
fn get_username_from_uid(uid: u32) -> Option<String> {
    use std::process::Command;

    let output = Command::new("id")
        .arg("-un")
        .arg(uid.to_string())
        .output()
        .ok()?;

    if output.status.success() {
        String::from_utf8(output.stdout)
            .ok()
            .map(|s| s.trim().to_string())
    } else {
        None
    }
}

fn log_outcome(caller: &Caller, operation: &str, resource: &str, error: Option<&str>) {
    let result = if error.is_none() { "success" } else { "failure" };
    let mut event = AuditEvent::new(caller, operation, resource, result);

    if let Some(err) = error {
        event = event.with_details(format!("error: {err}"));
    }

    event.log();
}

pub fn log_snapshot_create(caller: &Caller, resource: &str, error: Option<&str>) {
    log_outcome(caller, "create_snapshot", resource, error);
}

pub fn log_snapshot_delete(caller: &Caller, resource: &str, error: Option<&str>) {
    log_outcome(caller, "delete_snapshot", resource, error);
}

pub fn log_snapshot_rollback(caller: &Caller, resource: &str, error: Option<&str>) {
    log_outcome(caller, "rollback_snapshot", resource, error);
}

/// Log a RestoreFiles call with its step counts
pub fn log_restore(
    caller: &Caller,
    resource: &str,
    requested: usize,
    failed: usize,
    total: usize,
    error: Option<&str>,
) {
    let result = if error.is_none() { "success" } else { "failure" };
    let mut details = format!("paths={requested} steps={total} failed={failed}");
    if let Some(err) = error {
        details.push_str(&format!(" error: {err}"));
    }

    AuditEvent::new(caller, "restore_files", resource, result)
        .with_details(details)
        .log();
}

pub fn log_auth_failure(caller: &Caller, operation: &str, reason: &str) {
    AuditEvent::new(caller, operation, "authorization", "denied")
        .with_details(format!("reason: {reason}"))
        .log();
}
