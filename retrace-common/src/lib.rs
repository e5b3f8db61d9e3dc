// Shared types and utilities for Retrace

pub mod change;
pub mod config;
pub mod error;
pub mod snapshot;
pub mod status;

pub use change::{ChangeRecord, normalize_path, parse_change_output};
pub use config::{RetraceConfig, SnapperConfig};
pub use error::RestoreError;
pub use snapshot::{CleanupAlgorithm, SnapshotInfo, SnapshotType, snapshots_from_csv, snapshots_to_csv};
pub use status::{ChangeKind, StatusFlags};

/// D-Bus interface constants
pub const DBUS_SERVICE_NAME: &str = "org.retrace.Operations";
pub const DBUS_OBJECT_PATH: &str = "/org/retrace/Operations";
pub const DBUS_INTERFACE_NAME: &str = "org.retrace.Operations";

/// Prefix of every error name the helper replies with
pub const DBUS_ERROR_PREFIX: &str = "org.retrace.Error";

/// Name of the per-step progress signal emitted during RestoreFiles
pub const RESTORE_PROGRESS_SIGNAL: &str = "RestoreProgress";

/// Polkit action IDs
pub const POLKIT_ACTION_LIST: &str = "org.retrace.list-snapshots";
pub const POLKIT_ACTION_CREATE: &str = "org.retrace.create-snapshot";
pub const POLKIT_ACTION_DELETE: &str = "org.retrace.delete-snapshot";
pub const POLKIT_ACTION_ROLLBACK: &str = "org.retrace.rollback-snapshot";

/// Maximum number of paths sent in one RestoreFiles call
pub const RESTORE_BATCH_SIZE: usize = 100;

/// Validate a snapper-style configuration name before it is used as a lookup key
///
/// # Validation Rules
/// - Name must not be empty and must be ≤ 64 characters
/// - Only ASCII letters, digits, `-`, `_` and `.` are allowed
/// - Cannot start with `-` or `.`
///
/// # Examples
/// ```
/// use retrace_common::validate_config_name;
/// assert!(validate_config_name("root").is_ok());
/// assert!(validate_config_name("home_data").is_ok());
/// assert!(validate_config_name("../etc").is_err());
/// assert!(validate_config_name("").is_err());
/// ```
pub fn validate_config_name(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("Configuration name cannot be empty".to_string());
    }

    if name.len() > 64 {
        return Err("Configuration name too long (max 64 characters)".to_string());
    }

    if name.starts_with('-') || name.starts_with('.') {
        return Err("Configuration name cannot start with '-' or '.'".to_string());
    }

    if let Some(bad) = name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
    {
        return Err(format!("Configuration name contains invalid character '{bad}'"));
    }

    Ok(())
}

/// Validate a snapshot number coming from a client
///
/// Snapshot 0 is the live system and can never be a restore source.
pub fn validate_snapshot_number(number: i32) -> Result<u32, String> {
    if number <= 0 {
        return Err(format!("Invalid snapshot number {number}"));
    }
    Ok(number as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_config_name() {
        assert!(validate_config_name("root").is_ok());
        assert!(validate_config_name("var.log-2").is_ok());
        assert!(validate_config_name(".hidden").is_err());
        assert!(validate_config_name("-rf").is_err());
        assert!(validate_config_name("a/b").is_err());
        assert!(validate_config_name(&"x".repeat(65)).is_err());
    }

    #[test]
    fn test_validate_snapshot_number() {
        assert_eq!(validate_snapshot_number(12), Ok(12));
        assert!(validate_snapshot_number(0).is_err());
        assert!(validate_snapshot_number(-3).is_err());
    }
}
