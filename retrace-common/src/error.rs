//! Error taxonomy shared by the helper and its clients
//!
//! The helper replies with bus errors named `org.retrace.Error.<Variant>`; the
//! client maps them back with [`RestoreError::from_error_name`].

use crate::DBUS_ERROR_PREFIX;
use std::fmt;

/// Errors surfaced by snapshot comparison and restore operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestoreError {
    /// Caller does not hold the capability for this operation
    AuthorizationDenied(String),
    /// Bus connection or transport failure
    ServiceUnavailable(String),
    SnapshotNotFound(String),
    InvalidArgument(String),
    /// Requested entries matched but none differed; reported as success by the helper
    NoDiff,
    /// `failed` of `total` undo steps could not be applied
    PartialRestoreFailure { failed: usize, total: usize },
    /// Fault inside the comparison engine or the snapshot backend
    UnexpectedException(String),
    Cancelled,
}

impl RestoreError {
    /// Variant name used as the last component of the bus error name
    pub fn variant_name(&self) -> &'static str {
        match self {
            RestoreError::AuthorizationDenied(_) => "AuthorizationDenied",
            RestoreError::ServiceUnavailable(_) => "ServiceUnavailable",
            RestoreError::SnapshotNotFound(_) => "SnapshotNotFound",
            RestoreError::InvalidArgument(_) => "InvalidArgument",
            RestoreError::NoDiff => "NoDiff",
            RestoreError::PartialRestoreFailure { .. } => "PartialRestoreFailure",
            RestoreError::UnexpectedException(_) => "UnexpectedException",
            RestoreError::Cancelled => "Cancelled",
        }
    }

    /// Full bus error name, e.g. `org.retrace.Error.SnapshotNotFound`
    pub fn error_name(&self) -> String {
        format!("{}.{}", DBUS_ERROR_PREFIX, self.variant_name())
    }

    /// Human-readable detail carried in the bus error message
    pub fn detail(&self) -> String {
        match self {
            RestoreError::AuthorizationDenied(msg)
            | RestoreError::ServiceUnavailable(msg)
            | RestoreError::SnapshotNotFound(msg)
            | RestoreError::InvalidArgument(msg)
            | RestoreError::UnexpectedException(msg) => msg.clone(),
            RestoreError::NoDiff => "No differences to restore".to_string(),
            RestoreError::PartialRestoreFailure { failed, total } => {
                format!("Failed to restore {failed} out of {total} files")
            }
            RestoreError::Cancelled => "Operation cancelled".to_string(),
        }
    }

    /// Rebuild an error from a bus error name and message
    ///
    /// Unknown names (including the standard `org.freedesktop.DBus.Error.*`
    /// family) are classified by what they mean for the caller.
    ///
    /// # Examples
    /// ```
    /// use retrace_common::RestoreError;
    /// let err = RestoreError::from_error_name(
    ///     "org.retrace.Error.PartialRestoreFailure",
    ///     "Failed to restore 2 out of 7 files",
    /// );
    /// assert_eq!(err, RestoreError::PartialRestoreFailure { failed: 2, total: 7 });
    /// ```
    pub fn from_error_name(name: &str, message: &str) -> RestoreError {
        let msg = message.to_string();
        let variant = name
            .strip_prefix(DBUS_ERROR_PREFIX)
            .and_then(|rest| rest.strip_prefix('.'));

        match variant {
            Some("AuthorizationDenied") => RestoreError::AuthorizationDenied(msg),
            Some("ServiceUnavailable") => RestoreError::ServiceUnavailable(msg),
            Some("SnapshotNotFound") => RestoreError::SnapshotNotFound(msg),
            Some("InvalidArgument") => RestoreError::InvalidArgument(msg),
            Some("NoDiff") => RestoreError::NoDiff,
            Some("PartialRestoreFailure") => {
                parse_failure_counts(message).map_or(RestoreError::UnexpectedException(msg), |(failed, total)| {
                    RestoreError::PartialRestoreFailure { failed, total }
                })
            }
            Some("Cancelled") => RestoreError::Cancelled,
            Some(_) => RestoreError::UnexpectedException(msg),
            None => match name {
                "org.freedesktop.DBus.Error.AccessDenied" => RestoreError::AuthorizationDenied(msg),
                "org.freedesktop.DBus.Error.InvalidArgs" => RestoreError::InvalidArgument(msg),
                "org.freedesktop.DBus.Error.ServiceUnknown"
                | "org.freedesktop.DBus.Error.NameHasNoOwner"
                | "org.freedesktop.DBus.Error.NoReply"
                | "org.freedesktop.DBus.Error.Disconnected"
                | "org.freedesktop.DBus.Error.Timeout" => RestoreError::ServiceUnavailable(msg),
                _ => RestoreError::UnexpectedException(format!("{name}: {message}")),
            },
        }
    }

    /// Machine-checkable failure count, where the error carries one
    pub fn failure_count(&self) -> Option<(usize, usize)> {
        match self {
            RestoreError::PartialRestoreFailure { failed, total } => Some((*failed, *total)),
            _ => None,
        }
    }
}

/// Extract `(failed, total)` from "Failed to restore N out of M files"
fn parse_failure_counts(message: &str) -> Option<(usize, usize)> {
    let numbers: Vec<usize> = message
        .split_whitespace()
        .filter_map(|word| word.parse().ok())
        .collect();
    match numbers.as_slice() {
        [failed, total, ..] => Some((*failed, *total)),
        _ => None,
    }
}

impl fmt::Display for RestoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RestoreError::AuthorizationDenied(msg) => write!(f, "Authorization denied: {msg}"),
            RestoreError::ServiceUnavailable(msg) => write!(f, "Helper service unavailable: {msg}"),
            RestoreError::SnapshotNotFound(msg) => write!(f, "Snapshot not found: {msg}"),
            RestoreError::InvalidArgument(msg) => write!(f, "Invalid argument: {msg}"),
            RestoreError::UnexpectedException(msg) => write!(f, "Unexpected error: {msg}"),
            other => f.write_str(&other.detail()),
        }
    }
}

impl std::error::Error for RestoreError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_name_uses_prefix() {
        let err = RestoreError::SnapshotNotFound("42".to_string());
        assert_eq!(err.error_name(), "org.retrace.Error.SnapshotNotFound");
    }

    #[test]
    fn test_from_error_name_freedesktop_errors() {
        assert_eq!(
            RestoreError::from_error_name("org.freedesktop.DBus.Error.AccessDenied", "no"),
            RestoreError::AuthorizationDenied("no".to_string())
        );
        assert!(matches!(
            RestoreError::from_error_name("org.freedesktop.DBus.Error.ServiceUnknown", "gone"),
            RestoreError::ServiceUnavailable(_)
        ));
        assert!(matches!(
            RestoreError::from_error_name("com.example.Other", "boom"),
            RestoreError::UnexpectedException(_)
        ));
    }

    #[test]
    fn test_partial_failure_message_carries_counts() {
        let err = RestoreError::PartialRestoreFailure { failed: 3, total: 10 };
        assert_eq!(err.to_string(), "Failed to restore 3 out of 10 files");
        let back = RestoreError::from_error_name(&err.error_name(), &err.detail());
        assert_eq!(back.failure_count(), Some((3, 10)));
    }
}
