//! Caller identity and polkit authorization

use anyhow::{Context, Result};
use retrace_common::{
    POLKIT_ACTION_CREATE, POLKIT_ACTION_DELETE, POLKIT_ACTION_LIST, POLKIT_ACTION_ROLLBACK,
    RestoreError,
};
use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;
use zbus::Connection;
use zbus::zvariant::{ObjectPath, Value};

/// Capability families guarding the bus methods
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    /// ListSnapshots, GetFileChanges, GetFileDiff
    List,
    Create,
    Delete,
    /// RollbackSnapshot, RestoreFiles
    Rollback,
}

impl Capability {
    pub fn action_id(self) -> &'static str {
        match self {
            Capability::List => POLKIT_ACTION_LIST,
            Capability::Create => POLKIT_ACTION_CREATE,
            Capability::Delete => POLKIT_ACTION_DELETE,
            Capability::Rollback => POLKIT_ACTION_ROLLBACK,
        }
    }
}

/// The process behind one incoming call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    /// Unique bus name of the sender
    pub sender: String,
    pub uid: Option<u32>,
    pub pid: Option<u32>,
}

impl Caller {
    /// Resolve uid and pid of the message sender through the bus daemon
    pub async fn from_header(hdr: &zbus::message::Header<'_>, connection: &Connection) -> Result<Self> {
        let sender = hdr
            .sender()
            .context("No sender in message header")?
            .to_string();

        let uid = bus_credential(connection, "GetConnectionUnixUser", &sender).await;
        let pid = bus_credential(connection, "GetConnectionUnixProcessID", &sender).await;

        Ok(Self {
            sender,
            uid: uid.map_err(|e| log::warn!("Failed to get caller UID: {:#}", e)).ok(),
            pid: pid.map_err(|e| log::warn!("Failed to get caller PID: {:#}", e)).ok(),
        })
    }

    /// uid for audit records, "unknown" if the bus did not tell us
    pub fn uid_string(&self) -> String {
        self.uid.map_or_else(|| "unknown".to_string(), |uid| uid.to_string())
    }
}

async fn bus_credential(connection: &Connection, method: &str, sender: &str) -> Result<u32> {
    let response = connection
        .call_method(
            Some("org.freedesktop.DBus"),
            "/org/freedesktop/DBus",
            Some("org.freedesktop.DBus"),
            method,
            &sender,
        )
        .await
        .with_context(|| format!("{method} failed"))?;

    response
        .body()
        .deserialize()
        .with_context(|| format!("Failed to deserialize {method} reply"))
}

/// Yes/no authorization for one caller and capability
///
/// Implementations must not cache grants between calls.
pub trait AuthorizationGate: Send + Sync {
    fn check(
        &self,
        caller: &Caller,
        capability: Capability,
    ) -> impl Future<Output = Result<(), RestoreError>> + Send;
}

/// Asks org.freedesktop.PolicyKit1 about the calling process
pub struct PolkitGate {
    connection: Connection,
    timeout: Duration,
}

impl PolkitGate {
    pub fn new(connection: Connection, timeout: Duration) -> Self {
        Self { connection, timeout }
    }

    async fn check_authorization(&self, caller: &Caller, action_id: &str) -> Result<bool> {
        log::debug!("Authorization requested for action: {}", action_id);

        let pid = caller.pid.context("Caller PID unknown")?;
        let start_time = get_process_start_time(pid)?;

        let mut subject_details: HashMap<String, Value> = HashMap::new();
        subject_details.insert("pid".to_string(), Value::U32(pid));
        subject_details.insert("start-time".to_string(), Value::U64(start_time));
        let subject = ("unix-process", subject_details);

        let details: HashMap<String, String> = HashMap::new();
        // AllowUserInteraction
        let flags: u32 = 1;
        let cancellation_id = "";

        let polkit_path = ObjectPath::try_from("/org/freedesktop/PolicyKit1/Authority")
            .context("Invalid Polkit object path")?;

        let reply = tokio::time::timeout(
            self.timeout,
            self.connection.call_method(
                Some("org.freedesktop.PolicyKit1"),
                polkit_path,
                Some("org.freedesktop.PolicyKit1.Authority"),
                "CheckAuthorization",
                &(subject, action_id, details, flags, cancellation_id),
            ),
        )
        .await
        .with_context(|| {
            format!(
                "Polkit authorization timed out after {} seconds",
                self.timeout.as_secs()
            )
        })?
        .context("Failed to call Polkit CheckAuthorization")?;

        let (is_authorized, is_challenge, auth_details): (bool, bool, HashMap<String, String>) = reply
            .body()
            .deserialize()
            .context("Failed to deserialize Polkit response")?;

        log::debug!(
            "Authorization result: authorized={}, challenge={}, details={:?}",
            is_authorized,
            is_challenge,
            auth_details
        );

        Ok(is_authorized)
    }
}

impl AuthorizationGate for PolkitGate {
    async fn check(&self, caller: &Caller, capability: Capability) -> Result<(), RestoreError> {
        let action_id = capability.action_id();
        match self.check_authorization(caller, action_id).await {
            Ok(true) => Ok(()),
            Ok(false) => Err(RestoreError::AuthorizationDenied(format!(
                "Action '{action_id}' not authorized"
            ))),
            Err(e) => {
                log::warn!("Authorization check for {} failed: {:#}", action_id, e);
                Err(RestoreError::AuthorizationDenied(format!(
                    "Authorization check for '{action_id}' failed"
                )))
            }
        }
    }
}

/// Start time of `pid` in clock ticks, field 22 of `/proc/<pid>/stat`
fn get_process_start_time(pid: u32) -> Result<u64> {
    let stat_path = format!("/proc/{pid}/stat");
    let stat_content = std::fs::read_to_string(&stat_path)
        .with_context(|| format!("Failed to read {stat_path}"))?;
    parse_start_time(&stat_content).with_context(|| format!("Invalid {stat_path}"))
}

fn parse_start_time(stat_content: &str) -> Result<u64> {
    // comm may contain spaces and parentheses
    let start_pos = stat_content
        .rfind(')')
        .context("missing closing parenthesis")?;

    let fields: Vec<&str> = stat_content[start_pos + 1..].split_whitespace().collect();
    let start_time = fields
        .get(19)
        .with_context(|| format!("expected at least 20 fields after comm, got {}", fields.len()))?;

    start_time
        .parse()
        .with_context(|| format!("bad start time '{start_time}'"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_start_time_with_odd_comm() {
        let mut stat = String::from("4242 (evil) name) S");
        for i in 1..=18 {
            stat.push_str(&format!(" {i}"));
        }
        stat.push_str(" 987654 0 0\n");
        assert_eq!(parse_start_time(&stat).unwrap(), 987654);
    }

    #[test]
    fn test_parse_start_time_rejects_short_stat() {
        assert!(parse_start_time("1 (init) S 0 1").is_err());
        assert!(parse_start_time("no parens here").is_err());
    }

    #[test]
    fn test_own_process_start_time() {
        assert!(get_process_start_time(std::process::id()).is_ok());
    }

    #[test]
    fn test_capability_actions_are_distinct() {
        let ids = [
            Capability::List.action_id(),
            Capability::Create.action_id(),
            Capability::Delete.action_id(),
            Capability::Rollback.action_id(),
        ];
        let unique: std::collections::HashSet<_> = ids.iter().collect();
        assert_eq!(unique.len(), 4);
    }
}
