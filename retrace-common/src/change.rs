//! Parsing of `<status> <path>` change lines as produced by GetFileChanges

use crate::status::{ChangeKind, StatusFlags};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// One reported difference for a single path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeRecord {
    /// Path as reported, possibly with a trailing `/` marking a directory
    pub path: String,
    pub status: StatusFlags,
    /// Kind derived from the first status character
    pub kind: ChangeKind,
    pub is_directory_hint: bool,
}

impl ChangeRecord {
    /// Parse one change line
    ///
    /// The line is split at the first run of whitespace; everything after it
    /// is the path. Returns `None` for lines with fewer than two fields.
    ///
    /// # Examples
    /// ```
    /// use retrace_common::{ChangeKind, ChangeRecord};
    /// let record = ChangeRecord::parse_line("+.... /etc/foo/").unwrap();
    /// assert_eq!(record.kind, ChangeKind::Created);
    /// assert!(record.is_directory_hint);
    /// assert_eq!(record.normalized_path(), "/etc/foo");
    /// assert!(ChangeRecord::parse_line("c....").is_none());
    /// ```
    pub fn parse_line(line: &str) -> Option<ChangeRecord> {
        let line = line.trim_end_matches(['\r', '\n']).trim_start();
        let (status, rest) = line.split_once(char::is_whitespace)?;
        let path = rest.trim_start();
        if status.is_empty() || path.is_empty() {
            return None;
        }

        let first = status.chars().next()?;
        Some(ChangeRecord {
            path: path.to_string(),
            status: StatusFlags::from_status_str(status),
            kind: ChangeKind::from_status_char(first),
            is_directory_hint: path.len() > 1 && path.ends_with('/'),
        })
    }

    /// Path with exactly one trailing separator stripped
    pub fn normalized_path(&self) -> &str {
        normalize_path(&self.path)
    }

    /// Render the record back into the wire format
    pub fn to_line(&self) -> String {
        format!("{} {}", self.status.to_status_string(), self.path)
    }
}

/// Strip exactly one trailing `/`, keeping the root as `/`
///
/// # Examples
/// ```
/// use retrace_common::normalize_path;
/// assert_eq!(normalize_path("/etc/"), "/etc");
/// assert_eq!(normalize_path("/etc//"), "/etc/");
/// assert_eq!(normalize_path("/"), "/");
/// ```
pub fn normalize_path(path: &str) -> &str {
    if path.len() > 1 {
        path.strip_suffix('/').unwrap_or(path)
    } else {
        path
    }
}

/// Parse the full output of GetFileChanges
///
/// Unparsable lines are dropped. Records are deduplicated by normalized path;
/// the first occurrence wins and later ones are discarded entirely.
pub fn parse_change_output(output: &str) -> Vec<ChangeRecord> {
    let mut seen = HashSet::new();
    let mut records = Vec::new();

    for line in output.lines() {
        if line.trim().is_empty() {
            continue;
        }

        let Some(record) = ChangeRecord::parse_line(line) else {
            log::debug!("Skipping malformed change line: {line:?}");
            continue;
        };

        if seen.insert(record.normalized_path().to_string()) {
            records.push(record);
        }
    }

    records
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_line_keeps_spaces_in_path() {
        let record = ChangeRecord::parse_line("c....  /home/user/My Documents/a b.txt").unwrap();
        assert_eq!(record.path, "/home/user/My Documents/a b.txt");
        assert_eq!(record.status, StatusFlags::CONTENT);
        assert!(!record.is_directory_hint);
    }

    #[test]
    fn test_parse_line_status_flags() {
        let record = ChangeRecord::parse_line("tcp.. /usr/bin/tool\r").unwrap();
        assert_eq!(record.kind, ChangeKind::TypeChanged);
        assert!(record.status.contains(StatusFlags::TYPE | StatusFlags::CONTENT));
        assert_eq!(record.path, "/usr/bin/tool");
    }

    #[test]
    fn test_parse_output_dedups_first_wins() {
        let output = "+.... /etc/foo/\n\nc.... /etc/foo\n-.... /etc/bar\nbogus\n";
        let records = parse_change_output(output);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].kind, ChangeKind::Created);
        assert!(records[0].is_directory_hint);
        assert_eq!(records[1].normalized_path(), "/etc/bar");
    }

    #[test]
    fn test_to_line() {
        let record = ChangeRecord::parse_line("+ /srv/new").unwrap();
        assert_eq!(record.to_line(), "+.... /srv/new");
    }
}
