//! Snapshot metadata and the CSV wire format of ListSnapshots / CreateSnapshot

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Header row of the snapshot CSV
pub const SNAPSHOT_CSV_HEADER: [&str; 8] = [
    "number",
    "type",
    "pre-number",
    "date",
    "user",
    "cleanup",
    "description",
    "userdata",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotType {
    Single,
    Pre,
    Post,
}

impl SnapshotType {
    pub fn as_str(self) -> &'static str {
        match self {
            SnapshotType::Single => "single",
            SnapshotType::Pre => "pre",
            SnapshotType::Post => "post",
        }
    }
}

impl FromStr for SnapshotType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "single" => Ok(SnapshotType::Single),
            "pre" => Ok(SnapshotType::Pre),
            "post" => Ok(SnapshotType::Post),
            other => Err(format!("Unknown snapshot type '{other}'")),
        }
    }
}

impl fmt::Display for SnapshotType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cleanup algorithm tag stored with a snapshot (applied by external tooling)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CleanupAlgorithm {
    #[default]
    None,
    Number,
    Timeline,
}

impl CleanupAlgorithm {
    pub fn as_str(self) -> &'static str {
        match self {
            CleanupAlgorithm::None => "",
            CleanupAlgorithm::Number => "number",
            CleanupAlgorithm::Timeline => "timeline",
        }
    }
}

impl FromStr for CleanupAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" | "none" => Ok(CleanupAlgorithm::None),
            "number" => Ok(CleanupAlgorithm::Number),
            "timeline" => Ok(CleanupAlgorithm::Timeline),
            other => Err(format!("Unknown cleanup algorithm '{other}'")),
        }
    }
}

/// Information about a snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotInfo {
    pub number: u32,
    pub snapshot_type: SnapshotType,
    /// Number of the matching pre snapshot (post snapshots only, else 0)
    pub pre_number: u32,
    pub date: DateTime<Utc>,
    /// Numeric uid of the creating user
    pub user: u32,
    #[serde(default)]
    pub cleanup: CleanupAlgorithm,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub userdata: BTreeMap<String, String>,
}

impl SnapshotInfo {
    /// Marked important at creation time
    pub fn is_important(&self) -> bool {
        self.userdata.get("important").is_some_and(|v| v == "yes")
    }

    fn to_record(&self) -> [String; 8] {
        let userdata = self
            .userdata
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(",");

        [
            self.number.to_string(),
            self.snapshot_type.to_string(),
            self.pre_number.to_string(),
            self.date.to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
            self.user.to_string(),
            self.cleanup.as_str().to_string(),
            self.description.clone(),
            userdata,
        ]
    }

    fn from_record(record: &csv::StringRecord) -> Result<Self> {
        let field = |idx: usize| record.get(idx).unwrap_or("");

        if record.len() < 7 {
            anyhow::bail!("Expected at least 7 fields, got {}", record.len());
        }

        let number = field(0)
            .parse()
            .with_context(|| format!("Invalid snapshot number '{}'", field(0)))?;
        let snapshot_type = field(1).parse().map_err(anyhow::Error::msg)?;
        let pre_number = field(2).parse().unwrap_or(0);
        let date = DateTime::parse_from_rfc3339(field(3))
            .with_context(|| format!("Invalid snapshot date '{}'", field(3)))?
            .with_timezone(&Utc);
        let user = field(4).parse().unwrap_or(0);
        let cleanup = field(5).parse().unwrap_or_default();

        let userdata = field(7)
            .split(',')
            .filter_map(|pair| pair.split_once('='))
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();

        Ok(SnapshotInfo {
            number,
            snapshot_type,
            pre_number,
            date,
            user,
            cleanup,
            description: field(6).to_string(),
            userdata,
        })
    }
}

/// Render snapshots as CSV with the standard header row
pub fn snapshots_to_csv<'a>(snapshots: impl IntoIterator<Item = &'a SnapshotInfo>) -> Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(SNAPSHOT_CSV_HEADER)?;
    for snapshot in snapshots {
        writer.write_record(snapshot.to_record())?;
    }
    let bytes = writer.into_inner().context("Failed to flush CSV writer")?;
    String::from_utf8(bytes).context("Snapshot CSV is not valid UTF-8")
}

/// Parse the CSV produced by [`snapshots_to_csv`]
///
/// Rows that cannot be parsed are logged and skipped.
pub fn snapshots_from_csv(text: &str) -> Vec<SnapshotInfo> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(text.as_bytes());

    let mut snapshots = Vec::new();
    for (idx, record) in reader.records().enumerate() {
        let parsed = record
            .map_err(anyhow::Error::from)
            .and_then(|r| SnapshotInfo::from_record(&r));
        match parsed {
            Ok(info) => snapshots.push(info),
            Err(e) => log::warn!("Skipping snapshot row {}: {:#}", idx + 1, e),
        }
    }
    snapshots
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample() -> SnapshotInfo {
        let mut userdata = BTreeMap::new();
        userdata.insert("important".to_string(), "yes".to_string());
        userdata.insert("origin".to_string(), "cli".to_string());
        SnapshotInfo {
            number: 12,
            snapshot_type: SnapshotType::Post,
            pre_number: 11,
            date: Utc.with_ymd_and_hms(2025, 3, 1, 8, 30, 0).unwrap(),
            user: 0,
            cleanup: CleanupAlgorithm::Number,
            description: "after upgrade, kernel 6.8".to_string(),
            userdata,
        }
    }

    #[test]
    fn test_csv_has_header_and_row() {
        let csv = snapshots_to_csv([&sample()]).unwrap();
        let mut lines = csv.lines();
        assert_eq!(
            lines.next(),
            Some("number,type,pre-number,date,user,cleanup,description,userdata")
        );
        let row = lines.next().unwrap();
        assert!(row.starts_with("12,post,11,2025-03-01T08:30:00Z,0,number,"));
        assert!(row.contains("\"after upgrade, kernel 6.8\""));
    }

    #[test]
    fn test_csv_parse_back() {
        let csv = snapshots_to_csv([&sample()]).unwrap();
        let parsed = snapshots_from_csv(&csv);
        assert_eq!(parsed, vec![sample()]);
        assert!(parsed[0].is_important());
    }

    #[test]
    fn test_csv_skips_bad_rows() {
        let text = "number,type,pre-number,date,user,cleanup,description,userdata\n\
                    x,single,0,2025-01-01T00:00:00Z,0,,bad,\n\
                    3,single,0,2025-01-01T00:00:00Z,1000,,ok,\n";
        let parsed = snapshots_from_csv(text);
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].number, 3);
        assert_eq!(parsed[0].user, 1000);
        assert!(parsed[0].userdata.is_empty());
    }
}
