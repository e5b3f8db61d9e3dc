// Snapshot lifecycle on btrfs with a snapper-style directory layout
//
//   <snapshot_dir>/<number>/snapshot    read-only subvolume
//   <snapshot_dir>/<number>/info.json   SnapshotInfo metadata

use anyhow::{Context, Result, bail};
use chrono::Utc;
use retrace_common::{CleanupAlgorithm, RestoreError, SnapperConfig, SnapshotInfo, SnapshotType};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::process::Command;

const INFO_FILE: &str = "info.json";

/// Parameters of CreateSnapshot
#[derive(Debug, Clone)]
pub struct CreateRequest {
    pub snapshot_type: SnapshotType,
    pub description: String,
    pub pre_number: u32,
    pub cleanup: CleanupAlgorithm,
    pub important: bool,
    /// uid of the requesting user
    pub user: u32,
}

/// Snapshot storage used by the helper
///
/// Errors carrying a [`RestoreError`] (e.g. `SnapshotNotFound`) keep their
/// meaning across the bus; anything else is reported as unexpected.
pub trait SnapshotBackend: Send + Sync {
    fn list(&self, config: &SnapperConfig) -> Result<Vec<SnapshotInfo>>;
    fn create(&self, config: &SnapperConfig, request: &CreateRequest) -> Result<SnapshotInfo>;
    fn delete(&self, config: &SnapperConfig, number: u32) -> Result<()>;
    fn rollback(&self, config: &SnapperConfig, number: u32) -> Result<()>;

    fn exists(&self, config: &SnapperConfig, number: u32) -> bool {
        config.snapshot_root(number).exists()
    }
}

/// Snapshot kinds refused by the `DISABLE_SNAPSHOTS` variable
///
/// The value is a comma list of `all`, `single` and `around` (pre/post);
/// case, `-`, `_` and `.` are ignored.
pub fn creation_allowed(snapshot_type: SnapshotType, disable: Option<&str>) -> bool {
    let Some(value) = disable else {
        return true;
    };

    let normalized: String = value
        .to_lowercase()
        .chars()
        .filter(|c| !matches!(c, '-' | '_' | '.'))
        .collect();
    let disabled: Vec<&str> = normalized.split(',').filter(|s| !s.trim().is_empty()).map(str::trim).collect();

    if disabled.contains(&"all") {
        return false;
    }

    let kind = match snapshot_type {
        SnapshotType::Single => "single",
        SnapshotType::Pre | SnapshotType::Post => "around",
    };
    !disabled.contains(&kind)
}

#[derive(Debug, Default)]
pub struct BtrfsSnapshots;

impl BtrfsSnapshots {
    pub fn new() -> Self {
        Self
    }
}

fn not_found(number: u32) -> anyhow::Error {
    anyhow::Error::new(RestoreError::SnapshotNotFound(format!("Snapshot {number} not found")))
}

fn read_info(base: &Path) -> Result<SnapshotInfo> {
    let path = base.join(INFO_FILE);
    let content = fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

fn write_info(base: &Path, info: &SnapshotInfo) -> Result<()> {
    let path = base.join(INFO_FILE);
    let content = serde_json::to_string_pretty(info).context("Failed to serialize snapshot info")?;
    fs::write(&path, content).with_context(|| format!("Failed to write {}", path.display()))
}

/// All snapshots with readable metadata, ordered by number
pub fn scan_snapshot_dir(dir: &Path) -> Result<Vec<SnapshotInfo>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut snapshots = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("Failed to read {}", dir.display()))? {
        let entry = entry.context("Failed to read directory entry")?;
        let Some(number) = entry.file_name().to_str().and_then(|n| n.parse::<u32>().ok()) else {
            continue;
        };

        match read_info(&entry.path()) {
            Ok(info) if info.number == number => snapshots.push(info),
            Ok(info) => log::warn!(
                "Snapshot directory {} holds metadata for {}, skipping",
                number,
                info.number
            ),
            Err(e) => log::warn!("Skipping snapshot {}: {:#}", number, e),
        }
    }

    snapshots.sort_by_key(|s| s.number);
    Ok(snapshots)
}

fn run_btrfs(args: &[&std::ffi::OsStr]) -> Result<String> {
    let output = Command::new("btrfs")
        .args(args)
        .output()
        .context("Failed to execute btrfs")?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!("btrfs {} failed: {}", args.first().map(|a| a.to_string_lossy()).unwrap_or_default(), stderr.trim());
    }

    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

/// Parse "Subvolume ID:" from `btrfs subvolume show`
fn parse_subvolume_id(show_output: &str) -> Option<u64> {
    show_output.lines().find_map(|line| {
        line.trim()
            .strip_prefix("Subvolume ID:")
            .and_then(|rest| rest.trim().parse().ok())
    })
}

impl SnapshotBackend for BtrfsSnapshots {
    fn list(&self, config: &SnapperConfig) -> Result<Vec<SnapshotInfo>> {
        scan_snapshot_dir(&config.snapshot_dir)
    }

    fn create(&self, config: &SnapperConfig, request: &CreateRequest) -> Result<SnapshotInfo> {
        let disable = std::env::var("DISABLE_SNAPSHOTS").ok();
        if !creation_allowed(request.snapshot_type, disable.as_deref()) {
            return Err(anyhow::Error::new(RestoreError::InvalidArgument(format!(
                "Creation of {} snapshots is disabled",
                request.snapshot_type
            ))));
        }

        if request.snapshot_type == SnapshotType::Post
            && (request.pre_number == 0 || !self.exists(config, request.pre_number))
        {
            return Err(not_found(request.pre_number).context("Pre snapshot required for post snapshot"));
        }

        fs::create_dir_all(&config.snapshot_dir).context("Failed to create snapshot directory")?;

        let number = scan_snapshot_dir(&config.snapshot_dir)?
            .last()
            .map_or(1, |s| s.number + 1);
        let base = config.snapshot_base(number);
        fs::create_dir(&base)
            .with_context(|| format!("Failed to create {}", base.display()))?;

        let target = config.snapshot_root(number);
        log::info!(
            "Creating snapshot: {} -> {}",
            config.subvolume.display(),
            target.display()
        );

        if let Err(e) = run_btrfs(&[
            "subvolume".as_ref(),
            "snapshot".as_ref(),
            "-r".as_ref(),
            config.subvolume.as_os_str(),
            target.as_os_str(),
        ]) {
            let _ = fs::remove_dir_all(&base);
            return Err(e.context(format!("Failed to snapshot {}", config.subvolume.display())));
        }

        let mut userdata = BTreeMap::new();
        if request.important {
            userdata.insert("important".to_string(), "yes".to_string());
        }

        let info = SnapshotInfo {
            number,
            snapshot_type: request.snapshot_type,
            pre_number: if request.snapshot_type == SnapshotType::Post {
                request.pre_number
            } else {
                0
            },
            date: Utc::now(),
            user: request.user,
            cleanup: request.cleanup,
            description: request.description.clone(),
            userdata,
        };
        write_info(&base, &info)?;

        Ok(info)
    }

    fn delete(&self, config: &SnapperConfig, number: u32) -> Result<()> {
        let base = config.snapshot_base(number);
        if !base.exists() {
            return Err(not_found(number));
        }

        let root = config.snapshot_root(number);
        if root.exists() {
            run_btrfs(&["subvolume".as_ref(), "delete".as_ref(), root.as_os_str()])?;
        }

        fs::remove_dir_all(&base).with_context(|| format!("Failed to remove {}", base.display()))?;
        log::info!("Deleted snapshot {}", number);
        Ok(())
    }

    fn rollback(&self, config: &SnapperConfig, number: u32) -> Result<()> {
        let root = config.snapshot_root(number);
        if !root.exists() {
            return Err(not_found(number));
        }

        let show = run_btrfs(&["subvolume".as_ref(), "show".as_ref(), root.as_os_str()])?;
        let id = parse_subvolume_id(&show).context("Could not parse subvolume ID from output")?;

        run_btrfs(&[
            "subvolume".as_ref(),
            "set-default".as_ref(),
            id.to_string().as_ref(),
            config.subvolume.as_os_str(),
        ])?;

        log::info!("Snapshot {} (subvolume {}) set as default", number, id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_creation_allowed() {
        assert!(creation_allowed(SnapshotType::Single, None));
        assert!(!creation_allowed(SnapshotType::Single, Some("ALL")));
        assert!(!creation_allowed(SnapshotType::Pre, Some("single,around")));
        assert!(creation_allowed(SnapshotType::Single, Some("around")));
        assert!(!creation_allowed(SnapshotType::Post, Some("a-r_o.und")));
        assert!(creation_allowed(SnapshotType::Post, Some(",,")));
    }

    #[test]
    fn test_parse_subvolume_id() {
        let output = "@/.snapshots/3/snapshot\n\tName: \t\t\tsnapshot\n\tSubvolume ID: \t\t271\n\tGeneration: \t\t1234\n";
        assert_eq!(parse_subvolume_id(output), Some(271));
        assert_eq!(parse_subvolume_id("nothing"), None);
    }

    #[test]
    fn test_scan_reads_metadata_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let config = SnapperConfig {
            subvolume: PathBuf::from("/"),
            snapshot_dir: dir.path().to_path_buf(),
        };

        for number in [3u32, 1] {
            let base = config.snapshot_base(number);
            fs::create_dir_all(config.snapshot_root(number)).unwrap();
            let info = SnapshotInfo {
                number,
                snapshot_type: SnapshotType::Single,
                pre_number: 0,
                date: Utc::now(),
                user: 0,
                cleanup: CleanupAlgorithm::Number,
                description: format!("snapshot {number}"),
                userdata: BTreeMap::new(),
            };
            write_info(&base, &info).unwrap();
        }
        fs::create_dir_all(dir.path().join("7")).unwrap();
        fs::create_dir_all(dir.path().join("not-a-number")).unwrap();

        let snapshots = BtrfsSnapshots::new().list(&config).unwrap();
        assert_eq!(snapshots.iter().map(|s| s.number).collect::<Vec<_>>(), vec![1, 3]);
        assert!(BtrfsSnapshots::new().exists(&config, 3));
        assert!(!BtrfsSnapshots::new().exists(&config, 7));
    }

    #[test]
    fn test_delete_missing_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let config = SnapperConfig {
            subvolume: PathBuf::from("/"),
            snapshot_dir: dir.path().to_path_buf(),
        };
        let err = BtrfsSnapshots::new().delete(&config, 9).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<RestoreError>(),
            Some(RestoreError::SnapshotNotFound(_))
        ));
    }
}
