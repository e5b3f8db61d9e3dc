//! Snapshot-vs-live comparison and the undo steps that revert it
//!
//! A [`Comparison`] walks the snapshot tree (the "pre" side) and the live
//! subvolume (the "system" side), records every entry whose status differs,
//! and can derive and apply the steps that bring selected live entries back
//! to their snapshot state.

use crate::xattr::{self, XattrMap};
use anyhow::{Context, Result};
use rayon::prelude::*;
use retrace_common::StatusFlags;
use sha2::{Digest, Sha256};
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::io;
use std::os::unix::fs::{FileTypeExt, MetadataExt, PermissionsExt};
use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;

/// One entry that differs between the snapshot and the live system
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct File {
    /// Path relative to the subvolume, always starting with `/`
    name: String,
    status: StatusFlags,
    undo: bool,
}

impl File {
    pub fn new(name: impl Into<String>, status: StatusFlags) -> Self {
        Self {
            name: name.into(),
            status,
            undo: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn status(&self) -> StatusFlags {
        self.status
    }

    pub fn set_undo(&mut self, undo: bool) {
        self.undo = undo;
    }
}

/// What an undo step does to the live entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UndoAction {
    /// Recreate an entry that only exists in the snapshot
    Create,
    /// Bring content or metadata back to the snapshot state
    Modify,
    /// Remove an entry that did not exist in the snapshot
    Delete,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UndoStep {
    pub name: String,
    pub action: UndoAction,
}

/// Fault raised while applying a single undo step
#[derive(Debug)]
pub struct RestoreStepError {
    pub name: String,
    pub message: String,
}

impl RestoreStepError {
    fn new(name: &str, message: impl fmt::Display) -> Self {
        Self {
            name: name.to_string(),
            message: message.to_string(),
        }
    }
}

impl fmt::Display for RestoreStepError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Failed to restore {}: {}", self.name, self.message)
    }
}

impl std::error::Error for RestoreStepError {}

fn by_components(a: &str, b: &str) -> Ordering {
    Path::new(a).cmp(Path::new(b))
}

/// Changed entries ordered by path components (parents before children)
#[derive(Debug, Clone, Default)]
pub struct Files {
    entries: Vec<File>,
    subvolume: PathBuf,
}

impl Files {
    pub fn new(subvolume: impl Into<PathBuf>, mut entries: Vec<File>) -> Self {
        entries.sort_by(|a, b| by_components(&a.name, &b.name));
        entries.dedup_by(|a, b| a.name == b.name);
        Self {
            entries,
            subvolume: subvolume.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &File> {
        self.entries.iter()
    }

    pub fn get(&self, index: usize) -> Option<&File> {
        self.entries.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut File> {
        self.entries.get_mut(index)
    }

    /// Look up an entry by its subvolume-relative name
    pub fn find(&self, name: &str) -> Option<usize> {
        self.entries
            .binary_search_by(|f| by_components(&f.name, name))
            .ok()
    }

    /// Look up an entry by absolute path on the live system
    ///
    /// The subvolume mount point is stripped before the lookup.
    pub fn find_absolute(&self, path: &str) -> Option<usize> {
        let relative = Path::new(path).strip_prefix(&self.subvolume).ok()?;
        let name = format!("/{}", relative.to_string_lossy());
        self.find(&name)
    }

    /// Drop every undo mark
    pub fn clear_undo(&mut self) {
        for file in &mut self.entries {
            file.undo = false;
        }
    }

    pub fn marked(&self) -> usize {
        self.entries.iter().filter(|f| f.undo).count()
    }

    /// Steps that revert the marked entries
    ///
    /// Created entries are deleted deepest-first, deleted entries are
    /// recreated parents-first, and everything else is modified in place.
    pub fn undo_steps(&self) -> Vec<UndoStep> {
        let mut steps = Vec::new();

        for file in self.entries.iter().rev() {
            if file.undo && file.status.contains(StatusFlags::CREATED) {
                steps.push(UndoStep {
                    name: file.name.clone(),
                    action: UndoAction::Delete,
                });
            }
        }

        for file in &self.entries {
            if file.undo && file.status.contains(StatusFlags::DELETED) {
                steps.push(UndoStep {
                    name: file.name.clone(),
                    action: UndoAction::Create,
                });
            }
        }

        for file in &self.entries {
            let created_or_deleted = file
                .status
                .intersects(StatusFlags::CREATED | StatusFlags::DELETED);
            if file.undo && !created_or_deleted && !file.status.is_empty() {
                steps.push(UndoStep {
                    name: file.name.clone(),
                    action: UndoAction::Modify,
                });
            }
        }

        steps
    }

    /// Render `<status> <name>` lines for GetFileChanges
    pub fn to_change_lines(&self) -> String {
        let mut out = String::new();
        for file in &self.entries {
            out.push_str(&file.status.to_status_string());
            out.push(' ');
            out.push_str(&file.name);
            out.push('\n');
        }
        out
    }
}

/// Where the two sides of a comparison live on disk
#[derive(Debug, Clone)]
pub struct ComparisonRoots {
    /// Root of the snapshot tree
    pub pre: PathBuf,
    /// Root of the live subvolume
    pub system: PathBuf,
    /// Live paths never compared (e.g. the snapshot directory itself)
    pub skip: Vec<PathBuf>,
}

impl ComparisonRoots {
    pub fn pre_path(&self, name: &str) -> PathBuf {
        join_relative(&self.pre, name)
    }

    pub fn system_path(&self, name: &str) -> PathBuf {
        join_relative(&self.system, name)
    }
}

fn join_relative(root: &Path, name: &str) -> PathBuf {
    let relative: PathBuf = Path::new(name)
        .components()
        .filter(|c| matches!(c, Component::Normal(_)))
        .collect();
    root.join(relative)
}

/// A computed comparison between one snapshot and the live system
pub struct Comparison {
    roots: ComparisonRoots,
    files: Files,
}

impl Comparison {
    /// Walk both trees and record every differing entry
    pub fn build(roots: ComparisonRoots, subvolume: &Path) -> Result<Self> {
        let pre_entries = walk(&roots.pre, &[])
            .with_context(|| format!("Failed to read snapshot tree {}", roots.pre.display()))?;
        let system_entries = walk(&roots.system, &roots.skip)
            .with_context(|| format!("Failed to read {}", roots.system.display()))?;

        let names: BTreeSet<&PathBuf> = pre_entries.iter().chain(system_entries.iter()).collect();
        log::debug!(
            "Comparing {} snapshot entries with {} live entries",
            pre_entries.len(),
            system_entries.len()
        );

        let entries: Vec<File> = names
            .into_par_iter()
            .filter_map(|relative| {
                let name = format!("/{}", relative.to_string_lossy());
                let pre = roots.pre.join(relative);
                let system = roots.system.join(relative);
                match entry_status(&pre, &system) {
                    Ok(status) if status.is_empty() => None,
                    Ok(status) => Some(File::new(name, status)),
                    Err(e) => {
                        log::warn!("Skipping {}: {}", name, e);
                        None
                    }
                }
            })
            .collect();

        log::info!("Comparison found {} changed entries", entries.len());

        Ok(Self {
            files: Files::new(subvolume, entries),
            roots,
        })
    }

    pub fn files(&self) -> &Files {
        &self.files
    }

    pub fn roots(&self) -> &ComparisonRoots {
        &self.roots
    }

    /// Entries and the step applier, borrowed separately
    pub fn split_mut(&mut self) -> (&mut Files, &ComparisonRoots) {
        (&mut self.files, &self.roots)
    }
}

/// Relative paths below `root`, staying on one filesystem
fn walk(root: &Path, skip: &[PathBuf]) -> Result<BTreeSet<PathBuf>> {
    fs::symlink_metadata(root).with_context(|| format!("{} does not exist", root.display()))?;

    let mut entries = BTreeSet::new();
    let walker = WalkDir::new(root)
        .min_depth(1)
        .follow_links(false)
        .same_file_system(true)
        .into_iter()
        .filter_entry(|e| !skip.iter().any(|s| e.path() == s));

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                log::warn!("Skipping unreadable entry: {}", e);
                continue;
            }
        };
        if let Ok(relative) = entry.path().strip_prefix(root) {
            entries.insert(relative.to_path_buf());
        }
    }

    Ok(entries)
}

/// Status flags between the snapshot entry `pre` and the live entry `system`
pub fn entry_status(pre: &Path, system: &Path) -> io::Result<StatusFlags> {
    let pre_meta = optional_metadata(pre)?;
    let system_meta = optional_metadata(system)?;

    let (pre_meta, system_meta) = match (pre_meta, system_meta) {
        (None, None) => return Ok(StatusFlags::empty()),
        (None, Some(_)) => return Ok(StatusFlags::CREATED),
        (Some(_), None) => return Ok(StatusFlags::DELETED),
        (Some(a), Some(b)) => (a, b),
    };

    if file_kind(&pre_meta) != file_kind(&system_meta) {
        return Ok(StatusFlags::TYPE);
    }

    let mut status = StatusFlags::empty();

    let file_type = pre_meta.file_type();
    if file_type.is_file() {
        if pre_meta.len() != system_meta.len() || file_digest(pre)? != file_digest(system)? {
            status |= StatusFlags::CONTENT;
        }
    } else if file_type.is_symlink() {
        if fs::read_link(pre)? != fs::read_link(system)? {
            status |= StatusFlags::CONTENT;
        }
    } else if (file_type.is_block_device() || file_type.is_char_device())
        && pre_meta.rdev() != system_meta.rdev()
    {
        status |= StatusFlags::CONTENT;
    }

    if pre_meta.mode() & 0o7777 != system_meta.mode() & 0o7777 && !file_type.is_symlink() {
        status |= StatusFlags::PERMISSIONS;
    }
    if pre_meta.uid() != system_meta.uid() {
        status |= StatusFlags::OWNER;
    }
    if pre_meta.gid() != system_meta.gid() {
        status |= StatusFlags::GROUP;
    }

    let (pre_plain, pre_acl) = xattr::split_acl(xattr::read_all(pre)?);
    let (system_plain, system_acl) = xattr::split_acl(xattr::read_all(system)?);
    if pre_plain != system_plain {
        status |= StatusFlags::XATTRS;
    }
    if pre_acl != system_acl {
        status |= StatusFlags::ACL;
    }

    Ok(status)
}

fn optional_metadata(path: &Path) -> io::Result<Option<fs::Metadata>> {
    match fs::symlink_metadata(path) {
        Ok(meta) => Ok(Some(meta)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

/// File type bits of the mode
fn file_kind(meta: &fs::Metadata) -> u32 {
    meta.mode() & libc::S_IFMT
}

fn file_digest(path: &Path) -> io::Result<[u8; 32]> {
    let mut file = fs::File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(hasher.finalize().into())
}

/// Apply one undo step
///
/// `Ok(false)` means the step was refused (e.g. an unsupported file type);
/// I/O faults are returned as errors.
pub fn do_undo_step(roots: &ComparisonRoots, files: &Files, step: &UndoStep) -> Result<bool, RestoreStepError> {
    let pre = roots.pre_path(&step.name);
    let system = roots.system_path(&step.name);
    let err = |e: io::Error| RestoreStepError::new(&step.name, e);

    match step.action {
        UndoAction::Delete => {
            remove_entry(&system).map_err(err)?;
            Ok(true)
        }
        UndoAction::Create => create_entry(&pre, &system).map_err(err),
        UndoAction::Modify => {
            let status = files
                .find(&step.name)
                .and_then(|i| files.get(i))
                .map(File::status)
                .unwrap_or_default();
            modify_entry(&pre, &system, status).map_err(err)
        }
    }
}

fn remove_entry(path: &Path) -> io::Result<()> {
    let meta = fs::symlink_metadata(path)?;
    if meta.is_dir() {
        fs::remove_dir(path)
    } else {
        fs::remove_file(path)
    }
}

fn create_entry(pre: &Path, system: &Path) -> io::Result<bool> {
    let meta = fs::symlink_metadata(pre)?;
    let file_type = meta.file_type();

    if file_type.is_dir() {
        fs::create_dir(system)?;
    } else if file_type.is_file() {
        fs::copy(pre, system)?;
    } else if file_type.is_symlink() {
        std::os::unix::fs::symlink(fs::read_link(pre)?, system)?;
    } else {
        log::warn!("Cannot recreate special file {}", system.display());
        return Ok(false);
    }

    copy_metadata(pre, system, &meta)?;
    Ok(true)
}

fn modify_entry(pre: &Path, system: &Path, status: StatusFlags) -> io::Result<bool> {
    if status.contains(StatusFlags::TYPE) {
        let meta = fs::symlink_metadata(system)?;
        if meta.is_dir() {
            fs::remove_dir_all(system)?;
        } else {
            fs::remove_file(system)?;
        }
        return create_entry(pre, system);
    }

    let meta = fs::symlink_metadata(pre)?;

    if status.contains(StatusFlags::CONTENT) {
        let file_type = meta.file_type();
        if file_type.is_file() {
            fs::copy(pre, system)?;
        } else if file_type.is_symlink() {
            fs::remove_file(system)?;
            std::os::unix::fs::symlink(fs::read_link(pre)?, system)?;
        } else {
            log::warn!("Cannot restore content of special file {}", system.display());
            return Ok(false);
        }
    }

    copy_metadata(pre, system, &meta)?;
    Ok(true)
}

/// Make ownership, permissions and extended attributes of `target` match `source`
///
/// Ownership goes first: chown clears setuid/setgid bits and
/// `security.capability`, which the later steps put back.
fn copy_metadata(source: &Path, target: &Path, meta: &fs::Metadata) -> io::Result<()> {
    restore_ownership(target, meta.uid(), meta.gid())?;

    if !meta.file_type().is_symlink() {
        fs::set_permissions(target, fs::Permissions::from_mode(meta.mode() & 0o7777))?;
    }

    // Symlink xattrs are not settable for user.* names
    if !meta.file_type().is_symlink() {
        let wanted: XattrMap = xattr::read_all(source)?;
        xattr::sync(target, &wanted, |_| true)?;
    }

    Ok(())
}

/// chown `target` without following symlinks, skipping the call when nothing changes
fn restore_ownership(target: &Path, uid: u32, gid: u32) -> io::Result<()> {
    let current = fs::symlink_metadata(target)?;
    if current.uid() == uid && current.gid() == gid {
        return Ok(());
    }

    std::os::unix::fs::lchown(target, Some(uid), Some(gid)).map_err(|e| {
        io::Error::new(
            e.kind(),
            format!("failed to set ownership to {uid}:{gid}: {e}"),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::symlink;
    use tempfile::TempDir;

    fn setup() -> (TempDir, ComparisonRoots) {
        let dir = tempfile::tempdir().unwrap();
        let pre = dir.path().join("pre");
        let system = dir.path().join("system");
        fs::create_dir_all(&pre).unwrap();
        fs::create_dir_all(&system).unwrap();
        let roots = ComparisonRoots {
            pre,
            system,
            skip: Vec::new(),
        };
        (dir, roots)
    }

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn status_of(comparison: &Comparison, name: &str) -> StatusFlags {
        let files = comparison.files();
        files.get(files.find(name).unwrap()).unwrap().status()
    }

    #[test]
    fn test_build_detects_changes() {
        let (_dir, roots) = setup();
        write(&roots.pre, "etc/same.conf", "a");
        write(&roots.system, "etc/same.conf", "a");
        write(&roots.pre, "etc/changed.conf", "old");
        write(&roots.system, "etc/changed.conf", "new");
        write(&roots.pre, "etc/gone.conf", "x");
        write(&roots.system, "etc/new.conf", "y");
        write(&roots.pre, "etc/mode", "m");
        write(&roots.system, "etc/mode", "m");
        fs::set_permissions(roots.system.join("etc/mode"), fs::Permissions::from_mode(0o600)).unwrap();
        fs::set_permissions(roots.pre.join("etc/mode"), fs::Permissions::from_mode(0o644)).unwrap();
        write(&roots.pre, "link", "");
        fs::create_dir(roots.system.join("link")).unwrap();

        let comparison = Comparison::build(roots, Path::new("/")).unwrap();
        let files = comparison.files();

        assert!(files.find("/etc/same.conf").is_none());
        assert!(files.find("/etc").is_none());
        assert_eq!(status_of(&comparison, "/etc/changed.conf"), StatusFlags::CONTENT);
        assert_eq!(status_of(&comparison, "/etc/gone.conf"), StatusFlags::DELETED);
        assert_eq!(status_of(&comparison, "/etc/new.conf"), StatusFlags::CREATED);
        assert_eq!(status_of(&comparison, "/etc/mode"), StatusFlags::PERMISSIONS);
        assert_eq!(status_of(&comparison, "/link"), StatusFlags::TYPE);

        let lines = files.to_change_lines();
        assert!(lines.contains("c.... /etc/changed.conf\n"));
        assert!(lines.contains("-.... /etc/gone.conf\n"));
        assert!(lines.contains("p.... /etc/mode\n"));
    }

    #[test]
    fn test_skip_excludes_subtree() {
        let (_dir, mut roots) = setup();
        write(&roots.system, ".snapshots/1/info.json", "{}");
        write(&roots.system, "data", "d");
        roots.skip.push(roots.system.join(".snapshots"));

        let comparison = Comparison::build(roots, Path::new("/")).unwrap();
        assert!(comparison.files().find("/.snapshots").is_none());
        assert!(comparison.files().find("/data").is_some());
    }

    #[test]
    fn test_files_sorted_by_components() {
        let files = Files::new(
            "/",
            vec![
                File::new("/a.b", StatusFlags::CREATED),
                File::new("/a/b", StatusFlags::CREATED),
                File::new("/a", StatusFlags::CREATED),
            ],
        );
        let names: Vec<&str> = files.iter().map(File::name).collect();
        assert_eq!(names, vec!["/a", "/a/b", "/a.b"]);
        assert_eq!(files.find("/a/b"), Some(1));
    }

    #[test]
    fn test_find_absolute_strips_subvolume() {
        let files = Files::new("/home", vec![File::new("/user/notes.txt", StatusFlags::CONTENT)]);
        assert_eq!(files.find_absolute("/home/user/notes.txt"), Some(0));
        assert_eq!(files.find_absolute("/user/notes.txt"), None);
        assert_eq!(files.find("/user/notes.txt"), Some(0));
    }

    #[test]
    fn test_undo_step_order() {
        let mut files = Files::new(
            "/",
            vec![
                File::new("/new", StatusFlags::CREATED),
                File::new("/new/inner", StatusFlags::CREATED),
                File::new("/old", StatusFlags::DELETED),
                File::new("/old/inner", StatusFlags::DELETED),
                File::new("/conf", StatusFlags::CONTENT | StatusFlags::OWNER),
                File::new("/untouched", StatusFlags::CONTENT),
            ],
        );
        for name in ["/new", "/new/inner", "/old", "/old/inner", "/conf"] {
            let idx = files.find(name).unwrap();
            files.get_mut(idx).unwrap().set_undo(true);
        }

        let steps: Vec<(String, UndoAction)> = files
            .undo_steps()
            .into_iter()
            .map(|s| (s.name, s.action))
            .collect();
        assert_eq!(
            steps,
            vec![
                ("/new/inner".to_string(), UndoAction::Delete),
                ("/new".to_string(), UndoAction::Delete),
                ("/old".to_string(), UndoAction::Create),
                ("/old/inner".to_string(), UndoAction::Create),
                ("/conf".to_string(), UndoAction::Modify),
            ]
        );

        files.clear_undo();
        assert!(files.undo_steps().is_empty());
    }

    #[test]
    fn test_undo_steps_restore_snapshot_state() {
        let (_dir, roots) = setup();
        write(&roots.pre, "etc/changed.conf", "old");
        write(&roots.system, "etc/changed.conf", "new");
        write(&roots.pre, "etc/gone/file", "x");
        write(&roots.system, "etc/new/file", "y");
        symlink("target-a", roots.pre.join("etc/link")).unwrap();
        symlink("target-b", roots.system.join("etc/link")).unwrap();

        let mut comparison = Comparison::build(roots, Path::new("/")).unwrap();
        let (files, roots) = comparison.split_mut();
        for i in 0..files.len() {
            files.get_mut(i).unwrap().set_undo(true);
        }

        for step in files.undo_steps() {
            assert!(do_undo_step(roots, files, &step).unwrap(), "step {:?}", step);
        }

        assert_eq!(fs::read_to_string(roots.system.join("etc/changed.conf")).unwrap(), "old");
        assert_eq!(fs::read_to_string(roots.system.join("etc/gone/file")).unwrap(), "x");
        assert!(!roots.system.join("etc/new").exists());
        assert_eq!(
            fs::read_link(roots.system.join("etc/link")).unwrap(),
            PathBuf::from("target-a")
        );

        let again = Comparison::build(roots.clone(), Path::new("/")).unwrap();
        assert!(again.files().is_empty(), "{}", again.files().to_change_lines());
    }

    #[test]
    fn test_failed_step_is_an_error() {
        let (_dir, roots) = setup();
        let files = Files::new("/", vec![File::new("/missing", StatusFlags::DELETED)]);
        let step = UndoStep {
            name: "/missing".to_string(),
            action: UndoAction::Create,
        };
        let err = do_undo_step(&roots, &files, &step).unwrap_err();
        assert_eq!(err.name, "/missing");
    }

    #[test]
    fn test_setuid_mode_survives_ownership_restore() {
        let (_dir, roots) = setup();
        write(&roots.pre, "tool", "#!/bin/sh\n");
        write(&roots.system, "tool", "#!/bin/sh\n");
        fs::set_permissions(roots.pre.join("tool"), fs::Permissions::from_mode(0o4755)).unwrap();
        fs::set_permissions(roots.system.join("tool"), fs::Permissions::from_mode(0o755)).unwrap();
        if nix::unistd::geteuid().is_root() {
            std::os::unix::fs::lchown(roots.pre.join("tool"), Some(1000), Some(1000)).unwrap();
        }

        let mut comparison = Comparison::build(roots, Path::new("/")).unwrap();
        let (files, roots) = comparison.split_mut();
        assert!(status_of_files(files, "/tool").contains(StatusFlags::PERMISSIONS));
        let index = files.find("/tool").unwrap();
        files.get_mut(index).unwrap().set_undo(true);

        for step in files.undo_steps() {
            assert!(do_undo_step(roots, files, &step).unwrap());
        }

        let mode = fs::symlink_metadata(roots.system.join("tool")).unwrap().mode() & 0o7777;
        assert_eq!(mode, 0o4755);
        let again = Comparison::build(roots.clone(), Path::new("/")).unwrap();
        assert!(again.files().is_empty(), "{}", again.files().to_change_lines());
    }

    #[test]
    fn test_ownership_failure_is_reported() {
        if nix::unistd::geteuid().is_root() {
            return;
        }
        let (_dir, roots) = setup();
        write(&roots.system, "owned", "x");
        let path = roots.system.join("owned");
        let meta = fs::symlink_metadata(&path).unwrap();

        // Unchanged ownership needs no privileges
        restore_ownership(&path, meta.uid(), meta.gid()).unwrap();

        let err = restore_ownership(&path, 0, 0).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::PermissionDenied);
        assert_eq!(fs::symlink_metadata(&path).unwrap().uid(), meta.uid());
    }

    fn status_of_files(files: &Files, name: &str) -> StatusFlags {
        files.get(files.find(name).unwrap()).unwrap().status()
    }
}
