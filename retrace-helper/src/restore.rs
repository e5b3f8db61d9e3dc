//! Restore of selected paths from a computed comparison

use crate::comparison::{ComparisonRoots, Files, RestoreStepError, UndoStep, do_undo_step};
use retrace_common::RestoreError;

/// Applies undo steps to the live system
pub trait StepApplier {
    /// `Ok(false)` when the step was refused, `Err` on a fault
    fn apply(&self, files: &Files, step: &UndoStep) -> Result<bool, RestoreStepError>;
}

impl StepApplier for ComparisonRoots {
    fn apply(&self, files: &Files, step: &UndoStep) -> Result<bool, RestoreStepError> {
        do_undo_step(self, files, step)
    }
}

/// What one RestoreFiles call did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestoreReport {
    pub total_steps: usize,
    pub failed_steps: usize,
    /// Requested paths that matched a changed entry
    pub marked: usize,
    /// Requested paths without a changed entry
    pub not_found: Vec<String>,
}

impl RestoreReport {
    /// Success only if every step applied
    pub fn into_result(self) -> Result<RestoreReport, RestoreError> {
        if self.failed_steps > 0 {
            Err(RestoreError::PartialRestoreFailure {
                failed: self.failed_steps,
                total: self.total_steps,
            })
        } else {
            Ok(self)
        }
    }
}

/// Mark `paths` in `files`, apply the resulting undo steps, then clear all marks
///
/// A path is looked up by absolute live path first, then by entry name.
/// Unmatched paths are recorded in the report and otherwise ignored; when no
/// step results the call is a successful no-op. A failing step is counted and
/// the remaining steps still run. `on_progress(current, total, name)` is
/// called before each step with a 1-based `current`.
pub fn restore_paths(
    files: &mut Files,
    applier: &impl StepApplier,
    paths: &[String],
    mut on_progress: impl FnMut(usize, usize, &str),
) -> Result<RestoreReport, RestoreError> {
    if paths.is_empty() {
        return Err(RestoreError::InvalidArgument(
            "No files specified for restore".to_string(),
        ));
    }

    let mut report = RestoreReport::default();

    for path in paths {
        let index = files.find_absolute(path).or_else(|| files.find(path));
        match index.and_then(|i| files.get_mut(i)) {
            Some(file) => {
                file.set_undo(true);
                report.marked += 1;
            }
            None => {
                log::debug!("No changed entry for {}", path);
                report.not_found.push(path.clone());
            }
        }
    }

    let steps = files.undo_steps();
    report.total_steps = steps.len();

    if steps.is_empty() {
        log::warn!(
            "No undo steps for {} requested paths ({} marked); nothing to restore",
            paths.len(),
            report.marked
        );
        files.clear_undo();
        return Ok(report);
    }

    let total = steps.len();
    for (i, step) in steps.iter().enumerate() {
        on_progress(i + 1, total, &step.name);

        match applier.apply(files, step) {
            Ok(true) => {}
            Ok(false) => {
                log::warn!("Failed to restore {}", step.name);
                report.failed_steps += 1;
            }
            Err(e) => {
                log::warn!("{}", e);
                report.failed_steps += 1;
            }
        }
    }

    files.clear_undo();

    log::info!(
        "Applied {} undo steps, {} failed",
        report.total_steps,
        report.failed_steps
    );

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comparison::File;
    use retrace_common::StatusFlags;
    use std::cell::RefCell;

    /// Records applied steps; names in `fail` are refused, names in `fault` error out
    #[derive(Default)]
    struct RecordingApplier {
        applied: RefCell<Vec<String>>,
        fail: Vec<&'static str>,
        fault: Vec<&'static str>,
    }

    impl StepApplier for RecordingApplier {
        fn apply(&self, files: &Files, step: &UndoStep) -> Result<bool, RestoreStepError> {
            // Marks must be visible while steps run
            assert!(files.marked() > 0);
            self.applied.borrow_mut().push(step.name.clone());
            if self.fault.contains(&step.name.as_str()) {
                return Err(RestoreStepError {
                    name: step.name.clone(),
                    message: "I/O error".to_string(),
                });
            }
            Ok(!self.fail.contains(&step.name.as_str()))
        }
    }

    fn files() -> Files {
        Files::new(
            "/",
            vec![
                File::new("/etc/a.conf", StatusFlags::CONTENT),
                File::new("/etc/b.conf", StatusFlags::DELETED),
                File::new("/etc/c.conf", StatusFlags::CREATED),
                File::new("/etc/d.conf", StatusFlags::PERMISSIONS),
            ],
        )
    }

    fn paths(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_empty_request_is_invalid() {
        let err = restore_paths(&mut files(), &RecordingApplier::default(), &[], |_, _, _| {})
            .unwrap_err();
        assert!(matches!(err, RestoreError::InvalidArgument(_)));
    }

    #[test]
    fn test_unchanged_paths_are_a_noop() {
        let applier = RecordingApplier::default();
        let mut progress = Vec::new();
        let requested: Vec<String> = (0..10).map(|i| format!("/srv/same{i}")).collect();

        let report = restore_paths(&mut files(), &applier, &requested, |c, t, _| {
            progress.push((c, t))
        })
        .unwrap();

        assert_eq!(report.total_steps, 0);
        assert_eq!(report.not_found.len(), 10);
        assert!(progress.is_empty());
        assert!(applier.applied.borrow().is_empty());
        assert!(report.into_result().is_ok());
    }

    #[test]
    fn test_progress_precedes_each_step_in_order() {
        let applier = RecordingApplier::default();
        let mut files = files();
        let mut progress = Vec::new();

        let report = restore_paths(
            &mut files,
            &applier,
            &paths(&["/etc/a.conf", "/etc/b.conf", "/etc/c.conf"]),
            |c, t, name| progress.push((c, t, name.to_string())),
        )
        .unwrap();

        assert_eq!(
            progress,
            vec![
                (1, 3, "/etc/c.conf".to_string()),
                (2, 3, "/etc/b.conf".to_string()),
                (3, 3, "/etc/a.conf".to_string()),
            ]
        );
        assert_eq!(*applier.applied.borrow(), vec!["/etc/c.conf", "/etc/b.conf", "/etc/a.conf"]);
        assert_eq!(report.marked, 3);
        assert_eq!(files.marked(), 0);
    }

    #[test]
    fn test_failures_do_not_stop_later_steps() {
        let applier = RecordingApplier {
            fail: vec!["/etc/a.conf"],
            fault: vec!["/etc/c.conf"],
            ..Default::default()
        };
        let mut files = files();

        let report = restore_paths(
            &mut files,
            &applier,
            &paths(&["/etc/a.conf", "/etc/b.conf", "/etc/c.conf", "/etc/d.conf", "/nope"]),
            |_, _, _| {},
        )
        .unwrap();

        assert_eq!(applier.applied.borrow().len(), 4);
        assert_eq!(report.failed_steps, 2);
        assert_eq!(report.not_found, vec!["/nope".to_string()]);
        assert_eq!(files.marked(), 0);

        let err = report.into_result().unwrap_err();
        assert_eq!(err.to_string(), "Failed to restore 2 out of 4 files");
    }

    #[test]
    fn test_lookup_falls_back_to_entry_name() {
        let applier = RecordingApplier::default();
        let mut files = Files::new("/home", vec![File::new("/user/x", StatusFlags::CONTENT)]);

        let report = restore_paths(&mut files, &applier, &paths(&["/user/x"]), |_, _, _| {}).unwrap();
        assert_eq!(report.marked, 1);

        let report =
            restore_paths(&mut files, &applier, &paths(&["/home/user/x"]), |_, _, _| {}).unwrap();
        assert_eq!(report.marked, 1);
        assert_eq!(applier.applied.borrow().len(), 2);
    }

    /// Fails ownership changes like an unprivileged chown would
    struct ChownDenied;

    impl StepApplier for ChownDenied {
        fn apply(&self, files: &Files, step: &UndoStep) -> Result<bool, RestoreStepError> {
            let status = files
                .find(&step.name)
                .and_then(|i| files.get(i))
                .map(File::status)
                .unwrap_or_default();
            if status.intersects(StatusFlags::OWNER | StatusFlags::GROUP) {
                return Err(RestoreStepError {
                    name: step.name.clone(),
                    message: "failed to set ownership to 0:0: Operation not permitted".to_string(),
                });
            }
            Ok(true)
        }
    }

    #[test]
    fn test_ownership_failure_counts_as_failed_step() {
        let mut files = Files::new(
            "/",
            vec![
                File::new("/etc/shadow", StatusFlags::OWNER | StatusFlags::GROUP),
                File::new("/etc/motd", StatusFlags::CONTENT),
            ],
        );

        let report = restore_paths(
            &mut files,
            &ChownDenied,
            &paths(&["/etc/shadow", "/etc/motd"]),
            |_, _, _| {},
        )
        .unwrap();

        assert_eq!(report.total_steps, 2);
        assert_eq!(report.failed_steps, 1);
        assert_eq!(
            report.into_result().unwrap_err(),
            RestoreError::PartialRestoreFailure { failed: 1, total: 2 }
        );
    }
}
