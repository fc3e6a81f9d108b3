//! The reconciliation state machine.
//!
//! Tracks which files of the current project exist and whether their content
//! matches the declared hashes, and keeps the debugger running exactly while
//! everything is satisfied. Explicit force commands override the predicate
//! until the next reconciliation.

use std::collections::HashMap;

use crate::debugger::ProcessController;
use crate::protocol::ProjectDescription;

use super::{FileDifferences, FileProbe};

/// Index-aligned hashes of every existing file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WantedVsActual {
    pub files: Vec<String>,
    /// Empty string where no hash could be computed.
    pub actual_hashes: Vec<String>,
    pub wanted_hashes: Vec<String>,
}

impl WantedVsActual {
    /// Files whose actual hash differs from the wanted one.
    pub fn mismatched(&self) -> impl Iterator<Item = &str> {
        self.files
            .iter()
            .zip(self.actual_hashes.iter().zip(&self.wanted_hashes))
            .filter(|(_, (actual, wanted))| actual != wanted)
            .map(|(file, _)| file.as_str())
    }
}

/// Files of the loaded project, partitioned into existing and missing.
#[derive(Debug, Default)]
struct FileTracking {
    existing: Vec<String>,
    missing: Vec<String>,
    actual_hashes: HashMap<String, String>,
}

/// Matches the desired project state against the files on disk and drives
/// the debugger accordingly.
#[derive(Debug)]
pub struct Bootstrapper<P, C> {
    probe: P,
    controller: C,
    project: ProjectDescription,
    files: FileTracking,
    debugger_running: bool,
}

impl<P: FileProbe, C: ProcessController> Bootstrapper<P, C> {
    #[must_use]
    pub fn new(probe: P, controller: C) -> Self {
        Self {
            probe,
            controller,
            project: ProjectDescription::default(),
            files: FileTracking::default(),
            debugger_running: false,
        }
    }

    /// The current project description; empty when nothing is loaded.
    #[must_use]
    pub fn project(&self) -> &ProjectDescription {
        &self.project
    }

    #[must_use]
    pub fn is_project_loaded(&self) -> bool {
        self.project.is_loaded()
    }

    /// Whether the debugger is up, as far as the reconciler knows.
    #[must_use]
    pub fn is_debugger_running(&self) -> bool {
        self.debugger_running
    }

    #[must_use]
    pub fn probe(&self) -> &P {
        &self.probe
    }

    #[must_use]
    pub fn controller(&self) -> &C {
        &self.controller
    }

    pub fn controller_mut(&mut self) -> &mut C {
        &mut self.controller
    }

    /// Replace the project wholesale and reconcile from scratch.
    ///
    /// The debugger is always stopped first, even if the new project is
    /// immediately satisfied.
    pub fn receive(&mut self, description: ProjectDescription) {
        self.stop_debugger();
        self.project = description;
        self.files = FileTracking::default();

        if !self.project.is_loaded() {
            tracing::info!("Project unloaded");
            return;
        }

        for file in self.project.required_files() {
            if self.probe.exists(file) {
                self.files.existing.push(file.to_string());
            } else {
                self.files.missing.push(file.to_string());
            }
        }
        for file in &self.files.existing {
            if let Some(hash) = self.probe.hash(file) {
                self.files.actual_hashes.insert(file.clone(), hash);
            }
        }

        tracing::info!(
            executable = %self.project.executable_name,
            dependencies = self.project.dependencies.len(),
            missing = self.files.missing.len(),
            "Project description received"
        );

        if self.all_files_satisfied() {
            self.start_debugger();
        }
    }

    /// Files believed missing. Not re-checked against the filesystem.
    #[must_use]
    pub fn report_missing(&self) -> &[String] {
        &self.files.missing
    }

    /// Wanted and actual hashes of every existing file.
    #[must_use]
    pub fn report_wanted_vs_actual(&self) -> WantedVsActual {
        let mut report = WantedVsActual::default();
        if !self.is_project_loaded() {
            return report;
        }
        for file in &self.files.existing {
            let Some(wanted) = self.project.wanted_hash(file) else {
                tracing::error!(file = %file, "Tracked file is not part of the project");
                continue;
            };
            report.files.push(file.clone());
            report.wanted_hashes.push(wanted.to_string());
            report
                .actual_hashes
                .push(self.files.actual_hashes.get(file).cloned().unwrap_or_default());
        }
        report
    }

    /// Snapshot of missing files and hashes, for change reporting.
    #[must_use]
    pub fn differences(&self) -> FileDifferences {
        let report = self.report_wanted_vs_actual();
        FileDifferences {
            missing: self.report_missing().to_vec(),
            existing: report.files,
            actual_hashes: report.actual_hashes,
            wanted_hashes: report.wanted_hashes,
        }
    }

    /// Refresh one file, then start or stop the debugger to match.
    pub fn update_file_hash(&mut self, file: &str) {
        self.update_file_hashes(std::iter::once(file));
    }

    /// Refresh a batch of files with a single start/stop decision at the end.
    pub fn update_file_hashes<I, S>(&mut self, files: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        if !self.is_project_loaded() {
            return;
        }
        for file in files {
            self.refresh_file(file.as_ref());
        }
        if self.all_files_satisfied() {
            self.start_debugger();
        } else {
            self.stop_debugger();
        }
    }

    /// Note that a file may have been removed.
    ///
    /// Ignored while the file still exists, so stale notifications are harmless.
    pub fn indicate_removed(&mut self, file: &str) {
        if !self.is_project_loaded() || self.probe.exists(file) {
            return;
        }
        let Some(index) = self.files.existing.iter().position(|f| f == file) else {
            return;
        };

        let file = self.files.existing.remove(index);
        self.files.actual_hashes.remove(&file);
        tracing::info!(file = %file, "Project file removed");
        self.files.missing.push(file);
        self.stop_debugger();
    }

    /// Start the debugger regardless of file state.
    ///
    /// Returns `true` if it was not running and now is.
    pub fn force_start(&mut self) -> bool {
        self.is_project_loaded() && self.start_debugger()
    }

    /// Stop the debugger regardless of file state.
    ///
    /// Returns `true` if it was running and now is not.
    pub fn force_stop(&mut self) -> bool {
        self.is_project_loaded() && self.stop_debugger()
    }

    /// The debugger went away on its own; only the bookkeeping changes.
    pub fn indicate_external_stop(&mut self) {
        if self.debugger_running {
            tracing::info!("Debugger stopped externally");
        }
        self.debugger_running = false;
    }

    /// Re-check every tracked file against the disk.
    ///
    /// Vanished files become missing, present missing files are promoted and
    /// mismatching files are rehashed, followed by a single start/stop
    /// decision. Files that already match are left alone; edits to them
    /// arrive through [`Bootstrapper::update_file_hash`].
    pub fn sweep(&mut self) {
        if !self.is_project_loaded() {
            return;
        }

        let vanished: Vec<String> = self
            .files
            .existing
            .iter()
            .filter(|file| !self.probe.exists(file))
            .cloned()
            .collect();
        for file in &vanished {
            self.indicate_removed(file);
        }

        let mut batch: Vec<String> = self
            .files
            .missing
            .iter()
            .filter(|file| self.probe.exists(file))
            .cloned()
            .collect();
        batch.extend(
            self.report_wanted_vs_actual()
                .mismatched()
                .map(str::to_string),
        );
        self.update_file_hashes(batch);
    }

    fn refresh_file(&mut self, file: &str) {
        if !self.probe.exists(file) {
            return;
        }

        if let Some(index) = self.files.missing.iter().position(|f| f == file) {
            let Some(hash) = self.probe.hash(file) else {
                return;
            };
            let file = self.files.missing.remove(index);
            tracing::info!(file = %file, "Project file appeared");
            self.files.actual_hashes.insert(file.clone(), hash);
            self.files.existing.push(file);
        } else if self.files.existing.iter().any(|f| f == file) {
            if let Some(hash) = self.probe.hash(file) {
                self.files.actual_hashes.insert(file.to_string(), hash);
            }
        }
    }

    fn all_files_satisfied(&self) -> bool {
        if !self.files.missing.is_empty() {
            return false;
        }
        self.files.existing.iter().all(|file| {
            let Some(wanted) = self.project.wanted_hash(file) else {
                tracing::error!(file = %file, "Tracked file is not part of the project");
                return false;
            };
            self.files
                .actual_hashes
                .get(file)
                .is_some_and(|actual| actual == wanted)
        })
    }

    fn start_debugger(&mut self) -> bool {
        if self.debugger_running {
            return false;
        }
        let started = self.controller.start(
            &self.project.executable_name,
            &self.project.launch_arguments,
        );
        self.debugger_running = started;
        started
    }

    fn stop_debugger(&mut self) -> bool {
        if !self.debugger_running {
            return false;
        }
        if self.controller.stop() {
            self.debugger_running = false;
            return true;
        }
        false
    }
}
