//! Project watcher with notify integration.
//!
//! Watches the parent directory of every file a project requires and reports
//! changes to those files only. Events are queued by notify's own thread and
//! drained by the dispatcher between polls.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, TryRecvError};

use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};

use super::error::WatcherError;
use crate::protocol::ProjectDescription;

/// A change to a required file, named as the project description names it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FileEvent {
    /// The file was deleted or renamed away.
    Removed(String),
    /// The file was created, written or renamed into place.
    Changed(String),
}

impl FileEvent {
    #[must_use]
    pub fn file(&self) -> &str {
        match self {
            Self::Removed(file) | Self::Changed(file) => file,
        }
    }
}

/// Watches the files of the current project.
pub struct ProjectWatcher {
    watcher: RecommendedWatcher,
    events: Receiver<notify::Result<Event>>,
    watched_dirs: HashSet<PathBuf>,
    /// Absolute path to the name used in the project description.
    targets: HashMap<PathBuf, String>,
}

impl std::fmt::Debug for ProjectWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProjectWatcher")
            .field("watched_dirs", &self.watched_dirs)
            .field("targets", &self.targets)
            .finish_non_exhaustive()
    }
}

impl ProjectWatcher {
    /// Create a watcher with nothing to watch yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the platform watcher cannot be created.
    pub fn new() -> Result<Self, WatcherError> {
        let (tx, events) = mpsc::channel();
        let watcher = notify::recommended_watcher(move |result: notify::Result<Event>| {
            let _ = tx.send(result);
        })?;

        Ok(Self {
            watcher,
            events,
            watched_dirs: HashSet::new(),
            targets: HashMap::new(),
        })
    }

    /// Watch the files of `description` instead of the previous project.
    ///
    /// Directories that cannot be watched are logged and skipped; the
    /// periodic sweep still covers their files.
    pub fn retarget(&mut self, description: &ProjectDescription) {
        let mut targets = HashMap::new();
        let mut wanted_dirs = HashSet::new();

        if description.is_loaded() {
            for file in description.required_files() {
                let Ok(absolute) = std::path::absolute(file) else {
                    tracing::warn!(file, "Cannot resolve project file path");
                    continue;
                };
                if let Some(dir) = absolute.parent() {
                    wanted_dirs.insert(dir.to_path_buf());
                }
                targets.insert(absolute, file.to_string());
            }
        }

        let stale: Vec<PathBuf> = self.watched_dirs.difference(&wanted_dirs).cloned().collect();
        for dir in stale {
            if let Err(e) = self.watcher.unwatch(&dir) {
                tracing::debug!(dir = %dir.display(), error = %e, "Unwatch failed");
            }
            self.watched_dirs.remove(&dir);
        }

        for dir in wanted_dirs {
            if self.watched_dirs.contains(&dir) {
                continue;
            }
            match self.watch_dir(&dir) {
                Ok(()) => {
                    self.watched_dirs.insert(dir);
                }
                Err(e) => tracing::warn!(error = %e, "Project directory not watched"),
            }
        }

        self.targets = targets;
        tracing::debug!(
            files = self.targets.len(),
            dirs = self.watched_dirs.len(),
            "Project watcher retargeted"
        );
    }

    fn watch_dir(&mut self, dir: &Path) -> Result<(), WatcherError> {
        self.watcher
            .watch(dir, RecursiveMode::NonRecursive)
            .map_err(|source| WatcherError::Watch {
                path: dir.to_path_buf(),
                source,
            })
    }

    /// Directories currently being watched.
    pub fn watched_dirs(&self) -> impl Iterator<Item = &Path> {
        self.watched_dirs.iter().map(PathBuf::as_path)
    }

    /// Take every pending event that concerns a project file.
    ///
    /// Repeated events for the same file are collapsed, keeping the order of
    /// first occurrence.
    pub fn drain(&mut self) -> Vec<FileEvent> {
        let mut drained = Vec::new();
        let mut seen = HashSet::new();

        loop {
            match self.events.try_recv() {
                Ok(Ok(event)) => {
                    for file_event in self.translate(&event) {
                        if seen.insert(file_event.clone()) {
                            drained.push(file_event);
                        }
                    }
                }
                Ok(Err(e)) => tracing::warn!(error = %e, "File watcher error"),
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => break,
            }
        }

        drained
    }

    fn translate(&self, event: &Event) -> Vec<FileEvent> {
        let Some(removal) = classify(&event.kind, event.paths.len()) else {
            return Vec::new();
        };

        event
            .paths
            .iter()
            .enumerate()
            .filter_map(|(index, path)| {
                let file = self.targets.get(path)?.clone();
                // Both-sided renames list the source first.
                let removed = match removal {
                    Removal::Yes => true,
                    Removal::No => false,
                    Removal::FirstPath => index == 0,
                };
                Some(if removed {
                    FileEvent::Removed(file)
                } else {
                    FileEvent::Changed(file)
                })
            })
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Removal {
    Yes,
    No,
    FirstPath,
}

fn classify(kind: &EventKind, paths: usize) -> Option<Removal> {
    match kind {
        EventKind::Remove(_) | EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
            Some(Removal::Yes)
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) if paths == 2 => {
            Some(Removal::FirstPath)
        }
        EventKind::Modify(ModifyKind::Metadata(_)) | EventKind::Access(_) | EventKind::Other => {
            None
        }
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Any => Some(Removal::No),
    }
}
