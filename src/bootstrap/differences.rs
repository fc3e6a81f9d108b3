//! Snapshots of the reconciler's file state, used to report what changed.

use crate::protocol::{tag, SubscriberUpdate};

/// Missing files plus wanted/actual hashes of existing files, at one moment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileDifferences {
    pub missing: Vec<String>,
    pub existing: Vec<String>,
    /// Empty string where no hash could be computed.
    pub actual_hashes: Vec<String>,
    pub wanted_hashes: Vec<String>,
}

/// A single observable change between two snapshots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileChange {
    /// A file went missing, or was missing from the start.
    Missing(String),
    /// A previously missing file appeared.
    Found(String),
    /// An existing file's hash does not match.
    Mismatch {
        file: String,
        wanted: String,
        actual: String,
    },
    /// A mismatching file now matches.
    Match(String),
}

impl FileChange {
    /// Broadcast tag for this change.
    #[must_use]
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Missing(_) => tag::FILE_MISSING,
            Self::Found(_) => tag::FILE_FOUND,
            Self::Mismatch { .. } => tag::FILE_MISMATCH,
            Self::Match(_) => tag::FILE_MATCH,
        }
    }

    /// Human readable message for this change.
    #[must_use]
    pub fn message(&self) -> String {
        match self {
            Self::Missing(file) | Self::Found(file) | Self::Match(file) => {
                format!("file: \"{file}\"")
            }
            Self::Mismatch {
                file,
                wanted,
                actual,
            } => format!("file: \"{file}\" wanted hash: \"{wanted}\" actual hash: \"{actual}\""),
        }
    }

    #[must_use]
    pub fn to_update(&self) -> SubscriberUpdate {
        SubscriberUpdate::new(self.tag(), self.message())
    }
}

impl FileDifferences {
    /// Existing files whose actual hash differs from the wanted one.
    pub fn mismatched(&self) -> impl Iterator<Item = (&str, &str, &str)> {
        self.existing
            .iter()
            .zip(&self.actual_hashes)
            .zip(&self.wanted_hashes)
            .filter(|((_, actual), wanted)| actual != wanted)
            .map(|((file, actual), wanted)| (file.as_str(), wanted.as_str(), actual.as_str()))
    }

    fn existing_hashes(&self, file: &str) -> Option<(&str, &str)> {
        let index = self.existing.iter().position(|f| f == file)?;
        Some((&self.actual_hashes[index], &self.wanted_hashes[index]))
    }

    /// What changed going from `earlier` to `self`.
    ///
    /// Comparing against [`FileDifferences::default`] reports every missing
    /// and mismatching file.
    #[must_use]
    pub fn changes_since(&self, earlier: &Self) -> Vec<FileChange> {
        let mut changes = Vec::new();

        for file in &self.missing {
            if !earlier.missing.contains(file) {
                changes.push(FileChange::Missing(file.clone()));
            }
        }

        for ((file, actual), wanted) in self
            .existing
            .iter()
            .zip(&self.actual_hashes)
            .zip(&self.wanted_hashes)
        {
            if earlier.missing.contains(file) {
                changes.push(FileChange::Found(file.clone()));
            }

            let mismatching = actual != wanted;
            match earlier.existing_hashes(file) {
                Some((earlier_actual, earlier_wanted)) => {
                    let was_mismatching = earlier_actual != earlier_wanted;
                    if mismatching && (!was_mismatching || earlier_actual != actual) {
                        changes.push(Self::mismatch(file, wanted, actual));
                    } else if !mismatching && was_mismatching {
                        changes.push(FileChange::Match(file.clone()));
                    }
                }
                None if mismatching => changes.push(Self::mismatch(file, wanted, actual)),
                None => {}
            }
        }

        changes
    }

    fn mismatch(file: &str, wanted: &str, actual: &str) -> FileChange {
        FileChange::Mismatch {
            file: file.to_string(),
            wanted: wanted.to_string(),
            actual: actual.to_string(),
        }
    }
}
