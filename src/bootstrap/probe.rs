//! File existence and content hashing.

use std::fs::File;
use std::io;
use std::path::Path;

use sha2::{Digest, Sha256};

/// What the reconciler needs to know about files on disk.
pub trait FileProbe {
    fn exists(&self, path: &str) -> bool;

    /// Hex digest of the file's content, or `None` if it could not be read.
    fn hash(&self, path: &str) -> Option<String>;
}

/// [`FileProbe`] backed by the local filesystem and SHA-256.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsProbe;

impl FsProbe {
    /// Hash a file the same way the server does.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or read.
    pub fn hash_file(path: impl AsRef<Path>) -> io::Result<String> {
        let mut file = File::open(path)?;
        let mut hasher = Sha256::new();
        io::copy(&mut file, &mut hasher)?;
        Ok(hex::encode(hasher.finalize()))
    }
}

impl FileProbe for FsProbe {
    fn exists(&self, path: &str) -> bool {
        Path::new(path).is_file()
    }

    fn hash(&self, path: &str) -> Option<String> {
        match Self::hash_file(path) {
            Ok(digest) => Some(digest),
            Err(e) => {
                tracing::debug!(path, error = %e, "Could not hash file");
                None
            }
        }
    }
}
