//! Protocol error types.

/// Errors that can occur while interpreting packet payloads.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// The JSON payload could not be parsed or produced.
    #[error("Invalid JSON payload: {0}")]
    Json(#[from] serde_json::Error),

    /// Dependency paths and dependency hashes differ in length.
    #[error("Dependency list has {dependencies} entries but {hashes} hashes")]
    MisalignedHashes {
        /// Number of dependency paths.
        dependencies: usize,
        /// Number of dependency hashes.
        hashes: usize,
    },

    /// The payload was not valid UTF-8.
    #[error("Payload is not valid UTF-8")]
    InvalidUtf8(#[from] std::str::Utf8Error),

    /// A payload contained an embedded NUL and cannot be framed.
    #[error("Payload contains an embedded NUL byte")]
    EmbeddedNul,
}
