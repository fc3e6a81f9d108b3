//! Payload types carried by the protocol.

use serde::{Deserialize, Serialize};

use super::{encode_terminated, PacketType, ProtocolError};

/// Tags used for broadcast updates.
pub mod tag {
    pub const PROJECT_DESCRIPTION: &str = "PROJECT DESCRIPTION";
    pub const DEBUGGER_STARTED: &str = "DEBUGGER STARTED";
    pub const DEBUGGER_STOPPED: &str = "DEBUGGER STOPPED";
    pub const DEBUGGER_STDOUT: &str = "DEBUGGER STDOUT";
    pub const DEBUGGER_STDERR: &str = "DEBUGGER STDERR";
    pub const FILE_FOUND: &str = "FILE FOUND";
    pub const FILE_MISSING: &str = "FILE MISSING";
    pub const FILE_MISMATCH: &str = "FILE MISMATCH";
    pub const FILE_MATCH: &str = "FILE MATCH";
}

/// A link dependency and the hash it must have.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
    pub path: String,
    pub wanted_hash: String,
}

/// The desired state of the project to debug.
///
/// An empty `executable_name` means no project is loaded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "WireDescription", into = "WireDescription")]
pub struct ProjectDescription {
    pub executable_name: String,
    pub executable_hash: String,
    /// Ordered; the executable's loader sees them in this order.
    pub dependencies: Vec<Dependency>,
    pub launch_arguments: Vec<String>,
}

/// JSON shape of a project description, with index-aligned dependency arrays.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct WireDescription {
    executable_name: String,
    #[serde(default)]
    executable_hash: String,
    link_dependencies_for_executable: Vec<String>,
    #[serde(default)]
    link_dependencies_for_executable_hashes: Vec<String>,
    #[serde(default)]
    executable_arguments: Vec<String>,
}

impl TryFrom<WireDescription> for ProjectDescription {
    type Error = ProtocolError;

    fn try_from(wire: WireDescription) -> Result<Self, Self::Error> {
        let dependencies = wire.link_dependencies_for_executable.len();
        let hashes = wire.link_dependencies_for_executable_hashes.len();
        if dependencies != hashes {
            return Err(ProtocolError::MisalignedHashes {
                dependencies,
                hashes,
            });
        }

        Ok(Self {
            executable_name: wire.executable_name,
            executable_hash: wire.executable_hash,
            dependencies: wire
                .link_dependencies_for_executable
                .into_iter()
                .zip(wire.link_dependencies_for_executable_hashes)
                .map(|(path, wanted_hash)| Dependency { path, wanted_hash })
                .collect(),
            launch_arguments: wire.executable_arguments,
        })
    }
}

impl From<ProjectDescription> for WireDescription {
    fn from(description: ProjectDescription) -> Self {
        let (paths, hashes) = description
            .dependencies
            .into_iter()
            .map(|d| (d.path, d.wanted_hash))
            .unzip();
        Self {
            executable_name: description.executable_name,
            executable_hash: description.executable_hash,
            link_dependencies_for_executable: paths,
            link_dependencies_for_executable_hashes: hashes,
            executable_arguments: description.launch_arguments,
        }
    }
}

impl ProjectDescription {
    /// Create a description with no dependencies and no launch arguments.
    #[must_use]
    pub fn new(executable_name: impl Into<String>, executable_hash: impl Into<String>) -> Self {
        Self {
            executable_name: executable_name.into(),
            executable_hash: executable_hash.into(),
            ..Default::default()
        }
    }

    /// Append a link dependency.
    #[must_use]
    pub fn with_dependency(mut self, path: impl Into<String>, wanted_hash: impl Into<String>) -> Self {
        self.dependencies.push(Dependency {
            path: path.into(),
            wanted_hash: wanted_hash.into(),
        });
        self
    }

    /// Set the arguments passed to the executable when the debugger launches it.
    #[must_use]
    pub fn with_arguments<I, S>(mut self, arguments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.launch_arguments = arguments.into_iter().map(Into::into).collect();
        self
    }

    /// Whether this description names a project at all.
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        !self.executable_name.is_empty()
    }

    /// The executable followed by every dependency path.
    pub fn required_files(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.executable_name.as_str())
            .chain(self.dependencies.iter().map(|d| d.path.as_str()))
    }

    /// The declared hash for `path`, if the description mentions it.
    #[must_use]
    pub fn wanted_hash(&self, path: &str) -> Option<&str> {
        if path == self.executable_name {
            return Some(&self.executable_hash);
        }
        self.dependencies
            .iter()
            .find(|d| d.path == path)
            .map(|d| d.wanted_hash.as_str())
    }

    /// Parse a description from its JSON form.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is malformed, lacks `executable_name` or
    /// `link_dependencies_for_executable`, or the hash array is misaligned.
    pub fn from_json(json: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Serialize to the JSON form.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Encode as a complete `ProjectDescription` packet.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_packet(&self) -> Result<Vec<u8>, ProtocolError> {
        encode_terminated(PacketType::ProjectDescription, &self.to_json()?)
    }
}

/// A tagged status message broadcast to subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriberUpdate {
    #[serde(default = "default_tag")]
    pub tag: String,
    #[serde(default = "default_message")]
    pub message: String,
}

fn default_tag() -> String {
    "UNTAGGED".to_string()
}

fn default_message() -> String {
    "NO MESSAGE".to_string()
}

impl SubscriberUpdate {
    #[must_use]
    pub fn new(tag: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            message: message.into(),
        }
    }

    /// Parse an update from its JSON form.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is malformed.
    pub fn from_json(json: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Encode as a complete `SubscribeResponse` packet.
    ///
    /// JSON string escaping guarantees no raw NUL ends up in the payload.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_packet(&self) -> Result<Vec<u8>, ProtocolError> {
        encode_terminated(PacketType::SubscribeResponse, &serde_json::to_string(self)?)
    }
}
