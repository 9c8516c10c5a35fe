use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::ProtocolError;
use crate::validation::validate_identifier;

/// Compression applied to each chunk before base64 encoding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    #[default]
    None,
    /// zlib-wrapped deflate, one stream per chunk.
    Deflate,
}

impl Compression {
    /// Parses a compression name, ignoring ASCII case.
    ///
    /// Returns `None` for anything other than `none` or `deflate`.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "none" => Some(Self::None),
            "deflate" => Some(Self::Deflate),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Deflate => "deflate",
        }
    }
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persisted form of a confirmation message.
///
/// Stored next to the staged chunks so that chunks arriving after the
/// confirmation can still learn the expected part count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionRecord {
    pub max_part: u32,
    #[serde(default)]
    pub compression: Compression,
}

/// What an inbound message carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageKind {
    /// One numbered part; `payload` is the base64 text exactly as received.
    Chunk { payload: String },
    /// Terminal message declaring the total part count.
    Completion { max_part: u32, compression: Compression },
}

/// A validated message for one transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub device_id: String,
    pub transfer_id: String,
    pub part: u32,
    pub kind: MessageKind,
    /// Directory of the artifact, relative to the upload root. May be empty.
    pub destination_dir: PathBuf,
    pub destination_filename: String,
}

impl InboundMessage {
    /// Re-checks the invariants that extraction establishes.
    ///
    /// Callers that build messages by hand go through the same checks as
    /// messages parsed from an export document.
    pub fn validate(&self) -> Result<(), ProtocolError> {
        validate_identifier("deviceId", &self.device_id)?;
        validate_identifier("id", &self.transfer_id)?;
        if self.part == 0 {
            return Err(ProtocolError::InvalidProperty {
                name: "part",
                reason: "part numbers start at 1".into(),
            });
        }
        if let MessageKind::Completion { max_part: 0, .. } = self.kind {
            return Err(ProtocolError::MissingMessageProperty("maxPart"));
        }
        if self.destination_filename.is_empty() {
            return Err(ProtocolError::MissingMessageProperty("filepath"));
        }
        crate::validation::validate_relative_dir(&self.destination_dir)
    }

    pub fn is_completion(&self) -> bool {
        matches!(self.kind, MessageKind::Completion { .. })
    }
}

/// Result status reported back to the invoker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeStatus {
    Success,
    Failure,
}

/// Final result of handling one inbound message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outcome {
    pub status: OutcomeStatus,
    /// Empty on success, the error description on failure.
    pub message: String,
}

impl Outcome {
    pub fn success() -> Self {
        Self {
            status: OutcomeStatus::Success,
            message: String::new(),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            status: OutcomeStatus::Failure,
            message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == OutcomeStatus::Success
    }
}
