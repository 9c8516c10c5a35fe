//! Message types for multi-part file transfers delivered through a device
//! telemetry export.
//!
//! The exporter posts one JSON document per device message. A transfer is
//! a run of chunk messages (base64 payload in `telemetry.data`) followed by
//! a confirmation message carrying `maxPart` and `compression`. This crate
//! turns those documents into validated [`InboundMessage`]s.

pub mod inbound;
pub mod types;
pub mod validation;

pub use inbound::{ExportMessage, Telemetry};
pub use types::{CompletionRecord, Compression, InboundMessage, MessageKind, Outcome, OutcomeStatus};
pub use validation::{normalize_destination, validate_identifier};

/// Errors produced while extracting and validating an inbound message.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("Missing body property: {0}")]
    MissingBodyProperty(&'static str),

    #[error("Missing message property: {0}")]
    MissingMessageProperty(&'static str),

    #[error("Missing telemetry property: {0}")]
    MissingTelemetryProperty(&'static str),

    #[error("invalid property {name}: {reason}")]
    InvalidProperty { name: &'static str, reason: String },

    #[error("invalid path: {0}")]
    InvalidPath(String),
}
