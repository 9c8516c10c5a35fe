//! Data-export document posted once per device message.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::ProtocolError;
use crate::types::{Compression, InboundMessage, MessageKind};
use crate::validation::{missing_property, normalize_destination, validate_identifier};

/// Telemetry section of an export document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Telemetry {
    /// Base64 chunk payload. Absent on confirmation messages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
}

/// Raw export document as delivered by the device platform.
///
/// Every field is optional at this level so that a missing property is
/// reported by name instead of as a generic JSON error.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    #[serde(default)]
    pub message_properties: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub telemetry: Option<Telemetry>,
}

impl ExportMessage {
    /// Extracts and validates the fields the transfer core needs.
    ///
    /// `part` and `maxPart` are accepted as JSON numbers or numeric strings.
    /// An unrecognized `compression` is logged and treated as `none`.
    pub fn into_inbound(self) -> Result<InboundMessage, ProtocolError> {
        let device_id = self
            .device_id
            .ok_or(ProtocolError::MissingBodyProperty("deviceId"))?;
        validate_identifier("deviceId", &device_id)?;

        let props = self.message_properties;

        let transfer_id = string_property(&props, "id")?;
        validate_identifier("id", &transfer_id)?;

        let filepath = string_property(&props, "filepath")?;
        let (destination_dir, destination_filename) = normalize_destination(&filepath)?;

        let part = match props.get("part") {
            Some(value) => count_property("part", value)?,
            None => return Err(ProtocolError::MissingMessageProperty("part")),
        };
        if part == 0 {
            return Err(ProtocolError::InvalidProperty {
                name: "part",
                reason: "part numbers start at 1".into(),
            });
        }

        let max_part = match props.get("maxPart") {
            Some(value) => count_property("maxPart", value)?,
            None => 0,
        };

        let compression = match props.get("compression") {
            Some(Value::String(raw)) => Compression::parse(raw).unwrap_or_else(|| {
                tracing::error!(
                    received = %raw.to_ascii_lowercase(),
                    "compression message property is invalid"
                );
                Compression::None
            }),
            Some(other) => {
                tracing::error!(received = %other, "compression message property is invalid");
                Compression::None
            }
            None => Compression::None,
        };

        // Only the confirmation message carries maxPart.
        let kind = if max_part == 0 {
            let payload = self
                .telemetry
                .and_then(|t| t.data)
                .ok_or(ProtocolError::MissingTelemetryProperty("data"))?;
            MessageKind::Chunk { payload }
        } else {
            MessageKind::Completion {
                max_part,
                compression,
            }
        };

        Ok(InboundMessage {
            device_id,
            transfer_id,
            part,
            kind,
            destination_dir,
            destination_filename,
        })
    }
}

fn string_property(props: &Map<String, Value>, name: &'static str) -> Result<String, ProtocolError> {
    match props.get(name) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        Some(Value::Null) | None => Err(missing_property(name)),
        Some(other) => Err(ProtocolError::InvalidProperty {
            name,
            reason: format!("expected a string, got {other}"),
        }),
    }
}

fn count_property(name: &'static str, value: &Value) -> Result<u32, ProtocolError> {
    let invalid = |reason: String| ProtocolError::InvalidProperty { name, reason };
    match value {
        Value::Number(n) => n
            .as_u64()
            .and_then(|v| u32::try_from(v).ok())
            .ok_or_else(|| invalid(format!("not a part count: {n}"))),
        Value::String(s) => s
            .trim()
            .parse::<u32>()
            .map_err(|e| invalid(format!("not a part count: {s:?} ({e})"))),
        Value::Null => Err(missing_property(name)),
        other => Err(invalid(format!("not a part count: {other}"))),
    }
}
