//! JSON wire format for [`UsageEvent`].
//!
//! Encoding goes through the record's own serde derive, the same one the
//! simulator's fallback files use. Identifiers travel as canonical UUID
//! strings, timestamps as RFC 3339 strings in UTC, and weights as plain
//! JSON numbers:
//!
//! ```json
//! {
//!   "id": "0b1c...",
//!   "litterbox_edge_device_id": "12345678-1234-5678-9012-123456789abc",
//!   "enter_time": "2024-01-15T07:30:00Z",
//!   "exit_time": "2024-01-15T07:31:35Z",
//!   "weight_enter": 41.3,
//!   "weight_exit": 32.1,
//!   "created_at": "2024-01-22T00:01:02.123456Z"
//! }
//! ```
//!
//! Decoding is the only place in the pipeline that looks at an untyped
//! payload. It also accepts offset-less timestamps, read as UTC. Both
//! error kinds are permanent: redelivering the same bytes can never make
//! them decodable.

use chrono::{DateTime, NaiveDateTime, Utc};
use litterbox_types::{EdgeDeviceId, UsageEvent, UsageEventId};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Media type stamped on every published message.
pub const CONTENT_TYPE: &str = "application/json";

/// Offset-less formats accepted on decode and read as UTC.
const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Errors produced by [`encode`] and [`decode`].
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The payload is not a well-formed JSON object.
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    /// A required field is missing or its value cannot be parsed.
    #[error("invalid field `{field}`: {reason}")]
    InvalidField {
        /// Wire name of the offending field.
        field: &'static str,
        /// What was wrong with it.
        reason: String,
    },
}

/// Encode a usage event into its JSON wire payload.
///
/// # Errors
///
/// Returns [`CodecError::InvalidField`] if a weight is not a finite number
/// (JSON has no representation for NaN or infinity).
pub fn encode(event: &UsageEvent) -> Result<Vec<u8>, CodecError> {
    ensure_finite("weight_enter", event.weight_enter)?;
    ensure_finite("weight_exit", event.weight_exit)?;
    serde_json::to_vec(event)
        .map_err(|e| CodecError::MalformedPayload(format!("failed to serialize event: {e}")))
}

/// Decode a JSON wire payload into a usage event.
///
/// # Errors
///
/// Returns [`CodecError::MalformedPayload`] if the bytes are not a JSON
/// object, or [`CodecError::InvalidField`] if a field is missing or holds
/// an unparseable identifier, timestamp or number.
pub fn decode(payload: &[u8]) -> Result<UsageEvent, CodecError> {
    let value: Value = serde_json::from_slice(payload)
        .map_err(|e| CodecError::MalformedPayload(e.to_string()))?;
    let Value::Object(object) = value else {
        return Err(CodecError::MalformedPayload(
            "expected a JSON object".to_owned(),
        ));
    };

    Ok(UsageEvent {
        id: UsageEventId(uuid_field(&object, "id")?),
        source_device_id: EdgeDeviceId(uuid_field(&object, "litterbox_edge_device_id")?),
        enter_time: time_field(&object, "enter_time")?,
        exit_time: time_field(&object, "exit_time")?,
        weight_enter: number_field(&object, "weight_enter")?,
        weight_exit: number_field(&object, "weight_exit")?,
        created_at: time_field(&object, "created_at")?,
    })
}

fn ensure_finite(field: &'static str, weight: f64) -> Result<(), CodecError> {
    if weight.is_finite() {
        Ok(())
    } else {
        Err(CodecError::InvalidField {
            field,
            reason: format!("{weight} is not a finite number"),
        })
    }
}

fn required<'a>(object: &'a Map<String, Value>, field: &'static str) -> Result<&'a Value, CodecError> {
    match object.get(field) {
        None | Some(Value::Null) => Err(CodecError::InvalidField {
            field,
            reason: "missing required field".to_owned(),
        }),
        Some(value) => Ok(value),
    }
}

fn string_field<'a>(
    object: &'a Map<String, Value>,
    field: &'static str,
) -> Result<&'a str, CodecError> {
    required(object, field)?
        .as_str()
        .ok_or_else(|| CodecError::InvalidField {
            field,
            reason: "expected a string".to_owned(),
        })
}

fn uuid_field(object: &Map<String, Value>, field: &'static str) -> Result<Uuid, CodecError> {
    let raw = string_field(object, field)?;
    Uuid::parse_str(raw).map_err(|e| CodecError::InvalidField {
        field,
        reason: format!("invalid UUID {raw:?}: {e}"),
    })
}

fn time_field(
    object: &Map<String, Value>,
    field: &'static str,
) -> Result<DateTime<Utc>, CodecError> {
    let raw = string_field(object, field)?;
    parse_timestamp(raw).ok_or_else(|| CodecError::InvalidField {
        field,
        reason: format!("invalid ISO-8601 timestamp {raw:?}"),
    })
}

fn number_field(object: &Map<String, Value>, field: &'static str) -> Result<f64, CodecError> {
    required(object, field)?
        .as_f64()
        .ok_or_else(|| CodecError::InvalidField {
            field,
            reason: "expected a number".to_owned(),
        })
}

/// Parse an ISO-8601 timestamp. Offset-less values are taken as UTC.
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(time) = DateTime::parse_from_rfc3339(raw) {
        return Some(time.with_timezone(&Utc));
    }
    NAIVE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .map(|naive| naive.and_utc())
}
