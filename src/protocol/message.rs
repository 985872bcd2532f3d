//! Metric submission parsing and encoding.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Deserialize;
use serde_json::value::RawValue;
use serde_json::{Map, Number, Value};
use thiserror::Error;

use crate::protocol::canonical::{canonical_payload, to_canonical_string, SIGNATURE_FIELD};
use crate::protocol::signing::sign;
use crate::protocol::timestamp::parse_timestamp;

/// Message type emitted by agents.
pub const METRIC_TYPE: &str = "metric";

/// Reasons a line fails to decode into a [`Submission`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// The line is not a JSON object.
    #[error("Invalid JSON message: {0}")]
    JsonInvalid(String),

    /// A required field is absent.
    #[error("Missing required field: '{0}'")]
    MissingField(&'static str),

    /// A field is present with the wrong JSON type.
    #[error("Invalid type for field '{field}': expected {expected}")]
    TypeMismatch {
        field: &'static str,
        expected: &'static str,
    },

    /// `ts` is not an ISO-8601 timestamp.
    #[error("Invalid timestamp format for 'ts' field: {0}")]
    BadTimestamp(String),
}

impl ParseError {
    /// `true` for framing/JSON problems, `false` for field validation.
    pub fn is_protocol(&self) -> bool {
        matches!(self, ParseError::JsonInvalid(_))
    }
}

/// A decoded metric message, not yet authenticated.
#[derive(Debug, Clone, PartialEq)]
pub struct Submission {
    /// Optional message type (`"metric"` from current agents).
    pub kind: Option<String>,
    pub uri: String,
    /// Event time, normalized to UTC.
    pub ts: DateTime<Utc>,
    pub value: Number,
    pub token: String,
    pub signature: String,
    canonical: String,
}

impl Submission {
    /// The exact text the signature must cover.
    pub fn canonical_payload(&self) -> &str {
        &self.canonical
    }
}

/// Fields every submission must carry.
pub const REQUIRED_FIELDS: [&str; 5] = ["uri", "ts", "value", "token", SIGNATURE_FIELD];

/// Decode one protocol line.
///
/// Checks run in a fixed order and the first failure is returned: JSON
/// object, presence of [`REQUIRED_FIELDS`], field types (`type`, `uri`,
/// `ts`, `value`, `token`, `signature`), then the timestamp itself.
pub fn parse(line: &str) -> Result<Submission, ParseError> {
    let message = match serde_json::from_str::<Value>(line) {
        Ok(Value::Object(map)) => map,
        Ok(_) => return Err(ParseError::JsonInvalid("expected a JSON object".to_string())),
        Err(e) => return Err(ParseError::JsonInvalid(e.to_string())),
    };

    for field in REQUIRED_FIELDS {
        if !message.contains_key(field) {
            return Err(ParseError::MissingField(field));
        }
    }

    let kind = match message.get("type") {
        None => None,
        Some(Value::String(s)) => Some(s.clone()),
        Some(_) => return Err(mismatch("type", "string")),
    };
    let uri = field_str(&message, "uri")?;
    if uri.is_empty() {
        return Err(mismatch("uri", "non-empty string"));
    }
    let raw_ts = field_str(&message, "ts")?;
    let value = match &message["value"] {
        Value::Number(n) if is_wide_integer(n, line) => {
            return Err(mismatch("value", "int within 64 bits or float"));
        }
        Value::Number(n) => n.clone(),
        _ => return Err(mismatch("value", "int or float")),
    };
    let token = field_str(&message, "token")?;
    let signature = field_str(&message, SIGNATURE_FIELD)?;

    let ts = parse_timestamp(raw_ts).ok_or_else(|| ParseError::BadTimestamp(raw_ts.to_string()))?;

    Ok(Submission {
        kind,
        uri: uri.to_string(),
        ts,
        value,
        token: token.to_string(),
        signature: signature.to_string(),
        canonical: canonical_payload(&message),
    })
}

/// Integer literals beyond the 64-bit range decode as floats, which would
/// re-encode as `1e+20` instead of the digits the agent signed.
fn is_wide_integer(n: &Number, line: &str) -> bool {
    #[derive(Deserialize)]
    struct ValueText<'a> {
        #[serde(borrow)]
        value: &'a RawValue,
    }

    if n.is_i64() || n.is_u64() || n.as_f64().map_or(true, |f| f.abs() < 9.0e18) {
        return false;
    }
    match serde_json::from_str::<ValueText<'_>>(line) {
        Ok(raw) => {
            let text = raw.value.get();
            let digits = text.strip_prefix('-').unwrap_or(text);
            !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
        }
        Err(_) => false,
    }
}

fn mismatch(field: &'static str, expected: &'static str) -> ParseError {
    ParseError::TypeMismatch { field, expected }
}

fn field_str<'a>(message: &'a Map<String, Value>, field: &'static str) -> Result<&'a str, ParseError> {
    message
        .get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| mismatch(field, "string"))
}

/// An outgoing metric, as built by agents before signing.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricMessage {
    pub uri: String,
    pub ts: DateTime<Utc>,
    pub value: Number,
    pub token: String,
}

impl MetricMessage {
    /// Build a message; non-finite values have no JSON form and yield `None`.
    pub fn new(uri: impl Into<String>, ts: DateTime<Utc>, value: f64, token: impl Into<String>) -> Option<Self> {
        Some(Self {
            uri: uri.into(),
            ts,
            value: Number::from_f64(value)?,
            token: token.into(),
        })
    }

    /// Message fields without the signature.
    pub fn fields(&self) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("type".to_string(), Value::String(METRIC_TYPE.to_string()));
        map.insert("uri".to_string(), Value::String(self.uri.clone()));
        map.insert(
            "ts".to_string(),
            Value::String(self.ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
        );
        map.insert("value".to_string(), Value::Number(self.value.clone()));
        map.insert("token".to_string(), Value::String(self.token.clone()));
        map
    }

    /// Sign with `secret` and render one newline-terminated protocol line.
    pub fn to_signed_line(&self, secret: &str) -> String {
        encode_signed(self.fields(), secret)
    }
}

/// Sign an arbitrary message object and render it as a protocol line.
pub fn encode_signed(mut fields: Map<String, Value>, secret: &str) -> String {
    let signature = sign(secret, &canonical_payload(&fields));
    fields.insert(SIGNATURE_FIELD.to_string(), Value::String(signature));
    let mut line = to_canonical_string(&Value::Object(fields));
    line.push('\n');
    line
}
