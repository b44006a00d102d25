//! Profile rendering for trace operations
//!
//! Every traced operation is described once as an [`OperationRecord`]: a title, a
//! timestamp, an ordered list of [`Field`]s and a terse compact line. The
//! [`EventFormatter`] turns that description into one of three shapes depending on
//! the [`Profile`] in effect:
//!
//! - **Verbose**: a title line followed by one `  Label: value` line per labelled field
//! - **Compact**: `[timestamp] <compact line>` on a single line
//! - **Structured**: a flat JSON object keyed by the fields' stable key names
//!
//! Absent values never disappear from the output: text profiles show [`UNSET`] and
//! structured output carries an explicit `null`, so every profile keeps a stable
//! schema.

use crate::config::Profile;
use crate::error::Result;
use chrono::{DateTime, Local};
use serde_json::{Map, Value};
use tracing::error;

/// Marker for absent values in text profiles
pub const UNSET: &str = "unset";
/// Bytes shown before a hex rendering is truncated
pub const HEX_PREVIEW_BYTES: usize = 32;
/// Characters kept when an identifier is abbreviated
pub const SHORT_ID_CHARS: usize = 8;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// A value carried by a [`Field`]
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(Option<String>),
    Integer(Option<i64>),
    Decimal(Option<f64>),
    Flag(Option<bool>),
    Vector(Vec<f64>),
}

impl FieldValue {
    pub fn text(value: impl Into<String>) -> Self {
        FieldValue::Text(Some(value.into()))
    }

    pub fn opt_text(value: Option<&str>) -> Self {
        FieldValue::Text(value.map(str::to_string))
    }

    pub fn is_set(&self) -> bool {
        match self {
            FieldValue::Text(v) => v.is_some(),
            FieldValue::Integer(v) => v.is_some(),
            FieldValue::Decimal(v) => v.is_some(),
            FieldValue::Flag(v) => v.is_some(),
            FieldValue::Vector(_) => true,
        }
    }

    /// Text form used by the verbose and compact profiles
    pub fn display(&self) -> String {
        match self {
            FieldValue::Text(Some(v)) => v.clone(),
            FieldValue::Integer(Some(v)) => v.to_string(),
            FieldValue::Decimal(Some(v)) => v.to_string(),
            FieldValue::Flag(Some(v)) => v.to_string(),
            FieldValue::Vector(values) => {
                let parts: Vec<String> = values.iter().map(|v| v.to_string()).collect();
                format!("[{}]", parts.join(", "))
            }
            _ => UNSET.to_string(),
        }
    }

    /// JSON form used by the structured profile
    pub fn to_json(&self) -> Value {
        match self {
            FieldValue::Text(Some(v)) => Value::String(v.clone()),
            FieldValue::Integer(Some(v)) => Value::from(*v),
            FieldValue::Decimal(Some(v)) => Value::from(*v),
            FieldValue::Flag(Some(v)) => Value::Bool(*v),
            FieldValue::Vector(values) => Value::Array(values.iter().map(|v| Value::from(*v)).collect()),
            _ => Value::Null,
        }
    }
}

/// One named value of an operation.
///
/// A field with a `label` appears in verbose output, a field with a `key` appears in
/// structured output and in record summaries.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub label: Option<&'static str>,
    pub key: Option<&'static str>,
    pub value: FieldValue,
    pub unit: Option<&'static str>,
}

impl Field {
    pub fn new(label: &'static str, key: &'static str, value: FieldValue) -> Self {
        Self {
            label: Some(label),
            key: Some(key),
            value,
            unit: None,
        }
    }

    pub fn verbose_only(label: &'static str, value: FieldValue) -> Self {
        Self {
            label: Some(label),
            key: None,
            value,
            unit: None,
        }
    }

    pub fn structured_only(key: &'static str, value: FieldValue) -> Self {
        Self {
            label: None,
            key: Some(key),
            value,
            unit: None,
        }
    }

    /// Suffix appended to the verbose value, e.g. `" dBm"`
    pub fn with_unit(mut self, unit: &'static str) -> Self {
        self.unit = Some(unit);
        self
    }
}

/// Profile-independent description of one traced operation
#[derive(Debug, Clone, PartialEq)]
pub struct OperationRecord {
    pub title: String,
    pub timestamp: String,
    pub compact: String,
    pub fields: Vec<Field>,
}

impl OperationRecord {
    pub fn new(title: impl Into<String>, timestamp: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            timestamp: timestamp.into(),
            compact: String::new(),
            fields: Vec::new(),
        }
    }

    pub fn compact(mut self, line: impl Into<String>) -> Self {
        self.compact = line.into();
        self
    }

    pub fn field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    pub fn fields(mut self, fields: impl IntoIterator<Item = Field>) -> Self {
        self.fields.extend(fields);
        self
    }
}

/// Output of a render, before the sink wrapper finalizes it into a line
#[derive(Debug, Clone, PartialEq)]
pub enum Rendered {
    Text(String),
    Structured(Map<String, Value>),
}

impl Rendered {
    /// Finalize into the line handed to the sink.
    ///
    /// Structured output gets its `event_type` discriminator appended as the last key.
    /// If serialization fails the error is logged and `{}` is emitted in its place.
    pub fn into_line(self, event_type: &str) -> String {
        match self {
            Rendered::Text(line) => line,
            Rendered::Structured(mut map) => {
                map.insert("event_type".to_string(), Value::String(event_type.to_string()));
                match serialize_line(map) {
                    Ok(line) => line,
                    Err(e) => {
                        error!(event_type, "{}", e);
                        "{}".to_string()
                    }
                }
            }
        }
    }
}

fn serialize_line(map: Map<String, Value>) -> Result<String> {
    Ok(serde_json::to_string(&Value::Object(map))?)
}

/// Renders [`OperationRecord`]s under a [`Profile`].
///
/// The formatter holds no state; the profile is passed on every call so it is always
/// read from the configuration that applies to that operation.
#[derive(Debug, Clone, Copy, Default)]
pub struct EventFormatter;

impl EventFormatter {
    pub fn new() -> Self {
        Self
    }

    pub fn render(&self, profile: Profile, record: &OperationRecord) -> Rendered {
        match profile {
            Profile::Verbose => Rendered::Text(self.render_verbose(record)),
            Profile::Compact => Rendered::Text(format!("[{}] {}", record.timestamp, record.compact)),
            Profile::Structured => Rendered::Structured(self.render_structured(record)),
        }
    }

    fn render_verbose(&self, record: &OperationRecord) -> String {
        let mut out = format!("[{}] {}", record.timestamp, record.title);
        for field in &record.fields {
            let Some(label) = field.label else {
                continue;
            };
            out.push_str(&format!("\n  {}: {}", label, field.value.display()));
            if let (Some(unit), true) = (field.unit, field.value.is_set()) {
                out.push_str(unit);
            }
        }
        out
    }

    fn render_structured(&self, record: &OperationRecord) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("timestamp".to_string(), Value::String(record.timestamp.clone()));
        for field in &record.fields {
            if let Some(key) = field.key {
                map.insert(key.to_string(), field.value.to_json());
            }
        }
        map
    }
}

/// `key=value` summary of the keyed fields, used as the compact body of records.
pub fn summarize(fields: &[Field]) -> String {
    fields
        .iter()
        .filter_map(|f| f.key.map(|key| format!("{}={}", key, f.value.display())))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Local wall-clock rendering of a millisecond timestamp
pub fn format_timestamp(timestamp_ms: i64) -> String {
    DateTime::from_timestamp_millis(timestamp_ms)
        .map(|dt| dt.with_timezone(&Local).format(TIMESTAMP_FORMAT).to_string())
        .unwrap_or_else(|| UNSET.to_string())
}

/// `[AA BB ..]` hex rendering, truncated after [`HEX_PREVIEW_BYTES`] bytes.
pub fn bytes_to_hex(value: Option<&[u8]>) -> String {
    let bytes = match value {
        Some(bytes) if !bytes.is_empty() => bytes,
        _ => return "[]".to_string(),
    };

    let shown: Vec<String> = bytes
        .iter()
        .take(HEX_PREVIEW_BYTES)
        .map(|b| format!("{:02X}", b))
        .collect();

    let mut out = format!("[{}", shown.join(" "));
    if bytes.len() > HEX_PREVIEW_BYTES {
        out.push_str(&format!(" ... ({} bytes)", bytes.len()));
    }
    out.push(']');
    out
}

/// Contiguous uppercase hex, e.g. for tag UIDs
pub fn hex_upper(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02X}", b)).collect()
}

/// First [`SHORT_ID_CHARS`] characters of an identifier, for display only.
pub fn shorten_id(id: Option<&str>) -> String {
    match id {
        None => UNSET.to_string(),
        Some(id) => id.chars().take(SHORT_ID_CHARS).collect(),
    }
}
