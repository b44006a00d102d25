//! Trace event types
//!
//! Every record in an event log implements [`TraceRecord`]: an immutable identity
//! (UUID and capture timestamp), a type tag, free-form data, and the ordered fields
//! used when the record is rendered. [`TraceEvent`] is the plain record; the domain
//! records ([`TelephonyEvent`], [`NfcEvent`], [`TelemetrySample`]) embed one and add
//! typed payload fields that their owning tracer fills in before appending.

use crate::tracer::formatter::{summarize, Field, FieldValue};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Trait for filtering trace records
///
/// Implemented for any matching closure, so queries can take either.
pub trait EventFilterFn: Send + Sync {
    /// Test whether a record passes the filter
    fn matches(&self, event: &dyn TraceRecord) -> bool;
}

impl<F> EventFilterFn for F
where
    F: Fn(&dyn TraceRecord) -> bool + Send + Sync,
{
    fn matches(&self, event: &dyn TraceRecord) -> bool {
        self(event)
    }
}

/// Base trait for everything stored in an event log
pub trait TraceRecord: Send + Sync + fmt::Debug {
    /// Globally unique identifier assigned at construction
    fn event_id(&self) -> &str;

    /// Capture time in milliseconds since the Unix epoch
    fn timestamp(&self) -> i64;

    /// Short type tag, e.g. `START` or `TELEMETRY_DATA`
    fn event_type(&self) -> &str;

    /// Free-form text attached to the record
    fn data(&self) -> &str;

    /// Payload fields in rendering order
    fn fields(&self) -> Vec<Field> {
        vec![Field::new("Data", "data", FieldValue::text(self.data()))]
    }

    /// Single-line summary of the payload
    fn printable_summary(&self) -> String {
        summarize(&self.fields())
    }
}

/// Plain trace record: identity, type and data.
///
/// `event_id` and `timestamp` are fixed at construction; only `data` can change, and
/// only until the event is handed to a log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceEvent {
    event_id: String,
    timestamp: i64,
    event_type: String,
    data: String,
}

impl TraceEvent {
    pub fn new(event_type: impl Into<String>) -> Self {
        Self::with_data(event_type, "")
    }

    pub fn with_data(event_type: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            event_id: Uuid::new_v4().to_string(),
            timestamp: Utc::now().timestamp_millis(),
            event_type: event_type.into(),
            data: data.into(),
        }
    }

    pub fn set_data(&mut self, data: impl Into<String>) {
        self.data = data.into();
    }
}

impl TraceRecord for TraceEvent {
    fn event_id(&self) -> &str {
        &self.event_id
    }

    fn timestamp(&self) -> i64 {
        self.timestamp
    }

    fn event_type(&self) -> &str {
        &self.event_type
    }

    fn data(&self) -> &str {
        &self.data
    }

    fn printable_summary(&self) -> String {
        self.data.clone()
    }
}

/// Call state reported by the telephony platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallState {
    #[serde(rename = "IDLE")]
    Idle,
    #[serde(rename = "RINGING")]
    Ringing,
    #[serde(rename = "OFFHOOK")]
    OffHook,
    #[serde(rename = "UNKNOWN")]
    Unknown,
}

impl CallState {
    pub fn from_code(code: i32) -> Self {
        match code {
            0 => CallState::Idle,
            1 => CallState::Ringing,
            2 => CallState::OffHook,
            _ => CallState::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CallState::Idle => "IDLE",
            CallState::Ringing => "RINGING",
            CallState::OffHook => "OFFHOOK",
            CallState::Unknown => "UNKNOWN",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SmsDirection {
    Inbound,
    Outbound,
}

impl SmsDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            SmsDirection::Inbound => "INBOUND",
            SmsDirection::Outbound => "OUTBOUND",
        }
    }
}

/// Call, SMS and cellular network record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelephonyEvent {
    #[serde(flatten)]
    base: TraceEvent,
    pub call_state: Option<CallState>,
    /// Masked number, only the last four digits survive
    pub phone_number: Option<String>,
    pub sms_direction: Option<SmsDirection>,
    pub signal_strength: Option<i32>,
    pub network_type: Option<String>,
    pub sim_operator: Option<String>,
    pub call_duration_ms: Option<i64>,
}

impl TelephonyEvent {
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            base: TraceEvent::new(event_type),
            call_state: None,
            phone_number: None,
            sms_direction: None,
            signal_strength: None,
            network_type: None,
            sim_operator: None,
            call_duration_ms: None,
        }
    }

    pub fn set_data(&mut self, data: impl Into<String>) {
        self.base.set_data(data);
    }
}

impl TraceRecord for TelephonyEvent {
    fn event_id(&self) -> &str {
        self.base.event_id()
    }

    fn timestamp(&self) -> i64 {
        self.base.timestamp()
    }

    fn event_type(&self) -> &str {
        self.base.event_type()
    }

    fn data(&self) -> &str {
        self.base.data()
    }

    fn fields(&self) -> Vec<Field> {
        vec![
            Field::new("Call State", "call_state", FieldValue::opt_text(self.call_state.map(|s| s.as_str()))),
            Field::new("Phone Number", "phone_number", FieldValue::opt_text(self.phone_number.as_deref())),
            Field::new(
                "SMS Direction",
                "sms_direction",
                FieldValue::opt_text(self.sms_direction.map(|d| d.as_str())),
            ),
            Field::new(
                "Signal Strength",
                "signal_strength",
                FieldValue::Integer(self.signal_strength.map(i64::from)),
            ),
            Field::new("Network Type", "network_type", FieldValue::opt_text(self.network_type.as_deref())),
            Field::new("SIM Operator", "sim_operator", FieldValue::opt_text(self.sim_operator.as_deref())),
            Field::new("Call Duration", "call_duration_ms", FieldValue::Integer(self.call_duration_ms))
                .with_unit(" ms"),
            Field::new("Data", "data", FieldValue::text(self.data())),
        ]
    }
}

/// NFC operation captured by an [`NfcEvent`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NfcOperation {
    TagDiscovered,
    TagWrite,
}

impl NfcOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            NfcOperation::TagDiscovered => "TAG_DISCOVERED",
            NfcOperation::TagWrite => "TAG_WRITE",
        }
    }
}

/// Tag interaction record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NfcEvent {
    #[serde(flatten)]
    base: TraceEvent,
    pub operation: NfcOperation,
    pub tag_type: Option<String>,
    pub uid: Option<String>,
    pub signal_strength: Option<i32>,
    pub ndef_message: Option<String>,
    pub operation_duration_ms: Option<i64>,
}

impl NfcEvent {
    pub const EVENT_TYPE: &'static str = "NFC_EVENT";

    pub fn new(operation: NfcOperation) -> Self {
        Self {
            base: TraceEvent::new(Self::EVENT_TYPE),
            operation,
            tag_type: None,
            uid: None,
            signal_strength: None,
            ndef_message: None,
            operation_duration_ms: None,
        }
    }

    pub fn set_data(&mut self, data: impl Into<String>) {
        self.base.set_data(data);
    }
}

impl TraceRecord for NfcEvent {
    fn event_id(&self) -> &str {
        self.base.event_id()
    }

    fn timestamp(&self) -> i64 {
        self.base.timestamp()
    }

    fn event_type(&self) -> &str {
        self.base.event_type()
    }

    fn data(&self) -> &str {
        self.base.data()
    }

    fn fields(&self) -> Vec<Field> {
        vec![
            Field::new("Operation", "operation", FieldValue::text(self.operation.as_str())),
            Field::new("Tag Type", "tag_type", FieldValue::opt_text(self.tag_type.as_deref())),
            Field::new("UID", "uid", FieldValue::opt_text(self.uid.as_deref())),
            Field::new(
                "Signal Strength",
                "signal_strength",
                FieldValue::Integer(self.signal_strength.map(i64::from)),
            ),
            Field::new("NDEF Message", "ndef_message", FieldValue::opt_text(self.ndef_message.as_deref())),
            Field::new("Duration", "operation_duration_ms", FieldValue::Integer(self.operation_duration_ms))
                .with_unit(" ms"),
            Field::new("Data", "data", FieldValue::text(self.data())),
        ]
    }
}

/// Battery charging state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BatteryStatus {
    Charging,
    Discharging,
    Full,
    NotCharging,
    #[default]
    Unknown,
}

impl BatteryStatus {
    pub fn from_code(code: i32) -> Self {
        match code {
            2 => BatteryStatus::Charging,
            3 => BatteryStatus::Discharging,
            4 => BatteryStatus::NotCharging,
            5 => BatteryStatus::Full,
            _ => BatteryStatus::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BatteryStatus::Charging => "CHARGING",
            BatteryStatus::Discharging => "DISCHARGING",
            BatteryStatus::Full => "FULL",
            BatteryStatus::NotCharging => "NOT_CHARGING",
            BatteryStatus::Unknown => "UNKNOWN",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

/// Periodic device telemetry sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySample {
    #[serde(flatten)]
    base: TraceEvent,
    /// CPU busy share in percent
    pub cpu_usage: Option<f32>,
    pub memory_used: Option<u64>,
    pub memory_total: Option<u64>,
    /// Battery charge in percent
    pub battery_level: Option<i32>,
    pub battery_status: BatteryStatus,
    pub network_type: Option<String>,
    pub wifi_connected: bool,
    pub cellular_connected: bool,
    pub location: Option<GeoPoint>,
    pub accelerometer: [f32; 3],
    pub gyroscope: [f32; 3],
}

impl TelemetrySample {
    pub const EVENT_TYPE: &'static str = "TELEMETRY_DATA";

    pub fn new() -> Self {
        Self {
            base: TraceEvent::new(Self::EVENT_TYPE),
            cpu_usage: None,
            memory_used: None,
            memory_total: None,
            battery_level: None,
            battery_status: BatteryStatus::Unknown,
            network_type: None,
            wifi_connected: false,
            cellular_connected: false,
            location: None,
            accelerometer: [0.0; 3],
            gyroscope: [0.0; 3],
        }
    }
}

impl Default for TelemetrySample {
    fn default() -> Self {
        Self::new()
    }
}

impl TraceRecord for TelemetrySample {
    fn event_id(&self) -> &str {
        self.base.event_id()
    }

    fn timestamp(&self) -> i64 {
        self.base.timestamp()
    }

    fn event_type(&self) -> &str {
        self.base.event_type()
    }

    fn data(&self) -> &str {
        self.base.data()
    }

    fn fields(&self) -> Vec<Field> {
        let memory = |v: Option<u64>| FieldValue::Integer(v.and_then(|v| i64::try_from(v).ok()));
        let vector = |v: &[f32; 3]| FieldValue::Vector(v.iter().map(|x| f64::from(*x)).collect());

        vec![
            Field::new("CPU Usage", "cpu_usage", FieldValue::Decimal(self.cpu_usage.map(f64::from)))
                .with_unit("%"),
            Field::new("Memory Used", "memory_used", memory(self.memory_used)).with_unit(" bytes"),
            Field::new("Memory Total", "memory_total", memory(self.memory_total)).with_unit(" bytes"),
            Field::new(
                "Battery Level",
                "battery_level",
                FieldValue::Integer(self.battery_level.map(i64::from)),
            )
            .with_unit("%"),
            Field::new("Battery Status", "battery_status", FieldValue::text(self.battery_status.as_str())),
            Field::new("Network Type", "network_type", FieldValue::opt_text(self.network_type.as_deref())),
            Field::new("WiFi Connected", "wifi_connected", FieldValue::Flag(Some(self.wifi_connected))),
            Field::new(
                "Cellular Connected",
                "cellular_connected",
                FieldValue::Flag(Some(self.cellular_connected)),
            ),
            Field::new(
                "Location",
                "location",
                FieldValue::Text(self.location.map(|p| format!("{},{}", p.latitude, p.longitude))),
            ),
            Field::new("Accelerometer", "accelerometer", vector(&self.accelerometer)),
            Field::new("Gyroscope", "gyroscope", vector(&self.gyroscope)),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trace_event_identity() {
        let before = Utc::now().timestamp_millis();
        let event = TraceEvent::with_data("START", "Tracer started");
        let after = Utc::now().timestamp_millis();

        assert_eq!(event.event_type(), "START");
        assert_eq!(event.data(), "Tracer started");
        assert!(Uuid::parse_str(event.event_id()).is_ok());
        assert!(event.timestamp() >= before && event.timestamp() <= after);
    }

    #[test]
    fn test_event_ids_are_unique() {
        let a = TraceEvent::new("INFO");
        let b = TraceEvent::new("INFO");
        assert_ne!(a.event_id(), b.event_id());
    }

    #[test]
    fn test_set_data_keeps_identity() {
        let mut event = TraceEvent::new("INFO");
        let id = event.event_id().to_string();
        let timestamp = event.timestamp();

        event.set_data("updated");

        assert_eq!(event.data(), "updated");
        assert_eq!(event.event_id(), id);
        assert_eq!(event.timestamp(), timestamp);
    }

    #[test]
    fn test_plain_event_summary_is_data() {
        let event = TraceEvent::with_data("INFO", "Network type: LTE");
        assert_eq!(event.printable_summary(), "Network type: LTE");
    }

    #[test]
    fn test_telephony_event_summary() {
        let mut event = TelephonyEvent::new("CALL_STATE_CHANGE");
        event.call_state = Some(CallState::Ringing);
        event.phone_number = Some("***1234".to_string());

        let summary = event.printable_summary();
        assert!(summary.contains("call_state=RINGING"));
        assert!(summary.contains("phone_number=***1234"));
        assert!(summary.contains("signal_strength=unset"));
        assert_eq!(event.event_type(), "CALL_STATE_CHANGE");
    }

    #[test]
    fn test_call_state_codes() {
        assert_eq!(CallState::from_code(0), CallState::Idle);
        assert_eq!(CallState::from_code(1), CallState::Ringing);
        assert_eq!(CallState::from_code(2), CallState::OffHook);
        assert_eq!(CallState::from_code(9), CallState::Unknown);
        assert_eq!(CallState::OffHook.as_str(), "OFFHOOK");
    }

    #[test]
    fn test_battery_status_codes() {
        assert_eq!(BatteryStatus::from_code(2), BatteryStatus::Charging);
        assert_eq!(BatteryStatus::from_code(3), BatteryStatus::Discharging);
        assert_eq!(BatteryStatus::from_code(4), BatteryStatus::NotCharging);
        assert_eq!(BatteryStatus::from_code(5), BatteryStatus::Full);
        assert_eq!(BatteryStatus::from_code(-1), BatteryStatus::Unknown);
    }

    #[test]
    fn test_nfc_event_type_is_fixed() {
        let mut event = NfcEvent::new(NfcOperation::TagWrite);
        event.uid = Some("04A23B".to_string());
        event.set_data("Write successful");

        assert_eq!(event.event_type(), NfcEvent::EVENT_TYPE);
        let summary = event.printable_summary();
        assert!(summary.contains("operation=TAG_WRITE"));
        assert!(summary.contains("uid=04A23B"));
        assert!(summary.contains("data=Write successful"));
    }

    #[test]
    fn test_telemetry_fields_cover_payload() {
        let mut sample = TelemetrySample::new();
        sample.cpu_usage = Some(12.5);
        sample.accelerometer = [0.0, 0.5, 9.75];

        let keys: Vec<&str> = sample.fields().iter().filter_map(|f| f.key).collect();
        assert!(keys.contains(&"cpu_usage"));
        assert!(keys.contains(&"battery_status"));
        assert!(keys.contains(&"gyroscope"));

        let summary = sample.printable_summary();
        assert!(summary.contains("cpu_usage=12.5"));
        assert!(summary.contains("accelerometer=[0, 0.5, 9.75]"));
        assert!(summary.contains("memory_used=unset"));
    }

    #[test]
    fn test_specialized_event_serializes_identity() {
        let event = TelephonyEvent::new("SMS_EVENT");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event_type"], "SMS_EVENT");
        assert!(json["event_id"].is_string());
    }

    #[test]
    fn test_closure_filter() {
        let filter = |e: &dyn TraceRecord| e.event_type() == "START";
        assert!(filter.matches(&TraceEvent::new("START")));
        assert!(!filter.matches(&TraceEvent::new("STOP")));
    }
}
