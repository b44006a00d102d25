//! Concrete tracers, one per producer family

pub mod gatt;
pub mod nfc;
pub mod telemetry;
pub mod telephony;

pub use gatt::{ConnectionState, GattTracer, VoiceEventType, VoiceStreamEvent};
pub use nfc::{NdefRecord, NfcTracer, TagInfo};
pub use telemetry::TelemetryTracer;
pub use telephony::TelephonyTracer;
