//! Event tracing with symbolic encoding for device producers
//!
//! Tracers observe a producer (telephony, NFC, device telemetry, Bluetooth GATT),
//! append typed records to an in-memory log and emit each event as a line through a
//! [`sink::TraceSink`], optionally wrapped by the [`encoder::SymbolicEncoder`].

pub mod config;
pub mod encoder;
pub mod error;
pub mod platform;
pub mod sink;
pub mod tracer;
pub mod tracers;

pub use error::{Result, TraceError};

/// Prelude module for common imports
pub mod prelude {
    pub use crate::config::{Profile, TraceFilterConfig};
    pub use crate::error::{Result, TraceError};
    pub use crate::sink::{MemorySink, TraceSink, TracingSink};
    pub use crate::tracer::{TraceContext, TraceRecord, Tracer};
    pub use crate::tracers::{GattTracer, NfcTracer, TelemetryTracer, TelephonyTracer};
}
