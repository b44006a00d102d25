//! Tracer core: records, the event log, profile rendering and the lifecycle
//!
//! Every tracer in [`crate::tracers`] is built on the pieces in this module:
//!
//! - **TraceRecord**: trait for anything stored in the log, with an id, a timestamp,
//!   an event type and a flat data string
//! - **EventLog**: append-only, thread-safe log with an optional per-append callback
//! - **EventFormatter**: renders operations as verbose, compact or structured lines
//! - **TracerCore**: the `Idle`/`Running` lifecycle plus the emission pipeline
//!
//! # Usage Example
//!
//! ```rust,ignore
//! use glyphtrace::tracer::{TraceContext, Tracer};
//! use glyphtrace::tracers::GattTracer;
//!
//! let tracer = GattTracer::new(TraceContext::default());
//! tracer.start();
//! tracer.log_gatt_read("AA:BB:CC:DD:EE:FF", "180f", "2a19", &[0x64], 0);
//!
//! for event in tracer.core().event_log().iter() {
//!     println!("{}", event.printable_summary());
//! }
//! tracer.stop();
//! ```

pub mod event_store;
pub mod formatter;
pub mod tracer_events;
pub mod tracer_system;

pub use event_store::{EventCallback, EventLog, SharedRecord, Snapshot};
pub use formatter::EventFormatter;
pub use tracer_events::{
    BatteryStatus, CallState, EventFilterFn, GeoPoint, NfcEvent, NfcOperation, SmsDirection,
    TelemetrySample, TelephonyEvent, TraceEvent, TraceRecord,
};
pub use tracer_system::{LifecycleState, TraceContext, Tracer, TracerCore};
