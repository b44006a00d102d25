//! Tracer lifecycle and emission pipeline
//!
//! [`TracerCore`] holds everything a tracer shares with every other tracer: the
//! compare-and-swap lifecycle flag, the event log, the formatter and the
//! [`TraceContext`] (configuration, encoder and sink). Concrete tracers own a core,
//! implement [`Tracer`] by pointing at it, and supply acquisition/release hooks.

use super::event_store::{EventCallback, EventLog, SharedRecord, Snapshot};
use super::formatter::{format_timestamp, EventFormatter, Field, FieldValue, OperationRecord};
use super::tracer_events::{TraceEvent, TraceRecord};
use crate::config::TraceFilterConfig;
use crate::encoder::{SymbolicEncoder, DELIMITER_END, DELIMITER_FIELD, DELIMITER_START};
use crate::error::TraceError;
use crate::sink::{TraceSink, TracingSink};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn, Level};

/// Lifecycle state of a tracer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Idle,
    Running,
}

/// Common capability of every tracer variant
///
/// Implementors provide [`Tracer::core`] and, usually, the two hooks; `start`,
/// `stop`, `is_running` and `name` come from the shared core.
pub trait Tracer: Send + Sync {
    fn core(&self) -> &TracerCore;

    /// Subscribe to producers. Runs once per successful `start()`, after `START`.
    fn acquire(&self) {}

    /// Unsubscribe from producers. Runs once per successful `stop()`, before `STOP`.
    fn release(&self) {}

    fn name(&self) -> &str {
        self.core().name()
    }

    /// Start the tracer and acquire its producers.
    ///
    /// A `stop()` that lands while `acquire` is still running releases too early to
    /// see registrations made after it. Those are released again here once `acquire`
    /// returns, so a stopped tracer never keeps subscriptions alive.
    fn start(&self) {
        if self.core().start_with(|| self.acquire()) && !self.core().is_running() {
            debug!(tracer = %self.name(), "Stopped during acquisition, releasing late registrations");
            self.release();
        }
    }

    /// Stop the tracer and release its producers. `release` must be idempotent.
    fn stop(&self) {
        self.core().stop_with(|| self.release());
    }

    fn is_running(&self) -> bool {
        self.core().is_running()
    }

    fn state(&self) -> LifecycleState {
        self.core().state()
    }
}

/// Collaborators a tracer emits through
///
/// Cloning is cheap; tracers built from the same context share one configuration
/// and one sink.
#[derive(Clone)]
pub struct TraceContext {
    pub config: Arc<TraceFilterConfig>,
    pub encoder: SymbolicEncoder,
    pub sink: Arc<dyn TraceSink>,
}

impl TraceContext {
    pub fn new(config: TraceFilterConfig, sink: Arc<dyn TraceSink>) -> Self {
        Self {
            config: Arc::new(config),
            encoder: SymbolicEncoder::default(),
            sink,
        }
    }

    pub fn with_config(config: TraceFilterConfig) -> Self {
        Self::new(config, Arc::new(TracingSink))
    }

    pub fn with_encoder(mut self, encoder: SymbolicEncoder) -> Self {
        self.encoder = encoder;
        self
    }
}

impl Default for TraceContext {
    fn default() -> Self {
        Self::with_config(TraceFilterConfig::default())
    }
}

impl fmt::Debug for TraceContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TraceContext")
            .field("config", &self.config)
            .field("encoder", &self.encoder)
            .finish_non_exhaustive()
    }
}

/// Shared lifecycle and emission logic for tracers
pub struct TracerCore {
    name: String,
    context: TraceContext,
    formatter: EventFormatter,
    running: AtomicBool,
    events: EventLog,
}

impl TracerCore {
    /// Create a core in the `Idle` state
    ///
    /// # Arguments
    ///
    /// * `name` - Component name used in emitted lines and encoded headers
    /// * `context` - Configuration, encoder and sink to emit through
    pub fn new(name: impl Into<String>, context: TraceContext) -> Self {
        Self::with_callback(name, context, None)
    }

    /// Like [`TracerCore::new`], with a callback invoked for every appended record
    pub fn with_callback(
        name: impl Into<String>,
        context: TraceContext,
        on_append: Option<EventCallback>,
    ) -> Self {
        Self {
            name: name.into(),
            context,
            formatter: EventFormatter::new(),
            running: AtomicBool::new(false),
            events: EventLog::new(on_append),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn context(&self) -> &TraceContext {
        &self.context
    }

    pub fn config(&self) -> &TraceFilterConfig {
        &self.context.config
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn state(&self) -> LifecycleState {
        if self.is_running() {
            LifecycleState::Running
        } else {
            LifecycleState::Idle
        }
    }

    /// The log itself, for queries and explicit clearing
    pub fn events(&self) -> &EventLog {
        &self.events
    }

    /// Ordered copy of everything logged so far
    pub fn event_log(&self) -> Snapshot {
        self.events.snapshot()
    }

    pub fn clear_event_log(&self) {
        self.events.clear();
    }

    /// Transition `Idle -> Running`, record `START`, then run `acquire`.
    ///
    /// Returns false, with only a warning, when the tracer was already running.
    pub fn start_with(&self, acquire: impl FnOnce()) -> bool {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            warn!(tracer = %self.name, "{} already running", self.name);
            return false;
        }

        self.log_event("START", "Tracer started");
        acquire();
        true
    }

    /// Transition `Running -> Idle`, run `release`, then record `STOP`.
    ///
    /// Returns false, with only a warning, when the tracer was already idle.
    pub fn stop_with(&self, release: impl FnOnce()) -> bool {
        if self
            .running
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            warn!(tracer = %self.name, "{} not running", self.name);
            return false;
        }

        release();
        self.log_event("STOP", "Tracer stopped");
        true
    }

    /// Append a plain event and emit it rendered under the active profile.
    ///
    /// The log keeps `data` as given; only the emitted line carries the timestamp
    /// and, under `Structured`, the JSON envelope.
    pub fn log_event(&self, event_type: &str, data: &str) {
        let event = TraceEvent::with_data(event_type, data);
        let operation = OperationRecord::new(event_type, format_timestamp(event.timestamp()))
            .compact(data)
            .field(Field::new("Data", "data", FieldValue::text(data)));
        let line = self.render(&operation, event_type);

        self.events.append(Arc::new(event));
        self.emit(level_for(event_type), event_type, &line);
    }

    /// Record that a capability could not be acquired.
    ///
    /// Emits one `ERROR` or `WARNING` event depending on the cause.
    pub fn report_degraded(&self, capability: &str, err: &TraceError) {
        debug!(tracer = %self.name, capability, "Capability degraded: {}", err);
        self.log_event(err.severity(), &format!("{}: {}", capability, err));
    }

    /// Append a domain record and emit it rendered under the active profile
    pub fn log_record(&self, record: SharedRecord) {
        let event_type = record.event_type().to_string();
        let operation = OperationRecord::new(event_type.clone(), format_timestamp(record.timestamp()))
            .compact(format!("{}: {}", event_type, record.printable_summary()))
            .field(Field::new("Event ID", "event_id", FieldValue::text(record.event_id())))
            .fields(record.fields());

        let line = self.render(&operation, &event_type);

        self.events.append(record);
        self.emit(level_for(&event_type), &event_type, &line);
    }

    /// Render an operation under the active profile, then append and emit it.
    ///
    /// `build` receives the formatted capture time of the new event. The event's data
    /// is the rendered line, so the log and the sink see the same text.
    pub fn record_operation(
        &self,
        event_type: &str,
        level: Level,
        build: impl FnOnce(String) -> OperationRecord,
    ) {
        let mut event = TraceEvent::new(event_type);
        let operation = build(format_timestamp(event.timestamp()));
        let line = self.render(&operation, event_type);

        event.set_data(line.clone());
        self.events.append(Arc::new(event));
        self.emit(level, event_type, &line);
    }

    /// The whole log framed by the encoder delimiters, one record per line
    pub fn formatted_event_log(&self) -> String {
        let mut out = format!("{} {} EVENT LOG {}\n", DELIMITER_START, self.name, DELIMITER_START);
        for event in self.event_log().iter() {
            out.push_str(&format!(
                "{} {} - {}: {}\n",
                DELIMITER_FIELD,
                format_timestamp(event.timestamp()),
                event.event_type(),
                event.data()
            ));
        }
        out.push_str(DELIMITER_END);
        out
    }

    fn render(&self, operation: &OperationRecord, event_type: &str) -> String {
        self.formatter
            .render(self.config().profile(), operation)
            .into_line(event_type)
    }

    fn emit(&self, level: Level, event_type: &str, content: &str) {
        if self.config().symbolic_encoding() {
            let encoded = self.context.encoder.format_message(&self.name, event_type, content);
            self.context.sink.emit(level, &self.name, &encoded);
        } else {
            self.context.sink.emit(level, &self.name, content);
        }
    }
}

impl fmt::Debug for TracerCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TracerCore")
            .field("name", &self.name)
            .field("state", &self.state())
            .field("events", &self.events)
            .finish_non_exhaustive()
    }
}

fn level_for(event_type: &str) -> Level {
    match event_type {
        "ERROR" => Level::ERROR,
        "WARNING" => Level::WARN,
        "DEBUG" => Level::DEBUG,
        _ => Level::INFO,
    }
}
