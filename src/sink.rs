//! Line sinks for rendered trace output
//!
//! A tracer hands every finished line to a [`TraceSink`] together with its level and
//! the tracer's component name. [`TracingSink`] forwards lines into the `tracing`
//! ecosystem; [`MemorySink`] keeps them in memory.

use std::sync::{Mutex, PoisonError};
use tracing::{debug, error, info, trace, warn, Level};

/// Destination for rendered trace lines
pub trait TraceSink: Send + Sync {
    /// Emit one finished line. Must not block for long and must not panic.
    fn emit(&self, level: Level, component: &str, line: &str);
}

/// Sink that forwards every line to `tracing` with a `component` field
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl TraceSink for TracingSink {
    fn emit(&self, level: Level, component: &str, line: &str) {
        match level {
            Level::ERROR => error!(component, "{}", line),
            Level::WARN => warn!(component, "{}", line),
            Level::INFO => info!(component, "{}", line),
            Level::DEBUG => debug!(component, "{}", line),
            _ => trace!(component, "{}", line),
        }
    }
}

/// A line captured by [`MemorySink`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmittedLine {
    pub level: Level,
    pub component: String,
    pub line: String,
}

/// Sink that records lines in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    lines: Mutex<Vec<EmittedLine>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of every line emitted so far, in emission order
    pub fn lines(&self) -> Vec<EmittedLine> {
        self.lines.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn clear(&self) {
        self.lines.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }
}

impl TraceSink for MemorySink {
    fn emit(&self, level: Level, component: &str, line: &str) {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(EmittedLine {
                level,
                component: component.to_string(),
                line: line.to_string(),
            });
    }
}
