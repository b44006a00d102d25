//! NFC adapter and tag tracing

use crate::platform::{NfcPlatform, RegistrationSet};
use crate::tracer::formatter::hex_upper;
use crate::tracer::{NfcEvent, NfcOperation, TraceContext, Tracer, TracerCore};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

pub const TRACER_NAME: &str = "NFC_TRACER";

/// One record of an NDEF message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NdefRecord {
    /// Type name format, 3 bits
    pub tnf: u8,
    pub record_type: Vec<u8>,
    pub payload: Vec<u8>,
}

/// A tag as handed over by the reader callback
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TagInfo {
    pub id: Vec<u8>,
    pub tech_list: Vec<String>,
    /// NDEF content, `None` when the tag has none or it could not be read
    pub ndef_records: Option<Vec<NdefRecord>>,
}

pub struct NfcTracer {
    core: TracerCore,
    adapter: Option<Arc<dyn NfcPlatform>>,
    registrations: RegistrationSet,
    state_listener_active: AtomicBool,
}

impl NfcTracer {
    /// # Arguments
    ///
    /// * `adapter` - NFC adapter, `None` when the device has none
    /// * `context` - Configuration, encoder and sink to emit through
    pub fn new(adapter: Option<Arc<dyn NfcPlatform>>, context: TraceContext) -> Self {
        Self {
            core: TracerCore::new(TRACER_NAME, context),
            adapter,
            registrations: RegistrationSet::new(),
            state_listener_active: AtomicBool::new(false),
        }
    }

    pub fn is_nfc_available(&self) -> bool {
        self.adapter.is_some()
    }

    pub fn is_nfc_enabled(&self) -> bool {
        self.adapter.as_ref().is_some_and(|a| a.is_enabled())
    }

    fn accepting(&self) -> bool {
        self.core.is_running() && self.adapter.is_some() && self.core.config().is_enabled()
    }

    /// Adapter state broadcast
    pub fn on_adapter_state_changed(&self, state_code: i32) {
        if !self.accepting() || !self.state_listener_active.load(Ordering::Acquire) {
            return;
        }
        self.core.log_event(
            "NFC_STATE_CHANGE",
            &format!("NFC adapter state changed to: {}", adapter_state_name(state_code)),
        );
    }

    /// Reader callback: a tag entered the field
    pub fn on_tag_discovered(&self, tag: &TagInfo) {
        if !self.accepting() {
            return;
        }

        let started = Instant::now();
        let mut event = NfcEvent::new(NfcOperation::TagDiscovered);
        event.uid = Some(hex_upper(&tag.id));
        event.tag_type = Some(tag.tech_list.first().cloned().unwrap_or_else(|| "UNKNOWN".to_string()));
        event.ndef_message = tag.ndef_records.as_deref().map(format_ndef_message);
        event.operation_duration_ms = Some(started.elapsed().as_millis() as i64);

        self.core.log_record(Arc::new(event));
    }

    /// Outcome of writing to a tag
    pub fn on_tag_write(&self, tag_id: &[u8], success: bool) {
        if !self.accepting() {
            return;
        }

        let mut event = NfcEvent::new(NfcOperation::TagWrite);
        event.uid = Some(hex_upper(tag_id));
        event.set_data(if success { "Write successful" } else { "Write failed" });

        self.core.log_record(Arc::new(event));
    }
}

impl Tracer for NfcTracer {
    fn core(&self) -> &TracerCore {
        &self.core
    }

    fn acquire(&self) {
        let Some(adapter) = self.adapter.as_deref() else {
            self.core.log_event("ERROR", "NFC not available on this device");
            return;
        };

        let enabled = adapter.is_enabled();
        if !enabled {
            self.core.log_event("WARNING", "NFC is disabled");
        }

        match adapter.listen_adapter_state() {
            Ok(registration) => {
                self.registrations.add("NFC state receiver", registration);
                self.state_listener_active.store(true, Ordering::Release);
            }
            Err(e) => self.core.report_degraded("NFC state receiver", &e),
        }

        let state = if enabled { "ENABLED" } else { "DISABLED" };
        self.core.log_event("INFO", &format!("NFC adapter state: {}", state));
    }

    fn release(&self) {
        self.state_listener_active.store(false, Ordering::Release);
        self.registrations.release_all(TRACER_NAME);
    }
}

/// `Record i: TNF=n, Type=HEX, Payload=text` per record, joined by ` | `
pub fn format_ndef_message(records: &[NdefRecord]) -> String {
    records
        .iter()
        .enumerate()
        .map(|(i, r)| {
            format!(
                "Record {}: TNF={}, Type={}, Payload={}",
                i,
                r.tnf,
                hex_upper(&r.record_type),
                String::from_utf8_lossy(&r.payload)
            )
        })
        .collect::<Vec<_>>()
        .join(" | ")
}

pub fn adapter_state_name(code: i32) -> &'static str {
    match code {
        1 => "OFF",
        2 => "TURNING_ON",
        3 => "ON",
        4 => "TURNING_OFF",
        _ => "UNKNOWN",
    }
}
