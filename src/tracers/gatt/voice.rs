//! Voice operations carried over GATT

use super::GattTracer;
use crate::tracer::formatter::{Field, FieldValue, OperationRecord};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::Level;

/// Progress of a spoken utterance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VoiceEventType {
    Start,
    Progress,
    Complete,
    Error,
    Cancelled,
}

impl VoiceEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            VoiceEventType::Start => "START",
            VoiceEventType::Progress => "PROGRESS",
            VoiceEventType::Complete => "COMPLETE",
            VoiceEventType::Error => "ERROR",
            VoiceEventType::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for VoiceEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Audio stream lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VoiceStreamEvent {
    Started,
    DataReceived,
    BufferFull,
    Stopped,
    Error,
}

impl VoiceStreamEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            VoiceStreamEvent::Started => "STARTED",
            VoiceStreamEvent::DataReceived => "DATA_RECEIVED",
            VoiceStreamEvent::BufferFull => "BUFFER_FULL",
            VoiceStreamEvent::Stopped => "STOPPED",
            VoiceStreamEvent::Error => "ERROR",
        }
    }
}

impl fmt::Display for VoiceStreamEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl GattTracer {
    pub fn log_voice_utterance(
        &self,
        device_address: &str,
        utterance_id: &str,
        text: &str,
        event: VoiceEventType,
    ) {
        if !self.traces_device(device_address) {
            return;
        }

        // `event_type` is reserved for the line discriminator.
        self.core.record_operation("voice_utterance", Level::INFO, |timestamp| {
            OperationRecord::new("Voice Utterance", timestamp)
                .compact(format!("Voice {}: \"{}\" [{}] ({})", event, text, utterance_id, device_address))
                .field(Field::new("Device", "device_address", FieldValue::text(device_address)))
                .field(Field::new("Event", "utterance_event", FieldValue::text(event.as_str())))
                .field(Field::new("Utterance ID", "utterance_id", FieldValue::text(utterance_id)))
                .field(Field::new("Text", "text", FieldValue::text(text)))
        });
    }

    /// A voice command arrived together with its audio
    pub fn log_voice_command(&self, device_address: &str, command: &str, audio: &[u8]) {
        if !self.traces_device(device_address) {
            return;
        }

        let size = audio.len();
        self.core.record_operation("voice_command", Level::INFO, |timestamp| {
            OperationRecord::new("Voice Command Received", timestamp)
                .compact(format!("Voice Command: {} ({} bytes) ({})", command, size, device_address))
                .field(Field::new("Device", "device_address", FieldValue::text(device_address)))
                .field(Field::new("Command", "command", FieldValue::text(command)))
                .field(
                    Field::new("Audio Data Size", "audio_data_size", FieldValue::Integer(Some(size as i64)))
                        .with_unit(" bytes"),
                )
        });
    }

    /// Speech recognition result; `confidence` is a fraction in `0.0..=1.0`
    pub fn log_voice_recognition(&self, device_address: &str, recognized_text: &str, confidence: f32) {
        if !self.traces_device(device_address) {
            return;
        }

        let percent = confidence * 100.0;
        self.core.record_operation("voice_recognition", Level::INFO, |timestamp| {
            OperationRecord::new("Voice Recognition", timestamp)
                .compact(format!(
                    "Voice Recognition: \"{}\" ({:.1}%) ({})",
                    recognized_text, percent, device_address
                ))
                .field(Field::new("Device", "device_address", FieldValue::text(device_address)))
                .field(Field::new("Text", "recognized_text", FieldValue::text(recognized_text)))
                .field(Field::verbose_only("Confidence", FieldValue::text(format!("{:.2}%", percent))))
                .field(Field::structured_only(
                    "confidence",
                    FieldValue::Decimal(Some(f64::from(confidence))),
                ))
        });
    }

    pub fn log_voice_stream(&self, device_address: &str, event: VoiceStreamEvent, bytes_processed: usize) {
        if !self.traces_device(device_address) {
            return;
        }

        self.core.record_operation("voice_stream", Level::DEBUG, |timestamp| {
            OperationRecord::new("Voice Stream", timestamp)
                .compact(format!("Stream {}: {} bytes ({})", event, bytes_processed, device_address))
                .field(Field::new("Device", "device_address", FieldValue::text(device_address)))
                .field(Field::new("Event", "event", FieldValue::text(event.as_str())))
                .field(Field::new(
                    "Bytes Processed",
                    "bytes_processed",
                    FieldValue::Integer(Some(bytes_processed as i64)),
                ))
        });
    }
}
