//! Link-layer telemetry: connection state, RSSI, MTU and PHY

use super::GattTracer;
use crate::tracer::formatter::{Field, FieldValue, OperationRecord, UNSET};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::Level;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Disconnecting,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "DISCONNECTED",
            ConnectionState::Connecting => "CONNECTING",
            ConnectionState::Connected => "CONNECTED",
            ConnectionState::Disconnecting => "DISCONNECTING",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl GattTracer {
    /// Connection state changed.
    ///
    /// Without an explicit `device_name` the name registered through
    /// [`GattTracer::update_device_context`] is used.
    pub fn log_connection_state(&self, device_address: &str, device_name: Option<&str>, state: ConnectionState) {
        if !self.traces_device(device_address) {
            return;
        }

        let name = device_name
            .map(str::to_string)
            .or_else(|| self.device_name(device_address))
            .unwrap_or_else(|| UNSET.to_string());

        self.core.record_operation("connection_state", Level::INFO, |timestamp| {
            OperationRecord::new("Connection State Change", timestamp)
                .compact(format!("{}: {} ({})", state, name, device_address))
                .field(Field::verbose_only(
                    "Device",
                    FieldValue::text(format!("{} ({})", name, device_address)),
                ))
                .field(Field::structured_only("device_address", FieldValue::text(device_address)))
                .field(Field::structured_only("device_name", FieldValue::text(name)))
                .field(Field::new("State", "state", FieldValue::text(state.as_str())))
        });
    }

    /// Received signal strength, in dBm
    pub fn log_rssi(&self, device_address: &str, rssi: i32) {
        if !self.traces_device(device_address) {
            return;
        }

        self.core.record_operation("rssi", Level::DEBUG, |timestamp| {
            OperationRecord::new("RSSI Update", timestamp)
                .compact(format!("RSSI: {} dBm ({})", rssi, device_address))
                .field(Field::new("Device", "device_address", FieldValue::text(device_address)))
                .field(
                    Field::new("Signal Strength", "rssi_dbm", FieldValue::Integer(Some(i64::from(rssi))))
                        .with_unit(" dBm"),
                )
        });
    }

    pub fn log_mtu_change(&self, device_address: &str, mtu: i32) {
        if !self.traces_device(device_address) {
            return;
        }

        self.core.record_operation("mtu_change", Level::INFO, |timestamp| {
            OperationRecord::new("MTU Changed", timestamp)
                .compact(format!("MTU: {} ({})", mtu, device_address))
                .field(Field::new("Device", "device_address", FieldValue::text(device_address)))
                .field(Field::new("MTU", "mtu_bytes", FieldValue::Integer(Some(i64::from(mtu)))).with_unit(" bytes"))
        });
    }

    pub fn log_phy_change(&self, device_address: &str, tx_phy: i32, rx_phy: i32) {
        if !self.traces_device(device_address) {
            return;
        }

        self.core.record_operation("phy_change", Level::INFO, |timestamp| {
            OperationRecord::new("PHY Changed", timestamp)
                .compact(format!("PHY: TX={} RX={} ({})", tx_phy, rx_phy, device_address))
                .field(Field::new("Device", "device_address", FieldValue::text(device_address)))
                .field(Field::new("TX PHY", "tx_phy", FieldValue::Integer(Some(i64::from(tx_phy)))))
                .field(Field::new("RX PHY", "rx_phy", FieldValue::Integer(Some(i64::from(rx_phy)))))
        });
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::{plain, started, DEVICE};
    use super::*;
    use crate::config::{Profile, TraceFilterConfig};
    use serde_json::Value;

    #[test]
    fn test_connection_state_compact_uses_context_name() {
        let (tracer, sink) = started(plain(Profile::Compact));
        tracer.update_device_context(DEVICE, "Heart Monitor");

        tracer.log_connection_state(DEVICE, None, ConnectionState::Connected);

        assert!(sink.lines()[0]
            .line
            .ends_with("CONNECTED: Heart Monitor (AA:BB:CC:DD:EE:FF)"));
    }

    #[test]
    fn test_connection_state_structured() {
        let (tracer, sink) = started(plain(Profile::Structured));

        tracer.log_connection_state(DEVICE, Some("Scale"), ConnectionState::Disconnecting);

        let parsed: Value = serde_json::from_str(&sink.lines()[0].line).unwrap();
        assert_eq!(parsed["device_address"], DEVICE);
        assert_eq!(parsed["device_name"], "Scale");
        assert_eq!(parsed["state"], "DISCONNECTING");
        assert_eq!(parsed["event_type"], "connection_state");
    }

    #[test]
    fn test_connection_state_verbose_unknown_name() {
        let (tracer, sink) = started(plain(Profile::Verbose));

        tracer.log_connection_state(DEVICE, None, ConnectionState::Connecting);

        let line = &sink.lines()[0].line;
        let lines: Vec<&str> = line.lines().collect();
        assert!(lines[0].ends_with("] Connection State Change"));
        assert_eq!(lines[1], "  Device: unset (AA:BB:CC:DD:EE:FF)");
        assert_eq!(lines[2], "  State: CONNECTING");
    }

    #[test]
    fn test_rssi_levels_and_formats() {
        let (tracer, sink) = started(plain(Profile::Verbose));

        tracer.log_rssi(DEVICE, -67);

        let emitted = &sink.lines()[0];
        assert_eq!(emitted.level, Level::DEBUG);
        assert!(emitted.line.contains("  Signal Strength: -67 dBm"));
    }

    #[test]
    fn test_mtu_and_phy_compact() {
        let (tracer, sink) = started(plain(Profile::Compact));

        tracer.log_mtu_change(DEVICE, 247);
        tracer.log_phy_change(DEVICE, 2, 1);

        let lines = sink.lines();
        assert!(lines[0].line.ends_with("MTU: 247 (AA:BB:CC:DD:EE:FF)"));
        assert!(lines[1].line.ends_with("PHY: TX=2 RX=1 (AA:BB:CC:DD:EE:FF)"));
    }

    #[test]
    fn test_mtu_structured_keys() {
        let (tracer, sink) = started(plain(Profile::Structured));

        tracer.log_mtu_change(DEVICE, 185);

        let parsed: Value = serde_json::from_str(&sink.lines()[0].line).unwrap();
        assert_eq!(parsed["mtu_bytes"], 185);
        assert_eq!(parsed["event_type"], "mtu_change");
    }

    #[test]
    fn test_device_filter_applies_to_link_events() {
        let config = TraceFilterConfig::builder()
            .add_device_filter("11:22:33:44:55:66")
            .set_symbolic_encoding(false)
            .build();
        let (tracer, sink) = started(config);

        tracer.log_rssi(DEVICE, -50);
        tracer.log_rssi("11:22:33:44:55:66", -50);

        assert_eq!(sink.lines().len(), 1);
        assert!(sink.lines()[0].line.contains("11:22:33:44:55:66"));
    }

    #[test]
    fn test_service_filter_does_not_block_link_events() {
        let config = TraceFilterConfig::builder()
            .add_service_filter("0000180f-0000-1000-8000-00805f9b34fb")
            .set_symbolic_encoding(false)
            .build();
        let (tracer, sink) = started(config);

        tracer.log_mtu_change(DEVICE, 23);

        assert_eq!(sink.lines().len(), 1);
    }
}
