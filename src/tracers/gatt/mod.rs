//! Bluetooth GATT operation tracing
//!
//! [`GattTracer`] renders every characteristic and descriptor operation under the
//! configured profile. The link telemetry (connection state, RSSI, MTU, PHY) and
//! voice operations live in the [`link`] and [`voice`] submodules as further
//! methods on the same tracer.
//!
//! Operations are filtered on all three identifiers: service, characteristic and
//! device. Link and voice operations carry no service, so only the device filter
//! applies to them.

pub mod link;
pub mod voice;

pub use link::ConnectionState;
pub use voice::{VoiceEventType, VoiceStreamEvent};

use crate::tracer::formatter::{bytes_to_hex, shorten_id, Field, FieldValue, OperationRecord};
use crate::tracer::{TraceContext, Tracer, TracerCore};
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use tracing::Level;

pub const TRACER_NAME: &str = "GATT_TRACER";

/// Traces GATT client operations for one or more remote devices
pub struct GattTracer {
    core: TracerCore,
    device_names: Mutex<HashMap<String, String>>,
}

/// Identifiers of one characteristic operation
struct GattTarget<'a> {
    device: &'a str,
    service: &'a str,
    characteristic: &'a str,
    descriptor: Option<&'a str>,
}

impl GattTracer {
    pub fn new(context: TraceContext) -> Self {
        Self {
            core: TracerCore::new(TRACER_NAME, context),
            device_names: Mutex::new(HashMap::new()),
        }
    }

    /// Remember a human-readable name for a device address
    pub fn update_device_context(&self, device_address: &str, device_name: &str) {
        self.device_names
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(device_address.to_uppercase(), device_name.to_string());
    }

    pub fn device_name(&self, device_address: &str) -> Option<String> {
        self.device_names
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&device_address.to_uppercase())
            .cloned()
    }

    fn traces_operation(&self, device: &str, service: &str, characteristic: &str) -> bool {
        self.core.is_running()
            && self
                .core
                .config()
                .should_trace(Some(service), Some(characteristic), Some(device))
    }

    fn traces_device(&self, device: &str) -> bool {
        let config = self.core.config();
        self.core.is_running() && config.is_enabled() && config.matches_device(Some(device))
    }

    /// A characteristic was read
    ///
    /// # Arguments
    ///
    /// * `device_address` - Remote device, e.g. `AA:BB:CC:DD:EE:FF`
    /// * `service_uuid` - Service the characteristic belongs to
    /// * `characteristic_uuid` - Characteristic that was read
    /// * `value` - Bytes returned by the remote device
    /// * `status` - GATT status code, 0 on success
    pub fn log_gatt_read(
        &self,
        device_address: &str,
        service_uuid: &str,
        characteristic_uuid: &str,
        value: &[u8],
        status: i32,
    ) {
        let target = GattTarget {
            device: device_address,
            service: service_uuid,
            characteristic: characteristic_uuid,
            descriptor: None,
        };
        self.log_operation("gatt_read", Level::INFO, "GATT READ", "READ", &target, value, Some(status));
    }

    /// A characteristic was written
    pub fn log_gatt_write(
        &self,
        device_address: &str,
        service_uuid: &str,
        characteristic_uuid: &str,
        value: &[u8],
        status: i32,
    ) {
        let target = GattTarget {
            device: device_address,
            service: service_uuid,
            characteristic: characteristic_uuid,
            descriptor: None,
        };
        self.log_operation("gatt_write", Level::INFO, "GATT WRITE", "WRITE", &target, value, Some(status));
    }

    /// The remote device notified a characteristic value. Notifications carry no status.
    pub fn log_gatt_notification(
        &self,
        device_address: &str,
        service_uuid: &str,
        characteristic_uuid: &str,
        value: &[u8],
    ) {
        let target = GattTarget {
            device: device_address,
            service: service_uuid,
            characteristic: characteristic_uuid,
            descriptor: None,
        };
        self.log_operation("gatt_notification", Level::INFO, "GATT NOTIFICATION", "NOTIFY", &target, value, None);
    }

    pub fn log_descriptor_read(
        &self,
        device_address: &str,
        service_uuid: &str,
        characteristic_uuid: &str,
        descriptor_uuid: &str,
        value: &[u8],
        status: i32,
    ) {
        let target = GattTarget {
            device: device_address,
            service: service_uuid,
            characteristic: characteristic_uuid,
            descriptor: Some(descriptor_uuid),
        };
        self.log_operation("descriptor_read", Level::DEBUG, "DESCRIPTOR READ", "READ", &target, value, Some(status));
    }

    pub fn log_descriptor_write(
        &self,
        device_address: &str,
        service_uuid: &str,
        characteristic_uuid: &str,
        descriptor_uuid: &str,
        value: &[u8],
        status: i32,
    ) {
        let target = GattTarget {
            device: device_address,
            service: service_uuid,
            characteristic: characteristic_uuid,
            descriptor: Some(descriptor_uuid),
        };
        self.log_operation(
            "descriptor_write",
            Level::DEBUG,
            "DESCRIPTOR WRITE",
            "WRITE",
            &target,
            value,
            Some(status),
        );
    }

    #[allow(clippy::too_many_arguments)]
    fn log_operation(
        &self,
        event_type: &str,
        level: Level,
        title: &str,
        operation: &'static str,
        target: &GattTarget<'_>,
        value: &[u8],
        status: Option<i32>,
    ) {
        if !self.traces_operation(target.device, target.service, target.characteristic) {
            return;
        }

        let hex = bytes_to_hex(Some(value));
        let compact = compact_line(operation, target, &hex, status);

        let mut fields = vec![
            Field::new("Device", "device_address", FieldValue::text(target.device)),
            Field::new("Service", "service_uuid", FieldValue::text(target.service)),
            Field::new("Characteristic", "characteristic_uuid", FieldValue::text(target.characteristic)),
        ];
        if let Some(descriptor) = target.descriptor {
            fields.push(Field::new("Descriptor", "descriptor_uuid", FieldValue::text(descriptor)));
        }
        fields.push(Field::structured_only("operation", FieldValue::text(operation)));
        let status_value = FieldValue::Integer(status.map(i64::from));
        fields.push(match status {
            Some(_) => Field::new("Status", "status", status_value),
            None => Field::structured_only("status", status_value),
        });
        fields.push(Field::new("Value", "value_hex", FieldValue::text(hex)));
        fields.push(Field::structured_only(
            "value_length",
            FieldValue::Integer(Some(value.len() as i64)),
        ));

        self.core.record_operation(event_type, level, |timestamp| {
            OperationRecord::new(title, timestamp).compact(compact).fields(fields)
        });
    }
}

impl Tracer for GattTracer {
    fn core(&self) -> &TracerCore {
        &self.core
    }

    fn acquire(&self) {
        let config = self.core.config();
        self.core.log_event(
            "INFO",
            &format!(
                "GATT tracer initialized (Profile: {}, Enabled: {})",
                config.profile(),
                config.is_enabled()
            ),
        );
    }
}

fn compact_line(operation: &str, target: &GattTarget<'_>, hex: &str, status: Option<i32>) -> String {
    let status = status.map(|s| format!(" (status={})", s)).unwrap_or_default();
    match target.descriptor {
        Some(descriptor) => format!(
            "DESC_{} {}: {}{} ({})",
            operation,
            shorten_id(Some(descriptor)),
            hex,
            status,
            target.device
        ),
        None => format!(
            "{} {}/{}: {}{} ({})",
            operation,
            shorten_id(Some(target.service)),
            shorten_id(Some(target.characteristic)),
            hex,
            status,
            target.device
        ),
    }
}
