//! Collaborator interfaces for event producers
//!
//! Tracers never talk to hardware themselves. At start they ask a platform
//! collaborator to begin delivering callbacks (each subscription is handed back as
//! a [`Registration`]), and the host wires those callbacks to the tracer's public
//! `on_*` methods. At stop every registration is released again.

pub mod procfs;

pub use procfs::ProcfsProbe;

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, PoisonError};
use tracing::{debug, error};

/// A live subscription to a producer
pub trait Registration: Send {
    /// Stop delivering callbacks. Called at most once.
    fn unregister(self: Box<Self>) -> Result<()>;
}

/// Registration backed by a closure
pub struct FnRegistration<F>(F);

impl<F> FnRegistration<F>
where
    F: FnOnce() -> Result<()> + Send + 'static,
{
    pub fn boxed(release: F) -> Box<dyn Registration> {
        Box::new(Self(release))
    }
}

impl<F> Registration for FnRegistration<F>
where
    F: FnOnce() -> Result<()> + Send,
{
    fn unregister(self: Box<Self>) -> Result<()> {
        (self.0)()
    }
}

/// The registrations a tracer currently holds
#[derive(Default)]
pub struct RegistrationSet {
    entries: Mutex<Vec<(&'static str, Box<dyn Registration>)>>,
}

impl RegistrationSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, label: &'static str, registration: Box<dyn Registration>) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((label, registration));
    }

    /// Unregister everything, newest first.
    ///
    /// Failures are logged and skipped so the remaining registrations still get
    /// released.
    pub fn release_all(&self, tracer: &str) {
        let entries = std::mem::take(&mut *self.entries.lock().unwrap_or_else(PoisonError::into_inner));
        for (label, registration) in entries.into_iter().rev() {
            match registration.unregister() {
                Ok(()) => debug!(tracer, registration = label, "Unregistered"),
                Err(e) => error!(tracer, registration = label, "Error unregistering {}: {}", label, e),
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// An active SIM subscription
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionInfo {
    pub carrier_name: String,
    pub slot_index: i32,
    pub number: Option<String>,
}

/// Radio and telephony services
///
/// State getters return the platform's integer codes; the tracer owns the tables
/// that turn them into names.
pub trait TelephonyPlatform: Send + Sync {
    fn network_operator(&self) -> Result<String>;

    fn network_type(&self) -> Result<i32>;

    fn phone_type(&self) -> Result<i32>;

    fn sim_state(&self) -> Result<i32>;

    fn active_subscriptions(&self) -> Result<Vec<SubscriptionInfo>> {
        Ok(Vec::new())
    }

    /// Deliver call state and signal strength changes
    fn listen_phone_state(&self) -> Result<Box<dyn Registration>>;

    /// Deliver inbound and outbound SMS notifications
    fn listen_sms(&self) -> Result<Box<dyn Registration>>;
}

/// NFC adapter
pub trait NfcPlatform: Send + Sync {
    fn is_enabled(&self) -> bool;

    /// Deliver adapter state changes
    fn listen_adapter_state(&self) -> Result<Box<dyn Registration>>;
}

/// Motion sensors sampled by the telemetry tracer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SensorKind {
    Accelerometer,
    Gyroscope,
}

impl SensorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SensorKind::Accelerometer => "Accelerometer",
            SensorKind::Gyroscope => "Gyroscope",
        }
    }
}

pub trait SensorPlatform: Send + Sync {
    fn has_sensor(&self, kind: SensorKind) -> bool;

    fn listen(&self, kind: SensorKind) -> Result<Box<dyn Registration>>;
}

/// Memory figures in bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryInfo {
    pub total: u64,
    pub available: u64,
}

impl MemoryInfo {
    pub fn used(&self) -> u64 {
        self.total.saturating_sub(self.available)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NetworkTransport {
    Wifi,
    Cellular,
    Other,
}

/// The active network connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkInfo {
    pub type_name: String,
    pub transport: NetworkTransport,
    pub connected: bool,
}

/// Host metrics read on every telemetry sample
pub trait SystemProbe: Send + Sync {
    /// CPU busy share in percent
    fn cpu_usage(&self) -> Result<f32>;

    fn memory(&self) -> Result<MemoryInfo>;

    /// `None` when no network is active
    fn network(&self) -> Result<Option<NetworkInfo>>;

    /// Deliver battery level changes
    fn listen_battery(&self) -> Result<Box<dyn Registration>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TraceError;
    use std::sync::Arc;

    fn recording(order: &Arc<Mutex<Vec<&'static str>>>, label: &'static str) -> Box<dyn Registration> {
        let order = Arc::clone(order);
        FnRegistration::boxed(move || {
            order.lock().unwrap().push(label);
            Ok(())
        })
    }

    #[test]
    fn test_release_all_newest_first() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let set = RegistrationSet::new();
        set.add("phone_state", recording(&order, "phone_state"));
        set.add("sms", recording(&order, "sms"));

        set.release_all("TEST_TRACER");

        assert_eq!(*order.lock().unwrap(), vec!["sms", "phone_state"]);
        assert!(set.is_empty());
    }

    #[test]
    fn test_release_all_continues_after_failure() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let set = RegistrationSet::new();
        set.add("first", recording(&order, "first"));
        set.add(
            "broken",
            FnRegistration::boxed(|| Err(TraceError::RegistrationError("receiver not registered".to_string()))),
        );

        set.release_all("TEST_TRACER");

        assert_eq!(*order.lock().unwrap(), vec!["first"]);
        assert_eq!(set.len(), 0);
    }

    #[test]
    fn test_memory_used() {
        let info = MemoryInfo {
            total: 8_000,
            available: 3_000,
        };
        assert_eq!(info.used(), 5_000);

        let odd = MemoryInfo { total: 1, available: 2 };
        assert_eq!(odd.used(), 0);
    }
}
