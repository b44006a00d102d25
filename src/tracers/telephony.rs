//! Call, SMS and cellular network tracing

use crate::error::{Result, TraceError};
use crate::platform::{Registration, RegistrationSet, TelephonyPlatform};
use crate::tracer::{CallState, SmsDirection, TelephonyEvent, TraceContext, Tracer, TracerCore};
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::Arc;
use tracing::error;

pub const TRACER_NAME: &str = "TELEPHONY_TRACER";

/// Traces call state, signal strength and SMS traffic
///
/// Phone numbers never reach the log unmasked; only their last four digits are kept.
pub struct TelephonyTracer {
    core: TracerCore,
    platform: Option<Arc<dyn TelephonyPlatform>>,
    registrations: RegistrationSet,
    phone_state_active: AtomicBool,
    sms_active: AtomicBool,
    last_signal_level: AtomicI32,
}

impl TelephonyTracer {
    /// # Arguments
    ///
    /// * `platform` - Telephony service, `None` when the device has none
    /// * `context` - Configuration, encoder and sink to emit through
    pub fn new(platform: Option<Arc<dyn TelephonyPlatform>>, context: TraceContext) -> Self {
        Self {
            core: TracerCore::new(TRACER_NAME, context),
            platform,
            registrations: RegistrationSet::new(),
            phone_state_active: AtomicBool::new(false),
            sms_active: AtomicBool::new(false),
            last_signal_level: AtomicI32::new(-1),
        }
    }

    fn accepting(&self, capability: &AtomicBool) -> bool {
        self.core.is_running() && capability.load(Ordering::Acquire) && self.core.config().is_enabled()
    }

    /// Phone state callback: call state changed
    pub fn on_call_state_changed(&self, state_code: i32, phone_number: Option<&str>) {
        if !self.accepting(&self.phone_state_active) {
            return;
        }

        let mut event = TelephonyEvent::new("CALL_STATE_CHANGE");
        event.call_state = Some(CallState::from_code(state_code));
        event.phone_number = phone_number.filter(|n| !n.is_empty()).map(mask_phone_number);
        self.core.log_record(Arc::new(event));
    }

    /// Phone state callback: signal level changed. Repeats of the last level are dropped.
    pub fn on_signal_strength_changed(&self, level: i32, network_type_code: i32) {
        if !self.accepting(&self.phone_state_active) {
            return;
        }
        if self.last_signal_level.swap(level, Ordering::AcqRel) == level {
            return;
        }

        let mut event = TelephonyEvent::new("SIGNAL_STRENGTH_CHANGE");
        event.signal_strength = Some(level);
        event.network_type = Some(network_type_name(network_type_code).to_string());
        self.core.log_record(Arc::new(event));
    }

    pub fn on_sms_received(&self) {
        self.log_sms(SmsDirection::Inbound, "SMS received");
    }

    pub fn on_sms_sent(&self) {
        self.log_sms(SmsDirection::Outbound, "SMS sent");
    }

    fn log_sms(&self, direction: SmsDirection, data: &str) {
        if !self.accepting(&self.sms_active) {
            return;
        }

        let mut event = TelephonyEvent::new("SMS_EVENT");
        event.sms_direction = Some(direction);
        event.set_data(data);
        self.core.log_record(Arc::new(event));
    }

    fn log_telephony_info(&self, platform: &dyn TelephonyPlatform) {
        let dump = || -> Result<()> {
            self.core
                .log_event("INFO", &format!("Network operator: {}", platform.network_operator()?));
            self.core.log_event(
                "INFO",
                &format!("Network type: {}", network_type_name(platform.network_type()?)),
            );
            self.core
                .log_event("INFO", &format!("Phone type: {}", phone_type_name(platform.phone_type()?)));
            self.core
                .log_event("INFO", &format!("SIM state: {}", sim_state_name(platform.sim_state()?)));
            Ok(())
        };

        match dump() {
            Ok(()) => self.log_subscriptions(platform),
            Err(e @ TraceError::PermissionDenied(_)) => self
                .core
                .log_event("WARNING", &format!("Missing permissions for telephony info: {}", e)),
            Err(e) => error!(tracer = TRACER_NAME, "Error logging telephony info: {}", e),
        }
    }

    fn log_subscriptions(&self, platform: &dyn TelephonyPlatform) {
        match platform.active_subscriptions() {
            Ok(subscriptions) => {
                for info in subscriptions {
                    let number = info
                        .number
                        .as_deref()
                        .map(mask_phone_number)
                        .unwrap_or_else(|| "unset".to_string());
                    self.core.log_event(
                        "SUBSCRIPTION_INFO",
                        &format!(
                            "Carrier: {}, Slot: {}, Number: {}",
                            info.carrier_name, info.slot_index, number
                        ),
                    );
                }
            }
            Err(TraceError::PermissionDenied(_)) => {
                self.core.log_event("WARNING", "Missing permissions for subscription info")
            }
            Err(e) => error!(tracer = TRACER_NAME, "Error logging subscription info: {}", e),
        }
    }

    fn subscribe(
        &self,
        label: &'static str,
        flag: &AtomicBool,
        listen: impl FnOnce() -> Result<Box<dyn Registration>>,
    ) {
        match listen() {
            Ok(registration) => {
                self.registrations.add(label, registration);
                flag.store(true, Ordering::Release);
            }
            Err(e) => self.core.report_degraded(label, &e),
        }
    }
}

impl Tracer for TelephonyTracer {
    fn core(&self) -> &TracerCore {
        &self.core
    }

    fn acquire(&self) {
        let Some(platform) = self.platform.as_deref() else {
            self.core.log_event("ERROR", "Telephony service not available");
            return;
        };

        self.last_signal_level.store(-1, Ordering::Release);
        self.log_telephony_info(platform);
        self.subscribe("Phone state listener", &self.phone_state_active, || {
            platform.listen_phone_state()
        });
        self.subscribe("SMS receiver", &self.sms_active, || platform.listen_sms());
        self.core.log_event("INFO", "Telephony monitoring started");
    }

    fn release(&self) {
        self.phone_state_active.store(false, Ordering::Release);
        self.sms_active.store(false, Ordering::Release);
        self.registrations.release_all(TRACER_NAME);
    }
}

/// `***` followed by the last four characters; numbers of four or fewer become `***`.
pub fn mask_phone_number(number: &str) -> String {
    let chars: Vec<char> = number.chars().collect();
    if chars.len() <= 4 {
        return "***".to_string();
    }
    let last_four: String = chars[chars.len() - 4..].iter().collect();
    format!("***{}", last_four)
}

pub fn network_type_name(code: i32) -> &'static str {
    match code {
        1 => "GPRS",
        2 => "EDGE",
        3 => "UMTS",
        4 => "CDMA",
        5 => "EVDO_0",
        6 => "EVDO_A",
        8 => "HSDPA",
        9 => "HSUPA",
        10 => "HSPA",
        13 => "LTE",
        14 => "EHRPD",
        15 => "HSPAP",
        20 => "5G_NR",
        _ => "UNKNOWN",
    }
}

pub fn phone_type_name(code: i32) -> &'static str {
    match code {
        1 => "GSM",
        2 => "CDMA",
        3 => "SIP",
        _ => "NONE",
    }
}

pub fn sim_state_name(code: i32) -> &'static str {
    match code {
        1 => "ABSENT",
        2 => "PIN_REQUIRED",
        3 => "PUK_REQUIRED",
        4 => "NETWORK_LOCKED",
        5 => "READY",
        _ => "UNKNOWN",
    }
}
