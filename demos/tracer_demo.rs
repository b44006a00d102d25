//! Tracer demonstration.
//!
//! Runs every tracer against simulated producers and prints what was recorded:
//! - Telephony call and SMS callbacks, with phone numbers masked
//! - NFC adapter state and a tag read
//! - Periodic device telemetry from /proc
//! - GATT operations under all three output profiles
//!
//! Set `RUST_LOG=debug` to see the DEBUG-level lines and `TRACE_ENCODING=false` to
//! turn off the symbolic wrapper.

use glyphtrace::config::{Profile, SamplerSettings, TraceFilterConfig};
use glyphtrace::error::Result as TraceResult;
use glyphtrace::platform::{
    FnRegistration, NfcPlatform, ProcfsProbe, Registration, SubscriptionInfo, SystemProbe,
    TelephonyPlatform,
};
use glyphtrace::prelude::*;
use glyphtrace::tracers::{ConnectionState, NdefRecord, TagInfo, VoiceEventType};
use std::sync::Arc;
use std::time::Duration;

const DEVICE: &str = "AA:BB:CC:DD:EE:FF";
const BATTERY_SERVICE: &str = "0000180f-0000-1000-8000-00805f9b34fb";
const BATTERY_LEVEL: &str = "00002a19-0000-1000-8000-00805f9b34fb";

struct SimulatedTelephony;

impl TelephonyPlatform for SimulatedTelephony {
    fn network_operator(&self) -> TraceResult<String> {
        Ok("Demo Mobile".to_string())
    }

    fn network_type(&self) -> TraceResult<i32> {
        Ok(13)
    }

    fn phone_type(&self) -> TraceResult<i32> {
        Ok(1)
    }

    fn sim_state(&self) -> TraceResult<i32> {
        Ok(5)
    }

    fn active_subscriptions(&self) -> TraceResult<Vec<SubscriptionInfo>> {
        Ok(vec![SubscriptionInfo {
            carrier_name: "Demo Mobile".to_string(),
            slot_index: 0,
            number: Some("+15551234567".to_string()),
        }])
    }

    fn listen_phone_state(&self) -> TraceResult<Box<dyn Registration>> {
        Ok(FnRegistration::boxed(|| Ok(())))
    }

    fn listen_sms(&self) -> TraceResult<Box<dyn Registration>> {
        Ok(FnRegistration::boxed(|| Ok(())))
    }
}

struct SimulatedNfc;

impl NfcPlatform for SimulatedNfc {
    fn is_enabled(&self) -> bool {
        true
    }

    fn listen_adapter_state(&self) -> TraceResult<Box<dyn Registration>> {
        Ok(FnRegistration::boxed(|| Ok(())))
    }
}

fn banner(title: &str) {
    println!();
    println!("{}", "=".repeat(80));
    println!("{}", title);
    println!("{}", "=".repeat(80));
}

fn print_log(tracer: &dyn Tracer) {
    let events = tracer.core().event_log();
    println!("{} recorded {} events", tracer.name(), events.len());
    for summary in tracer.core().events().last_n_summaries(5, None) {
        println!("  {}", summary);
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = TraceFilterConfig::from_env();
    let context = TraceContext::new(config.clone(), Arc::new(TracingSink));

    banner("Telephony");
    let platform: Arc<dyn TelephonyPlatform> = Arc::new(SimulatedTelephony);
    let telephony = TelephonyTracer::new(Some(platform), context.clone());
    telephony.start();
    telephony.on_call_state_changed(1, Some("+15551234567"));
    telephony.on_signal_strength_changed(3, 13);
    telephony.on_signal_strength_changed(3, 13);
    telephony.on_sms_received();
    telephony.stop();
    print_log(&telephony);

    banner("NFC");
    let adapter: Arc<dyn NfcPlatform> = Arc::new(SimulatedNfc);
    let nfc = NfcTracer::new(Some(adapter), context.clone());
    nfc.start();
    nfc.on_tag_discovered(&TagInfo {
        id: vec![0x04, 0xA2, 0x3B, 0x11],
        tech_list: vec!["NfcA".to_string(), "Ndef".to_string()],
        ndef_records: Some(vec![NdefRecord {
            tnf: 1,
            record_type: b"T".to_vec(),
            payload: b"\x02enhello".to_vec(),
        }]),
    });
    nfc.on_tag_write(&[0x04, 0xA2, 0x3B, 0x11], true);
    nfc.stop();
    print_log(&nfc);

    banner("Telemetry");
    let probe: Arc<dyn SystemProbe> = Arc::new(ProcfsProbe::new());
    let telemetry = TelemetryTracer::new(Some(probe), None, context.clone()).with_settings(SamplerSettings {
        interval: Duration::from_millis(500),
        shutdown_grace: Duration::from_secs(1),
    });
    telemetry.start();
    tokio::time::sleep(Duration::from_millis(1200)).await;
    telemetry.on_battery_changed(42, 100, 2);
    tokio::task::block_in_place(|| telemetry.stop());
    print_log(&telemetry);

    for profile in [Profile::Verbose, Profile::Compact, Profile::Structured] {
        banner(&format!("GATT ({})", profile));
        let profiled = TraceFilterConfig::builder()
            .set_profile(profile)
            .set_symbolic_encoding(config.symbolic_encoding())
            .build();
        let gatt = GattTracer::new(TraceContext::new(profiled, Arc::new(TracingSink)));
        gatt.start();
        gatt.update_device_context(DEVICE, "Demo Band");
        gatt.log_connection_state(DEVICE, None, ConnectionState::Connected);
        gatt.log_mtu_change(DEVICE, 247);
        gatt.log_gatt_read(DEVICE, BATTERY_SERVICE, BATTERY_LEVEL, &[0x64], 0);
        gatt.log_gatt_notification(DEVICE, BATTERY_SERVICE, BATTERY_LEVEL, &[0x63]);
        gatt.log_voice_utterance(DEVICE, "utt-1", "what time is it", VoiceEventType::Complete);
        gatt.log_voice_recognition(DEVICE, "what time is it", 0.93);
        gatt.stop();
        print_log(&gatt);
    }

    banner("Formatted log");
    println!("{}", telephony.core().formatted_event_log());

    Ok(())
}
