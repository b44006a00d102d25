//! Periodic device telemetry
//!
//! The telemetry tracer is the only tracer with its own execution context: while
//! running it owns one tokio task that takes a [`TelemetrySample`] at a fixed period.
//! Sensor and battery callbacks only update the latest readings; the sampler folds
//! them into every sample together with CPU, memory and network figures from the
//! [`SystemProbe`].

use crate::config::SamplerSettings;
use crate::error::TraceError;
use crate::platform::{NetworkTransport, RegistrationSet, SensorKind, SensorPlatform, SystemProbe};
use crate::tracer::{BatteryStatus, TelemetrySample, TraceContext, Tracer, TracerCore};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio::runtime::{Handle, RuntimeFlavor};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub const TRACER_NAME: &str = "TELEMETRY_TRACER";

const SHUTDOWN_POLL: Duration = Duration::from_millis(5);

#[derive(Debug, Clone, Copy, PartialEq)]
struct BatteryReading {
    level: Option<i32>,
    status: BatteryStatus,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct SensorReadings {
    accelerometer: [f32; 3],
    gyroscope: [f32; 3],
}

/// State shared between the tracer and its sampler task
struct TelemetryState {
    core: TracerCore,
    probe: Option<Arc<dyn SystemProbe>>,
    accelerometer_active: AtomicBool,
    gyroscope_active: AtomicBool,
    battery_active: AtomicBool,
    sensors: Mutex<SensorReadings>,
    battery: Mutex<BatteryReading>,
}

impl TelemetryState {
    fn sensor_flag(&self, kind: SensorKind) -> &AtomicBool {
        match kind {
            SensorKind::Accelerometer => &self.accelerometer_active,
            SensorKind::Gyroscope => &self.gyroscope_active,
        }
    }

    fn accepting(&self) -> bool {
        self.core.is_running() && self.core.config().is_enabled()
    }

    fn collect(&self) {
        if !self.accepting() {
            return;
        }

        let mut sample = TelemetrySample::new();

        if let Some(probe) = self.probe.as_deref() {
            match probe.cpu_usage() {
                Ok(usage) => sample.cpu_usage = Some(usage),
                Err(e) => warn!(tracer = TRACER_NAME, "Error reading CPU usage: {}", e),
            }
            match probe.memory() {
                Ok(memory) => {
                    sample.memory_used = Some(memory.used());
                    sample.memory_total = Some(memory.total);
                }
                Err(e) => warn!(tracer = TRACER_NAME, "Error getting memory info: {}", e),
            }
            match probe.network() {
                Ok(Some(network)) => {
                    sample.wifi_connected = network.connected && network.transport == NetworkTransport::Wifi;
                    sample.cellular_connected =
                        network.connected && network.transport == NetworkTransport::Cellular;
                    sample.network_type = Some(network.type_name);
                }
                Ok(None) => {}
                Err(e) => warn!(tracer = TRACER_NAME, "Error getting network info: {}", e),
            }
        }

        let battery = *self.battery.lock().unwrap_or_else(PoisonError::into_inner);
        sample.battery_level = battery.level;
        sample.battery_status = battery.status;

        let sensors = *self.sensors.lock().unwrap_or_else(PoisonError::into_inner);
        sample.accelerometer = sensors.accelerometer;
        sample.gyroscope = sensors.gyroscope;

        self.core.log_record(Arc::new(sample));
    }
}

struct Sampler {
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

/// Traces device telemetry: periodic samples plus battery updates
pub struct TelemetryTracer {
    state: Arc<TelemetryState>,
    sensors: Option<Arc<dyn SensorPlatform>>,
    settings: SamplerSettings,
    runtime: Option<Handle>,
    registrations: RegistrationSet,
    sampler: Mutex<Option<Sampler>>,
}

impl TelemetryTracer {
    /// # Arguments
    ///
    /// * `probe` - Source of CPU, memory, network and battery data
    /// * `sensors` - Motion sensors, `None` when the device has none
    /// * `context` - Configuration, encoder and sink to emit through
    pub fn new(
        probe: Option<Arc<dyn SystemProbe>>,
        sensors: Option<Arc<dyn SensorPlatform>>,
        context: TraceContext,
    ) -> Self {
        Self {
            state: Arc::new(TelemetryState {
                core: TracerCore::new(TRACER_NAME, context),
                probe,
                accelerometer_active: AtomicBool::new(false),
                gyroscope_active: AtomicBool::new(false),
                battery_active: AtomicBool::new(false),
                sensors: Mutex::new(SensorReadings::default()),
                battery: Mutex::new(BatteryReading {
                    level: None,
                    status: BatteryStatus::Unknown,
                }),
            }),
            sensors,
            settings: SamplerSettings::default(),
            runtime: None,
            registrations: RegistrationSet::new(),
            sampler: Mutex::new(None),
        }
    }

    pub fn with_settings(mut self, settings: SamplerSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Run the sampler on this runtime instead of the one current at `start()`
    pub fn with_runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// Sensor callback: record the latest reading of a motion sensor
    pub fn on_sensor_changed(&self, kind: SensorKind, values: [f32; 3]) {
        if !self.state.accepting() || !self.state.sensor_flag(kind).load(Ordering::Acquire) {
            return;
        }

        let mut sensors = self.state.sensors.lock().unwrap_or_else(PoisonError::into_inner);
        match kind {
            SensorKind::Accelerometer => sensors.accelerometer = values,
            SensorKind::Gyroscope => sensors.gyroscope = values,
        }
    }

    /// Battery broadcast: raw level, scale and status code
    pub fn on_battery_changed(&self, level: i32, scale: i32, status_code: i32) {
        if !self.state.accepting() || !self.state.battery_active.load(Ordering::Acquire) {
            return;
        }

        let reading = BatteryReading {
            level: battery_percent(level, scale),
            status: BatteryStatus::from_code(status_code),
        };
        *self.state.battery.lock().unwrap_or_else(PoisonError::into_inner) = reading;

        let level = reading
            .level
            .map(|l| format!("{}%", l))
            .unwrap_or_else(|| "unset".to_string());
        self.state.core.log_event(
            "BATTERY_UPDATE",
            &format!("Level: {}, Status: {}", level, reading.status.as_str()),
        );
    }

    /// Take one sample immediately, outside the periodic schedule
    pub fn sample_now(&self) {
        self.state.collect();
    }

    pub fn is_sampling(&self) -> bool {
        self.sampler
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|s| !s.task.is_finished())
    }

    fn register_sensor(&self, sensors: &dyn SensorPlatform, kind: SensorKind) {
        let core = &self.state.core;
        if !sensors.has_sensor(kind) {
            core.log_event("WARNING", &format!("{} not available", kind.as_str()));
            return;
        }

        match sensors.listen(kind) {
            Ok(registration) => {
                self.registrations.add(kind.as_str(), registration);
                self.state.sensor_flag(kind).store(true, Ordering::Release);
                core.log_event("INFO", &format!("{} registered", kind.as_str()));
            }
            Err(e) => core.report_degraded(kind.as_str(), &e),
        }
    }

    fn start_sampler(&self) {
        let runtime = self.runtime.clone().or_else(|| Handle::try_current().ok());
        let Some(runtime) = runtime else {
            self.state
                .core
                .log_event("WARNING", "No async runtime available, periodic telemetry disabled");
            return;
        };
        if self.settings.interval.is_zero() {
            self.state.core.report_degraded(
                "Periodic sampler",
                &TraceError::SamplerError("sampling interval must be greater than zero".to_string()),
            );
            return;
        }

        let (shutdown, shutdown_rx) = oneshot::channel();
        let task = runtime.spawn(run_sampler(Arc::clone(&self.state), self.settings.interval, shutdown_rx));
        *self.sampler.lock().unwrap_or_else(PoisonError::into_inner) = Some(Sampler { shutdown, task });

        self.state.core.log_event(
            "INFO",
            &format!("Telemetry collection started ({:?} interval)", self.settings.interval),
        );
    }

    /// Signal the sampler, wait up to the grace period, then abort it.
    ///
    /// On a current-thread runtime the sampler cannot run while this thread waits,
    /// so it is aborted right after the signal.
    fn stop_sampler(&self) {
        let Some(sampler) = self.sampler.lock().unwrap_or_else(PoisonError::into_inner).take() else {
            return;
        };

        // The receiver is gone if the task already ended; nothing left to signal.
        let _ = sampler.shutdown.send(());

        if matches!(Handle::try_current().map(|h| h.runtime_flavor()), Ok(RuntimeFlavor::CurrentThread)) {
            debug!(tracer = TRACER_NAME, "Current-thread runtime, aborting sampler without waiting");
            sampler.task.abort();
            return;
        }

        let deadline = Instant::now() + self.settings.shutdown_grace;
        while !sampler.task.is_finished() && Instant::now() < deadline {
            std::thread::sleep(SHUTDOWN_POLL);
        }

        if !sampler.task.is_finished() {
            warn!(tracer = TRACER_NAME, "Sampler did not stop within {:?}, aborting", self.settings.shutdown_grace);
            sampler.task.abort();
        }
    }
}

impl Tracer for TelemetryTracer {
    fn core(&self) -> &TracerCore {
        &self.state.core
    }

    fn acquire(&self) {
        match self.sensors.as_deref() {
            Some(sensors) => {
                self.register_sensor(sensors, SensorKind::Accelerometer);
                self.register_sensor(sensors, SensorKind::Gyroscope);
            }
            None => self.state.core.log_event("WARNING", "Sensor service not available"),
        }

        match self.state.probe.as_deref() {
            Some(probe) => match probe.listen_battery() {
                Ok(registration) => {
                    self.registrations.add("Battery receiver", registration);
                    self.state.battery_active.store(true, Ordering::Release);
                }
                Err(e) => self.state.core.report_degraded("Battery receiver", &e),
            },
            None => self.state.core.log_event("ERROR", "System probe not available"),
        }

        self.start_sampler();
    }

    fn release(&self) {
        self.state.accelerometer_active.store(false, Ordering::Release);
        self.state.gyroscope_active.store(false, Ordering::Release);
        self.state.battery_active.store(false, Ordering::Release);
        self.registrations.release_all(TRACER_NAME);
        self.stop_sampler();
    }
}

async fn run_sampler(state: Arc<TelemetryState>, period: Duration, mut shutdown: oneshot::Receiver<()>) {
    info!(tracer = TRACER_NAME, "Sampler started");
    let mut ticker = tokio::time::interval(period);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = ticker.tick() => state.collect(),
        }
    }

    debug!(tracer = TRACER_NAME, "Sampler stopped");
}

/// Charge in percent from a raw level and scale; `None` when the scale is unusable.
pub fn battery_percent(level: i32, scale: i32) -> Option<i32> {
    if scale <= 0 || level < 0 {
        return None;
    }
    Some(((level as f32 / scale as f32) * 100.0) as i32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TraceFilterConfig;
    use crate::error::{Result, TraceError};
    use crate::platform::{FnRegistration, MemoryInfo, NetworkInfo, Registration};
    use crate::sink::MemorySink;
    use crate::tracer::{LifecycleState, TraceRecord};

    struct FakeProbe {
        battery: bool,
    }

    impl SystemProbe for FakeProbe {
        fn cpu_usage(&self) -> Result<f32> {
            Ok(42.5)
        }

        fn memory(&self) -> Result<MemoryInfo> {
            Ok(MemoryInfo {
                total: 8_000,
                available: 3_000,
            })
        }

        fn network(&self) -> Result<Option<NetworkInfo>> {
            Ok(Some(NetworkInfo {
                type_name: "WIFI".to_string(),
                transport: NetworkTransport::Wifi,
                connected: true,
            }))
        }

        fn listen_battery(&self) -> Result<Box<dyn Registration>> {
            if !self.battery {
                return Err(TraceError::CapabilityUnavailable("battery receiver".to_string()));
            }
            Ok(FnRegistration::boxed(|| Ok(())))
        }
    }

    struct FakeSensors {
        gyroscope: bool,
    }

    impl SensorPlatform for FakeSensors {
        fn has_sensor(&self, kind: SensorKind) -> bool {
            kind == SensorKind::Accelerometer || self.gyroscope
        }

        fn listen(&self, _kind: SensorKind) -> Result<Box<dyn Registration>> {
            Ok(FnRegistration::boxed(|| Ok(())))
        }
    }

    fn context() -> TraceContext {
        TraceContext::new(
            TraceFilterConfig::builder().set_symbolic_encoding(false).build(),
            Arc::new(MemorySink::new()),
        )
    }

    fn tracer(battery: bool, gyroscope: bool) -> TelemetryTracer {
        TelemetryTracer::new(
            Some(Arc::new(FakeProbe { battery })),
            Some(Arc::new(FakeSensors { gyroscope })),
            context(),
        )
    }

    fn samples(tracer: &TelemetryTracer) -> usize {
        tracer
            .core()
            .events()
            .count_events(None, None, Some(&|e: &dyn TraceRecord| e.event_type() == TelemetrySample::EVENT_TYPE))
    }

    #[test]
    fn test_battery_percent() {
        assert_eq!(battery_percent(50, 100), Some(50));
        assert_eq!(battery_percent(1, 3), Some(33));
        assert_eq!(battery_percent(50, 0), None);
        assert_eq!(battery_percent(-1, 100), None);
    }

    #[test]
    fn test_start_without_runtime_warns() {
        let tracer = tracer(true, true);
        tracer.start();

        let data: Vec<String> = tracer.core().event_log().iter().map(|e| e.data().to_string()).collect();
        assert!(data.contains(&"Accelerometer registered".to_string()));
        assert!(data.contains(&"Gyroscope registered".to_string()));
        assert!(data.contains(&"No async runtime available, periodic telemetry disabled".to_string()));
        assert!(!tracer.is_sampling());
        assert!(tracer.is_running());
    }

    #[test]
    fn test_sample_now_collects_everything() {
        let tracer = tracer(true, true);
        tracer.start();

        tracer.on_sensor_changed(SensorKind::Accelerometer, [0.0, 0.5, 9.75]);
        tracer.on_sensor_changed(SensorKind::Gyroscope, [1.0, 2.0, 3.0]);
        tracer.on_battery_changed(80, 100, 2);
        tracer.sample_now();

        let log = tracer.core().event_log();
        let battery = log.iter().find(|e| e.event_type() == "BATTERY_UPDATE").unwrap();
        assert_eq!(battery.data(), "Level: 80%, Status: CHARGING");

        let summary = log.last().unwrap().printable_summary();
        assert!(summary.contains("cpu_usage=42.5"));
        assert!(summary.contains("memory_used=5000"));
        assert!(summary.contains("memory_total=8000"));
        assert!(summary.contains("battery_level=80"));
        assert!(summary.contains("battery_status=CHARGING"));
        assert!(summary.contains("network_type=WIFI"));
        assert!(summary.contains("wifi_connected=true"));
        assert!(summary.contains("cellular_connected=false"));
        assert!(summary.contains("accelerometer=[0, 0.5, 9.75]"));
        assert!(summary.contains("gyroscope=[1, 2, 3]"));
        assert!(summary.contains("location=unset"));
    }

    #[test]
    fn test_missing_gyroscope_warns_and_ignores_readings() {
        let tracer = tracer(true, false);
        tracer.start();

        let warnings: Vec<String> = tracer
            .core()
            .event_log()
            .iter()
            .filter(|e| e.event_type() == "WARNING")
            .map(|e| e.data().to_string())
            .collect();
        assert!(warnings.contains(&"Gyroscope not available".to_string()));

        tracer.on_sensor_changed(SensorKind::Gyroscope, [1.0, 1.0, 1.0]);
        tracer.sample_now();
        let summary = tracer.core().event_log().last().unwrap().printable_summary();
        assert!(summary.contains("gyroscope=[0, 0, 0]"));
    }

    #[test]
    fn test_missing_battery_degrades() {
        let tracer = tracer(false, true);
        tracer.start();

        assert_eq!(tracer.state(), LifecycleState::Running);
        let errors = tracer
            .core()
            .events()
            .count_events(None, None, Some(&|e: &dyn TraceRecord| e.event_type() == "ERROR"));
        assert_eq!(errors, 1);

        let before = tracer.core().events().len();
        tracer.on_battery_changed(50, 100, 3);
        assert_eq!(tracer.core().events().len(), before);

        tracer.sample_now();
        assert_eq!(samples(&tracer), 1);
    }

    #[test]
    fn test_no_probe_still_samples_sensors() {
        let tracer = TelemetryTracer::new(None, Some(Arc::new(FakeSensors { gyroscope: true })), context());
        tracer.start();
        tracer.sample_now();

        let summary = tracer.core().event_log().last().unwrap().printable_summary();
        assert!(summary.contains("cpu_usage=unset"));
        assert!(summary.contains("battery_level=unset"));
    }

    #[test]
    fn test_callbacks_dropped_when_idle() {
        let tracer = tracer(true, true);

        tracer.on_battery_changed(50, 100, 3);
        tracer.sample_now();

        assert!(tracer.core().event_log().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_periodic_sampler_runs_and_stops() {
        let tracer = tracer(true, true).with_settings(SamplerSettings {
            interval: Duration::from_millis(20),
            shutdown_grace: Duration::from_millis(500),
        });

        tracer.start();
        assert!(tracer.is_sampling());
        tokio::time::sleep(Duration::from_millis(150)).await;

        tracer.stop();
        assert!(!tracer.is_sampling());
        let taken = samples(&tracer);
        assert!(taken >= 2, "expected at least two samples, got {}", taken);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(samples(&tracer), taken);

        let log = tracer.core().event_log();
        assert_eq!(log.last().unwrap().event_type(), "STOP");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_zero_interval_reports_sampler_error() {
        let tracer = tracer(true, true).with_settings(SamplerSettings {
            interval: Duration::ZERO,
            shutdown_grace: Duration::from_millis(500),
        });

        tracer.start();
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(tracer.is_running());
        assert!(!tracer.is_sampling());
        let log = tracer.core().event_log();
        let error = log.iter().find(|e| e.event_type() == "ERROR").unwrap();
        assert_eq!(
            error.data(),
            "Periodic sampler: Sampler error: sampling interval must be greater than zero"
        );
        assert!(!log.iter().any(|e| e.data().starts_with("Telemetry collection started")));

        tracer.sample_now();
        assert_eq!(samples(&tracer), 1);
        tracer.stop();
    }

    #[tokio::test]
    async fn test_stop_on_current_thread_runtime_returns_promptly() {
        let tracer = tracer(true, true).with_settings(SamplerSettings {
            interval: Duration::from_millis(10),
            shutdown_grace: Duration::from_millis(800),
        });

        tracer.start();
        assert!(tracer.is_sampling());
        tokio::time::sleep(Duration::from_millis(30)).await;

        let began = Instant::now();
        tracer.stop();
        let elapsed = began.elapsed();

        assert!(elapsed < Duration::from_millis(200), "stop took {:?}", elapsed);
        assert!(!tracer.is_sampling());
        assert!(samples(&tracer) >= 1);

        let taken = samples(&tracer);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(samples(&tracer), taken);
        assert_eq!(tracer.core().event_log().last().unwrap().event_type(), "STOP");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_restart_spawns_new_sampler() {
        let tracer = tracer(true, true).with_settings(SamplerSettings {
            interval: Duration::from_millis(10),
            shutdown_grace: Duration::from_millis(500),
        });

        tracer.start();
        tracer.stop();
        tracer.start();
        assert!(tracer.is_sampling());
        tracer.stop();
        assert!(!tracer.is_sampling());
    }

    #[test]
    fn test_explicit_runtime_handle() {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
            .unwrap();

        let tracer = tracer(true, true)
            .with_settings(SamplerSettings {
                interval: Duration::from_millis(10),
                shutdown_grace: Duration::from_millis(500),
            })
            .with_runtime(runtime.handle().clone());

        tracer.start();
        assert!(tracer.is_sampling());
        std::thread::sleep(Duration::from_millis(50));
        tracer.stop();

        assert!(samples(&tracer) >= 1);
    }
}
