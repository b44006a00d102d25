//! Trace filter configuration
//!
//! A [`TraceFilterConfig`] decides, per event, whether tracing applies and how the
//! event is rendered. It is assembled with [`TraceFilterConfigBuilder`] and never
//! changes afterwards, so one instance can be shared read-only between any number
//! of tracers and threads behind an `Arc`.
//!
//! # Examples
//!
//! ```
//! use glyphtrace::config::{Profile, TraceFilterConfig};
//!
//! let config = TraceFilterConfig::builder()
//!     .add_service_filter("0000180F-0000-1000-8000-00805F9B34FB")
//!     .add_device_filter("aa:bb:cc:dd:ee:ff")
//!     .set_profile(Profile::Verbose)
//!     .build();
//!
//! assert!(config.should_trace(
//!     Some("0000180f-0000-1000-8000-00805f9b34fb"),
//!     Some("00002a19-0000-1000-8000-00805f9b34fb"),
//!     Some("AA:BB:CC:DD:EE:FF"),
//! ));
//! assert!(!config.should_trace(Some("00001800"), None, Some("AA:BB:CC:DD:EE:FF")));
//! ```

use crate::error::TraceError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

pub const ENV_ENABLED: &str = "TRACE_ENABLED";
pub const ENV_PROFILE: &str = "TRACE_PROFILE";
pub const ENV_ENCODING: &str = "TRACE_ENCODING";
pub const ENV_SERVICE_FILTERS: &str = "TRACE_SERVICE_FILTERS";
pub const ENV_CHANNEL_FILTERS: &str = "TRACE_CHANNEL_FILTERS";
pub const ENV_DEVICE_FILTERS: &str = "TRACE_DEVICE_FILTERS";

/// Output rendering shape
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Profile {
    /// Multi-line, one labelled line per field
    Verbose,
    /// Single line with abbreviated identifiers
    #[default]
    Compact,
    /// Flat key/value object for machine parsing
    #[serde(alias = "json")]
    Structured,
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Profile::Verbose => "VERBOSE",
            Profile::Compact => "COMPACT",
            Profile::Structured => "STRUCTURED",
        };
        f.write_str(name)
    }
}

impl FromStr for Profile {
    type Err = TraceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "verbose" => Ok(Profile::Verbose),
            "compact" => Ok(Profile::Compact),
            "structured" | "json" => Ok(Profile::Structured),
            _ => Err(TraceError::ConfigError(format!("unknown profile '{}'", s))),
        }
    }
}

/// Immutable filter and rendering settings shared by tracers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceFilterConfig {
    service_filters: HashSet<String>,
    channel_filters: HashSet<String>,
    device_filters: HashSet<String>,
    profile: Profile,
    enabled: bool,
    symbolic_encoding: bool,
}

impl TraceFilterConfig {
    pub fn builder() -> TraceFilterConfigBuilder {
        TraceFilterConfigBuilder::default()
    }

    /// Whether an operation on the given identifiers should be traced.
    ///
    /// An empty filter set matches everything, including absent identifiers.
    pub fn should_trace(
        &self,
        service_id: Option<&str>,
        channel_id: Option<&str>,
        device_id: Option<&str>,
    ) -> bool {
        self.enabled
            && self.matches_service(service_id)
            && self.matches_channel(channel_id)
            && self.matches_device(device_id)
    }

    pub fn matches_service(&self, service_id: Option<&str>) -> bool {
        matches_set(&self.service_filters, service_id, normalize_channel_id)
    }

    pub fn matches_channel(&self, channel_id: Option<&str>) -> bool {
        matches_set(&self.channel_filters, channel_id, normalize_channel_id)
    }

    pub fn matches_device(&self, device_id: Option<&str>) -> bool {
        matches_set(&self.device_filters, device_id, normalize_device_id)
    }

    pub fn profile(&self) -> Profile {
        self.profile
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Whether emitted lines pass through the symbolic encoder
    pub fn symbolic_encoding(&self) -> bool {
        self.symbolic_encoding
    }

    /// Read the configuration from `TRACE_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from a key lookup using the `TRACE_*` variable names.
    ///
    /// Filter lists are comma separated. Invalid values are reported with a warning
    /// and leave the default in place.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut builder = Self::builder();

        if let Some(raw) = lookup(ENV_ENABLED) {
            match parse_flag(&raw) {
                Some(enabled) => builder = builder.set_enabled(enabled),
                None => warn!(variable = ENV_ENABLED, value = raw.as_str(), "Ignoring invalid flag"),
            }
        }

        if let Some(raw) = lookup(ENV_PROFILE) {
            match raw.parse::<Profile>() {
                Ok(profile) => builder = builder.set_profile(profile),
                Err(e) => warn!(variable = ENV_PROFILE, "Ignoring profile: {}", e),
            }
        }

        if let Some(raw) = lookup(ENV_ENCODING) {
            match parse_flag(&raw) {
                Some(encoding) => builder = builder.set_symbolic_encoding(encoding),
                None => warn!(variable = ENV_ENCODING, value = raw.as_str(), "Ignoring invalid flag"),
            }
        }

        if let Some(raw) = lookup(ENV_SERVICE_FILTERS) {
            for id in split_list(&raw) {
                builder = builder.add_service_filter(id);
            }
        }
        if let Some(raw) = lookup(ENV_CHANNEL_FILTERS) {
            for id in split_list(&raw) {
                builder = builder.add_channel_filter(id);
            }
        }
        if let Some(raw) = lookup(ENV_DEVICE_FILTERS) {
            for id in split_list(&raw) {
                builder = builder.add_device_filter(id);
            }
        }

        builder.build()
    }
}

impl Default for TraceFilterConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Chainable builder for [`TraceFilterConfig`]
#[derive(Debug, Clone)]
pub struct TraceFilterConfigBuilder {
    service_filters: HashSet<String>,
    channel_filters: HashSet<String>,
    device_filters: HashSet<String>,
    profile: Profile,
    enabled: bool,
    symbolic_encoding: bool,
}

impl Default for TraceFilterConfigBuilder {
    fn default() -> Self {
        Self {
            service_filters: HashSet::new(),
            channel_filters: HashSet::new(),
            device_filters: HashSet::new(),
            profile: Profile::Compact,
            enabled: true,
            symbolic_encoding: true,
        }
    }
}

impl TraceFilterConfigBuilder {
    /// Allow a service identifier (stored lower-cased)
    pub fn add_service_filter(mut self, service_id: impl AsRef<str>) -> Self {
        self.service_filters.insert(normalize_channel_id(service_id.as_ref()));
        self
    }

    /// Allow a channel identifier (stored lower-cased)
    pub fn add_channel_filter(mut self, channel_id: impl AsRef<str>) -> Self {
        self.channel_filters.insert(normalize_channel_id(channel_id.as_ref()));
        self
    }

    /// Allow a device identifier (stored upper-cased)
    pub fn add_device_filter(mut self, device_id: impl AsRef<str>) -> Self {
        self.device_filters.insert(normalize_device_id(device_id.as_ref()));
        self
    }

    pub fn set_profile(mut self, profile: Profile) -> Self {
        self.profile = profile;
        self
    }

    pub fn set_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn set_symbolic_encoding(mut self, symbolic_encoding: bool) -> Self {
        self.symbolic_encoding = symbolic_encoding;
        self
    }

    pub fn build(self) -> TraceFilterConfig {
        TraceFilterConfig {
            service_filters: self.service_filters,
            channel_filters: self.channel_filters,
            device_filters: self.device_filters,
            profile: self.profile,
            enabled: self.enabled,
            symbolic_encoding: self.symbolic_encoding,
        }
    }
}

/// Timing of the periodic telemetry sampler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplerSettings {
    /// Fixed period between samples; the first sample is taken immediately
    pub interval: Duration,
    /// How long `stop()` waits for the sampler to wind down before aborting it
    pub shutdown_grace: Duration,
}

impl Default for SamplerSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            shutdown_grace: Duration::from_secs(1),
        }
    }
}

fn matches_set(set: &HashSet<String>, key: Option<&str>, normalize: fn(&str) -> String) -> bool {
    if set.is_empty() {
        return true;
    }
    key.is_some_and(|k| set.contains(&normalize(k)))
}

fn normalize_channel_id(id: &str) -> String {
    id.to_lowercase()
}

fn normalize_device_id(id: &str) -> String {
    id.to_uppercase()
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn split_list(raw: &str) -> impl Iterator<Item = &str> {
    raw.split(',').map(str::trim).filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = TraceFilterConfig::default();
        assert!(config.is_enabled());
        assert!(config.symbolic_encoding());
        assert_eq!(config.profile(), Profile::Compact);
    }

    #[test]
    fn test_empty_filters_trace_everything() {
        let config = TraceFilterConfig::default();
        assert!(config.should_trace(Some("svc"), Some("chr"), Some("dev")));
        assert!(config.should_trace(Some("anything"), Some("else"), Some("11:22")));
        assert!(config.should_trace(None, None, None));
    }

    #[test]
    fn test_service_filter_excludes_other_services() {
        let config = TraceFilterConfig::builder().add_service_filter("0000180f").build();
        assert!(config.should_trace(Some("0000180f"), Some("x"), Some("y")));
        assert!(!config.should_trace(Some("00001800"), Some("x"), Some("y")));
    }

    #[test]
    fn test_disabled_config_traces_nothing() {
        let config = TraceFilterConfig::builder().set_enabled(false).build();
        assert!(!config.should_trace(Some("svc"), Some("chr"), Some("dev")));
        assert!(!config.is_enabled());
    }

    #[test]
    fn test_case_normalization() {
        let config = TraceFilterConfig::builder()
            .add_service_filter("0000180F-ABCD")
            .add_channel_filter("00002A19-ABCD")
            .add_device_filter("aa:bb:cc:dd:ee:ff")
            .build();

        assert!(config.matches_service(Some("0000180f-abcd")));
        assert!(config.matches_service(Some("0000180F-ABCD")));
        assert!(config.matches_channel(Some("00002a19-abcd")));
        assert!(config.matches_device(Some("AA:BB:CC:DD:EE:FF")));
        assert!(config.matches_device(Some("aa:bb:cc:dd:ee:ff")));
    }

    #[test]
    fn test_absent_identifier_only_matches_empty_set() {
        let config = TraceFilterConfig::builder().add_device_filter("AA:BB").build();
        assert!(!config.matches_device(None));
        assert!(config.matches_service(None));
        assert!(config.matches_channel(None));
        assert!(!config.should_trace(Some("svc"), Some("chr"), None));
    }

    #[test]
    fn test_profile_parsing() {
        assert_eq!("verbose".parse::<Profile>().unwrap(), Profile::Verbose);
        assert_eq!("COMPACT".parse::<Profile>().unwrap(), Profile::Compact);
        assert_eq!("json".parse::<Profile>().unwrap(), Profile::Structured);
        assert_eq!(" Structured ".parse::<Profile>().unwrap(), Profile::Structured);
        assert!("xml".parse::<Profile>().is_err());
    }

    #[test]
    fn test_profile_display() {
        assert_eq!(Profile::Verbose.to_string(), "VERBOSE");
        assert_eq!(Profile::Structured.to_string(), "STRUCTURED");
    }

    #[test]
    fn test_profile_deserializes_json_alias() {
        let profile: Profile = serde_json::from_str("\"json\"").unwrap();
        assert_eq!(profile, Profile::Structured);
    }

    #[test]
    fn test_from_lookup() {
        let vars: HashMap<&str, &str> = HashMap::from([
            (ENV_ENABLED, "true"),
            (ENV_PROFILE, "verbose"),
            (ENV_ENCODING, "off"),
            (ENV_SERVICE_FILTERS, "0000180F, 00001800"),
            (ENV_DEVICE_FILTERS, "aa:bb:cc:dd:ee:ff,"),
        ]);
        let config = TraceFilterConfig::from_lookup(|key| vars.get(key).map(|v| v.to_string()));

        assert!(config.is_enabled());
        assert!(!config.symbolic_encoding());
        assert_eq!(config.profile(), Profile::Verbose);
        assert!(config.matches_service(Some("0000180f")));
        assert!(config.matches_service(Some("00001800")));
        assert!(!config.matches_service(Some("0000180a")));
        assert!(config.matches_channel(Some("anything")));
        assert!(config.matches_device(Some("AA:BB:CC:DD:EE:FF")));
    }

    #[test]
    fn test_from_lookup_ignores_invalid_values() {
        let vars: HashMap<&str, &str> =
            HashMap::from([(ENV_ENABLED, "maybe"), (ENV_PROFILE, "xml")]);
        let config = TraceFilterConfig::from_lookup(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config, TraceFilterConfig::default());
    }

    #[test]
    fn test_sampler_settings_default() {
        let settings = SamplerSettings::default();
        assert_eq!(settings.interval, Duration::from_secs(5));
        assert_eq!(settings.shutdown_grace, Duration::from_secs(1));
    }
}
