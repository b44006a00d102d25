//! Linux `/proc` backed system probe

use super::{MemoryInfo, NetworkInfo, Registration, SystemProbe};
use crate::error::{Result, TraceError};
use std::fs;
use std::path::PathBuf;

/// Reads CPU and memory figures from procfs.
///
/// There is no battery or network source under `/proc`, so those capabilities are
/// reported as unavailable.
#[derive(Debug, Clone)]
pub struct ProcfsProbe {
    root: PathBuf,
}

impl ProcfsProbe {
    pub fn new() -> Self {
        Self::with_root("/proc")
    }

    /// Probe a procfs mounted somewhere other than `/proc`
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl Default for ProcfsProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemProbe for ProcfsProbe {
    fn cpu_usage(&self) -> Result<f32> {
        let stat = fs::read_to_string(self.root.join("stat"))?;
        parse_cpu_usage(&stat)
    }

    fn memory(&self) -> Result<MemoryInfo> {
        let meminfo = fs::read_to_string(self.root.join("meminfo"))?;
        parse_meminfo(&meminfo)
    }

    fn network(&self) -> Result<Option<NetworkInfo>> {
        Ok(None)
    }

    fn listen_battery(&self) -> Result<Box<dyn Registration>> {
        Err(TraceError::CapabilityUnavailable("battery receiver".to_string()))
    }
}

/// Busy share since boot from the aggregate `cpu` line: (total - idle) / total.
pub fn parse_cpu_usage(stat: &str) -> Result<f32> {
    let line = stat
        .lines()
        .find(|l| l.starts_with("cpu "))
        .ok_or_else(|| TraceError::SamplerError("no aggregate cpu line in stat".to_string()))?;

    let values = line
        .split_whitespace()
        .skip(1)
        .map(|v| v.parse::<u64>())
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| TraceError::SamplerError(format!("invalid cpu counter: {}", e)))?;

    let idle = *values
        .get(3)
        .ok_or_else(|| TraceError::SamplerError("cpu line has no idle counter".to_string()))?;
    let total: u64 = values.iter().sum();

    if total == 0 {
        return Ok(0.0);
    }
    Ok((total.saturating_sub(idle) as f32 / total as f32) * 100.0)
}

/// `MemTotal` and `MemAvailable`, converted from kB to bytes
pub fn parse_meminfo(meminfo: &str) -> Result<MemoryInfo> {
    let field = |name: &str| -> Result<u64> {
        meminfo
            .lines()
            .find_map(|l| l.strip_prefix(name))
            .and_then(|rest| rest.trim_start_matches(':').split_whitespace().next())
            .and_then(|kb| kb.parse::<u64>().ok())
            .map(|kb| kb * 1024)
            .ok_or_else(|| TraceError::SamplerError(format!("{} missing from meminfo", name)))
    };

    Ok(MemoryInfo {
        total: field("MemTotal")?,
        available: field("MemAvailable")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const STAT: &str = "cpu  100 0 100 700 100 0 0 0 0 0\ncpu0 50 0 50 350 50 0 0 0 0 0\nintr 1 2 3\n";

    const MEMINFO: &str = "MemTotal:        8000000 kB\nMemFree:         1000000 kB\nMemAvailable:    3000000 kB\n";

    #[test]
    fn test_parse_cpu_usage() {
        let usage = parse_cpu_usage(STAT).unwrap();
        assert!((usage - 30.0).abs() < 0.001);
    }

    #[test]
    fn test_parse_cpu_usage_all_zero() {
        assert_eq!(parse_cpu_usage("cpu  0 0 0 0\n").unwrap(), 0.0);
    }

    #[test]
    fn test_parse_cpu_usage_rejects_garbage() {
        assert!(parse_cpu_usage("intr 1 2 3\n").is_err());
        assert!(parse_cpu_usage("cpu  1 x 3 4\n").is_err());
        assert!(parse_cpu_usage("cpu  1 2\n").is_err());
    }

    #[test]
    fn test_parse_meminfo() {
        let info = parse_meminfo(MEMINFO).unwrap();
        assert_eq!(info.total, 8_000_000 * 1024);
        assert_eq!(info.available, 3_000_000 * 1024);
        assert_eq!(info.used(), 5_000_000 * 1024);
    }

    #[test]
    fn test_parse_meminfo_missing_field() {
        let err = parse_meminfo("MemTotal: 10 kB\n").unwrap_err();
        assert!(err.to_string().contains("MemAvailable"));
    }

    #[test]
    fn test_probe_reads_from_root() {
        let dir = std::env::temp_dir().join(format!("glyphtrace-procfs-{}", uuid::Uuid::new_v4()));
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("stat"), STAT).unwrap();
        fs::write(dir.join("meminfo"), MEMINFO).unwrap();

        let probe = ProcfsProbe::with_root(&dir);
        assert!((probe.cpu_usage().unwrap() - 30.0).abs() < 0.001);
        assert_eq!(probe.memory().unwrap().total, 8_000_000 * 1024);
        assert!(probe.network().unwrap().is_none());
        assert!(matches!(probe.listen_battery(), Err(TraceError::CapabilityUnavailable(_))));

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_probe_missing_files() {
        let probe = ProcfsProbe::with_root("/nonexistent/glyphtrace");
        assert!(matches!(probe.cpu_usage(), Err(TraceError::IoError(_))));
    }
}
