//! Host platform detection

use rae_core::{OsFamily, PlatformInfo, PlatformProbe};
use std::collections::HashSet;

/// Memory assumed when it cannot be read
const FALLBACK_TOTAL_GB: f64 = 8.0;
const FALLBACK_AVAILABLE_GB: f64 = 4.0;
const FALLBACK_CPU_COUNT: usize = 1;

/// Get the number of available CPU cores.
pub fn num_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(FALLBACK_CPU_COUNT)
}

/// `(total_gb, available_gb)` from `/proc/meminfo` text
#[must_use]
pub fn parse_meminfo(text: &str) -> Option<(f64, f64)> {
    let field = |name: &str| {
        text.lines()
            .find(|l| l.starts_with(name))
            .and_then(|l| l[name.len()..].split_whitespace().next())
            .and_then(|v| v.parse::<u64>().ok())
    };

    let total_kb = field("MemTotal:")?;
    let available_kb = field("MemAvailable:").or_else(|| field("MemFree:"))?;

    #[allow(clippy::cast_precision_loss)]
    let to_gb = |kb: u64| kb as f64 / (1024.0 * 1024.0);
    Some((to_gb(total_kb), to_gb(available_kb)))
}

/// Physical core count from `/proc/cpuinfo` text (unique physical id / core id pairs)
#[must_use]
pub fn parse_physical_cores(text: &str) -> Option<usize> {
    let mut cores = HashSet::new();
    let mut physical = "0";
    for line in text.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        match key.trim() {
            "physical id" => physical = value.trim(),
            "core id" => {
                cores.insert((physical, value.trim()));
            }
            _ => {}
        }
    }
    (!cores.is_empty()).then_some(cores.len())
}

/// Probe reading the real host
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemProbe;

impl SystemProbe {
    fn memory() -> (f64, f64) {
        if cfg!(target_os = "linux") {
            if let Some(mem) = std::fs::read_to_string("/proc/meminfo")
                .ok()
                .as_deref()
                .and_then(parse_meminfo)
            {
                return mem;
            }
            tracing::debug!("could not read /proc/meminfo, using fallback memory figures");
        }
        (FALLBACK_TOTAL_GB, FALLBACK_AVAILABLE_GB)
    }

    fn physical_cores(logical: usize) -> usize {
        if cfg!(target_os = "linux") {
            if let Some(n) = std::fs::read_to_string("/proc/cpuinfo")
                .ok()
                .as_deref()
                .and_then(parse_physical_cores)
            {
                return n.min(logical).max(1);
            }
        }
        logical
    }
}

impl PlatformProbe for SystemProbe {
    fn detect(&self) -> PlatformInfo {
        let logical = num_cpus();
        let (total, available) = Self::memory();
        let info = PlatformInfo::new(logical, total, available, OsFamily::current())
            .with_physical_cores(Self::physical_cores(logical));
        tracing::debug!(
            logical_cores = info.logical_cores,
            physical_cores = info.physical_cores,
            total_memory_gb = info.total_memory_gb,
            available_memory_gb = info.available_memory_gb,
            os = ?info.os_family,
            "platform detected"
        );
        info
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_meminfo() {
        let text = "MemTotal:       16777216 kB\nMemFree:         1048576 kB\nMemAvailable:   12582912 kB\n";
        let (total, available) = parse_meminfo(text).unwrap();
        assert!((total - 16.0).abs() < 1e-9);
        assert!((available - 12.0).abs() < 1e-9);
    }

    #[test]
    fn meminfo_falls_back_to_memfree() {
        let text = "MemTotal: 2097152 kB\nMemFree: 1048576 kB\n";
        assert_eq!(parse_meminfo(text), Some((2.0, 1.0)));
        assert_eq!(parse_meminfo("garbage"), None);
    }

    #[test]
    fn parses_cpuinfo() {
        let text = "processor: 0\nphysical id: 0\ncore id: 0\n\nprocessor: 1\nphysical id: 0\ncore id: 0\n\nprocessor: 2\nphysical id: 0\ncore id: 1\n";
        assert_eq!(parse_physical_cores(text), Some(2));
    }

    #[test]
    fn system_probe_reports_sane_values() {
        let info = SystemProbe.detect();
        assert!(info.logical_cores >= 1);
        assert!(info.physical_cores >= 1);
        assert!(info.total_memory_gb > 0.0);
    }
}
