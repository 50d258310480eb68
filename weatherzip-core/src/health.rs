//! Host health reporting.
//!
//! The readings come from three small probes (CPU, memory, uptime). A probe
//! that fails degrades the report to `"fail"` but never fails the check.

use std::{
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use sysinfo::System;

use crate::ProbeError;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CpuStats {
    pub cores: usize,
    pub percent_used: Vec<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MemoryStats {
    pub total: u64,
    pub used: u64,
    pub free: u64,
    pub available: u64,
    pub percent_used: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    #[default]
    Pass,
    Fail,
}

impl HealthStatus {
    pub fn message(&self) -> &'static str {
        match self {
            HealthStatus::Pass => "Alive and kicking!",
            HealthStatus::Fail => "Still alive, but not kicking!",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HealthStats {
    pub cpu: CpuStats,
    pub memory: MemoryStats,
    pub uptime: String,
    pub duration: String,
    pub status: HealthStatus,
    pub message: String,
    pub time: String,
}

pub trait CpuProbe: Send + Sync {
    fn cpu_stats(&self) -> Result<CpuStats, ProbeError>;
}

pub trait MemoryProbe: Send + Sync {
    fn memory_stats(&self) -> Result<MemoryStats, ProbeError>;
}

pub trait UptimeProbe: Send + Sync {
    fn uptime(&self) -> String;
}

pub trait HealthCheck: Send + Sync {
    fn health(&self) -> Result<HealthStats, ProbeError>;
}

pub fn round_to_one_decimal(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Render an elapsed time as `1h2m3.456s`, dropping leading zero units.
pub fn format_elapsed(elapsed: Duration) -> String {
    let total = elapsed.as_secs();
    let (hours, minutes, seconds) = (total / 3600, total / 60 % 60, total % 60);
    let millis = elapsed.subsec_millis();

    match (hours, minutes) {
        (0, 0) => format!("{seconds}.{millis:03}s"),
        (0, _) => format!("{minutes}m{seconds}.{millis:03}s"),
        _ => format!("{hours}h{minutes}m{seconds}.{millis:03}s"),
    }
}

/// CPU and memory readings from the operating system.
///
/// CPU usage is computed against the previous refresh, so the first
/// reading after start-up may be zero.
pub struct SystemProbe {
    system: Mutex<System>,
}

impl SystemProbe {
    pub fn new() -> Self {
        Self { system: Mutex::new(System::new()) }
    }
}

impl Default for SystemProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl CpuProbe for SystemProbe {
    fn cpu_stats(&self) -> Result<CpuStats, ProbeError> {
        let mut system =
            self.system.lock().map_err(|_| ProbeError::Cpu("probe lock poisoned".into()))?;
        system.refresh_cpu_usage();

        let percent_used: Vec<f64> = system
            .cpus()
            .iter()
            .map(|cpu| round_to_one_decimal(f64::from(cpu.cpu_usage())))
            .collect();
        if percent_used.is_empty() {
            return Err(ProbeError::Cpu("no processors reported".into()));
        }

        Ok(CpuStats { cores: num_cpus::get(), percent_used })
    }
}

impl MemoryProbe for SystemProbe {
    fn memory_stats(&self) -> Result<MemoryStats, ProbeError> {
        let mut system =
            self.system.lock().map_err(|_| ProbeError::Memory("probe lock poisoned".into()))?;
        system.refresh_memory();

        let total = system.total_memory();
        if total == 0 {
            return Err(ProbeError::Memory("total memory reported as zero".into()));
        }
        let used = system.used_memory();

        Ok(MemoryStats {
            total,
            used,
            free: system.free_memory(),
            available: system.available_memory(),
            percent_used: round_to_one_decimal(used as f64 / total as f64 * 100.0),
        })
    }
}

/// Time since the probe was created.
#[derive(Debug, Clone)]
pub struct ProcessUptime {
    started: Instant,
}

impl ProcessUptime {
    pub fn new() -> Self {
        Self { started: Instant::now() }
    }
}

impl Default for ProcessUptime {
    fn default() -> Self {
        Self::new()
    }
}

impl UptimeProbe for ProcessUptime {
    fn uptime(&self) -> String {
        format_elapsed(self.started.elapsed())
    }
}

pub struct HealthCheckUseCase {
    cpu: Arc<dyn CpuProbe>,
    memory: Arc<dyn MemoryProbe>,
    uptime: Arc<dyn UptimeProbe>,
}

impl HealthCheckUseCase {
    pub fn new(
        cpu: Arc<dyn CpuProbe>,
        memory: Arc<dyn MemoryProbe>,
        uptime: Arc<dyn UptimeProbe>,
    ) -> Self {
        Self { cpu, memory, uptime }
    }

    /// Wire the operating-system probes; uptime counts from this call.
    pub fn from_system() -> Self {
        let system = Arc::new(SystemProbe::new());
        Self::new(system.clone(), system, Arc::new(ProcessUptime::new()))
    }
}

impl HealthCheck for HealthCheckUseCase {
    fn health(&self) -> Result<HealthStats, ProbeError> {
        let started = Instant::now();
        let mut stats = HealthStats::default();

        match self.cpu.cpu_stats() {
            Ok(cpu) => stats.cpu = cpu,
            Err(err) => {
                tracing::warn!(error = %err, "cpu probe failed");
                stats.status = HealthStatus::Fail;
            }
        }

        match self.memory.memory_stats() {
            Ok(memory) => stats.memory = memory,
            Err(err) => {
                tracing::warn!(error = %err, "memory probe failed");
                stats.status = HealthStatus::Fail;
            }
        }

        stats.message = stats.status.message().to_string();
        stats.uptime = self.uptime.uptime();
        stats.duration = format!("{:?}", started.elapsed());
        stats.time = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);

        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedCpu(Option<CpuStats>);

    impl CpuProbe for FixedCpu {
        fn cpu_stats(&self) -> Result<CpuStats, ProbeError> {
            self.0.clone().ok_or_else(|| ProbeError::Cpu("mock cpu error".into()))
        }
    }

    struct FixedMemory(Option<MemoryStats>);

    impl MemoryProbe for FixedMemory {
        fn memory_stats(&self) -> Result<MemoryStats, ProbeError> {
            self.0.clone().ok_or_else(|| ProbeError::Memory("mock memory error".into()))
        }
    }

    struct FixedUptime;

    impl UptimeProbe for FixedUptime {
        fn uptime(&self) -> String {
            "1m0.000s".into()
        }
    }

    fn cpu() -> CpuStats {
        CpuStats { cores: 4, percent_used: vec![10.5, 20.1, 3.0, 0.0] }
    }

    fn memory() -> MemoryStats {
        MemoryStats { total: 1000, used: 250, free: 700, available: 750, percent_used: 25.0 }
    }

    fn usecase(cpu: Option<CpuStats>, memory: Option<MemoryStats>) -> HealthCheckUseCase {
        HealthCheckUseCase::new(
            Arc::new(FixedCpu(cpu)),
            Arc::new(FixedMemory(memory)),
            Arc::new(FixedUptime),
        )
    }

    #[test]
    fn all_probes_pass() {
        let stats = usecase(Some(cpu()), Some(memory())).health().unwrap();

        assert_eq!(stats.status, HealthStatus::Pass);
        assert_eq!(stats.message, "Alive and kicking!");
        assert_eq!(stats.cpu, cpu());
        assert_eq!(stats.memory, memory());
        assert_eq!(stats.uptime, "1m0.000s");
        assert!(!stats.duration.is_empty());
        assert!(chrono::DateTime::parse_from_rfc3339(&stats.time).is_ok());
    }

    #[test]
    fn cpu_failure_degrades_status() {
        let stats = usecase(None, Some(memory())).health().unwrap();

        assert_eq!(stats.status, HealthStatus::Fail);
        assert_eq!(stats.message, "Still alive, but not kicking!");
        assert_eq!(stats.cpu, CpuStats::default());
        assert_eq!(stats.memory, memory());
    }

    #[test]
    fn memory_failure_degrades_status() {
        let stats = usecase(Some(cpu()), None).health().unwrap();

        assert_eq!(stats.status, HealthStatus::Fail);
        assert_eq!(stats.memory, MemoryStats::default());
        assert_eq!(stats.cpu, cpu());
    }

    #[test]
    fn serializes_with_lowercase_status() {
        let stats = usecase(None, None).health().unwrap();
        let json = serde_json::to_value(&stats).unwrap();

        assert_eq!(json["status"], "fail");
        assert_eq!(json["cpu"]["cores"], 0);
        assert!(json["cpu"]["percent_used"].as_array().unwrap().is_empty());
        assert_eq!(json["memory"]["percent_used"], 0.0);
        for key in ["uptime", "duration", "message", "time"] {
            assert!(json[key].is_string(), "{key}");
        }
    }

    #[test]
    fn rounds_to_one_decimal() {
        assert_eq!(round_to_one_decimal(12.34), 12.3);
        assert_eq!(round_to_one_decimal(12.36), 12.4);
        assert_eq!(round_to_one_decimal(99.96), 100.0);
        assert_eq!(round_to_one_decimal(0.0), 0.0);
    }

    #[test]
    fn formats_elapsed_time() {
        assert_eq!(format_elapsed(Duration::from_millis(1500)), "1.500s");
        assert_eq!(format_elapsed(Duration::from_secs(61)), "1m1.000s");
        assert_eq!(format_elapsed(Duration::from_secs(3 * 3600 + 5)), "3h0m5.000s");
    }

    #[test]
    fn system_probe_reads_memory() {
        let probe = SystemProbe::new();
        let memory = probe.memory_stats().unwrap();

        assert!(memory.total > 0);
        assert!(memory.used <= memory.total);
        assert!((0.0..=100.0).contains(&memory.percent_used));
    }

    #[test]
    fn system_probe_reads_cpu() {
        let probe = SystemProbe::new();
        let cpu = probe.cpu_stats().unwrap();

        assert!(cpu.cores > 0);
        assert!(!cpu.percent_used.is_empty());
    }
}
