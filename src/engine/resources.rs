//! Per-container memory and CPU ceilings.

use serde::{Deserialize, Serialize};

const BYTES_PER_MIB: u64 = 1024 * 1024;

/// CFS scheduling period the CPU quota is expressed against, in microseconds.
pub const CPU_PERIOD_MICROS: i64 = 100_000;

/// Memory and CPU ceiling for one sandbox.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResourceLimits {
    pub memory_mb: u64,
    /// Fractional cores; 0.5 means half of one core.
    pub cpu_cores: f64,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self::new(512, 0.5)
    }
}

impl ResourceLimits {
    pub fn new(memory_mb: u64, cpu_cores: f64) -> Self {
        Self {
            memory_mb,
            cpu_cores,
        }
    }

    /// Hard memory limit as the engine expects it. Saturates at `i64::MAX`.
    pub fn memory_bytes(&self) -> i64 {
        i64::try_from(self.memory_mb.saturating_mul(BYTES_PER_MIB)).unwrap_or(i64::MAX)
    }

    pub fn cpu_period(&self) -> i64 {
        CPU_PERIOD_MICROS
    }

    /// Microseconds of CPU time allowed per [`CPU_PERIOD_MICROS`].
    pub fn cpu_quota(&self) -> i64 {
        (CPU_PERIOD_MICROS as f64 * self.cpu_cores).round() as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sandbox_defaults() {
        let limits = ResourceLimits::default();
        assert_eq!(limits.memory_mb, 512);
        assert_eq!(limits.memory_bytes(), 536_870_912);
        assert_eq!(limits.cpu_quota(), 50_000);
    }

    #[test]
    fn test_quota_scales_with_cores() {
        assert_eq!(ResourceLimits::new(256, 0.25).cpu_quota(), 25_000);
        assert_eq!(ResourceLimits::new(256, 1.5).cpu_quota(), 150_000);
        assert_eq!(ResourceLimits::new(256, 1.5).cpu_period(), CPU_PERIOD_MICROS);
    }

    #[test]
    fn test_memory_saturates() {
        assert_eq!(ResourceLimits::new(u64::MAX, 1.0).memory_bytes(), i64::MAX);
    }
}
