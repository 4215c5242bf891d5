use chrono::{DateTime, Duration, TimeZone, Utc};

use devsim_monitor::Snapshot;

/// Deterministic snapshot series spaced one sampling interval apart
#[derive(Debug, Clone)]
pub struct SnapshotGenerator {
    start: DateTime<Utc>,
    interval: Duration,
    memory_percent: f64,
    disk_percent: f64,
    request_rate: f64,
}

impl SnapshotGenerator {
    pub fn new(interval_ms: i64) -> Self {
        Self {
            start: Utc.timestamp_opt(1_700_000_000, 0).single().unwrap_or_else(Utc::now),
            interval: Duration::milliseconds(interval_ms),
            memory_percent: 40.0,
            disk_percent: 40.0,
            request_rate: 25.0,
        }
    }

    pub fn with_baseline(mut self, memory_percent: f64, disk_percent: f64) -> Self {
        self.memory_percent = memory_percent;
        self.disk_percent = disk_percent;
        self
    }

    /// Snapshot at position `index` with the given cpu value
    pub fn at(&self, index: usize, cpu_percent: f64) -> Snapshot {
        Snapshot::new(
            self.start + self.interval * index as i32,
            cpu_percent,
            self.memory_percent,
            self.disk_percent,
            self.request_rate,
        )
    }

    /// One snapshot per cpu value
    pub fn cpu_series(&self, values: &[f64]) -> Vec<Snapshot> {
        values.iter().enumerate().map(|(i, &cpu)| self.at(i, cpu)).collect()
    }

    /// Linear cpu ramp, clamped to [0, 100]
    pub fn ramp(&self, start_cpu: f64, step: f64, count: usize) -> Vec<Snapshot> {
        (0..count)
            .map(|i| self.at(i, (start_cpu + step * i as f64).clamp(0.0, 100.0)))
            .collect()
    }

    /// Cpu alternating between `low` and `high` every `period` snapshots
    pub fn square_wave(&self, low: f64, high: f64, period: usize, count: usize) -> Vec<Snapshot> {
        let period = period.max(1);
        (0..count)
            .map(|i| self.at(i, if (i / period) % 2 == 0 { low } else { high }))
            .collect()
    }
}

impl Default for SnapshotGenerator {
    fn default() -> Self {
        Self::new(1_000)
    }
}
