//! Metrics source capability and the host implementation
//!
//! The sampler treats every source as potentially blocking and bounds each
//! call with a timeout, so implementations are free to do blocking work as
//! long as they move it off the async worker threads.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use sysinfo::{Disks, System};

use crate::error::{SourceError, SourceResult};
use crate::model::Snapshot;

/// Yields a snapshot of current system metrics on demand
#[async_trait]
pub trait MetricsSource: Send + Sync {
    /// Take one sample
    async fn sample(&self) -> SourceResult<Snapshot>;

    /// Name used in logs
    fn name(&self) -> &str {
        "metrics-source"
    }
}

/// Host metrics collected through `sysinfo`.
///
/// The host has no view of application traffic, so `request_rate` comes
/// from an optional shared counter the embedding application increments.
pub struct SysinfoSource {
    system: Arc<Mutex<System>>,
    requests: Option<Arc<RequestCounter>>,
}

/// Monotonic request counter turned into a per-second rate between samples
#[derive(Debug, Default)]
pub struct RequestCounter {
    total: AtomicU64,
    last: Mutex<Option<(u64, Instant)>>,
}

impl RequestCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, count: u64) {
        self.total.fetch_add(count, Ordering::Relaxed);
    }

    /// Requests per second since the previous call; zero on the first call
    pub fn rate(&self) -> f64 {
        let total = self.total.load(Ordering::Relaxed);
        let now = Instant::now();

        let mut last = match self.last.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        let rate = match *last {
            Some((previous, at)) => {
                let elapsed = now.duration_since(at).as_secs_f64();
                if elapsed > 0.0 {
                    total.saturating_sub(previous) as f64 / elapsed
                } else {
                    0.0
                }
            }
            None => 0.0,
        };

        *last = Some((total, now));
        rate
    }
}

impl SysinfoSource {
    pub fn new() -> Self {
        let mut system = System::new();
        // Prime CPU usage so the first real sample has a baseline
        system.refresh_cpu();
        system.refresh_memory();

        Self {
            system: Arc::new(Mutex::new(system)),
            requests: None,
        }
    }

    pub fn with_request_counter(mut self, counter: Arc<RequestCounter>) -> Self {
        self.requests = Some(counter);
        self
    }

    fn collect(system: &Mutex<System>) -> SourceResult<(f64, f64, f64)> {
        let mut sys = system
            .lock()
            .map_err(|_| SourceError::unavailable("system handle poisoned"))?;

        sys.refresh_cpu();
        sys.refresh_memory();

        let cpu = sys.global_cpu_info().cpu_usage() as f64;

        let total_memory = sys.total_memory();
        if total_memory == 0 {
            return Err(SourceError::unavailable("total memory reported as zero"));
        }
        let memory = sys.used_memory() as f64 / total_memory as f64 * 100.0;

        let disks = Disks::new_with_refreshed_list();
        let (total, available) = disks
            .iter()
            .fold((0u64, 0u64), |(t, a), d| (t + d.total_space(), a + d.available_space()));
        let disk = if total > 0 {
            total.saturating_sub(available) as f64 / total as f64 * 100.0
        } else {
            0.0
        };

        Ok((cpu.clamp(0.0, 100.0), memory.clamp(0.0, 100.0), disk.clamp(0.0, 100.0)))
    }
}

impl Default for SysinfoSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MetricsSource for SysinfoSource {
    async fn sample(&self) -> SourceResult<Snapshot> {
        let system = Arc::clone(&self.system);

        let (cpu, memory, disk) = tokio::task::spawn_blocking(move || Self::collect(&system))
            .await
            .map_err(|e| SourceError::unavailable(format!("collection task failed: {}", e)))??;

        let request_rate = self.requests.as_ref().map(|r| r.rate()).unwrap_or(0.0);

        let snapshot = Snapshot::new(Utc::now(), cpu, memory, disk, request_rate);
        tracing::trace!(
            cpu = snapshot.cpu_percent,
            memory = snapshot.memory_percent,
            disk = snapshot.disk_percent,
            "Collected host sample"
        );
        Ok(snapshot)
    }

    fn name(&self) -> &str {
        "sysinfo"
    }
}
