//! Worker-count recommendation from live system state.

use std::sync::Mutex;
use sysinfo::System;
use tracing::debug;

use super::types::{Availability, SystemSnapshot, TaskClass};

/// Share of free memory a worker pool may claim.
const MEMORY_BUDGET_RATIO: f64 = 0.7;
/// Utilization above which recommendations are throttled.
const PRESSURE_THRESHOLD: f64 = 0.75;
const PRESSURE_FACTOR: f64 = 0.6;
/// Projected need above this share of free memory is refused.
const MAX_PROJECTED_RATIO: f64 = 0.8;
/// Utilization above which no new work is started.
const CRITICAL_UTILIZATION: f64 = 0.9;

/// Source of system snapshots.
pub trait SystemProbe: Send + Sync {
    fn snapshot(&self) -> SystemSnapshot;
}

/// Reads live values through `sysinfo`.
pub struct SysinfoProbe {
    system: Mutex<System>,
}

impl SysinfoProbe {
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
        }
    }
}

impl Default for SysinfoProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemProbe for SysinfoProbe {
    fn snapshot(&self) -> SystemSnapshot {
        let cpu_count = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);

        let (total, free) = match self.system.lock() {
            Ok(mut system) => {
                system.refresh_memory();
                (system.total_memory(), system.available_memory())
            }
            Err(_) => (0, 0),
        };

        SystemSnapshot {
            cpu_count,
            total_memory_bytes: total,
            free_memory_bytes: free,
        }
    }
}

/// Recommends pool sizes for each task class.
pub struct ResourceProbe {
    probe: Box<dyn SystemProbe>,
}

impl ResourceProbe {
    pub fn new(probe: impl SystemProbe + 'static) -> Self {
        Self {
            probe: Box::new(probe),
        }
    }

    /// Creates a probe reading the live system.
    pub fn system() -> Self {
        Self::new(SysinfoProbe::new())
    }

    pub fn snapshot(&self) -> SystemSnapshot {
        self.probe.snapshot()
    }

    /// Recommended number of concurrent workers for `class`.
    pub fn recommend_workers(&self, class: TaskClass, avg_file_size_mb: Option<f64>) -> usize {
        let snapshot = self.probe.snapshot();
        let workers = recommend_for(&snapshot, class, avg_file_size_mb);
        debug!(
            ?class,
            workers,
            cpu_count = snapshot.cpu_count,
            free_mb = snapshot.free_memory_bytes / (1024 * 1024),
            "Recommended worker count"
        );
        workers
    }

    /// Whether `workers` concurrent `class` tasks can start safely.
    pub fn check_availability(&self, class: TaskClass, workers: usize) -> Availability {
        check_for(&self.probe.snapshot(), class, workers)
    }
}

/// Pure recommendation over a snapshot.
pub(crate) fn recommend_for(
    snapshot: &SystemSnapshot,
    class: TaskClass,
    avg_file_size_mb: Option<f64>,
) -> usize {
    let cost = class.scaled_cost_bytes(avg_file_size_mb).max(1) as f64;
    let memory_workers = (snapshot.free_memory_bytes as f64 * MEMORY_BUDGET_RATIO / cost) as usize;
    let mut workers = memory_workers.min(snapshot.cpu_cap());

    if snapshot.utilization() > PRESSURE_THRESHOLD {
        workers = (workers as f64 * PRESSURE_FACTOR) as usize;
    }

    workers.max(1)
}

/// Pure availability check over a snapshot.
pub(crate) fn check_for(snapshot: &SystemSnapshot, class: TaskClass, workers: usize) -> Availability {
    let utilization = snapshot.utilization();
    if utilization > CRITICAL_UTILIZATION {
        return Availability::refused(format!(
            "memory utilization already at {:.0}%",
            utilization * 100.0
        ));
    }

    let needed = class.memory_cost_bytes() as f64 * workers as f64;
    let budget = snapshot.free_memory_bytes as f64 * MAX_PROJECTED_RATIO;
    if needed > budget {
        return Availability::refused(format!(
            "{} {:?} workers need {} MB but only {} MB may be used",
            workers,
            class,
            (needed / (1024.0 * 1024.0)) as u64,
            (budget / (1024.0 * 1024.0)) as u64
        ));
    }

    Availability::ok()
}
