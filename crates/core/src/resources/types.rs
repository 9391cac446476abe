//! Types for resource probing.

use serde::{Deserialize, Serialize};

const MB: u64 = 1024 * 1024;

/// Class of work a worker pool is sized for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskClass {
    Image,
    Video,
    Thumbnail,
    Light,
}

impl TaskClass {
    /// Estimated resident memory of one worker, in bytes.
    pub fn memory_cost_bytes(&self) -> u64 {
        match self {
            Self::Video => 1024 * MB,
            Self::Image => 512 * MB,
            Self::Thumbnail => 256 * MB,
            Self::Light => 64 * MB,
        }
    }

    /// Per-worker cost scaled for large inputs.
    pub fn scaled_cost_bytes(&self, avg_file_size_mb: Option<f64>) -> u64 {
        let base = self.memory_cost_bytes() as f64;
        let factor = match avg_file_size_mb {
            Some(size) if size > 100.0 => 2.0,
            Some(size) if size > 50.0 => 1.5,
            _ => 1.0,
        };
        (base * factor) as u64
    }
}

/// Point-in-time view of the machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SystemSnapshot {
    pub cpu_count: usize,
    pub total_memory_bytes: u64,
    /// Memory available to new processes.
    pub free_memory_bytes: u64,
}

impl SystemSnapshot {
    /// Fraction of memory in use (0.0 - 1.0).
    pub fn utilization(&self) -> f64 {
        if self.total_memory_bytes == 0 {
            return 0.0;
        }
        let used = self.total_memory_bytes.saturating_sub(self.free_memory_bytes);
        used as f64 / self.total_memory_bytes as f64
    }

    /// Worker cap derived from core count alone.
    pub fn cpu_cap(&self) -> usize {
        if self.cpu_count > 4 {
            self.cpu_count - 2
        } else {
            (self.cpu_count / 2).max(1)
        }
    }
}

/// Outcome of a pre-flight resource check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Availability {
    pub available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl Availability {
    pub fn ok() -> Self {
        Self {
            available: true,
            reason: None,
        }
    }

    pub fn refused(reason: impl Into<String>) -> Self {
        Self {
            available: false,
            reason: Some(reason.into()),
        }
    }
}
