//! Process resource snapshots using the sysinfo crate.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};

/// CPU and memory usage of the current process at one point in time.
#[derive(Debug, Clone, Serialize)]
pub struct ResourceSnapshot {
    /// CPU usage since the previous refresh, as a percentage of one core.
    /// The first snapshot taken by a collector reports 0.
    pub cpu_percent: f32,
    /// Resident set size in bytes.
    pub memory_bytes: u64,
    pub captured_at: DateTime<Utc>,
}

impl ResourceSnapshot {
    pub fn memory_mib(&self) -> f64 {
        self.memory_bytes as f64 / (1024.0 * 1024.0)
    }
}

/// Long-lived sysinfo handle; CPU usage is computed between refreshes.
pub(crate) struct ProcessProbe {
    system: System,
    pid: Option<Pid>,
}

impl ProcessProbe {
    pub(crate) fn new() -> Self {
        Self {
            system: System::new(),
            pid: sysinfo::get_current_pid().ok(),
        }
    }

    pub(crate) fn snapshot(&mut self) -> Option<ResourceSnapshot> {
        let pid = self.pid?;
        self.system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[pid]),
            true,
            ProcessRefreshKind::nothing().with_cpu().with_memory(),
        );
        let process = self.system.process(pid)?;
        Some(ResourceSnapshot {
            cpu_percent: process.cpu_usage(),
            memory_bytes: process.memory(),
            captured_at: Utc::now(),
        })
    }
}
