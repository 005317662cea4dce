//! Minimal built-in inventory collector.
//!
//! Gathers the machine facts every report carries. Deeper collectors
//! (installed software, antivirus, office suites) plug in as extra jobs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sysinfo::System;

/// One inventory report, as POSTed to the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventorySnapshot {
    pub hostname: String,
    pub os_name: String,
    pub os_version: String,
    pub kernel_version: String,
    pub architecture: String,
    pub cpu_model: String,
    pub cpu_logical_cores: usize,
    pub total_memory_bytes: u64,
    pub used_memory_bytes: u64,
    pub uptime_secs: u64,
    pub agent_version: String,
    pub collected_at: DateTime<Utc>,
}

pub fn collect() -> InventorySnapshot {
    let mut system = System::new_all();
    system.refresh_cpu_all();
    system.refresh_memory();

    let cpu_model = system
        .cpus()
        .first()
        .map(|cpu| cpu.brand().trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "unknown".to_string());

    InventorySnapshot {
        hostname: System::host_name()
            .filter(|h| !h.trim().is_empty())
            .unwrap_or_else(|| "unknown".to_string()),
        os_name: System::name().unwrap_or_else(|| std::env::consts::OS.to_string()),
        os_version: System::long_os_version()
            .or_else(System::os_version)
            .unwrap_or_else(|| "unknown".to_string()),
        kernel_version: System::kernel_version().unwrap_or_else(|| "unknown".to_string()),
        architecture: std::env::consts::ARCH.to_string(),
        cpu_model,
        cpu_logical_cores: system.cpus().len(),
        total_memory_bytes: system.total_memory(),
        used_memory_bytes: system.used_memory().min(system.total_memory()),
        uptime_secs: System::uptime(),
        agent_version: env!("CARGO_PKG_VERSION").to_string(),
        collected_at: Utc::now(),
    }
}
