//! NF resource snapshot served on `/nwdaf-oam/nf-resource`

use async_trait::async_trait;
use nf_sbi::{SbiError, SbiResult};
use serde::{Deserialize, Serialize};
use sysinfo::System;

/// Load averages over 1, 5 and 15 minutes
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct LoadAverage {
    pub one: f64,
    pub five: f64,
    pub fifteen: f64,
}

/// Host resource usage as seen by this NF
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct NfResource {
    pub cpu_count: usize,
    /// Global CPU usage in percent
    pub cpu_usage: f32,
    pub memory_total: u64,
    pub memory_used: u64,
    pub load_average: LoadAverage,
}

/// Source of resource snapshots
#[async_trait]
pub trait NfResourceProvider: Send + Sync {
    async fn nf_resource(&self) -> SbiResult<NfResource>;
}

/// Snapshot taken from the host with sysinfo
#[derive(Debug, Default)]
pub struct SysinfoResourceProvider;

impl SysinfoResourceProvider {
    pub fn new() -> Self {
        Self
    }

    fn collect() -> NfResource {
        let mut sys = System::new_all();
        sys.refresh_all();
        // CPU usage is a delta between two refreshes.
        std::thread::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL);
        sys.refresh_cpu_usage();

        let load = System::load_average();
        NfResource {
            cpu_count: sys.cpus().len(),
            cpu_usage: sys.global_cpu_usage(),
            memory_total: sys.total_memory(),
            memory_used: sys.used_memory(),
            load_average: LoadAverage {
                one: load.one,
                five: load.five,
                fifteen: load.fifteen,
            },
        }
    }
}

#[async_trait]
impl NfResourceProvider for SysinfoResourceProvider {
    async fn nf_resource(&self) -> SbiResult<NfResource> {
        tokio::task::spawn_blocking(Self::collect)
            .await
            .map_err(|e| SbiError::Internal(format!("Resource collection failed: {e}")))
    }
}
