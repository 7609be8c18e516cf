//! Process and host resource sampling.
//!
//! The sampler reads CPU, memory, disk, and network counters through
//! `sysinfo`, and accelerator counters through a pluggable probe. A failed or
//! absent source yields an absent field, never a failed sample: absence is a
//! first-class value here.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use sysinfo::{Networks, Pid, System};

use crate::types::{epoch_secs, ResourceUsage};

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// A point-in-time reading of process and host resource counters.
///
/// Disk and network fields are deltas since the previous sample.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricSample {
    /// Unix-epoch seconds at sampling time
    pub timestamp: f64,

    /// Host-wide CPU usage percentage
    pub cpu_percent: Option<f64>,

    /// Host memory usage percentage
    pub memory_percent: Option<f64>,

    /// Host memory used in MB
    pub memory_used_mb: Option<f64>,

    /// This process's CPU usage percentage
    pub process_cpu_percent: Option<f64>,

    /// This process's resident memory in MB
    pub process_memory_mb: Option<f64>,

    /// Allocator-specific memory in MB (accelerator allocator when present,
    /// otherwise approximated by process resident memory)
    pub allocator_memory_mb: Option<f64>,

    /// Accelerator memory in MB, absent without an accelerator
    pub accelerator_memory_mb: Option<f64>,

    /// Accelerator utilization percentage, absent without an accelerator
    pub accelerator_utilization: Option<f64>,

    /// Process disk reads since the previous sample, MB
    pub disk_read_mb: Option<f64>,

    /// Process disk writes since the previous sample, MB
    pub disk_write_mb: Option<f64>,

    /// Host network bytes sent since the previous sample, MB
    pub network_sent_mb: Option<f64>,

    /// Host network bytes received since the previous sample, MB
    pub network_recv_mb: Option<f64>,
}

/// One reading from an accelerator probe.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceleratorReading {
    /// Device memory in use, MB
    pub memory_mb: Option<f64>,

    /// Device utilization percentage
    pub utilization_percent: Option<f64>,

    /// Allocator-managed memory, MB
    pub allocator_memory_mb: Option<f64>,
}

/// Source of accelerator counters.
///
/// Hosts without an accelerator use [`NoAccelerator`]; tests inject scripted
/// probes to drive the leak-detection rules.
pub trait AcceleratorProbe: Send + Sync {
    fn read(&self) -> AcceleratorReading;
}

/// Probe for hosts with no accelerator: every field is absent.
pub struct NoAccelerator;

impl AcceleratorProbe for NoAccelerator {
    fn read(&self) -> AcceleratorReading {
        AcceleratorReading::default()
    }
}

/// Lightweight resource snapshot source used at step boundaries.
pub trait ResourceProbe: Send + Sync {
    fn usage(&self) -> ResourceUsage;
}

/// Resource probe that reports nothing; used where no sampler is wired.
pub struct NullResourceProbe;

impl ResourceProbe for NullResourceProbe {
    fn usage(&self) -> ResourceUsage {
        ResourceUsage::default()
    }
}

struct SamplerState {
    system: System,
    networks: Networks,
    prev_disk_read: u64,
    prev_disk_write: u64,
    prev_net_sent: u64,
    prev_net_recv: u64,
}

/// Reads process/host counters on demand; cheap enough to call synchronously.
pub struct MetricSampler {
    state: Mutex<SamplerState>,
    probe: Arc<dyn AcceleratorProbe>,
    pid: Option<Pid>,
}

impl MetricSampler {
    /// Create a sampler with the given accelerator probe.
    pub fn new(probe: Arc<dyn AcceleratorProbe>) -> Self {
        let mut system = System::new_all();
        system.refresh_all();
        let networks = Networks::new_with_refreshed_list();
        let pid = sysinfo::get_current_pid().ok();

        let (prev_disk_read, prev_disk_write) = pid
            .and_then(|pid| system.process(pid))
            .map(|p| {
                let usage = p.disk_usage();
                (usage.total_read_bytes, usage.total_written_bytes)
            })
            .unwrap_or((0, 0));

        let (prev_net_sent, prev_net_recv) = Self::network_totals(&networks);

        Self {
            state: Mutex::new(SamplerState {
                system,
                networks,
                prev_disk_read,
                prev_disk_write,
                prev_net_sent,
                prev_net_recv,
            }),
            probe,
            pid,
        }
    }

    fn network_totals(networks: &Networks) -> (u64, u64) {
        networks.iter().fold((0, 0), |(sent, recv), (_, data)| {
            (sent + data.total_transmitted(), recv + data.total_received())
        })
    }

    /// Take one sample. Never fails; unavailable sources yield absent fields.
    pub fn sample(&self) -> MetricSample {
        let mut state = self.state.lock();
        state.system.refresh_memory();
        state.system.refresh_cpu();
        if let Some(pid) = self.pid {
            state.system.refresh_process(pid);
        }
        state.networks.refresh();

        let cpu_percent = Some(state.system.global_cpu_info().cpu_usage() as f64);

        let total_memory = state.system.total_memory();
        let used_memory = state.system.used_memory();
        let memory_percent = if total_memory > 0 {
            Some(used_memory as f64 / total_memory as f64 * 100.0)
        } else {
            None
        };
        let memory_used_mb = Some(used_memory as f64 / BYTES_PER_MB);

        let process = self.pid.and_then(|pid| state.system.process(pid));
        let process_cpu_percent = process.map(|p| p.cpu_usage() as f64);
        let process_memory_mb = process.map(|p| p.memory() as f64 / BYTES_PER_MB);

        let (disk_read_mb, disk_write_mb) = match process.map(|p| p.disk_usage()) {
            Some(usage) => {
                let read = usage.total_read_bytes.saturating_sub(state.prev_disk_read);
                let write = usage
                    .total_written_bytes
                    .saturating_sub(state.prev_disk_write);
                state.prev_disk_read = usage.total_read_bytes;
                state.prev_disk_write = usage.total_written_bytes;
                (
                    Some(read as f64 / BYTES_PER_MB),
                    Some(write as f64 / BYTES_PER_MB),
                )
            }
            None => (None, None),
        };

        let (net_sent, net_recv) = Self::network_totals(&state.networks);
        let network_sent_mb =
            Some(net_sent.saturating_sub(state.prev_net_sent) as f64 / BYTES_PER_MB);
        let network_recv_mb =
            Some(net_recv.saturating_sub(state.prev_net_recv) as f64 / BYTES_PER_MB);
        state.prev_net_sent = net_sent;
        state.prev_net_recv = net_recv;

        drop(state);

        let accelerator = self.probe.read();
        // Without an accelerator allocator, resident memory is the closest
        // observable stand-in for allocator growth.
        let allocator_memory_mb = accelerator.allocator_memory_mb.or(process_memory_mb);

        MetricSample {
            timestamp: epoch_secs(),
            cpu_percent,
            memory_percent,
            memory_used_mb,
            process_cpu_percent,
            process_memory_mb,
            allocator_memory_mb,
            accelerator_memory_mb: accelerator.memory_mb,
            accelerator_utilization: accelerator.utilization_percent,
            disk_read_mb,
            disk_write_mb,
            network_sent_mb,
            network_recv_mb,
        }
    }
}

impl ResourceProbe for MetricSampler {
    fn usage(&self) -> ResourceUsage {
        let sample = self.sample();
        ResourceUsage {
            cpu_percent: sample.process_cpu_percent,
            memory_mb: sample.process_memory_mb,
            accelerator_memory_mb: sample.accelerator_memory_mb,
            accelerator_utilization: sample.accelerator_utilization,
        }
    }
}
