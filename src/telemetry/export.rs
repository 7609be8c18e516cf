//! Export of telemetry artifacts to disk.
//!
//! Each completed session exports to a nested JSON document plus a flat CSV
//! of its steps; the hardware-metric history exports to timestamped JSON and
//! CSV files. Filenames embed the session id or an epoch timestamp so
//! repeated exports never clobber each other.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::{ErrorContext, Result};
use crate::monitor::sampler::MetricSample;
use crate::telemetry::recorder::CompletedSession;
use crate::types::epoch_secs;

// Default f64 Display is the shortest representation that parses back to the
// same value, so CSV cells round-trip exactly like the JSON path.
fn fmt_opt(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn fmt_opt_str(value: &Option<String>) -> String {
    value.clone().unwrap_or_default()
}

/// Export one completed session as `session_<id>.json` and `steps_<id>.csv`.
///
/// Returns the paths of the two written files.
pub fn export_session(dir: &Path, session: &CompletedSession) -> Result<(PathBuf, PathBuf)> {
    fs::create_dir_all(dir).with_static_context("Failed to create export directory")?;

    let json_path = dir.join(format!("session_{}.json", session.session_id));
    let json = serde_json::to_string_pretty(session)?;
    fs::write(&json_path, json).with_static_context("Failed to write session JSON")?;

    let csv_path = dir.join(format!("steps_{}.csv", session.session_id));
    let mut file = fs::File::create(&csv_path).with_static_context("Failed to create steps CSV")?;
    writeln!(
        file,
        "step_name,start_time,end_time,duration,cpu_start_percent,cpu_end_percent,memory_start_mb,memory_end_mb,success,error_message"
    )?;
    for step in &session.steps {
        writeln!(
            file,
            "{},{},{},{},{},{},{},{},{},{}",
            step.step_name,
            step.start_time,
            step.end_time,
            step.duration,
            fmt_opt(step.cpu_start_percent),
            fmt_opt(step.cpu_end_percent),
            fmt_opt(step.memory_start_mb),
            fmt_opt(step.memory_end_mb),
            step.success,
            fmt_opt_str(&step.error_message),
        )?;
    }

    info!(
        session_id = %session.session_id,
        json = %json_path.display(),
        csv = %csv_path.display(),
        "Session telemetry exported"
    );
    Ok((json_path, csv_path))
}

/// Export the hardware-metric history as timestamped JSON and CSV files.
pub fn export_hardware_metrics(dir: &Path, samples: &[MetricSample]) -> Result<(PathBuf, PathBuf)> {
    fs::create_dir_all(dir).with_static_context("Failed to create export directory")?;
    let stamp = epoch_secs() as u64;

    let json_path = dir.join(format!("hardware_metrics_{}.json", stamp));
    let json = serde_json::to_string_pretty(samples)?;
    fs::write(&json_path, json).with_static_context("Failed to write hardware metrics JSON")?;

    let csv_path = dir.join(format!("hardware_metrics_{}.csv", stamp));
    let mut file = fs::File::create(&csv_path).with_static_context("Failed to create hardware metrics CSV")?;
    writeln!(
        file,
        "timestamp,cpu_percent,memory_percent,memory_used_mb,process_cpu_percent,process_memory_mb,allocator_memory_mb,accelerator_memory_mb,accelerator_utilization,disk_read_mb,disk_write_mb,network_sent_mb,network_recv_mb"
    )?;
    for sample in samples {
        writeln!(
            file,
            "{},{},{},{},{},{},{},{},{},{},{},{},{}",
            sample.timestamp,
            fmt_opt(sample.cpu_percent),
            fmt_opt(sample.memory_percent),
            fmt_opt(sample.memory_used_mb),
            fmt_opt(sample.process_cpu_percent),
            fmt_opt(sample.process_memory_mb),
            fmt_opt(sample.allocator_memory_mb),
            fmt_opt(sample.accelerator_memory_mb),
            fmt_opt(sample.accelerator_utilization),
            fmt_opt(sample.disk_read_mb),
            fmt_opt(sample.disk_write_mb),
            fmt_opt(sample.network_sent_mb),
            fmt_opt(sample.network_recv_mb),
        )?;
    }

    info!(
        samples = samples.len(),
        json = %json_path.display(),
        "Hardware metrics exported"
    );
    Ok((json_path, csv_path))
}
