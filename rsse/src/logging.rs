//! Logging utilities for tracking latency and bytes metrics.
//!
//! Every scheme operation records a `LatencyMetric` and, where data crosses
//! the client/server boundary, a `BytesMetric`. The process-wide buffers are
//! drained into CSV files by [`write_report`].

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use lazy_static::lazy_static;

use crate::{constants::LATENCY_BENCH_COUNT, error::RsseError};

lazy_static! {
    /// Global log for storing latency metrics with operation name, duration in ms, and timestamps
    static ref LATENCY_LOG: Mutex<Vec<(String, f64, u64, u64)>> = Mutex::new(Vec::new());
    /// Global log for storing bytes metrics with operation name and byte count
    static ref BYTES_LOG: Mutex<Vec<(String, usize)>> = Mutex::new(Vec::new());
}

/// A poisoned metrics buffer is still usable: entries are plain data.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn unix_micros() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or_default()
}

/// Tracks latency metrics for an operation, with support for pausing/resuming timing
pub struct LatencyMetric {
    /// Name of the operation being timed
    operation: String,
    /// Start time of the operation
    start_time: Instant,
    /// Unix timestamp in microseconds when operation started
    start_timestamp: u64,
    /// Total duration accumulated when paused
    accumulated_duration: Duration,
    /// Whether timing is currently paused
    is_paused: bool,
}

impl LatencyMetric {
    /// Creates a new LatencyMetric for the given operation name.
    /// Starts timing immediately.
    pub fn new(operation: &str) -> Self {
        Self {
            operation: operation.to_string(),
            start_time: Instant::now(),
            start_timestamp: unix_micros(),
            accumulated_duration: Duration::from_secs(0),
            is_paused: false,
        }
    }

    /// Pauses timing of the operation.
    /// Accumulated duration is preserved.
    pub fn pause(&mut self) {
        if !self.is_paused {
            self.accumulated_duration += self.start_time.elapsed();
            self.is_paused = true;
        }
    }

    /// Resumes timing of the operation.
    pub fn resume(&mut self) {
        if self.is_paused {
            self.start_time = Instant::now();
            self.is_paused = false;
        }
    }

    /// Finishes timing and logs the final duration.
    pub fn finish(self) {
        let final_duration = if self.is_paused {
            self.accumulated_duration
        } else {
            self.accumulated_duration + self.start_time.elapsed()
        };
        let milliseconds = final_duration.as_secs_f64() * 1000.0;
        lock(&LATENCY_LOG).push((
            self.operation,
            milliseconds,
            self.start_timestamp,
            unix_micros(),
        ));
    }
}

/// Tracks bytes metrics for an operation
pub struct BytesMetric {
    /// Name of the operation being measured
    operation: String,
    /// Number of bytes processed
    bytes: usize,
}

impl BytesMetric {
    /// Creates a new BytesMetric for the given operation and byte count
    pub fn new(operation: &str, bytes: usize) -> Self {
        Self {
            operation: operation.to_string(),
            bytes,
        }
    }

    /// Logs the bytes metric.
    pub fn log(self) {
        lock(&BYTES_LOG).push((self.operation, self.bytes));
    }
}

/// Snapshot of the recorded latencies, oldest first.
pub fn latency_entries() -> Vec<(String, f64)> {
    lock(&LATENCY_LOG)
        .iter()
        .map(|(op, ms, _, _)| (op.clone(), *ms))
        .collect()
}

/// Snapshot of the recorded byte counts, oldest first.
pub fn bytes_entries() -> Vec<(String, usize)> {
    lock(&BYTES_LOG).clone()
}

/// Drops everything recorded so far.
pub fn clear() {
    lock(&LATENCY_LOG).clear();
    lock(&BYTES_LOG).clear();
}

/// Writes every logged metric to two CSV files, followed by per-operation
/// averages, then clears the in-memory logs.
///
/// # Arguments
/// * `latency_path` - File to write latency metrics to
/// * `bytes_path` - File to write bytes metrics to
///
/// Parent directories are created as needed.
pub fn write_report(latency_path: &Path, bytes_path: &Path) -> Result<(), RsseError> {
    for path in [latency_path, bytes_path] {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
    }

    let latency_data = std::mem::take(&mut *lock(&LATENCY_LOG));
    let mut file = BufWriter::new(File::create(latency_path)?);
    writeln!(file, "operation,milliseconds,start_timestamp_us,end_timestamp_us")?;
    let mut latency_by_op: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
    for (operation, value, start, end) in &latency_data {
        writeln!(file, "{},{:.5},{},{}", operation, value, start, end)?;
        latency_by_op.entry(operation).or_default().push(*value);
    }
    writeln!(file, "\nAVERAGES (all iterations):")?;
    for (operation, values) in &latency_by_op {
        let average = values.iter().sum::<f64>() / values.len() as f64;
        writeln!(file, "{},{:.5}", operation, average)?;
        if values.len() >= LATENCY_BENCH_COUNT {
            let recent = &values[values.len() - LATENCY_BENCH_COUNT..];
            let recent_avg = recent.iter().sum::<f64>() / recent.len() as f64;
            writeln!(
                file,
                "{} (last {} iterations),{:.5}",
                operation, LATENCY_BENCH_COUNT, recent_avg
            )?;
        }
    }
    file.flush()?;

    let bytes_data = std::mem::take(&mut *lock(&BYTES_LOG));
    let mut file = BufWriter::new(File::create(bytes_path)?);
    writeln!(file, "operation,bytes")?;
    let mut bytes_sums: BTreeMap<&str, (usize, usize)> = BTreeMap::new();
    for (operation, value) in &bytes_data {
        writeln!(file, "{},{}", operation, value)?;
        let entry = bytes_sums.entry(operation).or_insert((0, 0));
        entry.0 += value;
        entry.1 += 1;
    }
    writeln!(file, "\nAVERAGES:")?;
    for (operation, (sum, count)) in bytes_sums {
        writeln!(file, "{},{}", operation, sum as f64 / count as f64)?;
    }
    file.flush()?;

    Ok(())
}
