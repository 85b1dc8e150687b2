//! Weighted progress reporting, grounded in
//! `DeltaPerformer::{LogProgress, UpdateOverallProgress}`.

use std::time::{Duration, Instant};

const DOWNLOAD_WEIGHT: u64 = 50;
const OPERATIONS_WEIGHT: u64 = 50;
const LOG_MAX_CHUNKS: u64 = 10;
const LOG_TIMEOUT: Duration = Duration::from_secs(30);

/// Receives progress updates as the performer advances. The default
/// implementation logs via the `log` facade; tests use a recording sink.
pub trait ProgressSink {
    fn on_progress(&mut self, percent: u8);
}

pub struct LoggingSink;

impl ProgressSink for LoggingSink {
    fn on_progress(&mut self, percent: u8) {
        log::info!("update progress: {percent}%");
    }
}

/// Tracks the weighted sum of download progress and operation progress,
/// and decides when a progress change is worth reporting.
pub struct ProgressTracker {
    expected_payload_size: Option<u64>,
    total_operations: u64,

    bytes_received: u64,
    operations_done: u64,

    last_reported_percent: i64,
    last_logged_chunk: i64,
    last_log_time: Instant,
}

impl ProgressTracker {
    pub fn new(expected_payload_size: Option<u64>, total_operations: u64, now: Instant) -> Self {
        ProgressTracker {
            expected_payload_size,
            total_operations,
            bytes_received: 0,
            operations_done: 0,
            last_reported_percent: -1,
            last_logged_chunk: -1,
            last_log_time: now,
        }
    }

    fn download_fraction(&self) -> f64 {
        match self.expected_payload_size {
            Some(size) if size > 0 => (self.bytes_received as f64 / size as f64).min(1.0),
            _ => 0.0,
        }
    }

    fn operations_fraction(&self) -> f64 {
        if self.total_operations == 0 {
            return 1.0;
        }
        (self.operations_done as f64 / self.total_operations as f64).min(1.0)
    }

    fn overall_percent(&self) -> u8 {
        let (download_weight, operations_weight) = if self.expected_payload_size.is_some() {
            (DOWNLOAD_WEIGHT, OPERATIONS_WEIGHT)
        } else {
            (0, DOWNLOAD_WEIGHT + OPERATIONS_WEIGHT)
        };

        let weighted = self.download_fraction() * download_weight as f64 + self.operations_fraction() * operations_weight as f64;
        weighted.round().clamp(0.0, 100.0) as u8
    }

    pub fn record_bytes_received(&mut self, total_bytes_received: u64) {
        self.bytes_received = total_bytes_received;
    }

    pub fn record_operation_done(&mut self, operations_done: u64) {
        self.operations_done = operations_done;
    }

    /// Emits a progress report if warranted: a whole-percent chunk was
    /// crossed (bounded to roughly `LOG_MAX_CHUNKS` reports per update),
    /// or the quiet timeout elapsed, or `force` is set (e.g. the final
    /// report at operation completion). A regression in the percentage
    /// is logged as a bug -- overall progress must be monotonic -- and
    /// the message is emitted regardless of chunking.
    pub fn maybe_report(&mut self, sink: &mut dyn ProgressSink, now: Instant, force: bool) {
        let percent = self.overall_percent() as i64;

        if percent < self.last_reported_percent {
            log::error!("update progress went backwards: {} -> {percent}", self.last_reported_percent);
            sink.on_progress(percent as u8);
            self.last_reported_percent = percent;
            return;
        }

        let chunk_size = (100 / LOG_MAX_CHUNKS).max(1) as i64;
        let chunk = percent / chunk_size;
        let timed_out = now.duration_since(self.last_log_time) >= LOG_TIMEOUT;

        if force || chunk != self.last_logged_chunk || timed_out {
            sink.on_progress(percent as u8);
            self.last_logged_chunk = chunk;
            self.last_log_time = now;
        }

        self.last_reported_percent = percent;
    }
}
