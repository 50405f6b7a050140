//! Metrics recorder for chunk vault operations
//!
//! Uses the `metrics` facade. Without an installed recorder every call is a
//! no-op, so the library never requires an exporter.

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

static METRICS_INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Initialize metric descriptions (call once at startup)
pub fn init_metrics() {
    if METRICS_INITIALIZED.swap(true, Ordering::SeqCst) {
        return; // Already initialized
    }

    // Chunk counters
    describe_counter!(
        "chunkvault_chunks_written_total",
        "Chunks whose bytes were newly persisted"
    );
    describe_counter!(
        "chunkvault_chunks_deduplicated_total",
        "Chunks that matched an already stored content hash"
    );
    describe_counter!(
        "chunkvault_bytes_written_total",
        "Bytes persisted to the chunk store"
    );
    describe_counter!(
        "chunkvault_auth_failures_total",
        "Chunks that failed authenticated decryption or checksum verification"
    );

    // File counters
    describe_counter!("chunkvault_files_ingested_total", "Files ingested");
    describe_counter!("chunkvault_files_deleted_total", "Files deleted");
    describe_counter!(
        "chunkvault_orphans_collected_total",
        "Orphaned chunk rows removed by reconciliation"
    );

    // Gauges
    describe_gauge!("chunkvault_stored_files", "Files with a metadata record");

    // Histograms
    describe_histogram!(
        "chunkvault_ingest_duration_seconds",
        "Time to chunk, encrypt and persist one file"
    );
}

// ============== Chunk Operations ==============

/// Record a chunk being written (or matched by an existing blob)
pub fn record_chunk_written(bytes: usize, deduplicated: bool) {
    if deduplicated {
        counter!("chunkvault_chunks_deduplicated_total").increment(1);
    } else {
        counter!("chunkvault_chunks_written_total").increment(1);
        counter!("chunkvault_bytes_written_total").increment(bytes as u64);
    }
}

/// Record a chunk failing integrity or authentication
pub fn record_auth_failure(reason: &str) {
    counter!("chunkvault_auth_failures_total", "reason" => reason.to_string()).increment(1);
}

// ============== File Operations ==============

pub fn record_file_ingested(duration: Duration) {
    counter!("chunkvault_files_ingested_total").increment(1);
    histogram!("chunkvault_ingest_duration_seconds").record(duration.as_secs_f64());
}

pub fn record_file_deleted() {
    counter!("chunkvault_files_deleted_total").increment(1);
}

pub fn record_orphans_collected(rows: u64) {
    counter!("chunkvault_orphans_collected_total").increment(rows);
}

pub fn set_stored_files(count: u64) {
    gauge!("chunkvault_stored_files").set(count as f64);
}

/// Times one ingestion and records it on completion
pub struct IngestTimer {
    start_time: Instant,
}

impl IngestTimer {
    pub fn start() -> Self {
        Self {
            start_time: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    pub fn complete(self) {
        record_file_ingested(self.start_time.elapsed());
    }
}
