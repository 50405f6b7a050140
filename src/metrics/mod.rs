//! Metrics for storage operations
//!
//! Counters cover chunk writes, deduplication hits, authentication
//! failures and file lifecycle events.

pub mod recorder;

pub use recorder::{
    init_metrics, record_auth_failure, record_chunk_written, record_file_deleted,
    record_orphans_collected, set_stored_files, IngestTimer,
};
