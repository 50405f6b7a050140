//! Persistence layer
//!
//! A single SQLite database holding three logical stores: chunk bytes
//! (keyed by content hash, indexed by owning file), file metadata and
//! free-form configuration. The connection pool is opened lazily, once,
//! and shared by every clone of [`Database`].

pub mod chunks;
pub mod config;
pub mod database;
pub mod error;
pub mod metadata;

pub use chunks::{GcStats, StoreStats};
pub use database::{Database, SCHEMA_VERSION};
pub use error::{StoreError, StoreResult};
