//! Background cleanup for expiring cache records.

pub mod cleanup;

pub use cleanup::{BackgroundCleanup, CleanupStats};
