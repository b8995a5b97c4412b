//! Pattern matching and per-file content search.
//!
//! [`PatternMatcher`] wraps a compiled regular expression in both its text and
//! byte forms. [`scan_file`] searches one file through a read-only memory map
//! while holding a slot of the run's [`crate::sync::PermitPool`], so the number
//! of files open for scanning never exceeds the configured limit.
pub mod matcher;
pub mod scanner;

pub use matcher::PatternMatcher;
pub use scanner::{scan_file, ScanContext, ScanOutcome};
