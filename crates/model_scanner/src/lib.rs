//! Model file discovery.
//!
//! Walks the configured type folders, fingerprints new or changed files and
//! reconciles the results with the catalog.

pub mod fingerprint;
mod scanner;
pub mod sidecar;

pub use fingerprint::{FingerprintError, identify, verify};
pub use scanner::{ScanConfig, ScanStats, scan};
