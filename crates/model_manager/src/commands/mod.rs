//! CLI command implementations.

pub mod enrich;
pub mod list;
pub mod scan;
pub mod search;

mod output;
