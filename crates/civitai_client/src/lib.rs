//! Civitai metadata enrichment.
//!
//! Looks catalogued models up on civitai.com by full file hash and merges what
//! the service knows about them into the catalog.

pub mod api;
mod enricher;
mod normalize;

pub use api::client::CivitaiClient;
pub use api::{MetadataService, ServiceError};
pub use enricher::{
    EnrichError, EnrichmentEvent, EnrichmentJob, ItemReport, ItemStatus, JobOutcome, JobState,
};
