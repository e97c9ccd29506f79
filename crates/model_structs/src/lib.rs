//! Common structs for model catalog records shared across crates.

mod civitai;
mod listing;
mod model_type;
mod record;

pub use civitai::*;
pub use listing::*;
pub use model_type::*;
pub use record::*;
