mod cache;
mod catalogue;
mod encoder;
mod error;
#[allow(clippy::module_inception)]
mod ranker;

pub use cache::EmbeddingCache;
pub use catalogue::{CatalogueStats, DescriptorCatalogue};
pub use encoder::TextEncoder;
pub use error::RankerError;
pub use ranker::{FeatureRanker, RankedFeature};
