use crate::provisioner::ProvisionError;

/// Internal ranker failures.
///
/// None of these escape [`extract_features`](super::FeatureRanker::extract_features):
/// the public contract is best-effort enrichment, so per-call errors collapse
/// into an empty result at the surface.
#[derive(Debug, thiserror::Error)]
pub enum RankerError {
    #[error("No descriptors available for class '{0}'")]
    NoFeatures(String),
    #[error("Tokenizer error: {0}")]
    Tokenizer(String),
    #[error("Encoder model error: {0}")]
    Model(String),
    #[error("Encoder provisioning failed: {0}")]
    Provision(#[from] ProvisionError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
