use crate::imaging::ImageError;
use crate::provisioner::ProvisionError;

/// Errors surfaced by the classifier engine.
///
/// Build-time failures (`Download`, `ModelLoad`) are fatal to the instance;
/// per-call failures (`InvalidImage`, `Inference`) affect only that call.
#[derive(Debug, thiserror::Error)]
pub enum ClassifierError {
    #[error("Invalid image: {0}")]
    InvalidImage(#[from] ImageError),
    #[error("Model provisioning failed: {0}")]
    Download(#[from] ProvisionError),
    #[error("Model load failed: {0}")]
    ModelLoad(String),
    #[error("Inference error: {0}")]
    Inference(String),
}
