//! Wound image classification and descriptor ranking engine on ONNX Runtime.
//!
//! Two decoupled stages share this crate: a [`WoundClassifier`] that maps a
//! photograph to one of five [`WoundClass`] labels with a calibrated
//! probability distribution, and a [`FeatureRanker`] that turns the predicted
//! label into the most salient clinical descriptors via embedding similarity
//! over a fixed catalogue. Both own their model lifecycle — download to a
//! local cache on first use, optional reduced-precision derivation, and
//! accelerated execution with CPU fallback.
//!
//! # Basic Usage
//!
//! ```no_run
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! use woundsight::{FeatureRanker, Language, RankerConfig, WoundClassifier};
//! use std::path::Path;
//!
//! let classifier = WoundClassifier::builder().build().await?;
//! let result = classifier.classify(Path::new("wound.jpg"))?;
//! println!("{} ({:.1}%)", result.predicted, result.confidence * 100.0);
//!
//! let ranker = FeatureRanker::new(RankerConfig::default())?;
//! for feature in ranker.extract_features(result.predicted, None, Language::En).await {
//!     println!("  {:.2}  {}", feature.score, feature.text);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Thread Safety
//!
//! Loaded sessions are immutable after construction and every inference call
//! is serialized behind an internal lock, so both components can be shared
//! across tasks with `Arc`.

pub mod analysis;
pub mod classifier;
pub mod config;
pub mod imaging;
pub mod provisioner;
pub mod ranker;
mod runtime;
pub mod wound;

pub use analysis::{AnalysisPipeline, AnalysisStrategy, WoundAnalysis};
pub use classifier::{ClassifierBuilder, ClassifierError, PerformanceStats, WoundClassifier};
pub use config::{ClassifierConfig, Device, ImagingLimits, ModelSource, RankerConfig};
pub use imaging::{ImageError, ImageInfo};
pub use provisioner::{ModelProvisioner, ProvisionError, ProvisionState};
pub use ranker::{DescriptorCatalogue, FeatureRanker, RankedFeature, RankerError};
pub use runtime::{create_session_builder, RuntimeConfig};
pub use wound::{ClassificationResult, Language, WoundClass};

pub fn init_logger() {
    env_logger::init();
}
