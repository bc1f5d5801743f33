mod builder;
mod engine;
mod error;
mod stats;

pub use builder::ClassifierBuilder;
pub use engine::{ClassifierInfo, WoundClassifier};
pub use error::ClassifierError;
pub use stats::{PerformanceRecorder, PerformanceStats};
