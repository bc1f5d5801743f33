use std::path::PathBuf;
use std::time::Duration;

use log::{info, warn};
use ort::session::builder::GraphOptimizationLevel;

use super::engine::WoundClassifier;
use super::error::ClassifierError;
use crate::config::{ClassifierConfig, Device, ImagingLimits, ModelSource};
use crate::provisioner::ModelProvisioner;
use crate::runtime::{create_session, RuntimeConfig};

/// Fluent construction of a [`WoundClassifier`].
///
/// `build` is idempotent with respect to on-disk state: an already
/// provisioned cache directory is reused as-is, a missing or corrupt
/// artifact is (re-)fetched, and the reduced-precision sibling is derived at
/// most once.
#[derive(Debug, Clone)]
pub struct ClassifierBuilder {
    config: ClassifierConfig,
    runtime_config: RuntimeConfig,
    limits: ImagingLimits,
}

impl ClassifierBuilder {
    pub fn new(config: ClassifierConfig) -> Self {
        Self { config, runtime_config: RuntimeConfig::default(), limits: ImagingLimits::default() }
    }

    /// Directory holding downloaded and derived model artifacts.
    pub fn with_cache_dir(mut self, cache_dir: impl Into<PathBuf>) -> Self {
        self.config.cache_dir = cache_dir.into();
        self
    }

    pub fn with_device(mut self, device: Device) -> Self {
        self.config.device = device;
        self
    }

    /// Derive and prefer a reduced-precision artifact when running on an
    /// accelerated device. Failure to derive never aborts construction.
    pub fn with_reduced_precision(mut self, enabled: bool) -> Self {
        self.config.use_reduced_precision = enabled;
        self
    }

    pub fn with_optimizations(mut self, enabled: bool) -> Self {
        self.config.enable_optimizations = enabled;
        self
    }

    pub fn with_download_timeout(mut self, timeout: Duration) -> Self {
        self.config.download_timeout = timeout;
        self
    }

    /// Overrides where the model artifact comes from.
    pub fn with_source(mut self, source: ModelSource) -> Self {
        self.config.source = source;
        self
    }

    pub fn with_runtime_config(mut self, runtime_config: RuntimeConfig) -> Self {
        self.runtime_config = runtime_config;
        self
    }

    pub fn with_imaging_limits(mut self, limits: ImagingLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Provisions the model artifact and constructs the engine.
    ///
    /// Provisioning failures are fatal: the engine cannot serve any
    /// classification until they are resolved, so they propagate instead of
    /// being swallowed.
    pub async fn build(mut self) -> Result<WoundClassifier, ClassifierError> {
        if !self.config.enable_optimizations {
            self.runtime_config.optimization_level = GraphOptimizationLevel::Disable;
        }

        let provisioner =
            ModelProvisioner::new(&self.config.cache_dir, self.config.download_timeout)
                .map_err(crate::provisioner::ProvisionError::from)?;

        let mut model_path = provisioner.ensure(&self.config.source).await?;
        info!("Model artifact ready at {}", model_path.display());

        if self.config.use_reduced_precision && self.config.device != Device::Cpu {
            match provisioner.ensure_reduced(&self.config.source, &self.runtime_config) {
                Ok(reduced) => {
                    info!("Using reduced-precision artifact at {}", reduced.display());
                    model_path = reduced;
                }
                Err(e) => {
                    warn!("Reduced-precision derivation failed ({}), using full precision", e);
                }
            }
        }

        let session = create_session(&model_path, &self.runtime_config, self.config.device)
            .map_err(|e| ClassifierError::ModelLoad(e.to_string()))?;
        info!("Classifier session initialized on {:?}", self.config.device);

        WoundClassifier::from_session(session, model_path, self.limits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_build_fails_without_reachable_artifact() {
        let dir = TempDir::new().unwrap();
        let source = ModelSource {
            name: "missing.onnx".to_string(),
            url: "http://127.0.0.1:1/unreachable.onnx".to_string(),
            tokenizer_url: None,
            min_bytes: 1024,
        };

        let result = WoundClassifier::builder()
            .with_cache_dir(dir.path())
            .with_source(source)
            .with_download_timeout(Duration::from_millis(200))
            .build()
            .await;

        assert!(matches!(result, Err(ClassifierError::Download(_))));
    }

    #[tokio::test]
    async fn test_build_rejects_undersized_cached_artifact() {
        let dir = TempDir::new().unwrap();
        // A pre-seeded 500-byte file must be treated as corrupt: discarded,
        // and with the remote unreachable the build surfaces a download error.
        std::fs::write(dir.path().join("stub.onnx"), vec![0u8; 500]).unwrap();
        let source = ModelSource {
            name: "stub.onnx".to_string(),
            url: "http://127.0.0.1:1/unreachable.onnx".to_string(),
            tokenizer_url: None,
            min_bytes: 1024,
        };

        let result = WoundClassifier::builder()
            .with_cache_dir(dir.path())
            .with_source(source)
            .with_download_timeout(Duration::from_millis(200))
            .build()
            .await;

        assert!(matches!(result, Err(ClassifierError::Download(_))));
        assert!(!dir.path().join("stub.onnx").exists());
    }
}
