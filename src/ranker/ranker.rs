use std::sync::Arc;

use log::{error, info, warn};
use serde::Serialize;
use tokio::sync::Mutex;

use super::cache::EmbeddingCache;
use super::catalogue::{CatalogueStats, DescriptorCatalogue};
use super::encoder::{dot, TextEncoder};
use super::error::RankerError;
use crate::config::RankerConfig;
use crate::provisioner::ModelProvisioner;
use crate::runtime::RuntimeConfig;
use crate::wound::{Language, WoundClass};

/// One selected descriptor with its similarity score.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedFeature {
    pub text: String,
    pub score: f32,
}

/// Selects the most salient textual descriptors for a wound class by
/// embedding similarity against a fixed reference.
///
/// Ranking is similarity to the **first** descriptor of the class's English
/// list, authored as the clinically central description. The predicted class
/// label is the only input — the uploaded image is never re-encoded here;
/// classification and description are deliberately decoupled stages. This is
/// a known simplification, not image-grounded ranking.
///
/// The public surface is best-effort: per-call failures (unknown class name,
/// empty catalogue, encoding errors) return an empty list, never an error.
/// Callers must treat an empty feature list as valid output.
pub struct FeatureRanker {
    config: RankerConfig,
    runtime_config: RuntimeConfig,
    catalogue: DescriptorCatalogue,
    cache: EmbeddingCache,
    provisioner: ModelProvisioner,
    // Loaded lazily on first use, then reused for the component's lifetime.
    encoder: Mutex<Option<Arc<TextEncoder>>>,
}

impl FeatureRanker {
    /// Cheap construction; the heavy encoder load happens on first use.
    pub fn new(config: RankerConfig) -> Result<Self, RankerError> {
        let cache = EmbeddingCache::new(&config.feature_cache_dir, config.enable_caching)?;
        let provisioner = ModelProvisioner::new(&config.model_dir, config.download_timeout)?;
        Ok(Self {
            config,
            runtime_config: RuntimeConfig::default(),
            catalogue: DescriptorCatalogue::new(),
            cache,
            provisioner,
            encoder: Mutex::new(None),
        })
    }

    pub fn with_runtime_config(mut self, runtime_config: RuntimeConfig) -> Self {
        self.runtime_config = runtime_config;
        self
    }

    /// Eagerly loads the encoder. Optional; `extract_features` does the same
    /// lazily. Useful to front-load the download and model load at startup.
    pub async fn warm_up(&self) -> Result<(), RankerError> {
        self.encoder().await.map(|_| ())
    }

    async fn encoder(&self) -> Result<Arc<TextEncoder>, RankerError> {
        let mut slot = self.encoder.lock().await;
        if let Some(encoder) = slot.as_ref() {
            return Ok(Arc::clone(encoder));
        }

        let model_path = self.provisioner.ensure(&self.config.source).await?;
        let tokenizer_path = self
            .provisioner
            .tokenizer_path(&self.config.source)
            .ok_or_else(|| RankerError::Model("encoder source has no tokenizer".to_string()))?;

        let encoder = Arc::new(TextEncoder::load(
            &model_path,
            &tokenizer_path,
            &self.runtime_config,
            self.config.device,
        )?);
        info!("Feature ranker encoder initialized on {:?}", self.config.device);
        *slot = Some(Arc::clone(&encoder));
        Ok(encoder)
    }

    /// Returns the top descriptors for `class`, best first.
    ///
    /// `top_k` falls back to the configured maximum when `None`. Non-English
    /// output is produced by positional remap into the requested language's
    /// list, with per-entry English fallback if the translation is missing.
    pub async fn extract_features(
        &self,
        class: WoundClass,
        top_k: Option<usize>,
        language: Language,
    ) -> Vec<RankedFeature> {
        match self.try_extract(class, top_k, language).await {
            Ok(features) => features,
            Err(e) => {
                error!("Feature extraction failed for {}: {}", class, e);
                Vec::new()
            }
        }
    }

    /// String-keyed variant for callers holding an untyped class label.
    /// Unknown labels yield an empty list.
    pub async fn extract_features_by_name(
        &self,
        class_name: &str,
        top_k: Option<usize>,
        language: Language,
    ) -> Vec<RankedFeature> {
        match class_name.parse::<WoundClass>() {
            Ok(class) => self.extract_features(class, top_k, language).await,
            Err(_) => {
                warn!("No descriptors available for class '{}'", class_name);
                Vec::new()
            }
        }
    }

    async fn try_extract(
        &self,
        class: WoundClass,
        top_k: Option<usize>,
        language: Language,
    ) -> Result<Vec<RankedFeature>, RankerError> {
        let top_k = top_k.unwrap_or(self.config.max_features);

        // English is authoritative for similarity scoring regardless of the
        // requested output language.
        let english = self.catalogue.descriptors(class, Language::En);
        if english.is_empty() {
            return Err(RankerError::NoFeatures(class.to_string()));
        }

        let embeddings = self.embeddings_for(english).await?;

        let reference = &embeddings[0];
        let scores: Vec<f32> = embeddings.iter().map(|embedding| dot(reference, embedding)).collect();

        let selected = rank(&scores, self.config.similarity_threshold, top_k);

        let localized = match language {
            Language::En => english,
            Language::Th => self.catalogue.descriptors(class, Language::Th),
        };
        Ok(selected
            .into_iter()
            .map(|(index, score)| RankedFeature {
                text: localized.get(index).copied().unwrap_or(english[index]).to_string(),
                score,
            })
            .collect())
    }

    async fn embeddings_for(
        &self,
        descriptors: &[&str],
    ) -> Result<Vec<ndarray::Array1<f32>>, RankerError> {
        let key = EmbeddingCache::content_key(descriptors);
        if let Some(cached) = self.cache.load(&key, descriptors.len()) {
            return Ok(cached);
        }

        let encoder = self.encoder().await?;
        let embeddings = encoder.encode_batch(descriptors)?;
        self.cache.store(&key, &embeddings);
        Ok(embeddings)
    }

    /// Cosine similarity of two ad-hoc texts, clamped to [0, 1]. Utility
    /// method, not on the hot path; returns 0.0 on any failure.
    pub async fn compare_features(&self, a: &str, b: &str) -> f32 {
        let result = async {
            let encoder = self.encoder().await?;
            let batch = encoder.encode_batch(&[a, b])?;
            Ok::<f32, RankerError>(dot(&batch[0], &batch[1]))
        }
        .await;

        match result {
            Ok(similarity) => similarity.clamp(0.0, 1.0),
            Err(e) => {
                error!("Feature comparison failed: {}", e);
                0.0
            }
        }
    }

    /// The full catalogue in the given language. Read-only.
    pub fn all_features(&self, language: Language) -> Vec<(WoundClass, &'static [&'static str])> {
        self.catalogue.all(language)
    }

    pub fn feature_stats(&self) -> CatalogueStats {
        self.catalogue.stats()
    }

    /// Deletes every persisted embedding batch. Call after editing the
    /// catalogue; entries are never invalidated automatically.
    pub fn clear_cache(&self) -> usize {
        match self.cache.clear() {
            Ok(removed) => {
                info!("Cleared {} embedding cache entries", removed);
                removed
            }
            Err(e) => {
                warn!("Failed to clear embedding cache: {}", e);
                0
            }
        }
    }
}

/// Pure ranking step: drop entries under `threshold`, sort descending by
/// score with catalogue order breaking ties (stable sort), truncate to
/// `top_k`. Returns (original index, score) pairs.
pub(crate) fn rank(scores: &[f32], threshold: f32, top_k: usize) -> Vec<(usize, f32)> {
    let mut selected: Vec<(usize, f32)> = scores
        .iter()
        .copied()
        .enumerate()
        .filter(|&(_, score)| score >= threshold)
        .collect();

    selected.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    selected.truncate(top_k);
    selected
}
