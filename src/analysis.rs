//! End-to-end analysis with an explicit degradation chain.
//!
//! Strategies are tried in a fixed order, each logging its own outcome,
//! instead of nesting fallbacks inside exception handlers. The chain is
//! inference first, then (only when enabled) a random simulation that keeps
//! the conversation flowing while the models are unavailable.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{info, warn};
use rand::Rng;
use serde::Serialize;

use crate::classifier::{ClassifierError, WoundClassifier};
use crate::ranker::{FeatureRanker, RankedFeature};
use crate::wound::{Language, WoundClass};

/// Merged classification + ranking payload handed to the caller.
#[derive(Debug, Clone, Serialize)]
pub struct WoundAnalysis {
    pub predicted_class: WoundClass,
    /// Localized display label of the predicted class.
    pub label: String,
    pub confidence: f32,
    /// Distribution keyed by localized class labels, in enumeration order.
    pub probabilities: Vec<(String, f32)>,
    pub features: Vec<RankedFeature>,
    /// True when the result came from the simulation strategy, not a model.
    pub simulated: bool,
    #[serde(skip)]
    pub processing_time: Duration,
}

/// Ordered strategies the pipeline will attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisStrategy {
    Inference,
    Simulation,
}

/// Drives classifier and ranker for one image and merges their output.
pub struct AnalysisPipeline {
    classifier: Arc<WoundClassifier>,
    ranker: Arc<FeatureRanker>,
    language: Language,
    top_k: Option<usize>,
    simulation_fallback: bool,
}

impl AnalysisPipeline {
    pub fn new(
        classifier: Arc<WoundClassifier>,
        ranker: Arc<FeatureRanker>,
        language: Language,
    ) -> Self {
        Self { classifier, ranker, language, top_k: None, simulation_fallback: false }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = Some(top_k);
        self
    }

    /// Enables the simulation strategy as the last resort. Off by default:
    /// most deployments prefer a visible failure over fabricated output.
    pub fn with_simulation_fallback(mut self, enabled: bool) -> Self {
        self.simulation_fallback = enabled;
        self
    }

    /// The strategy order this pipeline will attempt.
    pub fn strategies(&self) -> Vec<AnalysisStrategy> {
        strategy_chain(self.simulation_fallback)
    }

    /// Analyzes one image, walking the strategy chain in order.
    pub async fn analyze(&self, path: &Path) -> Result<WoundAnalysis, ClassifierError> {
        let mut last_err = None;

        for strategy in self.strategies() {
            match strategy {
                AnalysisStrategy::Inference => match self.run_inference(path).await {
                    Ok(analysis) => {
                        info!("Analysis strategy {:?} succeeded", strategy);
                        return Ok(analysis);
                    }
                    Err(e) => {
                        warn!("Analysis strategy {:?} failed: {}", strategy, e);
                        last_err = Some(e);
                    }
                },
                AnalysisStrategy::Simulation => {
                    warn!("Falling back to simulated analysis for {}", path.display());
                    return Ok(self.simulate());
                }
            }
        }

        Err(last_err.expect("strategy chain always contains inference"))
    }

    async fn run_inference(&self, path: &Path) -> Result<WoundAnalysis, ClassifierError> {
        let start = Instant::now();

        let classification = self.classifier.classify(path)?;
        // Best-effort enrichment: an empty feature list is valid output.
        let features =
            self.ranker.extract_features(classification.predicted, self.top_k, self.language).await;

        Ok(WoundAnalysis {
            predicted_class: classification.predicted,
            label: classification.predicted.label(self.language).to_string(),
            confidence: classification.confidence,
            probabilities: classification.labelled_probabilities(self.language),
            features,
            simulated: false,
            processing_time: start.elapsed(),
        })
    }

    fn simulate(&self) -> WoundAnalysis {
        let start = Instant::now();
        let mut rng = rand::thread_rng();

        let predicted = WoundClass::ALL[rng.gen_range(0..WoundClass::COUNT)];
        let confidence: f32 = rng.gen_range(0.7..0.95);

        let mut probabilities = [0f32; WoundClass::COUNT];
        let mut rest: f32 = 0.0;
        for (i, slot) in probabilities.iter_mut().enumerate() {
            if i != predicted.index() {
                *slot = rng.gen_range(0.01..0.15);
                rest += *slot;
            }
        }
        // Scale the remainder so the vector still sums to 1.0.
        let scale = (1.0 - confidence) / rest;
        for (i, slot) in probabilities.iter_mut().enumerate() {
            if i == predicted.index() {
                *slot = confidence;
            } else {
                *slot *= scale;
            }
        }

        let descriptors = self
            .ranker
            .all_features(self.language)
            .into_iter()
            .find(|(class, _)| *class == predicted)
            .map(|(_, list)| list)
            .unwrap_or(&[]);
        let features = descriptors
            .iter()
            .take(3)
            .map(|text| RankedFeature { text: text.to_string(), score: rng.gen_range(0.5..1.0) })
            .collect();

        WoundAnalysis {
            predicted_class: predicted,
            label: predicted.label(self.language).to_string(),
            confidence,
            probabilities: WoundClass::ALL
                .iter()
                .map(|c| (c.label(self.language).to_string(), probabilities[c.index()]))
                .collect(),
            features,
            simulated: true,
            processing_time: start.elapsed(),
        }
    }
}

fn strategy_chain(simulation_fallback: bool) -> Vec<AnalysisStrategy> {
    let mut strategies = vec![AnalysisStrategy::Inference];
    if simulation_fallback {
        strategies.push(AnalysisStrategy::Simulation);
    }
    strategies
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_order_is_inference_first() {
        assert_eq!(strategy_chain(false), vec![AnalysisStrategy::Inference]);
        assert_eq!(
            strategy_chain(true),
            vec![AnalysisStrategy::Inference, AnalysisStrategy::Simulation]
        );
    }
}
