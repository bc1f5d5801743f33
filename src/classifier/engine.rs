use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Instant;

use image::imageops::{self, FilterType};
use image::RgbImage;
use log::info;
use ndarray::{Array4, ArrayViewD};
use ort::session::Session;
use ort::value::Tensor;

use super::error::ClassifierError;
use super::stats::{PerformanceRecorder, PerformanceStats};
use crate::config::{ClassifierConfig, ImagingLimits};
use crate::imaging;
use crate::wound::{ClassificationResult, Language, WoundClass};

/// Shorter image side after the initial resize.
const RESIZE_TARGET: u32 = 256;
/// Side length of the square fed to the network.
const CROP_SIZE: u32 = 224;
/// Per-channel normalization constants matching the training distribution.
const MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Maps a wound photograph to a [`WoundClass`] with a calibrated probability
/// distribution.
///
/// The loaded session is immutable after construction; calls are serialized
/// behind a lock because ONNX execution contexts are not assumed reentrant.
/// Per-call failures leave the engine usable for subsequent calls.
pub struct WoundClassifier {
    session: Mutex<Session>,
    input_name: String,
    model_path: PathBuf,
    limits: ImagingLimits,
    recorder: PerformanceRecorder,
}

/// Snapshot of the engine's configuration for diagnostics.
#[derive(Debug, Clone)]
pub struct ClassifierInfo {
    pub model_path: PathBuf,
    pub input_name: String,
    pub class_labels: Vec<&'static str>,
}

impl WoundClassifier {
    /// Creates a new builder for fluent construction.
    pub fn builder() -> super::builder::ClassifierBuilder {
        super::builder::ClassifierBuilder::new(ClassifierConfig::default())
    }

    pub(super) fn from_session(
        session: Session,
        model_path: PathBuf,
        limits: ImagingLimits,
    ) -> Result<Self, ClassifierError> {
        if session.outputs.is_empty() {
            return Err(ClassifierError::ModelLoad(
                "Model must have at least 1 output for class logits".to_string(),
            ));
        }
        let input_name = session
            .inputs
            .first()
            .map(|input| input.name.clone())
            .ok_or_else(|| ClassifierError::ModelLoad("Model has no inputs".to_string()))?;

        Ok(Self {
            session: Mutex::new(session),
            input_name,
            model_path,
            limits,
            recorder: PerformanceRecorder::new(),
        })
    }

    pub fn info(&self) -> ClassifierInfo {
        ClassifierInfo {
            model_path: self.model_path.clone(),
            input_name: self.input_name.clone(),
            class_labels: WoundClass::ALL.iter().map(|c| c.label(Language::En)).collect(),
        }
    }

    /// Classifies the image at `path`.
    ///
    /// The image is validated, preprocessed with the fixed transform the
    /// network was trained against, and run through a single forward pass.
    /// The returned distribution sums to 1.0 within floating-point epsilon.
    pub fn classify(&self, path: &Path) -> Result<ClassificationResult, ClassifierError> {
        let start = Instant::now();

        imaging::validate(path, &self.limits)?;
        let rgb = imaging::load_rgb(path)?;
        let input = preprocess(&rgb);
        let probabilities = self.run_inference(input)?;

        let predicted_idx = argmax(&probabilities);
        let predicted = WoundClass::from_index(predicted_idx).ok_or_else(|| {
            ClassifierError::Inference(format!("argmax index {} out of range", predicted_idx))
        })?;
        let confidence = probabilities[predicted_idx];

        let elapsed = start.elapsed();
        self.recorder.record(elapsed);
        info!(
            "Prediction: {} (confidence: {:.3}, time: {:.3}s)",
            predicted,
            confidence,
            elapsed.as_secs_f64()
        );

        Ok(ClassificationResult { predicted, confidence, probabilities, elapsed })
    }

    /// [`classify`](Self::classify) re-expressed with localized class labels,
    /// in enumeration order.
    pub fn class_probabilities(
        &self,
        path: &Path,
        language: Language,
    ) -> Result<Vec<(String, f32)>, ClassifierError> {
        let result = self.classify(path)?;
        Ok(result.labelled_probabilities(language))
    }

    /// Latency statistics over all predictions since construction or the
    /// last [`reset_stats`](Self::reset_stats); `None` before the first one.
    pub fn performance_stats(&self) -> Option<PerformanceStats> {
        self.recorder.stats()
    }

    pub fn reset_stats(&self) {
        self.recorder.reset();
    }

    fn run_inference(
        &self,
        input: Array4<f32>,
    ) -> Result<[f32; WoundClass::COUNT], ClassifierError> {
        let input_dyn = input.into_dyn();
        let input_view = input_dyn.as_standard_layout();
        let tensor = Tensor::from_array(&input_view)
            .map_err(|e| ClassifierError::Inference(format!("Failed to create input tensor: {}", e)))?;

        let mut input_tensors = HashMap::new();
        input_tensors.insert(self.input_name.as_str(), tensor);

        let session = self
            .session
            .lock()
            .map_err(|_| ClassifierError::Inference("session lock poisoned".to_string()))?;
        let outputs = session
            .run(input_tensors)
            .map_err(|e| ClassifierError::Inference(format!("Failed to run model: {}", e)))?;
        let logits = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| ClassifierError::Inference(format!("Failed to extract output: {}", e)))?;

        let row = extract_logit_row(&logits)?;
        let probs = softmax(&row);

        let mut probabilities = [0f32; WoundClass::COUNT];
        probabilities.copy_from_slice(&probs);
        Ok(probabilities)
    }
}

fn extract_logit_row(logits: &ArrayViewD<'_, f32>) -> Result<Vec<f32>, ClassifierError> {
    let row: Vec<f32> = match logits.ndim() {
        1 => logits.iter().cloned().collect(),
        2 => logits.slice(ndarray::s![0, ..]).iter().cloned().collect(),
        n => {
            return Err(ClassifierError::Inference(format!(
                "unexpected output rank {} (shape {:?})",
                n,
                logits.shape()
            )))
        }
    };

    if row.len() != WoundClass::COUNT {
        return Err(ClassifierError::Inference(format!(
            "model produced {} logits, expected {}",
            row.len(),
            WoundClass::COUNT
        )));
    }
    Ok(row)
}

/// Resize so the shorter side reaches [`RESIZE_TARGET`], center-crop to
/// [`CROP_SIZE`], scale to [0,1] and normalize per channel. Output layout is
/// NCHW with batch size 1.
pub(crate) fn preprocess(rgb: &RgbImage) -> Array4<f32> {
    let (width, height) = rgb.dimensions();
    let (new_width, new_height) = if width <= height {
        let scaled = (height as f64 * RESIZE_TARGET as f64 / width as f64).round() as u32;
        (RESIZE_TARGET, scaled.max(RESIZE_TARGET))
    } else {
        let scaled = (width as f64 * RESIZE_TARGET as f64 / height as f64).round() as u32;
        (scaled.max(RESIZE_TARGET), RESIZE_TARGET)
    };

    let resized = imageops::resize(rgb, new_width, new_height, FilterType::Triangle);
    let left = (new_width - CROP_SIZE) / 2;
    let top = (new_height - CROP_SIZE) / 2;
    let cropped = imageops::crop_imm(&resized, left, top, CROP_SIZE, CROP_SIZE).to_image();

    let size = CROP_SIZE as usize;
    let mut input = Array4::<f32>::zeros((1, 3, size, size));
    for (x, y, pixel) in cropped.enumerate_pixels() {
        for channel in 0..3 {
            let value = pixel[channel] as f32 / 255.0;
            input[[0, channel, y as usize, x as usize]] = (value - MEAN[channel]) / STD[channel];
        }
    }
    input
}

/// Numerically-stable softmax: the row maximum is subtracted before
/// exponentiation.
pub(crate) fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    let exp: Vec<f32> = logits.iter().map(|&l| (l - max).exp()).collect();
    let sum: f32 = exp.iter().sum();
    exp.iter().map(|&e| e / sum).collect()
}

/// Index of the maximum entry; ties resolve to the lowest index.
pub(crate) fn argmax(values: &[f32]) -> usize {
    let mut best = 0;
    for (i, &value) in values.iter().enumerate() {
        if value > values[best] {
            best = i;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_softmax_is_a_distribution() {
        let probs = softmax(&[1.0, 2.0, 3.0, 4.0, 5.0]);
        assert_eq!(probs.len(), 5);
        let sum: f32 = probs.iter().sum();
        assert!((sum - 1.0).abs() < 1e-5);
        assert!(probs.iter().all(|&p| (0.0..=1.0).contains(&p)));
        // Monotone in the logits.
        assert!(probs[4] > probs[3] && probs[3] > probs[0]);
    }

    #[test]
    fn test_softmax_is_stable_for_large_logits() {
        let probs = softmax(&[1000.0, 1000.0, 0.0, -1000.0, 500.0]);
        assert!(probs.iter().all(|p| p.is_finite()));
        let sum: f32 = probs.iter().sum();
        assert!((sum - 1.0).abs() < 1e-5);
        assert!((probs[0] - 0.5).abs() < 1e-5);
        assert!((probs[1] - 0.5).abs() < 1e-5);
    }

    #[test]
    fn test_softmax_shift_invariance() {
        let a = softmax(&[0.1, 0.2, 0.3, 0.4, 0.5]);
        let b = softmax(&[100.1, 100.2, 100.3, 100.4, 100.5]);
        for (x, y) in a.iter().zip(&b) {
            assert!((x - y).abs() < 1e-6);
        }
    }

    #[test]
    fn test_argmax_tie_breaks_to_lowest_index() {
        assert_eq!(argmax(&[0.2, 0.4, 0.4, 0.0, 0.0]), 1);
        assert_eq!(argmax(&[0.5, 0.5, 0.5, 0.5, 0.5]), 0);
        assert_eq!(argmax(&[0.0, 0.1, 0.0, 0.9, 0.0]), 3);
    }

    #[test]
    fn test_preprocess_shape_and_range() {
        let img = RgbImage::from_pixel(320, 480, Rgb([128, 128, 128]));
        let input = preprocess(&img);
        assert_eq!(input.shape(), &[1, 3, 224, 224]);

        // 128/255 normalized per channel; every value well inside the range
        // the transform can produce.
        for &v in input.iter() {
            assert!(v > -3.0 && v < 3.0);
        }
        let expected_r = (128.0 / 255.0 - MEAN[0]) / STD[0];
        assert!((input[[0, 0, 0, 0]] - expected_r).abs() < 1e-3);
    }

    #[test]
    fn test_preprocess_handles_landscape_and_portrait() {
        for (w, h) in [(640u32, 360u32), (360, 640), (224, 224), (256, 256)] {
            let img = RgbImage::from_pixel(w, h, Rgb([10, 200, 90]));
            let input = preprocess(&img);
            assert_eq!(input.shape(), &[1, 3, 224, 224]);
        }
    }
}
