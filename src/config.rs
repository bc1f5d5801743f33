use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::wound::Language;

/// Default remote location of the wound classification network.
const DEFAULT_MODEL_URL: &str =
    "https://huggingface.co/PogusTheWhisper/Surgicare-ALB-fold4-stage3/resolve/main/topdown_model_fold4_stage3_opset_20.onnx";

/// Default remote location of the text-encoder export used for descriptor
/// ranking (ONNX model plus its tokenizer definition).
const DEFAULT_ENCODER_URL: &str =
    "https://huggingface.co/microsoft/BiomedVLP-BioViL-T/resolve/main/onnx/model.onnx";
const DEFAULT_TOKENIZER_URL: &str =
    "https://huggingface.co/microsoft/BiomedVLP-BioViL-T/resolve/main/tokenizer.json";

/// Any artifact smaller than this is treated as a truncated download.
const DEFAULT_MIN_ARTIFACT_BYTES: u64 = 1024;

/// Compute device requested for model execution.
///
/// `Auto` resolves to the accelerated backend when the runtime reports it
/// available, otherwise CPU.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    #[default]
    Auto,
    Cuda,
    Cpu,
}

impl FromStr for Device {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(Device::Auto),
            "cuda" | "gpu" => Ok(Device::Cuda),
            "cpu" => Ok(Device::Cpu),
            other => Err(format!("unknown device: {} (expected auto, cuda or cpu)", other)),
        }
    }
}

/// Identity of a remote model artifact: where to fetch it and how small a
/// downloaded file may be before it is treated as corrupt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSource {
    /// File name under the local models directory.
    pub name: String,
    /// Remote URL of the canonical artifact.
    pub url: String,
    /// Optional tokenizer definition fetched alongside the model.
    pub tokenizer_url: Option<String>,
    /// Minimum plausible artifact size in bytes.
    pub min_bytes: u64,
}

impl ModelSource {
    /// The wound classification network.
    pub fn wound_model() -> Self {
        Self {
            name: "wound_model_fp32.onnx".to_string(),
            url: env::var("WOUNDSIGHT_MODEL_URL").unwrap_or_else(|_| DEFAULT_MODEL_URL.to_string()),
            tokenizer_url: None,
            min_bytes: DEFAULT_MIN_ARTIFACT_BYTES,
        }
    }

    /// The text encoder used for descriptor ranking.
    pub fn text_encoder() -> Self {
        Self {
            name: "feature_encoder.onnx".to_string(),
            url: env::var("WOUNDSIGHT_ENCODER_URL")
                .unwrap_or_else(|_| DEFAULT_ENCODER_URL.to_string()),
            tokenizer_url: Some(
                env::var("WOUNDSIGHT_TOKENIZER_URL")
                    .unwrap_or_else(|_| DEFAULT_TOKENIZER_URL.to_string()),
            ),
            min_bytes: DEFAULT_MIN_ARTIFACT_BYTES,
        }
    }
}

/// Returns the default cache directory for model artifacts and derived files.
pub fn default_cache_dir() -> PathBuf {
    // 1. Check environment variable
    if let Ok(path) = env::var("WOUNDSIGHT_CACHE") {
        return PathBuf::from(path);
    }

    // 2. Use platform-specific cache directory
    if let Some(cache_dir) = dirs::cache_dir() {
        return cache_dir.join("woundsight");
    }

    // 3. Fallback to user's home directory
    if let Some(home_dir) = dirs::home_dir() {
        return home_dir.join(".cache").join("woundsight");
    }

    // 4. If all else fails, use system temp directory (platform agnostic)
    env::temp_dir().join("woundsight")
}

/// Configuration for the classifier engine.
#[derive(Debug, Clone)]
pub struct ClassifierConfig {
    /// Directory holding downloaded and derived model artifacts.
    pub cache_dir: PathBuf,
    /// Requested compute device.
    pub device: Device,
    /// Derive and prefer a reduced-precision artifact on accelerated devices.
    pub use_reduced_precision: bool,
    /// Enable graph optimizations in the runtime session.
    pub enable_optimizations: bool,
    /// Timeout for the one-time model download.
    pub download_timeout: Duration,
    /// Where the model comes from.
    pub source: ModelSource,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            cache_dir: default_cache_dir().join("models"),
            device: env_parse("WOUNDSIGHT_DEVICE", Device::Auto),
            use_reduced_precision: env_parse("WOUNDSIGHT_USE_REDUCED_PRECISION", true),
            enable_optimizations: true,
            download_timeout: Duration::from_secs(env_parse("WOUNDSIGHT_DOWNLOAD_TIMEOUT", 300u64)),
            source: ModelSource::wound_model(),
        }
    }
}

/// Configuration for the feature ranker.
#[derive(Debug, Clone)]
pub struct RankerConfig {
    /// Directory holding the encoder artifacts.
    pub model_dir: PathBuf,
    /// Directory holding persisted embedding batches.
    pub feature_cache_dir: PathBuf,
    /// Whether embedding batches are persisted at all.
    pub enable_caching: bool,
    /// Requested compute device.
    pub device: Device,
    /// Descriptors scoring below this are dropped.
    pub similarity_threshold: f32,
    /// Default number of descriptors returned when the caller passes none.
    pub max_features: usize,
    /// Language used when the caller passes none.
    pub default_language: Language,
    /// Timeout for the one-time encoder download.
    pub download_timeout: Duration,
    /// Where the encoder comes from.
    pub source: ModelSource,
}

impl Default for RankerConfig {
    fn default() -> Self {
        Self {
            model_dir: default_cache_dir().join("models"),
            feature_cache_dir: default_cache_dir().join("features"),
            enable_caching: env_parse("WOUNDSIGHT_USE_DISK_CACHE", true),
            device: env_parse("WOUNDSIGHT_DEVICE", Device::Auto),
            similarity_threshold: env_parse("WOUNDSIGHT_SIMILARITY_THRESHOLD", 0.3f32),
            max_features: env_parse("WOUNDSIGHT_MAX_FEATURES", 10usize),
            default_language: env_parse("WOUNDSIGHT_LANGUAGE", Language::En),
            download_timeout: Duration::from_secs(env_parse("WOUNDSIGHT_DOWNLOAD_TIMEOUT", 300u64)),
            source: ModelSource::text_encoder(),
        }
    }
}

/// Size and format constraints applied to input images.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ImagingLimits {
    /// Hard cap on input file size in bytes.
    pub max_file_bytes: u64,
    /// Minimum width and height in pixels.
    pub min_dimension: u32,
}

impl Default for ImagingLimits {
    fn default() -> Self {
        Self {
            max_file_bytes: env_parse("WOUNDSIGHT_MAX_IMAGE_SIZE", 10 * 1024 * 1024u64),
            min_dimension: 32,
        }
    }
}

fn env_parse<T: FromStr + Copy>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw.parse().unwrap_or(default),
        Err(_) => default,
    }
}
