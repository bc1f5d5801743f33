use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::{info, warn};
use tokio::io::AsyncWriteExt;

use crate::config::ModelSource;
use crate::runtime::{create_session_builder, RuntimeConfig};

#[derive(Debug, thiserror::Error)]
pub enum ProvisionError {
    #[error("Download error: {0}")]
    Download(#[from] reqwest::Error),
    #[error("Download failed with HTTP status {0}")]
    HttpStatus(u16),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("Artifact too small: {actual} bytes (min: {min} bytes)")]
    TooSmall { actual: u64, min: u64 },
    #[error("Reduced-precision derivation failed: {0}")]
    Reduction(String),
}

/// Provisioning lifecycle. Any unrecoverable error drops the machine back to
/// `Uninitialized`; repeated `ensure` calls on a valid artifact are a
/// `Ready -> Ready` no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisionState {
    Uninitialized,
    Downloading,
    Verifying,
    Reducing,
    Ready,
}

/// Ensures model artifacts are present and plausible on disk.
///
/// Artifacts are downloaded to a temporary path and renamed into place on
/// completion, so a crash mid-write never leaves a truncated file at the
/// final path. Verification is a minimum-size sanity check only; the remote
/// publishes no checksum to pin against.
#[derive(Clone)]
pub struct ModelProvisioner {
    models_dir: PathBuf,
    timeout: Duration,
    state: Arc<Mutex<ProvisionState>>,
    download_lock: Arc<tokio::sync::Mutex<()>>,
}

impl ModelProvisioner {
    pub fn new<P: AsRef<Path>>(models_dir: P, timeout: Duration) -> io::Result<Self> {
        let models_dir = models_dir.as_ref().to_path_buf();
        fs::create_dir_all(&models_dir)?;
        Ok(Self {
            models_dir,
            timeout,
            state: Arc::new(Mutex::new(ProvisionState::Uninitialized)),
            download_lock: Arc::new(tokio::sync::Mutex::new(())),
        })
    }

    pub fn state(&self) -> ProvisionState {
        *self.state.lock().expect("provision state lock poisoned")
    }

    fn transition(&self, next: ProvisionState) {
        let mut state = self.state.lock().expect("provision state lock poisoned");
        if *state != next {
            info!("Provisioner state: {:?} -> {:?}", *state, next);
            *state = next;
        }
    }

    pub fn model_path(&self, source: &ModelSource) -> PathBuf {
        self.models_dir.join(&source.name)
    }

    pub fn tokenizer_path(&self, source: &ModelSource) -> Option<PathBuf> {
        source.tokenizer_url.as_ref().map(|_| {
            let stem = Path::new(&source.name)
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("model");
            self.models_dir.join(format!("{}_tokenizer.json", stem))
        })
    }

    /// Path of the derived reduced-precision sibling of `source`.
    pub fn reduced_path(&self, source: &ModelSource) -> PathBuf {
        let stem = Path::new(&source.name)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("model");
        self.models_dir.join(format!("{}_reduced.onnx", stem))
    }

    pub fn is_provisioned(&self, source: &ModelSource) -> bool {
        let model_ok = self.verify_file(&self.model_path(source), source.min_bytes).is_ok();
        let tokenizer_ok = match self.tokenizer_path(source) {
            Some(path) => path.exists(),
            None => true,
        };
        model_ok && tokenizer_ok
    }

    /// Makes sure the artifact (and its tokenizer, if any) exists locally and
    /// passes the size check, downloading what is missing. Returns the model
    /// path.
    ///
    /// An existing-but-corrupt file is discarded and re-fetched once; a fresh
    /// download that still fails verification is deleted and surfaced as an
    /// error.
    pub async fn ensure(&self, source: &ModelSource) -> Result<PathBuf, ProvisionError> {
        let _guard = self.download_lock.lock().await;

        // Ready -> Ready self-loop: nothing to do for a valid artifact.
        if self.state() == ProvisionState::Ready && self.is_provisioned(source) {
            return Ok(self.model_path(source));
        }

        let result = self.ensure_inner(source).await;
        match &result {
            Ok(_) => self.transition(ProvisionState::Ready),
            Err(e) => {
                warn!("Provisioning {} failed: {}", source.name, e);
                self.transition(ProvisionState::Uninitialized);
            }
        }
        result
    }

    async fn ensure_inner(&self, source: &ModelSource) -> Result<PathBuf, ProvisionError> {
        let model_path = self.model_path(source);

        if model_path.exists() {
            self.transition(ProvisionState::Verifying);
            if let Err(e) = self.verify_file(&model_path, source.min_bytes) {
                warn!("Cached artifact {} failed verification ({}), re-fetching", source.name, e);
                fs::remove_file(&model_path)?;
                self.fetch_and_verify(&source.url, &model_path, source.min_bytes).await?;
            } else {
                info!("Artifact {} already present, skipping download", source.name);
            }
        } else {
            self.fetch_and_verify(&source.url, &model_path, source.min_bytes).await?;
        }

        if let (Some(url), Some(tokenizer_path)) =
            (source.tokenizer_url.as_deref(), self.tokenizer_path(source))
        {
            if !tokenizer_path.exists() {
                // Tokenizer definitions are small JSON files; the model's
                // minimum does not apply.
                self.fetch_and_verify(url, &tokenizer_path, 1).await?;
            }
        }

        Ok(model_path)
    }

    async fn fetch_and_verify(
        &self,
        url: &str,
        dest: &Path,
        min_bytes: u64,
    ) -> Result<(), ProvisionError> {
        self.transition(ProvisionState::Downloading);
        self.download_file(url, dest).await?;

        self.transition(ProvisionState::Verifying);
        if let Err(e) = self.verify_file(dest, min_bytes) {
            warn!("Downloaded file {} failed verification, deleting", dest.display());
            let _ = fs::remove_file(dest);
            return Err(e);
        }
        info!("Artifact downloaded and verified: {}", dest.display());
        Ok(())
    }

    /// Streams `url` into a sibling `.part` file and renames it into place.
    /// The partial file is removed on any failure.
    async fn download_file(&self, url: &str, dest: &Path) -> Result<(), ProvisionError> {
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }

        let file_name = dest.file_name().and_then(|n| n.to_str()).unwrap_or("artifact");
        let tmp_path = dest.with_file_name(format!("{}.part", file_name));

        info!("Downloading {} to {}", url, dest.display());
        let result = self.stream_to_file(url, &tmp_path).await;

        match result {
            Ok(()) => {
                fs::rename(&tmp_path, dest)?;
                Ok(())
            }
            Err(e) => {
                if tmp_path.exists() {
                    let _ = fs::remove_file(&tmp_path);
                }
                Err(e)
            }
        }
    }

    async fn stream_to_file(&self, url: &str, tmp_path: &Path) -> Result<(), ProvisionError> {
        let client = reqwest::Client::builder().timeout(self.timeout).build()?;
        let mut response = client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(ProvisionError::HttpStatus(response.status().as_u16()));
        }

        let mut file = tokio::fs::File::create(tmp_path).await?;
        let mut downloaded: u64 = 0;
        while let Some(chunk) = response.chunk().await? {
            file.write_all(&chunk).await?;
            downloaded += chunk.len() as u64;
        }
        file.flush().await?;
        info!("Downloaded {} bytes", downloaded);
        Ok(())
    }

    fn verify_file(&self, path: &Path, min_bytes: u64) -> Result<(), ProvisionError> {
        let actual = fs::metadata(path)?.len();
        if actual < min_bytes {
            return Err(ProvisionError::TooSmall { actual, min: min_bytes });
        }
        Ok(())
    }

    pub fn remove(&self, source: &ModelSource) -> Result<(), ProvisionError> {
        for path in [
            Some(self.model_path(source)),
            Some(self.reduced_path(source)),
            self.tokenizer_path(source),
        ]
        .into_iter()
        .flatten()
        {
            if path.exists() {
                fs::remove_file(&path)?;
            }
        }
        self.transition(ProvisionState::Uninitialized);
        Ok(())
    }

    /// Derives the reduced-precision artifact once, reusing an existing one.
    ///
    /// The runtime exposes no dynamic quantizer, so the derived artifact is
    /// the serialized optimized graph. Callers treat failure as non-fatal and
    /// keep using the full-precision model.
    pub fn ensure_reduced(
        &self,
        source: &ModelSource,
        runtime_config: &RuntimeConfig,
    ) -> Result<PathBuf, ProvisionError> {
        let reduced = self.reduced_path(source);
        if reduced.exists() {
            return Ok(reduced);
        }

        self.transition(ProvisionState::Reducing);
        info!("Deriving reduced-precision artifact at {}", reduced.display());

        let build = create_session_builder(runtime_config)
            .and_then(|builder| builder.with_optimized_model_path(&reduced))
            .and_then(|builder| builder.commit_from_file(&self.model_path(source)));

        match build {
            Ok(_session) => {
                self.verify_file(&reduced, source.min_bytes)?;
                info!("Reduced-precision artifact ready");
                Ok(reduced)
            }
            Err(e) => {
                if reduced.exists() {
                    let _ = fs::remove_file(&reduced);
                }
                Err(ProvisionError::Reduction(e.to_string()))
            }
        }
    }
}
