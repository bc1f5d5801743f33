use std::path::Path;
use std::sync::Once;

use log::{info, warn};
use ort::execution_providers::{CPUExecutionProvider, CUDAExecutionProvider};
use ort::session::builder::{GraphOptimizationLevel, SessionBuilder};
use ort::session::Session;
use ort::Result as OrtResult;

use crate::config::Device;

static INIT: Once = Once::new();

#[derive(Debug)]
pub struct RuntimeConfig {
    pub inter_threads: usize,
    pub intra_threads: usize,
    pub optimization_level: GraphOptimizationLevel,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            inter_threads: 0, // Let ONNX Runtime decide
            intra_threads: 0, // Let ONNX Runtime decide
            optimization_level: GraphOptimizationLevel::Level3,
        }
    }
}

impl Clone for RuntimeConfig {
    fn clone(&self) -> Self {
        Self {
            inter_threads: self.inter_threads,
            intra_threads: self.intra_threads,
            optimization_level: match self.optimization_level {
                GraphOptimizationLevel::Level1 => GraphOptimizationLevel::Level1,
                GraphOptimizationLevel::Level2 => GraphOptimizationLevel::Level2,
                GraphOptimizationLevel::Level3 => GraphOptimizationLevel::Level3,
                GraphOptimizationLevel::Disable => GraphOptimizationLevel::Disable,
            },
        }
    }
}

/// One step of the execution-backend plan. Steps are tried in order; the
/// first one that yields a working session wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderStep {
    /// Accelerated backend with CPU registered as secondary.
    CudaWithCpuFallback,
    /// CPU only.
    CpuOnly,
}

/// Resolves the requested device into an ordered list of provider steps.
///
/// The accelerated step always carries a CPU fallback so a session can still
/// be constructed when driver-level initialization fails.
pub fn resolve_provider_plan(device: Device) -> Vec<ProviderStep> {
    match device {
        Device::Cpu => vec![ProviderStep::CpuOnly],
        Device::Cuda | Device::Auto => {
            vec![ProviderStep::CudaWithCpuFallback, ProviderStep::CpuOnly]
        }
    }
}

fn init_onnx_environment() -> OrtResult<()> {
    ort::init().with_name("woundsight").commit()?;
    Ok(())
}

pub fn ensure_initialized() -> OrtResult<()> {
    INIT.call_once(|| {
        init_onnx_environment().expect("Failed to initialize ONNX Runtime environment");
    });
    Ok(())
}

pub fn create_session_builder(config: &RuntimeConfig) -> OrtResult<SessionBuilder> {
    ensure_initialized()?;
    let mut builder = Session::builder()?;

    // Configure threading
    if config.inter_threads > 0 {
        builder = builder.with_inter_threads(config.inter_threads)?;
    }
    if config.intra_threads > 0 {
        builder = builder.with_intra_threads(config.intra_threads)?;
    }

    // Set optimization level
    let opt_level = match config.optimization_level {
        GraphOptimizationLevel::Level1 => GraphOptimizationLevel::Level1,
        GraphOptimizationLevel::Level2 => GraphOptimizationLevel::Level2,
        GraphOptimizationLevel::Level3 => GraphOptimizationLevel::Level3,
        GraphOptimizationLevel::Disable => GraphOptimizationLevel::Disable,
    };
    builder = builder.with_optimization_level(opt_level)?;

    Ok(builder)
}

/// Builds a session from a model file, walking the provider plan in order
/// and logging each step's outcome.
pub fn create_session(
    model_path: &Path,
    config: &RuntimeConfig,
    device: Device,
) -> OrtResult<Session> {
    let plan = resolve_provider_plan(device);
    let mut last_err = None;

    for step in &plan {
        let attempt = match step {
            ProviderStep::CudaWithCpuFallback => create_session_builder(config)?
                .with_execution_providers([
                    CUDAExecutionProvider::default().build(),
                    CPUExecutionProvider::default().build(),
                ])
                .and_then(|builder| builder.commit_from_file(model_path)),
            ProviderStep::CpuOnly => create_session_builder(config)?
                .with_execution_providers([CPUExecutionProvider::default().build()])
                .and_then(|builder| builder.commit_from_file(model_path)),
        };

        match attempt {
            Ok(session) => {
                info!("Session created via {:?} for {}", step, model_path.display());
                return Ok(session);
            }
            Err(e) => {
                warn!("Provider step {:?} failed: {}", step, e);
                last_err = Some(e);
            }
        }
    }

    Err(last_err.expect("provider plan is never empty"))
}
