//! Score-producing model seam and its ONNX Runtime implementation.

use crate::error::{Error, Result};
use ndarray::{Array2, Array4};
use ort::session::Session;
use ort::session::builder::GraphOptimizationLevel;
use ort::value::Tensor;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info};

/// A loaded model that maps a `[N, H, W, 3]` batch to `[N, C]` raw scores.
pub trait ScoreModel: Send + Sync {
    /// Width of the score vector when the artifact declares it statically.
    ///
    /// `None` means the width is only known after running the model.
    fn output_width(&self) -> Option<usize> {
        None
    }

    /// Run one batch and return one score row per input image.
    fn run(&self, batch: &Array4<f32>) -> Result<Array2<f32>>;
}

/// Turns a classifier artifact on disk into a [`ScoreModel`].
pub trait ModelBackend: Send + Sync {
    /// Load the artifact at `path`.
    fn load(&self, path: &Path) -> Result<Box<dyn ScoreModel>>;
}

/// Backend that loads `.onnx` artifacts through ONNX Runtime.
#[derive(Debug, Clone, Default)]
pub struct OnnxBackend {
    intra_threads: Option<usize>,
}

impl OnnxBackend {
    /// Create a backend using ONNX Runtime's default threading.
    pub fn new() -> Self {
        Self::default()
    }

    /// Limit intra-op parallelism of every session this backend builds.
    #[must_use]
    pub fn with_intra_threads(mut self, threads: Option<usize>) -> Self {
        self.intra_threads = threads.filter(|&t| t > 0);
        self
    }
}

impl ModelBackend for OnnxBackend {
    fn load(&self, path: &Path) -> Result<Box<dyn ScoreModel>> {
        let build_error = |reason: String| Error::ClassifierBuild {
            path: path.to_path_buf(),
            reason,
        };

        let mut builder = Session::builder()
            .map_err(|e| build_error(format!("failed to create session builder: {e}")))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| build_error(format!("failed to set optimization level: {e}")))?;

        if let Some(threads) = self.intra_threads {
            debug!("Using {} intra-op threads", threads);
            builder = builder
                .with_intra_threads(threads)
                .map_err(|e| build_error(format!("failed to set intra threads: {e}")))?;
        }

        let session = builder
            .commit_from_file(path)
            .map_err(|e| build_error(format!("failed to load ONNX model: {e}")))?;

        let input_name = session
            .inputs()
            .first()
            .map(|input| input.name().to_string())
            .ok_or_else(|| build_error("model declares no inputs".to_string()))?;

        info!("Loaded ONNX model {} (input '{}')", path.display(), input_name);

        Ok(Box::new(OnnxModel {
            session: Mutex::new(session),
            input_name,
            path: path.to_path_buf(),
        }))
    }
}

/// ONNX Runtime session behind a lock; `Session::run` needs exclusive access.
struct OnnxModel {
    session: Mutex<Session>,
    input_name: String,
    path: PathBuf,
}

impl ScoreModel for OnnxModel {
    fn run(&self, batch: &Array4<f32>) -> Result<Array2<f32>> {
        let inference_error = |reason: String| Error::Inference {
            reason: format!("{}: {reason}", self.path.display()),
        };

        let rows = batch.shape()[0];
        if rows == 0 {
            return Err(inference_error("empty batch".to_string()));
        }

        let shape = batch.shape().to_vec();
        let data: Vec<f32> = batch.iter().copied().collect();
        let input = Tensor::from_array((shape.as_slice(), data))
            .map_err(|e| inference_error(format!("failed to create input tensor: {e}")))?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| inference_error("session lock poisoned".to_string()))?;

        let outputs = session
            .run(ort::inputs![self.input_name.as_str() => input])
            .map_err(|e| inference_error(e.to_string()))?;

        let output = outputs
            .values()
            .next()
            .ok_or_else(|| inference_error("model produced no outputs".to_string()))?;

        let (_, scores) = output
            .try_extract_tensor::<f32>()
            .map_err(|e| inference_error(format!("failed to extract output tensor: {e}")))?;

        if scores.len() % rows != 0 {
            return Err(inference_error(format!(
                "{} output values cannot be split into {rows} rows",
                scores.len()
            )));
        }
        let width = scores.len() / rows;

        Array2::from_shape_vec((rows, width), scores.to_vec())
            .map_err(|e| inference_error(format!("failed to shape output: {e}")))
    }
}
