//! In-process model doubles for unit tests.

#![allow(clippy::unwrap_used)]

use super::backend::{ModelBackend, ScoreModel};
use crate::error::Result;
use crate::preprocess::Preprocessing;
use crate::registry::ModelVariantDescriptor;
use ndarray::{Array2, Array4};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Model returning scripted score rows.
///
/// The row for an image is picked by its first red value, so a uniform image
/// with red `k` scores as `rows[k]` (clamped to the last row).
pub struct FixedModel {
    rows: Vec<Vec<f32>>,
    declared: bool,
    pub runs: Arc<AtomicUsize>,
}

impl FixedModel {
    pub fn new(row: Vec<f32>) -> Self {
        Self::scripted(vec![row])
    }

    pub fn scripted(rows: Vec<Vec<f32>>) -> Self {
        Self {
            rows,
            declared: true,
            runs: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Hide the output width so loading has to probe it.
    pub fn undeclared(mut self) -> Self {
        self.declared = false;
        self
    }
}

impl ScoreModel for FixedModel {
    fn output_width(&self) -> Option<usize> {
        self.declared.then(|| self.rows[0].len())
    }

    fn run(&self, batch: &Array4<f32>) -> Result<Array2<f32>> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        let n = batch.shape()[0];
        let width = self.rows[0].len();
        let mut out = Array2::zeros((n, width));
        for i in 0..n {
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let pick = (batch[[i, 0, 0, 0]].max(0.0) as usize).min(self.rows.len() - 1);
            for (j, v) in self.rows[pick].iter().enumerate() {
                out[[i, j]] = *v;
            }
        }
        Ok(out)
    }
}

/// Backend handing out [`FixedModel`]s and counting loads.
pub struct FixedBackend {
    rows: Vec<Vec<f32>>,
    delay: Duration,
    loads: AtomicUsize,
}

impl FixedBackend {
    pub fn new(row: Vec<f32>) -> Self {
        Self::scripted(vec![row])
    }

    pub fn scripted(rows: Vec<Vec<f32>>) -> Self {
        Self {
            rows,
            delay: Duration::ZERO,
            loads: AtomicUsize::new(0),
        }
    }

    /// Sleep inside every load, to widen race windows.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

impl ModelBackend for FixedBackend {
    fn load(&self, _path: &Path) -> Result<Box<dyn ScoreModel>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        Ok(Box::new(FixedModel::scripted(self.rows.clone())))
    }
}

/// Write a placeholder artifact plus vocabulary and describe them.
pub fn write_variant(dir: &Path, key: &str, labels: &[&str]) -> ModelVariantDescriptor {
    let path = dir.join(format!("{key}.onnx"));
    std::fs::write(&path, b"placeholder").unwrap();

    let classes_path = dir.join(format!("{key}_classes.json"));
    let json = serde_json::json!({ "classes": labels });
    std::fs::write(&classes_path, json.to_string()).unwrap();

    ModelVariantDescriptor {
        key: key.to_string(),
        name: key.to_string(),
        path,
        classes_path,
        description: None,
        preprocessing: Preprocessing::default(),
    }
}

/// Write a uniform image whose red channel selects a scripted row.
pub fn write_row_image(dir: &Path, name: &str, row: u8) -> std::path::PathBuf {
    let path = dir.join(name);
    image::RgbImage::from_pixel(16, 16, image::Rgb([row, 0, 0]))
        .save(&path)
        .unwrap();
    path
}
