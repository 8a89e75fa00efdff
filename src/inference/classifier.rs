//! A classifier artifact loaded, validated and paired with its vocabulary.

use super::backend::{ModelBackend, ScoreModel};
use super::calibration::first_non_finite_row;
use super::vocabulary::ClassVocabulary;
use crate::constants::DEFAULT_IMAGE_SIZE;
use crate::error::{Error, Result};
use crate::preprocess::Preprocessing;
use crate::registry::ModelVariantDescriptor;
use ndarray::{Array2, Array4};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info};

/// Options applied while loading a classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoaderOptions {
    /// Square edge of the warm-up and probe input.
    pub image_size: u32,
    /// Run one dummy inference after loading.
    pub warmup: bool,
}

impl Default for LoaderOptions {
    fn default() -> Self {
        Self {
            image_size: DEFAULT_IMAGE_SIZE,
            warmup: true,
        }
    }
}

/// A ready-to-use classifier.
///
/// Immutable once constructed; the output width always equals the
/// vocabulary size.
pub struct LoadedClassifier {
    model: Box<dyn ScoreModel>,
    vocabulary: ClassVocabulary,
    artifact_path: PathBuf,
    vocabulary_path: PathBuf,
    preprocessing: Preprocessing,
}

impl std::fmt::Debug for LoadedClassifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedClassifier")
            .field("artifact_path", &self.artifact_path)
            .field("vocabulary_path", &self.vocabulary_path)
            .field("classes", &self.vocabulary.len())
            .field("preprocessing", &self.preprocessing)
            .finish_non_exhaustive()
    }
}

impl LoadedClassifier {
    /// Load the classifier a catalog variant points at.
    ///
    /// Order: resolve the artifact, parse the vocabulary, build the model,
    /// validate its output width, then optionally warm it up.
    pub fn load(
        descriptor: &ModelVariantDescriptor,
        backend: &dyn ModelBackend,
        options: &LoaderOptions,
    ) -> Result<Self> {
        let start = Instant::now();

        if !descriptor.path.is_file() {
            return Err(Error::ModelFileNotFound {
                path: descriptor.path.clone(),
            });
        }
        let artifact_path = std::fs::canonicalize(&descriptor.path)?;

        let vocabulary = ClassVocabulary::load(&descriptor.classes_path)?;
        debug!(
            "Vocabulary {} has {} classes",
            descriptor.classes_path.display(),
            vocabulary.len()
        );

        let model = backend.load(&artifact_path)?;

        let classifier = Self::new(
            model,
            vocabulary,
            artifact_path,
            descriptor.classes_path.clone(),
            descriptor.preprocessing,
            options,
        )?;

        info!(
            "Classifier '{}' ready ({} classes) in {:.2?}",
            descriptor.key,
            classifier.vocabulary.len(),
            start.elapsed()
        );

        Ok(classifier)
    }

    /// Pair an already built model with its vocabulary.
    ///
    /// A model that does not declare its output width is probed with a
    /// zero image, which doubles as the warm-up.
    pub fn new(
        model: Box<dyn ScoreModel>,
        vocabulary: ClassVocabulary,
        artifact_path: PathBuf,
        vocabulary_path: PathBuf,
        preprocessing: Preprocessing,
        options: &LoaderOptions,
    ) -> Result<Self> {
        let (outputs, warmed) = match model.output_width() {
            Some(width) => (width, false),
            None => {
                let scores = model.run(&zero_batch(options.image_size))?;
                (scores.ncols(), true)
            }
        };

        if outputs != vocabulary.len() {
            return Err(Error::OutputWidthMismatch {
                path: artifact_path,
                outputs,
                classes: vocabulary.len(),
            });
        }

        if options.warmup && !warmed {
            let start = Instant::now();
            model.run(&zero_batch(options.image_size))?;
            debug!("Warm-up inference took {:.2?}", start.elapsed());
        }

        Ok(Self {
            model,
            vocabulary,
            artifact_path,
            vocabulary_path,
            preprocessing,
        })
    }

    /// Raw scores for a batch, one row per image.
    pub fn score(&self, batch: &Array4<f32>) -> Result<Array2<f32>> {
        let scores = self.model.run(batch)?;

        let expected = (batch.shape()[0], self.vocabulary.len());
        if scores.dim() != expected {
            return Err(Error::Inference {
                reason: format!(
                    "{}: expected {}x{} scores, got {}x{}",
                    self.artifact_path.display(),
                    expected.0,
                    expected.1,
                    scores.nrows(),
                    scores.ncols()
                ),
            });
        }

        if let Some(row) = first_non_finite_row(scores.view()) {
            return Err(Error::Inference {
                reason: format!(
                    "{}: non-finite score in row {row}",
                    self.artifact_path.display()
                ),
            });
        }

        Ok(scores)
    }

    /// Class vocabulary in score order.
    pub fn vocabulary(&self) -> &ClassVocabulary {
        &self.vocabulary
    }

    /// Canonical path of the artifact; also the cache identity.
    pub fn artifact_path(&self) -> &Path {
        &self.artifact_path
    }

    /// Path of the vocabulary file.
    pub fn vocabulary_path(&self) -> &Path {
        &self.vocabulary_path
    }

    /// Channel preprocessing the model was trained with.
    pub fn preprocessing(&self) -> Preprocessing {
        self.preprocessing
    }

    /// Number of classes.
    pub fn num_classes(&self) -> usize {
        self.vocabulary.len()
    }
}

fn zero_batch(image_size: u32) -> Array4<f32> {
    let edge = image_size as usize;
    Array4::zeros((1, edge, edge, 3))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::inference::testing::{FixedBackend, FixedModel, write_variant};
    use std::sync::Arc;
    use std::sync::atomic::Ordering;

    fn vocab(n: usize) -> ClassVocabulary {
        ClassVocabulary::from_labels((0..n).map(|i| i.to_string()).collect()).unwrap()
    }

    fn options() -> LoaderOptions {
        LoaderOptions {
            image_size: 8,
            warmup: true,
        }
    }

    #[test]
    fn test_width_mismatch_is_rejected() {
        let model = FixedModel::new(vec![1.0, 2.0, 3.0, 4.0, 5.0]);
        let err = LoadedClassifier::new(
            Box::new(model),
            vocab(4),
            PathBuf::from("m.onnx"),
            PathBuf::from("classes.json"),
            Preprocessing::default(),
            &options(),
        )
        .unwrap_err();

        match err {
            Error::OutputWidthMismatch { outputs, classes, .. } => {
                assert_eq!((outputs, classes), (5, 4));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_undeclared_width_is_probed() {
        let model = FixedModel::new(vec![0.0; 3]).undeclared();
        let runs = Arc::clone(&model.runs);
        let classifier = LoadedClassifier::new(
            Box::new(model),
            vocab(3),
            PathBuf::from("m.onnx"),
            PathBuf::from("classes.json"),
            Preprocessing::default(),
            &options(),
        )
        .unwrap();

        assert_eq!(classifier.num_classes(), 3);
        // The probe doubles as warm-up.
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_warmup_can_be_disabled() {
        let model = FixedModel::new(vec![0.0; 2]);
        let runs = Arc::clone(&model.runs);
        LoadedClassifier::new(
            Box::new(model),
            vocab(2),
            PathBuf::from("m.onnx"),
            PathBuf::from("classes.json"),
            Preprocessing::default(),
            &LoaderOptions {
                image_size: 8,
                warmup: false,
            },
        )
        .unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_load_from_descriptor() {
        let dir = tempfile::tempdir().unwrap();
        let descriptor = write_variant(dir.path(), "v1", &["-1", "0", "1"]);
        let backend = FixedBackend::new(vec![0.1, 0.2, 0.3]);

        let classifier = LoadedClassifier::load(&descriptor, &backend, &options()).unwrap();
        assert_eq!(classifier.vocabulary().labels(), &["-1", "0", "1"]);
        assert_eq!(
            classifier.artifact_path(),
            std::fs::canonicalize(&descriptor.path).unwrap()
        );
        assert_eq!(backend.loads(), 1);
    }

    #[test]
    fn test_load_missing_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let mut descriptor = write_variant(dir.path(), "v1", &["a", "b"]);
        descriptor.path = dir.path().join("missing.onnx");
        let backend = FixedBackend::new(vec![0.0, 0.0]);

        let err = LoadedClassifier::load(&descriptor, &backend, &options()).unwrap_err();
        assert!(matches!(err, Error::ModelFileNotFound { .. }));
        assert_eq!(backend.loads(), 0);
    }

    #[test]
    fn test_load_missing_vocabulary() {
        let dir = tempfile::tempdir().unwrap();
        let mut descriptor = write_variant(dir.path(), "v1", &["a", "b"]);
        descriptor.classes_path = dir.path().join("nope.json");
        let backend = FixedBackend::new(vec![0.0, 0.0]);

        let err = LoadedClassifier::load(&descriptor, &backend, &options()).unwrap_err();
        assert!(matches!(err, Error::VocabularyFileNotFound { .. }));
    }

    #[test]
    fn test_score_rejects_non_finite_output() {
        let classifier = LoadedClassifier::new(
            Box::new(FixedModel::new(vec![f32::NAN, 1.0])),
            vocab(2),
            PathBuf::from("m.onnx"),
            PathBuf::from("classes.json"),
            Preprocessing::default(),
            &LoaderOptions {
                image_size: 8,
                warmup: false,
            },
        )
        .unwrap();

        let err = classifier.score(&Array4::zeros((2, 8, 8, 3))).unwrap_err();
        assert!(matches!(err, Error::Inference { .. }));
        let msg = err.to_string();
        assert!(msg.contains("m.onnx") && msg.contains("row 0"), "{msg}");
    }

    #[test]
    fn test_score_checks_shape() {
        let classifier = LoadedClassifier::new(
            Box::new(FixedModel::new(vec![1.0, 2.0])),
            vocab(2),
            PathBuf::from("m.onnx"),
            PathBuf::from("classes.json"),
            Preprocessing::default(),
            &options(),
        )
        .unwrap();

        let scores = classifier.score(&Array4::zeros((3, 8, 8, 3))).unwrap();
        assert_eq!(scores.dim(), (3, 2));
    }
}
