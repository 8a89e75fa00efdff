//! Classifier loading, caching, prediction and calibration.

mod backend;
mod cache;
mod calibration;
mod classifier;
mod predictor;
mod vocabulary;

#[cfg(test)]
pub(crate) mod testing;

pub use backend::{ModelBackend, OnnxBackend, ScoreModel};
pub use cache::{LatestRequest, LoadEvent, ModelCache, RequestId};
pub use calibration::{Temperature, mean_nll, softmax_rows};
pub use classifier::{LoadedClassifier, LoaderOptions};
pub use predictor::{Confidence, PredictOptions, Prediction, predict, predictions_from_scores};
pub use vocabulary::ClassVocabulary;
