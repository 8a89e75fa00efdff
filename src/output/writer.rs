//! Result writer trait definition.

use crate::error::Result;
use crate::inference::Prediction;

/// Trait for writing prediction results.
pub trait ResultWriter {
    /// Write the file header (if applicable).
    fn write_header(&mut self) -> Result<()>;

    /// Write a single prediction.
    fn write_prediction(&mut self, prediction: &Prediction) -> Result<()>;

    /// Finalize the output (flush, close, etc.).
    fn finalize(&mut self) -> Result<()>;
}
