//! Output format writers.

mod csv;
mod json;
pub mod progress;
mod types;
mod writer;

pub use csv::{CSV_COLUMNS, CsvWriter};
pub use json::{JsonResultFile, JsonResultWriter};
pub use types::{
    ConfidenceSummary, RunMetadata, RunSettings, format_full_probs, format_prob, model_hash,
};
pub use writer::ResultWriter;
