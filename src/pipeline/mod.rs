//! Processing pipeline components.

mod coordinator;
mod processor;

pub use coordinator::{
    ProcessOptions, accumulated_log_path, collect_input_files, export_path_for, output_dir_for,
};
pub use processor::{RunResult, run_classification};
