//! CLI argument parsing and command handling.

mod args;
mod validators;

pub use args::{ClassifyArgs, Cli, Command, ConfigAction, ModelsAction, SpeciesAction};
