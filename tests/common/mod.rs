//! Shared helpers for CLI integration tests.

#![allow(dead_code, clippy::unwrap_used)]

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use std::path::{Path, PathBuf};

/// Command for the flyage binary with config and data dirs inside `home`.
pub fn flyage(home: &Path) -> Command {
    let mut cmd = cargo_bin_cmd!("flyage");
    cmd.env("HOME", home)
        .env("XDG_CONFIG_HOME", home.join("config"))
        .env("XDG_DATA_HOME", home.join("data"))
        .env_remove("RUST_LOG")
        .env_remove("FLYAGE_CATALOG")
        .env_remove("FLYAGE_SPECIES")
        .env_remove("FLYAGE_VARIANT");
    cmd
}

/// Write a two-species catalog with placeholder artifacts.
pub fn write_catalog(dir: &Path) -> PathBuf {
    std::fs::create_dir_all(dir.join("models")).unwrap();
    std::fs::write(dir.join("models/ceratitis_v1.onnx"), b"placeholder").unwrap();
    std::fs::write(
        dir.join("models/ceratitis_v1_classes.json"),
        r#"{"classes": ["-1", "0", "1", "2"]}"#,
    )
    .unwrap();

    let path = dir.join("registry.yaml");
    std::fs::write(
        &path,
        "species:
  ceratitis:
    display_name: Ceratitis capitata
    models:
      v1:
        name: EfficientNetV2 baseline
        path: models/ceratitis_v1.onnx
        classes: models/ceratitis_v1_classes.json
        description: Dorsal photographs, four age classes
  ludens:
    models:
      base:
        path: models/ludens.onnx
        classes: models/ludens_classes.json
        preprocessing: imagenet
",
    )
    .unwrap();
    path
}
