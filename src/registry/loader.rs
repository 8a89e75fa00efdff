//! Catalog loading and discovery.

use super::types::{Catalog, CatalogDocument};
use crate::constants::CATALOG_FILE_NAME;
use crate::error::{Error, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Document syntax of a catalog file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogFormat {
    /// YAML document (default).
    Yaml,
    /// JSON document.
    Json,
}

impl CatalogFormat {
    /// Pick the format from the file extension; anything but `.json` is YAML.
    pub fn from_path(path: &Path) -> Self {
        if path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
        {
            Self::Json
        } else {
            Self::Yaml
        }
    }
}

/// Load and validate a catalog file.
///
/// Relative model paths are resolved against the catalog's containing
/// directory, not the process working directory.
pub fn load_catalog(path: &Path) -> Result<Catalog> {
    if !path.is_file() {
        return Err(Error::CatalogNotFound {
            path: path.to_path_buf(),
        });
    }

    let content = std::fs::read_to_string(path).map_err(|e| Error::CatalogRead {
        path: path.to_path_buf(),
        source: e,
    })?;

    let base_dir = std::path::absolute(path)?
        .parent()
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf);

    let catalog = parse_catalog(&content, CatalogFormat::from_path(path), path, &base_dir)?;
    info!(
        "Loaded catalog {} ({} species)",
        path.display(),
        catalog.species_keys().len()
    );
    Ok(catalog)
}

/// Parse catalog text that was read from `source`.
pub fn parse_catalog(
    content: &str,
    format: CatalogFormat,
    source: &Path,
    base_dir: &Path,
) -> Result<Catalog> {
    let parse_error = |e: Box<dyn std::error::Error + Send + Sync>| Error::CatalogParse {
        path: source.to_path_buf(),
        source: e,
    };

    let document: CatalogDocument = match format {
        CatalogFormat::Yaml => {
            // An empty YAML file deserializes to unit; treat it as an empty document.
            if content.trim().is_empty() {
                CatalogDocument::default()
            } else {
                serde_yaml::from_str(content).map_err(|e| parse_error(Box::new(e)))?
            }
        }
        CatalogFormat::Json => serde_json::from_str(content).map_err(|e| parse_error(Box::new(e)))?,
    };

    Catalog::from_document(document, source, base_dir)
}

/// Candidate catalog locations, most specific first.
///
/// Looks next to the executable (packaged deployments) and then in the
/// working directory, each both at the top level and under `config/`.
pub fn catalog_candidates() -> Vec<PathBuf> {
    let mut bases = Vec::new();
    if let Some(exe_dir) = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
    {
        bases.push(exe_dir);
    }
    if let Ok(cwd) = std::env::current_dir() {
        bases.push(cwd);
    }

    bases
        .iter()
        .flat_map(|base| {
            [
                base.join(CATALOG_FILE_NAME),
                base.join("config").join(CATALOG_FILE_NAME),
            ]
        })
        .collect()
}

/// Find the first existing catalog among [`catalog_candidates`].
pub fn find_default_catalog() -> Option<PathBuf> {
    let found = catalog_candidates().into_iter().find(|p| p.is_file());
    if let Some(ref path) = found {
        debug!("Using catalog {}", path.display());
    }
    found
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::io::Write;

    const MINIMAL_CATALOG: &str = r#"
species:
  Ludens:
    display_name: "Anastrepha ludens"
    models:
      final:
        name: "final"
        path: "models/final_model.onnx"
        classes: "models/classes.json"
  Ceratitis:
    display_name: "Ceratitis capitata"
    models:
      final:
        path: "/opt/models/ceratitis.onnx"
        classes: "/opt/models/ceratitis.json"
        description: "EfficientNetV2-S"
      small:
        path: "small.onnx"
        classes: "small.json"
        preprocessing: imagenet
"#;

    #[test]
    fn test_load_minimal_catalog() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registry.yaml");
        std::fs::write(&path, MINIMAL_CATALOG).unwrap();

        let catalog = load_catalog(&path).unwrap();
        assert_eq!(catalog.species_keys(), vec!["Ludens", "Ceratitis"]);

        let ludens = catalog.species("Ludens").unwrap();
        assert_eq!(ludens.display_name, "Anastrepha ludens");
        assert!(ludens.models.contains_key("final"));

        let variant = catalog.variant("Ludens", "final").unwrap();
        let base = std::path::absolute(dir.path()).unwrap();
        assert_eq!(variant.path, base.join("models/final_model.onnx"));

        let ceratitis = catalog.species("Ceratitis").unwrap();
        assert_eq!(ceratitis.variant_keys().collect::<Vec<_>>(), vec!["final", "small"]);
        assert_eq!(
            ceratitis.variant("final").unwrap().description.as_deref(),
            Some("EfficientNetV2-S")
        );
    }

    #[test]
    fn test_load_json_catalog() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(
            file,
            r#"{{"species": {{"A": {{"models": {{"v1": {{"path": "a.onnx", "classes": "a.json"}}}}}}}}}}"#
        )
        .unwrap();

        let catalog = load_catalog(file.path()).unwrap();
        let species = catalog.species("A").unwrap();
        assert_eq!(species.display_name, "A");
        assert_eq!(species.variant("v1").unwrap().name, "v1");
    }

    #[test]
    fn test_missing_file() {
        let result = load_catalog(Path::new("/nonexistent/registry.yaml"));
        assert!(matches!(result, Err(Error::CatalogNotFound { .. })));
    }

    #[test]
    fn test_empty_file_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registry.yaml");
        std::fs::write(&path, "").unwrap();
        assert!(matches!(
            load_catalog(&path),
            Err(Error::CatalogInvalid { .. })
        ));
    }

    #[test]
    fn test_invalid_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registry.yaml");
        std::fs::write(&path, "species: [unclosed").unwrap();
        assert!(matches!(load_catalog(&path), Err(Error::CatalogParse { .. })));
    }

    #[test]
    fn test_format_from_path() {
        assert_eq!(CatalogFormat::from_path(Path::new("r.json")), CatalogFormat::Json);
        assert_eq!(CatalogFormat::from_path(Path::new("r.JSON")), CatalogFormat::Json);
        assert_eq!(CatalogFormat::from_path(Path::new("r.yaml")), CatalogFormat::Yaml);
        assert_eq!(CatalogFormat::from_path(Path::new("registry")), CatalogFormat::Yaml);
    }

    #[test]
    fn test_candidates_include_config_subdir() {
        let candidates = catalog_candidates();
        assert!(
            candidates
                .iter()
                .any(|p| p.ends_with(Path::new("config").join(CATALOG_FILE_NAME)))
        );
    }
}
