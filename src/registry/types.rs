//! Data structures for the species/model catalog.

use crate::error::{Error, Result};
use crate::preprocess::Preprocessing;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Catalog document as written on disk.
///
/// Every field is optional here so that structural problems are reported
/// with the offending species/model key instead of a bare parse error.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct CatalogDocument {
    /// Species key to species entry, in document order.
    #[serde(default)]
    pub species: Option<IndexMap<String, SpeciesDocument>>,
}

/// Single species entry in the catalog document.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SpeciesDocument {
    /// Human-readable species name.
    #[serde(default)]
    pub display_name: Option<String>,
    /// Variant key to model entry, in document order.
    #[serde(default)]
    pub models: Option<IndexMap<String, ModelDocument>>,
}

/// Single model variant in the catalog document.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ModelDocument {
    /// Display name (defaults to the variant key).
    #[serde(default)]
    pub name: Option<String>,
    /// Path to the classifier artifact.
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// Path to the class vocabulary file.
    #[serde(default)]
    pub classes: Option<PathBuf>,
    /// Optional free-form description.
    #[serde(default)]
    pub description: Option<String>,
    /// Input convention of the model family.
    #[serde(default)]
    pub preprocessing: Option<Preprocessing>,
}

/// One selectable classifier of a species.
///
/// Paths are resolved against the catalog's directory when the catalog is
/// loaded and never re-resolved afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelVariantDescriptor {
    /// Variant key, unique within its species.
    pub key: String,
    /// Display name.
    pub name: String,
    /// Classifier artifact path.
    pub path: PathBuf,
    /// Class vocabulary path.
    pub classes_path: PathBuf,
    /// Optional description.
    pub description: Option<String>,
    /// Channel preprocessing the classifier was trained with.
    pub preprocessing: Preprocessing,
}

/// A species and its model variants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SpeciesCatalogEntry {
    /// Species key.
    pub key: String,
    /// Human-readable name.
    pub display_name: String,
    /// Variants in document order; never empty.
    pub models: IndexMap<String, ModelVariantDescriptor>,
}

impl SpeciesCatalogEntry {
    /// Variant keys in document order.
    pub fn variant_keys(&self) -> impl Iterator<Item = &str> {
        self.models.keys().map(String::as_str)
    }

    /// Look up a variant of this species.
    pub fn variant(&self, key: &str) -> Result<&ModelVariantDescriptor> {
        self.models.get(key).ok_or_else(|| Error::VariantNotFound {
            species: self.key.clone(),
            variant: key.to_string(),
        })
    }
}

/// Immutable, validated species → variant catalog.
///
/// There is no mutation API; reloading means building a new catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Catalog {
    source: PathBuf,
    species: IndexMap<String, SpeciesCatalogEntry>,
}

impl Catalog {
    /// Validate a parsed document, resolving relative paths against `base_dir`.
    ///
    /// Fails atomically: either every entry is valid or nothing is returned.
    pub fn from_document(doc: CatalogDocument, source: &Path, base_dir: &Path) -> Result<Self> {
        let invalid = |message: String| Error::CatalogInvalid {
            path: source.to_path_buf(),
            message,
        };

        let species_docs = match doc.species {
            Some(species) if !species.is_empty() => species,
            _ => return Err(invalid("'species' is missing or empty".to_string())),
        };

        let mut species = IndexMap::with_capacity(species_docs.len());
        for (species_key, species_doc) in species_docs {
            let model_docs = match species_doc.models {
                Some(models) if !models.is_empty() => models,
                _ => {
                    return Err(invalid(format!(
                        "species '{species_key}' defines no models"
                    )));
                }
            };

            let mut models = IndexMap::with_capacity(model_docs.len());
            for (model_key, model_doc) in model_docs {
                let path = model_doc.path.ok_or_else(|| {
                    invalid(format!(
                        "model '{model_key}' of species '{species_key}' has no 'path'"
                    ))
                })?;
                let classes = model_doc.classes.ok_or_else(|| {
                    invalid(format!(
                        "model '{model_key}' of species '{species_key}' has no 'classes'"
                    ))
                })?;

                let descriptor = ModelVariantDescriptor {
                    name: model_doc.name.unwrap_or_else(|| model_key.clone()),
                    path: resolve_relative(base_dir, &path),
                    classes_path: resolve_relative(base_dir, &classes),
                    description: model_doc.description,
                    preprocessing: model_doc.preprocessing.unwrap_or_default(),
                    key: model_key.clone(),
                };
                models.insert(model_key, descriptor);
            }

            let entry = SpeciesCatalogEntry {
                display_name: species_doc
                    .display_name
                    .unwrap_or_else(|| species_key.clone()),
                key: species_key.clone(),
                models,
            };
            species.insert(species_key, entry);
        }

        Ok(Self {
            source: source.to_path_buf(),
            species,
        })
    }

    /// Path of the document this catalog was loaded from.
    pub fn source_path(&self) -> &Path {
        &self.source
    }

    /// Species keys in document order.
    pub fn species_keys(&self) -> Vec<&str> {
        self.species.keys().map(String::as_str).collect()
    }

    /// Iterate over species entries in document order.
    pub fn iter(&self) -> impl Iterator<Item = &SpeciesCatalogEntry> {
        self.species.values()
    }

    /// Look up a species entry.
    pub fn species(&self, key: &str) -> Result<&SpeciesCatalogEntry> {
        self.species.get(key).ok_or_else(|| Error::SpeciesNotFound {
            species: key.to_string(),
        })
    }

    /// Look up a model variant of a species.
    pub fn variant(&self, species_key: &str, variant_key: &str) -> Result<&ModelVariantDescriptor> {
        self.species(species_key)?.variant(variant_key)
    }
}

fn resolve_relative(base_dir: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base_dir.join(path)
    }
}
