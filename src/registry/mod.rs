//! Species/model catalog: parsing, validation and lookup.

#![allow(clippy::print_stdout)]

pub mod loader;
pub mod types;

// Re-export commonly used types and functions
pub use loader::{
    CatalogFormat, catalog_candidates, find_default_catalog, load_catalog, parse_catalog,
};
pub use types::{
    Catalog, CatalogDocument, ModelDocument, ModelVariantDescriptor, SpeciesCatalogEntry,
    SpeciesDocument,
};

use crate::error::Result;

/// List all species in the catalog.
pub fn list_species(catalog: &Catalog) {
    println!("Species in {}:", catalog.source_path().display());
    println!();

    for species in catalog.iter() {
        println!("  {} - {}", species.key, species.display_name);
        let variants: Vec<&str> = species.variant_keys().collect();
        println!("    Models: {}", variants.join(", "));
    }

    println!();
    println!("Run 'flyage species show <key>' for details.");
}

/// Show the model variants of one species.
pub fn show_species(catalog: &Catalog, key: &str) -> Result<()> {
    let species = catalog.species(key)?;

    println!("Species: {}", species.display_name);
    println!("Key: {}", species.key);
    println!();

    for variant in species.models.values() {
        println!("  {} ({})", variant.key, variant.name);
        if let Some(ref description) = variant.description {
            println!("    {description}");
        }
        println!("    Model: {}", variant.path.display());
        println!("    Classes: {}", variant.classes_path.display());
        println!("    Preprocessing: {}", variant.preprocessing);
    }

    println!();
    println!("To classify: flyage --species {} --variant <key> <images>", species.key);

    Ok(())
}
