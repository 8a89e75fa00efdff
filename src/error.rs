//! Error types for flyage.

use std::path::PathBuf;

/// Result type alias for flyage operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Broad category of an [`Error`].
///
/// Interactive front-ends use this to decide how to present a failure
/// without matching every variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed or incomplete catalog document.
    Catalog,
    /// Missing species/variant key or missing file.
    NotFound,
    /// Classifier and vocabulary disagree, or the vocabulary is malformed.
    Validation,
    /// Unreadable, corrupt or missing image.
    Image,
    /// Runtime failure while executing the classifier.
    Inference,
    /// Application configuration problem.
    Config,
    /// Plain I/O failure outside the categories above.
    Io,
    /// Unexpected internal failure.
    Internal,
}

/// Top-level error type for flyage.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration directory could not be determined.
    #[error("could not determine configuration directory for this platform")]
    ConfigDirNotFound,

    /// Failed to read configuration file.
    #[error("failed to read config file '{path}'")]
    ConfigRead {
        /// Path to the config file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse configuration file.
    #[error("failed to parse config file '{path}'")]
    ConfigParse {
        /// Path to the config file.
        path: PathBuf,
        /// Underlying parse error.
        #[source]
        source: toml::de::Error,
    },

    /// Failed to write configuration file.
    #[error("failed to write config file '{path}'")]
    ConfigWrite {
        /// Path to the config file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to serialize configuration.
    #[error("failed to serialize config")]
    ConfigSerialize {
        /// Underlying serialization error.
        #[source]
        source: toml::ser::Error,
    },

    /// Configuration validation failed.
    #[error("configuration validation failed: {message}")]
    ConfigValidation {
        /// Description of the validation failure.
        message: String,
    },

    /// Catalog document does not exist.
    #[error("catalog file does not exist: {path}")]
    CatalogNotFound {
        /// Path to the catalog document.
        path: PathBuf,
    },

    /// Failed to read catalog document.
    #[error("failed to read catalog file '{path}'")]
    CatalogRead {
        /// Path to the catalog document.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse catalog document.
    #[error("failed to parse catalog file '{path}'")]
    CatalogParse {
        /// Path to the catalog document.
        path: PathBuf,
        /// Underlying parse error.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Catalog document is structurally invalid.
    #[error("invalid catalog '{path}': {message}")]
    CatalogInvalid {
        /// Path to the catalog document.
        path: PathBuf,
        /// Description naming the offending species/model key.
        message: String,
    },

    /// Species key is not registered in the catalog.
    #[error("species '{species}' not found in catalog")]
    SpeciesNotFound {
        /// Requested species key.
        species: String,
    },

    /// Variant key is not registered for the species.
    #[error("model variant '{variant}' not found for species '{species}'")]
    VariantNotFound {
        /// Species key.
        species: String,
        /// Requested variant key.
        variant: String,
    },

    /// Classifier artifact does not exist.
    #[error("model file does not exist: {path}")]
    ModelFileNotFound {
        /// Path to the missing model file.
        path: PathBuf,
    },

    /// Class vocabulary file does not exist.
    #[error("class vocabulary file does not exist: {path}")]
    VocabularyFileNotFound {
        /// Path to the missing vocabulary file.
        path: PathBuf,
    },

    /// Failed to read the class vocabulary file.
    #[error("failed to read class vocabulary '{path}'")]
    VocabularyRead {
        /// Path to the vocabulary file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Class vocabulary file is not valid JSON or has the wrong shape.
    #[error("failed to parse class vocabulary '{path}'")]
    VocabularyParse {
        /// Path to the vocabulary file.
        path: PathBuf,
        /// Underlying parse error.
        #[source]
        source: serde_json::Error,
    },

    /// Class vocabulary content violates the label/index bijection.
    #[error("invalid class vocabulary '{path}': {message}")]
    VocabularyInvalid {
        /// Path to the vocabulary file.
        path: PathBuf,
        /// Description of the violation.
        message: String,
    },

    /// Classifier output width differs from the vocabulary size.
    #[error("model/vocabulary mismatch for '{path}': model has {outputs} outputs, vocabulary has {classes} classes")]
    OutputWidthMismatch {
        /// Path to the classifier artifact.
        path: PathBuf,
        /// Output width reported by the classifier.
        outputs: usize,
        /// Number of labels in the vocabulary.
        classes: usize,
    },

    /// Image file does not exist.
    #[error("image file does not exist: {path}")]
    ImageNotFound {
        /// Path to the missing image.
        path: PathBuf,
    },

    /// Image could not be opened or decoded.
    #[error("failed to decode image '{path}'")]
    ImageDecode {
        /// Path to the image.
        path: PathBuf,
        /// Underlying decode error.
        #[source]
        source: image::ImageError,
    },

    /// Failed to build the classifier session.
    #[error("failed to build classifier from '{path}': {reason}")]
    ClassifierBuild {
        /// Path to the classifier artifact.
        path: PathBuf,
        /// Description of the build failure.
        reason: String,
    },

    /// Inference failed.
    #[error("inference failed: {reason}")]
    Inference {
        /// Description of the inference failure.
        reason: String,
    },

    /// Failed to write a result export.
    #[error("failed to write results to '{path}'")]
    ResultWrite {
        /// Path to the export file.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Failed to hash a classifier artifact.
    #[error("failed to hash model '{path}'")]
    ModelHash {
        /// Path to the classifier artifact.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to read a calibration score file.
    #[error("failed to read calibration data '{path}'")]
    CalibrationData {
        /// Path to the calibration file.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// No image files were found in the inputs.
    #[error("no image files found in the provided paths")]
    NoValidImages,

    /// Internal error (for unexpected failures).
    #[error("internal error: {message}")]
    Internal {
        /// Error message.
        message: String,
    },
}

impl Error {
    /// Category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::CatalogNotFound { .. }
            | Self::CatalogRead { .. }
            | Self::CatalogParse { .. }
            | Self::CatalogInvalid { .. } => ErrorKind::Catalog,
            Self::SpeciesNotFound { .. }
            | Self::VariantNotFound { .. }
            | Self::ModelFileNotFound { .. }
            | Self::VocabularyFileNotFound { .. } => ErrorKind::NotFound,
            Self::VocabularyRead { .. }
            | Self::VocabularyParse { .. }
            | Self::VocabularyInvalid { .. }
            | Self::OutputWidthMismatch { .. } => ErrorKind::Validation,
            Self::ImageNotFound { .. } | Self::ImageDecode { .. } | Self::NoValidImages => {
                ErrorKind::Image
            }
            Self::ClassifierBuild { .. } | Self::Inference { .. } => ErrorKind::Inference,
            Self::ConfigDirNotFound
            | Self::ConfigRead { .. }
            | Self::ConfigParse { .. }
            | Self::ConfigWrite { .. }
            | Self::ConfigSerialize { .. }
            | Self::ConfigValidation { .. }
            | Self::CalibrationData { .. } => ErrorKind::Config,
            Self::Io(_) | Self::ResultWrite { .. } | Self::ModelHash { .. } => ErrorKind::Io,
            Self::Internal { .. } => ErrorKind::Internal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_groups_variants() {
        let err = Error::VariantNotFound {
            species: "ludens".into(),
            variant: "v9".into(),
        };
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let err = Error::OutputWidthMismatch {
            path: PathBuf::from("m.onnx"),
            outputs: 5,
            classes: 4,
        };
        assert_eq!(err.kind(), ErrorKind::Validation);
        let msg = err.to_string();
        assert!(msg.contains('5') && msg.contains('4'));
    }

    #[test]
    fn test_messages_name_offending_identifiers() {
        let err = Error::VariantNotFound {
            species: "ludens".into(),
            variant: "v9".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("ludens"));
        assert!(msg.contains("v9"));
    }
}
