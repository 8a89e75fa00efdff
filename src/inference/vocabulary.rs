//! Class vocabulary parsing.

use crate::error::{Error, Result};
use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;

/// Accepted shapes of a vocabulary file.
///
/// When both keys are present the ordered list wins.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum VocabularyFile {
    /// `{"classes": ["-5", "-4", ...]}`
    Ordered { classes: Vec<Value> },
    /// `{"class_to_idx": {"-5": 0, "-4": 1, ...}}`
    Indexed { class_to_idx: IndexMap<String, Value> },
}

/// Ordered class labels with a label ↔ index bijection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassVocabulary {
    labels: Vec<String>,
    index: HashMap<String, usize>,
}

impl ClassVocabulary {
    /// Build a vocabulary from labels in index order.
    ///
    /// Fails on an empty list or a duplicate label.
    pub fn from_labels(labels: Vec<String>) -> std::result::Result<Self, String> {
        if labels.is_empty() {
            return Err("vocabulary has no classes".to_string());
        }

        let mut index = HashMap::with_capacity(labels.len());
        for (i, label) in labels.iter().enumerate() {
            if let Some(previous) = index.insert(label.clone(), i) {
                return Err(format!(
                    "duplicate label '{label}' at indices {previous} and {i}"
                ));
            }
        }

        Ok(Self { labels, index })
    }

    /// Read and validate a vocabulary file.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(Error::VocabularyFileNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| Error::VocabularyRead {
            path: path.to_path_buf(),
            source: e,
        })?;

        Self::from_json(&content, path)
    }

    /// Parse vocabulary JSON that was read from `path`.
    pub fn from_json(content: &str, path: &Path) -> Result<Self> {
        let invalid = |message: String| Error::VocabularyInvalid {
            path: path.to_path_buf(),
            message,
        };

        let file: VocabularyFile =
            serde_json::from_str(content).map_err(|e| Error::VocabularyParse {
                path: path.to_path_buf(),
                source: e,
            })?;

        let labels = match file {
            VocabularyFile::Ordered { classes } => classes
                .iter()
                .map(label_text)
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(invalid)?,
            VocabularyFile::Indexed { class_to_idx } => {
                labels_from_index_map(class_to_idx).map_err(invalid)?
            }
        };

        Self::from_labels(labels).map_err(invalid)
    }

    /// Number of classes.
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// Always false for a constructed vocabulary; present for API symmetry.
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Labels in index order.
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Label at a class index.
    pub fn label(&self, index: usize) -> Option<&str> {
        self.labels.get(index).map(String::as_str)
    }

    /// Class index of a label.
    pub fn index_of(&self, label: &str) -> Option<usize> {
        self.index.get(label).copied()
    }
}

/// Render a JSON label as text; numeric labels such as `-5` are common.
fn label_text(value: &Value) -> std::result::Result<String, String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        other => Err(format!("unsupported label value: {other}")),
    }
}

fn index_value(label: &str, value: &Value) -> std::result::Result<usize, String> {
    let parsed = match value {
        Value::Number(n) => n.as_u64().and_then(|v| usize::try_from(v).ok()),
        Value::String(s) => s.trim().parse::<usize>().ok(),
        _ => None,
    };
    parsed.ok_or_else(|| format!("label '{label}' has invalid index {value}"))
}

/// Re-sort a label → index mapping into index order, requiring indices to
/// cover `0..n` exactly once.
fn labels_from_index_map(
    class_to_idx: IndexMap<String, Value>,
) -> std::result::Result<Vec<String>, String> {
    let n = class_to_idx.len();
    let mut slots: Vec<Option<String>> = vec![None; n];

    for (label, value) in class_to_idx {
        let idx = index_value(&label, &value)?;
        let slot = slots
            .get_mut(idx)
            .ok_or_else(|| format!("index {idx} of label '{label}' is out of range 0..{n}"))?;
        if let Some(existing) = slot {
            return Err(format!(
                "labels '{existing}' and '{label}' share index {idx}"
            ));
        }
        *slot = Some(label);
    }

    // n labels into n slots without collision fills every slot.
    Ok(slots.into_iter().flatten().collect())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn parse(json: &str) -> Result<ClassVocabulary> {
        ClassVocabulary::from_json(json, Path::new("classes.json"))
    }

    #[test]
    fn test_ordered_list() {
        let vocab = parse(r#"{"classes": ["-5", "-4", "-3"]}"#).unwrap();
        assert_eq!(vocab.labels(), &["-5", "-4", "-3"]);
        assert_eq!(vocab.index_of("-4"), Some(1));
        assert_eq!(vocab.label(2), Some("-3"));
        assert_eq!(vocab.label(3), None);
    }

    #[test]
    fn test_numeric_labels_are_stringified() {
        let vocab = parse(r#"{"classes": [-5, -4, 3]}"#).unwrap();
        assert_eq!(vocab.labels(), &["-5", "-4", "3"]);
    }

    #[test]
    fn test_index_map_is_sorted_by_index() {
        let vocab = parse(r#"{"class_to_idx": {"c": 2, "a": 0, "b": "1"}}"#).unwrap();
        assert_eq!(vocab.labels(), &["a", "b", "c"]);
        assert_eq!(vocab.index_of("c"), Some(2));
    }

    #[test]
    fn test_ordered_list_wins_when_both_present() {
        let vocab = parse(r#"{"classes": ["x", "y"], "class_to_idx": {"y": 0, "x": 1}}"#).unwrap();
        assert_eq!(vocab.labels(), &["x", "y"]);
    }

    #[test]
    fn test_duplicate_labels_rejected() {
        let err = parse(r#"{"classes": ["a", "b", "a"]}"#).unwrap_err();
        assert!(matches!(err, Error::VocabularyInvalid { .. }));
        assert!(err.to_string().contains("classes.json"));
    }

    #[test]
    fn test_index_gaps_and_collisions_rejected() {
        assert!(matches!(
            parse(r#"{"class_to_idx": {"a": 0, "b": 2}}"#),
            Err(Error::VocabularyInvalid { .. })
        ));
        assert!(matches!(
            parse(r#"{"class_to_idx": {"a": 1, "b": 1}}"#),
            Err(Error::VocabularyInvalid { .. })
        ));
        assert!(matches!(
            parse(r#"{"class_to_idx": {"a": -1}}"#),
            Err(Error::VocabularyInvalid { .. })
        ));
    }

    #[test]
    fn test_wrong_shape_rejected() {
        assert!(matches!(
            parse(r#"{"labels": ["a"]}"#),
            Err(Error::VocabularyParse { .. })
        ));
        assert!(matches!(parse("not json"), Err(Error::VocabularyParse { .. })));
    }

    #[test]
    fn test_empty_vocabulary_rejected() {
        assert!(matches!(
            parse(r#"{"classes": []}"#),
            Err(Error::VocabularyInvalid { .. })
        ));
    }

    #[test]
    fn test_load_missing_file() {
        let err = ClassVocabulary::load(Path::new("/nonexistent/classes.json")).unwrap_err();
        assert!(matches!(err, Error::VocabularyFileNotFound { .. }));
    }
}
