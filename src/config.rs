use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::codec::{SimpleDocValuesFormat, SimplePostingsFormat};
use crate::error::{QuireError, Result};

/// Settings of a `SegmentIndexer`
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexingConfig {
    /// Initial capacity of each field's term table; must be a power of two
    pub hash_init_size: usize,
    /// Flush once buffered postings reach this many bytes
    pub max_buffered_bytes: usize,
    /// Flush once this many documents are buffered
    pub max_buffered_docs: usize,
    pub per_field: PerFieldConfig,
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            hash_init_size: 4,
            max_buffered_bytes: 16 * 1024 * 1024, // 16MB
            max_buffered_docs: 10_000,
            per_field: PerFieldConfig::default(),
        }
    }
}

impl IndexingConfig {
    /// Parse a JSON document; missing keys take their defaults
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| QuireError::Config(format!("invalid indexing config: {}", e)))
    }

    /// Small buffers, for tests
    pub fn small() -> Self {
        Self {
            max_buffered_bytes: 64 * 1024,
            max_buffered_docs: 100,
            ..Self::default()
        }
    }
}

/// Which registered format each field is written with
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PerFieldConfig {
    /// Used for fields without an entry in `postings_formats`; `None` makes
    /// such fields a configuration error at flush
    pub default_postings_format: Option<String>,
    pub postings_formats: BTreeMap<String, String>,
    pub default_doc_values_format: Option<String>,
    pub doc_values_formats: BTreeMap<String, String>,
}

impl Default for PerFieldConfig {
    fn default() -> Self {
        Self {
            default_postings_format: Some(SimplePostingsFormat::NAME.to_string()),
            postings_formats: BTreeMap::new(),
            default_doc_values_format: Some(SimpleDocValuesFormat::NAME.to_string()),
            doc_values_formats: BTreeMap::new(),
        }
    }
}

impl PerFieldConfig {
    /// Format name configured for `field`'s postings
    pub fn postings_format_for(&self, field: &str) -> Option<&str> {
        self.postings_formats
            .get(field)
            .or(self.default_postings_format.as_ref())
            .map(String::as_str)
    }

    pub fn doc_values_format_for(&self, field: &str) -> Option<&str> {
        self.doc_values_formats
            .get(field)
            .or(self.default_doc_values_format.as_ref())
            .map(String::as_str)
    }

    pub fn with_postings_format(mut self, field: impl Into<String>, format: impl Into<String>) -> Self {
        self.postings_formats.insert(field.into(), format.into());
        self
    }

    pub fn with_doc_values_format(mut self, field: impl Into<String>, format: impl Into<String>) -> Self {
        self.doc_values_formats.insert(field.into(), format.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = IndexingConfig::default();
        assert!(config.hash_init_size.is_power_of_two());
        assert_eq!(config.per_field.postings_format_for("body"), Some("Simple"));
        assert_eq!(config.per_field.doc_values_format_for("price"), Some("SimpleDV"));
    }

    #[test]
    fn test_field_override() {
        let per_field = PerFieldConfig::default().with_postings_format("id", "Memory");
        assert_eq!(per_field.postings_format_for("id"), Some("Memory"));
        assert_eq!(per_field.postings_format_for("body"), Some("Simple"));

        let no_default = PerFieldConfig {
            default_postings_format: None,
            ..PerFieldConfig::default()
        };
        assert_eq!(no_default.postings_format_for("body"), None);
    }

    #[test]
    fn test_json_round_trip() {
        let json = r#"{"hash_init_size": 8, "per_field": {"postings_formats": {"id": "Simple"}}}"#;
        let config = IndexingConfig::from_json(json).unwrap();
        assert_eq!(config.hash_init_size, 8);
        assert_eq!(config.max_buffered_docs, 10_000);
        assert_eq!(config.per_field.postings_format_for("id"), Some("Simple"));
        assert_eq!(config.per_field.default_doc_values_format.as_deref(), Some("SimpleDV"));

        let back = IndexingConfig::from_json(&serde_json::to_string(&config).unwrap()).unwrap();
        assert_eq!(back.per_field, config.per_field);
    }

    #[test]
    fn test_invalid_json_is_config_error() {
        let err = IndexingConfig::from_json(r#"{"hash_init_size": "four"}"#).unwrap_err();
        assert!(matches!(err, QuireError::Config(_)));
    }
}
