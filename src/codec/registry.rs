//! Name-to-format lookup used when reading segments back
//!
//! Every format a segment may have been written with must be registered
//! under the name it reports, since field metadata records only that name.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::info;

use crate::config::PerFieldConfig;
use crate::error::{QuireError, Result};

use super::format::{DocValuesFormat, PostingsFormat};
use super::perfield::{DocValuesFormatResolver, PostingsFormatResolver};
use super::simple::{SimpleDocValuesFormat, SimplePostingsFormat};

#[derive(Default)]
pub struct FormatRegistry {
    postings: RwLock<HashMap<String, Arc<dyn PostingsFormat>>>,
    doc_values: RwLock<HashMap<String, Arc<dyn DocValuesFormat>>>,
}

impl FormatRegistry {
    /// An empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the bundled formats
    pub fn with_defaults() -> Self {
        let registry = Self::new();
        registry.register_postings(Arc::new(SimplePostingsFormat::new()));
        registry.register_doc_values(Arc::new(SimpleDocValuesFormat::new()));
        registry
    }

    /// Register under `format.name()`, replacing any previous entry
    pub fn register_postings(&self, format: Arc<dyn PostingsFormat>) {
        let name = format.name().to_string();
        if self.postings.write().insert(name.clone(), format).is_some() {
            info!("Replaced postings format {}", name);
        }
    }

    pub fn register_doc_values(&self, format: Arc<dyn DocValuesFormat>) {
        let name = format.name().to_string();
        if self.doc_values.write().insert(name.clone(), format).is_some() {
            info!("Replaced doc values format {}", name);
        }
    }

    pub fn postings(&self, name: &str) -> Result<Arc<dyn PostingsFormat>> {
        self.postings
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| QuireError::UnknownFormat(format!("postings format {}", name)))
    }

    pub fn doc_values(&self, name: &str) -> Result<Arc<dyn DocValuesFormat>> {
        self.doc_values
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| QuireError::UnknownFormat(format!("doc values format {}", name)))
    }

    fn names<T: ?Sized>(map: &HashMap<String, Arc<T>>) -> Vec<String> {
        let mut names: Vec<String> = map.keys().cloned().collect();
        names.sort();
        names
    }
}

impl fmt::Debug for FormatRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FormatRegistry")
            .field("postings", &Self::names(&self.postings.read()))
            .field("doc_values", &Self::names(&self.doc_values.read()))
            .finish()
    }
}

/// Resolver backed by `config`. Every configured name is checked against the
/// registry up front, so an unknown name fails here rather than at flush.
pub fn postings_resolver(config: &PerFieldConfig, registry: &FormatRegistry) -> Result<PostingsFormatResolver> {
    let default = match &config.default_postings_format {
        Some(name) => Some(checked(registry.postings(name))?),
        None => None,
    };
    let mut by_field = HashMap::new();
    for (field, name) in &config.postings_formats {
        by_field.insert(field.clone(), checked(registry.postings(name))?);
    }
    Ok(Arc::new(move |field: &str| by_field.get(field).cloned().or_else(|| default.clone())))
}

pub fn doc_values_resolver(config: &PerFieldConfig, registry: &FormatRegistry) -> Result<DocValuesFormatResolver> {
    let default = match &config.default_doc_values_format {
        Some(name) => Some(checked(registry.doc_values(name))?),
        None => None,
    };
    let mut by_field = HashMap::new();
    for (field, name) in &config.doc_values_formats {
        by_field.insert(field.clone(), checked(registry.doc_values(name))?);
    }
    Ok(Arc::new(move |field: &str| by_field.get(field).cloned().or_else(|| default.clone())))
}

/// Unknown names in configuration are configuration errors
fn checked<T>(lookup: Result<T>) -> Result<T> {
    lookup.map_err(|e| match e {
        QuireError::UnknownFormat(what) => QuireError::Config(format!("unknown {}", what)),
        other => other,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_by_name() {
        let registry = FormatRegistry::with_defaults();
        assert_eq!(registry.postings("Simple").unwrap().name(), "Simple");
        assert_eq!(registry.doc_values("SimpleDV").unwrap().name(), "SimpleDV");
        assert!(matches!(registry.postings("Lucene41"), Err(QuireError::UnknownFormat(_))));
    }

    #[test]
    fn test_resolver_returns_shared_instances() {
        let registry = FormatRegistry::with_defaults();
        registry.register_postings(Arc::new(SimplePostingsFormat::named("Other")));
        let config = PerFieldConfig::default().with_postings_format("id", "Other");
        let resolve = postings_resolver(&config, &registry).unwrap();

        let a = resolve("title").unwrap();
        let b = resolve("body").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(resolve("id").unwrap().name(), "Other");
    }

    #[test]
    fn test_unknown_configured_name_is_config_error() {
        let registry = FormatRegistry::with_defaults();
        let config = PerFieldConfig::default().with_doc_values_format("price", "Missing");
        assert!(matches!(doc_values_resolver(&config, &registry), Err(QuireError::Config(_))));

        let none = PerFieldConfig {
            default_postings_format: None,
            ..PerFieldConfig::default()
        };
        let resolve = postings_resolver(&none, &registry).unwrap();
        assert!(resolve("body").is_none());
    }
}
