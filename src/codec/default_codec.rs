use std::sync::Arc;

use crate::config::PerFieldConfig;
use crate::error::Result;

use super::format::{Codec, DocValuesFormat, LiveDocsFormat, PostingsFormat, TermVectorsFormat};
use super::live_docs::RoaringLiveDocsFormat;
use super::perfield::{PerFieldDocValuesFormat, PerFieldPostingsFormat};
use super::registry::{doc_values_resolver, postings_resolver, FormatRegistry};
use super::simple::{SimpleDocValuesFormat, SimplePostingsFormat, SimpleTermVectorsFormat};

/// The codec segments are written with: per-field postings and doc values,
/// roaring live docs and single-file term vectors
#[derive(Debug, Clone)]
pub struct DefaultCodec {
    postings: Arc<dyn PostingsFormat>,
    doc_values: Arc<dyn DocValuesFormat>,
    live_docs: Arc<dyn LiveDocsFormat>,
    term_vectors: Arc<dyn TermVectorsFormat>,
}

impl DefaultCodec {
    pub const NAME: &'static str = "Quire10";

    /// Explicit top-level postings and doc-values formats
    pub fn new(postings: Arc<dyn PostingsFormat>, doc_values: Arc<dyn DocValuesFormat>) -> Self {
        Self {
            postings,
            doc_values,
            live_docs: Arc::new(RoaringLiveDocsFormat),
            term_vectors: Arc::new(SimpleTermVectorsFormat),
        }
    }

    /// Per-field dispatch as configured; fails on names `registry` lacks
    pub fn from_config(config: &PerFieldConfig, registry: Arc<FormatRegistry>) -> Result<Self> {
        let postings = PerFieldPostingsFormat::new(postings_resolver(config, &registry)?, Arc::clone(&registry));
        let doc_values = PerFieldDocValuesFormat::new(doc_values_resolver(config, &registry)?, registry);
        Ok(Self::new(Arc::new(postings), Arc::new(doc_values)))
    }

    /// Every field on the bundled simple formats
    pub fn simple() -> Self {
        let registry = Arc::new(FormatRegistry::new());
        let postings: Arc<dyn PostingsFormat> = Arc::new(SimplePostingsFormat::new());
        let doc_values: Arc<dyn DocValuesFormat> = Arc::new(SimpleDocValuesFormat::new());
        registry.register_postings(Arc::clone(&postings));
        registry.register_doc_values(Arc::clone(&doc_values));

        Self::new(
            Arc::new(PerFieldPostingsFormat::new(
                Arc::new(move |_: &str| Some(Arc::clone(&postings))),
                Arc::clone(&registry),
            )),
            Arc::new(PerFieldDocValuesFormat::new(
                Arc::new(move |_: &str| Some(Arc::clone(&doc_values))),
                registry,
            )),
        )
    }
}

impl Codec for DefaultCodec {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn postings_format(&self) -> Arc<dyn PostingsFormat> {
        Arc::clone(&self.postings)
    }

    fn doc_values_format(&self) -> Arc<dyn DocValuesFormat> {
        Arc::clone(&self.doc_values)
    }

    fn live_docs_format(&self) -> Arc<dyn LiveDocsFormat> {
        Arc::clone(&self.live_docs)
    }

    fn term_vectors_format(&self) -> Arc<dyn TermVectorsFormat> {
        Arc::clone(&self.term_vectors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::QuireError;

    #[test]
    fn test_simple_codec_dispatches_per_field() {
        let codec = DefaultCodec::simple();
        assert_eq!(codec.name(), "Quire10");
        assert_eq!(codec.postings_format().name(), "PerField40");
        assert_eq!(codec.doc_values_format().name(), "PerFieldDV40");
    }

    #[test]
    fn test_from_config_rejects_unknown_names() {
        let registry = Arc::new(FormatRegistry::with_defaults());
        assert!(DefaultCodec::from_config(&PerFieldConfig::default(), Arc::clone(&registry)).is_ok());

        let config = PerFieldConfig::default().with_postings_format("id", "Pulsing");
        assert!(matches!(
            DefaultCodec::from_config(&config, registry),
            Err(QuireError::Config(_))
        ));
    }
}
