//! Per-field format multiplexing
//!
//! Lets every field of a segment pick its own postings or doc-values format.
//! Each distinct format instance writes its own files, told apart by a
//! `<format name>_<n>` segment suffix, so `_1.pst` becomes `_1_Simple_0.pst`.
//! The chosen name and suffix are stored as field attributes; the read side
//! rebuilds the routing from those attributes alone.
//!
//! - `PerFieldPostingsFormat`: postings dispatcher (write + read side)
//! - `PerFieldDocValuesFormat`: doc-values dispatcher (write + read side)

mod doc_values;
mod postings;

pub use doc_values::*;
pub use postings::*;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::{QuireError, Result};
use crate::index::FieldInfo;

use super::format::SegmentReadState;

pub const POSTINGS_FORMAT_KEY: &str = "PerFieldPostingsFormat.format";
pub const POSTINGS_SUFFIX_KEY: &str = "PerFieldPostingsFormat.suffix";
pub const DOC_VALUES_FORMAT_KEY: &str = "PerFieldDocValuesFormat.format";
pub const DOC_VALUES_SUFFIX_KEY: &str = "PerFieldDocValuesFormat.suffix";

/// Segment suffix of the `suffix`-th instance of format `format_name`
pub fn per_field_suffix(format_name: &str, suffix: &str) -> String {
    format!("{}_{}", format_name, suffix)
}

/// Dispatchers cannot be nested: an outer suffix means this dispatcher was
/// itself handed out by another one
fn full_segment_suffix(field_name: &str, outer_suffix: &str, segment_suffix: String) -> Result<String> {
    if outer_suffix.is_empty() {
        Ok(segment_suffix)
    } else {
        Err(QuireError::Config(format!(
            "cannot embed a per-field format inside another (field '{}' resolved to a per-field format)",
            field_name
        )))
    }
}

/// Attributes written by a dispatcher are set exactly once per field.
///
/// # Panics
///
/// If `key` is already present on `field`.
fn put_write_once(field: &mut FieldInfo, key: &str, value: String) {
    if let Some(previous) = field.put_attribute(key, value) {
        panic!(
            "attribute {} already set to {} on field {}",
            key, previous, field.name
        );
    }
}

/// Close every resource, keeping the first failure and logging the rest
fn close_all<I: IntoIterator<Item = Result<()>>>(results: I, what: &str) -> Result<()> {
    let mut first = None;
    for result in results {
        if let Err(e) = result {
            if first.is_none() {
                first = Some(e);
            } else {
                warn!("Additional failure closing {}: {}", what, e);
            }
        }
    }
    first.map_or(Ok(()), Err)
}

fn identity<F: ?Sized>(format: &Arc<F>) -> usize {
    Arc::as_ptr(format) as *const () as usize
}

struct ConsumerAndSuffix<F: ?Sized, C> {
    /// Held so the instance (and thus its identity) outlives the routing
    _format: Arc<F>,
    consumer: C,
    suffix: u32,
}

/// Write-side routing: format instance to opened consumer and suffix
struct WriteRouting<F: ?Sized, C> {
    entries: Vec<ConsumerAndSuffix<F, C>>,
    by_instance: HashMap<usize, usize>,
    /// Last suffix handed out per format name
    suffixes: HashMap<String, u32>,
}

impl<F: ?Sized, C> WriteRouting<F, C> {
    fn new() -> Self {
        Self {
            entries: Vec::new(),
            by_instance: HashMap::new(),
            suffixes: HashMap::new(),
        }
    }

    /// Entry for `format`, opening a consumer under a fresh suffix the first
    /// time this instance is seen
    fn route(
        &mut self,
        format: &Arc<F>,
        format_name: &str,
        field: &FieldInfo,
        outer_suffix: &str,
        open: impl FnOnce(&str) -> Result<C>,
    ) -> Result<&mut ConsumerAndSuffix<F, C>> {
        let key = identity(format);
        let idx = match self.by_instance.get(&key) {
            Some(&idx) => idx,
            None => {
                let suffix = self.suffixes.get(format_name).map_or(0, |last| last + 1);
                let segment_suffix = full_segment_suffix(
                    &field.name,
                    outer_suffix,
                    per_field_suffix(format_name, &suffix.to_string()),
                )?;
                let consumer = open(&segment_suffix)?;
                debug!("Opened {} consumer for field {}", segment_suffix, field.name);

                self.suffixes.insert(format_name.to_string(), suffix);
                self.entries.push(ConsumerAndSuffix {
                    _format: Arc::clone(format),
                    consumer,
                    suffix,
                });
                let idx = self.entries.len() - 1;
                self.by_instance.insert(key, idx);
                idx
            }
        };
        Ok(&mut self.entries[idx])
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn consumers_mut(&mut self) -> impl Iterator<Item = &mut C> {
        self.entries.iter_mut().map(|e| &mut e.consumer)
    }
}

/// Read-side routing: field to producer key, key to producer
#[derive(Debug)]
struct ReadRouting<P> {
    fields: HashMap<String, String>,
    producers: BTreeMap<String, P>,
}

impl<P> ReadRouting<P> {
    /// Open one producer per distinct `(format, suffix)` found on the fields
    /// selected by `include`.
    ///
    /// On failure every producer opened so far is closed, with errors
    /// suppressed, before the original error is returned.
    fn open(
        state: &SegmentReadState<'_>,
        include: impl Fn(&FieldInfo) -> bool,
        format_key: &str,
        suffix_key: &str,
        mut open: impl FnMut(&str, &SegmentReadState<'_>) -> Result<P>,
        mut close: impl FnMut(&mut P) -> Result<()>,
    ) -> Result<Self> {
        let mut routing = Self {
            fields: HashMap::new(),
            producers: BTreeMap::new(),
        };
        if let Err(e) = routing.populate(state, include, format_key, suffix_key, &mut open) {
            warn!("Failed to open per-field producers: {}", e);
            for (key, producer) in routing.producers.iter_mut() {
                if let Err(suppressed) = close(producer) {
                    debug!("Suppressed failure closing {}: {}", key, suppressed);
                }
            }
            return Err(e);
        }
        Ok(routing)
    }

    fn populate(
        &mut self,
        state: &SegmentReadState<'_>,
        include: impl Fn(&FieldInfo) -> bool,
        format_key: &str,
        suffix_key: &str,
        open: &mut impl FnMut(&str, &SegmentReadState<'_>) -> Result<P>,
    ) -> Result<()> {
        for field in state.field_infos.iter().filter(|f| include(f)) {
            // No format: declared, but nothing was written for it
            let Some(format_name) = field.attribute(format_key) else {
                continue;
            };
            let suffix = field.attribute(suffix_key).ok_or_else(|| {
                QuireError::Corruption(format!(
                    "field {} has format {} but no {} attribute",
                    field.name, format_name, suffix_key
                ))
            })?;

            let key = per_field_suffix(format_name, suffix);
            if !self.producers.contains_key(&key) {
                let producer = open(format_name, &state.with_suffix(key.clone()))?;
                debug!("Opened {} producer for segment {}", key, state.segment_info.name);
                self.producers.insert(key.clone(), producer);
            }
            self.fields.insert(field.name.clone(), key);
        }
        Ok(())
    }

    fn producer(&self, field: &str) -> Option<&P> {
        self.fields.get(field).and_then(|key| self.producers.get(key))
    }

    fn len(&self) -> usize {
        self.producers.len()
    }

    fn producers_mut(&mut self) -> impl Iterator<Item = &mut P> {
        self.producers.values_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_suffix_naming() {
        assert_eq!(per_field_suffix("Simple", "0"), "Simple_0");
        assert_eq!(full_segment_suffix("f", "", "Simple_1".to_string()).unwrap(), "Simple_1");
        assert!(matches!(
            full_segment_suffix("f", "Simple_0", "Simple_1".to_string()),
            Err(QuireError::Config(_))
        ));
    }

    #[test]
    #[should_panic(expected = "already set")]
    fn test_write_once_attribute() {
        let mut field = FieldInfo::new("f", 0);
        put_write_once(&mut field, POSTINGS_FORMAT_KEY, "Simple".to_string());
        put_write_once(&mut field, POSTINGS_FORMAT_KEY, "Simple".to_string());
    }

    #[test]
    fn test_close_all_returns_first_error() {
        let results = vec![
            Ok(()),
            Err(QuireError::Corruption("first".to_string())),
            Err(QuireError::Corruption("second".to_string())),
        ];
        match close_all(results, "test") {
            Err(QuireError::Corruption(msg)) => assert_eq!(msg, "first"),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_write_routing_allocates_suffix_per_instance() {
        let a: Arc<str> = Arc::from("a");
        let b: Arc<str> = Arc::from("b");
        let field = FieldInfo::new("f", 0);
        let mut routing: WriteRouting<str, String> = WriteRouting::new();

        let first = routing.route(&a, "Fmt", &field, "", |s| Ok(s.to_string())).unwrap();
        assert_eq!((first.consumer.as_str(), first.suffix), ("Fmt_0", 0));
        let again = routing.route(&a, "Fmt", &field, "", |_| unreachable!()).unwrap();
        assert_eq!(again.suffix, 0);
        let other = routing.route(&b, "Fmt", &field, "", |s| Ok(s.to_string())).unwrap();
        assert_eq!((other.consumer.as_str(), other.suffix), ("Fmt_1", 1));
        assert_eq!(routing.len(), 2);
    }
}
