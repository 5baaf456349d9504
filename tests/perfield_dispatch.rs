//! Per-field postings dispatch, write and read side

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use quire::codec::perfield::{POSTINGS_FORMAT_KEY, POSTINGS_SUFFIX_KEY};
use quire::codec::{
    FieldStats, FieldsConsumer, FieldsProducer, FormatRegistry, PerFieldPostingsFormat, PerFieldPostingsReader,
    PostingsFormat, PostingsFormatResolver, SegmentReadState, SegmentWriteState, SimplePostingsFormat, TermStats,
    Terms,
};
use quire::index::{FieldInfo, FieldInfos, IndexOptions, IndexableField, SegmentIndexer, SegmentInfo, SegmentReader, Token};
use quire::store::{Directory, RamDirectory};
use quire::{DefaultCodec, IndexingConfig, PerFieldConfig, QuireError, Result};

fn indexed(name: &str) -> FieldInfo {
    FieldInfo::new(name, 0).with_index_options(IndexOptions::DocsAndFreqsAndPositions)
}

fn write_one_term(consumer: &mut dyn FieldsConsumer, field: &mut FieldInfo) -> Result<()> {
    let mut terms = consumer.add_field(field)?;
    let postings = terms.start_term(b"term")?;
    postings.start_doc(0, 1)?;
    postings.add_position(0)?;
    postings.finish_doc()?;
    terms.finish_term(b"term", TermStats { doc_freq: 1, total_term_freq: Some(1) })?;
    terms.finish(FieldStats { sum_total_term_freq: Some(1), sum_doc_freq: 1, doc_count: 1 })
}

#[test]
fn test_fields_on_one_instance_share_files() {
    common::init_tracing();
    let dir = Arc::new(RamDirectory::new());
    let mut indexer =
        SegmentIndexer::new(dir.clone(), Arc::new(DefaultCodec::simple()), IndexingConfig::small()).unwrap();
    indexer
        .add_document(&[
            IndexableField::text("title", Token::sequence(["rust"])),
            IndexableField::text("body", Token::sequence(["systems", "language"])),
        ])
        .unwrap();
    let flushed = indexer.flush().unwrap();

    for name in ["title", "body"] {
        let field = flushed.field_infos.get(name).unwrap();
        assert_eq!(field.attribute(POSTINGS_FORMAT_KEY), Some("Simple"));
        assert_eq!(field.attribute(POSTINGS_SUFFIX_KEY), Some("0"));
    }
    let postings_files: Vec<String> = dir
        .list_all()
        .unwrap()
        .into_iter()
        .filter(|f| f.ends_with(".pst"))
        .collect();
    assert_eq!(postings_files, vec!["_0_Simple_0.pst"]);
}

#[test]
fn test_same_name_distinct_instances_get_distinct_suffixes() {
    let dir = Arc::new(RamDirectory::new());
    let first: Arc<dyn PostingsFormat> = Arc::new(SimplePostingsFormat::new());
    let second: Arc<dyn PostingsFormat> = Arc::new(SimplePostingsFormat::new());
    let resolver: PostingsFormatResolver = Arc::new(move |field: &str| {
        Some(if field == "a" { Arc::clone(&first) } else { Arc::clone(&second) })
    });
    let registry = Arc::new(FormatRegistry::with_defaults());
    let format = PerFieldPostingsFormat::new(resolver, Arc::clone(&registry));

    let mut a = indexed("a");
    let mut b = indexed("b");
    let mut consumer = format.fields_consumer(&SegmentWriteState::new(dir.clone(), "_5", 1)).unwrap();
    write_one_term(consumer.as_mut(), &mut a).unwrap();
    write_one_term(consumer.as_mut(), &mut b).unwrap();
    consumer.close().unwrap();

    assert_eq!(a.attribute(POSTINGS_SUFFIX_KEY), Some("0"));
    assert_eq!(b.attribute(POSTINGS_SUFFIX_KEY), Some("1"));
    assert_eq!(dir.list_all().unwrap(), vec!["_5_Simple_0.pst", "_5_Simple_1.pst"]);

    // Read side resolves both through the one registered "Simple"
    let infos = FieldInfos::from_fields(vec![a, b.clone()]).unwrap();
    let info = SegmentInfo::new(dir.clone(), "_5", 1, Arc::new(DefaultCodec::simple()));
    let reader = PerFieldPostingsReader::open(&SegmentReadState::new(dir, &info, &infos), &registry).unwrap();
    assert_eq!(reader.producer_count(), 2);
    assert_eq!(reader.terms("b").unwrap().map(|t| t.len()), Some(1));
}

#[test]
fn test_configured_formats_round_trip_through_reader() {
    common::init_tracing();
    let dir = Arc::new(RamDirectory::new());
    let registry = Arc::new(FormatRegistry::with_defaults());
    registry.register_postings(Arc::new(SimplePostingsFormat::named("Alt")));
    let per_field = PerFieldConfig::default().with_postings_format("id", "Alt");
    let codec = Arc::new(DefaultCodec::from_config(&per_field, registry).unwrap());

    let mut indexer = SegmentIndexer::new(dir.clone(), codec, IndexingConfig::small()).unwrap();
    for (id, body) in [("a1", "red fish"), ("b2", "blue fish")] {
        indexer
            .add_document(&[
                IndexableField::text("id", Token::sequence([id])),
                IndexableField::text("body", Token::sequence(body.split(' '))),
                IndexableField::text("empty", Vec::new()),
            ])
            .unwrap();
    }
    let flushed = indexer.flush().unwrap();
    assert!(dir.file_exists("_0_Alt_0.pst"));
    assert!(dir.file_exists("_0_Simple_0.pst"));
    assert_eq!(flushed.field_infos.get("empty").unwrap().attribute(POSTINGS_FORMAT_KEY), None);

    let mut reader = SegmentReader::open(&flushed.commit).unwrap();
    let ids: Vec<Vec<u8>> = reader.terms("id").unwrap().unwrap().terms().map(<[u8]>::to_vec).collect();
    assert_eq!(ids, vec![b"a1".to_vec(), b"b2".to_vec()]);
    let fish = reader.terms("body").unwrap().unwrap().term_stats(b"fish").unwrap();
    assert_eq!(fish.doc_freq, 2);
    assert!(reader.terms("empty").unwrap().is_none());
    reader.close().unwrap();
}

#[test]
fn test_unresolved_field_fails_before_writing() {
    let dir = Arc::new(RamDirectory::new());
    let per_field = PerFieldConfig {
        default_postings_format: None,
        ..PerFieldConfig::default()
    };
    let codec = DefaultCodec::from_config(&per_field, Arc::new(FormatRegistry::with_defaults())).unwrap();
    let mut indexer = SegmentIndexer::new(dir.clone(), Arc::new(codec), IndexingConfig::small()).unwrap();
    indexer
        .add_document(&[IndexableField::text("body", Token::sequence(["x"]))])
        .unwrap();

    assert!(matches!(indexer.flush(), Err(QuireError::Config(_))));
    assert!(dir.list_all().unwrap().is_empty());
}

#[test]
fn test_nested_dispatcher_is_config_error() {
    let registry = Arc::new(FormatRegistry::with_defaults());
    let inner: Arc<dyn PostingsFormat> = Arc::new(PerFieldPostingsFormat::new(
        Arc::new(|_: &str| Some(Arc::new(SimplePostingsFormat::new()) as Arc<dyn PostingsFormat>)),
        Arc::clone(&registry),
    ));
    let outer = PerFieldPostingsFormat::new(Arc::new(move |_: &str| Some(Arc::clone(&inner))), registry);

    let mut consumer = outer
        .fields_consumer(&SegmentWriteState::new(Arc::new(RamDirectory::new()), "_0", 1))
        .unwrap();
    let mut field = indexed("body");
    assert!(matches!(
        write_one_term(consumer.as_mut(), &mut field),
        Err(QuireError::Config(_))
    ));
}

fn read_with(field: FieldInfo, registry: &FormatRegistry) -> Result<PerFieldPostingsReader> {
    let dir: Arc<dyn Directory> = Arc::new(RamDirectory::new());
    let infos = FieldInfos::from_fields(vec![field])?;
    let info = SegmentInfo::new(Arc::clone(&dir), "_0", 1, Arc::new(DefaultCodec::simple()));
    PerFieldPostingsReader::open(&SegmentReadState::new(dir, &info, &infos), registry)
}

#[test]
fn test_missing_suffix_is_corruption() {
    let mut field = indexed("body");
    field.put_attribute(POSTINGS_FORMAT_KEY, "Simple");
    let err = read_with(field, &FormatRegistry::with_defaults()).unwrap_err();
    assert!(matches!(err, QuireError::Corruption(_)));
}

#[test]
fn test_unknown_format_name() {
    let mut field = indexed("body");
    field.put_attribute(POSTINGS_FORMAT_KEY, "Pulsing40");
    field.put_attribute(POSTINGS_SUFFIX_KEY, "0");
    let err = read_with(field, &FormatRegistry::with_defaults()).unwrap_err();
    assert!(matches!(err, QuireError::UnknownFormat(_)));
}

#[test]
fn test_non_indexed_fields_are_ignored() {
    let mut field = FieldInfo::new("stored", 0);
    field.put_attribute(POSTINGS_FORMAT_KEY, "Pulsing40");
    let reader = read_with(field, &FormatRegistry::with_defaults()).unwrap();
    assert_eq!(reader.producer_count(), 0);
}

/// Opens producers that count their closes, or fails to open at all
#[derive(Debug)]
struct CountingFormat {
    name: &'static str,
    fail: bool,
    opened: Arc<AtomicUsize>,
    closed: Arc<AtomicUsize>,
}

#[derive(Debug)]
struct CountingProducer {
    closed: Arc<AtomicUsize>,
}

impl FieldsProducer for CountingProducer {
    fn terms(&self, _field: &str) -> Result<Option<&dyn Terms>> {
        Ok(None)
    }

    fn close(&mut self) -> Result<()> {
        self.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

impl PostingsFormat for CountingFormat {
    fn name(&self) -> &str {
        self.name
    }

    fn fields_consumer(&self, state: &SegmentWriteState) -> Result<Box<dyn FieldsConsumer>> {
        SimplePostingsFormat::named(self.name).fields_consumer(state)
    }

    fn fields_producer(&self, _state: &SegmentReadState<'_>) -> Result<Box<dyn FieldsProducer>> {
        if self.fail {
            return Err(QuireError::Corruption(format!("{} cannot open", self.name)));
        }
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(CountingProducer {
            closed: Arc::clone(&self.closed),
        }))
    }
}

#[test]
fn test_partial_open_failure_closes_opened_producers() {
    let opened = Arc::new(AtomicUsize::new(0));
    let closed = Arc::new(AtomicUsize::new(0));
    let registry = FormatRegistry::new();
    for (name, fail) in [("Good", false), ("Bad", true)] {
        registry.register_postings(Arc::new(CountingFormat {
            name,
            fail,
            opened: Arc::clone(&opened),
            closed: Arc::clone(&closed),
        }));
    }

    let mut fields = Vec::new();
    for (i, (field, format)) in [("a", "Good"), ("b", "Good"), ("c", "Bad")].into_iter().enumerate() {
        let mut info = FieldInfo::new(field, i as u32).with_index_options(IndexOptions::Docs);
        info.put_attribute(POSTINGS_FORMAT_KEY, format);
        info.put_attribute(POSTINGS_SUFFIX_KEY, "0");
        fields.push(info);
    }

    let dir: Arc<dyn Directory> = Arc::new(RamDirectory::new());
    let infos = FieldInfos::from_fields(fields).unwrap();
    let info = SegmentInfo::new(Arc::clone(&dir), "_0", 1, Arc::new(DefaultCodec::simple()));
    let err = PerFieldPostingsReader::open(&SegmentReadState::new(dir, &info, &infos), &registry).unwrap_err();

    assert!(matches!(err, QuireError::Corruption(_)));
    assert_eq!(opened.load(Ordering::SeqCst), 1);
    assert_eq!(closed.load(Ordering::SeqCst), 1);
}

#[test]
fn test_indexed_field_without_format_opens_nothing() {
    let opened = Arc::new(AtomicUsize::new(0));
    let closed = Arc::new(AtomicUsize::new(0));
    let registry = FormatRegistry::new();
    registry.register_postings(Arc::new(CountingFormat {
        name: "Good",
        fail: false,
        opened: Arc::clone(&opened),
        closed: Arc::clone(&closed),
    }));

    let mut reader = read_with(indexed("body"), &registry).unwrap();
    assert_eq!(reader.producer_count(), 0);
    assert!(reader.terms("body").unwrap().is_none());
    reader.close().unwrap();
    assert_eq!(opened.load(Ordering::SeqCst), 0);
    assert_eq!(closed.load(Ordering::SeqCst), 0);
}
