//! Core types for field metadata and document input

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::error::{QuireError, Result};

/// Dense document number within a segment (0..doc_count)
pub type DocId = u32;

/// How much of a field's token stream is kept in the inverted index
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum IndexOptions {
    /// Not inverted
    #[default]
    None,
    Docs,
    DocsAndFreqs,
    DocsAndFreqsAndPositions,
}

impl IndexOptions {
    pub fn is_indexed(self) -> bool {
        self != IndexOptions::None
    }

    pub fn has_freqs(self) -> bool {
        self >= IndexOptions::DocsAndFreqs
    }

    pub fn has_positions(self) -> bool {
        self >= IndexOptions::DocsAndFreqsAndPositions
    }
}

/// Kind of per-document value a field carries
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DocValuesType {
    #[default]
    None,
    Numeric,
    Binary,
    Sorted,
    SortedSet,
}

/// Per-segment description of one field
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FieldInfo {
    pub name: String,
    /// Dense field number within the segment
    pub number: u32,
    pub index_options: IndexOptions,
    pub doc_values_type: DocValuesType,
    pub store_term_vectors: bool,
    /// Free-form key/value bag persisted with the field; codecs record
    /// their routing decisions here
    attributes: BTreeMap<String, String>,
}

impl FieldInfo {
    pub fn new(name: impl Into<String>, number: u32) -> Self {
        Self {
            name: name.into(),
            number,
            index_options: IndexOptions::None,
            doc_values_type: DocValuesType::None,
            store_term_vectors: false,
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_index_options(mut self, options: IndexOptions) -> Self {
        self.index_options = options;
        self
    }

    pub fn with_doc_values(mut self, doc_values_type: DocValuesType) -> Self {
        self.doc_values_type = doc_values_type;
        self
    }

    pub fn with_term_vectors(mut self) -> Self {
        self.store_term_vectors = true;
        self
    }

    pub fn is_indexed(&self) -> bool {
        self.index_options.is_indexed()
    }

    pub fn has_doc_values(&self) -> bool {
        self.doc_values_type != DocValuesType::None
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    /// Set an attribute, returning the previous value if there was one
    pub fn put_attribute(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.attributes.insert(key.into(), value.into())
    }

    pub fn attributes(&self) -> &BTreeMap<String, String> {
        &self.attributes
    }
}

/// All fields of one segment, numbered in order of first appearance
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FieldInfos {
    fields: Vec<FieldInfo>,
    by_name: HashMap<String, usize>,
}

impl FieldInfos {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from already-numbered fields, e.g. after deserializing
    pub fn from_fields(fields: Vec<FieldInfo>) -> Result<Self> {
        let mut by_name = HashMap::with_capacity(fields.len());
        for (i, field) in fields.iter().enumerate() {
            if by_name.insert(field.name.clone(), i).is_some() {
                return Err(QuireError::Corruption(format!(
                    "duplicate field name: {}",
                    field.name
                )));
            }
        }
        Ok(Self { fields, by_name })
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&FieldInfo> {
        self.by_name.get(name).map(|&i| &self.fields[i])
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut FieldInfo> {
        match self.by_name.get(name) {
            Some(&i) => Some(&mut self.fields[i]),
            None => None,
        }
    }

    /// Field by name, adding it with the next number if unseen
    pub fn get_or_add(&mut self, name: &str) -> &mut FieldInfo {
        let idx = match self.by_name.get(name) {
            Some(&i) => i,
            None => {
                let i = self.fields.len();
                self.fields.push(FieldInfo::new(name, i as u32));
                self.by_name.insert(name.to_string(), i);
                i
            }
        };
        &mut self.fields[idx]
    }

    /// Insert a fully described field; its number is reassigned
    pub fn add(&mut self, mut field: FieldInfo) -> Result<&mut FieldInfo> {
        if self.by_name.contains_key(&field.name) {
            return Err(QuireError::IllegalArgument(format!(
                "field {} already declared",
                field.name
            )));
        }
        let i = self.fields.len();
        field.number = i as u32;
        self.by_name.insert(field.name.clone(), i);
        self.fields.push(field);
        Ok(&mut self.fields[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldInfo> {
        self.fields.iter()
    }

    pub fn has_vectors(&self) -> bool {
        self.fields.iter().any(|f| f.store_term_vectors)
    }

    pub fn has_doc_values(&self) -> bool {
        self.fields.iter().any(FieldInfo::has_doc_values)
    }

    pub fn has_postings(&self) -> bool {
        self.fields.iter().any(FieldInfo::is_indexed)
    }

    pub(crate) fn into_fields(self) -> Vec<FieldInfo> {
        self.fields
    }
}

/// One pre-analysed token
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Token {
    pub term: Vec<u8>,
    /// Distance from the previous token's position; 0 stacks tokens
    pub position_increment: u32,
}

impl Token {
    pub fn new(term: impl Into<Vec<u8>>) -> Self {
        Self {
            term: term.into(),
            position_increment: 1,
        }
    }

    pub fn with_increment(term: impl Into<Vec<u8>>, position_increment: u32) -> Self {
        Self {
            term: term.into(),
            position_increment,
        }
    }

    /// Consecutive tokens, one position apart
    pub fn sequence<I, T>(terms: I) -> Vec<Token>
    where
        I: IntoIterator<Item = T>,
        T: Into<Vec<u8>>,
    {
        terms.into_iter().map(Token::new).collect()
    }
}

/// Per-document value of a field
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DocValue {
    Numeric(i64),
    Binary(Vec<u8>),
    Sorted(Vec<u8>),
    SortedSet(Vec<Vec<u8>>),
}

impl DocValue {
    pub fn doc_values_type(&self) -> DocValuesType {
        match self {
            DocValue::Numeric(_) => DocValuesType::Numeric,
            DocValue::Binary(_) => DocValuesType::Binary,
            DocValue::Sorted(_) => DocValuesType::Sorted,
            DocValue::SortedSet(_) => DocValuesType::SortedSet,
        }
    }
}

/// One field instance of a document, already tokenized
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IndexableField {
    pub name: String,
    pub index_options: IndexOptions,
    pub store_term_vectors: bool,
    pub tokens: Vec<Token>,
    pub doc_value: Option<DocValue>,
}

impl IndexableField {
    /// Inverted field with freqs and positions
    pub fn text(name: impl Into<String>, tokens: Vec<Token>) -> Self {
        Self {
            name: name.into(),
            index_options: IndexOptions::DocsAndFreqsAndPositions,
            store_term_vectors: false,
            tokens,
            doc_value: None,
        }
    }

    /// Field carrying only a per-document value
    pub fn doc_value(name: impl Into<String>, value: DocValue) -> Self {
        Self {
            name: name.into(),
            index_options: IndexOptions::None,
            store_term_vectors: false,
            tokens: Vec::new(),
            doc_value: Some(value),
        }
    }

    pub fn with_index_options(mut self, options: IndexOptions) -> Self {
        self.index_options = options;
        self
    }

    pub fn with_term_vectors(mut self) -> Self {
        self.store_term_vectors = true;
        self
    }
}

/// Running state of one field while a document's tokens are inverted
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FieldInvertState {
    pub doc_id: DocId,
    /// Position of the current token; after the last token, one past it
    pub position: u32,
    /// Number of tokens seen
    pub length: u32,
    pub max_term_frequency: u32,
    pub unique_term_count: u32,
}

impl FieldInvertState {
    pub fn reset(&mut self, doc_id: DocId) {
        *self = Self {
            doc_id,
            ..Self::default()
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_options_ordering() {
        assert!(!IndexOptions::None.is_indexed());
        assert!(IndexOptions::Docs.is_indexed());
        assert!(!IndexOptions::Docs.has_freqs());
        assert!(IndexOptions::DocsAndFreqs.has_freqs());
        assert!(!IndexOptions::DocsAndFreqs.has_positions());
        assert!(IndexOptions::DocsAndFreqsAndPositions.has_positions());
    }

    #[test]
    fn test_field_numbers_follow_first_appearance() {
        let mut infos = FieldInfos::new();
        infos.get_or_add("title");
        infos.get_or_add("body");
        infos.get_or_add("title").store_term_vectors = true;

        assert_eq!(infos.len(), 2);
        assert_eq!(infos.get("title").unwrap().number, 0);
        assert_eq!(infos.get("body").unwrap().number, 1);
        assert!(infos.has_vectors());
        assert!(infos.get("missing").is_none());
    }

    #[test]
    fn test_from_fields_rejects_duplicates() {
        let fields = vec![FieldInfo::new("a", 0), FieldInfo::new("a", 1)];
        assert!(matches!(
            FieldInfos::from_fields(fields),
            Err(QuireError::Corruption(_))
        ));
    }

    #[test]
    fn test_put_attribute_returns_previous() {
        let mut field = FieldInfo::new("f", 0);
        assert_eq!(field.put_attribute("k", "v1"), None);
        assert_eq!(field.put_attribute("k", "v2"), Some("v1".to_string()));
        assert_eq!(field.attribute("k"), Some("v2"));
    }

    #[test]
    fn test_token_sequence() {
        let tokens = Token::sequence(["a", "b"]);
        assert_eq!(tokens.len(), 2);
        assert!(tokens.iter().all(|t| t.position_increment == 1));
    }
}
