//! Contract for a remote hash-indexed search engine with vector fields.

use crate::service::ServiceError;
use async_trait::async_trait;
use std::collections::BTreeMap;

/// Value stored in a hash field.
#[derive(Debug, Clone, PartialEq)]
pub enum HashValue {
    /// UTF-8 text.
    Text(String),
    /// Numeric value.
    Number(f64),
    /// Raw bytes (vector payloads).
    Bytes(Vec<u8>),
}

impl HashValue {
    /// Text content, if the value is text.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            HashValue::Text(value) => Some(value),
            _ => None,
        }
    }

    /// Numeric content; text values are parsed.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            HashValue::Number(value) => Some(*value),
            HashValue::Text(value) => value.trim().parse().ok(),
            HashValue::Bytes(_) => None,
        }
    }

    /// Byte content, if the value is bytes.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            HashValue::Bytes(value) => Some(value),
            _ => None,
        }
    }
}

/// Stored hash plus its key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HashDocument {
    /// Hash key.
    pub id: String,
    /// Field values.
    pub fields: BTreeMap<String, HashValue>,
}

impl HashDocument {
    /// Create an empty document for a key.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            fields: BTreeMap::new(),
        }
    }

    /// Set a field.
    pub fn insert(&mut self, field: impl Into<String>, value: HashValue) {
        self.fields.insert(field.into(), value);
    }

    /// Look up a field.
    pub fn get(&self, field: &str) -> Option<&HashValue> {
        self.fields.get(field)
    }
}

/// Index field type.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    /// Full-text field.
    Text,
    /// Numeric (range-queryable) field.
    Numeric,
    /// Flat float32 vector compared by cosine distance.
    Vector { dim: usize },
    /// Tag set split on a separator.
    Tag { separator: char },
}

/// One field of an index schema.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaField {
    /// Field name.
    pub name: String,
    /// Field type.
    pub kind: FieldKind,
}

impl SchemaField {
    /// Build a schema field.
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// Query sent to the search engine.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    /// Query in the engine's mini-language.
    pub query: String,
    /// Named binary parameters referenced as `$name` in the query.
    pub params: Vec<(String, Vec<u8>)>,
    /// Number of matching documents to skip.
    pub offset: usize,
    /// Maximum number of documents to return.
    pub limit: usize,
}

impl SearchRequest {
    /// Plain query without parameters.
    pub fn new(query: impl Into<String>, limit: usize) -> Self {
        Self {
            query: query.into(),
            params: Vec::new(),
            offset: 0,
            limit,
        }
    }

    /// Start the page after `offset` matches.
    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    /// Attach a binary parameter.
    pub fn with_param(mut self, name: impl Into<String>, value: Vec<u8>) -> Self {
        self.params.push((name.into(), value));
        self
    }
}

/// Remote hash store with a secondary search index.
#[async_trait]
pub trait SearchClient: Send + Sync {
    /// Whether the named index exists.
    async fn index_exists(&self, index: &str) -> Result<bool, ServiceError>;

    /// Create an index over hashes whose keys start with `prefix`.
    async fn create_index(
        &self,
        index: &str,
        prefix: &str,
        schema: &[SchemaField],
    ) -> Result<(), ServiceError>;

    /// Write (or overwrite) a hash.
    async fn insert_hash(&self, document: &HashDocument) -> Result<(), ServiceError>;

    /// Run a query against an index.
    async fn search(
        &self,
        index: &str,
        request: &SearchRequest,
    ) -> Result<Vec<HashDocument>, ServiceError>;

    /// Delete hashes by key, returning how many existed.
    async fn delete(&self, keys: &[String]) -> Result<usize, ServiceError>;
}

/// Encode a vector as little-endian float32 bytes.
pub fn vector_to_bytes(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|value| value.to_le_bytes()).collect()
}

/// Decode little-endian float32 bytes; `None` when the length is not a multiple of 4.
pub fn vector_from_bytes(bytes: &[u8]) -> Option<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return None;
    }
    Some(
        bytes
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::{HashValue, vector_from_bytes, vector_to_bytes};
    use pretty_assertions::assert_eq;

    #[test]
    fn vector_bytes_are_little_endian_f32() {
        let bytes = vector_to_bytes(&[1.0, -0.5]);
        assert_eq!(bytes.len(), 8);
        assert_eq!(&bytes[..4], &1.0f32.to_le_bytes());
        assert_eq!(vector_from_bytes(&bytes), Some(vec![1.0, -0.5]));
        assert_eq!(vector_from_bytes(&bytes[..3]), None);
    }

    #[test]
    fn text_values_parse_as_numbers() {
        assert_eq!(HashValue::Text(" 42 ".to_string()).as_number(), Some(42.0));
        assert_eq!(HashValue::Bytes(vec![1]).as_number(), None);
    }
}
