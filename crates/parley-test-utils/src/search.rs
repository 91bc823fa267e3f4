use async_trait::async_trait;
use parking_lot::Mutex;
use parley_protocol::{
    FieldKind, HashDocument, HashValue, SchemaField, SearchClient, SearchRequest, ServiceError,
    vector_from_bytes,
};
use std::collections::BTreeMap;

#[derive(Debug, Clone)]
struct IndexDef {
    prefix: String,
    schema: Vec<SchemaField>,
}

#[derive(Debug, Clone, PartialEq)]
enum Clause {
    Text { field: String, value: String },
    Tags { field: String, values: Vec<String> },
    Range { field: String, min: f64, max: f64 },
}

#[derive(Debug, Clone, PartialEq)]
struct Knn {
    k: usize,
    field: String,
    param: String,
    alias: String,
}

/// In-process stand-in for a hash-indexed search engine.
///
/// Understands conjunctions of `@f:value`, `@f:{a|b}` and `@f:[min max]`
/// clauses plus a trailing `=>[KNN k @f $param AS alias]`. Text clauses match
/// when the value's tokens appear contiguously in the field. Plain queries
/// return documents in key order, paged by `offset` and `limit`.
#[derive(Debug, Default)]
pub struct InMemorySearchClient {
    indexes: Mutex<BTreeMap<String, IndexDef>>,
    hashes: Mutex<BTreeMap<String, HashDocument>>,
    queries: Mutex<Vec<String>>,
}

impl InMemorySearchClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queries seen so far, oldest first.
    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().clone()
    }

    pub fn index_names(&self) -> Vec<String> {
        self.indexes.lock().keys().cloned().collect()
    }

    pub fn document(&self, id: &str) -> Option<HashDocument> {
        self.hashes.lock().get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.hashes.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.hashes.lock().is_empty()
    }
}

#[async_trait]
impl SearchClient for InMemorySearchClient {
    async fn index_exists(&self, index: &str) -> Result<bool, ServiceError> {
        Ok(self.indexes.lock().contains_key(index))
    }

    async fn create_index(
        &self,
        index: &str,
        prefix: &str,
        schema: &[SchemaField],
    ) -> Result<(), ServiceError> {
        let mut indexes = self.indexes.lock();
        if indexes.contains_key(index) {
            return Err(ServiceError::Index(format!("index already exists: {index}")));
        }
        indexes.insert(
            index.to_string(),
            IndexDef {
                prefix: prefix.to_string(),
                schema: schema.to_vec(),
            },
        );
        Ok(())
    }

    async fn insert_hash(&self, document: &HashDocument) -> Result<(), ServiceError> {
        self.hashes
            .lock()
            .insert(document.id.clone(), document.clone());
        Ok(())
    }

    async fn search(
        &self,
        index: &str,
        request: &SearchRequest,
    ) -> Result<Vec<HashDocument>, ServiceError> {
        self.queries.lock().push(request.query.clone());
        let definition = self
            .indexes
            .lock()
            .get(index)
            .cloned()
            .ok_or_else(|| ServiceError::Index(format!("unknown index: {index}")))?;
        let (clauses, knn) = parse_query(&request.query)?;

        let hashes = self.hashes.lock();
        let matched = hashes
            .values()
            .filter(|document| document.id.starts_with(&definition.prefix))
            .filter(|document| {
                clauses
                    .iter()
                    .all(|clause| matches_clause(document, clause, &definition.schema))
            });

        let Some(knn) = knn else {
            return Ok(matched
                .skip(request.offset)
                .take(request.limit)
                .cloned()
                .collect());
        };
        let query_vector = request
            .params
            .iter()
            .find(|(name, _)| *name == knn.param)
            .and_then(|(_, bytes)| vector_from_bytes(bytes))
            .ok_or_else(|| ServiceError::Index(format!("missing vector param ${}", knn.param)))?;
        let mut scored: Vec<(f64, HashDocument)> = matched
            .filter_map(|document| {
                let vector = document
                    .get(&knn.field)
                    .and_then(HashValue::as_bytes)
                    .and_then(vector_from_bytes)?;
                Some((cosine_distance(&query_vector, &vector), document.clone()))
            })
            .collect();
        scored.sort_by(|(a, _), (b, _)| a.total_cmp(b));
        Ok(scored
            .into_iter()
            .take(knn.k)
            .skip(request.offset)
            .take(request.limit)
            .map(|(distance, mut document)| {
                document.insert(knn.alias.clone(), HashValue::Number(distance));
                document
            })
            .collect())
    }

    async fn delete(&self, keys: &[String]) -> Result<usize, ServiceError> {
        let mut hashes = self.hashes.lock();
        Ok(keys.iter().filter(|key| hashes.remove(*key).is_some()).count())
    }
}

fn cosine_distance(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() {
        return 1.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 1.0;
    }
    1.0 - f64::from(dot / (norm_a * norm_b))
}

fn tokens(value: &str) -> Vec<String> {
    value
        .split(|c: char| !c.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(str::to_lowercase)
        .collect()
}

fn field_text(document: &HashDocument, field: &str) -> Option<String> {
    match document.get(field)? {
        HashValue::Text(value) => Some(value.clone()),
        HashValue::Number(value) => Some(value.to_string()),
        HashValue::Bytes(_) => None,
    }
}

fn matches_clause(document: &HashDocument, clause: &Clause, schema: &[SchemaField]) -> bool {
    match clause {
        Clause::Text { field, value } => {
            let Some(text) = field_text(document, field) else {
                return false;
            };
            let haystack = tokens(&text);
            let needle = tokens(value);
            !needle.is_empty()
                && haystack
                    .windows(needle.len())
                    .any(|window| window == needle.as_slice())
        }
        Clause::Tags { field, values } => {
            let separator = schema
                .iter()
                .find_map(|entry| match entry.kind {
                    FieldKind::Tag { separator } if entry.name == *field => Some(separator),
                    _ => None,
                })
                .unwrap_or(',');
            let Some(text) = field_text(document, field) else {
                return false;
            };
            text.split(separator)
                .map(|tag| tag.trim().to_lowercase())
                .any(|tag| values.iter().any(|value| value.to_lowercase() == tag))
        }
        Clause::Range { field, min, max } => document
            .get(field)
            .and_then(HashValue::as_number)
            .is_some_and(|number| number >= *min && number <= *max),
    }
}

fn invalid(query: &str, reason: &str) -> ServiceError {
    ServiceError::Index(format!("invalid query `{query}`: {reason}"))
}

fn parse_query(query: &str) -> Result<(Vec<Clause>, Option<Knn>), ServiceError> {
    let (base, knn) = match query.split_once("=>[") {
        Some((base, knn)) => {
            let base = base
                .trim()
                .strip_prefix('(')
                .and_then(|rest| rest.strip_suffix(')'))
                .ok_or_else(|| invalid(query, "KNN base must be parenthesised"))?;
            let knn = knn
                .strip_suffix(']')
                .ok_or_else(|| invalid(query, "unterminated KNN clause"))?;
            (base, Some(parse_knn(query, knn)?))
        }
        None => (query, None),
    };
    let base = base.trim();
    if base == "*" {
        return Ok((Vec::new(), knn));
    }
    let clauses = split_groups(query, base)?
        .iter()
        .map(|group| parse_clause(query, group))
        .collect::<Result<Vec<_>, _>>()?;
    Ok((clauses, knn))
}

fn parse_knn(query: &str, body: &str) -> Result<Knn, ServiceError> {
    let parts: Vec<&str> = body.split_whitespace().collect();
    match parts.as_slice() {
        ["KNN", k, field, param, "AS", alias] => Ok(Knn {
            k: k.parse().map_err(|_| invalid(query, "KNN k is not a number"))?,
            field: field.trim_start_matches('@').to_string(),
            param: param.trim_start_matches('$').to_string(),
            alias: alias.to_string(),
        }),
        _ => Err(invalid(query, "malformed KNN clause")),
    }
}

/// Split `(a)(b)` into `["a", "b"]`, honouring backslash escapes.
fn split_groups(query: &str, base: &str) -> Result<Vec<String>, ServiceError> {
    let mut groups = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    let mut chars = base.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                current.push(c);
                if let Some(next) = chars.next() {
                    current.push(next);
                }
            }
            '(' => {
                if depth > 0 {
                    current.push(c);
                }
                depth += 1;
            }
            ')' => {
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| invalid(query, "unbalanced parentheses"))?;
                if depth == 0 {
                    groups.push(std::mem::take(&mut current));
                } else {
                    current.push(c);
                }
            }
            c if depth == 0 && c.is_whitespace() => {}
            c if depth == 0 => return Err(invalid(query, "clause outside parentheses")),
            c => current.push(c),
        }
    }
    if depth != 0 {
        return Err(invalid(query, "unbalanced parentheses"));
    }
    Ok(groups)
}

fn parse_clause(query: &str, group: &str) -> Result<Clause, ServiceError> {
    let (field, rest) = group
        .strip_prefix('@')
        .and_then(|clause| clause.split_once(':'))
        .ok_or_else(|| invalid(query, "clause must look like @field:value"))?;
    let field = field.to_string();
    if let Some(tags) = rest.strip_prefix('{').and_then(|r| r.strip_suffix('}')) {
        return Ok(Clause::Tags {
            field,
            values: split_unescaped(tags, '|')
                .iter()
                .map(|tag| unescape(tag))
                .collect(),
        });
    }
    if let Some(range) = rest.strip_prefix('[').and_then(|r| r.strip_suffix(']')) {
        let bounds: Vec<f64> = range
            .split_whitespace()
            .map(|bound| bound.parse::<f64>())
            .collect::<Result<_, _>>()
            .map_err(|_| invalid(query, "range bounds must be numbers"))?;
        let [min, max] = bounds.as_slice() else {
            return Err(invalid(query, "range needs two bounds"));
        };
        return Ok(Clause::Range {
            field,
            min: *min,
            max: *max,
        });
    }
    Ok(Clause::Text {
        field,
        value: unescape(rest),
    })
}

fn split_unescaped(value: &str, separator: char) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            current.push(c);
            if let Some(next) = chars.next() {
                current.push(next);
            }
        } else if c == separator {
            parts.push(std::mem::take(&mut current));
        } else {
            current.push(c);
        }
    }
    parts.push(current);
    parts
}

fn unescape(value: &str) -> String {
    let mut unescaped = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                unescaped.push(next);
            }
        } else {
            unescaped.push(c);
        }
    }
    unescaped
}
