//! Builder for the search engine's query mini-language.

use super::schema::{DISTANCE_FIELD, VECTOR_FIELD};
use std::fmt;

/// Name of the binary parameter carrying the KNN query vector.
pub const VECTOR_PARAM: &str = "vector";

/// Backslash-escape everything except alphanumerics and `_`.
pub fn escape(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if !(c.is_alphanumeric() || c == '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// One field predicate.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldFilter {
    /// `@field:value`
    Text { field: String, value: String },
    /// `@field:{a|b}`
    Tags { field: String, values: Vec<String> },
    /// `@field:[min max]`, inclusive.
    Range { field: String, min: i64, max: i64 },
}

impl FieldFilter {
    pub fn text(field: impl Into<String>, value: impl Into<String>) -> Self {
        FieldFilter::Text {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn tags<I, S>(field: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        FieldFilter::Tags {
            field: field.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn range(field: impl Into<String>, min: i64, max: i64) -> Self {
        FieldFilter::Range {
            field: field.into(),
            min,
            max,
        }
    }
}

impl fmt::Display for FieldFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldFilter::Text { field, value } => write!(f, "@{field}:{}", escape(value)),
            FieldFilter::Tags { field, values } => {
                let values = values
                    .iter()
                    .map(|value| escape(value))
                    .collect::<Vec<_>>()
                    .join("|");
                write!(f, "@{field}:{{{values}}}")
            }
            FieldFilter::Range { field, min, max } => write!(f, "@{field}:[{min} {max}]"),
        }
    }
}

/// Conjunction of field filters, optionally wrapped in a KNN clause.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryBuilder {
    filters: Vec<FieldFilter>,
}

impl QueryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, filter: FieldFilter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn filters<I: IntoIterator<Item = FieldFilter>>(mut self, filters: I) -> Self {
        self.filters.extend(filters);
        self
    }

    /// `(a)(b)`, or `*` without filters.
    pub fn build(&self) -> String {
        if self.filters.is_empty() {
            return "*".to_string();
        }
        self.filters
            .iter()
            .map(|filter| format!("({filter})"))
            .collect()
    }

    /// Nearest-neighbour query over the filtered set, scored into `distance`.
    pub fn knn(&self, k: usize) -> String {
        format!(
            "({})=>[KNN {k} @{VECTOR_FIELD} ${VECTOR_PARAM} AS {DISTANCE_FIELD}]",
            self.build()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::{FieldFilter, QueryBuilder, escape};
    use pretty_assertions::assert_eq;

    #[test]
    fn escapes_punctuation_and_spaces() {
        assert_eq!(escape("chat-1"), "chat\\-1");
        assert_eq!(escape("a b_c"), "a\\ b_c");
    }

    #[test]
    fn builds_conjunctions() {
        let query = QueryBuilder::new()
            .filter(FieldFilter::text("chat_index", "chat-1"))
            .filter(FieldFilter::tags("keyword", ["rust", "memory"]))
            .build();
        assert_eq!(query, "(@chat_index:chat\\-1)(@keyword:{rust|memory})");
    }

    #[test]
    fn builds_ranges_and_knn() {
        let builder =
            QueryBuilder::new().filter(FieldFilter::range("end_datetime", 1000, 2000));
        assert_eq!(builder.build(), "(@end_datetime:[1000 2000])");
        assert_eq!(
            QueryBuilder::new().knn(3),
            "(*)=>[KNN 3 @vector $vector AS distance]"
        );
    }
}
