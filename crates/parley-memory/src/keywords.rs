//! Default keyword extractor: term frequency over lowercase word tokens.

use crate::error::MemoryError;
use parley_protocol::KeywordExtractor;
use regex::Regex;
use std::collections::{HashMap, HashSet};

const STOPWORDS: &[&str] = &[
    "a", "an", "and", "any", "are", "as", "at", "be", "been", "but", "by", "can", "could", "did",
    "do", "does", "for", "from", "had", "has", "have", "he", "her", "him", "his", "how", "i",
    "if", "in", "into", "is", "it", "its", "me", "my", "no", "not", "of", "on", "or", "our",
    "she", "should", "so", "than", "that", "the", "their", "them", "then", "there", "these",
    "they", "this", "those", "to", "was", "we", "were", "what", "when", "where", "which", "who",
    "why", "will", "with", "would", "you", "your",
];

/// Ranks word tokens by frequency, ties broken by first occurrence.
#[derive(Debug, Clone)]
pub struct TermFrequencyExtractor {
    token_re: Regex,
    stopwords: HashSet<&'static str>,
    min_length: usize,
}

impl TermFrequencyExtractor {
    pub fn new() -> Result<Self, MemoryError> {
        let token_re =
            Regex::new(r"[\p{L}\p{N}_]+").map_err(|err| MemoryError::Regex(err.to_string()))?;
        Ok(Self {
            token_re,
            stopwords: STOPWORDS.iter().copied().collect(),
            min_length: 2,
        })
    }

    /// Minimum token length, in characters.
    pub fn with_min_length(mut self, min_length: usize) -> Self {
        self.min_length = min_length;
        self
    }

    fn is_keyword(&self, token: &str) -> bool {
        token.chars().count() >= self.min_length
            && !self.stopwords.contains(token)
            && !token.chars().all(|c| c.is_ascii_digit())
    }
}

impl KeywordExtractor for TermFrequencyExtractor {
    fn extract(&self, text: &str, top_n: Option<usize>) -> Vec<String> {
        let mut counts: HashMap<String, (usize, usize)> = HashMap::new();
        for (position, token) in self.token_re.find_iter(text).enumerate() {
            let token = token.as_str().to_lowercase();
            if !self.is_keyword(&token) {
                continue;
            }
            counts.entry(token).or_insert((0, position)).0 += 1;
        }
        let mut ranked: Vec<_> = counts.into_iter().collect();
        ranked.sort_by(|(_, (count_a, first_a)), (_, (count_b, first_b))| {
            count_b.cmp(count_a).then(first_a.cmp(first_b))
        });
        let limit = top_n.unwrap_or(ranked.len());
        ranked
            .into_iter()
            .take(limit)
            .map(|(token, _)| token)
            .collect()
    }
}
