//! Keyword-overlap ranking.

use crate::retrieval::MatchOptions;
use log::debug;
use parley_protocol::{KeywordExtractor, Message};
use std::collections::HashMap;
use std::sync::Arc;

/// Weighted Jaccard similarity of two keyword multisets.
///
/// Sum of per-keyword minimum counts over sum of per-keyword maximum counts.
/// Two empty multisets score `0.0`.
pub fn weighted_jaccard<S: AsRef<str>>(left: &[S], right: &[S]) -> f32 {
    let left = count(left);
    let right = count(right);
    let mut intersection = 0usize;
    let mut union = 0usize;
    for (keyword, &left_count) in &left {
        let right_count = right.get(keyword).copied().unwrap_or(0);
        intersection += left_count.min(right_count);
        union += left_count.max(right_count);
    }
    union += right
        .iter()
        .filter(|(keyword, _)| !left.contains_key(*keyword))
        .map(|(_, count)| *count)
        .sum::<usize>();
    if union == 0 {
        return 0.0;
    }
    intersection as f32 / union as f32
}

fn count<S: AsRef<str>>(keywords: &[S]) -> HashMap<&str, usize> {
    let mut counts = HashMap::new();
    for keyword in keywords {
        *counts.entry(keyword.as_ref()).or_insert(0) += 1;
    }
    counts
}

/// Ranks candidate messages by keyword overlap with a query.
#[derive(Clone)]
pub struct KeywordMatcher {
    extractor: Arc<dyn KeywordExtractor>,
}

impl KeywordMatcher {
    pub fn new(extractor: Arc<dyn KeywordExtractor>) -> Self {
        Self { extractor }
    }

    /// Extractor used for queries and candidates.
    pub fn extractor(&self) -> &Arc<dyn KeywordExtractor> {
        &self.extractor
    }

    /// Score every candidate, keeping those at or above the threshold.
    ///
    /// Result is sorted by similarity, highest first; equal scores keep candidate order.
    pub fn score(
        &self,
        query: &str,
        candidates: Vec<Message>,
        options: &MatchOptions,
    ) -> Vec<(Message, f32)> {
        let query_keywords = self.extractor.extract(query, options.tag_top_k);
        let mut scored: Vec<(Message, f32)> = candidates
            .into_iter()
            .filter_map(|message| {
                let keywords = self
                    .extractor
                    .extract(message.primary_text(), options.tag_top_k);
                let similarity = weighted_jaccard(&query_keywords, &keywords);
                (similarity >= options.score_threshold).then_some((message, similarity))
            })
            .collect();
        scored.sort_by(|(_, a), (_, b)| b.total_cmp(a));
        scored
    }

    /// Top `top_k` candidates by similarity, highest first.
    pub fn rank(
        &self,
        query: &str,
        candidates: Vec<Message>,
        options: &MatchOptions,
    ) -> Vec<Message> {
        let total = candidates.len();
        let mut scored = self.score(query, candidates, options);
        scored.truncate(options.top_k);
        debug!(
            "keyword ranking (candidates={}, returned={}, threshold={})",
            total,
            scored.len(),
            options.score_threshold
        );
        scored.into_iter().map(|(message, _)| message).collect()
    }
}
