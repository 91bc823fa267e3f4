//! Flat in-process cosine index, one per partition.

use crate::error::MemoryError;
use parley_protocol::Message;

/// Cosine similarity; `0.0` for mismatched lengths or near-zero vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a < 1e-8 || norm_b < 1e-8 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}

/// Brute-force nearest-neighbour index over message embeddings.
#[derive(Debug, Clone)]
pub struct LocalVectorIndex {
    dimensions: usize,
    entries: Vec<(Vec<f32>, Message)>,
}

impl LocalVectorIndex {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            entries: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Index a message under its embedding.
    pub fn add(&mut self, vector: Vec<f32>, message: Message) -> Result<(), MemoryError> {
        if vector.len() != self.dimensions {
            return Err(MemoryError::DimensionMismatch {
                expected: self.dimensions,
                actual: vector.len(),
            });
        }
        self.entries.push((vector, message));
        Ok(())
    }

    /// Up to `top_k` messages with similarity at least `min_score`, most similar first.
    pub fn search(
        &self,
        query: &[f32],
        top_k: usize,
        min_score: f32,
    ) -> Result<Vec<(Message, f32)>, MemoryError> {
        if query.len() != self.dimensions {
            return Err(MemoryError::DimensionMismatch {
                expected: self.dimensions,
                actual: query.len(),
            });
        }
        let mut hits: Vec<(&Message, f32)> = self
            .entries
            .iter()
            .map(|(vector, message)| (message, cosine_similarity(query, vector)))
            .filter(|(_, score)| *score >= min_score)
            .collect();
        hits.sort_by(|(_, a), (_, b)| b.total_cmp(a));
        Ok(hits
            .into_iter()
            .take(top_k)
            .map(|(message, score)| (message.clone(), score))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::{LocalVectorIndex, cosine_similarity};
    use crate::MemoryError;
    use parley_protocol::{Message, RoleType};
    use pretty_assertions::assert_eq;

    fn message(content: &str) -> Message {
        Message::new("c", "agent", RoleType::Assistant).with_role_content(content)
    }

    #[test]
    fn cosine_handles_degenerate_vectors() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]), 1.0);
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn search_orders_by_similarity_and_applies_threshold() {
        let mut index = LocalVectorIndex::new(2);
        index.add(vec![0.0, 1.0], message("far")).expect("add");
        index.add(vec![1.0, 0.0], message("near")).expect("add");
        index.add(vec![1.0, 1.0], message("middle")).expect("add");

        let hits = index.search(&[1.0, 0.0], 5, 0.5).expect("search");
        let contents: Vec<_> = hits.iter().map(|(m, _)| m.role_content.as_str()).collect();
        assert_eq!(contents, vec!["near", "middle"]);

        let hits = index.search(&[1.0, 0.0], 1, -1.0).expect("search");
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn rejects_wrong_dimensions() {
        let mut index = LocalVectorIndex::new(3);
        let err = index.add(vec![1.0], message("x")).unwrap_err();
        assert!(matches!(
            err,
            MemoryError::DimensionMismatch {
                expected: 3,
                actual: 1
            }
        ));
        index.clear();
        assert!(index.is_empty());
    }
}
