use serde::Serialize;
use std::sync::Arc;
use talon_core::RetrievalError;
use talon_llm::EmbeddingProvider;
use tracing::{debug, info, warn};

use crate::registry::SkillTable;

/// One retrieval hit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredSkill {
    pub skill_id: String,
    pub score: f32,
}

/// Ranks skills by cosine similarity between the query and each skill's
/// `"<name>\n\n<description>"` embedding.
///
/// Built in one pass from a [`SkillTable`] and never patched: a registry
/// reload builds a new index.
pub struct SkillIndex {
    entries: Vec<(String, Vec<f32>)>,
    embedder: Arc<dyn EmbeddingProvider>,
    max_top_k: usize,
}

impl SkillIndex {
    /// Embed every skill in `table`, in insertion order.
    pub async fn build(
        table: &SkillTable,
        embedder: Arc<dyn EmbeddingProvider>,
        max_top_k: usize,
    ) -> Result<Self, RetrievalError> {
        let skills = table.list();
        let texts: Vec<String> = skills.iter().map(|s| s.embedding_text()).collect();
        let refs: Vec<&str> = texts.iter().map(|s| s.as_str()).collect();

        let vectors = if refs.is_empty() {
            Vec::new()
        } else {
            embedder.embed(&refs).await?
        };
        if vectors.len() != skills.len() {
            return Err(RetrievalError::CountMismatch {
                expected: skills.len(),
                got: vectors.len(),
            });
        }

        let entries: Vec<(String, Vec<f32>)> = skills
            .iter()
            .map(|s| s.id.clone())
            .zip(vectors)
            .collect();

        info!(skills = entries.len(), provider = embedder.name(), "retrieval index built");
        Ok(Self {
            entries,
            embedder,
            max_top_k: max_top_k.max(1),
        })
    }

    /// An index with no entries; every query returns nothing.
    pub fn empty(embedder: Arc<dyn EmbeddingProvider>, max_top_k: usize) -> Self {
        Self {
            entries: Vec::new(),
            embedder,
            max_top_k: max_top_k.max(1),
        }
    }

    /// Top `k` skills for `text`, best first. `k` is clamped to
    /// `[1, max_top_k]`; equal scores keep registry insertion order.
    pub async fn try_query(&self, text: &str, k: usize) -> Result<Vec<ScoredSkill>, RetrievalError> {
        if self.entries.is_empty() {
            return Ok(Vec::new());
        }

        let mut vectors = self.embedder.embed(&[text]).await?;
        let query = vectors.pop().ok_or(RetrievalError::CountMismatch {
            expected: 1,
            got: 0,
        })?;

        let mut scored: Vec<ScoredSkill> = self
            .entries
            .iter()
            .map(|(id, vector)| ScoredSkill {
                skill_id: id.clone(),
                score: cosine_similarity(&query, vector),
            })
            .collect();

        // sort_by is stable, so ties stay in insertion order
        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k.clamp(1, self.max_top_k));

        debug!(query = text, hits = scored.len(), "retrieval query");
        Ok(scored)
    }

    /// Like [`try_query`](Self::try_query), but an unavailable embedding
    /// service means "no match" rather than an error.
    pub async fn query(&self, text: &str, k: usize) -> Vec<ScoredSkill> {
        match self.try_query(text, k).await {
            Ok(hits) => hits,
            Err(e) => {
                warn!(error = %e, "retrieval failed, treating as no match");
                Vec::new()
            }
        }
    }

    /// Best single match, if any.
    pub async fn best(&self, text: &str) -> Option<ScoredSkill> {
        self.query(text, 1).await.into_iter().next()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn max_top_k(&self) -> usize {
        self.max_top_k
    }
}

/// Compute cosine similarity between two vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}
