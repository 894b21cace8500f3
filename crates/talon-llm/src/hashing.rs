//! Offline embedding provider.
//!
//! Signed feature hashing over a bag of normalised words: every token is
//! hashed with blake3 into one of `dims` buckets, and the resulting vector is
//! L2-normalised. Deterministic across runs and platforms, needs no network,
//! and is good enough to rank a few dozen skill descriptions.

use async_trait::async_trait;
use talon_core::RetrievalError;

use crate::embedding::EmbeddingProvider;

const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "can", "do", "does", "for", "from", "how",
    "i", "in", "is", "it", "its", "me", "my", "of", "on", "or", "please", "so", "that", "the",
    "this", "to", "was", "what", "which", "with", "you", "your",
];

pub struct HashingEmbedding {
    dims: usize,
}

impl HashingEmbedding {
    pub fn new(dims: usize) -> Self {
        Self { dims: dims.max(1) }
    }

    /// Embed a single text synchronously.
    pub fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dims];
        for token in tokenize(text) {
            let hash = blake3::hash(token.as_bytes());
            let bytes = hash.as_bytes();
            let mut word = [0u8; 8];
            word.copy_from_slice(&bytes[..8]);
            let bucket = (u64::from_le_bytes(word) % self.dims as u64) as usize;
            let sign = if bytes[8] & 1 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }

        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut vector {
                *x /= norm;
            }
        }
        vector
    }
}

impl Default for HashingEmbedding {
    fn default() -> Self {
        Self::new(256)
    }
}

/// Lower-case alphanumeric words with stopwords removed and a crude suffix
/// strip, so "files" and "file" land in the same bucket.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(|w| w.to_lowercase())
        .filter(|w| !STOPWORDS.contains(&w.as_str()))
        .map(|w| stem(&w))
        .collect()
}

fn stem(word: &str) -> String {
    for suffix in ["ing", "es", "s"] {
        if word.len() > suffix.len() + 3 {
            if let Some(stripped) = word.strip_suffix(suffix) {
                return stripped.to_string();
            }
        }
    }
    word.to_string()
}

#[async_trait]
impl EmbeddingProvider for HashingEmbedding {
    async fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, RetrievalError> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }

    fn dimensions(&self) -> usize {
        self.dims
    }

    fn name(&self) -> &str {
        "hashing"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dot(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| x * y).sum()
    }

    #[test]
    fn test_tokenize_drops_stopwords_and_punctuation() {
        assert_eq!(tokenize("What time is it?"), vec!["time"]);
        assert_eq!(tokenize("List the FILES in a directory"), vec!["list", "file", "directory"]);
    }

    #[test]
    fn test_embedding_is_deterministic_and_normalised() {
        let provider = HashingEmbedding::new(64);
        let a = provider.embed_one("tell the current time");
        let b = provider.embed_one("tell the current time");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!((dot(&a, &a) - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_empty_text_is_zero_vector() {
        let provider = HashingEmbedding::new(32);
        assert!(provider.embed_one("the of and").iter().all(|x| *x == 0.0));
    }

    #[test]
    fn test_shared_words_score_higher() {
        let provider = HashingEmbedding::default();
        let query = provider.embed_one("what time is it");
        let time = provider.embed_one("tell the time");
        let web = provider.embed_one("search the web");
        assert!(dot(&query, &time) > dot(&query, &web));
    }

    #[tokio::test]
    async fn test_batch_returns_one_vector_per_input() {
        let provider = HashingEmbedding::new(16);
        let out = provider.embed(&["one", "two", "three"]).await.unwrap();
        assert_eq!(out.len(), 3);
        assert_eq!(provider.name(), "hashing");
    }
}
