//! Deterministic local embedding provider.
//!
//! Feature-hashes lowercase tokens into a fixed-size vector and
//! L2-normalizes the result. Texts sharing tokens get similar vectors, so
//! cosine ranking reflects term overlap. No network, no model download;
//! intended for tests and offline development, not semantic quality.

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use super::{EmbedResult, Embedder};

/// Default dimension for the hashed provider.
pub const DEFAULT_DIMENSION: usize = 384;

/// Token-hashing embedder with deterministic output.
pub struct HashedEmbedder {
    dimension: usize,
}

impl HashedEmbedder {
    /// Create a hashed embedder with the given dimension.
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];

        for token in tokens(text) {
            let digest = Sha256::digest(token.as_bytes());
            let bucket = u64::from_le_bytes(digest[..8].try_into().expect("8 bytes"))
                as usize
                % self.dimension;
            // Sign bit from the hash keeps buckets from only accumulating.
            let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }

        let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }

        vector
    }
}

impl Default for HashedEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_DIMENSION)
    }
}

#[async_trait]
impl Embedder for HashedEmbedder {
    fn model_name(&self) -> &str {
        "hashed-tokens"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, texts: &[&str]) -> EmbedResult<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}

/// Lowercase alphanumeric tokens of a text.
fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cosine(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| x * y).sum()
    }

    #[tokio::test]
    async fn test_deterministic_output() {
        let embedder = HashedEmbedder::new(64);
        let a = embedder.embed(&["create a widget"]).await.unwrap();
        let b = embedder.embed(&["create a widget"]).await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_token_overlap_scores_higher() {
        let embedder = HashedEmbedder::new(128);
        let vectors = embedder
            .embed(&[
                "create a widget",
                "POST /widgets create a new widget",
                "list all existing gadgets",
            ])
            .await
            .unwrap();

        let query = &vectors[0];
        let overlapping = cosine(query, &vectors[1]);
        let unrelated = cosine(query, &vectors[2]);
        assert!(overlapping > unrelated);
    }

    #[tokio::test]
    async fn test_vectors_are_normalized() {
        let embedder = HashedEmbedder::new(32);
        let vectors = embedder.embed(&["some text here"]).await.unwrap();
        let norm: f32 = vectors[0].iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn test_empty_text_yields_zero_vector() {
        let embedder = HashedEmbedder::new(16);
        let vectors = embedder.embed(&[""]).await.unwrap();
        assert!(vectors[0].iter().all(|v| *v == 0.0));
    }
}
