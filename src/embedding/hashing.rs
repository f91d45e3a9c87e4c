//! Offline feature-hashing embedder.

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::analysis::tokenizer::{RegexTokenizer, Tokenizer};
use crate::embedding::provider::{AsyncEmbeddingProvider, EmbeddingProvider};
use crate::error::{HalberdError, Result};

/// Deterministic embedder hashing each lower-cased word into one of
/// `dimension` signed buckets, then L2-normalizing the result.
///
/// Texts sharing words get a positive cosine similarity; the vectors are
/// stable across processes and platforms, so they can be cached on disk.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    model_id: String,
    dimension: usize,
    tokenizer: RegexTokenizer,
}

impl HashingEmbedder {
    /// Create an embedder producing `dimension`-sized vectors.
    pub fn new(dimension: usize) -> Result<Self> {
        if dimension == 0 {
            return Err(HalberdError::invalid_argument("embedding dimension must be at least 1"));
        }
        Ok(HashingEmbedder {
            model_id: format!("hashing-{dimension}"),
            dimension,
            tokenizer: RegexTokenizer::new()?,
        })
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    fn bucket(&self, token: &str) -> (usize, f32) {
        let digest = Sha256::digest(token.as_bytes());
        let mut head = [0u8; 8];
        head.copy_from_slice(&digest[..8]);
        let index = (u64::from_le_bytes(head) % self.dimension as u64) as usize;
        let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
        (index, sign)
    }

    fn vectorize(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        for token in self.tokenizer.tokenize(text) {
            let (index, sign) = self.bucket(&token);
            vector[index] += sign;
        }

        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|x| *x /= norm);
        }
        vector
    }
}

impl EmbeddingProvider for HashingEmbedder {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.vectorize(text))
    }
}

#[async_trait]
impl AsyncEmbeddingProvider for HashingEmbedder {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.vectorize(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn norm(v: &[f32]) -> f32 {
        v.iter().map(|x| x * x).sum::<f32>().sqrt()
    }

    #[test]
    fn test_deterministic_and_normalized() {
        let embedder = HashingEmbedder::new(64).unwrap();
        let a = EmbeddingProvider::embed(&embedder, "Taxa de juros mensal").unwrap();
        let b = EmbeddingProvider::embed(&embedder, "taxa de JUROS mensal").unwrap();

        assert_eq!(a.len(), 64);
        assert_eq!(a, b);
        assert!((norm(&a) - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_empty_text_is_zero_vector() {
        let embedder = HashingEmbedder::new(8).unwrap();
        let v = EmbeddingProvider::embed(&embedder, "  ... ").unwrap();
        assert!(v.iter().all(|x| *x == 0.0));
    }

    #[test]
    fn test_model_id_and_zero_dimension() {
        assert_eq!(EmbeddingProvider::model_id(&HashingEmbedder::new(32).unwrap()), "hashing-32");
        assert!(HashingEmbedder::new(0).is_err());
    }

    #[tokio::test]
    async fn test_async_matches_sync() {
        let embedder = HashingEmbedder::new(16).unwrap();
        let sync = EmbeddingProvider::embed(&embedder, "multa por atraso").unwrap();
        let asynchronous = AsyncEmbeddingProvider::embed(&embedder, "multa por atraso").await.unwrap();
        assert_eq!(sync, asynchronous);
    }
}
