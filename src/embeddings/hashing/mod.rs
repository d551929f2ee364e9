
use anyhow::Result;

use super::{Embedder, EmbeddingModelRef, EmbeddingProvider};

pub const HASHING_MODEL_NAME: &str = "fnv1a-bag-of-words";
const MIN_DIMENSION: usize = 8;
const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Feature-hashing embedder: lowercased alphanumeric tokens (any script) hashed into buckets, L2-normalised.
///
/// Fully determined by its dimension, so artifacts built with it reproduce exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashingEmbedder {
    dimension: usize,
}

impl HashingEmbedder {
    #[inline]
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(MIN_DIMENSION),
        }
    }

    #[inline]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    fn bucket(&self, token: &str) -> usize {
        let mut hash = FNV_OFFSET_BASIS;
        for byte in token.as_bytes() {
            hash ^= u64::from(*byte);
            hash = hash.wrapping_mul(FNV_PRIME);
        }
        (hash % self.dimension as u64) as usize
    }
}

impl Embedder for HashingEmbedder {
    fn model_ref(&self) -> EmbeddingModelRef {
        EmbeddingModelRef {
            provider: EmbeddingProvider::Hashing,
            model: HASHING_MODEL_NAME.to_string(),
            dimension: self.dimension,
        }
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vector = vec![0.0_f32; self.dimension];

        for token in text
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|token| !token.is_empty())
        {
            vector[self.bucket(token)] += 1.0;
        }

        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut vector {
                *x /= norm;
            }
        }

        Ok(vector)
    }
}
