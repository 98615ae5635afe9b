//! 해시 임베딩 - 모델 없이 동작하는 결정적 임베딩
//!
//! 소문자로 정규화한 영숫자 토큰마다 SHA-256 다이제스트로 버킷과 부호를 정하고
//! (feature hashing), 결과를 L2 정규화합니다. 같은 텍스트는 항상 같은 벡터가 되며
//! 단어를 많이 공유하는 텍스트일수록 가까워집니다.

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::error::Result;
use crate::knowledge::l2_normalize;

use super::EmbeddingProvider;

/// 해시 임베딩 구현체
#[derive(Debug, Clone)]
pub struct HashEmbedding {
    dimension: usize,
    model_id: String,
}

impl HashEmbedding {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            model_id: format!("hash-{}", dimension),
        }
    }

    fn vectorize(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        if self.dimension == 0 {
            return vector;
        }

        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let digest = Sha256::digest(token.to_lowercase().as_bytes());

            let mut bucket_bytes = [0u8; 8];
            bucket_bytes.copy_from_slice(&digest[..8]);
            let bucket = (u64::from_le_bytes(bucket_bytes) % self.dimension as u64) as usize;
            let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };

            vector[bucket] += sign;
        }

        l2_normalize(&mut vector);
        vector
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.vectorize(text))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.vectorize(t)).collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}
