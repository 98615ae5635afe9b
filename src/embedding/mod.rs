//! 임베딩 모듈 - 텍스트를 고정 차원 벡터로 변환
//!
//! 임베딩 모델은 외부 기능이며 `EmbeddingProvider` 트레이트로 주입됩니다.
//! - `HashEmbedding`: 결정적 feature-hashing 임베딩 (테스트/오프라인용)
//! - `TeiEmbedding`: text-embeddings-inference 호환 HTTP 서버
//!
//! 인덱스를 만든 모델과 다른 모델로 쿼리하면 안 됩니다.
//! 모델 ID는 인덱스 매니페스트에 기록되고 Retriever 생성 시 검증됩니다.
//!
//! ## 사용법
//! ```rust,ignore
//! let embedder = create_embedder(&config.embedding)?;
//! let embedding = embedder.embed("home loan interest rate").await?;
//! ```

mod hash;
mod tei;

use std::sync::Arc;

use async_trait::async_trait;
use futures::{stream, StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};
use crate::knowledge::EMBEDDING_DIMENSION;

pub use hash::HashEmbedding;
pub use tei::TeiEmbedding;

// ============================================================================
// EmbeddingProvider Trait
// ============================================================================

/// 임베딩 프로바이더 트레이트
///
/// 같은 모델 ID에 대해 결정적이어야 하며 차원은 모델마다 고정입니다.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// 단일 텍스트 임베딩
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// 배치 임베딩 (기본 구현: 순차 호출)
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    /// 임베딩 차원 수
    fn dimension(&self) -> usize;

    /// 모델 식별자 (인덱스 매니페스트에 기록됨)
    fn model_id(&self) -> &str;
}

// ============================================================================
// Settings
// ============================================================================

/// 해시 임베딩 모델 이름
pub const HASH_MODEL: &str = "hash";

/// 기본 임베딩 모델
pub const DEFAULT_MODEL: &str = "sentence-transformers/all-MiniLM-L6-v2";

/// 임베딩 설정
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    /// 모델 식별자 (`hash` 또는 서버 모델 이름)
    pub model: String,
    /// 임베딩 서버 URL (없으면 `LOANRAG_EMBED_URL`)
    pub endpoint: Option<String>,
    pub dimension: usize,
    /// 요청당 텍스트 수
    pub batch_size: usize,
    /// 동시에 처리할 배치 수
    pub concurrency: usize,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            endpoint: None,
            dimension: EMBEDDING_DIMENSION,
            batch_size: 32,
            concurrency: 4,
        }
    }
}

// ============================================================================
// Batch Embedding
// ============================================================================

/// 텍스트 전체 임베딩 (배치 단위 병렬)
///
/// 최대 `concurrency`개의 배치를 동시에 처리하며, 결과 순서는 입력 순서와 같습니다.
/// 반환된 벡터 개수와 차원을 배치 단위로 검증합니다.
pub async fn embed_all(
    provider: &dyn EmbeddingProvider,
    texts: &[String],
    batch_size: usize,
    concurrency: usize,
) -> Result<Vec<Vec<f32>>> {
    let batch_size = batch_size.max(1);
    let total_batches = texts.len().div_ceil(batch_size);

    let batches: Vec<Vec<Vec<f32>>> = stream::iter(texts.chunks(batch_size).enumerate())
        .map(|(i, batch)| async move {
            tracing::debug!("Embedding batch {}/{}", i + 1, total_batches);
            let vectors = provider.embed_batch(batch).await?;
            if vectors.len() != batch.len() {
                return Err(RagError::EmbeddingUnavailable {
                    model: provider.model_id().to_string(),
                    reason: format!(
                        "batch {} returned {} vectors for {} texts",
                        i + 1,
                        vectors.len(),
                        batch.len()
                    ),
                });
            }
            if let Some((offset, vector)) = vectors
                .iter()
                .enumerate()
                .find(|(_, v)| v.len() != provider.dimension())
            {
                return Err(RagError::BatchDimensionMismatch {
                    batch: i + 1,
                    offset,
                    expected: provider.dimension(),
                    actual: vector.len(),
                });
            }
            Ok(vectors)
        })
        .buffered(concurrency.max(1))
        .try_collect()
        .await?;

    Ok(batches.into_iter().flatten().collect())
}

// ============================================================================
// Endpoint Management
// ============================================================================

/// 임베딩 서버 URL 로드
///
/// 우선순위:
/// 1. 설정 파일의 `embedding.endpoint`
/// 2. `LOANRAG_EMBED_URL` 환경변수
pub fn get_endpoint(settings: &EmbeddingSettings) -> Option<String> {
    if let Some(endpoint) = settings.endpoint.as_ref().filter(|e| !e.is_empty()) {
        return Some(endpoint.clone());
    }

    match std::env::var("LOANRAG_EMBED_URL") {
        Ok(url) if !url.is_empty() => {
            tracing::debug!("Using embedding endpoint from LOANRAG_EMBED_URL");
            Some(url)
        }
        _ => None,
    }
}

// ============================================================================
// Factory Function
// ============================================================================

/// 설정에 맞는 임베딩 프로바이더 생성
///
/// 대체(fallback) 임베딩은 없습니다. 모델을 쓸 수 없으면 `EmbeddingUnavailable`.
pub fn create_embedder(settings: &EmbeddingSettings) -> Result<Arc<dyn EmbeddingProvider>> {
    if settings.dimension == 0 {
        return Err(RagError::Config("embedding dimension must be > 0".to_string()));
    }

    if settings.model == HASH_MODEL {
        let embedder = HashEmbedding::new(settings.dimension);
        tracing::info!(
            "Using hash embedding (dimension: {})",
            embedder.dimension()
        );
        return Ok(Arc::new(embedder));
    }

    let endpoint = get_endpoint(settings).ok_or_else(|| RagError::EmbeddingUnavailable {
        model: settings.model.clone(),
        reason: "no embedding endpoint configured. Set LOANRAG_EMBED_URL or \
                 embedding.endpoint, or use model `hash`"
            .to_string(),
    })?;

    let embedder = TeiEmbedding::new(&endpoint, &settings.model, settings.dimension)?;
    tracing::info!(
        "Using embedding server {} (model: {}, dimension: {})",
        endpoint,
        settings.model,
        settings.dimension
    );
    Ok(Arc::new(embedder))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    /// 항상 잘못된 차원을 반환하는 프로바이더
    struct ShortEmbedding;

    #[async_trait]
    impl EmbeddingProvider for ShortEmbedding {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Ok(vec![0.5; 2])
        }

        fn dimension(&self) -> usize {
            4
        }

        fn model_id(&self) -> &str {
            "short"
        }
    }

    fn texts(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("loan scheme number {}", i)).collect()
    }

    #[tokio::test]
    async fn test_embed_all_preserves_order() {
        let embedder = HashEmbedding::new(16);
        let inputs = texts(10);

        let batched = embed_all(&embedder, &inputs, 3, 4).await.unwrap();
        assert_eq!(batched.len(), 10);

        for (text, vector) in inputs.iter().zip(&batched) {
            assert_eq!(&embedder.embed(text).await.unwrap(), vector);
        }
    }

    #[tokio::test]
    async fn test_embed_all_empty() {
        let embedder = HashEmbedding::new(16);
        let batched = embed_all(&embedder, &[], 8, 2).await.unwrap();
        assert!(batched.is_empty());
    }

    #[tokio::test]
    async fn test_embed_all_checks_dimension() {
        let err = embed_all(&ShortEmbedding, &texts(5), 2, 1).await.unwrap_err();
        assert!(matches!(
            err,
            RagError::BatchDimensionMismatch {
                batch: 1,
                offset: 0,
                expected: 4,
                actual: 2
            }
        ));
        assert_eq!(
            err.to_string(),
            "batch 1 item 0: dimension mismatch: expected 4, got 2"
        );
    }

    /// 세 번째 텍스트부터 잘못된 차원을 반환하는 프로바이더
    struct DriftingEmbedding;

    #[async_trait]
    impl EmbeddingProvider for DriftingEmbedding {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            if text.ends_with('2') {
                Ok(vec![0.5; 3])
            } else {
                Ok(vec![0.5; 4])
            }
        }

        fn dimension(&self) -> usize {
            4
        }

        fn model_id(&self) -> &str {
            "drifting"
        }
    }

    #[tokio::test]
    async fn test_dimension_error_names_batch_and_offset() {
        let err = embed_all(&DriftingEmbedding, &texts(4), 2, 2)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RagError::BatchDimensionMismatch {
                batch: 2,
                offset: 0,
                expected: 4,
                actual: 3
            }
        ));
    }

    #[test]
    fn test_create_hash_embedder() {
        let settings = EmbeddingSettings {
            model: HASH_MODEL.to_string(),
            dimension: 64,
            ..Default::default()
        };
        let embedder = create_embedder(&settings).unwrap();
        assert_eq!(embedder.dimension(), 64);
        assert_eq!(embedder.model_id(), "hash-64");
    }

    #[test]
    fn test_create_embedder_with_endpoint() {
        let settings = EmbeddingSettings {
            endpoint: Some("http://127.0.0.1:8080".to_string()),
            ..Default::default()
        };
        let embedder = create_embedder(&settings).unwrap();
        assert_eq!(embedder.model_id(), DEFAULT_MODEL);
        assert_eq!(embedder.dimension(), 384);
    }

    #[test]
    fn test_create_embedder_rejects_zero_dimension() {
        let settings = EmbeddingSettings {
            model: HASH_MODEL.to_string(),
            dimension: 0,
            ..Default::default()
        };
        assert!(matches!(
            create_embedder(&settings),
            Err(RagError::Config(_))
        ));
    }
}
