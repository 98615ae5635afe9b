//! Retriever - 쿼리 임베딩 후 top-k 청크 검색
//!
//! 활성 인덱스는 `RwLock<Arc<VectorIndex>>`로 보관합니다.
//! 쿼리는 `Arc`를 복제한 뒤 락을 놓고 검색하므로, 재빌드된 인덱스로
//! 교체(`replace_index`)하는 동안에도 진행 중인 쿼리는 이전 인덱스를 끝까지 사용합니다.

use std::sync::{Arc, RwLock};

use serde::Serialize;

use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};

use super::index::{SearchHit, VectorIndex};

/// 기본 검색 개수
pub const DEFAULT_TOP_K: usize = 3;

/// 검색 결과 (score는 거리, 작을수록 관련도 높음)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievalHit {
    pub text: String,
    pub category: String,
    pub scheme: String,
    pub url: String,
    pub score: f32,
}

impl From<SearchHit> for RetrievalHit {
    fn from(hit: SearchHit) -> Self {
        Self {
            text: hit.text,
            category: hit.metadata.category,
            scheme: hit.metadata.scheme,
            url: hit.metadata.url,
            score: hit.distance,
        }
    }
}

/// 검색기
pub struct Retriever {
    embedder: Arc<dyn EmbeddingProvider>,
    index: RwLock<Arc<VectorIndex>>,
    k: usize,
}

impl Retriever {
    /// 새 검색기 생성
    ///
    /// 인덱스를 만든 모델과 쿼리 모델이 같아야 합니다.
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, index: VectorIndex) -> Result<Self> {
        check_compatible(embedder.as_ref(), &index)?;

        tracing::info!(
            "Retriever ready: {} entries, model {}, metric {}",
            index.len(),
            index.embedding_model(),
            index.metric()
        );

        Ok(Self {
            embedder,
            index: RwLock::new(Arc::new(index)),
            k: DEFAULT_TOP_K,
        })
    }

    /// 기본 검색 개수 변경
    pub fn with_k(mut self, k: usize) -> Self {
        self.k = k;
        self
    }

    /// 기본 검색 개수
    pub fn k(&self) -> usize {
        self.k
    }

    /// 현재 활성 인덱스
    pub fn index(&self) -> Arc<VectorIndex> {
        let guard = self.index.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&guard)
    }

    /// 쿼리와 가장 가까운 청크 k개 (가까운 순)
    ///
    /// 쿼리 문자열은 전처리 없이 그대로 임베딩합니다.
    pub async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<RetrievalHit>> {
        let index = self.index();
        let vector = self.embedder.embed(query).await?;
        let hits = index.search(&vector, k)?;

        tracing::debug!("Retrieved {} hits for query ({} chars)", hits.len(), query.chars().count());
        Ok(hits.into_iter().map(RetrievalHit::from).collect())
    }

    /// 기본 k로 검색
    pub async fn retrieve_default(&self, query: &str) -> Result<Vec<RetrievalHit>> {
        self.retrieve(query, self.k).await
    }

    /// 활성 인덱스 교체 (완성된 인덱스만 교체 가능)
    pub fn replace_index(&self, index: VectorIndex) -> Result<()> {
        check_compatible(self.embedder.as_ref(), &index)?;

        let count = index.len();
        let mut guard = self.index.write().unwrap_or_else(|e| e.into_inner());
        *guard = Arc::new(index);

        tracing::info!("Active index replaced ({} entries)", count);
        Ok(())
    }
}

fn check_compatible(embedder: &dyn EmbeddingProvider, index: &VectorIndex) -> Result<()> {
    if embedder.model_id() != index.embedding_model() {
        return Err(RagError::ModelMismatch {
            index: index.embedding_model().to_string(),
            query: embedder.model_id().to_string(),
        });
    }
    if embedder.dimension() != index.dimension() {
        return Err(RagError::DimensionMismatch {
            expected: index.dimension(),
            actual: embedder.dimension(),
        });
    }
    Ok(())
}
