//! text-embeddings-inference 호환 HTTP 임베딩
//!
//! `POST {endpoint}/embed` 에 `{"inputs": [...], "normalize": true}` 를 보내고
//! `[[f32; dim], ...]` 를 받습니다.
//! ref: https://huggingface.github.io/text-embeddings-inference/

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};

use super::EmbeddingProvider;

/// 전송 실패/429/5xx 시 최대 재시도 횟수
const MAX_RETRIES: u32 = 3;
/// 재시도 시 초기 백오프 (ms)
const INITIAL_BACKOFF_MS: u64 = 500;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// TEI 임베딩 구현체
#[derive(Debug)]
pub struct TeiEmbedding {
    embed_url: String,
    model_id: String,
    dimension: usize,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    inputs: &'a [String],
    normalize: bool,
    truncate: bool,
}

/// TEI 에러 응답
#[derive(Debug, Deserialize)]
struct TeiError {
    error: String,
    #[serde(default)]
    error_type: String,
}

impl TeiEmbedding {
    /// 새 TEI 임베딩 인스턴스 생성
    ///
    /// # Arguments
    /// * `endpoint` - 서버 기본 URL (예: `http://localhost:8080`)
    /// * `model_id` - 서버가 서빙하는 모델 이름 (인덱스 매니페스트에 기록)
    /// * `dimension` - 기대하는 임베딩 차원
    pub fn new(endpoint: &str, model_id: &str, dimension: usize) -> Result<Self> {
        let base = url::Url::parse(endpoint).map_err(|e| RagError::EmbeddingUnavailable {
            model: model_id.to_string(),
            reason: format!("invalid endpoint `{}`: {}", endpoint, e),
        })?;

        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| RagError::EmbeddingUnavailable {
                model: model_id.to_string(),
                reason: format!("failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            embed_url: format!("{}/embed", base.as_str().trim_end_matches('/')),
            model_id: model_id.to_string(),
            dimension,
            client,
        })
    }

    fn unavailable(&self, reason: String) -> RagError {
        RagError::EmbeddingUnavailable {
            model: self.model_id.clone(),
            reason,
        }
    }

    async fn request(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let request = EmbedRequest {
            inputs: texts,
            normalize: true,
            truncate: true,
        };

        let mut last_error: Option<String> = None;

        // 재시도 루프 (전송 실패/429/5xx 시 지수 백오프)
        for attempt in 0..=MAX_RETRIES {
            if attempt > 0 {
                let backoff = Duration::from_millis(INITIAL_BACKOFF_MS * 2u64.pow(attempt - 1));
                tracing::warn!(
                    "Embedding request failed ({}), retrying in {:?} (attempt {}/{})",
                    last_error.as_deref().unwrap_or("unknown"),
                    backoff,
                    attempt,
                    MAX_RETRIES
                );
                tokio::time::sleep(backoff).await;
            }

            let response = match self.client.post(&self.embed_url).json(&request).send().await {
                Ok(resp) => resp,
                Err(e) => {
                    last_error = Some(format!("failed to send request: {}", e));
                    continue;
                }
            };

            let status = response.status();
            let body = response
                .text()
                .await
                .map_err(|e| self.unavailable(format!("failed to read response body: {}", e)))?;

            if status.is_success() {
                let vectors: Vec<Vec<f32>> = serde_json::from_str(&body)
                    .map_err(|e| self.unavailable(format!("unexpected response: {}", e)))?;
                return Ok(vectors);
            }

            if status.as_u16() == 429 || status.is_server_error() {
                last_error = Some(format!("server returned {}", status));
                continue;
            }

            // 다른 에러 - 즉시 실패
            if let Ok(error) = serde_json::from_str::<TeiError>(&body) {
                return Err(self.unavailable(format!(
                    "server error ({} {}): {}",
                    status, error.error_type, error.error
                )));
            }
            return Err(self.unavailable(format!("server error ({}): {}", status, body)));
        }

        Err(self.unavailable(format!(
            "{} after {} retries",
            last_error.unwrap_or_else(|| "request failed".to_string()),
            MAX_RETRIES
        )))
    }

    /// 응답 벡터 차원 검증 (잘라내거나 채우지 않음)
    fn check_dimensions(&self, vectors: &[Vec<f32>]) -> Result<()> {
        match vectors.iter().find(|v| v.len() != self.dimension) {
            Some(v) => Err(RagError::DimensionMismatch {
                expected: self.dimension,
                actual: v.len(),
            }),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl EmbeddingProvider for TeiEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| self.unavailable("server returned no embedding".to_string()))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        let vectors = self.request(texts).await?;
        if vectors.len() != texts.len() {
            return Err(self.unavailable(format!(
                "server returned {} embeddings for {} inputs",
                vectors.len(),
                texts.len()
            )));
        }
        self.check_dimensions(&vectors)?;

        tracing::debug!("Embedded {} texts via {}", texts.len(), self.embed_url);
        Ok(vectors)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}
