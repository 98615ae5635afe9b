//! 인덱스 빌드 파이프라인
//!
//! flatten → chunk → embed (배치 병렬) → index 순서로 실행합니다.
//! 레코드 오류 처리 방식은 `BuildPolicy`로 정하며, 임베딩 실패는 항상 치명적입니다.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::embedding::{embed_all, EmbeddingProvider};
use crate::error::{RagError, Result};

use super::chunker::{chunk_documents, Chunker};
use super::index::{IndexEntry, VectorIndex};
use super::record::{flatten_record, FlatDocument, Record};
use super::vector::DistanceMetric;

// ============================================================================
// Types
// ============================================================================

/// 잘못된 레코드 처리 방식
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BuildPolicy {
    /// 첫 번째 잘못된 레코드에서 중단
    #[default]
    FailFast,
    /// 잘못된 레코드는 건너뛰고 보고서에 기록
    BestEffort,
}

impl fmt::Display for BuildPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildPolicy::FailFast => f.write_str("fail-fast"),
            BuildPolicy::BestEffort => f.write_str("best-effort"),
        }
    }
}

impl FromStr for BuildPolicy {
    type Err = RagError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().replace('_', "-").as_str() {
            "fail-fast" | "strict" => Ok(BuildPolicy::FailFast),
            "best-effort" | "skip" => Ok(BuildPolicy::BestEffort),
            other => Err(RagError::Config(format!(
                "unknown build policy `{}` (expected fail-fast or best-effort)",
                other
            ))),
        }
    }
}

/// 건너뛴 레코드
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedRecord {
    pub category: String,
    pub position: usize,
    pub reason: String,
}

/// 빌드 결과 보고서
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BuildReport {
    pub documents: usize,
    pub chunks: usize,
    pub entries: usize,
    pub skipped: Vec<SkippedRecord>,
}

// ============================================================================
// IndexBuilder
// ============================================================================

/// 인덱스 빌더
pub struct IndexBuilder {
    embedder: Arc<dyn EmbeddingProvider>,
    chunker: Box<dyn Chunker>,
    metric: DistanceMetric,
    policy: BuildPolicy,
    batch_size: usize,
    concurrency: usize,
}

impl IndexBuilder {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, chunker: Box<dyn Chunker>) -> Self {
        Self {
            embedder,
            chunker,
            metric: DistanceMetric::default(),
            policy: BuildPolicy::default(),
            batch_size: 32,
            concurrency: 4,
        }
    }

    pub fn with_metric(mut self, metric: DistanceMetric) -> Self {
        self.metric = metric;
        self
    }

    pub fn with_policy(mut self, policy: BuildPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// 배치 크기와 동시 배치 수 설정
    pub fn with_batching(mut self, batch_size: usize, concurrency: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self.concurrency = concurrency.max(1);
        self
    }

    /// 레코드 전체로 인덱스 빌드
    pub async fn build(&self, records: &[Record]) -> Result<(VectorIndex, BuildReport)> {
        let mut report = BuildReport::default();

        // 1. Flatten
        let mut documents: Vec<FlatDocument> = Vec::with_capacity(records.len());
        for record in records {
            match flatten_record(record) {
                Ok(doc) => documents.push(doc),
                Err(e @ (RagError::MissingField { .. } | RagError::MalformedRecord { .. }))
                    if self.policy == BuildPolicy::BestEffort =>
                {
                    tracing::warn!("Skipping record: {}", e);
                    report.skipped.push(SkippedRecord {
                        category: record.category_key.clone(),
                        position: record.position,
                        reason: e.to_string(),
                    });
                }
                Err(e) => return Err(e),
            }
        }
        report.documents = documents.len();
        tracing::info!(
            "Flattened {} records into {} documents ({} skipped)",
            records.len(),
            documents.len(),
            report.skipped.len()
        );

        // 2. Chunk
        let chunks = chunk_documents(&documents, self.chunker.as_ref());
        drop(documents);
        report.chunks = chunks.len();
        tracing::info!(
            "Split documents into {} chunks using {}",
            chunks.len(),
            self.chunker.name()
        );

        // 3. Embed
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = embed_all(
            self.embedder.as_ref(),
            &texts,
            self.batch_size,
            self.concurrency,
        )
        .await?;
        tracing::info!("Embedded {} chunks", vectors.len());

        // 4. Index
        let entries: Vec<IndexEntry> = chunks
            .into_iter()
            .zip(vectors)
            .map(|(chunk, vector)| IndexEntry {
                vector,
                text: chunk.text,
                metadata: chunk.metadata,
            })
            .collect();

        let index = VectorIndex::build(
            self.embedder.dimension(),
            self.metric,
            self.embedder.model_id(),
            entries,
        )?;
        report.entries = index.len();

        Ok((index, report))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashEmbedding;
    use crate::knowledge::{default_chunker, recursive_chunker, ChunkConfig};
    use async_trait::async_trait;
    use serde_json::{json, Value};

    fn record(category: &str, position: usize, fields: Value) -> Record {
        Record {
            category_key: category.to_string(),
            category_name: category.to_string(),
            position,
            fields,
        }
    }

    fn records() -> Vec<Record> {
        vec![
            record(
                "home_loans",
                0,
                json!({"scheme_name": "Home Plus", "url": "https://example.com/home", "interest_rate": "8.5%"}),
            ),
            record(
                "home_loans",
                1,
                json!({"url": "https://example.com/broken"}),
            ),
            record(
                "car_loans",
                0,
                json!({"scheme_name": "Car Easy", "url": "https://example.com/car", "interest_rate": "9.1%"}),
            ),
        ]
    }

    fn builder() -> IndexBuilder {
        IndexBuilder::new(Arc::new(HashEmbedding::new(32)), default_chunker())
    }

    #[tokio::test]
    async fn test_fail_fast_aborts() {
        let err = builder().build(&records()).await.unwrap_err();
        assert!(matches!(
            err,
            RagError::MissingField {
                position: 1,
                field: "scheme_name",
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_best_effort_skips() {
        let (index, report) = builder()
            .with_policy(BuildPolicy::BestEffort)
            .build(&records())
            .await
            .unwrap();

        assert_eq!(report.documents, 2);
        assert_eq!(report.chunks, 2);
        assert_eq!(report.entries, 2);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].category, "home_loans");
        assert_eq!(report.skipped[0].position, 1);
        assert_eq!(index.len(), 2);
        assert_eq!(index.embedding_model(), "hash-32");
    }

    #[tokio::test]
    async fn test_non_object_scheme_follows_policy() {
        let recs = vec![
            record("home", 0, json!({"scheme_name": "Good", "url": "u"})),
            record("home", 1, json!("garbage-record")),
        ];

        let err = builder().build(&recs).await.unwrap_err();
        assert!(matches!(err, RagError::MalformedRecord { position: 1, .. }));

        let (index, report) = builder()
            .with_policy(BuildPolicy::BestEffort)
            .build(&recs)
            .await
            .unwrap();
        assert_eq!(index.len(), 1);
        assert_eq!(report.documents, 1);
        assert_eq!(
            report.skipped,
            vec![SkippedRecord {
                category: "home".to_string(),
                position: 1,
                reason: "record home[1]: expected an object, got a string".to_string(),
            }]
        );
    }

    #[tokio::test]
    async fn test_long_document_chunks_share_metadata() {
        let long_text = "The applicant must be a resident. ".repeat(20);
        let recs = vec![record(
            "personal",
            0,
            json!({"scheme_name": "Personal Flex", "url": "https://example.com/p", "eligibility": long_text}),
        )];

        let chunker = recursive_chunker(ChunkConfig::new(200, 40).unwrap()).unwrap();
        let (index, report) = IndexBuilder::new(Arc::new(HashEmbedding::new(32)), chunker)
            .with_metric(DistanceMetric::Cosine)
            .with_batching(2, 3)
            .build(&recs)
            .await
            .unwrap();

        assert!(report.chunks > 1);
        assert_eq!(index.len(), report.chunks);
        assert_eq!(index.metric(), DistanceMetric::Cosine);
        assert!(index
            .entries()
            .iter()
            .all(|e| e.metadata.scheme == "Personal Flex" && e.text.chars().count() <= 200));
    }

    /// 항상 실패하는 임베딩
    struct DownEmbedding;

    #[async_trait]
    impl EmbeddingProvider for DownEmbedding {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Err(RagError::EmbeddingUnavailable {
                model: "down".to_string(),
                reason: "connection refused".to_string(),
            })
        }

        fn dimension(&self) -> usize {
            8
        }

        fn model_id(&self) -> &str {
            "down"
        }
    }

    #[tokio::test]
    async fn test_embedding_failure_is_fatal() {
        let err = IndexBuilder::new(Arc::new(DownEmbedding), default_chunker())
            .with_policy(BuildPolicy::BestEffort)
            .build(&records())
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::EmbeddingUnavailable { .. }));
    }

    #[test]
    fn test_policy_parse() {
        assert_eq!("fail-fast".parse::<BuildPolicy>().unwrap(), BuildPolicy::FailFast);
        assert_eq!(
            "best_effort".parse::<BuildPolicy>().unwrap(),
            BuildPolicy::BestEffort
        );
        assert!("lenient".parse::<BuildPolicy>().is_err());
        assert_eq!(BuildPolicy::BestEffort.to_string(), "best-effort");
    }
}
