//! 에러 타입
//!
//! 빌드 단계 에러는 어떤 레코드/배치에서 실패했는지 알 수 있도록
//! 문맥 정보를 포함합니다.

use std::path::PathBuf;

use thiserror::Error;

/// loan-rag 라이브러리 에러
#[derive(Error, Debug)]
pub enum RagError {
    /// 레코드에 필수 필드(scheme_name, url)가 없음
    #[error("record {category}[{position}]: missing required field `{field}`")]
    MissingField {
        category: String,
        position: usize,
        field: &'static str,
    },

    /// 레코드가 객체가 아님 등 구조가 잘못됨
    #[error("record {category}[{position}]: {reason}")]
    MalformedRecord {
        category: String,
        position: usize,
        reason: String,
    },

    /// 임베딩 모델을 사용할 수 없음 (빌드/쿼리 모두 치명적)
    #[error("embedding model `{model}` unavailable: {reason}")]
    EmbeddingUnavailable { model: String, reason: String },

    /// 저장된 인덱스가 없음
    #[error("no index found at {0}")]
    IndexNotFound(PathBuf),

    /// 저장된 인덱스를 읽을 수 없음
    #[error("index at {path} is corrupt: {reason}")]
    IndexCorrupt { path: PathBuf, reason: String },

    /// 벡터 차원 불일치
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// 임베딩 배치 안의 벡터 차원 불일치 (batch는 1부터, offset은 배치 내 위치)
    #[error("batch {batch} item {offset}: dimension mismatch: expected {expected}, got {actual}")]
    BatchDimensionMismatch {
        batch: usize,
        offset: usize,
        expected: usize,
        actual: usize,
    },

    /// 인덱스를 만든 임베딩 모델과 쿼리 모델이 다름
    #[error("embedding model mismatch: index built with `{index}`, query uses `{query}`")]
    ModelMismatch { index: String, query: String },

    /// NaN/Inf 등 사용할 수 없는 벡터
    #[error("invalid vector: {0}")]
    InvalidVector(String),

    #[error("invalid chunk configuration: {0}")]
    InvalidChunkConfig(String),

    /// 입력 카탈로그 구조 오류
    #[error("catalog error: {0}")]
    Catalog(String),

    #[error("config error: {0}")]
    Config(String),

    /// 답변 생성(LLM 호출) 실패
    #[error("generation failed: {0}")]
    Generation(String),

    #[error("scrape failed: {0}")]
    Scrape(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// loan-rag 결과 타입
pub type Result<T> = std::result::Result<T, RagError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_field_names_record() {
        let err = RagError::MissingField {
            category: "home_loans".to_string(),
            position: 2,
            field: "url",
        };
        assert_eq!(
            err.to_string(),
            "record home_loans[2]: missing required field `url`"
        );
    }

    #[test]
    fn test_dimension_mismatch_display() {
        let err = RagError::DimensionMismatch {
            expected: 384,
            actual: 768,
        };
        assert_eq!(err.to_string(), "dimension mismatch: expected 384, got 768");
    }

    #[test]
    fn test_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: RagError = io_err.into();
        assert!(matches!(err, RagError::Io(_)));
    }
}
