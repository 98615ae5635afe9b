//! Knowledge 모듈 - 대출 상품 RAG 지식 저장소
//!
//! - Record: 카탈로그 상품을 텍스트 문서 + 메타데이터로 평탄화
//! - Normalize: 수집한 원본 카탈로그 정리
//! - Chunker: 겹침(overlap)이 있는 고정 크기 텍스트 분할
//! - Index: 정확한 최근접 이웃 검색 + 디렉토리 영속화
//! - Retriever: 쿼리 임베딩 → top-k 청크
//! - Pipeline: flatten → chunk → embed → index 빌드

mod chunker;
mod index;
mod normalize;
mod pipeline;
mod record;
mod retriever;
mod vector;

use std::path::PathBuf;

// Re-exports
pub use chunker::{
    chunk_documents, default_chunker, recursive_chunker, Chunk, ChunkConfig, Chunker,
    RecursiveChunker,
};
pub use index::{IndexEntry, IndexManifest, SearchHit, VectorIndex};
pub use normalize::{clean_text, normalize_catalog, normalize_scheme};
pub use pipeline::{BuildPolicy, BuildReport, IndexBuilder, SkippedRecord};
pub use record::{
    flatten, flatten_record, DocumentMetadata, FlatDocument, LoanCatalog, LoanCategory, Record,
};
pub use retriever::{RetrievalHit, Retriever, DEFAULT_TOP_K};
pub use vector::{
    cosine_similarity, l2_distance, l2_normalize, DistanceMetric, EMBEDDING_DIMENSION,
};

/// 데이터 디렉토리 경로 반환
pub fn get_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".loan-rag")
}

/// 기본 인덱스 경로 (`<data_dir>/index`)
pub fn default_index_path() -> PathBuf {
    get_data_dir().join("index")
}
