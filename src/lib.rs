//! loan-rag - 은행 대출 상품 RAG 질의응답
//!
//! 대출 카탈로그의 상품 레코드를 평탄화 → 청킹 → 임베딩하여
//! 정확한 최근접 이웃 인덱스를 만들고, 질문과 가장 가까운 청크를
//! 근거로 LLM 답변을 생성합니다.

pub mod answer;
pub mod cli;
pub mod config;
pub mod embedding;
pub mod error;
pub mod knowledge;
pub mod scraper;

// Re-exports
pub use answer::{Answer, AnswerGenerator, GenerationSettings, OpenAiGenerator, QaChain};
pub use config::RagConfig;
pub use embedding::{
    create_embedder, EmbeddingProvider, EmbeddingSettings, HashEmbedding, TeiEmbedding,
};
pub use error::{RagError, Result};
pub use knowledge::{
    chunk_documents, default_chunker, flatten, flatten_record, get_data_dir, normalize_catalog,
    BuildPolicy, BuildReport, Chunk, ChunkConfig, Chunker, DistanceMetric, DocumentMetadata,
    FlatDocument, IndexBuilder, IndexEntry, LoanCatalog, Record, RecursiveChunker, RetrievalHit,
    Retriever, SearchHit, VectorIndex,
};
pub use scraper::{PageContent, PageRecord, ScrapeSession};
