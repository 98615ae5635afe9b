//! 답변 생성 모듈 - 검색된 청크를 근거로 LLM 답변 생성
//!
//! 검색 결과를 하나의 컨텍스트로 이어 붙여 프롬프트에 넣는("stuff") 방식입니다.
//! LLM은 `AnswerGenerator` 트레이트로 주입되므로 네트워크 없이 테스트할 수 있습니다.

mod openai;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::knowledge::{RetrievalHit, Retriever};

pub use openai::{get_api_key, has_api_key, OpenAiGenerator};

// ============================================================================
// Settings
// ============================================================================

/// 기본 생성 모델
pub const DEFAULT_GENERATION_MODEL: &str = "gpt-3.5-turbo";

/// 생성 설정
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationSettings {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: usize,
    /// OpenAI 호환 API 기본 URL
    pub api_base: String,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            model: DEFAULT_GENERATION_MODEL.to_string(),
            temperature: 0.2,
            max_tokens: 512,
            api_base: "https://api.openai.com/v1".to_string(),
        }
    }
}

// ============================================================================
// AnswerGenerator Trait
// ============================================================================

/// 답변 생성기 트레이트
#[async_trait]
pub trait AnswerGenerator: Send + Sync {
    /// 컨텍스트와 질문으로 답변 생성
    async fn generate(&self, context: &str, question: &str) -> Result<String>;

    /// 모델 이름
    fn model(&self) -> &str;
}

/// 검색 결과를 컨텍스트로 결합 (빈 줄로 구분, 순위 순서 유지)
pub fn build_context(hits: &[RetrievalHit]) -> String {
    hits.iter()
        .map(|hit| hit.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// "stuff" 프롬프트
pub fn stuff_prompt(context: &str, question: &str) -> String {
    format!(
        "Use the following pieces of context to answer the question at the end. \
         If you don't know the answer, just say that you don't know, \
         don't try to make up an answer.\n\n{}\n\nQuestion: {}\nHelpful Answer:",
        context, question
    )
}

// ============================================================================
// QaChain
// ============================================================================

/// 생성된 답변 + 근거 청크
#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub text: String,
    pub sources: Vec<RetrievalHit>,
}

/// 검색 → 생성 체인
pub struct QaChain {
    retriever: Arc<Retriever>,
    generator: Arc<dyn AnswerGenerator>,
    k: usize,
}

impl QaChain {
    pub fn new(retriever: Arc<Retriever>, generator: Arc<dyn AnswerGenerator>) -> Self {
        let k = retriever.k();
        Self {
            retriever,
            generator,
            k,
        }
    }

    pub fn with_k(mut self, k: usize) -> Self {
        self.k = k;
        self
    }

    pub fn retriever(&self) -> &Retriever {
        &self.retriever
    }

    /// 질문에 답변
    pub async fn ask(&self, question: &str) -> Result<Answer> {
        let sources = self.retriever.retrieve(question, self.k).await?;
        let context = build_context(&sources);

        tracing::debug!(
            "Generating answer with {} ({} sources, {} context chars)",
            self.generator.model(),
            sources.len(),
            context.chars().count()
        );
        let text = self.generator.generate(&context, question).await?;

        Ok(Answer { text, sources })
    }
}
