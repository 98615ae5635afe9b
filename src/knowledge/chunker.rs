//! Text Chunking Module
//!
//! 평탄화된 문서를 고정 크기 윈도우로 분할합니다.
//! 연속된 청크는 정확히 `overlap_characters` 만큼 겹치며,
//! 가능하면 문단/줄/문장/단어 경계에서 자릅니다.
//!
//! 단위는 문자(char, Unicode scalar value)입니다.

use crate::error::{RagError, Result};

use super::record::{DocumentMetadata, FlatDocument};

// ============================================================================
// Chunk Configuration
// ============================================================================

/// 청킹 설정
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ChunkConfig {
    /// 최대 청크 크기 (문자 수)
    pub max_characters: usize,
    /// 오버랩 크기 (문자 수)
    pub overlap_characters: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            max_characters: 800,
            overlap_characters: 100,
        }
    }
}

impl ChunkConfig {
    /// 설정 생성 (검증 포함)
    pub fn new(max_characters: usize, overlap_characters: usize) -> Result<Self> {
        let config = Self {
            max_characters,
            overlap_characters,
        };
        config.validate()?;
        Ok(config)
    }

    /// overlap < max, max > 0
    pub fn validate(&self) -> Result<()> {
        if self.max_characters == 0 {
            return Err(RagError::InvalidChunkConfig(
                "max_characters must be > 0".to_string(),
            ));
        }
        if self.overlap_characters >= self.max_characters {
            return Err(RagError::InvalidChunkConfig(format!(
                "overlap_characters ({}) must be smaller than max_characters ({})",
                self.overlap_characters, self.max_characters
            )));
        }
        Ok(())
    }
}

// ============================================================================
// Chunker Trait
// ============================================================================

/// 텍스트 청킹 전략 트레이트
pub trait Chunker: Send + Sync {
    /// 텍스트를 청크로 분할
    fn chunk(&self, text: &str) -> Vec<String>;

    /// 청커 이름
    fn name(&self) -> &'static str;
}

// ============================================================================
// RecursiveChunker
// ============================================================================

/// 경계 우선순위 청커
///
/// 윈도우 끝을 다음 순서로 찾습니다:
/// 1. 문단 경계 (`\n\n`)
/// 2. 줄 경계 (`\n`)
/// 3. 문장 끝 (`.`/`!`/`?` + 공백)
/// 4. 공백
/// 5. 없으면 `max_characters`에서 강제 분할
///
/// 다음 윈도우는 이전 윈도우 끝에서 `overlap_characters`만큼 앞에서
/// 시작하므로, 오버랩을 제거하고 이어 붙이면 원문이 복원됩니다.
pub struct RecursiveChunker {
    config: ChunkConfig,
}

/// 경계 판정: `end` 위치(배타적)에서 자르는 것이 해당 규칙에 맞는지
type BoundaryRule = fn(&[char], usize) -> bool;

const BOUNDARY_RULES: [BoundaryRule; 4] = [
    |chars, end| end >= 2 && chars[end - 2] == '\n' && chars[end - 1] == '\n',
    |chars, end| chars[end - 1] == '\n',
    |chars, end| {
        end >= 2 && matches!(chars[end - 2], '.' | '!' | '?') && chars[end - 1].is_whitespace()
    },
    |chars, end| chars[end - 1].is_whitespace(),
];

impl RecursiveChunker {
    /// 설정으로 생성
    pub fn new(config: ChunkConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// 기본 설정(800/100)으로 생성
    pub fn with_defaults() -> Self {
        Self {
            config: ChunkConfig::default(),
        }
    }

    pub fn config(&self) -> &ChunkConfig {
        &self.config
    }

    /// 윈도우 [start, start + max) 안에서 끝 위치 결정
    ///
    /// 최소 길이(윈도우 절반, 그리고 overlap + 1)보다 앞에서는 자르지 않습니다.
    fn find_end(&self, chars: &[char], start: usize) -> usize {
        let max = self.config.max_characters;
        let hard_end = start + max;
        let min_end = start + (max / 2).max(self.config.overlap_characters + 1);

        for rule in BOUNDARY_RULES {
            if let Some(end) = (min_end..=hard_end).rev().find(|&end| rule(chars, end)) {
                return end;
            }
        }

        hard_end
    }
}

impl Chunker for RecursiveChunker {
    fn chunk(&self, text: &str) -> Vec<String> {
        let chars: Vec<char> = text.chars().collect();
        let total = chars.len();

        if total == 0 {
            return vec![];
        }
        if total <= self.config.max_characters {
            return vec![text.to_string()];
        }

        let mut chunks = Vec::new();
        let mut start = 0;

        loop {
            if total - start <= self.config.max_characters {
                chunks.push(chars[start..].iter().collect());
                break;
            }

            let end = self.find_end(&chars, start);
            chunks.push(chars[start..end].iter().collect());
            start = end - self.config.overlap_characters;
        }

        chunks
    }

    fn name(&self) -> &'static str {
        "RecursiveChunker"
    }
}

// ============================================================================
// Document Chunking
// ============================================================================

/// 문서 청크 (부모 메타데이터 그대로 복사)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub text: String,
    pub metadata: DocumentMetadata,
    /// 부모 문서 내 순번 (0-based)
    pub index: usize,
}

/// 문서 목록을 청크로 분할
pub fn chunk_documents(docs: &[FlatDocument], chunker: &dyn Chunker) -> Vec<Chunk> {
    docs.iter()
        .flat_map(|doc| {
            chunker
                .chunk(&doc.text)
                .into_iter()
                .enumerate()
                .map(|(index, text)| Chunk {
                    text,
                    metadata: doc.metadata.clone(),
                    index,
                })
        })
        .collect()
}

// ============================================================================
// Factory Functions
// ============================================================================

/// 기본 청커 생성
pub fn default_chunker() -> Box<dyn Chunker> {
    Box::new(RecursiveChunker::with_defaults())
}

/// 설정 지정 청커 생성
pub fn recursive_chunker(config: ChunkConfig) -> Result<Box<dyn Chunker>> {
    Ok(Box::new(RecursiveChunker::new(config)?))
}

// ============================================================================
// Tests
// ============================================================================
