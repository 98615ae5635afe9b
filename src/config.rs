//! 설정 - JSON 파일 + 환경변수
//!
//! 우선순위 (높은 순):
//! 1. CLI 플래그 (cli 모듈에서 적용)
//! 2. 환경변수 `LOANRAG_EMBED_MODEL`, `LOANRAG_EMBED_URL`, `LOANRAG_INDEX_PATH`
//! 3. 설정 파일 (`--config` 또는 `<data_dir>/loan-rag.json`)
//! 4. 기본값

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::answer::GenerationSettings;
use crate::embedding::EmbeddingSettings;
use crate::error::{RagError, Result};
use crate::knowledge::{
    default_index_path, get_data_dir, BuildPolicy, ChunkConfig, DistanceMetric, DEFAULT_TOP_K,
};

/// 기본 설정 파일 이름 (데이터 디렉토리 내)
pub const CONFIG_FILE: &str = "loan-rag.json";

/// 검색 설정
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalSettings {
    pub k: usize,
    /// 새로 빌드하는 인덱스의 거리 메트릭
    pub metric: DistanceMetric,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            k: DEFAULT_TOP_K,
            metric: DistanceMetric::default(),
        }
    }
}

/// 전체 설정
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RagConfig {
    pub embedding: EmbeddingSettings,
    pub chunk: ChunkConfig,
    pub retrieval: RetrievalSettings,
    /// 인덱스 디렉토리 (없으면 `<data_dir>/index`)
    pub index_path: Option<PathBuf>,
    pub build_policy: BuildPolicy,
    pub generation: GenerationSettings,
}

impl RagConfig {
    /// 설정 로드
    ///
    /// `path`가 주어지면 그 파일을 반드시 읽고, 없으면 데이터 디렉토리의
    /// `loan-rag.json`을 (있을 때만) 읽습니다. 이후 환경변수를 적용하고 검증합니다.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let default_path = get_data_dir().join(CONFIG_FILE);
                if default_path.exists() {
                    Self::from_file(&default_path)?
                } else {
                    Self::default()
                }
            }
        };

        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// JSON 파일에서 설정 읽기
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            RagError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        let config = serde_json::from_str(&raw)
            .map_err(|e| RagError::Config(format!("invalid config {}: {}", path.display(), e)))?;

        tracing::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// 환경변수 적용 (빈 값은 무시)
    pub fn apply_overrides<F>(&mut self, var: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| var(key).filter(|v| !v.is_empty());

        if let Some(model) = var("LOANRAG_EMBED_MODEL") {
            self.embedding.model = model;
        }
        if let Some(endpoint) = var("LOANRAG_EMBED_URL") {
            self.embedding.endpoint = Some(endpoint);
        }
        if let Some(path) = var("LOANRAG_INDEX_PATH") {
            self.index_path = Some(PathBuf::from(path));
        }
    }

    /// 설정 검증
    pub fn validate(&self) -> Result<()> {
        self.chunk.validate()?;

        if self.retrieval.k == 0 {
            return Err(RagError::Config("retrieval.k must be > 0".to_string()));
        }
        if self.embedding.dimension == 0 {
            return Err(RagError::Config(
                "embedding.dimension must be > 0".to_string(),
            ));
        }
        if self.embedding.batch_size == 0 || self.embedding.concurrency == 0 {
            return Err(RagError::Config(
                "embedding.batch_size and embedding.concurrency must be > 0".to_string(),
            ));
        }
        if !(0.0..=2.0).contains(&self.generation.temperature) {
            return Err(RagError::Config(format!(
                "generation.temperature must be within 0.0..=2.0 (got {})",
                self.generation.temperature
            )));
        }
        Ok(())
    }

    /// 인덱스 경로 (설정값 또는 기본값)
    pub fn index_path(&self) -> PathBuf {
        self.index_path.clone().unwrap_or_else(default_index_path)
    }
}
