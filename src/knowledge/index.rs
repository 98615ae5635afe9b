//! Vector Index - 정확한(exact) 최근접 이웃 검색 + 영속화
//!
//! 모든 엔트리와 거리를 계산하는 brute-force 검색입니다.
//! 근사 검색이 아니므로 같은 인덱스/같은 쿼리에 대해 항상 같은 순위를 반환합니다.
//!
//! 저장 형식 (디렉토리):
//! - `index.json`   : 매니페스트 (포맷, 버전, 차원, 개수, 메트릭, 모델, 체크섬)
//! - `entries.json` : 청크 텍스트 + 메타데이터 + 벡터(base64, f32 little-endian)

use std::fs;
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{RagError, Result};

use super::record::DocumentMetadata;
use super::vector::DistanceMetric;

const MANIFEST_FILE: &str = "index.json";
const ENTRIES_FILE: &str = "entries.json";
const FORMAT_TAG: &str = "loan-rag-index";
const FORMAT_VERSION: u32 = 1;

// ============================================================================
// Types
// ============================================================================

/// 인덱스 엔트리 (벡터, 청크 텍스트, 메타데이터)
#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry {
    pub vector: Vec<f32>,
    pub text: String,
    pub metadata: DocumentMetadata,
}

/// 검색 결과 (거리가 작을수록 가까움)
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub text: String,
    pub metadata: DocumentMetadata,
    pub distance: f32,
}

/// 저장된 인덱스 매니페스트
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexManifest {
    pub format: String,
    pub version: u32,
    pub dimension: usize,
    pub count: usize,
    pub metric: DistanceMetric,
    pub embedding_model: String,
    pub created_at: DateTime<Utc>,
    pub entries_sha256: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredEntry {
    text: String,
    metadata: DocumentMetadata,
    vector: String,
}

// ============================================================================
// VectorIndex
// ============================================================================

/// 벡터 인덱스
///
/// build/load 이후 읽기 전용이므로 여러 스레드에서 동시에 검색해도 됩니다.
#[derive(Debug, Clone)]
pub struct VectorIndex {
    dimension: usize,
    metric: DistanceMetric,
    embedding_model: String,
    created_at: DateTime<Utc>,
    entries: Vec<IndexEntry>,
}

impl VectorIndex {
    /// 엔트리 전체로 인덱스 생성 (배치 빌드)
    ///
    /// 모든 벡터는 `dimension` 차원의 유한한 값이어야 합니다.
    pub fn build(
        dimension: usize,
        metric: DistanceMetric,
        embedding_model: impl Into<String>,
        entries: Vec<IndexEntry>,
    ) -> Result<Self> {
        if dimension == 0 {
            return Err(RagError::Config("index dimension must be > 0".to_string()));
        }

        for entry in &entries {
            check_vector(&entry.vector, dimension)?;
        }

        let index = Self {
            dimension,
            metric,
            embedding_model: embedding_model.into(),
            created_at: Utc::now(),
            entries,
        };

        tracing::info!(
            "Built vector index: {} entries (dim={}, metric={}, model={})",
            index.entries.len(),
            index.dimension,
            index.metric,
            index.embedding_model
        );

        Ok(index)
    }

    /// k-최근접 이웃 검색
    ///
    /// 거리 오름차순, 같은 거리는 삽입 순서로 정렬합니다.
    /// `k`가 엔트리 수보다 크면 전체를 반환합니다.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>> {
        check_vector(query, self.dimension)?;

        let mut scored: Vec<(usize, f32)> = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, entry)| (i, self.metric.distance(query, &entry.vector)))
            .collect();

        scored.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(i, distance)| {
                let entry = &self.entries[i];
                SearchHit {
                    text: entry.text.clone(),
                    metadata: entry.metadata.clone(),
                    distance,
                }
            })
            .collect())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn metric(&self) -> DistanceMetric {
        self.metric
    }

    /// 인덱스를 만든 임베딩 모델 ID
    pub fn embedding_model(&self) -> &str {
        &self.embedding_model
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    // ========================================================================
    // Persistence
    // ========================================================================

    /// 디렉토리에 인덱스 저장
    ///
    /// 엔트리 파일을 먼저 쓰고 매니페스트를 마지막에 씁니다.
    pub fn save(&self, path: &Path) -> Result<()> {
        fs::create_dir_all(path)?;

        let stored: Vec<StoredEntry> = self
            .entries
            .iter()
            .map(|entry| StoredEntry {
                text: entry.text.clone(),
                metadata: entry.metadata.clone(),
                vector: encode_vector(&entry.vector),
            })
            .collect();

        let entries_bytes = serde_json::to_vec(&stored)?;

        let manifest = IndexManifest {
            format: FORMAT_TAG.to_string(),
            version: FORMAT_VERSION,
            dimension: self.dimension,
            count: self.entries.len(),
            metric: self.metric,
            embedding_model: self.embedding_model.clone(),
            created_at: self.created_at,
            entries_sha256: sha256_hex(&entries_bytes),
        };

        write_atomic(&path.join(ENTRIES_FILE), &entries_bytes)?;
        write_atomic(&path.join(MANIFEST_FILE), &serde_json::to_vec_pretty(&manifest)?)?;

        tracing::info!(
            "Saved vector index to {:?} ({} entries)",
            path,
            manifest.count
        );
        Ok(())
    }

    /// 디렉토리에서 인덱스 로드
    ///
    /// 매니페스트가 없으면 `IndexNotFound`, 내용이 잘못되었으면 `IndexCorrupt`.
    pub fn load(path: &Path) -> Result<Self> {
        let manifest = Self::read_manifest(path)?;
        let corrupt = |reason: String| corrupt_at(path, reason);

        let entries_bytes = fs::read(path.join(ENTRIES_FILE))
            .map_err(|e| corrupt(format!("cannot read {}: {}", ENTRIES_FILE, e)))?;

        if sha256_hex(&entries_bytes) != manifest.entries_sha256 {
            return Err(corrupt("entries checksum mismatch".to_string()));
        }

        let stored: Vec<StoredEntry> = serde_json::from_slice(&entries_bytes)
            .map_err(|e| corrupt(format!("unreadable entries: {}", e)))?;

        if stored.len() != manifest.count {
            return Err(corrupt(format!(
                "manifest declares {} entries, found {}",
                manifest.count,
                stored.len()
            )));
        }

        let entries = stored
            .into_iter()
            .enumerate()
            .map(|(i, entry)| -> Result<IndexEntry> {
                let vector = decode_vector(&entry.vector, manifest.dimension)
                    .map_err(|reason| corrupt(format!("entry {}: {}", i, reason)))?;
                Ok(IndexEntry {
                    vector,
                    text: entry.text,
                    metadata: entry.metadata,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        tracing::info!(
            "Loaded vector index from {:?} ({} entries, dim={})",
            path,
            entries.len(),
            manifest.dimension
        );

        Ok(Self {
            dimension: manifest.dimension,
            metric: manifest.metric,
            embedding_model: manifest.embedding_model,
            created_at: manifest.created_at,
            entries,
        })
    }

    /// 매니페스트만 읽기 (status 표시용)
    pub fn read_manifest(path: &Path) -> Result<IndexManifest> {
        let manifest_path = path.join(MANIFEST_FILE);
        if !manifest_path.is_file() {
            return Err(RagError::IndexNotFound(path.to_path_buf()));
        }

        let raw = fs::read(&manifest_path)
            .map_err(|e| corrupt_at(path, format!("cannot read manifest: {}", e)))?;
        let manifest: IndexManifest = serde_json::from_slice(&raw)
            .map_err(|e| corrupt_at(path, format!("unreadable manifest: {}", e)))?;

        if manifest.format != FORMAT_TAG || manifest.version != FORMAT_VERSION {
            return Err(corrupt_at(
                path,
                format!(
                    "unsupported format {} v{} (expected {} v{})",
                    manifest.format, manifest.version, FORMAT_TAG, FORMAT_VERSION
                ),
            ));
        }
        if manifest.dimension == 0 {
            return Err(corrupt_at(path, "dimension is 0".to_string()));
        }

        Ok(manifest)
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// 차원 및 유한값 검증 (잘라내거나 채우지 않음)
fn check_vector(vector: &[f32], dimension: usize) -> Result<()> {
    if vector.len() != dimension {
        return Err(RagError::DimensionMismatch {
            expected: dimension,
            actual: vector.len(),
        });
    }
    if vector.iter().any(|v| !v.is_finite()) {
        return Err(RagError::InvalidVector(
            "vector contains NaN or infinite values".to_string(),
        ));
    }
    Ok(())
}

fn corrupt_at(path: &Path, reason: String) -> RagError {
    RagError::IndexCorrupt {
        path: path.to_path_buf(),
        reason,
    }
}

fn encode_vector(vector: &[f32]) -> String {
    let bytes: Vec<u8> = vector.iter().flat_map(|v| v.to_le_bytes()).collect();
    BASE64.encode(bytes)
}

fn decode_vector(encoded: &str, dimension: usize) -> std::result::Result<Vec<f32>, String> {
    let expected = dimension
        .checked_mul(4)
        .ok_or_else(|| format!("dimension {} is too large", dimension))?;
    let bytes = BASE64.decode(encoded).map_err(|e| e.to_string())?;
    if bytes.len() != expected {
        return Err(format!(
            "vector has {} bytes, expected {}",
            bytes.len(),
            expected
        ));
    }

    let vector: Vec<f32> = bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect();

    if vector.iter().any(|v| !v.is_finite()) {
        return Err("vector contains NaN or infinite values".to_string());
    }
    Ok(vector)
}

fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// 임시 파일에 쓴 뒤 rename
fn write_atomic(target: &Path, bytes: &[u8]) -> Result<()> {
    let mut tmp = PathBuf::from(target);
    tmp.set_extension("json.tmp");
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, target)?;
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
