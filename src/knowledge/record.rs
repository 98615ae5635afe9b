//! 대출 카탈로그 레코드 및 평탄화(Flatten)
//!
//! 카탈로그 JSON의 각 상품(scheme)을 `"key: value"` 줄들로 이어 붙인
//! 하나의 텍스트 문서로 변환합니다. 메타데이터(category, scheme, url)는
//! 이후 모든 청크와 인덱스 엔트리에 그대로 전달됩니다.

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{RagError, Result};

// ============================================================================
// Catalog
// ============================================================================

/// 대출 카탈로그 (정규화된 입력 파일)
///
/// JSON 키 순서가 유지되므로 카테고리/상품/속성은 파일 순서대로 처리됩니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoanCatalog {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bank_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_collection_date: Option<String>,
    /// category_key -> { category_name, schemes: [...] }
    pub loan_categories: Map<String, Value>,
}

/// 카테고리 항목
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoanCategory {
    #[serde(default)]
    pub category_name: Option<String>,
    /// 객체가 아닌 항목도 그대로 받아 레코드 단위로 검사
    #[serde(default)]
    pub schemes: Vec<Value>,
}

impl LoanCatalog {
    /// JSON 파일에서 카탈로그 로드
    pub fn from_path(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    /// JSON 문자열에서 카탈로그 파싱
    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw)
            .map_err(|e| RagError::Catalog(format!("invalid catalog JSON: {}", e)))
    }

    /// 모든 상품을 레코드 목록으로 펼침
    pub fn records(&self) -> Result<Vec<Record>> {
        let mut records = Vec::new();

        for (category_key, value) in &self.loan_categories {
            let category: LoanCategory = serde_json::from_value(value.clone()).map_err(|e| {
                RagError::Catalog(format!("category `{}` is malformed: {}", category_key, e))
            })?;

            // category_name이 없으면 키를 표시 이름으로 사용
            let category_name = category
                .category_name
                .clone()
                .unwrap_or_else(|| category_key.clone());

            for (position, fields) in category.schemes.into_iter().enumerate() {
                records.push(Record {
                    category_key: category_key.clone(),
                    category_name: category_name.clone(),
                    position,
                    fields,
                });
            }
        }

        Ok(records)
    }
}

// ============================================================================
// Record
// ============================================================================

/// 상품 레코드 (카테고리 내 하나의 scheme)
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub category_key: String,
    pub category_name: String,
    /// 카테고리 내 위치 (0-based, 에러 보고용)
    pub position: usize,
    /// 원본 scheme 항목 (정상이라면 scheme_name, url을 포함한 객체)
    pub fields: Value,
}

impl Record {
    pub fn scheme_name(&self) -> Option<&str> {
        self.fields.get("scheme_name").and_then(Value::as_str)
    }

    pub fn url(&self) -> Option<&str> {
        self.fields.get("url").and_then(Value::as_str)
    }

    fn missing(&self, field: &'static str) -> RagError {
        RagError::MissingField {
            category: self.category_key.clone(),
            position: self.position,
            field,
        }
    }
}

/// 문서 메타데이터 - 모든 파생 산출물에 그대로 복사됨
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub category: String,
    pub scheme: String,
    pub url: String,
}

/// 평탄화된 문서 (레코드당 하나)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlatDocument {
    pub text: String,
    pub metadata: DocumentMetadata,
}

// ============================================================================
// Flatten
// ============================================================================

/// 레코드 하나를 평탄화
///
/// 필터링 없이 모든 속성을 한 줄씩 기록합니다 (빈 문자열 포함).
pub fn flatten_record(record: &Record) -> Result<FlatDocument> {
    let Value::Object(fields) = &record.fields else {
        return Err(RagError::MalformedRecord {
            category: record.category_key.clone(),
            position: record.position,
            reason: format!("expected an object, got {}", json_kind(&record.fields)),
        });
    };

    let scheme = record
        .scheme_name()
        .ok_or_else(|| record.missing("scheme_name"))?;
    let url = record.url().ok_or_else(|| record.missing("url"))?;

    let text = fields
        .iter()
        .map(|(key, value)| format!("{}: {}", key, render_value(value)))
        .collect::<Vec<_>>()
        .join("\n");

    Ok(FlatDocument {
        text,
        metadata: DocumentMetadata {
            category: record.category_name.clone(),
            scheme: scheme.to_string(),
            url: url.to_string(),
        },
    })
}

/// 레코드 목록 평탄화 (첫 에러에서 중단)
pub fn flatten(records: &[Record]) -> Result<Vec<FlatDocument>> {
    records.iter().map(flatten_record).collect()
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}

/// 속성 값을 한 줄 텍스트로 렌더링
///
/// 문자열은 그대로, 리스트/맵은 compact JSON, 나머지 스칼라는 JSON 표기.
fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(fields: Value) -> Record {
        Record {
            category_key: "home_loans".to_string(),
            category_name: "Home Loans".to_string(),
            position: 0,
            fields,
        }
    }

    #[test]
    fn test_flatten_renders_lines_in_order() {
        let doc = flatten_record(&record(json!({
            "scheme_name": "Maha Super Housing Loan",
            "url": "https://bankofmaharashtra.in/home-loan",
            "interest_rate": "7.35%",
            "features": ["No prepayment charges", "Low processing fee"],
            "eligibility": {"age": "18-70"},
            "max_tenure_years": 30
        })))
        .unwrap();

        let lines: Vec<&str> = doc.text.lines().collect();
        assert_eq!(lines[0], "scheme_name: Maha Super Housing Loan");
        assert_eq!(lines[1], "url: https://bankofmaharashtra.in/home-loan");
        assert_eq!(lines[2], "interest_rate: 7.35%");
        assert_eq!(
            lines[3],
            r#"features: ["No prepayment charges","Low processing fee"]"#
        );
        assert_eq!(lines[4], r#"eligibility: {"age":"18-70"}"#);
        assert_eq!(lines[5], "max_tenure_years: 30");
    }

    #[test]
    fn test_flatten_metadata() {
        let doc = flatten_record(&record(json!({
            "scheme_name": "Gold Loan",
            "url": "https://bankofmaharashtra.in/gold-loan"
        })))
        .unwrap();

        assert_eq!(
            doc.metadata,
            DocumentMetadata {
                category: "Home Loans".to_string(),
                scheme: "Gold Loan".to_string(),
                url: "https://bankofmaharashtra.in/gold-loan".to_string(),
            }
        );
    }

    #[test]
    fn test_flatten_keeps_empty_attributes() {
        let doc = flatten_record(&record(json!({
            "scheme_name": "A",
            "url": "u",
            "notes": ""
        })))
        .unwrap();
        assert!(doc.text.ends_with("notes: "));
    }

    #[test]
    fn test_flatten_missing_url() {
        let err = flatten_record(&record(json!({"scheme_name": "A"}))).unwrap_err();
        assert!(matches!(
            err,
            RagError::MissingField { field: "url", .. }
        ));
    }

    #[test]
    fn test_flatten_missing_scheme_name() {
        let err = flatten(&[record(json!({"url": "u"}))]).unwrap_err();
        assert!(matches!(
            err,
            RagError::MissingField { field: "scheme_name", .. }
        ));
    }

    #[test]
    fn test_flatten_rejects_non_object_scheme() {
        let err = flatten_record(&record(json!("garbage-record"))).unwrap_err();
        assert!(matches!(err, RagError::MalformedRecord { position: 0, .. }));
        assert_eq!(
            err.to_string(),
            "record home_loans[0]: expected an object, got a string"
        );
    }

    #[test]
    fn test_catalog_keeps_non_object_scheme_as_record() {
        let catalog = LoanCatalog::from_json(
            r#"{"loan_categories": {"home": {"schemes": [
                {"scheme_name": "Good", "url": "u"},
                "garbage-record"
            ]}}}"#,
        )
        .unwrap();

        let records = catalog.records().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].scheme_name(), Some("Good"));
        assert_eq!(records[1].position, 1);
        assert_eq!(records[1].scheme_name(), None);
    }

    #[test]
    fn test_catalog_records_preserve_order() {
        let catalog = LoanCatalog::from_json(
            r#"{
                "bank_name": "Bank of Maharashtra",
                "loan_categories": {
                    "vehicle": {"category_name": "Vehicle Loans", "schemes": [
                        {"scheme_name": "Car Loan", "url": "c"},
                        {"scheme_name": "Two Wheeler", "url": "t"}
                    ]},
                    "education": {"schemes": [
                        {"scheme_name": "Education Loan", "url": "e"}
                    ]}
                }
            }"#,
        )
        .unwrap();

        let records = catalog.records().unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].scheme_name(), Some("Car Loan"));
        assert_eq!(records[1].position, 1);
        assert_eq!(records[2].category_key, "education");
        // category_name 누락 시 키 사용
        assert_eq!(records[2].category_name, "education");
    }

    #[test]
    fn test_catalog_rejects_malformed_category() {
        let catalog = LoanCatalog::from_json(
            r#"{"loan_categories": {"bad": {"schemes": "not a list"}}}"#,
        )
        .unwrap();
        assert!(matches!(catalog.records(), Err(RagError::Catalog(_))));
    }
}
