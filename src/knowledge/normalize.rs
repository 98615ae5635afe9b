//! 카탈로그 정규화 - 수집한 원본 JSON 정리
//!
//! 공백 정리, 스마트 따옴표 치환, 비어 있는 값 제거를 수행하고
//! 필수 키(url, scheme_name)와 카테고리 정보에 기본값을 채웁니다.

use serde_json::{Map, Value};

use crate::error::{RagError, Result};

use super::record::LoanCatalog;

const DEFAULT_URL: &str = "No URL provided";
const DEFAULT_SCHEME_NAME: &str = "Unnamed Scheme";
const DEFAULT_BANK_NAME: &str = "Unknown Bank";
const DEFAULT_COLLECTION_DATE: &str = "Unknown Date";
const DEFAULT_CATEGORY_NAME: &str = "Unnamed Category";

/// 텍스트 정리 (연속 공백 → 공백 하나, 앞뒤 trim, 스마트 따옴표 → ASCII)
pub fn clean_text(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .replace('\u{2019}', "'")
        .replace('\u{201c}', "\"")
        .replace('\u{201d}', "\"")
}

/// 문자열 값만 정리하고 나머지는 그대로 둠
fn clean_value(value: Value) -> Value {
    match value {
        Value::String(s) => Value::String(clean_text(&s)),
        other => other,
    }
}

/// 빈 문자열, null, false, 0, 빈 리스트/맵
fn is_falsy(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
    }
}

/// 상품 하나 정리
///
/// 리스트 항목과 맵 값 중 비어 있는 것은 제거합니다.
/// 최상위 속성은 값이 비어 있어도 유지됩니다.
pub fn normalize_scheme(scheme: &Map<String, Value>) -> Map<String, Value> {
    let mut cleaned = Map::with_capacity(scheme.len() + 2);

    for (key, value) in scheme {
        let value = match value {
            Value::String(s) => Value::String(clean_text(s)),
            Value::Array(items) => Value::Array(
                items
                    .iter()
                    .filter(|item| !is_falsy(item))
                    .cloned()
                    .map(clean_value)
                    .collect(),
            ),
            Value::Object(map) => Value::Object(
                map.iter()
                    .filter(|(_, v)| !is_falsy(v))
                    .map(|(k, v)| (k.clone(), clean_value(v.clone())))
                    .collect(),
            ),
            other => other.clone(),
        };
        cleaned.insert(key.clone(), value);
    }

    if !cleaned.contains_key("url") {
        cleaned.insert("url".to_string(), Value::from(DEFAULT_URL));
    }
    if !cleaned.contains_key("scheme_name") {
        cleaned.insert("scheme_name".to_string(), Value::from(DEFAULT_SCHEME_NAME));
    }

    cleaned
}

/// 원본 카탈로그 정규화
///
/// `loan_categories`가 없거나 객체가 아니면 `Catalog` 에러입니다.
pub fn normalize_catalog(raw: &Value) -> Result<LoanCatalog> {
    let root = raw
        .as_object()
        .ok_or_else(|| RagError::Catalog("catalog root must be a JSON object".to_string()))?;

    let categories = root
        .get("loan_categories")
        .ok_or_else(|| RagError::Catalog("`loan_categories` key not found".to_string()))?
        .as_object()
        .ok_or_else(|| RagError::Catalog("`loan_categories` must be an object".to_string()))?;

    let text_or = |key: &str, default: &str| {
        root.get(key)
            .and_then(Value::as_str)
            .unwrap_or(default)
            .to_string()
    };

    let mut loan_categories = Map::with_capacity(categories.len());
    let mut scheme_count = 0;

    for (category_key, category) in categories {
        let category = category.as_object().ok_or_else(|| {
            RagError::Catalog(format!("category `{}` must be an object", category_key))
        })?;

        let category_name = category
            .get("category_name")
            .and_then(Value::as_str)
            .unwrap_or(DEFAULT_CATEGORY_NAME);

        let schemes: Vec<Value> = match category.get("schemes") {
            None => Vec::new(),
            Some(Value::Array(items)) => items
                .iter()
                .enumerate()
                .map(|(position, item)| {
                    item.as_object()
                        .map(|scheme| Value::Object(normalize_scheme(scheme)))
                        .ok_or_else(|| {
                            RagError::Catalog(format!(
                                "scheme {}[{}] must be an object",
                                category_key, position
                            ))
                        })
                })
                .collect::<Result<_>>()?,
            Some(_) => {
                return Err(RagError::Catalog(format!(
                    "`schemes` of category `{}` must be a list",
                    category_key
                )))
            }
        };
        scheme_count += schemes.len();

        let mut clean_category = Map::new();
        clean_category.insert("category_name".to_string(), Value::from(category_name));
        clean_category.insert("schemes".to_string(), Value::Array(schemes));
        loan_categories.insert(category_key.clone(), Value::Object(clean_category));
    }

    tracing::info!(
        "Normalized catalog: {} categories, {} schemes",
        loan_categories.len(),
        scheme_count
    );

    Ok(LoanCatalog {
        bank_name: Some(text_or("bank_name", DEFAULT_BANK_NAME)),
        data_collection_date: Some(text_or("data_collection_date", DEFAULT_COLLECTION_DATE)),
        loan_categories,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn as_map(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_clean_text() {
        assert_eq!(clean_text("  Home \n\t loan  "), "Home loan");
        assert_eq!(
            clean_text("Borrower\u{2019}s \u{201c}best\u{201d} rate"),
            "Borrower's \"best\" rate"
        );
        assert_eq!(clean_text(""), "");
    }

    #[test]
    fn test_clean_text_collapses_mixed_whitespace() {
        assert_eq!(clean_text("\r\n Gold\u{a0}\u{a0}Loan\t\t9%\n"), "Gold Loan 9%");
        assert_eq!(clean_text(" \n\t "), "");
    }

    #[test]
    fn test_normalize_scheme_drops_empty_items() {
        let scheme = as_map(json!({
            "scheme_name": "  Maha Super   Home Loan ",
            "url": "https://example.com/home",
            "features": ["Low   rate", "", null, "No prepayment  penalty"],
            "charges": {"processing": " 0.25% ", "legal": "", "valuation": null},
            "max_tenure_years": 30
        }));

        let cleaned = normalize_scheme(&scheme);
        assert_eq!(cleaned["scheme_name"], "Maha Super Home Loan");
        assert_eq!(
            cleaned["features"],
            json!(["Low rate", "No prepayment penalty"])
        );
        assert_eq!(cleaned["charges"], json!({"processing": "0.25%"}));
        assert_eq!(cleaned["max_tenure_years"], 30);
    }

    #[test]
    fn test_normalize_scheme_keeps_empty_top_level() {
        let scheme = as_map(json!({"scheme_name": "A", "url": "u", "eligibility": ""}));
        let cleaned = normalize_scheme(&scheme);
        assert_eq!(cleaned["eligibility"], "");
    }

    #[test]
    fn test_normalize_scheme_defaults() {
        let cleaned = normalize_scheme(&as_map(json!({"interest_rate": "8.5%"})));
        assert_eq!(cleaned["url"], DEFAULT_URL);
        assert_eq!(cleaned["scheme_name"], DEFAULT_SCHEME_NAME);

        // 기존 속성 순서 유지, 기본값은 뒤에 추가
        let keys: Vec<&String> = cleaned.keys().collect();
        assert_eq!(keys, vec!["interest_rate", "url", "scheme_name"]);
    }

    #[test]
    fn test_normalize_catalog() {
        let raw = json!({
            "loan_categories": {
                "home_loans": {
                    "category_name": "Home Loans",
                    "schemes": [{"scheme_name": "Home  Plus", "url": "u1"}]
                },
                "misc": {}
            }
        });

        let catalog = normalize_catalog(&raw).unwrap();
        assert_eq!(catalog.bank_name.as_deref(), Some(DEFAULT_BANK_NAME));
        assert_eq!(
            catalog.data_collection_date.as_deref(),
            Some(DEFAULT_COLLECTION_DATE)
        );
        assert_eq!(
            catalog.loan_categories["misc"],
            json!({"category_name": DEFAULT_CATEGORY_NAME, "schemes": []})
        );

        let records = catalog.records().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].scheme_name(), Some("Home Plus"));
        assert_eq!(records[0].category_name, "Home Loans");
    }

    #[test]
    fn test_normalize_catalog_requires_categories() {
        let err = normalize_catalog(&json!({"bank_name": "Bank"})).unwrap_err();
        assert!(matches!(err, RagError::Catalog(_)));
    }
}
