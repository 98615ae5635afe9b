//! 웹 스크래퍼 모듈 - 대출 상품 페이지에서 표/문단 추출
//!
//! `ScrapeSession`이 HTTP 클라이언트를 소유하며 세션이 drop되면 닫힙니다.
//! 추출 결과(`PageRecord`)는 사람이 검토한 뒤 `normalize` 단계로 넘깁니다.
//! 탭 클릭 같은 브라우저 자동화는 하지 않고 정적 HTML만 읽습니다.

use std::time::Duration;

use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::time::Instant;

use crate::error::{RagError, Result};
use crate::knowledge::clean_text;

/// 이보다 짧은 문단/목록 항목은 버림 (문자 수)
const MIN_TEXT_CHARS: usize = 20;

/// 제목 태그가 없을 때의 탭 이름
pub const FULL_PAGE_TAB: &str = "Full Page";

// ============================================================================
// Types
// ============================================================================

/// 페이지에서 추출한 레코드 하나
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageRecord {
    pub loan_name: String,
    pub tab_name: String,
    #[serde(flatten)]
    pub content: PageContent,
}

/// 레코드 본문 (문단 텍스트 또는 표)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PageContent {
    Text { text: String },
    Table { table_data: Vec<Map<String, Value>> },
}

// ============================================================================
// ScrapeSession
// ============================================================================

/// 스크래핑 세션
pub struct ScrapeSession {
    client: reqwest::Client,
    delay: Duration,
    last_fetch: Option<Instant>,
}

impl ScrapeSession {
    /// 세션 열기
    ///
    /// # Arguments
    /// * `delay` - 연속 요청 사이 최소 대기 시간
    pub fn open(delay: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("loan-rag/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| RagError::Scrape(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            delay,
            last_fetch: None,
        })
    }

    /// URL 페이지의 레코드 추출
    pub async fn records_for(&mut self, url: &str) -> Result<Vec<PageRecord>> {
        let parsed = url::Url::parse(url)
            .map_err(|e| RagError::Scrape(format!("invalid URL `{}`: {}", url, e)))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(RagError::Scrape(format!(
                "unsupported URL scheme `{}`: {}",
                parsed.scheme(),
                url
            )));
        }

        if let Some(last) = self.last_fetch {
            let elapsed = last.elapsed();
            if elapsed < self.delay {
                tokio::time::sleep(self.delay - elapsed).await;
            }
        }

        tracing::info!("Scraping: {}", url);
        let response = self.client.get(parsed).send().await;
        self.last_fetch = Some(Instant::now());

        let response = response
            .map_err(|e| RagError::Scrape(format!("request to {} failed: {}", url, e)))?;
        let status = response.status();
        if !status.is_success() {
            return Err(RagError::Scrape(format!("{} returned {}", url, status)));
        }

        let html = response
            .text()
            .await
            .map_err(|e| RagError::Scrape(format!("failed to read body of {}: {}", url, e)))?;

        let records = extract_records(&html);
        tracing::info!("Extracted {} records from {}", records.len(), url);
        Ok(records)
    }
}

// ============================================================================
// Extraction
// ============================================================================

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| RagError::Scrape(format!("bad selector `{}`: {}", css, e)))
}

/// HTML에서 레코드 추출
///
/// 문서 순서대로 훑으며 가장 가까운 앞쪽 제목(h2~h4)을 탭 이름으로 사용합니다.
pub fn extract_records(html: &str) -> Vec<PageRecord> {
    let document = Html::parse_document(html);
    let loan_name = extract_title(&document).unwrap_or_else(|| "Unknown Loan".to_string());

    let Ok(walker) = selector("h2, h3, h4, table, p, li") else {
        return Vec::new();
    };

    let mut tab_name = FULL_PAGE_TAB.to_string();
    let mut records = Vec::new();

    for element in document.select(&walker) {
        match element.value().name() {
            "h2" | "h3" | "h4" => {
                let heading = element_text(&element);
                if !heading.is_empty() {
                    tab_name = heading;
                }
            }
            "table" => {
                let rows = extract_table(&element);
                if !rows.is_empty() {
                    records.push(PageRecord {
                        loan_name: loan_name.clone(),
                        tab_name: tab_name.clone(),
                        content: PageContent::Table { table_data: rows },
                    });
                }
            }
            _ => {
                let text = element_text(&element);
                if text.chars().count() > MIN_TEXT_CHARS {
                    records.push(PageRecord {
                        loan_name: loan_name.clone(),
                        tab_name: tab_name.clone(),
                        content: PageContent::Text { text },
                    });
                }
            }
        }
    }

    records
}

/// 제목 추출 (`<title>` → `<h1>`)
fn extract_title(document: &Html) -> Option<String> {
    for css in ["title", "h1"] {
        if let Ok(title_selector) = Selector::parse(css) {
            if let Some(element) = document.select(&title_selector).next() {
                let title = element_text(&element);
                if !title.is_empty() {
                    return Some(title);
                }
            }
        }
    }

    None
}

/// 표를 행 맵 목록으로 변환
///
/// 헤더는 `<th>`가 있는 첫 행에서 읽고, 없으면 열 번호("0", "1", ...)를 사용합니다.
fn extract_table(table: &ElementRef) -> Vec<Map<String, Value>> {
    let (Ok(row_sel), Ok(th_sel), Ok(td_sel)) = (selector("tr"), selector("th"), selector("td"))
    else {
        return Vec::new();
    };

    let mut headers: Vec<String> = Vec::new();
    let mut rows = Vec::new();

    for row in table.select(&row_sel) {
        let cells: Vec<String> = row.select(&td_sel).map(|c| element_text(&c)).collect();

        if cells.is_empty() {
            if headers.is_empty() {
                headers = row.select(&th_sel).map(|c| element_text(&c)).collect();
            }
            continue;
        }

        // th + td가 섞인 행은 th를 첫 열로 취급
        let leading: Vec<String> = row.select(&th_sel).map(|c| element_text(&c)).collect();
        let values = leading.into_iter().chain(cells);

        let map: Map<String, Value> = values
            .enumerate()
            .map(|(i, value)| {
                let key = headers
                    .get(i)
                    .filter(|h| !h.is_empty())
                    .cloned()
                    .unwrap_or_else(|| i.to_string());
                (key, Value::String(value))
            })
            .collect();
        rows.push(map);
    }

    rows
}

/// 요소 텍스트 (공백 정리)
fn element_text(element: &ElementRef) -> String {
    let joined = element
        .text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    clean_text(&joined)
}
