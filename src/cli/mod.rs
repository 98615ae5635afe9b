//! CLI 모듈
//!
//! loan-rag CLI 명령어 정의 및 구현

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::answer::{has_api_key, OpenAiGenerator, QaChain};
use crate::config::RagConfig;
use crate::embedding::create_embedder;
use crate::knowledge::{
    get_data_dir, normalize_catalog, recursive_chunker, BuildPolicy, DistanceMetric,
    IndexBuilder, LoanCatalog, RetrievalHit, Retriever, VectorIndex,
};
use crate::scraper::ScrapeSession;

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Parser)]
#[command(name = "loan-rag")]
#[command(version, about = "은행 대출 상품 RAG 질의응답", long_about = None)]
pub struct Cli {
    /// 설정 파일 (JSON)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// 수집한 원본 카탈로그 정리
    Normalize {
        /// 원본 카탈로그 JSON
        #[arg(short, long)]
        input: PathBuf,

        /// 정리된 카탈로그 출력 경로
        #[arg(short, long)]
        output: PathBuf,
    },

    /// 카탈로그로 벡터 인덱스 빌드
    Build {
        /// 정리된 카탈로그 JSON
        #[arg(short, long)]
        input: PathBuf,

        /// 인덱스 저장 디렉토리
        #[arg(long)]
        index: Option<PathBuf>,

        /// 최대 청크 크기 (문자 수)
        #[arg(long)]
        max_len: Option<usize>,

        /// 청크 오버랩 (문자 수)
        #[arg(long)]
        overlap: Option<usize>,

        /// 거리 메트릭 (l2, cosine)
        #[arg(long)]
        metric: Option<DistanceMetric>,

        /// 잘못된 레코드 처리 (fail-fast, best-effort)
        #[arg(long)]
        policy: Option<BuildPolicy>,
    },

    /// 인덱스 검색
    Query {
        /// 검색 쿼리
        query: String,

        /// 결과 개수
        #[arg(short, long, value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..))]
        k: Option<usize>,

        /// JSON으로 출력
        #[arg(long)]
        json: bool,
    },

    /// 대화형 질의응답
    Chat {
        /// 답변에 사용할 청크 개수
        #[arg(short, long, value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..))]
        k: Option<usize>,
    },

    /// 상태 확인
    Status,

    /// 대출 상품 페이지 스크래핑
    Scrape {
        /// 스크랩할 URL (여러 개 가능)
        #[arg(short, long, required = true, num_args = 1..)]
        url: Vec<String>,

        /// 추출 결과 출력 경로
        #[arg(short, long)]
        output: PathBuf,

        /// 요청 간 대기 시간 (ms)
        #[arg(long, default_value = "3000")]
        delay_ms: u64,
    },
}

// ============================================================================
// CLI Runner
// ============================================================================

/// CLI 명령어 실행
pub async fn run(cli: Cli) -> Result<()> {
    let config = RagConfig::load(cli.config.as_deref()).context("설정 로드 실패")?;

    match cli.command {
        Commands::Normalize { input, output } => cmd_normalize(&input, &output),
        Commands::Build {
            input,
            index,
            max_len,
            overlap,
            metric,
            policy,
        } => {
            let mut config = config;
            if let Some(index) = index {
                config.index_path = Some(index);
            }
            if let Some(max_len) = max_len {
                config.chunk.max_characters = max_len;
            }
            if let Some(overlap) = overlap {
                config.chunk.overlap_characters = overlap;
            }
            if let Some(metric) = metric {
                config.retrieval.metric = metric;
            }
            if let Some(policy) = policy {
                config.build_policy = policy;
            }
            cmd_build(&input, &config).await
        }
        Commands::Query { query, k, json } => cmd_query(&query, k, json, &config).await,
        Commands::Chat { k } => cmd_chat(k, &config).await,
        Commands::Status => cmd_status(&config),
        Commands::Scrape {
            url,
            output,
            delay_ms,
        } => cmd_scrape(&url, &output, Duration::from_millis(delay_ms)).await,
    }
}

// ============================================================================
// Command Implementations
// ============================================================================

/// 정리 명령어 (normalize)
fn cmd_normalize(input: &Path, output: &Path) -> Result<()> {
    println!("[*] 카탈로그 정리 중: {}", input.display());

    let raw = std::fs::read_to_string(input)
        .with_context(|| format!("입력 파일 읽기 실패: {}", input.display()))?;
    let value: serde_json::Value =
        serde_json::from_str(&raw).context("입력 파일 JSON 파싱 실패")?;

    let catalog = normalize_catalog(&value).context("카탈로그 정리 실패")?;
    let records = catalog.records().context("카탈로그 구조 오류")?;

    write_json(output, &catalog)?;

    println!(
        "[OK] 정리 완료: 카테고리 {}, 상품 {}",
        catalog.loan_categories.len(),
        records.len()
    );
    println!("     출력: {}", output.display());
    Ok(())
}

/// 빌드 명령어 (build)
async fn cmd_build(input: &Path, config: &RagConfig) -> Result<()> {
    config.validate().context("잘못된 설정")?;

    let catalog = LoanCatalog::from_path(input)
        .with_context(|| format!("카탈로그 로드 실패: {}", input.display()))?;
    let records = catalog.records().context("카탈로그 구조 오류")?;

    println!("[*] 인덱스 빌드 중: 상품 {} 개", records.len());
    println!(
        "    청크: {} / 오버랩 {}, 메트릭: {}, 정책: {}",
        config.chunk.max_characters,
        config.chunk.overlap_characters,
        config.retrieval.metric,
        config.build_policy
    );

    let embedder = create_embedder(&config.embedding).context("임베딩 모델 초기화 실패")?;
    let chunker = recursive_chunker(config.chunk)?;

    let (index, report) = IndexBuilder::new(embedder, chunker)
        .with_metric(config.retrieval.metric)
        .with_policy(config.build_policy)
        .with_batching(config.embedding.batch_size, config.embedding.concurrency)
        .build(&records)
        .await
        .context("인덱스 빌드 실패")?;

    let index_path = config.index_path();
    index
        .save(&index_path)
        .with_context(|| format!("인덱스 저장 실패: {}", index_path.display()))?;

    println!(
        "[OK] 빌드 완료: 문서 {}, 청크 {}, 엔트리 {}",
        report.documents,
        report.chunks,
        report.entries
    );
    if !report.skipped.is_empty() {
        println!("[!] 건너뛴 레코드 {} 개:", report.skipped.len());
        for skipped in &report.skipped {
            println!("    {}[{}]: {}", skipped.category, skipped.position, skipped.reason);
        }
    }
    println!("     인덱스: {}", index_path.display());

    Ok(())
}

/// 검색 명령어 (query)
async fn cmd_query(query: &str, k: Option<usize>, json: bool, config: &RagConfig) -> Result<()> {
    let retriever = open_retriever(config)?;
    let k = k.unwrap_or(config.retrieval.k);

    if !json {
        println!("[*] 검색 중: \"{}\"", query);
    }

    let hits = retriever.retrieve(query, k).await.context("검색 실패")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&hits)?);
        return Ok(());
    }

    if hits.is_empty() {
        println!("\n[!] 검색 결과가 없습니다.");
        return Ok(());
    }

    println!("\n[OK] 검색 결과 ({} 건):\n", hits.len());
    print_hits(&hits);

    Ok(())
}

/// 대화 명령어 (chat)
///
/// `exit` 또는 `quit`으로 종료합니다. 질문 단위 오류는 출력하고 계속 진행합니다.
async fn cmd_chat(k: Option<usize>, config: &RagConfig) -> Result<()> {
    if !has_api_key() {
        bail!(
            "API 키가 설정되지 않았습니다.\n\
             설정: export OPENAI_API_KEY=your-key"
        );
    }

    let retriever = Arc::new(open_retriever(config)?);
    let generator = OpenAiGenerator::from_env(config.generation.clone())
        .context("답변 생성기 초기화 실패")?;
    let chain = QaChain::new(retriever, Arc::new(generator))
        .with_k(k.unwrap_or(config.retrieval.k));

    println!("[OK] 대출 상품 질의응답 준비 완료. 종료하려면 'exit'를 입력하세요.\n");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("You: ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let question = line.trim();
        if question.is_empty() {
            continue;
        }
        if matches!(question.to_lowercase().as_str(), "exit" | "quit") {
            break;
        }

        match chain.ask(question).await {
            Ok(answer) => {
                println!("\nAI: {}\n", answer.text);
                println!("[*] 출처:");
                for (i, source) in answer.sources.iter().enumerate() {
                    println!("  {}. {} ({})", i + 1, source.scheme, source.category);
                }
                println!("{}", "-".repeat(60));
            }
            Err(e) => println!("[!] 오류: {}", e),
        }
    }

    println!("[OK] 종료합니다.");
    Ok(())
}

/// 상태 명령어 (status)
fn cmd_status(config: &RagConfig) -> Result<()> {
    println!("loan-rag v{}", env!("CARGO_PKG_VERSION"));
    println!();

    println!("[*] 데이터 디렉토리: {}", get_data_dir().display());
    println!(
        "[*] 임베딩 모델: {} (차원 {})",
        config.embedding.model, config.embedding.dimension
    );

    let index_path = config.index_path();
    match VectorIndex::read_manifest(&index_path) {
        Ok(manifest) => {
            println!("[OK] 인덱스: {}", index_path.display());
            println!(
                "     엔트리 {} 개, 차원 {}, 메트릭 {}",
                manifest.count, manifest.dimension, manifest.metric
            );
            println!("     모델: {}", manifest.embedding_model);
            println!(
                "     생성: {}",
                manifest.created_at.format("%Y-%m-%d %H:%M")
            );
            if let Ok(size) = dir_size(&index_path) {
                println!("     크기: {}", format_bytes(size));
            }
            if manifest.embedding_model != config.embedding.model
                && !manifest.embedding_model.starts_with(&config.embedding.model)
            {
                println!("[!] 현재 설정된 임베딩 모델과 인덱스 모델이 다릅니다");
            }
        }
        Err(e) => {
            println!("[!] 인덱스: {}", e);
        }
    }

    if has_api_key() {
        println!("[OK] OpenAI API 키: 설정됨");
    } else {
        println!("[!] OpenAI API 키: 미설정");
        println!("    설정: export OPENAI_API_KEY=your-key");
    }

    Ok(())
}

/// 스크랩 명령어 (scrape)
async fn cmd_scrape(urls: &[String], output: &Path, delay: Duration) -> Result<()> {
    let mut session = ScrapeSession::open(delay).context("스크래핑 세션 생성 실패")?;
    let mut records = Vec::new();
    let mut error_count = 0;

    for (i, url) in urls.iter().enumerate() {
        print!("[{}/{}] {}... ", i + 1, urls.len(), url);
        std::io::stdout().flush()?;

        match session.records_for(url).await {
            Ok(page) => {
                println!("{} 건", page.len());
                records.extend(page);
            }
            Err(e) => {
                println!("실패: {}", e);
                error_count += 1;
            }
        }
    }

    write_json(output, &records)?;

    println!();
    println!(
        "[OK] 완료: 레코드 {}, 실패 {}",
        records.len(),
        error_count
    );
    println!("     출력: {}", output.display());
    Ok(())
}

// ============================================================================
// Helper Functions
// ============================================================================

/// 저장된 인덱스와 임베딩 모델로 검색기 생성
fn open_retriever(config: &RagConfig) -> Result<Retriever> {
    let index_path = config.index_path();
    let index = VectorIndex::load(&index_path)
        .with_context(|| format!("인덱스 로드 실패: {}", index_path.display()))?;
    let embedder = create_embedder(&config.embedding).context("임베딩 모델 초기화 실패")?;

    Ok(Retriever::new(embedder, index)
        .context("인덱스와 임베딩 모델이 맞지 않습니다")?
        .with_k(config.retrieval.k))
}

fn print_hits(hits: &[RetrievalHit]) {
    for (i, hit) in hits.iter().enumerate() {
        println!("{}. [거리: {:.4}] {}", i + 1, hit.score, hit.scheme);
        println!("   카테고리: {}", hit.category);
        println!("   URL: {}", hit.url);
        println!("   내용: {}", truncate_text(&hit.text, 200));
        println!();
    }
}

/// JSON 파일 쓰기 (상위 디렉토리 생성)
fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("디렉토리 생성 실패: {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(value)?;
    std::fs::write(path, json).with_context(|| format!("파일 쓰기 실패: {}", path.display()))?;
    Ok(())
}

/// 디렉토리 내 파일 크기 합
fn dir_size(path: &Path) -> std::io::Result<usize> {
    let mut total = 0;
    for entry in std::fs::read_dir(path)? {
        let metadata = entry?.metadata()?;
        if metadata.is_file() {
            total += metadata.len() as usize;
        }
    }
    Ok(total)
}

/// 텍스트 자르기 (UTF-8 안전)
fn truncate_text(text: &str, max_chars: usize) -> String {
    let cleaned = text.replace('\n', " ").replace('\r', "");
    let cleaned = cleaned.trim();

    if cleaned.chars().count() <= max_chars {
        cleaned.to_string()
    } else {
        let truncated: String = cleaned.chars().take(max_chars).collect();
        format!("{}...", truncated)
    }
}

/// 바이트 크기 포맷팅
fn format_bytes(bytes: usize) -> String {
    const KB: usize = 1024;
    const MB: usize = KB * 1024;

    if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

// ============================================================================
// Tests
// ============================================================================
