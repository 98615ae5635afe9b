//! 카탈로그 → 인덱스 → 검색 전체 흐름 테스트

use std::sync::Arc;

use loan_rag::{
    chunk_documents, default_chunker, flatten, BuildPolicy, DistanceMetric, EmbeddingProvider,
    HashEmbedding, IndexBuilder, LoanCatalog, RagError, Retriever, VectorIndex,
};

const CATALOG: &str = r#"{
    "bank_name": "Bank of Maharashtra",
    "data_collection_date": "2025-01-15",
    "loan_categories": {
        "home_loans": {
            "category_name": "Home Loans",
            "schemes": [
                {
                    "scheme_name": "Maha Super Housing Loan",
                    "url": "https://bankofmaharashtra.in/personal-banking/loans/home-loan",
                    "interest_rate": "8.35% onwards",
                    "max_tenure_years": 30,
                    "features": ["Low processing fee", "No prepayment penalty"]
                }
            ]
        },
        "vehicle_loans": {
            "category_name": "Vehicle Loans",
            "schemes": [
                {
                    "scheme_name": "Maha Car Loan",
                    "url": "https://bankofmaharashtra.in/personal-banking/loans/car-loan",
                    "interest_rate": "8.70% onwards",
                    "eligibility": {"min_age": 21, "income": "Regular income"}
                }
            ]
        }
    }
}"#;

const DIM: usize = 128;

fn embedder() -> Arc<HashEmbedding> {
    Arc::new(HashEmbedding::new(DIM))
}

async fn build(catalog: &LoanCatalog) -> VectorIndex {
    let records = catalog.records().unwrap();
    let (index, report) = IndexBuilder::new(embedder(), default_chunker())
        .build(&records)
        .await
        .unwrap();
    assert_eq!(report.documents, 2);
    assert!(report.skipped.is_empty());
    index
}

#[tokio::test]
async fn test_exact_text_query_ranks_its_scheme_first() {
    let catalog = LoanCatalog::from_json(CATALOG).unwrap();
    let documents = flatten(&catalog.records().unwrap()).unwrap();
    let index = build(&catalog).await;

    let retriever = Retriever::new(embedder(), index).unwrap();

    for doc in &documents {
        let hits = retriever.retrieve_default(&doc.text).await.unwrap();
        assert_eq!(hits[0].scheme, doc.metadata.scheme);
        assert_eq!(hits[0].category, doc.metadata.category);
        assert_eq!(hits[0].url, doc.metadata.url);
        assert!(hits[0].score < 1e-5, "distance was {}", hits[0].score);
    }
}

#[tokio::test]
async fn test_k_larger_than_index_returns_all() {
    let catalog = LoanCatalog::from_json(CATALOG).unwrap();
    let retriever = Retriever::new(embedder(), build(&catalog).await).unwrap();

    let hits = retriever.retrieve("home loan interest rate", 3).await.unwrap();
    assert_eq!(hits.len(), 2);
    assert!(hits[0].score <= hits[1].score);
}

#[tokio::test]
async fn test_saved_index_gives_identical_results() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("index");

    let catalog = LoanCatalog::from_json(CATALOG).unwrap();
    let index = build(&catalog).await;
    index.save(&path).unwrap();
    let loaded = VectorIndex::load(&path).unwrap();

    let query = embedder().embed("car loan eligibility age").await.unwrap();
    assert_eq!(index.search(&query, 2).unwrap(), loaded.search(&query, 2).unwrap());
    assert_eq!(loaded.embedding_model(), "hash-128");
    assert_eq!(loaded.metric(), DistanceMetric::L2);
}

#[tokio::test]
async fn test_chunks_carry_metadata_and_cover_text() {
    let catalog = LoanCatalog::from_json(CATALOG).unwrap();
    let documents = flatten(&catalog.records().unwrap()).unwrap();
    let chunks = chunk_documents(&documents, default_chunker().as_ref());

    // 800자 미만 문서는 청크 하나
    assert_eq!(chunks.len(), documents.len());
    for (chunk, doc) in chunks.iter().zip(&documents) {
        assert_eq!(chunk.text, doc.text);
        assert_eq!(chunk.metadata, doc.metadata);
        assert_eq!(chunk.index, 0);
    }

    assert!(documents[0].text.contains("features: [\"Low processing fee\",\"No prepayment penalty\"]"));
    assert!(documents[0].text.contains("max_tenure_years: 30"));
}

#[tokio::test]
async fn test_retriever_rejects_other_model() {
    let catalog = LoanCatalog::from_json(CATALOG).unwrap();
    let index = build(&catalog).await;

    let err = Retriever::new(Arc::new(HashEmbedding::new(64)), index)
        .err()
        .unwrap();
    assert!(matches!(err, RagError::ModelMismatch { .. }));
}

#[tokio::test]
async fn test_catalog_with_non_object_scheme() {
    let catalog = LoanCatalog::from_json(
        r#"{"loan_categories": {"home": {"schemes": [
            {"scheme_name": "Good", "url": "u"},
            "garbage-record"
        ]}}}"#,
    )
    .unwrap();
    let records = catalog.records().unwrap();

    let err = IndexBuilder::new(embedder(), default_chunker())
        .with_policy(BuildPolicy::FailFast)
        .build(&records)
        .await
        .unwrap_err();
    assert!(matches!(err, RagError::MalformedRecord { position: 1, .. }));

    let (index, report) = IndexBuilder::new(embedder(), default_chunker())
        .with_policy(BuildPolicy::BestEffort)
        .build(&records)
        .await
        .unwrap();
    assert_eq!(index.len(), 1);
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].category, "home");
    assert_eq!(report.skipped[0].position, 1);
}

#[test]
fn test_load_missing_index() {
    let dir = tempfile::tempdir().unwrap();
    let err = VectorIndex::load(&dir.path().join("nope")).unwrap_err();
    assert!(matches!(err, RagError::IndexNotFound(_)));
}
