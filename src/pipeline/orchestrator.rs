use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::error::AppError;
use crate::llm::LlmClient;
use crate::search::SearchProvider;

use super::publish::{ReportTimestamp, publish};
use super::synthesize::CompanyReport;
use super::{fetch, synthesize};

#[derive(Debug, Clone, Deserialize)]
pub struct ReportRequest {
    pub company: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct GeneratedReport {
    pub id: i64,
    pub company: String,
    pub pdf_path: String,
    pub created_at: String,
    pub report: CompanyReport,
}

#[tracing::instrument(
    name = "pipeline report",
    skip(pool, search, llm_client),
    fields(
        report.id,
        report.company = %request.company,
        report.duration_ms,
    )
)]
pub async fn generate_report(
    pool: &SqlitePool,
    search: &dyn SearchProvider,
    llm_client: &LlmClient,
    model: &str,
    max_tokens: u32,
    reports_dir: &str,
    request: &ReportRequest,
) -> Result<GeneratedReport, AppError> {
    let start = std::time::Instant::now();

    // One timestamp per request; every formatted variant derives from it.
    let timestamp = ReportTimestamp::now();

    // Stage 1: fetch the five facet texts (failures degrade to empty).
    let facets = fetch::fetch_facets(search, &request.company).await;

    // Stage 2: synthesize the structured report (failures propagate).
    let report = synthesize::synthesize(llm_client, model, max_tokens, &facets).await?;

    // Stage 3: publish the PDF and the history row.
    let published = publish(pool, reports_dir, &request.company, &report, &timestamp).await?;

    let duration_ms = start.elapsed().as_millis() as u64;
    let span = tracing::Span::current();
    span.record("report.id", published.id);
    span.record("report.duration_ms", duration_ms);

    Ok(GeneratedReport {
        id: published.id,
        company: request.company.clone(),
        pdf_path: published.pdf_path,
        created_at: published.created_at,
        report,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_pool;
    use crate::db::reports::list_reports;
    use crate::llm::{GenerateRequest, GenerateResponse, Provider};
    use crate::search::{SearchDepth, SearchResponse, SearchResult};
    use std::path::Path;
    use std::sync::Arc;

    struct OverviewOnlySearch;

    #[async_trait::async_trait]
    impl SearchProvider for OverviewOnlySearch {
        async fn search(
            &self,
            query: &str,
            _depth: SearchDepth,
        ) -> anyhow::Result<SearchResponse> {
            if query.contains("company overview") {
                Ok(SearchResponse {
                    results: vec![SearchResult {
                        content: "Acme makes widgets.".to_string(),
                        ..Default::default()
                    }],
                })
            } else {
                Ok(SearchResponse::default())
            }
        }

        fn name(&self) -> &str {
            "overview-only"
        }
    }

    struct FixedModel;

    #[async_trait::async_trait]
    impl Provider for FixedModel {
        async fn generate(&self, req: &GenerateRequest) -> anyhow::Result<GenerateResponse> {
            assert_eq!(req.temperature, 0.0);
            Ok(GenerateResponse {
                content: r#"{
                    "company_overview": "Acme makes widgets.",
                    "recent_developments": [],
                    "earnings_summary": "",
                    "future_plans": "",
                    "stock_context": "",
                    "risks_and_limitations": "",
                    "confidence_level": "",
                    "sources": []
                }"#
                .to_string(),
                model: req.model.clone(),
                input_tokens: 100,
                output_tokens: 50,
                finish_reason: "stop".to_string(),
                provider: String::new(),
            })
        }

        fn name(&self) -> &str {
            "fixed"
        }
    }

    struct RefusingModel;

    #[async_trait::async_trait]
    impl Provider for RefusingModel {
        async fn generate(&self, _req: &GenerateRequest) -> anyhow::Result<GenerateResponse> {
            Err(anyhow::anyhow!("503 service unavailable"))
        }

        fn name(&self) -> &str {
            "refusing"
        }
    }

    fn llm_client(provider: Arc<dyn Provider>) -> LlmClient {
        let provider_name = provider.name().to_string();
        LlmClient {
            provider,
            provider_name,
        }
    }

    #[tokio::test]
    async fn test_acme_end_to_end() {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        let dir = tempfile::tempdir().unwrap();
        let reports_dir = dir.path().to_string_lossy().into_owned();
        let client = llm_client(Arc::new(FixedModel));

        let generated = generate_report(
            &pool,
            &OverviewOnlySearch,
            &client,
            "test-model",
            4096,
            &reports_dir,
            &ReportRequest {
                company: "Acme".to_string(),
            },
        )
        .await
        .unwrap();

        assert_eq!(generated.company, "Acme");
        assert_eq!(generated.report.company_overview, "Acme makes widgets.");
        assert!(generated.report.sources.is_empty());
        assert!(Path::new(&generated.pdf_path).exists());

        let file_name = Path::new(&generated.pdf_path)
            .file_name()
            .unwrap()
            .to_string_lossy()
            .into_owned();
        assert!(file_name.starts_with("Acme_"));
        assert!(file_name.ends_with(".pdf"));

        // Exactly one row, company equals the input.
        let rows = list_reports(&pool, 20, 0).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].company, "Acme");
        assert_eq!(rows[0].pdf_path, generated.pdf_path);
    }

    #[tokio::test]
    async fn test_synthesis_failure_leaves_no_artifacts() {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        let dir = tempfile::tempdir().unwrap();
        let reports_dir = dir.path().to_string_lossy().into_owned();
        let client = llm_client(Arc::new(RefusingModel));

        let result = generate_report(
            &pool,
            &OverviewOnlySearch,
            &client,
            "test-model",
            4096,
            &reports_dir,
            &ReportRequest {
                company: "Acme".to_string(),
            },
        )
        .await;

        assert!(matches!(result, Err(AppError::Llm(_))));
        let rows = list_reports(&pool, 20, 0).await.unwrap();
        assert!(rows.is_empty());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
