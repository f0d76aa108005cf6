use crate::search::{SearchDepth, SearchProvider, SearchResponse};

/// Hard cap on the text kept per facet before it reaches the prompt.
pub const FACET_CHAR_LIMIT: usize = 2500;

/// Substituted when the overview search fails or comes back empty. The
/// other facets degrade to an empty string with no replacement.
pub const OVERVIEW_FALLBACK: &str = "Company overview information not available.";

/// The five facet texts fed into synthesis. Empty string means the facet
/// was unavailable; the overview is never empty.
#[derive(Debug, Clone, Default)]
pub struct FacetSet {
    pub overview: String,
    pub news: String,
    pub earnings: String,
    pub future_plans: String,
    pub stock_context: String,
}

/// Outcome of a single facet search. Failures carry the reason so callers
/// can tell "no data available" from "provider error", even though the
/// pipeline degrades both to empty text.
#[derive(Debug, Clone)]
pub enum FacetFetch {
    Content(String),
    Unavailable { reason: String },
}

impl FacetFetch {
    pub fn into_text(self) -> String {
        match self {
            FacetFetch::Content(text) => text,
            FacetFetch::Unavailable { .. } => String::new(),
        }
    }
}

#[tracing::instrument(
    name = "pipeline_stage fetch",
    skip(search),
    fields(
        pipeline.stage = "fetch",
        fetch.facets_with_content,
    )
)]
pub async fn fetch_facets(search: &dyn SearchProvider, company: &str) -> FacetSet {
    let overview = fetch_facet(
        search,
        &format!("{company} company overview"),
        SearchDepth::Basic,
    )
    .await;
    let news = fetch_facet(
        search,
        &format!("{company} recent news"),
        SearchDepth::Advanced,
    )
    .await;
    let earnings = fetch_facet(search, &format!("{company} earnings"), SearchDepth::Advanced).await;
    let future_plans = fetch_facet(
        search,
        &format!("{company} future plans"),
        SearchDepth::Advanced,
    )
    .await;
    let stock_context = fetch_facet(
        search,
        &format!("{company} stock news"),
        SearchDepth::Advanced,
    )
    .await;

    let mut facets = FacetSet {
        overview: overview.into_text(),
        news: news.into_text(),
        earnings: earnings.into_text(),
        future_plans: future_plans.into_text(),
        stock_context: stock_context.into_text(),
    };

    if facets.overview.is_empty() {
        facets.overview = OVERVIEW_FALLBACK.to_string();
    }

    let with_content = [
        &facets.news,
        &facets.earnings,
        &facets.future_plans,
        &facets.stock_context,
    ]
    .iter()
    .filter(|t| !t.is_empty())
    .count()
        + usize::from(facets.overview != OVERVIEW_FALLBACK);

    tracing::Span::current().record("fetch.facets_with_content", with_content);

    facets
}

/// One search call, one facet. Errors are not retried; the reason is kept
/// on the outcome and logged by the caller side of the degradation.
pub async fn fetch_facet(
    search: &dyn SearchProvider,
    query: &str,
    depth: SearchDepth,
) -> FacetFetch {
    match search.search(query, depth).await {
        Ok(response) => FacetFetch::Content(limit_text(&flatten_results(&response))),
        Err(err) => {
            tracing::warn!(query, error = %err, "Facet search failed, degrading to empty");
            FacetFetch::Unavailable {
                reason: err.to_string(),
            }
        }
    }
}

/// Space-joins the content field of every result item.
fn flatten_results(response: &SearchResponse) -> String {
    response
        .results
        .iter()
        .map(|r| r.content.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}

/// First `FACET_CHAR_LIMIT` characters; empty input stays empty.
pub fn limit_text(text: &str) -> String {
    text.chars().take(FACET_CHAR_LIMIT).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::SearchResult;
    use std::sync::Mutex;

    struct CannedSearch {
        // query substring -> content returned for it
        responses: Vec<(&'static str, &'static str)>,
        queries_seen: Mutex<Vec<(String, SearchDepth)>>,
    }

    impl CannedSearch {
        fn new(responses: Vec<(&'static str, &'static str)>) -> Self {
            Self {
                responses,
                queries_seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait::async_trait]
    impl SearchProvider for CannedSearch {
        async fn search(
            &self,
            query: &str,
            depth: SearchDepth,
        ) -> anyhow::Result<SearchResponse> {
            self.queries_seen
                .lock()
                .unwrap()
                .push((query.to_string(), depth));

            for (needle, content) in &self.responses {
                if query.contains(needle) {
                    return Ok(SearchResponse {
                        results: vec![SearchResult {
                            content: (*content).to_string(),
                            ..Default::default()
                        }],
                    });
                }
            }
            Ok(SearchResponse::default())
        }

        fn name(&self) -> &str {
            "canned"
        }
    }

    struct BrokenSearch;

    #[async_trait::async_trait]
    impl SearchProvider for BrokenSearch {
        async fn search(
            &self,
            _query: &str,
            _depth: SearchDepth,
        ) -> anyhow::Result<SearchResponse> {
            Err(anyhow::anyhow!("connection refused"))
        }

        fn name(&self) -> &str {
            "broken"
        }
    }

    #[test]
    fn test_limit_text_caps_at_budget() {
        let long = "x".repeat(FACET_CHAR_LIMIT + 500);
        assert_eq!(limit_text(&long).chars().count(), FACET_CHAR_LIMIT);
    }

    #[test]
    fn test_limit_text_empty_stays_empty() {
        assert_eq!(limit_text(""), "");
    }

    #[test]
    fn test_limit_text_short_passes_through() {
        assert_eq!(limit_text("Acme makes widgets."), "Acme makes widgets.");
    }

    #[test]
    fn test_limit_text_counts_characters_not_bytes() {
        let long = "é".repeat(FACET_CHAR_LIMIT + 10);
        assert_eq!(limit_text(&long).chars().count(), FACET_CHAR_LIMIT);
    }

    #[test]
    fn test_flatten_results_joins_content() {
        let response = SearchResponse {
            results: vec![
                SearchResult {
                    content: "part one".to_string(),
                    ..Default::default()
                },
                SearchResult {
                    content: "part two".to_string(),
                    ..Default::default()
                },
            ],
        };
        assert_eq!(flatten_results(&response), "part one part two");
    }

    #[tokio::test]
    async fn test_fetch_facets_queries_and_depths() {
        let search = CannedSearch::new(vec![("company overview", "Acme makes widgets.")]);
        fetch_facets(&search, "Acme").await;

        let seen = search.queries_seen.lock().unwrap();
        assert_eq!(seen.len(), 5);
        assert_eq!(seen[0], ("Acme company overview".to_string(), SearchDepth::Basic));
        assert_eq!(seen[1], ("Acme recent news".to_string(), SearchDepth::Advanced));
        assert_eq!(seen[2], ("Acme earnings".to_string(), SearchDepth::Advanced));
        assert_eq!(seen[3], ("Acme future plans".to_string(), SearchDepth::Advanced));
        assert_eq!(seen[4], ("Acme stock news".to_string(), SearchDepth::Advanced));
    }

    #[tokio::test]
    async fn test_fetch_facets_acme_scenario() {
        let search = CannedSearch::new(vec![("company overview", "Acme makes widgets.")]);
        let facets = fetch_facets(&search, "Acme").await;

        assert_eq!(facets.overview, "Acme makes widgets.");
        assert_eq!(facets.news, "");
        assert_eq!(facets.earnings, "");
        assert_eq!(facets.future_plans, "");
        assert_eq!(facets.stock_context, "");
    }

    #[tokio::test]
    async fn test_overview_fallback_on_empty_results() {
        let search = CannedSearch::new(vec![]);
        let facets = fetch_facets(&search, "Acme").await;

        assert_eq!(facets.overview, OVERVIEW_FALLBACK);
    }

    #[tokio::test]
    async fn test_all_failures_degrade_only_overview_gets_fallback() {
        let facets = fetch_facets(&BrokenSearch, "Acme").await;

        assert_eq!(facets.overview, OVERVIEW_FALLBACK);
        assert_eq!(facets.news, "");
        assert_eq!(facets.earnings, "");
        assert_eq!(facets.future_plans, "");
        assert_eq!(facets.stock_context, "");
    }

    #[tokio::test]
    async fn test_fetch_facet_keeps_failure_reason() {
        let outcome = fetch_facet(&BrokenSearch, "Acme earnings", SearchDepth::Advanced).await;
        match outcome {
            FacetFetch::Unavailable { reason } => {
                assert!(reason.contains("connection refused"));
            }
            FacetFetch::Content(_) => panic!("expected Unavailable"),
        }
    }
}
