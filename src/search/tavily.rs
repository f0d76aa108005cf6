use serde::Serialize;

use super::{SearchDepth, SearchProvider, SearchResponse};

const TAVILY_SEARCH_URL: &str = "https://api.tavily.com/search";
const MAX_RESULTS: u32 = 5;

pub struct TavilyClient {
    client: reqwest::Client,
    api_key: String,
}

impl TavilyClient {
    pub fn new(api_key: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.to_string(),
        }
    }
}

#[derive(Serialize)]
struct TavilySearchRequest<'a> {
    query: &'a str,
    search_depth: &'a str,
    max_results: u32,
}

#[async_trait::async_trait]
impl SearchProvider for TavilyClient {
    async fn search(&self, query: &str, depth: SearchDepth) -> anyhow::Result<SearchResponse> {
        let body = TavilySearchRequest {
            query,
            search_depth: depth.as_str(),
            max_results: MAX_RESULTS,
        };

        let response = self
            .client
            .post(TAVILY_SEARCH_URL)
            .header("api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!(
                "Tavily API error ({}): {}",
                status,
                error_body
            ));
        }

        let search_response: SearchResponse = response.json().await?;

        Ok(search_response)
    }

    fn name(&self) -> &str {
        "tavily"
    }
}
