use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::llm::{GenerateRequest, LlmClient};

use super::fetch::FacetSet;

const SYNTHESIS_TEMPERATURE: f32 = 0.0;

/// The structured synthesis result. All fields are required; a completion
/// that omits one fails parsing, and that failure propagates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompanyReport {
    pub company_overview: String,
    pub recent_developments: Vec<String>,
    pub earnings_summary: String,
    pub future_plans: String,
    pub stock_context: String,
    pub risks_and_limitations: String,
    pub confidence_level: String,
    pub sources: Vec<String>,
}

const SYSTEM_PROMPT: &str = "\
You are an evidence-based market research analyst.

Rules:
- Use ONLY the provided information
- Do NOT invent facts or numbers
- No stock predictions
- Future plans must be explicitly announced
- If information is missing, say so clearly
- Keep a neutral, professional tone";

pub fn build_prompt(facets: &FacetSet) -> String {
    format!(
        "Company Overview:\n{}\n\n\
        Recent News:\n{}\n\n\
        Earnings:\n{}\n\n\
        Future Plans:\n{}\n\n\
        Stock News:\n{}\n\n\
        Generate a structured company research report.\n\
        Return it as JSON with exactly this structure:\n\
        {{\n  \"company_overview\": \"what the company does today\",\n  \
        \"recent_developments\": [\"recent development\"],\n  \
        \"earnings_summary\": \"recent earnings if available\",\n  \
        \"future_plans\": \"explicitly announced future plans only\",\n  \
        \"stock_context\": \"stock-related context without prediction\",\n  \
        \"risks_and_limitations\": \"risks and limitations of this report\",\n  \
        \"confidence_level\": \"HIGH, MEDIUM or LOW, with a short justification\",\n  \
        \"sources\": [\"https source URL\"]\n}}\n\n\
        Sources must be well-formed https URLs taken from the provided information.",
        facets.overview, facets.news, facets.earnings, facets.future_plans, facets.stock_context
    )
}

#[tracing::instrument(
    name = "pipeline_stage synthesize",
    skip(llm_client, facets),
    fields(
        pipeline.stage = "synthesize",
        report.developments_count,
        report.sources_count,
    )
)]
pub async fn synthesize(
    llm_client: &LlmClient,
    model: &str,
    max_tokens: u32,
    facets: &FacetSet,
) -> Result<CompanyReport, AppError> {
    let resp = llm_client
        .generate(&GenerateRequest {
            model: model.to_string(),
            system: SYSTEM_PROMPT.to_string(),
            prompt: build_prompt(facets),
            temperature: SYNTHESIS_TEMPERATURE,
            max_tokens,
            stage: "synthesize".to_string(),
        })
        .await
        .map_err(|e| AppError::Llm(e.to_string()))?;

    let report = parse_report(&resp.content)?;

    for source in &report.sources {
        if !source.starts_with("https://") {
            tracing::warn!(source, "Model returned a non-https source");
        }
    }

    let span = tracing::Span::current();
    span.record("report.developments_count", report.recent_developments.len());
    span.record("report.sources_count", report.sources.len());

    Ok(report)
}

fn parse_report(content: &str) -> Result<CompanyReport, AppError> {
    let json_str = extract_json(content);
    serde_json::from_str::<CompanyReport>(&json_str)
        .map_err(|e| AppError::Llm(format!("structured output did not match schema: {e}")))
}

pub(crate) fn extract_json(content: &str) -> String {
    if let Some(start) = content.find("```json")
        && let Some(end) = content[start + 7..].find("```")
    {
        return content[start + 7..start + 7 + end].trim().to_string();
    }
    if let Some(start) = content.find("```")
        && let Some(end) = content[start + 3..].find("```")
    {
        let inner = content[start + 3..start + 3 + end].trim();
        if inner.starts_with('{') {
            return inner.to_string();
        }
    }
    if let Some(start) = content.find('{')
        && let Some(end) = content.rfind('}')
    {
        return content[start..=end].to_string();
    }
    content.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_report_json() -> &'static str {
        r#"{
            "company_overview": "Acme makes widgets.",
            "recent_developments": ["Opened a new plant"],
            "earnings_summary": "Revenue grew 5%.",
            "future_plans": "Announced expansion into Europe.",
            "stock_context": "Shares traded flat this quarter.",
            "risks_and_limitations": "Based on limited public snippets.",
            "confidence_level": "MEDIUM - sparse earnings data",
            "sources": ["https://example.com/acme"]
        }"#
    }

    #[test]
    fn test_extract_json_raw() {
        let input = r#"{"company_overview": "Acme"}"#;
        let result = extract_json(input);
        assert!(result.starts_with('{'));
    }

    #[test]
    fn test_extract_json_markdown_block() {
        let input = "Here is the report:\n```json\n{\"a\": 1}\n```\nDone.";
        assert_eq!(extract_json(input), "{\"a\": 1}");
    }

    #[test]
    fn test_extract_json_generic_code_block() {
        let input = "```\n{\"key\": \"value\"}\n```";
        assert_eq!(extract_json(input), "{\"key\": \"value\"}");
    }

    #[test]
    fn test_extract_json_embedded_in_text() {
        let input = "The result is {\"a\": 1} and that's it.";
        assert_eq!(extract_json(input), "{\"a\": 1}");
    }

    #[test]
    fn test_extract_json_no_json() {
        let input = "No JSON here at all";
        assert_eq!(extract_json(input), input);
    }

    #[test]
    fn test_parse_report_valid() {
        let report = parse_report(valid_report_json()).unwrap();
        assert_eq!(report.company_overview, "Acme makes widgets.");
        assert_eq!(report.recent_developments, vec!["Opened a new plant"]);
        assert_eq!(report.sources, vec!["https://example.com/acme"]);
    }

    #[test]
    fn test_parse_report_markdown_wrapped() {
        let wrapped = format!("```json\n{}\n```", valid_report_json());
        let report = parse_report(&wrapped).unwrap();
        assert_eq!(report.confidence_level, "MEDIUM - sparse earnings data");
    }

    #[test]
    fn test_parse_report_missing_field_is_error() {
        // No confidence_level: the schema is not satisfied.
        let incomplete = r#"{
            "company_overview": "Acme",
            "recent_developments": [],
            "earnings_summary": "",
            "future_plans": "",
            "stock_context": "",
            "risks_and_limitations": "",
            "sources": []
        }"#;
        let err = parse_report(incomplete).unwrap_err();
        assert!(matches!(err, AppError::Llm(_)));
    }

    #[test]
    fn test_parse_report_plain_text_is_error() {
        let err = parse_report("I could not produce a report.").unwrap_err();
        assert!(matches!(err, AppError::Llm(_)));
    }

    #[test]
    fn test_build_prompt_interpolates_all_facets() {
        let facets = FacetSet {
            overview: "OVERVIEW_TEXT".to_string(),
            news: "NEWS_TEXT".to_string(),
            earnings: "EARNINGS_TEXT".to_string(),
            future_plans: "PLANS_TEXT".to_string(),
            stock_context: "STOCK_TEXT".to_string(),
        };
        let prompt = build_prompt(&facets);
        for needle in [
            "OVERVIEW_TEXT",
            "NEWS_TEXT",
            "EARNINGS_TEXT",
            "PLANS_TEXT",
            "STOCK_TEXT",
        ] {
            assert!(prompt.contains(needle), "prompt missing {needle}");
        }
        assert!(prompt.contains("https URL"));
    }
}
