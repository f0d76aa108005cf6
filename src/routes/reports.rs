use axum::{
    Json,
    extract::{Path, Query, State},
    http::header,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::pipeline::{GeneratedReport, ReportRequest, generate_report};

#[derive(Debug, Deserialize)]
pub struct CreateReportBody {
    pub company: String,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// History row plus whether its file is still on disk. Rows whose PDF was
/// deleted externally stay listed; only the download goes away.
#[derive(Debug, Serialize)]
pub struct ReportListItem {
    pub id: i64,
    pub company: String,
    pub pdf_path: String,
    pub created_at: String,
    pub pdf_available: bool,
}

pub async fn create_report(
    State(state): State<AppState>,
    Json(body): Json<CreateReportBody>,
) -> AppResult<Json<GeneratedReport>> {
    let company = body.company.trim().to_string();
    if company.is_empty() {
        return Err(AppError::Validation("company must not be empty".into()));
    }

    let request = ReportRequest { company };

    let generated = generate_report(
        &state.pool,
        state.search.as_ref(),
        &state.llm_client,
        &state.config.llm_model,
        state.config.default_max_tokens,
        &state.config.reports_dir,
        &request,
    )
    .await?;

    Ok(Json(generated))
}

pub async fn list_reports(
    State(state): State<AppState>,
    Query(params): Query<ListQuery>,
) -> AppResult<Json<Vec<ReportListItem>>> {
    let limit = params.limit.unwrap_or(20);
    let offset = params.offset.unwrap_or(0);

    let rows = crate::db::reports::list_reports(&state.pool, limit, offset)
        .await
        .map_err(AppError::Database)?;

    let items = rows
        .into_iter()
        .map(|row| {
            let pdf_available = std::path::Path::new(&row.pdf_path).exists();
            ReportListItem {
                id: row.id,
                company: row.company,
                pdf_path: row.pdf_path,
                created_at: row.created_at,
                pdf_available,
            }
        })
        .collect();

    Ok(Json(items))
}

pub async fn download_report(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> AppResult<Response> {
    let row = crate::db::reports::get_report(&state.pool, id)
        .await
        .map_err(AppError::Database)?
        .ok_or_else(|| AppError::NotFound(format!("Report {id} not found")))?;

    let bytes = tokio::fs::read(&row.pdf_path).await.map_err(|_| {
        AppError::NotFound(format!("PDF for report {id} is no longer on disk"))
    })?;

    let file_name = std::path::Path::new(&row.pdf_path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| format!("report_{id}.pdf"));

    let headers = [
        (header::CONTENT_TYPE, "application/pdf".to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{file_name}\""),
        ),
    ];

    Ok((headers, bytes).into_response())
}
