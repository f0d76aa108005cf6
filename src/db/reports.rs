use serde::Serialize;
use sqlx::SqlitePool;

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ReportRow {
    pub id: i64,
    pub company: String,
    pub pdf_path: String,
    pub created_at: String,
}

pub struct InsertReport<'a> {
    pub company: &'a str,
    pub pdf_path: &'a str,
    pub created_at: &'a str,
}

#[tracing::instrument(name = "db.reports.insert", skip_all)]
pub async fn insert_report(
    pool: &SqlitePool,
    params: &InsertReport<'_>,
) -> Result<i64, sqlx::Error> {
    let row: (i64,) = sqlx::query_as(
        "INSERT INTO reports (company, pdf_path, created_at) \
         VALUES ($1, $2, $3) \
         RETURNING id",
    )
    .bind(params.company)
    .bind(params.pdf_path)
    .bind(params.created_at)
    .fetch_one(pool)
    .await?;

    Ok(row.0)
}

#[tracing::instrument(name = "db.reports.get", skip(pool))]
pub async fn get_report(pool: &SqlitePool, id: i64) -> Result<Option<ReportRow>, sqlx::Error> {
    sqlx::query_as::<_, ReportRow>(
        "SELECT id, company, pdf_path, created_at FROM reports WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await
}

#[tracing::instrument(name = "db.reports.list", skip(pool))]
pub async fn list_reports(
    pool: &SqlitePool,
    limit: i64,
    offset: i64,
) -> Result<Vec<ReportRow>, sqlx::Error> {
    sqlx::query_as::<_, ReportRow>(
        "SELECT id, company, pdf_path, created_at FROM reports \
         ORDER BY created_at DESC, id DESC LIMIT $1 OFFSET $2",
    )
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await
}
