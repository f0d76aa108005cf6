use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use chrono::{DateTime, Utc};
use printpdf::{BuiltinFont, IndirectFontRef, Mm, PdfDocument, PdfLayerReference};
use serde::Serialize;
use sqlx::SqlitePool;

use crate::db::reports::{InsertReport, insert_report};
use crate::error::AppError;

use super::synthesize::CompanyReport;

const PAGE_WIDTH_MM: f32 = 210.0;
const PAGE_HEIGHT_MM: f32 = 297.0;
const MARGIN_MM: f32 = 20.0;
const BODY_LINE_MM: f32 = 5.5;
const HEADING_LINE_MM: f32 = 8.0;
const WRAP_COLUMNS: usize = 90;

/// One UTC instant per request, projected into the three string formats the
/// pipeline emits (file name, in-document caption, database row).
#[derive(Debug, Clone, Copy)]
pub struct ReportTimestamp(DateTime<Utc>);

impl ReportTimestamp {
    pub fn now() -> Self {
        Self(Utc::now())
    }

    pub fn file_fragment(&self) -> String {
        self.0.format("%Y%m%d_%H%M%S").to_string()
    }

    pub fn document_caption(&self) -> String {
        self.0.format("%Y-%m-%d %H:%M UTC").to_string()
    }

    pub fn row_value(&self) -> String {
        self.0.format("%Y-%m-%d %H:%M:%S").to_string()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PublishedReport {
    pub id: i64,
    pub pdf_path: String,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SectionBody {
    Text(String),
    Bullets(Vec<String>),
}

#[derive(Debug, Clone)]
pub struct Section {
    pub title: &'static str,
    pub body: SectionBody,
}

/// Fixed section order; one section per report field.
pub fn build_sections(report: &CompanyReport) -> Vec<Section> {
    vec![
        Section {
            title: "Company Overview",
            body: SectionBody::Text(report.company_overview.clone()),
        },
        Section {
            title: "Recent Developments",
            body: SectionBody::Bullets(report.recent_developments.clone()),
        },
        Section {
            title: "Earnings Summary",
            body: SectionBody::Text(report.earnings_summary.clone()),
        },
        Section {
            title: "Future Plans",
            body: SectionBody::Text(report.future_plans.clone()),
        },
        Section {
            title: "Stock Context",
            body: SectionBody::Text(report.stock_context.clone()),
        },
        Section {
            title: "Risks & Limitations",
            body: SectionBody::Text(report.risks_and_limitations.clone()),
        },
        Section {
            title: "Confidence Level",
            body: SectionBody::Text(report.confidence_level.clone()),
        },
        Section {
            title: "Sources",
            body: SectionBody::Bullets(report.sources.clone()),
        },
    ]
}

/// Company names arrive over HTTP and end up in a file name; anything
/// path-hostile becomes an underscore.
pub fn sanitize_file_stem(company: &str) -> String {
    let stem: String = company
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();

    if stem.is_empty() { "report".to_string() } else { stem }
}

#[tracing::instrument(
    name = "pipeline_stage publish",
    skip(pool, report, timestamp),
    fields(
        pipeline.stage = "publish",
        publish.pdf_path,
        publish.row_id,
    )
)]
pub async fn publish(
    pool: &SqlitePool,
    reports_dir: &str,
    company: &str,
    report: &CompanyReport,
    timestamp: &ReportTimestamp,
) -> Result<PublishedReport, AppError> {
    std::fs::create_dir_all(reports_dir)
        .map_err(|e| AppError::Pdf(format!("failed to create reports dir: {e}")))?;

    let file_name = format!(
        "{}_{}.pdf",
        sanitize_file_stem(company),
        timestamp.file_fragment()
    );
    let pdf_path = Path::new(reports_dir).join(file_name);

    render_pdf(
        company,
        &timestamp.document_caption(),
        &build_sections(report),
        &pdf_path,
    )?;

    let pdf_path = pdf_path.to_string_lossy().into_owned();
    let created_at = timestamp.row_value();

    // Two uncoordinated side effects: the file write above and this insert.
    let id = insert_report(
        pool,
        &InsertReport {
            company,
            pdf_path: &pdf_path,
            created_at: &created_at,
        },
    )
    .await?;

    let span = tracing::Span::current();
    span.record("publish.pdf_path", pdf_path.as_str());
    span.record("publish.row_id", id);

    Ok(PublishedReport {
        id,
        pdf_path,
        created_at,
    })
}

struct PdfWriter {
    doc: printpdf::PdfDocumentReference,
    layer: PdfLayerReference,
    regular: IndirectFontRef,
    bold: IndirectFontRef,
    y_mm: f32,
}

impl PdfWriter {
    fn new(title: &str) -> Result<Self, AppError> {
        let (doc, page, layer) = PdfDocument::new(
            title,
            Mm(PAGE_WIDTH_MM),
            Mm(PAGE_HEIGHT_MM),
            "Layer 1",
        );
        let regular = doc
            .add_builtin_font(BuiltinFont::Helvetica)
            .map_err(|e| AppError::Pdf(e.to_string()))?;
        let bold = doc
            .add_builtin_font(BuiltinFont::HelveticaBold)
            .map_err(|e| AppError::Pdf(e.to_string()))?;
        let layer = doc.get_page(page).get_layer(layer);

        Ok(Self {
            doc,
            layer,
            regular,
            bold,
            y_mm: PAGE_HEIGHT_MM - MARGIN_MM,
        })
    }

    fn advance(&mut self, line_mm: f32) {
        if self.y_mm - line_mm < MARGIN_MM {
            let (page, layer) =
                self.doc
                    .add_page(Mm(PAGE_WIDTH_MM), Mm(PAGE_HEIGHT_MM), "Layer 1");
            self.layer = self.doc.get_page(page).get_layer(layer);
            self.y_mm = PAGE_HEIGHT_MM - MARGIN_MM;
        }
        self.y_mm -= line_mm;
    }

    fn heading(&mut self, text: &str, size_pt: f32) {
        self.advance(HEADING_LINE_MM);
        self.layer
            .use_text(text, size_pt, Mm(MARGIN_MM), Mm(self.y_mm), &self.bold);
    }

    fn body_line(&mut self, text: &str) {
        self.advance(BODY_LINE_MM);
        self.layer
            .use_text(text, 11.0, Mm(MARGIN_MM), Mm(self.y_mm), &self.regular);
    }

    fn paragraph(&mut self, text: &str) {
        for line in wrap_text(text, WRAP_COLUMNS) {
            self.body_line(&line);
        }
    }

    fn bullet(&mut self, text: &str) {
        let mut lines = wrap_text(text, WRAP_COLUMNS - 2).into_iter();
        if let Some(first) = lines.next() {
            self.body_line(&format!("- {first}"));
        }
        for cont in lines {
            self.body_line(&format!("  {cont}"));
        }
    }

    fn save(self, path: &Path) -> Result<(), AppError> {
        let file = File::create(path).map_err(|e| AppError::Pdf(e.to_string()))?;
        self.doc
            .save(&mut BufWriter::new(file))
            .map_err(|e| AppError::Pdf(e.to_string()))?;
        Ok(())
    }
}

pub fn render_pdf(
    company: &str,
    caption: &str,
    sections: &[Section],
    path: &Path,
) -> Result<(), AppError> {
    let title = format!("{company} Research Report");
    let mut writer = PdfWriter::new(&title)?;

    writer.heading(&title, 18.0);
    writer.body_line(&format!("Created on: {caption}"));

    for section in sections {
        writer.advance(BODY_LINE_MM);
        writer.heading(section.title, 13.0);
        match &section.body {
            SectionBody::Text(text) => writer.paragraph(text),
            SectionBody::Bullets(items) => {
                for item in items {
                    writer.bullet(item);
                }
            }
        }
    }

    writer.save(path)
}

/// Greedy word wrap; words longer than the column budget are hard-split.
fn wrap_text(text: &str, max_columns: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        let mut word = word;
        while word.chars().count() > max_columns {
            if !current.is_empty() {
                lines.push(std::mem::take(&mut current));
            }
            let split_at = word
                .char_indices()
                .nth(max_columns)
                .map_or(word.len(), |(i, _)| i);
            lines.push(word[..split_at].to_string());
            word = &word[split_at..];
        }

        if current.is_empty() {
            current = word.to_string();
        } else if current.chars().count() + 1 + word.chars().count() <= max_columns {
            current.push(' ');
            current.push_str(word);
        } else {
            lines.push(std::mem::take(&mut current));
            current = word.to_string();
        }
    }

    if !current.is_empty() {
        lines.push(current);
    }

    lines
}
