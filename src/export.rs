//! PDF report of the latest analysis and CSV dump of the whole history.
//!
//! The report is first laid out into [`ReportLayout`] pages (pure, top-down
//! millimetre coordinates) and only then drawn with `printpdf`.

use crate::error::{ExportError, ExportResult};
use crate::history::{format_timestamp, HistoryStore};
use crate::segments::wrap_words;
use crate::types::{AnalysisResult, Stage, Verdict};
use chrono::{DateTime, SecondsFormat, Utc};
use printpdf::{BuiltinFont, Color, IndirectFontRef, Mm, PdfDocument, Rgb};
use std::path::{Path, PathBuf};
use tracing::info;

pub const PAGE_WIDTH_MM: f32 = 210.0;
pub const PAGE_HEIGHT_MM: f32 = 297.0;
pub const MARGIN_MM: f32 = 20.0;
pub const TOP_MM: f32 = 20.0;
/// Content never goes below this line; the footer band sits underneath.
pub const CONTENT_BOTTOM_MM: f32 = 270.0;
const FOOTER_Y_MM: f32 = 290.0;

pub const TABLE_HEADER: &str = "ID,Claim,Verdict,Confidence,Timestamp";

const NAVY: (u8, u8, u8) = (30, 58, 95);
const GOLD: (u8, u8, u8) = (253, 185, 19);
const BLACK: (u8, u8, u8) = (0, 0, 0);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FontStyle { Normal, Bold, Italic }

#[derive(Debug, Clone, PartialEq)]
pub struct TextLine {
    pub x: f32,
    pub y: f32,
    pub size: f32,
    pub style: FontStyle,
    pub color: (u8, u8, u8),
    pub text: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReportLayout {
    pub pages: Vec<Vec<TextLine>>,
}

impl ReportLayout {
    pub fn page_count(&self) -> usize { self.pages.len() }

    pub fn lines(&self) -> impl Iterator<Item = &TextLine> { self.pages.iter().flatten() }

    pub fn contains(&self, needle: &str) -> bool { self.lines().any(|l| l.text.contains(needle)) }
}

pub fn verdict_color(verdict: Verdict) -> (u8, u8, u8) {
    match verdict {
        Verdict::False => (220, 38, 38),
        Verdict::True => (34, 197, 94),
        Verdict::Unverified => (234, 179, 8),
        Verdict::Mixed => (249, 115, 22),
    }
}

struct Writer {
    pages: Vec<Vec<TextLine>>,
    y: f32,
    size: f32,
    style: FontStyle,
    color: (u8, u8, u8),
}

impl Writer {
    fn new(start_y: f32) -> Self {
        Self { pages: vec![Vec::new()], y: start_y, size: 10.0, style: FontStyle::Normal, color: BLACK }
    }

    fn font(&mut self, size: f32, style: FontStyle, color: (u8, u8, u8)) {
        self.size = size;
        self.style = style;
        self.color = color;
    }

    fn break_if_needed(&mut self) {
        if self.y > CONTENT_BOTTOM_MM {
            self.pages.push(Vec::new());
            self.y = TOP_MM;
        }
    }

    fn put(&mut self, text: &str, indent: f32) {
        self.break_if_needed();
        let line = TextLine { x: MARGIN_MM + indent, y: self.y, size: self.size, style: self.style, color: self.color, text: text.to_string() };
        if let Some(page) = self.pages.last_mut() {
            page.push(line);
        }
    }

    /// One line, then move down by `advance`.
    fn line(&mut self, text: &str, indent: f32, advance: f32) {
        self.put(text, indent);
        self.y += advance;
    }

    fn wrapped(&mut self, text: &str, indent: f32, line_height: f32) {
        let width = PAGE_WIDTH_MM - 2.0 * MARGIN_MM - indent;
        for l in wrap_words(text, chars_per_line(width, self.size)) {
            self.line(&l, indent, line_height);
        }
    }

    fn gap(&mut self, mm: f32) { self.y += mm; }

    fn section(&mut self, title: &str) {
        self.font(14.0, FontStyle::Bold, NAVY);
        self.line(title, 0.0, 8.0);
        self.font(10.0, FontStyle::Normal, BLACK);
    }
}

/// Rough character budget for Times at `size` points across `width_mm`.
fn chars_per_line(width_mm: f32, size: f32) -> usize {
    ((width_mm / (size * 0.18)).floor() as usize).max(10)
}

pub fn layout_report(entry: &AnalysisResult, generated_at: DateTime<Utc>) -> ReportLayout {
    let d = &entry.detailed_analysis;
    let mut w = Writer::new(TOP_MM);

    w.font(24.0, FontStyle::Bold, NAVY);
    w.line("ClaimWatch", 0.0, 8.0);
    w.font(12.0, FontStyle::Normal, NAVY);
    w.line("Misinformation Analysis Report", 0.0, 17.0);

    w.font(10.0, FontStyle::Normal, BLACK);
    w.line(&format!("Report Generated: {}", format_timestamp(&generated_at)), 0.0, 7.0);
    w.line(&format!("Analysis ID: #{}", entry.id), 0.0, 10.0);

    w.section("1. CLAIM SUBMITTED");
    w.line("User Input:", 0.0, 6.0);
    w.font(10.0, FontStyle::Italic, BLACK);
    w.wrapped(&format!("\"{}\"", entry.claim), 5.0, 6.0);
    w.gap(8.0);
    w.font(10.0, FontStyle::Normal, BLACK);
    w.line(&format!("Timestamp: {}", format_timestamp(&entry.timestamp)), 0.0, 10.0);

    w.section("2. MULTI-AGENT ANALYSIS PIPELINE");
    for (n, stage) in Stage::ORDER.iter().enumerate() {
        w.font(10.0, FontStyle::Bold, BLACK);
        w.line(&format!("Step {}: {}", n + 1, stage.title()), 0.0, 6.0);
        w.font(10.0, FontStyle::Normal, BLACK);
        w.line(&format!("Function: {}", stage.function()), 5.0, 5.0);
        w.wrapped(&format!("Result: {}", d.stage_summary(*stage)), 5.0, 5.0);
        if *stage == Stage::Cluster {
            w.line(&format!("CIB Score (Coordination Index): {}", d.cib_score), 5.0, 5.0);
        }
        w.gap(3.0);
    }
    w.gap(2.0);

    w.section("3. SOURCES CROSS-VERIFIED");
    for (i, source) in d.sources_checked.iter().enumerate() {
        w.line(&format!("{}. {}", i + 1, source), 5.0, 6.0);
    }
    w.gap(5.0);

    w.section("4. FINAL VERDICT");
    w.font(12.0, FontStyle::Normal, verdict_color(entry.verdict));
    w.line(&format!("Status: {}", entry.verdict.label()), 0.0, 8.0);
    w.font(10.0, FontStyle::Normal, BLACK);
    w.line(&format!("Confidence Score: {}%", entry.confidence_percent()), 0.0, 6.0);
    w.line(&format!("Processing Time: {}", d.processing_time), 0.0, 10.0);
    w.font(10.0, FontStyle::Bold, BLACK);
    w.line("Detailed Explanation:", 0.0, 6.0);
    w.font(10.0, FontStyle::Normal, BLACK);
    w.wrapped(&entry.explanation, 5.0, 6.0);
    w.gap(10.0);

    w.section("5. RECOMMENDATIONS");
    for rec in recommendations(entry) {
        w.line(&format!("- {rec}"), 5.0, 6.0);
    }

    ReportLayout { pages: w.pages }
}

pub fn recommendations(entry: &AnalysisResult) -> Vec<&'static str> {
    let mut out = Vec::new();
    if entry.needs_human_review() {
        out.push("Human expert review is recommended due to low confidence score");
    }
    if entry.verdict == Verdict::False {
        out.push("Do not share this claim on social media platforms");
        out.push("Report the post if encountered on social networks");
    }
    out.push("Always verify information from official sources before sharing");
    out.push("Cross-reference multiple credible news outlets");
    out
}

fn rgb((r, g, b): (u8, u8, u8)) -> Color {
    Color::Rgb(Rgb::new(r as f32 / 255.0, g as f32 / 255.0, b as f32 / 255.0, None))
}

/// Built-in PDF fonts only cover Latin-1; everything else is dropped.
fn pdf_safe(text: &str) -> String {
    text.chars().filter(|c| (' '..='~').contains(c) || ('\u{a0}'..='\u{ff}').contains(c)).collect()
}

fn doc_err<E: std::fmt::Debug>(e: E) -> ExportError {
    ExportError::Document(format!("{e:?}"))
}

pub fn render_pdf(layout: &ReportLayout, title: &str) -> ExportResult<Vec<u8>> {
    let (doc, first_page, first_layer) = PdfDocument::new(title, Mm(PAGE_WIDTH_MM), Mm(PAGE_HEIGHT_MM), "content");
    let normal = doc.add_builtin_font(BuiltinFont::TimesRoman).map_err(doc_err)?;
    let bold = doc.add_builtin_font(BuiltinFont::TimesBold).map_err(doc_err)?;
    let italic = doc.add_builtin_font(BuiltinFont::TimesItalic).map_err(doc_err)?;

    let page_count = layout.pages.len().max(1);
    for idx in 0..page_count {
        let (page, layer) = if idx == 0 {
            (first_page, first_layer)
        } else {
            doc.add_page(Mm(PAGE_WIDTH_MM), Mm(PAGE_HEIGHT_MM), "content")
        };
        let canvas = doc.get_page(page).get_layer(layer);
        for line in layout.pages.get(idx).into_iter().flatten() {
            let font: &IndirectFontRef = match line.style {
                FontStyle::Normal => &normal,
                FontStyle::Bold => &bold,
                FontStyle::Italic => &italic,
            };
            canvas.set_fill_color(rgb(line.color));
            canvas.use_text(pdf_safe(&line.text), line.size, Mm(line.x), Mm(PAGE_HEIGHT_MM - line.y), font);
        }
        if idx + 1 == page_count {
            canvas.set_fill_color(rgb(GOLD));
            canvas.use_text(
                "ClaimWatch - Synthetic Misinformation Triage",
                9.0,
                Mm(MARGIN_MM),
                Mm(PAGE_HEIGHT_MM - FOOTER_Y_MM),
                &normal,
            );
        }
    }

    doc.save_to_bytes().map_err(doc_err)
}

/// Paginated PDF of the most recent history entry.
pub fn export_latest_as_document(history: &HistoryStore, now: DateTime<Utc>) -> ExportResult<Vec<u8>> {
    let latest = history.latest().ok_or(ExportError::EmptyHistory)?;
    let layout = layout_report(latest, now);
    let bytes = render_pdf(&layout, &format!("Analysis #{}", latest.id))?;
    info!(id = latest.id, pages = layout.page_count(), bytes = bytes.len(), "report rendered");
    Ok(bytes)
}

/// CSV with one row per entry, newest first. Claims are always quoted and
/// flattened onto one line.
pub fn export_all_as_table(history: &HistoryStore) -> ExportResult<String> {
    if history.is_empty() {
        return Err(ExportError::EmptyHistory);
    }
    let mut csv = String::from(TABLE_HEADER);
    csv.push('\n');
    for e in history.iter() {
        let claim = e.claim.replace(['\r', '\n'], " ").replace('"', "\"\"");
        csv.push_str(&format!(
            "{},\"{}\",{},{},{}\n",
            e.id,
            claim,
            e.verdict,
            e.confidence,
            e.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
        ));
    }
    Ok(csv)
}

/// Writes `bytes` to `dir/name`, creating `dir` first.
pub async fn write_export(dir: &Path, name: &str, bytes: &[u8]) -> ExportResult<PathBuf> {
    tokio::fs::create_dir_all(dir).await?;
    let path = dir.join(name);
    tokio::fs::write(&path, bytes).await?;
    info!(path = %path.display(), bytes = bytes.len(), "export written");
    Ok(path)
}

pub fn report_filename(id: u64, now: DateTime<Utc>) -> String {
    format!("claimwatch-report-{}-{}.pdf", id, now.timestamp_millis())
}

pub fn table_filename(now: DateTime<Utc>) -> String {
    format!("claimwatch-history-{}.csv", now.timestamp_millis())
}
