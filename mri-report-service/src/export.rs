//! Fixed-layout PDF export of a reviewed report.
//!
//! The layout is built as plain [`Section`]s first so that its content can be
//! inspected without parsing PDF output, then drawn with `printpdf`.

use printpdf::{BuiltinFont, IndirectFontRef, Mm, PdfDocument, PdfDocumentReference, PdfLayerReference};
use std::io::BufWriter;
use std::path::Path;
use tracing::{info, warn};

use crate::error::ReportError;
use crate::models::{HallucinationFlag, MriReport, Ratings, ReportKind, WordCounts};

pub const EXPORT_FILE_NAME: &str = "AI_Generated_MRI_Report.pdf";
pub const EXPORT_MIME_TYPE: &str = "application/pdf";
pub const EXPORT_TITLE: &str = "AI-Generated MRI Report";

const PAGE_WIDTH: Mm = Mm(210.0);
const PAGE_HEIGHT: Mm = Mm(297.0);
const MARGIN_LEFT: f32 = 20.0;
const MARGIN_TOP: f32 = 280.0;
const MARGIN_BOTTOM: f32 = 20.0;
const BODY_SIZE: f32 = 10.0;
const TEXT_WIDTH_MM: f32 = 210.0 - 2.0 * MARGIN_LEFT;
const PT_TO_MM: f32 = 0.3528;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionKind {
    Title,
    Summary,
    PatientFriendly,
    Recommendations,
    Ratings,
    Hallucinations,
    Comments,
    WordCounts,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub kind: SectionKind,
    pub heading: String,
    pub body: Vec<String>,
}

impl Section {
    fn new(kind: SectionKind, heading: impl Into<String>, body: Vec<String>) -> Self {
        Self {
            kind,
            heading: heading.into(),
            body,
        }
    }
}

/// Snapshot of a reviewed session, ready to be laid out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportDocument {
    pub summary: String,
    pub patient_friendly: String,
    pub recommendation: String,
    pub ratings: Ratings,
    pub hallucination: HallucinationFlag,
    pub comment: Option<String>,
    pub word_counts: WordCounts,
}

impl ExportDocument {
    pub fn from_report(report: &MriReport) -> Result<Self, ReportError> {
        let text = |kind: ReportKind| {
            report.reports.get(kind).map(str::to_string).ok_or_else(|| {
                ReportError::Input(format!("{} has not been generated yet", kind.title()))
            })
        };
        let review = report
            .review
            .as_ref()
            .ok_or_else(|| ReportError::Input("Ratings have not been submitted".to_string()))?;
        let word_counts = report
            .word_counts
            .ok_or_else(|| ReportError::Input("Word counts are missing".to_string()))?;

        Ok(Self {
            summary: text(ReportKind::Summary)?,
            patient_friendly: text(ReportKind::PatientFriendly)?,
            recommendation: text(ReportKind::Recommendation)?,
            ratings: review.ratings,
            hallucination: review.hallucination,
            comment: review.comment.clone(),
            word_counts,
        })
    }

    pub fn sections(&self) -> Vec<Section> {
        let mut sections = vec![
            Section::new(SectionKind::Title, EXPORT_TITLE, Vec::new()),
            Section::new(
                SectionKind::Summary,
                "Summary:",
                vec![self.summary.clone()],
            ),
            Section::new(
                SectionKind::PatientFriendly,
                "Patient-Friendly Report:",
                vec![self.patient_friendly.clone()],
            ),
            Section::new(
                SectionKind::Recommendations,
                "Recommendations:",
                vec![self.recommendation.clone()],
            ),
            Section::new(
                SectionKind::Ratings,
                "Ratings:",
                ReportKind::ALL
                    .iter()
                    .map(|kind| format!("{}: {}", kind.rating_label(), self.ratings.get(*kind)))
                    .collect(),
            ),
            Section::new(
                SectionKind::Hallucinations,
                format!("Instances of Artificial Hallucinations: {}", self.hallucination),
                Vec::new(),
            ),
        ];

        if self.hallucination == HallucinationFlag::Yes {
            sections.push(Section::new(
                SectionKind::Comments,
                "Comments:",
                vec![self.comment.clone().unwrap_or_default()],
            ));
        }

        sections.push(Section::new(
            SectionKind::WordCounts,
            "Word Counts:",
            vec![
                format!("Original Report: {}", self.word_counts.original),
                format!("Summary: {}", self.word_counts.summary),
                format!("Patient-Friendly Report: {}", self.word_counts.patient_friendly),
                format!("Recommendations: {}", self.word_counts.recommendation),
            ],
        ));

        sections
    }

    pub fn section(&self, kind: SectionKind) -> Option<Section> {
        self.sections().into_iter().find(|s| s.kind == kind)
    }

    pub fn render_pdf(&self) -> Result<Vec<u8>, ReportError> {
        let mut writer = PageWriter::new(EXPORT_TITLE)?;

        for section in self.sections() {
            match section.kind {
                SectionKind::Title => {
                    writer.centered_title(&section.heading);
                    writer.gap(10.0);
                }
                _ => {
                    writer.heading(&section.heading);
                    for paragraph in &section.body {
                        writer.paragraph(paragraph);
                    }
                    writer.gap(5.0);
                }
            }
        }

        writer.finish()
    }
}

/// Writes `bytes` to `path`, replacing whatever an earlier export left there.
pub async fn write_export(path: &Path, bytes: &[u8]) -> Result<(), ReportError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| ReportError::Export(format!("Cannot create export directory: {}", e)))?;
    }

    tokio::fs::write(path, bytes)
        .await
        .map_err(|e| ReportError::Export(format!("Cannot write PDF: {}", e)))?;

    info!(path = %path.display(), bytes = bytes.len(), "exported report");
    Ok(())
}

/// Top-down text cursor that starts a new A4 page when the current one is full.
///
/// Text is set in the built-in Helvetica faces, which only cover WinAnsi
/// (Latin-1 plus a few typographic marks). Other characters, CJK for instance,
/// are not drawn; a warning counts them per paragraph.
struct PageWriter {
    doc: PdfDocumentReference,
    layer: PdfLayerReference,
    font: IndirectFontRef,
    bold: IndirectFontRef,
    y: f32,
}

impl PageWriter {
    fn new(title: &str) -> Result<Self, ReportError> {
        let (doc, page, layer) = PdfDocument::new(title, PAGE_WIDTH, PAGE_HEIGHT, "Layer 1");
        let layer = doc.get_page(page).get_layer(layer);
        let font = doc
            .add_builtin_font(BuiltinFont::Helvetica)
            .map_err(|e| ReportError::Export(format!("PDF font error: {}", e)))?;
        let bold = doc
            .add_builtin_font(BuiltinFont::HelveticaBold)
            .map_err(|e| ReportError::Export(format!("PDF font error: {}", e)))?;

        Ok(Self {
            doc,
            layer,
            font,
            bold,
            y: MARGIN_TOP,
        })
    }

    fn ensure_room(&mut self, height: f32) {
        if self.y - height < MARGIN_BOTTOM {
            let (page, layer) = self.doc.add_page(PAGE_WIDTH, PAGE_HEIGHT, "Layer 1");
            self.layer = self.doc.get_page(page).get_layer(layer);
            self.y = MARGIN_TOP;
        }
    }

    fn centered_title(&mut self, text: &str) {
        self.ensure_room(10.0);
        let width = text_width_mm(text, 14.0);
        let x = ((PAGE_WIDTH.0 - width) / 2.0).max(MARGIN_LEFT);
        self.layer
            .use_text(text, 14.0, Mm(x), Mm(self.y), &self.bold);
        self.y -= 10.0;
    }

    fn heading(&mut self, text: &str) {
        self.ensure_room(8.0);
        self.layer
            .use_text(text, 12.0, Mm(MARGIN_LEFT), Mm(self.y), &self.bold);
        self.y -= 8.0;
    }

    fn paragraph(&mut self, text: &str) {
        let unsupported = text.chars().filter(|c| !is_win_ansi(*c)).count();
        if unsupported > 0 {
            warn!(unsupported, "characters outside WinAnsi will be missing from the export");
        }

        for source_line in text.lines() {
            for line in wrap_text(source_line, TEXT_WIDTH_MM, BODY_SIZE) {
                self.ensure_room(5.5);
                self.layer
                    .use_text(line, BODY_SIZE, Mm(MARGIN_LEFT), Mm(self.y), &self.font);
                self.y -= 5.5;
            }
        }
    }

    fn gap(&mut self, height: f32) {
        self.y -= height;
    }

    fn finish(self) -> Result<Vec<u8>, ReportError> {
        let mut buf = BufWriter::new(Vec::new());
        self.doc
            .save(&mut buf)
            .map_err(|e| ReportError::Export(format!("PDF save error: {}", e)))?;
        buf.into_inner()
            .map_err(|e| ReportError::Export(format!("PDF buffer error: {}", e)))
    }
}

/// Helvetica advance width in thousandths of an em, rounded up per glyph class.
fn glyph_width(c: char) -> u16 {
    match c {
        'i' | 'j' | 'l' => 222,
        ' ' | '!' | ',' | '.' | '/' | ':' | ';' | 'I' | '[' | ']' | 'f' | 't' => 278,
        '(' | ')' | '-' | '`' | '\'' | 'r' => 333,
        '0'..='9' | 'a'..='h' | 'k' | 'n'..='q' | 's' | 'u' | 'v' | 'x'..='z' => 556,
        'w' => 722,
        'm' | 'M' => 833,
        'G' | 'O' | 'Q' => 778,
        'W' => 944,
        'A'..='Z' => 722,
        '%' => 889,
        '@' => 1015,
        c if c.is_ascii() => 584,
        _ => 1000,
    }
}

/// Printed width of `text` at `size` points, in millimetres.
fn text_width_mm(text: &str, size: f32) -> f32 {
    let em: u32 = text.chars().map(|c| u32::from(glyph_width(c))).sum();
    em as f32 / 1000.0 * size * PT_TO_MM
}

/// Whether the built-in fonts can draw `c`.
fn is_win_ansi(c: char) -> bool {
    matches!(c as u32, 0x20..=0x7E | 0xA0..=0xFF)
        || "€‚ƒ„…†‡ˆ‰Š‹ŒŽ‘’“”•–—˜™š›œžŸ".contains(c)
}

/// Greedy word wrap to `max_width` millimetres; a word wider than that gets a
/// line of its own.
fn wrap_text(text: &str, max_width: f32, size: f32) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        let candidate = if current.is_empty() {
            word.to_string()
        } else {
            format!("{} {}", current, word)
        };
        if text_width_mm(&candidate, size) > max_width && !current.is_empty() {
            lines.push(std::mem::replace(&mut current, word.to_string()));
        } else {
            current = candidate;
        }
    }

    if !current.is_empty() {
        lines.push(current);
    }
    lines
}
