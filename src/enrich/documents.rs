//! Text extraction for PDF, Word and spreadsheet documents

use calamine::{open_workbook_auto, Data, Reader};
use std::path::Path;
use thiserror::Error;

/// Characters of document text kept for classification
pub const DOCUMENT_TEXT_CHARS: usize = 1200;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("Failed to read {0}")]
    Io(#[from] std::io::Error),

    #[error("PDF extraction failed: {0}")]
    Pdf(String),

    #[error("DOCX parse failed: {0}")]
    Docx(String),

    #[error("Spreadsheet read failed: {0}")]
    Spreadsheet(#[from] calamine::Error),
}

/// Document kinds with a dedicated extractor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Pdf,
    Docx,
    Spreadsheet,
}

impl DocumentKind {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "pdf" => Some(Self::Pdf),
            "docx" => Some(Self::Docx),
            "xlsx" | "xlsm" | "xls" | "ods" => Some(Self::Spreadsheet),
            _ => None,
        }
    }
}

/// Extract, collapse whitespace and cap the text of a document
pub fn extract_document(path: &Path, kind: DocumentKind) -> Result<String, ExtractError> {
    let raw = match kind {
        DocumentKind::Pdf => extract_pdf(path)?,
        DocumentKind::Docx => extract_docx(path)?,
        DocumentKind::Spreadsheet => extract_spreadsheet(path)?,
    };

    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    Ok(crate::utils::truncate_chars(&collapsed, DOCUMENT_TEXT_CHARS).to_string())
}

fn extract_pdf(path: &Path) -> Result<String, ExtractError> {
    // The PDF parser panics on some malformed inputs
    let result = std::panic::catch_unwind(|| pdf_extract::extract_text(path));
    match result {
        Ok(Ok(text)) => Ok(text),
        Ok(Err(e)) => Err(ExtractError::Pdf(e.to_string())),
        Err(_) => Err(ExtractError::Pdf("parser panicked".to_string())),
    }
}

fn extract_docx(path: &Path) -> Result<String, ExtractError> {
    use docx_rs::{DocumentChild, ParagraphChild, RunChild};

    let bytes = std::fs::read(path)?;
    let docx = docx_rs::read_docx(&bytes).map_err(|e| ExtractError::Docx(e.to_string()))?;

    let mut paragraphs = Vec::new();
    for child in &docx.document.children {
        let DocumentChild::Paragraph(paragraph) = child else {
            continue;
        };

        let mut line = String::new();
        for run in &paragraph.children {
            let ParagraphChild::Run(run) = run else {
                continue;
            };
            for piece in &run.children {
                if let RunChild::Text(text) = piece {
                    line.push_str(&text.text);
                }
            }
        }

        if !line.is_empty() {
            paragraphs.push(line);
        }
    }

    Ok(paragraphs.join("\n"))
}

fn extract_spreadsheet(path: &Path) -> Result<String, ExtractError> {
    let mut workbook = open_workbook_auto(path)?;
    let mut out = String::new();

    for name in workbook.sheet_names() {
        let range = workbook.worksheet_range(&name)?;
        out.push_str(&name);
        out.push('\n');

        for row in range.rows() {
            let cells: Vec<String> = row
                .iter()
                .filter(|cell| !matches!(cell, Data::Empty))
                .map(|cell| cell.to_string())
                .collect();
            if !cells.is_empty() {
                out.push_str(&cells.join(" "));
                out.push('\n');
            }
        }

        if out.chars().count() > DOCUMENT_TEXT_CHARS {
            break;
        }
    }

    Ok(out)
}
