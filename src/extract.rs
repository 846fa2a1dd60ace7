//! Upload text extraction and structure heuristics.
//!
//! Turns uploaded bytes into plain UTF-8 text. Text formats are decoded
//! directly; PDF goes through `pdf-extract`; DOCX / PPTX / XLSX are ZIP
//! archives whose XML parts are walked with `quick-xml`. The content type
//! comes from the upload's MIME type, falling back to the file extension
//! when the MIME type is missing or generic.

use std::io::Read;
use std::path::Path;

use quick_xml::events::Event;
use serde::Serialize;
use thiserror::Error;

pub const MIME_PDF: &str = "application/pdf";
pub const MIME_DOCX: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
pub const MIME_PPTX: &str =
    "application/vnd.openxmlformats-officedocument.presentationml.presentation";
pub const MIME_XLSX: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";
const MIME_OCTET: &str = "application/octet-stream";

/// Maximum sheets to read from an xlsx.
const XLSX_MAX_SHEETS: usize = 100;
/// Maximum decompressed bytes to read from a single ZIP entry (zip-bomb protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("unsupported content type: {0}")]
    UnsupportedContentType(String),
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
    #[error("OOXML extraction failed: {0}")]
    Ooxml(String),
    #[error("no extractable text")]
    Empty,
}

type ExtractResult<T> = Result<T, ExtractError>;

/// Decide the effective content type of an upload.
///
/// An explicit, non-generic MIME type wins; otherwise the file extension
/// decides. Returns `None` when neither identifies a supported type.
pub fn resolve_content_type(mime: Option<&str>, file_name: Option<&str>) -> Option<String> {
    let declared = mime
        .map(|m| m.split(';').next().unwrap_or(m).trim().to_ascii_lowercase())
        .filter(|m| !m.is_empty() && m != MIME_OCTET);
    if let Some(m) = declared {
        return Some(m);
    }

    let ext = file_name
        .and_then(|n| Path::new(n).extension())
        .and_then(|e| e.to_str())?
        .to_ascii_lowercase();
    let mime = match ext.as_str() {
        "md" | "markdown" => "text/markdown",
        "txt" | "text" | "log" => "text/plain",
        "csv" => "text/csv",
        "html" | "htm" => "text/html",
        "json" => "application/json",
        "pdf" => MIME_PDF,
        "docx" => MIME_DOCX,
        "pptx" => MIME_PPTX,
        "xlsx" => MIME_XLSX,
        _ => return None,
    };
    Some(mime.to_string())
}

fn is_plain_text(content_type: &str) -> bool {
    content_type.starts_with("text/")
        || content_type == "application/json"
        || content_type == "application/x-markdown"
}

/// Extract plain text from `bytes` of the given content type.
///
/// Text that is empty after trimming is [`ExtractError::Empty`].
pub fn extract_text(bytes: &[u8], content_type: &str) -> ExtractResult<String> {
    let text = if is_plain_text(content_type) {
        String::from_utf8_lossy(bytes).into_owned()
    } else {
        match content_type {
            MIME_PDF => pdf_extract::extract_text_from_mem(bytes)
                .map_err(|e| ExtractError::Pdf(e.to_string()))?,
            MIME_DOCX => extract_docx(bytes)?,
            MIME_PPTX => extract_pptx(bytes)?,
            MIME_XLSX => extract_xlsx(bytes)?,
            other => return Err(ExtractError::UnsupportedContentType(other.to_string())),
        }
    };

    if text.trim().is_empty() {
        return Err(ExtractError::Empty);
    }
    Ok(text)
}

type Archive<'a> = zip::ZipArchive<std::io::Cursor<&'a [u8]>>;

fn open_archive(bytes: &[u8]) -> ExtractResult<Archive<'_>> {
    zip::ZipArchive::new(std::io::Cursor::new(bytes)).map_err(|e| ExtractError::Ooxml(e.to_string()))
}

fn read_entry(archive: &mut Archive<'_>, name: &str) -> ExtractResult<Vec<u8>> {
    let entry = archive
        .by_name(name)
        .map_err(|e| ExtractError::Ooxml(format!("{}: {}", name, e)))?;
    let mut out = Vec::new();
    entry
        .take(MAX_XML_ENTRY_BYTES)
        .read_to_end(&mut out)
        .map_err(|e| ExtractError::Ooxml(e.to_string()))?;
    if out.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(ExtractError::Ooxml(format!(
            "ZIP entry {} exceeds size limit ({} bytes)",
            name, MAX_XML_ENTRY_BYTES
        )));
    }
    Ok(out)
}

/// Entries under `prefix` named `<prefix>N.xml`, sorted by `N`.
fn numbered_entries(archive: &Archive<'_>, prefix: &str) -> Vec<String> {
    let mut names: Vec<String> = archive
        .file_names()
        .filter(|n| n.starts_with(prefix) && n.ends_with(".xml"))
        .map(|s| s.to_string())
        .collect();
    names.sort_by_key(|name| {
        name.trim_start_matches(prefix)
            .trim_end_matches(".xml")
            .parse::<u32>()
            .unwrap_or(u32::MAX)
    });
    names
}

/// Collect the text of every `<…:t>` element in `xml`, appending `sep`
/// whenever a `block` element closes.
fn collect_text(xml: &[u8], block: &[u8], sep: char) -> ExtractResult<String> {
    let mut out = String::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut in_text = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"t" => in_text = true,
            Ok(Event::Text(te)) if in_text => {
                let text = te
                    .unescape()
                    .map_err(|e| ExtractError::Ooxml(e.to_string()))?;
                out.push_str(&text);
            }
            Ok(Event::End(e)) => {
                let name = e.local_name();
                if name.as_ref() == b"t" {
                    in_text = false;
                } else if name.as_ref() == block && !out.is_empty() && !out.ends_with(sep) {
                    out.push(sep);
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::Ooxml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(out.trim_end().to_string())
}

fn extract_docx(bytes: &[u8]) -> ExtractResult<String> {
    let mut archive = open_archive(bytes)?;
    let xml = read_entry(&mut archive, "word/document.xml")?;
    collect_text(&xml, b"p", '\n')
}

fn extract_pptx(bytes: &[u8]) -> ExtractResult<String> {
    let mut archive = open_archive(bytes)?;
    let mut parts = Vec::new();
    for name in numbered_entries(&archive, "ppt/slides/slide") {
        let xml = read_entry(&mut archive, &name)?;
        let text = collect_text(&xml, b"p", '\n')?;
        if !text.is_empty() {
            parts.push(text);
        }
    }
    Ok(parts.join("\n\n"))
}

/// Shared strings plus inline strings of every sheet. Numeric cells are
/// not text and are skipped.
fn extract_xlsx(bytes: &[u8]) -> ExtractResult<String> {
    let mut archive = open_archive(bytes)?;
    let mut parts = Vec::new();

    if archive.index_for_name("xl/sharedStrings.xml").is_some() {
        let xml = read_entry(&mut archive, "xl/sharedStrings.xml")?;
        parts.push(collect_text(&xml, b"si", '\n')?);
    }
    for name in numbered_entries(&archive, "xl/worksheets/sheet")
        .into_iter()
        .take(XLSX_MAX_SHEETS)
    {
        let xml = read_entry(&mut archive, &name)?;
        let inline = collect_text(&xml, b"is", '\n')?;
        if !inline.is_empty() {
            parts.push(inline);
        }
    }
    Ok(parts.join("\n"))
}

/// Lightweight structure facts about extracted text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TextStructure {
    pub char_count: usize,
    pub word_count: usize,
    pub line_count: usize,
    pub heading_count: usize,
    pub looks_like_markdown: bool,
}

fn is_markdown_heading(line: &str) -> bool {
    let trimmed = line.trim_start();
    let hashes = trimmed.chars().take_while(|c| *c == '#').count();
    (1..=6).contains(&hashes) && trimmed[hashes..].starts_with(' ')
}

/// Compute [`TextStructure`] for `text`.
///
/// Text looks like Markdown when it has a heading, or at least two lines
/// that are list items, fenced code or links.
pub fn analyze_structure(text: &str) -> TextStructure {
    let mut heading_count = 0;
    let mut markdown_lines = 0;
    let mut line_count = 0;

    for line in text.lines() {
        line_count += 1;
        let trimmed = line.trim_start();
        if is_markdown_heading(line) {
            heading_count += 1;
        } else if trimmed.starts_with("- ")
            || trimmed.starts_with("* ")
            || trimmed.starts_with("```")
            || trimmed.starts_with("> ")
            || trimmed.contains("](")
        {
            markdown_lines += 1;
        }
    }

    TextStructure {
        char_count: text.chars().count(),
        word_count: text.split_whitespace().count(),
        line_count,
        heading_count,
        looks_like_markdown: heading_count > 0 || markdown_lines >= 2,
    }
}
