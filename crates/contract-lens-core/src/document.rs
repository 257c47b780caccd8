//! PDF text extraction.
//!
//! Two strategies are tried in order: the lopdf text layer (font-aware
//! decoding) and a raw scan of the page content streams for text-showing
//! operators. A strategy that errors or panics counts as failed.

use std::{
    fs,
    panic::{self, AssertUnwindSafe},
    path::{Path, PathBuf},
};

use anyhow::{anyhow, Context};
use lopdf::{content::Content, Document, Object};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::error::{Result, ReviewError};

/// Upper bound on accepted contract files.
pub const MAX_FILE_SIZE: u64 = 100 * 1024 * 1024;

/// One way of turning PDF bytes into per-page text.
pub trait TextStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Text of each page in document order; empty strings for pages without text.
    fn extract_pages(&self, pdf: &[u8]) -> anyhow::Result<Vec<String>>;
}

/// Font-aware extraction through lopdf's text layer support.
#[derive(Debug, Default, Clone, Copy)]
pub struct TextLayerStrategy;

impl TextStrategy for TextLayerStrategy {
    fn name(&self) -> &'static str {
        "text-layer"
    }

    fn extract_pages(&self, pdf: &[u8]) -> anyhow::Result<Vec<String>> {
        let doc = load_document(pdf)?;
        Ok(collect_pages(self.name(), doc.get_pages().into_keys(), |number| {
            doc.extract_text(&[number])
                .with_context(|| format!("text layer unreadable on page {number}"))
        }))
    }
}

/// Fallback that reads string operands of `Tj`, `TJ`, `'` and `"` operators directly.
#[derive(Debug, Default, Clone, Copy)]
pub struct ContentStreamStrategy;

impl TextStrategy for ContentStreamStrategy {
    fn name(&self) -> &'static str {
        "content-stream"
    }

    fn extract_pages(&self, pdf: &[u8]) -> anyhow::Result<Vec<String>> {
        let doc = load_document(pdf)?;
        let pages = doc.get_pages();
        Ok(collect_pages(self.name(), pages.keys().copied(), |number| {
            let page_id = pages
                .get(&number)
                .copied()
                .ok_or_else(|| anyhow!("page {number} vanished"))?;
            let content = doc.get_and_decode_page_content(page_id)?;
            Ok(content_text(&content))
        }))
    }
}

/// Run `extract` for every page; an unreadable page is logged and kept as an empty entry.
fn collect_pages<I, F>(strategy: &str, numbers: I, mut extract: F) -> Vec<String>
where
    I: IntoIterator<Item = u32>,
    F: FnMut(u32) -> anyhow::Result<String>,
{
    numbers
        .into_iter()
        .map(|number| {
            extract(number).unwrap_or_else(|err| {
                warn!(
                    strategy,
                    page = number,
                    error = %format!("{err:#}"),
                    "page unreadable; skipping"
                );
                String::new()
            })
        })
        .collect()
}

fn load_document(pdf: &[u8]) -> anyhow::Result<Document> {
    let mut doc = Document::load_mem(pdf).context("failed to parse PDF structure")?;
    if doc.is_encrypted() {
        // Owner-only protection opens with the empty user password.
        doc.decrypt("")
            .map_err(|err| anyhow!("PDF is encrypted and needs a password ({err})"))?;
        debug!("decrypted PDF with the empty user password");
    }
    Ok(doc)
}

fn content_text(content: &Content) -> String {
    let mut text = String::new();
    for op in &content.operations {
        match op.operator.as_str() {
            "Tj" => push_operand(&mut text, op.operands.last()),
            "'" | "\"" => {
                newline(&mut text);
                push_operand(&mut text, op.operands.last());
            }
            "TJ" => {
                if let Some(Object::Array(items)) = op.operands.first() {
                    for item in items {
                        match item {
                            Object::String(..) => push_operand(&mut text, Some(item)),
                            // Large negative kerning is how most producers encode a word gap.
                            Object::Integer(n) if *n < -200 => text.push(' '),
                            Object::Real(n) if *n < -200.0 => text.push(' '),
                            _ => {}
                        }
                    }
                }
            }
            "T*" | "ET" => newline(&mut text),
            "Td" | "TD" => {
                let moves_down = op
                    .operands
                    .get(1)
                    .and_then(|y| y.as_float().ok())
                    .is_some_and(|y| y != 0.0);
                if moves_down {
                    newline(&mut text);
                }
            }
            _ => {}
        }
    }
    text
}

fn push_operand(text: &mut String, operand: Option<&Object>) {
    if let Some(Object::String(bytes, _)) = operand {
        text.push_str(&decode_pdf_string(bytes));
    }
}

fn newline(text: &mut String) {
    if !text.is_empty() && !text.ends_with('\n') {
        text.push('\n');
    }
}

fn decode_pdf_string(bytes: &[u8]) -> String {
    if let Some(utf16) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        let units: Vec<u16> = utf16
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        return String::from_utf16_lossy(&units);
    }
    bytes.iter().map(|&b| b as char).collect()
}

/// Outcome of a pre-flight file check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileCheck {
    pub passed: bool,
    pub message: String,
}

impl FileCheck {
    fn pass(message: impl Into<String>) -> Self {
        Self {
            passed: true,
            message: message.into(),
        }
    }

    fn fail(message: impl Into<String>) -> Self {
        Self {
            passed: false,
            message: message.into(),
        }
    }
}

/// Basic facts about a PDF file; never produced by a failing call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentInfo {
    pub path: PathBuf,
    pub file_size: u64,
    pub page_count: usize,
    pub is_valid: bool,
    pub error: Option<String>,
}

impl DocumentInfo {
    pub fn size_mb(&self) -> f64 {
        self.file_size as f64 / 1024.0 / 1024.0
    }
}

/// Extracts contract text from PDF files.
pub struct PdfReader {
    primary: Box<dyn TextStrategy>,
    secondary: Box<dyn TextStrategy>,
}

impl Default for PdfReader {
    fn default() -> Self {
        Self::with_strategies(Box::new(TextLayerStrategy), Box::new(ContentStreamStrategy))
    }
}

impl PdfReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_strategies(
        primary: Box<dyn TextStrategy>,
        secondary: Box<dyn TextStrategy>,
    ) -> Self {
        Self { primary, secondary }
    }

    /// Extract the text of every page, each prefixed with a `--- Page N ---` marker.
    #[instrument(skip_all, fields(path = %path.display()))]
    pub fn extract_text(&self, path: &Path) -> Result<String> {
        if !path.exists() {
            return Err(ReviewError::NotFound(path.to_path_buf()));
        }
        let bytes = fs::read(path)?;

        let mut failures = Vec::new();
        for strategy in [self.primary.as_ref(), self.secondary.as_ref()] {
            match run_strategy(strategy, &bytes) {
                Ok(text) if !text.trim().is_empty() => {
                    info!(
                        strategy = strategy.name(),
                        chars = text.chars().count(),
                        "text extracted"
                    );
                    return Ok(text);
                }
                Ok(_) => {
                    warn!(strategy = strategy.name(), "strategy produced no text");
                    failures.push(format!("{}: no text", strategy.name()));
                }
                Err(err) => {
                    warn!(strategy = strategy.name(), error = %err, "strategy failed");
                    failures.push(format!("{}: {err:#}", strategy.name()));
                }
            }
        }

        Err(ReviewError::Extraction {
            path: path.to_path_buf(),
            reason: failures.join("; "),
        })
    }

    /// Page count, size and validity. Parsing problems are reported in the result.
    pub fn get_info(&self, path: &Path) -> DocumentInfo {
        let mut info = DocumentInfo {
            path: path.to_path_buf(),
            file_size: 0,
            page_count: 0,
            is_valid: false,
            error: None,
        };
        let parsed = fs::metadata(path)
            .map_err(anyhow::Error::from)
            .and_then(|meta| {
                info.file_size = meta.len();
                let bytes = fs::read(path)?;
                panic::catch_unwind(|| load_document(&bytes))
                    .map_err(|_| anyhow!("PDF parser panicked"))?
            });
        match parsed {
            Ok(doc) => {
                info.page_count = doc.get_pages().len();
                info.is_valid = true;
            }
            Err(err) => {
                warn!(path = %path.display(), error = %err, "failed to inspect PDF");
                info.error = Some(format!("{err:#}"));
            }
        }
        info
    }

    /// Reject paths that are missing, not PDFs, empty or above [`MAX_FILE_SIZE`].
    pub fn validate(&self, path: &Path) -> FileCheck {
        if !path.exists() {
            return FileCheck::fail(format!("file does not exist: {}", path.display()));
        }
        let is_pdf = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));
        if !is_pdf {
            return FileCheck::fail("only PDF files are supported");
        }
        let size = match fs::metadata(path) {
            Ok(meta) => meta.len(),
            Err(err) => return FileCheck::fail(format!("cannot read file metadata: {err}")),
        };
        if size == 0 {
            return FileCheck::fail("file is empty");
        }
        if size > MAX_FILE_SIZE {
            return FileCheck::fail(format!(
                "file is too large: {:.1} MB exceeds the {} MB limit",
                size as f64 / 1024.0 / 1024.0,
                MAX_FILE_SIZE / 1024 / 1024
            ));
        }
        FileCheck::pass("valid PDF file")
    }
}

fn run_strategy(strategy: &dyn TextStrategy, bytes: &[u8]) -> anyhow::Result<String> {
    let pages = panic::catch_unwind(AssertUnwindSafe(|| strategy.extract_pages(bytes)))
        .map_err(|_| anyhow!("extractor panicked"))??;
    let mut parts = Vec::with_capacity(pages.len());
    for (idx, page) in pages.iter().enumerate() {
        let page_text = page.trim();
        if page_text.is_empty() {
            debug!(strategy = strategy.name(), page = idx + 1, "page has no text");
            continue;
        }
        parts.push(format!("--- Page {} ---\n{}", idx + 1, page_text));
    }
    Ok(parts.join("\n\n"))
}

#[cfg(test)]
pub(crate) mod fixtures {
    use lopdf::content::{Content, Operation};
    use lopdf::{dictionary, Document, Object, Stream};

    /// Build a minimal PDF with one page per entry; `None` produces a page without text.
    pub fn pdf_bytes(pages: &[Option<&str>]) -> Vec<u8> {
        save(build_document(pages))
    }

    /// Same as [`pdf_bytes`] but with a standard security handler lopdf cannot open.
    pub fn encrypted_pdf_bytes(pages: &[Option<&str>]) -> Vec<u8> {
        let mut doc = build_document(pages);
        let encrypt_id = doc.add_object(dictionary! {
            "Filter" => "Standard",
            "V" => 4,
            "R" => 4,
            "Length" => 128,
        });
        doc.trailer.set("Encrypt", encrypt_id);
        save(doc)
    }

    fn build_document(pages: &[Option<&str>]) -> Document {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Courier",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });

        let mut kids: Vec<Object> = Vec::new();
        for page in pages {
            let operations = match page {
                Some(text) => vec![
                    Operation::new("BT", vec![]),
                    Operation::new("Tf", vec!["F1".into(), 12.into()]),
                    Operation::new("Td", vec![72.into(), 720.into()]),
                    Operation::new("Tj", vec![Object::string_literal(*text)]),
                    Operation::new("ET", vec![]),
                ],
                None => vec![
                    Operation::new("q", vec![]),
                    Operation::new("Q", vec![]),
                ],
            };
            let content = Content { operations };
            let content_id =
                doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
                "Resources" => resources_id,
                "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            });
            kids.push(page_id.into());
        }

        let count = kids.len() as i64;
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        doc
    }

    fn save(mut doc: Document) -> Vec<u8> {
        let mut out = Vec::new();
        doc.save_to(&mut out).unwrap();
        out
    }
}
