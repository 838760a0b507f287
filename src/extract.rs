//! PDF bytes to ordered pages of text lines, with optional word positions
//! and an OCR fallback for image-only documents.

use std::path::PathBuf;
use std::process::Command;
use std::sync::OnceLock;

use regex::Regex;
use tracing::{debug, info, warn};

use crate::error::{LedgerError, Result};

/// Fewer non-whitespace characters than this means "no text layer".
const MIN_TEXT_CHARS: usize = 20;

#[derive(Debug, Clone, PartialEq)]
pub struct Word {
    pub text: String,
    pub x: f64,
    /// Distance from the top of the page.
    pub y: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    pub lines: Vec<String>,
    pub words: Vec<Word>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextOrigin {
    TextLayer,
    Ocr,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub pages: Vec<Page>,
    pub origin: TextOrigin,
}

impl Document {
    /// Build from plain text; form feeds separate pages.
    pub fn from_text(text: &str) -> Self {
        Self::from_pages(text.split('\u{000C}').map(str::to_string).collect(), TextOrigin::TextLayer)
    }

    pub fn from_pages(pages: Vec<String>, origin: TextOrigin) -> Self {
        let pages = pages
            .iter()
            .map(|p| Page {
                lines: p
                    .lines()
                    .map(|l| l.trim_end().to_string())
                    .filter(|l| !l.trim().is_empty())
                    .collect(),
                words: Vec::new(),
            })
            .filter(|p| !p.lines.is_empty())
            .collect();
        Self { pages, origin }
    }

    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.pages.iter().flat_map(|p| p.lines.iter().map(String::as_str))
    }

    pub fn full_text(&self) -> String {
        self.lines().collect::<Vec<_>>().join("\n")
    }

    pub fn has_words(&self) -> bool {
        self.pages.iter().any(|p| !p.words.is_empty())
    }

    fn char_count(&self) -> usize {
        self.lines()
            .map(|l| l.chars().filter(|c| !c.is_whitespace()).count())
            .sum()
    }
}

/// Image-to-text backend used when a PDF has no text layer.
pub trait OcrEngine: Send + Sync {
    /// One recognized text string per page, in page order.
    fn recognize(&self, pdf: &[u8]) -> Result<Vec<String>>;
}

/// Rasterizes with `pdftoppm` and recognizes each page with `tesseract`.
pub struct CommandOcr {
    lang: String,
    dpi: u32,
}

impl CommandOcr {
    pub fn new(lang: &str) -> Self {
        Self {
            lang: lang.to_string(),
            dpi: 300,
        }
    }

    pub fn available() -> bool {
        which::which("pdftoppm").is_ok() && which::which("tesseract").is_ok()
    }
}

impl OcrEngine for CommandOcr {
    fn recognize(&self, pdf: &[u8]) -> Result<Vec<String>> {
        let scratch = scratch_dir()?;
        let input = scratch.path().join("input.pdf");
        std::fs::write(&input, pdf)?;
        let prefix = scratch.path().join("page");

        let output = Command::new("pdftoppm")
            .arg("-r")
            .arg(self.dpi.to_string())
            .arg("-png")
            .arg(&input)
            .arg(&prefix)
            .output()?;
        if !output.status.success() {
            return Err(LedgerError::UnreadableDocument(format!(
                "pdftoppm failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let mut images: Vec<PathBuf> = std::fs::read_dir(scratch.path())?
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| p.extension().is_some_and(|e| e == "png"))
            .collect();
        images.sort();

        let mut pages = Vec::with_capacity(images.len());
        for image in &images {
            let output = Command::new("tesseract")
                .arg(image)
                .arg("stdout")
                .arg("-l")
                .arg(&self.lang)
                .output()?;
            if !output.status.success() {
                warn!(image = %image.display(), "tesseract failed on page");
                pages.push(String::new());
                continue;
            }
            pages.push(String::from_utf8_lossy(&output.stdout).to_string());
        }
        Ok(pages)
    }
}

pub struct TextExtractor {
    ocr: Option<Box<dyn OcrEngine>>,
    positional: bool,
}

impl Default for TextExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl TextExtractor {
    /// Text layer only; word positions when poppler's `pdftotext` is on PATH.
    pub fn new() -> Self {
        Self {
            ocr: None,
            positional: which::which("pdftotext").is_ok(),
        }
    }

    pub fn with_ocr(mut self, ocr: Box<dyn OcrEngine>) -> Self {
        self.ocr = Some(ocr);
        self
    }

    pub fn extract(&self, bytes: &[u8]) -> Result<Document> {
        if !bytes.starts_with(b"%PDF") {
            return Err(LedgerError::UnreadableDocument("missing %PDF header".to_string()));
        }

        // pdf-extract panics on some malformed inputs
        let text = match std::panic::catch_unwind(|| pdf_extract::extract_text_from_mem(bytes)) {
            Ok(Ok(text)) => text,
            Ok(Err(e)) => return Err(LedgerError::UnreadableDocument(e.to_string())),
            Err(_) => {
                return Err(LedgerError::UnreadableDocument(
                    "PDF parser aborted on malformed content".to_string(),
                ))
            }
        };

        let mut doc = Document::from_text(&text);
        if doc.char_count() < MIN_TEXT_CHARS {
            return self.recognize(bytes);
        }

        if self.positional {
            match positioned_words(bytes) {
                Ok(pages) => attach_words(&mut doc, pages),
                Err(e) => warn!(error = %e, "word positions unavailable"),
            }
        }
        debug!(pages = doc.pages.len(), "extracted text layer");
        Ok(doc)
    }

    fn recognize(&self, bytes: &[u8]) -> Result<Document> {
        let Some(ocr) = &self.ocr else {
            return Err(LedgerError::NoText);
        };
        info!("no text layer, running OCR");
        let pages = ocr.recognize(bytes).map_err(|e| {
            warn!(error = %e, "OCR failed");
            LedgerError::NoText
        })?;
        let doc = Document::from_pages(pages, TextOrigin::Ocr);
        if doc.char_count() == 0 {
            return Err(LedgerError::NoText);
        }
        Ok(doc)
    }
}

fn attach_words(doc: &mut Document, pages: Vec<Vec<Word>>) {
    for (i, words) in pages.into_iter().enumerate() {
        if words.is_empty() {
            continue;
        }
        if i >= doc.pages.len() {
            doc.pages.resize_with(i + 1, Page::default);
        }
        doc.pages[i].words = words;
    }
}

fn bbox_word_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"<word xMin="([\d.]+)" yMin="([\d.]+)" xMax="[\d.]+" yMax="[\d.]+">([^<]*)</word>"#)
            .expect("bbox word regex")
    })
}

/// Run `pdftotext -bbox` and collect words per page.
fn positioned_words(bytes: &[u8]) -> Result<Vec<Vec<Word>>> {
    let scratch = scratch_dir()?;
    let input = scratch.path().join("input.pdf");
    std::fs::write(&input, bytes)?;
    let output = Command::new("pdftotext").arg("-bbox").arg(&input).arg("-").output()?;
    if !output.status.success() {
        return Err(LedgerError::Other(format!(
            "pdftotext failed (exit {}): {}",
            output.status.code().unwrap_or(-1),
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    Ok(parse_bbox_html(&String::from_utf8_lossy(&output.stdout)))
}

pub(crate) fn parse_bbox_html(html: &str) -> Vec<Vec<Word>> {
    html.split("<page ")
        .skip(1)
        .map(|page| {
            bbox_word_re()
                .captures_iter(page)
                .filter_map(|caps| {
                    Some(Word {
                        x: caps[1].parse().ok()?,
                        y: caps[2].parse().ok()?,
                        text: unescape(&caps[3]),
                    })
                })
                .collect()
        })
        .collect()
}

fn unescape(s: &str) -> String {
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

/// Working directory for external tools, removed on drop.
fn scratch_dir() -> Result<tempfile::TempDir> {
    Ok(tempfile::Builder::new().prefix("ledgerlens-").tempdir()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedOcr(Vec<String>);

    impl OcrEngine for FixedOcr {
        fn recognize(&self, _pdf: &[u8]) -> Result<Vec<String>> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn test_from_text_splits_pages_and_drops_blank_lines() {
        let doc = Document::from_text("Page one\n\n  line two  \n\u{000C}Page two\n");
        assert_eq!(doc.pages.len(), 2);
        assert_eq!(doc.pages[0].lines, vec!["Page one", "  line two"]);
        assert_eq!(doc.origin, TextOrigin::TextLayer);
    }

    #[test]
    fn test_text_layer_pdf() {
        let bytes = include_bytes!("../tests/fixtures/statement.pdf");
        let extractor = TextExtractor { ocr: None, positional: false };
        let doc = extractor.extract(bytes).unwrap();
        assert_eq!(doc.origin, TextOrigin::TextLayer);
        let lines: Vec<String> = doc
            .lines()
            .map(|l| l.split_whitespace().collect::<Vec<_>>().join(" "))
            .collect();
        assert!(lines.iter().any(|l| l == "05/02/24 STARBUCKS STORE #123 $4.75"), "{lines:?}");
        assert!(lines.iter().any(|l| l == "Closing Date: 05/31/2024"), "{lines:?}");
    }

    #[test]
    fn test_truncated_pdf_is_unreadable() {
        let bytes = include_bytes!("../tests/fixtures/statement.pdf");
        let err = TextExtractor::new().extract(&bytes[..40]).unwrap_err();
        assert!(matches!(err, LedgerError::UnreadableDocument(_)));
    }

    #[test]
    fn test_non_pdf_is_unreadable() {
        let err = TextExtractor::new().extract(b"hello world").unwrap_err();
        assert!(matches!(err, LedgerError::UnreadableDocument(_)));
    }

    #[test]
    fn test_ocr_without_engine_is_no_text() {
        let extractor = TextExtractor { ocr: None, positional: false };
        assert!(matches!(extractor.recognize(b"%PDF-1.4"), Err(LedgerError::NoText)));
    }

    #[test]
    fn test_ocr_engine_output_becomes_document() {
        let extractor = TextExtractor { ocr: None, positional: false }
            .with_ocr(Box::new(FixedOcr(vec!["05/02/24 COFFEE $4.75".to_string()])));
        let doc = extractor.recognize(b"%PDF-1.4").unwrap();
        assert_eq!(doc.origin, TextOrigin::Ocr);
        assert_eq!(doc.pages[0].lines[0], "05/02/24 COFFEE $4.75");
    }

    #[test]
    fn test_empty_ocr_is_no_text() {
        let extractor = TextExtractor { ocr: None, positional: false }
            .with_ocr(Box::new(FixedOcr(vec!["   ".to_string()])));
        assert!(matches!(extractor.recognize(b"%PDF-1.4"), Err(LedgerError::NoText)));
    }

    #[test]
    fn test_scratch_dirs_are_distinct_and_removed() {
        let a = scratch_dir().unwrap();
        let b = scratch_dir().unwrap();
        assert_ne!(a.path(), b.path());
        let path = a.path().to_path_buf();
        assert!(path.is_dir());
        drop(a);
        assert!(!path.exists());
    }

    #[test]
    fn test_parse_bbox_html() {
        let html = r#"<doc>
<page width="612.000000" height="792.000000">
<word xMin="72.000000" yMin="100.100000" xMax="110.000000" yMax="110.000000">05/02/24</word>
<word xMin="120.000000" yMin="100.400000" xMax="180.000000" yMax="110.000000">AT&amp;T</word>
</page>
<page width="612.000000" height="792.000000">
</page>
</doc>"#;
        let pages = parse_bbox_html(html);
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].len(), 2);
        assert_eq!(pages[0][1].text, "AT&T");
        assert!((pages[0][0].y - 100.1).abs() < 1e-9);
        assert!(pages[1].is_empty());
    }
}
