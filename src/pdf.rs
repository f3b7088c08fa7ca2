//! Page text and word positions from catalog documents.
//!
//! Page text comes from [`pdf_extract`], run once on first use. It can panic
//! on malformed input, so the call is wrapped in [`std::panic::catch_unwind`]
//! with the panic hook silenced. Word positions are read straight from the
//! page content streams with [`lopdf`] and never touch the text extractor.

use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::OnceLock;

use anyhow::{anyhow, bail, Context, Result};
use lopdf::content::Content;
use lopdf::{Document, Object, ObjectId};
use tracing::debug;

/// Page separator in plain-text dumps (pdftotext convention).
const FORM_FEED: char = '\x0c';
/// Letter-size fallback when no MediaBox can be found.
const DEFAULT_PAGE_HEIGHT: f64 = 792.0;
/// Characters closer than this, in both directions, belong to one word.
const X_TOLERANCE: f64 = 3.0;
const Y_TOLERANCE: f64 = 3.0;
/// Glyph advance as a fraction of font size. No font metrics are read.
const GLYPH_WIDTH: f64 = 0.5;
/// A TJ adjustment wider than this (thousandths of an em) splits words.
const TJ_WORD_GAP: f64 = 200.0;

/// One word token with its page-relative position.
#[derive(Debug, Clone, PartialEq)]
pub struct Word {
    pub text: String,
    pub x: f64,
    /// Distance from the top edge of the page.
    pub top: f64,
}

pub trait TextSource {
    fn page_count(&self) -> usize;
    /// Plain text of the page at `index` (0-based).
    fn page_text(&self, index: usize) -> Result<String>;
    fn page_words(&self, index: usize) -> Result<Vec<Word>>;
}

fn is_text_dump(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("txt"))
}

/// Open `path` for text parsing: a PDF whose page text must extract, or a
/// form-feed separated text dump when it ends in `.txt`.
pub fn open(path: &Path) -> Result<Box<dyn TextSource>> {
    if is_text_dump(path) {
        return Ok(Box::new(TextPages::read(path)?));
    }
    let doc = PdfDocument::open(path)?;
    doc.text_pages()
        .with_context(|| format!("Failed to extract text from {}", path.display()))?;
    Ok(Box::new(doc))
}

/// Open `path` for the word dump. PDFs are only loaded with lopdf, so
/// documents the text extractor rejects can still be inspected.
pub fn open_for_words(path: &Path) -> Result<Box<dyn TextSource>> {
    if is_text_dump(path) {
        return Ok(Box::new(TextPages::read(path)?));
    }
    Ok(Box::new(PdfDocument::open(path)?))
}

pub struct PdfDocument {
    bytes: Vec<u8>,
    text: OnceLock<Result<Vec<String>, String>>,
    doc: Document,
    page_ids: Vec<ObjectId>,
}

impl PdfDocument {
    pub fn open(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
        let doc = Document::load_mem(&bytes).with_context(|| format!("Failed to load {}", path.display()))?;
        let page_ids: Vec<ObjectId> = doc.get_pages().into_values().collect();
        debug!("Opened {}: {} pages", path.display(), page_ids.len());
        Ok(Self {
            bytes,
            text: OnceLock::new(),
            doc,
            page_ids,
        })
    }

    /// Per-page text, extracted on first call.
    fn text_pages(&self) -> Result<&[String]> {
        self.text
            .get_or_init(|| extract_pages(&self.bytes).map_err(|e| format!("{:#}", e)))
            .as_deref()
            .map_err(|e| anyhow!("{}", e))
    }

    fn page_height(&self, page_id: ObjectId) -> f64 {
        // MediaBox may be inherited from an ancestor Pages node
        let mut current = Some(page_id);
        while let Some(id) = current {
            let Ok(dict) = self.doc.get_dictionary(id) else {
                break;
            };
            if let Ok(media_box) = dict.get(b"MediaBox").and_then(Object::as_array) {
                let nums: Vec<f64> = media_box
                    .iter()
                    .filter_map(|o| self.doc.dereference(o).ok())
                    .filter_map(|(_, o)| o.as_float().ok())
                    .map(f64::from)
                    .collect();
                if let [_, lly, _, ury] = nums[..] {
                    return ury - lly;
                }
            }
            current = dict.get(b"Parent").and_then(Object::as_reference).ok();
        }
        DEFAULT_PAGE_HEIGHT
    }
}

impl TextSource for PdfDocument {
    fn page_count(&self) -> usize {
        self.page_ids.len()
    }

    fn page_text(&self, index: usize) -> Result<String> {
        self.text_pages()?
            .get(index)
            .cloned()
            .ok_or_else(|| anyhow!("no text extracted for page {}", index + 1))
    }

    fn page_words(&self, index: usize) -> Result<Vec<Word>> {
        let Some(&page_id) = self.page_ids.get(index) else {
            bail!("page {} out of range", index + 1);
        };
        let data = self
            .doc
            .get_page_content(page_id)
            .with_context(|| format!("Failed to read content of page {}", index + 1))?;
        let content = Content::decode(&data).with_context(|| format!("Failed to decode content of page {}", index + 1))?;
        Ok(words_from_operations(&content.operations, self.page_height(page_id)))
    }
}

fn extract_pages(bytes: &[u8]) -> Result<Vec<String>> {
    // keep the default hook from printing a backtrace for a caught panic
    let hook = panic::take_hook();
    panic::set_hook(Box::new(|_| {}));
    let result = panic::catch_unwind(AssertUnwindSafe(|| pdf_extract::extract_text_from_mem_by_pages(bytes)));
    panic::set_hook(hook);
    match result {
        Ok(Ok(pages)) => Ok(pages),
        Ok(Err(e)) => Err(anyhow!("PDF extraction failed: {}", e)),
        Err(_) => Err(anyhow!("PDF extraction panicked (malformed document)")),
    }
}

/// Pages held in memory; used for text dumps and tests.
pub struct TextPages {
    pages: Vec<String>,
}

impl TextPages {
    pub fn new(pages: Vec<String>) -> Self {
        Self { pages }
    }

    pub fn read(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
        Ok(Self::parse(&text))
    }

    pub fn parse(text: &str) -> Self {
        let mut pages: Vec<String> = text.split(FORM_FEED).map(str::to_string).collect();
        // pdftotext ends every page with a form feed
        if pages.len() > 1 && pages.last().is_some_and(|p| p.trim().is_empty()) {
            pages.pop();
        }
        Self::new(pages)
    }
}

impl TextSource for TextPages {
    fn page_count(&self) -> usize {
        self.pages.len()
    }

    fn page_text(&self, index: usize) -> Result<String> {
        self.pages
            .get(index)
            .cloned()
            .ok_or_else(|| anyhow!("page {} out of range", index + 1))
    }

    /// Character column as `x`, line index as `top`.
    fn page_words(&self, index: usize) -> Result<Vec<Word>> {
        let text = self.page_text(index)?;
        let mut words = Vec::new();
        for (line_no, line) in text.lines().enumerate() {
            let mut start: Option<usize> = None;
            let chars: Vec<char> = line.chars().collect();
            for (col, &c) in chars.iter().chain(std::iter::once(&' ')).enumerate() {
                match (c.is_whitespace(), start) {
                    (false, None) => start = Some(col),
                    (true, Some(s)) => {
                        words.push(Word {
                            text: chars[s..col].iter().collect(),
                            x: s as f64,
                            top: line_no as f64,
                        });
                        start = None;
                    }
                    _ => {}
                }
            }
        }
        Ok(words)
    }
}

// ── Content stream walking ──

/// Affine matrix [a b c d e f] as used by PDF operators.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Matrix([f64; 6]);

impl Matrix {
    const IDENTITY: Matrix = Matrix([1.0, 0.0, 0.0, 1.0, 0.0, 0.0]);

    fn translation(tx: f64, ty: f64) -> Matrix {
        Matrix([1.0, 0.0, 0.0, 1.0, tx, ty])
    }

    /// `self` applied first, then `other`.
    fn then(self, other: Matrix) -> Matrix {
        let [a, b, c, d, e, f] = self.0;
        let [a2, b2, c2, d2, e2, f2] = other.0;
        Matrix([
            a * a2 + b * c2,
            a * b2 + b * d2,
            c * a2 + d * c2,
            c * b2 + d * d2,
            e * a2 + f * c2 + e2,
            e * b2 + f * d2 + f2,
        ])
    }

    fn vertical_scale(&self) -> f64 {
        let [_, _, c, d, _, _] = self.0;
        (c * c + d * d).sqrt()
    }
}

#[derive(Debug, Clone)]
struct TextState {
    ctm: Matrix,
    tm: Matrix,
    tlm: Matrix,
    font_size: f64,
    char_spacing: f64,
    word_spacing: f64,
    horizontal_scale: f64,
    leading: f64,
}

impl Default for TextState {
    fn default() -> Self {
        Self {
            ctm: Matrix::IDENTITY,
            tm: Matrix::IDENTITY,
            tlm: Matrix::IDENTITY,
            font_size: 0.0,
            char_spacing: 0.0,
            word_spacing: 0.0,
            horizontal_scale: 1.0,
            leading: 0.0,
        }
    }
}

impl TextState {
    fn move_line(&mut self, tx: f64, ty: f64) {
        self.tlm = Matrix::translation(tx, ty).then(self.tlm);
        self.tm = self.tlm;
    }

    fn advance(&mut self, tx: f64) {
        self.tm = Matrix::translation(tx, 0.0).then(self.tm);
    }

    /// Device-space position and size of the next glyph.
    fn glyph_origin(&self) -> (f64, f64, f64) {
        let m = self.tm.then(self.ctm);
        let [_, _, _, _, x, y] = m.0;
        (x, y, self.font_size * m.vertical_scale())
    }
}

/// Groups shown glyphs into words the way pdfplumber does by default.
struct WordBuilder {
    page_height: f64,
    words: Vec<Word>,
    current: Option<(Word, f64, f64)>, // (word, last glyph end x, baseline y)
}

impl WordBuilder {
    fn new(page_height: f64) -> Self {
        Self {
            page_height,
            words: Vec::new(),
            current: None,
        }
    }

    fn push(&mut self, c: char, x: f64, y: f64, size: f64, width: f64) {
        if c.is_whitespace() {
            self.flush();
            return;
        }
        if let Some((word, end_x, base_y)) = &mut self.current {
            if (x - *end_x).abs() <= X_TOLERANCE && (y - *base_y).abs() <= Y_TOLERANCE {
                word.text.push(c);
                *end_x = x + width;
                return;
            }
        }
        self.flush();
        let word = Word {
            text: c.to_string(),
            x,
            top: self.page_height - y - size,
        };
        self.current = Some((word, x + width, y));
    }

    fn flush(&mut self) {
        if let Some((word, _, _)) = self.current.take() {
            self.words.push(word);
        }
    }

    fn finish(mut self) -> Vec<Word> {
        self.flush();
        self.words
    }
}

fn number(obj: &Object) -> Option<f64> {
    obj.as_float().ok().map(f64::from)
}

fn numbers<const N: usize>(operands: &[Object]) -> Option<[f64; N]> {
    if operands.len() < N {
        return None;
    }
    let mut out = [0.0; N];
    for (slot, obj) in out.iter_mut().zip(operands) {
        *slot = number(obj)?;
    }
    Some(out)
}

/// Shown bytes as characters. Simple fonts only; multi-byte encodings come out garbled.
fn decode_string(bytes: &[u8]) -> Vec<char> {
    if let Some(rest) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        let units: Vec<u16> = rest.chunks_exact(2).map(|p| u16::from_be_bytes([p[0], p[1]])).collect();
        return char::decode_utf16(units)
            .map(|r| r.unwrap_or(char::REPLACEMENT_CHARACTER))
            .collect();
    }
    bytes.iter().map(|&b| b as char).collect()
}

fn show(bytes: &[u8], state: &mut TextState, builder: &mut WordBuilder) {
    for c in decode_string(bytes) {
        let (x, y, size) = state.glyph_origin();
        let mut advance = state.font_size * GLYPH_WIDTH + state.char_spacing;
        if c == ' ' {
            advance += state.word_spacing;
        }
        let advance = advance * state.horizontal_scale;
        let width = advance * state.tm.then(state.ctm).0[0];
        builder.push(c, x, y, size, width);
        state.advance(advance);
    }
}

fn words_from_operations(operations: &[lopdf::content::Operation], page_height: f64) -> Vec<Word> {
    let mut state = TextState::default();
    let mut saved: Vec<TextState> = Vec::new();
    let mut builder = WordBuilder::new(page_height);

    for op in operations {
        let operands = op.operands.as_slice();
        match op.operator.as_str() {
            "q" => saved.push(state.clone()),
            "Q" => {
                if let Some(prev) = saved.pop() {
                    state.ctm = prev.ctm;
                }
            }
            "cm" => {
                if let Some(m) = numbers::<6>(operands) {
                    state.ctm = Matrix(m).then(state.ctm);
                }
            }
            "BT" => {
                state.tm = Matrix::IDENTITY;
                state.tlm = Matrix::IDENTITY;
            }
            "ET" => builder.flush(),
            "Tf" => {
                if let Some(size) = operands.get(1).and_then(number) {
                    state.font_size = size;
                }
            }
            "Tc" => state.char_spacing = operands.first().and_then(number).unwrap_or(0.0),
            "Tw" => state.word_spacing = operands.first().and_then(number).unwrap_or(0.0),
            "Tz" => state.horizontal_scale = operands.first().and_then(number).unwrap_or(100.0) / 100.0,
            "TL" => state.leading = operands.first().and_then(number).unwrap_or(0.0),
            "Td" => {
                if let Some([tx, ty]) = numbers::<2>(operands) {
                    state.move_line(tx, ty);
                }
            }
            "TD" => {
                if let Some([tx, ty]) = numbers::<2>(operands) {
                    state.leading = -ty;
                    state.move_line(tx, ty);
                }
            }
            "Tm" => {
                if let Some(m) = numbers::<6>(operands) {
                    state.tm = Matrix(m);
                    state.tlm = Matrix(m);
                }
            }
            "T*" => state.move_line(0.0, -state.leading),
            "Tj" => {
                if let Some(Object::String(bytes, _)) = operands.first() {
                    show(bytes, &mut state, &mut builder);
                }
            }
            "'" => {
                state.move_line(0.0, -state.leading);
                if let Some(Object::String(bytes, _)) = operands.first() {
                    show(bytes, &mut state, &mut builder);
                }
            }
            "\"" => {
                if let Some([aw, ac]) = numbers::<2>(operands) {
                    state.word_spacing = aw;
                    state.char_spacing = ac;
                }
                state.move_line(0.0, -state.leading);
                if let Some(Object::String(bytes, _)) = operands.get(2) {
                    show(bytes, &mut state, &mut builder);
                }
            }
            "TJ" => {
                let Some(Object::Array(items)) = operands.first() else {
                    continue;
                };
                for item in items {
                    match item {
                        Object::String(bytes, _) => show(bytes, &mut state, &mut builder),
                        other => {
                            if let Some(adjust) = number(other) {
                                if adjust < -TJ_WORD_GAP {
                                    builder.flush();
                                }
                                let tx = -adjust / 1000.0 * state.font_size * state.horizontal_scale;
                                state.advance(tx);
                            }
                        }
                    }
                }
            }
            _ => {}
        }
    }

    builder.finish()
}

/// One-page PDF drawing "BuiRloom: G202" with a Type3 font that has no glyph
/// procedures; lopdf loads it, pdf-extract cannot extract its text.
#[cfg(test)]
pub(crate) fn write_type3_pdf(path: &Path) {
    use lopdf::content::Operation;
    use lopdf::{dictionary, Stream, StringFormat};

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type3",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });
    let content = Content {
        operations: vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec!["F1".into(), 10.into()]),
            Operation::new("Td", vec![72.into(), 700.into()]),
            Operation::new(
                "Tj",
                vec![Object::String(b"BuiRloom: G202".to_vec(), StringFormat::Literal)],
            ),
            Operation::new("ET", vec![]),
        ],
    };
    let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
    });
    let pages = dictionary! {
        "Type" => "Pages",
        "Kids" => vec![page_id.into()],
        "Count" => 1,
        "Resources" => resources_id,
        "MediaBox" => vec![0.into(), 0.into(), 612.into(), 842.into()],
    };
    doc.objects.insert(pages_id, Object::Dictionary(pages));
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.save(path).unwrap();
}
