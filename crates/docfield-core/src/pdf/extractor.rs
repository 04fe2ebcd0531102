//! Positioned word extraction from PDF content streams using lopdf.

use std::collections::BTreeMap;
use std::path::Path;

use lopdf::content::Content;
use lopdf::{Dictionary, Document, Object, ObjectId};
use tracing::{debug, trace};

use super::text_state::{Matrix, TextState};
use super::{DocumentKind, PageSource, Result};
use crate::error::PdfError;
use crate::layout::ExtractedWord;

/// Glyph width (1/1000 em) used when the font carries no width table.
const DEFAULT_GLYPH_WIDTH: f64 = 500.0;

/// Fraction of the rendered font size above the baseline.
const ASCENT: f64 = 0.8;

/// A4 portrait, used when a page has no readable MediaBox.
const DEFAULT_MEDIA_BOX: [f64; 4] = [0.0, 0.0, 595.0, 842.0];

/// Word extractor over a loaded PDF document.
pub struct PdfWordExtractor {
    document: Option<Document>,
    raw_data: Vec<u8>,
}

impl PdfWordExtractor {
    /// Create a new extractor with no document loaded.
    pub fn new() -> Self {
        Self {
            document: None,
            raw_data: Vec::new(),
        }
    }

    /// Read and load a PDF file.
    pub fn open(path: &Path) -> Result<Self> {
        let data = std::fs::read(path)
            .map_err(|e| PdfError::Parse(format!("{}: {}", path.display(), e)))?;
        let mut extractor = Self::new();
        extractor.load(&data)?;
        Ok(extractor)
    }

    /// Load a PDF from bytes.
    pub fn load(&mut self, data: &[u8]) -> Result<()> {
        let mut doc = Document::load_mem(data).map_err(|e| PdfError::Parse(e.to_string()))?;

        // Handle PDFs with empty password encryption
        if doc.is_encrypted() {
            if doc.decrypt("").is_err() {
                return Err(PdfError::Encrypted);
            }
            debug!("Decrypted PDF with empty password");

            let mut decrypted_data = Vec::new();
            doc.save_to(&mut decrypted_data)
                .map_err(|e| PdfError::Parse(format!("Failed to save decrypted PDF: {}", e)))?;
            self.raw_data = decrypted_data;
        } else {
            self.raw_data = data.to_vec();
        }

        let page_count = doc.get_pages().len();
        if page_count == 0 {
            return Err(PdfError::NoPages);
        }

        debug!("Loaded PDF with {} pages", page_count);
        self.document = Some(doc);
        Ok(())
    }

    fn document(&self) -> Result<&Document> {
        self.document
            .as_ref()
            .ok_or(PdfError::Parse("No document loaded".to_string()))
    }

    /// Extract the plain text of the whole document.
    pub fn extract_text(&self) -> Result<String> {
        pdf_extract::extract_text_from_mem(&self.raw_data)
            .map_err(|e| PdfError::TextExtraction(e.to_string()))
    }

    /// Classify the document by its text layer.
    pub fn analyze(&self) -> DocumentKind {
        let has_text = match self.extract_text() {
            Ok(text) => text.chars().any(|c| !c.is_whitespace()),
            Err(e) => {
                debug!("Full-text extraction failed ({}), counting words instead", e);
                (1..=self.page_count())
                    .any(|page| self.page_words(page).is_ok_and(|words| !words.is_empty()))
            }
        };

        let kind = match (has_text, self.has_images()) {
            (true, _) => DocumentKind::Text,
            (false, true) => DocumentKind::Scanned,
            (false, false) => DocumentKind::Empty,
        };

        debug!("PDF analysis: has_text={} -> {:?}", has_text, kind);
        kind
    }

    fn has_images(&self) -> bool {
        let Some(doc) = self.document.as_ref() else {
            return false;
        };

        doc.objects.values().any(|object| match object {
            Object::Stream(stream) => stream
                .dict
                .get(b"Subtype")
                .and_then(Object::as_name)
                .is_ok_and(|name| name == b"Image"),
            _ => false,
        })
    }

    fn page_id(&self, page: u32) -> Result<ObjectId> {
        self.document()?
            .get_pages()
            .get(&page)
            .copied()
            .ok_or(PdfError::InvalidPage(page))
    }

    fn extract_page(&self, doc: &Document, page_id: ObjectId, page: u32) -> Result<Vec<ExtractedWord>> {
        let fonts = doc.get_page_fonts(page_id).unwrap_or_default();

        let content_data = doc.get_page_content(page_id).map_err(|e| PdfError::PageDecode {
            page,
            reason: e.to_string(),
        })?;
        let content = Content::decode(&content_data).map_err(|e| PdfError::PageDecode {
            page,
            reason: e.to_string(),
        })?;

        let media_box = media_box(doc, page_id);
        let mut builder = WordBuilder::new(media_box[0], media_box[3]);
        let mut state = TextState::default();

        for op in &content.operations {
            let operands = &op.operands;
            match op.operator.as_str() {
                "q" => state.save(),
                "Q" => state.restore(),
                "cm" => {
                    if let Some(m) = matrix_operand(operands) {
                        state.concat(m);
                    }
                }
                "BT" => {
                    builder.flush();
                    state.begin_text();
                }
                "ET" => builder.flush(),
                "Tf" => {
                    if let Some(name) = operands.first().and_then(|o| o.as_name().ok()) {
                        state.font = name.to_vec();
                    }
                    if let Some(size) = operands.get(1).and_then(number) {
                        state.font_size = size;
                    }
                }
                "Tc" => state.char_spacing = operand(operands, 0),
                "Tw" => state.word_spacing = operand(operands, 0),
                "Tz" => state.horizontal_scaling = operand(operands, 0) / 100.0,
                "TL" => state.leading = operand(operands, 0),
                "Ts" => state.rise = operand(operands, 0),
                "Td" => {
                    builder.flush();
                    state.move_line(operand(operands, 0), operand(operands, 1));
                }
                "TD" => {
                    builder.flush();
                    let ty = operand(operands, 1);
                    state.leading = -ty;
                    state.move_line(operand(operands, 0), ty);
                }
                "Tm" => {
                    builder.flush();
                    if let Some(m) = matrix_operand(operands) {
                        state.set_matrix(m);
                    }
                }
                "T*" => {
                    builder.flush();
                    state.next_line();
                }
                "Tj" => {
                    if let Some(Object::String(bytes, _)) = operands.first() {
                        show_text(doc, &fonts, &mut state, &mut builder, bytes);
                    }
                }
                "TJ" => {
                    if let Some(Ok(items)) = operands.first().map(Object::as_array) {
                        for item in items {
                            match item {
                                Object::String(bytes, _) => {
                                    show_text(doc, &fonts, &mut state, &mut builder, bytes)
                                }
                                other => {
                                    if let Some(adjustment) = number(other) {
                                        let tx = state.kerning_advance(adjustment);
                                        state.advance(tx);
                                    }
                                }
                            }
                        }
                    }
                }
                "'" => {
                    builder.flush();
                    state.next_line();
                    if let Some(Object::String(bytes, _)) = operands.first() {
                        show_text(doc, &fonts, &mut state, &mut builder, bytes);
                    }
                }
                "\"" => {
                    builder.flush();
                    state.word_spacing = operand(operands, 0);
                    state.char_spacing = operand(operands, 1);
                    state.next_line();
                    if let Some(Object::String(bytes, _)) = operands.get(2) {
                        show_text(doc, &fonts, &mut state, &mut builder, bytes);
                    }
                }
                _ => {}
            }
        }

        let words = builder.finish();
        trace!("Page {}: {} words", page, words.len());
        Ok(words)
    }
}

impl Default for PdfWordExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl PageSource for PdfWordExtractor {
    fn page_count(&self) -> u32 {
        self.document
            .as_ref()
            .map(|doc| doc.get_pages().len() as u32)
            .unwrap_or(0)
    }

    fn page_words(&self, page: u32) -> Result<Vec<ExtractedWord>> {
        let doc = self.document()?;
        let page_id = self.page_id(page)?;
        self.extract_page(doc, page_id, page)
    }
}

/// Accumulates glyphs into words and converts them to top-left coordinates.
struct WordBuilder {
    page_left: f64,
    page_top: f64,
    words: Vec<ExtractedWord>,
    pending: Option<PendingWord>,
}

struct PendingWord {
    text: String,
    x0: f64,
    x1: f64,
    baseline: f64,
    size: f64,
}

/// No-break spaces group digits inside one word ("1\u{a0}250,75").
fn is_no_break_space(ch: char) -> bool {
    matches!(ch, '\u{00a0}' | '\u{202f}')
}

impl WordBuilder {
    fn new(page_left: f64, page_top: f64) -> Self {
        Self {
            page_left,
            page_top,
            words: Vec::new(),
            pending: None,
        }
    }

    fn push_glyph(&mut self, ch: char, x0: f64, x1: f64, baseline: f64, size: f64) {
        if (ch.is_whitespace() && !is_no_break_space(ch)) || ch.is_control() {
            self.flush();
            return;
        }

        if let Some(pending) = &self.pending {
            let same_line = (baseline - pending.baseline).abs() < pending.size.max(size) * 0.5;
            let gap = x0 - pending.x1;
            if !same_line || gap > size * 0.25 || gap < -size {
                self.flush();
            }
        }

        match &mut self.pending {
            Some(pending) => {
                pending.text.push(ch);
                pending.x1 = x1;
                pending.size = pending.size.max(size);
            }
            None => {
                self.pending = Some(PendingWord {
                    text: ch.to_string(),
                    x0,
                    x1,
                    baseline,
                    size,
                });
            }
        }
    }

    fn flush(&mut self) {
        let Some(pending) = self.pending.take() else {
            return;
        };

        let left = pending.x0.min(pending.x1);
        let top = pending.baseline + pending.size * ASCENT;
        self.words.push(ExtractedWord::new(
            pending.text,
            left - self.page_left,
            self.page_top - top,
            (pending.x1 - pending.x0).abs(),
            pending.size,
        ));
    }

    fn finish(mut self) -> Vec<ExtractedWord> {
        self.flush();
        self.words
    }
}

fn show_text(
    doc: &Document,
    fonts: &BTreeMap<Vec<u8>, &Dictionary>,
    state: &mut TextState,
    builder: &mut WordBuilder,
    bytes: &[u8],
) {
    let font = fonts.get(state.font.as_slice()).copied();
    for (ch, w0) in decode_glyphs(doc, font, bytes) {
        let (x0, baseline) = state.origin();
        let tx = state.glyph_advance(w0, ch == ' ');
        let (x1, _) = state.point_along(tx);
        builder.push_glyph(ch, x0, x1, baseline, state.rendered_size());
        state.advance(tx);
    }
}

/// Decode a string operand into characters paired with glyph widths.
fn decode_glyphs(doc: &Document, font: Option<&Dictionary>, bytes: &[u8]) -> Vec<(char, f64)> {
    let text = decode_text(doc, font, bytes);
    let widths = font.map(|f| FontWidths::from_dict(doc, f));

    let chars: Vec<char> = text.chars().collect();
    if chars.len() == bytes.len() {
        chars
            .into_iter()
            .zip(bytes.iter())
            .map(|(ch, &code)| {
                let w0 = widths
                    .as_ref()
                    .map(|w| w.width(code as i64))
                    .unwrap_or(DEFAULT_GLYPH_WIDTH);
                (ch, w0)
            })
            .collect()
    } else {
        // Multi-byte encodings: no byte-to-glyph mapping for widths
        chars.into_iter().map(|ch| (ch, DEFAULT_GLYPH_WIDTH)).collect()
    }
}

fn decode_text(doc: &Document, font: Option<&Dictionary>, bytes: &[u8]) -> String {
    if let Some(font_dict) = font {
        if let Ok(encoding) = font_dict.get_font_encoding(doc) {
            if let Ok(text) = Document::decode_text(&encoding, bytes) {
                return text;
            }
        }
    }

    // Fallback: try UTF-16BE then Latin-1
    if bytes.len() >= 2 && bytes[0] == 0xFE && bytes[1] == 0xFF {
        let utf16: Vec<u16> = bytes[2..]
            .chunks_exact(2)
            .map(|chunk| u16::from_be_bytes([chunk[0], chunk[1]]))
            .collect();
        return String::from_utf16_lossy(&utf16);
    }

    bytes.iter().map(|&b| b as char).collect()
}

/// Simple-font width table (`/FirstChar` + `/Widths`).
struct FontWidths {
    first_char: i64,
    widths: Vec<f64>,
}

impl FontWidths {
    fn from_dict(doc: &Document, font: &Dictionary) -> Self {
        let first_char = font.get(b"FirstChar").and_then(Object::as_i64).unwrap_or(0);
        let widths = font
            .get(b"Widths")
            .ok()
            .and_then(|o| doc.dereference(o).ok())
            .and_then(|(_, o)| o.as_array().ok())
            .map(|values| {
                values
                    .iter()
                    .map(|v| number(v).unwrap_or(DEFAULT_GLYPH_WIDTH))
                    .collect()
            })
            .unwrap_or_default();

        Self { first_char, widths }
    }

    fn width(&self, code: i64) -> f64 {
        usize::try_from(code - self.first_char)
            .ok()
            .and_then(|idx| self.widths.get(idx).copied())
            .filter(|w| *w > 0.0)
            .unwrap_or(DEFAULT_GLYPH_WIDTH)
    }
}

/// MediaBox of a page, following `/Parent` inheritance.
fn media_box(doc: &Document, page_id: ObjectId) -> [f64; 4] {
    let mut current = Some(page_id);
    let mut depth = 0;

    while let Some(id) = current {
        let Ok(dict) = doc.get_dictionary(id) else {
            break;
        };

        if let Ok(obj) = dict.get(b"MediaBox") {
            if let Ok((_, Object::Array(values))) = doc.dereference(obj) {
                let nums: Vec<f64> = values.iter().filter_map(number).collect();
                if nums.len() == 4 {
                    return [
                        nums[0].min(nums[2]),
                        nums[1].min(nums[3]),
                        nums[0].max(nums[2]),
                        nums[1].max(nums[3]),
                    ];
                }
            }
        }

        depth += 1;
        if depth > 32 {
            break;
        }
        current = dict.get(b"Parent").and_then(Object::as_reference).ok();
    }

    DEFAULT_MEDIA_BOX
}

fn number(obj: &Object) -> Option<f64> {
    match obj {
        Object::Integer(i) => Some(*i as f64),
        Object::Real(r) => Some(*r as f64),
        _ => None,
    }
}

fn operand(operands: &[Object], index: usize) -> f64 {
    operands.get(index).and_then(number).unwrap_or(0.0)
}

fn matrix_operand(operands: &[Object]) -> Option<Matrix> {
    if operands.len() < 6 {
        return None;
    }
    let v: Vec<f64> = operands.iter().take(6).filter_map(number).collect();
    (v.len() == 6).then(|| Matrix::new(v[0], v[1], v[2], v[3], v[4], v[5]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extractor_new() {
        let extractor = PdfWordExtractor::new();
        assert!(extractor.document.is_none());
        assert_eq!(extractor.page_count(), 0);
        assert!(extractor.page_words(1).is_err());
    }

    #[test]
    fn test_load_garbage() {
        let mut extractor = PdfWordExtractor::new();
        assert!(matches!(
            extractor.load(b"not a pdf"),
            Err(PdfError::Parse(_))
        ));
    }

    #[test]
    fn test_word_builder_flips_and_splits() {
        let mut builder = WordBuilder::new(0.0, 800.0);
        // "ab" then a wide gap, then "c"
        builder.push_glyph('a', 100.0, 105.0, 700.0, 10.0);
        builder.push_glyph('b', 105.0, 110.0, 700.0, 10.0);
        builder.push_glyph('c', 130.0, 135.0, 700.0, 10.0);
        builder.push_glyph(' ', 135.0, 138.0, 700.0, 10.0);
        builder.push_glyph('d', 138.0, 143.0, 700.0, 10.0);
        let words = builder.finish();

        let texts: Vec<&str> = words.iter().map(|w| w.text.as_str()).collect();
        assert_eq!(texts, vec!["ab", "c", "d"]);
        assert_eq!(words[0].x, 100.0);
        assert_eq!(words[0].width, 10.0);
        // top edge = 800 - (700 + 8)
        assert!((words[0].y - 92.0).abs() < 1e-9);
        assert_eq!(words[0].height, 10.0);
    }

    #[test]
    fn test_word_builder_keeps_no_break_space() {
        let mut builder = WordBuilder::new(0.0, 800.0);
        for (i, ch) in "1\u{a0}250 EUR".chars().enumerate() {
            let x0 = 100.0 + i as f64 * 5.0;
            builder.push_glyph(ch, x0, x0 + 5.0, 700.0, 10.0);
        }
        let words = builder.finish();

        let texts: Vec<&str> = words.iter().map(|w| w.text.as_str()).collect();
        assert_eq!(texts, vec!["1\u{a0}250", "EUR"]);
    }

    #[test]
    fn test_font_widths_lookup() {
        let widths = FontWidths {
            first_char: 32,
            widths: vec![250.0, 0.0, 600.0],
        };
        assert_eq!(widths.width(32), 250.0);
        assert_eq!(widths.width(33), DEFAULT_GLYPH_WIDTH);
        assert_eq!(widths.width(34), 600.0);
        assert_eq!(widths.width(10), DEFAULT_GLYPH_WIDTH);
    }
}
