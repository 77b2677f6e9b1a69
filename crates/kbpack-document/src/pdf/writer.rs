// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Text page rendering with `printpdf` 0.8.
//
// Synthetic pages are cut by `TextLayout::paginate` and drawn by
// `TextPageRenderer` with the same geometry, so one chunk always renders as
// exactly one PDF page. Layout: one-inch margins, Helvetica 10pt on 12pt
// leading.

use kbpack_core::error::Result;
use kbpack_core::types::PaperSize;
use printpdf::{
    BuiltinFont, Mm, Op, PdfDocument, PdfPage, PdfSaveOptions, PdfWarnMsg, Point, Pt, TextItem,
};
use tracing::{debug, instrument, warn};

const MARGIN_PT: f32 = 72.0;
const FONT_SIZE_PT: f32 = 10.0;
const LINE_HEIGHT_PT: f32 = 12.0;
/// Average Helvetica glyph advance as a fraction of the font size.
const AVG_GLYPH_WIDTH: f32 = 0.5;

/// Page geometry shared by chunking and rendering.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextLayout {
    paper_size: PaperSize,
    chars_per_line: usize,
    lines_per_page: usize,
}

impl TextLayout {
    pub fn new(paper_size: PaperSize) -> Self {
        let (width_mm, height_mm) = paper_size.dimensions_mm();
        let width_pt = Mm(width_mm as f32).into_pt().0;
        let height_pt = Mm(height_mm as f32).into_pt().0;

        let usable_width = (width_pt - 2.0 * MARGIN_PT).max(FONT_SIZE_PT);
        let usable_height = (height_pt - 2.0 * MARGIN_PT).max(LINE_HEIGHT_PT);

        Self {
            paper_size,
            chars_per_line: ((usable_width / (AVG_GLYPH_WIDTH * FONT_SIZE_PT)) as usize).max(1),
            lines_per_page: ((usable_height / LINE_HEIGHT_PT) as usize).max(1),
        }
    }

    pub fn paper_size(&self) -> PaperSize {
        self.paper_size
    }

    pub fn chars_per_line(&self) -> usize {
        self.chars_per_line
    }

    pub fn lines_per_page(&self) -> usize {
        self.lines_per_page
    }

    /// Wrap `text` and cut it into page-sized chunks, lines joined by `\n`.
    ///
    /// Blank lines at the start or end of a page are kept; a document that
    /// wraps to nothing but blank lines yields no pages.
    pub fn paginate(&self, text: &str) -> Vec<String> {
        let lines = wrap_text(&to_latin1_lossy(text), self.chars_per_line);
        if lines.iter().all(|line| line.trim().is_empty()) {
            return Vec::new();
        }
        lines
            .chunks(self.lines_per_page)
            .map(|chunk| chunk.join("\n"))
            .collect()
    }
}

/// Renders pre-paginated text chunks as PDF pages.
pub struct TextPageRenderer {
    layout: TextLayout,
    title: String,
}

impl TextPageRenderer {
    pub fn new(paper_size: PaperSize) -> Self {
        Self::with_layout(TextLayout::new(paper_size))
    }

    pub fn with_layout(layout: TextLayout) -> Self {
        Self {
            layout,
            title: "Knowledge base".into(),
        }
    }

    pub fn set_title(&mut self, title: impl Into<String>) {
        self.title = title.into();
    }

    pub fn layout(&self) -> &TextLayout {
        &self.layout
    }

    /// Render each chunk as one page, in order.
    ///
    /// A chunk longer than a page spills onto extra pages rather than being
    /// clipped.
    #[instrument(skip_all, fields(chunks = chunks.len()))]
    pub fn render_pages(&self, chunks: &[String]) -> Result<Vec<u8>> {
        let (width_mm, height_mm) = self.layout.paper_size.dimensions_mm();
        let (page_w, page_h) = (Mm(width_mm as f32), Mm(height_mm as f32));
        let page_h_pt = page_h.into_pt().0;

        let mut pages: Vec<PdfPage> = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            let lines: Vec<String> = chunk
                .split('\n')
                .flat_map(|line| wrap_text(&to_latin1_lossy(line), self.layout.chars_per_line))
                .collect();
            if lines.len() > self.layout.lines_per_page {
                warn!(
                    lines = lines.len(),
                    capacity = self.layout.lines_per_page,
                    "chunk overflows one page"
                );
            }
            let mut groups = lines.chunks(self.layout.lines_per_page).peekable();
            if groups.peek().is_none() {
                pages.push(PdfPage::new(page_w, page_h, Vec::new()));
            }
            for group in groups {
                pages.push(PdfPage::new(page_w, page_h, text_ops(group, page_h_pt)));
            }
        }

        if pages.is_empty() {
            pages.push(PdfPage::new(page_w, page_h, Vec::new()));
        }

        let mut doc = PdfDocument::new(&self.title);
        doc.with_pages(pages);
        debug!(pages = doc.pages.len(), "Text pages laid out");

        let mut warnings: Vec<PdfWarnMsg> = Vec::new();
        Ok(doc.save(&PdfSaveOptions::default(), &mut warnings))
    }
}

fn text_ops(lines: &[String], page_h_pt: f32) -> Vec<Op> {
    let mut ops: Vec<Op> = Vec::with_capacity(lines.len() * 5);
    for (index, line) in lines.iter().enumerate() {
        if line.is_empty() {
            continue;
        }
        let y_pt = page_h_pt - MARGIN_PT - FONT_SIZE_PT - (index as f32 * LINE_HEIGHT_PT);
        ops.push(Op::StartTextSection);
        ops.push(Op::SetTextCursor {
            pos: Point {
                x: Pt(MARGIN_PT),
                y: Pt(y_pt),
            },
        });
        ops.push(Op::SetFontSizeBuiltinFont {
            size: Pt(FONT_SIZE_PT),
            font: BuiltinFont::Helvetica,
        });
        ops.push(Op::WriteTextBuiltinFont {
            items: vec![TextItem::Text(line.clone())],
            font: BuiltinFont::Helvetica,
        });
        ops.push(Op::EndTextSection);
    }
    ops
}

/// Replace characters the builtin fonts cannot encode with `?`.
fn to_latin1_lossy(text: &str) -> String {
    text.chars()
        .filter_map(|ch| match ch {
            '\r' => None,
            '\n' => Some('\n'),
            ch if ch.is_control() => Some(' '),
            ch if (ch as u32) <= 0xFF => Some(ch),
            _ => Some('?'),
        })
        .collect()
}

/// Wrap a multi-line string so that no line exceeds `max_width` characters.
///
/// Splits on existing newlines first, then performs simple word-wrap within each
/// paragraph. Words longer than `max_width` are force-broken.
pub fn wrap_text(text: &str, max_width: usize) -> Vec<String> {
    let max_width = max_width.max(1);
    let mut result = Vec::new();

    for paragraph in text.split('\n') {
        let words: Vec<&str> = paragraph.split_whitespace().collect();
        if words.is_empty() {
            result.push(String::new());
            continue;
        }

        let mut current_line = String::with_capacity(max_width);
        let mut current_len = 0usize;

        for word in words {
            let word_len = word.chars().count();
            if word_len > max_width {
                if !current_line.is_empty() {
                    result.push(std::mem::take(&mut current_line));
                    current_len = 0;
                }
                let chars: Vec<char> = word.chars().collect();
                let mut pieces = chars.chunks(max_width).peekable();
                while let Some(piece) = pieces.next() {
                    if pieces.peek().is_some() {
                        result.push(piece.iter().collect());
                    } else {
                        current_line.extend(piece);
                        current_len = piece.len();
                    }
                }
            } else if current_line.is_empty() {
                current_line.push_str(word);
                current_len = word_len;
            } else if current_len + 1 + word_len <= max_width {
                current_line.push(' ');
                current_line.push_str(word);
                current_len += 1 + word_len;
            } else {
                result.push(std::mem::take(&mut current_line));
                current_line.push_str(word);
                current_len = word_len;
            }
        }

        if !current_line.is_empty() {
            result.push(current_line);
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn letter_layout_matches_inch_margins() {
        let layout = TextLayout::new(PaperSize::Letter);
        assert_eq!(layout.lines_per_page(), 53);
        assert_eq!(layout.chars_per_line(), 93);
    }

    #[test]
    fn wrap_respects_width() {
        let lines = wrap_text("the quick brown fox jumps over the lazy dog", 10);
        assert!(lines.iter().all(|line| line.chars().count() <= 10));
        assert_eq!(lines.join(" "), "the quick brown fox jumps over the lazy dog");
    }

    #[test]
    fn wrap_force_breaks_long_words() {
        let lines = wrap_text("abcdefghij xy", 4);
        assert_eq!(lines, vec!["abcd", "efgh", "ij", "xy"]);
    }

    #[test]
    fn wrap_keeps_blank_paragraphs() {
        let lines = wrap_text("one\n\ntwo", 20);
        assert_eq!(lines, vec!["one", "", "two"]);
    }

    #[test]
    fn paginate_fills_pages() {
        let layout = TextLayout::new(PaperSize::Letter);
        let text = (0..120).map(|n| format!("line {n}")).collect::<Vec<_>>().join("\n");
        let pages = layout.paginate(&text);
        assert_eq!(pages.len(), 3);
        assert_eq!(pages[0].lines().count(), 53);
        assert_eq!(pages[2].lines().count(), 120 - 106);
    }

    #[test]
    fn paginate_blank_text_is_empty() {
        let layout = TextLayout::new(PaperSize::A4);
        assert!(layout.paginate("  \n\n \t ").is_empty());
        assert!(layout.paginate("").is_empty());
    }

    #[test]
    fn non_latin1_is_replaced() {
        assert_eq!(to_latin1_lossy("café ✓\r\n"), "café ?\n");
    }

    #[test]
    fn one_chunk_renders_one_page() {
        let layout = TextLayout::new(PaperSize::Letter);
        let text = "word ".repeat(3000);
        let chunks = layout.paginate(&text);
        let bytes = TextPageRenderer::with_layout(layout)
            .render_pages(&chunks)
            .unwrap();
        let doc = lopdf::Document::load_mem(&bytes).unwrap();
        assert_eq!(doc.get_pages().len(), chunks.len());
    }
}
