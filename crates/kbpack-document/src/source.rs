// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Page source for files on disk.
//
// PDFs with a text layer keep their original pages. Scanned PDFs are
// recognised page by page and, like every other format, re-flowed into
// synthetic text pages sized so that one chunk renders as exactly one PDF page.

use std::path::Path;

use kbpack_core::config::PackConfig;
use kbpack_core::error::{KbpackError, Result};
use kbpack_core::traits::{PageSource, PageStream};
use kbpack_core::types::{
    DocumentFormat, NO_TEXT_REASON, PageContent, PaperSize, SCANNED_WITHOUT_OCR_REASON,
    SourceDocument, SourcePage,
};
use tracing::{debug, info, instrument, warn};

use crate::extract::TextExtractor;
use crate::pdf::reader::PdfReader;
use crate::pdf::writer::TextLayout;
use crate::scan::PageRecognizer;
#[cfg(feature = "ocr")]
use crate::scan::ocr::OcrEngine;

/// Bytes added to a synthetic page's text length to estimate its rendered size
/// (page object, content stream operators, font resources).
pub const SYNTHETIC_PAGE_OVERHEAD: u64 = 1_200;

/// Converts source files into page streams.
pub struct DocumentPageSource {
    layout: TextLayout,
    extractor: TextExtractor,
    recognizer: Option<Box<dyn PageRecognizer>>,
}

impl DocumentPageSource {
    /// Source without OCR: scanned PDFs are skipped.
    pub fn new(paper_size: PaperSize) -> Result<Self> {
        Ok(Self {
            layout: TextLayout::new(paper_size),
            extractor: TextExtractor::new()?,
            recognizer: None,
        })
    }

    /// Source configured from `config`. When OCR is requested but the models
    /// cannot be loaded, or the build lacks the `ocr` feature, OCR stays off
    /// and a warning is logged.
    pub fn from_config(config: &PackConfig) -> Result<Self> {
        let mut source = Self::new(config.paper_size)?;
        if config.use_ocr {
            source.enable_ocr(config.ocr_model_dir.as_deref());
        }
        info!(ocr = source.ocr_enabled(), "Page source ready");
        Ok(source)
    }

    #[cfg(feature = "ocr")]
    fn enable_ocr(&mut self, model_dir: Option<&Path>) {
        let engine = match model_dir {
            Some(dir) => OcrEngine::from_model_dir(dir),
            None => OcrEngine::with_defaults(),
        };
        match engine {
            Ok(engine) => self.recognizer = Some(Box::new(engine)),
            Err(err) => warn!(%err, "OCR unavailable, scanned PDFs will be skipped"),
        }
    }

    #[cfg(not(feature = "ocr"))]
    fn enable_ocr(&mut self, model_dir: Option<&Path>) {
        warn!(
            ?model_dir,
            "built without the `ocr` feature, scanned PDFs will be skipped"
        );
    }

    /// Recognise scanned PDFs with `recognizer` instead of skipping them.
    pub fn with_recognizer(mut self, recognizer: impl PageRecognizer + 'static) -> Self {
        self.recognizer = Some(Box::new(recognizer));
        self
    }

    pub fn ocr_enabled(&self) -> bool {
        self.recognizer.is_some()
    }

    pub fn layout(&self) -> &TextLayout {
        &self.layout
    }

    /// Pick the conversion path for `document` and prepare its pages.
    #[instrument(skip_all, fields(document = %document.display_name(), format = %document.format))]
    pub fn open<'a>(&'a self, document: &'a SourceDocument) -> Result<ConvertedDocument<'a>> {
        match document.format {
            DocumentFormat::Pdf => self.open_pdf(document),
            format => {
                let text = self.extractor.extract(&document.path, format)?;
                let chunks = self.layout.paginate(&text);
                if chunks.is_empty() {
                    return Err(KbpackError::NoContent(NO_TEXT_REASON.into()));
                }
                debug!(pages = chunks.len(), "synthetic pages");
                Ok(ConvertedDocument::Synthetic(SyntheticPages::new(chunks)))
            }
        }
    }

    fn open_pdf<'a>(&'a self, document: &'a SourceDocument) -> Result<ConvertedDocument<'a>> {
        let reader = PdfReader::open(&document.path)?;
        if reader.page_count() == 0 {
            return Err(KbpackError::NoContent(NO_TEXT_REASON.into()));
        }

        if reader.is_text_native() {
            debug!(pages = reader.page_count(), "native PDF pages");
            return Ok(ConvertedDocument::NativePdf(NativePdfPages::new(
                document, reader,
            )));
        }
        match &self.recognizer {
            Some(recognizer) => {
                debug!(pages = reader.page_count(), "scanned PDF, recognising pages");
                Ok(ConvertedDocument::Synthetic(SyntheticPages::recognized(
                    self.layout,
                    reader,
                    recognizer.as_ref(),
                )))
            }
            None => Err(KbpackError::NoContent(SCANNED_WITHOUT_OCR_REASON.into())),
        }
    }
}

impl PageSource for DocumentPageSource {
    fn convert<'a>(&'a self, document: &'a SourceDocument) -> Result<PageStream<'a>> {
        Ok(Box::new(self.open(document)?))
    }
}

/// The pages of one document, by conversion path.
pub enum ConvertedDocument<'a> {
    /// Original PDF pages, each cut out as a standalone single-page PDF.
    NativePdf(NativePdfPages<'a>),
    /// Re-flowed text chunks.
    Synthetic(SyntheticPages<'a>),
}

impl Iterator for ConvertedDocument<'_> {
    type Item = Result<SourcePage>;

    fn next(&mut self) -> Option<Self::Item> {
        match self {
            Self::NativePdf(pages) => pages.next(),
            Self::Synthetic(pages) => pages.next(),
        }
    }
}

/// Lazily extracted pages of a PDF.
pub struct NativePdfPages<'a> {
    document: &'a SourceDocument,
    reader: PdfReader,
    page_numbers: Vec<u32>,
    position: usize,
}

impl<'a> NativePdfPages<'a> {
    fn new(document: &'a SourceDocument, reader: PdfReader) -> Self {
        let page_numbers = reader.page_numbers();
        Self {
            document,
            reader,
            page_numbers,
            position: 0,
        }
    }

    fn page(&self, sequence_index: u32, page_number: u32) -> Result<SourcePage> {
        let bytes = self.reader.extract_page(page_number)?;
        Ok(SourcePage {
            sequence_index,
            text: self.text_layer(page_number),
            byte_size_estimate: bytes.len() as u64,
            content: PageContent::PdfPage(bytes),
        })
    }

    /// Undecodable text streams count as an empty page; the page itself is
    /// still copied.
    fn text_layer(&self, page_number: u32) -> String {
        self.reader.page_text(page_number).unwrap_or_else(|err| {
            warn!(
                document = %self.document.display_name(),
                page_number,
                %err,
                "page text unreadable, counting it as empty"
            );
            String::new()
        })
    }
}

impl Iterator for NativePdfPages<'_> {
    type Item = Result<SourcePage>;

    fn next(&mut self) -> Option<Self::Item> {
        let page_number = *self.page_numbers.get(self.position)?;
        let sequence_index = self.position as u32;
        self.position += 1;
        Some(self.page(sequence_index, page_number))
    }
}

/// Page-sized text chunks, yielded in order.
pub struct SyntheticPages<'a> {
    chunks: Box<dyn Iterator<Item = Result<String>> + 'a>,
    next_index: u32,
}

impl SyntheticPages<'static> {
    pub fn new(chunks: Vec<String>) -> Self {
        Self::from_chunks(chunks.into_iter().map(Ok))
    }
}

impl<'a> SyntheticPages<'a> {
    fn from_chunks(chunks: impl Iterator<Item = Result<String>> + 'a) -> Self {
        Self {
            chunks: Box::new(chunks),
            next_index: 0,
        }
    }

    /// Recognise the scanned pages of `reader` one at a time and re-flow
    /// their text. Pages with nothing legible contribute no chunks.
    fn recognized(
        layout: TextLayout,
        reader: PdfReader,
        recognizer: &'a dyn PageRecognizer,
    ) -> Self {
        let page_numbers = reader.page_numbers();
        let chunks = page_numbers.into_iter().flat_map(move |page_number| {
            match recognizer.recognize_page(&reader, page_number) {
                Ok(text) => {
                    let chunks = layout.paginate(&text);
                    debug!(page_number, chunks = chunks.len(), "page recognised");
                    chunks.into_iter().map(Ok).collect::<Vec<_>>()
                }
                Err(err) => vec![Err(err)],
            }
        });
        Self::from_chunks(chunks)
    }
}

impl Iterator for SyntheticPages<'_> {
    type Item = Result<SourcePage>;

    fn next(&mut self) -> Option<Self::Item> {
        let chunk = match self.chunks.next()? {
            Ok(chunk) => chunk,
            Err(err) => return Some(Err(err)),
        };
        let sequence_index = self.next_index;
        self.next_index += 1;
        Some(Ok(SourcePage {
            sequence_index,
            byte_size_estimate: chunk.len() as u64 + SYNTHETIC_PAGE_OVERHEAD,
            text: chunk.clone(),
            content: PageContent::Text(chunk),
        }))
    }
}
