// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PDF reader: open existing PDFs with `lopdf`, pull text per page, cut single
// pages out as standalone documents, and decide whether a file carries a
// text layer at all.

use std::path::Path;

use kbpack_core::error::{KbpackError, Result};
use lopdf::{Document, ObjectId};
use tracing::{debug, info, instrument, warn};

use super::merge::PdfAssembler;

/// Pages sampled when deciding whether a PDF has a text layer.
pub const NATIVE_SAMPLE_PAGES: u32 = 5;

/// Sampled characters (trimmed) above which a PDF counts as text-native.
pub const NATIVE_TEXT_THRESHOLD: usize = 100;

/// Reads existing PDF files page by page.
pub struct PdfReader {
    document: Document,
    source_path: Option<String>,
}

impl PdfReader {
    // -- Construction ---------------------------------------------------------

    /// Open a PDF from the filesystem.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path_ref = path.as_ref();
        info!("Opening PDF: {}", path_ref.display());

        let document = Document::load(path_ref).map_err(|err| {
            KbpackError::PdfError(format!("failed to open {}: {}", path_ref.display(), err))
        })?;

        debug!(pages = document.get_pages().len(), "PDF loaded");

        Ok(Self {
            document,
            source_path: Some(path_ref.display().to_string()),
        })
    }

    /// Create a reader from raw PDF bytes already in memory.
    #[instrument(skip_all, fields(bytes_len = data.len()))]
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let document = Document::load_mem(data).map_err(|err| {
            KbpackError::PdfError(format!("failed to load PDF from memory: {}", err))
        })?;

        debug!(pages = document.get_pages().len(), "PDF loaded from bytes");

        Ok(Self {
            document,
            source_path: None,
        })
    }

    // -- Inspection -----------------------------------------------------------

    pub fn page_count(&self) -> usize {
        self.document.get_pages().len()
    }

    /// Page numbers (1-indexed) in document order.
    pub fn page_numbers(&self) -> Vec<u32> {
        self.document.get_pages().keys().copied().collect()
    }

    pub fn source_path(&self) -> Option<&str> {
        self.source_path.as_deref()
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    // -- Extraction -----------------------------------------------------------

    /// Text of one page (1-indexed). Pages without a text layer yield an
    /// empty string; undecodable text streams are reported as errors.
    pub fn page_text(&self, page_number: u32) -> Result<String> {
        self.page_id(page_number)?;
        self.document.extract_text(&[page_number]).map_err(|err| {
            KbpackError::Extraction(format!("page {}: {}", page_number, err))
        })
    }

    /// Extract a single page (1-indexed) into a new standalone PDF document.
    ///
    /// Returns the serialised bytes of the single-page PDF.
    #[instrument(skip(self), fields(page_number))]
    pub fn extract_page(&self, page_number: u32) -> Result<Vec<u8>> {
        let page_id = self.page_id(page_number)?;
        let mut assembler = PdfAssembler::new();
        assembler.append_page(&self.document, page_id)?;
        let output = assembler.finish()?;
        debug!(page_number, output_bytes = output.len(), "Page extracted");
        Ok(output)
    }

    /// Whether the first pages carry enough text to skip OCR.
    ///
    /// Unreadable sample pages count as empty.
    pub fn is_text_native(&self) -> bool {
        let sampled: usize = self
            .page_numbers()
            .into_iter()
            .take(NATIVE_SAMPLE_PAGES as usize)
            .map(|page_number| match self.page_text(page_number) {
                Ok(text) => text.trim().len(),
                Err(err) => {
                    warn!(page_number, %err, "sample page unreadable");
                    0
                }
            })
            .sum();
        debug!(sampled, threshold = NATIVE_TEXT_THRESHOLD, "native text sample");
        sampled > NATIVE_TEXT_THRESHOLD
    }

    /// Raster images placed on one page, decoded for OCR.
    ///
    /// Supports JPEG (`DCTDecode`) images and 8-bit grey or RGB images stored
    /// with stream filters lopdf can undo. Other encodings are skipped.
    #[cfg(feature = "ocr")]
    pub fn page_images(&self, page_number: u32) -> Result<Vec<image::DynamicImage>> {
        let page_id = self.page_id(page_number)?;
        let images = self.document.get_page_images(page_id).map_err(|err| {
            KbpackError::PdfError(format!("page {}: cannot list images: {}", page_number, err))
        })?;

        let mut decoded = Vec::with_capacity(images.len());
        for pdf_image in images {
            let filters = pdf_image.filters.clone().unwrap_or_default();
            let width = u32::try_from(pdf_image.width).unwrap_or(0);
            let height = u32::try_from(pdf_image.height).unwrap_or(0);

            let result = if filters.iter().any(|filter| filter == "DCTDecode") {
                image::load_from_memory(pdf_image.content).map_err(|err| err.to_string())
            } else {
                self.raw_image(pdf_image.id, width, height, pdf_image.color_space.as_deref())
            };
            match result {
                Ok(image) => decoded.push(image),
                Err(detail) => warn!(page_number, ?filters, %detail, "image skipped"),
            }
        }
        Ok(decoded)
    }

    #[cfg(feature = "ocr")]
    fn raw_image(
        &self,
        id: ObjectId,
        width: u32,
        height: u32,
        color_space: Option<&str>,
    ) -> std::result::Result<image::DynamicImage, String> {
        let stream = self
            .document
            .get_object(id)
            .and_then(lopdf::Object::as_stream)
            .map_err(|err| err.to_string())?;
        let pixels = stream
            .decompressed_content()
            .unwrap_or_else(|_| stream.content.clone());
        match color_space {
            Some("DeviceGray") => image::GrayImage::from_raw(width, height, pixels)
                .map(image::DynamicImage::ImageLuma8)
                .ok_or_else(|| "grey buffer size mismatch".to_string()),
            Some("DeviceRGB") => image::RgbImage::from_raw(width, height, pixels)
                .map(image::DynamicImage::ImageRgb8)
                .ok_or_else(|| "RGB buffer size mismatch".to_string()),
            other => Err(format!("unsupported colour space {:?}", other)),
        }
    }

    // -- Helpers --------------------------------------------------------------

    fn page_id(&self, page_number: u32) -> Result<ObjectId> {
        let pages = self.document.get_pages();
        pages.get(&page_number).copied().ok_or_else(|| {
            KbpackError::PdfError(format!(
                "page {} out of range (document has {} pages)",
                page_number,
                pages.len()
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::writer::{TextLayout, TextPageRenderer};
    use kbpack_core::types::PaperSize;

    fn sample_pdf(pages: usize) -> Vec<u8> {
        let chunks: Vec<String> = (0..pages).map(|n| format!("page number {n}")).collect();
        TextPageRenderer::new(PaperSize::Letter)
            .render_pages(&chunks)
            .unwrap()
    }

    #[test]
    fn counts_pages() {
        let reader = PdfReader::from_bytes(&sample_pdf(3)).unwrap();
        assert_eq!(reader.page_count(), 3);
        assert_eq!(reader.page_numbers(), vec![1, 2, 3]);
        assert!(reader.source_path().is_none());
    }

    #[test]
    fn extracted_page_is_standalone() {
        let reader = PdfReader::from_bytes(&sample_pdf(3)).unwrap();
        let page = reader.extract_page(2).unwrap();
        let single = PdfReader::from_bytes(&page).unwrap();
        assert_eq!(single.page_count(), 1);
    }

    #[test]
    fn out_of_range_page_is_error() {
        let reader = PdfReader::from_bytes(&sample_pdf(1)).unwrap();
        assert!(matches!(reader.extract_page(0), Err(KbpackError::PdfError(_))));
        assert!(matches!(reader.extract_page(2), Err(KbpackError::PdfError(_))));
        assert!(reader.page_text(5).is_err());
    }

    #[test]
    fn blank_pages_are_not_native() {
        let layout = TextLayout::new(PaperSize::Letter);
        let bytes = TextPageRenderer::with_layout(layout)
            .render_pages(&[String::new(), String::new()])
            .unwrap();
        let reader = PdfReader::from_bytes(&bytes).unwrap();
        assert!(!reader.is_text_native());
    }

    #[test]
    fn text_layer_is_native() {
        let line = "A sentence long enough to count toward the native text sample.";
        let bytes = crate::pdf::fixtures::text_layer_pdf(&[line, line, line]);
        let reader = PdfReader::from_bytes(&bytes).unwrap();
        assert!(reader.page_text(1).unwrap().contains("native text sample"));
        assert!(reader.is_text_native());
    }

    #[test]
    fn extracted_page_pins_inherited_attributes() {
        let bytes = crate::pdf::fixtures::text_layer_pdf(&["only page"]);
        let reader = PdfReader::from_bytes(&bytes).unwrap();
        let single = PdfReader::from_bytes(&reader.extract_page(1).unwrap()).unwrap();
        let doc = single.document();
        let page = doc.get_dictionary(doc.get_pages()[&1]).unwrap();
        assert!(page.has(b"MediaBox"));
        assert!(page.has(b"Resources"));
        assert!(single.page_text(1).unwrap().contains("only page"));
    }

    #[test]
    fn garbage_is_pdf_error() {
        assert!(matches!(
            PdfReader::from_bytes(b"%PDF-1.4 broken"),
            Err(KbpackError::PdfError(_))
        ));
    }

    #[test]
    fn open_missing_file_fails() {
        assert!(PdfReader::open("/nonexistent/file.pdf").is_err());
    }
}
