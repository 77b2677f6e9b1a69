// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Plain-text extraction for the non-PDF formats.

pub mod docx;
pub mod epub;
pub mod markup;
pub mod text;

use std::path::Path;

use kbpack_core::error::{KbpackError, Result};
use kbpack_core::types::DocumentFormat;
use tracing::{debug, instrument};

pub use markup::MarkupStripper;

/// Pulls the full text out of EPUB, DOCX and plain-text files.
pub struct TextExtractor {
    markup: MarkupStripper,
}

impl TextExtractor {
    pub fn new() -> Result<Self> {
        Ok(Self {
            markup: MarkupStripper::new()?,
        })
    }

    /// Whole-document text of `path`. PDFs are read page by page elsewhere
    /// and are rejected here.
    #[instrument(skip(self), fields(path = %path.display()))]
    pub fn extract(&self, path: &Path, format: DocumentFormat) -> Result<String> {
        let text = match format {
            DocumentFormat::Epub => epub::extract(path, &self.markup)?,
            DocumentFormat::Docx => docx::extract(path, &self.markup)?,
            DocumentFormat::Txt => text::extract(path)?,
            DocumentFormat::Pdf => {
                return Err(KbpackError::UnsupportedDocument(
                    "PDF text is extracted per page".into(),
                ));
            }
        };
        debug!(chars = text.len(), %format, "text extracted");
        Ok(text)
    }
}
