// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Optical character recognition for image-only PDF pages.

#[cfg(feature = "ocr")]
pub mod ocr;

#[cfg(feature = "ocr")]
pub use ocr::{OcrConfig, OcrEngine};

use kbpack_core::error::Result;

use crate::pdf::reader::PdfReader;

/// Turns one image-only PDF page into text.
pub trait PageRecognizer {
    /// Recognised text of page `page_number` (1-indexed); empty when the page
    /// holds nothing legible.
    fn recognize_page(&self, reader: &PdfReader, page_number: u32) -> Result<String>;
}
