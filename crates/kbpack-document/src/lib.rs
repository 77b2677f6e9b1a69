// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// kbpack-document: the concrete collaborators of the packing engine.
//
// Reads PDF, EPUB, DOCX and plain-text sources into page streams, counts
// tokens, optionally runs OCR on scanned PDFs, and writes finalized batches
// as merged PDF artifacts.

pub mod artifact;
pub mod extract;
pub mod integrity;
pub mod pdf;
pub mod scan;
pub mod source;
pub mod tokenizer;

pub use artifact::PdfArtifactWriter;
pub use extract::TextExtractor;
pub use pdf::reader::PdfReader;
pub use scan::PageRecognizer;
pub use source::{ConvertedDocument, DocumentPageSource};
pub use tokenizer::{BytesEstimateTokenizer, WhitespaceTokenizer, create_tokenizer};

#[cfg(feature = "tiktoken")]
pub use tokenizer::TiktokenTokenizer;

#[cfg(feature = "ocr")]
pub use scan::ocr::OcrEngine;
