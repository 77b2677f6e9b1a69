// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for kbpack.

use thiserror::Error;

use crate::types::{DocumentId, SpanRef};

/// Top-level error type for all kbpack operations.
#[derive(Debug, Error)]
pub enum KbpackError {
    // -- Configuration --
    #[error("invalid configuration: {0}")]
    Config(String),

    // -- Conversion (per document, recoverable) --
    #[error("conversion of {document} failed: {detail}")]
    Conversion { document: String, detail: String },

    #[error("no usable content: {0}")]
    NoContent(String),

    #[error("unsupported document type: {0}")]
    UnsupportedDocument(String),

    #[error("PDF operation failed: {0}")]
    PdfError(String),

    #[error("text extraction failed: {0}")]
    Extraction(String),

    #[error("OCR failed: {0}")]
    OcrError(String),

    #[error("token counting failed: {0}")]
    Tokenizer(String),

    // -- Packing / provenance --
    #[error("batch {batch_index} is finalized and cannot accept pages")]
    BatchFinalized { batch_index: u32 },

    #[error("provenance invariant violated for {document}: {detail}")]
    Ledger { document: DocumentId, detail: String },

    // -- Artifact output --
    #[error("writing artifact for batch {batch_index} failed: {detail}")]
    Writer {
        batch_index: u32,
        spans: Vec<SpanRef>,
        detail: String,
    },

    // -- Storage / persistence --
    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl KbpackError {
    /// Build a [`KbpackError::Conversion`] for the named document.
    pub fn conversion(document: impl Into<String>, detail: impl std::fmt::Display) -> Self {
        Self::Conversion {
            document: document.into(),
            detail: detail.to_string(),
        }
    }
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, KbpackError>;
