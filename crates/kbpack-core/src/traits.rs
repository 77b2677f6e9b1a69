// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Collaborator traits consumed by the packing engine.
//
// The engine only sees these seams; format readers, OCR, tokenizers and the
// PDF writer live in `kbpack-document`, and tests plug in in-memory fakes.

use crate::error::Result;
use crate::types::{Batch, SourceDocument, SourcePage, WrittenArtifact};

/// Lazy, single-use page stream of one document.
pub type PageStream<'a> = Box<dyn Iterator<Item = Result<SourcePage>> + 'a>;

/// Produces the ordered pages of a document.
pub trait PageSource {
    /// Start converting `document`.
    ///
    /// Pages carry `sequence_index` values starting at 0 with no gaps. The
    /// stream is consumed once; converting again starts from scratch. An
    /// error from this call, or from any item, fails the whole document.
    fn convert<'a>(&'a self, document: &'a SourceDocument) -> Result<PageStream<'a>>;
}

/// Counts tokens in page text.
pub trait Tokenizer: Send + Sync {
    fn count(&self, text: &str) -> Result<u64>;

    /// Short name for logs and the report.
    fn name(&self) -> &str;
}

impl<T: Tokenizer + ?Sized> Tokenizer for Box<T> {
    fn count(&self, text: &str) -> Result<u64> {
        (**self).count(text)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// Persists a finalized batch as one artifact.
pub trait ArtifactWriter {
    /// Write the pages of `batch` in order. May be called again with the same
    /// batch after a failure.
    fn write(&mut self, batch: &Batch) -> Result<WrittenArtifact>;
}
