// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types for the knowledge-base packer: pages, batches, and the
// provenance records that tie them back to source documents.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{KbpackError, Result};

/// Prefix of every output artifact file name.
pub const ARTIFACT_PREFIX: &str = "knowledge_base_";

/// File name of the artifact produced for `batch_index`, e.g. `knowledge_base_3.pdf`.
pub fn artifact_file_name(batch_index: u32) -> String {
    format!("{ARTIFACT_PREFIX}{batch_index}.pdf")
}

/// Skip reason for a document that yields no usable text.
pub const NO_TEXT_REASON: &str = "No text extracted or file is unreadable";

/// Skip reason for an image-only PDF when OCR is unavailable.
pub const SCANNED_WITHOUT_OCR_REASON: &str = "Scanned PDF found but OCR is disabled";

/// Identifier of a source document, assigned in enumeration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DocumentId(pub u32);

impl std::fmt::Display for DocumentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "doc#{}", self.0)
    }
}

/// Supported input document formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentFormat {
    Pdf,
    Epub,
    Docx,
    Txt,
}

impl DocumentFormat {
    /// Infer document format from a file extension (without the dot).
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "pdf" => Some(Self::Pdf),
            "epub" => Some(Self::Epub),
            "docx" => Some(Self::Docx),
            "txt" | "text" | "md" => Some(Self::Txt),
            _ => None,
        }
    }

    /// Infer document format from a path's extension.
    pub fn from_path(path: &std::path::Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Epub => "epub",
            Self::Docx => "docx",
            Self::Txt => "txt",
        }
    }
}

impl std::fmt::Display for DocumentFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Standard paper sizes for synthetic pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaperSize {
    A4,
    A5,
    Letter,
    Legal,
    Custom { width_mm: u32, height_mm: u32 },
}

impl PaperSize {
    /// Dimensions in millimetres (width, height).
    pub fn dimensions_mm(&self) -> (u32, u32) {
        match self {
            Self::A4 => (210, 297),
            Self::A5 => (148, 210),
            Self::Letter => (216, 279),
            Self::Legal => (216, 356),
            Self::Custom {
                width_mm,
                height_mm,
            } => (*width_mm, *height_mm),
        }
    }
}

/// A document queued for packing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceDocument {
    pub id: DocumentId,
    pub path: PathBuf,
    pub format: DocumentFormat,
    /// Raw size of the source file on disk.
    pub byte_len: u64,
    /// SHA-256 hex digest of the source file, when it was computed.
    pub content_hash: Option<String>,
}

impl SourceDocument {
    /// File name for logs and reports; falls back to the full path.
    pub fn display_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }
}

/// Renderable content of one page. The packer never looks inside.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageContent {
    /// A standalone single-page PDF cut from a native source PDF.
    PdfPage(Vec<u8>),
    /// A synthetic chunk of re-flowed text, one rendered page long.
    Text(String),
}

/// A page as produced by a [`crate::PageSource`], before token counting.
#[derive(Debug, Clone)]
pub struct SourcePage {
    pub sequence_index: u32,
    /// Extracted text, fed to the tokenizer.
    pub text: String,
    pub byte_size_estimate: u64,
    pub content: PageContent,
}

/// The unit of packable content.
#[derive(Debug, Clone)]
pub struct Page {
    pub document_id: DocumentId,
    pub sequence_index: u32,
    pub token_count: u64,
    pub byte_size_estimate: u64,
    pub content: PageContent,
}

impl Page {
    /// Annotate a source page with its owning document and token count.
    pub fn from_source(document_id: DocumentId, page: SourcePage, token_count: u64) -> Self {
        Self {
            document_id,
            sequence_index: page.sequence_index,
            token_count,
            byte_size_estimate: page.byte_size_estimate,
            content: page.content,
        }
    }
}

/// Lifecycle of an output batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BatchState {
    Open,
    Finalized,
}

/// An in-progress or finalized output artifact.
///
/// Pages are append-only while the batch is open; totals move in lockstep
/// with the page list. Once finalized the batch is immutable.
#[derive(Debug)]
pub struct Batch {
    batch_index: u32,
    pages: Vec<Page>,
    cumulative_tokens: u64,
    cumulative_bytes: u64,
    state: BatchState,
    oversized: bool,
}

impl Batch {
    /// Open an empty batch.
    pub fn open(batch_index: u32) -> Self {
        Self {
            batch_index,
            pages: Vec::new(),
            cumulative_tokens: 0,
            cumulative_bytes: 0,
            state: BatchState::Open,
            oversized: false,
        }
    }

    /// Append a page and update the running totals.
    pub fn append(&mut self, page: Page) -> Result<()> {
        if self.state == BatchState::Finalized {
            return Err(KbpackError::BatchFinalized {
                batch_index: self.batch_index,
            });
        }
        self.cumulative_tokens = self.cumulative_tokens.saturating_add(page.token_count);
        self.cumulative_bytes = self.cumulative_bytes.saturating_add(page.byte_size_estimate);
        self.pages.push(page);
        Ok(())
    }

    /// Seal the batch. Further appends fail.
    pub fn finalize(&mut self) {
        self.state = BatchState::Finalized;
    }

    /// Seal the batch and flag it as holding a single page that alone
    /// exceeds a limit.
    pub fn finalize_oversized(&mut self) {
        self.oversized = true;
        self.state = BatchState::Finalized;
    }

    pub fn batch_index(&self) -> u32 {
        self.batch_index
    }

    pub fn pages(&self) -> &[Page] {
        &self.pages
    }

    pub fn into_pages(self) -> Vec<Page> {
        self.pages
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    pub fn cumulative_tokens(&self) -> u64 {
        self.cumulative_tokens
    }

    pub fn cumulative_bytes(&self) -> u64 {
        self.cumulative_bytes
    }

    pub fn state(&self) -> BatchState {
        self.state
    }

    pub fn is_finalized(&self) -> bool {
        self.state == BatchState::Finalized
    }

    pub fn is_oversized(&self) -> bool {
        self.oversized
    }

    /// Totals used by the provenance ledger.
    pub fn summary(&self) -> BatchSummary {
        BatchSummary {
            batch_index: self.batch_index,
            page_count: self.pages.len() as u32,
            total_tokens: self.cumulative_tokens,
            estimated_bytes: self.cumulative_bytes,
            oversized: self.oversized,
        }
    }

    /// Contiguous per-document page ranges held by this batch, in page order.
    pub fn spans(&self) -> Vec<SpanRef> {
        let mut spans: Vec<SpanRef> = Vec::new();
        for page in &self.pages {
            match spans.last_mut() {
                Some(last)
                    if last.document_id == page.document_id
                        && last.last_sequence_index + 1 == page.sequence_index =>
                {
                    last.last_sequence_index = page.sequence_index;
                }
                _ => spans.push(SpanRef {
                    document_id: page.document_id,
                    first_sequence_index: page.sequence_index,
                    last_sequence_index: page.sequence_index,
                }),
            }
        }
        spans
    }
}

/// Aggregate totals of a finalized batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub batch_index: u32,
    pub page_count: u32,
    pub total_tokens: u64,
    pub estimated_bytes: u64,
    pub oversized: bool,
}

/// Result of persisting one batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WrittenArtifact {
    pub name: String,
    pub path: PathBuf,
    /// Final size of the file on disk.
    pub byte_size: u64,
}

/// A document page range, without token accounting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpanRef {
    pub document_id: DocumentId,
    pub first_sequence_index: u32,
    pub last_sequence_index: u32,
}

/// Final status of a source document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DocumentStatus {
    /// Every page landed in a single artifact.
    Complete,
    /// Pages are spread over several artifacts.
    Split,
    /// Rejected before any page reached the packer.
    Skipped,
    /// Conversion, tokenizing or artifact writing failed.
    Failed,
}

impl std::fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Complete => "COMPLETE",
            Self::Split => "SPLIT",
            Self::Skipped => "SKIPPED",
            Self::Failed => "FAILED",
        };
        f.write_str(label)
    }
}

/// A contiguous range of one document's pages inside one batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSpan {
    pub batch_index: u32,
    pub first_sequence_index: u32,
    pub last_sequence_index: u32,
    /// Tokens this document contributed to the batch.
    pub token_count: u64,
    /// The batch was created through the single-page-exceeds-limit path.
    pub oversized: bool,
}

impl BatchSpan {
    pub fn page_count(&self) -> u32 {
        self.last_sequence_index - self.first_sequence_index + 1
    }
}

/// Provenance record of one source document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub document_id: DocumentId,
    pub path: PathBuf,
    pub format: DocumentFormat,
    /// `None` while the document is still being processed.
    pub status: Option<DocumentStatus>,
    pub batch_spans: Vec<BatchSpan>,
    /// Pages assigned so far (equals the full page count once closed
    /// without failure).
    pub page_count: u32,
    pub reason: Option<String>,
    pub content_hash: Option<String>,
}
