// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Packing pipeline: converts documents one at a time, tokenizes each page,
// feeds the packer, writes every sealed batch and keeps the provenance
// ledger in step.
//
// Per-document failures (conversion, tokenizing) never stop the run. Writer
// failures are recorded and collected; the run continues with the next batch.

use std::sync::atomic::{AtomicBool, Ordering};

use kbpack_core::config::{BYTES_PER_MB, PackLimits};
use kbpack_core::error::{KbpackError, Result};
use kbpack_core::traits::{ArtifactWriter, PageSource, Tokenizer};
use kbpack_core::types::{Batch, DocumentStatus, NO_TEXT_REASON, Page, SourceDocument};
use tracing::{error, info, instrument, warn};

use crate::ledger::ProvenanceLedger;
use crate::packer::{PackResult, PagePacker};
use crate::report::Report;
use crate::retry::{RetryConfig, RetryDecision, should_retry};

/// Reason recorded for a document interrupted by cancellation.
pub const CANCELLED_REASON: &str = "cancelled";

/// Mutable packing state, kept apart from the page source so a live page
/// stream can borrow the source while batches are written.
struct PackState<W> {
    packer: PagePacker,
    ledger: ProvenanceLedger,
    writer: W,
    retry: RetryConfig,
    write_failures: Vec<KbpackError>,
}

pub struct Pipeline<S, T, W> {
    source: S,
    tokenizer: T,
    state: PackState<W>,
    max_source_bytes: Option<u64>,
    cancelled: bool,
}

impl<S, T, W> Pipeline<S, T, W>
where
    S: PageSource,
    T: Tokenizer,
    W: ArtifactWriter,
{
    pub fn new(limits: PackLimits, source: S, tokenizer: T, writer: W) -> Self {
        Self::with_ledger(ProvenanceLedger::new(limits), limits, source, tokenizer, writer)
    }

    /// Build a pipeline around an existing ledger (fixed run identity).
    pub fn with_ledger(
        ledger: ProvenanceLedger,
        limits: PackLimits,
        source: S,
        tokenizer: T,
        writer: W,
    ) -> Self {
        Self {
            source,
            tokenizer,
            state: PackState {
                packer: PagePacker::new(limits),
                ledger,
                writer,
                retry: RetryConfig::default(),
                write_failures: Vec::new(),
            },
            max_source_bytes: None,
            cancelled: false,
        }
    }

    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.state.retry = retry;
        self
    }

    /// Skip source files larger than `bytes` before converting them.
    pub fn max_source_bytes(mut self, bytes: u64) -> Self {
        self.max_source_bytes = Some(bytes);
        self
    }

    pub fn ledger(&self) -> &ProvenanceLedger {
        &self.state.ledger
    }

    pub fn packer(&self) -> &PagePacker {
        &self.state.packer
    }

    pub fn writer(&self) -> &W {
        &self.state.writer
    }

    pub fn tokenizer(&self) -> &T {
        &self.tokenizer
    }

    /// Writer failures collected so far, each carrying the spans it lost.
    pub fn write_failures(&self) -> &[KbpackError] {
        &self.state.write_failures
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    /// Process documents in order.
    pub fn run(&mut self, documents: &[SourceDocument]) -> Result<()> {
        for document in documents {
            self.process_document(document)?;
        }
        Ok(())
    }

    /// Process documents in order, stopping between pages once `cancel` is set.
    /// Returns `false` when the run was cut short.
    pub fn run_with_cancel(
        &mut self,
        documents: &[SourceDocument],
        cancel: &AtomicBool,
    ) -> Result<bool> {
        for document in documents {
            if cancel.load(Ordering::Relaxed) {
                self.cancelled = true;
                break;
            }
            self.process(document, Some(cancel))?;
            if self.cancelled {
                break;
            }
        }
        if self.cancelled {
            warn!(
                documents = self.state.ledger.document_count(),
                "run cancelled"
            );
        }
        Ok(!self.cancelled)
    }

    /// Convert, tokenize and pack one document. Returns the status recorded
    /// for it; only ledger invariant violations surface as errors.
    pub fn process_document(&mut self, document: &SourceDocument) -> Result<DocumentStatus> {
        self.process(document, None)
    }

    /// Flush the open batch, write it, and assemble the report.
    pub fn finish(&mut self) -> Report {
        if let Some(batch) = self.state.packer.flush() {
            self.state.write_batch(batch);
        }
        let report = self.state.ledger.report();
        info!(
            artifacts = report.artifacts.len(),
            documents = report.summary.total_documents,
            failed_writes = report.summary.failed_writes,
            "packing finished"
        );
        report
    }

    #[instrument(skip_all, fields(document = %document.display_name(), id = %document.id))]
    fn process(
        &mut self,
        document: &SourceDocument,
        cancel: Option<&AtomicBool>,
    ) -> Result<DocumentStatus> {
        let ledger = &mut self.state.ledger;
        ledger.open_document(
            document.id,
            document.path.clone(),
            document.format,
            document.content_hash.clone(),
        )?;

        if let Some(max) = self.max_source_bytes.filter(|max| document.byte_len > *max) {
            let reason = format!("Exceeds max size of {} MB", max / BYTES_PER_MB);
            warn!(bytes = document.byte_len, %reason, "skipping document");
            return ledger.close_document(document.id, DocumentStatus::Skipped, Some(reason));
        }

        let stream = match self.source.convert(document) {
            Ok(stream) => stream,
            Err(KbpackError::NoContent(reason)) => {
                warn!(%reason, "skipping document");
                return ledger.close_document(document.id, DocumentStatus::Skipped, Some(reason));
            }
            Err(err) => {
                error!(error = %err, "conversion failed");
                return ledger.close_document(
                    document.id,
                    DocumentStatus::Failed,
                    Some(err.to_string()),
                );
            }
        };

        let mut packed: u32 = 0;
        for item in stream {
            if cancel.is_some_and(|flag| flag.load(Ordering::Relaxed)) {
                self.cancelled = true;
                warn!(pages = packed, "cancelled mid-document");
                return self.state.ledger.close_document(
                    document.id,
                    DocumentStatus::Failed,
                    Some(CANCELLED_REASON.into()),
                );
            }

            let failure = match item {
                Ok(source_page) if source_page.sequence_index != packed => Some(
                    KbpackError::conversion(
                        document.display_name(),
                        format!(
                            "page stream out of order: expected {}, got {}",
                            packed, source_page.sequence_index
                        ),
                    ),
                ),
                Ok(source_page) => match self.tokenizer.count(&source_page.text) {
                    Ok(tokens) => {
                        let page = Page::from_source(document.id, source_page, tokens);
                        self.state.pack(page)?;
                        packed += 1;
                        None
                    }
                    Err(err) => Some(err),
                },
                Err(err) => Some(err),
            };

            if let Some(err) = failure {
                let ledger = &mut self.state.ledger;
                return match err {
                    KbpackError::NoContent(reason) if packed == 0 => {
                        warn!(%reason, "skipping document");
                        ledger.close_document(document.id, DocumentStatus::Skipped, Some(reason))
                    }
                    err => {
                        error!(error = %err, pages = packed, "document failed mid-stream");
                        ledger.close_document(
                            document.id,
                            DocumentStatus::Failed,
                            Some(err.to_string()),
                        )
                    }
                };
            }
        }

        if packed == 0 {
            warn!("document produced no pages");
            return self.state.ledger.close_document(
                document.id,
                DocumentStatus::Skipped,
                Some(NO_TEXT_REASON.into()),
            );
        }

        self.state
            .ledger
            .close_document(document.id, DocumentStatus::Complete, None)
    }
}

impl<W: ArtifactWriter> PackState<W> {
    /// Offer one page and settle every batch the packer seals.
    ///
    /// The previous batch is written before the page is recorded, and an
    /// oversized batch after, so the ledger always sees the page in the
    /// batch it was sealed with. Sealed batches are written even when the
    /// ledger rejects the page.
    fn pack(&mut self, page: Page) -> Result<()> {
        let document_id = page.document_id;
        let sequence_index = page.sequence_index;
        let tokens = page.token_count;

        match self.packer.offer(page)? {
            PackResult::Appended { batch_index } => {
                self.ledger
                    .record_append(document_id, sequence_index, batch_index, tokens)?;
            }
            PackResult::Rolled {
                batch_index,
                finalized,
            } => {
                self.write_batch(finalized);
                self.ledger
                    .record_append(document_id, sequence_index, batch_index, tokens)?;
            }
            PackResult::Oversized {
                batch_index,
                previous,
                sealed,
            } => {
                if let Some(previous) = previous {
                    self.write_batch(previous);
                }
                let recorded = self
                    .ledger
                    .record_append(document_id, sequence_index, batch_index, tokens);
                self.write_batch(sealed);
                recorded?;
            }
        }
        Ok(())
    }

    /// Write a sealed batch, retrying transient failures.
    #[instrument(skip_all, fields(batch_index = batch.batch_index()))]
    fn write_batch(&mut self, batch: Batch) {
        let summary = batch.summary();
        let mut attempt = 0;
        loop {
            match self.writer.write(&batch) {
                Ok(artifact) => {
                    info!(
                        artifact = %artifact.name,
                        pages = summary.page_count,
                        tokens = summary.total_tokens,
                        bytes = artifact.byte_size,
                        "artifact written"
                    );
                    self.ledger.record_finalize(artifact, summary);
                    return;
                }
                Err(err) => match should_retry(&err, attempt, &self.retry) {
                    RetryDecision::RetryAfter(delay) => {
                        warn!(attempt, error = %err, "artifact write failed, retrying");
                        std::thread::sleep(delay);
                        attempt += 1;
                    }
                    RetryDecision::GiveUp(_) | RetryDecision::Exhausted => {
                        let detail = err.to_string();
                        error!(attempt, error = %detail, "artifact write abandoned");
                        let spans = batch.spans();
                        self.ledger.record_write_failure(summary.clone(), detail.clone());
                        self.write_failures.push(KbpackError::Writer {
                            batch_index: summary.batch_index,
                            spans,
                            detail,
                        });
                        return;
                    }
                },
            }
        }
    }
}
