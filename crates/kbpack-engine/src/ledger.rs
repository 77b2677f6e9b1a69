// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Provenance ledger: records, per source document, exactly which page
// ranges landed in which output artifact, and per artifact the totals it
// was written with.
//
// Span invariants are checked on every append: a document's sequence
// indices arrive contiguously from 0 and its batch indices never go back.
// A violation is reported as `KbpackError::Ledger` and the entry is left
// untouched.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use kbpack_core::config::PackLimits;
use kbpack_core::error::{KbpackError, Result};
use kbpack_core::types::{
    BatchSpan, BatchSummary, DocumentFormat, DocumentId, DocumentRecord, DocumentStatus,
    SpanRef, WrittenArtifact, artifact_file_name,
};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::report::{ArtifactReport, DocumentReport, Report, ReportSummary, SpanReport};

/// What happened to a finalized batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOutcome {
    Written(WrittenArtifact),
    WriteFailed(String),
}

#[derive(Debug, Clone)]
struct BatchEntry {
    summary: BatchSummary,
    outcome: BatchOutcome,
}

#[derive(Debug, Clone, Copy)]
struct OpenSpan {
    batch_index: u32,
    first_sequence_index: u32,
    last_sequence_index: u32,
    token_count: u64,
}

impl OpenSpan {
    fn seal(self, oversized: bool) -> BatchSpan {
        BatchSpan {
            batch_index: self.batch_index,
            first_sequence_index: self.first_sequence_index,
            last_sequence_index: self.last_sequence_index,
            token_count: self.token_count,
            oversized,
        }
    }
}

#[derive(Debug, Clone)]
struct DocumentEntry {
    record: DocumentRecord,
    open_span: Option<OpenSpan>,
}

/// Page-to-artifact provenance for one packing run.
#[derive(Debug)]
pub struct ProvenanceLedger {
    run_id: Uuid,
    started_at: DateTime<Utc>,
    limits: PackLimits,
    documents: Vec<DocumentEntry>,
    positions: HashMap<DocumentId, usize>,
    batches: BTreeMap<u32, BatchEntry>,
    /// Documents with at least one page in each batch.
    members: BTreeMap<u32, BTreeSet<DocumentId>>,
}

impl ProvenanceLedger {
    pub fn new(limits: PackLimits) -> Self {
        Self::with_identity(limits, Uuid::new_v4(), Utc::now())
    }

    /// Build a ledger with a fixed run identity.
    pub fn with_identity(limits: PackLimits, run_id: Uuid, started_at: DateTime<Utc>) -> Self {
        Self {
            run_id,
            started_at,
            limits,
            documents: Vec::new(),
            positions: HashMap::new(),
            batches: BTreeMap::new(),
            members: BTreeMap::new(),
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    // -- Documents --------------------------------------------------------------

    /// Start tracking a document.
    pub fn open_document(
        &mut self,
        document_id: DocumentId,
        path: impl Into<PathBuf>,
        format: DocumentFormat,
        content_hash: Option<String>,
    ) -> Result<()> {
        if self.positions.contains_key(&document_id) {
            return Err(ledger_error(document_id, "document opened twice"));
        }
        self.positions.insert(document_id, self.documents.len());
        self.documents.push(DocumentEntry {
            record: DocumentRecord {
                document_id,
                path: path.into(),
                format,
                status: None,
                batch_spans: Vec::new(),
                page_count: 0,
                reason: None,
                content_hash,
            },
            open_span: None,
        });
        debug!(document = %document_id, "document opened in ledger");
        Ok(())
    }

    /// Record that page `sequence_index` of `document_id` landed in `batch_index`.
    pub fn record_append(
        &mut self,
        document_id: DocumentId,
        sequence_index: u32,
        batch_index: u32,
        token_count: u64,
    ) -> Result<()> {
        let oversized = self.is_oversized(batch_index);
        let position = self.position(document_id)?;
        let batches = &self.batches;
        let entry = &mut self.documents[position];

        if entry.record.status.is_some() {
            return Err(ledger_error(document_id, "append after close"));
        }
        if sequence_index != entry.record.page_count {
            return Err(ledger_error(
                document_id,
                format!(
                    "expected sequence index {}, got {}",
                    entry.record.page_count, sequence_index
                ),
            ));
        }

        let extends_open_span = match entry.open_span {
            Some(span) if span.batch_index > batch_index => {
                return Err(ledger_error(
                    document_id,
                    format!(
                        "batch index went back from {} to {}",
                        span.batch_index, batch_index
                    ),
                ));
            }
            Some(span) => span.batch_index == batch_index,
            None => false,
        };

        if let Some(span) = entry.open_span.as_mut().filter(|_| extends_open_span) {
            span.last_sequence_index = sequence_index;
            span.token_count = span.token_count.saturating_add(token_count);
        } else {
            if let Some(previous) = entry.open_span {
                let previous_oversized = oversized_of(batches, previous.batch_index);
                entry.record.batch_spans.push(previous.seal(previous_oversized));
            }
            entry.open_span = Some(OpenSpan {
                batch_index,
                first_sequence_index: sequence_index,
                last_sequence_index: sequence_index,
                token_count,
            });
        }
        entry.record.page_count += 1;

        self.members.entry(batch_index).or_default().insert(document_id);
        if oversized {
            // Late append into a batch already sealed as oversized: keep the
            // marker on whatever span now covers it.
            self.flag_oversized(batch_index);
        }
        Ok(())
    }

    /// Seal the document's last span and fix its status.
    ///
    /// A `Complete` request is recorded as `Split` when the spans touch more
    /// than one batch, and as `Failed` when any of those batches could not be
    /// written.
    #[instrument(skip(self, reason), fields(document = %document_id))]
    pub fn close_document(
        &mut self,
        document_id: DocumentId,
        status: DocumentStatus,
        reason: Option<String>,
    ) -> Result<DocumentStatus> {
        let failed_batches = self.failed_batch_indices();
        let position = self.position(document_id)?;
        let batches = &self.batches;
        let entry = &mut self.documents[position];
        if entry.record.status.is_some() {
            return Err(ledger_error(document_id, "document closed twice"));
        }

        if let Some(span) = entry.open_span.take() {
            let oversized = oversized_of(batches, span.batch_index);
            entry.record.batch_spans.push(span.seal(oversized));
        }

        let lost_batch = entry
            .record
            .batch_spans
            .iter()
            .find(|span| failed_batches.contains(&span.batch_index))
            .map(|span| span.batch_index);

        let (status, reason) = match (status, lost_batch) {
            (DocumentStatus::Complete | DocumentStatus::Split, Some(batch_index)) => (
                DocumentStatus::Failed,
                Some(format!(
                    "artifact {} could not be written",
                    artifact_file_name(batch_index)
                )),
            ),
            (DocumentStatus::Complete | DocumentStatus::Split, None) => {
                let distinct = entry
                    .record
                    .batch_spans
                    .iter()
                    .map(|span| span.batch_index)
                    .collect::<BTreeSet<_>>()
                    .len();
                let status = if distinct > 1 {
                    DocumentStatus::Split
                } else {
                    DocumentStatus::Complete
                };
                (status, reason)
            }
            (other, _) => (other, reason),
        };

        entry.record.status = Some(status);
        entry.record.reason = reason;
        info!(
            pages = entry.record.page_count,
            spans = entry.record.batch_spans.len(),
            %status,
            "document closed"
        );
        Ok(status)
    }

    // -- Batches ----------------------------------------------------------------

    /// Record a batch that was finalized and written.
    pub fn record_finalize(&mut self, artifact: WrittenArtifact, summary: BatchSummary) {
        let batch_index = summary.batch_index;
        let oversized = summary.oversized;
        self.batches.insert(
            batch_index,
            BatchEntry {
                summary,
                outcome: BatchOutcome::Written(artifact),
            },
        );
        if oversized {
            self.flag_oversized(batch_index);
        }
    }

    /// Record a finalized batch whose artifact could not be written.
    ///
    /// Documents still open with pages in the batch will close as `Failed`;
    /// documents already closed are downgraded now.
    pub fn record_write_failure(&mut self, summary: BatchSummary, error: impl Into<String>) {
        let batch_index = summary.batch_index;
        let error = error.into();
        warn!(batch_index, %error, "artifact write failed");
        let oversized = summary.oversized;
        self.batches.insert(
            batch_index,
            BatchEntry {
                summary,
                outcome: BatchOutcome::WriteFailed(error),
            },
        );
        if oversized {
            self.flag_oversized(batch_index);
        }

        let members: Vec<DocumentId> = self
            .members
            .get(&batch_index)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default();
        for document_id in members {
            if let Some(&position) = self.positions.get(&document_id) {
                let record = &mut self.documents[position].record;
                if matches!(
                    record.status,
                    Some(DocumentStatus::Complete | DocumentStatus::Split)
                ) {
                    record.status = Some(DocumentStatus::Failed);
                    record.reason = Some(format!(
                        "artifact {} could not be written",
                        artifact_file_name(batch_index)
                    ));
                }
            }
        }
    }

    /// Document spans held by a batch, used as context for writer errors.
    pub fn spans_in_batch(&self, batch_index: u32) -> Vec<SpanRef> {
        let Some(members) = self.members.get(&batch_index) else {
            return Vec::new();
        };
        let mut spans = Vec::new();
        for document_id in members {
            let Some(&position) = self.positions.get(document_id) else {
                continue;
            };
            let entry = &self.documents[position];
            let sealed = entry
                .record
                .batch_spans
                .iter()
                .filter(|span| span.batch_index == batch_index)
                .map(|span| (span.first_sequence_index, span.last_sequence_index));
            let open = entry
                .open_span
                .iter()
                .filter(|span| span.batch_index == batch_index)
                .map(|span| (span.first_sequence_index, span.last_sequence_index));
            for (first, last) in sealed.chain(open) {
                spans.push(SpanRef {
                    document_id: *document_id,
                    first_sequence_index: first,
                    last_sequence_index: last,
                });
            }
        }
        spans
    }

    // -- Queries ----------------------------------------------------------------

    /// Current record of a document, with any open span shown as sealed.
    pub fn record(&self, document_id: DocumentId) -> Option<DocumentRecord> {
        let position = *self.positions.get(&document_id)?;
        Some(self.snapshot(&self.documents[position]))
    }

    pub fn outcome(&self, batch_index: u32) -> Option<&BatchOutcome> {
        self.batches.get(&batch_index).map(|entry| &entry.outcome)
    }

    pub fn document_count(&self) -> usize {
        self.documents.len()
    }

    /// Assemble the structured report. Pure: repeated calls without
    /// intervening mutation return identical reports.
    pub fn report(&self) -> Report {
        let documents: Vec<DocumentReport> = self
            .documents
            .iter()
            .map(|entry| {
                let record = self.snapshot(entry);
                DocumentReport {
                    path: record.path.display().to_string(),
                    format: record.format,
                    status: record.status,
                    reason: record.reason,
                    page_count: record.page_count,
                    content_hash: record.content_hash,
                    spans: record
                        .batch_spans
                        .iter()
                        .map(|span| SpanReport {
                            artifact: artifact_file_name(span.batch_index),
                            batch_index: span.batch_index,
                            first_sequence_index: span.first_sequence_index,
                            last_sequence_index: span.last_sequence_index,
                            token_count: span.token_count,
                            oversized: span.oversized,
                        })
                        .collect(),
                }
            })
            .collect();

        let artifacts: Vec<ArtifactReport> = self
            .batches
            .values()
            .map(|entry| {
                let source_documents = self
                    .members
                    .get(&entry.summary.batch_index)
                    .map(|members| {
                        members
                            .iter()
                            .filter_map(|id| self.positions.get(id))
                            .map(|&position| {
                                self.documents[position].record.path.display().to_string()
                            })
                            .collect()
                    })
                    .unwrap_or_default();
                let (path, byte_size, write_error) = match &entry.outcome {
                    BatchOutcome::Written(artifact) => (
                        Some(artifact.path.display().to_string()),
                        Some(artifact.byte_size),
                        None,
                    ),
                    BatchOutcome::WriteFailed(error) => (None, None, Some(error.clone())),
                };
                ArtifactReport {
                    index: entry.summary.batch_index,
                    name: artifact_file_name(entry.summary.batch_index),
                    path,
                    total_tokens: entry.summary.total_tokens,
                    estimated_bytes: entry.summary.estimated_bytes,
                    byte_size,
                    page_count: entry.summary.page_count,
                    oversized: entry.summary.oversized,
                    source_documents,
                    write_error,
                }
            })
            .collect();

        let summary = ReportSummary::tally(&documents, &artifacts);
        Report {
            run_id: self.run_id,
            started_at: self.started_at,
            limits: self.limits,
            summary,
            documents,
            artifacts,
        }
    }

    // -- Helpers ----------------------------------------------------------------

    fn position(&self, document_id: DocumentId) -> Result<usize> {
        self.positions
            .get(&document_id)
            .copied()
            .ok_or_else(|| ledger_error(document_id, "document was never opened"))
    }

    fn snapshot(&self, entry: &DocumentEntry) -> DocumentRecord {
        let mut record = entry.record.clone();
        if let Some(span) = entry.open_span {
            record
                .batch_spans
                .push(span.seal(oversized_of(&self.batches, span.batch_index)));
        }
        record
    }

    fn is_oversized(&self, batch_index: u32) -> bool {
        oversized_of(&self.batches, batch_index)
    }

    fn failed_batch_indices(&self) -> BTreeSet<u32> {
        self.batches
            .iter()
            .filter(|(_, entry)| matches!(entry.outcome, BatchOutcome::WriteFailed(_)))
            .map(|(&index, _)| index)
            .collect()
    }

    fn flag_oversized(&mut self, batch_index: u32) {
        let Some(members) = self.members.get(&batch_index) else {
            return;
        };
        for document_id in members {
            if let Some(&position) = self.positions.get(document_id) {
                for span in self.documents[position]
                    .record
                    .batch_spans
                    .iter_mut()
                    .filter(|span| span.batch_index == batch_index)
                {
                    span.oversized = true;
                }
            }
        }
    }
}

fn oversized_of(batches: &BTreeMap<u32, BatchEntry>, batch_index: u32) -> bool {
    batches
        .get(&batch_index)
        .is_some_and(|entry| entry.summary.oversized)
}

fn ledger_error(document: DocumentId, detail: impl Into<String>) -> KbpackError {
    KbpackError::Ledger {
        document,
        detail: detail.into(),
    }
}
