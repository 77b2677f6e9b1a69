// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Structured run report, assembled from the provenance ledger and written
// next to the artifacts as pretty-printed JSON.

use std::path::Path;

use chrono::{DateTime, Utc};
use kbpack_core::config::PackLimits;
use kbpack_core::error::Result;
use kbpack_core::types::{DocumentFormat, DocumentStatus};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub limits: PackLimits,
    pub summary: ReportSummary,
    pub documents: Vec<DocumentReport>,
    pub artifacts: Vec<ArtifactReport>,
}

/// One source document and where its pages went.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentReport {
    pub path: String,
    pub format: DocumentFormat,
    /// Absent only when the run was interrupted before the document closed.
    pub status: Option<DocumentStatus>,
    pub reason: Option<String>,
    pub page_count: u32,
    pub content_hash: Option<String>,
    pub spans: Vec<SpanReport>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpanReport {
    pub artifact: String,
    pub batch_index: u32,
    pub first_sequence_index: u32,
    pub last_sequence_index: u32,
    pub token_count: u64,
    pub oversized: bool,
}

/// One output artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactReport {
    pub index: u32,
    pub name: String,
    /// Absent when the write failed.
    pub path: Option<String>,
    pub total_tokens: u64,
    pub estimated_bytes: u64,
    /// Size on disk after writing.
    pub byte_size: Option<u64>,
    pub page_count: u32,
    pub oversized: bool,
    pub source_documents: Vec<String>,
    pub write_error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportSummary {
    pub total_documents: usize,
    pub complete: usize,
    pub split: usize,
    pub skipped: usize,
    pub failed: usize,
    pub total_pages: u64,
    pub total_tokens: u64,
    pub artifacts_written: usize,
    pub oversized_artifacts: usize,
    pub failed_writes: usize,
}

impl ReportSummary {
    pub fn tally(documents: &[DocumentReport], artifacts: &[ArtifactReport]) -> Self {
        let mut summary = Self {
            total_documents: documents.len(),
            ..Self::default()
        };
        for document in documents {
            match document.status {
                Some(DocumentStatus::Complete) => summary.complete += 1,
                Some(DocumentStatus::Split) => summary.split += 1,
                Some(DocumentStatus::Skipped) => summary.skipped += 1,
                Some(DocumentStatus::Failed) => summary.failed += 1,
                None => {}
            }
        }
        for artifact in artifacts {
            summary.total_pages += u64::from(artifact.page_count);
            summary.total_tokens = summary.total_tokens.saturating_add(artifact.total_tokens);
            if artifact.write_error.is_some() {
                summary.failed_writes += 1;
            } else {
                summary.artifacts_written += 1;
            }
            if artifact.oversized {
                summary.oversized_artifacts += 1;
            }
        }
        summary
    }
}

impl Report {
    /// Documents that were merged into at least one artifact.
    pub fn merged_files(&self) -> impl Iterator<Item = &DocumentReport> {
        self.documents.iter().filter(|document| {
            matches!(
                document.status,
                Some(DocumentStatus::Complete | DocumentStatus::Split)
            )
        })
    }

    /// Documents that were skipped or failed, with their reasons.
    pub fn skipped_files(&self) -> impl Iterator<Item = &DocumentReport> {
        self.documents.iter().filter(|document| {
            matches!(
                document.status,
                Some(DocumentStatus::Skipped | DocumentStatus::Failed)
            )
        })
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Write the report, creating the parent directory when needed.
    pub fn write_json(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_json()?)?;
        info!(
            path = %path.display(),
            documents = self.summary.total_documents,
            artifacts = self.artifacts.len(),
            "Report written"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn document(path: &str, status: DocumentStatus) -> DocumentReport {
        DocumentReport {
            path: path.into(),
            format: DocumentFormat::Pdf,
            status: Some(status),
            reason: None,
            page_count: 3,
            content_hash: None,
            spans: Vec::new(),
        }
    }

    fn artifact(index: u32, oversized: bool, write_error: Option<&str>) -> ArtifactReport {
        ArtifactReport {
            index,
            name: format!("knowledge_base_{index}.pdf"),
            path: None,
            total_tokens: 100,
            estimated_bytes: 2048,
            byte_size: None,
            page_count: 4,
            oversized,
            source_documents: Vec::new(),
            write_error: write_error.map(String::from),
        }
    }

    fn report() -> Report {
        let documents = vec![
            document("a.pdf", DocumentStatus::Complete),
            document("b.pdf", DocumentStatus::Split),
            document("c.pdf", DocumentStatus::Skipped),
            document("d.pdf", DocumentStatus::Failed),
        ];
        let artifacts = vec![
            artifact(1, false, None),
            artifact(2, true, None),
            artifact(3, false, Some("disk full")),
        ];
        Report {
            run_id: Uuid::nil(),
            started_at: DateTime::<Utc>::UNIX_EPOCH,
            limits: PackLimits::new(1000, 4096).unwrap(),
            summary: ReportSummary::tally(&documents, &artifacts),
            documents,
            artifacts,
        }
    }

    #[test]
    fn summary_counts_statuses_and_artifacts() {
        let summary = report().summary;
        assert_eq!(summary.total_documents, 4);
        assert_eq!(summary.complete, 1);
        assert_eq!(summary.split, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.total_pages, 12);
        assert_eq!(summary.total_tokens, 300);
        assert_eq!(summary.artifacts_written, 2);
        assert_eq!(summary.oversized_artifacts, 1);
        assert_eq!(summary.failed_writes, 1);
    }

    #[test]
    fn merged_and_skipped_partition_closed_documents() {
        let report = report();
        let merged: Vec<&str> = report.merged_files().map(|d| d.path.as_str()).collect();
        let skipped: Vec<&str> = report.skipped_files().map(|d| d.path.as_str()).collect();
        assert_eq!(merged, vec!["a.pdf", "b.pdf"]);
        assert_eq!(skipped, vec!["c.pdf", "d.pdf"]);
    }

    #[test]
    fn json_uses_upper_case_status() {
        let json = report().to_json().unwrap();
        assert!(json.contains("\"SPLIT\""));
        assert!(json.contains("\"knowledge_base_2.pdf\""));
    }

    #[test]
    fn write_json_creates_parent_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("report.json");
        let report = report();
        report.write_json(&path).unwrap();
        let raw = std::fs::read_to_string(&path).unwrap();
        let back: Report = serde_json::from_str(&raw).unwrap();
        assert_eq!(back, report);
    }
}
