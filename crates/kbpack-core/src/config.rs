// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Packing configuration and validated limits.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{KbpackError, Result};
use crate::types::PaperSize;

/// Bytes in one configured megabyte.
pub const BYTES_PER_MB: u64 = 1024 * 1024;

/// Persistent packing settings, usually loaded from a TOML file.
///
/// Every field has a default so a config file only needs to name what it
/// changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PackConfig {
    /// Directory scanned (non-recursively) for source documents.
    pub source_directory: PathBuf,
    /// Directory receiving the `knowledge_base_<n>.pdf` artifacts.
    pub output_directory: PathBuf,
    /// Where the JSON report is written.
    pub report_path: PathBuf,
    /// Token ceiling of one artifact.
    pub max_tokens_per_file: u64,
    /// Byte ceiling of one artifact, in megabytes.
    pub max_file_size_mb: u64,
    /// Source files larger than this are skipped before conversion.
    /// Defaults to `max_file_size_mb`.
    pub max_source_file_size_mb: Option<u64>,
    /// Tokenizer name: `bytes-estimate`, `whitespace` or `tiktoken`.
    pub tokenizer: String,
    /// Model whose encoding the `tiktoken` tokenizer uses.
    pub tiktoken_model: String,
    /// Run OCR on scanned PDFs (needs the `ocr` feature and model files).
    pub use_ocr: bool,
    /// Directory holding the OCR detection and recognition models.
    pub ocr_model_dir: Option<PathBuf>,
    /// Accepted file extensions, with or without the leading dot.
    pub file_types: Vec<String>,
    /// Paper size of synthetic (re-flowed text) pages.
    pub paper_size: PaperSize,
    /// Attempts made to re-write an artifact after a transient failure.
    pub write_retries: u32,
}

impl Default for PackConfig {
    fn default() -> Self {
        Self {
            source_directory: PathBuf::from("source_documents"),
            output_directory: PathBuf::from("outputs/merged_pdfs"),
            report_path: PathBuf::from("outputs/report.json"),
            max_tokens_per_file: 2_000_000,
            max_file_size_mb: 200,
            max_source_file_size_mb: None,
            tokenizer: "bytes-estimate".into(),
            tiktoken_model: "gpt-4".into(),
            use_ocr: true,
            ocr_model_dir: None,
            file_types: vec![".pdf".into(), ".epub".into(), ".docx".into(), ".txt".into()],
            paper_size: PaperSize::Letter,
            write_retries: 3,
        }
    }
}

impl PackConfig {
    /// Load a configuration file. Missing keys take their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|err| {
            KbpackError::Config(format!("cannot read {}: {}", path.display(), err))
        })?;
        Self::from_toml(&raw)
            .map_err(|err| KbpackError::Config(format!("{}: {}", path.display(), err)))
    }

    /// Parse a configuration from TOML text.
    pub fn from_toml(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|err| KbpackError::Config(err.to_string()))
    }

    /// Log the effective settings.
    pub fn trace_loaded(&self) {
        info!(
            source = %self.source_directory.display(),
            output = %self.output_directory.display(),
            max_tokens = self.max_tokens_per_file,
            max_size_mb = self.max_file_size_mb,
            "Loaded config"
        );
        debug!(?self, "Config loaded (full debug)");
    }

    /// Validate the artifact limits.
    pub fn limits(&self) -> Result<PackLimits> {
        PackLimits::from_megabytes(self.max_tokens_per_file, self.max_file_size_mb)
    }

    /// Per-source ceiling in bytes.
    pub fn max_source_file_bytes(&self) -> Result<u64> {
        let mb = self.max_source_file_size_mb.unwrap_or(self.max_file_size_mb);
        if mb == 0 {
            return Err(KbpackError::Config(
                "max_source_file_size_mb must be positive".into(),
            ));
        }
        mb.checked_mul(BYTES_PER_MB).ok_or_else(|| {
            KbpackError::Config(format!("max_source_file_size_mb {mb} is too large"))
        })
    }

    /// Whether `path` carries one of the configured extensions.
    pub fn accepts(&self, path: &Path) -> bool {
        let Some(ext) = path.extension().and_then(|ext| ext.to_str()) else {
            return false;
        };
        self.file_types
            .iter()
            .any(|wanted| wanted.trim_start_matches('.').eq_ignore_ascii_case(ext))
    }
}

/// Validated artifact ceilings. Both are strictly positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackLimits {
    pub max_tokens_per_file: u64,
    pub max_file_size_bytes: u64,
}

impl PackLimits {
    pub fn new(max_tokens_per_file: u64, max_file_size_bytes: u64) -> Result<Self> {
        if max_tokens_per_file == 0 {
            return Err(KbpackError::Config(
                "max_tokens_per_file must be positive".into(),
            ));
        }
        if max_file_size_bytes == 0 {
            return Err(KbpackError::Config(
                "max_file_size_bytes must be positive".into(),
            ));
        }
        Ok(Self {
            max_tokens_per_file,
            max_file_size_bytes,
        })
    }

    /// Build limits from a megabyte size ceiling.
    pub fn from_megabytes(max_tokens_per_file: u64, max_file_size_mb: u64) -> Result<Self> {
        let bytes = max_file_size_mb.checked_mul(BYTES_PER_MB).ok_or_else(|| {
            KbpackError::Config(format!("max_file_size_mb {max_file_size_mb} is too large"))
        })?;
        Self::new(max_tokens_per_file, bytes)
    }

    /// Whether running totals stay within both ceilings (inclusive).
    pub fn admits(&self, tokens: u64, bytes: u64) -> bool {
        tokens <= self.max_tokens_per_file && bytes <= self.max_file_size_bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_produce_valid_limits() {
        let limits = PackConfig::default().limits().unwrap();
        assert_eq!(limits.max_tokens_per_file, 2_000_000);
        assert_eq!(limits.max_file_size_bytes, 200 * BYTES_PER_MB);
    }

    #[test]
    fn zero_limits_are_config_errors() {
        assert!(matches!(PackLimits::new(0, 10), Err(KbpackError::Config(_))));
        assert!(matches!(PackLimits::new(10, 0), Err(KbpackError::Config(_))));
        assert!(matches!(
            PackLimits::from_megabytes(10, 0),
            Err(KbpackError::Config(_))
        ));
    }

    #[test]
    fn negative_limit_in_file_is_config_error() {
        let err = PackConfig::from_toml("max_tokens_per_file = -5").unwrap_err();
        assert!(matches!(err, KbpackError::Config(_)));
    }

    #[test]
    fn admits_is_inclusive() {
        let limits = PackLimits::new(100, 1000).unwrap();
        assert!(limits.admits(100, 1000));
        assert!(!limits.admits(101, 1000));
        assert!(!limits.admits(100, 1001));
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = PackConfig::from_toml(
            r#"
            max_tokens_per_file = 5000
            use_ocr = false
            file_types = ["pdf", ".TXT"]
            "#,
        )
        .unwrap();
        assert_eq!(config.max_tokens_per_file, 5000);
        assert!(!config.use_ocr);
        assert_eq!(config.max_file_size_mb, 200);
        assert!(config.accepts(Path::new("notes.txt")));
        assert!(config.accepts(Path::new("book.PDF")));
        assert!(!config.accepts(Path::new("book.epub")));
        assert!(!config.accepts(Path::new("README")));
    }

    #[test]
    fn source_ceiling_defaults_to_artifact_ceiling() {
        let mut config = PackConfig {
            max_file_size_mb: 3,
            ..Default::default()
        };
        assert_eq!(config.max_source_file_bytes().unwrap(), 3 * BYTES_PER_MB);
        config.max_source_file_size_mb = Some(1);
        assert_eq!(config.max_source_file_bytes().unwrap(), BYTES_PER_MB);
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kbpack.toml");
        std::fs::write(&path, "max_file_size_mb = 7\ntokenizer = \"whitespace\"\n").unwrap();
        let config = PackConfig::load(&path).unwrap();
        assert_eq!(config.max_file_size_mb, 7);
        assert_eq!(config.tokenizer, "whitespace");
    }

    #[test]
    fn load_missing_file_is_config_error() {
        let err = PackConfig::load("/nonexistent/kbpack.toml").unwrap_err();
        assert!(matches!(err, KbpackError::Config(_)));
    }
}
