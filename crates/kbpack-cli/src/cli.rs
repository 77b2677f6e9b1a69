// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Command-line arguments and the `pack` command.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use kbpack_core::config::{BYTES_PER_MB, PackConfig};
use kbpack_document::{DocumentPageSource, PdfArtifactWriter, create_tokenizer};
use kbpack_engine::{Pipeline, Report, RetryConfig};

use crate::discover::discover_documents;

#[derive(Parser)]
#[command(
    name = "kbpack",
    version,
    about = "Pack PDFs, scans, EPUB, DOCX and text into token- and size-bounded knowledge-base PDFs"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Pack every accepted file of the source directory
    Pack(PackArgs),
}

#[derive(Args, Debug, Default)]
pub struct PackArgs {
    /// TOML config file; flags below override its values
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Directory scanned for source documents
    #[arg(long)]
    pub source: Option<PathBuf>,

    /// Directory receiving knowledge_base_<n>.pdf files
    #[arg(long)]
    pub output: Option<PathBuf>,

    /// Path of the JSON report
    #[arg(long)]
    pub report: Option<PathBuf>,

    /// Token ceiling per artifact
    #[arg(long)]
    pub max_tokens: Option<u64>,

    /// Size ceiling per artifact, in megabytes
    #[arg(long)]
    pub max_size_mb: Option<u64>,

    /// Skip scanned PDFs instead of running OCR
    #[arg(long)]
    pub no_ocr: bool,

    /// Tokenizer: bytes-estimate, whitespace or tiktoken
    #[arg(long)]
    pub tokenizer: Option<String>,
}

impl PackArgs {
    /// Load the config file (or defaults) and apply the flags on top.
    pub fn resolve_config(&self) -> Result<PackConfig> {
        let mut config = match &self.config {
            Some(path) => PackConfig::load(path)?,
            None => PackConfig::default(),
        };
        if let Some(source) = &self.source {
            config.source_directory = source.clone();
        }
        if let Some(output) = &self.output {
            config.output_directory = output.clone();
        }
        if let Some(report) = &self.report {
            config.report_path = report.clone();
        }
        if let Some(max_tokens) = self.max_tokens {
            config.max_tokens_per_file = max_tokens;
        }
        if let Some(max_size_mb) = self.max_size_mb {
            config.max_file_size_mb = max_size_mb;
        }
        if self.no_ocr {
            config.use_ocr = false;
        }
        if let Some(tokenizer) = &self.tokenizer {
            config.tokenizer = tokenizer.clone();
        }
        Ok(config)
    }
}

/// What a finished run produced.
#[derive(Debug)]
pub struct RunOutcome {
    pub report: Report,
    pub failed_writes: usize,
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        self.failed_writes == 0
    }
}

pub fn run(cli: Cli) -> Result<RunOutcome> {
    match cli.command {
        Commands::Pack(args) => pack(&args.resolve_config()?),
    }
}

/// Run the whole pack: discover, convert, pack, write, report.
pub fn pack(config: &PackConfig) -> Result<RunOutcome> {
    config.trace_loaded();
    let limits = config.limits()?;
    let max_source_bytes = config.max_source_file_bytes()?;
    let tokenizer = create_tokenizer(&config.tokenizer, &config.tiktoken_model)?;
    let source = DocumentPageSource::from_config(config)?;
    let writer = PdfArtifactWriter::new(&config.output_directory, config.paper_size);

    let documents = discover_documents(config)?;

    let mut pipeline = Pipeline::new(limits, source, tokenizer, writer)
        .retry(RetryConfig::with_max_retries(config.write_retries))
        .max_source_bytes(max_source_bytes);
    // Batches already sealed and the report still land if the run aborts.
    let outcome = pipeline.run(&documents);
    let report = pipeline.finish();
    let failed_writes = pipeline.write_failures().len();

    report
        .write_json(&config.report_path)
        .with_context(|| format!("writing report to {}", config.report_path.display()))?;
    outcome?;

    print_summary(&report, config);
    Ok(RunOutcome {
        report,
        failed_writes,
    })
}

fn print_summary(report: &Report, config: &PackConfig) {
    for skipped in report.skipped_files() {
        println!(
            "skipped {}: {}",
            skipped.path,
            skipped.reason.as_deref().unwrap_or("no reason recorded")
        );
    }
    let summary = &report.summary;
    println!(
        "Packed {} documents ({} complete, {} split, {} skipped, {} failed) into {} artifact(s) \
         of at most {} tokens / {} MB in {}; report at {}",
        summary.total_documents,
        summary.complete,
        summary.split,
        summary.skipped,
        summary.failed,
        summary.artifacts_written,
        report.limits.max_tokens_per_file,
        report.limits.max_file_size_bytes / BYTES_PER_MB,
        config.output_directory.display(),
        config.report_path.display(),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use kbpack_core::types::DocumentStatus;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn flags_override_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("kbpack.toml");
        std::fs::write(
            &config_path,
            "max_tokens_per_file = 100\nmax_file_size_mb = 9\ntokenizer = \"whitespace\"\n",
        )
        .unwrap();

        let cli = Cli::try_parse_from([
            "kbpack",
            "pack",
            "--config",
            config_path.to_str().unwrap(),
            "--max-tokens",
            "500",
            "--no-ocr",
            "--output",
            "out",
        ])
        .unwrap();
        let Commands::Pack(args) = cli.command;
        let config = args.resolve_config().unwrap();
        assert_eq!(config.max_tokens_per_file, 500);
        assert_eq!(config.max_file_size_mb, 9);
        assert_eq!(config.tokenizer, "whitespace");
        assert!(!config.use_ocr);
        assert_eq!(config.output_directory, PathBuf::from("out"));
    }

    #[test]
    fn zero_limit_is_rejected_before_any_work() {
        let dir = tempfile::tempdir().unwrap();
        let config = PackConfig {
            source_directory: dir.path().to_path_buf(),
            output_directory: dir.path().join("out"),
            report_path: dir.path().join("report.json"),
            max_tokens_per_file: 0,
            ..Default::default()
        };
        assert!(pack(&config).is_err());
        assert!(!dir.path().join("report.json").exists());
    }

    #[test]
    fn packs_text_sources_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let sources = dir.path().join("sources");
        std::fs::create_dir(&sources).unwrap();
        let long: String = (0..200).map(|n| format!("paragraph {n} of the long file\n")).collect();
        std::fs::write(sources.join("a_long.txt"), long).unwrap();
        std::fs::write(sources.join("b_short.txt"), "a short note").unwrap();
        std::fs::write(sources.join("c_empty.txt"), "   \n").unwrap();
        std::fs::write(sources.join("ignored.json"), "{}").unwrap();

        let config = PackConfig {
            source_directory: sources,
            output_directory: dir.path().join("merged"),
            report_path: dir.path().join("out/report.json"),
            max_tokens_per_file: 1_000,
            tokenizer: "whitespace".into(),
            use_ocr: false,
            ..Default::default()
        };
        let outcome = pack(&config).unwrap();
        assert!(outcome.is_success());

        let report = &outcome.report;
        assert_eq!(report.summary.total_documents, 3);
        assert_eq!(report.summary.skipped, 1);
        assert_eq!(report.documents[0].status, Some(DocumentStatus::Split));
        assert_eq!(report.documents[2].status, Some(DocumentStatus::Skipped));
        assert!(report.summary.artifacts_written >= 2);
        for artifact in &report.artifacts {
            assert!(artifact.total_tokens <= 1_000);
            assert!(dir.path().join("merged").join(&artifact.name).exists());
        }

        let written = std::fs::read_to_string(dir.path().join("out/report.json")).unwrap();
        assert!(written.contains("knowledge_base_1.pdf"));
    }
}
