// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// kbpack: pack a directory of documents into token- and size-bounded
// knowledge-base PDFs.
//
// Entry point. Initialises logging, parses the command line and maps the run
// outcome to the process exit code.

mod cli;
mod discover;

use std::process::ExitCode;

use clap::Parser;

use cli::Cli;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli::run(cli) {
        Ok(outcome) if outcome.is_success() => ExitCode::SUCCESS,
        Ok(outcome) => {
            eprintln!(
                "error: {} artifact(s) could not be written",
                outcome.failed_writes
            );
            ExitCode::from(1)
        }
        Err(err) => {
            tracing::error!(error = %err, "run aborted");
            eprintln!("error: {err:#}");
            ExitCode::from(2)
        }
    }
}
