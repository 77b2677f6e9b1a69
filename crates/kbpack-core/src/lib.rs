// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// kbpack-core: core types, limits, collaborator traits and error definitions
// shared across all crates.

pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use config::{PackConfig, PackLimits};
pub use error::{KbpackError, Result};
pub use traits::{ArtifactWriter, PageSource, PageStream, Tokenizer};
pub use types::*;
