// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Pluggable token counting, selected by name from the config.

use kbpack_core::error::{KbpackError, Result};
use kbpack_core::traits::Tokenizer;
use tracing::info;

/// Default: bytes/4 rounded up. Fast and dependency-free.
#[derive(Debug, Default, Clone, Copy)]
pub struct BytesEstimateTokenizer;

impl Tokenizer for BytesEstimateTokenizer {
    fn count(&self, text: &str) -> Result<u64> {
        Ok((text.len() as u64).div_ceil(4))
    }

    fn name(&self) -> &str {
        "bytes-estimate"
    }
}

/// Counts whitespace-separated words.
#[derive(Debug, Default, Clone, Copy)]
pub struct WhitespaceTokenizer;

impl Tokenizer for WhitespaceTokenizer {
    fn count(&self, text: &str) -> Result<u64> {
        Ok(text.split_whitespace().count() as u64)
    }

    fn name(&self) -> &str {
        "whitespace"
    }
}

/// BPE token counts via tiktoken (requires the `tiktoken` feature).
#[cfg(feature = "tiktoken")]
pub struct TiktokenTokenizer {
    bpe: tiktoken_rs::CoreBPE,
}

#[cfg(feature = "tiktoken")]
impl TiktokenTokenizer {
    /// Encoding used by `model`, e.g. `gpt-4` (cl100k_base).
    pub fn for_model(model: &str) -> Result<Self> {
        let bpe = tiktoken_rs::get_bpe_from_model(model)
            .map_err(|err| KbpackError::Config(format!("tiktoken model {model}: {err}")))?;
        Ok(Self { bpe })
    }
}

#[cfg(feature = "tiktoken")]
impl Tokenizer for TiktokenTokenizer {
    fn count(&self, text: &str) -> Result<u64> {
        Ok(self.bpe.encode_with_special_tokens(text).len() as u64)
    }

    fn name(&self) -> &str {
        "tiktoken"
    }
}

/// Build a tokenizer by name. Unknown names, and `tiktoken` in builds
/// without the feature, are configuration errors.
pub fn create_tokenizer(name: &str, model: &str) -> Result<Box<dyn Tokenizer>> {
    let tokenizer: Box<dyn Tokenizer> = match name {
        "bytes" | "bytes-estimate" => Box::new(BytesEstimateTokenizer),
        "whitespace" => Box::new(WhitespaceTokenizer),
        #[cfg(feature = "tiktoken")]
        "tiktoken" => Box::new(TiktokenTokenizer::for_model(model)?),
        #[cfg(not(feature = "tiktoken"))]
        "tiktoken" => {
            return Err(KbpackError::Config(format!(
                "tokenizer `tiktoken` (model {model}) needs the `tiktoken` feature"
            )));
        }
        other => {
            return Err(KbpackError::Config(format!("unknown tokenizer `{other}`")));
        }
    };
    info!(tokenizer = tokenizer.name(), "Tokenizer selected");
    Ok(tokenizer)
}
