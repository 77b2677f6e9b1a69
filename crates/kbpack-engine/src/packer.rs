// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Streaming page packer: greedy, single-pass bin packing of a page stream
// into batches bounded by a token ceiling and a byte ceiling.
//
// At most one batch is open at a time. Every batch sealed by a call is handed
// back to the caller in the result, so memory stays bounded by one batch's
// worth of pages regardless of corpus size.

use kbpack_core::config::PackLimits;
use kbpack_core::error::Result;
use kbpack_core::types::{Batch, Page};
use tracing::{debug, info, warn};

/// Outcome of offering one page.
#[derive(Debug)]
pub enum PackResult {
    /// The page joined the open batch.
    Appended { batch_index: u32 },
    /// The open batch was full: it was sealed and the page opened the next one.
    Rolled { batch_index: u32, finalized: Batch },
    /// The page alone exceeds a limit. It was sealed in its own batch, after
    /// sealing the previously open batch if that one held pages.
    Oversized {
        batch_index: u32,
        previous: Option<Batch>,
        sealed: Batch,
    },
}

impl PackResult {
    /// Batch the offered page landed in.
    pub fn batch_index(&self) -> u32 {
        match self {
            Self::Appended { batch_index }
            | Self::Rolled { batch_index, .. }
            | Self::Oversized { batch_index, .. } => *batch_index,
        }
    }

    pub fn is_oversized(&self) -> bool {
        matches!(self, Self::Oversized { .. })
    }

    /// Number of batches sealed by the call.
    pub fn finalized_count(&self) -> usize {
        match self {
            Self::Appended { .. } => 0,
            Self::Rolled { .. } => 1,
            Self::Oversized { previous, .. } => 1 + usize::from(previous.is_some()),
        }
    }
}

/// Greedy page packer. Construct one per run; it owns its counters.
#[derive(Debug)]
pub struct PagePacker {
    limits: PackLimits,
    current: Option<Batch>,
    next_batch_index: u32,
    pages_offered: u64,
    batches_finalized: u32,
}

impl PagePacker {
    pub fn new(limits: PackLimits) -> Self {
        Self {
            limits,
            current: None,
            next_batch_index: 1,
            pages_offered: 0,
            batches_finalized: 0,
        }
    }

    pub fn limits(&self) -> PackLimits {
        self.limits
    }

    /// Index of the open batch, if one exists.
    pub fn open_batch_index(&self) -> Option<u32> {
        self.current.as_ref().map(Batch::batch_index)
    }

    /// Pages held by the open batch.
    pub fn open_page_count(&self) -> usize {
        self.current.as_ref().map_or(0, Batch::page_count)
    }

    pub fn pages_offered(&self) -> u64 {
        self.pages_offered
    }

    pub fn batches_finalized(&self) -> u32 {
        self.batches_finalized
    }

    /// Place one page. Pages must arrive in document order, then page order.
    pub fn offer(&mut self, page: Page) -> Result<PackResult> {
        self.pages_offered += 1;
        let tokens = page.token_count;
        let bytes = page.byte_size_estimate;

        let mut current = match self.current.take() {
            Some(batch) => batch,
            None => self.open_next(),
        };

        if self.fits(&current, tokens, bytes) {
            let batch_index = current.batch_index();
            current.append(page)?;
            self.current = Some(current);
            return Ok(PackResult::Appended { batch_index });
        }

        let mut previous = None;
        if !current.is_empty() {
            let next = self.open_next();
            let mut finalized = std::mem::replace(&mut current, next);
            self.seal(&mut finalized);

            if self.fits(&current, tokens, bytes) {
                let batch_index = current.batch_index();
                current.append(page)?;
                self.current = Some(current);
                return Ok(PackResult::Rolled {
                    batch_index,
                    finalized,
                });
            }
            previous = Some(finalized);
        }

        // The page exceeds a limit on its own: it becomes the sole occupant
        // of a sealed batch and the next page opens a fresh one.
        let batch_index = current.batch_index();
        warn!(
            batch_index,
            document = %page.document_id,
            sequence_index = page.sequence_index,
            tokens,
            bytes,
            max_tokens = self.limits.max_tokens_per_file,
            max_bytes = self.limits.max_file_size_bytes,
            "single page exceeds artifact limit; packing it alone"
        );
        current.append(page)?;
        current.finalize_oversized();
        self.batches_finalized += 1;

        Ok(PackResult::Oversized {
            batch_index,
            previous,
            sealed: current,
        })
    }

    /// Seal and return the trailing open batch, if it holds pages.
    ///
    /// Called after the last page of the corpus, or when a run is aborted.
    pub fn flush(&mut self) -> Option<Batch> {
        let mut batch = self.current.take().filter(|batch| !batch.is_empty())?;
        self.seal(&mut batch);
        Some(batch)
    }

    fn fits(&self, batch: &Batch, tokens: u64, bytes: u64) -> bool {
        self.limits.admits(
            batch.cumulative_tokens().saturating_add(tokens),
            batch.cumulative_bytes().saturating_add(bytes),
        )
    }

    fn open_next(&mut self) -> Batch {
        let batch_index = self.next_batch_index;
        self.next_batch_index += 1;
        debug!(batch_index, "opened batch");
        Batch::open(batch_index)
    }

    fn seal(&mut self, batch: &mut Batch) {
        batch.finalize();
        self.batches_finalized += 1;
        info!(
            batch_index = batch.batch_index(),
            pages = batch.page_count(),
            tokens = batch.cumulative_tokens(),
            bytes = batch.cumulative_bytes(),
            "batch finalized"
        );
    }
}
