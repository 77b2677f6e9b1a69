// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// kbpack-engine: the streaming page packer, the provenance ledger that maps
// source pages to artifacts, and the pipeline that drives conversion,
// packing, writing and reporting one document at a time.

pub mod ledger;
pub mod packer;
pub mod pipeline;
pub mod report;
pub mod retry;

pub use ledger::ProvenanceLedger;
pub use packer::{PackResult, PagePacker};
pub use pipeline::Pipeline;
pub use report::Report;
pub use retry::RetryConfig;
