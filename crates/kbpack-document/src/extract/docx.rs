// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// DOCX (WordprocessingML) text: the paragraphs of `word/document.xml`.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use kbpack_core::error::{KbpackError, Result};

use super::markup::MarkupStripper;

const BODY_PART: &str = "word/document.xml";

/// Paragraph text of a DOCX file, one paragraph per line.
pub fn extract(path: &Path, markup: &MarkupStripper) -> Result<String> {
    let file = File::open(path)
        .map_err(|err| KbpackError::Extraction(format!("{}: {}", path.display(), err)))?;
    let mut archive = zip::ZipArchive::new(file).map_err(|err| {
        KbpackError::Extraction(format!("{} is not a DOCX archive: {}", path.display(), err))
    })?;

    let mut part = archive.by_name(BODY_PART).map_err(|err| {
        KbpackError::Extraction(format!("{}: missing {}: {}", path.display(), BODY_PART, err))
    })?;
    let mut raw = Vec::new();
    part.read_to_end(&mut raw)?;

    Ok(markup.docx_to_text(&String::from_utf8_lossy(&raw)))
}
