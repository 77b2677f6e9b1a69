// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Plain-text files.

use std::path::Path;

use kbpack_core::error::{KbpackError, Result};

/// Read a text file as UTF-8, dropping undecodable bytes and a leading BOM.
pub fn extract(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path)
        .map_err(|err| KbpackError::Extraction(format!("{}: {}", path.display(), err)))?;
    Ok(decode_lossy(&bytes))
}

fn decode_lossy(bytes: &[u8]) -> String {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(_) => bytes
            .utf8_chunks()
            .map(|chunk| chunk.valid())
            .collect::<String>(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_bytes_are_dropped() {
        assert_eq!(decode_lossy(b"caf\xC3\xA9 \xFF ok"), "café  ok");
    }

    #[test]
    fn bom_is_stripped() {
        assert_eq!(decode_lossy(b"\xEF\xBB\xBFhello"), "hello");
    }

    #[test]
    fn reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, "line one\nline two\n").unwrap();
        assert_eq!(extract(&path).unwrap(), "line one\nline two\n");
    }

    #[test]
    fn missing_file_is_extraction_error() {
        let err = extract(Path::new("/nonexistent/notes.txt")).unwrap_err();
        assert!(matches!(err, KbpackError::Extraction(_)));
    }
}
