// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Source enumeration: the accepted files directly inside the source directory.

use std::path::Path;

use kbpack_core::config::PackConfig;
use kbpack_core::error::{KbpackError, Result};
use kbpack_core::types::{DocumentFormat, DocumentId, SourceDocument};
use kbpack_document::integrity::hash_file;
use tracing::{debug, info, warn};

/// Files in `config.source_directory` (not recursive), sorted by file name,
/// filtered by `file_types`, with ids assigned in that order.
pub fn discover_documents(config: &PackConfig) -> Result<Vec<SourceDocument>> {
    let dir = &config.source_directory;
    let entries = std::fs::read_dir(dir).map_err(|err| {
        KbpackError::Config(format!("cannot read source directory {}: {}", dir.display(), err))
    })?;

    let mut paths = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if path.is_file() && config.accepts(&path) {
            paths.push(path);
        }
    }
    paths.sort_by(|a, b| a.file_name().cmp(&b.file_name()));

    let mut documents = Vec::with_capacity(paths.len());
    for path in paths {
        let Some(format) = DocumentFormat::from_path(&path) else {
            warn!(path = %path.display(), "accepted extension has no reader, ignoring");
            continue;
        };
        let byte_len = std::fs::metadata(&path)?.len();
        let content_hash = fingerprint(&path);
        debug!(path = %path.display(), %format, byte_len, "source found");
        documents.push(SourceDocument {
            id: DocumentId(documents.len() as u32),
            path,
            format,
            byte_len,
            content_hash,
        });
    }

    info!(count = documents.len(), dir = %dir.display(), "Sources discovered");
    Ok(documents)
}

fn fingerprint(path: &Path) -> Option<String> {
    match hash_file(path) {
        Ok(hash) => Some(hash),
        Err(err) => {
            warn!(path = %path.display(), %err, "cannot hash source");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sorted_filtered_and_numbered() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.txt", "a.pdf", "c.docx", "notes.json", "Z.epub"] {
            std::fs::write(dir.path().join(name), name).unwrap();
        }
        std::fs::create_dir(dir.path().join("nested.txt")).unwrap();

        let config = PackConfig {
            source_directory: dir.path().to_path_buf(),
            ..Default::default()
        };
        let docs = discover_documents(&config).unwrap();
        let names: Vec<String> = docs.iter().map(|doc| doc.display_name()).collect();
        assert_eq!(names, vec!["Z.epub", "a.pdf", "b.txt", "c.docx"]);
        for (index, doc) in docs.iter().enumerate() {
            assert_eq!(doc.id, DocumentId(index as u32));
            assert_eq!(doc.byte_len, doc.display_name().len() as u64);
            assert_eq!(doc.content_hash.as_deref().map(str::len), Some(64));
        }
        assert_eq!(docs[0].format, DocumentFormat::Epub);
    }

    #[test]
    fn file_types_restrict_selection() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.pdf"), "x").unwrap();
        std::fs::write(dir.path().join("b.txt"), "x").unwrap();
        let config = PackConfig {
            source_directory: dir.path().to_path_buf(),
            file_types: vec![".txt".into()],
            ..Default::default()
        };
        let docs = discover_documents(&config).unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].format, DocumentFormat::Txt);
    }

    #[test]
    fn missing_directory_is_config_error() {
        let config = PackConfig {
            source_directory: "/nonexistent/sources".into(),
            ..Default::default()
        };
        assert!(matches!(
            discover_documents(&config),
            Err(KbpackError::Config(_))
        ));
    }
}
