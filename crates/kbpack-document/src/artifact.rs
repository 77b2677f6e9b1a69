// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Artifact writer: one merged PDF per finalized batch.

use std::path::{Path, PathBuf};

use kbpack_core::error::{KbpackError, Result};
use kbpack_core::traits::ArtifactWriter;
use kbpack_core::types::{Batch, PageContent, PaperSize, WrittenArtifact, artifact_file_name};
use tracing::{debug, info, instrument};

use crate::pdf::merge::PdfAssembler;
use crate::pdf::writer::TextPageRenderer;

/// Writes `knowledge_base_<n>.pdf` files into an output directory.
///
/// Native pages are copied as-is; runs of consecutive synthetic pages are
/// rendered together and then copied, so page order always matches the
/// batch. Files are written under a temporary name and renamed into place.
pub struct PdfArtifactWriter {
    output_dir: PathBuf,
    renderer: TextPageRenderer,
}

impl PdfArtifactWriter {
    pub fn new(output_dir: impl Into<PathBuf>, paper_size: PaperSize) -> Self {
        Self {
            output_dir: output_dir.into(),
            renderer: TextPageRenderer::new(paper_size),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Serialised bytes of the merged batch.
    pub fn assemble(&self, batch: &Batch) -> Result<Vec<u8>> {
        let mut assembler = PdfAssembler::new();
        let mut pending_text: Vec<String> = Vec::new();

        for page in batch.pages() {
            match &page.content {
                PageContent::Text(chunk) => pending_text.push(chunk.clone()),
                PageContent::PdfPage(bytes) => {
                    self.flush_text(&mut assembler, &mut pending_text)?;
                    assembler.append_pdf_bytes(bytes)?;
                }
            }
        }
        self.flush_text(&mut assembler, &mut pending_text)?;

        debug!(
            batch_index = batch.batch_index(),
            pages = assembler.page_count(),
            "batch assembled"
        );
        assembler.finish()
    }

    fn flush_text(&self, assembler: &mut PdfAssembler, pending: &mut Vec<String>) -> Result<()> {
        if pending.is_empty() {
            return Ok(());
        }
        let rendered = self.renderer.render_pages(pending)?;
        assembler.append_pdf_bytes(&rendered)?;
        pending.clear();
        Ok(())
    }
}

impl ArtifactWriter for PdfArtifactWriter {
    #[instrument(skip_all, fields(batch_index = batch.batch_index(), pages = batch.page_count()))]
    fn write(&mut self, batch: &Batch) -> Result<WrittenArtifact> {
        let bytes = self.assemble(batch)?;

        std::fs::create_dir_all(&self.output_dir)?;
        let name = artifact_file_name(batch.batch_index());
        let path = self.output_dir.join(&name);
        let partial = self.output_dir.join(format!("{name}.partial"));

        std::fs::write(&partial, &bytes)?;
        if let Err(err) = std::fs::rename(&partial, &path) {
            let _ = std::fs::remove_file(&partial);
            return Err(KbpackError::Io(err));
        }
        let byte_size = std::fs::metadata(&path)?.len();

        info!(
            artifact = %name,
            bytes = byte_size,
            tokens = batch.cumulative_tokens(),
            "Artifact written"
        );
        Ok(WrittenArtifact {
            name,
            path,
            byte_size,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::reader::PdfReader;
    use kbpack_core::types::{DocumentId, Page};

    fn text_page(doc: u32, seq: u32, text: &str) -> Page {
        Page {
            document_id: DocumentId(doc),
            sequence_index: seq,
            token_count: 10,
            byte_size_estimate: 100,
            content: PageContent::Text(text.into()),
        }
    }

    fn pdf_page(doc: u32, seq: u32, paper: PaperSize) -> Page {
        let bytes = TextPageRenderer::new(paper)
            .render_pages(&["native".to_string()])
            .unwrap();
        Page {
            document_id: DocumentId(doc),
            sequence_index: seq,
            token_count: 10,
            byte_size_estimate: bytes.len() as u64,
            content: PageContent::PdfPage(bytes),
        }
    }

    fn media_width(reader: &PdfReader, page_number: u32) -> f32 {
        let doc = reader.document();
        let page = doc.get_dictionary(doc.get_pages()[&page_number]).unwrap();
        page.get(b"MediaBox").unwrap().as_array().unwrap()[2]
            .as_float()
            .unwrap()
    }

    #[test]
    fn writes_named_artifact_with_all_pages_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("merged");
        let mut writer = PdfArtifactWriter::new(&out, PaperSize::Letter);

        let mut batch = Batch::open(3);
        batch.append(text_page(0, 0, "alpha")).unwrap();
        batch.append(pdf_page(1, 0, PaperSize::A5)).unwrap();
        batch.append(text_page(2, 0, "beta")).unwrap();
        batch.append(text_page(2, 1, "gamma")).unwrap();
        batch.finalize();

        let artifact = writer.write(&batch).unwrap();
        assert_eq!(artifact.name, "knowledge_base_3.pdf");
        assert_eq!(artifact.path, out.join("knowledge_base_3.pdf"));
        assert_eq!(
            artifact.byte_size,
            std::fs::metadata(&artifact.path).unwrap().len()
        );
        assert!(!out.join("knowledge_base_3.pdf.partial").exists());

        let reader = PdfReader::open(&artifact.path).unwrap();
        assert_eq!(reader.page_count(), 4);
        // The native A5 page sits between Letter-sized synthetic pages.
        assert!(media_width(&reader, 2) < media_width(&reader, 1));
        assert!(media_width(&reader, 2) < media_width(&reader, 3));
    }

    #[test]
    fn rewriting_same_batch_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = PdfArtifactWriter::new(dir.path(), PaperSize::A4);
        let mut batch = Batch::open(1);
        batch.append(text_page(0, 0, "once")).unwrap();
        batch.finalize();

        let first = writer.write(&batch).unwrap();
        let second = writer.write(&batch).unwrap();
        assert_eq!(first.path, second.path);
        assert_eq!(PdfReader::open(&second.path).unwrap().page_count(), 1);
    }

    #[test]
    fn corrupt_native_page_fails_without_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = PdfArtifactWriter::new(dir.path(), PaperSize::A4);
        let mut batch = Batch::open(2);
        batch
            .append(Page {
                document_id: DocumentId(0),
                sequence_index: 0,
                token_count: 1,
                byte_size_estimate: 4,
                content: PageContent::PdfPage(b"junk".to_vec()),
            })
            .unwrap();
        batch.finalize();

        assert!(matches!(writer.write(&batch), Err(KbpackError::PdfError(_))));
        assert!(!dir.path().join("knowledge_base_2.pdf").exists());
    }
}
