// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Page-level PDF assembly: copies pages (and everything they reference) from
// loaded lopdf documents into a fresh output document, in call order.

use std::collections::HashMap;

use kbpack_core::error::{KbpackError, Result};
use lopdf::{Dictionary, Document, Object, ObjectId};
use tracing::{debug, warn};

/// Page attributes a page may inherit from its ancestors in the page tree.
const INHERITABLE: [&[u8]; 4] = [b"Resources", b"MediaBox", b"CropBox", b"Rotate"];

/// Upper bound on page-tree depth when resolving inherited attributes.
const MAX_TREE_DEPTH: usize = 64;

/// Builds a new PDF by appending pages copied out of other documents.
pub struct PdfAssembler {
    document: Document,
    pages_id: ObjectId,
    page_count: u32,
}

impl Default for PdfAssembler {
    fn default() -> Self {
        Self::new()
    }
}

impl PdfAssembler {
    /// Start an empty document with a catalog and an empty page tree.
    pub fn new() -> Self {
        let mut document = Document::with_version("1.5");
        let pages_id = document.new_object_id();

        let mut pages = Dictionary::new();
        pages.set("Type", Object::Name(b"Pages".to_vec()));
        pages.set("Kids", Object::Array(Vec::new()));
        pages.set("Count", Object::Integer(0));
        document.objects.insert(pages_id, Object::Dictionary(pages));

        let mut catalog = Dictionary::new();
        catalog.set("Type", Object::Name(b"Catalog".to_vec()));
        catalog.set("Pages", Object::Reference(pages_id));
        let catalog_id = document.add_object(Object::Dictionary(catalog));
        document.trailer.set("Root", Object::Reference(catalog_id));

        Self {
            document,
            pages_id,
            page_count: 0,
        }
    }

    pub fn page_count(&self) -> u32 {
        self.page_count
    }

    /// Append one page of `source` as the last page.
    pub fn append_page(&mut self, source: &Document, page_id: ObjectId) -> Result<()> {
        let page = source.get_dictionary(page_id).map_err(|err| {
            KbpackError::PdfError(format!("cannot read page object {:?}: {}", page_id, err))
        })?;

        let mut cloner = ObjectCloner::new(source, page_id);
        let cloned_id = self.document.new_object_id();
        cloner.mapped.insert(page_id, cloned_id);

        let mut cloned = Dictionary::new();
        for (key, value) in page.iter() {
            if key == b"Parent" {
                continue;
            }
            let value = cloner.clone_object(&mut self.document, value)?;
            cloned.set(key.clone(), value);
        }

        // Attributes inherited from the source page tree would be lost with
        // the /Parent link, so they are pinned on the page itself.
        for key in INHERITABLE {
            if cloned.has(key) {
                continue;
            }
            if let Some(value) = inherited_attribute(source, page, key) {
                let value = cloner.clone_object(&mut self.document, value)?;
                cloned.set(key.to_vec(), value);
            }
        }

        cloned.set("Parent", Object::Reference(self.pages_id));
        self.document
            .objects
            .insert(cloned_id, Object::Dictionary(cloned));

        let pages = self
            .document
            .get_object_mut(self.pages_id)
            .and_then(Object::as_dict_mut)
            .map_err(|err| KbpackError::PdfError(format!("output page tree missing: {}", err)))?;
        if let Ok(Object::Array(kids)) = pages.get_mut(b"Kids") {
            kids.push(Object::Reference(cloned_id));
        }
        self.page_count += 1;
        pages.set("Count", Object::Integer(i64::from(self.page_count)));
        Ok(())
    }

    /// Append every page of `source`, in page order.
    pub fn append_document(&mut self, source: &Document) -> Result<()> {
        for (_, page_id) in source.get_pages() {
            self.append_page(source, page_id)?;
        }
        Ok(())
    }

    /// Parse `bytes` as a PDF and append all of its pages.
    pub fn append_pdf_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        let source = Document::load_mem(bytes)
            .map_err(|err| KbpackError::PdfError(format!("failed to load page PDF: {}", err)))?;
        self.append_document(&source)
    }

    /// Serialise the assembled document.
    pub fn finish(mut self) -> Result<Vec<u8>> {
        self.document.compress();
        let mut output = Vec::new();
        self.document.save_to(&mut output).map_err(|err| {
            KbpackError::PdfError(format!("failed to serialise assembled PDF: {}", err))
        })?;
        debug!(pages = self.page_count, bytes = output.len(), "PDF assembled");
        Ok(output)
    }
}

/// Deep copy of an object graph from one document into another.
///
/// Each source object is copied at most once per page, so shared resources
/// stay shared and reference cycles terminate. References to other pages
/// (link targets, article beads) are dropped to keep the copy to one page.
struct ObjectCloner<'a> {
    source: &'a Document,
    root_page: ObjectId,
    mapped: HashMap<ObjectId, ObjectId>,
}

impl<'a> ObjectCloner<'a> {
    fn new(source: &'a Document, root_page: ObjectId) -> Self {
        Self {
            source,
            root_page,
            mapped: HashMap::new(),
        }
    }

    fn clone_object(&mut self, target: &mut Document, object: &Object) -> Result<Object> {
        match object {
            Object::Dictionary(dict) => Ok(Object::Dictionary(self.clone_dictionary(target, dict)?)),
            Object::Array(items) => {
                let mut cloned = Vec::with_capacity(items.len());
                for item in items {
                    cloned.push(self.clone_object(target, item)?);
                }
                Ok(Object::Array(cloned))
            }
            Object::Reference(id) => self.clone_reference(target, *id),
            Object::Stream(stream) => {
                let dict = self.clone_dictionary(target, &stream.dict)?;
                let mut cloned = lopdf::Stream::new(dict, stream.content.clone());
                cloned.allows_compression = stream.allows_compression;
                Ok(Object::Stream(cloned))
            }
            other => Ok(other.clone()),
        }
    }

    fn clone_dictionary(&mut self, target: &mut Document, dict: &Dictionary) -> Result<Dictionary> {
        let mut cloned = Dictionary::new();
        for (key, value) in dict.iter() {
            if key == b"Parent" {
                continue;
            }
            cloned.set(key.clone(), self.clone_object(target, value)?);
        }
        Ok(cloned)
    }

    fn clone_reference(&mut self, target: &mut Document, id: ObjectId) -> Result<Object> {
        if let Some(&mapped) = self.mapped.get(&id) {
            return Ok(Object::Reference(mapped));
        }
        let referenced = match self.source.get_object(id) {
            Ok(object) => object,
            Err(err) => {
                warn!(?id, %err, "cannot resolve reference, using Null");
                return Ok(Object::Null);
            }
        };
        if id != self.root_page && is_page(referenced) {
            return Ok(Object::Null);
        }

        let new_id = target.new_object_id();
        self.mapped.insert(id, new_id);
        let cloned = self.clone_object(target, referenced)?;
        target.objects.insert(new_id, cloned);
        Ok(Object::Reference(new_id))
    }
}

fn is_page(object: &Object) -> bool {
    object
        .as_dict()
        .ok()
        .and_then(|dict| dict.get(b"Type").ok())
        .and_then(|kind| kind.as_name().ok())
        .is_some_and(|name| name == b"Page")
}

/// Look `key` up on the page, then on each ancestor page-tree node.
fn inherited_attribute<'a>(
    source: &'a Document,
    page: &'a Dictionary,
    key: &[u8],
) -> Option<&'a Object> {
    let mut node = page;
    for _ in 0..MAX_TREE_DEPTH {
        if let Ok(value) = node.get(key) {
            return Some(value);
        }
        let parent_id = node.get(b"Parent").and_then(Object::as_reference).ok()?;
        node = source.get_dictionary(parent_id).ok()?;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::writer::TextPageRenderer;
    use kbpack_core::types::PaperSize;

    fn pdf(paper: PaperSize, pages: &[&str]) -> Vec<u8> {
        let pages: Vec<String> = pages.iter().map(|page| page.to_string()).collect();
        TextPageRenderer::new(paper).render_pages(&pages).unwrap()
    }

    fn two_page_pdf() -> Vec<u8> {
        pdf(PaperSize::Letter, &["first page", "second page"])
    }

    fn media_box_width(doc: &Document, page_number: u32) -> f32 {
        let page = doc.get_dictionary(doc.get_pages()[&page_number]).unwrap();
        let media_box = page.get(b"MediaBox").unwrap().as_array().unwrap();
        media_box[2].as_float().unwrap()
    }

    #[test]
    fn empty_assembler_has_no_pages() {
        let bytes = PdfAssembler::new().finish().unwrap();
        let doc = Document::load_mem(&bytes).unwrap();
        assert_eq!(doc.get_pages().len(), 0);
    }

    #[test]
    fn pages_are_appended_in_order() {
        let letter = Document::load_mem(&pdf(PaperSize::Letter, &["letter"])).unwrap();
        let a5 = Document::load_mem(&pdf(PaperSize::A5, &["a5"])).unwrap();

        let mut assembler = PdfAssembler::new();
        assembler.append_document(&a5).unwrap();
        assembler.append_document(&letter).unwrap();
        assert_eq!(assembler.page_count(), 2);

        let merged = Document::load_mem(&assembler.finish().unwrap()).unwrap();
        assert_eq!(merged.get_pages().len(), 2);
        assert!(media_box_width(&merged, 1) < media_box_width(&merged, 2));
    }

    #[test]
    fn copied_page_keeps_media_box() {
        let source = Document::load_mem(&two_page_pdf()).unwrap();
        let mut assembler = PdfAssembler::new();
        assembler.append_document(&source).unwrap();
        let merged = Document::load_mem(&assembler.finish().unwrap()).unwrap();
        let page_id = merged.get_pages()[&1];
        let page = merged.get_dictionary(page_id).unwrap();
        assert!(page.has(b"MediaBox"));
    }

    #[test]
    fn garbage_bytes_are_rejected() {
        let mut assembler = PdfAssembler::new();
        let err = assembler.append_pdf_bytes(b"not a pdf").unwrap_err();
        assert!(matches!(err, KbpackError::PdfError(_)));
    }
}
