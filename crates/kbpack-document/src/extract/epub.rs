// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// EPUB text: XHTML content documents in spine (reading) order.

use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Seek};
use std::path::Path;

use kbpack_core::error::{KbpackError, Result};
use regex::Regex;
use tracing::{debug, warn};
use zip::ZipArchive;

use super::markup::MarkupStripper;

const CONTAINER_PART: &str = "META-INF/container.xml";

/// Concatenated chapter text of an EPUB file, chapters separated by a blank line.
pub fn extract(path: &Path, markup: &MarkupStripper) -> Result<String> {
    let file = File::open(path)
        .map_err(|err| KbpackError::Extraction(format!("{}: {}", path.display(), err)))?;
    let mut archive = ZipArchive::new(file).map_err(|err| {
        KbpackError::Extraction(format!("{} is not an EPUB archive: {}", path.display(), err))
    })?;

    let chapters = match spine_documents(&mut archive) {
        Ok(chapters) if !chapters.is_empty() => chapters,
        Ok(_) => fallback_documents(&archive),
        Err(err) => {
            warn!(path = %path.display(), %err, "unreadable package document, using archive order");
            fallback_documents(&archive)
        }
    };
    debug!(chapters = chapters.len(), "EPUB content documents");

    let mut texts = Vec::with_capacity(chapters.len());
    for name in &chapters {
        let Some(raw) = read_entry(&mut archive, name) else {
            warn!(entry = %name, "content document missing from archive");
            continue;
        };
        let text = markup.html_to_text(&raw);
        if !text.is_empty() {
            texts.push(text);
        }
    }
    Ok(texts.join("\n\n"))
}

/// Archive entry names of the spine items, resolved through the manifest.
fn spine_documents<R: Read + Seek>(archive: &mut ZipArchive<R>) -> Result<Vec<String>> {
    let container = read_entry(archive, CONTAINER_PART)
        .ok_or_else(|| KbpackError::Extraction(format!("missing {CONTAINER_PART}")))?;
    let rootfile = pattern(r#"<rootfile\b[^>]*\bfull-path\s*=\s*["']([^"']+)["']"#)?
        .captures(&container)
        .map(|caps| caps[1].to_string())
        .ok_or_else(|| KbpackError::Extraction("container lists no rootfile".into()))?;
    let package = read_entry(archive, &rootfile)
        .ok_or_else(|| KbpackError::Extraction(format!("missing package document {rootfile}")))?;
    let base_dir = rootfile.rsplit_once('/').map_or("", |(dir, _)| dir);

    let attribute = pattern(r#"([\w:-]+)\s*=\s*["']([^"']*)["']"#)?;
    let attributes = |tag: &str| -> HashMap<String, String> {
        attribute
            .captures_iter(tag)
            .map(|caps| (caps[1].to_string(), caps[2].to_string()))
            .collect()
    };

    let mut manifest: HashMap<String, (String, String)> = HashMap::new();
    for tag in pattern(r"<item\b[^>]*>")?.find_iter(&package) {
        let attrs = attributes(tag.as_str());
        if let (Some(id), Some(href)) = (attrs.get("id"), attrs.get("href")) {
            let media_type = attrs.get("media-type").cloned().unwrap_or_default();
            manifest.insert(id.clone(), (href.clone(), media_type));
        }
    }

    let mut documents = Vec::new();
    for tag in pattern(r"<itemref\b[^>]*>")?.find_iter(&package) {
        let attrs = attributes(tag.as_str());
        let Some((href, media_type)) = attrs.get("idref").and_then(|id| manifest.get(id)) else {
            continue;
        };
        if media_type.contains("html") || is_html_name(href) {
            documents.push(resolve_href(base_dir, href));
        }
    }
    Ok(documents)
}

/// Every HTML entry of the archive, sorted by name.
fn fallback_documents<R: Read + Seek>(archive: &ZipArchive<R>) -> Vec<String> {
    let mut names: Vec<String> = archive
        .file_names()
        .filter(|name| is_html_name(name))
        .map(str::to_string)
        .collect();
    names.sort();
    names
}

fn read_entry<R: Read + Seek>(archive: &mut ZipArchive<R>, name: &str) -> Option<String> {
    let mut entry = archive.by_name(name).ok()?;
    let mut raw = Vec::new();
    entry.read_to_end(&mut raw).ok()?;
    Some(String::from_utf8_lossy(&raw).into_owned())
}

fn pattern(source: &str) -> Result<Regex> {
    Regex::new(source).map_err(|err| KbpackError::Extraction(format!("bad pattern: {err}")))
}

fn is_html_name(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    lower.ends_with(".xhtml") || lower.ends_with(".html") || lower.ends_with(".htm")
}

/// Join a manifest href onto the package directory, dropping any fragment
/// and resolving `.` / `..` segments.
fn resolve_href(base_dir: &str, href: &str) -> String {
    let href = href.split('#').next().unwrap_or(href).replace("%20", " ");
    let mut segments: Vec<&str> = base_dir.split('/').filter(|s| !s.is_empty()).collect();
    for segment in href.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    segments.join("/")
}
