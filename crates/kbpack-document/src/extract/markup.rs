// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// XML/XHTML to plain text, for EPUB chapters and DOCX bodies.

use kbpack_core::error::{KbpackError, Result};
use regex::Regex;

/// Compiled patterns for stripping markup. Build once and reuse.
pub struct MarkupStripper {
    invisible: Regex,
    whitespace: Regex,
    block_break: Regex,
    tag: Regex,
    entity: Regex,
    blank_run: Regex,
    docx_token: Regex,
}

impl MarkupStripper {
    pub fn new() -> Result<Self> {
        Ok(Self {
            invisible: compile(r"(?is)<(script|style|head)\b.*?</(script|style|head)\s*>")?,
            whitespace: compile(r"\s+")?,
            block_break: compile(
                r"(?i)<br\s*/?>|</(p|div|h[1-6]|li|tr|blockquote|pre|section|title)\s*>",
            )?,
            tag: compile(r"(?s)<[^>]*>")?,
            entity: compile(r"&(#[0-9]+|#[xX][0-9a-fA-F]+|[a-zA-Z]+);")?,
            blank_run: compile(r"\n[ \t]*(\n[ \t]*)+")?,
            docx_token: compile(
                r"(?s)<w:t(?:\s[^>/]*)?/>|<w:t(?:\s[^>/]*)?>(.*?)</w:t>|<w:tab/>|<w:(?:br|cr)(?:\s[^>]*)?/>|</w:p>",
            )?,
        })
    }

    /// Visible text of an (X)HTML document, one block element per line.
    pub fn html_to_text(&self, html: &str) -> String {
        let text = self.invisible.replace_all(html, "");
        // Source line breaks are insignificant in HTML.
        let text = self.whitespace.replace_all(&text, " ");
        let text = self.block_break.replace_all(&text, "\n");
        let text = self.tag.replace_all(&text, "");
        let text = self.decode_entities(&text);
        let text: String = text
            .lines()
            .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
            .collect::<Vec<_>>()
            .join("\n");
        self.blank_run.replace_all(&text, "\n\n").trim().to_string()
    }

    /// Paragraph text of a WordprocessingML `document.xml`.
    pub fn docx_to_text(&self, xml: &str) -> String {
        let mut out = String::with_capacity(xml.len() / 4);
        for token in self.docx_token.captures_iter(xml) {
            if let Some(run) = token.get(1) {
                out.push_str(&self.decode_entities(run.as_str()));
                continue;
            }
            match token.get(0).map(|m| m.as_str()) {
                Some("<w:tab/>") => out.push('\t'),
                Some("</w:p>") => out.push('\n'),
                Some(other) if other.starts_with("<w:br") || other.starts_with("<w:cr") => {
                    out.push('\n')
                }
                _ => {}
            }
        }
        out.trim_end().to_string()
    }

    /// Decode the five XML entities, numeric references and `&nbsp;`.
    pub fn decode_entities(&self, text: &str) -> String {
        self.entity
            .replace_all(text, |caps: &regex::Captures<'_>| {
                let name = &caps[1];
                let decoded = match name {
                    "amp" => Some('&'),
                    "lt" => Some('<'),
                    "gt" => Some('>'),
                    "quot" => Some('"'),
                    "apos" => Some('\''),
                    "nbsp" => Some(' '),
                    _ if name.starts_with("#x") || name.starts_with("#X") => {
                        u32::from_str_radix(&name[2..], 16).ok().and_then(char::from_u32)
                    }
                    _ if name.starts_with('#') => {
                        name[1..].parse::<u32>().ok().and_then(char::from_u32)
                    }
                    _ => None,
                };
                decoded.map_or_else(|| caps[0].to_string(), String::from)
            })
            .into_owned()
    }
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|err| KbpackError::Extraction(format!("bad pattern: {err}")))
}
