//! Reads generation metadata embedded in image files and derives the annotation
//! and tag list sent along with each item.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;
use tracing::{debug, warn};

use crate::tag_filter::{filter_tags_with_csv, AliasMode};

const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', b'\r', b'\n', 0x1a, b'\n'];

/// Which text becomes the item annotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnnotationStyle {
    Parameters,
    Prompt,
    PositivePrompt,
    None,
}

impl From<&str> for AnnotationStyle {
    fn from(s: &str) -> Self {
        match s {
            "Parameters" => AnnotationStyle::Parameters,
            "Prompt" => AnnotationStyle::Prompt,
            "Positive Prompt" => AnnotationStyle::PositivePrompt,
            _ => AnnotationStyle::None,
        }
    }
}

/// Where item tags come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagStyle {
    None,
    Positive,
    PositiveFiltered,
}

impl From<&str> for TagStyle {
    fn from(s: &str) -> Self {
        match s {
            "None" => TagStyle::None,
            "Positive (filtered)" => TagStyle::PositiveFiltered,
            _ => TagStyle::Positive,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MetadataError {
    #[error("failed to read image: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to decode PNG: {0}")]
    Png(#[from] png::DecodingError),
}

/// Keyword → text pairs from an image's text chunks.
#[derive(Debug, Default, Clone)]
pub struct TextMetadata {
    fields: HashMap<String, String>,
}

impl TextMetadata {
    pub fn get(&self, keyword: &str) -> Option<&str> {
        self.fields.get(keyword).map(String::as_str)
    }

    pub fn insert(&mut self, keyword: impl Into<String>, text: impl Into<String>) {
        self.fields.insert(keyword.into(), text.into());
    }

    /// The `parameters` field, or empty.
    pub fn parameters(&self) -> &str {
        self.get("parameters").unwrap_or("")
    }

    /// The `prompt` field, or `{}`.
    pub fn prompt(&self) -> &str {
        self.get("prompt").unwrap_or("{}")
    }
}

/// Reads the text chunks of a PNG file. Files without a PNG signature have no metadata.
pub fn read_text_metadata(path: &Path) -> Result<TextMetadata, MetadataError> {
    let mut file = BufReader::new(File::open(path)?);
    let mut signature = [0u8; 8];
    let is_png = match file.read_exact(&mut signature) {
        Ok(()) => signature == PNG_SIGNATURE,
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => false,
        Err(e) => return Err(e.into()),
    };
    if !is_png {
        debug!(path = %path.display(), "Not a PNG file, no embedded text metadata");
        return Ok(TextMetadata::default());
    }

    let decoder = png::Decoder::new(BufReader::new(File::open(path)?));
    let reader = decoder.read_info()?;
    let info = reader.info();

    let mut metadata = TextMetadata::default();
    for chunk in &info.uncompressed_latin1_text {
        metadata.insert(chunk.keyword.clone(), chunk.text.clone());
    }
    for chunk in &info.compressed_latin1_text {
        match chunk.get_text() {
            Ok(text) => metadata.insert(chunk.keyword.clone(), text),
            Err(e) => warn!(keyword = %chunk.keyword, error = %e, "Skipping unreadable zTXt chunk"),
        }
    }
    for chunk in &info.utf8_text {
        match chunk.get_text() {
            Ok(text) => metadata.insert(chunk.keyword.clone(), text),
            Err(e) => warn!(keyword = %chunk.keyword, error = %e, "Skipping unreadable iTXt chunk"),
        }
    }
    debug!(path = %path.display(), fields = metadata.fields.len(), "Read PNG text metadata");
    Ok(metadata)
}

fn negative_marker() -> &'static Regex {
    static MARKER: OnceLock<Regex> = OnceLock::new();
    MARKER.get_or_init(|| Regex::new(r"(?i)negative prompt:").expect("static regex is valid"))
}

/// The part of `parameters_text` before the `Negative prompt:` marker, trimmed.
pub fn positive_prompt(parameters_text: &str) -> String {
    match negative_marker().find(parameters_text) {
        Some(m) => parameters_text[..m.start()].trim().to_string(),
        None => parameters_text.trim().to_string(),
    }
}

/// Renders the annotation for `style`.
pub fn annotation(style: AnnotationStyle, parameters_text: &str, prompt_json_text: &str) -> String {
    match style {
        AnnotationStyle::Parameters => parameters_text.to_string(),
        AnnotationStyle::Prompt => pretty_json(prompt_json_text).unwrap_or_else(|| {
            debug!("Prompt metadata is not valid JSON, using raw text");
            prompt_json_text.to_string()
        }),
        AnnotationStyle::PositivePrompt => positive_prompt(parameters_text),
        AnnotationStyle::None => String::new(),
    }
}

fn pretty_json(text: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(text).ok()?;
    let mut out = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut out, formatter);
    value.serialize(&mut serializer).ok()?;
    String::from_utf8(out).ok().map(|text| escape_non_ascii(&text))
}

/// `\uXXXX`-escapes every non-ASCII character, as UTF-16 surrogate pairs above the BMP.
/// Serialized JSON only carries non-ASCII inside string literals, so this stays valid JSON.
fn escape_non_ascii(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if c.is_ascii() {
            out.push(c);
        } else {
            let mut units = [0u16; 2];
            for unit in c.encode_utf16(&mut units) {
                out.push_str(&format!("\\u{unit:04x}"));
            }
        }
    }
    out
}

/// Comma-separated prompt segments, trimmed, empties dropped.
pub fn split_prompt_tags(positive_prompt_text: &str) -> Vec<String> {
    positive_prompt_text
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// Derives item tags from the positive prompt according to `style`.
pub fn tags_from_prompt(
    style: TagStyle,
    positive_prompt_text: &str,
    csv_dir: &Path,
    csv_file: Option<&str>,
    alias_mode: AliasMode,
) -> Vec<String> {
    match style {
        TagStyle::None => Vec::new(),
        TagStyle::Positive => split_prompt_tags(positive_prompt_text),
        TagStyle::PositiveFiltered => filter_tags_with_csv(
            &split_prompt_tags(positive_prompt_text),
            csv_dir,
            csv_file,
            alias_mode,
        ),
    }
}
