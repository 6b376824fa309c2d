//! Filters prompt tokens against a tag/alias CSV table.
//!
//! The CSV files follow the autocomplete layout `tag,category,post_count,aliases`
//! where `aliases` is itself a comma-separated list (quoted in the CSV). The first
//! record is treated as a header and skipped.
//!
//! Filtering is fail-open: if no table can be built, the input tokens are returned
//! unchanged.

use std::collections::{HashMap, HashSet};
use std::io::Read;
use std::path::Path;

use tracing::{debug, info, warn};

/// How aliases are treated when filtering tokens against the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AliasMode {
    /// Keep a token only when it is a known alias, in its alias form.
    UseAlias,
    /// Replace a token by its canonical tag.
    UseMain,
    /// Emit the canonical tag followed by the alias for known aliases.
    UseBoth,
    /// Keep a token only when it is itself a canonical tag.
    Default,
}

impl From<&str> for AliasMode {
    fn from(s: &str) -> Self {
        match s {
            "Use alias" => AliasMode::UseAlias,
            "Use main" => AliasMode::UseMain,
            "Use both" => AliasMode::UseBoth,
            _ => AliasMode::Default,
        }
    }
}

/// Lower-cases, trims and maps underscores to spaces.
pub fn normalize_tag(raw: &str) -> String {
    raw.trim().to_lowercase().replace('_', " ")
}

/// Tag lookup tables built from one CSV resource.
#[derive(Debug, Default, Clone)]
pub struct AliasTable {
    canonical: HashMap<String, String>,
    aliases: HashMap<String, String>,
    tags: HashSet<String>,
}

impl AliasTable {
    /// Parses CSV rows of `(tag, _, _, aliases)`. Rows with fewer than four fields are skipped.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, csv::Error> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(reader);

        let mut table = AliasTable::default();
        for record in rdr.records() {
            let record = record?;
            if record.len() < 4 {
                continue;
            }
            let tag = normalize_tag(&record[0]);
            table.tags.insert(tag.clone());
            table.canonical.insert(tag.clone(), tag.clone());

            let alias_list = &record[3];
            if alias_list.is_empty() {
                continue;
            }
            for alias in alias_list.split(',') {
                let alias = normalize_tag(alias);
                if !alias.is_empty() {
                    table.aliases.insert(alias, tag.clone());
                }
            }
        }
        Ok(table)
    }

    /// Loads `csv_dir/file_name`. Returns `None` if the file is missing or unreadable.
    pub fn load(csv_dir: &Path, file_name: &str) -> Option<Self> {
        let csv_path = csv_dir.join(file_name);
        if !csv_path.is_file() {
            warn!(path = %csv_path.display(), "Tag CSV not found, tags left unfiltered");
            return None;
        }
        let file = match std::fs::File::open(&csv_path) {
            Ok(f) => f,
            Err(e) => {
                warn!(error = ?e, path = %csv_path.display(), "Failed to open tag CSV");
                return None;
            }
        };
        match AliasTable::from_reader(file) {
            Ok(table) => {
                info!(
                    path = %csv_path.display(),
                    tags = table.tags.len(),
                    aliases = table.aliases.len(),
                    "Loaded tag CSV"
                );
                Some(table)
            }
            Err(e) => {
                warn!(error = ?e, path = %csv_path.display(), "Failed to parse tag CSV");
                None
            }
        }
    }

    pub fn is_alias(&self, token: &str) -> bool {
        self.aliases.contains_key(token)
    }

    pub fn is_tag(&self, token: &str) -> bool {
        self.tags.contains(token)
    }

    /// Resolves a normalized token to its canonical tag. The alias map is consulted
    /// before the token is looked up as a tag of its own.
    pub fn canonical_for(&self, token: &str) -> Option<&str> {
        let base = self.aliases.get(token).map(String::as_str).unwrap_or(token);
        self.canonical.get(base).map(String::as_str)
    }

    /// Applies `mode` to each token. Output is deduplicated in first-occurrence order.
    pub fn filter(&self, tags: &[String], mode: AliasMode) -> Vec<String> {
        let mut result = Vec::with_capacity(tags.len());
        for raw in tags {
            let token = normalize_tag(raw);
            let main = self.canonical_for(&token);
            match mode {
                AliasMode::UseAlias => {
                    if self.is_alias(&token) {
                        result.push(token);
                    }
                }
                AliasMode::UseMain => {
                    if let Some(main) = main {
                        result.push(main.to_string());
                    }
                }
                AliasMode::UseBoth => {
                    match main {
                        Some(main) if self.is_alias(&token) => {
                            result.push(main.to_string());
                            result.push(token);
                        }
                        _ => {}
                    }
                }
                AliasMode::Default => {
                    if self.is_tag(&token) {
                        result.push(token);
                    }
                }
            }
        }
        dedup_preserving_order(result)
    }
}

/// Filters `tags` with the CSV named `csv_file` under `csv_dir`.
/// Without a CSV name, or when the CSV cannot be loaded, `tags` is returned unchanged.
pub fn filter_tags_with_csv(
    tags: &[String],
    csv_dir: &Path,
    csv_file: Option<&str>,
    mode: AliasMode,
) -> Vec<String> {
    let Some(csv_file) = csv_file.filter(|name| !name.is_empty()) else {
        debug!("No tag CSV configured, tags left unfiltered");
        return tags.to_vec();
    };
    match AliasTable::load(csv_dir, csv_file) {
        Some(table) => {
            let filtered = table.filter(tags, mode);
            debug!(before = tags.len(), after = filtered.len(), ?mode, "Filtered tags");
            filtered
        }
        None => tags.to_vec(),
    }
}

fn dedup_preserving_order(tags: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::with_capacity(tags.len());
    tags.into_iter().filter(|t| seen.insert(t.clone())).collect()
}
