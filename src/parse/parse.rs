use serde::Deserialize;
use std::{fs, path::Path};

use crate::error::{Error, Result};

/// One `{ source, destination }` entry of a multi-stream configuration.
///
/// The older `video` / `url` key names are still accepted.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct StreamEntry {
    #[serde(alias = "video")]
    pub source: String,
    #[serde(alias = "url")]
    pub destination: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Json,
    Yaml,
}

impl Format {
    /// `.yaml` / `.yml` files are read as YAML, everything else as JSON.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml") => {
                Format::Yaml
            }
            _ => Format::Json,
        }
    }
}



/*
    @@@
    @parse_entries();
    . Deserializes the raw text as a list of stream entries; `origin` names the input in error messages.
    . Rejects an empty list and entries whose source or destination is blank.
*/
pub fn parse_entries(raw: &str, format: Format, origin: &str) -> Result<Vec<StreamEntry>> {
    let entries: Vec<StreamEntry> = match format {
        Format::Json => serde_json::from_str(raw).map_err(|e| Error::config(format!("{origin}: {e}")))?,
        Format::Yaml => serde_yaml::from_str(raw).map_err(|e| Error::config(format!("{origin}: {e}")))?,
    };

    if entries.is_empty() {
        return Err(Error::config(format!("{origin}: no streams declared")));
    }

    for (i, entry) in entries.iter().enumerate() {
        if entry.source.trim().is_empty() {
            return Err(Error::config(format!("{origin}: entry {i} has an empty source")));
        }
        if entry.destination.trim().is_empty() {
            return Err(Error::config(format!("{origin}: entry {i} has an empty destination")));
        }
    }

    Ok(entries)
}



/*
    @@@
    @load_file();
    . Reads the whole config file; I/O errors (missing file, permissions) become configuration errors.
    . Picks the format from the extension and hands the text to parse_entries().
*/
pub fn load_file(path: &Path) -> Result<Vec<StreamEntry>> {
    let origin = path.display().to_string();
    let raw = fs::read_to_string(path).map_err(|e| Error::config(format!("{origin}: {e}")))?;
    parse_entries(&raw, Format::from_path(path), &origin)
}
