//! Loads XML documents from disk

use crate::document::Document;
use crate::error::ParseError;
use log::debug;
use std::fs;
use std::path::Path;

/// Read and parse the file at `path`.
///
/// A missing or unreadable file and malformed XML are both `ParseError`s
/// carrying the offending path.
pub fn load(path: &Path) -> Result<Document, ParseError> {
    let content = fs::read_to_string(path).map_err(|source| ParseError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let doc = Document::parse(&content, path)?;
    debug!("loaded {}", path.display());
    Ok(doc)
}
