//! File-to-text extraction for the knowledge-base ingester, grounded in
//! `examples/original_source/src/membria/kb_ingest.py`'s per-extension
//! dispatch. Only plain-text formats are extracted natively; binary
//! document/image formats are out of scope for this implementation and
//! are reported as a skippable error so the ingester can move on.

use crate::error::{Error, Result};
use std::path::Path;

const TEXT_EXTENSIONS: &[&str] = &["md", "txt", "html", "htm"];

/// Reads `path` and returns its content as markdown-ish plain text.
/// Non-text formats (pdf/docx/pptx/xlsx/png/jpg) return a `Configuration`
/// error naming the missing extractor, matching the source's behavior
/// of skipping files it lacks a converter for rather than failing the
/// whole run.
pub fn extract_to_markdown(path: &Path) -> Result<String> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("").to_lowercase();
    if TEXT_EXTENSIONS.contains(&ext.as_str()) {
        return std::fs::read_to_string(path).map_err(Error::from);
    }
    Err(Error::Configuration(format!("no extractor registered for .{ext} files")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_markdown_files_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.md");
        std::fs::write(&path, "# Title\n\nbody").unwrap();
        let text = extract_to_markdown(&path).unwrap();
        assert_eq!(text, "# Title\n\nbody");
    }

    #[test]
    fn unsupported_extension_is_a_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scan.pdf");
        std::fs::write(&path, b"%PDF-1.4").unwrap();
        let err = extract_to_markdown(&path);
        assert!(matches!(err, Err(Error::Configuration(_))));
    }
}
