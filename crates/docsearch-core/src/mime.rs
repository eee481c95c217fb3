//! File-extension to MIME type table for uploads and staged documents.

use std::path::Path;

const TABLE: &[(&str, &str)] = &[
    ("pdf", "application/pdf"),
    ("txt", "text/plain"),
    ("py", "text/x-python"),
    ("js", "application/javascript"),
    ("html", "text/html"),
    ("css", "text/css"),
    ("md", "text/markdown"),
    ("csv", "text/csv"),
    ("xml", "text/xml"),
    ("rtf", "text/rtf"),
];

pub const DEFAULT_MIME: &str = "text/plain";

pub fn for_extension(ext: &str) -> Option<&'static str> {
    let ext = ext.trim_start_matches('.').to_ascii_lowercase();
    TABLE.iter().find(|(e, _)| *e == ext).map(|(_, m)| *m)
}

/// MIME type for a file name, falling back to `text/plain`.
pub fn for_name(name: &str) -> &'static str {
    Path::new(name).extension().and_then(|e| e.to_str()).and_then(for_extension).unwrap_or(DEFAULT_MIME)
}

pub fn is_supported(name: &str) -> bool {
    Path::new(name).extension().and_then(|e| e.to_str()).and_then(for_extension).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_and_unknown_extensions() {
        assert_eq!(for_name("report.PDF"), "application/pdf");
        assert_eq!(for_name("notes.md"), "text/markdown");
        assert_eq!(for_name("archive.zip"), DEFAULT_MIME);
        assert_eq!(for_name("no_extension"), DEFAULT_MIME);
        assert!(is_supported("a.csv"));
        assert!(!is_supported("a.zip"));
    }
}
