//! Turns raw document text into indexable [`Chunk`]s.
//!
//! Splitting is recursive over a separator list (`"\n\n"`, `"\n"`, `" "`,
//! `""`): text is cut on the coarsest separator present, pieces that are still
//! too large are cut again with the next one, and small neighbours are merged
//! back up to `chunk_size` characters with `chunk_overlap` characters carried
//! into the next chunk.

use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::config::ChunkingSettings;
use crate::error::Result;
use crate::types::{Chunk, Meta, FILENAME_KEY, STORAGE_PATH_KEY};

pub const CONTENT_HASH_KEY: &str = "content_hash";

const SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];
const TEXT_EXTENSIONS: [&str; 3] = ["txt", "md", "text"];

pub fn content_hash(text: &str) -> String {
    blake3::hash(text.as_bytes()).to_hex().to_string()
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

#[derive(Debug, Clone)]
pub struct TextSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl Default for TextSplitter {
    fn default() -> Self {
        Self::from(&ChunkingSettings::default())
    }
}

impl From<&ChunkingSettings> for TextSplitter {
    fn from(c: &ChunkingSettings) -> Self {
        Self::new(c.chunk_size, c.chunk_overlap)
    }
}

impl TextSplitter {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self { chunk_size, chunk_overlap: chunk_overlap.min(chunk_size - 1) }
    }

    pub fn split(&self, text: &str) -> Vec<String> {
        self.split_with(text, &SEPARATORS)
    }

    fn split_with(&self, text: &str, separators: &[&str]) -> Vec<String> {
        let idx = separators
            .iter()
            .position(|s| s.is_empty() || text.contains(s))
            .unwrap_or(separators.len().saturating_sub(1));
        let separator = separators.get(idx).copied().unwrap_or("");
        let rest = separators.get(idx + 1..).unwrap_or(&[]);

        let pieces: Vec<&str> = if separator.is_empty() {
            text.char_indices().map(|(i, c)| &text[i..i + c.len_utf8()]).collect()
        } else {
            text.split(separator).filter(|s| !s.is_empty()).collect()
        };

        let mut out = Vec::new();
        let mut small: Vec<&str> = Vec::new();
        for piece in pieces {
            if char_len(piece) < self.chunk_size {
                small.push(piece);
                continue;
            }
            if !small.is_empty() {
                out.extend(self.merge(&small, separator));
                small.clear();
            }
            if rest.is_empty() {
                out.push(piece.to_string());
            } else {
                out.extend(self.split_with(piece, rest));
            }
        }
        if !small.is_empty() {
            out.extend(self.merge(&small, separator));
        }
        out
    }

    fn merge(&self, pieces: &[&str], separator: &str) -> Vec<String> {
        let sep_len = char_len(separator);
        let mut docs = Vec::new();
        let mut current: VecDeque<&str> = VecDeque::new();
        let mut total = 0usize;

        for piece in pieces {
            let len = char_len(piece);
            let joiner = if current.is_empty() { 0 } else { sep_len };
            if total + len + joiner > self.chunk_size && !current.is_empty() {
                push_joined(&mut docs, &current, separator);
                while total > self.chunk_overlap
                    || (total > 0 && total + len + if current.is_empty() { 0 } else { sep_len } > self.chunk_size)
                {
                    let Some(first) = current.pop_front() else { break };
                    total -= char_len(first) + if current.is_empty() { 0 } else { sep_len };
                }
            }
            total += len + if current.is_empty() { 0 } else { sep_len };
            current.push_back(piece);
        }
        push_joined(&mut docs, &current, separator);
        docs
    }
}

fn push_joined(docs: &mut Vec<String>, parts: &VecDeque<&str>, separator: &str) {
    let joined = parts.iter().copied().collect::<Vec<_>>().join(separator);
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        docs.push(trimmed.to_string());
    }
}

#[derive(Default)]
pub struct DataProcessor {
    splitter: TextSplitter,
}

impl DataProcessor {
    pub fn new(settings: &ChunkingSettings) -> Self {
        Self { splitter: TextSplitter::from(settings) }
    }

    /// Split one document into chunks carrying `metadata` plus a content hash.
    ///
    /// Ids are `{source}:{n}`, where the source is the document's storage key
    /// when known and its file name otherwise.
    pub fn create_chunks(&self, text: &str, metadata: &Meta) -> Vec<Chunk> {
        let source = metadata
            .get(STORAGE_PATH_KEY)
            .or_else(|| metadata.get(FILENAME_KEY))
            .and_then(serde_json::Value::as_str)
            .unwrap_or("doc");
        self.chunks_with_source(text, metadata, source)
    }

    fn chunks_with_source(&self, text: &str, metadata: &Meta, source: &str) -> Vec<Chunk> {
        self.splitter
            .split(text)
            .into_iter()
            .enumerate()
            .map(|(i, piece)| {
                let mut meta = metadata.clone();
                meta.insert(CONTENT_HASH_KEY.to_string(), serde_json::Value::String(content_hash(&piece)));
                Chunk { id: format!("{source}:{i}"), text: piece, metadata: meta }
            })
            .collect()
    }

    pub fn process_directory(&self, data_dir: &Path) -> Result<Vec<Chunk>> {
        self.process_directory_limited(data_dir, usize::MAX)
    }

    pub fn process_directory_limited(&self, data_dir: &Path, limit: usize) -> Result<Vec<Chunk>> {
        let mut files = list_text_files(data_dir);
        if files.is_empty() {
            info!("No text files found under {}", data_dir.display());
            return Ok(vec![]);
        }
        if files.len() > limit {
            files.truncate(limit);
            info!("Limited to first {} files", limit);
        }
        let mut all_chunks = Vec::new();
        for (file_index, file_path) in files.iter().enumerate() {
            debug!("Processing file {}/{}: {}", file_index + 1, files.len(), file_path.display());
            let content = read_file_content(file_path)?;
            let chunks = self.chunks_with_source(&content, &file_metadata(file_path), &relative_name(data_dir, file_path));
            all_chunks.extend(chunks);
        }
        info!("Processed {} files into {} chunks", files.len(), all_chunks.len());
        Ok(all_chunks)
    }
}

/// `path` relative to `root` with `/` separators, e.g. `manuals/pump.txt`.
pub fn relative_name(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    rel.components().map(|c| c.as_os_str().to_string_lossy()).collect::<Vec<_>>().join("/")
}

/// Metadata recorded for a document read from local disk.
pub fn file_metadata(file_path: &Path) -> Meta {
    let mut meta = Meta::new();
    let name = file_path.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
    meta.insert(FILENAME_KEY.to_string(), serde_json::Value::String(name));
    meta
}

pub fn read_file_content(file_path: &Path) -> Result<String> {
    match fs::read_to_string(file_path) {
        Ok(content) => Ok(content),
        Err(_) => Ok(String::from_utf8_lossy(&fs::read(file_path)?).to_string()),
    }
}

pub fn list_text_files(root: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = walkdir::WalkDir::new(root)
        .into_iter()
        .filter_map(std::result::Result::ok)
        .filter(|e| e.file_type().is_file())
        .map(walkdir::DirEntry::into_path)
        .filter(|p| p.extension().and_then(|s| s.to_str()).is_some_and(|ext| TEXT_EXTENSIONS.contains(&ext)))
        .collect();
    files.sort();
    files
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_is_one_chunk() {
        let splitter = TextSplitter::new(100, 10);
        assert_eq!(splitter.split("hello world"), vec!["hello world".to_string()]);
    }

    #[test]
    fn chunks_respect_size_and_overlap() {
        let splitter = TextSplitter::new(20, 5);
        let text = "alpha bravo charlie delta echo foxtrot golf hotel india juliet";
        let chunks = splitter.split(text);
        assert!(chunks.len() > 1);
        for c in &chunks {
            assert!(c.chars().count() <= 20, "chunk too long: {c:?}");
        }
        // Neighbouring chunks share at least one word when overlap is allowed.
        let first_words: Vec<&str> = chunks[0].split(' ').collect();
        let last = first_words.last().copied().unwrap_or_default();
        assert!(chunks[1].contains(last) || chunks[1].chars().count() > 15);
    }

    #[test]
    fn paragraphs_are_preferred_split_points() {
        let splitter = TextSplitter::new(30, 0);
        let chunks = splitter.split("first paragraph here\n\nsecond paragraph here");
        assert_eq!(chunks, vec!["first paragraph here".to_string(), "second paragraph here".to_string()]);
    }

    #[test]
    fn create_chunks_ids_and_hashes() {
        let processor = DataProcessor::new(&ChunkingSettings { chunk_size: 30, chunk_overlap: 0 });
        let mut meta = Meta::new();
        meta.insert(FILENAME_KEY.into(), "a.txt".into());
        let chunks = processor.create_chunks("first paragraph here\n\nsecond paragraph here", &meta);
        assert_eq!(chunks[0].id, "a.txt:0");
        assert_eq!(chunks[1].id, "a.txt:1");
        assert_eq!(chunks[0].meta_str(FILENAME_KEY), Some("a.txt"));
        assert_eq!(chunks[0].meta_str(CONTENT_HASH_KEY), Some(content_hash("first paragraph here").as_str()));
    }
}
