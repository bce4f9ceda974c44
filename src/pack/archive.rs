use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ArchiveError;

use super::parser::{IndexedFile, PackParser};

/// Parser settings.
#[derive(Debug, Clone)]
pub struct ParseOptions {
    /// Upper bound on the record count accepted from a header
    pub max_files: usize,
    /// Lower-case path components while building the tree
    pub case_insensitive: bool,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            max_files: 1 << 20,
            case_insensitive: false,
        }
    }
}

/// One node of the archive tree.
///
/// Labels are display names only; siblings may share a label; files are
/// identified by `file_index`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Entry {
    Directory {
        label: String,
        children: Vec<Entry>,
    },
    File {
        label: String,
        file_index: u32,
        size: u64,
    },
}

impl Entry {
    pub fn label(&self) -> &str {
        match self {
            Entry::Directory { label, .. } | Entry::File { label, .. } => label,
        }
    }

    pub fn is_dir(&self) -> bool {
        matches!(self, Entry::Directory { .. })
    }

    /// Children of a directory; empty for files.
    pub fn children(&self) -> &[Entry] {
        match self {
            Entry::Directory { children, .. } => children,
            Entry::File { .. } => &[],
        }
    }

    pub fn file_index(&self) -> Option<u32> {
        match self {
            Entry::File { file_index, .. } => Some(*file_index),
            Entry::Directory { .. } => None,
        }
    }
}

/// Read-only snapshot of an archive's index, rooted at an unnamed directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Tree(Entry);

impl Tree {
    pub fn root(&self) -> &Entry {
        &self.0
    }

    /// Every file with its full path, in `file_index` order.
    pub fn files(&self) -> Vec<FileInfo> {
        let mut out = Vec::new();
        collect_files(&self.0, "", &mut out);
        out.sort_by_key(|f| f.file_index);
        out
    }

    pub fn find_file(&self, file_index: u32) -> Option<&Entry> {
        fn find(entry: &Entry, file_index: u32) -> Option<&Entry> {
            match entry {
                Entry::File { file_index: i, .. } if *i == file_index => Some(entry),
                Entry::File { .. } => None,
                Entry::Directory { children, .. } => {
                    children.iter().find_map(|child| find(child, file_index))
                }
            }
        }
        find(&self.0, file_index)
    }
}

fn collect_files(entry: &Entry, prefix: &str, out: &mut Vec<FileInfo>) {
    match entry {
        Entry::File {
            label,
            file_index,
            size,
        } => out.push(FileInfo {
            file_index: *file_index,
            path: format!("{prefix}{label}"),
            size: *size,
        }),
        Entry::Directory { label, children } => {
            let prefix = if label.is_empty() {
                prefix.to_owned()
            } else {
                format!("{prefix}{label}/")
            };
            for child in children {
                collect_files(child, &prefix, out);
            }
        }
    }
}

/// Listing row for a single file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileInfo {
    pub file_index: u32,
    pub path: String,
    pub size: u64,
}

/// Bytes pulled from one file, tagged with the file's label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Extracted {
    pub label: String,
    pub bytes: Vec<u8>,
}

/// An immutable, parsed pack backed by a single contiguous buffer.
///
/// The buffer is never mutated after parsing, and all extraction goes
/// through `&self`, so an `Archive` can be shared freely across threads.
#[derive(Debug)]
pub struct Archive {
    buffer: Arc<[u8]>,
    files: Vec<IndexedFile>,
    tree: Arc<Tree>,
    case_insensitive: bool,
}

impl Archive {
    /// Parse a pack with default [`ParseOptions`].
    pub fn parse(bytes: impl Into<Arc<[u8]>>) -> Result<Self, ArchiveError> {
        Self::parse_with(bytes, &ParseOptions::default())
    }

    /// Parse a pack, taking ownership of its buffer.
    ///
    /// Either the whole index is valid and an archive is returned, or the
    /// buffer is rejected with [`ArchiveError::Format`]. There is no partial
    /// result.
    pub fn parse_with(
        bytes: impl Into<Arc<[u8]>>,
        options: &ParseOptions,
    ) -> Result<Self, ArchiveError> {
        let buffer = bytes.into();
        let parser = PackParser::new(&buffer, options);
        let records = parser.read_index()?;
        let (files, root) = parser.build(records)?;

        Ok(Self {
            tree: Arc::new(Tree(root)),
            files,
            buffer,
            case_insensitive: options.case_insensitive,
        })
    }

    /// The tree snapshot. Every call returns the same instance.
    pub fn tree(&self) -> Arc<Tree> {
        Arc::clone(&self.tree)
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    /// Total size of the backing buffer.
    pub fn buffer_len(&self) -> usize {
        self.buffer.len()
    }

    pub fn file(&self, file_index: u32) -> Option<FileInfo> {
        self.files.get(file_index as usize).map(info)
    }

    /// All files in `file_index` order.
    pub fn files(&self) -> impl Iterator<Item = FileInfo> + '_ {
        self.files.iter().map(info)
    }

    /// Resolve a `/`-separated path against the tree.
    ///
    /// Empty components are skipped, so `"/a//b"` is the same as `"a/b"`.
    /// With duplicate labels the first sibling wins.
    pub fn lookup(&self, path: &str) -> Option<&Entry> {
        let mut node = self.tree.root();
        for part in path.split('/').filter(|p| !p.is_empty()) {
            let part = if self.case_insensitive {
                part.to_lowercase()
            } else {
                part.to_owned()
            };
            node = node.children().iter().find(|child| child.label() == part)?;
        }
        Some(node)
    }

    /// Copy `size` bytes starting `offset` bytes into the file's content.
    ///
    /// # Errors
    ///
    /// - [`ArchiveError::UnknownIndex`] if no file has `file_index`
    /// - [`ArchiveError::OutOfRange`] if `offset + size` exceeds the file
    ///   length; no truncated data is ever returned
    pub fn extract(&self, file_index: u32, offset: u64, size: u64) -> Result<Extracted, ArchiveError> {
        let file = self
            .files
            .get(file_index as usize)
            .ok_or(ArchiveError::UnknownIndex { file_index })?;

        let in_bounds = offset
            .checked_add(size)
            .is_some_and(|end| end <= file.size);
        if !in_bounds {
            return Err(ArchiveError::OutOfRange {
                file_index,
                offset,
                size,
                length: file.size,
            });
        }

        // Extents were validated against the buffer during parsing.
        let start = (file.start + offset) as usize;
        let end = start + size as usize;
        debug!(file_index, offset, size, "extracting range");

        Ok(Extracted {
            label: file.label.clone(),
            bytes: self.buffer[start..end].to_vec(),
        })
    }

    /// Iterate over a whole file in pieces of at most `chunk_size` bytes.
    pub fn chunks(&self, file_index: u32, chunk_size: u64) -> Result<Chunks<'_>, ArchiveError> {
        let file = self
            .files
            .get(file_index as usize)
            .ok_or(ArchiveError::UnknownIndex { file_index })?;

        Ok(Chunks {
            archive: self,
            file_index,
            next: 0,
            length: file.size,
            chunk_size: chunk_size.max(1),
        })
    }
}

fn info(file: &IndexedFile) -> FileInfo {
    FileInfo {
        file_index: file.file_index,
        path: file.path.clone(),
        size: file.size,
    }
}

/// Iterator returned by [`Archive::chunks`].
pub struct Chunks<'a> {
    archive: &'a Archive,
    file_index: u32,
    next: u64,
    length: u64,
    chunk_size: u64,
}

impl Iterator for Chunks<'_> {
    type Item = Result<Extracted, ArchiveError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.length {
            return None;
        }
        let size = self.chunk_size.min(self.length - self.next);
        match self.archive.extract(self.file_index, self.next, size) {
            Ok(chunk) => {
                self.next += size;
                Some(Ok(chunk))
            }
            Err(e) => {
                // Stop after reporting the failure.
                self.next = self.length;
                Some(Err(e))
            }
        }
    }
}
