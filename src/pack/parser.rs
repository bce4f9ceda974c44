//! Low-level pack parser.
//!
//! This module handles the binary parsing of the pack index and the
//! construction of the directory tree from the flat list of records.
//!
//! ## Parsing Strategy
//!
//! The index sits at the front of the buffer:
//! 1. Read and validate the fixed 12-byte header (magic, version, count)
//! 2. Reject counts that could not possibly fit in the remaining bytes
//! 3. Read every file record in one pass, validating each content extent
//! 4. Fold the record paths into a tree, numbering files in record order
//!
//! Content regions are not read here. They are only checked against the
//! buffer length, so parsing cost depends on the index size alone.

use std::collections::{HashMap, HashSet};
use std::io::Cursor;

use tracing::debug;

use crate::error::ArchiveError;

use super::archive::{Entry, ParseOptions};
use super::structures::{FileRecord, PackHeader};

/// A validated record with its assigned index and normalized path.
#[derive(Debug, Clone)]
pub(crate) struct IndexedFile {
    pub file_index: u32,
    pub path: String,
    pub label: String,
    pub start: u64,
    pub size: u64,
}

/// Reads and validates the index of a pack buffer.
///
/// Typically used through [`Archive::parse`](super::Archive::parse)
/// rather than directly.
pub struct PackParser<'a> {
    data: &'a [u8],
    options: &'a ParseOptions,
}

impl<'a> PackParser<'a> {
    pub fn new(data: &'a [u8], options: &'a ParseOptions) -> Self {
        Self { data, options }
    }

    /// Read the header and all file records.
    ///
    /// # Errors
    ///
    /// Returns [`ArchiveError::Format`] if the header is invalid, a record is
    /// truncated, or any content extent points outside the buffer.
    pub fn read_index(&self) -> Result<Vec<FileRecord>, ArchiveError> {
        let header = PackHeader::from_bytes(self.data)?;
        let num_files = header.num_files as usize;

        if num_files > self.options.max_files {
            return Err(ArchiveError::format(format!(
                "file count {num_files} exceeds limit of {}",
                self.options.max_files
            )));
        }

        // Each record needs at least MIN_SIZE bytes, so a count that cannot
        // fit is rejected before allocating for it.
        let available = self.data.len() - PackHeader::SIZE;
        if num_files.saturating_mul(FileRecord::MIN_SIZE) > available {
            return Err(ArchiveError::format(format!(
                "file count {num_files} does not fit in {available} index bytes"
            )));
        }

        let mut cursor = Cursor::new(self.data);
        cursor.set_position(PackHeader::SIZE as u64);

        let mut records = Vec::with_capacity(num_files);
        for _ in 0..num_files {
            let record = FileRecord::read(&mut cursor)?;
            self.check_extent(&record)?;
            records.push(record);
        }

        debug!(files = records.len(), bytes = self.data.len(), "read pack index");
        Ok(records)
    }

    fn check_extent(&self, record: &FileRecord) -> Result<(), ArchiveError> {
        let (start, size) = record.extent();
        let end = start + size;
        if end > self.data.len() as u64 {
            return Err(ArchiveError::format(format!(
                "extent {start}..{end} of {:?} lies outside the {}-byte buffer",
                record.path,
                self.data.len()
            )));
        }
        Ok(())
    }

    /// Assign file indices in record order and build the directory tree.
    pub(crate) fn build(
        &self,
        records: Vec<FileRecord>,
    ) -> Result<(Vec<IndexedFile>, Entry), ArchiveError> {
        let mut root = DirBuilder::new(String::new());
        let mut files = Vec::with_capacity(records.len());

        for (file_index, record) in records.into_iter().enumerate() {
            let file_index = file_index as u32;
            let (start, size) = record.extent();
            let mut components = split_path(&record.path, self.options.case_insensitive)?;
            // split_path never returns an empty list
            let label = components.pop().unwrap_or_default();

            root.insert(
                &components,
                Entry::File {
                    label: label.clone(),
                    file_index,
                    size,
                },
            )
            .map_err(|conflict| {
                ArchiveError::format(format!("{:?}: {conflict}", record.path))
            })?;

            components.push(label.clone());
            files.push(IndexedFile {
                file_index,
                path: components.join("/"),
                label,
                start,
                size,
            });
        }

        debug!(files = files.len(), "built pack tree");
        Ok((files, root.finish()))
    }
}

/// Split a record path into components, rejecting empty segments.
fn split_path(path: &str, case_insensitive: bool) -> Result<Vec<String>, ArchiveError> {
    if path.is_empty() {
        return Err(ArchiveError::format("empty file name"));
    }

    path.split('/')
        .map(|part| {
            if part.is_empty() {
                Err(ArchiveError::format(format!("empty path component in {path:?}")))
            } else if case_insensitive {
                Ok(part.to_lowercase())
            } else {
                Ok(part.to_owned())
            }
        })
        .collect()
}

enum Node {
    Dir(DirBuilder),
    File(Entry),
}

/// Mutable directory used while folding records into the tree.
///
/// Children keep first-appearance order; the side tables only speed up
/// lookups and conflict checks.
struct DirBuilder {
    label: String,
    children: Vec<Node>,
    dirs: HashMap<String, usize>,
    file_names: HashSet<String>,
}

impl DirBuilder {
    fn new(label: String) -> Self {
        Self {
            label,
            children: Vec::new(),
            dirs: HashMap::new(),
            file_names: HashSet::new(),
        }
    }

    fn insert(&mut self, parents: &[String], file: Entry) -> Result<(), String> {
        let Some((head, rest)) = parents.split_first() else {
            let label = file.label();
            if self.dirs.contains_key(label) {
                return Err(format!("file {label:?} collides with a directory"));
            }
            self.file_names.insert(label.to_owned());
            self.children.push(Node::File(file));
            return Ok(());
        };

        if self.file_names.contains(head) {
            return Err(format!("{head:?} is a file, not a directory"));
        }

        let pos = match self.dirs.get(head) {
            Some(&pos) => pos,
            None => {
                self.children.push(Node::Dir(DirBuilder::new(head.clone())));
                let pos = self.children.len() - 1;
                self.dirs.insert(head.clone(), pos);
                pos
            }
        };

        match &mut self.children[pos] {
            Node::Dir(dir) => dir.insert(rest, file),
            Node::File(_) => Err(format!("{head:?} is a file, not a directory")),
        }
    }

    fn finish(self) -> Entry {
        Entry::Directory {
            label: self.label,
            children: self
                .children
                .into_iter()
                .map(|node| match node {
                    Node::Dir(dir) => dir.finish(),
                    Node::File(file) => file,
                })
                .collect(),
        }
    }
}
