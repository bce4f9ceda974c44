//! BFPK pack parsing and range extraction.
//!
//! A pack is one contiguous buffer holding an index followed by (or
//! interleaved with) the content of every contained file.
//!
//! ## Layout
//!
//! All integers are little-endian `u32`:
//!
//! ```text
//! "BFPK" | version (0) | num_files | num_files x record
//! record = name_len | name bytes | size | offset
//! ```
//!
//! `offset` is absolute within the buffer. Names are `/`-separated paths;
//! intermediate components become directories in the tree.
//!
//! ## Components
//!
//! - [`structures`]: header and record decoding
//! - [`parser`]: index validation and tree construction
//! - [`archive`]: the immutable [`Archive`] with tree access and extraction

mod archive;
mod parser;
mod structures;

pub use archive::{Archive, Chunks, Entry, Extracted, FileInfo, ParseOptions, Tree};
pub use parser::PackParser;
pub use structures::*;
