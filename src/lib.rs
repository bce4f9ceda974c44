//! # multipack
//!
//! Reader for BFPK packs: single binary blobs holding many files behind a
//! path index.
//!
//! A pack is parsed once into an immutable [`Archive`], which exposes the
//! file tree and copies arbitrary byte ranges of any contained file. The
//! [`worker`] module runs an archive on its own thread behind a strict
//! request/response protocol, so a driving task never touches the buffer.
//!
//! ## Features
//!
//! - Validating single-pass index parser, no partial results
//! - Stable `file_index` identity for every file, in index order
//! - Bounds-checked range extraction, safe to call concurrently
//! - Worker protocol with per-request correlation ids
//! - Local and HTTP byte sources for loading packs
//!
//! ## Example
//!
//! ```no_run
//! use multipack::{PackClient, WorkerConfig, spawn_worker};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let bytes = std::fs::read("data.packed")?;
//!
//!     let client = PackClient::new(spawn_worker(WorkerConfig::default())?);
//!     let tree = client.parse(bytes).await?;
//!     for file in tree.files() {
//!         println!("{} {}", file.file_index, file.path);
//!     }
//!
//!     let head = client.download(0, 0, 16).await?;
//!     println!("{}: {:?}", head.label, head.bytes);
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod error;
pub mod io;
pub mod pack;
pub mod worker;

pub use cli::{Cli, Command};
pub use error::{ArchiveError, ErrorKind, ErrorPayload};
pub use io::{HttpOptions, HttpRangeReader, LocalFileReader, ReadAt};
pub use pack::{Archive, Entry, Extracted, FileInfo, ParseOptions, Tree};
pub use worker::{
    ClientError, Envelope, PackClient, Response, Worker, WorkerConfig, spawn_worker,
};
