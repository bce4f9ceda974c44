//! Main entry point for the multipack CLI application.
//!
//! Loads a pack from a local path or HTTP URL, hands it to a worker thread,
//! and drives every command through the worker protocol.

use anyhow::{Result, anyhow, bail};
use clap::Parser;
use std::collections::VecDeque;
use std::path::Path;
use tokio::io::AsyncWriteExt;
use tracing::info;
use tracing_subscriber::EnvFilter;

use multipack::{
    Cli, Command, Entry, HttpRangeReader, LocalFileReader, PackClient, ReadAt, Tree, spawn_worker,
};

/// Downloads kept in flight while streaming a file.
const PIPELINE_DEPTH: usize = 4;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so `cat` output stays clean.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cli.log_filter())),
        )
        .with_writer(std::io::stderr)
        .init();

    let bytes = load_source(&cli).await?;

    let client = PackClient::new(spawn_worker(cli.worker_config())?);
    let result = match client.parse(bytes).await {
        Ok(tree) => run(&client, &tree, &cli.command).await,
        Err(e) => Err(anyhow!("Failed to parse {}: {}", cli.source, e)),
    };
    client.shutdown().await;

    result
}

/// Read the whole pack from a local file or an HTTP URL.
async fn load_source(cli: &Cli) -> Result<Vec<u8>> {
    if cli.is_http_url() {
        let reader = HttpRangeReader::new(cli.source.clone()).await?;
        let bytes = reader.read_all().await?;
        info!(transferred = reader.transferred_bytes(), "downloaded pack");
        Ok(bytes)
    } else {
        LocalFileReader::new(Path::new(&cli.source))?.read_all().await
    }
}

async fn run(client: &PackClient, tree: &Tree, command: &Command) -> Result<()> {
    match command {
        Command::Tree { json: true } => {
            println!("{}", serde_json::to_string_pretty(tree)?);
        }
        Command::Tree { json: false } => print_entry(tree.root(), 0),
        Command::List => {
            for file in tree.files() {
                println!("{:>6}  {:>10}  {}", file.file_index, file.size, file.path);
            }
        }
        Command::Cat {
            file_index,
            offset,
            size,
            chunk,
        } => {
            let size = cat_range(tree, *file_index, *offset, *size)?;
            cat(client, *file_index, *offset, size, *chunk).await?;
        }
    }
    Ok(())
}

fn print_entry(entry: &Entry, depth: usize) {
    let indent = "  ".repeat(depth);
    match entry {
        Entry::Directory { label, children } => {
            // The root is unnamed; print its children at depth 0.
            let child_depth = if label.is_empty() {
                depth
            } else {
                println!("{indent}{label}/");
                depth + 1
            };
            for child in children {
                print_entry(child, child_depth);
            }
        }
        Entry::File {
            label,
            file_index,
            size,
        } => println!("{indent}{label}  [#{file_index}, {size} bytes]"),
    }
}

fn file_size(tree: &Tree, file_index: u32) -> Result<u64> {
    match tree.find_file(file_index) {
        Some(Entry::File { size, .. }) => Ok(*size),
        _ => Err(anyhow!("No file with index {}", file_index)),
    }
}

/// Resolve the byte count for `cat`, rejecting ranges past the end of the file.
///
/// Checked up front so a bad range writes nothing instead of a partial prefix.
fn cat_range(tree: &Tree, file_index: u32, offset: u64, size: Option<u64>) -> Result<u64> {
    let length = file_size(tree, file_index)?;
    if offset > length {
        bail!("Offset {} is past the end of file {} ({} bytes)", offset, file_index, length);
    }
    let size = size.unwrap_or(length - offset);
    match offset.checked_add(size) {
        Some(end) if end <= length => Ok(size),
        _ => bail!(
            "Range {}+{} is out of bounds for file {} ({} bytes)",
            offset,
            size,
            file_index,
            length
        ),
    }
}

/// Stream `size` bytes of a file to stdout, keeping a few requests in flight.
///
/// Replies are awaited in request order, so output order is preserved even
/// though the worker may answer out of order.
async fn cat(client: &PackClient, file_index: u32, offset: u64, size: u64, chunk: u64) -> Result<()> {
    let chunk = chunk.max(1);
    let end = offset.saturating_add(size);
    let mut next = offset;
    let mut in_flight = VecDeque::with_capacity(PIPELINE_DEPTH);
    let mut stdout = tokio::io::stdout();

    loop {
        while next < end && in_flight.len() < PIPELINE_DEPTH {
            let len = chunk.min(end - next);
            in_flight.push_back(client.request_download(file_index, next, len).await?);
            next += len;
        }

        let Some(pending) = in_flight.pop_front() else {
            break;
        };
        let extracted = pending.await?;
        stdout.write_all(&extracted.bytes).await?;
    }

    stdout.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use multipack::Archive;

    fn hello_tree() -> std::sync::Arc<Tree> {
        let path = b"root/a.txt";
        let content = b"hello world";
        let mut buf = b"BFPK".to_vec();
        buf.extend_from_slice(&0u32.to_le_bytes());
        buf.extend_from_slice(&1u32.to_le_bytes());
        buf.extend_from_slice(&(path.len() as u32).to_le_bytes());
        buf.extend_from_slice(path);
        buf.extend_from_slice(&(content.len() as u32).to_le_bytes());
        buf.extend_from_slice(&((24 + path.len()) as u32).to_le_bytes());
        buf.extend_from_slice(content);
        Archive::parse(buf).unwrap().tree()
    }

    #[test]
    fn cat_range_defaults_to_rest_of_file() {
        let tree = hello_tree();
        assert_eq!(cat_range(&tree, 0, 0, None).unwrap(), 11);
        assert_eq!(cat_range(&tree, 0, 6, None).unwrap(), 5);
        assert_eq!(cat_range(&tree, 0, 11, None).unwrap(), 0);
        assert_eq!(cat_range(&tree, 0, 6, Some(5)).unwrap(), 5);
    }

    #[test]
    fn cat_range_rejects_out_of_bounds_before_streaming() {
        let tree = hello_tree();
        let err = cat_range(&tree, 0, 0, Some(20)).unwrap_err();
        assert!(err.to_string().contains("11 bytes"), "{err}");
        assert!(cat_range(&tree, 0, 12, None).is_err());
        assert!(cat_range(&tree, 0, 1, Some(u64::MAX)).is_err());
        assert!(cat_range(&tree, 3, 0, None).is_err());
    }
}
