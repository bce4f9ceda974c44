use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{info, warn};

use super::{ReadAt, read_chunked};
use anyhow::{Result, anyhow, bail};

/// Transport settings for [`HttpRangeReader`].
#[derive(Debug, Clone)]
pub struct HttpOptions {
    pub timeout: Duration,
    /// Attempts per range before giving up on connection errors
    pub max_retry: u32,
}

impl Default for HttpOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_retry: 10,
        }
    }
}

/// Remote pack served over HTTP(S).
///
/// Ranges are fetched with `Range` requests. Servers that do not advertise
/// byte ranges can still be loaded whole through [`ReadAt::read_all`], which
/// falls back to a single plain `GET`.
pub struct HttpRangeReader {
    client: Client,
    url: String,
    size: u64,
    ranges: bool,
    options: HttpOptions,
    transferred_bytes: AtomicU64,
}

impl HttpRangeReader {
    pub async fn new(url: String) -> Result<Self> {
        Self::with_options(url, HttpOptions::default()).await
    }

    /// Probe the URL with a HEAD request for its length and range support.
    pub async fn with_options(url: String, options: HttpOptions) -> Result<Self> {
        let client = Client::builder().timeout(options.timeout).build()?;

        let resp = client.head(&url).send().await?;
        if !resp.status().is_success() {
            bail!("HTTP request failed with status: {}", resp.status());
        }

        let ranges = resp
            .headers()
            .get("accept-ranges")
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.contains("bytes"));

        let size = resp
            .headers()
            .get("content-length")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| anyhow!("Remote server did not return Content-Length"))?;

        info!(%url, size, ranges, "opened remote pack");
        Ok(Self {
            client,
            url,
            size,
            ranges,
            options,
            transferred_bytes: AtomicU64::new(0),
        })
    }

    /// Get total bytes transferred from network
    pub fn transferred_bytes(&self) -> u64 {
        self.transferred_bytes.load(Ordering::Relaxed)
    }

    /// Issue one request, retrying only connection-level failures.
    async fn send_with_retry(&self, range: Option<&str>) -> Result<reqwest::Response> {
        let mut attempt = 0;
        loop {
            let mut request = self.client.get(&self.url);
            if let Some(range) = range {
                request = request.header("Range", range);
            }

            match request.send().await {
                Ok(resp) => return Ok(resp),
                Err(e) if e.is_timeout() || e.is_connect() => {
                    attempt += 1;
                    if attempt >= self.options.max_retry {
                        bail!("Max retries exceeded for {}", self.url);
                    }
                    warn!(attempt, max = self.options.max_retry, error = %e, "connection error, retrying");
                    tokio::time::sleep(Duration::from_millis(500 * attempt as u64)).await;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

#[async_trait]
impl ReadAt for HttpRangeReader {
    async fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() || offset >= self.size {
            return Ok(0);
        }
        if !self.ranges {
            bail!("Remote server does not support Range requests");
        }

        let end = (offset + buf.len() as u64).min(self.size) - 1;
        let expected = (end - offset + 1) as usize;
        let mut received = 0;

        // Servers may answer a range with fewer bytes than asked; keep asking
        // for the remainder.
        while received < expected {
            let range = format!("bytes={}-{}", offset + received as u64, end);
            let resp = self.send_with_retry(Some(&range)).await?;
            if resp.status() != StatusCode::PARTIAL_CONTENT {
                bail!("HTTP request failed with status: {}", resp.status());
            }

            let bytes = resp.bytes().await?;
            if bytes.is_empty() {
                bail!("Empty range response at offset {}", offset + received as u64);
            }
            let n = bytes.len().min(expected - received);
            buf[received..received + n].copy_from_slice(&bytes[..n]);
            received += n;
            self.transferred_bytes.fetch_add(n as u64, Ordering::Relaxed);
        }

        Ok(received)
    }

    fn size(&self) -> u64 {
        self.size
    }

    async fn read_all(&self) -> Result<Vec<u8>> {
        if self.ranges {
            return read_chunked(self).await;
        }

        let resp = self.send_with_retry(None).await?;
        if !resp.status().is_success() {
            bail!("HTTP request failed with status: {}", resp.status());
        }

        let bytes = resp.bytes().await?;
        self.transferred_bytes
            .fetch_add(bytes.len() as u64, Ordering::Relaxed);
        if bytes.len() as u64 != self.size {
            bail!(
                "Remote pack changed size: expected {} bytes, got {}",
                self.size,
                bytes.len()
            );
        }
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    /// Minimal HTTP/1.1 server over loopback. Every connection carries one
    /// request and is then closed.
    struct MockServer {
        url: String,
        requests: Arc<Mutex<Vec<String>>>,
    }

    impl MockServer {
        /// `max_range` caps the bytes sent per 206 reply, forcing short reads.
        async fn start(data: Vec<u8>, ranges: bool, max_range: usize) -> Self {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let url = format!("http://{}/test.packed", listener.local_addr().unwrap());
            let requests = Arc::new(Mutex::new(Vec::new()));
            let data = Arc::new(data);

            let log = Arc::clone(&requests);
            tokio::spawn(async move {
                loop {
                    let Ok((stream, _)) = listener.accept().await else {
                        return;
                    };
                    let (data, log) = (Arc::clone(&data), Arc::clone(&log));
                    tokio::spawn(serve(stream, data, log, ranges, max_range));
                }
            });

            Self { url, requests }
        }

        fn requests(&self) -> Vec<String> {
            self.requests.lock().clone()
        }
    }

    async fn serve(
        mut stream: TcpStream,
        data: Arc<Vec<u8>>,
        log: Arc<Mutex<Vec<String>>>,
        ranges: bool,
        max_range: usize,
    ) {
        let mut head = Vec::new();
        let mut byte = [0u8; 1];
        while !head.ends_with(b"\r\n\r\n") {
            if stream.read(&mut byte).await.unwrap_or(0) == 0 {
                return;
            }
            head.push(byte[0]);
        }
        let head = String::from_utf8_lossy(&head).to_lowercase();
        let method = head.split(' ').next().unwrap_or_default().to_uppercase();
        let range = head
            .lines()
            .find_map(|line| line.strip_prefix("range: bytes="))
            .map(str::to_owned);

        let accept = if ranges { "Accept-Ranges: bytes\r\n" } else { "" };
        let (status, headers, body): (&str, String, &[u8]) = match (method.as_str(), range) {
            ("HEAD", _) => {
                log.lock().push("HEAD".into());
                ("200 OK", format!("{accept}Content-Length: {}\r\n", data.len()), &data[..0])
            }
            ("GET", Some(range)) if ranges => {
                log.lock().push(format!("GET {range}"));
                let (start, end) = range.trim().split_once('-').unwrap();
                let start: usize = start.parse().unwrap();
                let end: usize = end.parse().unwrap();
                let end = end.min(start.saturating_add(max_range - 1));
                let body = &data[start..=end];
                let headers = format!(
                    "Content-Range: bytes {start}-{end}/{}\r\nContent-Length: {}\r\n",
                    data.len(),
                    body.len()
                );
                ("206 Partial Content", headers, body)
            }
            _ => {
                log.lock().push("GET".into());
                ("200 OK", format!("Content-Length: {}\r\n", data.len()), &data[..])
            }
        };

        let reply = format!("HTTP/1.1 {status}\r\n{headers}Connection: close\r\n\r\n");
        let _ = stream.write_all(reply.as_bytes()).await;
        let _ = stream.write_all(body).await;
        let _ = stream.shutdown().await;
    }

    fn sample(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 7 % 251) as u8).collect()
    }

    #[tokio::test]
    async fn read_all_uses_ranges_when_advertised() {
        let data = sample(1000);
        let server = MockServer::start(data.clone(), true, 300).await;

        let reader = HttpRangeReader::new(server.url.clone()).await.unwrap();
        assert_eq!(reader.size(), 1000);
        assert_eq!(reader.read_all().await.unwrap(), data);
        assert_eq!(reader.transferred_bytes(), 1000);

        // One HEAD probe, then ranged GETs resuming after each short reply.
        let requests = server.requests();
        assert_eq!(requests[0], "HEAD");
        assert_eq!(
            &requests[1..],
            ["GET 0-999", "GET 300-999", "GET 600-999", "GET 900-999"]
        );
    }

    #[tokio::test]
    async fn read_at_fetches_requested_slice() {
        let data = sample(500);
        let server = MockServer::start(data.clone(), true, usize::MAX).await;
        let reader = HttpRangeReader::new(server.url.clone()).await.unwrap();

        let mut buf = [0u8; 40];
        assert_eq!(reader.read_at(100, &mut buf).await.unwrap(), 40);
        assert_eq!(&buf[..], &data[100..140]);

        // Reads past the end are clamped to the remote size.
        assert_eq!(reader.read_at(480, &mut buf).await.unwrap(), 20);
        assert_eq!(&buf[..20], &data[480..]);
        assert_eq!(reader.read_at(500, &mut buf).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn read_all_falls_back_to_plain_get() {
        let data = sample(256);
        let server = MockServer::start(data.clone(), false, usize::MAX).await;
        let reader = HttpRangeReader::new(server.url.clone()).await.unwrap();

        assert_eq!(reader.read_all().await.unwrap(), data);
        assert_eq!(server.requests(), ["HEAD", "GET"]);

        let mut buf = [0u8; 8];
        let err = reader.read_at(0, &mut buf).await.unwrap_err();
        assert!(err.to_string().contains("Range"), "{err}");
    }
}
