use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll};
use std::thread;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::error::ErrorPayload;
use crate::pack::{Extracted, Tree};

use super::executor::WorkerHandle;
use super::protocol::{DownloadRequest, Envelope, RequestId, Response};

/// Failures seen by the driving side.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The worker processed the request and reported an error.
    #[error("Worker rejected request: {0}")]
    Worker(#[from] ErrorPayload),

    /// The worker thread is gone; the request will never be answered.
    #[error("Worker disconnected")]
    Disconnected,

    /// A reply arrived for this id but for a different operation.
    #[error("Mismatched reply for request {0}")]
    Mismatch(RequestId),
}

type PendingMap = Arc<Mutex<HashMap<RequestId, oneshot::Sender<Response>>>>;

/// Driver-side handle that turns worker messages into per-request futures.
///
/// Each request gets a fresh [`RequestId`] and a oneshot slot. A router task
/// reads worker responses and completes the slot with the matching id, so
/// replies may arrive in any order.
///
/// Must be created inside a tokio runtime.
pub struct PackClient {
    requests: mpsc::Sender<Envelope>,
    pending: PendingMap,
    next_id: AtomicU64,
    router: JoinHandle<()>,
    worker: thread::JoinHandle<()>,
}

impl PackClient {
    pub fn new(handle: WorkerHandle) -> Self {
        let (requests, responses, worker) = handle.into_parts();
        Self::from_parts(requests, responses, worker)
    }

    fn from_parts(
        requests: mpsc::Sender<Envelope>,
        responses: mpsc::Receiver<Response>,
        worker: thread::JoinHandle<()>,
    ) -> Self {
        let pending = PendingMap::default();
        let router = tokio::spawn(route(responses, Arc::clone(&pending)));

        Self {
            requests,
            pending,
            next_id: AtomicU64::new(1),
            router,
            worker,
        }
    }

    /// Send a pack to the worker and wait for its tree.
    pub async fn parse(&self, bytes: Vec<u8>) -> Result<Arc<Tree>, ClientError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let reply = self.submit(id, Envelope::parse(id, bytes)).await?;

        match reply.await.map_err(|_| ClientError::Disconnected)? {
            Response::Parse(reply) => Ok(reply.result?),
            Response::Download(_) => Err(ClientError::Mismatch(id)),
        }
    }

    /// Enqueue a range request and return a future for its reply.
    ///
    /// If no pack has been parsed yet the worker never answers, so the
    /// returned future stays pending; wrap it in `tokio::time::timeout`
    /// when that matters.
    pub async fn request_download(
        &self,
        file_index: u32,
        offset: u64,
        size: u64,
    ) -> Result<PendingDownload, ClientError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = DownloadRequest {
            id,
            file_index,
            offset,
            size,
        };
        let reply = self.submit(id, Envelope::download(request)).await?;

        Ok(PendingDownload {
            id,
            file_index,
            reply,
            pending: Arc::clone(&self.pending),
        })
    }

    /// Enqueue a range request and wait for its bytes.
    pub async fn download(
        &self,
        file_index: u32,
        offset: u64,
        size: u64,
    ) -> Result<Extracted, ClientError> {
        self.request_download(file_index, offset, size).await?.await
    }

    /// Close the request channel and wait for the worker to exit.
    pub async fn shutdown(self) {
        drop(self.requests);
        let worker = self.worker;
        if tokio::task::spawn_blocking(move || worker.join()).await.is_err() {
            debug!("worker thread join failed");
        }
        let _ = self.router.await;
    }

    async fn submit(
        &self,
        id: RequestId,
        envelope: Envelope,
    ) -> Result<oneshot::Receiver<Response>, ClientError> {
        let (tx, rx) = oneshot::channel();
        // The slot must exist before the worker can possibly reply.
        self.pending.lock().insert(id, tx);
        let mut slot = SlotGuard {
            pending: &self.pending,
            id,
            sent: false,
        };

        self.requests
            .send(envelope)
            .await
            .map_err(|_| ClientError::Disconnected)?;
        slot.sent = true;
        Ok(rx)
    }
}

/// Removes a slot whose request never reached the worker, including when the
/// submitting future is dropped while waiting on a full queue.
struct SlotGuard<'a> {
    pending: &'a PendingMap,
    id: RequestId,
    sent: bool,
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        if !self.sent {
            self.pending.lock().remove(&self.id);
        }
    }
}

async fn route(mut responses: mpsc::Receiver<Response>, pending: PendingMap) {
    while let Some(response) = responses.recv().await {
        let id = response.id();
        let slot = pending.lock().remove(&id);
        match slot {
            Some(tx) => {
                // The waiter may have been dropped; the reply is discarded.
                let _ = tx.send(response);
            }
            None => debug!(id, "reply without a waiting request"),
        }
    }

    // Dropping the senders resolves every waiter with Disconnected.
    pending.lock().clear();
}

/// An outstanding download; resolves to the extracted bytes.
///
/// Dropping it before completion forgets the request on the driver side.
pub struct PendingDownload {
    id: RequestId,
    file_index: u32,
    reply: oneshot::Receiver<Response>,
    pending: PendingMap,
}

impl PendingDownload {
    pub fn id(&self) -> RequestId {
        self.id
    }

    pub fn file_index(&self) -> u32 {
        self.file_index
    }
}

impl Future for PendingDownload {
    type Output = Result<Extracted, ClientError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let id = self.id;
        Pin::new(&mut self.reply).poll(cx).map(|reply| match reply {
            Ok(Response::Download(reply)) => Ok(reply.result?),
            Ok(Response::Parse(_)) => Err(ClientError::Mismatch(id)),
            Err(_) => Err(ClientError::Disconnected),
        })
    }
}

impl Drop for PendingDownload {
    fn drop(&mut self) {
        self.pending.lock().remove(&self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::worker::{WorkerConfig, spawn_worker};
    use std::time::Duration;

    #[tokio::test]
    async fn dropping_pending_download_frees_slot() {
        let client = PackClient::new(spawn_worker(WorkerConfig::default()).unwrap());

        // No pack yet, so neither request is ever answered.
        let dropped = client.request_download(0, 0, 1).await.unwrap();
        let kept = client.request_download(0, 1, 1).await.unwrap();
        assert_eq!(client.pending.lock().len(), 2);

        drop(dropped);
        assert_eq!(client.pending.lock().len(), 1);
        assert!(client.pending.lock().contains_key(&kept.id()));

        client.shutdown().await;
        assert!(matches!(kept.await, Err(ClientError::Disconnected)));
    }

    #[tokio::test]
    async fn abandoned_submit_frees_slot() {
        // A queue of one that nobody drains.
        let (requests, _inbox) = mpsc::channel(1);
        let (_outbox, responses) = mpsc::channel(1);
        let client = PackClient::from_parts(requests, responses, thread::spawn(|| {}));

        let queued = client.request_download(0, 0, 1).await.unwrap();
        let blocked =
            tokio::time::timeout(Duration::from_millis(50), client.request_download(0, 1, 1)).await;
        assert!(blocked.is_err(), "send should wait on the full queue");

        let pending = client.pending.lock();
        assert_eq!(pending.len(), 1);
        assert!(pending.contains_key(&queued.id()));
    }

    #[tokio::test]
    async fn submit_to_stopped_worker_is_disconnected() {
        let (requests, inbox) = mpsc::channel(1);
        let (_outbox, responses) = mpsc::channel(1);
        drop(inbox);
        let client = PackClient::from_parts(requests, responses, thread::spawn(|| {}));

        assert!(matches!(
            client.download(0, 0, 1).await,
            Err(ClientError::Disconnected)
        ));
        assert!(client.pending.lock().is_empty());
    }
}
