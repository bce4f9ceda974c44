use std::thread;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::ErrorPayload;
use crate::pack::{Archive, ParseOptions};

use super::protocol::{
    DownloadReply, DownloadRequest, Envelope, ParseReply, ParseRequest, Request, Response,
};

/// Settings for a spawned worker.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Capacity of both the request and the response channel
    pub queue_depth: usize,
    pub parse_options: ParseOptions,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            queue_depth: 64,
            parse_options: ParseOptions::default(),
        }
    }
}

/// State owned by the executing context.
///
/// Holds at most one archive, created by the first successful parse. The
/// archive and its buffer never leave the worker; only trees and copied
/// byte ranges are sent back.
#[derive(Debug, Default)]
pub struct Worker {
    options: ParseOptions,
    archive: Option<Archive>,
}

impl Worker {
    pub fn new(options: ParseOptions) -> Self {
        Self {
            options,
            archive: None,
        }
    }

    pub fn archive(&self) -> Option<&Archive> {
        self.archive.as_ref()
    }

    /// Process every operation in the envelope, in order.
    ///
    /// Returns one response per operation that produced a reply. A download
    /// before any successful parse produces none.
    pub fn handle(&mut self, envelope: Envelope) -> Vec<Response> {
        envelope
            .into_requests()
            .into_iter()
            .filter_map(|request| self.dispatch(request))
            .collect()
    }

    pub fn dispatch(&mut self, request: Request) -> Option<Response> {
        match request {
            Request::Parse(request) => Some(Response::Parse(self.parse(request))),
            Request::Download(request) => self.download(request).map(Response::Download),
        }
    }

    fn parse(&mut self, request: ParseRequest) -> ParseReply {
        let size = request.bytes.len();
        let result = match Archive::parse_with(request.bytes, &self.options) {
            Ok(archive) => {
                info!(
                    id = request.id,
                    bytes = size,
                    files = archive.file_count(),
                    "parsed pack"
                );
                let tree = archive.tree();
                self.archive = Some(archive);
                Ok(tree)
            }
            Err(err) => {
                // A previously parsed archive, if any, stays in place.
                warn!(id = request.id, bytes = size, error = %err, "rejected pack");
                Err(ErrorPayload::from(err))
            }
        };

        ParseReply {
            id: request.id,
            result,
        }
    }

    fn download(&self, request: DownloadRequest) -> Option<DownloadReply> {
        let Some(archive) = &self.archive else {
            warn!(
                id = request.id,
                file_index = request.file_index,
                "download before parse, ignoring"
            );
            return None;
        };

        let result = archive
            .extract(request.file_index, request.offset, request.size)
            .map_err(ErrorPayload::from);

        Some(DownloadReply {
            id: request.id,
            file_index: request.file_index,
            result,
        })
    }
}

/// Channels connected to a running worker thread.
pub struct WorkerHandle {
    requests: mpsc::Sender<Envelope>,
    responses: mpsc::Receiver<Response>,
    thread: thread::JoinHandle<()>,
}

impl WorkerHandle {
    pub fn into_parts(
        self,
    ) -> (
        mpsc::Sender<Envelope>,
        mpsc::Receiver<Response>,
        thread::JoinHandle<()>,
    ) {
        (self.requests, self.responses, self.thread)
    }
}

/// Start a worker on a dedicated thread.
///
/// The thread exits once every request sender is dropped, or once the
/// response receiver goes away.
pub fn spawn_worker(config: WorkerConfig) -> std::io::Result<WorkerHandle> {
    let depth = config.queue_depth.max(1);
    let (request_tx, mut request_rx) = mpsc::channel::<Envelope>(depth);
    let (response_tx, response_rx) = mpsc::channel::<Response>(depth);

    let thread = thread::Builder::new()
        .name("multipack-worker".into())
        .spawn(move || {
            let mut worker = Worker::new(config.parse_options);
            while let Some(envelope) = request_rx.blocking_recv() {
                for response in worker.handle(envelope) {
                    if response_tx.blocking_send(response).is_err() {
                        debug!("response receiver dropped, stopping worker");
                        return;
                    }
                }
            }
            debug!("request channel closed, stopping worker");
        })?;

    Ok(WorkerHandle {
        requests: request_tx,
        responses: response_rx,
        thread,
    })
}
