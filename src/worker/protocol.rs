//! Message types exchanged across the worker boundary.
//!
//! Inbound, an [`Envelope`] carries at most one request per operation. It is
//! immediately converted into closed [`Request`] values so that dispatch is
//! an exhaustive match. Outbound, every processed request yields exactly one
//! [`Response`], keyed by the operation name when serialized:
//!
//! ```text
//! -> {"parse": {"id": 1, "bytes": [...]}, "download": {"id": 2, "file_index": 0, "offset": 0, "size": 5}}
//! <- {"parse": {"id": 1, "result": {"Ok": {"type": "directory", ...}}}}
//! <- {"download": {"id": 2, "file_index": 0, "result": {"Ok": {"label": "a.txt", "bytes": [...]}}}}
//! ```

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::ErrorPayload;
use crate::pack::{Extracted, Tree};

/// Caller-chosen correlation id, echoed back in the matching reply.
pub type RequestId = u64;

/// Raw pack bytes to index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseRequest {
    pub id: RequestId,
    pub bytes: Vec<u8>,
}

/// A byte range of one file, relative to the start of its content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadRequest {
    pub id: RequestId,
    pub file_index: u32,
    pub offset: u64,
    pub size: u64,
}

/// One inbound message. Absent operations are skipped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Envelope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parse: Option<ParseRequest>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download: Option<DownloadRequest>,
}

impl Envelope {
    pub fn parse(id: RequestId, bytes: Vec<u8>) -> Self {
        Self {
            parse: Some(ParseRequest { id, bytes }),
            download: None,
        }
    }

    pub fn download(request: DownloadRequest) -> Self {
        Self {
            parse: None,
            download: Some(request),
        }
    }

    /// Requests in processing order: parse before download.
    pub fn into_requests(self) -> Vec<Request> {
        let mut requests = Vec::with_capacity(2);
        if let Some(parse) = self.parse {
            requests.push(Request::Parse(parse));
        }
        if let Some(download) = self.download {
            requests.push(Request::Download(download));
        }
        requests
    }
}

/// A single operation, dispatched exhaustively by the executor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Parse(ParseRequest),
    Download(DownloadRequest),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseReply {
    pub id: RequestId,
    pub result: Result<Arc<Tree>, ErrorPayload>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadReply {
    pub id: RequestId,
    /// Identifies the failing file when `result` is an error
    pub file_index: u32,
    pub result: Result<Extracted, ErrorPayload>,
}

/// One outbound message, named after the operation that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Response {
    Parse(ParseReply),
    Download(DownloadReply),
}

impl Response {
    pub fn id(&self) -> RequestId {
        match self {
            Response::Parse(reply) => reply.id,
            Response::Download(reply) => reply.id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_orders_parse_first() {
        let envelope = Envelope {
            parse: Some(ParseRequest {
                id: 1,
                bytes: vec![],
            }),
            download: Some(DownloadRequest {
                id: 2,
                file_index: 0,
                offset: 0,
                size: 1,
            }),
        };
        let requests = envelope.into_requests();
        assert!(matches!(requests[0], Request::Parse(ParseRequest { id: 1, .. })));
        assert!(matches!(requests[1], Request::Download(DownloadRequest { id: 2, .. })));
        assert!(Envelope::default().into_requests().is_empty());
    }

    #[test]
    fn envelope_json_shape() {
        let json = r#"{"download": {"id": 7, "file_index": 3, "offset": 10, "size": 20}}"#;
        let envelope: Envelope = serde_json::from_str(json).unwrap();
        assert_eq!(envelope.parse, None);
        assert_eq!(envelope.download.unwrap().file_index, 3);

        let unknown = r#"{"delete": {"id": 1}}"#;
        assert!(serde_json::from_str::<Envelope>(unknown).is_err());
    }

    #[test]
    fn response_keyed_by_operation() {
        let response = Response::Download(DownloadReply {
            id: 4,
            file_index: 0,
            result: Ok(Extracted {
                label: "a.txt".into(),
                bytes: b"hi".to_vec(),
            }),
        });
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["download"]["id"], 4);
        assert_eq!(json["download"]["result"]["Ok"]["label"], "a.txt");
        assert_eq!(response.id(), 4);
    }
}
