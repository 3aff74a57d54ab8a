//! Request, response and push message types.

use serde::{Deserialize, Serialize};

pub use restream_core::{JobSnapshot, JobStatus, StartRequest};

/// Body of a successful `POST /api/stream/start`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartResponse {
    pub status: String,
    pub message: String,
    /// Process id of the pipeline shell.
    pub pid: u32,
}

/// Query string of `POST /api/stream/stop`.
#[derive(Debug, Clone, Deserialize)]
pub struct StopQuery {
    pub url: String,
}

/// Body of a successful `POST /api/stream/stop`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StopResponse {
    pub status: String,
    pub message: String,
}

/// Body of `GET /api/stream/status/{url}`. Absence is reported in-band.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusResponse {
    pub is_running: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub process_id: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StatusResponse {
    pub fn from_snapshot(snapshot: &JobSnapshot) -> Self {
        Self {
            is_running: snapshot.is_running(),
            process_id: Some(snapshot.pid),
            error: None,
        }
    }

    pub fn not_found() -> Self {
        Self {
            is_running: false,
            process_id: None,
            error: Some("stream not found".to_string()),
        }
    }
}

/// Body of `GET /api/streams`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamsResponse {
    pub streams: Vec<JobSnapshot>,
}

/// Error body for non-2xx responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Messages pushed to WebSocket subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Full job list, sent on connect and after every start, stop and reap.
    StreamsUpdate {
        streams: Vec<JobSnapshot>,
    },
}
