//! Job records and their observable views.

use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::process::ProcessHandle;

/// Request to start relaying `url` to `rtmp_url/stream_key`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartRequest {
    /// Source locator. Also the job key.
    pub url: String,
    /// Target streaming endpoint.
    pub rtmp_url: String,
    /// Stream key appended to the endpoint.
    pub stream_key: String,
}

impl StartRequest {
    /// Reject requests with empty fields before anything is spawned.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("url", &self.url),
            ("rtmp_url", &self.rtmp_url),
            ("stream_key", &self.stream_key),
        ] {
            if value.trim().is_empty() {
                return Err(Error::InvalidRequest(format!("`{}` must not be empty", name)));
            }
        }
        Ok(())
    }

    /// Full write address for the pipeline: endpoint joined with the stream key.
    pub fn target(&self) -> String {
        format!(
            "{}/{}",
            self.rtmp_url.trim_end_matches('/'),
            self.stream_key.trim_start_matches('/')
        )
    }
}

/// Derived job status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// The pipeline has not exited.
    Running,
    /// The pipeline exited and the job is waiting to be reaped.
    Stopped,
}

/// A supervised relay pipeline.
///
/// The job owns its process handle; nothing else holds the raw child.
#[derive(Debug)]
pub struct Job {
    id: Uuid,
    key: String,
    target: String,
    handle: ProcessHandle,
    started_at: DateTime<Utc>,
    /// Set once a stop sequence has begun.
    stopping: AtomicBool,
}

impl Job {
    /// Create a job record for a freshly spawned pipeline.
    pub fn new(key: impl Into<String>, target: impl Into<String>, handle: ProcessHandle) -> Self {
        Self {
            id: Uuid::new_v4(),
            key: key.into(),
            target: target.into(),
            handle,
            started_at: Utc::now(),
            stopping: AtomicBool::new(false),
        }
    }

    /// Unique id of this incarnation of the key.
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn handle(&self) -> &ProcessHandle {
        &self.handle
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn pid(&self) -> u32 {
        self.handle.pid()
    }

    /// Status derived from the process handle.
    pub fn status(&self) -> JobStatus {
        if self.handle.has_exited() {
            JobStatus::Stopped
        } else {
            JobStatus::Running
        }
    }

    /// Mark the job as stopping. Returns `false` if another stop got there first.
    pub fn begin_stop(&self) -> bool {
        !self.stopping.swap(true, Ordering::SeqCst)
    }

    pub fn is_stopping(&self) -> bool {
        self.stopping.load(Ordering::SeqCst)
    }

    /// Immutable view of the job at this instant.
    pub fn snapshot(&self) -> JobSnapshot {
        JobSnapshot {
            url: self.key.clone(),
            status: self.status(),
            pid: self.pid(),
            started_at: self.started_at,
        }
    }
}

/// Point-in-time view of a job, as listed and broadcast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSnapshot {
    /// Job key (the source locator).
    pub url: String,
    pub status: JobStatus,
    pub pid: u32,
    pub started_at: DateTime<Utc>,
}

impl JobSnapshot {
    pub fn is_running(&self) -> bool {
        self.status == JobStatus::Running
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(url: &str, rtmp_url: &str, stream_key: &str) -> StartRequest {
        StartRequest {
            url: url.to_string(),
            rtmp_url: rtmp_url.to_string(),
            stream_key: stream_key.to_string(),
        }
    }

    #[test]
    fn test_target_joins_endpoint_and_key() {
        assert_eq!(request("srcA", "rtmp://host/live", "abc").target(), "rtmp://host/live/abc");
        assert_eq!(request("srcA", "rtmp://host/live/", "abc").target(), "rtmp://host/live/abc");
    }

    #[test]
    fn test_validate_rejects_empty_fields() {
        assert!(request("srcA", "rtmp://host/live", "abc").validate().is_ok());

        let err = request("srcA", "rtmp://host/live", "  ").validate().unwrap_err();
        assert!(matches!(err, Error::InvalidRequest(ref m) if m.contains("stream_key")));

        let err = request("", "rtmp://host/live", "abc").validate().unwrap_err();
        assert!(matches!(err, Error::InvalidRequest(ref m) if m.contains("url")));
    }

    #[test]
    fn test_status_serializes_snake_case() {
        assert_eq!(serde_json::to_string(&JobStatus::Running).unwrap(), "\"running\"");
        assert_eq!(serde_json::to_string(&JobStatus::Stopped).unwrap(), "\"stopped\"");
    }
}
