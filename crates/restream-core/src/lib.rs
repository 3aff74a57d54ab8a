//! Core of restream: supervision of long-running relay pipelines.
//!
//! # Architecture
//!
//! - **Process**: spawns a pipeline in its own process group and signals the group
//! - **Registry**: the table of live jobs, behind a reader/writer lock
//! - **Supervisor**: start/stop/status/list, graceful termination and reaping
//! - **Notify**: the publish interface called after every state change

pub mod error;
pub mod job;
pub mod notify;
pub mod process;
pub mod registry;
pub mod supervisor;

pub use error::{Error, Result};
pub use job::{Job, JobSnapshot, JobStatus, StartRequest};
pub use notify::{NoopNotifier, Notifier};
pub use process::{PipelineConfig, ProcessHandle, ProcessWaiter, Signal};
pub use registry::JobRegistry;
pub use supervisor::{DEFAULT_GRACE_PERIOD, StopOutcome, Supervisor, SupervisorConfig};
