//! Extraction client: job submission, progress channels and the UI facade.
mod backend;
mod channel;
mod client;
mod config;
mod decode;
mod error;
mod fingerprint;
mod job_client;
mod push;
mod timer;
pub mod wire;

pub use backend::{Backend, HttpBackend};
pub use channel::{ProgressChannel, Subscription, TIMEOUT_PARTIAL_STAGE};
pub use client::{ElapsedCallback, ExtractionClient, ProgressCallback};
pub use config::{
    BackendConfig, ChannelConfig, ChannelMode, ClientConfig, ConfigError, Endpoints, HttpConfig,
    PushClosePolicy, MAX_DEADLINE,
};
pub use decode::decode_body;
pub use error::{ChannelError, SubmitError, SubmitErrorKind};
pub use fingerprint::{fallback_token, fingerprint, ClientEnvironment};
pub use job_client::JobClient;
pub use push::{FrameStream, PushConnector, WebSocketConnector};
pub use timer::{format_elapsed, ElapsedSink, TimerReporter};

pub use extraction_core::{
    ExtractionResult, FailureReason, JobHandle, JobId, JobSnapshot, JobState, ProgressEvent,
};
