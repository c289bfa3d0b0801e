use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::Message;

use extraction_logging::extraction_debug;

use crate::config::Endpoints;
use crate::{BackendConfig, ChannelError, ConfigError};

/// Text frames received from a push socket, in arrival order.
pub type FrameStream = BoxStream<'static, Result<String, ChannelError>>;

/// Opens the server-to-client progress stream for a job.
#[async_trait::async_trait]
pub trait PushConnector: Send + Sync {
    async fn connect(&self, job_id: &str) -> Result<FrameStream, ChannelError>;
}

/// Push connector backed by a websocket per job. Dropping the returned
/// stream closes the socket.
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    endpoints: Endpoints,
}

impl WebSocketConnector {
    pub fn new(backend: &BackendConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            endpoints: backend.endpoints()?,
        })
    }
}

#[async_trait::async_trait]
impl PushConnector for WebSocketConnector {
    async fn connect(&self, job_id: &str) -> Result<FrameStream, ChannelError> {
        let url = self.endpoints.push_url(job_id);
        let (socket, _response) = connect_async(url.as_str())
            .await
            .map_err(|err| ChannelError::Connect(format!("{url}: {err}")))?;
        extraction_debug!("Progress socket connected for job {}", job_id);

        let frames = socket.filter_map(|message| async move {
            match message {
                Ok(Message::Text(text)) => Some(Ok(text.as_str().to_owned())),
                Ok(Message::Binary(bytes)) => Some(
                    String::from_utf8(bytes.to_vec())
                        .map_err(|err| ChannelError::Malformed(err.to_string())),
                ),
                Ok(Message::Close(_)) => None,
                Ok(_) => None,
                Err(err) => Some(Err(ChannelError::Socket(err.to_string()))),
            }
        });
        Ok(frames.boxed())
    }
}
