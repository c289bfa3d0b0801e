use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

/// Longest deadline a subscription accepts.
pub const MAX_DEADLINE: Duration = Duration::from_secs(7 * 24 * 60 * 60);

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(String),
    #[error("invalid url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
    #[error("failed to build http client: {0}")]
    HttpClient(String),
}

/// Complete client configuration. Every field has a default, so a config
/// file only needs to name what it overrides. Durations are milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub backend: BackendConfig,
    pub http: HttpConfig,
    pub channel: ChannelConfig,
    #[serde(rename = "timer_tick_ms", with = "millis")]
    pub timer_tick: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            backend: BackendConfig::default(),
            http: HttpConfig::default(),
            channel: ChannelConfig::default(),
            timer_tick: Duration::from_secs(1),
        }
    }
}

impl ClientConfig {
    /// Parse and validate a RON config.
    pub fn from_ron_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = ron::from_str(text).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        Self::from_ron_str(&text)
    }

    /// Reject values the runtime cannot honour: zero periods, deadlines past
    /// [`MAX_DEADLINE`], an empty event buffer and unusable backend URLs.
    pub fn validate(&self) -> Result<(), ConfigError> {
        non_zero("timer_tick_ms", self.timer_tick)?;
        non_zero("channel.poll_interval_ms", self.channel.poll_interval)?;
        non_zero("channel.deadline_ms", self.channel.deadline)?;
        non_zero("channel.final_fetch_timeout_ms", self.channel.final_fetch_timeout)?;
        if self.channel.deadline > MAX_DEADLINE {
            return Err(ConfigError::InvalidValue {
                field: "channel.deadline_ms",
                reason: format!("must not exceed {} ms", MAX_DEADLINE.as_millis()),
            });
        }
        if self.channel.event_buffer == 0 {
            return Err(ConfigError::InvalidValue {
                field: "channel.event_buffer",
                reason: "must be at least 1".to_string(),
            });
        }
        self.backend.endpoints().map(|_| ())
    }
}

fn non_zero(field: &'static str, value: Duration) -> Result<(), ConfigError> {
    if value.is_zero() {
        return Err(ConfigError::InvalidValue {
            field,
            reason: "must be greater than zero".to_string(),
        });
    }
    Ok(())
}

/// Where the extraction backend lives. Paths may contain `{job_id}` and a
/// query string; they are appended to the path of `base_url`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub base_url: String,
    pub submit_path: String,
    pub status_path: String,
    /// Tried in order; the first successful response wins.
    pub raw_html_paths: Vec<String>,
    pub push_path: String,
    /// Overrides the websocket base derived from `base_url`.
    pub ws_base: Option<String>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8001".to_string(),
            submit_path: "/demo/simple-try".to_string(),
            status_path: "/demo/results/{job_id}?gpt_cleaned=true".to_string(),
            raw_html_paths: vec![
                "/demo/simple/raw/{job_id}".to_string(),
                "/demo/raw/{job_id}".to_string(),
            ],
            push_path: "/ws/progress/{job_id}".to_string(),
            ws_base: None,
        }
    }
}

impl BackendConfig {
    /// Parse the base URLs once into resolved [`Endpoints`].
    pub fn endpoints(&self) -> Result<Endpoints, ConfigError> {
        let base = parse_base(&self.base_url, &["http", "https"])?;
        let ws_base = match &self.ws_base {
            Some(ws_base) => parse_base(ws_base, &["ws", "wss"])?,
            None => {
                let mut ws_base = base.clone();
                let scheme = if base.scheme() == "https" { "wss" } else { "ws" };
                ws_base.set_scheme(scheme).map_err(|()| ConfigError::InvalidUrl {
                    url: self.base_url.clone(),
                    reason: format!("cannot switch scheme to {scheme}"),
                })?;
                ws_base
            }
        };
        Ok(Endpoints {
            base,
            ws_base,
            submit_path: self.submit_path.clone(),
            status_path: self.status_path.clone(),
            raw_html_paths: self.raw_html_paths.clone(),
            push_path: self.push_path.clone(),
        })
    }
}

fn parse_base(raw: &str, schemes: &[&str]) -> Result<Url, ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidUrl {
        url: raw.to_string(),
        reason,
    };
    let mut url = Url::parse(raw).map_err(|err| invalid(err.to_string()))?;
    if !schemes.contains(&url.scheme()) {
        return Err(invalid(format!("expected one of {schemes:?}")));
    }
    if !url.has_host() {
        return Err(invalid("missing host".to_string()));
    }
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url.set_query(None);
    url.set_fragment(None);
    Ok(url)
}

/// Backend URLs built from a validated [`BackendConfig`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    base: Url,
    ws_base: Url,
    submit_path: String,
    status_path: String,
    raw_html_paths: Vec<String>,
    push_path: String,
}

impl Endpoints {
    pub fn base(&self) -> &Url {
        &self.base
    }

    pub fn submit_url(&self) -> Url {
        endpoint(&self.base, &self.submit_path, "")
    }

    pub fn status_url(&self, job_id: &str) -> Url {
        endpoint(&self.base, &self.status_path, job_id)
    }

    pub fn raw_html_urls(&self, job_id: &str) -> Vec<Url> {
        self.raw_html_paths
            .iter()
            .map(|path| endpoint(&self.base, path, job_id))
            .collect()
    }

    pub fn push_url(&self, job_id: &str) -> Url {
        endpoint(&self.ws_base, &self.push_path, job_id)
    }

    /// Resolve an artifact reference the way a browser would: absolute and
    /// scheme-relative URIs keep their host, everything else is joined onto
    /// the base URL.
    pub fn resolve(&self, uri: &str) -> Result<Url, url::ParseError> {
        self.base.join(uri.trim())
    }
}

/// Append `template`'s path segments to `base`, substituting `{job_id}`.
/// Each segment is percent-encoded on its own, so a job id never adds
/// path separators or a query.
fn endpoint(base: &Url, template: &str, job_id: &str) -> Url {
    let (path, query) = match template.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (template, None),
    };
    let mut url = base.clone();
    if let Ok(mut segments) = url.path_segments_mut() {
        segments.pop_if_empty();
        for segment in path.split('/').filter(|segment| !segment.is_empty()) {
            segments.push(&segment.replace("{job_id}", job_id));
        }
    }
    url.set_query(query);
    url
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    #[serde(rename = "connect_timeout_ms", with = "millis")]
    pub connect_timeout: Duration,
    #[serde(rename = "request_timeout_ms", with = "millis")]
    pub request_timeout: Duration,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ChannelMode {
    #[default]
    Poll,
    Push,
}

/// What a push channel does when the socket goes away before a terminal event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PushClosePolicy {
    /// Emit a synthetic `Failed` event.
    #[default]
    Fail,
    /// End the event sequence without a terminal event.
    End,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    pub mode: ChannelMode,
    #[serde(rename = "poll_interval_ms", with = "millis")]
    pub poll_interval: Duration,
    #[serde(rename = "deadline_ms", with = "millis")]
    pub deadline: Duration,
    /// Bound on the best-effort fetch made once the deadline has passed.
    #[serde(rename = "final_fetch_timeout_ms", with = "millis")]
    pub final_fetch_timeout: Duration,
    pub dedupe_running: bool,
    /// Keep polling past non-intelligent results until intelligent ones arrive.
    pub await_intelligent: bool,
    /// Switch once to polling when the push socket fails.
    pub fallback_to_poll: bool,
    pub push_close: PushClosePolicy,
    /// Fill in missing raw HTML before reporting completion.
    pub fetch_raw_html: bool,
    pub event_buffer: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            mode: ChannelMode::Poll,
            poll_interval: Duration::from_millis(3000),
            deadline: Duration::from_secs(360),
            final_fetch_timeout: Duration::from_secs(10),
            dedupe_running: true,
            await_intelligent: false,
            fallback_to_poll: true,
            push_close: PushClosePolicy::Fail,
            fetch_raw_html: true,
            event_buffer: 64,
        }
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
