use extraction_core::ResultFragment;
use futures_util::join;
use extraction_logging::{extraction_debug, extraction_warn};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde_json::{json, Value};
use url::Url;

use crate::decode::decode_body;
use crate::wire::{decode_status, decode_submit, error_detail, StatusBody, SubmitResponse, WireResult};
use crate::config::Endpoints;
use crate::{ChannelError, ClientConfig, ConfigError, SubmitError, SubmitErrorKind};

/// Request/response operations of the extraction backend.
#[async_trait::async_trait]
pub trait Backend: Send + Sync {
    async fn submit(&self, url: &str, fingerprint: &str) -> Result<SubmitResponse, SubmitError>;

    async fn status(&self, job_id: &str) -> Result<StatusBody, ChannelError>;

    /// Best-effort raw HTML download; `None` when no endpoint has it.
    async fn raw_html(&self, job_id: &str) -> Option<String>;

    async fn artifact(&self, uri: &str) -> Result<String, ChannelError>;
}

#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: reqwest::Client,
    endpoints: Endpoints,
}

impl HttpBackend {
    pub fn new(config: &ClientConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let endpoints = config.backend.endpoints()?;
        let client = reqwest::Client::builder()
            .connect_timeout(config.http.connect_timeout)
            .timeout(config.http.request_timeout)
            .user_agent(concat!(
                env!("CARGO_PKG_NAME"),
                "/",
                env!("CARGO_PKG_VERSION")
            ))
            .build()
            .map_err(|err| ConfigError::HttpClient(err.to_string()))?;
        Ok(Self {
            client,
            endpoints,
        })
    }

    async fn get_bytes(
        &self,
        url: Url,
    ) -> Result<(u16, Option<String>, Vec<u8>), ChannelError> {
        let response = self
            .client
            .get(url)
            .header("Cache-Control", "no-cache")
            .send()
            .await
            .map_err(map_channel_error)?;
        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.to_string());
        let bytes = response.bytes().await.map_err(map_channel_error)?;
        Ok((status, content_type, bytes.to_vec()))
    }
}

#[async_trait::async_trait]
impl Backend for HttpBackend {
    async fn submit(&self, url: &str, fingerprint: &str) -> Result<SubmitResponse, SubmitError> {
        let endpoint = self.endpoints.submit_url();
        extraction_debug!("POST {} url={}", endpoint, url);
        let response = self
            .client
            .post(endpoint)
            .header(ACCEPT, "application/json")
            .json(&json!({ "url": url, "fingerprint_hash": fingerprint }))
            .send()
            .await
            .map_err(map_submit_error)?;

        let status = response.status();
        let body = response.bytes().await.map_err(map_submit_error)?;
        if !status.is_success() {
            let detail = error_detail(&body).unwrap_or_else(|| status.to_string());
            return Err(SubmitError::new(
                SubmitErrorKind::HttpStatus(status.as_u16()),
                detail,
            ));
        }
        decode_submit(&body)
    }

    async fn status(&self, job_id: &str) -> Result<StatusBody, ChannelError> {
        let (status, _, body) = self.get_bytes(self.endpoints.status_url(job_id)).await?;
        if !(200..300).contains(&status) {
            return Err(ChannelError::HttpStatus(status));
        }
        decode_status(status, &body)
    }

    async fn raw_html(&self, job_id: &str) -> Option<String> {
        for url in self.endpoints.raw_html_urls(job_id) {
            match self.get_bytes(url.clone()).await {
                Ok((status, content_type, body)) if (200..300).contains(&status) => {
                    return Some(decode_body(&body, content_type.as_deref()));
                }
                Ok((status, _, _)) => {
                    extraction_debug!("Raw HTML not available at {} (status {})", url, status);
                }
                Err(err) => {
                    extraction_warn!("Raw HTML fetch from {} failed: {}", url, err);
                }
            }
        }
        None
    }

    async fn artifact(&self, uri: &str) -> Result<String, ChannelError> {
        let url = self
            .endpoints
            .resolve(uri)
            .map_err(|err| ChannelError::Malformed(format!("artifact uri {uri}: {err}")))?;
        let (status, content_type, body) = self.get_bytes(url).await?;
        if !(200..300).contains(&status) {
            return Err(ChannelError::HttpStatus(status));
        }
        Ok(decode_body(&body, content_type.as_deref()))
    }
}

/// Fill fields that the backend only referenced by URI. The artifacts are
/// fetched concurrently; failures are logged and leave the field empty.
pub(crate) async fn resolve_artifacts(backend: &dyn Backend, wire: WireResult) -> ResultFragment {
    let WireResult {
        mut fragment,
        artifacts,
    } = wire;

    let cleaned_uri = artifacts
        .cleaned_html_uri
        .as_deref()
        .filter(|_| fragment.cleaned_html.is_none());
    let parser_uri = artifacts
        .parser_code_uri
        .as_deref()
        .filter(|_| fragment.parser_code.is_none());
    let extracted_uri = artifacts
        .extracted_json_uri
        .as_deref()
        .filter(|_| fragment.extracted_data.is_none());

    let (cleaned_html, parser_code, extracted_json) = join!(
        fetch_artifact(backend, cleaned_uri),
        fetch_artifact(backend, parser_uri),
        fetch_artifact(backend, extracted_uri),
    );

    if cleaned_html.is_some() {
        fragment.cleaned_html = cleaned_html;
    }
    if parser_code.is_some() {
        fragment.parser_code = parser_code;
    }
    if let (Some(uri), Some(text)) = (extracted_uri, extracted_json) {
        match serde_json::from_str::<Value>(&text) {
            Ok(value) => fragment.extracted_data = Some(value),
            Err(err) => extraction_warn!("Extracted JSON at {} is not valid JSON: {}", uri, err),
        }
    }
    fragment
}

async fn fetch_artifact(backend: &dyn Backend, uri: Option<&str>) -> Option<String> {
    let uri = uri?;
    match backend.artifact(uri).await {
        Ok(text) => Some(text),
        Err(err) => {
            extraction_warn!("Failed to fetch artifact {}: {}", uri, err);
            None
        }
    }
}

fn map_submit_error(err: reqwest::Error) -> SubmitError {
    if err.is_timeout() {
        return SubmitError::new(SubmitErrorKind::Timeout, err.to_string());
    }
    SubmitError::new(SubmitErrorKind::Network, err.to_string())
}

fn map_channel_error(err: reqwest::Error) -> ChannelError {
    if err.is_connect() {
        return ChannelError::Connect(err.to_string());
    }
    ChannelError::Network(err.to_string())
}
