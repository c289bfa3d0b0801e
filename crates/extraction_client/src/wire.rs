//! Decoding of backend bodies and push frames into explicit unions.
//!
//! The backend reuses endpoints for several shapes (a status body on one
//! call, a result body on the next). Everything is classified here, once, so
//! the channel code only ever switches on a typed tag.

use extraction_core::ResultFragment;
use serde::Deserialize;
use serde_json::Value;

use crate::{ChannelError, SubmitError, SubmitErrorKind};

const RESULT_FIELDS: &[&str] = &[
    "raw_html",
    "cleaned_html",
    "extracted_data",
    "parser_code",
    "cleaned_html_uri",
    "parser_code_uri",
    "extracted_json_uri",
];

/// Artifacts the backend stores separately and references by URI.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ArtifactRefs {
    #[serde(default)]
    pub cleaned_html_uri: Option<String>,
    #[serde(default)]
    pub parser_code_uri: Option<String>,
    #[serde(default)]
    pub extracted_json_uri: Option<String>,
}

/// A result body as sent by the backend, before artifact resolution.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WireResult {
    pub fragment: ResultFragment,
    pub artifacts: ArtifactRefs,
}

impl WireResult {
    pub fn decode(value: &Value) -> Result<Self, ChannelError> {
        let fragment = ResultFragment::from_value(value)
            .map_err(|err| ChannelError::Malformed(err.to_string()))?;
        let artifacts = ArtifactRefs::deserialize(value)
            .map_err(|err| ChannelError::Malformed(err.to_string()))?;
        Ok(Self {
            fragment,
            artifacts,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SubmitResponse {
    /// The job finished during the request; its result is embedded.
    Completed {
        job_id: Option<String>,
        result: WireResult,
    },
    /// The job was accepted and must be observed asynchronously.
    Accepted { job_id: String },
}

pub fn decode_submit(body: &[u8]) -> Result<SubmitResponse, SubmitError> {
    let value: Value = serde_json::from_slice(body)
        .map_err(|err| SubmitError::new(SubmitErrorKind::MalformedBody, err.to_string()))?;
    let job_id = value
        .get("job_id")
        .and_then(Value::as_str)
        .map(str::to_string);

    if str_field(&value, "status") == Some("completed") {
        if let Some(results) = value.get("results").filter(|v| v.is_object()) {
            let result = WireResult::decode(results)
                .map_err(|err| SubmitError::new(SubmitErrorKind::MalformedBody, err.to_string()))?;
            return Ok(SubmitResponse::Completed { job_id, result });
        }
    }

    match job_id {
        Some(job_id) if !job_id.is_empty() => Ok(SubmitResponse::Accepted { job_id }),
        _ => Err(SubmitError::new(
            SubmitErrorKind::MalformedBody,
            "response carries neither results nor a job_id",
        )),
    }
}

/// Pulls a human readable message out of an error body, if there is one.
pub fn error_detail(body: &[u8]) -> Option<String> {
    let value: Value = serde_json::from_slice(body).ok()?;
    ["detail", "error", "message"]
        .iter()
        .find_map(|key| str_field(&value, key))
        .map(str::to_string)
}

#[derive(Debug, Clone, PartialEq)]
pub enum StatusBody {
    Queued {
        message: String,
    },
    Running {
        phase: Option<u32>,
        percentage: Option<u32>,
        message: String,
    },
    Ready(WireResult),
    Failed {
        reason: String,
    },
}

impl StatusBody {
    fn processing() -> Self {
        StatusBody::Running {
            phase: None,
            percentage: None,
            message: "Processing...".to_string(),
        }
    }
}

pub fn decode_status(http_status: u16, body: &[u8]) -> Result<StatusBody, ChannelError> {
    if http_status == 202 {
        return Ok(StatusBody::processing());
    }

    let value: Value =
        serde_json::from_slice(body).map_err(|err| ChannelError::Malformed(err.to_string()))?;
    if !value.is_object() {
        return Err(ChannelError::Malformed("status body is not an object".into()));
    }

    let status = str_field(&value, "detail")
        .and_then(|detail| detail.strip_prefix("Job status:"))
        .map(str::trim)
        .or_else(|| str_field(&value, "status"))
        .map(str::to_ascii_lowercase);

    if let Some(results) = value.get("results").filter(|v| v.is_object()) {
        if status.as_deref() == Some("completed") {
            return WireResult::decode(results).map(StatusBody::Ready);
        }
    }
    if has_result_fields(&value) {
        return WireResult::decode(&value).map(StatusBody::Ready);
    }

    let message = str_field(&value, "message").map(str::to_string);
    match status.as_deref() {
        Some("queued") | Some("pending") => Ok(StatusBody::Queued {
            message: message.unwrap_or_else(|| "Queued".to_string()),
        }),
        Some("running") | Some("processing") => Ok(StatusBody::Running {
            phase: u32_field(&value, "phase"),
            percentage: percentage_field(&value),
            message: message.unwrap_or_else(|| "Processing...".to_string()),
        }),
        // Completed but the results are not published yet.
        Some("completed") => Ok(StatusBody::Running {
            phase: u32_field(&value, "phase"),
            percentage: percentage_field(&value),
            message: message.unwrap_or_else(|| "Finalising results...".to_string()),
        }),
        Some("failed") | Some("error") => Ok(StatusBody::Failed {
            reason: ["error", "message", "detail"]
                .iter()
                .find_map(|key| str_field(&value, key))
                .unwrap_or("job failed")
                .to_string(),
        }),
        Some(other) => Err(ChannelError::Malformed(format!("unknown status {other}"))),
        None => Err(ChannelError::Malformed("status body without status".into())),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PushFrame {
    Queued {
        message: String,
    },
    Progress {
        phase: Option<u32>,
        percentage: Option<u32>,
        message: String,
    },
    Partial {
        stage: String,
        payload: Value,
    },
    /// `result` is `None` when the frame only signals completion.
    Complete {
        result: Option<WireResult>,
    },
    Error {
        message: String,
    },
}

#[derive(Debug, Deserialize)]
struct RawPushFrame {
    #[serde(default, rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    stage: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    phase: Option<Value>,
    #[serde(default)]
    percentage: Option<Value>,
    #[serde(default)]
    payload: Option<Value>,
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    result: Option<Value>,
}

pub fn decode_push(text: &str) -> Result<PushFrame, ChannelError> {
    let raw: RawPushFrame =
        serde_json::from_str(text).map_err(|err| ChannelError::Malformed(err.to_string()))?;
    let is = |name: &str| {
        raw.kind.as_deref() == Some(name) || raw.stage.as_deref() == Some(name)
    };

    if is("error") {
        return Ok(PushFrame::Error {
            message: raw
                .message
                .unwrap_or_else(|| "extraction failed".to_string()),
        });
    }
    if is("complete") || is("saved_to_mongodb") {
        let result = raw
            .result
            .as_ref()
            .filter(|value| value.is_object())
            .and_then(|value| WireResult::decode(value).ok());
        return Ok(PushFrame::Complete { result });
    }
    if raw.stage.as_deref() == Some("queued") || raw.status.as_deref() == Some("queued") {
        return Ok(PushFrame::Queued {
            message: raw.message.unwrap_or_else(|| "Queued".to_string()),
        });
    }
    if let (Some(stage), Some(payload)) = (raw.stage.clone(), raw.payload.or(raw.data)) {
        return Ok(PushFrame::Partial { stage, payload });
    }

    Ok(PushFrame::Progress {
        phase: raw.phase.as_ref().and_then(lenient_u32),
        percentage: raw.percentage.as_ref().and_then(lenient_percentage),
        message: raw.message.unwrap_or_default(),
    })
}

fn has_result_fields(value: &Value) -> bool {
    RESULT_FIELDS
        .iter()
        .any(|field| value.get(field).is_some_and(|v| !v.is_null()))
}

fn str_field<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value.get(key).and_then(Value::as_str)
}

fn u32_field(value: &Value, key: &str) -> Option<u32> {
    value.get(key).and_then(lenient_u32)
}

fn percentage_field(value: &Value) -> Option<u32> {
    value.get("percentage").and_then(lenient_percentage)
}

/// Numbers arrive as integers, floats or numeric strings depending on the
/// backend worker that produced them.
fn lenient_f64(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        _ => None,
    };
    number.filter(|number| number.is_finite())
}

fn lenient_u32(value: &Value) -> Option<u32> {
    lenient_f64(value)
        .filter(|number| *number >= 0.0 && *number <= f64::from(u32::MAX))
        .map(|number| number.round() as u32)
}

fn lenient_percentage(value: &Value) -> Option<u32> {
    lenient_f64(value).map(|raw| raw.round().clamp(0.0, 100.0) as u32)
}
