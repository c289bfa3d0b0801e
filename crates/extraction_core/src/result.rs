use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{AssemblyError, FailureReason};

/// Quality tiers of extraction artifacts, lowest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ResultTier {
    RawHtml,
    CleanedHtml,
    BasicExtraction,
    IntelligentExtraction,
}

/// The best extraction output known for a job so far.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub raw_html: Option<String>,
    pub cleaned_html: Option<String>,
    pub extracted_data: Option<Value>,
    pub parser_code: Option<String>,
    /// Set once intelligent-tier data has been recorded; never cleared.
    pub intelligent: bool,
    /// Present when the job failed after (possibly) producing partial output.
    pub failure: Option<FailureReason>,
}

impl ExtractionResult {
    /// Highest tier represented by the fields currently set.
    pub fn tier(&self) -> Option<ResultTier> {
        if self.intelligent {
            Some(ResultTier::IntelligentExtraction)
        } else if self.extracted_data.is_some() {
            Some(ResultTier::BasicExtraction)
        } else if self.cleaned_html.is_some() {
            Some(ResultTier::CleanedHtml)
        } else if self.raw_html.is_some() {
            Some(ResultTier::RawHtml)
        } else {
            None
        }
    }

    pub fn is_empty(&self) -> bool {
        self.tier().is_none() && self.parser_code.is_none()
    }
}

/// A piece of result data reported by one pipeline stage.
///
/// Field names follow the backend's result bodies; `intelligent_extraction` is
/// accepted as the marker name used by the demo endpoints.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ResultFragment {
    #[serde(default)]
    pub raw_html: Option<String>,
    #[serde(default)]
    pub cleaned_html: Option<String>,
    #[serde(default)]
    pub extracted_data: Option<Value>,
    #[serde(default)]
    pub parser_code: Option<String>,
    #[serde(default, alias = "intelligent_extraction")]
    pub intelligent: bool,
}

impl ResultFragment {
    /// Decode the payload of a `PartialResult` event.
    ///
    /// Object payloads are read as result fields. String payloads and bare
    /// data payloads are placed according to the stage name.
    pub fn from_partial(stage: &str, payload: &Value) -> Result<Self, AssemblyError> {
        let stage_lower = stage.to_ascii_lowercase();
        let stage_intelligent = stage_lower.contains("intelligent");
        let stage_extraction = stage_lower.contains("extraction");

        let mut fragment = match payload {
            Value::Object(_) => {
                let fragment = Self::from_value(payload)?;
                if fragment.is_empty() && stage_extraction {
                    Self {
                        extracted_data: Some(payload.clone()),
                        ..Self::default()
                    }
                } else {
                    fragment
                }
            }
            Value::String(text) => {
                let mut fragment = Self::default();
                if stage_lower.contains("raw") {
                    fragment.raw_html = Some(text.clone());
                } else if stage_lower.contains("clean") {
                    fragment.cleaned_html = Some(text.clone());
                } else if stage_lower.contains("parser") {
                    fragment.parser_code = Some(text.clone());
                } else {
                    return Err(AssemblyError::UnsupportedPayload {
                        stage: stage.to_string(),
                    });
                }
                fragment
            }
            Value::Array(_) if stage_extraction => Self {
                extracted_data: Some(payload.clone()),
                ..Self::default()
            },
            _ => {
                return Err(AssemblyError::UnsupportedPayload {
                    stage: stage.to_string(),
                })
            }
        };

        if stage_intelligent {
            fragment.intelligent = true;
        }
        if fragment.is_empty() {
            return Err(AssemblyError::NoRecognisedField {
                stage: stage.to_string(),
            });
        }
        Ok(fragment)
    }

    /// Decode a result-bearing JSON object.
    pub fn from_value(value: &Value) -> Result<Self, AssemblyError> {
        Self::deserialize(value).map_err(|err| AssemblyError::Malformed(err.to_string()))
    }

    pub fn is_empty(&self) -> bool {
        self.raw_html.is_none()
            && self.cleaned_html.is_none()
            && self.extracted_data.is_none()
            && self.parser_code.is_none()
    }

    /// Intelligent tier requires both the marker and actual extracted data.
    pub fn is_intelligent_tier(&self) -> bool {
        self.intelligent && self.extracted_data.is_some()
    }

    pub fn tier(&self) -> Option<ResultTier> {
        if self.is_intelligent_tier() {
            Some(ResultTier::IntelligentExtraction)
        } else if self.extracted_data.is_some() {
            Some(ResultTier::BasicExtraction)
        } else if self.cleaned_html.is_some() {
            Some(ResultTier::CleanedHtml)
        } else if self.raw_html.is_some() {
            Some(ResultTier::RawHtml)
        } else {
            None
        }
    }

    /// Build a finished result from this fragment alone.
    pub fn into_result(self) -> ExtractionResult {
        let intelligent = self.is_intelligent_tier();
        ExtractionResult {
            raw_html: self.raw_html,
            cleaned_html: self.cleaned_html,
            extracted_data: self.extracted_data,
            parser_code: self.parser_code,
            intelligent,
            failure: None,
        }
    }
}

impl From<&ExtractionResult> for ResultFragment {
    fn from(result: &ExtractionResult) -> Self {
        Self {
            raw_html: result.raw_html.clone(),
            cleaned_html: result.cleaned_html.clone(),
            extracted_data: result.extracted_data.clone(),
            parser_code: result.parser_code.clone(),
            intelligent: result.intelligent,
        }
    }
}
