use extraction_logging::{extraction_debug, extraction_warn};
use thiserror::Error;

use crate::{ExtractionResult, ProgressEvent, ResultFragment};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AssemblyError {
    #[error("malformed result payload: {0}")]
    Malformed(String),
    #[error("unsupported payload shape for stage {stage}")]
    UnsupportedPayload { stage: String },
    #[error("no recognised result field in stage {stage}")]
    NoRecognisedField { stage: String },
}

/// Pure result assembly: folds one event into the current result.
///
/// Extracted data and parser code recorded by an intelligent-tier fragment are
/// never replaced by lower-tier data, whatever order the stages report in.
/// Failures keep everything gathered so far and tag the result with the
/// reason. Malformed partial payloads are logged and skipped.
pub fn apply(event: &ProgressEvent, current: ExtractionResult) -> ExtractionResult {
    match event {
        ProgressEvent::Queued { .. } | ProgressEvent::Running { .. } => current,
        ProgressEvent::PartialResult { stage, payload } => {
            match ResultFragment::from_partial(stage, payload) {
                Ok(fragment) => merge(current, fragment),
                Err(err) => {
                    extraction_warn!("Skipping partial result from stage {}: {}", stage, err);
                    current
                }
            }
        }
        ProgressEvent::Complete { result } => merge(current, ResultFragment::from(result)),
        ProgressEvent::Failed { reason } => ExtractionResult {
            failure: Some(reason.clone()),
            ..current
        },
    }
}

fn merge(mut current: ExtractionResult, fragment: ResultFragment) -> ExtractionResult {
    let incoming_intelligent = fragment.is_intelligent_tier();

    if let Some(raw_html) = fragment.raw_html {
        current.raw_html = Some(raw_html);
    }
    if let Some(cleaned_html) = fragment.cleaned_html {
        current.cleaned_html = Some(cleaned_html);
    }

    if incoming_intelligent || !current.intelligent {
        if let Some(data) = fragment.extracted_data {
            current.extracted_data = Some(data);
        }
        if let Some(code) = fragment.parser_code {
            current.parser_code = Some(code);
        }
    } else if fragment.extracted_data.is_some() || fragment.parser_code.is_some() {
        extraction_debug!("Keeping intelligent extraction over lower-tier data");
    }

    current.intelligent |= incoming_intelligent;
    current
}
