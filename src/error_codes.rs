use std::fmt;

use anyhow::Error;
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CodedErrorKind {
    /// Bad flags, config values or input files the user can fix.
    Usage,
    /// The external media collaborator (ffmpeg/ffprobe) failed.
    Media,
}

#[derive(Debug, Clone)]
pub struct CodedError {
    pub code: &'static str,
    pub message: String,
    pub details: Option<Value>,
    pub kind: CodedErrorKind,
}

impl CodedError {
    pub fn usage(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(CodedErrorKind::Usage, code, message)
    }

    pub fn media(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(CodedErrorKind::Media, code, message)
    }

    fn new(kind: CodedErrorKind, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
            kind,
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn envelope(&self) -> ErrorEnvelope {
        ErrorEnvelope {
            ok: false,
            error: ErrorEnvelopeBody {
                code: self.code.to_owned(),
                kind: self.kind,
                message: self.message.clone(),
                details: self.details.clone(),
            },
        }
    }
}

impl fmt::Display for CodedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for CodedError {}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorEnvelope {
    pub ok: bool,
    pub error: ErrorEnvelopeBody,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorEnvelopeBody {
    pub code: String,
    pub kind: CodedErrorKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

pub fn find_coded_error(error: &Error) -> Option<&CodedError> {
    error
        .chain()
        .find_map(|cause| cause.downcast_ref::<CodedError>())
}

/// Envelope for any error: the coded error in the chain when there is one,
/// otherwise a generic `INTERNAL_ERROR` carrying the full context chain.
pub fn envelope_for(error: &Error) -> ErrorEnvelope {
    match find_coded_error(error) {
        Some(coded) => coded.envelope(),
        None => ErrorEnvelope {
            ok: false,
            error: ErrorEnvelopeBody {
                code: "INTERNAL_ERROR".to_owned(),
                kind: CodedErrorKind::Usage,
                message: format!("{error:#}"),
                details: None,
            },
        },
    }
}

#[cfg(test)]
mod tests {
    use anyhow::{anyhow, Context};
    use serde_json::json;

    use super::{envelope_for, find_coded_error, CodedError};

    #[test]
    fn coded_error_is_found_through_context() {
        let error = Err::<(), _>(anyhow!(CodedError::usage("BAD_MODE", "bad mode")))
            .context("while loading config")
            .unwrap_err();
        let coded = find_coded_error(&error).expect("coded error in chain");
        assert_eq!(coded.code, "BAD_MODE");
    }

    #[test]
    fn envelope_serialises_code_and_details() {
        let error = anyhow!(CodedError::media("FFMPEG_FAILED", "exit 1").with_details(json!({"status": 1})));
        let value = serde_json::to_value(envelope_for(&error)).expect("envelope serialises");
        assert_eq!(value["ok"], false);
        assert_eq!(value["error"]["code"], "FFMPEG_FAILED");
        assert_eq!(value["error"]["kind"], "media");
        assert_eq!(value["error"]["details"]["status"], 1);
    }

    #[test]
    fn uncoded_errors_get_generic_envelope() {
        let error = anyhow!("disk full");
        assert_eq!(envelope_for(&error).error.code, "INTERNAL_ERROR");
    }
}
