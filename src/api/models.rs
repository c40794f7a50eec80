//! Request payloads and JSON response bodies

use base64::Engine;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// URL-safe alphabet, padding optional
const PAYLOAD_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("missing payload")]
    Missing,
    #[error("invalid base64 payload: {0}")]
    Encoding(#[from] base64::DecodeError),
    #[error("invalid JSON payload: {0}")]
    Json(#[from] serde_json::Error),
    #[error("missing required field: url")]
    MissingUrl,
}

/// Document reference carried in the render path, as base64url JSON:
///
/// ```json
/// { "url": "https://files.example.com/report.pdf", "filename": "report.pdf" }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderPayload {
    #[serde(default)]
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
}

impl RenderPayload {
    pub fn decode(encoded: &str) -> Result<Self, PayloadError> {
        if encoded.is_empty() {
            return Err(PayloadError::Missing);
        }

        let raw = PAYLOAD_ENGINE.decode(encoded)?;
        let payload: RenderPayload = serde_json::from_slice(&raw)?;

        if payload.url.is_empty() {
            return Err(PayloadError::MissingUrl);
        }
        Ok(payload)
    }

    pub fn encode(&self) -> String {
        // Serializing a struct of strings cannot fail
        let json = serde_json::to_vec(self).unwrap_or_default();
        PAYLOAD_ENGINE.encode(json)
    }

    /// `Content-Disposition` value, when the payload names a file
    pub fn content_disposition(&self) -> Option<String> {
        let filename = self.filename.as_deref().filter(|name| !name.is_empty())?;
        let escaped = filename.replace('\\', "\\\\").replace('"', "\\\"");
        Some(format!("inline; filename=\"{escaped}\""))
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RootResponse {
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::{URL_SAFE, URL_SAFE_NO_PAD};

    #[test]
    fn test_decode_padded_and_unpadded() {
        let json = br#"{"url":"https://files.example.com/a.pdf","filename":"a.pdf"}"#;

        for encoded in [URL_SAFE.encode(json), URL_SAFE_NO_PAD.encode(json)] {
            let payload = RenderPayload::decode(&encoded).unwrap();
            assert_eq!(payload.url, "https://files.example.com/a.pdf");
            assert_eq!(payload.filename.as_deref(), Some("a.pdf"));
        }
    }

    #[test]
    fn test_decode_errors() {
        assert!(matches!(RenderPayload::decode(""), Err(PayloadError::Missing)));
        assert!(matches!(
            RenderPayload::decode("%%%"),
            Err(PayloadError::Encoding(_))
        ));
        assert!(matches!(
            RenderPayload::decode(&URL_SAFE.encode(b"not json")),
            Err(PayloadError::Json(_))
        ));
        assert!(matches!(
            RenderPayload::decode(&URL_SAFE.encode(br#"{"filename":"a.pdf"}"#)),
            Err(PayloadError::MissingUrl)
        ));
    }

    #[test]
    fn test_encode_round_trips() {
        let payload = RenderPayload {
            url: "https://files.example.com/a b.pdf?x=1".into(),
            filename: None,
        };
        assert_eq!(RenderPayload::decode(&payload.encode()).unwrap(), payload);
    }

    #[test]
    fn test_content_disposition() {
        let mut payload = RenderPayload {
            url: "u".into(),
            filename: Some("q\"1\".pdf".into()),
        };
        assert_eq!(
            payload.content_disposition().as_deref(),
            Some(r#"inline; filename="q\"1\".pdf""#)
        );

        payload.filename = Some(String::new());
        assert_eq!(payload.content_disposition(), None);
    }
}
