use thiserror::Error;

/// Errors raised while validating options, decoding, operating on or
/// encoding an image
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransformError {
    #[error("no operations specified")]
    NoOperations,

    #[error("operation not supported: {0}")]
    UnknownOperation(String),

    #[error("{0}")]
    InvalidParameter(String),

    #[error("invalid image size: {width}x{height}")]
    InvalidGeometry { width: u32, height: u32 },

    #[error("failed to decode image: {0}")]
    Decode(String),

    #[error("failed to encode {format}: {message}")]
    Encode {
        format: &'static str,
        message: String,
    },

    #[error("format not supported: {0}")]
    UnsupportedFormat(String),
}

impl TransformError {
    pub fn encode(format: &'static str, message: impl ToString) -> Self {
        TransformError::Encode {
            format,
            message: message.to_string(),
        }
    }

    /// Errors caused by the request rather than the image or the codec
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            TransformError::NoOperations
                | TransformError::UnknownOperation(_)
                | TransformError::InvalidParameter(_)
        )
    }
}
