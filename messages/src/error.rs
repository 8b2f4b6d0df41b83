use thiserror::Error;

#[derive(Debug, Error)]
pub enum MessageError {
    /// The payload is not a JSON object of the expected shape.
    #[error("malformed payload: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("invalid field {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },
}

impl MessageError {
    /// Whether the payload failed to parse at all, as opposed to parsing
    /// but failing the field check.
    pub fn is_malformed(&self) -> bool {
        matches!(self, Self::Malformed(_))
    }
}
