use thiserror::Error;

#[derive(Debug, Error)]
pub enum RedisStoreError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("unexpected reply to {command}: {reply}")]
    UnexpectedReply { command: &'static str, reply: i64 },
}

impl RedisStoreError {
    /// Whether the failure is about reaching Redis at all.
    pub fn is_unavailable(&self) -> bool {
        match self {
            Self::Redis(e) => {
                e.is_io_error() || e.is_connection_dropped() || e.is_connection_refusal() || e.is_timeout()
            }
            Self::UnexpectedReply { .. } => false,
        }
    }
}

impl From<RedisStoreError> for ballot_store::StoreError {
    fn from(e: RedisStoreError) -> Self {
        match e {
            RedisStoreError::UnexpectedReply { .. } => {
                ballot_store::StoreError::Protocol(e.to_string())
            }
            _ if e.is_unavailable() => ballot_store::StoreError::Unavailable(e.to_string()),
            _ => ballot_store::StoreError::Backend(e.to_string()),
        }
    }
}
