use thiserror::Error;

/// Core error type for genai.
/// Internally, modules can use `anyhow::Result<T>` for convenience,
/// but public boundaries should expose `CoreResult<T>` with this error.
#[derive(Debug, Error)]
pub enum GenAiError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("rate limited by service")]
    RateLimited { retry_after: Option<u64> },

    #[error("service unavailable")]
    Unavailable,

    #[error("api error: {code} {message}")]
    Api { code: String, message: String },

    #[error("request blocked: {reason}")]
    Blocked { reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl GenAiError {
    /// Duplicate an error for fan-out: the streaming pump must surface the
    /// same failure on both the chunk stream and the final-response handle.
    /// Structured variants copy losslessly; `Io`/`Other` degrade to a
    /// stringified `Other`.
    pub(crate) fn fanout_copy(&self) -> Self {
        match self {
            Self::Validation(msg) => Self::Validation(msg.clone()),
            Self::RateLimited { retry_after } => Self::RateLimited {
                retry_after: *retry_after,
            },
            Self::Unavailable => Self::Unavailable,
            Self::Api { code, message } => Self::Api {
                code: code.clone(),
                message: message.clone(),
            },
            Self::Blocked { reason } => Self::Blocked {
                reason: reason.clone(),
            },
            other => Self::Other(anyhow::anyhow!("{other}")),
        }
    }
}

pub type CoreResult<T> = std::result::Result<T, GenAiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fanout_copy_preserves_structured_variants() {
        let err = GenAiError::Api {
            code: "400".into(),
            message: "bad".into(),
        };
        match err.fanout_copy() {
            GenAiError::Api { code, message } => {
                assert_eq!(code, "400");
                assert_eq!(message, "bad");
            }
            other => panic!("expected Api, got: {other:?}"),
        }

        let err = GenAiError::RateLimited {
            retry_after: Some(3),
        };
        match err.fanout_copy() {
            GenAiError::RateLimited { retry_after } => assert_eq!(retry_after, Some(3)),
            other => panic!("expected RateLimited, got: {other:?}"),
        }
    }

    #[test]
    fn fanout_copy_stringifies_other() {
        let err = GenAiError::Other(anyhow::anyhow!("boom"));
        match err.fanout_copy() {
            GenAiError::Other(e) => assert!(e.to_string().contains("boom")),
            other => panic!("expected Other, got: {other:?}"),
        }
    }
}
