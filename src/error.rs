/// Error type shared by the decoding stages, replay and CLI.
///
/// The public decode entry points never return these: nested decoders use
/// them internally to describe why a payload was skipped, then degrade to
/// "no metadata, original text preserved".
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("Truncated payload: <{tag}> is still streaming")]
    Truncated { tag: &'static str },
    #[error("Malformed <{tag}> payload: {source}")]
    Malformed {
        tag: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("Fallback found nothing in <{tag}> payload")]
    FallbackEmpty { tag: &'static str },
    #[error("Event error: {0}")]
    Event(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Broad failure category, mirroring the truncated / malformed / transport split.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeErrorKind {
    Truncated,
    Malformed,
    Transport,
}

impl DecodeError {
    #[must_use]
    pub fn kind(&self) -> DecodeErrorKind {
        match self {
            DecodeError::Truncated { .. } => DecodeErrorKind::Truncated,
            DecodeError::Malformed { .. } | DecodeError::FallbackEmpty { .. } => {
                DecodeErrorKind::Malformed
            }
            DecodeError::Event(_) | DecodeError::Io(_) => DecodeErrorKind::Transport,
        }
    }

    /// Whether waiting for more text could make this error go away.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.kind() == DecodeErrorKind::Truncated
    }
}
