//! Error taxonomy for sync units.
//!
//! Platform failures are classified into `PlatformErrorKind` by the client
//! adapter so the engine never inspects raw error strings. Soft no-ops
//! (bot left the channel, thread deleted) are handled inside the engine and
//! never surface as errors.

use std::fmt;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlatformErrorKind {
    /// The calling identity is not a member of the channel.
    NotInChannel,
    ThreadNotFound,
    ChannelNotFound,
    IsArchived,
    RateLimited,
    /// Network failure or malformed/empty upstream response.
    Transient,
    /// Any other platform error code.
    Other(String),
}

impl fmt::Display for PlatformErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlatformErrorKind::NotInChannel => write!(f, "not_in_channel"),
            PlatformErrorKind::ThreadNotFound => write!(f, "thread_not_found"),
            PlatformErrorKind::ChannelNotFound => write!(f, "channel_not_found"),
            PlatformErrorKind::IsArchived => write!(f, "is_archived"),
            PlatformErrorKind::RateLimited => write!(f, "rate_limited"),
            PlatformErrorKind::Transient => write!(f, "transient"),
            PlatformErrorKind::Other(code) => write!(f, "{}", code),
        }
    }
}

#[derive(Debug, Clone, Error)]
#[error("platform error ({kind}): {message}")]
pub struct PlatformError {
    pub kind: PlatformErrorKind,
    pub message: String,
}

impl PlatformError {
    pub fn new(kind: PlatformErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(PlatformErrorKind::Transient, message)
    }

    /// Missing remote objects will not reappear on retry.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self.kind,
            PlatformErrorKind::ChannelNotFound
                | PlatformErrorKind::ThreadNotFound
                | PlatformErrorKind::IsArchived
        )
    }
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("connector {0} not found")]
    ConnectorNotFound(String),

    #[error("channel {channel_id} not found for connector {connector_id}")]
    ChannelNotFound {
        connector_id: String,
        channel_id: String,
    },

    #[error(transparent)]
    Platform(#[from] PlatformError),

    #[error("store error: {0:#}")]
    Store(#[from] anyhow::Error),

    #[error("sync task failed: {0}")]
    Task(String),
}

impl SyncError {
    pub fn channel_not_found(connector_id: &str, channel_id: &str) -> Self {
        SyncError::ChannelNotFound {
            connector_id: connector_id.to_string(),
            channel_id: channel_id.to_string(),
        }
    }

    /// Whether the host should schedule another attempt of the failed unit.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::ConnectorNotFound(_) | SyncError::ChannelNotFound { .. } => false,
            SyncError::Platform(err) => err.is_retryable(),
            SyncError::Store(_) | SyncError::Task(_) => true,
        }
    }
}

pub type SyncResult<T> = std::result::Result<T, SyncError>;
