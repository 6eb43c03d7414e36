//! Error types for peerdrop

use thiserror::Error;

/// Result type alias for peerdrop operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while negotiating a peer session or moving files
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid configuration parameter
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Send attempted on a channel that is absent or not open
    #[error("Data channel not ready: {0}")]
    ChannelNotReady(String),

    /// Channel closed while a transfer was in progress
    #[error("Data channel closed: {0}")]
    ChannelClosed(String),

    /// Inbound text frame was not valid transfer metadata
    #[error("Metadata parse error: {0}")]
    MetadataParse(String),

    /// Frame arrived that the receive cursor cannot accept in its current mode
    #[error("Unexpected frame: {0}")]
    UnexpectedFrame(String),

    /// An offer arrived (or a connect was requested) while a session is active
    #[error("Peer session busy: {0}")]
    SessionBusy(String),

    /// Signaling message that does not fit the current negotiation state
    #[error("Unexpected signaling message: {0}")]
    UnexpectedSignal(String),

    /// Connect target is not in the current registry snapshot
    #[error("Unknown peer: {0}")]
    UnknownPeer(String),

    /// Operation requires a peer session but none exists
    #[error("No active peer session")]
    NoSession,

    /// Peer connection creation or teardown failed
    #[error("Peer connection error: {0}")]
    PeerConnection(String),

    /// SDP negotiation error
    #[error("SDP negotiation error: {0}")]
    Sdp(String),

    /// ICE candidate error
    #[error("ICE candidate error: {0}")]
    IceCandidate(String),

    /// Relay connection error
    #[error("Signaling error: {0}")]
    Signaling(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Received file name cannot be turned into a safe local path
    #[error("Invalid file name: {0:?}")]
    InvalidFileName(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Check if this error belongs to a single transfer (never to the session)
    pub fn is_transfer_error(&self) -> bool {
        matches!(
            self,
            Error::ChannelNotReady(_)
                | Error::ChannelClosed(_)
                | Error::MetadataParse(_)
                | Error::UnexpectedFrame(_)
                | Error::InvalidFileName(_)
        )
    }

    /// Check if this error came out of negotiation or relay traffic
    pub fn is_signaling_error(&self) -> bool {
        matches!(
            self,
            Error::SessionBusy(_)
                | Error::UnexpectedSignal(_)
                | Error::UnknownPeer(_)
                | Error::NoSession
                | Error::Sdp(_)
                | Error::IceCandidate(_)
                | Error::Signaling(_)
        )
    }

    /// Check if this error is a configuration error
    pub fn is_config_error(&self) -> bool {
        matches!(self, Error::InvalidConfig(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::ChannelNotReady("fileTransfer".to_string());
        assert_eq!(err.to_string(), "Data channel not ready: fileTransfer");
    }

    #[test]
    fn test_error_classification() {
        assert!(Error::MetadataParse("x".to_string()).is_transfer_error());
        assert!(!Error::MetadataParse("x".to_string()).is_signaling_error());
        assert!(Error::SessionBusy("abc".to_string()).is_signaling_error());
        assert!(Error::NoSession.is_signaling_error());
        assert!(Error::InvalidConfig("x".to_string()).is_config_error());
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err = Error::from(io_err);
        assert!(matches!(err, Error::Io(_)));
    }
}
