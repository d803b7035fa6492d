use thiserror::Error;

/// Errors surfaced at the broker boundary.
///
/// `NotConnected` is the steady-state error every connection-requiring
/// operation reports; the rest describe a failed attempt to change or use a
/// live connection. None of these are retried automatically by this tool.
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("not connected to a broker")]
    NotConnected,
    #[error("already connected to a broker")]
    AlreadyConnected,
    #[error("connection to {endpoint} timed out")]
    Timeout { endpoint: String },
    #[error("could not reach {endpoint}: {reason}")]
    Handshake { endpoint: String, reason: String },
    #[error("TLS connections are currently unsupported")]
    TlsUnsupported,
    #[error("connection closed while sending")]
    ChannelClosed,
    #[error("failed to encode frame: {0}")]
    Encode(String),
}
