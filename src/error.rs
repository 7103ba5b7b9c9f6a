use thiserror::Error;

/// Result type for receiver operations
pub type Result<T> = std::result::Result<T, ReceiverError>;

/// Errors that can occur when talking to a Sony AV receiver
#[derive(Error, Debug)]
pub enum ReceiverError {
    /// No host on the local network accepted a connection on the control port
    #[error("No device found on {network}")]
    NoDeviceFound {
        /// The /24 network that was scanned, e.g. "192.168.1.0/24"
        network: String,
    },

    /// A command or table key that the frame tables do not know
    #[error("Unknown command kind: {0}")]
    UnknownCommandKind(String),

    /// Sending a single command frame failed
    #[error("Failed to send command to {addr}: {source}")]
    SendFailed {
        /// Address of the receiver
        addr: String,
        /// Underlying connect or write error
        #[source]
        source: std::io::Error,
    },

    /// The feedback connection failed; recovered by reconnecting
    #[error("Feedback connection error: {0}")]
    FeedbackConnection(std::io::Error),

    /// A feedback chunk that none of the decoders recognized
    #[error("Unrecognized frame: {0:02X?}")]
    UnrecognizedFrame(Vec<u8>),

    /// The local IPv4 address could not be determined
    #[error("Cannot determine local address: {0}")]
    LocalAddress(std::io::Error),

    /// The change stream was closed
    #[error("Connection closed")]
    ConnectionClosed,

    /// Channel receive error
    #[error("Channel error: {0}")]
    ChannelError(String),
}
