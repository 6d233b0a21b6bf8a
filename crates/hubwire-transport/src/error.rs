/// Errors that can occur on the physical transport.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The physical write was rejected by the underlying stack.
    #[error("characteristic write failed: {0}")]
    Write(String),

    /// The device is no longer connected.
    #[error("transport disconnected")]
    Disconnected,

    /// An I/O error occurred on the transport.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, TransportError>;
