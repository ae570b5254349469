//! Error types for the control loops

use thiserror::Error;

/// Errors that terminate a control-loop run
///
/// These never escape to the owner as results; a run reports them by
/// emitting a disconnect event and exiting. Reconnection is external
/// policy via restart.
#[derive(Debug, Error)]
pub enum ControlError {
    /// I/O error on the serial link or a UDP socket
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serial port open/configuration error
    #[error("serial port error: {0}")]
    Serial(#[from] tokio_serial::Error),

    /// The owner dropped its event receiver
    #[error("event channel closed")]
    ChannelClosed,
}
