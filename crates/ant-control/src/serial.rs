//! Serial link loop for the K3S transceiver
//!
//! One [`RestartableTask`] run per connection attempt: open the port,
//! announce with the auto-info record, then sit in a steady loop that
//! interleaves a 200ms display poll with blocking reads through the
//! [`K3sCodec`]. An unrecoverable I/O error emits a single
//! [`SerialEvent::Disconnected`] and ends the run; the loop never
//! retries internally, reconnection comes from the owner calling
//! [`SerialLink::restart`] again.

use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::Poll;
use std::time::Duration;

use ant_protocol::k3s::{K3sCodec, K3sMessage, INIT_RECORD, KEEPALIVE_RECORD};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_serial::SerialPortBuilderExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::ControlError;
use crate::events::SerialEvent;
use crate::task::RestartableTask;

/// Keep-alive (display poll) cadence
const KEEPALIVE_INTERVAL: Duration = Duration::from_millis(200);

/// Delay before reopening the port on any run after the first, so a
/// flapping link does not churn the rig's serial interface
const SETTLE_DELAY: Duration = Duration::from_secs(2);

/// K3S default serial rate
pub const DEFAULT_BAUD: u32 = 38_400;

/// Serial link configuration for one run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialConfig {
    /// Port name, e.g. `/dev/ttyUSB0` or `COM3`
    pub port: String,
    /// Baud rate
    pub baud: u32,
}

impl SerialConfig {
    /// Configuration for `port` at the rig's default rate
    pub fn new(port: impl Into<String>) -> Self {
        Self {
            port: port.into(),
            baud: DEFAULT_BAUD,
        }
    }
}

/// Handle owning the serial link's restartable run
pub struct SerialLink {
    task: RestartableTask,
    events: mpsc::Sender<SerialEvent>,
    started: AtomicBool,
}

impl SerialLink {
    /// Create an idle link that will emit events on `events`
    pub fn new(events: mpsc::Sender<SerialEvent>) -> Self {
        Self {
            task: RestartableTask::new("serial-link"),
            events,
            started: AtomicBool::new(false),
        }
    }

    /// (Re)connect to `config`, stopping any current run first
    pub async fn restart(&self, config: SerialConfig) {
        let events = self.events.clone();
        let settle = self.started.swap(true, Ordering::Relaxed);
        self.task
            .restart(move |token| run(config, events, settle, token))
            .await;
    }

    /// Disconnect and stay idle
    pub async fn cancel(&self) {
        self.task.cancel().await;
    }
}

async fn run(
    config: SerialConfig,
    events: mpsc::Sender<SerialEvent>,
    settle: bool,
    token: CancellationToken,
) {
    if settle {
        tokio::select! {
            _ = token.cancelled() => return,
            _ = tokio::time::sleep(SETTLE_DELAY) => {}
        }
    }

    let io = match tokio_serial::new(&config.port, config.baud).open_native_async() {
        Ok(io) => io,
        Err(e) => {
            warn!(port = %config.port, "failed to open serial port: {e}");
            let _ = events.send(SerialEvent::Disconnected).await;
            return;
        }
    };
    info!(port = %config.port, baud = config.baud, "serial link up");

    match steady_loop(io, &events, &token).await {
        Ok(()) => debug!(port = %config.port, "serial run cancelled"),
        Err(ControlError::ChannelClosed) => {}
        Err(e) => {
            warn!(port = %config.port, "serial link lost: {e}");
            let _ = events.send(SerialEvent::Disconnected).await;
        }
    }
}

/// Announce, then poll and read until cancellation or link failure
///
/// Generic over the transport so tests can drive it with an in-memory
/// duplex stream.
async fn steady_loop<T>(
    mut io: T,
    events: &mpsc::Sender<SerialEvent>,
    token: &CancellationToken,
) -> Result<(), ControlError>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    io.write_all(INIT_RECORD).await?;

    let mut codec = K3sCodec::new();
    let mut buf = [0u8; 64];
    let mut keepalive = tokio::time::interval(KEEPALIVE_INTERVAL);
    keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = token.cancelled() => return Ok(()),

            _ = keepalive.tick() => {
                match poll_write_once(&mut io, KEEPALIVE_RECORD).await {
                    Some(result) => { result?; }
                    // No transmit buffer space; skip this cycle.
                    None => debug!("keep-alive skipped, transmit buffer full"),
                }
            }

            read = io.read(&mut buf) => {
                let n = read?;
                if n == 0 {
                    return Err(std::io::Error::from(std::io::ErrorKind::UnexpectedEof).into());
                }
                codec.push_bytes(&buf[..n]);
                while let Some(msg) = codec.next_message() {
                    let event = match msg {
                        K3sMessage::Transmit(tx) => SerialEvent::Transmit(tx),
                        K3sMessage::Display { antenna, band } => {
                            SerialEvent::Display { antenna, band }
                        }
                    };
                    events
                        .send(event)
                        .await
                        .map_err(|_| ControlError::ChannelClosed)?;
                }
            }
        }
    }
}

/// Attempt one write without waiting for transmit buffer space
///
/// Returns `None` when the write would block, the caller's cue to skip
/// a keep-alive cycle rather than stall the read side.
async fn poll_write_once<W>(io: &mut W, data: &[u8]) -> Option<std::io::Result<usize>>
where
    W: AsyncWrite + Unpin,
{
    std::future::poll_fn(|cx| match Pin::new(&mut *io).poll_write(cx, data) {
        Poll::Ready(result) => Poll::Ready(Some(result)),
        Poll::Pending => Poll::Ready(None),
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use ant_protocol::{Antenna, Band};
    use tokio::io::duplex;

    #[tokio::test]
    async fn test_announces_and_polls() {
        let (near, mut far) = duplex(256);
        let (tx, _rx) = mpsc::channel(16);
        let token = CancellationToken::new();

        let loop_token = token.clone();
        let handle = tokio::spawn(async move { steady_loop(near, &tx, &loop_token).await });

        // The announce goes out first, then the first keep-alive tick
        // fires immediately; both may land in one read.
        let mut seen = Vec::new();
        let mut wire = [0u8; 16];
        while seen.len() < INIT_RECORD.len() + KEEPALIVE_RECORD.len() {
            let n = far.read(&mut wire).await.unwrap();
            seen.extend_from_slice(&wire[..n]);
        }
        assert!(seen.starts_with(INIT_RECORD));
        assert_eq!(&seen[INIT_RECORD.len()..], KEEPALIVE_RECORD);

        token.cancel();
        assert!(handle.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_decodes_records_into_events() {
        let (near, mut far) = duplex(256);
        let (tx, mut rx) = mpsc::channel(16);
        let token = CancellationToken::new();

        let loop_token = token.clone();
        let handle = tokio::spawn(async move { steady_loop(near, &tx, &loop_token).await });

        far.write_all(b"TQ1;TQ0;FA00014250000;").await.unwrap();
        assert_eq!(rx.recv().await, Some(SerialEvent::Transmit(true)));
        assert_eq!(rx.recv().await, Some(SerialEvent::Transmit(false)));

        // Display record split across two writes.
        let mut ds = b"DS".to_vec();
        ds.extend_from_slice(b"@1425050");
        ds[7] |= 0x80; // decimal flag leaves a two-digit trailing group
        far.write_all(&ds).await.unwrap();
        far.write_all(&[0x20, 0x00, b';']).await.unwrap();
        assert_eq!(
            rx.recv().await,
            Some(SerialEvent::Display {
                antenna: Antenna::Antenna2,
                band: Some(Band::Band20M),
            })
        );

        token.cancel();
        assert!(handle.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_peer_close_is_link_failure() {
        let (near, mut far) = duplex(256);
        let (tx, _rx) = mpsc::channel(16);
        let token = CancellationToken::new();

        let handle = tokio::spawn(async move { steady_loop(near, &tx, &token).await });

        // Drain the announce then hang up.
        let mut wire = vec![0u8; 16];
        let _ = far.read(&mut wire).await.unwrap();
        drop(far);

        let result = handle.await.unwrap();
        assert!(matches!(result, Err(ControlError::Io(_))));
    }
}
