//! N1MM remote-control coordinator
//!
//! Merges the rotor feed (port 12040) and the radio feed (port 12060)
//! into one run, filtering for the configured rotor name and radio
//! unit. A rotor match runs the band-change handshake: emit the
//! request, block on the acknowledgement gate until the owner has
//! applied the change, then (unless vetoed) report the new direction.
//!
//! The gate is a zero-permit semaphore. The run drains stale permits
//! *before* emitting the request, so an owner that acknowledges
//! synchronously, before this run ever reaches its wait, still
//! satisfies exactly that wait and nothing else. There is no timeout
//! on the wait; a hung owner is unstuck only by cancelling the run.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;

use ant_protocol::n1mm::{RadioMessage, RotorMessage, RADIO_PORT, ROTOR_PORT};
use ant_protocol::Radio;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::events::{BandChangeRequest, RemoteEvent};
use crate::task::RestartableTask;

/// Remote-control configuration for one run
///
/// Any live change (new rotor name, different radio, rebind address)
/// is applied by restarting; no in-flight state survives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteConfig {
    /// Local address both UDP listeners bind on
    pub address: IpAddr,
    /// Rotor name this station answers to in `<rotor>` elements
    pub rotor_name: String,
    /// Which N1MM radio unit to follow
    pub radio: Radio,
    /// Rotor feed port
    pub rotor_port: u16,
    /// Radio feed port
    pub radio_port: u16,
}

impl RemoteConfig {
    /// Configuration with the stock N1MM ports
    pub fn new(address: IpAddr, rotor_name: impl Into<String>, radio: Radio) -> Self {
        Self {
            address,
            rotor_name: rotor_name.into(),
            radio,
            rotor_port: ROTOR_PORT,
            radio_port: RADIO_PORT,
        }
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), "rotor", Radio::Radio1)
    }
}

/// Handle owning the coordinator's restartable run and its gate
pub struct RemoteControl {
    task: RestartableTask,
    events: mpsc::Sender<RemoteEvent>,
    gate: Arc<Semaphore>,
}

impl RemoteControl {
    /// Create an idle coordinator emitting on `events`
    pub fn new(events: mpsc::Sender<RemoteEvent>) -> Self {
        Self {
            task: RestartableTask::new("remote-control"),
            events,
            gate: Arc::new(Semaphore::new(0)),
        }
    }

    /// (Re)start listening with `config`, stopping any current run
    pub async fn restart(&self, config: RemoteConfig) {
        let events = self.events.clone();
        let gate = self.gate.clone();
        self.task
            .restart(move |token| run(config, events, gate, token))
            .await;
    }

    /// Stop listening and stay idle
    pub async fn cancel(&self) {
        self.task.cancel().await;
    }

    /// Signal that a band-change request has been applied
    ///
    /// Safe to call before the coordinator reaches its wait; the
    /// signal is stored and consumed by exactly one wait.
    pub fn acknowledge(&self) {
        self.gate.add_permits(1);
    }
}

async fn run(
    config: RemoteConfig,
    events: mpsc::Sender<RemoteEvent>,
    gate: Arc<Semaphore>,
    token: CancellationToken,
) {
    let rotor_sock = match UdpSocket::bind(SocketAddr::new(config.address, config.rotor_port)).await
    {
        Ok(sock) => sock,
        Err(e) => {
            warn!(port = config.rotor_port, "failed to bind rotor feed: {e}");
            return;
        }
    };
    let radio_sock = match UdpSocket::bind(SocketAddr::new(config.address, config.radio_port)).await
    {
        Ok(sock) => sock,
        Err(e) => {
            warn!(port = config.radio_port, "failed to bind radio feed: {e}");
            return;
        }
    };
    info!(
        rotor = %config.rotor_name,
        radio = %config.radio,
        "remote control listening on {}:{}/{}",
        config.address, config.rotor_port, config.radio_port
    );

    let mut rotor_buf = vec![0u8; 2048];
    let mut radio_buf = vec![0u8; 2048];
    loop {
        tokio::select! {
            _ = token.cancelled() => return,

            received = next_rotor(&rotor_sock, &mut rotor_buf) => {
                let message = match received {
                    Ok(message) => message,
                    Err(e) => {
                        warn!("rotor feed failed: {e}");
                        return;
                    }
                };
                if message.name != config.rotor_name {
                    trace!(name = %message.name, "rotor message for another rotor");
                    continue;
                }
                match handle_rotor(message, &events, &gate, &token).await {
                    Ok(()) => {}
                    Err(RunExit) => return,
                }
            }

            received = next_radio(&radio_sock, &mut radio_buf) => {
                let message = match received {
                    Ok(message) => message,
                    Err(e) => {
                        warn!("radio feed failed: {e}");
                        return;
                    }
                };
                if message.radio != config.radio {
                    continue;
                }
                let band = match message.band() {
                    Ok(band) => band,
                    Err(e) => {
                        // Out-of-band dial frequency; nothing to switch to.
                        debug!("radio report ignored: {e}");
                        continue;
                    }
                };
                debug!(%band, "radio band change");
                // No handshake on the radio path: the report is
                // informational, there is no rotor motion to follow.
                let request = BandChangeRequest::new(band);
                if events.send(RemoteEvent::BandChange(request)).await.is_err() {
                    return;
                }
            }
        }
    }
}

/// Run exit marker for the handshake path
struct RunExit;

async fn handle_rotor(
    message: RotorMessage,
    events: &mpsc::Sender<RemoteEvent>,
    gate: &Semaphore,
    token: &CancellationToken,
) -> Result<(), RunExit> {
    debug!(band = %message.band, azimuth = message.azimuth, "rotor band change");

    // Arm the gate before emitting: discard stale acknowledgements so
    // only one issued for *this* request can satisfy the wait, and an
    // owner that acknowledges before we get here cannot deadlock us.
    while let Ok(stale) = gate.try_acquire() {
        stale.forget();
    }

    let request = BandChangeRequest::new(message.band);
    let vetoed = request.cancel_flag();
    if events.send(RemoteEvent::BandChange(request)).await.is_err() {
        return Err(RunExit);
    }

    tokio::select! {
        _ = token.cancelled() => return Err(RunExit),
        permit = gate.acquire() => match permit {
            // Consume the permit: the gate auto-resets for the next
            // handshake.
            Ok(permit) => permit.forget(),
            Err(_) => return Err(RunExit),
        }
    }

    if !vetoed.load(std::sync::atomic::Ordering::SeqCst) {
        let event = RemoteEvent::DirectionChange {
            band: message.band,
            azimuth: message.azimuth,
        };
        if events.send(event).await.is_err() {
            return Err(RunExit);
        }
    }
    Ok(())
}

/// Receive until one datagram parses as a rotor message
///
/// Both N1MM ports carry unrelated traffic; failing to parse is the
/// steady state and the datagram is simply dropped.
async fn next_rotor(sock: &UdpSocket, buf: &mut [u8]) -> std::io::Result<RotorMessage> {
    loop {
        let (n, _) = sock.recv_from(buf).await?;
        match RotorMessage::parse(&buf[..n]) {
            Ok(message) => return Ok(message),
            Err(e) => trace!("dropping rotor-port datagram: {e}"),
        }
    }
}

/// Receive until one datagram parses as a radio message
async fn next_radio(sock: &UdpSocket, buf: &mut [u8]) -> std::io::Result<RadioMessage> {
    loop {
        let (n, _) = sock.recv_from(buf).await?;
        match RadioMessage::parse(&buf[..n]) {
            Ok(message) => return Ok(message),
            Err(e) => trace!("dropping radio-port datagram: {e}"),
        }
    }
}
