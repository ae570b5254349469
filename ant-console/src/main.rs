//! Antenna Switch Console Controller
//!
//! Headless owner binary: wires the serial link and the N1MM
//! remote-control coordinator together, applies the transmit-inhibit
//! policy, and drives the relay bank from the band wiring table.

mod settings;

use std::path::PathBuf;
use std::time::Instant;

use ant_control::{
    BandWiring, Direction, Lockout, LoopbackRelays, ReenableToken, RelayControl, RemoteConfig,
    RemoteControl, RemoteEvent, SerialConfig, SerialEvent, SerialLink, Wiring, QUIESCENCE,
};
use ant_protocol::{Antenna, Band};
use anyhow::{anyhow, Context};
use settings::Settings;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Include all our crates in the default filter
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "antflip=info,ant_control=info,ant_protocol=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Antflip antenna switch controller");

    let explicit = std::env::args_os().nth(1).map(PathBuf::from);
    let (settings, settings_path) = Settings::load(explicit)?;
    let wiring_path = settings.wiring_path(&settings_path);
    let wiring = Wiring::load(&wiring_path)
        .with_context(|| format!("failed to load wiring from {}", wiring_path.display()))?;
    info!(
        relays = wiring.relay_count(),
        "wiring loaded for bands: {}",
        wiring
            .bands()
            .map(|b| b.label())
            .collect::<Vec<_>>()
            .join(", ")
    );

    let (serial_tx, serial_rx) = mpsc::channel(32);
    let (remote_tx, remote_rx) = mpsc::channel(32);
    let serial = SerialLink::new(serial_tx);
    let remote = RemoteControl::new(remote_tx);

    let serial_config = SerialConfig {
        port: settings.serial.port.clone(),
        baud: settings.serial.baud,
    };
    serial.restart(serial_config.clone()).await;
    remote
        .restart(RemoteConfig::new(
            settings.remote.address,
            settings.remote.rotor.clone(),
            settings.remote.radio()?,
        ))
        .await;

    let relays = Box::new(LoopbackRelays::new(wiring.relay_count()));
    let mut controller = Controller {
        wiring,
        lockout: Lockout::new(),
        relays,
        serial_config,
        band: None,
    };

    let result = run(&mut controller, &serial, &remote, serial_rx, remote_rx).await;

    serial.cancel().await;
    remote.cancel().await;
    result
}

struct Controller {
    wiring: Wiring,
    lockout: Lockout,
    relays: Box<dyn RelayControl>,
    serial_config: SerialConfig,
    /// Band the relays are currently set up for
    band: Option<Band>,
}

async fn run(
    controller: &mut Controller,
    serial: &SerialLink,
    remote: &RemoteControl,
    mut serial_rx: mpsc::Receiver<SerialEvent>,
    mut remote_rx: mpsc::Receiver<RemoteEvent>,
) -> anyhow::Result<()> {
    let quiesce = tokio::time::sleep(QUIESCENCE);
    tokio::pin!(quiesce);
    let mut pending: Option<ReenableToken> = None;

    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result.context("failed to listen for shutdown signal")?;
                info!("shutting down");
                return Ok(());
            }

            _ = quiesce.as_mut(), if pending.is_some() => {
                if let Some(token) = pending.take() {
                    if controller.lockout.try_reenable(token) {
                        info!("band switching re-enabled");
                    }
                }
            }

            event = serial_rx.recv() => {
                let event = event.ok_or_else(|| anyhow!("serial event stream ended"))?;
                match event {
                    SerialEvent::Transmit(true) => {
                        info!("transmitting, band switching inhibited");
                        controller.lockout.transmit_started();
                        pending = None;
                    }
                    SerialEvent::Transmit(false) => {
                        debug!("transmit ended, waiting out the quiescence window");
                        pending = Some(controller.lockout.transmit_ended());
                        quiesce.as_mut().reset(tokio::time::Instant::now() + QUIESCENCE);
                    }
                    SerialEvent::Display { antenna, band } => {
                        controller.display(antenna, band);
                    }
                    SerialEvent::Disconnected => {
                        warn!("serial link lost, reconnecting");
                        serial.restart(controller.serial_config.clone()).await;
                    }
                }
            }

            event = remote_rx.recv() => {
                let event = event.ok_or_else(|| anyhow!("remote event stream ended"))?;
                match event {
                    RemoteEvent::BandChange(request) => {
                        if controller.band == Some(request.band()) {
                            // Already selected; leave any steering in
                            // place and let the handshake continue.
                            debug!(band = %request.band(), "band already selected");
                        } else if controller.lockout.accept_band_change(Instant::now()) {
                            controller.enter_band(request.band());
                        } else {
                            debug!(band = %request.band(), "band change declined");
                            request.veto();
                        }
                        remote.acknowledge();
                    }
                    RemoteEvent::DirectionChange { band, azimuth } => {
                        controller.steer(band, azimuth);
                    }
                }
            }
        }
    }
}

impl Controller {
    /// Apply a display poll: antenna selection is informational, a
    /// newly decoded band drives switching like any other band change
    ///
    /// The display is polled every 200ms, so the same band arrives
    /// over and over in steady state; re-reports of the current band
    /// are no-ops so they cannot undo rotor steering.
    fn display(&mut self, antenna: Antenna, band: Option<Band>) {
        debug!(?antenna, ?band, "display update");
        if let Some(band) = band {
            if self.band == Some(band) {
                return;
            }
            if self.lockout.accept_band_change(Instant::now()) {
                self.enter_band(band);
            }
        }
    }

    /// Select a band's start position
    fn enter_band(&mut self, band: Band) {
        self.band = Some(band);
        let Some(wiring) = self.wiring.band(band) else {
            warn!(%band, "band is not wired, leaving relays alone");
            return;
        };
        let actions = match wiring {
            BandWiring::Directional(dir) => dir.start(),
            BandWiring::Switched(sw) => sw.start(),
        };
        if !self.relays.actuate(actions) {
            warn!(%band, "relay bank rejected actuation");
        }
        info!(%band, open = ?self.relays.open_relays(), "band selected");
    }

    /// Point a directional band's array; 360 and beyond parks it omni
    fn steer(&self, band: Band, azimuth: f64) {
        let Some(BandWiring::Directional(dir)) = self.wiring.band(band) else {
            debug!(%band, "no rotor wiring for band, direction ignored");
            return;
        };
        let actions = if azimuth >= 360.0 {
            info!(%band, "parking omnidirectional");
            &dir.omni
        } else {
            let direction = Direction::from_azimuth(azimuth);
            info!(%band, azimuth, ?direction, "steering");
            dir.for_direction(direction)
        };
        if !self.relays.actuate(actions) {
            warn!(%band, "relay bank rejected actuation");
        }
    }
}
