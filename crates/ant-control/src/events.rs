//! Event types emitted by the control loops
//!
//! The serial link and the remote-control coordinator each emit their
//! own stream over an `mpsc` channel. No ordering holds across the two
//! streams; the owner resolves conflicts with the lockout policy and
//! the band-change acknowledgement gate.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use ant_protocol::{Antenna, Band};

/// Status events from the serial link loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SerialEvent {
    /// Transmit state changed: true while the rig is keyed
    Transmit(bool),
    /// Display poll decoded: selected antenna and, when the display
    /// showed an in-band frequency, the dial band
    Display {
        antenna: Antenna,
        band: Option<Band>,
    },
    /// The link failed; emitted exactly once per run, after which the
    /// run has exited and an external restart drives reconnection
    Disconnected,
}

/// A remote request to change the selected band
///
/// The coordinator blocks on [`RemoteControl::acknowledge`] after
/// emitting this, so the owner can finish asynchronous work (page
/// navigation, relay actuation) before the coordinator proceeds.
/// Calling [`veto`](BandChangeRequest::veto) before acknowledging
/// suppresses the follow-up direction notification.
///
/// [`RemoteControl::acknowledge`]: crate::remote::RemoteControl::acknowledge
#[derive(Debug)]
pub struct BandChangeRequest {
    band: Band,
    cancel: Arc<AtomicBool>,
}

impl BandChangeRequest {
    pub(crate) fn new(band: Band) -> Self {
        Self {
            band,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// The requested band
    pub fn band(&self) -> Band {
        self.band
    }

    /// Decline the change; the coordinator skips the direction
    /// follow-up for this request
    pub fn veto(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    pub(crate) fn cancel_flag(&self) -> Arc<AtomicBool> {
        self.cancel.clone()
    }
}

/// Events from the remote-control coordinator
#[derive(Debug)]
pub enum RemoteEvent {
    /// N1MM requested a band change (from either the rotor or the
    /// radio feed); must be acknowledged via the coordinator's gate
    /// when it came from the rotor feed
    BandChange(BandChangeRequest),
    /// Rotor direction for a band, sent after an unvetoed rotor
    /// band change was acknowledged
    DirectionChange { band: Band, azimuth: f64 },
}
