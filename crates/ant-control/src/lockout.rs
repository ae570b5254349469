//! Transmit inhibit and band-change debounce policy
//!
//! Switching relays while the amplifier is keyed is how contacts end
//! early. The policy is a pure state machine, no I/O and no timers of
//! its own: the owner feeds it transmit and band events and performs
//! the one sleep (the quiescence window) itself, which keeps the rules
//! deterministic under test.
//!
//! Re-enabling after transmit-end is guarded by a generation check
//! rather than the boolean state: a new transmit-begin inside the
//! quiescence window supersedes the pending re-enable even though the
//! "disabled" flag never changed. Band changes are additionally
//! debounced because the serial and remote feeds routinely report the
//! same change within milliseconds of each other.

use std::time::{Duration, Instant};

/// Quiet time required after transmit-end before switching re-enables
pub const QUIESCENCE: Duration = Duration::from_millis(100);

/// Minimum interval between accepted band changes
pub const BAND_CHANGE_DEBOUNCE: Duration = Duration::from_millis(200);

/// Proof of a particular transmit-end observation
///
/// Redeemable for re-enablement only while no newer transmit-begin has
/// superseded it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use = "hold the token across the quiescence window, then redeem it"]
pub struct ReenableToken {
    generation: u64,
}

/// Debounced transmit-inhibit state
#[derive(Debug)]
pub struct Lockout {
    enabled: bool,
    generation: u64,
    last_band_change: Option<Instant>,
}

impl Lockout {
    /// New policy, switching enabled
    pub fn new() -> Self {
        Self {
            enabled: true,
            generation: 0,
            last_band_change: None,
        }
    }

    /// Whether band switching is currently allowed
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// The rig keyed up: disable switching immediately
    pub fn transmit_started(&mut self) {
        self.enabled = false;
        self.generation += 1;
    }

    /// The rig unkeyed: returns a token the caller redeems with
    /// [`try_reenable`](Lockout::try_reenable) after waiting
    /// [`QUIESCENCE`]
    pub fn transmit_ended(&mut self) -> ReenableToken {
        ReenableToken {
            generation: self.generation,
        }
    }

    /// Redeem a quiesced transmit-end; returns whether switching was
    /// re-enabled
    ///
    /// Fails when a newer transmit-begin superseded the token, which
    /// is exactly the rapid key-chatter case the window exists for.
    pub fn try_reenable(&mut self, token: ReenableToken) -> bool {
        if token.generation == self.generation {
            self.enabled = true;
            true
        } else {
            false
        }
    }

    /// Whether to act on a band change observed at `now`
    ///
    /// Accepts only while enabled and at least
    /// [`BAND_CHANGE_DEBOUNCE`] after the last accepted change;
    /// acceptance records `now` as the new reference point.
    pub fn accept_band_change(&mut self, now: Instant) -> bool {
        if !self.enabled {
            return false;
        }
        if let Some(last) = self.last_band_change {
            if now.duration_since(last) < BAND_CHANGE_DEBOUNCE {
                return false;
            }
        }
        self.last_band_change = Some(now);
        true
    }
}

impl Default for Lockout {
    fn default() -> Self {
        Self::new()
    }
}
