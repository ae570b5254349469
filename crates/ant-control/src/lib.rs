//! Antenna Switch Control Loops
//!
//! This crate provides the runtime side of the antenna switch
//! controller: the restartable tasks that talk to the station, the
//! policies that decide when switching is safe, and the wiring tables
//! that turn a band or direction into relay actions.
//!
//! # Architecture
//!
//! Two independent feeds drive the controller:
//!
//! - The **serial link** ([`serial::SerialLink`]) polls the K3S
//!   transceiver and reports transmit state, antenna selection, and
//!   the dial band.
//! - The **remote-control coordinator** ([`remote::RemoteControl`])
//!   listens for N1MM rotor and radio broadcasts and runs the
//!   band-change handshake.
//!
//! Both emit events over `mpsc` channels and run inside a
//! [`task::RestartableTask`], so reconnection and reconfiguration are
//! always "cancel the run, start a new one". The owner merges the two
//! event streams, applies the [`lockout::Lockout`] transmit-inhibit
//! policy, looks relay actions up in the [`wiring::Wiring`] table, and
//! drives a [`relay::RelayControl`] implementation.

pub mod error;
pub mod events;
pub mod lockout;
pub mod relay;
pub mod remote;
pub mod serial;
pub mod task;
pub mod wiring;

pub use error::ControlError;
pub use events::{BandChangeRequest, RemoteEvent, SerialEvent};
pub use lockout::{Lockout, ReenableToken, BAND_CHANGE_DEBOUNCE, QUIESCENCE};
pub use relay::{LoopbackRelays, RelayControl, RelayEvent};
pub use remote::{RemoteConfig, RemoteControl};
pub use serial::{SerialConfig, SerialLink, DEFAULT_BAUD};
pub use task::RestartableTask;
pub use wiring::{
    BandWiring, Direction, DirectionalWiring, RelayActions, SwitchedWiring, Wiring, WiringError,
};
