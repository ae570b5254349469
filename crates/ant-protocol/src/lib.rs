//! Antenna Switch Protocol Library
//!
//! This crate provides the pure, I/O-free halves of the antenna switch
//! controller:
//!
//! - **Band model**: the nine amateur bands, derivable from a
//!   frequency or from N1MM's fixed band codes
//! - **K3S serial protocol**: streaming `;`-terminated framer and
//!   decoders for the transmit (`TQ`) and display (`DS`) records
//! - **N1MM UDP payloads**: rotor steering and radio status XML
//!   messages
//!
//! All the async plumbing that drives these decoders lives in
//! `ant-control`.
//!
//! # Example
//!
//! ```rust
//! use ant_protocol::{Band, K3sCodec, K3sMessage};
//!
//! let mut codec = K3sCodec::new();
//! codec.push_bytes(b"TQ1;");
//!
//! assert_eq!(codec.next_message(), Some(K3sMessage::Transmit(true)));
//! assert_eq!(Band::from_frequency(14_250_000), Ok(Band::Band20M));
//! ```

pub mod band;
pub mod k3s;
pub mod n1mm;

pub use band::{Antenna, Band, BandError, Radio};
pub use k3s::{K3sCodec, K3sMessage};
pub use n1mm::{N1mmError, RadioMessage, RotorMessage, RADIO_PORT, ROTOR_PORT};
