//! Elecraft K3S serial protocol
//!
//! The switch box listens to a K3S transceiver over its RS-232 CAT
//! port. Records are ASCII, `;`-terminated, with no length prefix. The
//! controller only understands two inbound records:
//!
//! - `TQ` (length 3): transmit query response, third byte `'1'` while
//!   the rig is keyed
//! - `DS` (length 12): front-panel display dump, eight 7-bit display
//!   bytes, then an icon byte whose 0x20 bit tracks the selected
//!   antenna
//!
//! Everything else on the wire is ignored; the encoding is only
//! partially reverse-engineered and unknown records are expected for
//! some rig states.
//!
//! # Format of the DS display field
//!
//! Display bytes carry the character in the low 7 bits; the high bit
//! flags a decimal point (or colon) rendered after that digit. The
//! number of digits after the *last* such flag tells us how the
//! displayed kHz value was truncated, giving the scale back to Hz:
//! one trailing digit means x100, two means x10, anything else x1.
//! `'@'` is the blank placeholder and maps to a space.
//!
//! The scale rule is reverse-engineered from one firmware line. Do not
//! extend it without captures from a real rig.

use crate::band::{Antenna, Band};

/// Serial buffer capacity; matches the switch box's tiny record sizes
const BUFFER_LEN: usize = 64;

/// Record terminator
const TERMINATOR: u8 = b';';

/// Written once after opening the port; asks the rig to stream status
pub const INIT_RECORD: &[u8] = b"AI2;";

/// Polled on a short cadence to refresh the display decode
pub const KEEPALIVE_RECORD: &[u8] = b"DS;";

/// One decoded status record from the rig
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum K3sMessage {
    /// Transmit state: true while keyed
    Transmit(bool),
    /// Display status: selected antenna, plus the dial band when the
    /// display could be decoded to an in-band frequency
    Display {
        antenna: Antenna,
        band: Option<Band>,
    },
}

impl K3sMessage {
    /// Decode one framed record (terminator already stripped)
    ///
    /// Returns `None` for records the controller does not understand;
    /// that is the common case and not an error.
    pub fn parse(record: &[u8]) -> Option<K3sMessage> {
        if record.len() == 3 && record.starts_with(b"TQ") {
            return Some(K3sMessage::Transmit(record[2] == b'1'));
        }
        if record.len() == 12 && record.starts_with(b"DS") {
            return Some(Self::parse_display(&record[2..]));
        }
        None
    }

    fn parse_display(payload: &[u8]) -> K3sMessage {
        let display = &payload[..8];
        let icons = payload[8];
        let antenna = if icons & 0x20 != 0 {
            Antenna::Antenna2
        } else {
            Antenna::Antenna1
        };

        // Trailing group length = digits since the last decimal flag.
        let mut group = 0usize;
        let mut text = String::with_capacity(display.len());
        for &b in display {
            if b & 0x80 != 0 {
                group = 0;
            } else {
                group += 1;
            }
            let c = (b & 0x7F) as char;
            text.push(if c == '@' { ' ' } else { c });
        }
        let scale: u32 = match group {
            1 => 100,
            2 => 10,
            _ => 1,
        };

        let band = text
            .trim()
            .parse::<u32>()
            .ok()
            .and_then(|digits| digits.checked_mul(scale))
            .and_then(|hz| Band::from_frequency(hz).ok());
        K3sMessage::Display { antenna, band }
    }
}

/// Streaming K3S codec
///
/// Push raw serial chunks in with [`push_bytes`](K3sCodec::push_bytes),
/// pull complete records or decoded messages out. The buffer is a
/// small fixed array because valid records are at most 12 bytes; if it
/// ever fills without a terminator (corrupted stream, oversized
/// record) exactly one leading byte is dropped so the framer always
/// makes forward progress.
pub struct K3sCodec {
    buffer: [u8; BUFFER_LEN],
    len: usize,
    /// Offset of the first byte not yet scanned for a terminator
    scanned: usize,
}

impl K3sCodec {
    /// Create an empty codec
    pub fn new() -> Self {
        Self {
            buffer: [0; BUFFER_LEN],
            len: 0,
            scanned: 0,
        }
    }

    /// Append a chunk read from the serial port
    pub fn push_bytes(&mut self, data: &[u8]) {
        for &b in data {
            if self.len == BUFFER_LEN {
                // Full with no terminator: lossy recovery, drop the
                // oldest byte rather than stall forever.
                self.buffer.copy_within(1.., 0);
                self.len -= 1;
                self.scanned = self.scanned.saturating_sub(1);
            }
            self.buffer[self.len] = b;
            self.len += 1;
        }
    }

    /// Extract the next complete record, without its terminator
    pub fn next_record(&mut self) -> Option<Vec<u8>> {
        while self.scanned < self.len {
            if self.buffer[self.scanned] == TERMINATOR {
                let record = self.buffer[..self.scanned].to_vec();
                let consumed = self.scanned + 1;
                self.buffer.copy_within(consumed..self.len, 0);
                self.len -= consumed;
                self.scanned = 0;
                return Some(record);
            }
            self.scanned += 1;
        }
        None
    }

    /// Extract the next record that decodes to a known message,
    /// silently discarding unrecognized records
    pub fn next_message(&mut self) -> Option<K3sMessage> {
        while let Some(record) = self.next_record() {
            if let Some(msg) = K3sMessage::parse(&record) {
                return Some(msg);
            }
        }
        None
    }

    /// Clear the internal buffer
    pub fn clear(&mut self) {
        self.len = 0;
        self.scanned = 0;
    }
}

impl Default for K3sCodec {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_frames_split_across_reads() {
        let mut codec = K3sCodec::new();
        codec.push_bytes(b"AB;CD;E");
        assert_eq!(codec.next_record(), Some(b"AB".to_vec()));
        assert_eq!(codec.next_record(), Some(b"CD".to_vec()));
        assert_eq!(codec.next_record(), None);
        codec.push_bytes(b"F;");
        assert_eq!(codec.next_record(), Some(b"EF".to_vec()));
        assert_eq!(codec.next_record(), None);
    }

    #[test]
    fn test_overflow_drops_exactly_one_leading_byte() {
        let mut codec = K3sCodec::new();
        let chunk = [b'x'; BUFFER_LEN];
        codec.push_bytes(&chunk);
        assert_eq!(codec.next_record(), None);
        codec.push_bytes(b"y");
        assert_eq!(codec.next_record(), None);
        codec.push_bytes(b";");
        // One 'x' evicted for the 'y', one more for the terminator.
        let record = codec.next_record().expect("record after terminator");
        assert_eq!(record.len(), BUFFER_LEN - 1);
        assert_eq!(record[record.len() - 1], b'y');
        assert!(record[..record.len() - 1].iter().all(|&b| b == b'x'));
    }

    #[test]
    fn test_transmit_records() {
        assert_eq!(
            K3sMessage::parse(b"TQ1"),
            Some(K3sMessage::Transmit(true))
        );
        assert_eq!(
            K3sMessage::parse(b"TQ0"),
            Some(K3sMessage::Transmit(false))
        );
        // Wrong length is ignored, not an error
        assert_eq!(K3sMessage::parse(b"TQ11"), None);
        assert_eq!(K3sMessage::parse(b"TQ"), None);
    }

    #[test]
    fn test_unknown_records_ignored() {
        assert_eq!(K3sMessage::parse(b"FA00014250000"), None);
        assert_eq!(K3sMessage::parse(b""), None);
        assert_eq!(K3sMessage::parse(b"DS"), None);
    }

    /// Build a DS record showing `text` with decimal flags at `flags`
    /// (indexes into the 8 display bytes) and the given icon byte.
    fn ds_record(text: &[u8; 8], flags: &[usize], icons: u8) -> Vec<u8> {
        let mut record = b"DS".to_vec();
        for (i, &b) in text.iter().enumerate() {
            let flag = if flags.contains(&i) { 0x80 } else { 0 };
            record.push(b | flag);
        }
        record.push(icons);
        record.push(0);
        record
    }

    #[test]
    fn test_display_two_digit_group_scales_by_ten() {
        // " 14250.50" as shown on the rig: flag after the '0' at index
        // 5, leaving a trailing group of two digits.
        let record = ds_record(b"@1425050", &[5], 0x00);
        assert_eq!(
            K3sMessage::parse(&record),
            Some(K3sMessage::Display {
                antenna: Antenna::Antenna1,
                band: Some(Band::Band20M),
            })
        );
    }

    #[test]
    fn test_display_one_digit_group_scales_by_hundred() {
        // " 7 1525" with the flag before a single trailing digit:
        // 71525 x100 = 7_152_500 Hz, 40m.
        let record = ds_record(b"@@@71525", &[6], 0x00);
        assert_eq!(
            K3sMessage::parse(&record),
            Some(K3sMessage::Display {
                antenna: Antenna::Antenna1,
                band: Some(Band::Band40M),
            })
        );
    }

    #[test]
    fn test_display_antenna_icon_bit() {
        let record = ds_record(b"@1425050", &[5], 0x20);
        assert_eq!(
            K3sMessage::parse(&record),
            Some(K3sMessage::Display {
                antenna: Antenna::Antenna2,
                band: Some(Band::Band20M),
            })
        );
    }

    #[test]
    fn test_display_undecodable_yields_no_band() {
        // Text mode display ("CW  TEXT") is not a frequency; antenna
        // still decodes.
        let record = ds_record(b"CW@@TEXT", &[], 0x00);
        assert_eq!(
            K3sMessage::parse(&record),
            Some(K3sMessage::Display {
                antenna: Antenna::Antenna1,
                band: None,
            })
        );
    }

    #[test]
    fn test_display_out_of_band_frequency_yields_no_band() {
        // 5_000_000 Hz is between 80m and 40m.
        let record = ds_record(b"@@500000", &[5], 0x00);
        assert_eq!(
            K3sMessage::parse(&record),
            Some(K3sMessage::Display {
                antenna: Antenna::Antenna1,
                band: None,
            })
        );
    }

    proptest! {
        /// Any chunking of the same byte stream produces the same records.
        #[test]
        fn prop_records_independent_of_chunking(splits in proptest::collection::vec(0usize..30, 0..4)) {
            let stream = b"TQ1;DS12345678x\x00;junk;TQ0;";
            let mut reference = K3sCodec::new();
            reference.push_bytes(stream);
            let mut expected = Vec::new();
            while let Some(r) = reference.next_record() {
                expected.push(r);
            }

            let mut codec = K3sCodec::new();
            let mut produced = Vec::new();
            let mut rest: &[u8] = stream;
            for s in splits {
                let cut = s.min(rest.len());
                let (head, tail) = rest.split_at(cut);
                codec.push_bytes(head);
                while let Some(r) = codec.next_record() {
                    produced.push(r);
                }
                rest = tail;
            }
            codec.push_bytes(rest);
            while let Some(r) = codec.next_record() {
                produced.push(r);
            }
            prop_assert_eq!(produced, expected);
        }

        /// The framer never stalls: pushing arbitrary garbage plus a
        /// terminator always yields a record.
        #[test]
        fn prop_terminator_always_yields_record(garbage in proptest::collection::vec(0u8..255, 0..200)) {
            let mut codec = K3sCodec::new();
            let cleaned: Vec<u8> = garbage.into_iter().filter(|&b| b != TERMINATOR).collect();
            codec.push_bytes(&cleaned);
            codec.push_bytes(&[TERMINATOR]);
            prop_assert!(codec.next_record().is_some());
        }
    }
}
