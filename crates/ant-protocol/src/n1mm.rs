//! N1MM Logger+ UDP broadcasts
//!
//! N1MM publishes rotor steering messages (default port 12040) and
//! radio status messages (default port 12060) as small XML documents,
//! one per datagram. Both ports also carry unrelated N1MM traffic, so
//! a parse failure here is the steady-state case for many datagrams:
//! callers receive it as an error and simply drop the packet.
//!
//! Only the fields the switch box cares about are parsed; the radio
//! message in particular has dozens of elements we ignore.

use std::collections::HashMap;

use quick_xml::events::Event;
use quick_xml::Reader;
use thiserror::Error;

use crate::band::{Band, BandError, Radio};

/// Default UDP port for rotor steering broadcasts
pub const ROTOR_PORT: u16 = 12040;

/// Default UDP port for radio status broadcasts
pub const RADIO_PORT: u16 = 12060;

/// Scale from the `<Freq>` element's device ticks to Hz
const FREQ_SCALE: u32 = 10;

/// Errors from decoding an N1MM datagram
#[derive(Debug, Error)]
pub enum N1mmError {
    /// Payload is not well-formed XML
    #[error("malformed XML: {0}")]
    Xml(#[from] quick_xml::Error),

    /// A required element is absent
    #[error("packet has missing/invalid <{0}> tag")]
    MissingField(&'static str),

    /// A required element's text did not parse
    #[error("packet has invalid <{0}> value: {1:?}")]
    InvalidField(&'static str, String),

    /// The `freqband` code or frequency maps to no band
    #[error(transparent)]
    Band(#[from] BandError),
}

/// One rotor steering broadcast
#[derive(Debug, Clone, PartialEq)]
pub struct RotorMessage {
    /// Configured rotor/antenna name the message addresses
    pub name: String,
    /// Target azimuth in degrees; 360 means parked/omnidirectional
    pub azimuth: f64,
    /// Heading offset in degrees
    pub offset: f64,
    /// Bidirectional antenna flag
    pub bidirectional: bool,
    /// Band the rotor command applies to
    pub band: Band,
}

impl RotorMessage {
    /// Decode one rotor datagram
    pub fn parse(packet: &[u8]) -> Result<RotorMessage, N1mmError> {
        let fields = leaf_text(packet)?;
        let name = fields
            .get("rotor")
            .ok_or(N1mmError::MissingField("rotor"))?
            .clone();
        let azimuth = parse_field(&fields, "goazi")?;
        let offset = parse_field(&fields, "offset")?;
        let bidirectional = parse_field::<i32>(&fields, "bidirectional")? != 0;
        let band = Band::from_code(
            fields
                .get("freqband")
                .ok_or(N1mmError::MissingField("freqband"))?,
        )?;
        Ok(RotorMessage {
            name,
            azimuth,
            offset,
            bidirectional,
            band,
        })
    }
}

/// One radio status broadcast
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RadioMessage {
    /// Which radio the report is for
    pub radio: Radio,
    /// Dial frequency in Hz
    pub frequency_hz: u32,
}

impl RadioMessage {
    /// Decode one radio datagram
    pub fn parse(packet: &[u8]) -> Result<RadioMessage, N1mmError> {
        let fields = leaf_text(packet)?;
        let number = parse_field::<u32>(&fields, "RadioNr")?;
        let radio = Radio::from_number(number).ok_or_else(|| {
            N1mmError::InvalidField("RadioNr", number.to_string())
        })?;
        let ticks = parse_field::<u32>(&fields, "Freq")?;
        let frequency_hz = ticks.checked_mul(FREQ_SCALE).ok_or_else(|| {
            N1mmError::InvalidField("Freq", ticks.to_string())
        })?;
        Ok(RadioMessage {
            radio,
            frequency_hz,
        })
    }

    /// Band containing the reported frequency
    pub fn band(&self) -> Result<Band, BandError> {
        Band::from_frequency(self.frequency_hz)
    }
}

/// Collect the text content of every leaf element into a map
fn leaf_text(packet: &[u8]) -> Result<HashMap<String, String>, N1mmError> {
    let mut reader = Reader::from_reader(packet);
    reader.config_mut().trim_text(true);

    let mut fields = HashMap::new();
    let mut current: Option<String> = None;
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => {
                current = Some(String::from_utf8_lossy(e.local_name().as_ref()).into_owned());
            }
            Event::Text(t) => {
                if let Some(tag) = current.take() {
                    fields.insert(tag, t.unescape()?.into_owned());
                }
            }
            Event::End(_) => current = None,
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(fields)
}

fn parse_field<T: std::str::FromStr>(
    fields: &HashMap<String, String>,
    tag: &'static str,
) -> Result<T, N1mmError> {
    let text = fields.get(tag).ok_or(N1mmError::MissingField(tag))?;
    text.parse()
        .map_err(|_| N1mmError::InvalidField(tag, text.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROTOR_PACKET: &[u8] = b"<N1MMRotor>\
        <rotor>antflip</rotor>\
        <goazi>45.0</goazi>\
        <offset>0.0</offset>\
        <bidirectional>0</bidirectional>\
        <freqband>14.0</freqband>\
        </N1MMRotor>";

    #[test]
    fn test_parse_rotor_message() {
        let msg = RotorMessage::parse(ROTOR_PACKET).unwrap();
        assert_eq!(msg.name, "antflip");
        assert_eq!(msg.azimuth, 45.0);
        assert_eq!(msg.offset, 0.0);
        assert!(!msg.bidirectional);
        assert_eq!(msg.band, Band::Band20M);
    }

    #[test]
    fn test_rotor_missing_field() {
        let packet = b"<N1MMRotor><rotor>antflip</rotor></N1MMRotor>";
        assert!(matches!(
            RotorMessage::parse(packet),
            Err(N1mmError::MissingField("goazi"))
        ));
    }

    #[test]
    fn test_rotor_unknown_band_code() {
        let packet = b"<N1MMRotor>\
            <rotor>antflip</rotor>\
            <goazi>45.0</goazi>\
            <offset>0.0</offset>\
            <bidirectional>1</bidirectional>\
            <freqband>50.0</freqband>\
            </N1MMRotor>";
        assert!(matches!(
            RotorMessage::parse(packet),
            Err(N1mmError::Band(BandError::UnknownCode(_)))
        ));
    }

    #[test]
    fn test_parse_radio_message() {
        // N1MM RadioInfo has many elements; unknown ones are skipped.
        let packet = b"<RadioInfo>\
            <StationName>shack</StationName>\
            <RadioNr>2</RadioNr>\
            <Freq>1425050</Freq>\
            <TXFreq>1425050</TXFreq>\
            <Mode>USB</Mode>\
            </RadioInfo>";
        let msg = RadioMessage::parse(packet).unwrap();
        assert_eq!(msg.radio, Radio::Radio2);
        assert_eq!(msg.frequency_hz, 14_250_500);
        assert_eq!(msg.band(), Ok(Band::Band20M));
    }

    #[test]
    fn test_radio_bad_number() {
        let packet = b"<RadioInfo><RadioNr>7</RadioNr><Freq>1425050</Freq></RadioInfo>";
        assert!(matches!(
            RadioMessage::parse(packet),
            Err(N1mmError::InvalidField("RadioNr", _))
        ));
    }

    #[test]
    fn test_unrelated_traffic_fails_to_parse() {
        // N1MM shares these ports with contact broadcasts and plain
        // junk; all of it must come back as an error, never a panic.
        for packet in [
            &b"<contactinfo><call>W1AW</call></contactinfo>"[..],
            &b"not xml at all"[..],
            &b""[..],
            &b"\xff\xfe\x00"[..],
        ] {
            assert!(RotorMessage::parse(packet).is_err());
            assert!(RadioMessage::parse(packet).is_err());
        }
    }
}
