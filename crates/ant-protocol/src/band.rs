//! Amateur band model
//!
//! The controller switches antennas for the nine contest bands from
//! 160m through 10m. A band can be derived two ways:
//!
//! - from a frequency in Hz (serial display decode, N1MM radio reports)
//! - from the fixed textual codes N1MM puts in its rotor broadcasts
//!   (`"1.8"`, `"3.5"`, ... `"28.0"`)
//!
//! Both derivations are total over their documented inputs and fail
//! loudly on anything else; a frequency or code never maps to more
//! than one band.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Errors from band derivation
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BandError {
    /// Frequency is outside every amateur band allocation
    #[error("{0} Hz is not within an amateur band")]
    OutOfRange(u32),

    /// Band code not in the N1MM code table
    #[error("unknown band code: {0:?}")]
    UnknownCode(String),

    /// Band label not recognized (wiring tables use "160m".."10m")
    #[error("unknown band label: {0:?}")]
    UnknownLabel(String),
}

/// One of the nine amateur bands, ordered by frequency
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Band {
    Band160M,
    Band80M,
    Band40M,
    Band30M,
    Band20M,
    Band17M,
    Band15M,
    Band12M,
    Band10M,
}

/// Inclusive band edges in Hz, from the original switch-box tables
static BAND_RANGES: &[(Band, u32, u32)] = &[
    (Band::Band160M, 1_800_000, 2_000_000),
    (Band::Band80M, 3_500_000, 4_000_000),
    (Band::Band40M, 7_000_000, 7_300_000),
    (Band::Band30M, 10_000_000, 10_150_000),
    (Band::Band20M, 14_000_000, 14_350_000),
    (Band::Band17M, 18_000_000, 18_168_000),
    (Band::Band15M, 21_000_000, 21_450_000),
    (Band::Band12M, 24_890_000, 25_000_000),
    (Band::Band10M, 28_000_000, 29_700_000),
];

/// N1MM `freqband` codes (MHz of the band edge, one decimal place)
static BAND_CODES: &[(&str, Band)] = &[
    ("1.8", Band::Band160M),
    ("3.5", Band::Band80M),
    ("7.0", Band::Band40M),
    ("10.0", Band::Band30M),
    ("14.0", Band::Band20M),
    ("18.0", Band::Band17M),
    ("21.0", Band::Band15M),
    ("24.0", Band::Band12M),
    ("28.0", Band::Band10M),
];

impl Band {
    /// All bands, lowest frequency first
    pub fn all() -> impl Iterator<Item = Band> {
        BAND_RANGES.iter().map(|(b, _, _)| *b)
    }

    /// Derive the band containing `hz`
    pub fn from_frequency(hz: u32) -> Result<Band, BandError> {
        BAND_RANGES
            .iter()
            .find(|(_, lo, hi)| (*lo..=*hi).contains(&hz))
            .map(|(band, _, _)| *band)
            .ok_or(BandError::OutOfRange(hz))
    }

    /// Derive a band from an N1MM `freqband` code such as `"14.0"`
    pub fn from_code(code: &str) -> Result<Band, BandError> {
        BAND_CODES
            .iter()
            .find(|(c, _)| *c == code)
            .map(|(_, band)| *band)
            .ok_or_else(|| BandError::UnknownCode(code.to_string()))
    }

    /// Short label used in wiring tables and logs
    pub fn label(&self) -> &'static str {
        match self {
            Band::Band160M => "160m",
            Band::Band80M => "80m",
            Band::Band40M => "40m",
            Band::Band30M => "30m",
            Band::Band20M => "20m",
            Band::Band17M => "17m",
            Band::Band15M => "15m",
            Band::Band12M => "12m",
            Band::Band10M => "10m",
        }
    }
}

impl fmt::Display for Band {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Band {
    type Err = BandError;

    /// Parse a wiring-table label like `"160m"` (case-insensitive)
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Band::all()
            .find(|b| b.label().eq_ignore_ascii_case(s))
            .ok_or_else(|| BandError::UnknownLabel(s.to_string()))
    }
}

/// Which of the two switched antennas the transceiver has selected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Antenna {
    Antenna1,
    Antenna2,
}

/// N1MM radio unit number
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Radio {
    Radio1 = 1,
    Radio2 = 2,
}

impl Radio {
    /// Build from the integer N1MM puts in `<RadioNr>`
    pub fn from_number(n: u32) -> Option<Radio> {
        match n {
            1 => Some(Radio::Radio1),
            2 => Some(Radio::Radio2),
            _ => None,
        }
    }

    /// Human-readable name
    pub fn name(&self) -> &'static str {
        match self {
            Radio::Radio1 => "Radio 1",
            Radio::Radio2 => "Radio 2",
        }
    }
}

impl fmt::Display for Radio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_from_frequency_band_edges() {
        assert_eq!(Band::from_frequency(1_800_000), Ok(Band::Band160M));
        assert_eq!(Band::from_frequency(2_000_000), Ok(Band::Band160M));
        assert_eq!(Band::from_frequency(14_250_500), Ok(Band::Band20M));
        assert_eq!(Band::from_frequency(29_700_000), Ok(Band::Band10M));
    }

    #[test]
    fn test_from_frequency_outside_all_bands() {
        assert!(Band::from_frequency(0).is_err());
        assert!(Band::from_frequency(2_000_001).is_err());
        assert!(Band::from_frequency(13_999_999).is_err());
        assert!(Band::from_frequency(30_000_000).is_err());
    }

    #[test]
    fn test_from_code_table() {
        assert_eq!(Band::from_code("1.8"), Ok(Band::Band160M));
        assert_eq!(Band::from_code("14.0"), Ok(Band::Band20M));
        assert_eq!(Band::from_code("28.0"), Ok(Band::Band10M));
        assert!(Band::from_code("50.0").is_err());
        assert!(Band::from_code("").is_err());
    }

    #[test]
    fn test_label_round_trip() {
        for band in Band::all() {
            assert_eq!(band.label().parse::<Band>(), Ok(band));
        }
        assert_eq!("20M".parse::<Band>(), Ok(Band::Band20M));
        assert!("2m".parse::<Band>().is_err());
    }

    #[test]
    fn test_radio_from_number() {
        assert_eq!(Radio::from_number(1), Some(Radio::Radio1));
        assert_eq!(Radio::from_number(2), Some(Radio::Radio2));
        assert_eq!(Radio::from_number(0), None);
        assert_eq!(Radio::from_number(3), None);
    }

    proptest! {
        #[test]
        fn prop_in_range_frequencies_map_to_their_band(idx in 0usize..9, hz in 0u32..2_000_000) {
            let (band, lo, hi) = BAND_RANGES[idx];
            let f = lo + hz % (hi - lo + 1);
            prop_assert_eq!(Band::from_frequency(f), Ok(band));
        }

        #[test]
        fn prop_frequency_never_ambiguous(hz in 0u32..40_000_000) {
            let matches = BAND_RANGES
                .iter()
                .filter(|(_, lo, hi)| (*lo..=*hi).contains(&hz))
                .count();
            prop_assert!(matches <= 1);
            match Band::from_frequency(hz) {
                Ok(_) => prop_assert_eq!(matches, 1),
                Err(_) => prop_assert_eq!(matches, 0),
            }
        }
    }
}
