//! Band wiring tables
//!
//! The switch box's relay fan-out is described by a TOML file: a table
//! naming each relay's index, then one section per band listing which
//! relays select each switch position. Directional bands (four-square
//! arrays) use the eight compass points plus omni; stacked bands use
//! upper/lower/both.
//!
//! ```toml
//! [relays]
//! "160-n"  = 0
//! "160-ne" = 1
//!
//! [bands.160m]
//! north     = ["160-n"]
//! northeast = ["160-ne"]
//! start     = "north"
//!
//! [bands.20m]
//! upper = ["20-up"]
//! lower = ["20-low"]
//! both  = ["20-up", "20-low"]
//! start = "both"
//! ```
//!
//! Everything is validated when the table loads; runtime band events
//! only ever look positions up. Selecting a position opens its relays
//! and closes every other relay wired to the same band.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use ant_protocol::Band;
use serde::Deserialize;
use thiserror::Error;

/// Errors raised while loading a wiring table
#[derive(Debug, Error)]
pub enum WiringError {
    /// Could not read the file
    #[error("failed to read wiring table: {0}")]
    Io(#[from] std::io::Error),

    /// Not valid TOML or wrong shape
    #[error("invalid wiring table: {0}")]
    Toml(#[from] toml::de::Error),

    /// Band section key is not a band label
    #[error("unknown band {0:?} in wiring table")]
    UnknownBand(String),

    /// A position references a relay missing from `[relays]`
    #[error("band {band}: unknown relay {name:?}")]
    UnknownRelay { band: Band, name: String },

    /// `start` names a position the band does not have
    #[error("band {band}: invalid start position {value:?}")]
    InvalidStart { band: Band, value: String },

    /// A band mixes directional and stacked position keys
    #[error("band {0} mixes directional and stacked positions")]
    MixedKind(Band),

    /// A band section defines no positions at all
    #[error("band {0} defines no positions")]
    EmptyBand(Band),
}

/// Relay actuation for one switch position
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayActions {
    /// Relay indexes to open (energize)
    pub open: Vec<usize>,
    /// Relay indexes to close
    pub close: Vec<usize>,
    /// Whether this is the position selected on entering the band
    pub default: bool,
}

/// Eight-point compass direction for rotor azimuths
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    North,
    NorthEast,
    East,
    SouthEast,
    South,
    SouthWest,
    West,
    NorthWest,
}

/// Compass order used for azimuth sector math and array indexing
static DIRECTIONS: [Direction; 8] = [
    Direction::North,
    Direction::NorthEast,
    Direction::East,
    Direction::SouthEast,
    Direction::South,
    Direction::SouthWest,
    Direction::West,
    Direction::NorthWest,
];

impl Direction {
    /// Map an azimuth in degrees to its 45° sector
    ///
    /// Sector boundaries are inclusive at the lower edge: 22.5° is
    /// already NorthEast, 67.5° already East. Values outside 0..360
    /// wrap.
    pub fn from_azimuth(degrees: f64) -> Direction {
        let normalized = degrees.rem_euclid(360.0);
        let sector = ((normalized + 22.5) / 45.0) as usize % 8;
        DIRECTIONS[sector]
    }

    /// Wiring-table key for this direction
    pub fn label(&self) -> &'static str {
        match self {
            Direction::North => "north",
            Direction::NorthEast => "northeast",
            Direction::East => "east",
            Direction::SouthEast => "southeast",
            Direction::South => "south",
            Direction::SouthWest => "southwest",
            Direction::West => "west",
            Direction::NorthWest => "northwest",
        }
    }
}

/// Wiring for a directional (rotary/four-square) band
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectionalWiring {
    directions: [RelayActions; 8],
    /// Parked/omnidirectional position
    pub omni: RelayActions,
}

impl DirectionalWiring {
    /// Actions selecting `direction`
    pub fn for_direction(&self, direction: Direction) -> &RelayActions {
        let index = DIRECTIONS
            .iter()
            .position(|d| *d == direction)
            .unwrap_or(0);
        &self.directions[index]
    }

    /// Position selected on entering the band: the `start` position if
    /// the table names one, otherwise omni
    pub fn start(&self) -> &RelayActions {
        self.directions
            .iter()
            .find(|actions| actions.default)
            .unwrap_or(&self.omni)
    }
}

/// Wiring for a stacked (upper/lower/both) band
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwitchedWiring {
    pub upper: RelayActions,
    pub lower: RelayActions,
    pub both: RelayActions,
}

impl SwitchedWiring {
    /// Position selected on entering the band: the `start` position if
    /// the table names one, otherwise both stacks
    pub fn start(&self) -> &RelayActions {
        if self.upper.default {
            &self.upper
        } else if self.lower.default {
            &self.lower
        } else {
            &self.both
        }
    }
}

/// Wiring for one band, by antenna kind
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BandWiring {
    Directional(DirectionalWiring),
    Switched(SwitchedWiring),
}

/// Validated wiring for the whole switch box
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Wiring {
    bands: BTreeMap<Band, BandWiring>,
    relay_count: usize,
}

impl Wiring {
    /// Load and validate a wiring table from a file
    pub fn load(path: impl AsRef<Path>) -> Result<Wiring, WiringError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Parse and validate a wiring table from TOML text
    pub fn from_toml_str(text: &str) -> Result<Wiring, WiringError> {
        let model: WiringModel = toml::from_str(text)?;
        let mut bands = BTreeMap::new();
        for (label, section) in &model.bands {
            let band: Band = label
                .parse()
                .map_err(|_| WiringError::UnknownBand(label.clone()))?;
            bands.insert(band, section.build(band, &model.relays)?);
        }
        let relay_count = model.relays.values().map(|idx| idx + 1).max().unwrap_or(0);
        Ok(Wiring { bands, relay_count })
    }

    /// Wiring for `band`, if the table defines it
    pub fn band(&self, band: Band) -> Option<&BandWiring> {
        self.bands.get(&band)
    }

    /// Bands the table defines, lowest first
    pub fn bands(&self) -> impl Iterator<Item = Band> + '_ {
        self.bands.keys().copied()
    }

    /// Number of relays the table drives (highest index + 1)
    pub fn relay_count(&self) -> usize {
        self.relay_count
    }
}

#[derive(Debug, Default, Deserialize)]
struct WiringModel {
    #[serde(default)]
    relays: BTreeMap<String, usize>,
    #[serde(default)]
    bands: BTreeMap<String, BandSection>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct BandSection {
    north: Vec<String>,
    northeast: Vec<String>,
    east: Vec<String>,
    southeast: Vec<String>,
    south: Vec<String>,
    southwest: Vec<String>,
    west: Vec<String>,
    northwest: Vec<String>,
    omni: Vec<String>,
    upper: Vec<String>,
    lower: Vec<String>,
    both: Vec<String>,
    start: Option<String>,
}

impl BandSection {
    fn directional_positions(&self) -> [(&'static str, &[String]); 9] {
        [
            ("north", &self.north),
            ("northeast", &self.northeast),
            ("east", &self.east),
            ("southeast", &self.southeast),
            ("south", &self.south),
            ("southwest", &self.southwest),
            ("west", &self.west),
            ("northwest", &self.northwest),
            ("omni", &self.omni),
        ]
    }

    fn build(
        &self,
        band: Band,
        relays: &BTreeMap<String, usize>,
    ) -> Result<BandWiring, WiringError> {
        let directional = self
            .directional_positions()
            .iter()
            .any(|(_, names)| !names.is_empty());
        let switched =
            !self.upper.is_empty() || !self.lower.is_empty() || !self.both.is_empty();
        match (directional, switched) {
            (true, true) => Err(WiringError::MixedKind(band)),
            (false, false) => Err(WiringError::EmptyBand(band)),
            (true, false) => self.build_directional(band, relays),
            (false, true) => self.build_switched(band, relays),
        }
    }

    fn build_directional(
        &self,
        band: Band,
        relays: &BTreeMap<String, usize>,
    ) -> Result<BandWiring, WiringError> {
        let positions = self.directional_positions();
        self.check_start(band, positions.iter().map(|(label, _)| *label))?;

        let mut all = BTreeSet::new();
        for (_, names) in &positions {
            all.extend(resolve(band, names, relays)?);
        }
        let directions = [
            self.actions("north", resolve(band, &self.north, relays)?, &all),
            self.actions("northeast", resolve(band, &self.northeast, relays)?, &all),
            self.actions("east", resolve(band, &self.east, relays)?, &all),
            self.actions("southeast", resolve(band, &self.southeast, relays)?, &all),
            self.actions("south", resolve(band, &self.south, relays)?, &all),
            self.actions("southwest", resolve(band, &self.southwest, relays)?, &all),
            self.actions("west", resolve(band, &self.west, relays)?, &all),
            self.actions("northwest", resolve(band, &self.northwest, relays)?, &all),
        ];
        let omni = self.actions("omni", resolve(band, &self.omni, relays)?, &all);
        Ok(BandWiring::Directional(DirectionalWiring {
            directions,
            omni,
        }))
    }

    fn build_switched(
        &self,
        band: Band,
        relays: &BTreeMap<String, usize>,
    ) -> Result<BandWiring, WiringError> {
        self.check_start(band, ["upper", "lower", "both"].into_iter())?;
        let upper = resolve(band, &self.upper, relays)?;
        let lower = resolve(band, &self.lower, relays)?;
        let both = resolve(band, &self.both, relays)?;
        let all: BTreeSet<usize> = upper
            .iter()
            .chain(lower.iter())
            .chain(both.iter())
            .copied()
            .collect();
        Ok(BandWiring::Switched(SwitchedWiring {
            upper: self.actions("upper", upper, &all),
            lower: self.actions("lower", lower, &all),
            both: self.actions("both", both, &all),
        }))
    }

    fn check_start<'a>(
        &self,
        band: Band,
        mut valid: impl Iterator<Item = &'a str>,
    ) -> Result<(), WiringError> {
        match &self.start {
            Some(start) if !valid.any(|label| label.eq_ignore_ascii_case(start)) => {
                Err(WiringError::InvalidStart {
                    band,
                    value: start.clone(),
                })
            }
            _ => Ok(()),
        }
    }

    fn actions(&self, label: &str, open: Vec<usize>, all: &BTreeSet<usize>) -> RelayActions {
        let close = all
            .iter()
            .copied()
            .filter(|idx| !open.contains(idx))
            .collect();
        let default = self
            .start
            .as_deref()
            .is_some_and(|start| start.eq_ignore_ascii_case(label));
        RelayActions {
            open,
            close,
            default,
        }
    }
}

fn resolve(
    band: Band,
    names: &[String],
    relays: &BTreeMap<String, usize>,
) -> Result<Vec<usize>, WiringError> {
    names
        .iter()
        .map(|name| {
            relays
                .get(name)
                .copied()
                .ok_or_else(|| WiringError::UnknownRelay {
                    band,
                    name: name.clone(),
                })
        })
        .collect()
}
