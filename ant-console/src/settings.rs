//! Controller settings
//!
//! One TOML file holds the station-side configuration: which serial
//! port the rig is on, what the N1MM feeds should match, and where the
//! band wiring table lives. The file is looked up under the platform
//! config directory unless a path is given on the command line.

use std::net::IpAddr;
use std::path::{Path, PathBuf};

use ant_protocol::Radio;
use anyhow::{anyhow, Context};
use serde::{Deserialize, Serialize};

/// Serial link settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SerialSettings {
    /// Serial port path, e.g. `/dev/ttyUSB0` or `COM3`
    pub port: String,
    /// Baud rate
    #[serde(default = "default_baud")]
    pub baud: u32,
}

fn default_baud() -> u32 {
    ant_control::DEFAULT_BAUD
}

/// N1MM remote-control settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RemoteSettings {
    /// Local address the UDP listeners bind on
    #[serde(default = "default_address")]
    pub address: IpAddr,
    /// Rotor name this station answers to
    pub rotor: String,
    /// N1MM radio number to follow (1 or 2)
    #[serde(default = "default_radio")]
    pub radio: u32,
}

fn default_address() -> IpAddr {
    IpAddr::V4(std::net::Ipv4Addr::UNSPECIFIED)
}

fn default_radio() -> u32 {
    1
}

impl RemoteSettings {
    /// The configured radio unit
    pub fn radio(&self) -> anyhow::Result<Radio> {
        Radio::from_number(self.radio)
            .ok_or_else(|| anyhow!("radio must be 1 or 2, not {}", self.radio))
    }
}

/// Controller settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Settings {
    pub serial: SerialSettings,
    pub remote: RemoteSettings,
    /// Band wiring table, relative paths resolved against this file
    pub wiring: PathBuf,
}

impl Settings {
    /// Load settings from `path`, or from the default location when
    /// no path is given
    pub fn load(path: Option<PathBuf>) -> anyhow::Result<(Settings, PathBuf)> {
        let path = match path {
            Some(path) => path,
            None => Self::default_path()
                .ok_or_else(|| anyhow!("could not determine the config directory"))?,
        };
        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read settings from {}", path.display()))?;
        let settings: Settings = toml::from_str(&text)
            .with_context(|| format!("invalid settings in {}", path.display()))?;
        Ok((settings, path))
    }

    /// Wiring table path resolved against the settings file location
    pub fn wiring_path(&self, settings_path: &Path) -> PathBuf {
        if self.wiring.is_absolute() {
            self.wiring.clone()
        } else {
            settings_path
                .parent()
                .map(|dir| dir.join(&self.wiring))
                .unwrap_or_else(|| self.wiring.clone())
        }
    }

    fn default_path() -> Option<PathBuf> {
        // First try XDG_CONFIG_HOME, then fall back to ~/.config
        if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
            let path = PathBuf::from(xdg_config);
            if path.is_absolute() {
                return Some(path.join("antflip").join("antflip.toml"));
            }
        }
        dirs::home_dir().map(|h| h.join(".config").join("antflip").join("antflip.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_settings() {
        let text = r#"
            wiring = "wiring.toml"

            [serial]
            port = "/dev/ttyUSB0"

            [remote]
            rotor = "tower"
            radio = 2
        "#;
        let settings: Settings = toml::from_str(text).unwrap();
        assert_eq!(settings.serial.port, "/dev/ttyUSB0");
        assert_eq!(settings.serial.baud, ant_control::DEFAULT_BAUD);
        assert_eq!(settings.remote.rotor, "tower");
        assert_eq!(settings.remote.radio().unwrap(), Radio::Radio2);
    }

    #[test]
    fn test_relative_wiring_path() {
        let settings: Settings = toml::from_str(
            r#"
            wiring = "wiring.toml"
            [serial]
            port = "COM3"
            [remote]
            rotor = "tower"
            "#,
        )
        .unwrap();
        let resolved = settings.wiring_path(Path::new("/etc/antflip/antflip.toml"));
        assert_eq!(resolved, Path::new("/etc/antflip/wiring.toml"));
    }
}
