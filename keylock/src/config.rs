use crate::tone::{MusicalNote, Tone};
use dotenv::var;
use keylock_gpio::keypad::{KeyMap, KeyMapError, KEYPAD_CHIP_ADDRESS};
use keylock_gpio::lcd::hd44780::LCD_BACKPACK_ADDRESS;
use keylock_tone_macro::tone;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("couldn't access the config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("couldn't parse the config file: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid key map: {0}")]
    KeyMap(#[from] KeyMapError),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Where key presses are read from.
#[derive(Serialize, Deserialize, Copy, Clone, Debug, Default, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum KeypadSource {
    /// Through the keypad chip on the I2C bus.
    #[default]
    Bus,
    /// Straight from the matrix pins.
    Direct,
}

#[derive(Serialize, Deserialize, Clone, Debug, Eq, PartialEq)]
#[serde(default)]
pub struct BusConfig {
    pub keypad_address: u8,
    pub display_address: u8,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            keypad_address: KEYPAD_CHIP_ADDRESS,
            display_address: LCD_BACKPACK_ADDRESS,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Eq, PartialEq)]
#[serde(default)]
pub struct PinConfig {
    pub keypad_rows: [usize; 4],
    pub keypad_cols: [usize; 4],
    pub failure_led: usize,
    pub success_led: usize,
}

impl PinConfig {
    fn all(&self) -> impl Iterator<Item = usize> + '_ {
        self.keypad_rows
            .iter()
            .chain(&self.keypad_cols)
            .copied()
            .chain([self.failure_led, self.success_led])
    }

    /// Number of pins the board needs to have for every configured pin to exist.
    pub fn board_size(&self) -> usize {
        self.all().max().map_or(0, |max| max + 1)
    }
}

impl Default for PinConfig {
    fn default() -> Self {
        Self {
            keypad_rows: [0, 1, 2, 3],
            keypad_cols: [4, 5, 6, 7],
            failure_led: 8,
            success_led: 9,
        }
    }
}

/// Every delay of the lock, in milliseconds.
#[derive(Serialize, Deserialize, Clone, Debug, Eq, PartialEq)]
#[serde(default)]
pub struct Timing {
    pub poll_ms: u64,
    pub heartbeat_interval_ms: u64,
    pub idle_ms: u64,
    pub failure_pulses: u32,
    pub failure_pause_ms: u64,
    pub wrong_password_cooldown_ms: u64,
    pub defused_hold_ms: u64,
    pub key_press_ms: u64,
}

impl Timing {
    pub fn poll(&self) -> Duration {
        Duration::from_millis(self.poll_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn idle(&self) -> Duration {
        Duration::from_millis(self.idle_ms)
    }

    pub fn failure_pause(&self) -> Duration {
        Duration::from_millis(self.failure_pause_ms)
    }

    pub fn wrong_password_cooldown(&self) -> Duration {
        Duration::from_millis(self.wrong_password_cooldown_ms)
    }

    pub fn defused_hold(&self) -> Duration {
        Duration::from_millis(self.defused_hold_ms)
    }

    pub fn key_press(&self) -> Duration {
        Duration::from_millis(self.key_press_ms)
    }
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            poll_ms: 10,
            heartbeat_interval_ms: 1000,
            idle_ms: 100,
            failure_pulses: 4,
            failure_pause_ms: 50,
            wrong_password_cooldown_ms: 1000,
            defused_hold_ms: 60_000,
            key_press_ms: 80,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Eq, PartialEq)]
#[serde(default)]
pub struct Tones {
    pub heartbeat: Tone,
    pub failure: Tone,
}

impl Default for Tones {
    fn default() -> Self {
        Self {
            heartbeat: tone!("Eb7" for 50ms),
            failure: tone!("F4" for 50ms),
        }
    }
}

/// Identity of the wireless status service.
#[derive(Serialize, Deserialize, Clone, Debug, Eq, PartialEq)]
#[serde(default)]
pub struct ServiceConfig {
    pub device_name: String,
    pub service_uuid: String,
    pub state_uuid: String,
    pub username_uuid: String,
    pub password_uuid: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            device_name: "4K LGTV".to_string(),
            service_uuid: "19B10010-E8F2-537E-4F6C-D104768A1214".to_string(),
            state_uuid: "19B10011-E8F2-537E-4F6C-D104768A1214".to_string(),
            username_uuid: "19B10012-E8F2-537E-4F6C-D104768A1214".to_string(),
            password_uuid: "19B10013-E8F2-537E-4F6C-D104768A1214".to_string(),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Code to enter at boot. Can be replaced at runtime through the status service.
    pub password: String,
    /// Label shown under "Congratulations".
    pub username: String,
    pub key_map: String,
    pub keypad_source: KeypadSource,
    pub bus: BusConfig,
    pub pins: PinConfig,
    pub timing: Timing,
    pub tones: Tones,
    pub service: ServiceConfig,
}

impl Config {
    /// Path of the config file, taken from `CONFIG_FILE`.
    pub fn path() -> PathBuf {
        PathBuf::from(var("CONFIG_FILE").unwrap_or_else(|_| "config.json".to_string()))
    }

    /// Loads the config file, if there is one.
    ///
    /// A missing file isn't an error, but an unreadable or invalid one is.
    pub fn try_load() -> Result<Option<Self>, ConfigError> {
        let config_path = Self::path();
        if !config_path.exists() {
            return Ok(None);
        }
        let file = std::fs::File::open(config_path)?;
        let reader = std::io::BufReader::new(file);
        let config: Config = serde_json::from_reader(reader)?;
        config.validate()?;
        Ok(Some(config))
    }

    pub fn save(&self) -> Result<(), ConfigError> {
        let file = std::fs::File::create(Self::path())?;
        let writer = std::io::BufWriter::new(file);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }

    pub fn key_map(&self) -> Result<KeyMap, KeyMapError> {
        KeyMap::parse(&self.key_map)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.password.is_empty() {
            return Err(ConfigError::Invalid("password must not be empty".to_string()));
        }
        self.key_map()?;

        for address in [self.bus.keypad_address, self.bus.display_address] {
            if address > 0x7F {
                return Err(ConfigError::Invalid(format!(
                    "bus address {:#04x} doesn't fit in 7 bits",
                    address
                )));
            }
        }
        if self.bus.keypad_address == self.bus.display_address {
            return Err(ConfigError::Invalid(
                "keypad and display share a bus address".to_string(),
            ));
        }

        let mut pins: Vec<usize> = self.pins.all().collect();
        pins.sort_unstable();
        if pins.windows(2).any(|w| w[0] == w[1]) {
            return Err(ConfigError::Invalid("a pin is assigned twice".to_string()));
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            password: "1234".to_string(),
            username: String::new(),
            key_map: KeyMap::DEFAULT_LAYOUT.to_string(),
            keypad_source: KeypadSource::default(),
            bus: BusConfig::default(),
            pins: PinConfig::default(),
            timing: Timing::default(),
            tones: Tones::default(),
            service: ServiceConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_device() {
        let config = Config::default();
        assert_eq!(config.password, "1234");
        assert_eq!(config.bus.keypad_address, 0x20);
        assert_eq!(config.bus.display_address, 0x27);
        assert_eq!(config.tones.heartbeat.note, MusicalNote::DSharp7);
        assert_eq!(config.tones.failure.note, MusicalNote::F4);
        assert_eq!(config.timing.defused_hold(), Duration::from_secs(60));
        assert_eq!(config.pins.board_size(), 10);
        config.validate().unwrap();
    }

    #[test]
    fn partial_files_fill_in_defaults() {
        let config: Config = serde_json::from_str(
            r#"{ "password": "A#", "keypad_source": "direct", "timing": { "poll_ms": 5 } }"#,
        )
        .unwrap();
        assert_eq!(config.password, "A#");
        assert_eq!(config.keypad_source, KeypadSource::Direct);
        assert_eq!(config.timing.poll_ms, 5);
        assert_eq!(config.timing.idle_ms, 100);
        assert_eq!(config.key_map, KeyMap::DEFAULT_LAYOUT);
    }

    #[test]
    fn rejects_unusable_configs() {
        let mut config = Config::default();
        config.password.clear();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = Config::default();
        config.key_map = "123".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::KeyMap(_))));

        let mut config = Config::default();
        config.bus.display_address = 0x20;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = Config::default();
        config.pins.success_led = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }
}
