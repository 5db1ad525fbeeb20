//! Battle configuration.
//!
//! Settings come from an external provider as named values grouped in
//! sections. They are read and validated once, when a match is created, so a
//! match can never start with undefined turn or fatigue parameters.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::castle::CastleConfig;
use super::hand::DEFAULT_START_HAND_SIZE;

/// Section holding match rules.
pub const BATTLE_SECTION: &str = "BattleConfiguration";

/// Section holding deck options.
pub const DECK_SECTION: &str = "CustomDecks";

/// Players per match. Fixed.
pub const MATCH_SIZE: usize = 2;

/// Source of named settings.
pub trait ConfigProvider: Send + Sync {
    fn get_int(&self, section: &str, key: &str) -> Option<i64>;
    fn get_bool(&self, section: &str, key: &str) -> Option<bool>;
    fn get_str(&self, section: &str, key: &str) -> Option<String>;
}

/// JSON shaped as `{"Section": {"key": value}}`.
impl ConfigProvider for serde_json::Value {
    fn get_int(&self, section: &str, key: &str) -> Option<i64> {
        let value = self.get(section)?.get(key)?;
        value
            .as_i64()
            .or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()))
    }

    fn get_bool(&self, section: &str, key: &str) -> Option<bool> {
        let value = self.get(section)?.get(key)?;
        value
            .as_bool()
            .or_else(|| value.as_str().and_then(|s| s.trim().to_lowercase().parse().ok()))
    }

    fn get_str(&self, section: &str, key: &str) -> Option<String> {
        self.get(section)?.get(key)?.as_str().map(str::to_string)
    }
}

/// Flat in-memory settings, keyed by `(section, key)`.
#[derive(Debug, Clone, Default)]
pub struct Settings {
    values: HashMap<(String, String), String>,
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, section: &str, key: &str, value: impl ToString) -> &mut Self {
        self.values
            .insert((section.to_string(), key.to_string()), value.to_string());
        self
    }

    pub fn with(mut self, section: &str, key: &str, value: impl ToString) -> Self {
        self.set(section, key, value);
        self
    }

    fn raw(&self, section: &str, key: &str) -> Option<&str> {
        self.values
            .get(&(section.to_string(), key.to_string()))
            .map(String::as_str)
    }
}

impl ConfigProvider for Settings {
    fn get_int(&self, section: &str, key: &str) -> Option<i64> {
        self.raw(section, key)?.trim().parse().ok()
    }

    fn get_bool(&self, section: &str, key: &str) -> Option<bool> {
        self.raw(section, key)?.trim().to_lowercase().parse().ok()
    }

    fn get_str(&self, section: &str, key: &str) -> Option<String> {
        self.raw(section, key).map(str::to_string)
    }
}

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    Missing(&'static str),
    Invalid { key: &'static str, value: i64 },
    FatigueStartAboveLimit { start: u32, limit: u32 },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing(key) => write!(f, "Missing setting {}", key),
            Self::Invalid { key, value } => write!(f, "Invalid value {} for setting {}", value, key),
            Self::FatigueStartAboveLimit { start, limit } => write!(
                f,
                "fatigueDamageStart ({}) exceeds fatigueLimit ({})",
                start, limit
            ),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Rules a match runs with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BattleConfig {
    /// Seconds per turn
    pub turn_time: u32,

    /// Turn index at which fatigue begins
    pub fatigue_turn_start: u32,

    /// First fatigue damage
    pub fatigue_damage_start: u32,

    /// Fatigue damage ceiling
    pub fatigue_limit: u32,

    pub start_hand_size: usize,

    pub castle: CastleConfig,
}

impl Default for BattleConfig {
    fn default() -> Self {
        Self {
            turn_time: 30,
            fatigue_turn_start: 30,
            fatigue_damage_start: 1,
            fatigue_limit: 10,
            start_hand_size: DEFAULT_START_HAND_SIZE,
            castle: CastleConfig::default(),
        }
    }
}

impl BattleConfig {
    /// Read and validate the battle section.
    pub fn load(provider: &dyn ConfigProvider) -> Result<Self, ConfigError> {
        let required = |key: &'static str, min: i64| -> Result<u32, ConfigError> {
            let value = provider
                .get_int(BATTLE_SECTION, key)
                .ok_or(ConfigError::Missing(key))?;
            to_u32(key, value, min)
        };
        let optional = |key: &'static str, min: i64, default: u32| -> Result<u32, ConfigError> {
            match provider.get_int(BATTLE_SECTION, key) {
                Some(value) => to_u32(key, value, min),
                None => Ok(default),
            }
        };

        let turn_time = required("turnTime", 1)?;
        let fatigue_turn_start = required("fatigueTurnStart", 0)?;
        let fatigue_damage_start = required("fatigueDamageStart", 0)?;
        let fatigue_limit = required("fatigueLimit", 0)?;

        if fatigue_damage_start > fatigue_limit {
            return Err(ConfigError::FatigueStartAboveLimit {
                start: fatigue_damage_start,
                limit: fatigue_limit,
            });
        }

        if let Some(size) = provider.get_int(BATTLE_SECTION, "matchSize") {
            if size != MATCH_SIZE as i64 {
                return Err(ConfigError::Invalid { key: "matchSize", value: size });
            }
        }

        let defaults = CastleConfig::default();
        let resource_value = optional("resourceValue", 0, 5)?;
        let resource_income = optional("resourceIncome", 0, 2)?;
        let castle = CastleConfig {
            tower_health: optional("towerHealth", 1, defaults.tower_health)?,
            tower_max_health: optional("towerMaxHealth", 1, defaults.tower_max_health)?,
            wall_health: optional("wallHealth", 0, defaults.wall_health)?,
            wall_max_health: optional("wallMaxHealth", 0, defaults.wall_max_health)?,
            resources: defaults
                .resources
                .into_iter()
                .map(|(name, _, _)| (name, resource_value, resource_income))
                .collect(),
        };

        // a tower starting at its max wins on the first check
        if castle.tower_health >= castle.tower_max_health {
            return Err(ConfigError::Invalid {
                key: "towerHealth",
                value: i64::from(castle.tower_health),
            });
        }
        if castle.wall_health > castle.wall_max_health {
            return Err(ConfigError::Invalid {
                key: "wallHealth",
                value: i64::from(castle.wall_health),
            });
        }

        Ok(Self {
            turn_time,
            fatigue_turn_start,
            fatigue_damage_start,
            fatigue_limit,
            start_hand_size: optional("startHandSize", 1, DEFAULT_START_HAND_SIZE as u32)? as usize,
            castle,
        })
    }

    pub fn turn_duration(&self) -> Duration {
        Duration::from_secs(u64::from(self.turn_time))
    }
}

fn to_u32(key: &'static str, value: i64, min: i64) -> Result<u32, ConfigError> {
    if value < min {
        return Err(ConfigError::Invalid { key, value });
    }
    u32::try_from(value).map_err(|_| ConfigError::Invalid { key, value })
}

/// Deck construction options.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeckConfig {
    /// Card names making up every deck; `None` uses the whole library
    pub custom_deck: Option<Vec<String>>,

    pub shuffle: bool,
}

impl DeckConfig {
    /// Read the deck section. Missing values fall back to defaults.
    pub fn load(provider: &dyn ConfigProvider) -> Self {
        let is_custom = provider.get_bool(DECK_SECTION, "isCustomDeck").unwrap_or(false);
        let custom_deck = if is_custom {
            provider.get_str(DECK_SECTION, "customDecks").map(|names| {
                names
                    .split('|')
                    .map(|n| n.trim().to_string())
                    .filter(|n| !n.is_empty())
                    .collect()
            })
        } else {
            None
        };

        Self {
            custom_deck,
            shuffle: provider.get_bool(DECK_SECTION, "doShuffle").unwrap_or(false),
        }
    }
}
