//! Presence mode and aggregation rule

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which schedule table applies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Home,
    Away,
}

impl Mode {
    pub const ALL: [Mode; 2] = [Mode::Home, Mode::Away];

    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Home => "home",
            Mode::Away => "away",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "home" => Ok(Mode::Home),
            "away" => Ok(Mode::Away),
            other => Err(format!("unknown mode '{}'", other)),
        }
    }
}

/// How presence entities are combined into a [`Mode`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresenceRule {
    /// Home when at least one valid entity is home
    #[default]
    AnyoneHome,
    /// Home only when every valid entity is home
    EveryoneHome,
    /// Home when the user expression evaluates truthy
    Custom,
}

impl PresenceRule {
    pub fn as_str(&self) -> &'static str {
        match self {
            PresenceRule::AnyoneHome => "anyone_home",
            PresenceRule::EveryoneHome => "everyone_home",
            PresenceRule::Custom => "custom",
        }
    }
}

impl fmt::Display for PresenceRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PresenceRule {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "anyone_home" => Ok(PresenceRule::AnyoneHome),
            "everyone_home" => Ok(PresenceRule::EveryoneHome),
            "custom" => Ok(PresenceRule::Custom),
            other => Err(format!("unknown presence rule '{}'", other)),
        }
    }
}
