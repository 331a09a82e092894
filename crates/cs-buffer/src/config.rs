//! Buffer configuration and its validating constructors

use crate::error::{BufferError, BufferResult};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Longest buffer window (one day), in minutes
pub const MAX_TIME_MINUTES: u32 = 1440;

/// Kind tag a buffer applies to when none is given
pub const DEFAULT_APPLIES_TO: &str = "climate";

/// Suppression parameters for one tier (global, entity or slot)
///
/// Always valid once constructed: `time_minutes` is within one day and
/// `value_delta` is a finite, non-negative number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value")]
pub struct BufferConfig {
    /// Window after a manual change during which it counts as recent
    pub time_minutes: u32,
    /// Dead-band around the target inside which no change is applied
    pub value_delta: f64,
    pub enabled: bool,
    /// Device kind tag this buffer was written for
    pub applies_to: String,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            time_minutes: 15,
            value_delta: 2.0,
            enabled: true,
            applies_to: DEFAULT_APPLIES_TO.to_string(),
        }
    }
}

impl BufferConfig {
    pub fn new(
        time_minutes: u32,
        value_delta: f64,
        enabled: bool,
        applies_to: impl Into<String>,
    ) -> BufferResult<Self> {
        let config = Self {
            time_minutes,
            value_delta,
            enabled,
            applies_to: applies_to.into(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Parse a `{time_minutes, value_delta, enabled?, applies_to?}` object
    ///
    /// `enabled` defaults to true and `applies_to` to `climate`.
    pub fn from_value(value: &Value) -> BufferResult<Self> {
        let obj = value
            .as_object()
            .ok_or_else(|| BufferError::config("buffer", "expected an object"))?;

        let time_minutes = match obj.get("time_minutes") {
            Some(v) => parse_minutes(v)?,
            None => return Err(BufferError::config("time_minutes", "missing")),
        };
        let value_delta = match obj.get("value_delta") {
            Some(v) => v
                .as_f64()
                .ok_or_else(|| BufferError::config("value_delta", "expected a number"))?,
            None => return Err(BufferError::config("value_delta", "missing")),
        };
        let enabled = match obj.get("enabled") {
            None | Some(Value::Null) => true,
            Some(Value::Bool(b)) => *b,
            Some(_) => return Err(BufferError::config("enabled", "expected a boolean")),
        };
        let applies_to = match obj.get("applies_to") {
            None | Some(Value::Null) => DEFAULT_APPLIES_TO.to_string(),
            Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
            Some(_) => {
                return Err(BufferError::config(
                    "applies_to",
                    "expected a non-empty string",
                ))
            }
        };

        Self::new(time_minutes, value_delta, enabled, applies_to)
    }

    pub fn validate(&self) -> BufferResult<()> {
        if self.time_minutes > MAX_TIME_MINUTES {
            return Err(BufferError::config(
                "time_minutes",
                format!("must be between 0 and {}", MAX_TIME_MINUTES),
            ));
        }
        if !self.value_delta.is_finite() || self.value_delta < 0.0 {
            return Err(BufferError::config(
                "value_delta",
                "must be a non-negative number",
            ));
        }
        if self.applies_to.trim().is_empty() {
            return Err(BufferError::config("applies_to", "must not be empty"));
        }
        Ok(())
    }

    pub fn time_window(&self) -> Duration {
        Duration::minutes(i64::from(self.time_minutes))
    }

    pub fn to_value(&self) -> Value {
        serde_json::json!({
            "time_minutes": self.time_minutes,
            "value_delta": self.value_delta,
            "enabled": self.enabled,
            "applies_to": self.applies_to,
        })
    }
}

impl TryFrom<Value> for BufferConfig {
    type Error = BufferError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        Self::from_value(&value)
    }
}

fn parse_minutes(value: &Value) -> BufferResult<u32> {
    let minutes = value
        .as_f64()
        .filter(|m| m.is_finite())
        .ok_or_else(|| BufferError::config("time_minutes", "expected a number"))?;
    if minutes < 0.0 || minutes > f64::from(MAX_TIME_MINUTES) {
        return Err(BufferError::config(
            "time_minutes",
            format!("must be between 0 and {}", MAX_TIME_MINUTES),
        ));
    }
    if minutes.fract() != 0.0 {
        return Err(BufferError::config("time_minutes", "must be whole minutes"));
    }
    Ok(minutes as u32)
}
