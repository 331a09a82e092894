//! Coercion of expression results to a presence decision

use minijinja::value::{Value, ValueKind};
use std::convert::TryFrom;

/// Strings (compared case-insensitively) that count as "someone is home"
pub const TRUTHY_STRINGS: [&str; 5] = ["true", "yes", "on", "1", "home"];

/// Coerce an evaluated value to a boolean
///
/// Booleans pass through, numbers are true when non-zero, strings are true
/// only when they match [`TRUTHY_STRINGS`]. Everything else (none,
/// undefined, sequences, maps) is false.
pub fn coerce_bool(value: &Value) -> bool {
    match value.kind() {
        ValueKind::Bool => value.is_true(),
        ValueKind::Number => f64::try_from(value.clone())
            .map(|f| f != 0.0)
            .unwrap_or_else(|_| value.is_true()),
        ValueKind::String => value.as_str().map(coerce_str).unwrap_or(false),
        _ => false,
    }
}

/// Coerce a rendered template string
///
/// Numeric output follows the number rule so `{{ 2 }}` is truthy; anything
/// else follows the string rule.
pub fn coerce_rendered(output: &str) -> bool {
    let trimmed = output.trim();
    match trimmed.parse::<f64>() {
        Ok(f) => f != 0.0,
        Err(_) => coerce_str(trimmed),
    }
}

fn coerce_str(s: &str) -> bool {
    let lowered = s.trim().to_ascii_lowercase();
    TRUTHY_STRINGS.contains(&lowered.as_str())
}
