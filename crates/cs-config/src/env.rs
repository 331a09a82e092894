//! Environment substitution in YAML values
//!
//! Two forms are supported:
//! - `${VAR}` or `${VAR:-fallback}` anywhere inside a string scalar
//! - `!env_var VAR` as a whole value

use crate::error::{ConfigError, ConfigResult};
use regex::{Captures, Regex};
use serde_yaml::Value;
use std::sync::OnceLock;
use tracing::debug;

fn placeholder() -> ConfigResult<&'static Regex> {
    static PATTERN: OnceLock<Result<Regex, regex::Error>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}"))
        .as_ref()
        .map_err(|e| ConfigError::invalid("${...}", e.to_string()))
}

/// Substitute environment variables throughout a YAML tree
pub fn interpolate(value: Value) -> ConfigResult<Value> {
    interpolate_with(value, &|name| std::env::var(name).ok())
}

/// Substitute using an explicit variable lookup
pub fn interpolate_with(value: Value, lookup: &dyn Fn(&str) -> Option<String>) -> ConfigResult<Value> {
    match value {
        Value::String(s) => interpolate_str(&s, lookup).map(Value::String),
        Value::Mapping(map) => {
            let mut result = serde_yaml::Mapping::new();
            for (k, v) in map {
                result.insert(k, interpolate_with(v, lookup)?);
            }
            Ok(Value::Mapping(result))
        }
        Value::Sequence(seq) => seq
            .into_iter()
            .map(|v| interpolate_with(v, lookup))
            .collect::<ConfigResult<Vec<_>>>()
            .map(Value::Sequence),
        Value::Tagged(tagged) if tagged.tag == "env_var" => {
            let Value::String(var) = tagged.value else {
                return Err(ConfigError::invalid(
                    "!env_var",
                    "environment variable name must be a string",
                ));
            };
            let resolved = lookup(&var).ok_or(ConfigError::EnvVarNotFound { var: var.clone() })?;
            debug!(var = %var, "Substituted env var");
            Ok(Value::String(resolved))
        }
        other => Ok(other),
    }
}

fn interpolate_str(input: &str, lookup: &dyn Fn(&str) -> Option<String>) -> ConfigResult<String> {
    let mut missing = None;
    let output = placeholder()?.replace_all(input, |caps: &Captures| {
        let name = &caps[1];
        match (lookup(name), caps.get(2)) {
            (Some(value), _) => value,
            (None, Some(fallback)) => fallback.as_str().to_string(),
            (None, None) => {
                missing.get_or_insert_with(|| name.to_string());
                String::new()
            }
        }
    });

    match missing {
        Some(var) => Err(ConfigError::EnvVarNotFound { var }),
        None => Ok(output.into_owned()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup(name: &str) -> Option<String> {
        match name {
            "DATA_DIR" => Some("/var/lib/climate".to_string()),
            "PERSON" => Some("alex".to_string()),
            _ => None,
        }
    }

    #[test]
    fn test_inline_placeholders() {
        let value = Value::String("${DATA_DIR}/state".into());
        assert_eq!(
            interpolate_with(value, &lookup).unwrap(),
            Value::String("/var/lib/climate/state".into())
        );

        let value = Value::String("person.${PERSON}".into());
        assert_eq!(
            interpolate_with(value, &lookup).unwrap(),
            Value::String("person.alex".into())
        );
    }

    #[test]
    fn test_fallback() {
        let value = Value::String("${LOG_FILTER:-info}".into());
        assert_eq!(
            interpolate_with(value, &lookup).unwrap(),
            Value::String("info".into())
        );
    }

    #[test]
    fn test_missing_variable() {
        let value = Value::String("${NOPE}".into());
        assert!(matches!(
            interpolate_with(value, &lookup),
            Err(ConfigError::EnvVarNotFound { var }) if var == "NOPE"
        ));
    }

    #[test]
    fn test_env_var_tag_and_nesting() {
        let yaml: Value = serde_yaml::from_str(
            "storage_dir: !env_var DATA_DIR\npresence:\n  entities:\n    - person.${PERSON}\n    - 5\n",
        )
        .unwrap();
        let resolved = interpolate_with(yaml, &lookup).unwrap();
        assert_eq!(resolved["storage_dir"], Value::String("/var/lib/climate".into()));
        assert_eq!(
            resolved["presence"]["entities"][0],
            Value::String("person.alex".into())
        );
        assert_eq!(resolved["presence"]["entities"][1].as_i64(), Some(5));
    }
}
