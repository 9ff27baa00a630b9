//! Environment variable helpers used by `from_env` implementations.

use crate::config::{ConfigError, ConfigSource};
use std::collections::HashMap;
use std::env;
use std::str::FromStr;

/// Read a string variable, recording where the value came from.
pub fn env_string(
    var: &str,
    field: &str,
    sources: &mut HashMap<String, ConfigSource>,
) -> Option<String> {
    match env::var(var) {
        Ok(value) if !value.trim().is_empty() => {
            sources.insert(field.to_string(), ConfigSource::EnvVar(var.to_string()));
            Some(value)
        }
        _ => None,
    }
}

/// Read and parse a variable, producing an `InvalidValue` error on a bad value.
pub fn env_parse<T: FromStr>(
    var: &str,
    field: &str,
    expected: &str,
    sources: &mut HashMap<String, ConfigSource>,
) -> Result<Option<T>, ConfigError> {
    match env_string(var, field, sources) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::invalid_value(field, raw, expected)),
        None => Ok(None),
    }
}

/// Read a boolean flag. Accepts `1/0`, `true/false`, `yes/no`, `on/off`.
pub fn env_flag(
    var: &str,
    field: &str,
    sources: &mut HashMap<String, ConfigSource>,
) -> Result<Option<bool>, ConfigError> {
    match env_string(var, field, sources) {
        Some(raw) => match raw.trim().to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(Some(true)),
            "0" | "false" | "no" | "off" => Ok(Some(false)),
            _ => Err(ConfigError::invalid_value(field, raw, "a boolean (true/false)")),
        },
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_env_parse_records_source() {
        env::set_var("GROVE_CORE_TEST_NUMBER", "42");
        let mut sources = HashMap::new();
        let value: Option<usize> =
            env_parse("GROVE_CORE_TEST_NUMBER", "number", "an integer", &mut sources).unwrap();
        env::remove_var("GROVE_CORE_TEST_NUMBER");

        assert_eq!(value, Some(42));
        assert!(sources["number"].is_env_var());
    }

    #[test]
    #[serial]
    fn test_env_parse_rejects_garbage() {
        env::set_var("GROVE_CORE_TEST_NUMBER", "forty-two");
        let mut sources = HashMap::new();
        let result: Result<Option<usize>, _> =
            env_parse("GROVE_CORE_TEST_NUMBER", "number", "an integer", &mut sources);
        env::remove_var("GROVE_CORE_TEST_NUMBER");

        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    #[serial]
    fn test_env_flag_values() {
        let mut sources = HashMap::new();
        env::set_var("GROVE_CORE_TEST_FLAG", "yes");
        assert_eq!(env_flag("GROVE_CORE_TEST_FLAG", "flag", &mut sources).unwrap(), Some(true));
        env::set_var("GROVE_CORE_TEST_FLAG", "off");
        assert_eq!(env_flag("GROVE_CORE_TEST_FLAG", "flag", &mut sources).unwrap(), Some(false));
        env::set_var("GROVE_CORE_TEST_FLAG", "maybe");
        assert!(env_flag("GROVE_CORE_TEST_FLAG", "flag", &mut sources).is_err());
        env::remove_var("GROVE_CORE_TEST_FLAG");
        assert_eq!(env_flag("GROVE_CORE_TEST_FLAG", "flag", &mut sources).unwrap(), None);
    }
}
