//! Typed environment-variable lookups
//!
//! Unset or blank variables fall back to the supplied default. A variable that
//! is set but does not parse is reported as [`CommonError::InvalidValue`] rather
//! than silently replaced, so a typo in a deployment file surfaces at startup.

use std::str::FromStr;

use crate::error::{CommonError, Result};

/// Read a variable, treating blank values as unset.
pub fn var(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Read and parse a variable, or return `default` when it is not set.
pub fn parse_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match var(key) {
        Some(raw) => raw
            .parse()
            .map_err(|e| CommonError::invalid_value(key, raw.clone(), e)),
        None => Ok(default),
    }
}

/// Read a boolean flag. Accepts `true/false`, `1/0`, `yes/no`, `on/off`.
pub fn flag(key: &str, default: bool) -> Result<bool> {
    match var(key) {
        Some(raw) => parse_flag(&raw)
            .ok_or_else(|| CommonError::invalid_value(key, raw.clone(), "expected a boolean")),
        None => Ok(default),
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_flag_variants() {
        assert_eq!(parse_flag("TRUE"), Some(true));
        assert_eq!(parse_flag("on"), Some(true));
        assert_eq!(parse_flag("0"), Some(false));
        assert_eq!(parse_flag("No"), Some(false));
        assert_eq!(parse_flag("maybe"), None);
    }

    #[test]
    fn test_unset_variable_uses_default() {
        let value: usize = parse_or("COURTLOAD_TEST_SURELY_UNSET_VARIABLE", 42).unwrap();
        assert_eq!(value, 42);
        assert!(flag("COURTLOAD_TEST_SURELY_UNSET_FLAG", true).unwrap());
    }

    #[test]
    fn test_invalid_value_is_reported() {
        std::env::set_var("COURTLOAD_TEST_BAD_NUMBER", "twelve");
        let err = parse_or::<usize>("COURTLOAD_TEST_BAD_NUMBER", 1).unwrap_err();
        assert!(matches!(err, CommonError::InvalidValue { .. }));
        assert!(err.to_string().contains("twelve"));
        std::env::remove_var("COURTLOAD_TEST_BAD_NUMBER");
    }
}
