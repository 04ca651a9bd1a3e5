pub mod database;
pub mod jwt;
pub mod rate_limit;
pub mod redis;
pub mod upload;

use std::env;

/// Lenient boolean env parsing shared by the config modules.
pub(crate) fn parse_bool_env(var_name: &str, default: bool) -> bool {
    env::var(var_name)
        .ok()
        .and_then(|value| parse_bool(&value))
        .unwrap_or(default)
}

/// `LOG_FORMAT=json` switches the log output to one JSON object per line.
pub fn json_logs_from_env() -> bool {
    env::var("LOG_FORMAT").is_ok_and(|value| is_json_format(&value))
}

fn is_json_format(value: &str) -> bool {
    value.trim().eq_ignore_ascii_case("json")
}

pub(crate) fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "y" | "on" => Some(true),
        "0" | "false" | "no" | "n" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::{is_json_format, parse_bool};

    #[test]
    fn accepts_common_spellings() {
        assert_eq!(parse_bool(" Yes "), Some(true));
        assert_eq!(parse_bool("off"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }

    #[test]
    fn json_log_format() {
        assert!(is_json_format("json"));
        assert!(is_json_format(" JSON "));
        assert!(!is_json_format("text"));
        assert!(!is_json_format(""));
    }
}
