use std::time::Duration;

use tracing::warn;

use crate::ByteSize;

/// Parsing of typed configuration values from environment-variable strings.
///
/// A malformed value is reported once at warn level and the compiled-in
/// default is kept, so a bad environment never aborts startup.
pub trait ParsableConfigValue: Sized {
    /// Parse a raw string into this value type, or None if malformed.
    fn parse_value(raw: &str) -> Option<Self>;

    fn parse(name: &str, maybe_value: Option<String>, default: Self) -> Self {
        let Some(raw) = maybe_value else {
            return default;
        };

        match Self::parse_value(raw.trim()) {
            Some(v) => v,
            None => {
                warn!(name, value = %raw, "Ignoring unparsable configuration override");
                default
            },
        }
    }
}

macro_rules! impl_parsable_from_str {
    ($($t:ty),+) => {
        $(
            impl ParsableConfigValue for $t {
                fn parse_value(raw: &str) -> Option<Self> {
                    raw.parse().ok()
                }
            }
        )+
    };
}

impl_parsable_from_str!(u16, u32, u64, usize, i32, i64, f64, ByteSize);

impl ParsableConfigValue for String {
    fn parse_value(raw: &str) -> Option<Self> {
        Some(raw.to_string())
    }
}

impl ParsableConfigValue for bool {
    fn parse_value(raw: &str) -> Option<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Some(true),
            "0" | "false" | "no" | "off" => Some(false),
            _ => None,
        }
    }
}

impl ParsableConfigValue for Duration {
    /// Accepts "250ms", "2s", "1.5s", or a plain number of seconds.
    fn parse_value(raw: &str) -> Option<Self> {
        let lower = raw.to_ascii_lowercase();

        if let Some(millis) = lower.strip_suffix("ms") {
            let v: f64 = millis.trim().parse().ok()?;
            return (v.is_finite() && v >= 0.).then(|| Duration::from_secs_f64(v / 1000.));
        }

        let seconds = lower.strip_suffix('s').unwrap_or(&lower);
        let v: f64 = seconds.trim().parse().ok()?;
        (v.is_finite() && v >= 0.).then(|| Duration::from_secs_f64(v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_value_keeps_default() {
        assert_eq!(u64::parse("x", None, 7), 7);
    }

    #[test]
    fn test_malformed_value_keeps_default() {
        assert_eq!(u64::parse("x", Some("twelve".to_string()), 7), 7);
        assert!(bool::parse("x", Some("maybe".to_string()), true));
    }

    #[test]
    fn test_parses_typed_values() {
        assert_eq!(u64::parse("x", Some("12".to_string()), 7), 12);
        assert!(!bool::parse("x", Some("off".to_string()), true));
        assert_eq!(
            ByteSize::parse("x", Some("64mb".to_string()), ByteSize::new(0)),
            ByteSize::from("64mb")
        );
    }

    #[test]
    fn test_duration_formats() {
        let half_sec = Duration::from_millis(500);
        assert_eq!(Duration::parse_value("500ms"), Some(half_sec));
        assert_eq!(Duration::parse_value("0.5s"), Some(half_sec));
        assert_eq!(Duration::parse_value("0.5"), Some(half_sec));
        assert_eq!(Duration::parse_value("2s"), Some(Duration::from_secs(2)));
        assert_eq!(Duration::parse_value("-1s"), None);
    }
}
