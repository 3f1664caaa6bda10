// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for duration parsing (Go-style duration format)

#[cfg(test)]
mod tests {
    use super::super::{deserialize_optional, format_duration, parse_duration, parse_setting};
    use serde::Deserialize;
    use std::time::Duration;

    // ========================================================================
    // Valid Duration Parsing Tests
    // ========================================================================

    #[test]
    fn test_parse_duration_single_units() {
        assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
        assert_eq!(parse_duration("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_duration("5m").unwrap(), Duration::from_secs(300));
        assert_eq!(parse_duration("2h").unwrap(), Duration::from_secs(7200));
        assert_eq!(parse_duration("1d").unwrap(), Duration::from_secs(86400));
    }

    #[test]
    fn test_parse_duration_compound() {
        assert_eq!(
            parse_duration("1h30m").unwrap(),
            Duration::from_secs(5400),
            "1h30m should be 90 minutes"
        );
        assert_eq!(
            parse_duration("1m30s500ms").unwrap(),
            Duration::from_millis(90_500)
        );
    }

    #[test]
    fn test_parse_duration_trims_whitespace() {
        assert_eq!(parse_duration(" 60s ").unwrap(), Duration::from_secs(60));
    }

    // ========================================================================
    // Invalid Format Tests
    // ========================================================================

    #[test]
    fn test_parse_duration_empty_string() {
        let err = parse_duration("").unwrap_err();
        assert!(
            err.to_string().contains("cannot be empty"),
            "Error should mention empty string"
        );
    }

    #[test]
    fn test_parse_duration_missing_unit() {
        let err = parse_duration("30").unwrap_err();
        assert!(err.to_string().contains("must end with a unit"));

        assert!(parse_duration("1h30").is_err());
    }

    #[test]
    fn test_parse_duration_missing_value() {
        assert!(parse_duration("s").is_err());
        assert!(parse_duration("1hm").is_err());
    }

    #[test]
    fn test_parse_duration_invalid_unit() {
        let err = parse_duration("10x").unwrap_err();
        assert!(err.to_string().contains("Unsupported duration unit 'x'"));

        assert!(parse_duration("1.5h").is_err());
        assert!(parse_duration("-5s").is_err());
    }

    #[test]
    fn test_parse_duration_zero_is_rejected() {
        let err = parse_duration("0s").unwrap_err();
        assert!(err.to_string().contains("greater than zero"));
    }

    #[test]
    fn test_parse_duration_overflow() {
        assert!(parse_duration("99999999999999999999s").is_err());
        assert!(parse_duration(&format!("{}d", u64::MAX)).is_err());
    }

    // ========================================================================
    // Formatting
    // ========================================================================

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(30)), "30s");
        assert_eq!(format_duration(Duration::from_secs(60)), "1m");
        assert_eq!(format_duration(Duration::from_secs(5400)), "1h30m");
        assert_eq!(format_duration(Duration::from_secs(3661)), "1h1m1s");
        assert_eq!(format_duration(Duration::from_millis(1500)), "1s500ms");
        assert_eq!(format_duration(Duration::from_millis(200)), "200ms");
    }

    #[test]
    fn test_format_then_parse_is_stable() {
        for secs in [1, 59, 60, 300, 3600, 5400, 86399] {
            let duration = Duration::from_secs(secs);
            assert_eq!(parse_duration(&format_duration(duration)).unwrap(), duration);
        }
    }

    // ========================================================================
    // Setting values
    // ========================================================================

    #[test]
    fn test_parse_setting_accepts_bare_seconds() {
        assert_eq!(parse_setting("600").unwrap(), Duration::from_secs(600));
        assert_eq!(parse_setting(" 45 ").unwrap(), Duration::from_secs(45));
        assert_eq!(parse_setting("1h").unwrap(), Duration::from_secs(3600));
    }

    #[test]
    fn test_parse_setting_allows_zero() {
        assert_eq!(parse_setting("0").unwrap(), Duration::ZERO);
        assert_eq!(parse_setting("0s").unwrap(), Duration::ZERO);
        assert_eq!(parse_setting("0m0s").unwrap(), Duration::ZERO);
    }

    #[test]
    fn test_parse_setting_rejects_garbage() {
        assert!(parse_setting("").is_err());
        assert!(parse_setting("-5").is_err());
        assert!(parse_setting("10x").is_err());
        assert!(parse_setting("99999999999999999999999").is_err());
    }

    // ========================================================================
    // Serde helper
    // ========================================================================

    #[derive(Debug, Deserialize)]
    struct Holder {
        #[serde(default, deserialize_with = "deserialize_optional")]
        interval: Option<Duration>,
    }

    #[test]
    fn test_deserialize_string_and_number() {
        let holder: Holder = serde_yaml::from_str("interval: 45s").unwrap();
        assert_eq!(holder.interval, Some(Duration::from_secs(45)));

        let holder: Holder = serde_yaml::from_str("interval: 300").unwrap();
        assert_eq!(holder.interval, Some(Duration::from_secs(300)));

        let holder: Holder = serde_yaml::from_str("interval: \"120\"").unwrap();
        assert_eq!(holder.interval, Some(Duration::from_secs(120)));

        let holder: Holder = serde_yaml::from_str("interval: 0s").unwrap();
        assert_eq!(holder.interval, Some(Duration::ZERO));

        let holder: Holder = serde_yaml::from_str("interval: \"\"").unwrap();
        assert_eq!(holder.interval, None);

        let holder: Holder = serde_yaml::from_str("{}").unwrap();
        assert_eq!(holder.interval, None);
    }

    #[test]
    fn test_deserialize_rejects_garbage() {
        let err = serde_yaml::from_str::<Holder>("interval: soon").unwrap_err();
        assert!(err.to_string().contains("without a value"), "{err}");
    }
}
