//! Times of day and durations as written in the config file

use std::time::Duration;

use chrono::NaiveTime;

use crate::error::{ConfigError, ConfigResult};

/// Parse `HH:MM` or `HH:MM:SS`
pub fn parse_time(key: &str, value: &str) -> ConfigResult<NaiveTime> {
    let value = value.trim();
    NaiveTime::parse_from_str(value, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M"))
        .map_err(|_| ConfigError::InvalidValue {
            key: key.to_string(),
            reason: format!("'{}' is not a time of day (HH:MM or HH:MM:SS)", value),
        })
}

pub fn parse_optional_time(key: &str, value: Option<&str>) -> ConfigResult<Option<NaiveTime>> {
    value.map(|v| parse_time(key, v)).transpose()
}

/// Seconds to a duration; zero is rejected
pub fn seconds(key: &str, value: u64) -> ConfigResult<Duration> {
    if value == 0 {
        return Err(ConfigError::InvalidValue {
            key: key.to_string(),
            reason: "must be at least one second".to_string(),
        });
    }
    Ok(Duration::from_secs(value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_time_formats() {
        assert_eq!(
            parse_time("start", "18:00").unwrap(),
            NaiveTime::from_hms_opt(18, 0, 0).unwrap()
        );
        assert_eq!(
            parse_time("start", " 06:30:15 ").unwrap(),
            NaiveTime::from_hms_opt(6, 30, 15).unwrap()
        );
    }

    #[test]
    fn test_parse_time_rejects_garbage() {
        for bad in ["25:00", "6pm", "", "12"] {
            assert!(matches!(
                parse_time("stop", bad),
                Err(ConfigError::InvalidValue { .. })
            ));
        }
    }

    #[test]
    fn test_zero_seconds_rejected() {
        assert!(seconds("hold_on_seconds", 0).is_err());
        assert_eq!(seconds("hold_on_seconds", 90).unwrap(), Duration::from_secs(90));
    }
}
