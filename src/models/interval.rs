use chrono::Duration;
use validator::ValidationError;

pub const SUPPORTED_INTERVALS: [&str; 14] = [
    "1m", "3m", "5m", "15m", "30m", "1h", "2h", "4h", "8h", "12h", "1d", "3d", "1w", "1M",
];

pub const SUPPORTED_PERIODS: [&str; 6] = ["1d", "5d", "30d", "3mo", "6mo", "1y"];

pub fn interval_ms(interval: &str) -> Option<u64> {
    match interval {
        "1m" => Some(60_000),
        "3m" => Some(180_000),
        "5m" => Some(300_000),
        "15m" => Some(900_000),
        "30m" => Some(1_800_000),
        "1h" => Some(3_600_000),
        "2h" => Some(7_200_000),
        "4h" => Some(14_400_000),
        "8h" => Some(28_800_000),
        "12h" => Some(43_200_000),
        "1d" => Some(86_400_000),
        "3d" => Some(259_200_000),
        "1w" => Some(604_800_000),
        "1M" => Some(2_592_000_000),
        _ => None,
    }
}

/// History span requested from a provider for a period string such as `5d` or `3mo`.
pub fn period_duration(period: &str) -> Option<Duration> {
    match period {
        "1d" => Some(Duration::days(1)),
        "5d" => Some(Duration::days(5)),
        "30d" => Some(Duration::days(30)),
        "3mo" => Some(Duration::days(90)),
        "6mo" => Some(Duration::days(180)),
        "1y" => Some(Duration::days(365)),
        _ => None,
    }
}

pub fn validate_interval(value: &str) -> Result<(), ValidationError> {
    if interval_ms(value).is_some() {
        return Ok(());
    }

    let mut error = ValidationError::new("unsupported_interval");
    error.message = Some(
        format!(
            "interval must be one of: {}",
            SUPPORTED_INTERVALS.join(", ")
        )
        .into(),
    );
    Err(error)
}

pub fn validate_period(value: &str) -> Result<(), ValidationError> {
    if period_duration(value).is_some() {
        return Ok(());
    }

    let mut error = ValidationError::new("unsupported_period");
    error.message = Some(format!("period must be one of: {}", SUPPORTED_PERIODS.join(", ")).into());
    Err(error)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interval_ms_supports_all_intervals() {
        for interval in SUPPORTED_INTERVALS {
            assert!(
                interval_ms(interval).is_some(),
                "missing interval: {}",
                interval
            );
        }
    }

    #[test]
    fn interval_ms_rejects_unknown() {
        assert!(interval_ms("10m").is_none());
    }

    #[test]
    fn validate_interval_rejects_unknown() {
        let error = validate_interval("10m").unwrap_err();
        assert_eq!(error.code, "unsupported_interval");
    }

    #[test]
    fn period_duration_covers_supported_periods() {
        for period in SUPPORTED_PERIODS {
            assert!(period_duration(period).is_some(), "missing period: {}", period);
        }
        assert_eq!(period_duration("3mo"), Some(Duration::days(90)));
        assert_eq!(validate_period("2w").unwrap_err().code, "unsupported_period");
    }
}
