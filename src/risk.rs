use std::fmt;

/// Attendance strictly below this is at risk.
pub const RISK_THRESHOLD: f64 = 75.0;

/// Lower bound of the export's "Warning" band.
pub const WARNING_THRESHOLD: f64 = 65.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttendanceStatus {
    Good,
    Warning,
    AtRisk,
}

impl AttendanceStatus {
    pub fn classify(percentage: f64) -> Self {
        if percentage >= RISK_THRESHOLD {
            AttendanceStatus::Good
        } else if percentage >= WARNING_THRESHOLD {
            AttendanceStatus::Warning
        } else {
            AttendanceStatus::AtRisk
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            AttendanceStatus::Good => "Good",
            AttendanceStatus::Warning => "Warning",
            AttendanceStatus::AtRisk => "At Risk",
        }
    }
}

impl fmt::Display for AttendanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

pub fn is_at_risk(percentage: f64) -> bool {
    percentage < RISK_THRESHOLD
}

/// `part / whole * 100`, or `0.0` when `whole` is zero. Unrounded.
pub fn percentage(part: i64, whole: i64) -> f64 {
    if whole <= 0 {
        return 0.0;
    }
    part as f64 / whole as f64 * 100.0
}

pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

/// Percentage rounded to two decimals, the precision of every stored and
/// rolled-up figure except the per-student leaderboard.
pub fn percentage_2dp(part: i64, whole: i64) -> f64 {
    round_to(percentage(part, whole), 2)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_follow_expected_tiers() {
        assert_eq!(AttendanceStatus::classify(100.0), AttendanceStatus::Good);
        assert_eq!(AttendanceStatus::classify(75.0), AttendanceStatus::Good);
        assert_eq!(AttendanceStatus::classify(74.99), AttendanceStatus::Warning);
        assert_eq!(AttendanceStatus::classify(65.0), AttendanceStatus::Warning);
        assert_eq!(AttendanceStatus::classify(64.99), AttendanceStatus::AtRisk);
        assert_eq!(AttendanceStatus::AtRisk.to_string(), "At Risk");
    }

    #[test]
    fn risk_threshold_is_strict() {
        assert!(!is_at_risk(75.0));
        assert!(is_at_risk(74.99));
        assert!(is_at_risk(0.0));
    }

    #[test]
    fn percentage_handles_zero_denominator() {
        assert_eq!(percentage(8, 10), 80.0);
        assert_eq!(percentage(0, 0), 0.0);
        assert_eq!(percentage_2dp(2, 3), 66.67);
        assert_eq!(percentage_2dp(13, 30), 43.33);
    }

    #[test]
    fn rounding_respects_places() {
        assert_eq!(round_to(66.666, 1), 66.7);
        assert_eq!(round_to(66.666, 2), 66.67);
        assert_eq!(round_to(80.0, 2), 80.0);
    }
}
