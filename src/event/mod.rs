//! The values flowing through an ingestion pipeline.

use std::{collections::BTreeMap, time::Duration};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use snafu::Snafu;

mod matrix;

pub use matrix::{Matrix, Series};

/// Key/value tags identifying one series of a matrix.
pub type LabelSet = BTreeMap<String, String>;

#[derive(Debug, Snafu, PartialEq, Eq)]
pub enum RangeError {
    #[snafu(display("range end {} is before its start {}", end, start))]
    EndBeforeStart {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
    #[snafu(display("range step must be greater than zero"))]
    ZeroStep,
}

/// The interval and resolution of a range query.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimeRange {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    step: Duration,
}

impl TimeRange {
    pub const DEFAULT_LOOKBACK: Duration = Duration::from_secs(5 * 60);
    pub const DEFAULT_STEP: Duration = Duration::from_secs(60);

    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>, step: Duration) -> Result<Self, RangeError> {
        if end < start {
            return Err(RangeError::EndBeforeStart { start, end });
        }
        if step.is_zero() {
            return Err(RangeError::ZeroStep);
        }
        Ok(Self { start, end, step })
    }

    /// A range of `lookback` ending at `end`.
    pub fn ending_at(end: DateTime<Utc>, lookback: Duration, step: Duration) -> Result<Self, RangeError> {
        // Lookbacks beyond chrono's range saturate to the earliest instant.
        let start = chrono::Duration::from_std(lookback)
            .ok()
            .and_then(|lookback| end.checked_sub_signed(lookback))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        Self::new(start, end, step)
    }

    /// The last five minutes at a one minute step.
    pub fn last_five_minutes() -> Self {
        Self::ending_at(Utc::now(), Self::DEFAULT_LOOKBACK, Self::DEFAULT_STEP)
            .expect("default range is always valid")
    }

    pub const fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub const fn end(&self) -> DateTime<Utc> {
        self.end
    }

    pub const fn step(&self) -> Duration {
        self.step
    }
}

impl Default for TimeRange {
    fn default() -> Self {
        Self::last_five_minutes()
    }
}

/// One value of one series, stamped with the resolution it was sampled at.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    pub labels: LabelSet,
    pub value: f64,
    pub timestamp: DateTime<Utc>,
    #[serde(with = "duration_secs")]
    pub step_size: Duration,
}

impl MetricSample {
    /// The step stored in the `stepSize` column, in nanoseconds.
    pub fn step_size_nanos(&self) -> f64 {
        self.step_size.as_nanos() as f64
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub(super) fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn rejects_inverted_range() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 5, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();

        assert_eq!(
            TimeRange::new(start, end, Duration::from_secs(60)),
            Err(RangeError::EndBeforeStart { start, end })
        );
    }

    #[test]
    fn rejects_zero_step() {
        let now = Utc::now();
        assert_eq!(TimeRange::new(now, now, Duration::ZERO), Err(RangeError::ZeroStep));
    }

    #[test]
    fn allows_empty_interval() {
        let now = Utc::now();
        let range = TimeRange::new(now, now, Duration::from_secs(1)).unwrap();
        assert_eq!(range.start(), range.end());
    }

    #[test]
    fn default_range_is_last_five_minutes() {
        let range = TimeRange::default();
        assert_eq!(range.end() - range.start(), chrono::Duration::minutes(5));
        assert_eq!(range.step(), Duration::from_secs(60));
    }

    #[test]
    fn sample_serializes_step_in_seconds() {
        let sample = MetricSample {
            labels: LabelSet::new(),
            value: 1.5,
            timestamp: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            step_size: Duration::from_millis(1500),
        };

        let json = serde_json::to_value(&sample).unwrap();
        assert_eq!(json["step_size"], 1.5);
        assert_eq!(json["labels"], serde_json::json!({}));
    }

    #[test]
    fn step_column_holds_nanoseconds() {
        let sample = MetricSample {
            labels: LabelSet::new(),
            value: 0.0,
            timestamp: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            step_size: Duration::from_secs(60),
        };

        assert_eq!(sample.step_size_nanos(), 6e10);
    }
}
