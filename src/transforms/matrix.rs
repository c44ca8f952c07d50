use chrono::{DateTime, Utc};
use serde_json::Value;
use snafu::{OptionExt, Snafu};

use crate::event::{Matrix, MetricSample, TimeRange};

#[derive(Debug, Snafu, PartialEq)]
pub enum TransformError {
    #[snafu(display(
        "point {} of series {} is not a [timestamp, value] pair: {}",
        point,
        series,
        found
    ))]
    MalformedPoint {
        series: usize,
        point: usize,
        found: String,
    },
    #[snafu(display("point {} of series {} has invalid timestamp {}", point, series, timestamp))]
    InvalidTimestamp {
        series: usize,
        point: usize,
        timestamp: String,
    },
    #[snafu(display("point {} of series {} has non-numeric value {:?}", point, series, value))]
    InvalidValue {
        series: usize,
        point: usize,
        value: String,
    },
}

/// Flattens `matrix` into one sample per point, series by series.
///
/// Every sample carries the labels of its series and the step of `range`.
/// A single malformed point rejects the whole matrix.
pub fn to_samples(matrix: &Matrix, range: &TimeRange) -> Result<Vec<MetricSample>, TransformError> {
    let mut samples = Vec::with_capacity(matrix.point_count());

    for (series_index, series) in matrix.series.iter().enumerate() {
        for (point_index, point) in series.values.iter().enumerate() {
            let (timestamp, value) = parse_point(point, series_index, point_index)?;
            samples.push(MetricSample {
                labels: series.metric.clone(),
                value,
                timestamp,
                step_size: range.step(),
            });
        }
    }

    Ok(samples)
}

fn parse_point(point: &Value, series: usize, point_index: usize) -> Result<(DateTime<Utc>, f64), TransformError> {
    let pair = match point.as_array() {
        Some(pair) if pair.len() == 2 => pair,
        _ => {
            return MalformedPointSnafu {
                series,
                point: point_index,
                found: point.to_string(),
            }
            .fail();
        }
    };

    let timestamp = pair[0]
        .as_f64()
        .and_then(timestamp_from_secs)
        .with_context(|| InvalidTimestampSnafu {
            series,
            point: point_index,
            timestamp: pair[0].to_string(),
        })?;

    let value = match &pair[1] {
        Value::String(value) => value.parse::<f64>().ok(),
        Value::Number(value) => value.as_f64(),
        _ => None,
    }
    .with_context(|| InvalidValueSnafu {
        series,
        point: point_index,
        value: pair[1].to_string(),
    })?;

    Ok((timestamp, value))
}

fn timestamp_from_secs(secs: f64) -> Option<DateTime<Utc>> {
    if !secs.is_finite() {
        return None;
    }
    let millis = (secs * 1000.0).round();
    if millis < i64::MIN as f64 || millis > i64::MAX as f64 {
        return None;
    }
    DateTime::from_timestamp_millis(millis as i64)
}
