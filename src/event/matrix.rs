use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::LabelSet;

/// The result of a range query: every series that matched, each with the
/// points sampled over the requested range.
///
/// Points are kept as the raw `[timestamp, "value"]` pairs the source
/// returned. Checking their shape is the transformer's job.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Matrix {
    pub series: Vec<Series>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Series {
    #[serde(default)]
    pub metric: LabelSet,
    #[serde(default)]
    pub values: Vec<Value>,
}

impl Matrix {
    pub fn new(series: Vec<Series>) -> Self {
        Self { series }
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    /// Total number of points over all series.
    pub fn point_count(&self) -> usize {
        self.series.iter().map(|series| series.values.len()).sum()
    }
}

impl Series {
    /// Builds a well-formed series from `(unix seconds, value)` points.
    pub fn from_points(metric: LabelSet, points: impl IntoIterator<Item = (f64, f64)>) -> Self {
        let values = points
            .into_iter()
            .map(|(timestamp, value)| Value::from(vec![Value::from(timestamp), Value::from(value.to_string())]))
            .collect();
        Self { metric, values }
    }
}
