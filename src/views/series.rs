use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::config::{GAP_THRESHOLD_SECS, STALENESS_THRESHOLD_SECS};
use crate::storage::buffer::Sample;

/// Which reading a line chart plots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Field {
    Temperature,
    Humidity,
}

impl Field {
    pub fn read(self, s: &Sample) -> f64 {
        match self {
            Field::Temperature => s.temperature,
            Field::Humidity => s.humidity,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PointKind {
    Data,
    /// Synthetic break inserted across an outage.
    Gap,
    /// Synthetic point pinning the axis to the current second.
    Now,
}

/// One x-position on the chart with a value (or a hole) per sensor.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesPoint {
    pub timestamp: i64,
    pub kind: PointKind,
    pub values: BTreeMap<String, Option<f64>>,
}

impl SeriesPoint {
    fn blank(timestamp: i64, kind: PointKind, sensors: &[String]) -> Self {
        Self {
            timestamp,
            kind,
            values: sensors.iter().map(|id| (id.clone(), None)).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorSeries {
    pub field: Field,
    pub sensors: Vec<String>,
    pub points: Vec<SeriesPoint>,
    /// Tooltip label per real data timestamp.
    pub labels: HashMap<i64, String>,
}

impl SensorSeries {
    pub fn last_data_timestamp(&self) -> Option<i64> {
        self.points
            .iter()
            .rev()
            .find(|p| p.kind == PointKind::Data)
            .map(|p| p.timestamp)
    }

    pub fn label(&self, timestamp: i64) -> Option<&str> {
        self.labels.get(&timestamp).map(String::as_str)
    }
}

/// `HH:MM:SS` in UTC.
pub fn format_label(timestamp: i64) -> String {
    match chrono::DateTime::from_timestamp(timestamp, 0) {
        Some(dt) => dt.format("%H:%M:%S").to_string(),
        None => timestamp.to_string(),
    }
}

/// Group `buffer` into one row per distinct timestamp, inserting a null gap
/// row at the midpoint wherever consecutive rows are more than
/// [`GAP_THRESHOLD_SECS`] apart.
pub fn build_series(buffer: &[Sample], field: Field) -> SensorSeries {
    let sensors: Vec<String> = buffer
        .iter()
        .map(|s| s.sensor_id.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let mut rows: BTreeMap<i64, BTreeMap<String, Option<f64>>> = BTreeMap::new();
    for s in buffer {
        rows.entry(s.timestamp)
            .or_insert_with(|| sensors.iter().map(|id| (id.clone(), None)).collect())
            .insert(s.sensor_id.clone(), Some(field.read(s)));
    }

    let mut points = Vec::with_capacity(rows.len());
    let mut labels = HashMap::with_capacity(rows.len());
    let mut prev: Option<i64> = None;
    for (timestamp, values) in rows {
        if let Some(p) = prev {
            if timestamp.saturating_sub(p) > GAP_THRESHOLD_SECS {
                let mid = ((p as i128 + timestamp as i128) / 2) as i64;
                points.push(SeriesPoint::blank(mid, PointKind::Gap, &sensors));
            }
        }
        labels.insert(timestamp, format_label(timestamp));
        points.push(SeriesPoint {
            timestamp,
            kind: PointKind::Data,
            values,
        });
        prev = Some(timestamp);
    }

    SensorSeries {
        field,
        sensors,
        points,
        labels,
    }
}

/// Where the time axis ends relative to the wall clock.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeAxisEnd {
    pub now: i64,
    pub now_marker: Option<SeriesPoint>,
    pub seconds_since_last: Option<i64>,
    pub stale: bool,
}

/// Extend the axis to `now` when the newest real point is older than it.
pub fn time_axis_end(last_real: Option<i64>, now: i64, sensors: &[String]) -> TimeAxisEnd {
    let Some(last) = last_real else {
        return TimeAxisEnd {
            now,
            now_marker: None,
            seconds_since_last: None,
            stale: false,
        };
    };
    let since = now.saturating_sub(last);
    TimeAxisEnd {
        now,
        now_marker: (last < now).then(|| SeriesPoint::blank(now, PointKind::Now, sensors)),
        seconds_since_last: Some(since),
        stale: since > STALENESS_THRESHOLD_SECS,
    }
}
