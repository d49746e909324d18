use std::collections::BTreeMap;
use std::ops::Deref;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// One reading from one sensor at one second.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub timestamp: i64,
    pub sensor_id: String,
    pub temperature: f64,
    pub humidity: f64,
}

impl Sample {
    pub fn new(timestamp: i64, sensor_id: impl Into<String>, temperature: f64, humidity: f64) -> Self {
        Self {
            timestamp,
            sensor_id: sensor_id.into(),
            temperature,
            humidity,
        }
    }

    pub fn key(&self) -> SampleKey {
        SampleKey {
            timestamp: self.timestamp,
            sensor_id: self.sensor_id.clone(),
        }
    }

    /// Decode a list of untrusted JSON values, dropping anything that is not a
    /// well-formed sample. Returns the decoded samples and the number skipped.
    pub fn decode_lenient(values: Vec<serde_json::Value>) -> (Vec<Sample>, usize) {
        let total = values.len();
        let samples: Vec<Sample> = values
            .into_iter()
            .filter_map(|v| serde_json::from_value::<Sample>(v).ok())
            .filter(|s| s.temperature.is_finite() && s.humidity.is_finite())
            .collect();
        let skipped = total - samples.len();
        (samples, skipped)
    }
}

/// Composite dedup key. Ordered by timestamp first, then sensor id.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SampleKey {
    pub timestamp: i64,
    pub sensor_id: String,
}

/// Immutable, shared view of the time series.
///
/// Cloning is cheap and keeps the same identity; a new identity only comes
/// from [`Buffer::from_vec`], which the orchestrator calls when content changes.
#[derive(Debug, Clone)]
pub struct Buffer(Arc<[Sample]>);

impl Buffer {
    pub fn empty() -> Self {
        Self(Arc::from(Vec::new()))
    }

    /// Wrap already ordered, deduplicated samples.
    pub fn from_vec(samples: Vec<Sample>) -> Self {
        Self(Arc::from(samples))
    }

    /// Reference identity, used by consumers for change detection.
    pub fn same_as(&self, other: &Buffer) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub fn last_timestamp(&self) -> Option<i64> {
        self.0.last().map(|s| s.timestamp)
    }
}

impl Default for Buffer {
    fn default() -> Self {
        Self::empty()
    }
}

impl Deref for Buffer {
    type Target = [Sample];

    fn deref(&self) -> &[Sample] {
        &self.0
    }
}

/// Merge `incoming` into `existing`, deduplicating on `(timestamp, sensor_id)`.
///
/// Incoming samples overwrite existing ones with the same key, and later
/// entries within `incoming` overwrite earlier ones. The result is sorted by
/// timestamp, ties broken by sensor id.
pub fn merge(existing: &[Sample], incoming: &[Sample]) -> Vec<Sample> {
    let mut by_key: BTreeMap<SampleKey, Sample> = BTreeMap::new();
    for s in existing.iter().chain(incoming.iter()) {
        by_key.insert(s.key(), s.clone());
    }
    // BTreeMap iteration order is the key order: timestamp, then sensor_id.
    by_key.into_values().collect()
}

/// Keep only samples with `timestamp >= now - window_secs`, preserving order.
pub fn retain_window(buffer: &[Sample], window_secs: i64, now: i64) -> Vec<Sample> {
    let cutoff = now.saturating_sub(window_secs);
    buffer
        .iter()
        .filter(|s| s.timestamp >= cutoff)
        .cloned()
        .collect()
}
