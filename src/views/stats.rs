use std::collections::BTreeMap;
use std::fmt;

use chrono::Timelike;
use serde::Serialize;

use crate::storage::buffer::Sample;

pub const LOW_LABEL: &str = "<18°C";
pub const MID_LABEL: &str = "18–22°C";
pub const HIGH_LABEL: &str = ">22°C";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RangeBucket {
    pub label: &'static str,
    pub count: usize,
    pub percent: f64,
}

impl RangeBucket {
    pub fn percent_label(&self) -> String {
        format!("{:.1}%", self.percent)
    }
}

/// Split temperatures into below 18, 18 through 22, and above 22.
pub fn temperature_distribution(buffer: &[Sample]) -> Vec<RangeBucket> {
    let mut counts = [0usize; 3];
    for s in buffer {
        let idx = if s.temperature < 18.0 {
            0
        } else if s.temperature <= 22.0 {
            1
        } else {
            2
        };
        counts[idx] += 1;
    }
    let total = buffer.len();
    [LOW_LABEL, MID_LABEL, HIGH_LABEL]
        .into_iter()
        .zip(counts)
        .map(|(label, count)| RangeBucket {
            label,
            count,
            percent: if total == 0 {
                0.0
            } else {
                count as f64 * 100.0 / total as f64
            },
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeBucket {
    /// Minute of hour divided by ten, 0..=5.
    pub bucket: u32,
    pub label: String,
    pub count: usize,
    pub mean_temperature: f64,
}

/// Mean temperature per ten-minute slice of the hour (UTC), only for slices
/// that have readings.
pub fn ten_minute_buckets(buffer: &[Sample]) -> Vec<TimeBucket> {
    let mut acc: BTreeMap<u32, (f64, usize)> = BTreeMap::new();
    for s in buffer {
        let Some(dt) = chrono::DateTime::from_timestamp(s.timestamp, 0) else {
            continue;
        };
        let slot = acc.entry(dt.minute() / 10).or_insert((0.0, 0));
        slot.0 += s.temperature;
        slot.1 += 1;
    }
    acc.into_iter()
        .map(|(bucket, (sum, count))| TimeBucket {
            bucket,
            label: format!(":{:02}", bucket * 10),
            count,
            mean_temperature: sum / count as f64,
        })
        .collect()
}

/// Latest instant's readings averaged across sensors.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CurrentReading {
    Unavailable,
    Reading {
        timestamp: i64,
        temperature: f64,
        humidity: f64,
        sensors: usize,
    },
}

impl fmt::Display for CurrentReading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CurrentReading::Unavailable => f.write_str("N/A"),
            CurrentReading::Reading {
                temperature,
                humidity,
                ..
            } => write!(f, "{temperature:.1}°C / {humidity:.1}%"),
        }
    }
}

pub fn current_reading(buffer: &[Sample]) -> CurrentReading {
    let Some(latest) = buffer.iter().map(|s| s.timestamp).max() else {
        return CurrentReading::Unavailable;
    };
    let (mut temp, mut hum, mut n) = (0.0, 0.0, 0usize);
    for s in buffer.iter().filter(|s| s.timestamp == latest) {
        temp += s.temperature;
        hum += s.humidity;
        n += 1;
    }
    CurrentReading::Reading {
        timestamp: latest,
        temperature: temp / n as f64,
        humidity: hum / n as f64,
        sensors: n,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp(t: i64, v: f64) -> Sample {
        Sample::new(t, "A", v, 50.0)
    }

    #[test]
    fn distribution_splits_evenly() {
        let buckets = temperature_distribution(&[temp(1, 17.0), temp(2, 19.0), temp(3, 23.0)]);
        let labels: Vec<&str> = buckets.iter().map(|b| b.label).collect();
        assert_eq!(labels, vec![LOW_LABEL, MID_LABEL, HIGH_LABEL]);
        for b in &buckets {
            assert_eq!(b.count, 1);
            assert_eq!(b.percent_label(), "33.3%");
        }
    }

    #[test]
    fn distribution_boundaries() {
        let buckets = temperature_distribution(&[temp(1, 18.0), temp(2, 22.0), temp(3, 22.01)]);
        assert_eq!(buckets[0].count, 0);
        assert_eq!(buckets[1].count, 2);
        assert_eq!(buckets[2].count, 1);
    }

    #[test]
    fn distribution_of_nothing() {
        let buckets = temperature_distribution(&[]);
        assert!(buckets.iter().all(|b| b.count == 0 && b.percent == 0.0));
    }

    #[test]
    fn buckets_by_ten_minutes() {
        // 00:05, 00:09, 00:12 and 01:55 UTC
        let buf = [temp(300, 20.0), temp(540, 22.0), temp(720, 30.0), temp(3600 + 55 * 60, 10.0)];
        let buckets = ten_minute_buckets(&buf);
        let summary: Vec<(&str, usize, f64)> = buckets
            .iter()
            .map(|b| (b.label.as_str(), b.count, b.mean_temperature))
            .collect();
        assert_eq!(summary, vec![(":00", 2, 21.0), (":10", 1, 30.0), (":50", 1, 10.0)]);
    }

    #[test]
    fn current_averages_latest_timestamp() {
        let buf = [
            Sample::new(10, "A", 10.0, 10.0),
            Sample::new(20, "A", 20.0, 40.0),
            Sample::new(20, "B", 22.0, 60.0),
        ];
        assert_eq!(
            current_reading(&buf),
            CurrentReading::Reading {
                timestamp: 20,
                temperature: 21.0,
                humidity: 50.0,
                sensors: 2
            }
        );
    }

    #[test]
    fn current_of_empty_is_na() {
        assert_eq!(current_reading(&[]).to_string(), "N/A");
    }
}
