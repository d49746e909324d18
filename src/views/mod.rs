//! Chart-ready projections of the published buffer.
//!
//! Everything here is derived: projections are memoized on buffer identity
//! plus their parameters, and the wall-clock axis extension is cached on its
//! own so that time passing never re-derives the series.

pub mod memo;
pub mod series;
pub mod stats;

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;

use crate::storage::buffer::Buffer;
pub use memo::{ChartPhase, ChartState, Memo};
pub use series::{build_series, time_axis_end, Field, PointKind, SensorSeries, SeriesPoint, TimeAxisEnd};
pub use stats::{current_reading, temperature_distribution, ten_minute_buckets, CurrentReading, RangeBucket, TimeBucket};

/// A line chart: the memoized series plus the axis end for `now`.
#[derive(Debug, Clone, Serialize)]
pub struct SeriesView {
    #[serde(flatten)]
    pub axis: Arc<TimeAxisEnd>,
    pub series: Arc<SensorSeries>,
}

/// The charts on the dashboard, each with its own lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChartKind {
    TemperatureSeries,
    HumiditySeries,
    Distribution,
    TimeBuckets,
    Current,
}

impl ChartKind {
    pub const ALL: [ChartKind; 5] = [
        ChartKind::TemperatureSeries,
        ChartKind::HumiditySeries,
        ChartKind::Distribution,
        ChartKind::TimeBuckets,
        ChartKind::Current,
    ];

    pub fn series(field: Field) -> Self {
        match field {
            Field::Temperature => ChartKind::TemperatureSeries,
            Field::Humidity => ChartKind::HumiditySeries,
        }
    }
}

type AxisKey = (Option<i64>, i64, Vec<String>);

/// Per-consumer cache of every dashboard projection.
#[derive(Default)]
pub struct DashboardViews {
    charts: BTreeMap<ChartKind, ChartState>,
    series: Memo<Field, Arc<SensorSeries>>,
    distribution: Memo<(), Arc<Vec<RangeBucket>>>,
    time_buckets: Memo<(), Arc<Vec<TimeBucket>>>,
    current: Memo<(), CurrentReading>,
    axis: Option<(AxisKey, Arc<TimeAxisEnd>)>,
}

impl DashboardViews {
    pub fn new() -> Self {
        Self::default()
    }

    /// Put every chart that has not drawn yet into `Loading`.
    pub fn begin_loading(&mut self) {
        for kind in ChartKind::ALL {
            self.charts.entry(kind).or_default().begin_loading();
        }
    }

    /// Hand `buffer` to one chart; true if that chart needs a redraw.
    pub fn observe(&mut self, kind: ChartKind, buffer: &Buffer) -> bool {
        self.charts.entry(kind).or_default().observe(buffer)
    }

    pub fn phase(&self, kind: ChartKind) -> ChartPhase {
        self.charts
            .get(&kind)
            .map_or(ChartPhase::Empty, ChartState::phase)
    }

    pub fn phases(&self) -> BTreeMap<ChartKind, ChartPhase> {
        ChartKind::ALL.into_iter().map(|k| (k, self.phase(k))).collect()
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn series(&mut self, buffer: &Buffer, field: Field, now: i64) -> SeriesView {
        self.observe(ChartKind::series(field), buffer);
        let series = self
            .series
            .get_or_compute(buffer, field, |b| Arc::new(build_series(b, field)));
        let axis = self.axis_end(series.last_data_timestamp(), now, &series.sensors);
        SeriesView { axis, series }
    }

    fn axis_end(&mut self, last_real: Option<i64>, now: i64, sensors: &[String]) -> Arc<TimeAxisEnd> {
        if let Some(((last, at, ids), axis)) = &self.axis {
            if *last == last_real && *at == now && ids.as_slice() == sensors {
                return axis.clone();
            }
        }
        let axis = Arc::new(time_axis_end(last_real, now, sensors));
        self.axis = Some(((last_real, now, sensors.to_vec()), axis.clone()));
        axis
    }

    pub fn distribution(&mut self, buffer: &Buffer) -> Arc<Vec<RangeBucket>> {
        self.observe(ChartKind::Distribution, buffer);
        self.distribution
            .get_or_compute(buffer, (), |b| Arc::new(temperature_distribution(b)))
    }

    pub fn time_buckets(&mut self, buffer: &Buffer) -> Arc<Vec<TimeBucket>> {
        self.observe(ChartKind::TimeBuckets, buffer);
        self.time_buckets
            .get_or_compute(buffer, (), |b| Arc::new(ten_minute_buckets(b)))
    }

    pub fn current(&mut self, buffer: &Buffer) -> CurrentReading {
        self.observe(ChartKind::Current, buffer);
        self.current.get_or_compute(buffer, (), |b| current_reading(b))
    }

    /// Total series derivations so far, across both fields.
    pub fn series_computations(&self) -> usize {
        self.series.computations()
    }
}
