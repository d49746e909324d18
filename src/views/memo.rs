use std::collections::HashMap;
use std::hash::Hash;

use serde::Serialize;

use crate::storage::buffer::Buffer;

/// Caches projections of one buffer. Entries survive until a buffer with a
/// different identity is presented, at which point all of them are dropped.
pub struct Memo<K, V> {
    source: Option<Buffer>,
    entries: HashMap<K, V>,
    computations: usize,
}

impl<K: Eq + Hash, V: Clone> Memo<K, V> {
    pub fn new() -> Self {
        Self {
            source: None,
            entries: HashMap::new(),
            computations: 0,
        }
    }

    pub fn get_or_compute(&mut self, buffer: &Buffer, key: K, compute: impl FnOnce(&Buffer) -> V) -> V {
        let same = self.source.as_ref().is_some_and(|b| b.same_as(buffer));
        if !same {
            self.entries.clear();
            self.source = Some(buffer.clone());
        }
        if let Some(v) = self.entries.get(&key) {
            return v.clone();
        }
        let v = compute(buffer);
        self.computations += 1;
        self.entries.insert(key, v.clone());
        v
    }

    /// How many times `compute` actually ran.
    pub fn computations(&self) -> usize {
        self.computations
    }
}

impl<K: Eq + Hash, V: Clone> Default for Memo<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

/// Lifecycle of one chart.
#[derive(Debug, Clone, Default)]
pub enum ChartState {
    #[default]
    Empty,
    Loading,
    HasData(Buffer),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChartPhase {
    Empty,
    Loading,
    HasData,
}

impl ChartState {
    pub fn phase(&self) -> ChartPhase {
        match self {
            ChartState::Empty => ChartPhase::Empty,
            ChartState::Loading => ChartPhase::Loading,
            ChartState::HasData(_) => ChartPhase::HasData,
        }
    }

    pub fn begin_loading(&mut self) {
        if let ChartState::Empty = self {
            *self = ChartState::Loading;
        }
    }

    /// Feed a published buffer. Returns true when the chart has to redraw.
    pub fn observe(&mut self, buffer: &Buffer) -> bool {
        match self {
            ChartState::HasData(current) if current.same_as(buffer) => false,
            ChartState::HasData(_) => {
                *self = ChartState::HasData(buffer.clone());
                true
            }
            _ if buffer.is_empty() => false,
            _ => {
                *self = ChartState::HasData(buffer.clone());
                true
            }
        }
    }

    pub fn clear(&mut self) {
        *self = ChartState::Empty;
    }
}
