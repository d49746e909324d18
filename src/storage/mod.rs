pub mod buffer;
pub mod snapshot;

pub use buffer::{merge, retain_window, Buffer, Sample, SampleKey};
pub use snapshot::{FileSnapshot, SnapshotStore};
