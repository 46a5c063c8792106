use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Sum of every measured sub-object in a detailed snapshot.
pub const SELECTED_TOTAL: &str = "Selected Total";
/// Size of the host's merged configuration object.
pub const CONFIG_TOTAL: &str = "Traitlets Config";
/// Size of the whole host.
pub const TOTAL: &str = "Total";

/// Attribute name to estimated bytes, for one sample.
pub type AttributeSizes = IndexMap<String, usize>;

/// A detailed snapshot and the time, in seconds since the epoch, it was taken.
pub type Snapshot = (f64, AttributeSizes);

/// Count and size series of the data store and the tracked attributes.
///
/// Every series has one entry per sample.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreSeries {
    /// Sample times, seconds since the epoch
    pub times: Vec<f64>,
    /// Entity counts per data-store category
    pub objects: IndexMap<String, Vec<usize>>,
    /// Estimated bytes per data-store category and tracked attribute
    pub size: IndexMap<String, Vec<usize>>,
}

impl StoreSeries {
    pub fn register_category(&mut self, key: &str) {
        self.objects.insert(key.to_string(), Vec::new());
        self.size.insert(key.to_string(), Vec::new());
    }

    pub fn register_attribute(&mut self, key: &str) {
        self.size.insert(key.to_string(), Vec::new());
    }

    /// Record a sample time. Times never go backwards, even if the wall clock does.
    pub fn push_time(&mut self, now: f64) -> f64 {
        let now = match self.times.last() {
            Some(&last) if last > now => last,
            _ => now,
        };
        self.times.push(now);
        now
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    /// Seconds since the first sample.
    pub fn elapsed(&self) -> Vec<f64> {
        relative(&self.times)
    }
}

/// Everything accumulated over the lifetime of the profiler.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SampleState {
    pub series: StoreSeries,
    pub data: Vec<Snapshot>,
}

fn relative(times: &[f64]) -> Vec<f64> {
    let Some(&first) = times.first() else {
        return Vec::new();
    };
    times.iter().map(|t| t - first).collect()
}

/// Pivot detailed snapshots into one series per attribute.
///
/// Attributes keep the order in which they were first seen. An attribute
/// missing from a snapshot contributes zero bytes to that sample. Returned
/// times are seconds since the first snapshot.
pub fn transpose(data: &[Snapshot]) -> (IndexMap<String, Vec<usize>>, Vec<f64>) {
    let mut fields: IndexMap<String, Vec<usize>> = IndexMap::new();
    for (_, sizes) in data {
        for key in sizes.keys() {
            if !fields.contains_key(key) {
                fields.insert(key.clone(), Vec::with_capacity(data.len()));
            }
        }
    }

    for (_, sizes) in data {
        for (key, series) in fields.iter_mut() {
            series.push(sizes.get(key).copied().unwrap_or(0));
        }
    }

    let times: Vec<f64> = data.iter().map(|(time, _)| *time).collect();
    (fields, relative(&times))
}
