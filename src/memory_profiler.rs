//! Samples the size of the host's data store and managers over time.
//!
//! A [`MemoryProfiler`] is driven by the host: [`MemoryProfiler::sample`] on a
//! fixed interval while the service runs, then [`MemoryProfiler::report`] once
//! at clean shutdown. The report is written to the configured output directory:
//!
//! - `<prefix>-store-workflow-mgrs.json`, the count and size series
//! - `<prefix>-uis-attrs.json`, the detailed attribute snapshots
//! - `<prefix>-store-workflow-mgrs.pdf` and `<prefix>-uis-attrs.pdf`, when a
//!   chart renderer is available and at least two samples were taken
use std::{
    any::type_name,
    fmt,
    path::PathBuf,
    sync::Arc,
    time::{SystemTime, UNIX_EPOCH},
};

use log::debug;

use crate::{
    chart::{ChartRenderer, default_renderer},
    config::ProfilerConfig,
    error::{Error, Result},
    host::{Host, WORKFLOW},
    report::{dump_attributes, dump_store, export_firefox_profile, plot_attributes, plot_store},
    series::{AttributeSizes, CONFIG_TOTAL, SELECTED_TOTAL, SampleState, TOTAL, transpose},
    size::{SizeOf, Sizer},
};

/// How deep the detailed snapshot breaks down the host's sub-objects.
const DETAIL: usize = 2;

/// Prefix of every file written by [`MemoryProfiler::report`].
pub fn default_file_prefix() -> String {
    module_path!().replace("::", ".")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    /// Samples are being collected
    Accumulating,
    /// The report has been written; no more samples are taken
    Reported,
}

/// Files written by [`MemoryProfiler::report`]. A plot is `None` when it was
/// skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    pub store_dump: PathBuf,
    pub attributes_dump: PathBuf,
    pub store_plot: Option<PathBuf>,
    pub attributes_plot: Option<PathBuf>,
    pub firefox_profile: Option<PathBuf>,
}

pub struct MemoryProfiler<H: Host> {
    host: Arc<H>,
    config: ProfilerConfig,
    renderer: Box<dyn ChartRenderer + Send + Sync>,
    categories: Vec<String>,
    attributes: Vec<&'static str>,
    state: SampleState,
    lifecycle: Lifecycle,
}

impl<H: Host> fmt::Debug for MemoryProfiler<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryProfiler")
            .field("host", &type_name::<H>())
            .field("config", &self.config)
            .field("renderer", &self.renderer)
            .field("samples", &self.state.series.len())
            .field("lifecycle", &self.lifecycle)
            .finish_non_exhaustive()
    }
}

impl<H: Host> MemoryProfiler<H> {
    /// Register the host's data-store categories and tracked attributes.
    pub fn new(host: Arc<H>, config: ProfilerConfig) -> Self {
        let categories = host.categories();
        let attributes: Vec<_> = host
            .tracked_attributes()
            .into_iter()
            .map(|(label, _)| label)
            .collect();

        let mut state = SampleState::default();
        for category in &categories {
            state.series.register_category(category);
        }
        for label in &attributes {
            state.series.register_attribute(label);
        }

        Self {
            host,
            config,
            renderer: default_renderer(),
            categories,
            attributes,
            state,
            lifecycle: Lifecycle::Accumulating,
        }
    }

    /// Replace the chart renderer picked at build time.
    pub fn with_renderer(mut self, renderer: Box<dyn ChartRenderer + Send + Sync>) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn state(&self) -> &SampleState {
        &self.state
    }

    pub fn config(&self) -> &ProfilerConfig {
        &self.config
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    /// Take one sample of every registered series.
    ///
    /// Everything is measured before anything is appended, so a failed sample
    /// leaves the series untouched.
    pub async fn sample(&mut self) -> Result<()> {
        if self.lifecycle == Lifecycle::Reported {
            return Err(Error::AlreadyReported);
        }
        let host = self.host.as_ref();

        let aisles: Vec<(usize, usize)> = self
            .categories
            .iter()
            .map(|category| measure_category(host, category))
            .collect();

        let tracked = host.tracked_attributes();
        let attribute_sizes = self
            .attributes
            .iter()
            .map(|label| {
                tracked
                    .iter()
                    .find(|(l, _)| l == label)
                    .map(|(_, value)| value.shallow_size())
                    .ok_or_else(|| Error::MissingAttribute {
                        label: label.to_string(),
                    })
            })
            .collect::<Result<Vec<_>>>()?;

        let detail = compute_sizes(host, self.config.min_size);

        let series = &mut self.state.series;
        let now = series.push_time(unix_now());
        for (category, (count, size)) in self.categories.iter().zip(aisles) {
            series.objects.entry(category.clone()).or_default().push(count);
            series.size.entry(category.clone()).or_default().push(size);
        }
        for (label, size) in self.attributes.iter().zip(attribute_sizes) {
            series.size.entry(label.to_string()).or_default().push(size);
        }
        debug!(
            "sample {} at {now}: {} attributes over {} bytes, {} bytes in total",
            series.len(),
            detail.len().saturating_sub(3),
            self.config.min_size,
            detail.get(TOTAL).copied().unwrap_or_default(),
        );
        self.state.data.push((now, detail));

        Ok(())
    }

    /// Write the accumulated series, and plot them when possible.
    ///
    /// Running it again overwrites the previous output. The profiler only
    /// stops sampling once every file was written.
    pub async fn report(&mut self) -> Result<Report> {
        let dir = self.config.output_dir.as_path();
        let prefix = self.config.file_prefix.as_str();
        let renderer = self.renderer.as_ref();

        let store_dump = dump_store(&self.state.series, dir, prefix)?;
        let store_plot = plot_store(&self.state.series, renderer, dir, prefix)?;

        let attributes_dump = dump_attributes(&self.state.data, dir, prefix)?;
        let (fields, times) = transpose(&self.state.data);
        let title = format!(
            "{} attrs > {:?}kb",
            type_name::<H>(),
            self.config.min_size as f64 / 1000.0
        );
        let attributes_plot = plot_attributes(&fields, &times, renderer, dir, prefix, &title)?;

        let firefox_profile = if self.config.firefox_profile {
            Some(export_firefox_profile(&self.state.series, dir, prefix)?)
        } else {
            None
        };

        self.lifecycle = Lifecycle::Reported;
        Ok(Report {
            store_dump,
            attributes_dump,
            store_plot,
            attributes_plot,
            firefox_profile,
        })
    }
}

fn unix_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

/// Entity count and estimated bytes of one category, summed over every
/// partition. A category no partition holds is measured as an empty collection.
fn measure_category<H: Host>(host: &H, category: &str) -> (usize, usize) {
    let mut found = false;
    let mut count = 0;
    let mut size = 0;
    for partition in host.partitions() {
        let Some(aisle) = partition.aisle(category) else {
            continue;
        };
        found = true;
        count += if category == WORKFLOW && !aisle.is_empty() {
            1
        } else {
            aisle.len()
        };
        size += Sizer::new().total_size(aisle);
    }

    if !found {
        size = Vec::<()>::new().deep_size();
    }
    (count, size)
}

/// Normalize a breakdown name into the key used in detailed snapshots.
fn attribute_label(name: &str) -> String {
    name.split(':').next().unwrap_or(name).trim().to_string()
}

/// Detailed snapshot of the host: every attribute of its walked sub-objects
/// larger than `min_size` bytes, plus the selected, configuration and overall
/// totals.
///
/// The profiler itself and the host's configuration are excluded from the
/// sub-object walk.
pub fn compute_sizes<H: Host>(host: &H, min_size: usize) -> AttributeSizes {
    let mut sizer = Sizer::new();
    sizer.exclude::<MemoryProfiler<H>>().exclude::<H::Config>();
    let roots = host.detail_roots(&mut sizer, DETAIL);

    let mut sizes: AttributeSizes = roots
        .iter()
        .flat_map(|root| root.refs.iter())
        .filter(|attribute| attribute.size > min_size)
        .map(|attribute| (attribute_label(&attribute.name), attribute.size))
        .collect();

    sizes.insert(
        SELECTED_TOTAL.to_string(),
        roots.iter().map(|root| root.size).sum(),
    );

    let mut sizer = Sizer::new();
    sizer.exclude::<MemoryProfiler<H>>();
    sizes.insert(CONFIG_TOTAL.to_string(), sizer.size_of(host.config()));

    let mut sizer = Sizer::new();
    sizer.exclude::<MemoryProfiler<H>>();
    sizes.insert(TOTAL.to_string(), sizer.size_of(host));

    sizes
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn labels_drop_qualifiers() {
        assert_eq!(attribute_label("executor: ThreadPool"), "executor");
        assert_eq!(attribute_label(" queue "), "queue");
        assert_eq!(attribute_label("data"), "data");
    }

    #[test]
    fn file_prefix_names_this_module() {
        assert_eq!(default_file_prefix(), "uis_memprof.memory_profiler");
    }
}
