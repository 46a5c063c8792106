use std::{
    fs::File,
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use indexmap::IndexMap;
use log::{debug, info};
use serde::Serialize;

use crate::{
    chart::{Axis, Chart, ChartRenderer, Series},
    error::{Error, Result},
    firefox::FirefoxProfile,
    series::{Snapshot, StoreSeries},
};

/// Suffix of the detailed attribute snapshot outputs.
pub const ATTRS_SUFFIX: &str = "uis-attrs";
/// Suffix of the data-store and manager series outputs.
pub const STORE_SUFFIX: &str = "store-workflow-mgrs";

const TIME_LABEL: &str = "Time (s)";

pub fn output_path(dir: &Path, prefix: &str, suffix: &str, extension: &str) -> PathBuf {
    dir.join(format!("{prefix}-{suffix}.{extension}"))
}

fn write_json<T: Serialize + ?Sized>(value: &T, path: &Path) -> Result<()> {
    let io_error = |source| Error::Io {
        path: path.to_path_buf(),
        source,
    };
    let mut writer = BufWriter::new(File::create(path).map_err(io_error)?);
    serde_json::to_writer(&mut writer, value).map_err(|source| Error::Json {
        path: path.to_path_buf(),
        source,
    })?;
    writer.flush().map_err(io_error)
}

/// Write the detailed snapshots as a list of `[time, {attribute: bytes}]` pairs.
pub fn dump_attributes(data: &[Snapshot], dir: &Path, prefix: &str) -> Result<PathBuf> {
    let path = output_path(dir, prefix, ATTRS_SUFFIX, "json");
    write_json(data, &path)?;
    info!("wrote {} attribute snapshots to {}", data.len(), path.display());
    Ok(path)
}

/// Write the `{times, objects, size}` series.
pub fn dump_store(series: &StoreSeries, dir: &Path, prefix: &str) -> Result<PathBuf> {
    let path = output_path(dir, prefix, STORE_SUFFIX, "json");
    write_json(series, &path)?;
    info!("wrote {} samples to {}", series.len(), path.display());
    Ok(path)
}

fn kilobytes(values: &[usize]) -> Vec<f64> {
    values.iter().map(|&v| v as f64 / 1000.0).collect()
}

/// Sizes on the left axis, entity counts dashed on the right.
pub fn store_chart(series: &StoreSeries) -> Chart {
    let sizes = series
        .size
        .iter()
        .map(|(key, values)| Series::new(key.clone(), kilobytes(values)))
        .collect();
    let counts = series
        .objects
        .iter()
        .map(|(key, values)| Series::new(key.clone(), values.iter().map(|&v| v as f64).collect()))
        .collect();

    Chart {
        title: None,
        x_label: TIME_LABEL.to_string(),
        times: series.elapsed(),
        left: Axis::new("Size (kb)", sizes),
        right: Some(Axis::new("Objects", counts).dashed()),
    }
}

pub fn attributes_chart(fields: &IndexMap<String, Vec<usize>>, times: &[f64], title: &str) -> Chart {
    let sizes = fields
        .iter()
        .map(|(key, values)| Series::new(key.clone(), kilobytes(values)))
        .collect();

    Chart {
        title: Some(title.to_string()),
        x_label: TIME_LABEL.to_string(),
        times: times.to_vec(),
        left: Axis::new("Memory (kb)", sizes),
        right: None,
    }
}

/// Every reason a plot over `samples` samples cannot be drawn.
fn skip_reasons(renderer: &dyn ChartRenderer, samples: usize) -> Vec<String> {
    let mut reasons = Vec::new();
    if !renderer.is_available() {
        reasons.push("no chart renderer".to_string());
    }
    if samples < 2 {
        reasons.push(format!("{samples} sample(s) recorded"));
    }
    reasons
}

fn can_plot(renderer: &dyn ChartRenderer, samples: usize, what: &str) -> bool {
    let reasons = skip_reasons(renderer, samples);
    if reasons.is_empty() {
        return true;
    }
    debug!("skipping {what} plot: {}", reasons.join(", "));
    false
}

/// Plot the store series. Returns `None` when the plot was skipped.
pub fn plot_store(
    series: &StoreSeries,
    renderer: &dyn ChartRenderer,
    dir: &Path,
    prefix: &str,
) -> Result<Option<PathBuf>> {
    if !can_plot(renderer, series.len(), STORE_SUFFIX) {
        return Ok(None);
    }
    let path = output_path(dir, prefix, STORE_SUFFIX, "pdf");
    renderer.render(&store_chart(series), &path)?;
    info!("plotted store series to {}", path.display());
    Ok(Some(path))
}

/// Plot the per-attribute series. Returns `None` when the plot was skipped.
pub fn plot_attributes(
    fields: &IndexMap<String, Vec<usize>>,
    times: &[f64],
    renderer: &dyn ChartRenderer,
    dir: &Path,
    prefix: &str,
    title: &str,
) -> Result<Option<PathBuf>> {
    if !can_plot(renderer, times.len(), ATTRS_SUFFIX) {
        return Ok(None);
    }
    let path = output_path(dir, prefix, ATTRS_SUFFIX, "pdf");
    renderer.render(&attributes_chart(fields, times, title), &path)?;
    info!("plotted attribute series to {}", path.display());
    Ok(Some(path))
}

/// Write the store series as a Firefox Profiler document with one counter
/// per series.
pub fn export_firefox_profile(series: &StoreSeries, dir: &Path, prefix: &str) -> Result<PathBuf> {
    let path = output_path(dir, prefix, STORE_SUFFIX, "profile.json");
    FirefoxProfile::from_series(series, prefix)
        .write_json(&path)
        .map_err(|source| Error::Io {
            path: path.clone(),
            source,
        })?;
    info!("wrote Firefox profile to {}", path.display());
    Ok(path)
}
