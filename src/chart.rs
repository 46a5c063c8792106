use std::{fmt::Debug, path::Path};

use crate::error::Result;

/// Line colours, cycled per axis.
pub const PALETTE: [(u8, u8, u8); 10] = [
    (31, 119, 180),
    (255, 127, 14),
    (44, 160, 44),
    (214, 39, 40),
    (148, 103, 189),
    (140, 86, 75),
    (227, 119, 194),
    (127, 127, 127),
    (188, 189, 34),
    (23, 190, 207),
];

pub fn colour(index: usize) -> (u8, u8, u8) {
    PALETTE[index % PALETTE.len()]
}

#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    pub label: String,
    pub values: Vec<f64>,
}

impl Series {
    pub fn new(label: impl Into<String>, values: Vec<f64>) -> Self {
        Self {
            label: label.into(),
            values,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Axis {
    pub label: String,
    pub series: Vec<Series>,
    /// Draw this axis' lines dashed
    pub dashed: bool,
}

impl Axis {
    pub fn new(label: impl Into<String>, series: Vec<Series>) -> Self {
        Self {
            label: label.into(),
            series,
            dashed: false,
        }
    }

    pub fn dashed(mut self) -> Self {
        self.dashed = true;
        self
    }

    /// Value range of the axis. Starts at zero and is never empty.
    pub fn y_range(&self) -> (f64, f64) {
        let max = self
            .series
            .iter()
            .flat_map(|s| s.values.iter().copied())
            .filter(|v| v.is_finite())
            .fold(0.0_f64, f64::max);
        (0.0, round_up(max))
    }
}

/// A line chart over elapsed time, with an optional second value axis on the
/// right sharing the time axis.
#[derive(Debug, Clone, PartialEq)]
pub struct Chart {
    pub title: Option<String>,
    pub x_label: String,
    /// Seconds since the first sample
    pub times: Vec<f64>,
    pub left: Axis,
    pub right: Option<Axis>,
}

impl Chart {
    /// Time range of the chart. Starts at zero and is never empty.
    pub fn x_range(&self) -> (f64, f64) {
        let max = self
            .times
            .iter()
            .copied()
            .filter(|v| v.is_finite())
            .fold(0.0_f64, f64::max);
        (0.0, if max > 0.0 { max } else { 1.0 })
    }
}

/// Round `value` up to one significant digit. Zero and below become one.
fn round_up(value: f64) -> f64 {
    if value <= 0.0 {
        return 1.0;
    }
    let magnitude = 10_f64.powf(value.log10().floor());
    (value / magnitude).ceil() * magnitude
}

/// `count` evenly spaced tick positions across `range`, both ends included.
pub fn ticks((low, high): (f64, f64), count: usize) -> Vec<f64> {
    if count < 2 {
        return vec![low];
    }
    let step = (high - low) / (count - 1) as f64;
    (0..count).map(|i| low + step * i as f64).collect()
}

/// Something able to draw a [`Chart`] to a file.
pub trait ChartRenderer: Debug {
    /// False when no plotting backend is compiled in.
    fn is_available(&self) -> bool;

    fn render(&self, chart: &Chart, path: &Path) -> Result<()>;
}

/// Stands in for a renderer when plotting is not compiled in.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopRenderer;

impl ChartRenderer for NoopRenderer {
    fn is_available(&self) -> bool {
        false
    }

    fn render(&self, _chart: &Chart, _path: &Path) -> Result<()> {
        Ok(())
    }
}

/// The best renderer this build has.
#[cfg(feature = "plot")]
pub fn default_renderer() -> Box<dyn ChartRenderer + Send + Sync> {
    Box::new(crate::pdf::PdfRenderer)
}

#[cfg(not(feature = "plot"))]
pub fn default_renderer() -> Box<dyn ChartRenderer + Send + Sync> {
    Box::new(NoopRenderer)
}
