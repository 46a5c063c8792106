#![doc = include_str!("../README.md")]

mod chart;
mod config;
mod error;
mod firefox;
mod host;
mod memory_profiler;
#[cfg(feature = "plot")]
mod pdf;
mod report;
mod series;
mod size;

pub use chart::*;
pub use config::*;
pub use error::*;
pub use firefox::*;
pub use host::*;
pub use memory_profiler::*;
#[cfg(feature = "plot")]
pub use pdf::*;
pub use report::*;
pub use series::*;
pub use size::*;
