// raylet_dash/src/general/metrics/mod.rs
mod collector;
mod types;
mod views;

pub use collector::MetricsCollector;
pub use types::{Raylet, ViewData, ViewMeasures};
pub use views::ViewRegistry;
