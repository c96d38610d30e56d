//! Fluent builder APIs for clamping scenarios.
//!
//! The [`ScenarioBuilder`] puts synthetic features over synthetic terrain
//! and resolves their altitudes in one call.

mod scenario;

pub use scenario::{ScenarioBuilder, ScenarioMetrics, ScenarioResult};
