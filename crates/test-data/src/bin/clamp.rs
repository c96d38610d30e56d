//! Clamp synthetic features onto synthetic terrain and report what happened.
//!
//! Run with:
//! ```
//! cargo run -p test-data --bin clamp -- relative --parallel
//! ```
//!
//! The optional first argument overrides the clamping mode (`none`,
//! `absolute`, `relative`, `terrain`). `SCENARIO_CONFIG` may point at a JSON
//! scenario file; otherwise the defaults are used.

use anyhow::Context;
use test_data::prelude::*;
use tracing_subscriber::EnvFilter;

fn parse_mode(arg: &str) -> anyhow::Result<ClampingMode> {
    serde_json::from_value(serde_json::Value::String(arg.to_string()))
        .with_context(|| format!("unknown clamping mode '{arg}'"))
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = match std::env::var("SCENARIO_CONFIG") {
        Ok(path) => ScenarioConfig::from_file(&path)
            .with_context(|| format!("loading scenario from {path}"))?,
        Err(_) => ScenarioConfig::default(),
    };

    let mut builder = ScenarioBuilder::from_config(config);
    for arg in std::env::args().skip(1) {
        if arg == "--parallel" {
            builder = builder.with_parallel(true);
        } else {
            builder = builder.with_clamping(parse_mode(&arg)?);
        }
    }

    let result = builder.run()?;

    tracing::info!("Clamping completed!");
    if let Some(metrics) = &result.metrics {
        tracing::info!("  Features: {}", metrics.feature_count);
        tracing::info!("  Vertices: {}", metrics.vertex_count);
        tracing::info!("  With height above terrain: {}", metrics.features_with_hat);
        tracing::info!("  With terrain heights: {}", metrics.features_with_terrain);
        if let Some((min, max)) = metrics.hat.bounds() {
            tracing::info!("  Height above terrain: {min:.1}m .. {max:.1}m");
        }
        if let Some((min, max)) = metrics.terrain.bounds() {
            tracing::info!("  Terrain: {min:.1}m .. {max:.1}m");
        }
        tracing::info!(
            "  Generation: {}ms, resolution: {}ms",
            metrics.generation_time_ms,
            metrics.resolve_time_ms
        );
    }

    Ok(())
}
