//! Scenario builder: synthetic terrain plus synthetic features, resolved.

use std::sync::Arc;
use std::time::Instant;

use altitude::{
    AltitudeError, AltitudeResolver,
    context::FilterContext,
    feature::Feature,
    policy::{AltitudeSymbol, ClampingMode, Style},
    session::{ElevationLayer, Map, Session},
    srs::SpatialReference,
    stats::{Extent, MAX_HAT, MAX_TERRAIN_Z, MIN_HAT, MIN_TERRAIN_Z},
};
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::{debug, info};

use crate::config::{BoundingBox, ScenarioConfig, TerrainPreset};
use crate::sources::ProceduralGenerator;

/// Result of running a scenario.
#[derive(Debug)]
pub struct ScenarioResult {
    /// The session the features were resolved against.
    pub session: Session,
    /// Spatial reference of the features.
    pub srs: SpatialReference,
    /// The resolved features.
    pub features: Vec<Feature>,
    /// Metrics if enabled.
    pub metrics: Option<ScenarioMetrics>,
}

/// Metrics collected during a scenario run.
#[derive(Debug, Clone, Default)]
pub struct ScenarioMetrics {
    /// Time spent generating terrain and features (milliseconds).
    pub generation_time_ms: u64,
    /// Time spent resolving altitudes (milliseconds).
    pub resolve_time_ms: u64,
    pub feature_count: usize,
    pub vertex_count: usize,
    /// Features that came out with height-above-terrain attributes.
    pub features_with_hat: usize,
    /// Features that came out with terrain height attributes.
    pub features_with_terrain: usize,
    /// Span of height above terrain over all features.
    pub hat: Extent,
    /// Span of terrain height over all features.
    pub terrain: Extent,
}

impl ScenarioMetrics {
    fn collect(features: &[Feature]) -> Self {
        let mut metrics = Self {
            feature_count: features.len(),
            ..Default::default()
        };

        for feature in features {
            metrics.vertex_count += feature.geometry().map_or(0, |g| g.vertex_count());

            let hat: Extent = [MIN_HAT, MAX_HAT]
                .iter()
                .filter_map(|k| feature.get_double(k))
                .collect();
            if !hat.is_empty() {
                metrics.features_with_hat += 1;
                metrics.hat = metrics.hat.merge(hat);
            }

            let terrain: Extent = [MIN_TERRAIN_Z, MAX_TERRAIN_Z]
                .iter()
                .filter_map(|k| feature.get_double(k))
                .collect();
            if !terrain.is_empty() {
                metrics.features_with_terrain += 1;
                metrics.terrain = metrics.terrain.merge(terrain);
            }
        }

        metrics
    }
}

/// Builder for clamping scenarios.
///
/// # Example
///
/// ```rust,ignore
/// let result = ScenarioBuilder::new()
///     .with_region(Region::RENO_TAHOE)
///     .with_terrain(TerrainPreset::RenoTahoe)
///     .with_feature_count(500)
///     .with_clamping(ClampingMode::RelativeToTerrain)
///     .with_parallel(true)
///     .run()?;
/// ```
#[derive(Debug, Clone)]
pub struct ScenarioBuilder {
    config: ScenarioConfig,
    parallel: bool,
    collect_metrics: bool,
}

impl Default for ScenarioBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ScenarioBuilder {
    pub fn new() -> Self {
        Self::from_config(ScenarioConfig::default())
    }

    pub fn from_config(config: ScenarioConfig) -> Self {
        Self {
            config,
            parallel: false,
            collect_metrics: true,
        }
    }

    /// Sets the seed for reproducible terrain and features.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.config.seed = seed;
        self
    }

    pub fn with_region(mut self, region: BoundingBox) -> Self {
        self.config.region = region;
        self
    }

    pub fn with_terrain(mut self, terrain: TerrainPreset) -> Self {
        self.config.terrain = terrain;
        self
    }

    /// Sets how far terrain data reaches beyond the region, in degrees.
    pub fn with_terrain_margin(mut self, degrees: f64) -> Self {
        self.config.terrain_margin = degrees;
        self
    }

    pub fn with_feature_count(mut self, count: usize) -> Self {
        self.config.feature_count = count;
        self
    }

    pub fn with_style(mut self, style: Style) -> Self {
        self.config.style = style;
        self
    }

    /// Replaces only the clamping mode of the style's altitude symbol.
    pub fn with_clamping(mut self, mode: ClampingMode) -> Self {
        self.config
            .style
            .altitude
            .get_or_insert_with(AltitudeSymbol::default)
            .clamping = mode;
        self
    }

    /// Resolves features across the rayon pool.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn with_metrics(mut self, enabled: bool) -> Self {
        self.collect_metrics = enabled;
        self
    }

    pub fn config(&self) -> &ScenarioConfig {
        &self.config
    }

    /// Generates the terrain session and the unresolved features.
    pub fn build_data(&self) -> (Session, Vec<Feature>) {
        let mut rng = StdRng::seed_from_u64(self.config.seed);

        let terrain = self.config.terrain_generator();
        let session = Session::from(
            Map::new(SpatialReference::wgs84())
                .with_layer(ElevationLayer::terrain("synthetic", Arc::new(terrain))),
        );

        let features = ProceduralGenerator::from_scenario(&self.config)
            .generate_batch(self.config.feature_count, &mut rng);
        debug!(features = features.len(), seed = self.config.seed, "generated scenario data");

        (session, features)
    }

    /// Generates the scenario and resolves every feature's altitude.
    pub fn run(&self) -> Result<ScenarioResult, AltitudeError> {
        let gen_start = Instant::now();
        let (session, mut features) = self.build_data();
        let generation_time_ms = gen_start.elapsed().as_millis() as u64;

        let srs = SpatialReference::wgs84();
        let resolver = AltitudeResolver::from_style(&self.config.style);
        info!(
            mode = ?resolver.policy().mode,
            features = features.len(),
            parallel = self.parallel,
            "resolving scenario"
        );

        let resolve_start = Instant::now();
        {
            let cx = FilterContext::new()
                .with_session(&session)
                .with_srs(srs.clone());
            if self.parallel {
                resolver.push_parallel(&mut features, &cx)?;
            } else {
                resolver.push(&mut features, &cx)?;
            }
        }
        let resolve_time_ms = resolve_start.elapsed().as_millis() as u64;

        let metrics = self.collect_metrics.then(|| ScenarioMetrics {
            generation_time_ms,
            resolve_time_ms,
            ..ScenarioMetrics::collect(&features)
        });

        Ok(ScenarioResult {
            session,
            srs,
            features,
            metrics,
        })
    }

    // ========================================================================
    // Preset Scenarios
    // ========================================================================

    /// Trails draped onto mountain terrain.
    pub fn draped_trails() -> Self {
        Self::new()
            .with_terrain(TerrainPreset::RenoTahoe)
            .with_region(crate::config::Region::RENO_TAHOE)
            .with_feature_count(200)
            .with_clamping(ClampingMode::ToTerrain)
    }

    /// Building footprints whose Z is a height above ground, scaled by floor
    /// count.
    pub fn extruded_footprints() -> Self {
        let mut builder = Self::new().with_feature_count(200);
        builder.config.polygon_fraction = 1.0;
        builder.config.height_range = (0.0, 0.0);
        builder.config.style = Style {
            name: "footprints".to_string(),
            altitude: Some(AltitudeSymbol {
                clamping: ClampingMode::RelativeToTerrain,
                vertical_offset: "[floors] * 3".parse().ok(),
                ..Default::default()
            }),
        };
        builder
    }
}
