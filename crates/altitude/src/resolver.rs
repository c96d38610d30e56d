//! Altitude resolution over batches of features.
//!
//! [`AltitudeResolver::push`] decides once per batch whether terrain is
//! involved. Without terrain, every Z is scaled and offset and the resulting
//! range is recorded as the feature's height above terrain. With terrain, each
//! geometry part is sampled in a single batch and every vertex is resolved by
//! the handler for the policy's [`ClampingMode`].

use rayon::prelude::*;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    context::FilterContext,
    elevation::ElevationSampler,
    errors::AltitudeError,
    feature::{Feature, Geometry, Point3},
    policy::{AltitudePolicy, ClampingMode, Style, TransformFailure},
    session::Session,
    srs::{SpatialReference, SrsError},
    stats::{Extent, FeatureStats},
};

#[derive(Debug, Clone, Default)]
pub struct AltitudeResolver {
    policy: AltitudePolicy,
}

impl AltitudeResolver {
    pub fn new(policy: AltitudePolicy) -> Self {
        Self { policy }
    }

    pub fn from_style(style: &Style) -> Self {
        Self::new(AltitudePolicy::from_style(style))
    }

    pub fn set_properties_from_style(&mut self, style: &Style) {
        self.policy = AltitudePolicy::from_style(style);
    }

    pub fn policy(&self) -> &AltitudePolicy {
        &self.policy
    }

    /// Session and feature reference, when the batch should be clamped.
    fn clamp_inputs<'c>(
        &self,
        cx: &'c FilterContext<'_>,
    ) -> Option<(&'c Session, &'c SpatialReference)> {
        if self.policy.mode == ClampingMode::None {
            return None;
        }
        Some((cx.session()?, cx.srs()?))
    }

    /// Resolves the altitude of every feature in place and attaches its
    /// statistics. The context is handed back unchanged.
    pub fn push<'a>(
        &self,
        features: &mut [Feature],
        cx: &FilterContext<'a>,
    ) -> Result<FilterContext<'a>, AltitudeError> {
        match self.clamp_inputs(cx) {
            Some((session, srs)) => {
                let query = session.terrain_query();
                self.push_with_sampler(features, srs, query.srs(), &query)?;
            }
            None => {
                debug!(features = features.len(), "resolving altitudes without terrain");
                features.iter_mut().for_each(|f| self.resolve_unclamped(f));
            }
        }
        Ok(cx.clone())
    }

    /// Same as [`AltitudeResolver::push`], with features spread across the
    /// rayon pool. Each feature is still resolved sequentially, so the results
    /// match the sequential path.
    pub fn push_parallel<'a>(
        &self,
        features: &mut [Feature],
        cx: &FilterContext<'a>,
    ) -> Result<FilterContext<'a>, AltitudeError> {
        match self.clamp_inputs(cx) {
            Some((session, srs)) => {
                let query = session.terrain_query();
                let pass = ClampPass::new(&self.policy, srs, query.srs(), &query);
                pass.announce(features.len());
                features.par_iter_mut().try_for_each(|f| pass.resolve(f))?;
            }
            None => {
                debug!(features = features.len(), "resolving altitudes without terrain");
                features.par_iter_mut().for_each(|f| self.resolve_unclamped(f));
            }
        }
        Ok(cx.clone())
    }

    /// Resolves against an explicit sampler whose heights are expressed in
    /// `terrain_srs`. A policy in [`ClampingMode::None`] takes the unclamped
    /// path and never calls the sampler.
    pub fn push_with_sampler<S: ElevationSampler + ?Sized>(
        &self,
        features: &mut [Feature],
        feature_srs: &SpatialReference,
        terrain_srs: &SpatialReference,
        sampler: &S,
    ) -> Result<(), AltitudeError> {
        if self.policy.mode == ClampingMode::None {
            features.iter_mut().for_each(|f| self.resolve_unclamped(f));
            return Ok(());
        }

        let pass = ClampPass::new(&self.policy, feature_srs, terrain_srs, sampler);
        pass.announce(features.len());
        features.iter_mut().try_for_each(|f| pass.resolve(f))
    }

    fn resolve_unclamped(&self, feature: &mut Feature) {
        let (scale, offset) = self.policy.scale_and_offset(feature);
        let mut heights = Extent::EMPTY;

        if let Some(geometry) = feature.geometry_mut() {
            for part in geometry.parts_mut() {
                for p in part.iter_mut() {
                    p.z = p.z * scale + offset;
                    heights.include(p.z);
                }
            }
        }

        // Raw heights stand in for heights above terrain.
        FeatureStats {
            hat: heights,
            terrain: Extent::EMPTY,
        }
        .apply_to(feature);
    }
}

/// Result of resolving one vertex.
#[derive(Debug, Clone, Copy, PartialEq)]
enum VertexOutcome {
    /// The vertex is left as it was and contributes no statistics.
    Skipped,
    Resolved {
        point: Point3,
        hat: Option<f64>,
        terrain_z: Option<f64>,
    },
}

/// State shared by every feature of one clamped batch.
struct ClampPass<'p, S: ?Sized> {
    policy: &'p AltitudePolicy,
    sampler: &'p S,
    feature_srs: &'p SpatialReference,
    /// The terrain reference in geographic form.
    terrain_geo_srs: SpatialReference,
    /// The features' horizontal reference with the terrain's vertical datum.
    /// Present only when the two vertical datums differ.
    transient_srs: Option<SpatialReference>,
}

impl<'p, S: ElevationSampler + ?Sized> ClampPass<'p, S> {
    fn new(
        policy: &'p AltitudePolicy,
        feature_srs: &'p SpatialReference,
        terrain_srs: &SpatialReference,
        sampler: &'p S,
    ) -> Self {
        let vert_equiv = feature_srs.is_vert_equivalent_to(terrain_srs);
        let transient_srs = (!vert_equiv).then(|| {
            SpatialReference::new(feature_srs.horizontal(), terrain_srs.vertical().clone())
        });

        Self {
            policy,
            sampler,
            feature_srs,
            terrain_geo_srs: terrain_srs.geographic(),
            transient_srs,
        }
    }

    fn vert_equiv(&self) -> bool {
        self.transient_srs.is_none()
    }

    fn announce(&self, features: usize) {
        debug!(
            features,
            mode = ?self.policy.mode,
            vert_equiv = self.vert_equiv(),
            collect_hats = self.policy.mode.collects_hats(),
            max_resolution = self.policy.max_resolution,
            feature_srs = %self.feature_srs,
            "clamping features to terrain"
        );
    }

    /// Resolves one feature. A feature whose resolution aborts is left exactly
    /// as it came in.
    fn resolve(&self, feature: &mut Feature) -> Result<(), AltitudeError> {
        let (scale, offset) = self.policy.scale_and_offset(feature);
        let id = feature.id;
        let snapshot = (self.policy.on_transform_failure == TransformFailure::Abort)
            .then(|| feature.geometry.clone());

        match self.resolve_geometry(id, feature.geometry_mut(), scale, offset) {
            Ok(stats) => {
                stats.apply_to(feature);
                Ok(())
            }
            Err(e) => {
                if let Some(geometry) = snapshot {
                    feature.geometry = geometry;
                }
                Err(e)
            }
        }
    }

    fn resolve_geometry(
        &self,
        id: Uuid,
        geometry: Option<&mut Geometry>,
        scale: f64,
        offset: f64,
    ) -> Result<FeatureStats, AltitudeError> {
        let mut stats = FeatureStats::default();
        if let Some(geometry) = geometry {
            for part in geometry.parts_mut() {
                if part.is_empty() {
                    continue;
                }
                stats = stats.merge(self.resolve_part(id, part, scale, offset)?);
            }
        }
        Ok(stats)
    }

    fn resolve_part(
        &self,
        id: Uuid,
        part: &mut [Point3],
        scale: f64,
        offset: f64,
    ) -> Result<FeatureStats, AltitudeError> {
        let mode = self.policy.mode;
        let resolution = self.policy.max_resolution;
        let originals = part.to_vec();

        let sampled = match mode {
            ClampingMode::ToTerrain => {
                self.sampler.clamp_elevations(part, self.feature_srs, resolution)
            }
            _ => self.sampler.get_elevations(part, self.feature_srs, resolution),
        };
        let samples = sampled.unwrap_or_else(|e| {
            warn!(feature = %id, error = %e, "elevation sampling failed; part left unclamped");
            part.copy_from_slice(&originals);
            vec![None; originals.len()]
        });

        let mut stats = FeatureStats::default();
        for (i, point) in part.iter_mut().enumerate() {
            let sample = samples.get(i).copied().flatten();
            let outcome = match self.resolve_vertex(*point, sample, scale, offset) {
                Ok(outcome) => outcome,
                Err(source) => match self.policy.on_transform_failure {
                    TransformFailure::Abort => {
                        return Err(AltitudeError::Transform { feature: id, source });
                    }
                    TransformFailure::SkipVertex => {
                        warn!(feature = %id, vertex = i, error = %source, "vertex transform failed; skipping");
                        self.unsampled(originals[i], scale, offset)
                    }
                },
            };

            if let VertexOutcome::Resolved {
                point: resolved,
                hat,
                terrain_z,
            } = outcome
            {
                *point = resolved;
                if let Some(hat) = hat {
                    stats.hat.include(hat);
                }
                if let Some(z) = terrain_z {
                    stats.terrain.include(z);
                }
            }
        }

        Ok(stats)
    }

    fn resolve_vertex(
        &self,
        point: Point3,
        sample: Option<f64>,
        scale: f64,
        offset: f64,
    ) -> Result<VertexOutcome, SrsError> {
        match (self.policy.mode, sample) {
            (ClampingMode::Absolute, Some(elevation)) => {
                self.absolute(point, elevation, scale, offset)
            }
            (ClampingMode::RelativeToTerrain, Some(elevation)) => {
                self.relative(point, elevation, scale, offset)
            }
            (ClampingMode::ToTerrain, Some(_)) => self.to_terrain(point, scale, offset),
            (_, None) => Ok(self.unsampled(point, scale, offset)),
            (ClampingMode::None, Some(_)) => Ok(VertexOutcome::Skipped),
        }
    }

    /// Z is an absolute height: measure it against the terrain, leave it be.
    fn absolute(
        &self,
        point: Point3,
        elevation: f64,
        scale: f64,
        offset: f64,
    ) -> Result<VertexOutcome, SrsError> {
        let mut z = point.z * scale + offset;
        if !self.vert_equiv() {
            z = self
                .feature_srs
                .transform(Point3 { z, ..point }, &self.terrain_geo_srs)?
                .z;
        }

        Ok(VertexOutcome::Resolved {
            point,
            hat: Some(z - elevation),
            terrain_z: Some(elevation),
        })
    }

    /// Z is a height above the terrain: lift it onto the terrain, then bring
    /// the result back into the features' vertical datum.
    fn relative(
        &self,
        point: Point3,
        elevation: f64,
        scale: f64,
        offset: f64,
    ) -> Result<VertexOutcome, SrsError> {
        let height = point.z * scale + offset;
        let mut resolved = Point3 {
            z: elevation + height,
            ..point
        };
        if let Some(transient) = &self.transient_srs {
            resolved = transient.transform(resolved, self.feature_srs)?;
        }

        Ok(VertexOutcome::Resolved {
            point: resolved,
            hat: Some(height),
            terrain_z: Some(elevation),
        })
    }

    /// The sampler already wrote the terrain height into Z, in the terrain's
    /// vertical datum.
    fn to_terrain(&self, point: Point3, scale: f64, offset: f64) -> Result<VertexOutcome, SrsError> {
        let mut resolved = match &self.transient_srs {
            Some(transient) => transient.transform(point, self.feature_srs)?,
            None => point,
        };
        resolved.z = resolved.z * scale + offset;

        Ok(VertexOutcome::Resolved {
            point: resolved,
            hat: None,
            terrain_z: None,
        })
    }

    /// A vertex without a usable sample. Draped geometry still takes the
    /// vertical scale and offset; the measuring modes leave it untouched.
    fn unsampled(&self, point: Point3, scale: f64, offset: f64) -> VertexOutcome {
        match self.policy.mode {
            ClampingMode::ToTerrain => VertexOutcome::Resolved {
                point: Point3 {
                    z: point.z * scale + offset,
                    ..point
                },
                hat: None,
                terrain_z: None,
            },
            _ => VertexOutcome::Skipped,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        elevation::SampleError,
        expression::NumericExpression,
        srs::{Geoid, VerticalDatum},
        stats::{MAX_HAT, MAX_TERRAIN_Z, MIN_HAT, MIN_TERRAIN_Z},
    };

    /// Terrain whose height is a function of the vertex.
    struct TerrainFn<F>(F);

    impl<F: Fn(&Point3) -> Option<f64>> ElevationSampler for TerrainFn<F> {
        fn get_elevations(
            &self,
            points: &[Point3],
            _srs: &SpatialReference,
            _max_resolution: f64,
        ) -> Result<Vec<Option<f64>>, SampleError> {
            Ok(points.iter().map(&self.0).collect())
        }
    }

    fn flat(height: f64) -> TerrainFn<impl Fn(&Point3) -> Option<f64>> {
        TerrainFn(move |_: &Point3| Some(height))
    }

    fn no_data() -> TerrainFn<impl Fn(&Point3) -> Option<f64>> {
        TerrainFn(|_: &Point3| None)
    }

    struct Broken;

    impl ElevationSampler for Broken {
        fn get_elevations(
            &self,
            _points: &[Point3],
            _srs: &SpatialReference,
            _max_resolution: f64,
        ) -> Result<Vec<Option<f64>>, SampleError> {
            Err(SampleError::Source {
                name: "tiles".to_string(),
                message: "cache offline".to_string(),
            })
        }
    }

    fn line(zs: &[f64]) -> Feature {
        Feature::new(Geometry::LineString(
            zs.iter()
                .enumerate()
                .map(|(i, z)| Point3::new(i as f64, 0.0, *z))
                .collect(),
        ))
    }

    fn zs(feature: &Feature) -> Vec<f64> {
        feature
            .geometry()
            .map(|g| g.vertices().map(|p| p.z).collect())
            .unwrap_or_default()
    }

    fn resolver(mode: ClampingMode) -> AltitudeResolver {
        AltitudeResolver::new(AltitudePolicy::new(mode))
    }

    fn geoid_srs(undulation: f64) -> SpatialReference {
        SpatialReference::wgs84().with_vertical(VerticalDatum::geoid(Geoid::constant(
            "egm96",
            undulation,
        )))
    }

    const STAT_KEYS: [&str; 4] = [MIN_HAT, MAX_HAT, MIN_TERRAIN_Z, MAX_TERRAIN_Z];

    #[test]
    fn test_unclamped_scale_and_offset() {
        let resolver = AltitudeResolver::new(
            AltitudePolicy::default()
                .with_vertical_scale(NumericExpression::constant(2.0))
                .with_vertical_offset(NumericExpression::constant(10.0)),
        );
        let mut features = vec![line(&[5.0])];

        resolver.push(&mut features, &FilterContext::new()).unwrap();

        assert_eq!(zs(&features[0]), vec![20.0]);
        assert_eq!(features[0].get_double(MIN_HAT), Some(20.0));
        assert_eq!(features[0].get_double(MAX_HAT), Some(20.0));
        assert!(!features[0].has_attribute(MIN_TERRAIN_Z));
    }

    #[test]
    fn test_unclamped_without_session_even_if_mode_set() {
        let resolver = resolver(ClampingMode::ToTerrain);
        let mut features = vec![line(&[3.0, 9.0])];
        let cx = FilterContext::new().with_srs(SpatialReference::wgs84());

        resolver.push(&mut features, &cx).unwrap();

        assert_eq!(zs(&features[0]), vec![3.0, 9.0]);
        assert_eq!(features[0].get_double(MIN_HAT), Some(3.0));
        assert_eq!(features[0].get_double(MAX_HAT), Some(9.0));
    }

    #[test]
    fn test_empty_geometry_gets_no_statistics() {
        let srs = SpatialReference::wgs84();
        for mode in [
            ClampingMode::None,
            ClampingMode::Absolute,
            ClampingMode::RelativeToTerrain,
            ClampingMode::ToTerrain,
        ] {
            let mut features = vec![Feature::empty(), line(&[])];
            resolver(mode)
                .push_with_sampler(&mut features, &srs, &srs, &flat(100.0))
                .unwrap();

            for feature in &features {
                for key in STAT_KEYS {
                    assert!(!feature.has_attribute(key), "{mode:?} attached {key}");
                }
            }
        }
    }

    #[test]
    fn test_absolute_measures_without_moving() {
        let srs = SpatialReference::wgs84();
        let resolver = resolver(ClampingMode::Absolute);
        let terrain = TerrainFn(|p: &Point3| Some(100.0 + p.x));
        let mut features = vec![line(&[150.0, 90.0, 130.0])];

        resolver
            .push_with_sampler(&mut features, &srs, &srs, &terrain)
            .unwrap();
        let first_zs = zs(&features[0]);
        let first_attrs = features[0].attributes.clone();

        resolver
            .push_with_sampler(&mut features, &srs, &srs, &terrain)
            .unwrap();

        assert_eq!(first_zs, vec![150.0, 90.0, 130.0]);
        assert_eq!(zs(&features[0]), first_zs);
        assert_eq!(features[0].attributes, first_attrs);

        // HATs: 50, -11, 28. Terrain: 100, 101, 102.
        assert_eq!(features[0].get_double(MIN_HAT), Some(-11.0));
        assert_eq!(features[0].get_double(MAX_HAT), Some(50.0));
        assert_eq!(features[0].get_double(MIN_TERRAIN_Z), Some(100.0));
        assert_eq!(features[0].get_double(MAX_TERRAIN_Z), Some(102.0));
    }

    #[test]
    fn test_absolute_corrects_vertical_datum() {
        // Features in orthometric heights 20m above the ellipsoid; terrain in
        // ellipsoidal heights.
        let feature_srs = geoid_srs(20.0);
        let terrain_srs = SpatialReference::wgs84();
        let mut features = vec![line(&[150.0])];

        resolver(ClampingMode::Absolute)
            .push_with_sampler(&mut features, &feature_srs, &terrain_srs, &flat(100.0))
            .unwrap();

        assert_eq!(zs(&features[0]), vec![150.0]);
        assert_eq!(features[0].get_double(MIN_HAT), Some(70.0));
    }

    #[test]
    fn test_relative_lifts_onto_terrain() {
        let srs = SpatialReference::wgs84();
        let mut features = vec![line(&[2.0])];

        resolver(ClampingMode::RelativeToTerrain)
            .push_with_sampler(&mut features, &srs, &srs, &flat(100.0))
            .unwrap();

        assert_eq!(zs(&features[0]), vec![102.0]);
        assert_eq!(features[0].get_double(MIN_HAT), Some(2.0));
        assert_eq!(features[0].get_double(MAX_HAT), Some(2.0));
        assert_eq!(features[0].get_double(MIN_TERRAIN_Z), Some(100.0));
        assert_eq!(features[0].get_double(MAX_TERRAIN_Z), Some(100.0));
    }

    #[test]
    fn test_relative_returns_to_feature_datum() {
        let feature_srs = geoid_srs(20.0);
        let terrain_srs = SpatialReference::wgs84();
        let mut features = vec![line(&[2.0])];

        resolver(ClampingMode::RelativeToTerrain)
            .push_with_sampler(&mut features, &feature_srs, &terrain_srs, &flat(100.0))
            .unwrap();

        // 102m above the ellipsoid is 82m above a geoid sitting 20m higher.
        let z = zs(&features[0])[0];
        assert!((z - 82.0).abs() < 1e-9);
        assert_eq!(features[0].get_double(MIN_HAT), Some(2.0));
    }

    #[test]
    fn test_to_terrain_drapes_then_scales() {
        let srs = SpatialReference::wgs84();
        let resolver = AltitudeResolver::new(
            AltitudePolicy::new(ClampingMode::ToTerrain)
                .with_vertical_scale(NumericExpression::constant(1.5)),
        );
        let mut features = vec![line(&[7.0, 8.0])];

        resolver
            .push_with_sampler(&mut features, &srs, &srs, &flat(50.0))
            .unwrap();

        assert_eq!(zs(&features[0]), vec![75.0, 75.0]);
        for key in STAT_KEYS {
            assert!(!features[0].has_attribute(key));
        }
    }

    #[test]
    fn test_to_terrain_returns_to_feature_datum() {
        let feature_srs = geoid_srs(-15.0);
        let terrain_srs = SpatialReference::wgs84();
        let mut features = vec![line(&[0.0])];

        resolver(ClampingMode::ToTerrain)
            .push_with_sampler(&mut features, &feature_srs, &terrain_srs, &flat(50.0))
            .unwrap();

        let z = zs(&features[0])[0];
        assert!((z - 65.0).abs() < 1e-9);
    }

    #[test]
    fn test_no_data_everywhere_leaves_features_alone() {
        let srs = SpatialReference::wgs84();
        for mode in [ClampingMode::Absolute, ClampingMode::RelativeToTerrain] {
            let mut features = vec![line(&[4.0, 5.0, 6.0])];
            resolver(mode)
                .push_with_sampler(&mut features, &srs, &srs, &no_data())
                .unwrap();

            assert_eq!(zs(&features[0]), vec![4.0, 5.0, 6.0]);
            assert!(features[0].attributes.is_empty());
        }
    }

    #[test]
    fn test_partial_no_data_skips_vertices() {
        let srs = SpatialReference::wgs84();
        let terrain = TerrainFn(|p: &Point3| (p.x != 1.0).then_some(10.0));
        let mut features = vec![line(&[1.0, 500.0, 3.0])];

        resolver(ClampingMode::RelativeToTerrain)
            .push_with_sampler(&mut features, &srs, &srs, &terrain)
            .unwrap();

        assert_eq!(zs(&features[0]), vec![11.0, 500.0, 13.0]);
        assert_eq!(features[0].get_double(MIN_HAT), Some(1.0));
        assert_eq!(features[0].get_double(MAX_HAT), Some(3.0));
    }

    #[test]
    fn test_to_terrain_without_data_still_scales() {
        let srs = SpatialReference::wgs84();
        let resolver = AltitudeResolver::new(
            AltitudePolicy::new(ClampingMode::ToTerrain)
                .with_vertical_offset(NumericExpression::constant(1.0)),
        );
        let mut features = vec![line(&[4.0])];

        resolver
            .push_with_sampler(&mut features, &srs, &srs, &no_data())
            .unwrap();

        assert_eq!(zs(&features[0]), vec![5.0]);
    }

    #[test]
    fn test_statistics_ignore_vertex_order() {
        let srs = SpatialReference::wgs84();
        let terrain = TerrainFn(|p: &Point3| Some(p.z / 2.0 + 7.0));
        let values = [12.0, -4.0, 30.0, 8.5, 30.0, 1.0];
        let mut reversed = values;
        reversed.reverse();
        let mut rotated = values;
        rotated.rotate_left(2);

        let mut features = vec![line(&values), line(&reversed), line(&rotated)];
        resolver(ClampingMode::Absolute)
            .push_with_sampler(&mut features, &srs, &srs, &terrain)
            .unwrap();

        for key in STAT_KEYS {
            let expected = features[0].get_double(key);
            assert!(expected.is_some());
            assert_eq!(features[1].get_double(key), expected, "{key}");
            assert_eq!(features[2].get_double(key), expected, "{key}");
        }
    }

    #[test]
    fn test_statistics_span_all_parts() {
        let srs = SpatialReference::wgs84();
        let mut features = vec![Feature::new(Geometry::Polygon {
            exterior: vec![Point3::new(0.0, 0.0, 5.0), Point3::new(1.0, 0.0, 6.0)],
            holes: vec![vec![Point3::new(0.5, 0.5, 40.0)]],
        })];

        resolver(ClampingMode::RelativeToTerrain)
            .push_with_sampler(&mut features, &srs, &srs, &flat(0.0))
            .unwrap();

        assert_eq!(features[0].get_double(MIN_HAT), Some(5.0));
        assert_eq!(features[0].get_double(MAX_HAT), Some(40.0));
    }

    #[test]
    fn test_scale_expression_reads_attributes() {
        let srs = SpatialReference::wgs84();
        let resolver = AltitudeResolver::new(
            AltitudePolicy::new(ClampingMode::RelativeToTerrain)
                .with_vertical_scale("[floors]".parse().unwrap()),
        );
        let mut features = vec![line(&[3.0]).with_attribute("floors", 4_i64)];

        resolver
            .push_with_sampler(&mut features, &srs, &srs, &flat(100.0))
            .unwrap();

        assert_eq!(zs(&features[0]), vec![112.0]);
        assert_eq!(features[0].get_double(MAX_HAT), Some(12.0));
    }

    #[test]
    fn test_sampler_failure_skips_part() {
        let srs = SpatialReference::wgs84();
        let mut features = vec![line(&[4.0, 5.0])];

        resolver(ClampingMode::Absolute)
            .push_with_sampler(&mut features, &srs, &srs, &Broken)
            .unwrap();

        assert_eq!(zs(&features[0]), vec![4.0, 5.0]);
        assert!(features[0].attributes.is_empty());
    }

    fn unreachable_vertex() -> Feature {
        Feature::new(Geometry::Points(vec![
            Point3::new(0.0, 0.0, 1.0),
            Point3::new(f64::NAN, 0.0, 2.0),
        ]))
    }

    #[test]
    fn test_transform_failure_skips_vertex() {
        let feature_srs = geoid_srs(20.0);
        let terrain_srs = SpatialReference::wgs84();
        let mut features = vec![unreachable_vertex()];

        resolver(ClampingMode::RelativeToTerrain)
            .push_with_sampler(&mut features, &feature_srs, &terrain_srs, &flat(100.0))
            .unwrap();

        let zs = zs(&features[0]);
        assert!((zs[0] - 81.0).abs() < 1e-9);
        assert_eq!(zs[1], 2.0);
        assert_eq!(features[0].get_double(MIN_HAT), Some(1.0));
        assert_eq!(features[0].get_double(MAX_HAT), Some(1.0));
    }

    #[test]
    fn test_transform_failure_can_abort() {
        let feature_srs = geoid_srs(20.0);
        let terrain_srs = SpatialReference::wgs84();
        let resolver = AltitudeResolver::new(
            AltitudePolicy::new(ClampingMode::Absolute)
                .with_transform_failure(TransformFailure::Abort),
        );
        let mut features = vec![unreachable_vertex()];
        let id = features[0].id;

        let result =
            resolver.push_with_sampler(&mut features, &feature_srs, &terrain_srs, &flat(100.0));

        match result {
            Err(AltitudeError::Transform { feature, source }) => {
                assert_eq!(feature, id);
                assert!(matches!(source, SrsError::NonFinite { .. }));
            }
            other => panic!("expected transform failure, got {other:?}"),
        }
    }

    #[test]
    fn test_aborted_feature_is_left_untouched() {
        let feature_srs = geoid_srs(20.0);
        let terrain_srs = SpatialReference::wgs84();

        for mode in [ClampingMode::ToTerrain, ClampingMode::RelativeToTerrain] {
            let resolver = AltitudeResolver::new(
                AltitudePolicy::new(mode).with_transform_failure(TransformFailure::Abort),
            );
            let mut features = vec![Feature::new(Geometry::Points(vec![
                Point3::new(0.0, 0.0, 1.0),
                Point3::new(f64::NAN, 0.0, 2.0),
                Point3::new(2.0, 0.0, 3.0),
            ]))];
            let before = features[0].clone();

            let result =
                resolver.push_with_sampler(&mut features, &feature_srs, &terrain_srs, &flat(100.0));

            assert!(result.is_err(), "{mode:?}");
            let zs = zs(&features[0]);
            assert_eq!(zs[0], 1.0, "{mode:?}");
            assert_eq!(zs[2], 3.0, "{mode:?}");
            assert_eq!(features[0].attributes, before.attributes);
        }
    }

    #[test]
    fn test_abort_keeps_features_already_resolved() {
        let feature_srs = geoid_srs(20.0);
        let terrain_srs = SpatialReference::wgs84();
        let resolver = AltitudeResolver::new(
            AltitudePolicy::new(ClampingMode::RelativeToTerrain)
                .with_transform_failure(TransformFailure::Abort),
        );
        let mut features = vec![line(&[2.0]), unreachable_vertex(), line(&[5.0])];

        let result =
            resolver.push_with_sampler(&mut features, &feature_srs, &terrain_srs, &flat(100.0));

        assert!(result.is_err());
        assert!((zs(&features[0])[0] - 82.0).abs() < 1e-9);
        assert_eq!(features[0].get_double(MIN_HAT), Some(2.0));
        assert_eq!(zs(&features[1])[0], 1.0);
        assert_eq!(zs(&features[2]), vec![5.0]);
        assert!(features[2].attributes.is_empty());
    }

    #[test]
    fn test_nan_heights_attach_no_hat() {
        // Dividing by a missing attribute gives inf, and inf * 0 is NaN.
        let scale: NumericExpression = "1 / [missing]".parse().unwrap();
        let mut unclamped = vec![line(&[0.0])];
        AltitudeResolver::new(AltitudePolicy::default().with_vertical_scale(scale.clone()))
            .push(&mut unclamped, &FilterContext::new())
            .unwrap();

        assert!(zs(&unclamped[0])[0].is_nan());
        for key in STAT_KEYS {
            assert!(!unclamped[0].has_attribute(key), "{key}");
        }

        let srs = SpatialReference::wgs84();
        let mut absolute = vec![line(&[0.0])];
        AltitudeResolver::new(
            AltitudePolicy::new(ClampingMode::Absolute).with_vertical_scale(scale),
        )
        .push_with_sampler(&mut absolute, &srs, &srs, &flat(100.0))
        .unwrap();

        assert!(!absolute[0].has_attribute(MIN_HAT));
        assert!(!absolute[0].has_attribute(MAX_HAT));
        assert_eq!(absolute[0].get_double(MIN_TERRAIN_Z), Some(100.0));
        assert_eq!(absolute[0].get_double(MAX_TERRAIN_Z), Some(100.0));
    }

    #[test]
    fn test_style_drives_resolver() {
        let style = Style::from_json(r#"{"altitude": {"clamping": "terrain"}}"#).unwrap();
        let mut resolver = AltitudeResolver::default();
        assert_eq!(resolver.policy().mode, ClampingMode::None);

        resolver.set_properties_from_style(&style);
        assert_eq!(resolver.policy().mode, ClampingMode::ToTerrain);
        assert_eq!(resolver.policy().max_resolution, 0.0);
    }
}
