//! Per-feature statistics gathered while resolving altitudes.

use crate::feature::Feature;

pub const MIN_HAT: &str = "min_hat";
pub const MAX_HAT: &str = "max_hat";
pub const MIN_TERRAIN_Z: &str = "min_terrain_z";
pub const MAX_TERRAIN_Z: &str = "max_terrain_z";

/// Running minimum and maximum of a series of values.
///
/// Merging is associative and commutative, so extents gathered over any
/// split or ordering of the same values agree.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Extent {
    min: f64,
    max: f64,
    count: usize,
}

impl Extent {
    pub const EMPTY: Extent = Extent {
        min: f64::INFINITY,
        max: f64::NEG_INFINITY,
        count: 0,
    };

    /// Adds one value. NaN is not a height and is ignored.
    pub fn include(&mut self, value: f64) {
        if value.is_nan() {
            return;
        }
        self.min = self.min.min(value);
        self.max = self.max.max(value);
        self.count += 1;
    }

    pub fn merge(self, other: Extent) -> Extent {
        Extent {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
            count: self.count + other.count,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn count(&self) -> usize {
        self.count
    }

    /// `(min, max)`, or `None` when nothing was included.
    pub fn bounds(&self) -> Option<(f64, f64)> {
        (!self.is_empty()).then_some((self.min, self.max))
    }
}

impl Default for Extent {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl Extend<f64> for Extent {
    fn extend<I: IntoIterator<Item = f64>>(&mut self, iter: I) {
        for value in iter {
            self.include(value);
        }
    }
}

impl FromIterator<f64> for Extent {
    fn from_iter<I: IntoIterator<Item = f64>>(iter: I) -> Self {
        let mut extent = Extent::EMPTY;
        extent.extend(iter);
        extent
    }
}

/// Height-above-terrain and terrain-height extents of one feature.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FeatureStats {
    pub hat: Extent,
    pub terrain: Extent,
}

impl FeatureStats {
    pub fn merge(self, other: FeatureStats) -> FeatureStats {
        FeatureStats {
            hat: self.hat.merge(other.hat),
            terrain: self.terrain.merge(other.terrain),
        }
    }

    /// Stores the extents as feature attributes. Each pair is written only when
    /// it saw at least one value, so "no data" stays distinguishable from zero.
    pub fn apply_to(&self, feature: &mut Feature) {
        if let Some((min, max)) = self.hat.bounds() {
            feature.set(MIN_HAT, min);
            feature.set(MAX_HAT, max);
        }
        if let Some((min, max)) = self.terrain.bounds() {
            feature.set(MIN_TERRAIN_Z, min);
            feature.set(MAX_TERRAIN_Z, max);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_extent_has_no_bounds() {
        assert_eq!(Extent::EMPTY.bounds(), None);
        assert!(Extent::default().is_empty());
    }

    #[test]
    fn test_extent_is_order_independent() {
        let values = [3.0, -1.5, 7.25, 0.0, 7.25];
        let forward: Extent = values.iter().copied().collect();
        let backward: Extent = values.iter().rev().copied().collect();

        assert_eq!(forward, backward);
        assert_eq!(forward.bounds(), Some((-1.5, 7.25)));
        assert_eq!(forward.count(), 5);
    }

    #[test]
    fn test_merge_matches_single_pass() {
        let values = [4.0, 9.0, -2.0, 1.0, 6.0];
        let whole: Extent = values.iter().copied().collect();

        let (left, right) = values.split_at(2);
        let split = left
            .iter()
            .copied()
            .collect::<Extent>()
            .merge(right.iter().copied().collect());

        assert_eq!(whole, split);
        assert_eq!(Extent::EMPTY.merge(whole), whole);
    }

    #[test]
    fn test_nan_is_not_counted() {
        let only_nan: Extent = [f64::NAN].into_iter().collect();
        assert!(only_nan.is_empty());
        assert_eq!(only_nan.bounds(), None);

        let mixed: Extent = [4.0, f64::NAN, -1.0].into_iter().collect();
        assert_eq!(mixed.bounds(), Some((-1.0, 4.0)));
        assert_eq!(mixed.count(), 2);
    }

    #[test]
    fn test_apply_writes_pairs_independently() {
        let mut stats = FeatureStats::default();
        stats.terrain.include(120.0);
        stats.terrain.include(80.0);

        let mut feature = Feature::empty();
        stats.apply_to(&mut feature);

        assert_eq!(feature.get_double(MIN_TERRAIN_Z), Some(80.0));
        assert_eq!(feature.get_double(MAX_TERRAIN_Z), Some(120.0));
        assert!(!feature.has_attribute(MIN_HAT));
        assert!(!feature.has_attribute(MAX_HAT));
    }
}
