//! Altitude resolution for vector features.
//!
//! Features carry 3-D geometry. An [`AltitudeResolver`] reconciles that
//! geometry with the terrain of a map: it can leave Z alone and measure the
//! height above terrain, lift Z from "height above terrain" to an absolute
//! height, or drape the geometry onto the terrain. Each feature gets its range
//! of heights above terrain and its range of terrain heights as attributes.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use altitude::prelude::*;
//!
//! let session = Session::from(
//!     Map::new(SpatialReference::wgs84())
//!         .with_layer(ElevationLayer::terrain("dem", Arc::new(heightfield))),
//! );
//! let cx = FilterContext::new()
//!     .with_session(&session)
//!     .with_srs(SpatialReference::wgs84());
//!
//! let resolver = AltitudeResolver::new(AltitudePolicy::new(ClampingMode::RelativeToTerrain));
//! resolver.push(&mut features, &cx)?;
//! ```

pub mod context;
pub mod elevation;
pub mod errors;
pub mod expression;
pub mod feature;
pub mod policy;
pub mod resolver;
pub mod session;
pub mod srs;
pub mod stats;

pub use errors::AltitudeError;
pub use resolver::AltitudeResolver;

pub mod prelude {
    //! Convenient re-exports for common usage.

    pub use crate::context::FilterContext;
    pub use crate::elevation::{
        ElevationQuery, ElevationSampler, HeightSource, Heightfield, SampleError,
    };
    pub use crate::errors::AltitudeError;
    pub use crate::expression::{ExpressionError, NumericExpression};
    pub use crate::feature::{AttributeValue, Feature, Geometry, Point3};
    pub use crate::policy::{AltitudePolicy, AltitudeSymbol, ClampingMode, Style, TransformFailure};
    pub use crate::resolver::AltitudeResolver;
    pub use crate::session::{ElevationLayer, LayerRole, Map, MapFrame, MapScope, Session};
    pub use crate::srs::{Geoid, HorizontalRef, SpatialReference, SrsError, VerticalDatum};
    pub use crate::stats::{
        Extent, FeatureStats, MAX_HAT, MAX_TERRAIN_Z, MIN_HAT, MIN_TERRAIN_Z,
    };
}
