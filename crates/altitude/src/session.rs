//! Maps, their elevation layers, and the sessions that share them.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::{
    elevation::{ElevationQuery, HeightSource},
    srs::SpatialReference,
};

/// What part a layer plays in the map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayerRole {
    /// Shapes the rendered terrain surface.
    Terrain,
    /// Elevation data that is queryable but not part of the rendered surface.
    ElevationOnly,
}

/// Which layers a [`MapFrame`] takes from its map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MapScope {
    /// Only layers that shape the rendered terrain.
    TerrainLayers,
    /// Every elevation layer.
    ElevationLayers,
}

impl MapScope {
    fn includes(self, role: LayerRole) -> bool {
        match self {
            MapScope::TerrainLayers => role == LayerRole::Terrain,
            MapScope::ElevationLayers => true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ElevationLayer {
    name: String,
    role: LayerRole,
    enabled: bool,
    source: Arc<dyn HeightSource>,
}

impl ElevationLayer {
    pub fn new(name: impl Into<String>, role: LayerRole, source: Arc<dyn HeightSource>) -> Self {
        Self {
            name: name.into(),
            role,
            enabled: true,
            source,
        }
    }

    pub fn terrain(name: impl Into<String>, source: Arc<dyn HeightSource>) -> Self {
        Self::new(name, LayerRole::Terrain, source)
    }

    pub fn elevation_only(name: impl Into<String>, source: Arc<dyn HeightSource>) -> Self {
        Self::new(name, LayerRole::ElevationOnly, source)
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn role(&self) -> LayerRole {
        self.role
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn source(&self) -> &dyn HeightSource {
        self.source.as_ref()
    }
}

/// A map: a spatial reference and a stack of elevation layers, bottom first.
#[derive(Debug, Clone)]
pub struct Map {
    srs: SpatialReference,
    layers: Vec<ElevationLayer>,
}

impl Map {
    pub fn new(srs: SpatialReference) -> Self {
        Self {
            srs,
            layers: Vec::new(),
        }
    }

    pub fn with_layer(mut self, layer: ElevationLayer) -> Self {
        self.add_layer(layer);
        self
    }

    /// Adds a layer on top of the stack.
    pub fn add_layer(&mut self, layer: ElevationLayer) {
        self.layers.push(layer);
    }

    pub fn srs(&self) -> &SpatialReference {
        &self.srs
    }

    pub fn layers(&self) -> &[ElevationLayer] {
        &self.layers
    }
}

/// A read-only snapshot of the enabled layers of a map within one scope.
#[derive(Debug, Clone)]
pub struct MapFrame<'a> {
    srs: &'a SpatialReference,
    layers: Vec<&'a ElevationLayer>,
    scope: MapScope,
}

impl<'a> MapFrame<'a> {
    pub fn new(map: &'a Map, scope: MapScope) -> Self {
        Self {
            srs: map.srs(),
            layers: map
                .layers()
                .iter()
                .filter(|l| l.is_enabled() && scope.includes(l.role()))
                .collect(),
            scope,
        }
    }

    pub fn srs(&self) -> &'a SpatialReference {
        self.srs
    }

    pub fn layers(&self) -> &[&'a ElevationLayer] {
        &self.layers
    }

    pub fn scope(&self) -> MapScope {
        self.scope
    }
}

/// Shared access to a map. The map is immutable once it is in a session, so
/// any frame taken from it stays consistent for as long as it is held.
#[derive(Debug, Clone)]
pub struct Session {
    map: Arc<Map>,
}

impl Session {
    pub fn new(map: Arc<Map>) -> Self {
        Self { map }
    }

    pub fn map(&self) -> &Map {
        &self.map
    }

    pub fn create_map_frame(&self, scope: MapScope) -> MapFrame<'_> {
        MapFrame::new(&self.map, scope)
    }

    /// An elevation query over the rendered terrain surface.
    pub fn terrain_query(&self) -> ElevationQuery<'_> {
        ElevationQuery::new(self.create_map_frame(MapScope::TerrainLayers))
    }
}

impl From<Map> for Session {
    fn from(map: Map) -> Self {
        Self::new(Arc::new(map))
    }
}
