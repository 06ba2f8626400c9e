use crate::collisions::RayCaster;
use crate::config::NavConfig;
use crate::error::{NavError, Result};
use crate::mesh::PolygonMeshData;
use crate::nav::Nav;
use crate::position::Position;
use crate::smoothing::{positions, smooth_path};
use crate::utils::create_file_with_parents;

use log::debug;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

/// A finished path request. Owns all of its data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NavigationPath {
    pub origin: Position,
    pub destination: Position,
    pub nodes: Vec<u32>,
    pub cost: f64,
    pub raw_path: Vec<Position>,
    pub dense_path: Vec<Position>,
    pub simple_path: Vec<Position>,
    pub smooth_path: Vec<Position>,
}

impl NavigationPath {
    /// Waypoints an agent should follow.
    pub fn waypoints(&self) -> &[Position] {
        &self.smooth_path
    }

    /// Index of the `smooth_path` point nearest to `position`.
    pub fn closest_waypoint_index(&self, position: &Position) -> Option<usize> {
        self.smooth_path
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| {
                a.distance_squared(position)
                    .total_cmp(&b.distance_squared(position))
            })
            .map(|(idx, _)| idx)
    }

    pub fn length(&self) -> f64 {
        self.smooth_path
            .windows(2)
            .map(|pair| pair[0].distance(&pair[1]))
            .sum()
    }

    pub fn save_to_json(&self, filename: &Path) -> Result<()> {
        let mut file = create_file_with_parents(filename)?;
        serde_json::to_writer(&mut file, self)?;
        Ok(())
    }
}

/// Locate, search and smooth in one go.
pub fn plan_path(
    nav: &Nav,
    config: &NavConfig,
    scene: Option<&dyn RayCaster>,
    origin: &Position,
    destination: &Position,
) -> Option<NavigationPath> {
    let route = nav.find_path(origin, destination)?;
    let smoothed = smooth_path(nav, &route.path, origin, destination, config, scene);
    debug!(
        "Path over {} nodes, {} waypoints",
        route.path.len(),
        smoothed.smooth.len()
    );

    Some(NavigationPath {
        origin: *origin,
        destination: *destination,
        nodes: route.path,
        cost: route.cost,
        raw_path: positions(&smoothed.raw),
        dense_path: positions(&smoothed.dense),
        simple_path: positions(&smoothed.simple),
        smooth_path: smoothed.smooth,
    })
}

/// Owns the graph, its configuration and the scene used for ray queries.
#[derive(Default)]
pub struct NavigationProvider {
    config: NavConfig,
    scene: Option<Arc<dyn RayCaster>>,
    nav: Option<Nav>,
    last_path: Option<NavigationPath>,
}

impl NavigationProvider {
    pub fn new(config: NavConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_ray_caster(mut self, scene: Arc<dyn RayCaster>) -> Self {
        self.scene = Some(scene);
        self
    }

    #[must_use]
    pub fn with_graph(mut self, nav: Nav) -> Self {
        self.nav = Some(nav);
        self
    }

    pub const fn config(&self) -> &NavConfig {
        &self.config
    }

    pub fn build_graph(&mut self, mesh: &PolygonMeshData) -> &Nav {
        let nav = self.nav.get_or_insert_with(Nav::default);
        nav.regenerate(mesh, &self.config, self.scene.as_deref());
        nav
    }

    pub const fn graph(&self) -> Option<&Nav> {
        self.nav.as_ref()
    }

    /// `Ok(None)` when either point is off the mesh or the goal is
    /// unreachable.
    pub fn get_path(&mut self, origin: &Position, destination: &Position) -> Result<Option<NavigationPath>> {
        let nav = self.nav.as_ref().ok_or(NavError::GraphNotBuilt)?;
        let path = plan_path(nav, &self.config, self.scene.as_deref(), origin, destination);
        if let Some(path) = &path {
            self.last_path = Some(path.clone());
        }
        Ok(path)
    }

    pub const fn last_path(&self) -> Option<&NavigationPath> {
        self.last_path.as_ref()
    }
}
