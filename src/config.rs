use crate::constants::{
    DEFAULT_LAYER, EDGE_RAYCAST_MAX_RISE, EDGE_RAYCAST_VERTICAL_THRESHOLD, FLAG_RAMP,
    GOAL_Y_TOLERANCE, GROUND_SNAP_DISTANCE, GROUND_SNAP_HEIGHT, JUMP_LINK_COST_FACTOR,
    JUMP_LINK_LAYER, JUMP_LINK_MAX_DISTANCE, JUMP_LINK_MIN_COST, JUMP_LINK_MIN_DISTANCE,
    JUMP_LINK_MIN_SURFACE_AREA, JUMP_LINK_PROBE_OFFSET, MAX_SEGMENT_LENGTH, RDP_TOLERANCE,
    SHORTCUT_LOOK_AHEAD, SPLINE_POINTS_PER_SEGMENT, STRING_PULL_TOLERANCE, VERTEX_EDGE_OFFSET,
};
use crate::error::Result;
use crate::nav::NodeFlags;
use crate::utils::create_file_with_parents;

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::path::Path;

/// How a transition between two nodes is turned into a waypoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PortalMode {
    #[default]
    EdgeMidpoint,
    /// Point on the shared edge closest to the goal.
    ClosestEdgePoint,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SimplifyStrategy {
    /// Ramer-Douglas-Peucker. `xz_only` measures deviation on the ground plane.
    Rdp { xz_only: bool },
    /// Greedy line-of-sight shortcutting.
    Shortcut,
}

impl Default for SimplifyStrategy {
    fn default() -> Self {
        Self::Rdp { xz_only: false }
    }
}

/// What blocks a shortcut.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OcclusionMode {
    /// Scene geometry through the injected ray caster.
    Scene,
    /// Boundary edges of the navigation mesh itself.
    #[default]
    NavEdges,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmoothingConfig {
    pub portal_mode: PortalMode,
    pub vertex_edge_offset: f64,
    pub goal_y_tolerance: f64,
    pub max_segment_length: f64,
    pub simplify: SimplifyStrategy,
    pub rdp_tolerance: f64,
    pub shortcut_look_ahead: usize,
    pub occlusion: OcclusionMode,
    pub occlusion_layer_mask: u32,
    pub snap_to_ground: bool,
    pub ground_snap_height: f64,
    pub ground_snap_distance: f64,
    pub ground_layer_mask: u32,
    pub keep_mask: NodeFlags,
    pub string_pull_tolerance: f64,
    pub points_per_segment: usize,
}

impl Default for SmoothingConfig {
    fn default() -> Self {
        Self {
            portal_mode: PortalMode::default(),
            vertex_edge_offset: VERTEX_EDGE_OFFSET,
            goal_y_tolerance: GOAL_Y_TOLERANCE,
            max_segment_length: MAX_SEGMENT_LENGTH,
            simplify: SimplifyStrategy::default(),
            rdp_tolerance: RDP_TOLERANCE,
            shortcut_look_ahead: SHORTCUT_LOOK_AHEAD,
            occlusion: OcclusionMode::default(),
            occlusion_layer_mask: DEFAULT_LAYER,
            snap_to_ground: false,
            ground_snap_height: GROUND_SNAP_HEIGHT,
            ground_snap_distance: GROUND_SNAP_DISTANCE,
            ground_layer_mask: DEFAULT_LAYER,
            keep_mask: NodeFlags::new(FLAG_RAMP),
            string_pull_tolerance: STRING_PULL_TOLERANCE,
            points_per_segment: SPLINE_POINTS_PER_SEGMENT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NavConfig {
    /// Overrides the cell size stored in the mesh.
    pub cell_size: Option<f64>,
    /// Overrides the cell height stored in the mesh.
    pub cell_height: Option<f64>,
    /// `None` keeps the literal `dot(normal, up) < 1` ramp test.
    pub ramp_max_slope_degrees: Option<f64>,
    /// Keep neighbour slots whose reciprocal edge is missing as traversable.
    pub keep_unverified_neighbours: bool,
    pub jump_link_min_surface_area: f64,
    pub jump_link_min_distance: f64,
    pub jump_link_max_distance: f64,
    pub jump_link_probe_offset: f64,
    pub jump_link_layer_mask: u32,
    pub jump_link_cost_factor: f64,
    pub jump_link_min_cost: f64,
    pub edge_raycast_vertical_threshold: f64,
    pub edge_raycast_max_rise: f64,
    pub smoothing: SmoothingConfig,
}

impl Default for NavConfig {
    fn default() -> Self {
        Self {
            cell_size: None,
            cell_height: None,
            ramp_max_slope_degrees: None,
            keep_unverified_neighbours: false,
            jump_link_min_surface_area: JUMP_LINK_MIN_SURFACE_AREA,
            jump_link_min_distance: JUMP_LINK_MIN_DISTANCE,
            jump_link_max_distance: JUMP_LINK_MAX_DISTANCE,
            jump_link_probe_offset: JUMP_LINK_PROBE_OFFSET,
            jump_link_layer_mask: JUMP_LINK_LAYER,
            jump_link_cost_factor: JUMP_LINK_COST_FACTOR,
            jump_link_min_cost: JUMP_LINK_MIN_COST,
            edge_raycast_vertical_threshold: EDGE_RAYCAST_VERTICAL_THRESHOLD,
            edge_raycast_max_rise: EDGE_RAYCAST_MAX_RISE,
            smoothing: SmoothingConfig::default(),
        }
    }
}

impl NavConfig {
    pub fn from_json(filename: &Path) -> Result<Self> {
        let file = File::open(filename)?;
        Ok(serde_json::from_reader(file)?)
    }

    pub fn save_to_json(&self, filename: &Path) -> Result<()> {
        let mut file = create_file_with_parents(filename)?;
        serde_json::to_writer_pretty(&mut file, self)?;
        Ok(())
    }
}
