/// Module for navigation mesh constants

// Mesh encoding
pub const NULL_INDEX: u16 = 65535;

// Node flags
pub const FLAG_RAMP: u32 = 1 << 0;

// Point location
pub const POINT_IN_POLYGON_TOLERANCE: f64 = 1e-3;

// Scene layers
pub const DEFAULT_LAYER: u32 = 1 << 0;
pub const JUMP_LINK_LAYER: u32 = 1 << 3;

// Jump links
pub const JUMP_LINK_MIN_SURFACE_AREA: f64 = 5.0;
pub const JUMP_LINK_MIN_DISTANCE: f64 = 0.5;
pub const JUMP_LINK_MAX_DISTANCE: f64 = 15.0;
pub const JUMP_LINK_PROBE_OFFSET: f64 = 1.0;
pub const JUMP_LINK_COST_FACTOR: f64 = 4.0;
pub const JUMP_LINK_MIN_COST: f64 = 30.0;

/// Heavily penalized so links only win when clearly cheaper than walking.
#[inline(always)]
pub fn jump_link_cost(hit_distance: f64, factor: f64, min_cost: f64) -> f64 {
    (hit_distance * factor).max(min_cost)
}

// Search
pub const TURN_PENALTY_WEIGHT: f64 = 0.5;

// Navmesh edge raycast
pub const EDGE_RAYCAST_VERTICAL_THRESHOLD: f64 = 0.5;
pub const EDGE_RAYCAST_MAX_RISE: f64 = 1.0;

// Smoothing
pub const VERTEX_EDGE_OFFSET: f64 = 0.3;
pub const GOAL_Y_TOLERANCE: f64 = 0.5;
pub const MAX_SEGMENT_LENGTH: f64 = 1.0;
/// Upper bound on the pieces a single segment is split into by densification.
pub const MAX_SEGMENT_SUBDIVISIONS: usize = 256;
pub const RDP_TOLERANCE: f64 = 0.1;
pub const STRING_PULL_TOLERANCE: f64 = 0.05;
pub const SHORTCUT_LOOK_AHEAD: usize = 3;
pub const GROUND_SNAP_HEIGHT: f64 = 0.5;
pub const GROUND_SNAP_DISTANCE: f64 = 2.0;
pub const SPLINE_POINTS_PER_SEGMENT: usize = 10;
pub const SPLINE_ALPHA: f64 = 0.5;
pub const SPLINE_KNOT_EPSILON: f64 = 1e-4;

/// Fractions along a blocked segment tried as shortcut targets, midpoint first.
pub const SHORTCUT_SEGMENT_SAMPLES: [f64; 5] = [0.5, 0.25, 0.75, 0.1, 0.9];
