//! Turns a node route into a waypoint polyline an agent can follow.
//!
//! Every stage is a free function so callers can run a subset of the
//! pipeline. [`smooth_path`] chains all of them as configured.

use crate::collisions::RayCaster;
use crate::config::{NavConfig, OcclusionMode, PortalMode, SimplifyStrategy};
use crate::constants::{MAX_SEGMENT_SUBDIVISIONS, SHORTCUT_SEGMENT_SAMPLES, SPLINE_ALPHA, SPLINE_KNOT_EPSILON};
use crate::nav::{Nav, NavNode, NodeFlags, Transition};
use crate::position::{Position, closest_point_on_segment, distance_to_line};

use itertools::Itertools;
use log::debug;
use serde::{Deserialize, Serialize};

const DUPLICATE_TOLERANCE: f64 = 1e-9;

/// Waypoint tagged with the flags of the node it came from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PathPoint {
    pub position: Position,
    pub flags: NodeFlags,
}

impl PathPoint {
    pub const fn new(position: Position, flags: NodeFlags) -> Self {
        Self { position, flags }
    }

    pub const fn plain(position: Position) -> Self {
        Self::new(position, NodeFlags::empty())
    }
}

pub fn positions(points: &[PathPoint]) -> Vec<Position> {
    points.iter().map(|point| point.position).collect()
}

/// Line-of-sight test used by [`shortcut`].
#[derive(Clone, Copy)]
pub enum Occlusion<'a> {
    Scene {
        caster: &'a dyn RayCaster,
        layer_mask: u32,
    },
    NavEdges {
        nav: &'a Nav,
        vertical_threshold: f64,
        max_rise: f64,
    },
}

impl Occlusion<'_> {
    pub fn is_clear(&self, start: &Position, end: &Position) -> bool {
        match self {
            Self::Scene { caster, layer_mask } => !caster.linecast(*start, *end, *layer_mask),
            Self::NavEdges {
                nav,
                vertical_threshold,
                max_rise,
            } => nav
                .edge_raycast(start, end, *vertical_threshold, *max_rise)
                .is_none(),
        }
    }
}

/// Every intermediate product of [`smooth_path`].
#[derive(Debug, Clone, Default)]
pub struct SmoothedPath {
    /// Portals with pinned endpoints.
    pub raw: Vec<PathPoint>,
    pub dense: Vec<PathPoint>,
    /// After simplification, ground snapping and string pulling.
    pub simple: Vec<PathPoint>,
    pub smooth: Vec<Position>,
}

fn inset(point: Position, node: &NavNode, offset: f64) -> Position {
    point.move_towards(&node.centroid(), offset)
}

/// One anchor per end node and one waypoint per transition along `route`.
pub fn extract_portals(
    nav: &Nav,
    route: &[u32],
    start: &Position,
    goal: &Position,
    portal_mode: PortalMode,
    vertex_edge_offset: f64,
) -> Vec<PathPoint> {
    let (Some(&first), Some(&last)) = (route.first(), route.last()) else {
        return Vec::new();
    };
    let (Some(first_node), Some(last_node)) = (nav.node(first), nav.node(last)) else {
        return Vec::new();
    };

    let mut points = vec![PathPoint::new(first_node.project(start), first_node.flags)];
    for (&from, &to) in route.iter().tuple_windows() {
        let (Some(from_node), Some(to_node)) = (nav.node(from), nav.node(to)) else {
            continue;
        };
        let Some((transition, _)) = nav.cheapest_transition(from, to, goal) else {
            debug!("No transition between route nodes {from} and {to}");
            continue;
        };

        match transition {
            Transition::Portal { a, b } => {
                let portal = match portal_mode {
                    PortalMode::EdgeMidpoint => a.midpoint(&b),
                    PortalMode::ClosestEdgePoint => closest_point_on_segment(goal, &a, &b),
                };
                points.push(PathPoint::new(
                    inset(portal, from_node, vertex_edge_offset),
                    from_node.flags,
                ));
            }
            Transition::Unverified => {
                let portal = from_node.closest_vertex_midpoint(to_node);
                points.push(PathPoint::new(
                    inset(portal, from_node, vertex_edge_offset),
                    from_node.flags,
                ));
            }
            Transition::OffMesh { start, end, .. } => {
                points.push(PathPoint::new(
                    inset(start, from_node, vertex_edge_offset),
                    from_node.flags,
                ));
                points.push(PathPoint::new(end, to_node.flags));
            }
        }
    }
    points.push(PathPoint::new(last_node.project(goal), last_node.flags));
    points
}

/// Forces the path to begin at `start` and end at `goal`. A goal that is
/// far off vertically from the last waypoint is appended instead of
/// replacing it.
pub fn pin_endpoints(points: &mut Vec<PathPoint>, start: &Position, goal: &Position, y_tolerance: f64) {
    match points.first_mut() {
        Some(first) => first.position = *start,
        None => points.push(PathPoint::plain(*start)),
    }

    if points.len() < 2 {
        points.push(PathPoint::plain(*goal));
        return;
    }
    let last = points.len() - 1;
    if (points[last].position.y - goal.y).abs() <= y_tolerance {
        points[last].position = *goal;
    } else {
        points.push(PathPoint::plain(*goal));
    }
}

/// Splits every segment longer than `max_segment_length` into equal pieces,
/// at most [`MAX_SEGMENT_SUBDIVISIONS`] per segment.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
pub fn densify(points: &[PathPoint], max_segment_length: f64) -> Vec<PathPoint> {
    let Some(&first) = points.first() else {
        return Vec::new();
    };
    if !max_segment_length.is_finite() || max_segment_length <= 0.0 {
        return points.to_vec();
    }

    let mut dense = vec![first];
    for (a, b) in points.iter().tuple_windows() {
        let length = a.position.distance(&b.position);
        let pieces = (length / max_segment_length)
            .ceil()
            .clamp(1.0, MAX_SEGMENT_SUBDIVISIONS as f64) as usize;
        for i in 1..pieces {
            let t = i as f64 / pieces as f64;
            dense.push(PathPoint::plain(a.position.lerp(&b.position, t)));
        }
        dense.push(*b);
    }
    dense
}

/// Indices kept by Douglas-Peucker over `points[first..=last]`, endpoints
/// included.
fn douglas_peucker<F>(points: &[PathPoint], first: usize, last: usize, tolerance: f64, distance: &F, keep: &mut [bool])
where
    F: Fn(&Position, &Position, &Position) -> f64,
{
    keep[first] = true;
    keep[last] = true;

    let mut stack = vec![(first, last)];
    while let Some((lo, hi)) = stack.pop() {
        if hi <= lo + 1 {
            continue;
        }
        let (a, b) = (points[lo].position, points[hi].position);
        let mut farthest = (lo, 0.0);
        for (idx, point) in points.iter().enumerate().take(hi).skip(lo + 1) {
            let d = distance(&point.position, &a, &b);
            if d > farthest.1 {
                farthest = (idx, d);
            }
        }
        if farthest.1 > tolerance {
            keep[farthest.0] = true;
            stack.push((lo, farthest.0));
            stack.push((farthest.0, hi));
        }
    }
}

fn simplify_with<F>(points: &[PathPoint], tolerance: f64, keep_mask: NodeFlags, distance: F) -> Vec<PathPoint>
where
    F: Fn(&Position, &Position, &Position) -> f64,
{
    if points.len() < 3 {
        return points.to_vec();
    }

    let last = points.len() - 1;
    let mut keep = vec![false; points.len()];
    let pinned = (0..=last).filter(|&idx| {
        idx == 0 || idx == last || points[idx].flags.intersects(keep_mask)
    });
    for (lo, hi) in pinned.tuple_windows() {
        douglas_peucker(points, lo, hi, tolerance, &distance, &mut keep);
    }

    points
        .iter()
        .zip(keep)
        .filter_map(|(point, kept)| kept.then_some(*point))
        .collect()
}

fn distance_to_line_xz(point: &Position, a: &Position, b: &Position) -> f64 {
    distance_to_line(&point.flatten(), &a.flatten(), &b.flatten())
}

/// Ramer-Douglas-Peucker with 3D perpendicular distance. Points whose flags
/// intersect `keep_mask` always survive.
pub fn rdp(points: &[PathPoint], tolerance: f64, keep_mask: NodeFlags) -> Vec<PathPoint> {
    simplify_with(points, tolerance, keep_mask, distance_to_line)
}

/// Ramer-Douglas-Peucker measuring deviation on the ground plane only.
pub fn rdp_xz(points: &[PathPoint], tolerance: f64, keep_mask: NodeFlags) -> Vec<PathPoint> {
    simplify_with(points, tolerance, keep_mask, distance_to_line_xz)
}

/// Douglas-Peucker that never drops points whose flags intersect `keep_mask`.
pub fn string_pull(points: &[PathPoint], tolerance: f64, keep_mask: NodeFlags) -> Vec<PathPoint> {
    simplify_with(points, tolerance, keep_mask, distance_to_line)
}

enum Visible {
    Point(usize),
    /// A clear sample on the segment ending at the given index.
    Sample(usize, Position),
}

/// Farthest target in `points[next..=window_end]` visible from `anchor`.
/// Each candidate is tried as a whole point first, then at fixed samples
/// along the segment leading up to it.
fn farthest_visible(
    points: &[PathPoint],
    anchor: &Position,
    next: usize,
    window_end: usize,
    occlusion: &Occlusion<'_>,
) -> Option<Visible> {
    for far in (next..=window_end).rev() {
        if occlusion.is_clear(anchor, &points[far].position) {
            return Some(Visible::Point(far));
        }
        if far == next {
            break;
        }
        let (a, b) = (points[far - 1].position, points[far].position);
        if let Some(sample) = SHORTCUT_SEGMENT_SAMPLES
            .iter()
            .map(|&t| a.lerp(&b, t))
            .find(|sample| occlusion.is_clear(anchor, sample))
        {
            return Some(Visible::Sample(far, sample));
        }
    }
    None
}

/// Greedy line-of-sight simplification.
///
/// From the current anchor the window of `look_ahead` points is searched
/// from its far end back towards the anchor for the first visible point.
/// The window never extends past a point whose flags intersect `keep_mask`.
/// When nothing in the window is visible the next point is kept as is.
pub fn shortcut(
    points: &[PathPoint],
    look_ahead: usize,
    keep_mask: NodeFlags,
    occlusion: &Occlusion<'_>,
) -> Vec<PathPoint> {
    if points.len() < 3 {
        return points.to_vec();
    }

    let count = points.len();
    let look_ahead = look_ahead.max(1);
    let mut result = vec![points[0]];
    let mut anchor = points[0].position;
    let mut next = 1;

    while next < count {
        let mut window_end = (next + look_ahead - 1).min(count - 1);
        if let Some(pinned) = (next..window_end).find(|&idx| points[idx].flags.intersects(keep_mask)) {
            window_end = pinned;
        }

        match farthest_visible(points, &anchor, next, window_end, occlusion) {
            Some(Visible::Point(idx)) => {
                result.push(points[idx]);
                anchor = points[idx].position;
                next = idx + 1;
            }
            Some(Visible::Sample(idx, sample)) => {
                result.push(PathPoint::plain(sample));
                anchor = sample;
                next = idx;
            }
            None => {
                result.push(points[next]);
                anchor = points[next].position;
                next += 1;
            }
        }
    }
    result
}

/// Drops interior points onto the first ground hit below them. The pinned
/// endpoints are left alone.
pub fn snap_to_ground(
    points: &mut [PathPoint],
    caster: &dyn RayCaster,
    height: f64,
    max_distance: f64,
    layer_mask: u32,
) {
    let count = points.len();
    if count < 3 {
        return;
    }
    for point in &mut points[1..count - 1] {
        let origin = point.position + Position::UP * height;
        if let Some(hit) = caster.raycast(origin, Position::DOWN, max_distance, layer_mask) {
            point.position = hit.point;
        }
    }
}

fn knot(t: f64, a: &Position, b: &Position) -> f64 {
    let interval = a.distance(b).powf(SPLINE_ALPHA);
    t + interval.max(SPLINE_KNOT_EPSILON)
}

/// Barry-Goldman evaluation of one centripetal segment between `p1` and `p2`.
fn catmull_rom_point(p0: &Position, p1: &Position, p2: &Position, p3: &Position, u: f64) -> Position {
    let t0 = 0.0;
    let t1 = knot(t0, p0, p1);
    let t2 = knot(t1, p1, p2);
    let t3 = knot(t2, p2, p3);
    let t = t1 + (t2 - t1) * u;

    let blend = |a: &Position, b: &Position, ta: f64, tb: f64| -> Position {
        *a * ((tb - t) / (tb - ta)) + *b * ((t - ta) / (tb - ta))
    };
    let a1 = blend(p0, p1, t0, t1);
    let a2 = blend(p1, p2, t1, t2);
    let a3 = blend(p2, p3, t2, t3);
    let b1 = blend(&a1, &a2, t0, t2);
    let b2 = blend(&a2, &a3, t1, t3);
    blend(&b1, &b2, t1, t2)
}

/// Centripetal Catmull-Rom through `points`, `points_per_segment` samples per
/// segment including both ends. Control points are reproduced exactly.
#[allow(clippy::cast_precision_loss)]
pub fn catmull_rom(points: &[Position], points_per_segment: usize) -> Vec<Position> {
    if points.len() < 2 {
        return points.to_vec();
    }

    let samples = points_per_segment.max(2);
    let last = points.len() - 1;
    let mut curve: Vec<Position> = Vec::with_capacity(last * samples);
    for i in 0..last {
        let p1 = points[i];
        let p2 = points[i + 1];
        let p0 = if i == 0 { p1 } else { points[i - 1] };
        let p3 = if i + 1 == last { p2 } else { points[i + 2] };

        for step in 0..samples {
            let sample = match step {
                0 => p1,
                s if s == samples - 1 => p2,
                s => catmull_rom_point(&p0, &p1, &p2, &p3, s as f64 / (samples - 1) as f64),
            };
            if curve
                .last()
                .is_none_or(|prev| !prev.approx_eq(&sample, DUPLICATE_TOLERANCE))
            {
                curve.push(sample);
            }
        }
    }
    curve
}

/// Runs the full post-processing pipeline over a node route.
pub fn smooth_path(
    nav: &Nav,
    route: &[u32],
    start: &Position,
    goal: &Position,
    config: &NavConfig,
    scene: Option<&dyn RayCaster>,
) -> SmoothedPath {
    let smoothing = &config.smoothing;

    let mut raw = extract_portals(
        nav,
        route,
        start,
        goal,
        smoothing.portal_mode,
        smoothing.vertex_edge_offset,
    );
    pin_endpoints(&mut raw, start, goal, smoothing.goal_y_tolerance);

    let dense = densify(&raw, smoothing.max_segment_length);

    let mut simple = match smoothing.simplify {
        SimplifyStrategy::Rdp { xz_only: false } => {
            rdp(&dense, smoothing.rdp_tolerance, smoothing.keep_mask)
        }
        SimplifyStrategy::Rdp { xz_only: true } => {
            rdp_xz(&dense, smoothing.rdp_tolerance, smoothing.keep_mask)
        }
        SimplifyStrategy::Shortcut => {
            let occlusion = match (smoothing.occlusion, scene) {
                (OcclusionMode::Scene, Some(caster)) => Occlusion::Scene {
                    caster,
                    layer_mask: smoothing.occlusion_layer_mask,
                },
                (OcclusionMode::Scene, None) => {
                    debug!("No scene to test occlusion against, using navmesh edges");
                    nav_edge_occlusion(nav, config)
                }
                (OcclusionMode::NavEdges, _) => nav_edge_occlusion(nav, config),
            };
            shortcut(
                &dense,
                smoothing.shortcut_look_ahead,
                smoothing.keep_mask,
                &occlusion,
            )
        }
    };

    if smoothing.snap_to_ground
        && let Some(caster) = scene
    {
        snap_to_ground(
            &mut simple,
            caster,
            smoothing.ground_snap_height,
            smoothing.ground_snap_distance,
            smoothing.ground_layer_mask,
        );
    }

    let simple = string_pull(&simple, smoothing.string_pull_tolerance, smoothing.keep_mask);
    let smooth = catmull_rom(&positions(&simple), smoothing.points_per_segment);

    SmoothedPath {
        raw,
        dense,
        simple,
        smooth,
    }
}

fn nav_edge_occlusion<'a>(nav: &'a Nav, config: &NavConfig) -> Occlusion<'a> {
    Occlusion::NavEdges {
        nav,
        vertical_threshold: config.edge_raycast_vertical_threshold,
        max_rise: config.edge_raycast_max_rise,
    }
}
