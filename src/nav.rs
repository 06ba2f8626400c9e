use crate::collisions::RayCaster;
use crate::config::NavConfig;
use crate::constants::{
    FLAG_RAMP, POINT_IN_POLYGON_TOLERANCE, TURN_PENALTY_WEIGHT, jump_link_cost,
};
use crate::error::{NavError, Result};
use crate::mesh::PolygonMeshData;
use crate::position::{Position, centroid, closest_point_on_segment};
use crate::utils::{content_hash, create_file_with_parents};

use bincode::{deserialize_from, serialize_into};
use geo::algorithm::line_intersection::{LineIntersection, line_intersection};
use geo::{Coord, Line};
use itertools::{Itertools, iproduct};
use log::{debug, info, warn};
use petgraph::algo::astar;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use rayon::iter::{IntoParallelRefIterator, ParallelIterator};
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::path::Path;
use std::sync::OnceLock;

const EDGE_MATCH_TOLERANCE: f64 = 1e-6;

// --- NodeFlags ---
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Deserialize, Serialize)]
pub struct NodeFlags(u32);

impl NodeFlags {
    pub const RAMP: Self = Self(FLAG_RAMP);

    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }
}

impl From<NodeFlags> for u32 {
    fn from(flag: NodeFlags) -> Self {
        flag.0
    }
}

/// Edge shared with a neighbouring polygon, in this polygon's winding order.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SharedEdge {
    pub neighbour: u32,
    pub a: Position,
    pub b: Position,
}

impl SharedEdge {
    pub fn midpoint(&self) -> Position {
        self.a.midpoint(&self.b)
    }

    pub fn closest_point(&self, point: &Position) -> Position {
        closest_point_on_segment(point, &self.a, &self.b)
    }

    fn matches(&self, a: &Position, b: &Position) -> bool {
        (self.a.approx_eq(a, EDGE_MATCH_TOLERANCE) && self.b.approx_eq(b, EDGE_MATCH_TOLERANCE))
            || (self.a.approx_eq(b, EDGE_MATCH_TOLERANCE)
                && self.b.approx_eq(a, EDGE_MATCH_TOLERANCE))
    }
}

/// Traversal shortcut that is not implied by a shared edge, e.g. a drop.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OffMeshLink {
    pub start_poly: u32,
    pub end_poly: u32,
    pub start_pos: Position,
    pub end_pos: Position,
    pub bidirectional: bool,
    pub cost: f64,
}

#[derive(Debug, Clone, Copy)]
struct NodeGeometry {
    centroid: Position,
    normal: Position,
    surface_area: f64,
}

impl NodeGeometry {
    fn compute(vertices: &[Position]) -> Self {
        Self {
            centroid: centroid(vertices),
            normal: newell_normal(vertices),
            surface_area: fan_area(vertices),
        }
    }
}

/// Unit normal following the winding of `vertices`. Newell's method, so a
/// collinear leading triple does not zero it out.
fn newell_normal(vertices: &[Position]) -> Position {
    if vertices.len() < 3 {
        return Position::ZERO;
    }
    vertices
        .iter()
        .circular_tuple_windows::<(_, _)>()
        .fold(Position::ZERO, |n, (a, b)| {
            n + Position::new(
                (a.y - b.y) * (a.z + b.z),
                (a.z - b.z) * (a.x + b.x),
                (a.x - b.x) * (a.y + b.y),
            )
        })
        .normalize()
}

fn fan_area(vertices: &[Position]) -> f64 {
    if vertices.len() < 3 {
        return 0.0;
    }
    let v0 = vertices[0];
    vertices[1..]
        .iter()
        .tuple_windows::<(_, _)>()
        .map(|(v1, v2)| (*v1 - v0).cross(&(*v2 - v0)).length() * 0.5)
        .sum()
}

/// One polygon of the navigation mesh.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NavNode {
    /// Polygon index, also this node's index in the graph.
    pub poly_index: u32,
    vertices: Vec<Position>,
    pub region_id: u16,
    #[serde(default)]
    pub area: u8,
    pub flags: NodeFlags,
    pub neighbours: Vec<SharedEdge>,
    #[serde(default)]
    pub unverified_neighbours: Vec<u32>,
    #[serde(default)]
    pub off_mesh_links: Vec<OffMeshLink>,
    #[serde(skip)]
    geometry: OnceLock<NodeGeometry>,
}

impl PartialEq for NavNode {
    fn eq(&self, other: &Self) -> bool {
        self.poly_index == other.poly_index
    }
}

impl NavNode {
    pub fn new(poly_index: u32, vertices: Vec<Position>, region_id: u16) -> Self {
        Self {
            poly_index,
            vertices,
            region_id,
            area: 0,
            flags: NodeFlags::empty(),
            neighbours: Vec::new(),
            unverified_neighbours: Vec::new(),
            off_mesh_links: Vec::new(),
            geometry: OnceLock::new(),
        }
    }

    pub fn vertices(&self) -> &[Position] {
        &self.vertices
    }

    /// Replaces the polygon outline and drops the memoized geometry.
    pub fn set_vertices(&mut self, vertices: Vec<Position>) {
        self.vertices = vertices;
        self.geometry = OnceLock::new();
    }

    fn geometry(&self) -> &NodeGeometry {
        self.geometry
            .get_or_init(|| NodeGeometry::compute(&self.vertices))
    }

    pub fn centroid(&self) -> Position {
        self.geometry().centroid
    }

    pub fn normal(&self) -> Position {
        self.geometry().normal
    }

    pub fn surface_area(&self) -> f64 {
        self.geometry().surface_area
    }

    /// Polygon edges in winding order, closing edge included.
    pub fn edges(&self) -> impl Iterator<Item = (Position, Position)> + '_ {
        self.vertices.iter().copied().circular_tuple_windows()
    }

    pub fn shared_edge_with(&self, neighbour: u32) -> Option<&SharedEdge> {
        self.neighbours.iter().find(|edge| edge.neighbour == neighbour)
    }

    pub fn is_neighbour(&self, other: u32) -> bool {
        self.shared_edge_with(other).is_some() || self.unverified_neighbours.contains(&other)
    }

    pub fn has_link_to(&self, other: u32) -> bool {
        self.off_mesh_links.iter().any(|link| link.end_poly == other)
    }

    fn is_passable_edge(&self, a: &Position, b: &Position) -> bool {
        self.neighbours.iter().any(|edge| edge.matches(a, b))
    }

    /// `point` moved along the normal onto this polygon's plane.
    pub fn project(&self, point: &Position) -> Position {
        let normal = self.normal();
        let Some(origin) = self.vertices.first() else {
            return *point;
        };
        *point - normal * (*point - *origin).dot(&normal)
    }

    /// Absolute distance to the polygon plane if the projection of `point`
    /// falls inside the polygon.
    pub fn plane_distance_if_inside(&self, point: &Position) -> Option<f64> {
        let normal = self.normal();
        if normal == Position::ZERO {
            return None;
        }
        let distance = (*point - self.vertices[0]).dot(&normal);
        let projected = *point - normal * distance;

        let inside = self.edges().all(|(a, b)| {
            (b - a).cross(&(projected - a)).dot(&normal) >= -POINT_IN_POLYGON_TOLERANCE
        });
        inside.then_some(distance.abs())
    }

    pub fn contains(&self, point: &Position) -> bool {
        self.plane_distance_if_inside(point).is_some()
    }

    pub fn centroid_distance(&self, point: &Position) -> f64 {
        self.centroid().distance(point)
    }

    /// Midpoint of the closest vertex pair between two polygons, the portal
    /// stand-in when no shared edge is known.
    pub fn closest_vertex_midpoint(&self, other: &Self) -> Position {
        iproduct!(self.vertices.iter(), other.vertices.iter())
            .min_by(|(a1, b1), (a2, b2)| {
                a1.distance_squared(b1).total_cmp(&a2.distance_squared(b2))
            })
            .map_or_else(
                || self.centroid().midpoint(&other.centroid()),
                |(a, b)| a.midpoint(b),
            )
    }
}

/// A traversable connection in the search graph.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Transition {
    /// Shared edge `a`-`b`.
    Portal { a: Position, b: Position },
    /// Neighbour slot whose reciprocal edge was never confirmed.
    Unverified,
    OffMesh {
        start: Position,
        end: Position,
        cost: f64,
    },
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PathResult {
    pub path: Vec<u32>,
    pub cost: f64,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub enum NodeIdent {
    Id(u32),
    Pos(Position),
}

#[derive(Debug, Clone, Deserialize, Serialize)]
struct NavSerializationHelperStruct {
    pub version: u32,
    pub nodes: Vec<NavNode>,
}

#[derive(Serialize)]
struct NavSerializationRef<'a> {
    version: u32,
    nodes: &'a [NavNode],
}

#[derive(Debug, Clone)]
pub struct Nav {
    pub nodes: Vec<NavNode>,
    pub graph: DiGraph<u32, Transition>,
}

impl Default for Nav {
    fn default() -> Self {
        Self::from_nodes(Vec::new())
    }
}

impl Nav {
    pub const VERSION: u32 = 1;

    /// Builds the search graph over `nodes`. Node `i` is expected at index `i`;
    /// references to missing nodes are dropped.
    #[allow(clippy::cast_possible_truncation)]
    pub fn from_nodes(mut nodes: Vec<NavNode>) -> Self {
        let count = nodes.len();
        let valid = |idx: u32, own: u32| (idx as usize) < count && idx != own;

        for (idx, node) in nodes.iter_mut().enumerate() {
            let idx = idx as u32;
            if node.poly_index != idx {
                warn!("Node stored at {idx} claims poly index {}", node.poly_index);
                node.poly_index = idx;
            }
            let before = node.neighbours.len()
                + node.unverified_neighbours.len()
                + node.off_mesh_links.len();
            node.neighbours.retain(|edge| valid(edge.neighbour, idx));
            node.unverified_neighbours.retain(|&n| valid(n, idx));
            node.off_mesh_links.retain(|link| valid(link.end_poly, idx));
            let after = node.neighbours.len()
                + node.unverified_neighbours.len()
                + node.off_mesh_links.len();
            if after != before {
                warn!("Dropped {} dangling references from node {idx}", before - after);
            }
        }

        let mut graph = DiGraph::with_capacity(count, count * 4);
        for node in &nodes {
            graph.add_node(node.poly_index);
        }

        for (idx, node) in nodes.iter().enumerate() {
            let from = NodeIndex::new(idx);
            for edge in &node.neighbours {
                graph.add_edge(
                    from,
                    NodeIndex::new(edge.neighbour as usize),
                    Transition::Portal {
                        a: edge.a,
                        b: edge.b,
                    },
                );
            }
            for &neighbour in &node.unverified_neighbours {
                graph.add_edge(from, NodeIndex::new(neighbour as usize), Transition::Unverified);
            }
            for link in &node.off_mesh_links {
                let to = NodeIndex::new(link.end_poly as usize);
                graph.add_edge(
                    from,
                    to,
                    Transition::OffMesh {
                        start: link.start_pos,
                        end: link.end_pos,
                        cost: link.cost,
                    },
                );
                if link.bidirectional {
                    graph.add_edge(
                        to,
                        from,
                        Transition::OffMesh {
                            start: link.end_pos,
                            end: link.start_pos,
                            cost: link.cost,
                        },
                    );
                }
            }
        }

        Self { nodes, graph }
    }

    /// Builds the graph from a polygon mesh. Jump links are only discovered
    /// when a ray caster is supplied. Invalid meshes give an empty graph.
    pub fn build(
        mesh: &PolygonMeshData,
        config: &NavConfig,
        ray_caster: Option<&dyn RayCaster>,
    ) -> Self {
        if let Err(e) = mesh.validate() {
            warn!("Building empty navigation graph: {e}");
            return Self::default();
        }

        let mut nodes = create_nodes(mesh, config);
        connect_neighbours(&mut nodes, mesh, config);
        if let Some(caster) = ray_caster {
            discover_off_mesh_links(&mut nodes, config, caster);
        }

        let nav = Self::from_nodes(nodes);
        info!(
            "Built navigation graph with {} nodes and {} transitions",
            nav.nodes.len(),
            nav.graph.edge_count()
        );
        nav
    }

    /// Rebuilds in place after the source geometry changed.
    pub fn regenerate(
        &mut self,
        mesh: &PolygonMeshData,
        config: &NavConfig,
        ray_caster: Option<&dyn RayCaster>,
    ) {
        *self = Self::build(mesh, config, ray_caster);
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, poly_index: u32) -> Option<&NavNode> {
        self.nodes.get(poly_index as usize)
    }

    pub fn position_to_node(&self, position: &Position) -> Option<&NavNode> {
        locate(&self.nodes, position)
    }

    pub fn find_closest_node_centroid(&self, position: &Position) -> Option<&NavNode> {
        self.nodes.iter().min_by(|a, b| {
            a.centroid_distance(position)
                .total_cmp(&b.centroid_distance(position))
        })
    }

    /// Cost of taking `transition` out of node `from` toward `goal`.
    pub fn transition_cost(
        &self,
        from: u32,
        to: u32,
        transition: &Transition,
        goal: &Position,
    ) -> f64 {
        let from_node = &self.nodes[from as usize];
        match transition {
            Transition::OffMesh { cost, .. } => *cost,
            Transition::Portal { a, b } => portal_cost(from_node, &a.midpoint(b), goal),
            Transition::Unverified => {
                let portal = from_node.closest_vertex_midpoint(&self.nodes[to as usize]);
                portal_cost(from_node, &portal, goal)
            }
        }
    }

    /// The transition the search prefers between two consecutive route nodes.
    pub fn cheapest_transition(&self, from: u32, to: u32, goal: &Position) -> Option<(Transition, f64)> {
        self.graph
            .edges_connecting(NodeIndex::new(from as usize), NodeIndex::new(to as usize))
            .map(|edge| {
                let transition = *edge.weight();
                (transition, self.transition_cost(from, to, &transition, goal))
            })
            .min_by(|a, b| a.1.total_cmp(&b.1))
    }

    pub fn path_cost(&self, path: &[u32], goal: &Position) -> f64 {
        path.iter()
            .tuple_windows()
            .map(|(u, v)| {
                self.cheapest_transition(*u, *v, goal)
                    .map_or(f64::INFINITY, |(_, cost)| cost)
            })
            .sum()
    }

    /// Lowest-cost node route between two world positions.
    pub fn find_path(&self, origin: &Position, goal: &Position) -> Option<PathResult> {
        self.find_route(NodeIdent::Pos(*origin), NodeIdent::Pos(*goal))
    }

    #[allow(clippy::cast_possible_truncation)]
    pub fn find_route(&self, start: NodeIdent, end: NodeIdent) -> Option<PathResult> {
        let start_node = self.resolve(start)?.poly_index;
        let end_node = self.resolve(end)?;
        let goal = match end {
            NodeIdent::Pos(pos) => pos,
            NodeIdent::Id(_) => end_node.centroid(),
        };
        let end_index = NodeIndex::new(end_node.poly_index as usize);

        let (cost, route) = astar(
            &self.graph,
            NodeIndex::new(start_node as usize),
            |finish| finish == end_index,
            |e| {
                self.transition_cost(
                    e.source().index() as u32,
                    e.target().index() as u32,
                    e.weight(),
                    &goal,
                )
            },
            |node| self.nodes[node.index()].centroid().distance(&goal),
        )?;

        Some(PathResult {
            path: route.iter().map(|node| node.index() as u32).collect(),
            cost,
        })
    }

    fn resolve(&self, ident: NodeIdent) -> Option<&NavNode> {
        match ident {
            NodeIdent::Pos(pos) => self.position_to_node(&pos),
            NodeIdent::Id(id) => self.node(id),
        }
    }

    /// First crossing of the segment with a boundary edge of the mesh,
    /// tested on the ground plane. A rise steeper than `max_rise` blocks at
    /// `start`.
    pub fn edge_raycast(
        &self,
        start: &Position,
        end: &Position,
        vertical_threshold: f64,
        max_rise: f64,
    ) -> Option<Position> {
        if (start.y - end.y).abs() > max_rise {
            return Some(*start);
        }
        let dx = end.x - start.x;
        let dz = end.z - start.z;
        let len_sq = dx.mul_add(dx, dz * dz);
        if len_sq < f64::EPSILON {
            return None;
        }
        let ray = Line::new(Coord { x: start.x, y: start.z }, Coord { x: end.x, y: end.z });

        let mut nearest: Option<(f64, Position)> = None;
        for node in &self.nodes {
            for (a, b) in node.edges() {
                if node.is_passable_edge(&a, &b) {
                    continue;
                }
                let edge = Line::new(Coord { x: a.x, y: a.z }, Coord { x: b.x, y: b.z });
                // Collinear overlap means grazing along a wall, not crossing it.
                let Some(LineIntersection::SinglePoint { intersection, .. }) =
                    line_intersection(ray, edge)
                else {
                    continue;
                };

                let t = ((intersection.x - start.x) * dx + (intersection.y - start.z) * dz) / len_sq;
                let y = start.y + (end.y - start.y) * t;
                if y < a.y.min(b.y) - vertical_threshold || y > a.y.max(b.y) + vertical_threshold {
                    continue;
                }
                if nearest.is_none_or(|(best, _)| t < best) {
                    nearest = Some((t, Position::new(intersection.x, y, intersection.y)));
                }
            }
        }
        nearest.map(|(_, hit)| hit)
    }

    pub fn save_to_json(&self, filename: &Path) -> Result<()> {
        let mut file = create_file_with_parents(filename)?;
        serde_json::to_writer(&mut file, &self.serialization_ref())?;
        Ok(())
    }

    pub fn from_json(filename: &Path) -> Result<Self> {
        let file = File::open(filename)?;
        let helper: NavSerializationHelperStruct = serde_json::from_reader(file)?;
        Self::from_helper(helper)
    }

    pub fn save_to_binary(&self, filename: &Path) -> Result<()> {
        let mut file = create_file_with_parents(filename)?;
        serialize_into(&mut file, &self.serialization_ref())?;
        Ok(())
    }

    pub fn from_binary(filename: &Path) -> Result<Self> {
        let file = File::open(filename)?;
        let helper: NavSerializationHelperStruct = deserialize_from(file)?;
        Self::from_helper(helper)
    }

    /// Loads a cached graph keyed by the content of `mesh` and `config`, or
    /// builds and caches it. The key does not cover the scene geometry, so
    /// callers keep one `cache_dir` per scene.
    pub fn load_or_build(
        mesh: &PolygonMeshData,
        config: &NavConfig,
        ray_caster: Option<&dyn RayCaster>,
        cache_dir: &Path,
    ) -> Result<Self> {
        let hash = content_hash(mesh, config)?;
        let cache_path = cache_dir.join(format!("{hash}.navgraph"));
        if cache_path.exists() {
            info!("Loading navigation graph from {}", cache_path.display());
            return Self::from_binary(&cache_path);
        }

        info!("Building navigation graph from scratch.");
        let nav = Self::build(mesh, config, ray_caster);
        nav.save_to_binary(&cache_path)?;
        Ok(nav)
    }

    fn serialization_ref(&self) -> NavSerializationRef<'_> {
        NavSerializationRef {
            version: Self::VERSION,
            nodes: &self.nodes,
        }
    }

    fn from_helper(helper: NavSerializationHelperStruct) -> Result<Self> {
        if helper.version != Self::VERSION {
            return Err(NavError::Version {
                found: helper.version,
                expected: Self::VERSION,
            });
        }
        Ok(Self::from_nodes(helper.nodes))
    }
}

fn locate<'a>(nodes: &'a [NavNode], position: &Position) -> Option<&'a NavNode> {
    nodes
        .iter()
        .filter_map(|node| {
            node.plane_distance_if_inside(position)
                .map(|distance| (node, distance))
        })
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(node, _)| node)
}

/// Distance to the portal, inflated when the portal leads away from the goal.
fn portal_cost(node: &NavNode, portal: &Position, goal: &Position) -> f64 {
    let centroid = node.centroid();
    let distance = centroid.distance(portal);
    let to_portal = (*portal - centroid).normalize();
    let to_goal = (*goal - centroid).normalize();
    let alignment = to_portal.dot(&to_goal).clamp(0.0, 1.0);
    let turn_penalty = 1.0 - alignment;
    distance * TURN_PENALTY_WEIGHT.mul_add(turn_penalty, 1.0)
}

fn is_ramp(normal: &Position, config: &NavConfig) -> bool {
    let up = normal.dot(&Position::UP);
    config
        .ramp_max_slope_degrees
        .map_or(up < 1.0, |max_slope| up < max_slope.to_radians().cos())
}

#[allow(clippy::cast_possible_truncation)]
fn create_nodes(mesh: &PolygonMeshData, config: &NavConfig) -> Vec<NavNode> {
    let cell_size = config.cell_size.unwrap_or(mesh.cell_size);
    let cell_height = config.cell_height.unwrap_or(mesh.cell_height);

    (0..mesh.polygon_count())
        .map(|poly| {
            let vertices = mesh
                .polygon_vertices(poly)
                .iter()
                .map(|&idx| mesh.decode_vertex(idx, cell_size, cell_height))
                .collect();
            let mut node = NavNode::new(poly as u32, vertices, mesh.region(poly));
            node.area = mesh.area(poly);
            if is_ramp(&node.normal(), config) {
                node.flags.insert(NodeFlags::RAMP);
            }
            node
        })
        .collect()
}

#[allow(clippy::cast_possible_truncation)]
fn connect_neighbours(nodes: &mut [NavNode], mesh: &PolygonMeshData, config: &NavConfig) {
    let cell_size = config.cell_size.unwrap_or(mesh.cell_size);
    let cell_height = config.cell_height.unwrap_or(mesh.cell_height);
    let poly_count = mesh.polygon_count();

    for (poly, node) in nodes.iter_mut().enumerate() {
        let verts = mesh.polygon_vertices(poly);
        for edge in 0..verts.len() {
            let Some(neighbour) = mesh.edge_neighbour(poly, edge) else {
                continue;
            };
            if neighbour >= poly_count || neighbour == poly {
                debug!("Poly {poly} edge {edge} points at invalid neighbour {neighbour}");
                continue;
            }

            let v0 = verts[edge];
            let v1 = verts[(edge + 1) % verts.len()];
            let shared = mesh
                .polygon_vertices(neighbour)
                .iter()
                .circular_tuple_windows::<(_, _)>()
                .any(|(&n0, &n1)| (n0 == v1 && n1 == v0) || (n0 == v0 && n1 == v1));

            if shared {
                node.neighbours.push(SharedEdge {
                    neighbour: neighbour as u32,
                    a: mesh.decode_vertex(v0, cell_size, cell_height),
                    b: mesh.decode_vertex(v1, cell_size, cell_height),
                });
            } else if config.keep_unverified_neighbours {
                debug!("Keeping unverified neighbour {neighbour} of poly {poly}");
                node.unverified_neighbours.push(neighbour as u32);
            } else {
                debug!("Poly {neighbour} does not share edge {edge} of poly {poly}, skipping");
            }
        }
    }
}

fn discover_off_mesh_links(nodes: &mut [NavNode], config: &NavConfig, caster: &dyn RayCaster) {
    let all: &[NavNode] = nodes;
    let links: Vec<Vec<OffMeshLink>> = all
        .par_iter()
        .map(|node| node_off_mesh_links(node, all, config, caster))
        .collect();

    let mut total = 0;
    for (node, node_links) in nodes.iter_mut().zip(links) {
        total += node_links.len();
        node.off_mesh_links = node_links;
    }
    info!("Discovered {total} off-mesh links");
}

/// Probes straight down just past each edge midpoint for lower ground that
/// belongs to another, non-adjacent node.
fn node_off_mesh_links(
    node: &NavNode,
    nodes: &[NavNode],
    config: &NavConfig,
    caster: &dyn RayCaster,
) -> Vec<OffMeshLink> {
    if node.surface_area() < config.jump_link_min_surface_area {
        return Vec::new();
    }

    let centroid = node.centroid();
    let mut links: Vec<OffMeshLink> = Vec::new();
    let mut linked: FxHashSet<u32> = node
        .off_mesh_links
        .iter()
        .map(|link| link.end_poly)
        .collect();
    for (a, b) in node.edges() {
        let midpoint = a.midpoint(&b);
        let direction = (midpoint - centroid).normalize();
        let probe = midpoint + direction * config.jump_link_probe_offset;

        let Some(hit) = caster.raycast(
            probe,
            Position::DOWN,
            config.jump_link_max_distance,
            config.jump_link_layer_mask,
        ) else {
            continue;
        };
        if hit.distance < config.jump_link_min_distance {
            continue;
        }
        let Some(other) = locate(nodes, &hit.point) else {
            continue;
        };

        let end_poly = other.poly_index;
        if end_poly == node.poly_index
            || node.is_neighbour(end_poly)
            || !linked.insert(end_poly)
        {
            continue;
        }

        debug!(
            "Jump link {} -> {end_poly}, drop {:.2}",
            node.poly_index, hit.distance
        );
        links.push(OffMeshLink {
            start_poly: node.poly_index,
            end_poly,
            start_pos: midpoint,
            end_pos: hit.point,
            bidirectional: false,
            cost: jump_link_cost(
                hit.distance,
                config.jump_link_cost_factor,
                config.jump_link_min_cost,
            ),
        });
    }
    links
}
