//! Scene queries against static triangle geometry.
//!
//! The navigation graph never owns scene geometry. Jump-link discovery,
//! ground snapping and shortcut occlusion go through the [`RayCaster`] trait;
//! [`CollisionChecker`] is the triangle-soup implementation of it.

use crate::constants::DEFAULT_LAYER;
use crate::error::{NavError, Result};
use crate::position::Position;

use byteorder::{NativeEndian, ReadBytesExt};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, ErrorKind};
use std::path::Path;

const RAY_EPSILON: f64 = 1e-9;
const LEAF_SIZE: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RayHit {
    pub point: Position,
    pub distance: f64,
}

/// Nearest-hit ray queries against scene geometry on a layer mask.
pub trait RayCaster: Send + Sync {
    /// Casts from `origin` along `direction` (need not be normalized) up to
    /// `max_distance`.
    fn raycast(
        &self,
        origin: Position,
        direction: Position,
        max_distance: f64,
        layer_mask: u32,
    ) -> Option<RayHit>;

    /// Whether anything on `layer_mask` lies between `start` and `end`.
    fn linecast(&self, start: Position, end: Position, layer_mask: u32) -> bool {
        let delta = end - start;
        let distance = delta.length();
        if distance < RAY_EPSILON {
            return false;
        }
        self.raycast(start, delta, distance, layer_mask).is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Triangle {
    pub p1: Position,
    pub p2: Position,
    pub p3: Position,
}

impl Triangle {
    pub const fn new(p1: Position, p2: Position, p3: Position) -> Self {
        Self { p1, p2, p3 }
    }

    fn aabb(&self) -> Aabb {
        let mut aabb = Aabb::empty();
        aabb.expand_point(&self.p1);
        aabb.expand_point(&self.p2);
        aabb.expand_point(&self.p3);
        aabb
    }

    fn center(&self) -> Position {
        (self.p1 + self.p2 + self.p3) / 3.0
    }

    /// Moller-Trumbore, both faces. Returns the ray parameter of the hit.
    pub fn ray_intersection(&self, origin: &Position, direction: &Position) -> Option<f64> {
        let edge1 = self.p2 - self.p1;
        let edge2 = self.p3 - self.p1;
        let h = direction.cross(&edge2);
        let a = edge1.dot(&h);
        if a.abs() < RAY_EPSILON {
            return None;
        }

        let f = 1.0 / a;
        let s = *origin - self.p1;
        let u = f * s.dot(&h);
        if !(0.0..=1.0).contains(&u) {
            return None;
        }

        let q = s.cross(&edge1);
        let v = f * direction.dot(&q);
        if v < 0.0 || u + v > 1.0 {
            return None;
        }

        let t = f * edge2.dot(&q);
        (t > RAY_EPSILON).then_some(t)
    }
}

#[derive(Debug, Clone, Copy)]
struct Aabb {
    min: Position,
    max: Position,
}

impl Aabb {
    const fn empty() -> Self {
        Self {
            min: Position::new(f64::MAX, f64::MAX, f64::MAX),
            max: Position::new(f64::MIN, f64::MIN, f64::MIN),
        }
    }

    fn expand_point(&mut self, p: &Position) {
        self.min = Position::new(self.min.x.min(p.x), self.min.y.min(p.y), self.min.z.min(p.z));
        self.max = Position::new(self.max.x.max(p.x), self.max.y.max(p.y), self.max.z.max(p.z));
    }

    fn expand(&mut self, other: &Self) {
        self.expand_point(&other.min);
        self.expand_point(&other.max);
    }

    /// Slab test. Entry parameter of the ray if it enters before `max_t`.
    fn ray_entry(&self, origin: &Position, direction: &Position, max_t: f64) -> Option<f64> {
        let mut t_min: f64 = 0.0;
        let mut t_max = max_t;
        for (o, d, lo, hi) in [
            (origin.x, direction.x, self.min.x, self.max.x),
            (origin.y, direction.y, self.min.y, self.max.y),
            (origin.z, direction.z, self.min.z, self.max.z),
        ] {
            if d.abs() < RAY_EPSILON {
                if o < lo || o > hi {
                    return None;
                }
                continue;
            }
            let inv = 1.0 / d;
            let (t1, t2) = {
                let a = (lo - o) * inv;
                let b = (hi - o) * inv;
                if a <= b { (a, b) } else { (b, a) }
            };
            t_min = t_min.max(t1);
            t_max = t_max.min(t2);
            if t_min > t_max {
                return None;
            }
        }
        Some(t_min)
    }
}

#[derive(Debug, Clone)]
enum BvhNode {
    Leaf {
        aabb: Aabb,
        triangles: Vec<usize>,
    },
    Internal {
        aabb: Aabb,
        left: Box<BvhNode>,
        right: Box<BvhNode>,
    },
}

impl BvhNode {
    fn build(triangles: &[Triangle], mut indices: Vec<usize>) -> Self {
        let mut aabb = Aabb::empty();
        for &idx in &indices {
            aabb.expand(&triangles[idx].aabb());
        }
        if indices.len() <= LEAF_SIZE {
            return Self::Leaf {
                aabb,
                triangles: indices,
            };
        }

        let extent = aabb.max - aabb.min;
        let axis = |p: Position| {
            if extent.x >= extent.y && extent.x >= extent.z {
                p.x
            } else if extent.y >= extent.z {
                p.y
            } else {
                p.z
            }
        };
        indices.sort_by(|&a, &b| {
            axis(triangles[a].center()).total_cmp(&axis(triangles[b].center()))
        });
        let right = indices.split_off(indices.len() / 2);

        Self::Internal {
            aabb,
            left: Box::new(Self::build(triangles, indices)),
            right: Box::new(Self::build(triangles, right)),
        }
    }

    const fn aabb(&self) -> &Aabb {
        match self {
            Self::Leaf { aabb, .. } | Self::Internal { aabb, .. } => aabb,
        }
    }
}

/// Static triangle geometry with per-triangle layer bits and a BVH.
#[derive(Debug, Clone)]
pub struct CollisionChecker {
    triangles: Vec<Triangle>,
    layers: Vec<u32>,
    root: Option<BvhNode>,
}

impl CollisionChecker {
    /// All triangles on [`DEFAULT_LAYER`].
    pub fn new(triangles: Vec<Triangle>) -> Self {
        let layers = vec![DEFAULT_LAYER; triangles.len()];
        Self::with_layers(triangles, layers)
    }

    /// `layers[i]` holds the layer bits of `triangles[i]`.
    pub fn with_layers(triangles: Vec<Triangle>, mut layers: Vec<u32>) -> Self {
        layers.resize(triangles.len(), DEFAULT_LAYER);
        let root = (!triangles.is_empty())
            .then(|| BvhNode::build(&triangles, (0..triangles.len()).collect()));
        Self {
            triangles,
            layers,
            root,
        }
    }

    /// Adds geometry on `layer` and rebuilds the hierarchy.
    pub fn add_triangles(&mut self, triangles: Vec<Triangle>, layer: u32) {
        let mut all = std::mem::take(&mut self.triangles);
        let mut layers = std::mem::take(&mut self.layers);
        layers.extend(std::iter::repeat_n(layer, triangles.len()));
        all.extend(triangles);
        *self = Self::with_layers(all, layers);
    }

    pub fn from_tri_file(filename: &Path, layer: u32) -> Result<Self> {
        let triangles = Self::read_tri_file(filename)?;
        let layers = vec![layer; triangles.len()];
        Ok(Self::with_layers(triangles, layers))
    }

    /// Reads consecutive triangles of nine native-endian `f32` values.
    pub fn read_tri_file(filename: &Path) -> Result<Vec<Triangle>> {
        let mut reader = BufReader::new(File::open(filename)?);
        let mut triangles = Vec::new();

        loop {
            let mut values = [0.0_f32; 9];
            match reader.read_f32::<NativeEndian>() {
                Ok(first) => values[0] = first,
                Err(e) if e.kind() == ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e.into()),
            }
            for value in values.iter_mut().skip(1) {
                *value = reader.read_f32::<NativeEndian>().map_err(|e| {
                    if e.kind() == ErrorKind::UnexpectedEof {
                        NavError::TriFile(format!(
                            "{} ends inside triangle {}",
                            filename.display(),
                            triangles.len()
                        ))
                    } else {
                        e.into()
                    }
                })?;
            }
            let p = |i: usize| {
                Position::new(
                    f64::from(values[i]),
                    f64::from(values[i + 1]),
                    f64::from(values[i + 2]),
                )
            };
            triangles.push(Triangle::new(p(0), p(3), p(6)));
        }
        Ok(triangles)
    }

    pub fn triangles(&self) -> &[Triangle] {
        &self.triangles
    }

    pub fn len(&self) -> usize {
        self.triangles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.triangles.is_empty()
    }

    pub fn connection_unobstructed(&self, start: Position, end: Position, layer_mask: u32) -> bool {
        !self.linecast(start, end, layer_mask)
    }
}

impl RayCaster for CollisionChecker {
    fn raycast(
        &self,
        origin: Position,
        direction: Position,
        max_distance: f64,
        layer_mask: u32,
    ) -> Option<RayHit> {
        let root = self.root.as_ref()?;
        let direction = direction.normalize();
        if direction == Position::ZERO {
            return None;
        }

        let mut best = max_distance;
        let mut found = false;
        let mut stack = vec![root];
        while let Some(node) = stack.pop() {
            if node.aabb().ray_entry(&origin, &direction, best).is_none() {
                continue;
            }
            match node {
                BvhNode::Leaf { triangles, .. } => {
                    for &idx in triangles {
                        if self.layers[idx] & layer_mask == 0 {
                            continue;
                        }
                        if let Some(t) = self.triangles[idx].ray_intersection(&origin, &direction)
                            && t <= best
                        {
                            best = t;
                            found = true;
                        }
                    }
                }
                BvhNode::Internal { left, right, .. } => {
                    stack.push(left);
                    stack.push(right);
                }
            }
        }

        found.then(|| RayHit {
            point: origin + direction * best,
            distance: best,
        })
    }
}
