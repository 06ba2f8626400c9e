use crate::constants::NULL_INDEX;
use crate::error::{NavError, Result};
use crate::position::Position;

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::path::Path;

/// Polygon mesh as produced by a voxelization/triangulation pipeline.
///
/// Vertices are quantized to the voxel grid. Each polygon occupies a slot of
/// `nvp * 2` entries: `nvp` vertex indices followed by `nvp` neighbour
/// polygon indices, both padded with [`NULL_INDEX`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolygonMeshData {
    /// `[x, y, z]` per vertex in grid units.
    pub verts: Vec<u16>,
    pub polys: Vec<u16>,
    /// Region id per polygon.
    pub regs: Vec<u16>,
    /// Area id per polygon.
    #[serde(default)]
    pub areas: Vec<u8>,
    /// Maximum vertices per polygon.
    pub nvp: usize,
    pub cell_size: f64,
    pub cell_height: f64,
    pub bmin: Position,
}

impl PolygonMeshData {
    pub fn from_json(filename: &Path) -> Result<Self> {
        let file = File::open(filename)?;
        Ok(serde_json::from_reader(file)?)
    }

    pub fn vertex_count(&self) -> usize {
        self.verts.len() / 3
    }

    pub fn polygon_count(&self) -> usize {
        self.regs.len()
    }

    fn slot(&self, poly: usize) -> &[u16] {
        let stride = self.nvp * 2;
        &self.polys[poly * stride..(poly + 1) * stride]
    }

    /// Non-sentinel vertex indices of a polygon, in winding order.
    pub fn polygon_vertices(&self, poly: usize) -> &[u16] {
        let slot = &self.slot(poly)[..self.nvp];
        let len = slot
            .iter()
            .position(|&idx| idx == NULL_INDEX)
            .unwrap_or(self.nvp);
        &slot[..len]
    }

    /// Neighbour polygon across edge `edge`, which runs from vertex `edge`
    /// to vertex `edge + 1` (wrapping).
    pub fn edge_neighbour(&self, poly: usize, edge: usize) -> Option<usize> {
        let neighbour = self.slot(poly)[self.nvp + edge];
        (neighbour != NULL_INDEX).then_some(usize::from(neighbour))
    }

    pub fn region(&self, poly: usize) -> u16 {
        self.regs[poly]
    }

    pub fn area(&self, poly: usize) -> u8 {
        self.areas.get(poly).copied().unwrap_or(0)
    }

    /// World-space position of a quantized vertex.
    pub fn decode_vertex(&self, index: u16, cell_size: f64, cell_height: f64) -> Position {
        let base = usize::from(index) * 3;
        Position::new(
            f64::from(self.verts[base]) * cell_size,
            f64::from(self.verts[base + 1]) * cell_height,
            f64::from(self.verts[base + 2]) * cell_size,
        ) + self.bmin
    }

    /// Checks the structural invariants every accessor relies on.
    pub fn validate(&self) -> Result<()> {
        if self.polygon_count() == 0 {
            return Err(NavError::InvalidMesh("mesh has no polygons".to_string()));
        }
        if self.nvp < 3 {
            return Err(NavError::InvalidMesh(format!(
                "max vertices per polygon is {}, need at least 3",
                self.nvp
            )));
        }
        if self.verts.len() % 3 != 0 {
            return Err(NavError::InvalidMesh(format!(
                "vertex buffer length {} is not a multiple of 3",
                self.verts.len()
            )));
        }
        let required = self.polygon_count() * self.nvp * 2;
        if self.polys.len() < required {
            return Err(NavError::InvalidMesh(format!(
                "polygon table holds {} entries, {required} required",
                self.polys.len()
            )));
        }

        let vertex_count = self.vertex_count();
        for poly in 0..self.polygon_count() {
            let indices = self.polygon_vertices(poly);
            if indices.len() < 3 {
                return Err(NavError::InvalidMesh(format!(
                    "polygon {poly} has {} vertices",
                    indices.len()
                )));
            }
            if let Some(bad) = indices.iter().find(|&&idx| usize::from(idx) >= vertex_count) {
                return Err(NavError::InvalidMesh(format!(
                    "polygon {poly} references vertex {bad} of {vertex_count}"
                )));
            }
        }
        Ok(())
    }
}
