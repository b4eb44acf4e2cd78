// SPDX-License-Identifier: CEPL-1.0
//! Procedural geometry sources: heightmap tiles and volumetric chunks.

use tessera_math::{IVec2, IVec3, Vec3};

use crate::marching_cubes::polygonise;
use crate::mesh::MeshData;
use crate::vertex::{Index, Vertex};

/// Square grid of 16-bit heights, one tile of the terrain.
#[derive(Clone, Debug)]
pub struct Heightmap {
    pub position: IVec2,
    width: usize,
    heights: Vec<u16>,
}

impl Heightmap {
    pub const WIDTH: usize = 32;
    /// Raw `u16` heights are multiplied by this to get world units.
    pub const HEIGHT_SCALE: f32 = 0.00001;

    /// A flat tile of the default width.
    pub fn flat(position: IVec2) -> Self {
        Self::from_fn(position, Self::WIDTH, |_, _| 0)
    }

    pub fn from_fn(position: IVec2, width: usize, mut f: impl FnMut(usize, usize) -> u16) -> Self {
        assert!(width >= 2, "a heightmap needs at least 2x2 samples");
        let mut heights = Vec::with_capacity(width * width);
        for y in 0..width {
            for x in 0..width {
                heights.push(f(x, y));
            }
        }
        Self {
            position,
            width,
            heights,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    /// World-space edge length of the tile.
    pub fn world_size(&self) -> f32 {
        self.width as f32
    }

    pub fn height(&self, x: usize, y: usize) -> u16 {
        self.heights[y * self.width + x]
    }

    /// Triangulates the lattice: `width²` vertices, two triangles per cell,
    /// normals accumulated from the adjacent faces.
    pub fn to_mesh(&self) -> MeshData {
        let w = self.width;
        let offset = self.position.as_vec2() * self.world_size();

        let mut vertices = Vec::with_capacity(w * w);
        for y in 0..w {
            for x in 0..w {
                vertices.push(Vertex::at(Vec3::new(
                    x as f32 + offset.x,
                    y as f32 + offset.y,
                    self.height(x, y) as f32 * Self::HEIGHT_SCALE,
                )));
            }
        }

        let cells = w - 1;
        let mut indices = Vec::with_capacity(cells * cells * 6);
        for y in 0..cells {
            for x in 0..cells {
                let vi = (y * w + x) as Index;
                let wi = w as Index;
                indices.extend_from_slice(&[vi, vi + wi, vi + 1, vi + 1, vi + wi, vi + wi + 1]);
            }
        }

        let mut mesh = MeshData::new(vertices, indices);
        mesh.accumulate_normals();
        mesh
    }
}

/// Cubic scalar field; the surface is the zero level set.
#[derive(Clone, Debug)]
pub struct WorldChunk {
    /// Grid coordinate of the chunk's centre.
    pub position: IVec3,
    width: usize,
    values: Vec<f32>,
}

impl WorldChunk {
    pub const WIDTH: usize = 64;
    pub const CELL_SIZE: f32 = 0.5;

    pub fn from_fn(
        position: IVec3,
        width: usize,
        mut f: impl FnMut(usize, usize, usize) -> f32,
    ) -> Self {
        assert!(width >= 2, "a chunk needs at least 2 samples per side");
        let mut values = Vec::with_capacity(width * width * width);
        for z in 0..width {
            for y in 0..width {
                for x in 0..width {
                    values.push(f(x, y, z));
                }
            }
        }
        Self {
            position,
            width,
            values,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    /// Edge-to-edge distance in world units.
    pub fn world_size(&self) -> f32 {
        Self::CELL_SIZE * (self.width - 1) as f32
    }

    #[inline]
    pub fn index(&self, x: usize, y: usize, z: usize) -> usize {
        debug_assert!(x < self.width && y < self.width && z < self.width);
        z * self.width * self.width + y * self.width + x
    }

    #[inline]
    pub fn value_at(&self, x: usize, y: usize, z: usize) -> f32 {
        self.values[self.index(x, y, z)]
    }

    /// Runs marching cubes over every cell. Vertices are shared only within
    /// a cell, so neighbouring cells do not weld.
    pub fn to_mesh(&self) -> MeshData {
        let half_chunk = self.world_size() * 0.5;
        let half_cell = Self::CELL_SIZE * 0.5;
        let origin = self.position.as_vec3() * self.world_size() - Vec3::splat(half_chunk);

        let mut mesh = MeshData::default();
        let n = self.width - 1;
        for z in 0..n {
            for y in 0..n {
                for x in 0..n {
                    let corner = origin
                        + Vec3::new(x as f32, y as f32, z as f32) * Self::CELL_SIZE
                        + Vec3::splat(half_cell);
                    let cell = [
                        self.value_at(x, y, z),
                        self.value_at(x + 1, y, z),
                        self.value_at(x + 1, y + 1, z),
                        self.value_at(x, y + 1, z),
                        self.value_at(x, y, z + 1),
                        self.value_at(x + 1, y, z + 1),
                        self.value_at(x + 1, y + 1, z + 1),
                        self.value_at(x, y + 1, z + 1),
                    ];
                    let part = polygonise(&cell, corner, Self::CELL_SIZE);
                    let base = mesh.vertices.len() as Index;
                    mesh.vertices
                        .extend(part.positions.iter().map(|&p| Vertex::at(p)));
                    mesh.indices
                        .extend(part.triangles.iter().flatten().map(|&i| i + base));
                }
            }
        }

        mesh.accumulate_normals();
        mesh
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heightmap_counts() {
        for n in [2usize, 3, 8, Heightmap::WIDTH] {
            let hm = Heightmap::from_fn(IVec2::ZERO, n, |x, y| ((x * 31 + y * 17) % 4096) as u16);
            let mesh = hm.to_mesh();
            assert_eq!(mesh.vertices.len(), n * n);
            assert_eq!(mesh.triangle_count(), (n - 1) * (n - 1) * 2);
            assert!(mesh.is_well_formed());
        }
    }

    #[test]
    fn heightmap_normals_are_unit_length() {
        let hm = Heightmap::from_fn(IVec2::new(1, -2), 16, |x, y| (x * y * 500) as u16);
        for v in hm.to_mesh().vertices {
            assert!((v.normal.length() - 1.0).abs() < 1e-5, "{:?}", v.normal);
        }
    }

    #[test]
    fn heightmap_is_offset_by_tile_position() {
        let hm = Heightmap::flat(IVec2::new(2, 1));
        let mesh = hm.to_mesh();
        assert_eq!(mesh.vertices[0].pos, Vec3::new(64.0, 32.0, 0.0));
    }

    #[test]
    fn first_cell_uses_lattice_winding() {
        let mesh = Heightmap::flat(IVec2::ZERO).to_mesh();
        let w = Heightmap::WIDTH as Index;
        assert_eq!(&mesh.indices[..6], &[0, w, 1, 1, w, w + 1]);
    }

    #[test]
    fn sphere_chunk_produces_closed_looking_surface() {
        let width = 8;
        let centre = (width - 1) as f32 * 0.5;
        let chunk = WorldChunk::from_fn(IVec3::ZERO, width, |x, y, z| {
            let d = Vec3::new(x as f32, y as f32, z as f32) - Vec3::splat(centre);
            d.length() - 2.5
        });
        let mesh = chunk.to_mesh();
        assert!(!mesh.is_empty());
        assert!(mesh.is_well_formed());

        // Sample `centre` lands half a cell off the world origin.
        let world_centre = Vec3::splat(WorldChunk::CELL_SIZE * 0.5);
        let radius = 2.5 * WorldChunk::CELL_SIZE;
        for v in &mesh.vertices {
            let r = (v.pos - world_centre).length();
            assert!(
                (r - radius).abs() <= WorldChunk::CELL_SIZE * 0.5,
                "vertex {:?} at radius {r}",
                v.pos
            );
        }
    }

    #[test]
    fn uniform_chunk_is_empty() {
        let chunk = WorldChunk::from_fn(IVec3::ZERO, 4, |_, _, _| 1.0);
        assert!(chunk.to_mesh().is_empty());
        assert_eq!(chunk.index(1, 2, 3), 3 * 16 + 2 * 4 + 1);
    }
}
