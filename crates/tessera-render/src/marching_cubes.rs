// SPDX-License-Identifier: CEPL-1.0
//! Single-cell isosurface extraction.
//!
//! Corners are numbered `0..4` counter-clockwise on the `z` face and `4..8`
//! on the `z + size` face; edges `0..4` and `4..8` run around those faces,
//! `8..12` connect them. A corner is inside when its value is negative.

mod tables;

use tessera_math::Vec3;

use crate::vertex::Index;
use tables::{EDGE_TABLE, TRI_TABLE};

/// Corner offsets in units of the cell size.
const CORNERS: [Vec3; 8] = [
    Vec3::new(0.0, 0.0, 0.0),
    Vec3::new(1.0, 0.0, 0.0),
    Vec3::new(1.0, 1.0, 0.0),
    Vec3::new(0.0, 1.0, 0.0),
    Vec3::new(0.0, 0.0, 1.0),
    Vec3::new(1.0, 0.0, 1.0),
    Vec3::new(1.0, 1.0, 1.0),
    Vec3::new(0.0, 1.0, 1.0),
];

/// Corner pair joined by each edge.
pub const EDGES: [(usize, usize); 12] = [
    (0, 1),
    (1, 2),
    (2, 3),
    (3, 0),
    (4, 5),
    (5, 6),
    (6, 7),
    (7, 4),
    (0, 4),
    (1, 5),
    (2, 6),
    (3, 7),
];

/// Geometry of one cell: vertices are unique within the cell only.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CellMesh {
    pub positions: Vec<Vec3>,
    pub triangles: Vec<[Index; 3]>,
}

impl CellMesh {
    pub fn is_empty(&self) -> bool {
        self.triangles.is_empty()
    }
}

/// Bit `i` set when corner `i` is inside the surface.
#[inline]
pub fn corner_mask(cell: &[f32; 8]) -> u8 {
    cell.iter()
        .enumerate()
        .fold(0u8, |m, (i, &v)| if v < 0.0 { m | (1 << i) } else { m })
}

#[inline]
pub fn edge_mask(corners: u8) -> u16 {
    EDGE_TABLE[corners as usize]
}

#[inline]
fn interpolate(p1: Vec3, p2: Vec3, v1: f32, v2: f32) -> Vec3 {
    p1 + (-v1 / (v2 - v1)) * (p2 - p1)
}

/// Polygonises the cell whose corner 0 sits at `origin` with edge length
/// `size`.
pub fn polygonise(cell: &[f32; 8], origin: Vec3, size: f32) -> CellMesh {
    let mask = corner_mask(cell);
    let active = edge_mask(mask);
    if active == 0 {
        return CellMesh::default();
    }

    let corner = |i: usize| origin + CORNERS[i] * size;

    let mut crossings = [Vec3::ZERO; 12];
    for (e, &(a, b)) in EDGES.iter().enumerate() {
        if active & (1 << e) != 0 {
            crossings[e] = interpolate(corner(a), corner(b), cell[a], cell[b]);
        }
    }

    let tri_edges: Vec<usize> = TRI_TABLE[mask as usize]
        .iter()
        .take_while(|&&e| e >= 0)
        .map(|&e| e as usize)
        .collect();

    let mut remap: [Option<Index>; 12] = [None; 12];
    let mut out = CellMesh::default();
    for &e in &tri_edges {
        if remap[e].is_none() {
            remap[e] = Some(out.positions.len() as Index);
            out.positions.push(crossings[e]);
        }
    }

    for t in tri_edges.chunks_exact(3) {
        let idx = |e: usize| remap[e].unwrap_or_default();
        out.triangles.push([idx(t[0]), idx(t[1]), idx(t[2])]);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(a: Vec3, b: Vec3) {
        assert!((a - b).length() < 1e-6, "{a:?} != {b:?}");
    }

    #[test]
    fn uniform_cells_produce_nothing() {
        for v in [1.0f32, -1.0] {
            let cell = [v; 8];
            assert_eq!(edge_mask(corner_mask(&cell)), 0);
            let m = polygonise(&cell, Vec3::ZERO, 1.0);
            assert!(m.positions.is_empty());
            assert!(m.triangles.is_empty());
        }
    }

    #[test]
    fn single_inside_corner_cuts_its_three_edges() {
        let size = 0.5;
        let origin = Vec3::new(2.0, -1.0, 3.0);
        let mut cell = [0.75f32, 0.5, 1.0, 0.25, 2.0, 1.0, 1.0, 3.0];
        cell[0] = -0.25;

        let m = polygonise(&cell, origin, size);
        assert_eq!(m.positions.len(), 3);
        assert_eq!(m.triangles.len(), 1);

        // Corner 0 touches edges 0 (to corner 1), 3 (to corner 3) and 8 (to corner 4).
        let expected = |n: usize| {
            let t = -cell[0] / (cell[n] - cell[0]);
            origin + CORNERS[n] * size * t
        };
        let want = [expected(1), expected(4), expected(3)];
        for (got, want) in m.positions.iter().zip(want) {
            assert_close(*got, want);
        }
        assert_eq!(m.triangles[0], [0, 1, 2]);
    }

    #[test]
    fn single_inside_corner_at_every_position() {
        for c in 0..8 {
            let mut cell = [1.0f32; 8];
            cell[c] = -1.0;
            let m = polygonise(&cell, Vec3::ZERO, 1.0);
            assert_eq!(m.positions.len(), 3, "corner {c}");
            assert_eq!(m.triangles.len(), 1, "corner {c}");
            // Equal magnitudes put every crossing at the edge midpoint.
            for p in &m.positions {
                let d = (*p - CORNERS[c]).length();
                assert!((d - 0.5).abs() < 1e-6, "corner {c}: {p:?}");
            }
        }
    }

    #[test]
    fn vertices_are_shared_within_a_cell() {
        // Corners 0 and 1 inside: a quad split into two triangles over 4 edges.
        let cell = [-1.0, -1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0];
        let m = polygonise(&cell, Vec3::ZERO, 1.0);
        assert_eq!(m.triangles.len(), 2);
        assert_eq!(m.positions.len(), 4);
        assert!(m.triangles.iter().flatten().all(|&i| (i as usize) < 4));
    }

    #[test]
    fn edge_table_agrees_with_triangle_table() {
        for mask in 0..256usize {
            let used = TRI_TABLE[mask]
                .iter()
                .take_while(|&&e| e >= 0)
                .fold(0u16, |acc, &e| acc | (1 << e));
            assert_eq!(used, EDGE_TABLE[mask], "mask {mask}");
        }
    }
}
