// SPDX-License-Identifier: CEPL-1.0
//! CPU-side triangle meshes, the common currency of every geometry source.

use tessera_math::{normalize_or_keep, Vec2, Vec3};

use crate::vertex::{Index, Vertex};

#[derive(Clone, Debug, Default, PartialEq)]
pub struct MeshData {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<Index>,
}

impl MeshData {
    pub fn new(vertices: Vec<Vertex>, indices: Vec<Index>) -> Self {
        Self { vertices, indices }
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    pub fn vertex_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.vertices)
    }

    pub fn index_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.indices)
    }

    /// Appends `other`, rebasing its indices onto this mesh's vertices.
    pub fn append(&mut self, other: &MeshData) {
        let base = self.vertices.len() as Index;
        self.vertices.extend_from_slice(&other.vertices);
        self.indices.extend(other.indices.iter().map(|i| i + base));
    }

    /// True when the index list is whole triangles that reference existing
    /// vertices.
    pub fn is_well_formed(&self) -> bool {
        self.indices.len() % 3 == 0
            && self
                .indices
                .iter()
                .all(|&i| (i as usize) < self.vertices.len())
    }

    fn triangles(&self) -> impl Iterator<Item = [usize; 3]> + '_ {
        self.indices
            .chunks_exact(3)
            .map(|t| [t[0] as usize, t[1] as usize, t[2] as usize])
    }

    /// Replaces every vertex normal with the renormalised sum of the face
    /// normals of the triangles that use it. Degenerate faces contribute
    /// nothing.
    pub fn accumulate_normals(&mut self) {
        for v in &mut self.vertices {
            v.normal = Vec3::ZERO;
        }

        let faces: Vec<([usize; 3], Vec3)> = self
            .triangles()
            .map(|[a, b, c]| {
                let p0 = self.vertices[a].pos;
                let e1 = self.vertices[b].pos - p0;
                let e2 = self.vertices[c].pos - p0;
                ([a, b, c], e1.cross(e2).normalize_or_zero())
            })
            .collect();

        for (tri, n) in faces {
            for i in tri {
                self.vertices[i].normal += n;
            }
        }

        for v in &mut self.vertices {
            v.normal = normalize_or_keep(v.normal);
        }
    }

    /// Derives per-vertex tangents from positions and texture coordinates,
    /// Gram-Schmidt orthogonalised against the normal. Triangles with a
    /// degenerate UV mapping are skipped.
    pub fn generate_tangents(&mut self) {
        let mut acc = vec![Vec3::ZERO; self.vertices.len()];

        for [a, b, c] in self.triangles() {
            let (va, vb, vc) = (&self.vertices[a], &self.vertices[b], &self.vertices[c]);
            let e1 = vb.pos - va.pos;
            let e2 = vc.pos - va.pos;
            let d1: Vec2 = vb.uv - va.uv;
            let d2: Vec2 = vc.uv - va.uv;

            let det = d1.x * d2.y - d2.x * d1.y;
            if det.abs() <= f32::EPSILON {
                continue;
            }
            let t = (e1 * d2.y - e2 * d1.y) / det;
            for i in [a, b, c] {
                acc[i] += t;
            }
        }

        for (v, t) in self.vertices.iter_mut().zip(acc) {
            let ortho = t - v.normal * v.normal.dot(t);
            v.tangent = normalize_or_keep(ortho);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quad() -> MeshData {
        let mut verts: Vec<Vertex> = [
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(1.0, 1.0, 0.0),
            Vec3::new(0.0, 1.0, 0.0),
        ]
        .into_iter()
        .map(Vertex::at)
        .collect();
        for v in &mut verts {
            v.uv = v.pos.truncate();
        }
        MeshData::new(verts, vec![0, 1, 2, 0, 2, 3])
    }

    #[test]
    fn normals_of_a_flat_quad_face_plus_z() {
        let mut m = quad();
        m.accumulate_normals();
        for v in &m.vertices {
            assert!((v.normal - Vec3::Z).length() < 1e-6, "{:?}", v.normal);
        }
    }

    #[test]
    fn tangents_follow_u_direction() {
        let mut m = quad();
        m.accumulate_normals();
        m.generate_tangents();
        for v in &m.vertices {
            assert!((v.tangent - Vec3::X).length() < 1e-5, "{:?}", v.tangent);
        }
    }

    #[test]
    fn append_rebases_indices() {
        let mut a = quad();
        let b = quad();
        a.append(&b);
        assert_eq!(a.vertices.len(), 8);
        assert_eq!(&a.indices[6..], &[4, 5, 6, 4, 6, 7]);
        assert!(a.is_well_formed());
    }

    #[test]
    fn out_of_range_index_is_not_well_formed() {
        let mut m = quad();
        m.indices.push(9);
        m.indices.push(0);
        m.indices.push(1);
        assert!(!m.is_well_formed());
    }

    #[test]
    fn byte_views_cover_whole_buffers() {
        let m = quad();
        assert_eq!(m.vertex_bytes().len(), 4 * std::mem::size_of::<Vertex>());
        assert_eq!(m.index_bytes().len(), 6 * 4);
    }
}
