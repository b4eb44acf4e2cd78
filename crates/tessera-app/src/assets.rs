// SPDX-License-Identifier: CEPL-1.0
//! File-system asset decoding: images through `image`, Wavefront OBJ
//! through `tobj`.

use std::path::Path;

use tessera_math::{Vec2, Vec3};
use tessera_render::{AssetError, AssetLoader, ImageData, MeshData, Vertex};

#[derive(Debug, Default, Clone, Copy)]
pub struct FsAssetLoader;

fn vec3_at(data: &[f32], i: usize) -> Option<Vec3> {
    data.get(3 * i..3 * i + 3).map(Vec3::from_slice)
}

/// Converts one `tobj` mesh. Missing normals and tangents stay zero for the
/// importer to fill.
pub fn mesh_from_obj(mesh: &tobj::Mesh) -> MeshData {
    let count = mesh.positions.len() / 3;
    let vertices = (0..count)
        .map(|i| Vertex {
            pos: vec3_at(&mesh.positions, i).unwrap_or_default(),
            colour: vec3_at(&mesh.vertex_color, i).unwrap_or(Vertex::WHITE),
            uv: mesh
                .texcoords
                .get(2 * i..2 * i + 2)
                // OBJ puts v = 0 at the bottom.
                .map(|t| Vec2::new(t[0], 1.0 - t[1]))
                .unwrap_or_default(),
            normal: vec3_at(&mesh.normals, i).unwrap_or_default(),
            tangent: Vec3::ZERO,
        })
        .collect();
    MeshData::new(vertices, mesh.indices.clone())
}

impl AssetLoader for FsAssetLoader {
    fn load_image(&self, path: &Path) -> Result<ImageData, AssetError> {
        let img = image::open(path)
            .map_err(|e| AssetError::decode(path, e))?
            .to_rgba8();
        let (width, height) = img.dimensions();
        Ok(ImageData {
            width,
            height,
            channels: 4,
            pixels: img.into_raw(),
        })
    }

    fn load_meshes(&self, path: &Path) -> Result<Vec<MeshData>, AssetError> {
        if !self.is_model(path) {
            return Err(AssetError::Unsupported(path.to_owned()));
        }
        let (models, _materials) =
            tobj::load_obj(path, &tobj::GPU_LOAD_OPTIONS).map_err(|e| AssetError::decode(path, e))?;
        Ok(models.iter().map(|m| mesh_from_obj(&m.mesh)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn obj_mesh_converts_with_defaults() {
        let mesh = tobj::Mesh {
            positions: vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0],
            texcoords: vec![0.0, 0.0, 1.0, 0.0, 0.0, 1.0],
            indices: vec![0, 1, 2],
            ..Default::default()
        };
        let m = mesh_from_obj(&mesh);
        assert_eq!(m.vertices.len(), 3);
        assert_eq!(m.indices, vec![0, 1, 2]);
        assert_eq!(m.vertices[1].pos, Vec3::X);
        assert_eq!(m.vertices[0].uv, Vec2::new(0.0, 1.0));
        assert_eq!(m.vertices[2].colour, Vertex::WHITE);
        assert_eq!(m.vertices[0].normal, Vec3::ZERO);
    }

    #[test]
    fn non_obj_files_are_unsupported() {
        let err = FsAssetLoader.load_meshes(Path::new("model.fbx")).unwrap_err();
        assert!(matches!(err, AssetError::Unsupported(_)));
    }

    #[test]
    fn missing_image_is_a_decode_error() {
        let err = FsAssetLoader
            .load_image(Path::new("/nonexistent/albedo.png"))
            .unwrap_err();
        assert!(matches!(err, AssetError::Decode { .. }));
    }
}
