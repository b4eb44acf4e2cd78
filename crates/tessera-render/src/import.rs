// SPDX-License-Identifier: CEPL-1.0
//! Background model import.
//!
//! Decoding runs on a dedicated worker; the caller joins it when it needs the
//! meshes and uploads them on its own thread.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::JoinHandle;

use tracing::{debug, info, warn};

use crate::assets::{AssetError, AssetLoader};
use crate::mesh::MeshData;
use tessera_math::Vec3;

/// Meshes decoded from one file.
#[derive(Debug)]
pub struct ImportedModel {
    pub path: PathBuf,
    pub meshes: Vec<MeshData>,
}

pub struct ModelImporter {
    worker: Option<JoinHandle<Vec<ImportedModel>>>,
}

impl ModelImporter {
    /// Starts decoding `paths`. Directories are walked recursively and only
    /// files the loader recognises are imported.
    pub fn spawn(loader: Arc<dyn AssetLoader>, paths: Vec<PathBuf>) -> std::io::Result<Self> {
        let worker = std::thread::Builder::new()
            .name("model-import".into())
            .spawn(move || import_all(loader.as_ref(), &paths))?;
        Ok(Self {
            worker: Some(worker),
        })
    }

    pub fn is_finished(&self) -> bool {
        self.worker.as_ref().map_or(true, |w| w.is_finished())
    }

    /// Blocks until the worker is done. A panicking worker yields nothing.
    pub fn join(mut self) -> Vec<ImportedModel> {
        let Some(worker) = self.worker.take() else {
            return Vec::new();
        };
        match worker.join() {
            Ok(models) => models,
            Err(_) => {
                warn!("model import worker panicked");
                Vec::new()
            }
        }
    }
}

impl Drop for ModelImporter {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

fn import_all(loader: &dyn AssetLoader, paths: &[PathBuf]) -> Vec<ImportedModel> {
    let mut files = Vec::new();
    for p in paths {
        collect_files(loader, p, &mut files);
    }

    let mut out = Vec::with_capacity(files.len());
    for path in files {
        match import_one(loader, &path) {
            Ok(meshes) => {
                info!(
                    "imported {} ({} meshes, {} triangles)",
                    path.display(),
                    meshes.len(),
                    meshes.iter().map(MeshData::triangle_count).sum::<usize>()
                );
                out.push(ImportedModel { path, meshes });
            }
            Err(e) => warn!("skipping model: {e}"),
        }
    }
    out
}

fn collect_files(loader: &dyn AssetLoader, path: &Path, out: &mut Vec<PathBuf>) {
    if path.is_dir() {
        let entries = match std::fs::read_dir(path) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("cannot read {}: {e}", path.display());
                return;
            }
        };
        let mut children: Vec<PathBuf> = entries.filter_map(|e| e.ok().map(|e| e.path())).collect();
        children.sort();
        for child in children {
            collect_files(loader, &child, out);
        }
    } else if loader.is_model(path) {
        out.push(path.to_owned());
    } else {
        debug!("ignoring {}", path.display());
    }
}

fn import_one(loader: &dyn AssetLoader, path: &Path) -> Result<Vec<MeshData>, AssetError> {
    let mut meshes = loader.load_meshes(path)?;
    meshes.retain(|m| !m.is_empty());
    for mesh in &mut meshes {
        if !mesh.is_well_formed() {
            return Err(AssetError::decode(path, "index out of range"));
        }
        if mesh.vertices.iter().all(|v| v.normal == Vec3::ZERO) {
            mesh.accumulate_normals();
        }
        if mesh.vertices.iter().all(|v| v.tangent == Vec3::ZERO) {
            mesh.generate_tangents();
        }
    }
    Ok(meshes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::ImageData;
    use crate::vertex::Vertex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct FakeLoader {
        calls: AtomicUsize,
    }

    impl AssetLoader for FakeLoader {
        fn load_image(&self, path: &Path) -> Result<ImageData, AssetError> {
            Err(AssetError::Unsupported(path.to_owned()))
        }

        fn load_meshes(&self, path: &Path) -> Result<Vec<MeshData>, AssetError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if path.to_string_lossy().contains("broken") {
                return Err(AssetError::decode(path, "bad header"));
            }
            let mut verts: Vec<Vertex> = [Vec3::ZERO, Vec3::X, Vec3::Y]
                .into_iter()
                .map(Vertex::at)
                .collect();
            verts[1].uv = tessera_math::Vec2::X;
            verts[2].uv = tessera_math::Vec2::Y;
            Ok(vec![MeshData::new(verts, vec![0, 1, 2])])
        }
    }

    #[test]
    fn imports_on_worker_and_skips_failures() {
        let loader = Arc::new(FakeLoader::default());
        let importer = ModelImporter::spawn(
            loader.clone(),
            vec!["a.obj".into(), "broken.obj".into(), "notes.txt".into()],
        )
        .unwrap();
        let models = importer.join();

        assert_eq!(models.len(), 1);
        assert_eq!(models[0].path, PathBuf::from("a.obj"));
        // the .txt file never reaches the loader
        assert_eq!(loader.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn fills_missing_normals_and_tangents() {
        let loader = Arc::new(FakeLoader::default());
        let models = ModelImporter::spawn(loader, vec!["tri.obj".into()])
            .unwrap()
            .join();
        let mesh = &models[0].meshes[0];
        for v in &mesh.vertices {
            assert!((v.normal - Vec3::Z).length() < 1e-6);
            assert!((v.tangent - Vec3::X).length() < 1e-5);
        }
    }

    #[test]
    fn walks_directories() {
        let dir = std::env::temp_dir().join(format!("tessera-import-{}", std::process::id()));
        std::fs::create_dir_all(dir.join("sub")).unwrap();
        std::fs::write(dir.join("one.obj"), b"").unwrap();
        std::fs::write(dir.join("sub").join("two.OBJ"), b"").unwrap();
        std::fs::write(dir.join("readme.md"), b"").unwrap();

        let models = ModelImporter::spawn(Arc::new(FakeLoader::default()), vec![dir.clone()])
            .unwrap()
            .join();
        std::fs::remove_dir_all(&dir).unwrap();

        assert_eq!(models.len(), 2);
    }
}
