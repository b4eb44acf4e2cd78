// SPDX-License-Identifier: CEPL-1.0
//! Demo content: procedural terrain, a marching-cubes blob and a ring of
//! point lights.

use tessera_math::{IVec2, IVec3, Quat, Vec3};
use tessera_render::terrain::{Heightmap, WorldChunk};
use tessera_render::{Camera, MeshData, PointLight};

/// Tiles per side of the terrain square, centred on the origin.
pub const TERRAIN_TILES: i32 = 3;

/// Smooth rolling height at a global lattice coordinate.
pub fn terrain_height(seed: u32, x: i32, y: i32) -> u16 {
    let phase = (seed % 1024) as f32 * 0.618;
    let (fx, fy) = (x as f32, y as f32);
    let h = (fx * 0.21 + phase).sin() * 0.5
        + (fy * 0.17 - phase).cos() * 0.3
        + ((fx + fy) * 0.05 + phase * 2.0).sin() * 0.2;
    // h is within [-1, 1]
    ((h * 0.5 + 0.5) * u16::MAX as f32) as u16
}

pub fn terrain(seed: u32) -> Vec<MeshData> {
    let w = Heightmap::WIDTH as i32;
    let half = TERRAIN_TILES / 2;
    let mut tiles = Vec::new();
    for ty in -half..=half {
        for tx in -half..=half {
            let pos = IVec2::new(tx, ty);
            let map = Heightmap::from_fn(pos, Heightmap::WIDTH, |x, y| {
                terrain_height(seed, tx * w + x as i32, ty * w + y as i32)
            });
            tiles.push(map.to_mesh());
        }
    }
    tiles
}

/// A sphere in a small chunk, polygonised with marching cubes.
pub fn blob() -> MeshData {
    const W: usize = 24;
    let centre = (W - 1) as f32 * 0.5;
    let radius = centre * 0.8;
    WorldChunk::from_fn(IVec3::ZERO, W, |x, y, z| {
        let p = Vec3::new(x as f32, y as f32, z as f32) - Vec3::splat(centre);
        radius - p.length()
    })
    .to_mesh()
}

/// `count` lights spread on a ring above the terrain.
pub fn demo_lights(count: u32) -> Vec<PointLight> {
    let span = (TERRAIN_TILES * Heightmap::WIDTH as i32) as f32 * 0.5;
    (0..count)
        .map(|i| {
            let t = i as f32 / count.max(1) as f32;
            let angle = t * std::f32::consts::TAU;
            let ring = span * (0.3 + 0.6 * ((i * 7) % 10) as f32 / 10.0);
            let position = Vec3::new(angle.cos() * ring, 2.0, angle.sin() * ring);
            let intensity = Vec3::new(
                0.5 + 0.5 * angle.cos(),
                0.5 + 0.5 * (angle + 2.1).cos(),
                0.5 + 0.5 * (angle + 4.2).cos(),
            );
            PointLight::new(position, 5.0, intensity)
        })
        .collect()
}

pub fn demo_camera() -> Camera {
    Camera {
        position: Vec3::new(0.0, 12.0, 30.0),
        rotation: Quat::from_rotation_x(-0.35),
        ..Camera::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terrain_is_deterministic_per_seed() {
        assert_eq!(terrain_height(7, 3, 9), terrain_height(7, 3, 9));
        assert_ne!(
            (0..32).map(|x| terrain_height(1, x, 0)).collect::<Vec<_>>(),
            (0..32).map(|x| terrain_height(2, x, 0)).collect::<Vec<_>>()
        );
    }

    #[test]
    fn terrain_covers_the_tile_square() {
        let tiles = terrain(0);
        assert_eq!(tiles.len(), (TERRAIN_TILES * TERRAIN_TILES) as usize);
        let w = Heightmap::WIDTH;
        assert!(tiles.iter().all(|t| t.vertices.len() == w * w));
    }

    #[test]
    fn blob_is_closed_geometry() {
        let m = blob();
        assert!(!m.is_empty());
        assert!(m.is_well_formed());
    }

    #[test]
    fn lights_use_default_radius() {
        let lights = demo_lights(10);
        assert_eq!(lights.len(), 10);
        assert!(lights.iter().all(|l| l.radius == 5.0 && l.position.y == 2.0));
        assert!(demo_lights(0).is_empty());
    }
}
