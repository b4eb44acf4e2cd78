// SPDX-License-Identifier: CEPL-1.0
//! Host mirrors of the uniform and storage blocks the shaders read.
//!
//! Every type here is `Pod` and laid out to match std140 in the GLSL sources.

use bytemuck::{Pod, Zeroable};
use tessera_math::{Mat4, Quat, Vec3};
use tracing::warn;

/// A free-flying viewpoint.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Camera {
    pub position: Vec3,
    pub rotation: Quat,
    pub fov_y: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            fov_y: 45f32.to_radians(),
            near: 0.5,
            far: 100.0,
        }
    }
}

impl Camera {
    pub fn view_matrix(&self) -> Mat4 {
        Mat4::from_quat(self.rotation).transpose() * Mat4::from_translation(-self.position)
    }

    /// Right-handed, zero-to-one depth, with clip-space y pointing down.
    pub fn projection(&self, aspect: f32) -> Mat4 {
        let mut proj = Mat4::perspective_rh(self.fov_y, aspect, self.near, self.far);
        proj.y_axis.y *= -1.0;
        proj
    }
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct CameraUniform {
    pub view: Mat4,
    pub proj: Mat4,
    pub viewproj: Mat4,
    pub position: Vec3,
    pub _pad: f32,
}

impl CameraUniform {
    pub fn update(&mut self, camera: &Camera, width: u32, height: u32) {
        let aspect = width.max(1) as f32 / height.max(1) as f32;
        self.view = camera.view_matrix();
        self.proj = camera.projection(aspect);
        self.viewproj = self.proj * self.view;
        self.position = camera.position;
    }
}

/// Per-draw transform.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct ObjectUniform {
    pub model: Mat4,
}

impl Default for ObjectUniform {
    fn default() -> Self {
        Self {
            model: Mat4::IDENTITY,
        }
    }
}

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct PointLight {
    pub position: Vec3,
    pub radius: f32,
    pub intensity: Vec3,
    pub _pad: f32,
}

impl Default for PointLight {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            radius: 5.0,
            intensity: Vec3::ONE,
            _pad: 0.0,
        }
    }
}

impl PointLight {
    pub fn new(position: Vec3, radius: f32, intensity: Vec3) -> Self {
        Self {
            position,
            radius,
            intensity,
            _pad: 0.0,
        }
    }
}

/// Light count followed by the light array; read by the culling pass and
/// the shading pass.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct PointLightBlock {
    pub count: u32,
    pub _pad: [u32; 3],
    pub lights: [PointLight; PointLightBlock::MAX_LIGHTS],
}

impl Default for PointLightBlock {
    fn default() -> Self {
        Zeroable::zeroed()
    }
}

impl PointLightBlock {
    pub const MAX_LIGHTS: usize = 2000;
    pub const BYTE_SIZE: usize =
        std::mem::size_of::<PointLight>() * Self::MAX_LIGHTS + std::mem::size_of::<[f32; 4]>();

    /// Replaces the active lights. Anything past `MAX_LIGHTS` is dropped.
    pub fn set(&mut self, lights: &[PointLight]) {
        let n = if lights.len() > Self::MAX_LIGHTS {
            warn!(
                "{} point lights requested, keeping the first {}",
                lights.len(),
                Self::MAX_LIGHTS
            );
            Self::MAX_LIGHTS
        } else {
            lights.len()
        };
        self.lights[..n].copy_from_slice(&lights[..n]);
        self.count = n as u32;
    }

    pub fn active(&self) -> &[PointLight] {
        &self.lights[..self.count as usize]
    }
}

/// Which optional material textures are bound.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct MaterialInfo {
    pub has_albedo: u32,
    pub has_normal: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::size_of;
    use tessera_math::Vec4;

    #[test]
    fn block_sizes_match_shader_layouts() {
        assert_eq!(size_of::<PointLight>(), 32);
        assert_eq!(size_of::<PointLightBlock>(), 32 * 2000 + 16);
        assert_eq!(PointLightBlock::BYTE_SIZE, size_of::<PointLightBlock>());
        assert_eq!(size_of::<CameraUniform>(), 3 * 64 + 16);
        assert_eq!(size_of::<MaterialInfo>(), 8);
    }

    #[test]
    fn light_defaults() {
        let l = PointLight::default();
        assert_eq!(l.radius, 5.0);
        assert_eq!(l.intensity, Vec3::ONE);
    }

    #[test]
    fn excess_lights_are_dropped() {
        let mut block = PointLightBlock::default();
        let lights = vec![PointLight::default(); PointLightBlock::MAX_LIGHTS + 5];
        block.set(&lights);
        assert_eq!(block.count as usize, PointLightBlock::MAX_LIGHTS);

        block.set(&lights[..3]);
        assert_eq!(block.active().len(), 3);
    }

    #[test]
    fn view_moves_world_opposite_to_camera() {
        let cam = Camera {
            position: Vec3::new(1.0, 2.0, 3.0),
            ..Camera::default()
        };
        let p = cam.view_matrix() * Vec4::new(1.0, 2.0, 3.0, 1.0);
        assert!(p.truncate().length() < 1e-6);
    }

    #[test]
    fn uniform_update_combines_matrices() {
        let cam = Camera::default();
        let mut u = CameraUniform::default();
        u.update(&cam, 800, 600);
        assert_eq!(u.viewproj, u.proj * u.view);
        assert!(u.proj.y_axis.y < 0.0);
    }
}
