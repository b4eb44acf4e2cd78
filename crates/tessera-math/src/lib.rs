// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]

pub use glam;
pub use glam::{IVec2, IVec3, Mat4, Quat, UVec2, Vec2, Vec3, Vec4};

/// `ceil(n / d)` for non-zero `d`.
#[inline]
pub const fn ceil_div(n: u32, d: u32) -> u32 {
    assert!(d != 0, "ceil_div by zero");
    n.div_ceil(d)
}

/// Number of `tile`-sized tiles needed to cover `width` x `height` pixels.
#[inline]
pub const fn tile_grid(width: u32, height: u32, tile: u32) -> UVec2 {
    UVec2::new(ceil_div(width, tile), ceil_div(height, tile))
}

/// Normalises `v`, leaving the zero vector alone instead of producing NaNs.
#[inline]
pub fn normalize_or_keep(v: Vec3) -> Vec3 {
    v.try_normalize().unwrap_or(v)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ceil_div_rounds_up() {
        assert_eq!(ceil_div(0, 16), 0);
        assert_eq!(ceil_div(1, 16), 1);
        assert_eq!(ceil_div(16, 16), 1);
        assert_eq!(ceil_div(17, 16), 2);
    }

    #[test]
    fn tile_grid_covers_extent() {
        assert_eq!(tile_grid(1920, 1080, 16), UVec2::new(120, 68));
        assert_eq!(tile_grid(800, 600, 16), UVec2::new(50, 38));
        assert_eq!(tile_grid(17, 17, 16), UVec2::new(2, 2));
    }

    #[test]
    fn zero_vector_survives_normalisation() {
        assert_eq!(normalize_or_keep(Vec3::ZERO), Vec3::ZERO);
        assert!((normalize_or_keep(Vec3::new(3.0, 0.0, 4.0)).length() - 1.0).abs() < 1e-6);
    }
}
