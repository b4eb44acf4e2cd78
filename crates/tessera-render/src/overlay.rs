// SPDX-License-Identifier: CEPL-1.0
//! Immediate-mode 2D geometry drawn over the shaded frame.

use bytemuck::{Pod, Zeroable};
use tessera_math::{Vec2, Vec4};

use crate::vertex::Index;

/// Position in pixels from the top-left corner.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct OverlayVertex {
    pub pos: Vec2,
    pub uv: Vec2,
    pub colour: Vec4,
}

impl OverlayVertex {
    pub const OFFSET_POS: u32 = 0;
    pub const OFFSET_UV: u32 = 8;
    pub const OFFSET_COLOUR: u32 = 16;
}

/// Rebuilt by the caller every frame.
#[derive(Clone, Debug, Default)]
pub struct DrawList {
    pub vertices: Vec<OverlayVertex>,
    pub indices: Vec<Index>,
}

impl DrawList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.vertices.clear();
        self.indices.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn byte_size(&self) -> usize {
        std::mem::size_of_val(self.vertices.as_slice()) + std::mem::size_of_val(self.indices.as_slice())
    }

    /// Solid axis-aligned rectangle, `min` top-left and `max` bottom-right.
    pub fn rect(&mut self, min: Vec2, max: Vec2, colour: Vec4) {
        let base = self.vertices.len() as Index;
        for (pos, uv) in [
            (min, Vec2::ZERO),
            (Vec2::new(max.x, min.y), Vec2::X),
            (max, Vec2::ONE),
            (Vec2::new(min.x, max.y), Vec2::Y),
        ] {
            self.vertices.push(OverlayVertex { pos, uv, colour });
        }
        self.indices
            .extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
    }

    /// Horizontal bar filled to `fraction` of its width over a dimmed track.
    pub fn bar(&mut self, min: Vec2, size: Vec2, fraction: f32, colour: Vec4) {
        let track = Vec4::new(colour.x * 0.25, colour.y * 0.25, colour.z * 0.25, colour.w);
        self.rect(min, min + size, track);
        let filled = Vec2::new(size.x * fraction.clamp(0.0, 1.0), size.y);
        if filled.x > 0.0 {
            self.rect(min, min + filled, colour);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vertex_layout() {
        assert_eq!(std::mem::size_of::<OverlayVertex>(), 32);
        assert_eq!(
            std::mem::offset_of!(OverlayVertex, colour) as u32,
            OverlayVertex::OFFSET_COLOUR
        );
    }

    #[test]
    fn rects_append_rebased_quads() {
        let mut list = DrawList::new();
        list.rect(Vec2::ZERO, Vec2::splat(10.0), Vec4::ONE);
        list.rect(Vec2::splat(20.0), Vec2::splat(30.0), Vec4::ONE);
        assert_eq!(list.vertices.len(), 8);
        assert_eq!(&list.indices[6..], &[4, 5, 6, 4, 6, 7]);
        assert_eq!(list.vertices[6].pos, Vec2::splat(30.0));
        assert_eq!(list.byte_size(), 8 * 32 + 12 * 4);
    }

    #[test]
    fn empty_bar_draws_only_the_track() {
        let mut list = DrawList::new();
        list.bar(Vec2::ZERO, Vec2::new(100.0, 8.0), 0.0, Vec4::ONE);
        assert_eq!(list.indices.len(), 6);
        list.clear();
        assert!(list.is_empty());
        list.bar(Vec2::ZERO, Vec2::new(100.0, 8.0), 2.0, Vec4::ONE);
        assert_eq!(list.vertices[6].pos.x, 100.0);
    }
}
