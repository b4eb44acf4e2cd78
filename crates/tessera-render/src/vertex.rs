// SPDX-License-Identifier: CEPL-1.0
use bytemuck::{Pod, Zeroable};
use tessera_math::{Vec2, Vec3};

pub type Index = u32;

/// Interleaved vertex shared by every mesh source.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub pos: Vec3,
    pub colour: Vec3,
    pub uv: Vec2,
    pub normal: Vec3,
    pub tangent: Vec3,
}

impl Vertex {
    pub const WHITE: Vec3 = Vec3::ONE;

    /// A white vertex at `pos` with normal and tangent left for later passes.
    pub fn at(pos: Vec3) -> Self {
        Self {
            pos,
            colour: Self::WHITE,
            ..Self::default()
        }
    }

    pub const OFFSET_POS: u32 = 0;
    pub const OFFSET_COLOUR: u32 = 12;
    pub const OFFSET_UV: u32 = 24;
    pub const OFFSET_NORMAL: u32 = 32;
    pub const OFFSET_TANGENT: u32 = 44;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::{offset_of, size_of};

    #[test]
    fn layout_matches_attribute_offsets() {
        assert_eq!(size_of::<Vertex>(), 56);
        assert_eq!(offset_of!(Vertex, pos) as u32, Vertex::OFFSET_POS);
        assert_eq!(offset_of!(Vertex, colour) as u32, Vertex::OFFSET_COLOUR);
        assert_eq!(offset_of!(Vertex, uv) as u32, Vertex::OFFSET_UV);
        assert_eq!(offset_of!(Vertex, normal) as u32, Vertex::OFFSET_NORMAL);
        assert_eq!(offset_of!(Vertex, tangent) as u32, Vertex::OFFSET_TANGENT);
    }
}
