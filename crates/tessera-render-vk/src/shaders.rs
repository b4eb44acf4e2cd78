// SPDX-License-Identifier: CEPL-1.0
//! SPIR-V compiled by build.rs.

macro_rules! spirv {
    ($name:literal) => {
        include_bytes!(concat!(env!("OUT_DIR"), "/", $name, ".spv"))
    };
}

pub const DEPTH_VERT: &[u8] = spirv!("depth.vert");
pub const FWDPLUS_VERT: &[u8] = spirv!("fwdplus.vert");
pub const FWDPLUS_FRAG: &[u8] = spirv!("fwdplus.frag");
pub const LIGHTCULL_COMP: &[u8] = spirv!("lightcull.comp");
pub const OVERLAY_VERT: &[u8] = spirv!("overlay.vert");
pub const OVERLAY_FRAG: &[u8] = spirv!("overlay.frag");
