// SPDX-License-Identifier: CEPL-1.0
//! Screen-space tile light culling.
//!
//! The screen is split into `TILE_SIZE`² pixel tiles. One compute workgroup
//! per tile writes `[count, index0, index1, ...]` into its `TILE_BUFFER_SIZE`
//! byte slot of the light-visibility storage buffer, which the shading pass
//! then reads. The dispatch is recorded once per swapchain build and
//! resubmitted unchanged every frame.

use ash::vk;
use bytemuck::{Pod, Zeroable};
use tessera_math::{tile_grid, UVec2};

use crate::error::{FatalError, VkContext};
use crate::memory::BufferRef;
use crate::pipeline::{self, Pipeline};
use crate::shaders;

pub const TILE_SIZE: u32 = 16;
pub const MAX_LIGHTS_PER_TILE: u32 = 1023;
/// Bytes per tile: the count followed by the index list.
pub const TILE_BUFFER_SIZE: vk::DeviceSize =
    (1 + MAX_LIGHTS_PER_TILE as vk::DeviceSize) * std::mem::size_of::<u32>() as vk::DeviceSize;

/// Push constants shared by the culling and shading stages.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct PushConstants {
    pub viewport_size: [u32; 2],
    pub tile_nums: [u32; 2],
    pub debugview_index: i32,
}

impl PushConstants {
    pub const SIZE: u32 = std::mem::size_of::<Self>() as u32;

    pub fn new(extent: vk::Extent2D, grid: TileGrid, debugview_index: i32) -> Self {
        Self {
            viewport_size: [extent.width, extent.height],
            tile_nums: grid.tiles.to_array(),
            debugview_index,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TileGrid {
    pub tiles: UVec2,
}

impl TileGrid {
    pub fn for_extent(extent: vk::Extent2D) -> Self {
        Self {
            tiles: tile_grid(extent.width, extent.height, TILE_SIZE),
        }
    }

    pub fn tile_count(&self) -> u32 {
        self.tiles.x * self.tiles.y
    }

    /// Size of the light-visibility buffer for this grid.
    pub fn buffer_size(&self) -> vk::DeviceSize {
        TILE_BUFFER_SIZE * self.tile_count() as vk::DeviceSize
    }
}

/// Hands the visibility buffer from last frame's fragment reads to this
/// frame's compute writes.
pub fn visibility_barrier(lightvis: BufferRef) -> vk::BufferMemoryBarrier<'static> {
    vk::BufferMemoryBarrier {
        s_type: vk::StructureType::BUFFER_MEMORY_BARRIER,
        src_access_mask: vk::AccessFlags::SHADER_READ,
        dst_access_mask: vk::AccessFlags::SHADER_WRITE,
        src_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
        dst_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
        buffer: lightvis.buffer,
        offset: 0,
        size: lightvis.size,
        ..Default::default()
    }
}

pub const BARRIER_SRC_STAGE: vk::PipelineStageFlags = vk::PipelineStageFlags::FRAGMENT_SHADER;
pub const BARRIER_DST_STAGE: vk::PipelineStageFlags = vk::PipelineStageFlags::COMPUTE_SHADER;

/// Set layouts in compute-pipeline order: light-cull, camera, intermediate.
pub(crate) unsafe fn create_pipeline(
    device: &ash::Device,
    set_layouts: [vk::DescriptorSetLayout; 3],
) -> Result<Pipeline, FatalError> {
    let module = pipeline::create_shader_module(device, "lightcull.comp", shaders::LIGHTCULL_COMP)?;
    let pcr = vk::PushConstantRange {
        stage_flags: vk::ShaderStageFlags::COMPUTE,
        offset: 0,
        size: PushConstants::SIZE,
    };
    let layout = match pipeline::create_layout(device, &set_layouts, std::slice::from_ref(&pcr)) {
        Ok(l) => l,
        Err(e) => {
            device.destroy_shader_module(module, None);
            return Err(e);
        }
    };

    let stage = vk::PipelineShaderStageCreateInfo {
        s_type: vk::StructureType::PIPELINE_SHADER_STAGE_CREATE_INFO,
        stage: vk::ShaderStageFlags::COMPUTE,
        module,
        p_name: c"main".as_ptr(),
        ..Default::default()
    };
    let ci = vk::ComputePipelineCreateInfo {
        s_type: vk::StructureType::COMPUTE_PIPELINE_CREATE_INFO,
        stage,
        layout,
        base_pipeline_index: -1,
        ..Default::default()
    };

    let mut ppl = Pipeline {
        handle: vk::Pipeline::null(),
        layout,
        shaders: vec![module],
    };
    match device.create_compute_pipelines(vk::PipelineCache::null(), &[ci], None) {
        Ok(p) => {
            ppl.handle = p[0];
            Ok(ppl)
        }
        Err((_, result)) => {
            ppl.destroy(device);
            Err(FatalError::Pipeline {
                what: "light culling compute",
                result,
            })
        }
    }
}

/// Records the reusable culling dispatch into `cmd`.
///
/// `sets` is `[light_cull, camera, intermediate]`.
pub(crate) unsafe fn record_dispatch(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    ppl: &Pipeline,
    sets: [vk::DescriptorSet; 3],
    lightvis: BufferRef,
    push: PushConstants,
    grid: TileGrid,
) -> Result<(), FatalError> {
    let bi = vk::CommandBufferBeginInfo {
        s_type: vk::StructureType::COMMAND_BUFFER_BEGIN_INFO,
        flags: vk::CommandBufferUsageFlags::SIMULTANEOUS_USE,
        ..Default::default()
    };
    device
        .begin_command_buffer(cmd, &bi)
        .vk_call("vkBeginCommandBuffer (light cull)")?;

    let barrier = visibility_barrier(lightvis);
    device.cmd_pipeline_barrier(
        cmd,
        BARRIER_SRC_STAGE,
        BARRIER_DST_STAGE,
        vk::DependencyFlags::empty(),
        &[],
        std::slice::from_ref(&barrier),
        &[],
    );
    device.cmd_bind_descriptor_sets(
        cmd,
        vk::PipelineBindPoint::COMPUTE,
        ppl.layout,
        0,
        &sets,
        &[],
    );
    device.cmd_push_constants(
        cmd,
        ppl.layout,
        vk::ShaderStageFlags::COMPUTE,
        0,
        bytemuck::bytes_of(&push),
    );
    device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::COMPUTE, ppl.handle);
    device.cmd_dispatch(cmd, grid.tiles.x, grid.tiles.y, 1);

    device
        .end_command_buffer(cmd)
        .vk_call("vkEndCommandBuffer (light cull)")
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    fn extent(width: u32, height: u32) -> vk::Extent2D {
        vk::Extent2D { width, height }
    }

    #[test]
    fn grid_is_ceiling_division() {
        assert_eq!(TileGrid::for_extent(extent(1920, 1080)).tiles, UVec2::new(120, 68));
        assert_eq!(TileGrid::for_extent(extent(17, 17)).tiles, UVec2::new(2, 2));
        assert_eq!(TileGrid::for_extent(extent(800, 600)).tiles, UVec2::new(50, 38));
        assert_eq!(TileGrid::for_extent(extent(16, 16)).tiles, UVec2::new(1, 1));
    }

    #[test]
    fn visibility_buffer_holds_count_plus_indices_per_tile() {
        assert_eq!(TILE_BUFFER_SIZE, 4096);
        let grid = TileGrid::for_extent(extent(800, 600));
        assert_eq!(grid.buffer_size(), 4096 * 50 * 38);
    }

    #[test]
    fn barrier_upgrades_read_to_write() {
        let buf = BufferRef {
            buffer: vk::Buffer::from_raw(9),
            size: 4096,
        };
        let b = visibility_barrier(buf);
        assert_eq!(b.src_access_mask, vk::AccessFlags::SHADER_READ);
        assert_eq!(b.dst_access_mask, vk::AccessFlags::SHADER_WRITE);
        assert_eq!(b.buffer, buf.buffer);
        assert_eq!(b.size, 4096);
        assert_eq!(BARRIER_SRC_STAGE, vk::PipelineStageFlags::FRAGMENT_SHADER);
        assert_eq!(BARRIER_DST_STAGE, vk::PipelineStageFlags::COMPUTE_SHADER);
    }

    #[test]
    fn push_constants_match_shader_block() {
        assert_eq!(PushConstants::SIZE, 20);
        let grid = TileGrid::for_extent(extent(800, 600));
        let pc = PushConstants::new(extent(800, 600), grid, 2);
        assert_eq!(pc.tile_nums, [50, 38]);
        assert_eq!(pc.viewport_size, [800, 600]);
    }
}
