// SPDX-License-Identifier: CEPL-1.0
//! Overlay compositor: draws the caller's 2D draw list over the shaded image
//! in its own pass, after geometry and before present.

use ash::vk;
use bytemuck::{Pod, Zeroable};
use gpu_allocator::MemoryLocation;
use tessera_render::{DrawList, OverlayVertex};

use crate::error::{AllocError, FatalError, VkContext};
use crate::memory::{GpuBuffer, GpuMemory, MemoryRelease};
use crate::passes::full_viewport;
use crate::pipeline::{self, Pipeline};
use crate::shaders;

const MIN_CAPACITY: vk::DeviceSize = 64 * 1024;

/// Maps pixel coordinates to clip space.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct OverlayPush {
    pub scale: [f32; 2],
    pub translate: [f32; 2],
}

impl OverlayPush {
    pub fn for_extent(extent: vk::Extent2D) -> Self {
        Self {
            scale: [
                2.0 / extent.width.max(1) as f32,
                2.0 / extent.height.max(1) as f32,
            ],
            translate: [-1.0, -1.0],
        }
    }

    pub fn apply(&self, px: [f32; 2]) -> [f32; 2] {
        [
            px[0] * self.scale[0] + self.translate[0],
            px[1] * self.scale[1] + self.translate[1],
        ]
    }
}

/// The host-visible geometry buffer, reused frame to frame and grown when a
/// draw list outgrows it.
#[derive(Default)]
pub struct OverlayBuffer {
    buffer: GpuBuffer,
    index_offset: vk::DeviceSize,
    index_count: u32,
}

impl OverlayBuffer {
    /// Copies `list` in. Only call once the previous frame using the buffer
    /// has completed.
    pub fn upload(&mut self, mem: &GpuMemory, list: &DrawList) -> Result<(), AllocError> {
        self.index_count = 0;
        if list.is_empty() {
            return Ok(());
        }
        let vbytes: &[u8] = bytemuck::cast_slice(&list.vertices);
        let ibytes: &[u8] = bytemuck::cast_slice(&list.indices);
        let needed = list.byte_size() as vk::DeviceSize;
        if self.buffer.is_null() || self.buffer.size() < needed {
            self.buffer.destroy(mem);
            self.buffer = mem.create_buffer(
                "overlay geometry",
                needed.next_power_of_two().max(MIN_CAPACITY),
                vk::BufferUsageFlags::VERTEX_BUFFER | vk::BufferUsageFlags::INDEX_BUFFER,
                MemoryLocation::CpuToGpu,
            )?;
        }
        self.buffer.write_bytes(0, vbytes)?;
        self.buffer.write_bytes(vbytes.len(), ibytes)?;
        self.index_offset = vbytes.len() as vk::DeviceSize;
        self.index_count = list.indices.len() as u32;
        Ok(())
    }

    pub fn index_count(&self) -> u32 {
        self.index_count
    }

    pub fn destroy(&mut self, mem: &dyn MemoryRelease) {
        self.buffer.destroy(mem);
        self.index_count = 0;
    }
}

pub(crate) unsafe fn create_pipeline(
    device: &ash::Device,
    pass: vk::RenderPass,
    extent: vk::Extent2D,
) -> Result<Pipeline, FatalError> {
    let mut ppl = Pipeline::default();
    for (name, bytes) in [
        ("overlay.vert", shaders::OVERLAY_VERT),
        ("overlay.frag", shaders::OVERLAY_FRAG),
    ] {
        match pipeline::create_shader_module(device, name, bytes) {
            Ok(m) => ppl.shaders.push(m),
            Err(e) => {
                ppl.destroy(device);
                return Err(e);
            }
        }
    }
    let pcr = vk::PushConstantRange {
        stage_flags: vk::ShaderStageFlags::VERTEX,
        offset: 0,
        size: std::mem::size_of::<OverlayPush>() as u32,
    };
    ppl.layout = match pipeline::create_layout(device, &[], std::slice::from_ref(&pcr)) {
        Ok(l) => l,
        Err(e) => {
            ppl.destroy(device);
            return Err(e);
        }
    };

    let binding = vk::VertexInputBindingDescription {
        binding: 0,
        stride: std::mem::size_of::<OverlayVertex>() as u32,
        input_rate: vk::VertexInputRate::VERTEX,
    };
    let attrs = [
        (0, vk::Format::R32G32_SFLOAT, OverlayVertex::OFFSET_POS),
        (1, vk::Format::R32G32_SFLOAT, OverlayVertex::OFFSET_UV),
        (2, vk::Format::R32G32B32A32_SFLOAT, OverlayVertex::OFFSET_COLOUR),
    ]
    .map(|(location, format, offset)| vk::VertexInputAttributeDescription {
        location,
        binding: 0,
        format,
        offset,
    });
    let vertex_input = vk::PipelineVertexInputStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_VERTEX_INPUT_STATE_CREATE_INFO,
        vertex_binding_description_count: 1,
        p_vertex_binding_descriptions: &binding,
        vertex_attribute_description_count: attrs.len() as u32,
        p_vertex_attribute_descriptions: attrs.as_ptr(),
        ..Default::default()
    };
    let input_assembly = vk::PipelineInputAssemblyStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_INPUT_ASSEMBLY_STATE_CREATE_INFO,
        topology: vk::PrimitiveTopology::TRIANGLE_LIST,
        ..Default::default()
    };
    let (viewport, scissor) = full_viewport(extent);
    let viewport_state = vk::PipelineViewportStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_VIEWPORT_STATE_CREATE_INFO,
        viewport_count: 1,
        p_viewports: &viewport,
        scissor_count: 1,
        p_scissors: &scissor,
        ..Default::default()
    };
    let raster = vk::PipelineRasterizationStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_RASTERIZATION_STATE_CREATE_INFO,
        polygon_mode: vk::PolygonMode::FILL,
        cull_mode: vk::CullModeFlags::NONE,
        front_face: vk::FrontFace::COUNTER_CLOCKWISE,
        line_width: 1.0,
        ..Default::default()
    };
    let multisample = vk::PipelineMultisampleStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_MULTISAMPLE_STATE_CREATE_INFO,
        rasterization_samples: vk::SampleCountFlags::TYPE_1,
        ..Default::default()
    };
    let blend_attachment = vk::PipelineColorBlendAttachmentState {
        blend_enable: vk::TRUE,
        src_color_blend_factor: vk::BlendFactor::SRC_ALPHA,
        dst_color_blend_factor: vk::BlendFactor::ONE_MINUS_SRC_ALPHA,
        color_blend_op: vk::BlendOp::ADD,
        src_alpha_blend_factor: vk::BlendFactor::ONE,
        dst_alpha_blend_factor: vk::BlendFactor::ONE_MINUS_SRC_ALPHA,
        alpha_blend_op: vk::BlendOp::ADD,
        color_write_mask: vk::ColorComponentFlags::RGBA,
    };
    let blend = vk::PipelineColorBlendStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_COLOR_BLEND_STATE_CREATE_INFO,
        attachment_count: 1,
        p_attachments: &blend_attachment,
        ..Default::default()
    };
    let stages = [
        (vk::ShaderStageFlags::VERTEX, ppl.shaders[0]),
        (vk::ShaderStageFlags::FRAGMENT, ppl.shaders[1]),
    ]
    .map(|(stage, module)| vk::PipelineShaderStageCreateInfo {
        s_type: vk::StructureType::PIPELINE_SHADER_STAGE_CREATE_INFO,
        stage,
        module,
        p_name: c"main".as_ptr(),
        ..Default::default()
    });

    let ci = vk::GraphicsPipelineCreateInfo {
        s_type: vk::StructureType::GRAPHICS_PIPELINE_CREATE_INFO,
        stage_count: stages.len() as u32,
        p_stages: stages.as_ptr(),
        p_vertex_input_state: &vertex_input,
        p_input_assembly_state: &input_assembly,
        p_viewport_state: &viewport_state,
        p_rasterization_state: &raster,
        p_multisample_state: &multisample,
        p_color_blend_state: &blend,
        layout: ppl.layout,
        render_pass: pass,
        subpass: 0,
        base_pipeline_index: -1,
        ..Default::default()
    };
    match device.create_graphics_pipelines(vk::PipelineCache::null(), &[ci], None) {
        Ok(p) => {
            ppl.handle = p[0];
            Ok(ppl)
        }
        Err((_, result)) => {
            ppl.destroy(device);
            Err(FatalError::Pipeline {
                what: "overlay",
                result,
            })
        }
    }
}

/// Records the overlay pass into `cmd`. An empty buffer still runs the pass
/// so the image reaches `PRESENT_SRC_KHR`.
pub(crate) unsafe fn record(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    ppl: &Pipeline,
    pass: vk::RenderPass,
    framebuffer: vk::Framebuffer,
    extent: vk::Extent2D,
    geometry: &OverlayBuffer,
) -> Result<(), FatalError> {
    device
        .reset_command_buffer(cmd, vk::CommandBufferResetFlags::empty())
        .vk_call("vkResetCommandBuffer (overlay)")?;
    let bi = vk::CommandBufferBeginInfo {
        s_type: vk::StructureType::COMMAND_BUFFER_BEGIN_INFO,
        flags: vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT,
        ..Default::default()
    };
    device
        .begin_command_buffer(cmd, &bi)
        .vk_call("vkBeginCommandBuffer (overlay)")?;

    let rp = vk::RenderPassBeginInfo {
        s_type: vk::StructureType::RENDER_PASS_BEGIN_INFO,
        render_pass: pass,
        framebuffer,
        render_area: full_viewport(extent).1,
        ..Default::default()
    };
    device.cmd_begin_render_pass(cmd, &rp, vk::SubpassContents::INLINE);
    if geometry.index_count > 0 {
        let push = OverlayPush::for_extent(extent);
        device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, ppl.handle);
        device.cmd_push_constants(
            cmd,
            ppl.layout,
            vk::ShaderStageFlags::VERTEX,
            0,
            bytemuck::bytes_of(&push),
        );
        let buf = geometry.buffer.handle();
        device.cmd_bind_vertex_buffers(cmd, 0, &[buf], &[0]);
        device.cmd_bind_index_buffer(cmd, buf, geometry.index_offset, vk::IndexType::UINT32);
        device.cmd_draw_indexed(cmd, geometry.index_count, 1, 0, 0, 0);
    }
    device.cmd_end_render_pass(cmd);

    device
        .end_command_buffer(cmd)
        .vk_call("vkEndCommandBuffer (overlay)")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn corners_map_to_clip_space() {
        let push = OverlayPush::for_extent(vk::Extent2D {
            width: 800,
            height: 600,
        });
        assert_eq!(push.apply([0.0, 0.0]), [-1.0, -1.0]);
        assert_eq!(push.apply([800.0, 600.0]), [1.0, 1.0]);
        assert_eq!(push.apply([400.0, 300.0]), [0.0, 0.0]);
    }

    #[test]
    fn push_block_is_two_vec2() {
        assert_eq!(std::mem::size_of::<OverlayPush>(), 16);
    }

    #[test]
    fn fresh_buffer_draws_nothing() {
        assert_eq!(OverlayBuffer::default().index_count(), 0);
    }
}
