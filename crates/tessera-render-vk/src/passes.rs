// SPDX-License-Identifier: CEPL-1.0
//! Render passes, framebuffers and graphics pipelines for one swapchain
//! build.
//!
//! Depth image layouts across a frame:
//! - prepass: `DEPTH_STENCIL_ATTACHMENT` → `DEPTH_STENCIL_READ_ONLY`
//! - culling samples it read-only
//! - main pass: `DEPTH_STENCIL_READ_ONLY` → `DEPTH_STENCIL_ATTACHMENT`
//!
//! Colour goes `UNDEFINED` → `COLOR_ATTACHMENT` in the main pass and on to
//! `PRESENT_SRC` in the overlay pass, which loads it.

use ash::vk;
use tessera_render::Vertex;

use crate::error::{FatalError, VkContext};
use crate::lightcull::PushConstants;
use crate::pipeline::{self, Pipeline};
use crate::shaders;

#[derive(Default)]
pub(crate) struct RenderPasses {
    pub depth_prepass: vk::RenderPass,
    pub main: vk::RenderPass,
    pub overlay: vk::RenderPass,
}

impl RenderPasses {
    pub unsafe fn destroy(&mut self, device: &ash::Device) {
        for rp in [self.depth_prepass, self.main, self.overlay] {
            if rp != vk::RenderPass::null() {
                device.destroy_render_pass(rp, None);
            }
        }
        *self = Self::default();
    }
}

fn subpass_dependency(
    stages: vk::PipelineStageFlags,
    dst_access: vk::AccessFlags,
) -> vk::SubpassDependency {
    vk::SubpassDependency {
        src_subpass: vk::SUBPASS_EXTERNAL,
        dst_subpass: 0,
        src_stage_mask: stages,
        dst_stage_mask: stages,
        src_access_mask: vk::AccessFlags::empty(),
        dst_access_mask: dst_access,
        ..Default::default()
    }
}

unsafe fn create_pass(
    device: &ash::Device,
    attachments: &[vk::AttachmentDescription],
    colour: Option<&vk::AttachmentReference>,
    depth: Option<&vk::AttachmentReference>,
    dependency: vk::SubpassDependency,
    what: &'static str,
) -> Result<vk::RenderPass, FatalError> {
    let subpass = vk::SubpassDescription {
        pipeline_bind_point: vk::PipelineBindPoint::GRAPHICS,
        color_attachment_count: colour.is_some() as u32,
        p_color_attachments: colour.map_or(std::ptr::null(), |c| c as *const _),
        p_depth_stencil_attachment: depth.map_or(std::ptr::null(), |d| d as *const _),
        ..Default::default()
    };
    let ci = vk::RenderPassCreateInfo {
        s_type: vk::StructureType::RENDER_PASS_CREATE_INFO,
        attachment_count: attachments.len() as u32,
        p_attachments: attachments.as_ptr(),
        subpass_count: 1,
        p_subpasses: &subpass,
        dependency_count: 1,
        p_dependencies: &dependency,
        ..Default::default()
    };
    device.create_render_pass(&ci, None).vk_call(what)
}

pub(crate) unsafe fn create_passes(
    device: &ash::Device,
    colour_format: vk::Format,
    depth_format: vk::Format,
) -> Result<RenderPasses, FatalError> {
    let mut passes = RenderPasses::default();
    let result = (|| -> Result<(), FatalError> {
        let depth_stages = vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS
            | vk::PipelineStageFlags::LATE_FRAGMENT_TESTS;
        let colour_stage = vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT;
        let colour_rw =
            vk::AccessFlags::COLOR_ATTACHMENT_READ | vk::AccessFlags::COLOR_ATTACHMENT_WRITE;

        let prepass_depth = vk::AttachmentDescription {
            format: depth_format,
            samples: vk::SampleCountFlags::TYPE_1,
            load_op: vk::AttachmentLoadOp::CLEAR,
            store_op: vk::AttachmentStoreOp::STORE,
            stencil_load_op: vk::AttachmentLoadOp::DONT_CARE,
            stencil_store_op: vk::AttachmentStoreOp::DONT_CARE,
            initial_layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
            final_layout: vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL,
            ..Default::default()
        };
        let depth_ref = vk::AttachmentReference {
            attachment: 0,
            layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        };
        passes.depth_prepass = create_pass(
            device,
            &[prepass_depth],
            None,
            Some(&depth_ref),
            subpass_dependency(depth_stages, vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE),
            "vkCreateRenderPass (depth prepass)",
        )?;

        let main_colour = vk::AttachmentDescription {
            format: colour_format,
            samples: vk::SampleCountFlags::TYPE_1,
            load_op: vk::AttachmentLoadOp::CLEAR,
            store_op: vk::AttachmentStoreOp::STORE,
            stencil_load_op: vk::AttachmentLoadOp::DONT_CARE,
            stencil_store_op: vk::AttachmentStoreOp::DONT_CARE,
            initial_layout: vk::ImageLayout::UNDEFINED,
            final_layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            ..Default::default()
        };
        let main_depth = vk::AttachmentDescription {
            format: depth_format,
            samples: vk::SampleCountFlags::TYPE_1,
            load_op: vk::AttachmentLoadOp::LOAD,
            store_op: vk::AttachmentStoreOp::DONT_CARE,
            stencil_load_op: vk::AttachmentLoadOp::DONT_CARE,
            stencil_store_op: vk::AttachmentStoreOp::DONT_CARE,
            initial_layout: vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL,
            final_layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
            ..Default::default()
        };
        let colour_ref = vk::AttachmentReference {
            attachment: 0,
            layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        };
        let depth_ro_ref = vk::AttachmentReference {
            attachment: 1,
            layout: vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL,
        };
        passes.main = create_pass(
            device,
            &[main_colour, main_depth],
            Some(&colour_ref),
            Some(&depth_ro_ref),
            subpass_dependency(colour_stage, colour_rw),
            "vkCreateRenderPass (main)",
        )?;

        let overlay_colour = vk::AttachmentDescription {
            load_op: vk::AttachmentLoadOp::LOAD,
            initial_layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            final_layout: vk::ImageLayout::PRESENT_SRC_KHR,
            ..main_colour
        };
        passes.overlay = create_pass(
            device,
            &[overlay_colour],
            Some(&colour_ref),
            None,
            subpass_dependency(colour_stage, colour_rw),
            "vkCreateRenderPass (overlay)",
        )?;
        Ok(())
    })();

    match result {
        Ok(()) => Ok(passes),
        Err(e) => {
            passes.destroy(device);
            Err(e)
        }
    }
}

pub(crate) unsafe fn create_framebuffer(
    device: &ash::Device,
    pass: vk::RenderPass,
    attachments: &[vk::ImageView],
    extent: vk::Extent2D,
) -> Result<vk::Framebuffer, FatalError> {
    let ci = vk::FramebufferCreateInfo {
        s_type: vk::StructureType::FRAMEBUFFER_CREATE_INFO,
        render_pass: pass,
        attachment_count: attachments.len() as u32,
        p_attachments: attachments.as_ptr(),
        width: extent.width,
        height: extent.height,
        layers: 1,
        ..Default::default()
    };
    device
        .create_framebuffer(&ci, None)
        .vk_call("vkCreateFramebuffer")
}

pub(crate) fn full_viewport(extent: vk::Extent2D) -> (vk::Viewport, vk::Rect2D) {
    (
        vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: extent.width as f32,
            height: extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        },
        vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent,
        },
    )
}

/// Vertex attributes in shader location order.
pub(crate) fn vertex_attributes() -> [vk::VertexInputAttributeDescription; 5] {
    let attr = |location, format, offset| vk::VertexInputAttributeDescription {
        location,
        binding: 0,
        format,
        offset,
    };
    [
        attr(0, vk::Format::R32G32B32_SFLOAT, Vertex::OFFSET_POS),
        attr(1, vk::Format::R32G32B32_SFLOAT, Vertex::OFFSET_COLOUR),
        attr(2, vk::Format::R32G32_SFLOAT, Vertex::OFFSET_UV),
        attr(3, vk::Format::R32G32B32_SFLOAT, Vertex::OFFSET_NORMAL),
        attr(4, vk::Format::R32G32B32_SFLOAT, Vertex::OFFSET_TANGENT),
    ]
}

/// Fixed-function state shared by the depth and shaded pipelines.
struct SharedState {
    input_assembly: vk::PipelineInputAssemblyStateCreateInfo<'static>,
    raster: vk::PipelineRasterizationStateCreateInfo<'static>,
    multisample: vk::PipelineMultisampleStateCreateInfo<'static>,
    viewport: vk::Viewport,
    scissor: vk::Rect2D,
}

impl SharedState {
    fn new(extent: vk::Extent2D) -> Self {
        let (viewport, scissor) = full_viewport(extent);
        Self {
            input_assembly: vk::PipelineInputAssemblyStateCreateInfo {
                s_type: vk::StructureType::PIPELINE_INPUT_ASSEMBLY_STATE_CREATE_INFO,
                topology: vk::PrimitiveTopology::TRIANGLE_LIST,
                ..Default::default()
            },
            raster: vk::PipelineRasterizationStateCreateInfo {
                s_type: vk::StructureType::PIPELINE_RASTERIZATION_STATE_CREATE_INFO,
                polygon_mode: vk::PolygonMode::FILL,
                cull_mode: vk::CullModeFlags::BACK,
                // Projection flips y, so counter-clockwise stays front-facing.
                front_face: vk::FrontFace::COUNTER_CLOCKWISE,
                line_width: 1.0,
                ..Default::default()
            },
            multisample: vk::PipelineMultisampleStateCreateInfo {
                s_type: vk::StructureType::PIPELINE_MULTISAMPLE_STATE_CREATE_INFO,
                rasterization_samples: vk::SampleCountFlags::TYPE_1,
                min_sample_shading: 1.0,
                ..Default::default()
            },
            viewport,
            scissor,
        }
    }
}

unsafe fn build_graphics(
    device: &ash::Device,
    what: &'static str,
    mut ppl: Pipeline,
    ci: &vk::GraphicsPipelineCreateInfo,
) -> Result<Pipeline, FatalError> {
    match device.create_graphics_pipelines(vk::PipelineCache::null(), std::slice::from_ref(ci), None) {
        Ok(p) => {
            ppl.handle = p[0];
            Ok(ppl)
        }
        Err((_, result)) => {
            ppl.destroy(device);
            Err(FatalError::Pipeline { what, result })
        }
    }
}

/// Depth-only pipeline over `[object, camera]`.
pub(crate) unsafe fn create_depth_pipeline(
    device: &ash::Device,
    pass: vk::RenderPass,
    extent: vk::Extent2D,
    set_layouts: [vk::DescriptorSetLayout; 2],
) -> Result<Pipeline, FatalError> {
    let module = pipeline::create_shader_module(device, "depth.vert", shaders::DEPTH_VERT)?;
    let mut ppl = Pipeline {
        shaders: vec![module],
        ..Default::default()
    };
    ppl.layout = match pipeline::create_layout(device, &set_layouts, &[]) {
        Ok(l) => l,
        Err(e) => {
            ppl.destroy(device);
            return Err(e);
        }
    };

    let shared = SharedState::new(extent);
    let binding = vk::VertexInputBindingDescription {
        binding: 0,
        stride: std::mem::size_of::<Vertex>() as u32,
        input_rate: vk::VertexInputRate::VERTEX,
    };
    let pos = vertex_attributes()[0];
    let vertex_input = vk::PipelineVertexInputStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_VERTEX_INPUT_STATE_CREATE_INFO,
        vertex_binding_description_count: 1,
        p_vertex_binding_descriptions: &binding,
        vertex_attribute_description_count: 1,
        p_vertex_attribute_descriptions: &pos,
        ..Default::default()
    };
    let viewport_state = vk::PipelineViewportStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_VIEWPORT_STATE_CREATE_INFO,
        viewport_count: 1,
        p_viewports: &shared.viewport,
        scissor_count: 1,
        p_scissors: &shared.scissor,
        ..Default::default()
    };
    let depth_stencil = vk::PipelineDepthStencilStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_DEPTH_STENCIL_STATE_CREATE_INFO,
        depth_test_enable: vk::TRUE,
        depth_write_enable: vk::TRUE,
        depth_compare_op: vk::CompareOp::LESS,
        max_depth_bounds: 1.0,
        ..Default::default()
    };
    let stage = vk::PipelineShaderStageCreateInfo {
        s_type: vk::StructureType::PIPELINE_SHADER_STAGE_CREATE_INFO,
        stage: vk::ShaderStageFlags::VERTEX,
        module,
        p_name: c"main".as_ptr(),
        ..Default::default()
    };

    let ci = vk::GraphicsPipelineCreateInfo {
        s_type: vk::StructureType::GRAPHICS_PIPELINE_CREATE_INFO,
        stage_count: 1,
        p_stages: &stage,
        p_vertex_input_state: &vertex_input,
        p_input_assembly_state: &shared.input_assembly,
        p_viewport_state: &viewport_state,
        p_rasterization_state: &shared.raster,
        p_multisample_state: &shared.multisample,
        p_depth_stencil_state: &depth_stencil,
        layout: ppl.layout,
        render_pass: pass,
        subpass: 0,
        base_pipeline_index: -1,
        ..Default::default()
    };
    build_graphics(device, "depth prepass", ppl, &ci)
}

/// Forward-shaded pipeline over `[object, camera, light cull, intermediate,
/// material]` with fragment push constants. Depth is tested against the
/// prepass result and not written.
pub(crate) unsafe fn create_shaded_pipeline(
    device: &ash::Device,
    pass: vk::RenderPass,
    extent: vk::Extent2D,
    set_layouts: [vk::DescriptorSetLayout; 5],
) -> Result<Pipeline, FatalError> {
    let mut ppl = Pipeline::default();
    for (name, bytes) in [
        ("fwdplus.vert", shaders::FWDPLUS_VERT),
        ("fwdplus.frag", shaders::FWDPLUS_FRAG),
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
        stage_flags: vk::ShaderStageFlags::FRAGMENT,
        offset: 0,
        size: PushConstants::SIZE,
    };
    ppl.layout = match pipeline::create_layout(device, &set_layouts, std::slice::from_ref(&pcr)) {
        Ok(l) => l,
        Err(e) => {
            ppl.destroy(device);
            return Err(e);
        }
    };

    let shared = SharedState::new(extent);
    let binding = vk::VertexInputBindingDescription {
        binding: 0,
        stride: std::mem::size_of::<Vertex>() as u32,
        input_rate: vk::VertexInputRate::VERTEX,
    };
    let attrs = vertex_attributes();
    let vertex_input = vk::PipelineVertexInputStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_VERTEX_INPUT_STATE_CREATE_INFO,
        vertex_binding_description_count: 1,
        p_vertex_binding_descriptions: &binding,
        vertex_attribute_description_count: attrs.len() as u32,
        p_vertex_attribute_descriptions: attrs.as_ptr(),
        ..Default::default()
    };
    let viewport_state = vk::PipelineViewportStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_VIEWPORT_STATE_CREATE_INFO,
        viewport_count: 1,
        p_viewports: &shared.viewport,
        scissor_count: 1,
        p_scissors: &shared.scissor,
        ..Default::default()
    };
    let depth_stencil = vk::PipelineDepthStencilStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_DEPTH_STENCIL_STATE_CREATE_INFO,
        depth_test_enable: vk::TRUE,
        depth_write_enable: vk::FALSE,
        depth_compare_op: vk::CompareOp::LESS_OR_EQUAL,
        max_depth_bounds: 1.0,
        ..Default::default()
    };
    let blend_attachment = vk::PipelineColorBlendAttachmentState {
        blend_enable: vk::TRUE,
        src_color_blend_factor: vk::BlendFactor::SRC_ALPHA,
        dst_color_blend_factor: vk::BlendFactor::ONE_MINUS_SRC_ALPHA,
        color_blend_op: vk::BlendOp::ADD,
        src_alpha_blend_factor: vk::BlendFactor::ONE,
        dst_alpha_blend_factor: vk::BlendFactor::ZERO,
        alpha_blend_op: vk::BlendOp::ADD,
        color_write_mask: vk::ColorComponentFlags::RGBA,
    };
    let blend = vk::PipelineColorBlendStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_COLOR_BLEND_STATE_CREATE_INFO,
        logic_op: vk::LogicOp::COPY,
        attachment_count: 1,
        p_attachments: &blend_attachment,
        ..Default::default()
    };
    let stages = [
        vk::PipelineShaderStageCreateInfo {
            s_type: vk::StructureType::PIPELINE_SHADER_STAGE_CREATE_INFO,
            stage: vk::ShaderStageFlags::VERTEX,
            module: ppl.shaders[0],
            p_name: c"main".as_ptr(),
            ..Default::default()
        },
        vk::PipelineShaderStageCreateInfo {
            s_type: vk::StructureType::PIPELINE_SHADER_STAGE_CREATE_INFO,
            stage: vk::ShaderStageFlags::FRAGMENT,
            module: ppl.shaders[1],
            p_name: c"main".as_ptr(),
            ..Default::default()
        },
    ];

    let ci = vk::GraphicsPipelineCreateInfo {
        s_type: vk::StructureType::GRAPHICS_PIPELINE_CREATE_INFO,
        stage_count: stages.len() as u32,
        p_stages: stages.as_ptr(),
        p_vertex_input_state: &vertex_input,
        p_input_assembly_state: &shared.input_assembly,
        p_viewport_state: &viewport_state,
        p_rasterization_state: &shared.raster,
        p_multisample_state: &shared.multisample,
        p_depth_stencil_state: &depth_stencil,
        p_color_blend_state: &blend,
        layout: ppl.layout,
        render_pass: pass,
        subpass: 0,
        base_pipeline_index: -1,
        ..Default::default()
    };
    build_graphics(device, "render", ppl, &ci)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attributes_cover_every_vertex_field_in_order() {
        let attrs = vertex_attributes();
        let offsets: Vec<u32> = attrs.iter().map(|a| a.offset).collect();
        assert_eq!(offsets, [0, 12, 24, 32, 44]);
        assert!(attrs.iter().enumerate().all(|(i, a)| a.location == i as u32));
        assert_eq!(attrs[2].format, vk::Format::R32G32_SFLOAT);
        let last = attrs[4].offset as usize + 12;
        assert_eq!(last, std::mem::size_of::<Vertex>());
    }

    #[test]
    fn viewport_spans_extent() {
        let (vp, sc) = full_viewport(vk::Extent2D {
            width: 800,
            height: 600,
        });
        assert_eq!((vp.width, vp.height), (800.0, 600.0));
        assert_eq!(sc.extent.width, 800);
        assert_eq!(vp.max_depth, 1.0);
    }
}
