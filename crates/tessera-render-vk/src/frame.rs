// SPDX-License-Identifier: CEPL-1.0
//! The per-frame protocol.
//!
//! One frame is `start_render`, `start_render_record`, any number of
//! `bind_material`/`record_draw`, `end_render_record`, then the submission
//! chain prepass → light cull → geometry → overlay → `present_frame`. Each
//! submission names the semaphores it waits on and returns the one it
//! signals, so callers thread the chain through explicitly.

use ash::vk;
use tessera_render::DrawList;
use tracing::{trace, warn};

use crate::context::VkRenderer;
use crate::error::{FatalError, VkContext};
use crate::lightcull::PushConstants;
use crate::material::Material;
use crate::model::{self, Model};
use crate::overlay;
use crate::passes::full_viewport;
use crate::sync::{FrameState, Stage, SyncPoint};

/// Set index materials are bound at.
const MATERIAL_SET: u32 = crate::descriptors::set::MATERIAL;

/// The shaded pass loads the prepass depth at early fragment tests, writes
/// colour and reads the visibility buffer from fragment shaders.
const GEOMETRY_WAIT_STAGES: vk::PipelineStageFlags = vk::PipelineStageFlags::from_raw(
    vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS.as_raw()
        | vk::PipelineStageFlags::FRAGMENT_SHADER.as_raw()
        | vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT.as_raw(),
);

impl VkRenderer {
    fn current_gfx_cmdbuf(&self) -> vk::CommandBuffer {
        self.sc.gfx_cmdbufs[self.image_index as usize]
    }

    /// Waits for the previous frame and acquires the next image.
    ///
    /// Returns `false` if the swapchain is out of date; the caller must
    /// rebuild before trying again. The fence is only reset once an image
    /// has actually been acquired, so a failed acquire leaves it signalled.
    pub fn start_render(&mut self) -> Result<bool, FatalError> {
        self.state.expect(FrameState::Idle);
        assert!(self.swapchain_state.is_built(), "start_render without a swapchain");
        self.wait_frame()?;

        let acquired = unsafe {
            self.swapchain_loader.acquire_next_image(
                self.sc.bundle.swapchain,
                u64::MAX,
                self.sync.image_available,
                vk::Fence::null(),
            )
        };
        let index = match acquired {
            Ok((index, _suboptimal)) => index,
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                self.needs_rebuild = true;
                return Ok(false);
            }
            Err(result) => {
                return Err(FatalError::Vk {
                    call: "vkAcquireNextImageKHR",
                    result,
                })
            }
        };

        unsafe {
            self.device
                .reset_fences(&[self.sync.fence])
                .vk_call("vkResetFences")?;
        }
        self.image_index = index;
        self.graph.clear();
        self.state.advance(FrameState::Acquired);
        trace!("frame {}: acquired image {index}", self.frame);
        Ok(true)
    }

    /// Begins the geometry and depth-prepass command buffers for the
    /// acquired image and binds the shared state both need.
    pub fn start_render_record(&mut self) -> Result<(), FatalError> {
        self.state.advance(FrameState::Recording);
        let d = &self.device;
        let extent = self.sc.bundle.extent;
        let (_, scissor) = full_viewport(extent);
        let gfx = self.current_gfx_cmdbuf();
        let pre = self.sc.prepass_cmdbuf;

        let bi = vk::CommandBufferBeginInfo {
            s_type: vk::StructureType::COMMAND_BUFFER_BEGIN_INFO,
            flags: vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT,
            ..Default::default()
        };
        unsafe {
            for cmd in [gfx, pre] {
                d.reset_command_buffer(cmd, vk::CommandBufferResetFlags::empty())
                    .vk_call("vkResetCommandBuffer")?;
                d.begin_command_buffer(cmd, &bi)
                    .vk_call("vkBeginCommandBuffer")?;
            }

            let depth_clear = [vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue {
                    depth: 1.0,
                    stencil: 0,
                },
            }];
            let rp = vk::RenderPassBeginInfo {
                s_type: vk::StructureType::RENDER_PASS_BEGIN_INFO,
                render_pass: self.sc.passes.depth_prepass,
                framebuffer: self.sc.prepass_framebuffer,
                render_area: scissor,
                clear_value_count: depth_clear.len() as u32,
                p_clear_values: depth_clear.as_ptr(),
                ..Default::default()
            };
            d.cmd_begin_render_pass(pre, &rp, vk::SubpassContents::INLINE);
            d.cmd_bind_pipeline(pre, vk::PipelineBindPoint::GRAPHICS, self.sc.depth_pipeline.handle);
            d.cmd_bind_descriptor_sets(
                pre,
                vk::PipelineBindPoint::GRAPHICS,
                self.sc.depth_pipeline.layout,
                0,
                &[self.sets.object, self.sets.camera],
                &[],
            );

            let clears = [
                vk::ClearValue {
                    color: vk::ClearColorValue {
                        float32: self.settings.clear_color,
                    },
                },
                depth_clear[0],
            ];
            let rp = vk::RenderPassBeginInfo {
                s_type: vk::StructureType::RENDER_PASS_BEGIN_INFO,
                render_pass: self.sc.passes.main,
                framebuffer: self.sc.framebuffers[self.image_index as usize],
                render_area: scissor,
                clear_value_count: clears.len() as u32,
                p_clear_values: clears.as_ptr(),
                ..Default::default()
            };
            d.cmd_begin_render_pass(gfx, &rp, vk::SubpassContents::INLINE);
            let push = PushConstants::new(extent, self.sc.grid, self.settings.debug_view);
            d.cmd_push_constants(
                gfx,
                self.sc.shaded_pipeline.layout,
                vk::ShaderStageFlags::FRAGMENT,
                0,
                bytemuck::bytes_of(&push),
            );
            d.cmd_bind_pipeline(gfx, vk::PipelineBindPoint::GRAPHICS, self.sc.shaded_pipeline.handle);
            d.cmd_bind_descriptor_sets(
                gfx,
                vk::PipelineBindPoint::GRAPHICS,
                self.sc.shaded_pipeline.layout,
                0,
                &self.sets.as_array(),
                &[],
            );
        }
        self.bind_default_material();
        Ok(())
    }

    /// Draws every mesh of `model` into both the geometry and prepass
    /// buffers.
    pub fn record_draw(&mut self, model: &Model) {
        self.state.expect(FrameState::Recording);
        let cmds = [self.current_gfx_cmdbuf(), self.sc.prepass_cmdbuf];
        unsafe { model::record_draw(&self.device, &cmds, model) };
    }

    /// Binds `material` for the draws that follow. Geometry buffer only; the
    /// prepass does not sample materials.
    pub fn bind_material(&mut self, material: &Material) {
        self.state.expect(FrameState::Recording);
        self.bind_material_set(material.set);
    }

    pub fn bind_default_material(&mut self) {
        self.state.expect(FrameState::Recording);
        let set = self
            .default_material
            .as_ref()
            .map_or(vk::DescriptorSet::null(), |m| m.set);
        self.bind_material_set(set);
    }

    fn bind_material_set(&self, set: vk::DescriptorSet) {
        assert!(set != vk::DescriptorSet::null(), "binding a destroyed material");
        unsafe {
            self.device.cmd_bind_descriptor_sets(
                self.current_gfx_cmdbuf(),
                vk::PipelineBindPoint::GRAPHICS,
                self.sc.shaded_pipeline.layout,
                MATERIAL_SET,
                &[set],
                &[],
            );
        }
    }

    pub fn end_render_record(&mut self) -> Result<(), FatalError> {
        self.state.expect(FrameState::Recording);
        let d = &self.device;
        unsafe {
            for cmd in [self.current_gfx_cmdbuf(), self.sc.prepass_cmdbuf] {
                d.cmd_end_render_pass(cmd);
                d.end_command_buffer(cmd).vk_call("vkEndCommandBuffer")?;
            }
        }
        self.state.advance(FrameState::Recorded);
        Ok(())
    }

    /// Submits `cmd` to `queue` and records the submission in the frame
    /// graph.
    #[allow(clippy::too_many_arguments)]
    unsafe fn submit(
        &mut self,
        stage: Stage,
        queue: vk::Queue,
        cmd: vk::CommandBuffer,
        waits: &[SyncPoint],
        wait_stage: vk::PipelineStageFlags,
        signal: SyncPoint,
        fence: vk::Fence,
    ) -> Result<SyncPoint, FatalError> {
        let wait_sems: Vec<_> = waits.iter().map(|&p| self.sync.get(p)).collect();
        let wait_stages = vec![wait_stage; waits.len()];
        let signal_sem = self.sync.get(signal);
        let submit = vk::SubmitInfo {
            s_type: vk::StructureType::SUBMIT_INFO,
            wait_semaphore_count: wait_sems.len() as u32,
            p_wait_semaphores: wait_sems.as_ptr(),
            p_wait_dst_stage_mask: wait_stages.as_ptr(),
            command_buffer_count: 1,
            p_command_buffers: &cmd,
            signal_semaphore_count: 1,
            p_signal_semaphores: &signal_sem,
            ..Default::default()
        };
        self.device
            .queue_submit(queue, std::slice::from_ref(&submit), fence)
            .vk_call("vkQueueSubmit")?;
        self.graph
            .record(stage, waits, &[signal], fence != vk::Fence::null());
        trace!("frame {}: submitted {stage}", self.frame);
        Ok(signal)
    }

    /// Submits the depth prepass. It depends on nothing from earlier in the
    /// frame, so `waits` must be empty.
    pub fn submit_prepass(&mut self, waits: &[SyncPoint]) -> Result<SyncPoint, FatalError> {
        assert!(waits.is_empty(), "the depth prepass waits on nothing");
        self.state.advance(FrameState::PrepassSubmitted);
        unsafe {
            self.submit(
                Stage::Prepass,
                self.queues.graphics,
                self.sc.prepass_cmdbuf,
                waits,
                vk::PipelineStageFlags::TOP_OF_PIPE,
                SyncPoint::PrepassDone,
                vk::Fence::null(),
            )
        }
    }

    /// Resubmits the culling dispatch recorded at swapchain build time.
    pub fn compute_lightcull(&mut self, waits: &[SyncPoint]) -> Result<SyncPoint, FatalError> {
        self.state.advance(FrameState::CullSubmitted);
        unsafe {
            self.submit(
                Stage::LightCull,
                self.queues.compute,
                self.sc.cull_cmdbuf,
                waits,
                vk::PipelineStageFlags::COMPUTE_SHADER,
                SyncPoint::LightCullDone,
                vk::Fence::null(),
            )
        }
    }

    /// Submits the shaded pass. Always waits on the acquired image in
    /// addition to `waits`.
    pub fn submit_geometry(&mut self, waits: &[SyncPoint]) -> Result<SyncPoint, FatalError> {
        self.state.advance(FrameState::GeometrySubmitted);
        let mut all = vec![SyncPoint::ImageAvailable];
        all.extend(waits.iter().filter(|&&p| p != SyncPoint::ImageAvailable));
        unsafe {
            self.submit(
                Stage::Geometry,
                self.queues.graphics,
                self.current_gfx_cmdbuf(),
                &all,
                GEOMETRY_WAIT_STAGES,
                SyncPoint::RenderDone,
                vk::Fence::null(),
            )
        }
    }

    /// Records and submits the overlay pass over the shaded image. This is
    /// the submission that signals the render fence.
    ///
    /// A draw list that cannot be uploaded is skipped with a warning; the
    /// pass still runs so the image reaches the present layout.
    pub fn render_imgui(&mut self, list: &DrawList, waits: &[SyncPoint]) -> Result<SyncPoint, FatalError> {
        self.state.advance(FrameState::OverlaySubmitted);
        if let Err(e) = self.overlay_geometry.upload(&self.mem, list) {
            warn!("overlay geometry not uploaded: {e}");
        }
        let idx = self.image_index as usize;
        let cmd = self.sc.overlay_cmdbufs[idx];
        unsafe {
            overlay::record(
                &self.device,
                cmd,
                &self.sc.overlay_pipeline,
                self.sc.passes.overlay,
                self.sc.overlay_framebuffers[idx],
                self.sc.bundle.extent,
                &self.overlay_geometry,
            )?;
            self.submit(
                Stage::Overlay,
                self.queues.graphics,
                cmd,
                waits,
                vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
                SyncPoint::OverlayDone,
                self.sync.fence,
            )
        }
    }

    /// Queues the acquired image for presentation after `wait`.
    ///
    /// Returns `false` when the swapchain is suboptimal or out of date; the
    /// caller must rebuild.
    pub fn present_frame(&mut self, wait: SyncPoint) -> Result<bool, FatalError> {
        self.state.expect(FrameState::OverlaySubmitted);
        self.graph.record(Stage::Present, &[wait], &[], false);
        if cfg!(debug_assertions) {
            if let Err(e) = self.graph.validate() {
                panic!("frame {} submitted out of order: {e}", self.frame);
            }
        }

        let wait_sem = self.sync.get(wait);
        let present = vk::PresentInfoKHR {
            s_type: vk::StructureType::PRESENT_INFO_KHR,
            wait_semaphore_count: 1,
            p_wait_semaphores: &wait_sem,
            swapchain_count: 1,
            p_swapchains: &self.sc.bundle.swapchain,
            p_image_indices: &self.image_index,
            ..Default::default()
        };
        let result = unsafe {
            self.swapchain_loader
                .queue_present(self.queues.present, &present)
        };
        self.state.advance(FrameState::Idle);

        match result {
            Ok(false) => {
                self.frame += 1;
                Ok(true)
            }
            Ok(true) => {
                self.frame += 1;
                self.needs_rebuild = true;
                Ok(false)
            }
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                self.needs_rebuild = true;
                Ok(false)
            }
            Err(result) => Err(FatalError::Vk {
                call: "vkQueuePresentKHR",
                result,
            }),
        }
    }

    /// One whole frame: acquire, record `draws`, the submission chain and
    /// present. Returns `false` when the swapchain must be rebuilt.
    pub fn draw_frame<'a>(
        &mut self,
        draws: impl IntoIterator<Item = (&'a Model, Option<&'a Material>)>,
        overlay: &DrawList,
    ) -> Result<bool, FatalError> {
        if !self.start_render()? {
            return Ok(false);
        }
        self.flush_uniforms()?;
        self.start_render_record()?;
        for (model, material) in draws {
            match material {
                Some(m) => self.bind_material(m),
                None => self.bind_default_material(),
            }
            self.record_draw(model);
        }
        self.end_render_record()?;

        let prepass = self.submit_prepass(&[])?;
        let culled = self.compute_lightcull(&[prepass])?;
        let shaded = self.submit_geometry(&[culled])?;
        let overlay = self.render_imgui(overlay, &[shaded])?;
        self.present_frame(overlay)
    }
}
