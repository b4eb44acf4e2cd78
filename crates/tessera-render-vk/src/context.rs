// SPDX-License-Identifier: CEPL-1.0
//! The device context: every device-level and swapchain-level object the
//! renderer owns, how the swapchain-dependent set is built and rebuilt, and
//! teardown.

use std::path::Path;
use std::sync::Arc;

use ash::khr::{surface, swapchain};
use ash::{vk, Entry, Instance};
use gpu_allocator::MemoryLocation;
use raw_window_handle::{RawDisplayHandle, RawWindowHandle};
use tessera_render::{
    AssetLoader, Camera, CameraUniform, DrawableSurface, MeshData, ObjectUniform, PointLight,
    PointLightBlock, RenderSettings,
};
use tracing::{debug, info, warn};

use crate::command::OneTimeSubmit;
use crate::descriptors::{self, SetLayouts};
use crate::device::{self, DebugNames, DebugState, QueueFamilies, Queues};
use crate::diag::{self, DiagTopic};
use crate::error::{FatalError, VkContext};
use crate::layout;
use crate::lightcull::{self, PushConstants, TileGrid};
use crate::material::{self, Material, MaterialDeps};
use crate::memory::{GpuBuffer, GpuImage, GpuMemory};
use crate::model::{self, Model};
use crate::overlay::{self, OverlayBuffer};
use crate::passes::{self, RenderPasses};
use crate::pipeline::Pipeline;
use crate::swapchain::{create_swapchain, SwapchainBundle};
use crate::sync::{FrameGraph, FrameState, SwapchainState, SyncPoint};
use crate::uniform::UniformBlock;

/// The fence and semaphores of the frame chain.
#[derive(Default)]
pub(crate) struct FrameSync {
    pub fence: vk::Fence,
    pub image_available: vk::Semaphore,
    pub prepass_done: vk::Semaphore,
    pub lightcull_done: vk::Semaphore,
    pub render_done: vk::Semaphore,
    pub overlay_done: vk::Semaphore,
}

impl FrameSync {
    pub fn get(&self, point: SyncPoint) -> vk::Semaphore {
        match point {
            SyncPoint::ImageAvailable => self.image_available,
            SyncPoint::PrepassDone => self.prepass_done,
            SyncPoint::LightCullDone => self.lightcull_done,
            SyncPoint::RenderDone => self.render_done,
            SyncPoint::OverlayDone => self.overlay_done,
        }
    }

    unsafe fn create(device: &ash::Device, names: &DebugNames) -> Result<Self, FatalError> {
        let mut sync = Self::default();
        let si = vk::SemaphoreCreateInfo {
            s_type: vk::StructureType::SEMAPHORE_CREATE_INFO,
            ..Default::default()
        };
        // Signalled so the first frame's wait returns at once.
        let fi = vk::FenceCreateInfo {
            s_type: vk::StructureType::FENCE_CREATE_INFO,
            flags: vk::FenceCreateFlags::SIGNALED,
            ..Default::default()
        };
        let result = (|| -> Result<(), FatalError> {
            sync.fence = device.create_fence(&fi, None).vk_call("vkCreateFence")?;
            names.set(sync.fence, "render fence");
            for (slot, name) in [
                (&mut sync.image_available, "image available"),
                (&mut sync.prepass_done, "prepass done"),
                (&mut sync.lightcull_done, "light cull done"),
                (&mut sync.render_done, "render done"),
                (&mut sync.overlay_done, "overlay done"),
            ] {
                *slot = device.create_semaphore(&si, None).vk_call("vkCreateSemaphore")?;
                names.set(*slot, name);
            }
            Ok(())
        })();
        match result {
            Ok(()) => Ok(sync),
            Err(e) => {
                sync.destroy(device);
                Err(e)
            }
        }
    }

    unsafe fn destroy(&mut self, device: &ash::Device) {
        for s in [
            self.render_done,
            self.image_available,
            self.lightcull_done,
            self.prepass_done,
            self.overlay_done,
        ] {
            device.destroy_semaphore(s, None);
        }
        device.destroy_fence(self.fence, None);
        *self = Self::default();
    }
}

/// Everything built against one swapchain. Torn down and rebuilt as a unit.
#[derive(Default)]
pub(crate) struct SwapchainResources {
    pub bundle: SwapchainBundle,
    pub depth: GpuImage,
    pub passes: RenderPasses,
    pub framebuffers: Vec<vk::Framebuffer>,
    pub overlay_framebuffers: Vec<vk::Framebuffer>,
    pub prepass_framebuffer: vk::Framebuffer,
    pub depth_pipeline: Pipeline,
    pub shaded_pipeline: Pipeline,
    pub cull_pipeline: Pipeline,
    pub overlay_pipeline: Pipeline,
    pub lightvis: GpuBuffer,
    pub grid: TileGrid,
    pub gfx_cmdbufs: Vec<vk::CommandBuffer>,
    pub overlay_cmdbufs: Vec<vk::CommandBuffer>,
    pub prepass_cmdbuf: vk::CommandBuffer,
    /// Recorded once per build and resubmitted every frame.
    pub cull_cmdbuf: vk::CommandBuffer,
}

/// Descriptor sets that live as long as the context.
#[derive(Clone, Copy, Default)]
pub(crate) struct CoreSets {
    pub object: vk::DescriptorSet,
    pub camera: vk::DescriptorSet,
    pub light_cull: vk::DescriptorSet,
    pub intermediate: vk::DescriptorSet,
}

impl CoreSets {
    pub fn as_array(&self) -> [vk::DescriptorSet; 4] {
        [self.object, self.camera, self.light_cull, self.intermediate]
    }
}

/// Vulkan forward+ renderer over one window.
pub struct VkRenderer {
    pub(crate) entry: Entry,
    pub(crate) instance: Instance,
    pub(crate) debug: DebugState,
    pub(crate) surface_loader: surface::Instance,
    pub(crate) surface: vk::SurfaceKHR,
    pub(crate) window: Arc<dyn DrawableSurface>,

    pub(crate) phys: vk::PhysicalDevice,
    pub(crate) props: vk::PhysicalDeviceProperties,
    pub(crate) features: vk::PhysicalDeviceFeatures,
    pub(crate) families: QueueFamilies,
    pub(crate) device: ash::Device,
    pub(crate) queues: Queues,
    pub(crate) swapchain_loader: swapchain::Device,
    pub(crate) names: DebugNames,
    pub(crate) mem: GpuMemory,

    pub(crate) gfx_pool: vk::CommandPool,
    pub(crate) compute_pool: vk::CommandPool,
    pub(crate) transfer_pool: vk::CommandPool,
    pub(crate) onetime: OneTimeSubmit,

    pub(crate) set_layouts: SetLayouts,
    pub(crate) desc_pool: vk::DescriptorPool,
    pub(crate) sampler: vk::Sampler,
    pub(crate) depth_format: vk::Format,
    pub(crate) sets: CoreSets,
    pub(crate) fallback_texture: GpuImage,
    pub(crate) default_material: Option<Material>,
    pub(crate) loader: Option<Arc<dyn AssetLoader>>,

    pub(crate) object: UniformBlock<ObjectUniform>,
    pub(crate) camera: UniformBlock<CameraUniform>,
    pub(crate) lights: UniformBlock<PointLightBlock>,
    pub(crate) camera_state: Camera,
    pub(crate) camera_dirty: bool,
    pub(crate) lights_dirty: bool,

    pub(crate) sc: SwapchainResources,
    pub(crate) sync: FrameSync,
    pub(crate) overlay_geometry: OverlayBuffer,

    pub(crate) settings: RenderSettings,
    pub(crate) image_index: u32,
    pub(crate) frame: u64,
    pub(crate) state: FrameState,
    pub(crate) swapchain_state: SwapchainState,
    pub(crate) graph: FrameGraph,
    pub(crate) needs_rebuild: bool,
}

unsafe fn create_command_pool(
    device: &ash::Device,
    family: u32,
) -> Result<vk::CommandPool, FatalError> {
    let ci = vk::CommandPoolCreateInfo {
        s_type: vk::StructureType::COMMAND_POOL_CREATE_INFO,
        flags: vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
        queue_family_index: family,
        ..Default::default()
    };
    device
        .create_command_pool(&ci, None)
        .vk_call("vkCreateCommandPool")
}

unsafe fn allocate_cmdbufs(
    device: &ash::Device,
    pool: vk::CommandPool,
    count: u32,
) -> Result<Vec<vk::CommandBuffer>, FatalError> {
    let ai = vk::CommandBufferAllocateInfo {
        s_type: vk::StructureType::COMMAND_BUFFER_ALLOCATE_INFO,
        command_pool: pool,
        level: vk::CommandBufferLevel::PRIMARY,
        command_buffer_count: count,
        ..Default::default()
    };
    device
        .allocate_command_buffers(&ai)
        .vk_call("vkAllocateCommandBuffers")
}

struct DeviceParts {
    debug: DebugState,
    surface: vk::SurfaceKHR,
    picked: device::PickedDevice,
    depth_format: vk::Format,
    device: ash::Device,
    queues: Queues,
    mem: GpuMemory,
}

/// Messenger, surface, device and allocator. On failure everything created
/// here is destroyed again; the instance is left to the caller.
unsafe fn open_device(
    entry: &Entry,
    instance: &Instance,
    surface_loader: &surface::Instance,
    debug_utils: bool,
    dh: RawDisplayHandle,
    wh: RawWindowHandle,
) -> Result<DeviceParts, FatalError> {
    let debug = device::create_debug_messenger(entry, instance, debug_utils)?;
    let surface = match ash_window::create_surface(entry, instance, dh, wh, None) {
        Ok(s) => s,
        Err(result) => {
            device::destroy_debug_messenger(entry, instance, debug);
            return Err(FatalError::Vk {
                call: "vkCreateSurfaceKHR",
                result,
            });
        }
    };
    let fail = |e: FatalError| {
        surface_loader.destroy_surface(surface, None);
        device::destroy_debug_messenger(entry, instance, debug);
        e
    };

    let picked = device::pick_physical_device(instance, surface_loader, surface).map_err(fail)?;
    let depth_format = device::pick_depth_format(instance, picked.phys).map_err(fail)?;
    let (device, queues) = device::create_logical_device(instance, &picked).map_err(fail)?;
    let mem = match GpuMemory::new(instance, &device, picked.phys) {
        Ok(m) => m,
        Err(e) => {
            device.destroy_device(None);
            return Err(fail(e.into()));
        }
    };
    Ok(DeviceParts {
        debug,
        surface,
        picked,
        depth_format,
        device,
        queues,
        mem,
    })
}

impl VkRenderer {
    pub fn new(
        window: Arc<dyn DrawableSurface>,
        settings: RenderSettings,
    ) -> Result<Self, FatalError> {
        unsafe {
            let entry = Entry::linked();
            let dh = window.display_handle()?.as_raw();
            let wh = window.window_handle()?.as_raw();

            let (instance, debug_utils) = device::create_instance(&entry, dh)?;
            let surface_loader = surface::Instance::new(&entry, &instance);
            let DeviceParts {
                debug,
                surface,
                picked,
                depth_format,
                device,
                queues,
                mem,
            } = match open_device(&entry, &instance, &surface_loader, debug_utils, dh, wh) {
                Ok(parts) => parts,
                Err(e) => {
                    instance.destroy_instance(None);
                    return Err(e);
                }
            };

            let swapchain_loader = swapchain::Device::new(&instance, &device);
            let names = DebugNames::new(&instance, &device, debug_utils);
            let onetime = OneTimeSubmit::new(device.clone(), vk::CommandPool::null(), queues.graphics);

            // From here on Drop cleans up whatever was created.
            let mut r = VkRenderer {
                entry,
                instance,
                debug,
                surface_loader,
                surface,
                window,
                phys: picked.phys,
                props: picked.props,
                features: picked.features,
                families: picked.families,
                device,
                queues,
                swapchain_loader,
                names,
                mem,
                gfx_pool: vk::CommandPool::null(),
                compute_pool: vk::CommandPool::null(),
                transfer_pool: vk::CommandPool::null(),
                onetime,
                set_layouts: SetLayouts::default(),
                desc_pool: vk::DescriptorPool::null(),
                sampler: vk::Sampler::null(),
                depth_format,
                sets: CoreSets::default(),
                fallback_texture: GpuImage::default(),
                default_material: None,
                loader: None,
                object: UniformBlock::default(),
                camera: UniformBlock::default(),
                lights: UniformBlock::default(),
                camera_state: Camera::default(),
                camera_dirty: true,
                lights_dirty: true,
                sc: SwapchainResources::default(),
                sync: FrameSync::default(),
                overlay_geometry: OverlayBuffer::default(),
                settings,
                image_index: 0,
                frame: 0,
                state: FrameState::Idle,
                swapchain_state: SwapchainState::Uninitialised,
                graph: FrameGraph::new(),
                needs_rebuild: false,
            };
            r.init()?;
            info!(
                "Vulkan context ready ({}x{}, {:?}, depth {:?})",
                r.sc.bundle.extent.width, r.sc.bundle.extent.height, r.sc.bundle.format, r.depth_format
            );
            Ok(r)
        }
    }

    unsafe fn init(&mut self) -> Result<(), FatalError> {
        let d = &self.device;
        self.gfx_pool = create_command_pool(d, self.families.graphics)?;
        self.compute_pool = create_command_pool(d, self.families.graphics)?;
        self.transfer_pool = create_command_pool(d, self.families.transfer)?;
        self.names.set(self.gfx_pool, "graphics pool");
        self.names.set(self.compute_pool, "compute pool");
        self.names.set(self.transfer_pool, "transfer pool");
        self.onetime = OneTimeSubmit::new(d.clone(), self.gfx_pool, self.queues.graphics);

        self.sync = FrameSync::create(d, &self.names)?;
        self.set_layouts = descriptors::create_set_layouts(d)?;
        self.desc_pool = descriptors::create_pool(d)?;
        self.sampler = descriptors::create_sampler(d, self.features.sampler_anisotropy == vk::TRUE)?;

        self.object = UniformBlock::new(&self.mem, "object uniform", ObjectUniform::default())?;
        self.camera = UniformBlock::new(&self.mem, "camera uniform", CameraUniform::default())?;
        self.lights = UniformBlock::new(&self.mem, "point light uniform", PointLightBlock::default())?;
        self.object.update(&self.onetime)?;
        self.lights.update(&self.onetime)?;
        self.lights_dirty = false;

        self.sets = CoreSets {
            object: descriptors::allocate_set(d, self.desc_pool, self.set_layouts.object)?,
            camera: descriptors::allocate_set(d, self.desc_pool, self.set_layouts.camera)?,
            light_cull: descriptors::allocate_set(d, self.desc_pool, self.set_layouts.light_cull)?,
            intermediate: descriptors::allocate_set(d, self.desc_pool, self.set_layouts.intermediate)?,
        };
        let ubo = vk::DescriptorType::UNIFORM_BUFFER;
        descriptors::write_buffer(d, self.sets.object, 0, ubo, self.object.descriptor_info());
        descriptors::write_buffer(d, self.sets.camera, 0, ubo, self.camera.descriptor_info());
        descriptors::write_buffer(d, self.sets.light_cull, 1, ubo, self.lights.descriptor_info());

        self.fallback_texture = material::create_fallback_texture(&self.mem, &self.onetime)?;
        let default_material = material::create_material(&self.material_deps(), None, None, None)?;
        self.default_material = Some(default_material);

        self.build_swapchain_resources()?;
        self.swapchain_state.finish_build();
        Ok(())
    }

    pub(crate) fn material_deps(&self) -> MaterialDeps<'_> {
        MaterialDeps {
            device: &self.device,
            mem: &self.mem,
            onetime: &self.onetime,
            pool: self.desc_pool,
            layout: self.set_layouts.material,
            sampler: self.sampler,
            fallback: self.fallback_texture.alias(),
        }
    }

    unsafe fn build_swapchain_resources(&mut self) -> Result<(), FatalError> {
        let size = self.window.drawable_size();
        self.sc.bundle = create_swapchain(
            &self.device,
            &self.surface_loader,
            &self.swapchain_loader,
            self.phys,
            self.surface,
            &self.families,
            size,
            self.settings.vsync,
        )?;
        let extent = self.sc.bundle.extent;
        for (i, &img) in self.sc.bundle.images.iter().enumerate() {
            self.names.set(img, &format!("swapchain image {i}"));
        }

        let depth_info = vk::ImageCreateInfo {
            s_type: vk::StructureType::IMAGE_CREATE_INFO,
            image_type: vk::ImageType::TYPE_2D,
            format: self.depth_format,
            extent: vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            },
            mip_levels: 1,
            array_layers: 1,
            samples: vk::SampleCountFlags::TYPE_1,
            tiling: vk::ImageTiling::OPTIMAL,
            usage: vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT | vk::ImageUsageFlags::SAMPLED,
            sharing_mode: vk::SharingMode::EXCLUSIVE,
            initial_layout: vk::ImageLayout::UNDEFINED,
            ..Default::default()
        };
        self.sc.depth = self.mem.create_image(
            "depth image",
            &depth_info,
            vk::ImageAspectFlags::DEPTH,
            MemoryLocation::GpuOnly,
        )?;
        let depth_image = self.sc.depth.handle();
        self.onetime.run(|device, cmd| unsafe {
            layout::record_image_layout_change(
                device,
                cmd,
                depth_image,
                vk::ImageLayout::UNDEFINED,
                vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
            )
        })?;

        let d = &self.device;
        self.sc.passes = passes::create_passes(d, self.sc.bundle.format, self.depth_format)?;
        let depth_view = self.sc.depth.view();
        for &view in &self.sc.bundle.views {
            let fb = passes::create_framebuffer(d, self.sc.passes.main, &[view, depth_view], extent)?;
            self.sc.framebuffers.push(fb);
            let fb = passes::create_framebuffer(d, self.sc.passes.overlay, &[view], extent)?;
            self.sc.overlay_framebuffers.push(fb);
        }
        self.sc.prepass_framebuffer =
            passes::create_framebuffer(d, self.sc.passes.depth_prepass, &[depth_view], extent)?;

        self.sc.depth_pipeline =
            passes::create_depth_pipeline(d, self.sc.passes.depth_prepass, extent, self.set_layouts.depth())?;
        self.sc.shaded_pipeline =
            passes::create_shaded_pipeline(d, self.sc.passes.main, extent, self.set_layouts.shaded())?;
        self.sc.cull_pipeline = lightcull::create_pipeline(d, self.set_layouts.compute())?;
        self.sc.overlay_pipeline = overlay::create_pipeline(d, self.sc.passes.overlay, extent)?;

        self.sc.grid = TileGrid::for_extent(extent);
        self.sc.lightvis = self.mem.create_buffer(
            "light visibility",
            self.sc.grid.buffer_size(),
            vk::BufferUsageFlags::STORAGE_BUFFER,
            MemoryLocation::GpuOnly,
        )?;
        let lightvis = self.sc.lightvis.alias();
        descriptors::write_buffer(
            d,
            self.sets.light_cull,
            0,
            vk::DescriptorType::STORAGE_BUFFER,
            vk::DescriptorBufferInfo {
                buffer: lightvis.buffer,
                offset: 0,
                range: lightvis.size,
            },
        );
        descriptors::write_image(
            d,
            self.sets.intermediate,
            0,
            self.sampler,
            depth_view,
            vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL,
        );

        let n = self.sc.bundle.images.len() as u32;
        self.sc.gfx_cmdbufs = allocate_cmdbufs(d, self.gfx_pool, n)?;
        self.sc.overlay_cmdbufs = allocate_cmdbufs(d, self.gfx_pool, n)?;
        self.sc.prepass_cmdbuf = allocate_cmdbufs(d, self.gfx_pool, 1)?[0];
        self.sc.cull_cmdbuf = allocate_cmdbufs(d, self.compute_pool, 1)?[0];
        self.names.set(self.sc.prepass_cmdbuf, "depth prepass");
        self.names.set(self.sc.cull_cmdbuf, "light cull");

        let push = PushConstants::new(extent, self.sc.grid, self.settings.debug_view);
        lightcull::record_dispatch(
            d,
            self.sc.cull_cmdbuf,
            &self.sc.cull_pipeline,
            [self.sets.light_cull, self.sets.camera, self.sets.intermediate],
            lightvis,
            push,
            self.sc.grid,
        )?;

        self.camera_dirty = true;
        debug!(
            "swapchain resources built: {}x{}, {} images, tile grid {}x{}",
            extent.width, extent.height, n, self.sc.grid.tiles.x, self.sc.grid.tiles.y
        );
        Ok(())
    }

    unsafe fn destroy_swapchain_resources(&mut self) {
        let d = &self.device;
        let sc = &mut self.sc;

        let gfx: Vec<_> = sc
            .gfx_cmdbufs
            .drain(..)
            .chain(sc.overlay_cmdbufs.drain(..))
            .chain([sc.prepass_cmdbuf])
            .filter(|&c| c != vk::CommandBuffer::null())
            .collect();
        if !gfx.is_empty() {
            d.free_command_buffers(self.gfx_pool, &gfx);
        }
        if sc.cull_cmdbuf != vk::CommandBuffer::null() {
            d.free_command_buffers(self.compute_pool, &[sc.cull_cmdbuf]);
        }

        sc.lightvis.destroy(&self.mem);
        sc.overlay_pipeline.destroy(d);
        sc.cull_pipeline.destroy(d);
        sc.shaded_pipeline.destroy(d);
        sc.depth_pipeline.destroy(d);

        for fb in sc.framebuffers.drain(..).chain(sc.overlay_framebuffers.drain(..)) {
            d.destroy_framebuffer(fb, None);
        }
        d.destroy_framebuffer(sc.prepass_framebuffer, None);
        sc.passes.destroy(d);
        sc.depth.destroy(&self.mem);

        for view in sc.bundle.views.drain(..) {
            d.destroy_image_view(view, None);
        }
        self.swapchain_loader.destroy_swapchain(sc.bundle.swapchain, None);

        *sc = SwapchainResources::default();
    }

    /// Waits idle, tears down every swapchain-dependent object, waits again
    /// and builds the set anew for the current drawable size.
    pub fn rebuild_swapchain(&mut self) -> Result<(), FatalError> {
        self.state.expect(FrameState::Idle);
        self.swapchain_state.begin_rebuild();
        unsafe {
            self.device
                .device_wait_idle()
                .vk_call("vkDeviceWaitIdle")?;
            self.destroy_swapchain_resources();
            // A present that failed out of date leaves its wait semaphore
            // signalled; start the new generation with fresh ones.
            self.sync.destroy(&self.device);
            self.device
                .device_wait_idle()
                .vk_call("vkDeviceWaitIdle")?;
            self.sync = FrameSync::create(&self.device, &self.names)?;
            self.build_swapchain_resources()?;
        }
        self.swapchain_state.finish_build();
        self.needs_rebuild = false;
        info!(
            "swapchain rebuilt: {}x{}",
            self.sc.bundle.extent.width, self.sc.bundle.extent.height
        );
        Ok(())
    }

    /// Blocks until the last submitted frame has finished on the GPU.
    pub(crate) fn wait_frame(&self) -> Result<(), FatalError> {
        unsafe {
            self.device
                .wait_for_fences(&[self.sync.fence], true, u64::MAX)
                .vk_call("vkWaitForFences")
        }
    }

    pub fn set_asset_loader(&mut self, loader: Arc<dyn AssetLoader>) {
        self.loader = Some(loader);
    }

    /// Builds a material. Missing or unreadable textures are logged and the
    /// material falls back to vertex colour for that slot.
    pub fn create_material(
        &self,
        albedo: Option<&Path>,
        normal: Option<&Path>,
    ) -> Result<Material, FatalError> {
        if self.loader.is_none() && (albedo.is_some() || normal.is_some()) {
            warn!("no asset loader set; material textures skipped");
        }
        material::create_material(&self.material_deps(), self.loader.as_deref(), albedo, normal)
    }

    pub fn destroy_material(&mut self, mut material: Material) -> Result<(), FatalError> {
        self.state.expect(FrameState::Idle);
        self.wait_frame()?;
        unsafe { material.destroy(&self.device, self.desc_pool, &self.mem) };
        Ok(())
    }

    pub fn upload_model(&self, name: &str, meshes: &[MeshData]) -> Result<Model, FatalError> {
        model::upload_model(&self.mem, &self.onetime, name, meshes)
    }

    pub fn destroy_model(&mut self, mut model: Model) -> Result<(), FatalError> {
        self.state.expect(FrameState::Idle);
        self.wait_frame()?;
        model.destroy(&self.mem);
        Ok(())
    }

    pub fn set_camera(&mut self, camera: &Camera) {
        self.camera_state = *camera;
        self.camera_dirty = true;
    }

    pub fn camera(&self) -> &Camera {
        &self.camera_state
    }

    /// Replaces the active point lights; they reach the GPU at the next
    /// [`flush_uniforms`](Self::flush_uniforms).
    pub fn set_point_lights(&mut self, lights: &[PointLight]) {
        self.lights.data.set(lights);
        self.lights_dirty = true;
    }

    /// Uploads changed camera and light data. Call between `start_render`
    /// and `start_render_record`, once the previous frame has completed.
    pub fn flush_uniforms(&mut self) -> Result<(), FatalError> {
        self.state.expect(FrameState::Acquired);
        if self.camera_dirty {
            let extent = self.sc.bundle.extent;
            self.camera
                .data
                .update(&self.camera_state, extent.width, extent.height);
            self.camera.update(&self.onetime)?;
            self.camera_dirty = false;
        }
        if self.lights_dirty {
            self.lights.update(&self.onetime)?;
            self.lights_dirty = false;
        }
        Ok(())
    }

    /// Starts a single-use command buffer on the graphics queue.
    pub fn begin_onetime_buffer(&self) -> Result<vk::CommandBuffer, FatalError> {
        self.onetime.begin()
    }

    /// Submits `cmd` and blocks until the graphics queue is idle.
    pub fn consume_onetime_buffer(&self, cmd: vk::CommandBuffer) -> Result<(), FatalError> {
        self.onetime.consume(cmd)
    }

    /// # Panics
    /// If `from -> to` is not a supported transition.
    pub fn record_image_layout_change(
        &self,
        cmd: vk::CommandBuffer,
        image: vk::Image,
        from: vk::ImageLayout,
        to: vk::ImageLayout,
    ) {
        unsafe { layout::record_image_layout_change(&self.device, cmd, image, from, to) }
    }

    /// Runs the `vkdiag` console command. `args` excludes the command name.
    pub fn vkdiag(&self, args: &[&str]) -> Vec<String> {
        let lines = match DiagTopic::parse(args) {
            Some(DiagTopic::Extensions) => unsafe {
                let inst = self
                    .entry
                    .enumerate_instance_extension_properties(None)
                    .unwrap_or_default();
                let dev = self
                    .instance
                    .enumerate_device_extension_properties(self.phys)
                    .unwrap_or_default();
                diag::extension_report(&inst, &dev)
            },
            Some(DiagTopic::Gpu) => diag::gpu_report(&self.props, &self.features),
            Some(DiagTopic::Queues) => unsafe {
                diag::queue_report(
                    &self
                        .instance
                        .get_physical_device_queue_family_properties(self.phys),
                )
            },
            None => vec![diag::USAGE.to_owned()],
        };
        for l in &lines {
            info!("{l}");
        }
        lines
    }

    pub fn tile_grid(&self) -> TileGrid {
        self.sc.grid
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.sc.bundle.extent
    }

    /// Frames presented so far.
    pub fn frame_count(&self) -> u64 {
        self.frame
    }

    pub fn frame_state(&self) -> FrameState {
        self.state
    }

    pub fn swapchain_state(&self) -> SwapchainState {
        self.swapchain_state
    }

    /// Submissions of the frame in flight, or of the last presented one.
    pub fn frame_graph(&self) -> &FrameGraph {
        &self.graph
    }

    pub fn debug_names(&self) -> &DebugNames {
        &self.names
    }
}

impl Drop for VkRenderer {
    fn drop(&mut self) {
        unsafe {
            let d = &self.device;
            if let Err(e) = d.device_wait_idle() {
                warn!("vkDeviceWaitIdle at shutdown: {e}");
            }

            d.destroy_sampler(self.sampler, None);
            self.destroy_swapchain_resources();
            let d = &self.device;

            self.overlay_geometry.destroy(&self.mem);
            if let Some(mut m) = self.default_material.take() {
                m.destroy(d, self.desc_pool, &self.mem);
            }
            self.fallback_texture.destroy(&self.mem);
            self.object.destroy(&self.mem);
            self.camera.destroy(&self.mem);
            self.lights.destroy(&self.mem);

            self.set_layouts.destroy(d);
            descriptors::free_sets(d, self.desc_pool, &self.sets.as_array(), "renderer");
            d.destroy_descriptor_pool(self.desc_pool, None);

            self.sync.destroy(d);

            d.destroy_command_pool(self.compute_pool, None);
            d.destroy_command_pool(self.transfer_pool, None);
            d.destroy_command_pool(self.gfx_pool, None);
            self.surface_loader.destroy_surface(self.surface, None);
            self.mem.shutdown();
            device::destroy_debug_messenger(&self.entry, &self.instance, self.debug);
            d.destroy_device(None);
            self.instance.destroy_instance(None);
        }
        debug!("Vulkan context destroyed after {} frames", self.frame);
    }
}
