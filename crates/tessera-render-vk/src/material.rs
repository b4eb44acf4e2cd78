// SPDX-License-Identifier: CEPL-1.0
//! Materials: a descriptor set with an info block and two optional textures.
//!
//! A texture that is missing or fails to load is not fatal. The slot is
//! filled with a shared 1x1 white texture and the matching `has_*` flag in
//! the info block stays zero.

use std::path::Path;

use ash::vk;
use gpu_allocator::MemoryLocation;
use tessera_render::{AssetLoader, ImageData, MaterialInfo};
use tracing::{debug, warn};

use crate::command::OneTimeSubmit;
use crate::descriptors;
use crate::error::FatalError;
use crate::layout::record_image_layout_change;
use crate::memory::{GpuImage, GpuMemory, ImageRef, MemoryRelease};
use crate::uniform::UniformBlock;

pub const ALBEDO_FORMAT: vk::Format = vk::Format::R8G8B8A8_SRGB;
pub const NORMAL_FORMAT: vk::Format = vk::Format::R8G8B8A8_UNORM;

pub struct Material {
    pub(crate) set: vk::DescriptorSet,
    info: UniformBlock<MaterialInfo>,
    albedo: Option<GpuImage>,
    normal: Option<GpuImage>,
}

impl Material {
    pub fn info(&self) -> MaterialInfo {
        self.info.data
    }

    pub fn descriptor_set(&self) -> vk::DescriptorSet {
        self.set
    }

    pub(crate) unsafe fn destroy(
        &mut self,
        device: &ash::Device,
        pool: vk::DescriptorPool,
        mem: &dyn MemoryRelease,
    ) {
        descriptors::free_sets(device, pool, &[self.set], "material");
        self.set = vk::DescriptorSet::null();
        self.info.destroy(mem);
        for img in [self.albedo.as_mut(), self.normal.as_mut()].into_iter().flatten() {
            img.destroy(mem);
        }
    }
}

/// Everything material creation borrows from the context.
pub(crate) struct MaterialDeps<'a> {
    pub device: &'a ash::Device,
    pub mem: &'a GpuMemory,
    pub onetime: &'a OneTimeSubmit,
    pub pool: vk::DescriptorPool,
    pub layout: vk::DescriptorSetLayout,
    pub sampler: vk::Sampler,
    pub fallback: ImageRef,
}

/// Device-local sampled image filled from `image` through a staging buffer.
/// The result is in `SHADER_READ_ONLY_OPTIMAL`.
pub(crate) fn upload_texture(
    mem: &GpuMemory,
    onetime: &OneTimeSubmit,
    name: &str,
    image: ImageData,
    format: vk::Format,
) -> Result<GpuImage, FatalError> {
    let image = image.into_rgba();
    let size = image.pixels.len() as vk::DeviceSize;
    let mut staging = mem.create_buffer(
        &format!("{name} (staging)"),
        size,
        vk::BufferUsageFlags::TRANSFER_SRC,
        MemoryLocation::CpuToGpu,
    )?;
    if let Err(e) = staging.write_bytes(0, &image.pixels) {
        staging.destroy(mem);
        return Err(e.into());
    }

    let info = vk::ImageCreateInfo {
        s_type: vk::StructureType::IMAGE_CREATE_INFO,
        image_type: vk::ImageType::TYPE_2D,
        format,
        extent: vk::Extent3D {
            width: image.width,
            height: image.height,
            depth: 1,
        },
        mip_levels: 1,
        array_layers: 1,
        samples: vk::SampleCountFlags::TYPE_1,
        tiling: vk::ImageTiling::OPTIMAL,
        usage: vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::SAMPLED,
        sharing_mode: vk::SharingMode::EXCLUSIVE,
        initial_layout: vk::ImageLayout::PREINITIALIZED,
        ..Default::default()
    };
    let mut texture = match mem.create_image(name, &info, vk::ImageAspectFlags::COLOR, MemoryLocation::GpuOnly) {
        Ok(t) => t,
        Err(e) => {
            staging.destroy(mem);
            return Err(e.into());
        }
    };

    let (src, dst) = (staging.handle(), texture.handle());
    let (width, height) = (image.width, image.height);
    let copied = onetime.run(|device, cmd| unsafe {
        record_image_layout_change(
            device,
            cmd,
            dst,
            vk::ImageLayout::PREINITIALIZED,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        );
        let region = vk::BufferImageCopy {
            buffer_offset: 0,
            buffer_row_length: 0,
            buffer_image_height: 0,
            image_subresource: vk::ImageSubresourceLayers {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                mip_level: 0,
                base_array_layer: 0,
                layer_count: 1,
            },
            image_offset: vk::Offset3D::default(),
            image_extent: vk::Extent3D {
                width,
                height,
                depth: 1,
            },
        };
        device.cmd_copy_buffer_to_image(
            cmd,
            src,
            dst,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            std::slice::from_ref(&region),
        );
        record_image_layout_change(
            device,
            cmd,
            dst,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        );
    });
    staging.destroy(mem);
    if let Err(e) = copied {
        texture.destroy(mem);
        return Err(e);
    }
    Ok(texture)
}

/// The texture bound wherever a material has none.
pub(crate) fn create_fallback_texture(
    mem: &GpuMemory,
    onetime: &OneTimeSubmit,
) -> Result<GpuImage, FatalError> {
    let white = ImageData {
        width: 1,
        height: 1,
        channels: 4,
        pixels: vec![255; 4],
    };
    upload_texture(mem, onetime, "fallback texture", white, NORMAL_FORMAT)
}

fn load_texture(
    deps: &MaterialDeps<'_>,
    loader: &dyn AssetLoader,
    path: Option<&Path>,
    format: vk::Format,
) -> Option<GpuImage> {
    let path = path?;
    let image = match loader.load_image(path) {
        Ok(img) if img.is_valid() => img,
        Ok(_) => {
            warn!("texture {} has no usable pixels", path.display());
            return None;
        }
        Err(e) => {
            warn!("texture not loaded: {e}");
            return None;
        }
    };
    match upload_texture(deps.mem, deps.onetime, &path.display().to_string(), image, format) {
        Ok(t) => Some(t),
        Err(e) => {
            warn!("texture {} not uploaded: {e}", path.display());
            None
        }
    }
}

/// Which flags a material ends up with given what actually loaded.
pub fn material_info(albedo: bool, normal: bool) -> MaterialInfo {
    MaterialInfo {
        has_albedo: albedo as u32,
        has_normal: normal as u32,
    }
}

/// Destroys `textures` when `result` is an error, so nothing already
/// uploaded outlives a failed material.
fn release_on_err<T, E>(
    result: Result<T, E>,
    textures: &mut [Option<GpuImage>],
    mem: &dyn MemoryRelease,
) -> Result<T, E> {
    if result.is_err() {
        for tex in textures.iter_mut().flatten() {
            tex.destroy(mem);
        }
    }
    result
}

pub(crate) fn create_material(
    deps: &MaterialDeps<'_>,
    loader: Option<&dyn AssetLoader>,
    albedo_path: Option<&Path>,
    normal_path: Option<&Path>,
) -> Result<Material, FatalError> {
    let (albedo, normal) = match loader {
        Some(loader) => (
            load_texture(deps, loader, albedo_path, ALBEDO_FORMAT),
            load_texture(deps, loader, normal_path, NORMAL_FORMAT),
        ),
        None => (None, None),
    };
    let info = material_info(albedo.is_some(), normal.is_some());

    let mut textures = [albedo, normal];
    let block = release_on_err(
        UniformBlock::new(deps.mem, "material info", info),
        &mut textures,
        deps.mem,
    )?;
    let [albedo, normal] = textures;
    let mut material = Material {
        set: vk::DescriptorSet::null(),
        info: block,
        albedo,
        normal,
    };
    let result = (|| -> Result<(), FatalError> { unsafe {
        material.info.update(deps.onetime)?;
        material.set = descriptors::allocate_set(deps.device, deps.pool, deps.layout)?;
        descriptors::write_buffer(
            deps.device,
            material.set,
            0,
            vk::DescriptorType::UNIFORM_BUFFER,
            material.info.descriptor_info(),
        );
        for (binding, img) in [(1, material.albedo.as_ref()), (2, material.normal.as_ref())] {
            let view = img.map_or(deps.fallback.view, GpuImage::view);
            descriptors::write_image(
                deps.device,
                material.set,
                binding,
                deps.sampler,
                view,
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            );
        }
        Ok(())
    }})();

    match result {
        Ok(()) => {
            debug!(
                "material created (albedo: {}, normal: {})",
                info.has_albedo, info.has_normal
            );
            Ok(material)
        }
        Err(e) => {
            unsafe { material.destroy(deps.device, deps.pool, deps.mem) };
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AllocError;
    use crate::memory::BoundHandles;
    use ash::vk::Handle;
    use gpu_allocator::vulkan::Allocation;
    use std::cell::RefCell;

    #[derive(Default)]
    struct RecordingRelease {
        released: RefCell<Vec<BoundHandles>>,
    }

    impl MemoryRelease for RecordingRelease {
        fn release(&self, handles: BoundHandles, _allocation: Allocation) {
            self.released.borrow_mut().push(handles);
        }
    }

    fn fake_texture(raw: u64) -> GpuImage {
        GpuImage::from_parts(
            vk::Image::from_raw(raw),
            vk::ImageView::from_raw(raw + 1),
            Allocation::default(),
            ALBEDO_FORMAT,
            vk::Extent2D { width: 1, height: 1 },
        )
    }

    #[test]
    fn failed_info_block_releases_loaded_textures() {
        let mem = RecordingRelease::default();
        let mut textures = [Some(fake_texture(10)), None];
        let result: Result<(), AllocError> =
            release_on_err(Err(AllocError::NotMapped), &mut textures, &mem);
        assert!(result.is_err());
        assert_eq!(
            *mem.released.borrow(),
            [BoundHandles::Image {
                image: vk::Image::from_raw(10),
                view: vk::ImageView::from_raw(11),
            }]
        );
        assert!(textures[0].as_ref().is_some_and(GpuImage::is_null));
    }

    #[test]
    fn successful_info_block_keeps_textures() {
        let mem = RecordingRelease::default();
        let mut textures = [Some(fake_texture(20)), Some(fake_texture(30))];
        let result: Result<u32, AllocError> = release_on_err(Ok(5), &mut textures, &mem);
        assert_eq!(result.ok(), Some(5));
        assert!(mem.released.borrow().is_empty());
        for tex in textures.iter_mut().flatten() {
            assert!(!tex.is_null());
            tex.destroy(&mem);
        }
        assert_eq!(mem.released.borrow().len(), 2);
    }

    #[test]
    fn flags_follow_load_results() {
        assert_eq!(material_info(false, false), MaterialInfo::default());
        let m = material_info(true, false);
        assert_eq!((m.has_albedo, m.has_normal), (1, 0));
        let m = material_info(false, true);
        assert_eq!((m.has_albedo, m.has_normal), (0, 1));
    }

    #[test]
    fn albedo_is_srgb_and_normals_are_linear() {
        assert_eq!(ALBEDO_FORMAT, vk::Format::R8G8B8A8_SRGB);
        assert_eq!(NORMAL_FORMAT, vk::Format::R8G8B8A8_UNORM);
    }
}
