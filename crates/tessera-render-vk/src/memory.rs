// SPDX-License-Identifier: CEPL-1.0
//! GPU memory facade.
//!
//! [`GpuBuffer`] and [`GpuImage`] each own exactly one allocator-issued
//! allocation plus the handles bound to it. Ownership is explicit:
//! - `take()` moves ownership out and leaves the source null,
//! - `alias()` hands out a `Copy` reference that can never free anything,
//! - `destroy()` releases through a [`MemoryRelease`] and is a no-op on a
//!   null (moved-from or already destroyed) value.

use std::sync::{Mutex, PoisonError};

use ash::vk;
use bytemuck::Pod;
use gpu_allocator::vulkan::{
    Allocation, AllocationCreateDesc, AllocationScheme, Allocator, AllocatorCreateDesc,
};
use gpu_allocator::MemoryLocation;
use tracing::{debug, warn};

use crate::error::AllocError;

/// Handles bound to one allocation, destroyed together with it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BoundHandles {
    Buffer(vk::Buffer),
    Image { image: vk::Image, view: vk::ImageView },
}

/// Destroys bound handles and returns their memory to the allocator.
pub trait MemoryRelease {
    fn release(&self, handles: BoundHandles, allocation: Allocation);
}

/// Non-owning view of a [`GpuBuffer`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BufferRef {
    pub buffer: vk::Buffer,
    pub size: vk::DeviceSize,
}

/// Non-owning view of a [`GpuImage`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ImageRef {
    pub image: vk::Image,
    pub view: vk::ImageView,
}

#[derive(Debug, Default)]
pub struct GpuBuffer {
    buffer: vk::Buffer,
    allocation: Option<Allocation>,
    size: vk::DeviceSize,
}

impl GpuBuffer {
    pub(crate) fn from_parts(buffer: vk::Buffer, allocation: Allocation, size: vk::DeviceSize) -> Self {
        Self {
            buffer,
            allocation: Some(allocation),
            size,
        }
    }

    pub fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }

    pub fn is_null(&self) -> bool {
        self.allocation.is_none()
    }

    /// Moves ownership out, leaving `self` null.
    #[must_use]
    pub fn take(&mut self) -> Self {
        std::mem::take(self)
    }

    pub fn alias(&self) -> BufferRef {
        BufferRef {
            buffer: self.buffer,
            size: self.size,
        }
    }

    /// Copies `bytes` into host-visible memory at `offset`.
    pub fn write_bytes(&mut self, offset: usize, bytes: &[u8]) -> Result<(), AllocError> {
        let capacity = self.size as usize;
        let slice = self
            .allocation
            .as_mut()
            .and_then(Allocation::mapped_slice_mut)
            .ok_or(AllocError::NotMapped)?;
        let end = offset
            .checked_add(bytes.len())
            .filter(|&end| end <= capacity && end <= slice.len())
            .ok_or(AllocError::OutOfBounds {
                offset,
                len: bytes.len(),
                capacity,
            })?;
        slice[offset..end].copy_from_slice(bytes);
        Ok(())
    }

    pub fn write_pod<T: Pod>(&mut self, offset: usize, value: &T) -> Result<(), AllocError> {
        self.write_bytes(offset, bytemuck::bytes_of(value))
    }

    pub fn destroy(&mut self, mem: &dyn MemoryRelease) {
        if let Some(allocation) = self.allocation.take() {
            mem.release(BoundHandles::Buffer(self.buffer), allocation);
        }
        self.buffer = vk::Buffer::null();
        self.size = 0;
    }
}

impl Drop for GpuBuffer {
    fn drop(&mut self) {
        if !self.is_null() {
            warn!("GPU buffer {:?} dropped without destroy(); memory leaked", self.buffer);
        }
    }
}

#[derive(Debug, Default)]
pub struct GpuImage {
    image: vk::Image,
    view: vk::ImageView,
    allocation: Option<Allocation>,
    format: vk::Format,
    extent: vk::Extent2D,
}

impl GpuImage {
    pub(crate) fn from_parts(
        image: vk::Image,
        view: vk::ImageView,
        allocation: Allocation,
        format: vk::Format,
        extent: vk::Extent2D,
    ) -> Self {
        Self {
            image,
            view,
            allocation: Some(allocation),
            format,
            extent,
        }
    }

    pub fn handle(&self) -> vk::Image {
        self.image
    }

    pub fn view(&self) -> vk::ImageView {
        self.view
    }

    pub fn format(&self) -> vk::Format {
        self.format
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    pub fn is_null(&self) -> bool {
        self.allocation.is_none()
    }

    #[must_use]
    pub fn take(&mut self) -> Self {
        std::mem::take(self)
    }

    pub fn alias(&self) -> ImageRef {
        ImageRef {
            image: self.image,
            view: self.view,
        }
    }

    pub fn destroy(&mut self, mem: &dyn MemoryRelease) {
        if let Some(allocation) = self.allocation.take() {
            mem.release(
                BoundHandles::Image {
                    image: self.image,
                    view: self.view,
                },
                allocation,
            );
        }
        self.image = vk::Image::null();
        self.view = vk::ImageView::null();
    }
}

impl Drop for GpuImage {
    fn drop(&mut self) {
        if !self.is_null() {
            warn!("GPU image {:?} dropped without destroy(); memory leaked", self.image);
        }
    }
}

/// The device's allocator. Shut it down before the device is destroyed.
pub struct GpuMemory {
    device: ash::Device,
    allocator: Mutex<Option<Allocator>>,
}

impl GpuMemory {
    pub fn new(
        instance: &ash::Instance,
        device: &ash::Device,
        physical_device: vk::PhysicalDevice,
    ) -> Result<Self, AllocError> {
        let allocator = Allocator::new(&AllocatorCreateDesc {
            instance: instance.clone(),
            device: device.clone(),
            physical_device,
            debug_settings: Default::default(),
            buffer_device_address: false,
            allocation_sizes: Default::default(),
        })?;
        Ok(Self {
            device: device.clone(),
            allocator: Mutex::new(Some(allocator)),
        })
    }

    fn allocate(
        &self,
        name: &str,
        requirements: vk::MemoryRequirements,
        location: MemoryLocation,
        linear: bool,
    ) -> Result<Allocation, AllocError> {
        let mut guard = self.allocator.lock().unwrap_or_else(PoisonError::into_inner);
        let allocator = guard.as_mut().ok_or(AllocError::Shutdown)?;
        Ok(allocator.allocate(&AllocationCreateDesc {
            name,
            requirements,
            location,
            linear,
            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
        })?)
    }

    fn free(&self, allocation: Allocation) {
        let mut guard = self.allocator.lock().unwrap_or_else(PoisonError::into_inner);
        match guard.as_mut() {
            Some(allocator) => {
                if let Err(e) = allocator.free(allocation) {
                    warn!("freeing GPU allocation: {e}");
                }
            }
            None => warn!("allocation freed after allocator shutdown"),
        }
    }

    pub fn create_buffer(
        &self,
        name: &str,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        location: MemoryLocation,
    ) -> Result<GpuBuffer, AllocError> {
        let info = vk::BufferCreateInfo {
            s_type: vk::StructureType::BUFFER_CREATE_INFO,
            size,
            usage,
            sharing_mode: vk::SharingMode::EXCLUSIVE,
            ..Default::default()
        };

        unsafe {
            let buffer = self
                .device
                .create_buffer(&info, None)
                .map_err(AllocError::CreateBuffer)?;
            let requirements = self.device.get_buffer_memory_requirements(buffer);

            let allocation = match self.allocate(name, requirements, location, true) {
                Ok(a) => a,
                Err(e) => {
                    self.device.destroy_buffer(buffer, None);
                    return Err(e);
                }
            };
            if let Err(e) =
                self.device
                    .bind_buffer_memory(buffer, allocation.memory(), allocation.offset())
            {
                self.free(allocation);
                self.device.destroy_buffer(buffer, None);
                return Err(AllocError::Bind(e));
            }

            debug!("buffer `{name}`: {size} bytes, {location:?}");
            Ok(GpuBuffer::from_parts(buffer, allocation, size))
        }
    }

    /// Creates a single-mip, single-layer 2D image and a view of it.
    pub fn create_image(
        &self,
        name: &str,
        info: &vk::ImageCreateInfo,
        aspect: vk::ImageAspectFlags,
        location: MemoryLocation,
    ) -> Result<GpuImage, AllocError> {
        unsafe {
            let image = self
                .device
                .create_image(info, None)
                .map_err(AllocError::CreateImage)?;
            let requirements = self.device.get_image_memory_requirements(image);
            let linear = info.tiling == vk::ImageTiling::LINEAR;

            let allocation = match self.allocate(name, requirements, location, linear) {
                Ok(a) => a,
                Err(e) => {
                    self.device.destroy_image(image, None);
                    return Err(e);
                }
            };
            if let Err(e) =
                self.device
                    .bind_image_memory(image, allocation.memory(), allocation.offset())
            {
                self.free(allocation);
                self.device.destroy_image(image, None);
                return Err(AllocError::Bind(e));
            }

            let view_info = vk::ImageViewCreateInfo {
                s_type: vk::StructureType::IMAGE_VIEW_CREATE_INFO,
                image,
                view_type: vk::ImageViewType::TYPE_2D,
                format: info.format,
                subresource_range: vk::ImageSubresourceRange {
                    aspect_mask: aspect,
                    base_mip_level: 0,
                    level_count: 1,
                    base_array_layer: 0,
                    layer_count: 1,
                },
                ..Default::default()
            };
            let view = match self.device.create_image_view(&view_info, None) {
                Ok(v) => v,
                Err(e) => {
                    self.free(allocation);
                    self.device.destroy_image(image, None);
                    return Err(AllocError::CreateView(e));
                }
            };

            debug!(
                "image `{name}`: {}x{} {:?}",
                info.extent.width, info.extent.height, info.format
            );
            let extent = vk::Extent2D {
                width: info.extent.width,
                height: info.extent.height,
            };
            Ok(GpuImage::from_parts(image, view, allocation, info.format, extent))
        }
    }

    /// Drops the allocator, returning its memory blocks to the device.
    pub fn shutdown(&self) {
        let mut guard = self.allocator.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(allocator) = guard.take() {
            debug!("allocator shut down");
            drop(allocator);
        }
    }
}

impl MemoryRelease for GpuMemory {
    fn release(&self, handles: BoundHandles, allocation: Allocation) {
        unsafe {
            match handles {
                BoundHandles::Buffer(buffer) => self.device.destroy_buffer(buffer, None),
                BoundHandles::Image { image, view } => {
                    self.device.destroy_image_view(view, None);
                    self.device.destroy_image(image, None);
                }
            }
        }
        self.free(allocation);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;
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

    fn fake_buffer(raw: u64) -> GpuBuffer {
        GpuBuffer::from_parts(vk::Buffer::from_raw(raw), Allocation::default(), 256)
    }

    #[test]
    fn take_nulls_the_source() {
        let mut src = fake_buffer(7);
        let mut dst = src.take();

        assert!(src.is_null());
        assert_eq!(src.handle(), vk::Buffer::null());
        assert_eq!(src.size(), 0);
        assert!(!dst.is_null());
        assert_eq!(dst.handle(), vk::Buffer::from_raw(7));

        let mem = RecordingRelease::default();
        src.destroy(&mem);
        assert!(mem.released.borrow().is_empty());
        dst.destroy(&mem);
        assert_eq!(*mem.released.borrow(), [BoundHandles::Buffer(vk::Buffer::from_raw(7))]);
    }

    #[test]
    fn destroy_twice_releases_once() {
        let mut buf = fake_buffer(3);
        let mem = RecordingRelease::default();
        buf.destroy(&mem);
        buf.destroy(&mem);
        assert_eq!(mem.released.borrow().len(), 1);
        assert!(buf.is_null());
    }

    #[test]
    fn alias_does_not_transfer_ownership() {
        let mut buf = fake_buffer(11);
        let a = buf.alias();
        let b = a;
        assert_eq!(a, b);
        assert_eq!(a.buffer, buf.handle());
        assert!(!buf.is_null());

        let mem = RecordingRelease::default();
        buf.destroy(&mem);
        assert_eq!(mem.released.borrow().len(), 1);
    }

    #[test]
    fn image_release_carries_view() {
        let mut img = GpuImage {
            image: vk::Image::from_raw(5),
            view: vk::ImageView::from_raw(6),
            allocation: Some(Allocation::default()),
            ..Default::default()
        };
        let mut moved = img.take();
        let mem = RecordingRelease::default();
        img.destroy(&mem);
        moved.destroy(&mem);
        assert_eq!(
            *mem.released.borrow(),
            [BoundHandles::Image {
                image: vk::Image::from_raw(5),
                view: vk::ImageView::from_raw(6),
            }]
        );
    }

    #[test]
    fn unmapped_write_is_rejected() {
        let mut buf = fake_buffer(1);
        assert!(matches!(
            buf.write_bytes(0, &[1, 2, 3]),
            Err(AllocError::NotMapped)
        ));
        buf.destroy(&RecordingRelease::default());
    }
}
