// SPDX-License-Identifier: CEPL-1.0
//! Host-mirrored uniform data with an explicit staged upload.

use ash::vk;
use bytemuck::Pod;
use gpu_allocator::MemoryLocation;

use crate::command::OneTimeSubmit;
use crate::error::{AllocError, FatalError};
use crate::memory::{BufferRef, GpuBuffer, GpuMemory, MemoryRelease};

/// A value `T` plus a host-visible staging buffer and a device-local copy.
///
/// `update()` always goes host → staging → device. The staging buffer is not
/// double-buffered: do not update while a submitted frame still reads the
/// device copy through a transfer that has not completed.
pub struct UniformBlock<T: Pod> {
    pub data: T,
    staging: GpuBuffer,
    device_local: GpuBuffer,
}

/// Host value only; owns no GPU memory until replaced by [`UniformBlock::new`].
impl<T: Pod + Default> Default for UniformBlock<T> {
    fn default() -> Self {
        Self {
            data: T::default(),
            staging: GpuBuffer::default(),
            device_local: GpuBuffer::default(),
        }
    }
}

impl<T: Pod> UniformBlock<T> {
    pub const SIZE: vk::DeviceSize = std::mem::size_of::<T>() as vk::DeviceSize;

    pub fn new(mem: &GpuMemory, name: &str, data: T) -> Result<Self, AllocError> {
        let mut staging = mem.create_buffer(
            &format!("{name} (staging)"),
            Self::SIZE,
            vk::BufferUsageFlags::TRANSFER_SRC,
            MemoryLocation::CpuToGpu,
        )?;
        let device_local = match mem.create_buffer(
            name,
            Self::SIZE,
            vk::BufferUsageFlags::UNIFORM_BUFFER | vk::BufferUsageFlags::TRANSFER_DST,
            MemoryLocation::GpuOnly,
        ) {
            Ok(b) => b,
            Err(e) => {
                staging.destroy(mem);
                return Err(e);
            }
        };
        Ok(Self {
            data,
            staging,
            device_local,
        })
    }

    /// The buffer shaders bind.
    pub fn buffer(&self) -> BufferRef {
        self.device_local.alias()
    }

    pub fn descriptor_info(&self) -> vk::DescriptorBufferInfo {
        vk::DescriptorBufferInfo {
            buffer: self.device_local.handle(),
            offset: 0,
            range: Self::SIZE,
        }
    }

    pub fn update(&mut self, onetime: &OneTimeSubmit) -> Result<(), FatalError> {
        self.staging.write_pod(0, &self.data)?;
        let (src, dst) = (self.staging.handle(), self.device_local.handle());
        onetime.run(|device, cmd| unsafe {
            let region = vk::BufferCopy {
                src_offset: 0,
                dst_offset: 0,
                size: Self::SIZE,
            };
            device.cmd_copy_buffer(cmd, src, dst, std::slice::from_ref(&region));
        })
    }

    /// Releases both allocations; `data` is untouched.
    pub fn destroy(&mut self, mem: &dyn MemoryRelease) {
        self.staging.destroy(mem);
        self.device_local.destroy(mem);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_render::{CameraUniform, PointLightBlock};

    #[test]
    fn size_is_the_host_type_size() {
        assert_eq!(UniformBlock::<CameraUniform>::SIZE, 208);
        assert_eq!(
            UniformBlock::<PointLightBlock>::SIZE as usize,
            PointLightBlock::BYTE_SIZE
        );
    }

    #[test]
    fn default_block_owns_nothing() {
        let block = UniformBlock::<CameraUniform>::default();
        assert_eq!(block.buffer().buffer, vk::Buffer::null());
        assert_eq!(block.descriptor_info().range, 208);
    }
}
