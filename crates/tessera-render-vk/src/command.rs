// SPDX-License-Identifier: CEPL-1.0
//! Single-use command buffers for setup-time transfers.

use ash::vk;

use crate::error::{FatalError, VkContext};

/// Records into a fresh primary buffer from `pool` and submits it to
/// `queue`, blocking on queue-idle before the buffer is freed.
///
/// Synchronous against all other work on the queue; not for per-frame data.
#[derive(Clone)]
pub struct OneTimeSubmit {
    device: ash::Device,
    pool: vk::CommandPool,
    queue: vk::Queue,
}

impl OneTimeSubmit {
    pub fn new(device: ash::Device, pool: vk::CommandPool, queue: vk::Queue) -> Self {
        Self {
            device,
            pool,
            queue,
        }
    }

    pub fn device(&self) -> &ash::Device {
        &self.device
    }

    pub fn begin(&self) -> Result<vk::CommandBuffer, FatalError> {
        let ai = vk::CommandBufferAllocateInfo {
            s_type: vk::StructureType::COMMAND_BUFFER_ALLOCATE_INFO,
            command_pool: self.pool,
            level: vk::CommandBufferLevel::PRIMARY,
            command_buffer_count: 1,
            ..Default::default()
        };
        let bi = vk::CommandBufferBeginInfo {
            s_type: vk::StructureType::COMMAND_BUFFER_BEGIN_INFO,
            flags: vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT,
            ..Default::default()
        };
        unsafe {
            let cmd = self
                .device
                .allocate_command_buffers(&ai)
                .vk_call("vkAllocateCommandBuffers")?[0];
            if let Err(e) = self.device.begin_command_buffer(cmd, &bi) {
                self.device.free_command_buffers(self.pool, &[cmd]);
                return Err(FatalError::Vk {
                    call: "vkBeginCommandBuffer",
                    result: e,
                });
            }
            Ok(cmd)
        }
    }

    /// Ends, submits and waits for `cmd`, then frees it.
    pub fn consume(&self, cmd: vk::CommandBuffer) -> Result<(), FatalError> {
        let result = unsafe { self.submit_and_wait(cmd) };
        unsafe { self.device.free_command_buffers(self.pool, &[cmd]) };
        result
    }

    unsafe fn submit_and_wait(&self, cmd: vk::CommandBuffer) -> Result<(), FatalError> {
        self.device
            .end_command_buffer(cmd)
            .vk_call("vkEndCommandBuffer")?;
        let si = vk::SubmitInfo {
            s_type: vk::StructureType::SUBMIT_INFO,
            command_buffer_count: 1,
            p_command_buffers: &cmd,
            ..Default::default()
        };
        self.device
            .queue_submit(self.queue, std::slice::from_ref(&si), vk::Fence::null())
            .vk_call("vkQueueSubmit")?;
        self.device
            .queue_wait_idle(self.queue)
            .vk_call("vkQueueWaitIdle")
    }

    /// `begin`, run `record`, `consume`.
    pub fn run(&self, record: impl FnOnce(&ash::Device, vk::CommandBuffer)) -> Result<(), FatalError> {
        let cmd = self.begin()?;
        record(&self.device, cmd);
        self.consume(cmd)
    }
}
