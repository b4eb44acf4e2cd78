// SPDX-License-Identifier: CEPL-1.0
use ash::vk;
use thiserror::Error;

/// Unrecoverable failures at startup or swapchain build time.
#[derive(Debug, Error)]
pub enum FatalError {
    #[error("window handle unavailable: {0}")]
    WindowHandle(#[from] raw_window_handle::HandleError),
    #[error("Vulkan loader: {0}")]
    Loader(String),
    #[error("no physical device meets the minimum requirements")]
    NoSuitableDevice,
    #[error("no supported depth attachment format")]
    NoDepthFormat,
    #[error("surface reports no formats or present modes")]
    SurfaceUnsupported,
    #[error("shader `{name}`: {source}")]
    Shader {
        name: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("{what} pipeline creation failed: {result}")]
    Pipeline {
        what: &'static str,
        result: vk::Result,
    },
    #[error("descriptor set allocation failed: {0}")]
    DescriptorAllocation(vk::Result),
    #[error("{call} failed: {result}")]
    Vk {
        call: &'static str,
        result: vk::Result,
    },
    #[error(transparent)]
    Alloc(#[from] AllocError),
}

/// Tags a raw Vulkan result with the call that produced it.
pub(crate) trait VkContext<T> {
    fn vk_call(self, call: &'static str) -> Result<T, FatalError>;
}

impl<T> VkContext<T> for Result<T, vk::Result> {
    fn vk_call(self, call: &'static str) -> Result<T, FatalError> {
        self.map_err(|result| FatalError::Vk { call, result })
    }
}

/// Failure to create or fill a GPU allocation. Whether this is fatal is up
/// to the caller.
#[derive(Debug, Error)]
pub enum AllocError {
    #[error("vkCreateBuffer: {0}")]
    CreateBuffer(vk::Result),
    #[error("vkCreateImage: {0}")]
    CreateImage(vk::Result),
    #[error("vkCreateImageView: {0}")]
    CreateView(vk::Result),
    #[error("allocator: {0}")]
    Allocate(#[from] gpu_allocator::AllocationError),
    #[error("binding memory: {0}")]
    Bind(vk::Result),
    #[error("allocation is not host-mapped")]
    NotMapped,
    #[error("write of {len} bytes at offset {offset} exceeds {capacity} byte allocation")]
    OutOfBounds {
        offset: usize,
        len: usize,
        capacity: usize,
    },
    #[error("allocator has already been shut down")]
    Shutdown,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vk_call_names_the_failing_call() {
        let r: Result<(), vk::Result> = Err(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY);
        let e = r.vk_call("vkCreateFence").unwrap_err();
        assert!(e.to_string().starts_with("vkCreateFence failed"));
    }

    #[test]
    fn alloc_errors_convert_to_fatal() {
        let e: FatalError = AllocError::NotMapped.into();
        assert!(matches!(e, FatalError::Alloc(AllocError::NotMapped)));
    }
}
