// SPDX-License-Identifier: CEPL-1.0
//! Vulkan forward+ rendering core.
//!
//! [`VkRenderer`] owns the device, the swapchain-dependent resources and the
//! per-frame protocol. It implements [`tessera_render::Renderer`] for callers
//! that only want whole frames, and exposes the individual protocol steps
//! for callers that drive the chain themselves.

mod command;
mod context;
mod descriptors;
mod device;
pub mod diag;
mod error;
mod frame;
pub mod layout;
pub mod lightcull;
mod material;
mod memory;
mod model;
pub mod overlay;
mod passes;
mod pipeline;
mod renderer;
mod shaders;
pub mod swapchain;
pub mod sync;
mod uniform;

pub use command::OneTimeSubmit;
pub use context::VkRenderer;
pub use device::{
    meets_feature_floor, select_queue_families, validation_error_count, DebugNames, FamilyCaps,
    FamilyInfo, QueueFamilies,
};
pub use error::{AllocError, FatalError};
pub use lightcull::{TileGrid, TILE_SIZE};
pub use material::{Material, ALBEDO_FORMAT, NORMAL_FORMAT};
pub use memory::{BoundHandles, BufferRef, GpuBuffer, GpuImage, GpuMemory, ImageRef, MemoryRelease};
pub use model::{Mesh, Model};
pub use pipeline::Pipeline;
pub use sync::{ChainError, FrameGraph, FrameState, Stage, Submission, SwapchainState, SyncPoint};
pub use uniform::UniformBlock;
