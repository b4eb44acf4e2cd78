// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]

use std::sync::Arc;

use anyhow::Result;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};

pub mod assets;
pub mod import;
pub mod marching_cubes;
pub mod mesh;
pub mod overlay;
pub mod terrain;
pub mod uniforms;
pub mod vertex;

pub use assets::{AssetError, AssetLoader, ImageData};
pub use import::{ImportedModel, ModelImporter};
pub use mesh::MeshData;
pub use overlay::{DrawList, OverlayVertex};
pub use uniforms::{
    Camera, CameraUniform, MaterialInfo, ObjectUniform, PointLight, PointLightBlock,
};
pub use vertex::{Index, Vertex};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RenderSize {
    pub width: u32,
    pub height: u32,
}

impl RenderSize {
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// The windowing side of the renderer: native handles plus the current
/// drawable size, queried at construction and after every resize.
pub trait DrawableSurface: HasWindowHandle + HasDisplayHandle + Send + Sync {
    fn drawable_size(&self) -> RenderSize;
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RenderSettings {
    pub clear_color: [f32; 4],
    pub vsync: bool,
    pub debug_view: i32,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            clear_color: [0.0, 0.0, 0.0, 1.0],
            vsync: false,
            debug_view: 0,
        }
    }
}

/// What happened to one call of [`Renderer::render`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameOutcome {
    /// The frame reached the present queue; `frame` is the new frame counter.
    Presented { frame: u64 },
    /// The swapchain was out of date and has been rebuilt; nothing was drawn.
    Rebuilt,
    /// The drawable has zero area, so the frame was skipped.
    Skipped,
}

pub struct DrawItem<'a, R: Renderer + ?Sized> {
    pub model: &'a R::Model,
    pub material: Option<&'a R::Material>,
}

/// Everything one frame draws.
pub struct Frame<'a, R: Renderer + ?Sized> {
    pub draws: &'a [DrawItem<'a, R>],
    pub overlay: &'a DrawList,
}

pub trait Renderer {
    type Model;
    type Material;

    fn new(surface: Arc<dyn DrawableSurface>, settings: RenderSettings) -> Result<Self>
    where
        Self: Sized;

    /// Called after the windowing side reports a new drawable size.
    fn resize(&mut self) -> Result<()>;
    fn render(&mut self, frame: &Frame<'_, Self>) -> Result<FrameOutcome>;
    fn set_clear_color(&mut self, rgba: [f32; 4]);
    fn set_vsync(&mut self, _on: bool) {}
}
