// SPDX-License-Identifier: CEPL-1.0
use std::sync::Arc;

use anyhow::{Context, Result};
use tessera_render::{DrawableSurface, Frame, FrameOutcome, RenderSettings, Renderer};
use tracing::debug;

use crate::context::VkRenderer;
use crate::material::Material;
use crate::model::Model;

impl Renderer for VkRenderer {
    type Model = Model;
    type Material = Material;

    fn new(surface: Arc<dyn DrawableSurface>, settings: RenderSettings) -> Result<Self> {
        VkRenderer::new(surface, settings).context("creating the Vulkan renderer")
    }

    fn resize(&mut self) -> Result<()> {
        self.needs_rebuild = true;
        Ok(())
    }

    fn render(&mut self, frame: &Frame<'_, Self>) -> Result<FrameOutcome> {
        if self.window.drawable_size().is_empty() {
            return Ok(FrameOutcome::Skipped);
        }
        if self.needs_rebuild {
            self.rebuild_swapchain()?;
            return Ok(FrameOutcome::Rebuilt);
        }

        let draws = frame.draws.iter().map(|d| (d.model, d.material));
        if self.draw_frame(draws, frame.overlay)? {
            Ok(FrameOutcome::Presented { frame: self.frame })
        } else {
            debug!("swapchain out of date after frame {}", self.frame);
            self.rebuild_swapchain()?;
            Ok(FrameOutcome::Rebuilt)
        }
    }

    fn set_clear_color(&mut self, rgba: [f32; 4]) {
        self.settings.clear_color = rgba;
    }

    fn set_vsync(&mut self, on: bool) {
        if self.settings.vsync != on {
            self.settings.vsync = on;
            self.needs_rebuild = true;
        }
    }
}
