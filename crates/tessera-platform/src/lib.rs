// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]

use std::sync::Arc;

use raw_window_handle::{DisplayHandle, HandleError, HasDisplayHandle, HasWindowHandle, WindowHandle};
use tessera_render::{DrawableSurface, RenderSize};

pub use winit;
use winit::window::Window;

/// Shared handle to the application window, handed to the renderer so the
/// surface never outlives the native window it was created from.
#[derive(Clone)]
pub struct PlatformWindow {
    window: Arc<Window>,
}

impl PlatformWindow {
    pub fn new(window: Window) -> Self {
        Self {
            window: Arc::new(window),
        }
    }

    pub fn window(&self) -> &Window {
        &self.window
    }
}

impl HasWindowHandle for PlatformWindow {
    fn window_handle(&self) -> Result<WindowHandle<'_>, HandleError> {
        self.window.window_handle()
    }
}

impl HasDisplayHandle for PlatformWindow {
    fn display_handle(&self) -> Result<DisplayHandle<'_>, HandleError> {
        self.window.display_handle()
    }
}

impl DrawableSurface for PlatformWindow {
    fn drawable_size(&self) -> RenderSize {
        let size = self.window.inner_size();
        RenderSize {
            width: size.width,
            height: size.height,
        }
    }
}
