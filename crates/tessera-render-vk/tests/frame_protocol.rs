// SPDX-License-Identifier: CEPL-1.0
//! End-to-end runs against a real window and device.
//!
//! Run with `cargo test -p tessera-render-vk -- --ignored` on a machine with
//! a display and a Vulkan driver.

use std::sync::Arc;

use tessera_math::{IVec2, UVec2};
use tessera_platform::winit::dpi::PhysicalSize;
use tessera_platform::winit::event_loop::EventLoop;
use tessera_platform::winit::window::Window;
use tessera_platform::PlatformWindow;
use tessera_render::terrain::Heightmap;
use tessera_render::{DrawItem, DrawList, Frame, FrameOutcome, RenderSettings, Renderer};
use tessera_render_vk::{validation_error_count, FrameState, Stage, VkRenderer};

fn open_window() -> (EventLoop<()>, Arc<PlatformWindow>) {
    #[cfg(all(unix, not(target_os = "macos")))]
    let event_loop = {
        use tessera_platform::winit::platform::x11::EventLoopBuilderExtX11;
        EventLoop::builder().with_any_thread(true).build().unwrap()
    };
    #[cfg(not(all(unix, not(target_os = "macos"))))]
    let event_loop = EventLoop::new().unwrap();

    let attrs = Window::default_attributes()
        .with_title("tessera frame protocol")
        .with_inner_size(PhysicalSize::new(800, 600))
        .with_resizable(false);
    #[allow(deprecated)]
    let window = event_loop.create_window(attrs).unwrap();
    (event_loop, Arc::new(PlatformWindow::new(window)))
}

#[test]
#[ignore = "needs a display and a Vulkan device"]
fn empty_frames_run_the_whole_chain() {
    tessera_core::init_tracing();
    let (_event_loop, window) = open_window();
    let errors_before = validation_error_count();

    let mut r = VkRenderer::new(window, RenderSettings::default()).unwrap();
    assert_eq!(r.extent().width, 800);
    assert_eq!(r.extent().height, 600);
    assert_eq!(r.tile_grid().tiles, UVec2::new(50, 38));

    let overlay = DrawList::new();
    let mut last = r.frame_count();
    for _ in 0..3 {
        if !r.start_render().unwrap() {
            r.rebuild_swapchain().unwrap();
            continue;
        }
        r.flush_uniforms().unwrap();
        r.start_render_record().unwrap();
        r.end_render_record().unwrap();

        let prepass = r.submit_prepass(&[]).unwrap();
        let culled = r.compute_lightcull(&[prepass]).unwrap();
        let shaded = r.submit_geometry(&[culled]).unwrap();
        let done = r.render_imgui(&overlay, &[shaded]).unwrap();
        let _ = r.present_frame(done).unwrap();

        assert_eq!(r.frame_state(), FrameState::Idle);
        assert_eq!(r.frame_count(), last + 1);
        last = r.frame_count();

        let stages: Vec<_> = r.frame_graph().submissions().iter().map(|s| s.stage).collect();
        assert_eq!(stages, Stage::ORDER);
        r.frame_graph().validate().unwrap();
    }

    drop(r);
    assert_eq!(validation_error_count(), errors_before);
}

#[test]
#[ignore = "needs a display and a Vulkan device"]
fn terrain_renders_through_the_renderer_trait() {
    tessera_core::init_tracing();
    let (_event_loop, window) = open_window();
    let errors_before = validation_error_count();

    let mut r = <VkRenderer as Renderer>::new(window, RenderSettings::default()).unwrap();
    let tile = Heightmap::from_fn(IVec2::ZERO, 16, |x, y| ((x * y) as u16) * 100);
    let model = r.upload_model("terrain", &[tile.to_mesh()]).unwrap();
    assert_eq!(model.meshes().len(), 1);
    let material = r.create_material(None, None).unwrap();

    let mut overlay = DrawList::new();
    overlay.rect([10.0, 10.0].into(), [200.0, 40.0].into(), [0.0, 0.0, 0.0, 0.6].into());

    let draws = [
        DrawItem {
            model: &model,
            material: Some(&material),
        },
        DrawItem {
            model: &model,
            material: None,
        },
    ];
    let mut presented = 0;
    for _ in 0..4 {
        let outcome = r
            .render(&Frame {
                draws: &draws,
                overlay: &overlay,
            })
            .unwrap();
        if let FrameOutcome::Presented { frame } = outcome {
            presented += 1;
            assert_eq!(frame, r.frame_count());
        }
    }
    assert!(presented > 0);

    r.resize().unwrap();
    let outcome = r
        .render(&Frame {
            draws: &[],
            overlay: &overlay,
        })
        .unwrap();
    assert_eq!(outcome, FrameOutcome::Rebuilt);

    r.destroy_material(material).unwrap();
    r.destroy_model(model).unwrap();
    drop(r);
    assert_eq!(validation_error_count(), errors_before);
}
