// SPDX-License-Identifier: CEPL-1.0
//! The render thread. It owns the renderer and every GPU resource; the main
//! thread talks to it only through [`RenderMsg`].

use std::path::PathBuf;
use std::sync::mpsc::{Receiver, Sender, TryRecvError};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use tessera_math::{Vec2, Vec4};
use tessera_platform::PlatformWindow;
use tessera_render::{
    AssetLoader, DrawItem, DrawList, Frame, FrameOutcome, ModelImporter, RenderSettings, Renderer,
};
use tessera_render_vk::{validation_error_count, Model, VkRenderer};
use tracing::{debug, error, info, warn};

use crate::assets::FsAssetLoader;
use crate::scene;

#[derive(Debug, Clone, PartialEq)]
pub enum RenderMsg {
    Resized,
    Vkdiag(Vec<String>),
    SetVsync(bool),
    Shutdown,
}

#[derive(Debug, Clone)]
pub struct SceneOpts {
    pub terrain: bool,
    pub seed: u32,
    pub models: Vec<PathBuf>,
    pub lights: u32,
}

pub struct RenderThread {
    tx: Sender<RenderMsg>,
    handle: Option<JoinHandle<Result<()>>>,
}

impl RenderThread {
    pub fn spawn(
        window: Arc<PlatformWindow>,
        settings: RenderSettings,
        scene: SceneOpts,
        tx: Sender<RenderMsg>,
        rx: Receiver<RenderMsg>,
    ) -> Result<Self> {
        let handle = std::thread::Builder::new()
            .name("render".into())
            .spawn(move || run(window, settings, scene, rx))
            .context("spawning the render thread")?;
        Ok(Self {
            tx,
            handle: Some(handle),
        })
    }

    pub fn send(&self, msg: RenderMsg) {
        if self.tx.send(msg).is_err() {
            debug!("render thread gone; message dropped");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, |h| h.is_finished())
    }

    /// Asks the thread to stop and waits for it.
    pub fn shutdown(mut self) -> Result<()> {
        self.send(RenderMsg::Shutdown);
        match self.handle.take() {
            Some(h) => h.join().map_err(|_| anyhow!("render thread panicked"))?,
            None => Ok(()),
        }
    }
}

struct FpsCounter {
    frames: u32,
    since: Instant,
    last_frame: Instant,
    frame_time: Duration,
}

impl FpsCounter {
    fn new() -> Self {
        let now = Instant::now();
        Self {
            frames: 0,
            since: now,
            last_frame: now,
            frame_time: Duration::ZERO,
        }
    }

    fn tick(&mut self) {
        let now = Instant::now();
        self.frame_time = now - self.last_frame;
        self.last_frame = now;
        self.frames += 1;
        if now.duration_since(self.since).as_secs_f32() >= 1.0 {
            info!("fps ~ {}", self.frames);
            self.frames = 0;
            self.since = now;
        }
    }
}

fn build_overlay(list: &mut DrawList, fps: &FpsCounter) {
    list.clear();
    // Full bar at 33 ms.
    let fraction = fps.frame_time.as_secs_f32() / 0.033;
    list.bar(
        Vec2::new(10.0, 10.0),
        Vec2::new(200.0, 12.0),
        fraction,
        Vec4::new(0.2, 0.9, 0.3, 0.9),
    );
}

fn upload_imports(r: &VkRenderer, importer: ModelImporter, models: &mut Vec<Model>) {
    for imported in importer.join() {
        let name = imported.path.display().to_string();
        match r.upload_model(&name, &imported.meshes) {
            Ok(m) => models.push(m),
            Err(e) => warn!("{name}: upload failed: {e}"),
        }
    }
}

fn run(
    window: Arc<PlatformWindow>,
    settings: RenderSettings,
    scene: SceneOpts,
    rx: Receiver<RenderMsg>,
) -> Result<()> {
    let mut r = VkRenderer::new(window, settings).context("Vulkan init")?;
    let loader: Arc<dyn AssetLoader> = Arc::new(FsAssetLoader);
    r.set_asset_loader(Arc::clone(&loader));

    let mut importer = if scene.models.is_empty() {
        None
    } else {
        Some(ModelImporter::spawn(loader, scene.models).context("spawning the model importer")?)
    };

    let mut models = Vec::new();
    if scene.terrain {
        models.push(r.upload_model("terrain", &scene::terrain(scene.seed))?);
        models.push(r.upload_model("blob", &[scene::blob()])?);
    }
    r.set_point_lights(&scene::demo_lights(scene.lights));
    r.set_camera(&scene::demo_camera());

    let mut overlay = DrawList::new();
    let mut fps = FpsCounter::new();
    'frames: loop {
        loop {
            match rx.try_recv() {
                Ok(RenderMsg::Resized) => r.resize()?,
                Ok(RenderMsg::Vkdiag(args)) => {
                    let args: Vec<&str> = args.iter().map(String::as_str).collect();
                    r.vkdiag(&args);
                }
                Ok(RenderMsg::SetVsync(on)) => r.set_vsync(on),
                Ok(RenderMsg::Shutdown) | Err(TryRecvError::Disconnected) => break 'frames,
                Err(TryRecvError::Empty) => break,
            }
        }

        if importer.as_ref().is_some_and(ModelImporter::is_finished) {
            if let Some(done) = importer.take() {
                upload_imports(&r, done, &mut models);
            }
        }

        build_overlay(&mut overlay, &fps);
        let draws: Vec<DrawItem<'_, VkRenderer>> = models
            .iter()
            .map(|model| DrawItem {
                model,
                material: None,
            })
            .collect();
        let frame = Frame {
            draws: &draws,
            overlay: &overlay,
        };
        match r.render(&frame) {
            Ok(FrameOutcome::Presented { .. }) => fps.tick(),
            Ok(FrameOutcome::Rebuilt) => debug!("swapchain rebuilt"),
            Ok(FrameOutcome::Skipped) => std::thread::sleep(Duration::from_millis(16)),
            Err(e) => {
                error!("render error: {e:#}");
                return Err(e);
            }
        }
    }

    for m in models {
        r.destroy_model(m)?;
    }
    let errors = validation_error_count();
    if errors > 0 {
        warn!("{errors} validation errors this run");
    }
    info!("render thread done after {} frames", r.frame_count());
    Ok(())
}
