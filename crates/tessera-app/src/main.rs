// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use clap::Parser;
use tessera_core::{init_tracing, CommandQueue, Console};
use tessera_platform::PlatformWindow;
use tracing::{error, info};

use tessera_platform::winit::{
    application::ApplicationHandler,
    dpi::PhysicalSize,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    window::{Window, WindowId},
};

mod assets;
mod config;
mod render;
mod scene;

use config::AppCfg;
use render::{RenderMsg, RenderThread, SceneOpts};

/// How often the main thread wakes to drain the console.
const CONSOLE_POLL: Duration = Duration::from_millis(50);

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file
    #[arg(long, default_value = "tessera.toml")]
    config: PathBuf,
    /// Model file or folder to import at startup (repeatable)
    #[arg(long = "model")]
    models: Vec<PathBuf>,
    /// Seed for the procedural terrain
    #[arg(long, default_value_t = 0)]
    heightmap_seed: u32,
    /// Skip the procedural terrain
    #[arg(long)]
    no_terrain: bool,
}

struct App {
    args: Args,
    cfg: AppCfg,
    window: Option<Arc<PlatformWindow>>,
    render: Option<RenderThread>,
    tx: Sender<RenderMsg>,
    rx: Option<Receiver<RenderMsg>>,

    console: Console,
    queue: CommandQueue,
    quit: Arc<AtomicBool>,
    exiting: bool,
}

impl App {
    fn new(args: Args, cfg: AppCfg) -> Result<Self> {
        let (tx, rx) = mpsc::channel();
        let quit = Arc::new(AtomicBool::new(false));
        let mut console = Console::new();

        let diag_tx = tx.clone();
        console.add_command("vkdiag", "vkdiag ext|gpu|queue", move |args| {
            let _ = diag_tx.send(RenderMsg::Vkdiag(args.to_vec()));
        })?;
        let vsync_tx = tx.clone();
        console.add_command("vsync", "vsync on|off", move |args| {
            match args.first().map(String::as_str) {
                Some("on") => {
                    let _ = vsync_tx.send(RenderMsg::SetVsync(true));
                }
                Some("off") => {
                    let _ = vsync_tx.send(RenderMsg::SetVsync(false));
                }
                _ => info!("Usage: vsync on|off"),
            }
        })?;
        let quit_flag = Arc::clone(&quit);
        console.add_command("quit", "quit - exit the program", move |_| {
            quit_flag.store(true, Ordering::Relaxed);
        })?;

        Ok(Self {
            args,
            cfg,
            window: None,
            render: None,
            tx,
            rx: Some(rx),
            console,
            queue: CommandQueue::new(),
            quit,
            exiting: false,
        })
    }

    fn scene_opts(&self) -> SceneOpts {
        SceneOpts {
            terrain: !self.args.no_terrain,
            seed: self.args.heightmap_seed,
            models: self.args.models.clone(),
            lights: self.cfg.render.point_lights,
        }
    }

    fn start(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let attrs = Window::default_attributes()
            .with_title(self.cfg.window.title.clone())
            .with_inner_size(PhysicalSize::new(self.cfg.window.width, self.cfg.window.height));
        let window = Arc::new(PlatformWindow::new(event_loop.create_window(attrs)?));
        let rx = self.rx.take().ok_or_else(|| anyhow::anyhow!("render thread already started"))?;
        let thread = RenderThread::spawn(
            Arc::clone(&window),
            self.cfg.render.settings(),
            self.scene_opts(),
            self.tx.clone(),
            rx,
        )?;
        info!("vsync cfg = {}", self.cfg.render.vsync);
        self.window = Some(window);
        self.render = Some(thread);
        Ok(())
    }

    fn shutdown(&mut self, event_loop: &ActiveEventLoop) {
        if self.exiting {
            return;
        }
        self.exiting = true;
        if let Some(thread) = self.render.take() {
            if let Err(e) = thread.shutdown() {
                error!("render thread: {e:#}");
            }
        }
        self.window = None;
        event_loop.exit();
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_none() && !self.exiting {
            if let Err(e) = self.start(event_loop) {
                error!("startup failed: {e:#}");
                self.shutdown(event_loop);
            }
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        window_id: WindowId,
        event: WindowEvent,
    ) {
        if let Some(window) = &self.window {
            if window_id != window.window().id() {
                return;
            }
        }

        match event {
            WindowEvent::CloseRequested => {
                info!("CloseRequested");
                self.shutdown(event_loop);
            }
            WindowEvent::Resized(size) => {
                info!("Resized → {}x{}", size.width, size.height);
                if let Some(r) = &self.render {
                    r.send(RenderMsg::Resized);
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if self.exiting {
            return;
        }
        self.console.run_pending(&self.queue);
        let render_died = self.render.as_ref().is_some_and(RenderThread::is_finished);
        if self.quit.load(Ordering::Relaxed) || render_died {
            self.shutdown(event_loop);
            return;
        }
        event_loop.set_control_flow(ControlFlow::WaitUntil(Instant::now() + CONSOLE_POLL));
    }
}

/// Feeds stdin lines into `queue` until stdin closes.
fn spawn_stdin_reader(queue: CommandQueue) -> std::io::Result<()> {
    std::thread::Builder::new()
        .name("console".into())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                match line {
                    Ok(l) if !l.trim().is_empty() => queue.push(l),
                    Ok(_) => {}
                    Err(_) => break,
                }
            }
        })?;
    Ok(())
}

fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();
    let cfg = config::load(&args.config);
    let event_loop: EventLoop<()> = EventLoop::new()?;

    let mut app = App::new(args, cfg)?;
    spawn_stdin_reader(app.queue.clone())?;
    event_loop.run_app(&mut app)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn args_defaults_and_repeatable_models() {
        let a = Args::try_parse_from(["tessera"]).unwrap();
        assert_eq!(a.config, PathBuf::from("tessera.toml"));
        assert!(a.models.is_empty());
        assert!(!a.no_terrain);

        let a = Args::try_parse_from([
            "tessera",
            "--model",
            "a.obj",
            "--model",
            "assets/",
            "--heightmap-seed",
            "42",
            "--no-terrain",
        ])
        .unwrap();
        assert_eq!(a.models.len(), 2);
        assert_eq!(a.heightmap_seed, 42);
        assert!(a.no_terrain);
    }

    #[test]
    fn console_forwards_to_the_render_channel() {
        let mut app = App::new(Args::try_parse_from(["tessera"]).unwrap(), AppCfg::default()).unwrap();
        let rx = app.rx.take().unwrap();
        app.queue.push("vkdiag gpu");
        app.queue.push("vsync on");
        app.console.run_pending(&app.queue);
        assert_eq!(rx.try_recv().unwrap(), RenderMsg::Vkdiag(vec!["gpu".to_owned()]));
        assert_eq!(rx.try_recv().unwrap(), RenderMsg::SetVsync(true));

        app.console.run("quit").unwrap();
        assert!(app.quit.load(Ordering::Relaxed));
    }
}
