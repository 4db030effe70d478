use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use winit::application::ApplicationHandler;
use winit::dpi::LogicalSize;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::{Window, WindowId};

use crate::context::{ContextRegistry, GpuContext};
use crate::core::{App, AppControl};
use crate::device::{GpuInit, SurfaceErrorAction, WgpuDriver};
use crate::error::GpuError;
use crate::time::{DisplayLink, DEFAULT_FRAMES_PER_SECOND};
use crate::view::{FrameCallback, RenderSurfaceView};

/// Window/runtime configuration.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub title: String,
    pub initial_size: LogicalSize<f64>,
    pub preferred_frames_per_second: u32,
    pub start_paused: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            title: "aglkit".to_string(),
            initial_size: LogicalSize::new(800.0, 600.0),
            preferred_frames_per_second: DEFAULT_FRAMES_PER_SECOND,
            start_paused: false,
        }
    }
}

/// Runtime context passed to the application.
///
/// Commands are buffered and applied after the current callback returns.
pub struct RuntimeCtx {
    paused: bool,
    preferred_frames_per_second: u32,
    commands: Vec<Command>,
}

impl RuntimeCtx {
    fn snapshot(link: &DisplayLink) -> Self {
        Self {
            paused: link.is_paused(),
            preferred_frames_per_second: link.preferred_frames_per_second(),
            commands: Vec::new(),
        }
    }

    /// Whether the display link was paused when the callback started.
    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn preferred_frames_per_second(&self) -> u32 {
        self.preferred_frames_per_second
    }

    pub fn set_paused(&mut self, paused: bool) {
        self.commands.push(Command::SetPaused(paused));
    }

    pub fn set_preferred_frames_per_second(&mut self, frames_per_second: u32) {
        self.commands
            .push(Command::SetPreferredFramesPerSecond(frames_per_second));
    }

    pub fn exit(&mut self) {
        self.commands.push(Command::Exit);
    }
}

enum Command {
    SetPaused(bool),
    SetPreferredFramesPerSecond(u32),
    Exit,
}

/// Entry point for the runtime.
pub struct Runtime;

impl Runtime {
    /// Opens one window backed by a [`WgpuDriver`] context and drives `app`
    /// from a [`DisplayLink`] until the window closes or the app exits.
    pub fn run<A: App>(config: RuntimeConfig, gpu_init: GpuInit, app: A) -> Result<()> {
        let event_loop = EventLoop::new().context("failed to create winit EventLoop")?;
        let mut state = AppState::new(config, gpu_init, app);

        event_loop
            .run_app(&mut state)
            .context("winit event loop terminated with error")?;

        match state.error.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// Per-window render state. Field order is drop order: the view releases
/// its buffers while the context is still referenced.
struct SurfaceEntry {
    view: RenderSurfaceView,
    context: GpuContext,
    window: Arc<Window>,
}

struct AppState<A: App> {
    config: RuntimeConfig,
    gpu_init: GpuInit,
    app: Rc<RefCell<A>>,
    registry: ContextRegistry,
    link: DisplayLink,

    surface: Option<SurfaceEntry>,
    exit_requested: bool,
    error: Option<anyhow::Error>,
}

impl<A: App> AppState<A> {
    fn new(config: RuntimeConfig, gpu_init: GpuInit, app: A) -> Self {
        let mut link = DisplayLink::new(config.preferred_frames_per_second);
        link.set_paused(config.start_paused);
        Self {
            config,
            gpu_init,
            app: Rc::new(RefCell::new(app)),
            registry: ContextRegistry::new(),
            link,
            surface: None,
            exit_requested: false,
            error: None,
        }
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, err: anyhow::Error) {
        log::error!("{err:#}");
        self.error.get_or_insert(err);
        self.exit_requested = true;
        event_loop.exit();
    }

    fn create_surface(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let attrs = Window::default_attributes()
            .with_title(self.config.title.clone())
            .with_inner_size(self.config.initial_size);

        let window = Arc::new(
            event_loop
                .create_window(attrs)
                .context("failed to create window")?,
        );

        let driver = pollster::block_on(WgpuDriver::new(window.clone(), self.gpu_init.clone()))
            .context("GPU initialization failed for window")?;
        log::debug!("surface format {:?}", driver.surface_format());

        let context = GpuContext::new(&self.registry, Box::new(driver));
        let mut view = RenderSurfaceView::with_context(&self.registry, &context)
            .context("failed to allocate view render target")?;
        view.layout(&*window);

        self.app
            .borrow_mut()
            .init(&self.registry, &context)
            .context("application init failed")?;

        let callback: Rc<RefCell<dyn FrameCallback>> = self.app.clone();
        view.set_frame_callback(Some(callback));

        window.request_redraw();
        self.surface = Some(SurfaceEntry {
            view,
            context,
            window,
        });
        Ok(())
    }

    fn apply_commands(&mut self, event_loop: &ActiveEventLoop, ctx: RuntimeCtx) {
        for cmd in ctx.commands {
            match cmd {
                Command::SetPaused(paused) => self.link.set_paused(paused),
                Command::SetPreferredFramesPerSecond(fps) => {
                    self.link.set_preferred_frames_per_second(fps)
                }
                Command::Exit => self.exit_requested = true,
            }
        }

        if self.exit_requested {
            event_loop.exit();
        }
    }

    fn redraw(&mut self, event_loop: &ActiveEventLoop) {
        let Some(time) = self.link.poll(Instant::now()) else {
            return;
        };

        let mut runtime_ctx = RuntimeCtx::snapshot(&self.link);
        self.app.borrow_mut().update(time, &mut runtime_ctx);
        self.apply_commands(event_loop, runtime_ctx);
        if self.exit_requested {
            return;
        }

        let Some(entry) = self.surface.as_mut() else { return };
        let context_id = entry.context.id();
        match entry.view.display(&*entry.window) {
            Ok(()) => {}
            Err(GpuError::Present(SurfaceErrorAction::Fatal)) => {
                self.fail(
                    event_loop,
                    anyhow::anyhow!("fatal surface error while presenting {context_id}"),
                );
            }
            Err(GpuError::Present(SurfaceErrorAction::Reconfigured)) => {
                entry.view.layout(&*entry.window);
            }
            Err(GpuError::Present(SurfaceErrorAction::SkipFrame)) => {
                log::trace!("frame {} skipped", time.frame_index);
            }
            Err(err) => log::error!("frame {} failed in {context_id}: {err}", time.frame_index),
        }
    }
}

impl<A: App> ApplicationHandler for AppState<A> {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.surface.is_some() {
            return;
        }

        if let Err(err) = self.create_surface(event_loop) {
            self.fail(event_loop, err);
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if self.exit_requested {
            event_loop.exit();
            return;
        }

        let now = Instant::now();
        match self.link.next_deadline(now) {
            Some(deadline) if deadline <= now => {
                event_loop.set_control_flow(ControlFlow::Wait);
                if let Some(entry) = &self.surface {
                    entry.window.request_redraw();
                }
            }
            Some(deadline) => event_loop.set_control_flow(ControlFlow::WaitUntil(deadline)),
            None => event_loop.set_control_flow(ControlFlow::Wait),
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, window_id: WindowId, event: WindowEvent) {
        if self.exit_requested {
            event_loop.exit();
            return;
        }
        if self
            .surface
            .as_ref()
            .is_none_or(|entry| entry.window.id() != window_id)
        {
            return;
        }

        let mut runtime_ctx = RuntimeCtx::snapshot(&self.link);
        let control = self
            .app
            .borrow_mut()
            .on_window_event(&event, &mut runtime_ctx);
        if control == AppControl::Exit {
            runtime_ctx.exit();
        }
        self.apply_commands(event_loop, runtime_ctx);
        if self.exit_requested {
            return;
        }

        match event {
            WindowEvent::CloseRequested => {
                self.surface = None;
                self.exit_requested = true;
                event_loop.exit();
            }

            WindowEvent::Resized(_) | WindowEvent::ScaleFactorChanged { .. } => {
                if let Some(entry) = self.surface.as_mut() {
                    entry.view.layout(&*entry.window);
                    entry.window.request_redraw();
                }
            }

            WindowEvent::RedrawRequested => self.redraw(event_loop),

            _ => {}
        }
    }
}
