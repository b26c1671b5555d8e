//! Window, device and event loop glue around [`Application`]

use crate::application::{Application, Command, MouseButton};
use anyhow::{anyhow, Context};
use std::sync::Arc;
use umbra_core::SceneInfo;
use umbra_render::{GpuResources, RenderConfig, WgpuBackend};
use winit::{
    application::ApplicationHandler,
    event::{ElementState, MouseScrollDelta, WindowEvent},
    event_loop::ActiveEventLoop,
    window::{Window, WindowId},
};

/// Pixels per wheel "line" for touchpads that report pixel deltas
const PIXELS_PER_LINE: f32 = 20.0;

pub struct ViewerOptions {
    pub scene: SceneInfo,
    pub scene_name: String,
    pub config: RenderConfig,
    pub width: u32,
    pub height: u32,
}

pub struct App {
    options: ViewerOptions,
    state: Option<AppState>,
    error: Option<anyhow::Error>,
}

struct AppState {
    window: Arc<Window>,
    gpu: GpuResources,
    application: Application,
}

impl App {
    pub fn new(options: ViewerOptions) -> Self {
        Self { options, state: None, error: None }
    }

    /// Error that stopped the event loop, if any
    pub fn take_error(&mut self) -> Option<anyhow::Error> {
        self.error.take()
    }

    fn init(&self, event_loop: &ActiveEventLoop) -> anyhow::Result<AppState> {
        let window = Arc::new(
            event_loop
                .create_window(
                    Window::default_attributes()
                        .with_title(format!("Umbra - {}", self.options.scene_name))
                        .with_inner_size(winit::dpi::PhysicalSize::new(
                            self.options.width,
                            self.options.height,
                        )),
                )
                .context("Failed to create window")?,
        );

        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });
        let surface = instance
            .create_surface(window.clone())
            .context("Failed to create surface")?;

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: Some(&surface),
            force_fallback_adapter: false,
        }))
        .ok_or_else(|| anyhow!("Failed to find a suitable GPU adapter"))?;
        let info = adapter.get_info();
        log::info!("Using adapter {} ({:?}, {:?})", info.name, info.backend, info.device_type);

        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("Umbra Device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                memory_hints: wgpu::MemoryHints::default(),
            },
            None,
        ))
        .context("Failed to create device")?;
        device.on_uncaptured_error(Box::new(|err| log::error!("Uncaptured GPU error: {}", err)));

        let device = Arc::new(device);
        let queue = Arc::new(queue);

        let size = window.inner_size();
        let (width, height) = (size.width.max(1), size.height.max(1));
        let surface_config = WgpuBackend::surface_config(&surface, &adapter, width, height)?;
        log::info!("Surface format: {:?}", surface_config.format);
        let backend = WgpuBackend::new(device, queue, surface, surface_config);
        let mut gpu = GpuResources::new(Box::new(backend), width, height);

        let mut application = Application::new(self.options.config.clone(), width, height);
        application
            .load(&mut gpu, &self.options.scene, &self.options.scene_name)
            .with_context(|| format!("Failed to load scene '{}'", self.options.scene_name))?;
        window.set_title(&application.title());

        Ok(AppState { window, gpu, application })
    }

    fn shutdown(&mut self, event_loop: &ActiveEventLoop) {
        if let Some(mut state) = self.state.take() {
            state.application.release(&mut state.gpu);
        }
        log::info!("Shutting down");
        event_loop.exit();
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.state.is_some() {
            return;
        }
        match self.init(event_loop) {
            Ok(state) => self.state = Some(state),
            Err(err) => {
                self.error = Some(err);
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        let Some(state) = self.state.as_mut() else {
            return;
        };

        match event {
            WindowEvent::CloseRequested => self.shutdown(event_loop),
            WindowEvent::Resized(size) if size.width > 0 && size.height > 0 => {
                state.gpu.resize(size.width, size.height);
                state.application.resize(size.width, size.height);
            }
            WindowEvent::RedrawRequested => {
                if let Err(err) = state.gpu.begin_frame() {
                    log::warn!("Skipping frame: {}", err);
                    return;
                }
                state.application.render(&mut state.gpu);
                if let Err(err) = state.gpu.end_frame() {
                    log::error!("Render error: {}", err);
                }
                state.window.set_title(&state.application.title());
            }
            WindowEvent::KeyboardInput { event, .. } if event.state == ElementState::Pressed && !event.repeat => {
                let Some(command) = Command::from_key(&event.logical_key) else {
                    return;
                };
                if !state.application.command(&mut state.gpu, command) {
                    self.shutdown(event_loop);
                }
            }
            WindowEvent::CursorMoved { position, .. } => {
                state.application.cursor_moved(position.x as f32, position.y as f32);
            }
            WindowEvent::MouseInput { state: button_state, button, .. } => {
                let button = match button {
                    winit::event::MouseButton::Left => MouseButton::Left,
                    winit::event::MouseButton::Right => MouseButton::Right,
                    winit::event::MouseButton::Middle => MouseButton::Middle,
                    _ => return,
                };
                state
                    .application
                    .mouse_button(button, button_state == ElementState::Pressed);
            }
            WindowEvent::MouseWheel { delta, .. } => {
                let (dx, dy) = match delta {
                    MouseScrollDelta::LineDelta(x, y) => (x, y),
                    MouseScrollDelta::PixelDelta(p) => {
                        (p.x as f32 / PIXELS_PER_LINE, p.y as f32 / PIXELS_PER_LINE)
                    }
                };
                state.application.scroll(dx, dy);
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _: &ActiveEventLoop) {
        if let Some(state) = &self.state {
            state.window.request_redraw();
        }
    }
}
