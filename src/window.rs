use std::time::Instant;

pub use imgui::Ui;
use imgui_glow_renderer::glow::{self, HasContext};
pub use imgui_glow_renderer::AutoRenderer;

use glutin::surface::GlSurface;
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::{ElementState, Event, KeyEvent, WindowEvent};
use winit::event_loop::{ActiveEventLoop, EventLoop};
use winit::keyboard::Key;
use winit::window::WindowId;

pub use crate::app::Flow;
use crate::app::{App, MainLoop};
use crate::{Error, Result};

pub const QUIT_KEY: &str = "q";

/// Matches the character typed, so the binding follows the keyboard layout.
pub fn is_quit_key(key: &Key) -> bool {
    matches!(key, Key::Character(ch) if ch.as_str() == QUIT_KEY)
}

impl<Loop: MainLoop> ApplicationHandler for App<Loop> {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        if let Err(err) = self.setup(event_loop) {
            self.fail(event_loop, err);
        }
    }

    fn new_events(&mut self, _event_loop: &ActiveEventLoop, _cause: winit::event::StartCause) {
        let now = Instant::now();
        self.imgui.io_mut().update_delta_time(now - self.last_frame);
        self.last_frame = now;
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        let Some(window) = self.window.as_ref() else {
            return;
        };
        if let Err(err) = self.platform.prepare_frame(self.imgui.io_mut(), window) {
            tracing::warn!(%err, "could not prepare frame");
        }
        window.request_redraw();
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        window_id: WindowId,
        event: WindowEvent,
    ) {
        match event {
            WindowEvent::RedrawRequested => {
                if let Err(err) = self.redraw(event_loop) {
                    self.fail(event_loop, err);
                }
            }
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        ref logical_key,
                        state: ElementState::Pressed,
                        ..
                    },
                ..
            } if is_quit_key(logical_key) => {
                tracing::info!("quit key pressed");
                event_loop.exit();
            }
            WindowEvent::CloseRequested => event_loop.exit(),
            _ => {
                if let Some(window) = self.window.as_ref() {
                    self.platform.handle_event(
                        self.imgui.io_mut(),
                        window,
                        &Event::<()>::WindowEvent { window_id, event },
                    );
                }
            }
        }
    }
}

impl<Loop: MainLoop> App<Loop> {
    fn redraw(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let (Some(window), Some(renderer)) = (self.window.as_ref(), self.renderer.as_mut()) else {
            return Ok(());
        };
        let ui = self.imgui.new_frame();
        self.platform.prepare_render(ui, window);

        let flow = (self.main_loop)(ui, renderer);

        unsafe {
            renderer.gl_context().clear(glow::COLOR_BUFFER_BIT);
        }

        let draw_data = self.imgui.render();
        if draw_data.draw_lists_count() != 0 {
            renderer.render(draw_data).map_err(Error::window)?;
        }

        if let Some((surface, context)) = self.surface.as_ref() {
            surface.swap_buffers(context).map_err(Error::window)?;
        }

        if flow? == Flow::Exit {
            event_loop.exit();
        }
        Ok(())
    }
}

/// Opens a window and calls `main_loop` once per redraw until it returns
/// [`Flow::Exit`], fails, the quit key is pressed or the window is closed.
pub fn create(title: &str, size: PhysicalSize<u32>, main_loop: impl MainLoop) -> Result<()> {
    let event_loop = EventLoop::new().map_err(Error::window)?;
    let mut app = App::new(title, size, main_loop);
    event_loop.run_app(&mut app).map_err(Error::window)?;
    match app.error.take() {
        Some(err) => Err(err),
        None => Ok(()),
    }
}
