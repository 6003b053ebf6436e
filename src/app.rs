use std::time::Instant;

use glutin::config::{Config, ConfigTemplateBuilder, GlConfig};
use glutin::context::{ContextApi, ContextAttributesBuilder, PossiblyCurrentContext};
use glutin::display::GetGlDisplay;
use glutin::prelude::{GlDisplay, NotCurrentGlContext};
use glutin::surface::{Surface, WindowSurface};
use glutin_winit::GlWindow;

use imgui::{Context, FontSource, Ui};
use imgui_glow_renderer::glow::{self, HasContext};
use imgui_glow_renderer::AutoRenderer;
use imgui_winit_support::{HiDpiMode, WinitPlatform};

use winit::dpi::PhysicalSize;
use winit::event_loop::ActiveEventLoop;
use winit::raw_window_handle::HasWindowHandle;
use winit::window::{Window, WindowAttributes};

use crate::{Error, Result};

/// What the loop body wants after a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit,
}

pub trait MainLoop: FnMut(&mut Ui, &mut AutoRenderer) -> Result<Flow> {}

impl<F: FnMut(&mut Ui, &mut AutoRenderer) -> Result<Flow>> MainLoop for F {}

pub struct App<Loop: MainLoop> {
    pub imgui: Context,
    pub platform: WinitPlatform,
    pub main_loop: Loop,
    pub last_frame: Instant,
    pub title: String,
    pub size: PhysicalSize<u32>,
    /// First error raised by setup or the loop body; ends the event loop.
    pub error: Option<Error>,

    pub window: Option<Window>,
    pub renderer: Option<AutoRenderer>,
    pub surface: Option<(Surface<WindowSurface>, PossiblyCurrentContext)>,
}

impl<Loop: MainLoop> App<Loop> {
    pub fn new(title: &str, size: PhysicalSize<u32>, main_loop: Loop) -> Self {
        let mut imgui = Context::create();
        imgui.set_ini_filename(None);
        let font_atlas = imgui.fonts();
        font_atlas.add_font(&[FontSource::DefaultFontData { config: None }]);
        font_atlas.build_rgba32_texture();

        let platform = WinitPlatform::new(&mut imgui);

        Self {
            imgui,
            platform,
            main_loop,
            last_frame: Instant::now(),
            title: title.to_string(),
            size,
            error: None,

            window: None,
            renderer: None,
            surface: None,
        }
    }

    pub fn setup(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let wind_attr = WindowAttributes::default()
            .with_title(self.title.clone())
            .with_inner_size(self.size);
        let template = ConfigTemplateBuilder::new();
        let compare_conf = |a: &Config, b: &Config| a.num_samples().cmp(&b.num_samples());

        let (window, config) = glutin_winit::DisplayBuilder::new()
            .with_window_attributes(Some(wind_attr))
            .build(event_loop, template, |config| {
                config
                    .max_by(compare_conf)
                    .expect("glutin yields at least one config")
            })
            .map_err(Error::window)?;
        let window_ref = window
            .as_ref()
            .ok_or_else(|| Error::Window("display builder returned no window".into()))?;
        let display = config.display();

        let surf_attr = window_ref
            .build_surface_attributes(Default::default())
            .map_err(Error::window)?;
        let surface =
            unsafe { display.create_window_surface(&config, &surf_attr) }.map_err(Error::window)?;

        let gl_version = glutin::context::Version { major: 4, minor: 1 };
        let ctx_api = ContextApi::OpenGl(Some(gl_version));
        let handle = window_ref.window_handle().map_err(Error::window)?;
        let ctx_attr = ContextAttributesBuilder::new()
            .with_context_api(ctx_api)
            .build(Some(handle.as_raw()));
        let context = unsafe { display.create_context(&config, &ctx_attr) }.map_err(Error::window)?;
        let context = context.make_current(&surface).map_err(Error::window)?;

        self.platform
            .attach_window(self.imgui.io_mut(), window_ref, HiDpiMode::Default);

        let renderer = unsafe {
            let gl = glow::Context::from_loader_function_cstr(|s| display.get_proc_address(s));
            gl.clear_color(0.3, 0.3, 0.3, 1.);
            AutoRenderer::new(gl, &mut self.imgui).map_err(Error::window)?
        };
        tracing::debug!(title = %self.title, "window ready");

        self.window = window;
        self.renderer = Some(renderer);
        self.surface = Some((surface, context));
        Ok(())
    }

    pub fn fail(&mut self, event_loop: &ActiveEventLoop, error: Error) {
        tracing::error!(%error, "stopping");
        self.error.get_or_insert(error);
        event_loop.exit();
    }
}
