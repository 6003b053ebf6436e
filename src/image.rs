use igr::glow::HasContext;
use igr::{glow, TextureMap};
use imgui_glow_renderer as igr;
use opencv::core::{self as cv, MatTraitConst, MatTraitConstManual};

use crate::{Error, Result};

/// A BGR frame plus the GL texture it is shown through.
#[derive(Default, Debug)]
pub struct Image {
    pub mat: cv::Mat,
    texture: Option<glow::Texture>,
    texture_id: Option<imgui::TextureId>,
}

impl Image {
    /// Uploads the current frame and returns an imgui widget showing it.
    pub fn make(&mut self, renderer: &mut igr::AutoRenderer) -> Result<imgui::Image> {
        let (texture, texture_id) = match (self.texture, self.texture_id) {
            (Some(texture), Some(texture_id)) => (texture, texture_id),
            _ => self.init(renderer)?,
        };
        let size = self.size()?;
        let gl = renderer.gl_context();
        unsafe {
            gl.bind_texture(glow::TEXTURE_2D, Some(texture));
            gl.tex_parameter_i32(
                glow::TEXTURE_2D,
                glow::TEXTURE_MIN_FILTER,
                glow::LINEAR as _,
            );
            gl.tex_parameter_i32(
                glow::TEXTURE_2D,
                glow::TEXTURE_MAG_FILTER,
                glow::LINEAR as _,
            );
            gl.pixel_store_i32(glow::UNPACK_ALIGNMENT, 1);
            gl.tex_image_2d(
                glow::TEXTURE_2D,
                0,
                glow::RGB as _,
                size[0] as _,
                size[1] as _,
                0,
                glow::BGR,
                glow::UNSIGNED_BYTE,
                Some(self.mat.data_bytes()?),
            );
        };
        Ok(imgui::Image::new(texture_id, size))
    }

    fn init(&mut self, renderer: &mut igr::AutoRenderer) -> Result<(glow::Texture, imgui::TextureId)> {
        let texture = unsafe { renderer.gl_context().create_texture() }.map_err(Error::Window)?;
        let texture_id = renderer
            .texture_map_mut()
            .register(texture)
            .ok_or_else(|| Error::Window("texture map is full".into()))?;
        self.texture = Some(texture);
        self.texture_id = Some(texture_id);
        Ok((texture, texture_id))
    }

    fn size(&self) -> Result<[f32; 2]> {
        let size = self.mat.size()?;
        Ok([size.width as _, size.height as _])
    }
}
