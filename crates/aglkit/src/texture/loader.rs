use std::fmt;

use image::imageops::{self, FilterType};
use image::{DynamicImage, GenericImageView, RgbaImage};

use crate::context::{require_current, ContextRegistry, GpuContext};
use crate::device::{TextureFilter, TextureHandle, TextureTarget};
use crate::error::GpuError;

use super::pot::{power_of_two_ceiling_capped, DEFAULT_MAX_TEXTURE_DIMENSION};

/// Options for [`TextureLoader::texture_with_image`].
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct TextureLoadOptions {
    /// Flip rows so the first row uploaded is the image's bottom row.
    pub origin_bottom_left: bool,

    /// Clamp for both texture sides. Must be a power of two.
    pub max_dimension: u32,

    /// Resampling filter used when the source is not already power-of-two sized.
    pub filter: FilterType,
}

impl Default for TextureLoadOptions {
    fn default() -> Self {
        Self {
            origin_bottom_left: false,
            max_dimension: DEFAULT_MAX_TEXTURE_DIMENSION,
            filter: FilterType::Triangle,
        }
    }
}

impl TextureLoadOptions {
    pub fn origin_bottom_left(mut self, flip: bool) -> Self {
        self.origin_bottom_left = flip;
        self
    }

    pub fn max_dimension(mut self, max: u32) -> Self {
        self.max_dimension = max;
        self
    }
}

/// Name, kind and size of a loaded texture.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TextureDescriptor {
    pub name: TextureHandle,
    pub target: TextureTarget,
    pub width: u32,
    pub height: u32,
}

/// A texture object owned by the value; deleted on drop.
pub struct Texture {
    context: GpuContext,
    info: TextureDescriptor,
    released: bool,
}

impl Texture {
    pub fn info(&self) -> TextureDescriptor {
        self.info
    }

    pub fn name(&self) -> TextureHandle {
        self.info.name
    }

    pub fn context(&self) -> &GpuContext {
        &self.context
    }

    /// Binds the texture on `unit` of its context.
    ///
    /// # Panics
    ///
    /// When the texture was released, its context is not current or `unit`
    /// is out of range.
    #[track_caller]
    pub fn bind(&self, unit: u32) {
        assert!(!self.released, "texture used after release");
        self.context.assert_current();
        let result = self.context.with_driver(|driver| {
            driver.active_texture(unit)?;
            driver.bind_texture(self.info.target, Some(self.info.name));
            Ok::<_, crate::device::DriverError>(())
        });
        if let Err(err) = result {
            panic!("failed to bind {} on unit {unit}: {err}", self.info.name);
        }
    }

    /// Deletes the texture object. Later calls do nothing.
    pub fn release(&mut self) {
        if std::mem::replace(&mut self.released, true) {
            return;
        }
        let name = self.info.name;
        if self
            .context
            .try_with_driver(|driver| driver.delete_texture(name))
            .is_none()
        {
            log::warn!("{name} released while its driver was busy; name leaked");
        }
    }

    pub fn is_released(&self) -> bool {
        self.released
    }
}

impl Drop for Texture {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for Texture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Texture")
            .field("info", &self.info)
            .field("released", &self.released)
            .finish()
    }
}

/// Resamples `image` into a `width x height` premultiplied RGBA8 buffer.
///
/// Rows run top to bottom unless `options.origin_bottom_left` is set.
pub fn resample_rgba(
    image: &DynamicImage,
    width: u32,
    height: u32,
    options: &TextureLoadOptions,
) -> Result<RgbaImage, GpuError> {
    let failed = GpuError::ResampleFailed { width, height };
    let len = (width as usize)
        .checked_mul(height as usize)
        .and_then(|px| px.checked_mul(4))
        .ok_or(failed.clone())?;

    let source = image.to_rgba8();
    let mut pixels = if source.dimensions() == (width, height) {
        source
    } else {
        imageops::resize(&source, width, height, options.filter)
    };
    if pixels.as_raw().len() != len {
        return Err(failed);
    }

    for pixel in pixels.pixels_mut() {
        let [r, g, b, a] = pixel.0;
        pixel.0 = [premultiply(r, a), premultiply(g, a), premultiply(b, a), a];
    }

    if options.origin_bottom_left {
        imageops::flip_vertical_in_place(&mut pixels);
    }

    Ok(pixels)
}

#[inline]
fn premultiply(channel: u8, alpha: u8) -> u8 {
    ((u16::from(channel) * u16::from(alpha) + 127) / 255) as u8
}

/// Creates power-of-two textures from decoded images.
pub struct TextureLoader;

impl TextureLoader {
    /// Uploads `image` as a new 2D texture in the current context.
    ///
    /// Each side becomes the smallest power of two that holds it, clamped to
    /// `options.max_dimension`; larger images are downsampled. The texture
    /// samples with a linear minification filter.
    ///
    /// # Panics
    ///
    /// When a side of `image` is zero or `registry` has no current context.
    #[track_caller]
    pub fn texture_with_image(
        registry: &ContextRegistry,
        image: &DynamicImage,
        options: &TextureLoadOptions,
    ) -> Result<Texture, GpuError> {
        let (src_w, src_h) = image.dimensions();
        assert!(src_w > 0, "image width must be positive");
        assert!(src_h > 0, "image height must be positive");

        let width = power_of_two_ceiling_capped(src_w, options.max_dimension);
        let height = power_of_two_ceiling_capped(src_h, options.max_dimension);
        let context = require_current(registry);
        let pixels = resample_rgba(image, width, height, options)?;

        let target = TextureTarget::Texture2D;
        let name = context.with_driver(|driver| {
            let name = driver
                .gen_texture()
                .ok_or(GpuError::OutOfResources("texture"))?;
            let upload = driver
                .active_texture(0)
                .and_then(|()| {
                    driver.bind_texture(target, Some(name));
                    driver.tex_image_2d(target, 0, width, height, pixels.as_raw())
                })
                .and_then(|()| driver.tex_min_filter(target, TextureFilter::Linear));
            if let Err(err) = upload {
                driver.delete_texture(name);
                return Err(GpuError::from(err));
            }
            Ok(name)
        })?;

        log::debug!("{name} loaded: {src_w}x{src_h} -> {width}x{height}");

        Ok(Texture {
            context,
            info: TextureDescriptor {
                name,
                target,
                width,
                height,
            },
            released: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{Command, HeadlessDriver};
    use image::{ImageBuffer, Rgba};

    fn solid(width: u32, height: u32, color: [u8; 4]) -> DynamicImage {
        DynamicImage::ImageRgba8(ImageBuffer::from_pixel(width, height, Rgba(color)))
    }

    fn current() -> (ContextRegistry, GpuContext, crate::device::Journal) {
        let registry = ContextRegistry::new();
        let (ctx, journal) = GpuContext::headless(&registry);
        ctx.make_current();
        (registry, ctx, journal)
    }

    #[test]
    fn non_power_of_two_image_is_resampled_up() {
        let (registry, ctx, journal) = current();
        let texture = TextureLoader::texture_with_image(
            &registry,
            &solid(300, 200, [255, 0, 0, 255]),
            &TextureLoadOptions::default(),
        )
        .unwrap();

        let info = texture.info();
        assert_eq!((info.width, info.height), (512, 256));
        assert_eq!(info.target, TextureTarget::Texture2D);
        assert!(info.name.get() != 0);
        assert!(ctx.with_driver(|d| d.is_texture(info.name)));

        let commands = journal.commands();
        assert!(commands.iter().any(|c| matches!(
            c,
            Command::TexImage2D { level: 0, width: 512, height: 256, len, .. }
                if *len == 512 * 256 * 4
        )));
        assert_eq!(journal.textures_generated(), 1);
        assert!(commands.contains(&Command::TexMinFilter {
            texture: info.name,
            filter: TextureFilter::Linear,
        }));
    }

    #[test]
    fn large_images_are_clamped() {
        let (registry, _ctx, _journal) = current();
        let image = solid(2000, 3, [0, 0, 0, 255]);
        let texture =
            TextureLoader::texture_with_image(&registry, &image, &TextureLoadOptions::default())
                .unwrap();
        assert_eq!((texture.info().width, texture.info().height), (1024, 4));

        let options = TextureLoadOptions::default().max_dimension(2048);
        let texture = TextureLoader::texture_with_image(&registry, &image, &options).unwrap();
        assert_eq!(texture.info().width, 2048);
    }

    #[test]
    fn alpha_is_premultiplied() {
        let image = solid(2, 2, [200, 100, 50, 128]);
        let rgba = resample_rgba(&image, 2, 2, &TextureLoadOptions::default()).unwrap();
        assert_eq!(rgba.get_pixel(0, 0).0, [100, 50, 25, 128]);

        let opaque = solid(1, 1, [10, 20, 30, 255]);
        let rgba = resample_rgba(&opaque, 1, 1, &TextureLoadOptions::default()).unwrap();
        assert_eq!(rgba.get_pixel(0, 0).0, [10, 20, 30, 255]);
    }

    #[test]
    fn bottom_left_origin_flips_rows() {
        let image = DynamicImage::ImageRgba8(ImageBuffer::from_fn(1, 2, |_, y| {
            if y == 0 {
                Rgba([255, 255, 255, 255])
            } else {
                Rgba([0, 0, 0, 255])
            }
        }));

        let top_left = resample_rgba(&image, 1, 2, &TextureLoadOptions::default()).unwrap();
        assert_eq!(top_left.get_pixel(0, 0).0, [255, 255, 255, 255]);

        let options = TextureLoadOptions::default().origin_bottom_left(true);
        let bottom_left = resample_rgba(&image, 1, 2, &options).unwrap();
        assert_eq!(bottom_left.get_pixel(0, 0).0, [0, 0, 0, 255]);
        assert_eq!(bottom_left.get_pixel(0, 1).0, [255, 255, 255, 255]);
    }

    #[test]
    fn drop_deletes_the_texture() {
        let (registry, ctx, _journal) = current();
        let mut texture = TextureLoader::texture_with_image(
            &registry,
            &solid(4, 4, [1, 2, 3, 4]),
            &TextureLoadOptions::default(),
        )
        .unwrap();
        let name = texture.name();

        texture.release();
        texture.release();
        assert!(texture.is_released());
        assert!(!ctx.with_driver(|d| d.is_texture(name)));
        drop(texture);
    }

    #[test]
    fn null_texture_name_is_out_of_resources() {
        let registry = ContextRegistry::new();
        let ctx = GpuContext::new(&registry, Box::new(HeadlessDriver::new().with_object_limit(0)));
        ctx.make_current();
        let err = TextureLoader::texture_with_image(
            &registry,
            &solid(4, 4, [0; 4]),
            &TextureLoadOptions::default(),
        )
        .unwrap_err();
        assert_eq!(err, GpuError::OutOfResources("texture"));
    }

    #[test]
    fn bind_selects_unit() {
        let (registry, _ctx, journal) = current();
        let texture = TextureLoader::texture_with_image(
            &registry,
            &solid(2, 2, [0; 4]),
            &TextureLoadOptions::default(),
        )
        .unwrap();
        texture.bind(1);

        let buffer = crate::buffer::VertexAttribArrayBuffer::new(
            &registry,
            4,
            1,
            &[0; 4],
            crate::device::BufferUsage::StaticDraw,
        )
        .unwrap();
        buffer.draw_arrays(crate::device::DrawMode::Points, 0, 1);
        assert!(matches!(
            journal.commands().last(),
            Some(Command::DrawArrays { textures, .. }) if textures[1] == Some(texture.name())
        ));
    }

    #[test]
    #[should_panic(expected = "width must be positive")]
    fn empty_image_is_rejected() {
        let (registry, _ctx, _journal) = current();
        let _ = TextureLoader::texture_with_image(
            &registry,
            &DynamicImage::new_rgba8(0, 4),
            &TextureLoadOptions::default(),
        );
    }
}
