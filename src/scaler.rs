use std::io::{Cursor, Read};

use image::imageops::FilterType;
use image::{GenericImageView, ImageFormat};

use crate::context::Context;
use crate::error::Result;

/// Produces a width-bounded variant of an image.
pub trait Scaler: Send + Sync {
    fn scale(&self, ctx: &Context, image: &mut dyn Read, width: u32) -> Result<Vec<u8>>;
}

/// Scaler backed by the `image` crate. Images are never upscaled; narrower
/// images are returned as they are.
#[derive(Debug, Default)]
pub struct ImageScaler;

impl Scaler for ImageScaler {
    fn scale(&self, ctx: &Context, reader: &mut dyn Read, width: u32) -> Result<Vec<u8>> {
        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;

        ctx.check()?;

        let img = image::load_from_memory(&data)?;
        let (w, h) = img.dimensions();

        if w <= width {
            trace!("image {}x{} already fits width {}", w, h, width);
            return Ok(data);
        }

        let height = ((u64::from(h) * u64::from(width)) / u64::from(w)).max(1) as u32;

        debug!("scaling image {}x{} to {}x{}", w, h, width, height);

        let scaled = img.resize(width, height, FilterType::Lanczos3);

        ctx.check()?;

        let mut out = Cursor::new(Vec::new());
        image::DynamicImage::ImageRgb8(scaled.to_rgb8()).write_to(&mut out, ImageFormat::Jpeg)?;

        Ok(out.into_inner())
    }
}
