//! Off-screen drawing surface used to capture a single page.

use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, Rgb, RgbImage};
use log::trace;
use rusttype::{point, Font, Scale};

use super::RasterError;

const WHITE: [u8; 3] = [0xff, 0xff, 0xff];
const PLACEHOLDER_FILL: [u8; 3] = [0xee, 0xee, 0xee];
const PLACEHOLDER_BORDER: [u8; 3] = [0xbb, 0xbb, 0xbb];

/// A white RGB canvas owned for the duration of one page capture.
///
/// The surface is acquired right before a page is drawn and released when it goes out of scope,
/// whether the capture finished or bailed out early.
pub(crate) struct Surface {
    pixels: RgbImage,
}

impl Surface {
    pub fn acquire(width: u32, height: u32) -> Result<Self, RasterError> {
        if width == 0 || height == 0 {
            return Err(RasterError::EmptyPage { width, height });
        }
        trace!("Acquired {}x{} page surface", width, height);
        Ok(Self {
            pixels: RgbImage::from_pixel(width, height, Rgb(WHITE)),
        })
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    /// Hands the captured bitmap over, leaving an empty surface to be released.
    pub fn finish(mut self) -> RgbImage {
        std::mem::replace(&mut self.pixels, RgbImage::new(0, 0))
    }

    fn blend(&mut self, x: i64, y: i64, color: [u8; 3], coverage: f32) {
        if x < 0 || y < 0 || x >= i64::from(self.width()) || y >= i64::from(self.height()) {
            return;
        }
        let coverage = coverage.clamp(0.0, 1.0);
        let pixel = self.pixels.get_pixel_mut(x as u32, y as u32);
        for (channel, target) in pixel.0.iter_mut().zip(color.iter()) {
            let mixed = f32::from(*channel) * (1.0 - coverage) + f32::from(*target) * coverage;
            *channel = mixed.round() as u8;
        }
    }

    /// Fills an axis-aligned rectangle, clipped to the surface.
    pub fn fill_rect(&mut self, x: f32, y: f32, width: f32, height: f32, color: [u8; 3]) {
        let x0 = x.round().max(0.0) as i64;
        let y0 = y.round().max(0.0) as i64;
        let x1 = (x + width).round() as i64;
        let y1 = (y + height).round() as i64;
        for py in y0..y1.min(i64::from(self.height())) {
            for px in x0..x1.min(i64::from(self.width())) {
                self.blend(px, py, color, 1.0);
            }
        }
    }

    /// Draws `text` with its baseline at `baseline`, returning the horizontal advance.
    pub fn draw_text(
        &mut self,
        font: &Font<'_>,
        scale: Scale,
        x: f32,
        baseline: f32,
        text: &str,
        color: [u8; 3],
    ) -> f32 {
        let mut advance = 0.0;
        for glyph in font.layout(text, scale, point(x, baseline)) {
            advance = glyph.position().x + glyph.unpositioned().h_metrics().advance_width - x;
            if let Some(bounds) = glyph.pixel_bounding_box() {
                glyph.draw(|gx, gy, coverage| {
                    self.blend(
                        i64::from(bounds.min.x) + i64::from(gx),
                        i64::from(bounds.min.y) + i64::from(gy),
                        color,
                        coverage,
                    );
                });
            }
        }
        advance
    }

    /// Scales `image` to cover the box and crops the overflow around the center.
    pub fn draw_image(&mut self, image: &DynamicImage, x: f32, y: f32, width: f32, height: f32) {
        let (target_w, target_h) = (width.round() as u32, height.round() as u32);
        let (source_w, source_h) = image.dimensions();
        if target_w == 0 || target_h == 0 || source_w == 0 || source_h == 0 {
            return;
        }

        let scale = f64::max(
            f64::from(target_w) / f64::from(source_w),
            f64::from(target_h) / f64::from(source_h),
        );
        let crop_w = ((f64::from(target_w) / scale).round() as u32).clamp(1, source_w);
        let crop_h = ((f64::from(target_h) / scale).round() as u32).clamp(1, source_h);
        let fitted = image
            .crop_imm((source_w - crop_w) / 2, (source_h - crop_h) / 2, crop_w, crop_h)
            .resize_exact(target_w, target_h, FilterType::Triangle)
            .to_rgba8();

        let (left, top) = (x.round() as i64, y.round() as i64);
        for (px, py, pixel) in fitted.enumerate_pixels() {
            let [r, g, b, a] = pixel.0;
            self.blend(
                left + i64::from(px),
                top + i64::from(py),
                [r, g, b],
                f32::from(a) / 255.0,
            );
        }
    }

    /// Grey box drawn in place of an image that failed to load.
    pub fn draw_placeholder(&mut self, x: f32, y: f32, width: f32, height: f32) {
        let border = (width.min(height) / 60.0).max(1.0);
        self.fill_rect(x, y, width, height, PLACEHOLDER_BORDER);
        self.fill_rect(
            x + border,
            y + border,
            width - 2.0 * border,
            height - 2.0 * border,
            PLACEHOLDER_FILL,
        );
    }

    /// Row of small square dots between two horizontal positions.
    pub fn draw_dots(&mut self, from: f32, to: f32, y: f32, spacing: f32, color: [u8; 3]) {
        let size = (spacing / 5.0).max(1.0);
        let mut x = from;
        while x + size <= to {
            self.fill_rect(x, y - size, size, size, color);
            x += spacing;
        }
    }

    #[cfg(test)]
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 3] {
        self.pixels.get_pixel(x, y).0
    }
}

impl Drop for Surface {
    fn drop(&mut self) {
        trace!("Released page surface");
    }
}
