//! Gaussian blur of color images ahead of the bootstrap segmentation.
//!
//! Smoothing before computing ExG keeps single-pixel sensor noise from
//! flipping the Otsu threshold. [`imageproc::filter::gaussian_blur_f32`]
//! is applied independently to the R, G and B channels.

use image::GrayImage;

use crate::types::RgbImage;

/// Blur an RGB image by blurring each channel independently.
///
/// Gaussian blur is linear and per-channel, so this is equivalent to
/// blurring in color space. Non-positive sigma values return the image
/// unchanged, since `imageproc` panics on `sigma <= 0.0`.
#[must_use = "returns the blurred image"]
pub fn gaussian_blur_rgb(image: &RgbImage, sigma: f32) -> RgbImage {
    if sigma <= 0.0 {
        return image.clone();
    }

    let (w, h) = image.dimensions();

    let channels: [GrayImage; 3] = std::array::from_fn(|c| {
        GrayImage::from_fn(w, h, |x, y| image::Luma([image.get_pixel(x, y).0[c]]))
    });

    let blurred: [GrayImage; 3] =
        std::array::from_fn(|c| imageproc::filter::gaussian_blur_f32(&channels[c], sigma));

    RgbImage::from_fn(w, h, |x, y| {
        image::Rgb([
            blurred[0].get_pixel(x, y).0[0],
            blurred[1].get_pixel(x, y).0[0],
            blurred[2].get_pixel(x, y).0[0],
        ])
    })
}
