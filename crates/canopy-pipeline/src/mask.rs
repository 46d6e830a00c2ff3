//! Binary mask operations: counting, inversion, corner voting, blob
//! filtering and morphological closing.
//!
//! Masks are `GrayImage`s holding `255` for plant and `0` for
//! background. Every function treats any nonzero value as foreground.

use image::GrayImage;
use imageproc::morphology::Mask;
use imageproc::region_labelling::{Connectivity, connected_components};

/// Foreground value written by every mask-producing function.
pub const FOREGROUND: u8 = 255;

/// Side length of the elliptical closing kernel.
pub const CLOSING_KERNEL_SIZE: u8 = 5;

/// Number of nonzero pixels.
#[must_use]
pub fn count_foreground(mask: &GrayImage) -> u64 {
    mask.pixels().map(|p| u64::from(p.0[0] > 0)).sum()
}

/// Foreground pixels as a fraction of all pixels (`0.0` for an empty mask).
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn coverage(mask: &GrayImage) -> f64 {
    let total = u64::from(mask.width()) * u64::from(mask.height());
    if total == 0 {
        return 0.0;
    }
    count_foreground(mask) as f64 / total as f64
}

/// Swap foreground and background.
#[must_use = "returns the inverted mask"]
pub fn invert(mask: &GrayImage) -> GrayImage {
    GrayImage::from_fn(mask.width(), mask.height(), |x, y| {
        image::Luma([if mask.get_pixel(x, y).0[0] > 0 {
            0
        } else {
            FOREGROUND
        }])
    })
}

/// How many of the four corner pixels are foreground.
#[must_use]
pub fn corner_votes(mask: &GrayImage) -> u8 {
    let (w, h) = mask.dimensions();
    if w == 0 || h == 0 {
        return 0;
    }
    let corners = [(0, 0), (w - 1, 0), (0, h - 1), (w - 1, h - 1)];
    corners
        .iter()
        .map(|&(x, y)| u8::from(mask.get_pixel(x, y).0[0] > 0))
        .sum()
}

/// Clear every 8-connected foreground component with fewer than
/// `min_area` pixels.
#[must_use = "returns the filtered mask"]
pub fn remove_small_blobs(mask: &GrayImage, min_area: u32) -> GrayImage {
    if min_area <= 1 {
        return mask.clone();
    }

    let labels = connected_components(mask, Connectivity::Eight, image::Luma([0u8]));
    let label_count = labels.pixels().map(|p| p.0[0]).max().unwrap_or(0) as usize;
    let mut areas = vec![0u32; label_count + 1];
    for p in labels.pixels() {
        areas[p.0[0] as usize] += 1;
    }

    GrayImage::from_fn(mask.width(), mask.height(), |x, y| {
        let label = labels.get_pixel(x, y).0[0] as usize;
        if label != 0 && areas[label] >= min_area {
            image::Luma([FOREGROUND])
        } else {
            image::Luma([0])
        }
    })
}

/// Build a filled ellipse inscribed in a `size`×`size` square.
///
/// Row `i` spans `c ± round(c * sqrt(1 - (i - c)² / c²))` around the
/// center `c = size / 2`, so a 5×5 kernel is a full 3-row band with a
/// single pixel capping the top and bottom rows.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn ellipse_kernel(size: u8) -> GrayImage {
    let size = u32::from(size.max(1));
    let c = size / 2;
    let radius = f64::from(c);
    GrayImage::from_fn(size, size, |x, y| {
        if c == 0 {
            return image::Luma([FOREGROUND]);
        }
        let dy = f64::from(y) - radius;
        let half_span = (radius * (1.0 - dy * dy / (radius * radius)).max(0.0).sqrt()).round();
        let dx = (f64::from(x) - radius).abs();
        if dx <= half_span {
            image::Luma([FOREGROUND])
        } else {
            image::Luma([0])
        }
    })
}

/// Morphological closing (dilation then erosion) with a 5×5 ellipse.
///
/// Fills holes and notches narrower than the kernel without growing
/// convex regions.
#[must_use = "returns the closed mask"]
pub fn close(mask: &GrayImage) -> GrayImage {
    let kernel = ellipse_kernel(CLOSING_KERNEL_SIZE);
    let center = CLOSING_KERNEL_SIZE / 2;
    let structuring = Mask::from_image(&kernel, center, center);
    imageproc::morphology::grayscale_close(mask, &structuring)
}
