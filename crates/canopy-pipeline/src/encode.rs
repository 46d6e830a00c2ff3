//! In-memory encoding of composited images for transport or display.

use std::io::Cursor;

use serde::{Deserialize, Serialize};

use crate::types::{PipelineError, RgbImage};

/// Container format for encoded output images.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OutputFormat {
    /// Uncompressed Windows bitmap.
    #[default]
    Bmp,
    /// Lossless PNG.
    Png,
}

impl OutputFormat {
    /// Conventional file extension, without the dot.
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Bmp => "bmp",
            Self::Png => "png",
        }
    }

    const fn image_format(self) -> image::ImageFormat {
        match self {
            Self::Bmp => image::ImageFormat::Bmp,
            Self::Png => image::ImageFormat::Png,
        }
    }
}

/// Encode an RGB image into a byte buffer.
///
/// # Errors
///
/// Returns [`PipelineError::ImageEncode`] if the encoder rejects the
/// image.
pub fn encode(image: &RgbImage, format: OutputFormat) -> Result<Vec<u8>, PipelineError> {
    let mut buf = Cursor::new(Vec::new());
    image
        .write_to(&mut buf, format.image_format())
        .map_err(PipelineError::ImageEncode)?;
    Ok(buf.into_inner())
}
