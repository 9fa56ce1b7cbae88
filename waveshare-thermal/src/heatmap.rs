// SPDX-License-Identifier: Apache-2.0
// Copyright © 2021 Will Ross
//! Rendering temperature frames as false-color images.
//!
//! Temperatures are scaled to 0-255 across the frame's own range, upscaled with a bicubic filter,
//! then colored blue (cold) through cyan and yellow to red (hot).

use std::io::Cursor;

use image::imageops::{self, FilterType};
use image::{GrayImage, ImageOutputFormat, Rgb, RgbImage};
use mlx90641::{HEIGHT, NUM_PIXELS, WIDTH};
use tracing::debug;

use crate::error::{Error, Result};
use crate::resource::Image;

/// Output width of the rendered image, in pixels.
pub const IMAGE_WIDTH: u32 = 240;

/// Output height of the rendered image, in pixels.
pub const IMAGE_HEIGHT: u32 = 320;

const JPEG_QUALITY: u8 = 75;

/// The encodings [`thermal_image`] can produce.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ImageFormat {
    Jpeg,
    Png,
}

impl ImageFormat {
    /// Pick an encoding for a requested MIME type. JPEG unless PNG is asked for.
    pub fn from_mime(mime_type: &str) -> Self {
        match mime_type {
            "image/png" => ImageFormat::Png,
            "" | "image/jpeg" => ImageFormat::Jpeg,
            other => {
                debug!(mime_type = other, "Unsupported MIME type, using JPEG");
                ImageFormat::Jpeg
            }
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::Png => "image/png",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "jpg",
            ImageFormat::Png => "png",
        }
    }

    fn output_format(&self) -> ImageOutputFormat {
        match self {
            ImageFormat::Jpeg => ImageOutputFormat::Jpeg(JPEG_QUALITY),
            ImageFormat::Png => ImageOutputFormat::Png,
        }
    }
}

/// A 256 color lookup table.
#[derive(Clone, Debug, PartialEq)]
pub struct Palette([[u8; 3]; 256]);

impl Palette {
    /// Blue to cyan, cyan to yellow, then yellow to red.
    pub fn heatmap() -> Self {
        let mut colors = [[0u8; 3]; 256];
        for (index, color) in colors.iter_mut().enumerate() {
            // Every step is at most 85 * 3 = 255, so these never overflow.
            let index = index as u8;
            *color = match index {
                0..=84 => [0, 0, index * 3],
                85..=169 => [0, 255, 255 - (index - 85) * 3],
                _ => [255, 255 - (index - 170) * 3, 0],
            };
        }
        Self(colors)
    }

    pub fn color(&self, index: u8) -> [u8; 3] {
        self.0[index as usize]
    }
}

impl Default for Palette {
    fn default() -> Self {
        Self::heatmap()
    }
}

/// Smallest and largest temperatures, skipping NaN. `None` if every value is NaN.
pub fn temperature_range(frame: &[f32]) -> Option<(f32, f32)> {
    let min = frame.iter().copied().fold(f32::NAN, f32::min);
    let max = frame.iter().copied().fold(f32::NAN, f32::max);
    (!min.is_nan()).then(|| (min, max))
}

/// Scale a frame onto 0-255. A frame with no spread is all 0, as are NaN pixels.
pub fn normalize(frame: &[f32]) -> Vec<u8> {
    match temperature_range(frame) {
        Some((min, max)) if max > min => {
            let range = max - min;
            // Float to int casts truncate, and NaN becomes 0.
            frame
                .iter()
                .map(|temperature| (255f32 * (temperature - min) / range) as u8)
                .collect()
        }
        _ => vec![0; frame.len()],
    }
}

/// Render a full frame into a false-color image of the given size.
pub fn render(frame: &[f32], palette: &Palette, width: u32, height: u32) -> Result<RgbImage> {
    if frame.len() != NUM_PIXELS {
        return Err(Error::InvalidFrame {
            expected: NUM_PIXELS,
            actual: frame.len(),
        });
    }
    let grayscale = GrayImage::from_raw(WIDTH as u32, HEIGHT as u32, normalize(frame)).ok_or(
        Error::InvalidFrame {
            expected: NUM_PIXELS,
            actual: frame.len(),
        },
    )?;
    let resized = imageops::resize(&grayscale, width, height, FilterType::CatmullRom);
    Ok(RgbImage::from_fn(width, height, |x, y| {
        Rgb(palette.color(resized.get_pixel(x, y)[0]))
    }))
}

pub fn encode(image: &RgbImage, format: ImageFormat) -> Result<Vec<u8>> {
    let mut bytes = Cursor::new(Vec::new());
    image.write_to(&mut bytes, format.output_format())?;
    Ok(bytes.into_inner())
}

/// Render and encode a frame at [`IMAGE_WIDTH`] by [`IMAGE_HEIGHT`].
pub fn thermal_image(frame: &[f32], palette: &Palette, format: ImageFormat) -> Result<Image> {
    let rendered = render(frame, palette, IMAGE_WIDTH, IMAGE_HEIGHT)?;
    Ok(Image {
        mime_type: format.mime_type().to_string(),
        data: encode(&rendered, format)?,
    })
}
