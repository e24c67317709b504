// SPDX-License-Identifier: GPL-3.0-only

//! Owned, format-tagged pixel buffers.

use image::{imageops::FilterType, RgbaImage};

use crate::error::SnapshotError;
use crate::geometry::Rect;

/// Pixel layouts a snapshot can arrive in.
///
/// The numbering follows `QImage::Format`, which is what both the
/// shared-memory publisher and the compositor describe their buffers with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// 32-bit `0xffRRGGBB` in native byte order
    Rgb32,
    /// 32-bit `0xAARRGGBB` in native byte order
    Argb32,
    Argb32Premultiplied,
    /// Three bytes, R G B
    Rgb888,
    /// Four bytes, R G B and an ignored fourth byte
    Rgbx8888,
    /// Four bytes, R G B A
    Rgba8888,
    Rgba8888Premultiplied,
}

impl PixelFormat {
    #[must_use]
    pub fn from_qimage_format(format: u32) -> Option<Self> {
        match format {
            4 => Some(Self::Rgb32),
            5 => Some(Self::Argb32),
            6 => Some(Self::Argb32Premultiplied),
            13 => Some(Self::Rgb888),
            16 => Some(Self::Rgbx8888),
            17 => Some(Self::Rgba8888),
            18 => Some(Self::Rgba8888Premultiplied),
            _ => None,
        }
    }

    #[must_use]
    pub fn qimage_format(self) -> u32 {
        match self {
            Self::Rgb32 => 4,
            Self::Argb32 => 5,
            Self::Argb32Premultiplied => 6,
            Self::Rgb888 => 13,
            Self::Rgbx8888 => 16,
            Self::Rgba8888 => 17,
            Self::Rgba8888Premultiplied => 18,
        }
    }

    #[must_use]
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            Self::Rgb888 => 3,
            _ => 4,
        }
    }

    /// Convert one pixel to straight-alpha RGBA.
    fn to_rgba(self, pixel: &[u8]) -> [u8; 4] {
        match self {
            Self::Rgb32 | Self::Argb32 | Self::Argb32Premultiplied => {
                let argb = u32::from_ne_bytes([pixel[0], pixel[1], pixel[2], pixel[3]]);
                let a = if self == Self::Rgb32 {
                    0xff
                } else {
                    ((argb >> 24) & 0xff) as u8
                };
                let r = ((argb >> 16) & 0xff) as u8;
                let g = ((argb >> 8) & 0xff) as u8;
                let b = (argb & 0xff) as u8;
                if self == Self::Argb32Premultiplied {
                    unpremultiply([r, g, b, a])
                } else {
                    [r, g, b, a]
                }
            }
            Self::Rgb888 | Self::Rgbx8888 => [pixel[0], pixel[1], pixel[2], 0xff],
            Self::Rgba8888 => [pixel[0], pixel[1], pixel[2], pixel[3]],
            Self::Rgba8888Premultiplied => unpremultiply([pixel[0], pixel[1], pixel[2], pixel[3]]),
        }
    }
}

impl std::fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

fn unpremultiply([r, g, b, a]: [u8; 4]) -> [u8; 4] {
    if a == 0 || a == 0xff {
        return [r, g, b, a];
    }
    let channel = |c: u8| -> u8 {
        let value = (u32::from(c) * 255 + u32::from(a) / 2) / u32::from(a);
        value.min(255) as u8
    };
    [channel(r), channel(g), channel(b), a]
}

/// Owned pixel buffer with explicit stride and format.
#[derive(Clone, PartialEq, Eq)]
pub struct Bitmap {
    width: u32,
    height: u32,
    stride: usize,
    format: PixelFormat,
    data: Vec<u8>,
}

impl std::fmt::Debug for Bitmap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bitmap")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("stride", &self.stride)
            .field("format", &self.format)
            .field("bytes", &self.data.len())
            .finish()
    }
}

impl Bitmap {
    /// Wrap `data` as a `width` x `height` image with rows `stride` bytes apart.
    ///
    /// # Errors
    /// Returns `SnapshotError::Malformed` when the size is zero, the stride is
    /// shorter than a row, or `data` does not hold every row.
    pub fn from_raw(
        width: u32,
        height: u32,
        stride: usize,
        format: PixelFormat,
        data: Vec<u8>,
    ) -> Result<Self, SnapshotError> {
        if width == 0 || height == 0 {
            return Err(SnapshotError::Malformed(format!(
                "empty bitmap {width}x{height}"
            )));
        }
        let row = width as usize * format.bytes_per_pixel();
        if stride < row {
            return Err(SnapshotError::Malformed(format!(
                "stride {stride} shorter than a {width} pixel {format} row"
            )));
        }
        let needed = stride
            .checked_mul(height as usize)
            .ok_or_else(|| SnapshotError::Malformed("bitmap size overflows".to_string()))?;
        if data.len() < needed {
            return Err(SnapshotError::Malformed(format!(
                "{} bytes for a {width}x{height} bitmap needing {needed}",
                data.len()
            )));
        }

        Ok(Self {
            width,
            height,
            stride,
            format,
            data,
        })
    }

    /// Take ownership of a decoded RGBA image.
    #[must_use]
    pub fn from_rgba(image: RgbaImage) -> Self {
        let (width, height) = image.dimensions();
        Self {
            width,
            height,
            stride: width as usize * 4,
            format: PixelFormat::Rgba8888,
            data: image.into_raw(),
        }
    }

    #[must_use]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[must_use]
    pub fn stride(&self) -> usize {
        self.stride
    }

    #[must_use]
    pub fn format(&self) -> PixelFormat {
        self.format
    }

    /// Full extent of the bitmap.
    #[must_use]
    pub fn bounds(&self) -> Rect {
        Rect::from_size(self.width, self.height)
    }

    /// Convert to straight-alpha RGBA, dropping row padding.
    #[must_use]
    pub fn to_rgba_image(&self) -> RgbaImage {
        if self.format == PixelFormat::Rgba8888 && self.stride == self.width as usize * 4 {
            if let Some(image) = RgbaImage::from_raw(self.width, self.height, self.data.clone()) {
                return image;
            }
        }

        let bpp = self.format.bytes_per_pixel();
        let row_len = self.width as usize * bpp;
        let mut rgba = Vec::with_capacity(self.width as usize * self.height as usize * 4);
        for row in self.data.chunks(self.stride).take(self.height as usize) {
            for pixel in row[..row_len].chunks_exact(bpp) {
                rgba.extend_from_slice(&self.format.to_rgba(pixel));
            }
        }

        RgbaImage::from_raw(self.width, self.height, rgba)
            .unwrap_or_else(|| RgbaImage::new(self.width, self.height))
    }

    /// Resample to `width` x `height` with a smoothing filter.
    #[must_use]
    pub fn resample(&self, width: u32, height: u32) -> Self {
        let source = self.to_rgba_image();
        let resized =
            image::imageops::resize(&source, width.max(1), height.max(1), FilterType::Triangle);
        Self::from_rgba(resized)
    }

    /// Copy out the pixels inside `rect`, clipped to the bitmap.
    #[must_use]
    pub fn crop_rgba(&self, rect: Rect) -> RgbaImage {
        let image = self.to_rgba_image();
        #[allow(clippy::cast_sign_loss)]
        let (x, y) = (rect.x.max(0) as u32, rect.y.max(0) as u32);
        let width = rect.width.min(self.width.saturating_sub(x));
        let height = rect.height.min(self.height.saturating_sub(y));
        image::imageops::crop_imm(&image, x, y, width, height).to_image()
    }
}
