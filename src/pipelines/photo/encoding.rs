// SPDX-License-Identifier: GPL-3.0-only

//! Photo encoding
//!
//! Turns captured or composited images into the byte buffer handed to the
//! host:
//! - JPEG (with quality control)
//! - PNG (lossless)
//!
//! `encode` is synchronous; `encode_async` moves the work to a blocking task.

use crate::constants::photo;
use crate::errors::{AppError, AppResult, CaptureError, CaptureResult};
use image::{DynamicImage, ImageFormat, RgbaImage};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Supported encoding formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodingFormat {
    /// JPEG format (lossy compression)
    Jpeg,
    /// PNG format (lossless compression)
    Png,
}

impl EncodingFormat {
    /// Get file extension for this format
    pub fn extension(&self) -> &'static str {
        match self {
            EncodingFormat::Jpeg => "jpg",
            EncodingFormat::Png => "png",
        }
    }

    /// Guess the format from a file name, JPEG when unknown
    pub fn from_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .as_deref()
        {
            Some("png") => EncodingFormat::Png,
            _ => EncodingFormat::Jpeg,
        }
    }

    fn to_image_format(self) -> ImageFormat {
        match self {
            EncodingFormat::Jpeg => ImageFormat::Jpeg,
            EncodingFormat::Png => ImageFormat::Png,
        }
    }
}

/// Encoding quality settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodingQuality {
    Low,
    Medium,
    High,
    Maximum,
    /// Explicit JPEG quality (1-100)
    Custom(u8),
}

impl EncodingQuality {
    /// Get JPEG quality value (1-100)
    pub fn jpeg_quality(&self) -> u8 {
        match self {
            EncodingQuality::Low => 60,
            EncodingQuality::Medium => 80,
            EncodingQuality::High => 92,
            EncodingQuality::Maximum => 98,
            EncodingQuality::Custom(q) => (*q).clamp(1, 100),
        }
    }
}

/// Encoded image data ready for the host
#[derive(Debug, Clone)]
pub struct EncodedImage {
    pub data: Vec<u8>,
    pub format: EncodingFormat,
    pub width: u32,
    pub height: u32,
}

/// Photo encoder
#[derive(Debug, Clone, Copy)]
pub struct PhotoEncoder {
    format: EncodingFormat,
    quality: EncodingQuality,
}

impl PhotoEncoder {
    /// Create a new encoder with JPEG format and high quality
    pub fn new() -> Self {
        Self {
            format: EncodingFormat::Jpeg,
            quality: EncodingQuality::High,
        }
    }

    pub fn with_format(format: EncodingFormat, quality: EncodingQuality) -> Self {
        Self { format, quality }
    }

    pub fn set_format(&mut self, format: EncodingFormat) {
        self.format = format;
    }

    /// Set encoding quality (only affects JPEG)
    pub fn set_quality(&mut self, quality: EncodingQuality) {
        self.quality = quality;
    }

    pub fn format(&self) -> EncodingFormat {
        self.format
    }

    /// Encode on the calling thread
    pub fn encode(&self, image: &RgbaImage) -> CaptureResult<EncodedImage> {
        let data = match self.format {
            EncodingFormat::Jpeg => encode_jpeg(image, self.quality)?,
            EncodingFormat::Png => encode_png(image)?,
        };
        debug!(
            size = data.len(),
            format = ?self.format,
            "Encoding complete"
        );
        Ok(EncodedImage {
            data,
            format: self.format,
            width: image.width(),
            height: image.height(),
        })
    }

    /// Encode in a blocking task (CPU-bound)
    pub async fn encode_async(&self, image: RgbaImage) -> CaptureResult<EncodedImage> {
        let encoder = *self;
        tokio::task::spawn_blocking(move || encoder.encode(&image))
            .await
            .map_err(|e| CaptureError::EncodingFailed(format!("Encoding task error: {}", e)))?
    }

    /// Write to `path`, creating parent directories
    pub fn save_to(encoded: &EncodedImage, path: &Path) -> AppResult<PathBuf> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, &encoded.data)
            .map_err(|e| AppError::Storage(format!("{}: {}", path.display(), e)))?;
        info!(path = %path.display(), bytes = encoded.data.len(), "Photo saved");
        Ok(path.to_path_buf())
    }

    /// Save under a timestamped name in `output_dir`
    pub async fn save(encoded: EncodedImage, output_dir: PathBuf, dual: bool) -> AppResult<PathBuf> {
        let prefix = if dual {
            photo::DUAL_FILE_PREFIX
        } else {
            photo::FILE_PREFIX
        };
        let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        let filename = format!("{}_{}.{}", prefix, timestamp, encoded.format.extension());
        let filepath = output_dir.join(filename);

        tokio::task::spawn_blocking(move || Self::save_to(&encoded, &filepath))
            .await
            .map_err(|e| AppError::Storage(format!("Save task error: {}", e)))?
    }
}

impl Default for PhotoEncoder {
    fn default() -> Self {
        Self::new()
    }
}

fn encode_jpeg(image: &RgbaImage, quality: EncodingQuality) -> CaptureResult<Vec<u8>> {
    // JPEG has no alpha channel
    let rgb = DynamicImage::ImageRgba8(image.clone()).to_rgb8();
    let mut buffer = Vec::new();
    let mut encoder =
        image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buffer, quality.jpeg_quality());
    encoder
        .encode(
            rgb.as_raw(),
            rgb.width(),
            rgb.height(),
            image::ExtendedColorType::Rgb8,
        )
        .map_err(|e| CaptureError::EncodingFailed(format!("JPEG encoding failed: {}", e)))?;
    Ok(buffer)
}

fn encode_png(image: &RgbaImage) -> CaptureResult<Vec<u8>> {
    let mut buffer = Vec::new();
    image
        .write_to(
            &mut std::io::Cursor::new(&mut buffer),
            EncodingFormat::Png.to_image_format(),
        )
        .map_err(|e| CaptureError::EncodingFailed(format!("PNG encoding failed: {}", e)))?;
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_extensions() {
        assert_eq!(EncodingFormat::Jpeg.extension(), "jpg");
        assert_eq!(EncodingFormat::Png.extension(), "png");
        assert_eq!(
            EncodingFormat::from_path(Path::new("out/shot.PNG")),
            EncodingFormat::Png
        );
        assert_eq!(
            EncodingFormat::from_path(Path::new("shot")),
            EncodingFormat::Jpeg
        );
    }

    #[test]
    fn test_jpeg_quality_values() {
        assert_eq!(EncodingQuality::Low.jpeg_quality(), 60);
        assert_eq!(EncodingQuality::Medium.jpeg_quality(), 80);
        assert_eq!(EncodingQuality::High.jpeg_quality(), 92);
        assert_eq!(EncodingQuality::Maximum.jpeg_quality(), 98);
        assert_eq!(EncodingQuality::Custom(0).jpeg_quality(), 1);
    }

    #[test]
    fn test_encode_produces_decodable_bytes() {
        let image = RgbaImage::from_pixel(8, 6, image::Rgba([200, 10, 10, 255]));
        for format in [EncodingFormat::Jpeg, EncodingFormat::Png] {
            let encoded = PhotoEncoder::with_format(format, EncodingQuality::High)
                .encode(&image)
                .unwrap();
            let decoded = image::load_from_memory(&encoded.data).unwrap();
            assert_eq!((decoded.width(), decoded.height()), (8, 6));
        }
    }

    #[tokio::test]
    async fn test_encode_async() {
        let image = RgbaImage::new(4, 4);
        let encoded = PhotoEncoder::new().encode_async(image).await.unwrap();
        assert_eq!(encoded.format, EncodingFormat::Jpeg);
        assert!(!encoded.data.is_empty());
    }
}
