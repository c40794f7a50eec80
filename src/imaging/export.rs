//! Per-format encoding profiles

use bytes::Bytes;
use image::codecs::gif::GifEncoder;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::{ColorType, DynamicImage, ImageEncoder, RgbImage};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

use super::codec::ImageHandle;
use super::error::TransformError;
use super::format::ImageFormat;
use super::options::TransformOptions;

/// Settings every profile receives. Encoders never copy source metadata,
/// so `strip_metadata` only matters through auto-rotation upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportSettings {
    pub quality: u8,
    pub strip_metadata: bool,
}

impl From<&TransformOptions> for ExportSettings {
    fn from(options: &TransformOptions) -> Self {
        Self {
            quality: options.quality.clamp(1, 100),
            strip_metadata: options.strip_metadata,
        }
    }
}

/// Encoded output of a transform
#[derive(Debug, Clone)]
pub struct ProcessedArtifact {
    pub bytes: Bytes,
    /// Detected from the encoded bytes
    pub mime_type: &'static str,
    pub size: usize,
}

pub trait Exporter: Send + Sync {
    fn format(&self) -> ImageFormat;

    fn export(
        &self,
        image: &DynamicImage,
        settings: ExportSettings,
    ) -> Result<Vec<u8>, TransformError>;
}

/// Baseline sequential JPEG, alpha flattened onto white.
///
/// `image`'s encoder writes standard Huffman tables with 4:2:0 chroma
/// subsampling and exposes only the quality knob. Optimised Huffman coding,
/// progressive scans and trellis quantisation are not available through it,
/// so output runs larger than a mozjpeg-tuned profile at the same quality.
#[derive(Debug, Default, Clone, Copy)]
pub struct JpegExporter;

impl Exporter for JpegExporter {
    fn format(&self) -> ImageFormat {
        ImageFormat::Jpeg
    }

    fn export(
        &self,
        image: &DynamicImage,
        settings: ExportSettings,
    ) -> Result<Vec<u8>, TransformError> {
        let rgb = flatten_onto_white(image);
        let mut output = Vec::new();

        JpegEncoder::new_with_quality(&mut output, settings.quality)
            .write_image(rgb.as_raw(), rgb.width(), rgb.height(), ColorType::Rgb8)
            .map_err(|e| TransformError::encode("jpeg", e))?;

        Ok(output)
    }
}

/// Lossless PNG; quality picks the compression effort
#[derive(Debug, Default, Clone, Copy)]
pub struct PngExporter;

impl Exporter for PngExporter {
    fn format(&self) -> ImageFormat {
        ImageFormat::Png
    }

    fn export(
        &self,
        image: &DynamicImage,
        settings: ExportSettings,
    ) -> Result<Vec<u8>, TransformError> {
        let compression = match settings.quality {
            0..=39 => CompressionType::Fast,
            40..=79 => CompressionType::Default,
            _ => CompressionType::Best,
        };
        let rgba = image.to_rgba8();
        let mut output = Vec::new();

        PngEncoder::new_with_quality(&mut output, compression, FilterType::Adaptive)
            .write_image(rgba.as_raw(), rgba.width(), rgba.height(), ColorType::Rgba8)
            .map_err(|e| TransformError::encode("png", e))?;

        Ok(output)
    }
}

/// Lossy WebP through libwebp, lossless at quality 100
#[derive(Debug, Default, Clone, Copy)]
pub struct WebPExporter;

impl Exporter for WebPExporter {
    fn format(&self) -> ImageFormat {
        ImageFormat::WebP
    }

    fn export(
        &self,
        image: &DynamicImage,
        settings: ExportSettings,
    ) -> Result<Vec<u8>, TransformError> {
        let rgba = image.to_rgba8();
        let encoder = webp::Encoder::from_rgba(rgba.as_raw(), rgba.width(), rgba.height());

        let encoded = encoder
            .encode_simple(settings.quality >= 100, settings.quality as f32)
            .map_err(|e| TransformError::encode("webp", format!("{e:?}")))?;

        Ok(encoded.to_vec())
    }
}

/// Single-frame GIF; higher quality trades speed for a better palette
#[derive(Debug, Default, Clone, Copy)]
pub struct GifExporter;

impl Exporter for GifExporter {
    fn format(&self) -> ImageFormat {
        ImageFormat::Gif
    }

    fn export(
        &self,
        image: &DynamicImage,
        settings: ExportSettings,
    ) -> Result<Vec<u8>, TransformError> {
        // 1 is the slowest and best palette, 30 the fastest
        let speed = 30 - ((settings.quality as i32 - 1) * 29 / 99);
        let rgba = image.to_rgba8();
        let mut output = Vec::new();

        {
            let mut encoder = GifEncoder::new_with_speed(&mut output, speed);
            encoder
                .encode(rgba.as_raw(), rgba.width(), rgba.height(), ColorType::Rgba8)
                .map_err(|e| TransformError::encode("gif", e))?;
        }

        Ok(output)
    }
}

/// Read-only table of exporters by output format
#[derive(Clone)]
pub struct ExporterRegistry {
    exporters: HashMap<ImageFormat, Arc<dyn Exporter>>,
}

impl ExporterRegistry {
    pub fn new() -> Self {
        Self {
            exporters: HashMap::new(),
        }
    }

    pub fn register(&mut self, exporter: Arc<dyn Exporter>) {
        self.exporters.insert(exporter.format(), exporter);
    }

    pub fn get(&self, format: ImageFormat) -> Result<Arc<dyn Exporter>, TransformError> {
        self.exporters
            .get(&format)
            .cloned()
            .ok_or_else(|| TransformError::UnsupportedFormat(format.to_string()))
    }

    /// Auto-rotates when asked, encodes in `options.format` (JPEG when
    /// unset, written back) and labels the result by sniffing its bytes
    pub fn export(
        &self,
        mut image: ImageHandle,
        options: &mut TransformOptions,
    ) -> Result<ProcessedArtifact, TransformError> {
        if options.auto_rotate {
            image.auto_rotate();
        }

        let format = *options.format.get_or_insert(ImageFormat::DEFAULT);
        let exporter = self.get(format)?;
        let encoded = exporter.export(image.image(), ExportSettings::from(&*options))?;

        let sniffed = ImageFormat::sniff(&encoded);
        if sniffed != Some(format) {
            warn!(
                requested = %format,
                detected = ?sniffed,
                "Encoded image does not match the requested format"
            );
        }

        let size = encoded.len();
        Ok(ProcessedArtifact {
            bytes: Bytes::from(encoded),
            mime_type: sniffed.unwrap_or(ImageFormat::DEFAULT).mime_type(),
            size,
        })
    }

    /// Registry with JPEG, PNG, WebP and GIF
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(JpegExporter));
        registry.register(Arc::new(PngExporter));
        registry.register(Arc::new(WebPExporter));
        registry.register(Arc::new(GifExporter));
        registry
    }
}

impl Default for ExporterRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl std::fmt::Debug for ExporterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.exporters.keys()).finish()
    }
}

fn flatten_onto_white(image: &DynamicImage) -> RgbImage {
    let rgba = image.to_rgba8();
    RgbImage::from_fn(rgba.width(), rgba.height(), |x, y| {
        let [r, g, b, a] = rgba.get_pixel(x, y).0;
        let blend = |c: u8| ((c as u32 * a as u32 + 255 * (255 - a as u32)) / 255) as u8;
        image::Rgb([blend(r), blend(g), blend(b)])
    })
}
