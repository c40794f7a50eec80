//! Decoding and pixel operations on top of the `image` crate

use image::codecs::gif::GifDecoder;
use image::imageops::FilterType;
use image::io::Reader as ImageReader;
use image::{AnimationDecoder, DynamicImage, RgbaImage};
use std::io::Cursor;

use super::error::TransformError;
use super::format::ImageFormat;

/// Longest side of the downscaled copy used to score crop windows
const ATTENTION_ANALYSIS_SIZE: u32 = 256;

/// A decoded image plus the EXIF orientation of its source
#[derive(Debug, Clone)]
pub struct ImageHandle {
    image: DynamicImage,
    /// EXIF orientation 1..=8, 0 when the source had none
    orientation: u32,
}

impl ImageHandle {
    pub fn new(image: DynamicImage, orientation: u32) -> Self {
        Self { image, orientation }
    }

    /// Decodes `bytes`, taking frame `page` (1-based) of animated GIFs.
    /// Other formats have a single page and ignore it.
    pub fn decode(bytes: &[u8], page: u32) -> Result<Self, TransformError> {
        let format = ImageFormat::sniff(bytes);

        let image = match format {
            Some(ImageFormat::Gif) if page > 1 => decode_gif_frame(bytes, page)?,
            _ => ImageReader::new(Cursor::new(bytes))
                .with_guessed_format()
                .map_err(|e| TransformError::Decode(e.to_string()))?
                .decode()
                .map_err(|e| TransformError::Decode(e.to_string()))?,
        };

        let orientation = match format {
            Some(ImageFormat::Jpeg) | Some(ImageFormat::WebP) | Some(ImageFormat::Png) => {
                read_orientation(bytes)
            }
            _ => 0,
        };

        Ok(Self { image, orientation })
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn orientation(&self) -> u32 {
        self.orientation
    }

    /// Orientations 5..=8 turn the image by a quarter
    pub fn is_quarter_turned(&self) -> bool {
        self.orientation > 4
    }

    pub fn image(&self) -> &DynamicImage {
        &self.image
    }

    /// Resizes to exactly `width` x `height`
    pub fn thumbnail(&mut self, width: u32, height: u32) -> Result<(), TransformError> {
        if width == 0 || height == 0 {
            return Err(TransformError::InvalidGeometry { width, height });
        }
        if (width, height) != (self.width(), self.height()) {
            self.image = self.image.resize_exact(width, height, FilterType::Lanczos3);
        }
        Ok(())
    }

    /// Cuts a `width` x `height` window out of the image, placed where the
    /// edge, saturation and skin-tone energy is highest
    pub fn smart_crop(&mut self, width: u32, height: u32) -> Result<(), TransformError> {
        if width == 0 || height == 0 || width > self.width() || height > self.height() {
            return Err(TransformError::InvalidGeometry { width, height });
        }
        if (width, height) == (self.width(), self.height()) {
            return Ok(());
        }

        let (x, y) = attention_window(&self.image, width, height);
        self.image = self.image.crop_imm(x, y, width, height);
        Ok(())
    }

    /// Replaces each `factor` x `factor` block with one flat colour
    pub fn pixelate(&mut self, factor: u32) -> Result<(), TransformError> {
        if factor == 0 {
            return Err(TransformError::InvalidParameter(
                "pixelate factor must be specified (non-zero)".to_string(),
            ));
        }

        let (width, height) = (self.width(), self.height());
        let small_width = (width / factor).max(1);
        let small_height = (height / factor).max(1);

        let small = self
            .image
            .resize_exact(small_width, small_height, FilterType::Triangle);
        self.image = small.resize_exact(width, height, FilterType::Nearest);
        Ok(())
    }

    /// Applies the EXIF orientation to the pixels and resets it to upright
    pub fn auto_rotate(&mut self) {
        let image = &self.image;
        let rotated = match self.orientation {
            2 => image.fliph(),
            3 => image.rotate180(),
            4 => image.flipv(),
            5 => image.rotate90().fliph(),
            6 => image.rotate90(),
            7 => image.rotate270().fliph(),
            8 => image.rotate270(),
            _ => return,
        };
        self.image = rotated;
        self.orientation = 1;
    }
}

fn decode_gif_frame(bytes: &[u8], page: u32) -> Result<DynamicImage, TransformError> {
    let decoder =
        GifDecoder::new(Cursor::new(bytes)).map_err(|e| TransformError::Decode(e.to_string()))?;

    let frame = decoder
        .into_frames()
        .nth((page - 1) as usize)
        .ok_or_else(|| TransformError::InvalidParameter(format!("page {page} out of range")))?
        .map_err(|e| TransformError::Decode(e.to_string()))?;

    Ok(DynamicImage::ImageRgba8(frame.into_buffer()))
}

/// EXIF orientation tag, 0 when absent or unreadable
fn read_orientation(bytes: &[u8]) -> u32 {
    let mut cursor = Cursor::new(bytes);
    let Ok(exif) = exif::Reader::new().read_from_container(&mut cursor) else {
        return 0;
    };

    exif.get_field(exif::Tag::Orientation, exif::In::PRIMARY)
        .and_then(|field| field.value.get_uint(0))
        .filter(|value| (1..=8).contains(value))
        .unwrap_or(0)
}

/// Top-left corner of the highest scoring `width` x `height` window.
/// Scoring runs on a downscaled copy; a tie with the centred window keeps it.
fn attention_window(image: &DynamicImage, width: u32, height: u32) -> (u32, u32) {
    let (src_width, src_height) = (image.width(), image.height());
    let scale = (ATTENTION_ANALYSIS_SIZE as f64 / src_width.max(src_height) as f64).min(1.0);

    let analysis_width = ((src_width as f64 * scale).round() as u32).max(1);
    let analysis_height = ((src_height as f64 * scale).round() as u32).max(1);
    let analysis = if scale < 1.0 {
        image
            .resize_exact(analysis_width, analysis_height, FilterType::Triangle)
            .to_rgba8()
    } else {
        image.to_rgba8()
    };

    let window_width = ((width as f64 * scale).round() as u32).clamp(1, analysis_width);
    let window_height = ((height as f64 * scale).round() as u32).clamp(1, analysis_height);

    let table = SummedArea::new(&saliency(&analysis), analysis_width, analysis_height);

    let max_x = analysis_width - window_width;
    let max_y = analysis_height - window_height;
    let mut best = (max_x / 2, max_y / 2);
    let mut best_score = table.sum(best.0, best.1, window_width, window_height);

    for y in 0..=max_y {
        for x in 0..=max_x {
            let score = table.sum(x, y, window_width, window_height);
            if score > best_score {
                best = (x, y);
                best_score = score;
            }
        }
    }

    let x = ((best.0 as f64 / scale).round() as u32).min(src_width - width);
    let y = ((best.1 as f64 / scale).round() as u32).min(src_height - height);
    (x, y)
}

/// Per-pixel interest: luma edges, saturation and a bonus for skin tones
fn saliency(image: &RgbaImage) -> Vec<u64> {
    let (width, height) = image.dimensions();
    let luma = |x: u32, y: u32| {
        let [r, g, b, _] = image.get_pixel(x, y).0;
        (299 * r as i64 + 587 * g as i64 + 114 * b as i64) / 1000
    };

    let mut scores = Vec::with_capacity((width * height) as usize);
    for y in 0..height {
        for x in 0..width {
            let [r, g, b, a] = image.get_pixel(x, y).0;
            if a == 0 {
                scores.push(0);
                continue;
            }

            let here = luma(x, y);
            let right = if x + 1 < width { luma(x + 1, y) } else { here };
            let below = if y + 1 < height { luma(x, y + 1) } else { here };
            let edge = (here - right).unsigned_abs() + (here - below).unsigned_abs();

            let max = r.max(g).max(b) as u64;
            let min = r.min(g).min(b) as u64;
            let saturation = (max - min) / 2;

            let skin = r > 95 && g > 40 && b > 20 && r > g && r > b && (r - g.min(b)) > 15;
            let skin_bonus = if skin { 64 } else { 0 };

            scores.push(edge * 4 + saturation + skin_bonus);
        }
    }
    scores
}

/// Summed-area table for O(1) window sums
struct SummedArea {
    stride: usize,
    sums: Vec<u64>,
}

impl SummedArea {
    fn new(values: &[u64], width: u32, height: u32) -> Self {
        let (width, height) = (width as usize, height as usize);
        let stride = width + 1;
        let mut sums = vec![0u64; stride * (height + 1)];

        for y in 0..height {
            let mut row = 0u64;
            for x in 0..width {
                row += values[y * width + x];
                sums[(y + 1) * stride + x + 1] = sums[y * stride + x + 1] + row;
            }
        }

        Self { stride, sums }
    }

    fn sum(&self, x: u32, y: u32, width: u32, height: u32) -> u64 {
        let (x0, y0) = (x as usize, y as usize);
        let (x1, y1) = (x0 + width as usize, y0 + height as usize);
        let at = |x: usize, y: usize| self.sums[y * self.stride + x];
        at(x1, y1) + at(x0, y0) - at(x1, y0) - at(x0, y1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageOutputFormat, Rgba};

    fn solid(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(width, height, Rgba([90, 90, 90, 255])))
    }

    fn encode(image: &DynamicImage, format: ImageOutputFormat) -> Vec<u8> {
        let mut buffer = Cursor::new(Vec::new());
        image.write_to(&mut buffer, format).unwrap();
        buffer.into_inner()
    }

    #[test]
    fn test_decode_png() {
        let bytes = encode(&solid(12, 7), ImageOutputFormat::Png);
        let handle = ImageHandle::decode(&bytes, 1).unwrap();

        assert_eq!((handle.width(), handle.height()), (12, 7));
        assert_eq!(handle.orientation(), 0);
    }

    #[test]
    fn test_decode_garbage_fails() {
        assert!(matches!(
            ImageHandle::decode(b"definitely not an image", 1),
            Err(TransformError::Decode(_))
        ));
    }

    #[test]
    fn test_page_ignored_for_single_page_formats() {
        let bytes = encode(&solid(4, 4), ImageOutputFormat::Png);
        let handle = ImageHandle::decode(&bytes, 3).unwrap();
        assert_eq!((handle.width(), handle.height()), (4, 4));
    }

    #[test]
    fn test_gif_page_selects_frame() {
        use image::codecs::gif::GifEncoder;
        use image::{Delay, Frame};

        let mut bytes = Vec::new();
        {
            let mut encoder = GifEncoder::new(&mut bytes);
            for shade in [10u8, 250] {
                let buffer = RgbaImage::from_pixel(6, 6, Rgba([shade, shade, shade, 255]));
                encoder
                    .encode_frame(Frame::from_parts(buffer, 0, 0, Delay::from_numer_denom_ms(100, 1)))
                    .unwrap();
            }
        }

        let second = ImageHandle::decode(&bytes, 2).unwrap();
        assert!(second.image().to_rgba8().get_pixel(0, 0).0[0] > 200);

        assert!(matches!(
            ImageHandle::decode(&bytes, 5),
            Err(TransformError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_thumbnail() {
        let mut handle = ImageHandle::new(solid(40, 20), 0);
        handle.thumbnail(20, 10).unwrap();
        assert_eq!((handle.width(), handle.height()), (20, 10));

        assert!(handle.thumbnail(0, 10).is_err());
    }

    #[test]
    fn test_smart_crop_finds_detail() {
        // Flat canvas with a checkerboard patch in the bottom-right corner
        let image = RgbaImage::from_fn(200, 100, |x, y| {
            if x >= 150 && y >= 50 && (x + y) % 2 == 0 {
                Rgba([255, 255, 255, 255])
            } else {
                Rgba([0, 0, 0, 255])
            }
        });
        let mut handle = ImageHandle::new(DynamicImage::ImageRgba8(image), 0);

        handle.smart_crop(50, 50).unwrap();
        assert_eq!((handle.width(), handle.height()), (50, 50));

        let patch = handle.image().to_rgba8();
        let white = patch.pixels().filter(|p| p.0[0] == 255).count();
        assert!(white > 1000, "crop missed the detailed region: {white}");
    }

    #[test]
    fn test_smart_crop_rejects_oversize() {
        let mut handle = ImageHandle::new(solid(10, 10), 0);
        assert!(handle.smart_crop(11, 5).is_err());
    }

    #[test]
    fn test_pixelate_keeps_size_and_flattens_blocks() {
        let image = RgbaImage::from_fn(40, 40, |x, _| Rgba([(x * 6) as u8, 0, 0, 255]));
        let mut handle = ImageHandle::new(DynamicImage::ImageRgba8(image), 0);

        handle.pixelate(10).unwrap();
        assert_eq!((handle.width(), handle.height()), (40, 40));

        let pixels = handle.image().to_rgba8();
        assert_eq!(pixels.get_pixel(0, 0), pixels.get_pixel(9, 9));

        assert!(matches!(
            handle.pixelate(0),
            Err(TransformError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_auto_rotate_quarter_turn() {
        let mut handle = ImageHandle::new(solid(30, 10), 6);
        assert!(handle.is_quarter_turned());

        handle.auto_rotate();
        assert_eq!((handle.width(), handle.height()), (10, 30));
        assert_eq!(handle.orientation(), 1);
    }

    #[test]
    fn test_auto_rotate_without_orientation() {
        let mut handle = ImageHandle::new(solid(30, 10), 0);
        handle.auto_rotate();
        assert_eq!((handle.width(), handle.height()), (30, 10));
        assert_eq!(handle.orientation(), 0);
    }

    #[test]
    fn test_summed_area() {
        let values: Vec<u64> = (1..=6).collect();
        let table = SummedArea::new(&values, 3, 2);

        assert_eq!(table.sum(0, 0, 3, 2), 21);
        assert_eq!(table.sum(1, 0, 2, 2), 2 + 3 + 5 + 6);
        assert_eq!(table.sum(2, 1, 1, 1), 6);
    }
}
