//! Supported image formats and how they are named, negotiated and sniffed

use std::fmt;

/// Output formats the gateway can encode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageFormat {
    Jpeg,
    Png,
    WebP,
    Gif,
}

impl ImageFormat {
    /// The first safe universal format, used when nothing else decided
    pub const DEFAULT: ImageFormat = ImageFormat::Jpeg;

    /// Parses the `format` query value. `auto` and unknown names give `None`.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "jpeg" | "jpg" => Some(ImageFormat::Jpeg),
            "png" => Some(ImageFormat::Png),
            "webp" => Some(ImageFormat::WebP),
            "gif" => Some(ImageFormat::Gif),
            _ => None,
        }
    }

    /// Maps a `Content-Type` value, ignoring parameters
    pub fn from_mime(content_type: &str) -> Option<Self> {
        let media: mime::Mime = content_type.trim().parse().ok()?;
        match media.essence_str() {
            "image/jpeg" | "image/jpg" => Some(ImageFormat::Jpeg),
            "image/png" => Some(ImageFormat::Png),
            "image/webp" => Some(ImageFormat::WebP),
            "image/gif" => Some(ImageFormat::Gif),
            _ => None,
        }
    }

    /// First of webp, png or jpeg listed in an `Accept` header, in list order
    pub fn from_accept(accept: &str) -> Option<Self> {
        accept.split(',').find_map(|entry| {
            let media: mime::Mime = entry.trim().parse().ok()?;
            match media.essence_str() {
                "image/webp" => Some(ImageFormat::WebP),
                "image/png" => Some(ImageFormat::Png),
                "image/jpeg" => Some(ImageFormat::Jpeg),
                _ => None,
            }
        })
    }

    /// Detects the format from magic bytes
    pub fn sniff(bytes: &[u8]) -> Option<Self> {
        match image::guess_format(bytes).ok()? {
            image::ImageFormat::Jpeg => Some(ImageFormat::Jpeg),
            image::ImageFormat::Png => Some(ImageFormat::Png),
            image::ImageFormat::WebP => Some(ImageFormat::WebP),
            image::ImageFormat::Gif => Some(ImageFormat::Gif),
            _ => None,
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::Png => "image/png",
            ImageFormat::WebP => "image/webp",
            ImageFormat::Gif => "image/gif",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "jpeg",
            ImageFormat::Png => "png",
            ImageFormat::WebP => "webp",
            ImageFormat::Gif => "gif",
        }
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_name() {
        assert_eq!(ImageFormat::from_name("JPEG"), Some(ImageFormat::Jpeg));
        assert_eq!(ImageFormat::from_name("jpg"), Some(ImageFormat::Jpeg));
        assert_eq!(ImageFormat::from_name("webp"), Some(ImageFormat::WebP));
        assert_eq!(ImageFormat::from_name("auto"), None);
        assert_eq!(ImageFormat::from_name("tiff"), None);
    }

    #[test]
    fn test_from_mime_ignores_parameters() {
        assert_eq!(
            ImageFormat::from_mime("image/png; charset=binary"),
            Some(ImageFormat::Png)
        );
        assert_eq!(ImageFormat::from_mime("image/gif"), Some(ImageFormat::Gif));
        assert_eq!(ImageFormat::from_mime("text/html"), None);
        assert_eq!(ImageFormat::from_mime(""), None);
    }

    #[test]
    fn test_from_accept_uses_list_order() {
        assert_eq!(
            ImageFormat::from_accept("image/avif,image/webp,image/apng,*/*;q=0.8"),
            Some(ImageFormat::WebP)
        );
        assert_eq!(
            ImageFormat::from_accept("image/png, image/webp"),
            Some(ImageFormat::Png)
        );
        assert_eq!(ImageFormat::from_accept("text/html,*/*"), None);
        assert_eq!(ImageFormat::from_accept(""), None);
    }

    #[test]
    fn test_sniff() {
        assert_eq!(
            ImageFormat::sniff(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]),
            Some(ImageFormat::Png)
        );
        assert_eq!(
            ImageFormat::sniff(&[0xFF, 0xD8, 0xFF, 0xE0]),
            Some(ImageFormat::Jpeg)
        );
        assert_eq!(ImageFormat::sniff(b"GIF89a"), Some(ImageFormat::Gif));
        assert_eq!(ImageFormat::sniff(b"hello"), None);
    }
}
