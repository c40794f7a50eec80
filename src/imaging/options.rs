//! Transform options parsed from the request query

use url::form_urlencoded;

use super::format::ImageFormat;

pub const DEFAULT_OPERATION: &str = "fit";
pub const DEFAULT_QUALITY: u8 = 80;
pub const DEFAULT_PIXELATE_FACTOR: u32 = 20;
pub const DEFAULT_PAGE: u32 = 1;
pub const AUTO_FORMAT: &str = "auto";

/// Everything a transform request asked for.
///
/// Operations may rewrite `width` and `height` while running, so a value
/// read after `Pipeline::transform` is what was produced, not what was asked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformOptions {
    /// Operation names in request order
    pub operations: Vec<String>,
    pub width: u32,
    pub height: u32,
    /// 1..=100
    pub quality: u8,
    pub strip_metadata: bool,
    /// Resolved output format. `None` means "same as the source".
    pub format: Option<ImageFormat>,
    /// Raw `format` value as sent by the client, lowercased
    pub requested_format: String,
    pub auto_rotate: bool,
    pub pixelate_factor: u32,
    /// 1-based frame for multi-page sources
    pub page: u32,
}

impl Default for TransformOptions {
    fn default() -> Self {
        Self {
            operations: vec![DEFAULT_OPERATION.to_string()],
            width: 0,
            height: 0,
            quality: DEFAULT_QUALITY,
            strip_metadata: true,
            format: None,
            requested_format: String::new(),
            auto_rotate: true,
            pixelate_factor: DEFAULT_PIXELATE_FACTOR,
            page: DEFAULT_PAGE,
        }
    }
}

impl TransformOptions {
    /// Builds options from a query string and the client's `Accept` header.
    ///
    /// Parameters are read once, first occurrence wins. Values that fail to
    /// parse fall back to their defaults instead of failing the request.
    pub fn from_query(query: Option<&str>, accept: Option<&str>) -> Self {
        let mut options = Self::default();
        let Some(query) = query else {
            return options;
        };

        let lookup = |name: &str| {
            form_urlencoded::parse(query.as_bytes())
                .find(|(key, _)| key == name)
                .map(|(_, value)| value.into_owned())
        };

        if let Some(ops) = lookup("op") {
            let operations: Vec<String> = ops
                .split(',')
                .map(|op| op.trim().to_ascii_lowercase())
                .filter(|op| !op.is_empty())
                .collect();
            options.operations = operations;
        }

        options.width = lookup("w").and_then(|v| v.trim().parse().ok()).unwrap_or(0);
        options.height = lookup("h").and_then(|v| v.trim().parse().ok()).unwrap_or(0);
        options.quality = lookup("q")
            .and_then(|v| v.trim().parse::<u32>().ok())
            .map(|q| q.clamp(1, 100) as u8)
            .unwrap_or(DEFAULT_QUALITY);
        options.strip_metadata = lookup("strip")
            .and_then(|v| parse_bool(&v))
            .unwrap_or(true);
        options.auto_rotate = options.strip_metadata;
        options.pixelate_factor = lookup("pixelatefactor")
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(DEFAULT_PIXELATE_FACTOR);
        options.page = lookup("page")
            .and_then(|v| v.trim().parse().ok())
            .filter(|page| *page > 0)
            .unwrap_or(DEFAULT_PAGE);

        if let Some(format) = lookup("format") {
            let format = format.trim().to_ascii_lowercase();
            options.format = if format == AUTO_FORMAT {
                accept.and_then(ImageFormat::from_accept)
            } else {
                ImageFormat::from_name(&format)
            };
            options.requested_format = format;
        }

        options
    }

    /// True when the output format was negotiated from `Accept`
    pub fn is_negotiated(&self) -> bool {
        self.requested_format == AUTO_FORMAT
    }
}

/// Accepts the usual spellings of true/false
fn parse_bool(value: &str) -> Option<bool> {
    match value.trim() {
        "1" | "t" | "T" | "true" | "TRUE" | "True" => Some(true),
        "0" | "f" | "F" | "false" | "FALSE" | "False" => Some(false),
        _ => None,
    }
}
