//! Image transformation
//!
//! ## Key Components
//!
//! - [`TransformOptions`] - Parsed `op`, `w`, `h`, `q`, `format` and friends
//! - [`ImageHandle`] - Decoded image with its EXIF orientation
//! - [`Operation`] / [`OperationRegistry`] - Named steps (`fit`, `smartcrop`, `pixelate`)
//! - [`Exporter`] / [`ExporterRegistry`] - Per-format encoding profiles
//! - [`Pipeline`] - Decode, run operations, export

mod codec;
mod error;
mod export;
mod format;
mod operations;
mod options;
mod pipeline;

pub use codec::ImageHandle;
pub use error::TransformError;
pub use export::{
    ExportSettings, Exporter, ExporterRegistry, GifExporter, JpegExporter, PngExporter,
    ProcessedArtifact, WebPExporter,
};
pub use format::ImageFormat;
pub use operations::{
    DEFAULT_MAX_OUTPUT_PIXELS, Fit, Operation, OperationRegistry, Pixelate, SmartCrop,
    check_output_size, fit_dimensions, smartcrop_dimensions,
};
pub use options::{
    AUTO_FORMAT, DEFAULT_OPERATION, DEFAULT_PAGE, DEFAULT_PIXELATE_FACTOR, DEFAULT_QUALITY,
    TransformOptions,
};
pub use pipeline::Pipeline;
