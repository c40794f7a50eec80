use tracing::debug;

use super::codec::ImageHandle;
use super::error::TransformError;
use super::export::{ExporterRegistry, ProcessedArtifact};
use super::operations::OperationRegistry;
use super::options::TransformOptions;

/// Decode, run operations in order, encode. Both tables are fixed once the
/// pipeline is built.
#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    operations: OperationRegistry,
    exporters: ExporterRegistry,
}

impl Pipeline {
    pub fn new(operations: OperationRegistry, exporters: ExporterRegistry) -> Self {
        Self {
            operations,
            exporters,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(
            OperationRegistry::with_defaults(),
            ExporterRegistry::with_defaults(),
        )
    }

    /// Checks the request before anything is downloaded
    pub fn validate(&self, options: &TransformOptions) -> Result<(), TransformError> {
        self.operations.validate(options)?;
        if let Some(format) = options.format {
            self.exporters.get(format)?;
        }
        Ok(())
    }

    /// Runs the whole chain. `options` is updated with the dimensions and
    /// format that were actually produced.
    pub fn transform(
        &self,
        bytes: &[u8],
        options: &mut TransformOptions,
    ) -> Result<ProcessedArtifact, TransformError> {
        self.validate(options)?;
        let operations = options
            .operations
            .iter()
            .map(|name| self.operations.get(name))
            .collect::<Result<Vec<_>, _>>()?;

        let mut image = ImageHandle::decode(bytes, options.page)?;
        debug!(
            width = image.width(),
            height = image.height(),
            orientation = image.orientation(),
            "Decoded image"
        );

        for operation in operations {
            operation.apply(&mut image, options)?;
        }

        self.exporters.export(image, options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::ImageFormat;
    use image::{DynamicImage, ImageOutputFormat, Rgba, RgbaImage};
    use std::io::Cursor;

    fn png(width: u32, height: u32) -> Vec<u8> {
        let image = RgbaImage::from_fn(width, height, |x, y| {
            Rgba([(x % 256) as u8, (y % 256) as u8, 200, 255])
        });
        let mut buffer = Cursor::new(Vec::new());
        DynamicImage::ImageRgba8(image)
            .write_to(&mut buffer, ImageOutputFormat::Png)
            .unwrap();
        buffer.into_inner()
    }

    fn options(query: &str) -> TransformOptions {
        TransformOptions::from_query(Some(query), None)
    }

    #[test]
    fn test_fit_then_encode() {
        let pipeline = Pipeline::with_defaults();
        let mut opts = options("op=fit&w=200&h=100&format=png");

        let artifact = pipeline.transform(&png(400, 400), &mut opts).unwrap();

        assert_eq!(artifact.mime_type, "image/png");
        let decoded = image::load_from_memory(&artifact.bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (100, 100));
        assert_eq!((opts.width, opts.height), (100, 100));
    }

    #[test]
    fn test_chain_runs_in_order() {
        let pipeline = Pipeline::with_defaults();
        let mut opts = options("op=smartcrop,pixelate&w=60&h=30&pixelatefactor=5&format=webp");

        let artifact = pipeline.transform(&png(120, 120), &mut opts).unwrap();

        assert_eq!(artifact.mime_type, "image/webp");
        let decoded = image::load_from_memory(&artifact.bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (60, 30));
    }

    #[test]
    fn test_unset_format_becomes_jpeg() {
        let pipeline = Pipeline::with_defaults();
        let mut opts = options("w=10");

        let artifact = pipeline.transform(&png(20, 20), &mut opts).unwrap();

        assert_eq!(artifact.mime_type, "image/jpeg");
        assert_eq!(opts.format, Some(ImageFormat::Jpeg));
    }

    #[test]
    fn test_empty_operations() {
        let pipeline = Pipeline::with_defaults();
        let mut opts = options("op=");

        assert_eq!(
            pipeline.transform(&png(4, 4), &mut opts).unwrap_err(),
            TransformError::NoOperations
        );
    }

    #[test]
    fn test_unknown_operation_fails_before_decoding() {
        let pipeline = Pipeline::with_defaults();
        let mut opts = options("op=fit,sepia");

        assert_eq!(
            pipeline.transform(b"not even an image", &mut opts).unwrap_err(),
            TransformError::UnknownOperation("sepia".to_string())
        );
    }

    #[test]
    fn test_huge_box_is_rejected_not_allocated() {
        let pipeline = Pipeline::with_defaults();
        let mut opts = options("op=fit&w=4294967295&format=png");

        assert!(matches!(
            pipeline.transform(&png(40, 20), &mut opts),
            Err(TransformError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_fit_does_not_enlarge() {
        let pipeline = Pipeline::with_defaults();
        let mut opts = options("op=fit&w=4000&h=2000&format=png");

        let artifact = pipeline.transform(&png(40, 20), &mut opts).unwrap();

        let decoded = image::load_from_memory(&artifact.bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (40, 20));
    }

    #[test]
    fn test_fit_then_smartcrop_without_height() {
        let pipeline = Pipeline::with_defaults();
        let mut opts = options("op=fit,smartcrop&w=100&format=png");

        let artifact = pipeline.transform(&png(200, 100), &mut opts).unwrap();

        let decoded = image::load_from_memory(&artifact.bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (100, 50));
    }

    #[test]
    fn test_validate() {
        let pipeline = Pipeline::with_defaults();

        assert!(pipeline.validate(&options("op=fit&format=gif")).is_ok());
        assert!(pipeline.validate(&options("op=smartcrop")).is_err());
    }
}
