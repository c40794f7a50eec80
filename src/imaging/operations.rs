//! Named image operations and the registry that resolves them
//!
//! Every operation gets a `check` pass over the request options before any
//! bytes are fetched, then `apply` on the decoded image. Operations run in
//! request order and may rewrite the target dimensions for later steps.

use std::collections::BTreeMap;
use std::sync::Arc;

use super::codec::ImageHandle;
use super::error::TransformError;
use super::options::TransformOptions;

/// Output pixel budget when none is configured (50 megapixels)
pub const DEFAULT_MAX_OUTPUT_PIXELS: u64 = 50_000_000;

/// A single step of the transform chain
pub trait Operation: Send + Sync {
    /// Name used in the `op` query parameter
    fn name(&self) -> &'static str;

    /// Rejects options the operation can never satisfy, without the image
    fn check(&self, _options: &TransformOptions) -> Result<(), TransformError> {
        Ok(())
    }

    /// True when `apply` writes new dimensions back into the options
    fn sets_dimensions(&self) -> bool {
        false
    }

    /// True when `check` only rejects missing dimensions, which an earlier
    /// dimension-setting step may still fill in
    fn requires_dimensions(&self) -> bool {
        false
    }

    fn apply(
        &self,
        image: &mut ImageHandle,
        options: &mut TransformOptions,
    ) -> Result<(), TransformError>;
}

/// Shrink to fit inside `w` x `h`, preserving aspect ratio. Never enlarges.
#[derive(Debug, Clone, Copy)]
pub struct Fit {
    max_output_pixels: u64,
}

impl Fit {
    pub fn new(max_output_pixels: u64) -> Self {
        Self { max_output_pixels }
    }
}

impl Default for Fit {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_OUTPUT_PIXELS)
    }
}

impl Operation for Fit {
    fn name(&self) -> &'static str {
        "fit"
    }

    fn check(&self, options: &TransformOptions) -> Result<(), TransformError> {
        check_output_size(options.width, options.height, self.max_output_pixels)
    }

    fn sets_dimensions(&self) -> bool {
        true
    }

    fn apply(
        &self,
        image: &mut ImageHandle,
        options: &mut TransformOptions,
    ) -> Result<(), TransformError> {
        if options.width == 0 && options.height == 0 {
            return Ok(());
        }

        let (width, height) = fit_dimensions(
            (image.width(), image.height()),
            (options.width, options.height),
            options.auto_rotate && image.is_quarter_turned(),
        )?;
        check_output_size(width, height, self.max_output_pixels)?;

        options.width = width;
        options.height = height;
        image.thumbnail(width, height)
    }
}

/// Crop to exactly `w` x `h` around the most interesting region
#[derive(Debug, Default, Clone, Copy)]
pub struct SmartCrop;

impl Operation for SmartCrop {
    fn name(&self) -> &'static str {
        "smartcrop"
    }

    fn check(&self, options: &TransformOptions) -> Result<(), TransformError> {
        if options.width == 0 || options.height == 0 {
            return Err(TransformError::InvalidParameter(
                "width and height must be specified for smartcrop".to_string(),
            ));
        }
        Ok(())
    }

    fn sets_dimensions(&self) -> bool {
        true
    }

    fn requires_dimensions(&self) -> bool {
        true
    }

    fn apply(
        &self,
        image: &mut ImageHandle,
        options: &mut TransformOptions,
    ) -> Result<(), TransformError> {
        self.check(options)?;

        let (width, height) = smartcrop_dimensions(
            (image.width(), image.height()),
            (options.width, options.height),
        )?;

        options.width = width;
        options.height = height;
        image.smart_crop(width, height)
    }
}

/// Blocky mosaic with `pixelatefactor` sized cells
#[derive(Debug, Default, Clone, Copy)]
pub struct Pixelate;

impl Operation for Pixelate {
    fn name(&self) -> &'static str {
        "pixelate"
    }

    fn check(&self, options: &TransformOptions) -> Result<(), TransformError> {
        if options.pixelate_factor == 0 {
            return Err(TransformError::InvalidParameter(
                "pixelate factor must be specified (non-zero)".to_string(),
            ));
        }
        Ok(())
    }

    fn apply(
        &self,
        image: &mut ImageHandle,
        options: &mut TransformOptions,
    ) -> Result<(), TransformError> {
        image.pixelate(options.pixelate_factor)
    }
}

/// Largest size with the source's aspect ratio inside the target box.
///
/// For quarter-turned sources both pairs are swapped before comparing and
/// swapped back afterwards. A zero target side leaves that side free. A box
/// larger than the source yields the source size.
pub fn fit_dimensions(
    source: (u32, u32),
    target: (u32, u32),
    quarter_turned: bool,
) -> Result<(u32, u32), TransformError> {
    let (src_w, src_h) = source;
    if src_w == 0 || src_h == 0 {
        return Err(TransformError::InvalidGeometry {
            width: src_w,
            height: src_h,
        });
    }

    let ((src_w, src_h), (mut fit_w, mut fit_h)) = if quarter_turned {
        ((src_h, src_w), (target.1, target.0))
    } else {
        ((src_w, src_h), target)
    };

    let (sw, sh) = (src_w as u64, src_h as u64);
    let scaled = |value: u32, num: u64, den: u64| {
        ((value as f64 * num as f64 / den as f64).round() as u32).max(1)
    };

    if fit_h == 0 || (fit_w != 0 && sw * fit_h as u64 > fit_w as u64 * sh) {
        fit_h = scaled(fit_w, sh, sw);
    } else {
        fit_w = scaled(fit_h, sw, sh);
    }

    if fit_w as u64 > sw || fit_h as u64 > sh {
        (fit_w, fit_h) = (src_w, src_h);
    }

    Ok(if quarter_turned {
        (fit_h, fit_w)
    } else {
        (fit_w, fit_h)
    })
}

/// Crop box for smart cropping. A box larger than the source in either
/// dimension is scaled down uniformly until it fits, keeping its ratio.
pub fn smartcrop_dimensions(
    source: (u32, u32),
    requested: (u32, u32),
) -> Result<(u32, u32), TransformError> {
    let (src_w, src_h) = source;
    let (req_w, req_h) = requested;
    if req_w == 0 || req_h == 0 {
        return Err(TransformError::InvalidParameter(
            "width and height must be specified for smartcrop".to_string(),
        ));
    }
    if src_w == 0 || src_h == 0 {
        return Err(TransformError::InvalidGeometry {
            width: src_w,
            height: src_h,
        });
    }

    if req_w <= src_w && req_h <= src_h {
        return Ok((req_w, req_h));
    }

    let scale = (src_w as f64 / req_w as f64).min(src_h as f64 / req_h as f64);
    let width = ((req_w as f64 * scale) as u32).clamp(1, src_w);
    let height = ((req_h as f64 * scale) as u32).clamp(1, src_h);

    Ok((width, height))
}

/// Rejects boxes whose area exceeds `max_pixels`. A zero side counts as 1.
pub fn check_output_size(width: u32, height: u32, max_pixels: u64) -> Result<(), TransformError> {
    let pixels = width.max(1) as u64 * height.max(1) as u64;
    if pixels > max_pixels {
        return Err(TransformError::InvalidParameter(format!(
            "requested size {width}x{height} exceeds the limit of {max_pixels} pixels"
        )));
    }
    Ok(())
}

/// Read-only table of operations by name
#[derive(Clone)]
pub struct OperationRegistry {
    operations: BTreeMap<String, Arc<dyn Operation>>,
}

impl OperationRegistry {
    pub fn new() -> Self {
        Self {
            operations: BTreeMap::new(),
        }
    }

    pub fn register(&mut self, operation: Arc<dyn Operation>) {
        self.operations
            .insert(operation.name().to_string(), operation);
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn Operation>, TransformError> {
        self.operations
            .get(name)
            .cloned()
            .ok_or_else(|| TransformError::UnknownOperation(name.to_string()))
    }

    pub fn has_operation(&self, name: &str) -> bool {
        self.operations.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.operations.keys().map(String::as_str)
    }

    /// Resolves every requested operation and runs its `check`. Dimension
    /// checks are skipped after a step that sets the dimensions itself.
    pub fn validate(&self, options: &TransformOptions) -> Result<(), TransformError> {
        if options.operations.is_empty() {
            return Err(TransformError::NoOperations);
        }

        let mut sized = false;
        for name in &options.operations {
            let operation = self.get(name)?;
            if !(sized && operation.requires_dimensions()) {
                operation.check(options)?;
            }
            sized |= operation.sets_dimensions();
        }
        Ok(())
    }

    /// Registry with fit, smartcrop and pixelate
    pub fn with_defaults() -> Self {
        Self::with_max_output_pixels(DEFAULT_MAX_OUTPUT_PIXELS)
    }

    /// Registry with fit, smartcrop and pixelate, `fit` bounded to
    /// `max_output_pixels`
    pub fn with_max_output_pixels(max_output_pixels: u64) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(Fit::new(max_output_pixels)));
        registry.register(Arc::new(SmartCrop));
        registry.register(Arc::new(Pixelate));
        registry
    }
}

impl Default for OperationRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl std::fmt::Debug for OperationRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.operations.keys()).finish()
    }
}
