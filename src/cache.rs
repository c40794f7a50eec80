//! Entity tags and conditional request checks
//!
//! ETags are derived from the request alone so a revalidation can be answered
//! before anything is downloaded. Each field is length-prefixed so no two
//! distinct field tuples hash the same input.

use axum::http::{HeaderMap, header};
use sha2::{Digest, Sha256};

use crate::imaging::TransformOptions;

/// Bumped whenever the output for identical options may change
const FINGERPRINT_SALT: &str = "mediator/etag/v1";

/// Placeholder for a format that is decided later from the source
const UNSET_FORMAT: &str = "unset";

struct Fingerprint(Sha256);

impl Fingerprint {
    fn new(kind: &str) -> Self {
        let mut fingerprint = Self(Sha256::new());
        fingerprint.field(FINGERPRINT_SALT);
        fingerprint.field(kind);
        fingerprint
    }

    fn field(&mut self, value: impl AsRef<[u8]>) -> &mut Self {
        let value = value.as_ref();
        self.0.update((value.len() as u64).to_be_bytes());
        self.0.update(value);
        self
    }

    /// Quoted lowercase hex
    fn finish(self) -> String {
        format!("\"{}\"", hex::encode(self.0.finalize()))
    }
}

/// ETag for a transform: resolved upstream URL plus every output-affecting
/// option, with operations in request order
pub fn fingerprint_transform(source_url: &str, options: &TransformOptions) -> String {
    let mut fingerprint = Fingerprint::new("transform");
    fingerprint.field(source_url);

    fingerprint.field((options.operations.len() as u64).to_be_bytes());
    for operation in &options.operations {
        fingerprint.field(operation);
    }

    fingerprint
        .field(options.width.to_be_bytes())
        .field(options.height.to_be_bytes())
        .field([options.quality])
        .field([options.strip_metadata as u8])
        .field(options.format.map(|f| f.name()).unwrap_or(UNSET_FORMAT))
        .field(options.pixelate_factor.to_be_bytes())
        .field(options.page.to_be_bytes())
        .field([options.auto_rotate as u8]);

    fingerprint.finish()
}

/// ETag for a render: the raw request URL including its query
pub fn fingerprint_render(raw_url: &str) -> String {
    let mut fingerprint = Fingerprint::new("render");
    fingerprint.field(raw_url);
    fingerprint.finish()
}

/// True when any `If-None-Match` value contains `etag`
pub fn is_not_modified(headers: &HeaderMap, etag: &str) -> bool {
    headers
        .get_all(header::IF_NONE_MATCH)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .any(|value| value.contains(etag))
}
