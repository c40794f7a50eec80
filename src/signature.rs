//! HMAC-SHA256 request signatures
//!
//! A signed URL carries `s=<hex digest>` in its query string. The digest is
//! computed over the canonical URL: `scheme://host/path?query` with the
//! signature parameter removed and the remaining parameters re-encoded in
//! key order. The parameter is stripped from every request before any
//! handler sees it, whether or not a secret is configured, so it never
//! reaches an upstream.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;
use url::form_urlencoded;

type HmacSha256 = Hmac<Sha256>;

/// Query parameter carrying the signature
pub const SIGNATURE_PARAM: &str = "s";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("Missing signature")]
    Missing,
    #[error("Invalid signature")]
    Invalid,
}

/// Query string split into the signature and everything else
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StrippedQuery {
    /// Remaining parameters, canonically encoded; `None` when nothing is left
    pub query: Option<String>,
    pub signature: Option<String>,
}

/// Removes every `s` parameter and re-encodes the rest sorted by key
/// (stable, so repeated keys keep their relative order).
pub fn strip_signature(query: Option<&str>) -> StrippedQuery {
    let Some(raw) = query else {
        return StrippedQuery::default();
    };

    let mut signature = None;
    let mut pairs: Vec<(String, String)> = Vec::new();

    for (key, value) in form_urlencoded::parse(raw.as_bytes()) {
        if key == SIGNATURE_PARAM {
            signature.get_or_insert_with(|| value.into_owned());
        } else {
            pairs.push((key.into_owned(), value.into_owned()));
        }
    }

    pairs.sort_by(|a, b| a.0.cmp(&b.0));

    let query = if pairs.is_empty() {
        None
    } else {
        let mut serializer = form_urlencoded::Serializer::new(String::new());
        for (key, value) in &pairs {
            serializer.append_pair(key, value);
        }
        Some(serializer.finish())
    };

    StrippedQuery { query, signature }
}

/// `base` is everything before `?`; `query` must already be stripped
pub fn canonical_url(base: &str, query: Option<&str>) -> String {
    match query {
        Some(q) if !q.is_empty() => format!("{base}?{q}"),
        _ => base.to_string(),
    }
}

/// Verifies and produces signatures for one shared secret
#[derive(Clone)]
pub struct SignatureVerifier {
    secret: Vec<u8>,
}

impl SignatureVerifier {
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        Self {
            secret: secret.as_ref().to_vec(),
        }
    }

    /// An empty secret means open mode: nothing is verified
    pub fn is_enabled(&self) -> bool {
        !self.secret.is_empty()
    }

    fn mac(&self, message: &str) -> HmacSha256 {
        let mut mac =
            HmacSha256::new_from_slice(&self.secret).expect("HMAC can take key of any size");
        mac.update(message.as_bytes());
        mac
    }

    /// Hex HMAC over an already-canonical URL
    pub fn sign(&self, canonical: &str) -> String {
        hex::encode(self.mac(canonical).finalize().into_bytes())
    }

    /// Constant-time check of `signature` against the canonical URL.
    /// Always succeeds in open mode.
    pub fn verify(&self, canonical: &str, signature: Option<&str>) -> Result<(), SignatureError> {
        if !self.is_enabled() {
            return Ok(());
        }

        let submitted = signature.filter(|s| !s.is_empty()).ok_or(SignatureError::Missing)?;
        let submitted = hex::decode(submitted).map_err(|_| SignatureError::Invalid)?;

        self.mac(canonical)
            .verify_slice(&submitted)
            .map_err(|_| SignatureError::Invalid)
    }

    /// Returns `url` with a fresh `s` parameter appended to its canonical form
    pub fn sign_url(&self, url: &str) -> String {
        let url = url.split('#').next().unwrap_or(url);
        let (base, query) = match url.split_once('?') {
            Some((base, query)) => (base, Some(query)),
            None => (url, None),
        };

        let stripped = strip_signature(query);
        let canonical = canonical_url(base, stripped.query.as_deref());
        let signature = self.sign(&canonical);

        let separator = if stripped.query.is_some() { '&' } else { '?' };
        format!("{canonical}{separator}{SIGNATURE_PARAM}={signature}")
    }
}

impl std::fmt::Debug for SignatureVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignatureVerifier")
            .field("enabled", &self.is_enabled())
            .finish()
    }
}
