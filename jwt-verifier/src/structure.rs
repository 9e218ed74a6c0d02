//! Structural checks run on a raw token before any network call.

use std::sync::LazyLock;

use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;
use regex::Regex;
use serde_json::{Map, Value};
use tracing::trace;

use crate::error::FormatError;

/// The only signing algorithm accepted in a token header.
pub const SUPPORTED_ALG: &str = "RS256";

/// Compact-JWT shape. Not anchored at the start, and tolerant of a trailing
/// path-like suffix, because tokens may arrive embedded in URLs.
static TOKEN_SHAPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[a-zA-Z0-9_-]+\.[a-zA-Z0-9_-]+\.?([a-zA-Z0-9_-]+)[/a-zA-Z0-9_-]+?$")
        .expect("token shape pattern is valid")
});

/// Standard alphabet that, like lenient decoders, ignores non-zero trailing
/// bits in the final quantum.
const HEADER_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_decode_allow_trailing_bits(true)
        .with_decode_padding_mode(DecodePaddingMode::RequireCanonical),
);

/// The parsed token header.
pub type HeaderFields = Map<String, Value>;

/// Check the gross shape and header of `token`.
///
/// Steps run in a fixed order and the first failing one is reported:
/// emptiness, shape, header base64, header JSON, `alg` and `kid` presence,
/// then `alg == "RS256"`.
pub fn validate_structure(token: &str) -> Result<HeaderFields, FormatError> {
    if token.is_empty() {
        return Err(FormatError::EmptyToken);
    }

    if !TOKEN_SHAPE.is_match(token) {
        return Err(FormatError::MalformedShape);
    }

    let header = token.split('.').next().unwrap_or_default();
    let decoded = HEADER_ENGINE
        .decode(pad_header(header))
        .map_err(|_| FormatError::HeaderNotBase64)?;

    let fields: HeaderFields =
        serde_json::from_slice(&decoded).map_err(|_| FormatError::HeaderNotJson)?;

    let alg = fields.get("alg").ok_or(FormatError::MissingAlg)?;
    if !fields.contains_key("kid") {
        return Err(FormatError::MissingKid);
    }

    if alg.as_str() != Some(SUPPORTED_ALG) {
        return Err(FormatError::UnsupportedAlg(display_value(alg)));
    }

    trace!(kid = ?fields.get("kid"), "token structure accepted");
    Ok(fields)
}

/// Right-pad with `=` to the next multiple of four characters.
fn pad_header(header: &str) -> String {
    let mut padded = header.to_string();
    let rem = padded.len() % 4;
    if rem != 0 {
        padded.extend(std::iter::repeat('=').take(4 - rem));
    }
    padded
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
