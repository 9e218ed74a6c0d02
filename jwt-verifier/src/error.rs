use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::claims::Jwt;

/// The token string is malformed. Never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormatError {
    #[error("you must provide a jwt to verify")]
    EmptyToken,

    #[error("token must contain at least 1 period ('.') and only characters 'a-Z 0-9 _-'")]
    MalformedShape,

    #[error("the tokens header does not appear to be a base64 encoded string")]
    HeaderNotBase64,

    #[error("the tokens header is not a json object")]
    HeaderNotJson,

    #[error("the tokens header must contain an 'alg'")]
    MissingAlg,

    #[error("the tokens header must contain a 'kid'")]
    MissingKid,

    #[error("the only supported alg is RS256, got {0}")]
    UnsupportedAlg(String),
}

/// Retrieving a metadata (or key set) document failed.
///
/// `Clone` so that every caller coalesced onto one in-flight fetch receives
/// the same failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("request for metadata {url:?} was not successful: {detail}")]
    Transport { url: String, detail: String },

    #[error("request for metadata {url:?} was not HTTP 2xx OK, it was: {status}")]
    Status { url: String, status: u16 },

    #[error("metadata from {url:?} is not a JSON object: {detail}")]
    InvalidBody { url: String, detail: String },

    #[error("request for metadata {url:?} timed out after {timeout:?}")]
    Timeout { url: String, timeout: Duration },
}

impl FetchError {
    /// The URL that was being fetched.
    pub fn url(&self) -> &str {
        match self {
            FetchError::Transport { url, .. }
            | FetchError::Status { url, .. }
            | FetchError::InvalidBody { url, .. }
            | FetchError::Timeout { url, .. } => url,
        }
    }

    /// HTTP status code, when the server answered with a non-2xx status.
    pub fn status(&self) -> Option<u16> {
        match self {
            FetchError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// The signature adaptor could not produce a trusted claim set.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("missing 'jwks_uri' from metadata")]
    MissingJwksUri,

    #[error("could not fetch key set: {0}")]
    KeySet(#[source] FetchError),

    #[error("key set at {jwks_uri} is malformed: {detail}")]
    MalformedKeySet { jwks_uri: String, detail: String },

    #[error("token header could not be read: {0}")]
    InvalidHeader(String),

    #[error("token header missing 'kid'")]
    MissingKeyId,

    #[error("no key with kid '{0}' in key set")]
    UnknownKeyId(String),

    #[error("key '{kid}' cannot be used: {detail}")]
    UnusableKey { kid: String, detail: String },

    #[error("signature verification failed: {0}")]
    Signature(String),

    /// Failure reported by a custom adaptor.
    #[error("{0}")]
    Adaptor(String),
}

/// A decoded claim set failed one of the registered-claim checks.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClaimError {
    #[error("iss: {actual} does not match {expected}")]
    IssuerMismatch { actual: String, expected: String },

    #[error("aud: {actual} does not match {expected}")]
    AudienceMismatch { actual: String, expected: String },

    #[error("unknown type for audience validation")]
    UnknownAudienceType,

    #[error("cid: {actual} does not match {expected}")]
    ClientIdMismatch { actual: String, expected: String },

    #[error("unknown type for clientId validation")]
    UnknownClientIdType,

    #[error("exp: missing")]
    MissingExp,

    #[error("the token is expired")]
    Expired,

    #[error("iat: missing")]
    MissingIat,

    #[error("the token was issued in the future")]
    IssuedInFuture,

    #[error("nonce: {actual} does not match {expected}")]
    NonceMismatch { actual: String, expected: String },
}

/// Which claim check rejected a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValidationStage {
    Issuer,
    Audience,
    ClientId,
    Expiration,
    IssuedAt,
    Nonce,
}

impl fmt::Display for ValidationStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValidationStage::Issuer => "Issuer",
            ValidationStage::Audience => "Audience",
            ValidationStage::ClientId => "Client Id",
            ValidationStage::Expiration => "Expiration",
            ValidationStage::IssuedAt => "Issued At",
            ValidationStage::Nonce => "Nonce",
        };
        f.write_str(name)
    }
}

/// Error returned by [`JwtVerifier::verify_id_token`](crate::JwtVerifier::verify_id_token)
/// and [`JwtVerifier::verify_access_token`](crate::JwtVerifier::verify_access_token).
///
/// Describes the first failure encountered. Claim-level failures carry the
/// decoded token so callers can still inspect its claims.
#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("token is not valid: {0}")]
    Format(#[source] FormatError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("could not decode token: {0}")]
    Decode(#[source] DecodeError),

    #[error("the `{stage}` was not able to be validated. {source}")]
    Claim {
        stage: ValidationStage,
        source: ClaimError,
        jwt: Box<Jwt>,
    },
}

impl VerifyError {
    /// The decoded token, present only for claim-level failures.
    pub fn claims(&self) -> Option<&Jwt> {
        match self {
            VerifyError::Claim { jwt, .. } => Some(jwt),
            _ => None,
        }
    }

    /// The claim check that failed, if the failure was claim-level.
    pub fn stage(&self) -> Option<ValidationStage> {
        match self {
            VerifyError::Claim { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    /// The underlying claim failure, if any.
    pub fn claim_error(&self) -> Option<&ClaimError> {
        match self {
            VerifyError::Claim { source, .. } => Some(source),
            _ => None,
        }
    }

    /// Whether re-running the same verification may succeed. Only metadata
    /// retrieval failures are transient.
    pub fn is_retryable(&self) -> bool {
        matches!(self, VerifyError::Fetch(_))
    }
}

impl From<FormatError> for VerifyError {
    fn from(err: FormatError) -> Self {
        VerifyError::Format(err)
    }
}

impl From<DecodeError> for VerifyError {
    fn from(err: DecodeError) -> Self {
        VerifyError::Decode(err)
    }
}
