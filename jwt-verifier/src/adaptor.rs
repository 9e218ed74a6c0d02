//! Signature verification behind a pluggable adaptor.

use std::fmt;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::claims::Claims;
use crate::error::DecodeError;
use crate::metadata::Cache;

/// Turns a raw token into a trusted claim set.
///
/// Implementations only check the signature. Registered-claim validation
/// (`exp`, `iat`, `aud`, ...) is left to the verifier.
pub trait SignatureAdaptor: Send + Sync {
    fn name(&self) -> &str;

    fn decode<'a>(
        &'a self,
        token: &'a str,
        jwks_uri: &'a str,
    ) -> BoxFuture<'a, Result<Claims, DecodeError>>;
}

/// A single key from a JWKS document. Unknown members are ignored.
#[derive(Debug, Clone, Deserialize)]
struct Jwk {
    kty: String,
    #[serde(default)]
    alg: Option<String>,
    #[serde(default)]
    n: Option<String>,
    #[serde(default)]
    e: Option<String>,
}

impl Jwk {
    fn to_decoding_key(&self, kid: &str) -> Result<DecodingKey, DecodeError> {
        let unusable = |detail: String| DecodeError::UnusableKey {
            kid: kid.to_string(),
            detail,
        };

        if self.kty != "RSA" {
            return Err(unusable(format!("unsupported key type: {}", self.kty)));
        }
        if let Some(alg) = self.alg.as_deref() {
            if alg != "RS256" {
                return Err(unusable(format!("unsupported key algorithm: {alg}")));
            }
        }
        let n = self
            .n
            .as_deref()
            .ok_or_else(|| unusable("RSA key missing 'n' component".into()))?;
        let e = self
            .e
            .as_deref()
            .ok_or_else(|| unusable("RSA key missing 'e' component".into()))?;
        DecodingKey::from_rsa_components(n, e)
            .map_err(|err| unusable(format!("failed to construct RSA decoding key: {err}")))
    }
}

/// Default adaptor: RS256 verification against the issuer's JWKS.
///
/// Key sets are loaded through a [`Cache`] keyed by `jwks_uri`, so they
/// share the verifier's TTL and coalescing behaviour.
pub struct JwksAdaptor {
    key_sets: Arc<dyn Cache>,
}

impl JwksAdaptor {
    pub fn new(key_sets: Arc<dyn Cache>) -> Self {
        Self { key_sets }
    }

    async fn decoding_key(&self, jwks_uri: &str, kid: &str) -> Result<DecodingKey, DecodeError> {
        let key_set = self
            .key_sets
            .get(jwks_uri)
            .await
            .map_err(DecodeError::KeySet)?;

        let keys = key_set
            .get("keys")
            .and_then(Value::as_array)
            .ok_or_else(|| DecodeError::MalformedKeySet {
                jwks_uri: jwks_uri.to_string(),
                detail: "missing 'keys' array".into(),
            })?;

        let raw = keys
            .iter()
            .find(|key| key.get("kid").and_then(Value::as_str) == Some(kid))
            .ok_or_else(|| DecodeError::UnknownKeyId(kid.to_string()))?;

        let jwk = Jwk::deserialize(raw).map_err(|err| DecodeError::MalformedKeySet {
            jwks_uri: jwks_uri.to_string(),
            detail: format!("key '{kid}': {err}"),
        })?;
        jwk.to_decoding_key(kid)
    }
}

impl fmt::Debug for JwksAdaptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JwksAdaptor").finish_non_exhaustive()
    }
}

impl SignatureAdaptor for JwksAdaptor {
    fn name(&self) -> &str {
        "jwks"
    }

    fn decode<'a>(
        &'a self,
        token: &'a str,
        jwks_uri: &'a str,
    ) -> BoxFuture<'a, Result<Claims, DecodeError>> {
        Box::pin(async move {
            let header = jsonwebtoken::decode_header(token)
                .map_err(|e| DecodeError::InvalidHeader(e.to_string()))?;
            let kid = header.kid.ok_or(DecodeError::MissingKeyId)?;

            let key = self.decoding_key(jwks_uri, &kid).await?;

            let mut validation = Validation::new(Algorithm::RS256);
            validation.validate_exp = false;
            validation.validate_nbf = false;
            validation.validate_aud = false;
            validation.required_spec_claims.clear();

            let data = jsonwebtoken::decode::<Claims>(token, &key, &validation)
                .map_err(|e| DecodeError::Signature(e.to_string()))?;

            debug!(kid = %kid, jwks_uri, "token signature verified");
            Ok(data.claims)
        })
    }
}
