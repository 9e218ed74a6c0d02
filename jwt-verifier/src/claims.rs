//! Registered-claim checks applied to a decoded token.
//!
//! Each check is independent and pure: it takes the claim value as decoded
//! (any JSON type, or absent) plus the verifier configuration and reports
//! success or a [`ClaimError`]. Claims are never trusted to have the
//! expected JSON type; every check matches on the variant explicitly.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;
use serde_json::{Map, Value};

use crate::config::VerifierConfig;
use crate::error::{ClaimError, ValidationStage};

/// Decoded claim set, keyed by claim name.
pub type Claims = Map<String, Value>;

/// A verified token's claims.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Jwt {
    pub claims: Claims,
}

impl Jwt {
    pub fn new(claims: Claims) -> Self {
        Self { claims }
    }

    /// Look up a claim by name.
    pub fn claim(&self, name: &str) -> Option<&Value> {
        self.claims.get(name)
    }

    pub fn issuer(&self) -> Option<&str> {
        self.claim("iss").and_then(Value::as_str)
    }

    pub fn subject(&self) -> Option<&str> {
        self.claim("sub").and_then(Value::as_str)
    }

    pub fn into_claims(self) -> Claims {
        self.claims
    }
}

/// Current time in whole seconds since the Unix epoch.
pub fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}

/// Stringify any claim value: strings verbatim, everything else as JSON.
fn stringify(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => "null".to_string(),
    }
}

fn normalize_issuer(issuer: &str) -> &str {
    issuer.trim_end_matches('/')
}

/// `iss` must equal the configured issuer, ignoring trailing slashes.
pub fn validate_issuer(iss: Option<&Value>, config: &VerifierConfig) -> Result<(), ClaimError> {
    let actual = stringify(iss);
    let expected = normalize_issuer(&config.issuer);
    if normalize_issuer(&actual) != expected {
        return Err(ClaimError::IssuerMismatch {
            actual: normalize_issuer(&actual).to_string(),
            expected: expected.to_string(),
        });
    }
    Ok(())
}

/// Outcome of matching a string-or-list claim against an expected value.
enum ListMatch {
    Found,
    NotFound,
    UnknownType,
}

fn match_string_or_list(value: Option<&Value>, expected: &str) -> ListMatch {
    match value {
        Some(Value::String(s)) if s == expected => ListMatch::Found,
        Some(Value::String(_)) => ListMatch::NotFound,
        Some(Value::Array(items)) => {
            if items.iter().any(|item| !item.is_string()) {
                return ListMatch::UnknownType;
            }
            if items.iter().any(|item| item.as_str() == Some(expected)) {
                ListMatch::Found
            } else {
                ListMatch::NotFound
            }
        }
        _ => ListMatch::UnknownType,
    }
}

/// `aud` must be, or contain, the configured audience. Passes when no
/// audience is configured.
pub fn validate_audience(aud: Option<&Value>, config: &VerifierConfig) -> Result<(), ClaimError> {
    let Some(expected) = config.expected_claim("aud") else {
        return Ok(());
    };
    match match_string_or_list(aud, expected) {
        ListMatch::Found => Ok(()),
        ListMatch::NotFound => Err(ClaimError::AudienceMismatch {
            actual: stringify(aud),
            expected: expected.to_string(),
        }),
        ListMatch::UnknownType => Err(ClaimError::UnknownAudienceType),
    }
}

/// `cid` must be, or contain, the configured client id. Passes when no
/// client id is configured.
pub fn validate_client_id(cid: Option<&Value>, config: &VerifierConfig) -> Result<(), ClaimError> {
    let Some(expected) = config.expected_claim("cid") else {
        return Ok(());
    };
    match match_string_or_list(cid, expected) {
        ListMatch::Found => Ok(()),
        ListMatch::NotFound => Err(ClaimError::ClientIdMismatch {
            actual: stringify(cid),
            expected: expected.to_string(),
        }),
        ListMatch::UnknownType => Err(ClaimError::UnknownClientIdType),
    }
}

/// `exp` must be numeric; the token is expired when `now - leeway > exp`.
pub fn validate_exp(exp: Option<&Value>, config: &VerifierConfig, now: i64) -> Result<(), ClaimError> {
    let exp = exp.and_then(Value::as_f64).ok_or(ClaimError::MissingExp)?;
    if now.saturating_sub(config.leeway_secs()) as f64 > exp {
        return Err(ClaimError::Expired);
    }
    Ok(())
}

/// `iat` must be numeric; the token is rejected when `now + leeway < iat`.
pub fn validate_iat(iat: Option<&Value>, config: &VerifierConfig, now: i64) -> Result<(), ClaimError> {
    let iat = iat.and_then(Value::as_f64).ok_or(ClaimError::MissingIat)?;
    if (now.saturating_add(config.leeway_secs()) as f64) < iat {
        return Err(ClaimError::IssuedInFuture);
    }
    Ok(())
}

/// `nonce` (absent means empty) must equal the configured nonce (unset
/// means empty).
pub fn validate_nonce(nonce: Option<&Value>, config: &VerifierConfig) -> Result<(), ClaimError> {
    let expected = config.expected_claim("nonce").unwrap_or_default();
    let matches = match nonce {
        None => expected.is_empty(),
        Some(Value::String(s)) => s == expected,
        Some(_) => false,
    };
    if !matches {
        return Err(ClaimError::NonceMismatch {
            actual: nonce.map(|v| stringify(Some(v))).unwrap_or_default(),
            expected: expected.to_string(),
        });
    }
    Ok(())
}

/// Run the check for `stage` against `claims`.
pub fn check(
    stage: ValidationStage,
    claims: &Claims,
    config: &VerifierConfig,
    now: i64,
) -> Result<(), ClaimError> {
    match stage {
        ValidationStage::Issuer => validate_issuer(claims.get("iss"), config),
        ValidationStage::Audience => validate_audience(claims.get("aud"), config),
        ValidationStage::ClientId => validate_client_id(claims.get("cid"), config),
        ValidationStage::Expiration => validate_exp(claims.get("exp"), config, now),
        ValidationStage::IssuedAt => validate_iat(claims.get("iat"), config, now),
        ValidationStage::Nonce => validate_nonce(claims.get("nonce"), config),
    }
}
