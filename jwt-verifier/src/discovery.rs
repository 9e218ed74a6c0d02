//! Where provider metadata lives relative to the issuer.

use std::fmt;

/// Names the well-known metadata path for an issuer.
pub trait DiscoveryProvider: fmt::Debug + Send + Sync {
    /// Path appended to the issuer, starting with `/`.
    fn well_known_path(&self) -> &str;

    fn name(&self) -> &str;

    /// Full metadata URL for `issuer`.
    fn metadata_url(&self, issuer: &str) -> String {
        format!("{}{}", issuer.trim_end_matches('/'), self.well_known_path())
    }
}

/// OpenID Connect discovery. The default.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Oidc;

impl DiscoveryProvider for Oidc {
    fn well_known_path(&self) -> &str {
        "/.well-known/openid-configuration"
    }

    fn name(&self) -> &str {
        "oidc"
    }
}

/// OAuth 2.0 authorization server metadata (RFC 8414).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OAuth2;

impl DiscoveryProvider for OAuth2 {
    fn well_known_path(&self) -> &str {
        "/.well-known/oauth-authorization-server"
    }

    fn name(&self) -> &str {
        "oauth2"
    }
}
