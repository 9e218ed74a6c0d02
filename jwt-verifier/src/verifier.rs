use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, warn};

use crate::adaptor::{JwksAdaptor, SignatureAdaptor};
use crate::claims::{self, Jwt};
use crate::config::{ConfigError, VerifierConfig};
use crate::discovery::{DiscoveryProvider, Oidc};
use crate::error::{DecodeError, FetchError, ValidationStage, VerifyError};
use crate::metadata::{
    default_cache_factory, document_loader, Cache, CacheFactory, CacheOptions, Document, Fetcher,
    HttpFetcher,
};
use crate::structure::validate_structure;

/// Checks run for ID tokens, in order.
const ID_TOKEN_STAGES: [ValidationStage; 5] = [
    ValidationStage::Issuer,
    ValidationStage::Audience,
    ValidationStage::Expiration,
    ValidationStage::IssuedAt,
    ValidationStage::Nonce,
];

/// Checks run for access tokens, in order.
const ACCESS_TOKEN_STAGES: [ValidationStage; 5] = [
    ValidationStage::Issuer,
    ValidationStage::Audience,
    ValidationStage::ClientId,
    ValidationStage::Expiration,
    ValidationStage::IssuedAt,
];

/// Verifies ID and access tokens issued by a single issuer.
///
/// Verification runs in a fixed order and stops at the first failure:
/// structural checks on the raw string, metadata discovery (cached),
/// signature verification through the [`SignatureAdaptor`], then the claim
/// checks for the token kind.
///
/// A verifier is safe to share across tasks; all verifications go through
/// the same metadata cache, so concurrent first calls trigger a single
/// discovery fetch.
///
/// # Example
///
/// ```ignore
/// let verifier = JwtVerifier::builder("https://example.okta.com/oauth2/default")
///     .claim("aud", "api://default")
///     .claim("cid", "0oa1b2c3")
///     .build()?;
///
/// let jwt = verifier.verify_access_token(&token).await?;
/// println!("sub = {:?}", jwt.subject());
/// ```
pub struct JwtVerifier {
    config: VerifierConfig,
    discovery: Arc<dyn DiscoveryProvider>,
    adaptor: Arc<dyn SignatureAdaptor>,
    metadata: Arc<dyn Cache>,
}

impl JwtVerifier {
    pub fn builder(issuer: impl Into<String>) -> JwtVerifierBuilder {
        JwtVerifierBuilder::new(VerifierConfig::new(issuer))
    }

    /// Build a verifier with default collaborators from a loaded config.
    pub fn from_config(config: VerifierConfig) -> Result<Self, ConfigError> {
        JwtVerifierBuilder::new(config).build()
    }

    pub fn config(&self) -> &VerifierConfig {
        &self.config
    }

    pub fn discovery(&self) -> &dyn DiscoveryProvider {
        self.discovery.as_ref()
    }

    pub fn adaptor(&self) -> &dyn SignatureAdaptor {
        self.adaptor.as_ref()
    }

    /// URL of the issuer's metadata document; also its cache key.
    pub fn metadata_url(&self) -> String {
        self.discovery.metadata_url(&self.config.issuer)
    }

    /// The issuer's metadata document, from cache when fresh.
    pub async fn metadata(&self) -> Result<Document, FetchError> {
        self.metadata.get(&self.metadata_url()).await
    }

    /// Verify an OIDC ID token: issuer, audience, expiry, issued-at and nonce.
    pub async fn verify_id_token(&self, token: &str) -> Result<Jwt, VerifyError> {
        self.verify(token, &ID_TOKEN_STAGES, "id_token").await
    }

    /// Verify an OAuth2 access token: issuer, audience, client id, expiry and
    /// issued-at.
    pub async fn verify_access_token(&self, token: &str) -> Result<Jwt, VerifyError> {
        self.verify(token, &ACCESS_TOKEN_STAGES, "access_token").await
    }

    async fn verify(
        &self,
        token: &str,
        stages: &[ValidationStage],
        kind: &'static str,
    ) -> Result<Jwt, VerifyError> {
        validate_structure(token).map_err(|err| {
            debug!(kind, error = %err, "token rejected before decoding");
            VerifyError::Format(err)
        })?;

        let jwt = self.decode(token).await?;

        let now = claims::now_unix();
        for &stage in stages {
            if let Err(source) = claims::check(stage, &jwt.claims, &self.config, now) {
                debug!(kind, %stage, error = %source, "claim validation failed");
                return Err(VerifyError::Claim {
                    stage,
                    source,
                    jwt: Box::new(jwt),
                });
            }
        }

        debug!(kind, sub = ?jwt.subject(), "token verified");
        Ok(jwt)
    }

    async fn decode(&self, token: &str) -> Result<Jwt, VerifyError> {
        let metadata = self.metadata().await.map_err(|err| {
            warn!(issuer = %self.config.issuer, error = %err, "could not load issuer metadata");
            err
        })?;

        let jwks_uri = metadata
            .get("jwks_uri")
            .and_then(Value::as_str)
            .ok_or(DecodeError::MissingJwksUri)?;

        let claims = self.adaptor.decode(token, jwks_uri).await.map_err(|err| {
            debug!(adaptor = self.adaptor.name(), error = %err, "token could not be decoded");
            err
        })?;
        Ok(Jwt::new(claims))
    }
}

impl fmt::Debug for JwtVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JwtVerifier")
            .field("config", &self.config)
            .field("discovery", &self.discovery.name())
            .field("adaptor", &self.adaptor.name())
            .finish_non_exhaustive()
    }
}

/// Builder for [`JwtVerifier`]. Collaborators not supplied fall back to
/// [`HttpFetcher`], the in-memory TTL cache, [`Oidc`] discovery and the
/// [`JwksAdaptor`].
pub struct JwtVerifierBuilder {
    config: VerifierConfig,
    fetcher: Option<Arc<dyn Fetcher>>,
    http_client: Option<reqwest::Client>,
    cache_factory: Option<CacheFactory>,
    adaptor: Option<Arc<dyn SignatureAdaptor>>,
    discovery: Option<Arc<dyn DiscoveryProvider>>,
}

impl JwtVerifierBuilder {
    pub fn new(config: VerifierConfig) -> Self {
        Self {
            config,
            fetcher: None,
            http_client: None,
            cache_factory: None,
            adaptor: None,
            discovery: None,
        }
    }

    /// Expect claim `name` to carry `value` (`aud`, `cid` or `nonce`).
    pub fn claim(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.config = self.config.with_claim(name, value);
        self
    }

    /// Clock-skew tolerance as a duration string, e.g. `"30s"`.
    pub fn leeway(mut self, leeway: &str) -> Result<Self, ConfigError> {
        self.config = self.config.with_leeway(leeway)?;
        Ok(self)
    }

    pub fn leeway_secs(mut self, secs: u64) -> Self {
        self.config = self.config.with_leeway_secs(secs);
        self
    }

    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.config = self.config.with_cache_ttl(ttl);
        self
    }

    /// Period of the background sweep. Zero disables it.
    pub fn cleanup_interval(mut self, interval: Duration) -> Self {
        self.config = self.config.with_cleanup_interval(interval);
        self
    }

    pub fn fetch_timeout(mut self, timeout: Duration) -> Self {
        self.config = self.config.with_fetch_timeout(timeout);
        self
    }

    /// Replace the document fetcher. Takes precedence over
    /// [`http_client`](Self::http_client).
    pub fn fetcher(mut self, fetcher: impl Fetcher) -> Self {
        self.fetcher = Some(Arc::new(fetcher));
        self
    }

    /// Use this client for the default [`HttpFetcher`].
    pub fn http_client(mut self, client: reqwest::Client) -> Self {
        self.http_client = Some(client);
        self
    }

    pub fn cache_factory(mut self, factory: CacheFactory) -> Self {
        self.cache_factory = Some(factory);
        self
    }

    pub fn adaptor(mut self, adaptor: impl SignatureAdaptor + 'static) -> Self {
        self.adaptor = Some(Arc::new(adaptor));
        self
    }

    pub fn discovery(mut self, discovery: impl DiscoveryProvider + 'static) -> Self {
        self.discovery = Some(Arc::new(discovery));
        self
    }

    pub fn build(self) -> Result<JwtVerifier, ConfigError> {
        if self.config.issuer.trim().is_empty() {
            return Err(ConfigError::MissingIssuer);
        }

        let fetcher: Arc<dyn Fetcher> = match (self.fetcher, self.http_client) {
            (Some(fetcher), _) => fetcher,
            (None, Some(client)) => Arc::new(HttpFetcher::with_client(client)),
            (None, None) => Arc::new(HttpFetcher::new()),
        };
        let loader = document_loader(fetcher, self.config.fetch_timeout);
        let factory = self.cache_factory.unwrap_or_else(default_cache_factory);
        let options = CacheOptions {
            ttl: self.config.cache_ttl,
            cleanup_interval: self.config.cleanup_interval,
        };

        let metadata = factory(Arc::clone(&loader), options);
        let adaptor = match self.adaptor {
            Some(adaptor) => adaptor,
            None => Arc::new(JwksAdaptor::new(factory(loader, options))),
        };
        let discovery = self.discovery.unwrap_or_else(|| Arc::new(Oidc));

        debug!(
            issuer = %self.config.issuer,
            discovery = discovery.name(),
            adaptor = adaptor.name(),
            "jwt verifier built"
        );

        Ok(JwtVerifier {
            config: self.config,
            discovery,
            adaptor,
            metadata,
        })
    }
}
