use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

/// Default clock-skew tolerance.
pub const DEFAULT_LEEWAY: Duration = Duration::from_secs(120);
/// Default lifetime of a cached metadata document.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(5 * 60);
/// Default period of the background cache sweep.
pub const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(10 * 60);
/// Default upper bound on a single metadata fetch.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Error type for configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("issuer must not be empty")]
    MissingIssuer,

    #[error("invalid duration {value:?}: {reason}")]
    InvalidDuration { value: String, reason: String },

    #[error("config load error: {0}")]
    Load(String),
}

/// Verifier configuration. Owned by one verifier and never mutated after
/// the verifier is built.
#[derive(Debug, Clone, PartialEq)]
pub struct VerifierConfig {
    /// Expected issuer; also the base of the discovery document URL.
    pub issuer: String,

    /// Expected claim values keyed by claim name (`aud`, `cid`, `nonce`).
    pub claims_to_validate: HashMap<String, String>,

    /// Clock-skew tolerance for `exp` and `iat` (whole seconds are used).
    pub leeway: Duration,

    /// How long a fetched metadata document is served from cache.
    pub cache_ttl: Duration,

    /// Period of the background sweep of expired cache entries.
    pub cleanup_interval: Duration,

    /// Upper bound on a single metadata fetch.
    pub fetch_timeout: Duration,
}

impl VerifierConfig {
    /// Create a config for `issuer` with default leeway and cache timings.
    pub fn new(issuer: impl Into<String>) -> Self {
        Self {
            issuer: issuer.into(),
            claims_to_validate: HashMap::new(),
            leeway: DEFAULT_LEEWAY,
            cache_ttl: DEFAULT_CACHE_TTL,
            cleanup_interval: DEFAULT_CLEANUP_INTERVAL,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }

    /// Expect `name` to carry `value`.
    pub fn with_claim(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.claims_to_validate.insert(name.into(), value.into());
        self
    }

    /// Set the leeway from a duration string such as `"120s"` or `"2m"`.
    pub fn with_leeway(mut self, leeway: &str) -> Result<Self, ConfigError> {
        self.leeway = parse_duration(leeway)?;
        Ok(self)
    }

    pub fn with_leeway_secs(mut self, secs: u64) -> Self {
        self.leeway = Duration::from_secs(secs);
        self
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    pub fn with_cleanup_interval(mut self, interval: Duration) -> Self {
        self.cleanup_interval = interval;
        self
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    /// The configured expectation for `name`, if any.
    pub fn expected_claim(&self, name: &str) -> Option<&str> {
        self.claims_to_validate.get(name).map(String::as_str)
    }

    /// Leeway truncated to whole seconds, saturating at `i64::MAX`.
    pub fn leeway_secs(&self) -> i64 {
        i64::try_from(self.leeway.as_secs()).unwrap_or(i64::MAX)
    }

    /// Parse a config from YAML.
    ///
    /// ```yaml
    /// issuer: https://example.okta.com/oauth2/default
    /// claims_to_validate:
    ///   aud: api://default
    ///   cid: 0oa1b2c3
    /// leeway: 2m
    /// cache_ttl: 5m
    /// ```
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig =
            serde_yaml::from_str(yaml).map_err(|e| ConfigError::Load(e.to_string()))?;
        raw.into_config()
    }

    /// Read and parse a YAML config file.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::Load(e.to_string()))?;
        Self::from_yaml_str(&content)
    }

    /// Build a config from environment variables, after loading `.env` from
    /// the working directory if one exists.
    ///
    /// Reads `ISSUER` (required), `AUDIENCE`, `CLIENT_ID`, `NONCE`, `LEEWAY`,
    /// `CACHE_TTL`, `CLEANUP_INTERVAL` and `FETCH_TIMEOUT`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`from_env`](Self::from_env) but loads the given env file.
    /// Variables already set in the process take precedence.
    pub fn from_env_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        dotenvy::from_path(path.as_ref()).map_err(|e| ConfigError::Load(e.to_string()))?;
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut claims = HashMap::new();
        for (var, claim) in [("AUDIENCE", "aud"), ("CLIENT_ID", "cid"), ("NONCE", "nonce")] {
            if let Some(value) = lookup(var) {
                claims.insert(claim.to_string(), value);
            }
        }

        RawConfig {
            issuer: lookup("ISSUER").unwrap_or_default(),
            claims_to_validate: claims,
            leeway: lookup("LEEWAY"),
            cache_ttl: lookup("CACHE_TTL"),
            cleanup_interval: lookup("CLEANUP_INTERVAL"),
            fetch_timeout: lookup("FETCH_TIMEOUT"),
        }
        .into_config()
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawConfig {
    issuer: String,
    claims_to_validate: HashMap<String, String>,
    leeway: Option<String>,
    cache_ttl: Option<String>,
    cleanup_interval: Option<String>,
    fetch_timeout: Option<String>,
}

impl RawConfig {
    fn into_config(self) -> Result<VerifierConfig, ConfigError> {
        if self.issuer.trim().is_empty() {
            return Err(ConfigError::MissingIssuer);
        }
        let or_default = |value: Option<String>, default: Duration| match value {
            Some(s) => parse_duration(&s),
            None => Ok(default),
        };

        Ok(VerifierConfig {
            issuer: self.issuer,
            claims_to_validate: self.claims_to_validate,
            leeway: or_default(self.leeway, DEFAULT_LEEWAY)?,
            cache_ttl: or_default(self.cache_ttl, DEFAULT_CACHE_TTL)?,
            cleanup_interval: or_default(self.cleanup_interval, DEFAULT_CLEANUP_INTERVAL)?,
            fetch_timeout: or_default(self.fetch_timeout, DEFAULT_FETCH_TIMEOUT)?,
        })
    }
}

/// Parse a duration string: a sequence of decimal numbers each followed by
/// a unit (`ns`, `us`, `µs`, `ms`, `s`, `m`, `h`), e.g. `"120s"`, `"1h30m"`,
/// `"1.5s"`. A bare `"0"` is accepted. Negative durations are rejected.
pub fn parse_duration(input: &str) -> Result<Duration, ConfigError> {
    let invalid = |reason: &str| ConfigError::InvalidDuration {
        value: input.to_string(),
        reason: reason.to_string(),
    };

    let s = input.trim();
    let s = s.strip_prefix('+').unwrap_or(s);
    if s.is_empty() {
        return Err(invalid("empty duration"));
    }
    if s.starts_with('-') {
        return Err(invalid("negative durations are not allowed"));
    }
    if s == "0" {
        return Ok(Duration::ZERO);
    }

    let mut nanos = 0f64;
    let mut rest = s;
    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        if number_len == 0 {
            return Err(invalid("expected a number"));
        }
        let (number, tail) = rest.split_at(number_len);
        let value: f64 = number.parse().map_err(|_| invalid("malformed number"))?;

        let unit_len = tail
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(tail.len());
        let (unit, tail) = tail.split_at(unit_len);
        let scale = match unit {
            "ns" => 1.0,
            "us" | "µs" | "μs" => 1e3,
            "ms" => 1e6,
            "s" => 1e9,
            "m" => 60e9,
            "h" => 3600e9,
            "" => return Err(invalid("missing unit")),
            _ => return Err(invalid("unknown unit")),
        };

        nanos += value * scale;
        rest = tail;
    }

    Ok(Duration::from_nanos(nanos.round() as u64))
}
