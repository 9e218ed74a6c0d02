use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use jwt_verifier::{ConfigError, JwtVerifier, VerifierConfig};
use serial_test::serial;
use tempfile::TempDir;

const VARS: [&str; 8] = [
    "ISSUER",
    "AUDIENCE",
    "CLIENT_ID",
    "NONCE",
    "LEEWAY",
    "CACHE_TTL",
    "CLEANUP_INTERVAL",
    "FETCH_TIMEOUT",
];

/// Clears the verifier's variables on creation and on drop.
struct EnvGuard;

impl EnvGuard {
    fn new() -> Self {
        clear_vars();
        EnvGuard
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        clear_vars();
    }
}

fn clear_vars() {
    for var in VARS {
        std::env::remove_var(var);
    }
}

struct CwdGuard {
    original: PathBuf,
}

impl CwdGuard {
    fn new(path: &Path) -> Self {
        let original = std::env::current_dir().unwrap();
        std::env::set_current_dir(path).unwrap();
        CwdGuard { original }
    }
}

impl Drop for CwdGuard {
    fn drop(&mut self) {
        let _ = std::env::set_current_dir(&self.original);
    }
}

#[test]
#[serial]
fn from_env_reads_process_variables() {
    let _env = EnvGuard::new();
    let tmp = TempDir::new().unwrap();
    let _cwd = CwdGuard::new(tmp.path());

    std::env::set_var("ISSUER", "https://example.okta.com/oauth2/default");
    std::env::set_var("CLIENT_ID", "0oa1client");
    std::env::set_var("AUDIENCE", "api://default");
    std::env::set_var("LEEWAY", "30s");

    let cfg = VerifierConfig::from_env().unwrap();
    assert_eq!(cfg.issuer, "https://example.okta.com/oauth2/default");
    assert_eq!(cfg.expected_claim("cid"), Some("0oa1client"));
    assert_eq!(cfg.expected_claim("aud"), Some("api://default"));
    assert_eq!(cfg.expected_claim("nonce"), None);
    assert_eq!(cfg.leeway, Duration::from_secs(30));
    assert_eq!(cfg.cache_ttl, Duration::from_secs(300));
}

#[test]
#[serial]
fn from_env_loads_dotenv_in_working_directory() {
    let _env = EnvGuard::new();
    let tmp = TempDir::new().unwrap();
    fs::write(
        tmp.path().join(".env"),
        "ISSUER=https://dotenv.example.com\nNONCE=n-0S6_WzA2Mj\nCACHE_TTL=90s\n",
    )
    .unwrap();
    let _cwd = CwdGuard::new(tmp.path());

    let cfg = VerifierConfig::from_env().unwrap();
    assert_eq!(cfg.issuer, "https://dotenv.example.com");
    assert_eq!(cfg.expected_claim("nonce"), Some("n-0S6_WzA2Mj"));
    assert_eq!(cfg.cache_ttl, Duration::from_secs(90));
}

#[test]
#[serial]
fn process_variables_override_env_file() {
    let _env = EnvGuard::new();
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("verifier.env");
    fs::write(&path, "ISSUER=https://file.example.com\nLEEWAY=10s\n").unwrap();

    std::env::set_var("ISSUER", "https://process.example.com");
    let cfg = VerifierConfig::from_env_file(&path).unwrap();
    assert_eq!(cfg.issuer, "https://process.example.com");
    assert_eq!(cfg.leeway, Duration::from_secs(10));
}

#[test]
#[serial]
fn from_env_requires_issuer() {
    let _env = EnvGuard::new();
    let tmp = TempDir::new().unwrap();
    let _cwd = CwdGuard::new(tmp.path());

    assert!(matches!(
        VerifierConfig::from_env(),
        Err(ConfigError::MissingIssuer)
    ));
}

#[test]
#[serial]
fn invalid_duration_in_env() {
    let _env = EnvGuard::new();
    let tmp = TempDir::new().unwrap();
    let _cwd = CwdGuard::new(tmp.path());

    std::env::set_var("ISSUER", "https://example.com");
    std::env::set_var("LEEWAY", "two minutes");
    let err = VerifierConfig::from_env().unwrap_err();
    assert!(matches!(err, ConfigError::InvalidDuration { .. }));
    assert!(err.to_string().contains("two minutes"));
}

#[test]
fn missing_env_file_is_a_load_error() {
    let tmp = TempDir::new().unwrap();
    let err = VerifierConfig::from_env_file(tmp.path().join("nope.env")).unwrap_err();
    assert!(matches!(err, ConfigError::Load(_)));
}

#[test]
fn yaml_file_builds_a_verifier() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("verifier.yaml");
    fs::write(
        &path,
        "issuer: https://example.okta.com/oauth2/default\nclaims_to_validate:\n  aud: api://default\ncleanup_interval: 0s\n",
    )
    .unwrap();

    let cfg = VerifierConfig::from_yaml_file(&path).unwrap();
    assert_eq!(cfg.cleanup_interval, Duration::ZERO);

    let verifier = JwtVerifier::from_config(cfg.clone()).unwrap();
    assert_eq!(verifier.config(), &cfg);
}

#[test]
fn yaml_without_issuer_is_rejected() {
    assert!(matches!(
        VerifierConfig::from_yaml_str("leeway: 10s\n"),
        Err(ConfigError::MissingIssuer)
    ));
    assert!(matches!(
        VerifierConfig::from_yaml_str("issuer: [unclosed"),
        Err(ConfigError::Load(_))
    ));
}
