#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use futures_util::future::BoxFuture;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use jwt_verifier::{Document, FetchError, Fetcher};
use rand::rngs::OsRng;
use rsa::pkcs8::EncodePrivateKey;
use rsa::traits::PublicKeyParts;
use rsa::{RsaPrivateKey, RsaPublicKey};
use serde_json::{json, Map, Value};

pub const ISSUER: &str = "https://golang.oktapreview.com/oauth2/default";
pub const METADATA_URL: &str =
    "https://golang.oktapreview.com/oauth2/default/.well-known/openid-configuration";
pub const JWKS_URI: &str = "https://golang.oktapreview.com/oauth2/default/v1/keys";
pub const KID: &str = "test-key";

/// RSA-2048 signing key shared by every test in a binary.
pub struct TestKey {
    pub encoding_key: EncodingKey,
    pub n: String,
    pub e: String,
}

pub static KEY: LazyLock<TestKey> = LazyLock::new(|| {
    let private_key = RsaPrivateKey::new(&mut OsRng, 2048).expect("generate RSA-2048 key");
    let public_key = RsaPublicKey::from(&private_key);
    let pem = private_key
        .to_pkcs8_pem(rsa::pkcs8::LineEnding::LF)
        .expect("export PKCS8 PEM");
    TestKey {
        encoding_key: EncodingKey::from_rsa_pem(pem.as_bytes()).expect("encoding key"),
        n: URL_SAFE_NO_PAD.encode(public_key.n().to_bytes_be()),
        e: URL_SAFE_NO_PAD.encode(public_key.e().to_bytes_be()),
    }
});

pub fn now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_secs() as i64
}

/// Claims that pass every check for a verifier configured with `ISSUER`.
pub fn valid_claims() -> Value {
    let now = now();
    json!({
        "iss": ISSUER,
        "sub": "00u1abcd",
        "exp": now + 3600,
        "iat": now,
    })
}

/// Sign `claims` with the shared key under `kid`.
pub fn sign_with_kid(claims: &Value, kid: &str) -> String {
    let mut header = Header::new(Algorithm::RS256);
    header.kid = Some(kid.to_string());
    encode(&header, claims, &KEY.encoding_key).unwrap()
}

pub fn sign(claims: &Value) -> String {
    sign_with_kid(claims, KID)
}

pub fn jwks() -> Value {
    json!({
        "keys": [{
            "kty": "RSA",
            "alg": "RS256",
            "use": "sig",
            "kid": KID,
            "n": KEY.n,
            "e": KEY.e,
        }]
    })
}

pub fn metadata() -> Value {
    json!({
        "issuer": ISSUER,
        "jwks_uri": JWKS_URI,
        "authorization_endpoint": format!("{ISSUER}/v1/authorize"),
    })
}

/// In-memory fetcher serving fixed documents by URL and counting calls.
#[derive(Clone, Default)]
pub struct MockFetcher {
    docs: Arc<HashMap<String, Value>>,
    calls: Arc<HashMap<String, AtomicUsize>>,
    delay: Duration,
}

impl MockFetcher {
    pub fn new(docs: impl IntoIterator<Item = (&'static str, Value)>) -> Self {
        let docs: HashMap<String, Value> =
            docs.into_iter().map(|(url, doc)| (url.to_string(), doc)).collect();
        let calls = docs.keys().map(|url| (url.clone(), AtomicUsize::new(0))).collect();
        Self {
            docs: Arc::new(docs),
            calls: Arc::new(calls),
            delay: Duration::ZERO,
        }
    }

    /// Answers 404 for every URL, counting requests for `url`.
    pub fn not_found(url: &'static str) -> Self {
        let calls = HashMap::from([(url.to_string(), AtomicUsize::new(0))]);
        Self {
            docs: Arc::new(HashMap::new()),
            calls: Arc::new(calls),
            delay: Duration::ZERO,
        }
    }

    /// Serves the issuer metadata and key set.
    pub fn okta() -> Self {
        Self::new([(METADATA_URL, metadata()), (JWKS_URI, jwks())])
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self, url: &str) -> usize {
        self.calls
            .get(url)
            .map(|c| c.load(Ordering::SeqCst))
            .unwrap_or_default()
    }
}

impl Fetcher for MockFetcher {
    fn fetch<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<Document, FetchError>> {
        Box::pin(async move {
            if let Some(counter) = self.calls.get(url) {
                counter.fetch_add(1, Ordering::SeqCst);
            }
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            match self.docs.get(url) {
                Some(Value::Object(map)) => Ok(Arc::new(map.clone())),
                Some(_) => Err(FetchError::InvalidBody {
                    url: url.to_string(),
                    detail: "not an object".into(),
                }),
                None => Err(FetchError::Status {
                    url: url.to_string(),
                    status: 404,
                }),
            }
        })
    }
}

pub fn object(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap()
}
