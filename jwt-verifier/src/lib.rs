pub mod adaptor;
pub mod claims;
pub mod config;
pub mod discovery;
pub mod error;
pub mod metadata;
pub mod nonce;
pub mod structure;
pub mod verifier;

// Re-export primary public types for convenience.
pub use adaptor::{JwksAdaptor, SignatureAdaptor};
pub use claims::{Claims, Jwt};
pub use config::{parse_duration, ConfigError, VerifierConfig};
pub use discovery::{DiscoveryProvider, OAuth2, Oidc};
pub use error::{ClaimError, DecodeError, FetchError, FormatError, ValidationStage, VerifyError};
pub use metadata::{
    default_cache_factory, Cache, CacheFactory, CacheOptions, Document, DocumentLoader, Fetcher,
    HttpFetcher,
};
pub use nonce::generate_nonce;
pub use verifier::{JwtVerifier, JwtVerifierBuilder};

pub mod prelude {
    //! Re-exports of the most commonly used verifier types.
    pub use crate::{Jwt, JwtVerifier, VerifierConfig, VerifyError};
}
