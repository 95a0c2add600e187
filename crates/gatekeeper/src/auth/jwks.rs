//! JWKS key loader: fetches, caches and resolves RSA verification keys.
//!
//! The loader fetches the identity provider's JSON Web Key Set once and keeps
//! the derived keys until [`KeyResolver::reload`] is called. The cache is
//! generation-stamped:
//!
//! - `reload(seen)` bumps the generation only while `seen` is still the
//!   current one, so stale callers cannot discard a fresh snapshot. It
//!   performs no I/O.
//! - `lookup()` serves from the cache when the loaded snapshot
//!   matches the current generation, otherwise it takes the fetch gate and
//!   loads a fresh snapshot. Callers queued on the gate re-check the cache
//!   first, so concurrent callers on a cold or invalidated cache share one
//!   fetch and its outcome (success or failure).
//!
//! # Security
//!
//! - Only RSA keys are accepted; keys are derived once per snapshot
//! - HTTPS should be used in production (enforced by deployment config)

use crate::errors::KeyLoadError;
use crate::observability::metrics;
use async_trait::async_trait;
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use jsonwebtoken::DecodingKey;
use rsa::pkcs8::DecodePublicKey;
use rsa::traits::PublicKeyParts;
use rsa::{BigUint, RsaPublicKey};
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};
use tracing::instrument;
use x509_cert::der::{Decode, Encode};
use x509_cert::Certificate;

/// Width the RSA public exponent is padded to before big-endian decoding.
const EXPONENT_WIDTH: usize = 8;

/// JSON Web Key from the JWKS endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct Jwk {
    /// Key type (only "RSA" is usable).
    pub kty: String,

    /// Key ID - used to select the correct key for verification.
    #[serde(default)]
    pub kid: Option<String>,

    /// Key use (should be "sig").
    #[serde(default, rename = "use")]
    pub key_use: Option<String>,

    /// Algorithm (should be "RS256").
    #[serde(default)]
    pub alg: Option<String>,

    /// RSA modulus (base64url, big-endian).
    #[serde(default)]
    pub n: Option<String>,

    /// RSA public exponent (base64url, big-endian).
    #[serde(default)]
    pub e: Option<String>,

    /// X.509 certificate chain (standard base64 DER, leaf first).
    #[serde(default)]
    pub x5c: Vec<String>,
}

/// JWKS document.
#[derive(Debug, Clone, Deserialize)]
pub struct JwksDocument {
    pub keys: Vec<Jwk>,
}

/// Public key material for one key ID.
#[derive(Clone)]
pub struct VerificationKey {
    kid: String,
    public_key: RsaPublicKey,
    decoding_key: DecodingKey,
}

impl VerificationKey {
    /// Derive a verification key from a JWK entry.
    ///
    /// A certificate chain takes precedence over `n`/`e` components.
    pub fn from_jwk(kid: &str, jwk: &Jwk) -> Result<Self, KeyLoadError> {
        let invalid = |reason: String| KeyLoadError::InvalidKey {
            kid: kid.to_string(),
            reason,
        };

        if jwk.kty != "RSA" {
            return Err(invalid(format!("unsupported key type {:?}", jwk.kty)));
        }

        let public_key = match jwk.x5c.first() {
            Some(cert) => rsa_key_from_certificate(cert).map_err(invalid)?,
            None => {
                let n = jwk
                    .n
                    .as_deref()
                    .ok_or_else(|| invalid("missing modulus".to_string()))?;
                let e = jwk
                    .e
                    .as_deref()
                    .ok_or_else(|| invalid("missing exponent".to_string()))?;
                rsa_key_from_components(n, e).map_err(invalid)?
            }
        };

        let decoding_key = DecodingKey::from_rsa_raw_components(
            &public_key.n().to_bytes_be(),
            &public_key.e().to_bytes_be(),
        );

        Ok(Self {
            kid: kid.to_string(),
            public_key,
            decoding_key,
        })
    }

    pub fn kid(&self) -> &str {
        &self.kid
    }

    pub fn public_key(&self) -> &RsaPublicKey {
        &self.public_key
    }

    pub fn decoding_key(&self) -> &DecodingKey {
        &self.decoding_key
    }
}

impl fmt::Debug for VerificationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VerificationKey")
            .field("kid", &self.kid)
            .field("modulus_bits", &(self.public_key.size() * 8))
            .finish_non_exhaustive()
    }
}

/// Build an RSA key from the first certificate of an `x5c` chain.
fn rsa_key_from_certificate(cert_b64: &str) -> Result<RsaPublicKey, String> {
    let der = STANDARD
        .decode(cert_b64)
        .map_err(|e| format!("certificate is not valid base64: {e}"))?;
    let cert =
        Certificate::from_der(&der).map_err(|e| format!("certificate is not valid DER: {e}"))?;
    let spki_der = cert
        .tbs_certificate
        .subject_public_key_info
        .to_der()
        .map_err(|e| format!("certificate public key cannot be encoded: {e}"))?;

    RsaPublicKey::from_public_key_der(&spki_der)
        .map_err(|e| format!("certificate does not carry an RSA public key: {e}"))
}

/// Build an RSA key from base64url modulus and exponent.
fn rsa_key_from_components(n_b64: &str, e_b64: &str) -> Result<RsaPublicKey, String> {
    let n = decode_base64url(n_b64).map_err(|e| format!("modulus: {e}"))?;
    let e = decode_base64url(e_b64).map_err(|e| format!("exponent: {e}"))?;

    if e.len() > EXPONENT_WIDTH {
        return Err(format!("exponent longer than {EXPONENT_WIDTH} bytes"));
    }
    let mut padded = [0u8; EXPONENT_WIDTH];
    if let Some(tail) = padded.get_mut(EXPONENT_WIDTH - e.len()..) {
        tail.copy_from_slice(&e);
    }
    let exponent = u64::from_be_bytes(padded);

    RsaPublicKey::new(BigUint::from_bytes_be(&n), BigUint::from(exponent))
        .map_err(|e| format!("invalid RSA components: {e}"))
}

/// Providers differ on whether they pad base64url values.
fn decode_base64url(value: &str) -> Result<Vec<u8>, base64::DecodeError> {
    URL_SAFE_NO_PAD.decode(value.trim_end_matches('='))
}

/// Keys derived from one JWKS snapshot.
#[derive(Debug, Default)]
pub struct KeySet {
    keys: HashMap<String, Result<Arc<VerificationKey>, KeyLoadError>>,
}

impl KeySet {
    /// Derive every key in the document. Entries without a `kid` are skipped;
    /// when several entries share a `kid`, the first one wins.
    pub fn from_document(document: &JwksDocument) -> Self {
        let mut keys = HashMap::new();
        for jwk in &document.keys {
            let Some(kid) = jwk.kid.as_deref() else {
                continue;
            };
            if keys.contains_key(kid) {
                tracing::debug!(target: "gk.auth.jwks", kid = %kid, "Ignoring duplicate key ID in JWKS");
                continue;
            }
            let derived = VerificationKey::from_jwk(kid, jwk).map(Arc::new);
            if let Err(e) = &derived {
                tracing::warn!(target: "gk.auth.jwks", kid = %kid, error = %e, "Unusable key in JWKS");
            }
            keys.insert(kid.to_string(), derived);
        }
        Self { keys }
    }

    pub fn get(&self, kid: &str) -> Result<Arc<VerificationKey>, KeyLoadError> {
        match self.keys.get(kid) {
            Some(entry) => entry.clone(),
            None => Err(KeyLoadError::KeyNotFound(kid.to_string())),
        }
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Source of raw JWKS documents.
#[async_trait]
pub trait JwksFetcher: Send + Sync {
    /// Fetch the raw JWKS body. Only transport failures are reported here.
    async fn fetch(&self) -> Result<Vec<u8>, KeyLoadError>;
}

/// Fetches the JWKS document over HTTP.
pub struct HttpJwksFetcher {
    jwks_url: String,
    http_client: reqwest::Client,
}

impl HttpJwksFetcher {
    /// Create a fetcher. Without a timeout the HTTP client's defaults apply.
    pub fn new(jwks_url: String, timeout: Option<Duration>) -> Self {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let http_client = builder.build().unwrap_or_else(|e| {
            tracing::warn!(target: "gk.auth.jwks", error = %e, "Failed to build HTTP client with custom config, using defaults");
            reqwest::Client::new()
        });

        Self {
            jwks_url,
            http_client,
        }
    }

    pub fn jwks_url(&self) -> &str {
        &self.jwks_url
    }
}

#[async_trait]
impl JwksFetcher for HttpJwksFetcher {
    async fn fetch(&self) -> Result<Vec<u8>, KeyLoadError> {
        tracing::debug!(target: "gk.auth.jwks", url = %self.jwks_url, "Fetching JWKS");

        let response = self
            .http_client
            .get(&self.jwks_url)
            .send()
            .await
            .map_err(|e| KeyLoadError::Fetch(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(KeyLoadError::Fetch(format!(
                "JWKS endpoint returned {status}"
            )));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| KeyLoadError::Fetch(e.to_string()))?;
        Ok(body.to_vec())
    }
}

/// Outcome of a key lookup, stamped with the cache generation that answered it.
#[derive(Debug)]
pub struct KeyLookup {
    pub generation: u64,
    pub key: Result<Arc<VerificationKey>, KeyLoadError>,
}

/// Resolves key IDs to verification keys.
#[async_trait]
pub trait KeyResolver: Send + Sync {
    async fn lookup(&self, kid: &str) -> KeyLookup;

    /// Invalidate the snapshot of generation `seen` so the next lookup
    /// fetches again. Does nothing once `seen` has been superseded.
    async fn reload(&self, seen: u64);

    async fn get_public_key(&self, kid: &str) -> Result<Arc<VerificationKey>, KeyLoadError> {
        self.lookup(kid).await.key
    }
}

/// Snapshot stamped with the generation it was loaded for.
struct LoadedKeys {
    generation: u64,
    outcome: Result<Arc<KeySet>, KeyLoadError>,
}

struct KeyCache {
    generation: u64,
    loaded: Option<LoadedKeys>,
}

impl KeyCache {
    fn current(&self) -> Option<&Result<Arc<KeySet>, KeyLoadError>> {
        self.loaded
            .as_ref()
            .filter(|loaded| loaded.generation == self.generation)
            .map(|loaded| &loaded.outcome)
    }
}

/// Caching key loader over a [`JwksFetcher`].
pub struct JwksKeyLoader {
    fetcher: Arc<dyn JwksFetcher>,
    cache: RwLock<KeyCache>,
    /// Held for the duration of a fetch.
    fetch_gate: Mutex<()>,
}

impl JwksKeyLoader {
    pub fn new(fetcher: Arc<dyn JwksFetcher>) -> Self {
        Self {
            fetcher,
            cache: RwLock::new(KeyCache {
                generation: 0,
                loaded: None,
            }),
            fetch_gate: Mutex::new(()),
        }
    }

    /// Loader fetching from `jwks_url` over HTTP.
    pub fn from_url(jwks_url: String, timeout: Option<Duration>) -> Self {
        Self::new(Arc::new(HttpJwksFetcher::new(jwks_url, timeout)))
    }

    /// Generation the next loaded snapshot will carry.
    pub async fn generation(&self) -> u64 {
        self.cache.read().await.generation
    }

    /// Resolve `kid` from the current snapshot, if there is one.
    async fn lookup_cached(&self, kid: &str) -> Option<KeyLookup> {
        let cache = self.cache.read().await;
        let generation = cache.generation;
        cache.current().map(|outcome| KeyLookup {
            generation,
            key: resolve(outcome, kid),
        })
    }

    /// Fetch and derive a full snapshot.
    async fn load(&self) -> Result<Arc<KeySet>, KeyLoadError> {
        let start = Instant::now();
        let result = self.fetcher.fetch().await.and_then(|body| {
            let document: JwksDocument =
                serde_json::from_slice(&body).map_err(|e| KeyLoadError::Parse(e.to_string()))?;
            Ok(Arc::new(KeySet::from_document(&document)))
        });

        match &result {
            Ok(key_set) => {
                metrics::record_jwks_fetch("success", start.elapsed());
                tracing::info!(target: "gk.auth.jwks", key_count = key_set.len(), "JWKS loaded");
            }
            Err(e) => {
                metrics::record_jwks_fetch("error", start.elapsed());
                tracing::error!(target: "gk.auth.jwks", error = %e, "Failed to load JWKS");
            }
        }

        result
    }
}

fn resolve(
    outcome: &Result<Arc<KeySet>, KeyLoadError>,
    kid: &str,
) -> Result<Arc<VerificationKey>, KeyLoadError> {
    match outcome {
        Ok(key_set) => key_set.get(kid),
        Err(e) => Err(e.clone()),
    }
}

#[async_trait]
impl KeyResolver for JwksKeyLoader {
    #[instrument(skip(self), fields(kid = %kid), name = "gk.auth.jwks.lookup")]
    async fn lookup(&self, kid: &str) -> KeyLookup {
        if let Some(found) = self.lookup_cached(kid).await {
            return found;
        }

        let _gate = self.fetch_gate.lock().await;

        // Another caller may have loaded the snapshot while we waited.
        if let Some(found) = self.lookup_cached(kid).await {
            return found;
        }

        let generation = self.cache.read().await.generation;
        let outcome = self.load().await;
        let key = resolve(&outcome, kid);

        let mut cache = self.cache.write().await;
        cache.loaded = Some(LoadedKeys {
            generation,
            outcome,
        });

        KeyLookup { generation, key }
    }

    async fn reload(&self, seen: u64) {
        let mut cache = self.cache.write().await;
        if cache.generation != seen {
            tracing::debug!(target: "gk.auth.jwks", seen, generation = cache.generation, "JWKS already reloaded since lookup");
            return;
        }
        if cache.current().is_none() {
            tracing::debug!(target: "gk.auth.jwks", "JWKS reload already pending");
            return;
        }
        cache.generation = cache.generation.wrapping_add(1);
        metrics::record_jwks_reload();
        tracing::info!(target: "gk.auth.jwks", generation = cache.generation, "JWKS cache invalidated");
    }
}
