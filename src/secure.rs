//! Signed client-side cookies.
//!
//! A [`SecureJar`] stores key/value pairs in a single cookie named `secure`,
//! serialized as `base64(json) "." base64(sha256(secret || json))`. The
//! signature only authenticates the payload; values are readable by the
//! client, so nothing confidential belongs here.
//!
//! Tampered or malformed cookies decode to an empty jar rather than an error,
//! so a hostile client can at worst reset their own state.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Cookie under which the signed payload travels.
pub const SECURE_COOKIE: &str = "secure";

#[derive(Debug, Default)]
struct JarInner {
    data: HashMap<String, Value>,
    dirty: bool,
}

/// A signed, client-stored key/value jar.
///
/// Clones share the same underlying map. The dispatch engine decodes the jar
/// from the inbound `secure` cookie and re-signs it into the response only
/// when a handler wrote to it.
#[derive(Debug, Clone, Default)]
pub struct SecureJar {
    inner: Arc<Mutex<JarInner>>,
}

impl SecureJar {
    /// Creates an empty jar.
    pub fn new() -> Self {
        Self::default()
    }

    /// Decodes a jar from a raw cookie value. An absent, malformed, or
    /// wrongly-signed cookie yields an empty jar.
    pub fn from_cookie(raw: Option<&str>, secret: &str) -> Self {
        let data = raw.and_then(|raw| decode(raw, secret)).unwrap_or_default();
        Self {
            inner: Arc::new(Mutex::new(JarInner { data, dirty: false })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, JarInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns a stored value.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.lock().data.get(key).cloned()
    }

    /// Returns a stored string value.
    pub fn get_str(&self, key: &str) -> Option<String> {
        self.get(key).and_then(|v| v.as_str().map(str::to_owned))
    }

    /// Stores a value and marks the jar for re-signing into the response.
    pub fn set(&self, key: impl Into<String>, value: impl Into<Value>) {
        let mut inner = self.lock();
        inner.data.insert(key.into(), value.into());
        inner.dirty = true;
    }

    /// Removes a value.
    pub fn remove(&self, key: &str) -> Option<Value> {
        let mut inner = self.lock();
        let removed = inner.data.remove(key);
        if removed.is_some() {
            inner.dirty = true;
        }
        removed
    }

    /// `true` once a handler has written to this jar during the current
    /// dispatch.
    pub fn is_dirty(&self) -> bool {
        self.lock().dirty
    }

    /// Serializes and signs the jar into a cookie value.
    pub fn encode(&self, secret: &str) -> String {
        let inner = self.lock();
        let payload = Value::Object(
            inner
                .data
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        )
        .to_string();
        let signature = sign(secret, payload.as_bytes());
        format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(payload.as_bytes()),
            URL_SAFE_NO_PAD.encode(signature)
        )
    }
}

fn sign(secret: &str, payload: &[u8]) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    hasher.update(payload);
    hasher.finalize().to_vec()
}

fn decode(raw: &str, secret: &str) -> Option<HashMap<String, Value>> {
    let (payload_b64, signature_b64) = raw.rsplit_once('.')?;
    let payload = URL_SAFE_NO_PAD.decode(payload_b64).ok()?;
    let signature = URL_SAFE_NO_PAD.decode(signature_b64).ok()?;
    if sign(secret, &payload) != signature {
        return None;
    }
    match serde_json::from_slice(&payload).ok()? {
        Value::Object(map) => Some(map.into_iter().collect()),
        _ => None,
    }
}
