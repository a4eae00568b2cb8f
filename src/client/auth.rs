//! Request signing for the exchange REST API
//!
//! Every private call carries an HMAC-SHA256 signature of
//! `timestamp + METHOD + path + body`, base64 encoded, and a passphrase that
//! is itself signed with the same secret (key version 2 and later).

use crate::error::{EngineError, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Signer bound to one API secret
#[derive(Clone)]
pub struct RequestSigner {
    secret: Vec<u8>,
}

impl RequestSigner {
    /// Create a signer from the raw API secret
    pub fn new(secret: &str) -> Result<Self> {
        if secret.is_empty() {
            return Err(EngineError::Auth("Invalid API secret: empty".into()));
        }
        Ok(Self {
            secret: secret.as_bytes().to_vec(),
        })
    }

    /// Sign a request prehash: `timestamp + method + path + body`
    pub fn sign(&self, timestamp_ms: i64, method: &str, path: &str, body: &str) -> Result<String> {
        let prehash = format!("{}{}{}{}", timestamp_ms, method.to_uppercase(), path, body);
        self.digest(prehash.as_bytes())
    }

    /// Sign the passphrase; the exchange rejects the raw value
    pub fn sign_passphrase(&self, passphrase: &str) -> Result<String> {
        self.digest(passphrase.as_bytes())
    }

    fn digest(&self, message: &[u8]) -> Result<String> {
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .map_err(|e| EngineError::Auth(format!("Invalid API secret: {}", e)))?;
        mac.update(message);
        Ok(STANDARD.encode(mac.finalize().into_bytes()))
    }
}

/// Header values for one signed call
#[derive(Debug, Clone)]
pub struct AuthHeaders {
    pub api_key: String,
    pub signature: String,
    pub timestamp: String,
    pub passphrase: String,
    pub key_version: String,
}

impl AuthHeaders {
    /// Build headers for a body-less request
    pub fn build(
        api_key: &str,
        api_secret: &str,
        api_passphrase: &str,
        key_version: &str,
        timestamp_ms: i64,
        method: &str,
        path: &str,
    ) -> Result<Self> {
        let signer = RequestSigner::new(api_secret)?;

        Ok(Self {
            api_key: api_key.to_string(),
            signature: signer.sign(timestamp_ms, method, path, "")?,
            timestamp: timestamp_ms.to_string(),
            passphrase: signer.sign_passphrase(api_passphrase)?,
            key_version: key_version.to_string(),
        })
    }

    /// `(header name, value)` pairs under the given header prefix
    pub fn pairs(&self, prefix: &str) -> [(String, &str); 5] {
        [
            (format!("{}-KEY", prefix), self.api_key.as_str()),
            (format!("{}-SIGN", prefix), self.signature.as_str()),
            (format!("{}-TIMESTAMP", prefix), self.timestamp.as_str()),
            (format!("{}-PASSPHRASE", prefix), self.passphrase.as_str()),
            (format!("{}-KEY-VERSION", prefix), self.key_version.as_str()),
        ]
    }
}
