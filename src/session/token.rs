//! Sealed session cookie material.
//!
//! Token layout: `base64( nonce[12] || AES-256-GCM(cookie JSON) )`.

use std::fmt;

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use cookie::Cookie;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use thiserror::Error;

const NONCE_LEN: usize = 12;

/// Length of a [`SessionKey`] in bytes.
pub const SESSION_KEY_LEN: usize = 32;

/// Failure sealing or opening a token.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("session key must be 32 bytes, got {0}")]
    KeyLength(usize),
    #[error("failed to serialize cookie: {0}")]
    Serialize(String),
    #[error("token is not valid base64")]
    Encoding,
    #[error("token is too short")]
    Truncated,
    #[error("token could not be decrypted")]
    Decrypt,
}

/// Encryption key supplied by the host's secure storage.
#[derive(Clone)]
pub struct SessionKey([u8; SESSION_KEY_LEN]);

impl SessionKey {
    pub fn new(bytes: [u8; SESSION_KEY_LEN]) -> Self {
        Self(bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, TokenError> {
        let bytes: [u8; SESSION_KEY_LEN] = bytes
            .try_into()
            .map_err(|_| TokenError::KeyLength(bytes.len()))?;
        Ok(Self(bytes))
    }

    /// Decode a base64 key, as carried in configuration files.
    pub fn from_base64(encoded: &str) -> Result<Self, TokenError> {
        let bytes = STANDARD
            .decode(encoded.trim())
            .map_err(|_| TokenError::Encoding)?;
        Self::from_slice(&bytes)
    }

    fn cipher(&self) -> Aes256Gcm {
        Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.0))
    }
}

impl fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionKey(<redacted>)")
    }
}

/// Attributes of the session cookie, as sealed into a token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CookieProperties {
    pub name: String,
    pub value: String,
    pub domain: Option<String>,
    pub path: Option<String>,
    pub expires: Option<String>,
    pub max_age_secs: Option<i64>,
    pub http_only: bool,
    pub secure: bool,
}

impl CookieProperties {
    pub fn from_cookie(cookie: &Cookie<'_>) -> Self {
        Self {
            name: cookie.name().to_string(),
            value: cookie.value().to_string(),
            domain: cookie.domain().map(str::to_string),
            path: cookie.path().map(str::to_string),
            expires: cookie
                .expires_datetime()
                .map(|at| at.unix_timestamp().to_string()),
            max_age_secs: cookie.max_age().map(|age| age.whole_seconds()),
            http_only: cookie.http_only().unwrap_or(false),
            secure: cookie.secure().unwrap_or(false),
        }
    }
}

/// Opaque, encrypted session credential.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionToken(Vec<u8>);

impl SessionToken {
    /// Encrypt `properties` under `key` with a fresh random nonce.
    pub fn seal(properties: &CookieProperties, key: &SessionKey) -> Result<Self, TokenError> {
        let plaintext =
            serde_json::to_vec(properties).map_err(|e| TokenError::Serialize(e.to_string()))?;

        let mut nonce = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce);

        let ciphertext = key
            .cipher()
            .encrypt(Nonce::from_slice(&nonce), plaintext.as_ref())
            .map_err(|_| TokenError::Serialize("encryption failed".to_string()))?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(&nonce);
        sealed.extend_from_slice(&ciphertext);

        Ok(Self(STANDARD.encode(sealed).into_bytes()))
    }

    /// Decrypt the token back into cookie attributes.
    pub fn open(&self, key: &SessionKey) -> Result<CookieProperties, TokenError> {
        let sealed = STANDARD.decode(&self.0).map_err(|_| TokenError::Encoding)?;
        if sealed.len() <= NONCE_LEN {
            return Err(TokenError::Truncated);
        }
        let (nonce, ciphertext) = sealed.split_at(NONCE_LEN);
        let plaintext = key
            .cipher()
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| TokenError::Decrypt)?;
        serde_json::from_slice(&plaintext).map_err(|_| TokenError::Decrypt)
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionToken(<{} bytes>)", self.0.len())
    }
}
