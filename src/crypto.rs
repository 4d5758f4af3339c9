//! Secrets-at-rest encryption for persisted pipeline config (§6).
//!
//! Encrypted columns use authenticated AEAD (AES-256-GCM) with a random
//! 96-bit nonce per row; ciphertext and nonce are stored together as one
//! opaque blob so the store layer never has to manage them separately.

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::Engine;

use crate::error::Error;

const NONCE_LEN: usize = 12;

/// A 32-byte AES-256-GCM key, decoded once at startup.
#[derive(Clone)]
pub struct EncryptionKey(Key<Aes256Gcm>);

impl EncryptionKey {
    /// Decode a base64 or hex-encoded 32-byte key from config. Any other
    /// length is a `Fatal` misconfiguration per §7.
    pub fn decode(raw: &str) -> Result<Self, Error> {
        let bytes = decode_key_bytes(raw)
            .ok_or_else(|| Error::Fatal("server.encryption_key is not valid base64 or hex".to_string()))?;
        if bytes.len() != 32 {
            return Err(Error::Fatal(format!(
                "server.encryption_key must decode to 32 bytes, got {}",
                bytes.len()
            )));
        }
        Ok(EncryptionKey(*Key::<Aes256Gcm>::from_slice(&bytes)))
    }

    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, Error> {
        let cipher = Aes256Gcm::new(&self.0);
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = cipher
            .encrypt(&nonce, plaintext)
            .map_err(|e| Error::Fatal(format!("encryption failed: {e}")))?;
        let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    pub fn decrypt(&self, stored: &[u8]) -> Result<Vec<u8>, Error> {
        if stored.len() < NONCE_LEN {
            return Err(Error::Fatal("encrypted blob shorter than nonce".into()));
        }
        let (nonce_bytes, ciphertext) = stored.split_at(NONCE_LEN);
        let cipher = Aes256Gcm::new(&self.0);
        let nonce = Nonce::from_slice(nonce_bytes);
        cipher
            .decrypt(nonce, ciphertext)
            .map_err(|e| Error::Fatal(format!("decryption failed: {e}")))
    }
}

fn decode_key_bytes(raw: &str) -> Option<Vec<u8>> {
    base64::engine::general_purpose::STANDARD
        .decode(raw)
        .ok()
        .or_else(|| hex_decode(raw))
}

fn hex_decode(raw: &str) -> Option<Vec<u8>> {
    if raw.len() % 2 != 0 {
        return None;
    }
    (0..raw.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&raw[i..i + 2], 16).ok())
        .collect()
}

/// Plaintext pass-through used when `server.allow_unencrypted = true`.
pub enum SecretCodec {
    Encrypted(EncryptionKey),
    Plaintext,
}

impl SecretCodec {
    pub fn from_config(config: &crate::config::ServerConfig) -> Result<Self, Error> {
        match (&config.encryption_key, config.allow_unencrypted) {
            (Some(key), _) => Ok(SecretCodec::Encrypted(EncryptionKey::decode(key)?)),
            (None, true) => Ok(SecretCodec::Plaintext),
            (None, false) => Err(Error::Fatal(
                "server.encryption_key is required unless server.allow_unencrypted = true".into(),
            )),
        }
    }

    pub fn seal(&self, plaintext: &str) -> Result<Vec<u8>, Error> {
        match self {
            SecretCodec::Encrypted(key) => key.encrypt(plaintext.as_bytes()),
            SecretCodec::Plaintext => Ok(plaintext.as_bytes().to_vec()),
        }
    }

    pub fn open(&self, stored: &[u8]) -> Result<String, Error> {
        let bytes = match self {
            SecretCodec::Encrypted(key) => key.decrypt(stored)?,
            SecretCodec::Plaintext => stored.to_vec(),
        };
        String::from_utf8(bytes).map_err(|e| Error::Fatal(format!("decrypted secret is not utf-8: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_plaintext_through_encryption() {
        let key = EncryptionKey::decode(&base64::engine::general_purpose::STANDARD.encode([7u8; 32])).unwrap();
        let sealed = key.encrypt(b"super-secret-token").unwrap();
        assert_ne!(sealed, b"super-secret-token");
        let opened = key.decrypt(&sealed).unwrap();
        assert_eq!(opened, b"super-secret-token");
    }

    #[test]
    fn rejects_short_key() {
        assert!(EncryptionKey::decode("dG9vc2hvcnQ=").is_err());
    }

    #[test]
    fn each_encryption_uses_a_fresh_nonce() {
        let key = EncryptionKey::decode(&base64::engine::general_purpose::STANDARD.encode([1u8; 32])).unwrap();
        let a = key.encrypt(b"same-plaintext").unwrap();
        let b = key.encrypt(b"same-plaintext").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn plaintext_codec_round_trips_without_encryption() {
        let codec = SecretCodec::Plaintext;
        let sealed = codec.seal("hello").unwrap();
        assert_eq!(sealed, b"hello");
        assert_eq!(codec.open(&sealed).unwrap(), "hello");
    }
}
