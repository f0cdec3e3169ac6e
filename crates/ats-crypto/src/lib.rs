//! Credential sealing for exchange API keys.
//!
//! Ciphertext format: base64url(nonce ‖ AES-256-GCM ciphertext). The key is
//! `CRYPTO_MASTER_KEY`, a URL-safe base64 encoding of 32 bytes. An empty or
//! invalid master key falls back to an ephemeral process-local key so dev
//! setups keep working; anything sealed under it dies with the process.
//!
//! Error messages never contain key material, only the mismatch hint.

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::engine::general_purpose::URL_SAFE;
use base64::Engine;
use tracing::{error, warn};

const NONCE_LEN: usize = 12;

/// Decryption failure. The usual cause is a rotated or mismatched master key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CryptoError(pub String);

impl std::fmt::Display for CryptoError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for CryptoError {}

/// Seals and opens credential strings under one symmetric key.
#[derive(Clone)]
pub struct CredentialCipher {
    cipher: Aes256Gcm,
}

impl std::fmt::Debug for CredentialCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print key material.
        f.debug_struct("CredentialCipher").finish_non_exhaustive()
    }
}

impl CredentialCipher {
    /// Build from the configured master key.
    ///
    /// Empty → ephemeral dev-only key (WARN). Undecodable / wrong length →
    /// ephemeral dev-only key (ERROR), matching the permissive dev posture of
    /// the rest of the stack: the store must boot even when misconfigured,
    /// it just cannot open previously sealed rows.
    pub fn from_master_key(master_key: &str) -> Self {
        let trimmed = master_key.trim();
        if trimmed.is_empty() {
            warn!("CRYPTO_MASTER_KEY is empty. Generated ephemeral key (dev-only).");
            return Self::ephemeral();
        }
        match URL_SAFE.decode(trimmed) {
            Ok(bytes) if bytes.len() == 32 => {
                let key = Key::<Aes256Gcm>::from_slice(&bytes);
                Self { cipher: Aes256Gcm::new(key) }
            }
            _ => {
                error!("Invalid CRYPTO_MASTER_KEY. Generated ephemeral key (dev-only).");
                Self::ephemeral()
            }
        }
    }

    fn ephemeral() -> Self {
        let key = Aes256Gcm::generate_key(OsRng);
        Self { cipher: Aes256Gcm::new(&key) }
    }

    /// Generate a fresh master key suitable for `CRYPTO_MASTER_KEY`.
    pub fn generate_master_key() -> String {
        let key = Aes256Gcm::generate_key(OsRng);
        URL_SAFE.encode(key)
    }

    pub fn encrypt(&self, plaintext: &str) -> String {
        let nonce = Aes256Gcm::generate_nonce(OsRng);
        // Encrypting with a valid key and fresh nonce cannot fail.
        let ct = self
            .cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .unwrap_or_default();
        let mut buf = Vec::with_capacity(NONCE_LEN + ct.len());
        buf.extend_from_slice(&nonce);
        buf.extend_from_slice(&ct);
        URL_SAFE.encode(buf)
    }

    pub fn decrypt(&self, token: &str) -> Result<String, CryptoError> {
        let mismatch = || CryptoError("Cannot decrypt secret. CRYPTO_MASTER_KEY mismatch?".to_string());

        let raw = URL_SAFE.decode(token.trim()).map_err(|_| mismatch())?;
        if raw.len() <= NONCE_LEN {
            return Err(mismatch());
        }
        let (nonce, ct) = raw.split_at(NONCE_LEN);
        let pt = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), ct)
            .map_err(|_| mismatch())?;
        String::from_utf8(pt).map_err(|_| mismatch())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cipher() -> CredentialCipher {
        CredentialCipher::from_master_key(&CredentialCipher::generate_master_key())
    }

    #[test]
    fn encrypt_decrypt_round_trip() {
        let c = cipher();
        let token = c.encrypt("upbit-access-key");
        assert_ne!(token, "upbit-access-key");
        assert_eq!(c.decrypt(&token).unwrap(), "upbit-access-key");
    }

    #[test]
    fn same_plaintext_encrypts_to_different_tokens() {
        let c = cipher();
        assert_ne!(c.encrypt("k"), c.encrypt("k"));
    }

    #[test]
    fn wrong_key_reports_mismatch() {
        let a = cipher();
        let b = cipher();
        let token = a.encrypt("secret");
        let err = b.decrypt(&token).unwrap_err();
        assert!(err.to_string().contains("CRYPTO_MASTER_KEY mismatch"));
    }

    #[test]
    fn garbage_token_reports_mismatch() {
        let c = cipher();
        assert!(c.decrypt("not-base64!!").is_err());
        assert!(c.decrypt("").is_err());
    }

    #[test]
    fn empty_master_key_still_round_trips_in_process() {
        let c = CredentialCipher::from_master_key("");
        let token = c.encrypt("dev-key");
        assert_eq!(c.decrypt(&token).unwrap(), "dev-key");
    }

    #[test]
    fn debug_output_redacts() {
        let c = cipher();
        let dbg = format!("{c:?}");
        assert!(!dbg.contains("key"));
    }
}
