//! Credential vault for provider secrets at rest.
//!
//! Uses AES-256-GCM with a key derived once from the configured secret
//! (PBKDF2-HMAC-SHA256, fixed salt). Ciphertexts are self-describing strings:
//!
//! ```text
//! hex(iv) ":" hex(auth_tag) ":" hex(ciphertext)
//! ```
//!
//! Decryption failures are deliberately opaque: callers only ever see
//! `VaultError::Decrypt`, never which segment was wrong.

use std::sync::OnceLock;

use aes_gcm::{
    aead::{AeadInPlace, KeyInit},
    Aes256Gcm, Nonce, Tag,
};
use hmac::Hmac;
use rand::RngCore;
use sha2::Sha256;
use thiserror::Error;

/// Key length in bytes (256 bits for AES-256)
const KEY_LENGTH: usize = 32;

/// IV length in bytes (96 bits for AES-GCM)
const IV_LENGTH: usize = 12;

/// Authentication tag length in bytes
const TAG_LENGTH: usize = 16;

/// Segment delimiter in the serialized ciphertext
const DELIMITER: char = ':';

/// Salt for key derivation. Fixed so the same secret always yields the same key.
const KEY_SALT: &[u8] = b"goal-agents.credential-vault.v1";

/// Default PBKDF2 iteration count.
pub const DEFAULT_KDF_ITERATIONS: u32 = 100_000;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum VaultError {
    #[error("Failed to encrypt credential")]
    Encrypt,

    #[error("Failed to decrypt credential")]
    Decrypt,
}

/// Symmetric encrypt/decrypt service for provider credentials.
pub struct CredentialVault {
    secret: String,
    iterations: u32,
    key: OnceLock<[u8; KEY_LENGTH]>,
}

impl std::fmt::Debug for CredentialVault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialVault")
            .field("iterations", &self.iterations)
            .field("key_derived", &self.key.get().is_some())
            .finish()
    }
}

impl CredentialVault {
    pub fn new(secret: impl Into<String>) -> Self {
        Self::with_iterations(secret, DEFAULT_KDF_ITERATIONS)
    }

    /// Create a vault with a custom KDF cost (tests use a low count).
    pub fn with_iterations(secret: impl Into<String>, iterations: u32) -> Self {
        Self {
            secret: secret.into(),
            iterations: iterations.max(1),
            key: OnceLock::new(),
        }
    }

    /// Derived key, computed on first use and cached.
    fn key(&self) -> &[u8; KEY_LENGTH] {
        self.key.get_or_init(|| {
            let mut key = [0u8; KEY_LENGTH];
            // Only fails for an invalid output length, which KEY_LENGTH is not.
            if pbkdf2::pbkdf2::<Hmac<Sha256>>(
                self.secret.as_bytes(),
                KEY_SALT,
                self.iterations,
                &mut key,
            )
            .is_err()
            {
                tracing::error!("PBKDF2 rejected the vault key length");
            }
            tracing::debug!("Derived credential vault key");
            key
        })
    }

    fn cipher(&self) -> Result<Aes256Gcm, VaultError> {
        Aes256Gcm::new_from_slice(self.key()).map_err(|_| VaultError::Encrypt)
    }

    /// Encrypt a UTF-8 secret.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, VaultError> {
        self.encrypt_bytes(plaintext.as_bytes())
    }

    /// Decrypt a value produced by [`CredentialVault::encrypt`].
    pub fn decrypt(&self, ciphertext: &str) -> Result<String, VaultError> {
        let bytes = self.decrypt_bytes(ciphertext)?;
        String::from_utf8(bytes).map_err(|_| VaultError::Decrypt)
    }

    pub fn encrypt_bytes(&self, plaintext: &[u8]) -> Result<String, VaultError> {
        let mut iv = [0u8; IV_LENGTH];
        rand::thread_rng().fill_bytes(&mut iv);

        let mut buffer = plaintext.to_vec();
        let tag = self
            .cipher()?
            .encrypt_in_place_detached(Nonce::from_slice(&iv), b"", &mut buffer)
            .map_err(|_| VaultError::Encrypt)?;

        Ok(format!(
            "{}{DELIMITER}{}{DELIMITER}{}",
            hex::encode(iv),
            hex::encode(tag),
            hex::encode(&buffer)
        ))
    }

    pub fn decrypt_bytes(&self, ciphertext: &str) -> Result<Vec<u8>, VaultError> {
        let mut parts = ciphertext.trim().split(DELIMITER);
        let (Some(iv_hex), Some(tag_hex), Some(data_hex), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(VaultError::Decrypt);
        };

        let iv = hex::decode(iv_hex).map_err(|_| VaultError::Decrypt)?;
        let tag = hex::decode(tag_hex).map_err(|_| VaultError::Decrypt)?;
        let mut buffer = hex::decode(data_hex).map_err(|_| VaultError::Decrypt)?;

        if iv.len() != IV_LENGTH || tag.len() != TAG_LENGTH {
            return Err(VaultError::Decrypt);
        }

        self.cipher()
            .map_err(|_| VaultError::Decrypt)?
            .decrypt_in_place_detached(
                Nonce::from_slice(&iv),
                b"",
                &mut buffer,
                Tag::from_slice(&tag),
            )
            .map_err(|_| VaultError::Decrypt)?;

        Ok(buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_vault() -> CredentialVault {
        CredentialVault::with_iterations("unit-test-secret", 1_000)
    }

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let vault = test_vault();
        let encrypted = vault.encrypt("sk-live-12345").unwrap();

        assert_eq!(encrypted.split(':').count(), 3);
        assert_eq!(vault.decrypt(&encrypted).unwrap(), "sk-live-12345");
    }

    #[test]
    fn test_empty_string() {
        let vault = test_vault();
        let encrypted = vault.encrypt("").unwrap();
        assert_eq!(vault.decrypt(&encrypted).unwrap(), "");
    }

    #[test]
    fn test_unicode_content() {
        let vault = test_vault();
        let plaintext = "clé secrète 🔑 世界";
        let encrypted = vault.encrypt(plaintext).unwrap();
        assert_eq!(vault.decrypt(&encrypted).unwrap(), plaintext);
    }

    #[test]
    fn test_multi_kilobyte_binary() {
        let vault = test_vault();
        let data: Vec<u8> = (0..8192u32).map(|i| (i * 31 % 256) as u8).collect();
        let encrypted = vault.encrypt_bytes(&data).unwrap();
        assert_eq!(vault.decrypt_bytes(&encrypted).unwrap(), data);
    }

    #[test]
    fn test_different_encryptions_differ() {
        let vault = test_vault();
        let a = vault.encrypt("same").unwrap();
        let b = vault.encrypt("same").unwrap();
        assert_ne!(a, b);
        assert_eq!(vault.decrypt(&a).unwrap(), vault.decrypt(&b).unwrap());
    }

    #[test]
    fn test_tampered_tag_fails() {
        let vault = test_vault();
        let encrypted = vault.encrypt("secret").unwrap();
        let parts: Vec<&str> = encrypted.split(':').collect();

        let mut tag = hex::decode(parts[1]).unwrap();
        tag[0] ^= 0x01;
        let tampered = format!("{}:{}:{}", parts[0], hex::encode(tag), parts[2]);

        assert_eq!(vault.decrypt(&tampered), Err(VaultError::Decrypt));
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let vault = test_vault();
        let encrypted = vault.encrypt("secret").unwrap();
        let parts: Vec<&str> = encrypted.split(':').collect();

        let mut data = hex::decode(parts[2]).unwrap();
        data[0] ^= 0x80;
        let tampered = format!("{}:{}:{}", parts[0], parts[1], hex::encode(data));

        assert!(vault.decrypt(&tampered).is_err());
    }

    #[test]
    fn test_malformed_input_fails() {
        let vault = test_vault();
        assert_eq!(vault.decrypt("not-a-ciphertext"), Err(VaultError::Decrypt));
        assert_eq!(vault.decrypt("aa:bb"), Err(VaultError::Decrypt));
        assert_eq!(vault.decrypt("zz:zz:zz"), Err(VaultError::Decrypt));
        assert_eq!(vault.decrypt("00:00:00:00"), Err(VaultError::Decrypt));
        assert_eq!(vault.decrypt("0011:0011:0011"), Err(VaultError::Decrypt));
    }

    #[test]
    fn test_wrong_secret_fails() {
        let encrypted = test_vault().encrypt("secret").unwrap();
        let other = CredentialVault::with_iterations("another-secret", 1_000);
        assert!(other.decrypt(&encrypted).is_err());
    }

    #[test]
    fn test_same_secret_decrypts_across_instances() {
        let encrypted = test_vault().encrypt("shared").unwrap();
        assert_eq!(test_vault().decrypt(&encrypted).unwrap(), "shared");
    }
}
