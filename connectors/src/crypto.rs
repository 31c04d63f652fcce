use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::{engine::general_purpose, Engine as _};
use once_cell::sync::OnceCell;

use crate::error::ConnectorError;

const NONCE_LEN: usize = 12;

static GLOBAL_CIPHER: OnceCell<CredentialCipher> = OnceCell::new();

/// Symmetric cipher for persisted connection configuration.
///
/// AES-256-GCM keyed by the process-wide `CRYPTO_KEY` secret (base64,
/// 32 bytes decoded). Tokens are `base64(nonce || ciphertext)`; GCM is
/// authenticated, so a tampered token fails decryption instead of yielding
/// garbage. Encrypt and decrypt take `&self` and are safe to call
/// concurrently.
pub struct CredentialCipher {
    cipher: Aes256Gcm,
}

impl CredentialCipher {
    /// Build a cipher from a base64-encoded 256-bit key.
    pub fn from_key(key_b64: &str) -> Result<Self, ConnectorError> {
        let key_bytes = general_purpose::STANDARD
            .decode(key_b64.trim())
            .map_err(|_| ConnectorError::Internal("CRYPTO_KEY is not valid base64".to_string()))?;

        if key_bytes.len() != 32 {
            return Err(ConnectorError::Internal(
                "CRYPTO_KEY must decode to exactly 32 bytes".to_string(),
            ));
        }

        let key = Key::<Aes256Gcm>::from_slice(&key_bytes);
        Ok(Self {
            cipher: Aes256Gcm::new(key),
        })
    }

    /// Process-wide cipher instance, keyed from the `CRYPTO_KEY` environment
    /// variable on first use.
    pub fn global() -> Result<&'static Self, ConnectorError> {
        GLOBAL_CIPHER.get_or_try_init(|| {
            let key = std::env::var("CRYPTO_KEY")
                .map_err(|_| ConnectorError::Internal("CRYPTO_KEY is not set".to_string()))?;
            Self::from_key(&key)
        })
    }

    /// Encrypt a configuration document into an opaque token.
    pub fn encrypt(&self, plain: &str) -> Result<String, ConnectorError> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plain.as_bytes())
            .map_err(|_| ConnectorError::Internal("encryption failed".to_string()))?;

        let mut payload = nonce.to_vec();
        payload.extend_from_slice(&ciphertext);
        Ok(general_purpose::STANDARD.encode(payload))
    }

    /// Decrypt a token back into the configuration document text.
    pub fn decrypt(&self, token: &str) -> Result<String, ConnectorError> {
        let payload = general_purpose::STANDARD
            .decode(token.trim())
            .map_err(|_| ConnectorError::Internal("credential token is not valid base64".to_string()))?;

        if payload.len() < NONCE_LEN {
            return Err(ConnectorError::Internal(
                "credential token is truncated".to_string(),
            ));
        }

        let (nonce_bytes, ciphertext) = payload.split_at(NONCE_LEN);
        let nonce = Nonce::from_slice(nonce_bytes);

        let plain = self
            .cipher
            .decrypt(nonce, ciphertext)
            .map_err(|_| ConnectorError::Internal("credential token failed authentication".to_string()))?;

        String::from_utf8(plain)
            .map_err(|_| ConnectorError::Internal("decrypted payload is not valid UTF-8".to_string()))
    }

    /// Decrypt a token and parse it as a JSON document.
    pub fn decrypt_json(&self, token: &str) -> Result<serde_json::Value, ConnectorError> {
        let plain = self.decrypt(token)?;
        serde_json::from_str(&plain)
            .map_err(|e| ConnectorError::Internal(format!("decrypted payload is not valid JSON: {e}")))
    }
}
