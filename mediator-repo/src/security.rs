//! Security utilities: API key hashing, webhook signatures and credential
//! encryption at rest.

use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, Nonce};
use hmac::{Hmac, Mac};
use rand::Rng;
use rand::distr::Alphanumeric;
use serde::Serialize;
use serde::de::DeserializeOwned;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use mediator_types::SealedSecret;

type HmacSha256 = Hmac<Sha256>;

const NONCE_LEN: usize = 12;

/// Length of the random part of generated secrets.
pub const SECRET_LEN: usize = 32;

/// Prefix of client API keys.
pub const API_KEY_PREFIX: &str = "mk_";

/// Hashes an API key using SHA-256.
pub fn hash_api_key(key: &str) -> String {
    let hash = Sha256::digest(key.as_bytes());
    hex::encode(hash)
}

/// Verifies an API key against a stored hash using constant-time comparison.
pub fn verify_api_key(input: &str, stored_hash: &str) -> bool {
    let input_hash = hash_api_key(input);
    input_hash.as_bytes().ct_eq(stored_hash.as_bytes()).into()
}

/// Returns `prefix` followed by 32 random alphanumeric characters.
pub fn generate_secret(prefix: &str) -> String {
    let random: String = rand::rng()
        .sample_iter(&Alphanumeric)
        .take(SECRET_LEN)
        .map(char::from)
        .collect();
    format!("{prefix}{random}")
}

/// Signs a payload using HMAC-SHA256, hex encoded.
pub fn sign_payload(payload: &[u8], secret: &str) -> String {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(secret.as_bytes())
        .expect("HMAC can take key of any size");
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

/// Verifies a hex HMAC-SHA256 signature of the raw payload.
///
/// Accepts an optional `sha256=` prefix and either hex case. The digest
/// comparison is constant-time.
pub fn verify_signature(payload: &[u8], signature: &str, secret: &str) -> bool {
    let provided = signature.trim();
    let provided = provided.strip_prefix("sha256=").unwrap_or(provided);
    let Ok(provided) = hex::decode(provided) else {
        return false;
    };

    let mut mac = <HmacSha256 as Mac>::new_from_slice(secret.as_bytes())
        .expect("HMAC can take key of any size");
    mac.update(payload);
    let expected = mac.finalize().into_bytes();
    expected.as_slice().ct_eq(&provided).into()
}

#[derive(Debug, thiserror::Error)]
pub enum CipherError {
    #[error("Credentials key must be 64 hex characters")]
    InvalidKey,

    #[error("Encryption failed")]
    Encrypt,

    #[error("Decryption failed")]
    Decrypt,

    #[error("Sealed value is malformed")]
    Malformed,

    #[error("Serialization failed: {0}")]
    Serde(#[from] serde_json::Error),
}

/// AES-256-GCM cipher for provider credentials and payment method details.
///
/// Sealed values are `hex(nonce || ciphertext)` with a fresh 12 byte nonce per
/// seal.
#[derive(Clone)]
pub struct CredentialCipher {
    key: [u8; 32],
}

impl std::fmt::Debug for CredentialCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("CredentialCipher(..)")
    }
}

impl CredentialCipher {
    pub fn new(key: [u8; 32]) -> Self {
        Self { key }
    }

    /// Parses a 64 character hex key.
    pub fn from_hex(key: &str) -> Result<Self, CipherError> {
        let bytes = hex::decode(key.trim()).map_err(|_| CipherError::InvalidKey)?;
        let key: [u8; 32] = bytes.try_into().map_err(|_| CipherError::InvalidKey)?;
        Ok(Self::new(key))
    }

    /// A cipher with a random key. Sealed values do not survive a restart.
    pub fn ephemeral() -> Self {
        let mut key = [0u8; 32];
        rand::rng().fill(&mut key);
        Self::new(key)
    }

    fn aead(&self) -> Result<Aes256Gcm, CipherError> {
        use aes_gcm::KeyInit;
        Aes256Gcm::new_from_slice(&self.key).map_err(|_| CipherError::InvalidKey)
    }

    pub fn seal(&self, plaintext: &[u8]) -> Result<SealedSecret, CipherError> {
        let mut nonce = [0u8; NONCE_LEN];
        rand::rng().fill(&mut nonce);

        let ciphertext = self
            .aead()?
            .encrypt(Nonce::from_slice(&nonce), plaintext)
            .map_err(|_| CipherError::Encrypt)?;

        let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&ciphertext);
        Ok(SealedSecret(hex::encode(out)))
    }

    pub fn open(&self, sealed: &SealedSecret) -> Result<Vec<u8>, CipherError> {
        let raw = hex::decode(&sealed.0).map_err(|_| CipherError::Malformed)?;
        if raw.len() <= NONCE_LEN {
            return Err(CipherError::Malformed);
        }
        let (nonce, ciphertext) = raw.split_at(NONCE_LEN);
        self.aead()?
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| CipherError::Decrypt)
    }

    pub fn seal_json<T: Serialize>(&self, value: &T) -> Result<SealedSecret, CipherError> {
        let bytes = serde_json::to_vec(value)?;
        self.seal(&bytes)
    }

    pub fn open_json<T: DeserializeOwned>(&self, sealed: &SealedSecret) -> Result<T, CipherError> {
        let bytes = self.open(sealed)?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mediator_types::ProviderCredentials;

    #[test]
    fn test_api_key_hashing() {
        let key = "mk_test_abc123";
        let hash = hash_api_key(key);

        assert_eq!(hash.len(), 64);
        assert_eq!(hash, hash_api_key(key));
    }

    #[test]
    fn test_api_key_verification() {
        let key = generate_secret(API_KEY_PREFIX);
        let hash = hash_api_key(&key);

        assert!(verify_api_key(&key, &hash));
        assert!(!verify_api_key("wrong_key", &hash));
    }

    #[test]
    fn test_generated_secret_shape() {
        let key = generate_secret(API_KEY_PREFIX);
        assert!(key.starts_with("mk_"));
        assert_eq!(key.len(), 3 + SECRET_LEN);
        assert!(key[3..].chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(key, generate_secret(API_KEY_PREFIX));
    }

    #[test]
    fn test_signature_verification() {
        let payload = br#"{"event_type":"payment.success"}"#;
        let secret = "whsec_123";

        let signature = sign_payload(payload, secret);
        assert!(verify_signature(payload, &signature, secret));
        assert!(verify_signature(
            payload,
            &format!("sha256={signature}"),
            secret
        ));
        assert!(verify_signature(
            payload,
            &signature.to_uppercase(),
            secret
        ));
        assert!(!verify_signature(payload, &signature, "wrong_secret"));
        assert!(!verify_signature(b"tampered", &signature, secret));
        assert!(!verify_signature(payload, "not-hex", secret));
        assert!(!verify_signature(payload, "", secret));
    }

    #[test]
    fn test_signature_rejects_every_single_bit_flip() {
        let payload = br#"{"event_type":"payment.success","data":{"reference":"ORD-1"}}"#;
        let secret = "whsec_bits";
        let signature = sign_payload(payload, secret);
        let digest = hex::decode(&signature).unwrap();

        for byte in 0..payload.len() {
            for bit in 0..8 {
                let mut mutated = payload.to_vec();
                mutated[byte] ^= 1 << bit;
                assert!(
                    !verify_signature(&mutated, &signature, secret),
                    "payload byte {byte} bit {bit}"
                );
            }
        }

        for byte in 0..digest.len() {
            for bit in 0..8 {
                let mut mutated = digest.clone();
                mutated[byte] ^= 1 << bit;
                assert!(
                    !verify_signature(payload, &hex::encode(&mutated), secret),
                    "signature byte {byte} bit {bit}"
                );
            }
        }

        let truncated = &signature[..signature.len() - 2];
        assert!(!verify_signature(payload, truncated, secret));
    }

    #[test]
    fn test_cipher_round_trip_and_tamper() {
        let cipher = CredentialCipher::ephemeral();
        let creds = ProviderCredentials {
            api_key: Some("secret-key".into()),
            ..Default::default()
        };

        let sealed = cipher.seal_json(&creds).unwrap();
        assert!(!sealed.0.contains("secret-key"));
        let opened: ProviderCredentials = cipher.open_json(&sealed).unwrap();
        assert_eq!(opened.api_key.as_deref(), Some("secret-key"));

        let mut tampered = sealed.0.clone();
        let last = if tampered.ends_with('0') { "1" } else { "0" };
        tampered.replace_range(tampered.len() - 1.., last);
        assert!(cipher.open(&SealedSecret(tampered)).is_err());

        let other = CredentialCipher::ephemeral();
        assert!(other.open(&sealed).is_err());
    }

    #[test]
    fn test_cipher_key_parsing() {
        assert!(CredentialCipher::from_hex(&"ab".repeat(32)).is_ok());
        assert!(CredentialCipher::from_hex("abcd").is_err());
        assert!(CredentialCipher::from_hex(&"zz".repeat(32)).is_err());
    }
}
