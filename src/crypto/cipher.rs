use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use rand::rngs::OsRng;
use rand::RngCore;

use super::error::{CryptoError, CryptoResult};
use super::keys::MasterKey;

/// AES-GCM nonce length (96 bits)
pub const IV_LENGTH: usize = 12;

/// Ciphertext (with its 16-byte tag) and the IV it was sealed under
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedChunk {
    pub ciphertext: Vec<u8>,
    pub iv: [u8; IV_LENGTH],
}

impl EncryptedChunk {
    /// IV-prefixed storage form
    pub fn to_combined(&self) -> Vec<u8> {
        combine_iv_and_data(&self.iv, &self.ciphertext)
    }

    pub fn from_combined(buffer: &[u8]) -> CryptoResult<Self> {
        let (iv, ciphertext) = separate_iv_and_data(buffer)?;
        let mut fixed = [0u8; IV_LENGTH];
        fixed.copy_from_slice(iv);
        Ok(Self {
            ciphertext: ciphertext.to_vec(),
            iv: fixed,
        })
    }
}

/// Pack `iv || data` into one buffer
pub fn combine_iv_and_data(iv: &[u8; IV_LENGTH], data: &[u8]) -> Vec<u8> {
    let mut combined = Vec::with_capacity(IV_LENGTH + data.len());
    combined.extend_from_slice(iv);
    combined.extend_from_slice(data);
    combined
}

/// Split a buffer produced by [`combine_iv_and_data`]
pub fn separate_iv_and_data(buffer: &[u8]) -> CryptoResult<(&[u8], &[u8])> {
    if buffer.len() < IV_LENGTH {
        return Err(CryptoError::BufferTooShort {
            expected: IV_LENGTH,
            actual: buffer.len(),
        });
    }
    Ok(buffer.split_at(IV_LENGTH))
}

fn generate_iv() -> [u8; IV_LENGTH] {
    let mut iv = [0u8; IV_LENGTH];
    OsRng.fill_bytes(&mut iv);
    iv
}

/// AES-256-GCM bound to one master key
pub struct ChunkCipher {
    cipher: Aes256Gcm,
}

impl ChunkCipher {
    pub fn new(key: &MasterKey) -> Self {
        let key = Key::<Aes256Gcm>::from_slice(key.as_bytes());
        Self {
            cipher: Aes256Gcm::new(key),
        }
    }

    /// Encrypt under a freshly drawn IV. IVs are never reused.
    pub fn encrypt_chunk(&self, plaintext: &[u8]) -> CryptoResult<EncryptedChunk> {
        let iv = generate_iv();
        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&iv), plaintext)
            .map_err(|e| CryptoError::Encryption(e.to_string()))?;

        Ok(EncryptedChunk { ciphertext, iv })
    }

    /// Decrypt and authenticate. Any alteration of `ciphertext` or `iv`
    /// yields [`CryptoError::Authentication`].
    pub fn decrypt_chunk(&self, ciphertext: &[u8], iv: &[u8]) -> CryptoResult<Vec<u8>> {
        if iv.len() != IV_LENGTH {
            return Err(CryptoError::InvalidIv {
                expected: IV_LENGTH,
                actual: iv.len(),
            });
        }

        self.cipher
            .decrypt(Nonce::from_slice(iv), ciphertext)
            .map_err(|_| CryptoError::Authentication)
    }

    /// Encrypt and return the IV-prefixed storage form
    pub fn seal(&self, plaintext: &[u8]) -> CryptoResult<Vec<u8>> {
        Ok(self.encrypt_chunk(plaintext)?.to_combined())
    }

    /// Inverse of [`ChunkCipher::seal`]
    pub fn open(&self, combined: &[u8]) -> CryptoResult<Vec<u8>> {
        let (iv, ciphertext) = separate_iv_and_data(combined)?;
        self.decrypt_chunk(ciphertext, iv)
    }
}
