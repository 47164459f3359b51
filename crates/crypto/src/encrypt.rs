use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Nonce,
};
use rand::RngCore;
use zeroize::Zeroize;

use crate::{CryptoError, KEY_SIZE, NONCE_SIZE, TAG_SIZE};

/// A per-upload 256-bit data key. Zeroized on drop, never serialized.
pub struct DataKey {
    bytes: [u8; KEY_SIZE],
}

impl DataKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl Drop for DataKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for DataKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Generate a random 256-bit data key, filled in place so no copy outlives it.
pub fn generate_key() -> DataKey {
    let mut key = DataKey {
        bytes: [0u8; KEY_SIZE],
    };
    rand::thread_rng().fill_bytes(&mut key.bytes);
    key
}

/// Generate a fresh random 96-bit nonce.
pub fn generate_nonce() -> [u8; NONCE_SIZE] {
    let mut nonce = [0u8; NONCE_SIZE];
    rand::thread_rng().fill_bytes(&mut nonce);
    nonce
}

pub(crate) fn check_sizes(key: &[u8], nonce: &[u8]) -> Result<(), CryptoError> {
    if key.len() != KEY_SIZE {
        return Err(CryptoError::InvalidKeySize(key.len()));
    }
    if nonce.len() != NONCE_SIZE {
        return Err(CryptoError::InvalidNonceSize(nonce.len()));
    }
    Ok(())
}

/// Encrypt `plaintext` with AES-256-GCM.
///
/// Returns `ciphertext || tag`, the tag being the trailing [`TAG_SIZE`] bytes.
/// An empty `aad` is the same as no associated data.
pub fn seal(
    key: &[u8],
    nonce: &[u8],
    plaintext: &[u8],
    aad: Option<&[u8]>,
) -> Result<Vec<u8>, CryptoError> {
    check_sizes(key, nonce)?;

    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;
    let payload = Payload {
        msg: plaintext,
        aad: aad.unwrap_or_default(),
    };

    cipher
        .encrypt(Nonce::from_slice(nonce), payload)
        .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))
}

/// Split sealed output into `(ciphertext, tag)`.
pub fn split_tag(sealed: &[u8]) -> Result<(&[u8], &[u8]), CryptoError> {
    if sealed.len() < TAG_SIZE {
        return Err(CryptoError::EncryptionFailed(format!(
            "sealed output too short: {} bytes",
            sealed.len()
        )));
    }
    Ok(sealed.split_at(sealed.len() - TAG_SIZE))
}
