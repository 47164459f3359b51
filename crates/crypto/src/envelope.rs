//! One-shot digital envelope: the whole payload is sealed under a fresh data key,
//! and the data key is later wrapped for the server's public key.

use rsa::RsaPublicKey;

use crate::encrypt::{generate_key, generate_nonce, seal, split_tag, DataKey};
use crate::hash::sha256_hex;
use crate::key_wrap::wrap;
use crate::{CryptoError, NONCE_SIZE, TAG_SIZE};

/// Sealed payload plus the material needed to finalize an upload.
///
/// Built once per upload attempt. The data key never leaves this struct except
/// in wrapped form, and is zeroized when the envelope is dropped.
pub struct DigitalEnvelope {
    data_key: DataKey,
    nonce: [u8; NONCE_SIZE],
    ciphertext: Vec<u8>,
    tag: [u8; TAG_SIZE],
    ciphertext_sha256: String,
}

impl DigitalEnvelope {
    /// Seal `plaintext` under a freshly generated key and nonce.
    pub fn seal(plaintext: &[u8]) -> Result<Self, CryptoError> {
        Self::seal_with(generate_key(), generate_nonce(), plaintext)
    }

    fn seal_with(
        data_key: DataKey,
        nonce: [u8; NONCE_SIZE],
        plaintext: &[u8],
    ) -> Result<Self, CryptoError> {
        let mut sealed = seal(data_key.as_bytes(), &nonce, plaintext, None)?;

        let (ciphertext, tag_bytes) = split_tag(&sealed)?;
        let mut tag = [0u8; TAG_SIZE];
        tag.copy_from_slice(tag_bytes);
        let ciphertext_len = ciphertext.len();
        let ciphertext_sha256 = sha256_hex(ciphertext);

        sealed.truncate(ciphertext_len);

        Ok(Self {
            data_key,
            nonce,
            ciphertext: sealed,
            tag,
            ciphertext_sha256,
        })
    }

    /// Ciphertext without the tag; this is what gets sent in segments.
    pub fn ciphertext(&self) -> &[u8] {
        &self.ciphertext
    }

    pub fn nonce(&self) -> &[u8; NONCE_SIZE] {
        &self.nonce
    }

    pub fn tag(&self) -> &[u8; TAG_SIZE] {
        &self.tag
    }

    /// Lowercase hex SHA-256 of [`Self::ciphertext`].
    pub fn ciphertext_sha256(&self) -> &str {
        &self.ciphertext_sha256
    }

    /// Wrap the data key for the server.
    pub fn wrap_key(&self, public_key: &RsaPublicKey) -> Result<Vec<u8>, CryptoError> {
        wrap(self.data_key.as_bytes(), public_key)
    }
}

impl std::fmt::Debug for DigitalEnvelope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DigitalEnvelope")
            .field("data_key", &self.data_key)
            .field("ciphertext_len", &self.ciphertext.len())
            .field("ciphertext_sha256", &self.ciphertext_sha256)
            .finish_non_exhaustive()
    }
}
