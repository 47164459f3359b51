use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Nonce,
};

use crate::encrypt::check_sizes;
use crate::CryptoError;

/// Decrypt `ciphertext || tag` produced by [`crate::encrypt::seal`].
///
/// The upload path never decrypts; this exists so sealed output can be verified
/// and so a failed tag check surfaces as [`CryptoError::AuthenticationFailure`].
pub fn open(
    key: &[u8],
    nonce: &[u8],
    ciphertext_with_tag: &[u8],
    aad: Option<&[u8]>,
) -> Result<Vec<u8>, CryptoError> {
    check_sizes(key, nonce)?;

    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|_| CryptoError::InvalidKeySize(key.len()))?;
    let payload = Payload {
        msg: ciphertext_with_tag,
        aad: aad.unwrap_or_default(),
    };

    cipher
        .decrypt(Nonce::from_slice(nonce), payload)
        .map_err(|_| CryptoError::AuthenticationFailure)
}
