use thiserror::Error;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("invalid key size: expected 32 bytes, got {0}")]
    InvalidKeySize(usize),

    #[error("invalid nonce size: expected 12 bytes, got {0}")]
    InvalidNonceSize(usize),

    #[error("authentication failed: tag does not verify")]
    AuthenticationFailure,

    #[error("malformed public key: {0}")]
    MalformedKey(String),

    #[error("encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("key wrap failed: {0}")]
    WrapFailed(String),
}
