pub mod decrypt;
pub mod encoding;
pub mod encrypt;
pub mod envelope;
pub mod hash;
pub mod key_wrap;

mod error;
pub use error::CryptoError;

pub use encrypt::DataKey;
pub use envelope::DigitalEnvelope;

/// AES-256 key length in bytes.
pub const KEY_SIZE: usize = 32;
/// GCM nonce length in bytes (96 bits).
pub const NONCE_SIZE: usize = 12;
/// GCM authentication tag length in bytes (128 bits), always the trailing bytes of sealed output.
pub const TAG_SIZE: usize = 16;

/// Key-wrap algorithm identifier sent at finalize time.
pub const WRAP_ALG: &str = "RSA-OAEP-256";
/// Content-encryption algorithm identifier sent at finalize time.
pub const CONTENT_ALG: &str = "A256GCM";
