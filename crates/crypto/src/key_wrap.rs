use base64::{engine::general_purpose::STANDARD, Engine as _};
use rsa::traits::PublicKeyParts;
use rsa::{pkcs1::DecodeRsaPublicKey, pkcs8::DecodePublicKey, Oaep, RsaPublicKey};
use sha2::Sha256;

use crate::CryptoError;

pub use rsa::RsaPublicKey as PublicKey;

/// Parse a PEM-encoded RSA public key.
///
/// Delimiter lines and all whitespace are removed before the body is decoded
/// as standard base64, so keys relayed through JSON with broken line wrapping
/// still parse. `PUBLIC KEY` (SubjectPublicKeyInfo) is the expected form;
/// `RSA PUBLIC KEY` (PKCS#1) is accepted as well.
pub fn parse_public_key(pem: &str) -> Result<RsaPublicKey, CryptoError> {
    // Splitting on the dash runs leaves labels at odd indices.
    let mut body = String::with_capacity(pem.len());
    let mut pkcs1 = false;
    for (i, part) in pem.split("-----").enumerate() {
        if i % 2 == 1 {
            pkcs1 |= part.contains("RSA PUBLIC KEY");
        } else {
            body.extend(part.chars().filter(|c| !c.is_whitespace()));
        }
    }

    if body.is_empty() {
        return Err(CryptoError::MalformedKey("empty key body".into()));
    }

    let der = STANDARD
        .decode(body.as_bytes())
        .map_err(|e| CryptoError::MalformedKey(format!("invalid base64: {e}")))?;

    if pkcs1 {
        RsaPublicKey::from_pkcs1_der(&der).map_err(|e| CryptoError::MalformedKey(e.to_string()))
    } else {
        RsaPublicKey::from_public_key_der(&der)
            .or_else(|_| RsaPublicKey::from_pkcs1_der(&der))
            .map_err(|e| CryptoError::MalformedKey(e.to_string()))
    }
}

/// Modulus size in bits.
pub fn key_bits(public_key: &RsaPublicKey) -> usize {
    public_key.size() * 8
}

/// Wrap a symmetric key with RSA-OAEP (SHA-256 digest, MGF1-SHA-256, empty label).
///
/// The server unwraps with exactly these parameters.
pub fn wrap(symmetric_key: &[u8], public_key: &RsaPublicKey) -> Result<Vec<u8>, CryptoError> {
    public_key
        .encrypt(
            &mut rand::thread_rng(),
            Oaep::new::<Sha256>(),
            symmetric_key,
        )
        .map_err(|e| CryptoError::WrapFailed(e.to_string()))
}
