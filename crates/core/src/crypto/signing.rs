//! Detached Ed25519 signatures over canonical bytes (§4.B), used to bind a
//! Certificate of Destruction to its issuing key.

use crate::error::{Error, Result};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};

pub struct SigningService {
    signing_key: SigningKey,
}

impl SigningService {
    /// Derives a signing key from a 32-byte seed (the configured
    /// `security.signing_key_seed`, hex-decoded upstream).
    pub fn from_seed(seed: [u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(&seed),
        }
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }

    pub fn sign(&self, bytes: &[u8]) -> Vec<u8> {
        self.signing_key.sign(bytes).to_bytes().to_vec()
    }

    pub fn verify(&self, bytes: &[u8], signature: &[u8]) -> bool {
        verify_with_key(&self.verifying_key(), bytes, signature)
    }
}

/// Verifies a detached signature against an explicit public key, for
/// callers that only hold the certificate's issuer key, not the signing
/// service itself.
pub fn verify_with_key(key: &VerifyingKey, bytes: &[u8], signature: &[u8]) -> bool {
    let signature = match Signature::from_slice(signature) {
        Ok(sig) => sig,
        Err(_) => return false,
    };
    key.verify(bytes, &signature).is_ok()
}

pub fn decode_seed(hex_seed: &str) -> Result<[u8; 32]> {
    if hex_seed.len() != 64 {
        return Err(Error::validation("signing key seed must be 64 hex characters"));
    }
    let mut seed = [0u8; 32];
    for (i, byte) in seed.iter_mut().enumerate() {
        let hex_byte = &hex_seed[i * 2..i * 2 + 2];
        *byte = u8::from_str_radix(hex_byte, 16)
            .map_err(|_| Error::validation("signing key seed must be valid hex"))?;
    }
    Ok(seed)
}
