//! Key-provider capability for AUTH challenge signing.
//!
//! The cryptographic primitives are external collaborators: the engine never
//! generates, stores, or formats RSA material itself. During the handshake it
//! asks the provider to sign the peer's 20-byte challenge, and — if the
//! signature is rejected — for the public key to offer instead. The key-file
//! location is given to the provider at construction
//! ([`crate::config::SessionConfig::key_path`] carries it for file-backed
//! implementations); nothing in the engine assumes a particular storage.

use crate::error::Result;

/// Capability contract for the RSA identity used to answer AUTH challenges.
///
/// Implementations must be cheap to call from the connect path: `sign` runs
/// once per handshake on the caller's task.
pub trait KeyProvider: Send + Sync {
    /// Create the key pair if it does not already exist. Idempotent.
    fn generate_keys(&self) -> Result<()>;

    /// The public key in the peer's expected format: base64 of the encoded
    /// key followed by a space and a user/host comment, NUL-terminated.
    fn public_key(&self) -> Result<Vec<u8>>;

    /// Fixed-size RSA signature (PKCS#1-style padding) over the peer's
    /// challenge token.
    fn sign(&self, token: &[u8]) -> Result<Vec<u8>>;
}

impl<P: KeyProvider + ?Sized> KeyProvider for &P {
    fn generate_keys(&self) -> Result<()> {
        (**self).generate_keys()
    }

    fn public_key(&self) -> Result<Vec<u8>> {
        (**self).public_key()
    }

    fn sign(&self, token: &[u8]) -> Result<Vec<u8>> {
        (**self).sign(token)
    }
}
