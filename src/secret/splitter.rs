//! One-time-pad split and reconstruction of provider secrets.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;
use thiserror::Error;
use zeroize::Zeroizing;

/// Errors raised while rebuilding a secret from its shares.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// One of the shares is not valid standard base64.
    #[error("share is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    /// The XOR of both shares is not valid UTF-8.
    #[error("reconstructed secret is not valid UTF-8")]
    Utf8,
}

/// The two base64 halves produced by [`split`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretShares {
    /// Random pad, held by the credential store.
    pub server: String,
    /// `secret XOR pad`, held by the client.
    pub client: String,
}

/// Split a secret into a server share and a client share.
///
/// The server share is a fresh pad of `secret.len()` bytes from the OS RNG.
pub fn split(secret: impl AsRef<[u8]>) -> SecretShares {
    let secret = secret.as_ref();
    let mut pad = Zeroizing::new(vec![0u8; secret.len()]);
    OsRng.fill_bytes(&mut pad);

    let client = Zeroizing::new(xor(secret, &pad));

    SecretShares {
        server: STANDARD.encode(&*pad),
        client: STANDARD.encode(&*client),
    }
}

/// Rebuild the raw secret bytes. XOR runs over the shorter of the two shares.
pub fn reconstruct_bytes(server_b64: &str, client_b64: &str) -> Result<Zeroizing<Vec<u8>>, DecodeError> {
    let server = Zeroizing::new(STANDARD.decode(server_b64)?);
    let client = Zeroizing::new(STANDARD.decode(client_b64)?);
    Ok(Zeroizing::new(xor(&server, &client)))
}

/// Rebuild the secret as a UTF-8 string.
pub fn reconstruct(server_b64: &str, client_b64: &str) -> Result<Zeroizing<String>, DecodeError> {
    let mut bytes = reconstruct_bytes(server_b64, client_b64)?;
    let raw = std::mem::take(&mut *bytes);
    match String::from_utf8(raw) {
        Ok(secret) => Ok(Zeroizing::new(secret)),
        Err(e) => {
            // wipe the rejected bytes before they drop
            drop(Zeroizing::new(e.into_bytes()));
            Err(DecodeError::Utf8)
        }
    }
}

fn xor(a: &[u8], b: &[u8]) -> Vec<u8> {
    a.iter().zip(b.iter()).map(|(x, y)| x ^ y).collect()
}
