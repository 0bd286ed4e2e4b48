use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Nonce};
use rand::RngCore;

use super::StoreError;

pub const KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;

pub type ContextKey = [u8; KEY_LEN];

/// Seal `plaintext` with ChaCha20-Poly1305. Output is `nonce || ciphertext || tag`.
pub fn seal(plaintext: &[u8], key: &ContextKey) -> Result<Vec<u8>, StoreError> {
    let cipher = ChaCha20Poly1305::new(key.into());
    let mut nonce_bytes = [0u8; NONCE_LEN];
    rand::thread_rng().fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|_| StoreError::Encrypt)?;

    let mut combined = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    combined.extend_from_slice(&nonce_bytes);
    combined.extend_from_slice(&ciphertext);
    Ok(combined)
}

/// Open a `nonce || ciphertext || tag` blob. Fails on a wrong key or any
/// tampering.
pub fn open(combined: &[u8], key: &ContextKey) -> Result<Vec<u8>, StoreError> {
    if combined.len() < NONCE_LEN {
        return Err(StoreError::Decrypt);
    }
    let (nonce_bytes, ciphertext) = combined.split_at(NONCE_LEN);
    let cipher = ChaCha20Poly1305::new(key.into());
    cipher
        .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
        .map_err(|_| StoreError::Decrypt)
}

pub fn generate_key() -> ContextKey {
    let mut key = [0u8; KEY_LEN];
    rand::thread_rng().fill_bytes(&mut key);
    key
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seal_open_roundtrip() {
        let key = generate_key();
        let sealed = seal(b"context payload", &key).unwrap();
        assert_eq!(open(&sealed, &key).unwrap(), b"context payload");
    }

    #[test]
    fn fresh_nonce_per_seal() {
        let key = generate_key();
        assert_ne!(seal(b"same", &key).unwrap(), seal(b"same", &key).unwrap());
    }

    #[test]
    fn wrong_key_fails() {
        let sealed = seal(b"secret", &generate_key()).unwrap();
        assert!(matches!(open(&sealed, &generate_key()), Err(StoreError::Decrypt)));
    }

    #[test]
    fn tampered_or_truncated_fails() {
        let key = generate_key();
        let mut sealed = seal(b"secret", &key).unwrap();
        if let Some(byte) = sealed.last_mut() {
            *byte ^= 0x01;
        }
        assert!(open(&sealed, &key).is_err());
        assert!(open(&sealed[..4], &key).is_err());
    }
}
