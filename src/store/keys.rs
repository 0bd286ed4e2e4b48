use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use super::crypto::{generate_key, ContextKey, KEY_LEN};
use super::StoreError;
use crate::ports::SecretStore;

/// Read the base64 context key from `secrets`, generating and storing a new
/// one when none exists yet.
pub fn load_or_create_key(secrets: &dyn SecretStore) -> Result<ContextKey, StoreError> {
    let existing = secrets
        .get()
        .map_err(|err| StoreError::Key(format!("secret store read failed: {err:#}")))?;

    if let Some(encoded) = existing {
        return decode_key(&encoded);
    }

    let key = generate_key();
    secrets
        .set(&STANDARD.encode(key))
        .map_err(|err| StoreError::Key(format!("secret store write failed: {err:#}")))?;
    log::info!("Generated a new context encryption key");
    Ok(key)
}

pub fn decode_key(encoded: &str) -> Result<ContextKey, StoreError> {
    let bytes = STANDARD
        .decode(encoded.trim())
        .map_err(|_| StoreError::Key("key is not valid base64".into()))?;
    if bytes.len() != KEY_LEN {
        return Err(StoreError::Key(format!(
            "expected {KEY_LEN} key bytes, found {}",
            bytes.len()
        )));
    }
    let mut key = [0u8; KEY_LEN];
    key.copy_from_slice(&bytes);
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MemorySecret(Mutex<Option<String>>);

    impl SecretStore for MemorySecret {
        fn get(&self) -> anyhow::Result<Option<String>> {
            Ok(self.0.lock().unwrap().clone())
        }

        fn set(&self, value: &str) -> anyhow::Result<()> {
            *self.0.lock().unwrap() = Some(value.to_string());
            Ok(())
        }

        fn delete(&self) -> anyhow::Result<()> {
            *self.0.lock().unwrap() = None;
            Ok(())
        }
    }

    #[test]
    fn creates_then_reuses_key() {
        let secrets = MemorySecret::default();
        let first = load_or_create_key(&secrets).unwrap();
        assert!(secrets.get().unwrap().is_some());
        let second = load_or_create_key(&secrets).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn rejects_short_key() {
        let secrets = MemorySecret::default();
        secrets.set(&STANDARD.encode([1u8; 8])).unwrap();
        assert!(matches!(load_or_create_key(&secrets), Err(StoreError::Key(_))));
    }
}
