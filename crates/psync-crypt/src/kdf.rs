//! Key derivation: password → scrypt → data key, name key, name tweak

use secrecy::{ExposeSecret, SecretString};
use zeroize::Zeroize;

use crate::error::{CryptError, CryptResult};
use crate::{BLOCK_SIZE, KEY_SIZE};

/// Salt rclone uses when no salt password is configured.
pub const DEFAULT_SALT: [u8; 16] = [
    0xA8, 0x0D, 0xF4, 0x3A, 0x8F, 0xBD, 0x03, 0x08, 0xA7, 0xCA, 0xB8, 0x3E, 0x58, 0x1F, 0x86, 0xB1,
];

/// log2 of the scrypt cost factor N = 16384
const SCRYPT_LOG_N: u8 = 14;
const SCRYPT_R: u32 = 8;
const SCRYPT_P: u32 = 1;

/// Total derived length: data key + name key + name tweak
pub const DERIVED_LEN: usize = KEY_SIZE + KEY_SIZE + BLOCK_SIZE;

/// The three secrets derived from one password.
///
/// Zeroized on drop to prevent secrets lingering in memory.
#[derive(Clone)]
pub struct KeyMaterial {
    data_key: [u8; KEY_SIZE],
    name_key: [u8; KEY_SIZE],
    name_tweak: [u8; BLOCK_SIZE],
}

impl KeyMaterial {
    /// Derive key material from a password with rclone's fixed scrypt parameters.
    ///
    /// Deterministic. Fails only if scrypt itself fails.
    pub fn derive(password: &SecretString) -> CryptResult<Self> {
        // `len` only sizes PHC strings; the output length comes from `okm`.
        let params = scrypt::Params::new(
            SCRYPT_LOG_N,
            SCRYPT_R,
            SCRYPT_P,
            scrypt::Params::RECOMMENDED_LEN,
        )
        .map_err(|e| CryptError::Kdf(format!("invalid scrypt params: {e}")))?;

        let mut okm = [0u8; DERIVED_LEN];
        scrypt::scrypt(
            password.expose_secret().as_bytes(),
            &DEFAULT_SALT,
            &params,
            &mut okm,
        )
        .map_err(|e| CryptError::Kdf(e.to_string()))?;

        let keys = Self::from_bytes(&okm);
        okm.zeroize();
        Ok(keys)
    }

    /// Split 80 raw bytes positionally into the three keys.
    pub fn from_bytes(bytes: &[u8; DERIVED_LEN]) -> Self {
        let mut data_key = [0u8; KEY_SIZE];
        let mut name_key = [0u8; KEY_SIZE];
        let mut name_tweak = [0u8; BLOCK_SIZE];
        data_key.copy_from_slice(&bytes[..KEY_SIZE]);
        name_key.copy_from_slice(&bytes[KEY_SIZE..2 * KEY_SIZE]);
        name_tweak.copy_from_slice(&bytes[2 * KEY_SIZE..]);
        Self {
            data_key,
            name_key,
            name_tweak,
        }
    }

    /// Key for the XSalsa20-Poly1305 body stream
    pub fn data_key(&self) -> &[u8; KEY_SIZE] {
        &self.data_key
    }

    /// AES-256 key for the EME name cipher
    pub fn name_key(&self) -> &[u8; KEY_SIZE] {
        &self.name_key
    }

    /// EME tweak
    pub fn name_tweak(&self) -> &[u8; BLOCK_SIZE] {
        &self.name_tweak
    }
}

impl Drop for KeyMaterial {
    fn drop(&mut self) {
        self.data_key.zeroize();
        self.name_key.zeroize();
        self.name_tweak.zeroize();
    }
}

impl std::fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("data_key", &"[REDACTED]")
            .field("name_key", &"[REDACTED]")
            .field("name_tweak", &"[REDACTED]")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_is_positional() {
        let mut raw = [0u8; DERIVED_LEN];
        for (i, b) in raw.iter_mut().enumerate() {
            *b = i as u8;
        }
        let keys = KeyMaterial::from_bytes(&raw);

        assert_eq!(keys.data_key()[0], 0);
        assert_eq!(keys.data_key()[31], 31);
        assert_eq!(keys.name_key()[0], 32);
        assert_eq!(keys.name_key()[31], 63);
        assert_eq!(keys.name_tweak()[0], 64);
        assert_eq!(keys.name_tweak()[15], 79);
    }

    #[test]
    fn test_kdf_known_vector() {
        let password = SecretString::from("kjIjoZRjnxwUN2xFTWkswdEDw3msGoPN3KVDD3LWDd8");
        let keys = KeyMaterial::derive(&password).unwrap();

        assert_eq!(&keys.data_key()[..4], &[0x71, 0x13, 0x45, 0xf1]);
        assert_eq!(&keys.name_key()[..4], &[0x1f, 0xe0, 0xcf, 0x7e]);
        assert_eq!(
            keys.name_tweak(),
            &[
                0xc1, 0xbc, 0xf2, 0x7e, 0x97, 0x86, 0x7c, 0xe5, 0x2f, 0x28, 0x9f, 0xa0, 0x52, 0x8c,
                0x18, 0x3b,
            ]
        );
    }

    #[test]
    fn test_kdf_deterministic() {
        let password = SecretString::from("test-password-123");

        let k1 = KeyMaterial::derive(&password).unwrap();
        let k2 = KeyMaterial::derive(&password).unwrap();

        assert_eq!(k1.data_key(), k2.data_key(), "KDF must be deterministic");
        assert_eq!(k1.name_key(), k2.name_key());
        assert_eq!(k1.name_tweak(), k2.name_tweak());
    }

    #[test]
    fn test_kdf_different_passwords() {
        let k1 = KeyMaterial::derive(&SecretString::from("password-a")).unwrap();
        let k2 = KeyMaterial::derive(&SecretString::from("password-b")).unwrap();

        assert_ne!(
            k1.data_key(),
            k2.data_key(),
            "different passwords must produce different keys"
        );
        assert_ne!(k1.name_key(), k2.name_key());
    }

    #[test]
    fn test_regions_differ() {
        let keys = KeyMaterial::derive(&SecretString::from("regions")).unwrap();
        assert_ne!(keys.data_key(), keys.name_key());
    }

    #[test]
    fn test_debug_redacts() {
        let keys = KeyMaterial::from_bytes(&[0x42u8; DERIVED_LEN]);
        let shown = format!("{keys:?}");
        assert!(shown.contains("REDACTED"));
        assert!(!shown.contains("66"), "raw key bytes must not be printed");
    }
}
