//! EME filename decryption
//!
//! rclone encrypts every path segment on its own: the segment is PKCS#7
//! padded to a whole number of blocks, enciphered with EME, and written as
//! URL-safe base64 without padding. Segment boundaries therefore survive
//! encryption and `a/b/` stays a two-name path with a trailing separator.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;

use crate::eme::EmeCipher;
use crate::error::{CryptError, CryptResult};
use crate::kdf::KeyMaterial;

#[derive(Debug, Clone)]
pub struct NameCodec {
    cipher: EmeCipher,
}

impl NameCodec {
    pub fn new(keys: &KeyMaterial) -> CryptResult<Self> {
        Ok(Self {
            cipher: EmeCipher::new(keys.name_key(), keys.name_tweak())?,
        })
    }

    /// Decrypt one non-empty path segment.
    pub fn decrypt_segment(&self, encoded: &str) -> CryptResult<String> {
        let ciphertext = URL_SAFE_NO_PAD.decode(encoded)?;
        let padded = self.cipher.decrypt(&ciphertext)?;
        let plaintext = pkcs7_unpad(&padded)?;
        let name = std::str::from_utf8(plaintext).map_err(|_| CryptError::InvalidUtf8)?;
        // Control characters would make unsafe path components
        if name.chars().any(char::is_control) {
            return Err(CryptError::ControlCharacter);
        }
        Ok(name.to_string())
    }

    /// Decrypt every non-empty segment of a `/`-separated path.
    ///
    /// Empty segments (leading, trailing or doubled separators) pass through,
    /// and the result is joined with the platform separator.
    pub fn decrypt_path(&self, path: &str) -> CryptResult<String> {
        let segments = path
            .split('/')
            .map(|segment| {
                if segment.is_empty() {
                    Ok(String::new())
                } else {
                    self.decrypt_segment(segment)
                }
            })
            .collect::<CryptResult<Vec<_>>>()?;
        Ok(segments.join(std::path::MAIN_SEPARATOR_STR))
    }

    /// [`decrypt_path`](Self::decrypt_path), with every failure mapped to `None`.
    ///
    /// A failed name usually means the object was written under another
    /// password or was never encrypted, which callers detect by trying
    /// several codecs in turn. The error kind is discarded on purpose.
    pub fn decrypt_path_or_none(&self, path: &str) -> Option<String> {
        match self.decrypt_path(path) {
            Ok(decrypted) => Some(decrypted),
            Err(e) => {
                tracing::trace!(path, error = %e, "name did not decrypt");
                None
            }
        }
    }
}

/// Strip PKCS#7 padding: the last byte gives the pad length `p`, and the final
/// `p` bytes must all equal `p`.
fn pkcs7_unpad(padded: &[u8]) -> CryptResult<&[u8]> {
    let pad_len = *padded.last().ok_or(CryptError::InvalidPadding)? as usize;
    if pad_len > padded.len() {
        return Err(CryptError::InvalidPadding);
    }
    let (body, padding) = padded.split_at(padded.len() - pad_len);
    if padding.iter().any(|&b| b as usize != pad_len) {
        return Err(CryptError::InvalidPadding);
    }
    Ok(body)
}
