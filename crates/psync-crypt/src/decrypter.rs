//! One password's worth of name and body decoders

use std::io::{Read, Write};

use secrecy::SecretString;

use crate::error::CryptResult;
use crate::kdf::KeyMaterial;
use crate::names::NameCodec;
use crate::stream::StreamCodec;

/// Decoder for everything written by one rclone crypt remote.
///
/// Read-only after construction; share it across threads behind an `Arc`.
pub struct Decrypter {
    names: NameCodec,
    bodies: StreamCodec,
}

impl Decrypter {
    /// Derive keys from `password` (scrypt, deliberately slow) and build both codecs.
    pub fn new(password: &SecretString) -> CryptResult<Self> {
        Self::from_keys(&KeyMaterial::derive(password)?)
    }

    pub fn from_keys(keys: &KeyMaterial) -> CryptResult<Self> {
        Ok(Self {
            names: NameCodec::new(keys)?,
            bodies: StreamCodec::new(keys),
        })
    }

    pub fn decrypt_segment(&self, encoded: &str) -> CryptResult<String> {
        self.names.decrypt_segment(encoded)
    }

    /// Decrypted path, or `None` if any segment was not written by this remote.
    pub fn decrypt_path_or_none(&self, path: &str) -> Option<String> {
        self.names.decrypt_path_or_none(path)
    }

    pub fn decrypt_body<R: Read, W: Write>(&self, input: R, output: W) -> CryptResult<u64> {
        self.bodies.decrypt_body(input, output)
    }
}

impl std::fmt::Debug for Decrypter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Decrypter").finish_non_exhaustive()
    }
}

/// Try each decrypter in order; the first that decodes `path` wins.
pub fn resolve_path<'a>(
    decrypters: &'a [Decrypter],
    path: &str,
) -> Option<(usize, String, &'a Decrypter)> {
    decrypters
        .iter()
        .enumerate()
        .find_map(|(i, d)| d.decrypt_path_or_none(path).map(|decrypted| (i, decrypted, d)))
}
