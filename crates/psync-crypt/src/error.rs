//! Decoder error kinds
//!
//! Body failures are surfaced to callers as-is. Name failures are folded into
//! "no match" by [`crate::Decrypter::decrypt_path_or_none`].

use thiserror::Error;

pub type CryptResult<T> = Result<T, CryptError>;

#[derive(Debug, Error)]
pub enum CryptError {
    #[error("input is not an rclone-encrypted file (bad magic)")]
    BadMagic,

    #[error("could not read the 24-byte nonce from the file header")]
    TruncatedNonce,

    #[error("chunk carries no ciphertext after its authentication tag")]
    EmptyChunk,

    #[error("MAC validation failed: data is corrupted or encrypted under a different key")]
    MacMismatch,

    #[error("EME is not supported for empty messages")]
    EmptyMessage,

    #[error("EME ciphertext spans {blocks} blocks, more than the {max} allowed")]
    InvalidBlockCount { blocks: usize, max: usize },

    #[error("EME ciphertext length {0} is not a multiple of the block size")]
    InvalidCiphertextLength(usize),

    #[error("tweak must be exactly one block (16 bytes), got {0}")]
    InvalidTweakLength(usize),

    #[error("invalid PKCS#7 padding")]
    InvalidPadding,

    #[error("decrypted name is not valid UTF-8")]
    InvalidUtf8,

    #[error("decrypted name contains a control character")]
    ControlCharacter,

    #[error("base64 decode: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("scrypt key derivation failed: {0}")]
    Kdf(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
