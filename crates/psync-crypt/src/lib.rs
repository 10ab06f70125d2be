//! psync-crypt: decoder for rclone "crypt" remotes
//!
//! Everything is keyed from a single password:
//! ```text
//! password ──scrypt(N=16384, r=8, p=1, fixed salt)──▶ 80 bytes
//!   ├── [0..32)  data key   → XSalsa20 + Poly1305 per 64 KiB chunk (file bodies)
//!   ├── [32..64) name key   → AES-256 inside EME (file names)
//!   └── [64..80) name tweak → EME tweak
//! ```
//!
//! Only decryption is provided.

pub mod decrypter;
pub mod eme;
pub mod error;
pub mod kdf;
pub mod names;
pub mod stream;

pub use decrypter::{resolve_path, Decrypter};
pub use eme::EmeCipher;
pub use error::{CryptError, CryptResult};
pub use kdf::KeyMaterial;
pub use names::NameCodec;
pub use stream::{increment_nonce, ChunkKeystream, StreamCodec};

/// Size of the data key and the name key in bytes (256-bit)
pub const KEY_SIZE: usize = 32;

/// Size of an XSalsa20 nonce (192-bit)
pub const NONCE_SIZE: usize = 24;

/// Size of a Poly1305 authentication tag
pub const TAG_SIZE: usize = 16;

/// AES block size; also the EME tweak size
pub const BLOCK_SIZE: usize = 16;
