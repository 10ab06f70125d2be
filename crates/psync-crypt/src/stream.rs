//! rclone file-body decryption (NaCl secretbox per 64 KiB chunk)
//!
//! Encrypted file format (binary):
//! ```text
//! [8 bytes: "RCLONE\0\0"][24 bytes: nonce]
//! repeated: [16 bytes: Poly1305 tag][1..=65536 bytes: XSalsa20 ciphertext]
//! ```
//!
//! The nonce is a little-endian 192-bit counter, incremented once per chunk,
//! so chunks cannot be reordered or spliced between files without failing
//! authentication.

use std::io::{self, Read, Write};

use poly1305::universal_hash::KeyInit;
use poly1305::Poly1305;
use salsa20::cipher::{generic_array::GenericArray, KeyIvInit, StreamCipher, StreamCipherSeek};
use salsa20::XSalsa20;
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

use crate::error::{CryptError, CryptResult};
use crate::kdf::KeyMaterial;
use crate::{KEY_SIZE, NONCE_SIZE, TAG_SIZE};

/// File header magic
pub const MAGIC: &[u8; 8] = b"RCLONE\0\0";

/// Plaintext (and ciphertext) bytes per full chunk
pub const CHUNK_SIZE: usize = 64 * 1024;

/// Largest chunk on the wire
pub const MAX_CHUNK_LEN: usize = TAG_SIZE + CHUNK_SIZE;

/// Length of the one-time Poly1305 key taken from the head of each keystream
pub const POLY1305_KEY_SIZE: usize = 32;

/// One chunk's XSalsa20 keystream, with its read position made explicit.
///
/// The first 32 bytes become the Poly1305 key; the ciphertext is then
/// decrypted from byte 32 onward of the same keystream.
pub struct ChunkKeystream {
    cipher: XSalsa20,
}

impl ChunkKeystream {
    pub fn new(data_key: &[u8; KEY_SIZE], nonce: &[u8; NONCE_SIZE]) -> Self {
        Self {
            cipher: XSalsa20::new(
                GenericArray::from_slice(data_key),
                GenericArray::from_slice(nonce),
            ),
        }
    }

    /// Bytes of keystream consumed so far
    pub fn position(&self) -> u64 {
        self.cipher.current_pos()
    }

    /// Take the next 32 keystream bytes as a Poly1305 key.
    pub fn poly1305_key(&mut self) -> Zeroizing<[u8; POLY1305_KEY_SIZE]> {
        let mut key = Zeroizing::new([0u8; POLY1305_KEY_SIZE]);
        self.cipher.apply_keystream(&mut key[..]);
        key
    }

    /// XOR `buf` with the keystream from the current position.
    pub fn apply(&mut self, buf: &mut [u8]) {
        self.cipher.apply_keystream(buf);
    }
}

/// Decoder for encrypted file bodies
pub struct StreamCodec {
    data_key: Zeroizing<[u8; KEY_SIZE]>,
}

impl StreamCodec {
    pub fn new(keys: &KeyMaterial) -> Self {
        Self {
            data_key: Zeroizing::new(*keys.data_key()),
        }
    }

    /// Decrypt a whole body from `input` into `output`.
    ///
    /// Each chunk is authenticated before any of its plaintext is written.
    /// Returns the number of plaintext bytes written.
    pub fn decrypt_body<R: Read, W: Write>(
        &self,
        mut input: R,
        mut output: W,
    ) -> CryptResult<u64> {
        let mut magic = [0u8; MAGIC.len()];
        if read_full(&mut input, &mut magic)? != MAGIC.len() || &magic != MAGIC {
            return Err(CryptError::BadMagic);
        }

        let mut nonce = [0u8; NONCE_SIZE];
        if read_full(&mut input, &mut nonce)? != NONCE_SIZE {
            return Err(CryptError::TruncatedNonce);
        }

        let mut buf = vec![0u8; MAX_CHUNK_LEN];
        let mut written = 0u64;
        let mut chunks = 0u64;
        loop {
            let n = read_full(&mut input, &mut buf)?;
            if n == 0 {
                break;
            }
            let plaintext = self.open_chunk(&nonce, &mut buf[..n])?;
            output.write_all(plaintext)?;
            written += plaintext.len() as u64;
            chunks += 1;
            increment_nonce(&mut nonce);
        }
        output.flush()?;

        tracing::trace!(chunks, bytes = written, "decrypted body");
        Ok(written)
    }

    /// Authenticate and decrypt one `[tag][ciphertext]` chunk in place,
    /// returning the plaintext slice.
    pub fn open_chunk<'a>(
        &self,
        nonce: &[u8; NONCE_SIZE],
        chunk: &'a mut [u8],
    ) -> CryptResult<&'a [u8]> {
        if chunk.len() <= TAG_SIZE {
            return Err(CryptError::EmptyChunk);
        }
        let (stored_tag, body) = chunk.split_at_mut(TAG_SIZE);

        let mut keystream = ChunkKeystream::new(&self.data_key, nonce);
        let mac_key = keystream.poly1305_key();
        let computed =
            Poly1305::new(GenericArray::from_slice(&mac_key[..])).compute_unpadded(body);
        if !bool::from(computed.as_slice().ct_eq(stored_tag)) {
            return Err(CryptError::MacMismatch);
        }

        keystream.apply(body);
        Ok(body)
    }
}

/// Seal `plaintext` into an rclone-format body starting at `nonce`.
///
/// For fixtures and benches; the sync pipeline only ever decrypts.
#[doc(hidden)]
pub fn seal_body(keys: &KeyMaterial, mut nonce: [u8; NONCE_SIZE], plaintext: &[u8]) -> Vec<u8> {
    let mut out = MAGIC.to_vec();
    out.extend_from_slice(&nonce);
    for chunk in plaintext.chunks(CHUNK_SIZE) {
        let mut keystream = ChunkKeystream::new(keys.data_key(), &nonce);
        let mac_key = keystream.poly1305_key();
        let mut ciphertext = chunk.to_vec();
        keystream.apply(&mut ciphertext);
        let tag =
            Poly1305::new(GenericArray::from_slice(&mac_key[..])).compute_unpadded(&ciphertext);
        out.extend_from_slice(&tag);
        out.extend_from_slice(&ciphertext);
        increment_nonce(&mut nonce);
    }
    out
}

/// Add one to a little-endian 192-bit counter, carrying across all 24 bytes.
pub fn increment_nonce(nonce: &mut [u8; NONCE_SIZE]) {
    for byte in nonce.iter_mut() {
        *byte = byte.wrapping_add(1);
        if *byte != 0 {
            break;
        }
    }
}

/// Fill `buf` as far as the reader allows, returning how much was read.
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
