//! EME (ECB-Mix-ECB) wide-block decryption over AES-256
//!
//! Halevi & Rogaway, "A Parallelizable Enciphering Mode" (eprint 2003/147),
//! in the little-endian GF(2^128) convention rclone's `eme` package uses.
//! File names are a single EME message each, so a name may be at most
//! 128 blocks (2 KiB) long.

use aes::cipher::{generic_array::GenericArray, BlockDecrypt, BlockEncrypt, KeyInit};
use aes::Aes256;

use crate::error::{CryptError, CryptResult};
use crate::{BLOCK_SIZE, KEY_SIZE};

type Block = [u8; BLOCK_SIZE];

/// Past this many blocks the mode's security bound no longer holds
pub const MAX_BLOCKS: usize = BLOCK_SIZE * 8;

/// AES-256 plus a one-block tweak.
///
/// AES round keys are immutable after construction, so one cipher can serve
/// concurrent `decrypt` calls.
#[derive(Clone)]
pub struct EmeCipher {
    aes: Aes256,
    tweak: Block,
}

impl EmeCipher {
    pub fn new(key: &[u8; KEY_SIZE], tweak: &[u8]) -> CryptResult<Self> {
        let tweak: Block = tweak
            .try_into()
            .map_err(|_| CryptError::InvalidTweakLength(tweak.len()))?;
        Ok(Self {
            aes: Aes256::new(GenericArray::from_slice(key)),
            tweak,
        })
    }

    /// Decrypt one EME message of 1..=128 whole blocks.
    pub fn decrypt(&self, ciphertext: &[u8]) -> CryptResult<Vec<u8>> {
        if ciphertext.is_empty() {
            return Err(CryptError::EmptyMessage);
        }
        let blocks = ciphertext.len().div_ceil(BLOCK_SIZE);
        if blocks > MAX_BLOCKS {
            return Err(CryptError::InvalidBlockCount {
                blocks,
                max: MAX_BLOCKS,
            });
        }
        if ciphertext.len() % BLOCK_SIZE != 0 {
            return Err(CryptError::InvalidCiphertextLength(ciphertext.len()));
        }

        let l = self.tabulate_l(blocks);

        // First ECB pass
        let ccc: Vec<Block> = ciphertext
            .chunks_exact(BLOCK_SIZE)
            .zip(&l)
            .map(|(c, l_i)| self.aes_decrypt(xor(&to_block(c), l_i)))
            .collect();

        // Mix
        let sc = ccc.iter().fold([0u8; BLOCK_SIZE], |acc, b| xor(&acc, b));
        let mc = xor(&sc, &self.tweak);
        let mp = self.aes_decrypt(mc);
        let m = xor(&mc, &mp);

        let mut ppp = Vec::with_capacity(blocks);
        let mut m_i = m;
        for ccc_i in &ccc {
            ppp.push(xor(ccc_i, &m_i));
            m_i = mult_by_two(&m_i);
        }
        let sp = ppp[1..].iter().fold([0u8; BLOCK_SIZE], |acc, b| xor(&acc, b));
        ppp[0] = xor(&xor(&mp, &sp), &self.tweak);

        // Second ECB pass
        let mut plaintext = Vec::with_capacity(ciphertext.len());
        for (ppp_i, l_i) in ppp.iter().zip(&l) {
            plaintext.extend_from_slice(&xor(&self.aes_decrypt(*ppp_i), l_i));
        }
        Ok(plaintext)
    }

    /// L_i = 2^(i+1) · E(0)
    fn tabulate_l(&self, blocks: usize) -> Vec<Block> {
        let mut l = self.aes_encrypt([0u8; BLOCK_SIZE]);
        (0..blocks)
            .map(|_| {
                l = mult_by_two(&l);
                l
            })
            .collect()
    }

    fn aes_encrypt(&self, mut block: Block) -> Block {
        self.aes.encrypt_block(GenericArray::from_mut_slice(&mut block));
        block
    }

    fn aes_decrypt(&self, mut block: Block) -> Block {
        self.aes.decrypt_block(GenericArray::from_mut_slice(&mut block));
        block
    }
}

impl std::fmt::Debug for EmeCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmeCipher")
            .field("key", &"[REDACTED]")
            .finish()
    }
}

/// Double a block in GF(2^128), byte 0 being least significant.
pub fn mult_by_two(input: &Block) -> Block {
    let mut out = [0u8; BLOCK_SIZE];
    out[0] = input[0] << 1;
    if input[BLOCK_SIZE - 1] & 0x80 != 0 {
        out[0] ^= 0x87;
    }
    for j in 1..BLOCK_SIZE {
        out[j] = (input[j] << 1) | (input[j - 1] >> 7);
    }
    out
}

fn xor(a: &Block, b: &Block) -> Block {
    let mut out = [0u8; BLOCK_SIZE];
    for (o, (x, y)) in out.iter_mut().zip(a.iter().zip(b)) {
        *o = x ^ y;
    }
    out
}

fn to_block(slice: &[u8]) -> Block {
    let mut block = [0u8; BLOCK_SIZE];
    block.copy_from_slice(slice);
    block
}
