//! AES-128-CBC with a caller-held, chained IV.
//!
//! The console's `encrypt` call takes the IV by reference and leaves the
//! last ciphertext block in it, so a file can be encrypted in several
//! chunks that chain exactly like one large call. [`SdCipher`] reproduces
//! that contract in software.

use aes::Aes128;
use cipher::block_padding::NoPadding;
use cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};

use crate::error::CipherError;

pub type Aes128CbcEnc = cbc::Encryptor<Aes128>;
pub type Aes128CbcDec = cbc::Decryptor<Aes128>;

pub const AES_BLOCK_SIZE: usize = 16;

/// Well-known SD-card key used for every export region.
pub const SD_KEY: [u8; 16] = [
    0xAB, 0x01, 0xB9, 0xD8, 0xE1, 0x62, 0x2B, 0x08, 0xAF, 0xBA, 0xD8, 0x4D, 0xBF, 0xC2, 0xA5, 0x5D,
];

/// Fixed IV for the save blob and the content header/icon regions.
pub const SD_IV: [u8; 16] = [
    0x21, 0x67, 0x12, 0xE6, 0xAA, 0x1F, 0x68, 0x9F, 0x95, 0xC5, 0xA2, 0x23, 0x24, 0xDC, 0x6A, 0x98,
];

/// AES-128-CBC encrypt in-place and advance `iv` to the last ciphertext block.
///
/// `data` must be a multiple of 16 bytes. An empty slice leaves `iv` alone.
pub fn encrypt_chained(
    key: &[u8; 16],
    iv: &mut [u8; 16],
    data: &mut [u8],
) -> Result<(), CipherError> {
    if !data.len().is_multiple_of(AES_BLOCK_SIZE) {
        return Err(CipherError::UnalignedLength(data.len()));
    }
    if data.is_empty() {
        return Ok(());
    }

    let len = data.len();
    Aes128CbcEnc::new(key.into(), (&*iv).into())
        .encrypt_padded_mut::<NoPadding>(data, len)
        .map_err(|_| CipherError::Aes("cbc encrypt failed"))?;

    iv.copy_from_slice(&data[len - AES_BLOCK_SIZE..]);
    Ok(())
}

/// AES-128-CBC decrypt in-place and advance `iv` to the last ciphertext block.
pub fn decrypt_chained(
    key: &[u8; 16],
    iv: &mut [u8; 16],
    data: &mut [u8],
) -> Result<(), CipherError> {
    if !data.len().is_multiple_of(AES_BLOCK_SIZE) {
        return Err(CipherError::UnalignedLength(data.len()));
    }
    if data.is_empty() {
        return Ok(());
    }

    let mut next_iv = [0u8; 16];
    next_iv.copy_from_slice(&data[data.len() - AES_BLOCK_SIZE..]);

    Aes128CbcDec::new(key.into(), (&*iv).into())
        .decrypt_padded_mut::<NoPadding>(data)
        .map_err(|_| CipherError::Aes("cbc decrypt failed"))?;

    *iv = next_iv;
    Ok(())
}

/// Software stand-in for the console's SD-key cipher.
#[derive(Debug, Clone)]
pub struct SdCipher {
    key: [u8; 16],
}

impl Default for SdCipher {
    fn default() -> Self {
        Self::new()
    }
}

impl SdCipher {
    /// Cipher keyed with [`SD_KEY`].
    pub const fn new() -> Self {
        Self { key: SD_KEY }
    }

    /// Cipher keyed with an arbitrary 128-bit key.
    pub const fn with_key(key: [u8; 16]) -> Self {
        Self { key }
    }

    pub fn encrypt(&self, iv: &mut [u8; 16], data: &mut [u8]) -> Result<(), CipherError> {
        encrypt_chained(&self.key, iv, data)
    }

    pub fn decrypt(&self, iv: &mut [u8; 16], data: &mut [u8]) -> Result<(), CipherError> {
        decrypt_chained(&self.key, iv, data)
    }
}
