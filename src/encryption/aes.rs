//! AES-128-CBC for the AESV2 crypt filter.
//!
//! Strings and streams are encrypted with PKCS#7 padding and a random
//! 16-byte IV prepended to the ciphertext.
//!
//! PDF Spec: Section 7.6.2 - General Encryption Algorithm

use aes::cipher::block_padding::NoPadding;
use aes::cipher::{BlockEncryptMut, KeyIvInit};
use aes::Aes128;

type Aes128CbcEnc = cbc::Encryptor<Aes128>;

const BLOCK: usize = 16;

/// Encrypt with AES-128-CBC and PKCS#7 padding.
pub fn aes128_encrypt(key: &[u8], iv: &[u8; BLOCK], data: &[u8]) -> Result<Vec<u8>, &'static str> {
    if key.len() != BLOCK {
        return Err("AES-128 key must be 16 bytes");
    }

    let padding = BLOCK - data.len() % BLOCK;
    let mut buffer = data.to_vec();
    buffer.resize(data.len() + padding, padding as u8);

    let len = buffer.len();
    Aes128CbcEnc::new(key.into(), iv[..].into())
        .encrypt_padded_mut::<NoPadding>(&mut buffer, len)
        .map_err(|_| "AES encryption failed")?;
    Ok(buffer)
}

/// Decrypt AES-128-CBC data and strip PKCS#7 padding.
#[cfg(test)]
pub fn aes128_decrypt(key: &[u8], iv: &[u8], data: &[u8]) -> Result<Vec<u8>, &'static str> {
    use aes::cipher::BlockDecryptMut;

    if key.len() != BLOCK || iv.len() != BLOCK {
        return Err("AES-128 key and IV must be 16 bytes");
    }
    if data.is_empty() || data.len() % BLOCK != 0 {
        return Err("Ciphertext length must be a non-zero multiple of 16");
    }

    let mut buffer = data.to_vec();
    let plain = cbc::Decryptor::<Aes128>::new(key.into(), iv.into())
        .decrypt_padded_mut::<NoPadding>(&mut buffer)
        .map_err(|_| "AES decryption failed")?;

    let padding = *plain.last().ok_or("empty plaintext")? as usize;
    if padding == 0 || padding > BLOCK || plain[plain.len() - padding..].iter().any(|&b| b as usize != padding) {
        return Err("Invalid PKCS#7 padding");
    }
    Ok(plain[..plain.len() - padding].to_vec())
}
