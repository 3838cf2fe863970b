//! DES-ECB encryption for the blackbox payload.

use des::cipher::generic_array::GenericArray;
use des::cipher::{BlockDecrypt, BlockEncrypt, KeyInit};
use des::Des;

use crate::error::{Result, SnareError};

/// DES block size in bytes.
pub const DES_BLOCK_SIZE: usize = 8;

fn new_cipher(key: &[u8]) -> Result<Des> {
    Des::new_from_slice(key).map_err(|e| {
        SnareError::Encryption(format!("invalid DES key of {} bytes: {}", key.len(), e))
    })
}

/// Encrypt plaintext using single DES in ECB mode with null-byte padding.
///
/// The input is padded with zero bytes up to the next 8-byte boundary; input
/// that is already aligned gets no extra block. Each block is encrypted
/// independently, there is no IV.
///
/// # Arguments
/// * `key` - 8-byte DES key
/// * `plaintext` - Serialized payload
///
/// # Returns
/// Encrypted bytes, or `SnareError::Encryption` if the key has the wrong length
pub fn encrypt_des_ecb(key: &[u8], plaintext: &[u8]) -> Result<Vec<u8>> {
    let cipher = new_cipher(key)?;

    let mut output = plaintext.to_vec();
    let tail = output.len() % DES_BLOCK_SIZE;
    if tail != 0 {
        output.resize(output.len() + DES_BLOCK_SIZE - tail, 0);
    }

    for chunk in output.chunks_exact_mut(DES_BLOCK_SIZE) {
        cipher.encrypt_block(GenericArray::from_mut_slice(chunk));
    }

    Ok(output)
}

/// Decrypt DES-ECB ciphertext. Zero padding is left in place.
pub fn decrypt_des_ecb(key: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>> {
    let cipher = new_cipher(key)?;

    if ciphertext.len() % DES_BLOCK_SIZE != 0 {
        return Err(SnareError::Encryption(format!(
            "ciphertext length {} is not a multiple of {}",
            ciphertext.len(),
            DES_BLOCK_SIZE
        )));
    }

    let mut output = ciphertext.to_vec();
    for chunk in output.chunks_exact_mut(DES_BLOCK_SIZE) {
        cipher.decrypt_block(GenericArray::from_mut_slice(chunk));
    }

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::{engine::general_purpose::STANDARD, Engine as _};

    const KEY: [u8; 8] = [0x7c, 0x4c, 0x45, 0x00, 0x63, 0x02, 0xc8, 0xa3];

    #[test]
    fn test_des_known_answer() {
        let aligned = encrypt_des_ecb(&KEY, b"hello123").unwrap();
        assert_eq!(STANDARD.encode(&aligned), "OW+ZioPFKgs=");

        let padded = encrypt_des_ecb(&KEY, b"hello").unwrap();
        assert_eq!(STANDARD.encode(&padded), "7sJxLmsAxdU=");
    }

    #[test]
    fn test_aligned_input_gets_no_padding() {
        let plaintext = b"0123456789abcdef";
        let encrypted = encrypt_des_ecb(&KEY, plaintext).unwrap();
        assert_eq!(encrypted.len(), 16);

        let decrypted = decrypt_des_ecb(&KEY, &encrypted).unwrap();
        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn test_unaligned_input_is_zero_padded() {
        let plaintext = b"snare blackbox";
        let encrypted = encrypt_des_ecb(&KEY, plaintext).unwrap();
        assert_eq!(encrypted.len(), 16);

        let decrypted = decrypt_des_ecb(&KEY, &encrypted).unwrap();
        assert_eq!(&decrypted[..plaintext.len()], plaintext);
        assert!(decrypted[plaintext.len()..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_ecb_blocks_are_independent() {
        let encrypted = encrypt_des_ecb(&KEY, b"hello123hello123").unwrap();
        assert_eq!(encrypted[..8], encrypted[8..]);
    }

    #[test]
    fn test_empty_plaintext() {
        assert!(encrypt_des_ecb(&KEY, b"").unwrap().is_empty());
    }

    #[test]
    fn test_wrong_key_length() {
        assert!(matches!(
            encrypt_des_ecb(&KEY[..7], b"hello"),
            Err(SnareError::Encryption(_))
        ));
        assert!(decrypt_des_ecb(&KEY, &[0u8; 5]).is_err());
    }
}
