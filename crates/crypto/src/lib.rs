//! `cmkit-crypto` implements the handful of ciphers, digests and checksums
//! found in Broadcom cable modem firmwares and their settings files.
//!
//! The block ciphers intentionally process only whole blocks; a partial
//! trailing block is passed through unchanged, which is what the firmwares
//! themselves do. Padding is a separate, explicit step (see [`Padding`]),
//! because the settings file formats mix and match padding schemes and
//! ciphers freely.

#![warn(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(rustdoc::private_intra_doc_links)]
#![deny(rustdoc::invalid_codeblock_attributes)]
#![deny(rustdoc::invalid_rust_codeblocks)]

mod checksum;
mod padding;

use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockDecrypt, BlockEncrypt, KeyInit};
use aes::{Aes128, Aes256};
use des::{Des, TdesEde3};
use md5::{Digest, Md5};
use miette::Diagnostic;
use thiserror::Error;

pub use checksum::{crc16_ccitt, crc32};
pub use padding::Padding;

/// Errors reported by the cipher routines.
#[derive(Debug, Diagnostic, Error)]
pub enum Error {
    /// The key size does not match the algorithm.
    #[error("invalid key size {size} for algorithm {algo}")]
    #[diagnostic(
        code(E005),
        help("Keys are given in hex; an AES-256 key is 64 hex digits, a DES key 16.")
    )]
    InvalidKeySize {
        /// Algorithm name.
        algo: &'static str,
        /// The offending key size, in bytes.
        size: usize,
    },
}

fn check_keysize(key: &[u8], size: usize, algo: &'static str) -> Result<(), Error> {
    if key.len() != size {
        Err(Error::InvalidKeySize { algo, size: key.len() })
    } else {
        Ok(())
    }
}

/// Apply `f` to every whole `BLOCK`-sized chunk of `buf`, leaving a partial
/// tail untouched.
fn crypt_generic_ecb<const BLOCK: usize>(
    buf: &[u8],
    mut f: impl FnMut(&mut [u8; BLOCK]),
) -> Vec<u8> {
    let mut out = buf.to_vec();

    for chunk in out.chunks_exact_mut(BLOCK) {
        let block: &mut [u8; BLOCK] = chunk.try_into().expect("chunks_exact yields BLOCK bytes");
        f(block);
    }

    out
}

/// MD5 digest of `buf`.
pub fn hash_md5(buf: &[u8]) -> [u8; 16] {
    let mut md5 = Md5::new();
    md5.update(buf);
    md5.finalize().into()
}

/// AES-256 in ECB mode. `key` is 32 bytes.
pub fn crypt_aes_256_ecb(buf: &[u8], key: &[u8], encrypt: bool) -> Result<Vec<u8>, Error> {
    check_keysize(key, 32, "aes-256-ecb")?;

    let aes = Aes256::new_from_slice(key).expect("key size checked above");

    Ok(crypt_generic_ecb::<16>(buf, |block| {
        if encrypt {
            aes.encrypt_block(GenericArray::from_mut_slice(block));
        } else {
            aes.decrypt_block(GenericArray::from_mut_slice(block));
        }
    }))
}

/// AES-128 in CBC mode. `key` is 32 bytes: the 16-byte key followed by the
/// 16-byte initialization vector.
pub fn crypt_aes_128_cbc(buf: &[u8], key: &[u8], encrypt: bool) -> Result<Vec<u8>, Error> {
    check_keysize(key, 32, "aes-128-cbc")?;

    let aes = Aes128::new_from_slice(&key[..16]).expect("key size checked above");
    let mut iv: [u8; 16] = key[16..].try_into().expect("key size checked above");

    Ok(crypt_generic_ecb::<16>(buf, |block| {
        if encrypt {
            for (b, v) in block.iter_mut().zip(iv.iter()) {
                *b ^= v;
            }
            aes.encrypt_block(GenericArray::from_mut_slice(block));
            iv = *block;
        } else {
            let carry = *block;
            aes.decrypt_block(GenericArray::from_mut_slice(block));
            for (b, v) in block.iter_mut().zip(iv.iter()) {
                *b ^= v;
            }
            iv = carry;
        }
    }))
}

/// Single DES in ECB mode. `key` is 8 bytes.
pub fn crypt_des_ecb(buf: &[u8], key: &[u8], encrypt: bool) -> Result<Vec<u8>, Error> {
    check_keysize(key, 8, "des-ecb")?;

    let des = Des::new_from_slice(key).expect("key size checked above");

    Ok(crypt_generic_ecb::<8>(buf, |block| {
        if encrypt {
            des.encrypt_block(GenericArray::from_mut_slice(block));
        } else {
            des.decrypt_block(GenericArray::from_mut_slice(block));
        }
    }))
}

/// Triple DES (EDE3) in ECB mode. `key` is 24 bytes.
pub fn crypt_3des_ecb(buf: &[u8], key: &[u8], encrypt: bool) -> Result<Vec<u8>, Error> {
    check_keysize(key, 24, "3des-ecb")?;

    let des = TdesEde3::new_from_slice(key).expect("key size checked above");

    Ok(crypt_generic_ecb::<8>(buf, |block| {
        if encrypt {
            des.encrypt_block(GenericArray::from_mut_slice(block));
        } else {
            des.decrypt_block(GenericArray::from_mut_slice(block));
        }
    }))
}

/// XOR every byte with a single-byte key. Its own inverse.
pub fn crypt_xor(buf: &[u8], key: &[u8]) -> Result<Vec<u8>, Error> {
    check_keysize(key, 1, "xor")?;

    Ok(buf.iter().map(|b| b ^ key[0]).collect())
}

/// The "Motorola" pseudo-random keystream cipher, as found on Surfboard
/// devices. `key` is the single-byte PRNG seed. Its own inverse.
pub fn crypt_motorola(buf: &[u8], key: &[u8]) -> Result<Vec<u8>, Error> {
    check_keysize(key, 1, "motorola")?;

    let mut state = u32::from(key[0]);

    Ok(buf
        .iter()
        .map(|b| {
            let r = rand_motorola(&mut state);
            // the firmware does this in floating point
            let x = ((f64::from(r) / f64::from(0x7fffffffu32)) * 255.0) as u32 + 1;
            b ^ (x as u8)
        })
        .collect())
}

// Three rounds of the LCG `next = next * 0x41c64e6d + 0x3039`, composed into
// a 31-bit output.
fn rand_motorola(state: &mut u32) -> u32 {
    let mut next = *state;
    let mut result;

    next = next.wrapping_mul(0x41c6_4e6d).wrapping_add(0x3039);
    result = next & 0xffe0_0000;

    next = next.wrapping_mul(0x41c6_4e6d).wrapping_add(0x3039);
    result = result.wrapping_add((next & 0xfffc_0000) >> 11);

    next = next.wrapping_mul(0x41c6_4e6d).wrapping_add(0x3039);
    result = result.wrapping_add(next >> 25) & 0x7fff_ffff;

    *state = next;
    result
}

/// The 16×16 substitution "cipher": byte `i` of each whole 16-byte block is
/// offset by `(i / 16) * 16 + (i % 16 & !1)`, subtracting on encryption and
/// adding on decryption.
pub fn crypt_sub_16x16(buf: &[u8], encrypt: bool) -> Vec<u8> {
    let mut out = buf.to_vec();
    let whole = (out.len() / 16) * 16;

    for (i, b) in out.iter_mut().take(whole).enumerate() {
        let k = (((i / 16) * 16) + (i % 16 & !1)) as u8;
        *b = if encrypt { b.wrapping_sub(k) } else { b.wrapping_add(k) };
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_md5() {
        // RFC 1321 test vector
        assert_eq!(hex::encode(hash_md5(b"abc")), "900150983cd24fb0d6963f7d28e17f72");
    }

    #[test]
    fn test_aes_256_ecb() {
        // FIPS-197 appendix C.3
        let key = hex::decode("000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f")
            .unwrap();
        let plain = hex::decode("00112233445566778899aabbccddeeff").unwrap();
        let cipher = crypt_aes_256_ecb(&plain, &key, true).unwrap();

        assert_eq!(hex::encode(&cipher), "8ea2b7ca516745bfeafc49904b496089");
        assert_eq!(crypt_aes_256_ecb(&cipher, &key, false).unwrap(), plain);
    }

    #[test]
    fn test_partial_tail_is_passed_through() {
        let key = [0u8; 32];
        let buf = [0x41u8; 21];
        let out = crypt_aes_256_ecb(&buf, &key, true).unwrap();

        assert_eq!(out.len(), buf.len());
        assert_eq!(&out[16..], &buf[16..]);
        assert_ne!(&out[..16], &buf[..16]);
    }

    #[test]
    fn test_bad_key_size() {
        assert!(matches!(
            crypt_des_ecb(b"x", b"too long for des", true),
            Err(Error::InvalidKeySize { algo: "des-ecb", size: 16 })
        ));
    }

    #[test]
    fn test_xor_round_trip() {
        let buf = b"hello, world";
        let enc = crypt_xor(buf, &[0x80]).unwrap();

        assert_ne!(enc.as_slice(), buf);
        assert_eq!(crypt_xor(&enc, &[0x80]).unwrap(), buf);
    }

    #[test]
    fn test_motorola_round_trip() {
        let buf: Vec<u8> = (0u8..=255).collect();
        let enc = crypt_motorola(&buf, &[0x42]).unwrap();

        assert_ne!(enc, buf);
        assert_eq!(crypt_motorola(&enc, &[0x42]).unwrap(), buf);
    }

    #[test]
    fn test_motorola_keystream_differs_per_position() {
        let zeros = [0u8; 8];
        let stream = crypt_motorola(&zeros, &[0]).unwrap();

        // with an all-zero input, the output is the keystream itself
        assert!(stream.windows(2).any(|w| w[0] != w[1]));
    }

    #[test]
    fn test_sub_16x16_round_trip() {
        let buf: Vec<u8> = (0u8..48).chain(0..5).collect();
        let enc = crypt_sub_16x16(&buf, true);

        assert_eq!(enc.len(), buf.len());
        // tail beyond the last whole block is untouched
        assert_eq!(&enc[48..], &buf[48..]);
        assert_eq!(crypt_sub_16x16(&enc, false), buf);
    }

    #[test]
    fn test_3des_degenerates_to_des() {
        // with K1 == K2 == K3, 3DES equals single DES
        let key8 = *b"\x01\x23\x45\x67\x89\xab\xcd\xef";
        let key24: Vec<u8> = key8.iter().cycle().take(24).copied().collect();
        let plain = b"the quick brown fox jumps over.."; // 32 bytes

        assert_eq!(
            crypt_3des_ecb(plain, &key24, true).unwrap(),
            crypt_des_ecb(plain, &key8, true).unwrap()
        );
    }
}
