use crate::{ENCODED_LEN, KEY_LEN, NONCE_LEN, TAG_LEN};

#[cfg(feature = "crypto")]
use aes::Aes128;
#[cfg(feature = "crypto")]
use ccm::aead::generic_array::GenericArray;
#[cfg(feature = "crypto")]
use ccm::aead::{AeadInPlace, KeyInit};
#[cfg(feature = "crypto")]
use ccm::consts::{U13, U4};
#[cfg(feature = "crypto")]
use ccm::Ccm;

#[derive(Debug, PartialEq, Eq)]
pub enum CipherError {
    /// The cipher operation itself failed.
    EncryptFailed,
    /// Tag verification failed on open.
    AuthFailed,
}

/// Black-box AEAD primitive: AES-128-CCM shape, 13-byte nonce, 4-byte tag,
/// no associated data. The key travels per call so the nonce/key context
/// stays the single owner of the key material.
pub trait Aead {
    fn seal(
        &self,
        key: &[u8; KEY_LEN],
        nonce: &[u8; NONCE_LEN],
        plaintext: &[u8; ENCODED_LEN],
    ) -> Result<([u8; ENCODED_LEN], [u8; TAG_LEN]), CipherError>;

    fn open(
        &self,
        key: &[u8; KEY_LEN],
        nonce: &[u8; NONCE_LEN],
        ciphertext: &[u8; ENCODED_LEN],
        tag: &[u8; TAG_LEN],
    ) -> Result<[u8; ENCODED_LEN], CipherError>;
}

/// Deterministic, non-cryptographic AEAD for simulations and tests.
/// Ciphertext equals plaintext; the tag is a keyed mixing of all inputs.
pub struct DummyAead;

impl Aead for DummyAead {
    fn seal(
        &self,
        key: &[u8; KEY_LEN],
        nonce: &[u8; NONCE_LEN],
        plaintext: &[u8; ENCODED_LEN],
    ) -> Result<([u8; ENCODED_LEN], [u8; TAG_LEN]), CipherError> {
        Ok((*plaintext, mix_tag(key, nonce, plaintext)))
    }

    fn open(
        &self,
        key: &[u8; KEY_LEN],
        nonce: &[u8; NONCE_LEN],
        ciphertext: &[u8; ENCODED_LEN],
        tag: &[u8; TAG_LEN],
    ) -> Result<[u8; ENCODED_LEN], CipherError> {
        if mix_tag(key, nonce, ciphertext) == *tag {
            Ok(*ciphertext)
        } else {
            Err(CipherError::AuthFailed)
        }
    }
}

fn mix_tag(key: &[u8], nonce: &[u8], payload: &[u8]) -> [u8; TAG_LEN] {
    let mut state: u32 = 0x6B7F_3A21;
    for b in key.iter().chain(nonce).chain(payload) {
        state = state.rotate_left(7) ^ (*b as u32);
        state = state.wrapping_mul(0x9E37_79B9);
    }
    state.to_le_bytes()
}

#[cfg(feature = "crypto")]
type ButtonCcm = Ccm<Aes128, U4, U13>;

/// Real AES-128-CCM with the BTHome tag and nonce sizes.
#[cfg(feature = "crypto")]
pub struct CcmAead;

#[cfg(feature = "crypto")]
impl Aead for CcmAead {
    fn seal(
        &self,
        key: &[u8; KEY_LEN],
        nonce: &[u8; NONCE_LEN],
        plaintext: &[u8; ENCODED_LEN],
    ) -> Result<([u8; ENCODED_LEN], [u8; TAG_LEN]), CipherError> {
        let cipher = ButtonCcm::new(GenericArray::from_slice(key));
        let mut buf = *plaintext;
        let tag = cipher
            .encrypt_in_place_detached(GenericArray::from_slice(nonce), &[], &mut buf)
            .map_err(|_| CipherError::EncryptFailed)?;
        let mut tag_out = [0u8; TAG_LEN];
        tag_out.copy_from_slice(&tag);
        Ok((buf, tag_out))
    }

    fn open(
        &self,
        key: &[u8; KEY_LEN],
        nonce: &[u8; NONCE_LEN],
        ciphertext: &[u8; ENCODED_LEN],
        tag: &[u8; TAG_LEN],
    ) -> Result<[u8; ENCODED_LEN], CipherError> {
        let cipher = ButtonCcm::new(GenericArray::from_slice(key));
        let mut buf = *ciphertext;
        cipher
            .decrypt_in_place_detached(
                GenericArray::from_slice(nonce),
                &[],
                &mut buf,
                GenericArray::from_slice(tag),
            )
            .map_err(|_| CipherError::AuthFailed)?;
        Ok(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: [u8; KEY_LEN] = [0x11; KEY_LEN];
    const NONCE: [u8; NONCE_LEN] = [0x22; NONCE_LEN];
    const FRAME: [u8; ENCODED_LEN] = [0x00, 0x07, 0x3A, 0x04, 0x3A, 0x00, 0x3A, 0x02, 0x3A, 0x00];

    #[test]
    fn dummy_roundtrip_and_tamper() {
        let aead = DummyAead;
        let (ct, tag) = aead.seal(&KEY, &NONCE, &FRAME).unwrap();
        assert_eq!(aead.open(&KEY, &NONCE, &ct, &tag), Ok(FRAME));

        let mut bad_tag = tag;
        bad_tag[0] ^= 0xFF;
        assert_eq!(
            aead.open(&KEY, &NONCE, &ct, &bad_tag),
            Err(CipherError::AuthFailed)
        );
    }

    #[cfg(feature = "crypto")]
    #[test]
    fn ccm_known_vector() {
        // Cross-checked against an independent AES-CCM implementation
        // (tag_length=4, 13-byte nonce, no associated data).
        let aead = CcmAead;
        let (ct, tag) = aead.seal(&KEY, &NONCE, &FRAME).unwrap();
        assert_eq!(
            ct,
            [0xD2, 0x8D, 0xFE, 0xD6, 0x10, 0x44, 0xF3, 0xF8, 0x76, 0x70]
        );
        assert_eq!(tag, [0xCA, 0x4F, 0xF3, 0x06]);
    }

    #[cfg(feature = "crypto")]
    #[test]
    fn ccm_roundtrip_rejects_tamper() {
        let aead = CcmAead;
        let (ct, tag) = aead.seal(&KEY, &NONCE, &FRAME).unwrap();
        assert_eq!(aead.open(&KEY, &NONCE, &ct, &tag), Ok(FRAME));

        let mut bad_ct = ct;
        bad_ct[3] ^= 0x80;
        assert_eq!(
            aead.open(&KEY, &NONCE, &bad_ct, &tag),
            Err(CipherError::AuthFailed)
        );

        let wrong_key = [0x12; KEY_LEN];
        assert_eq!(
            aead.open(&wrong_key, &NONCE, &ct, &tag),
            Err(CipherError::AuthFailed)
        );
    }

    #[cfg(feature = "crypto")]
    #[test]
    fn ccm_deterministic_per_nonce() {
        let aead = CcmAead;
        let a = aead.seal(&KEY, &NONCE, &FRAME).unwrap();
        let b = aead.seal(&KEY, &NONCE, &FRAME).unwrap();
        assert_eq!(a, b);

        let mut other_nonce = NONCE;
        other_nonce[12] ^= 0x01;
        let c = aead.seal(&KEY, &other_nonce, &FRAME).unwrap();
        assert_ne!(a.0, c.0);
    }
}
