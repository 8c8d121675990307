//! Key derivation for the MD5-based handlers (RC4 V1/V2 and AES-128),
//! following Algorithms 2, 3, 4 and 5 of the standard security handler.

use md5::{Digest, Md5};

use crate::encrypt::rc4::rc4;
use crate::object::Reference;

/// The 32-byte padding constant applied to user and owner passwords.
pub const PASSWORD_PAD: [u8; 32] = [
    0x28, 0xBF, 0x4E, 0x5E, 0x4E, 0x75, 0x8A, 0x41, 0x64, 0x00, 0x4E, 0x56, 0xFF, 0xFA, 0x01,
    0x08, 0x2E, 0x2E, 0x00, 0xB6, 0xD0, 0x68, 0x3E, 0x80, 0x2F, 0x0C, 0xA9, 0xFE, 0x64, 0x53,
    0x69, 0x7A,
];

pub fn md5(parts: &[&[u8]]) -> [u8; 16] {
    let mut hash = Md5::new();
    for part in parts {
        hash.update(part);
    }
    hash.finalize().into()
}

/// Truncate to 32 bytes or fill up from the padding constant.
pub fn pad_password(password: &[u8]) -> [u8; 32] {
    let mut out = [0u8; 32];
    let n = password.len().min(32);
    out[..n].copy_from_slice(&password[..n]);
    out[n..].copy_from_slice(&PASSWORD_PAD[..32 - n]);
    out
}

/// Algorithm 3: the `/O` value. With `recover` set the iteration counters
/// run backwards, which turns the computation into recovery of the padded
/// user password from `/O` during owner-password authentication.
pub fn owner_value(
    user_pad: &[u8; 32],
    owner_pad: &[u8; 32],
    key_len: usize,
    revision: i32,
    recover: bool,
) -> [u8; 32] {
    let mut digest = md5(&[owner_pad]);
    if revision >= 3 {
        for _ in 0..50 {
            digest = md5(&[&digest[..key_len]]);
        }
        let mut out = *user_pad;
        let mut step_key = vec![0u8; key_len];
        for i in 0..20u8 {
            let round = if recover { 19 - i } else { i };
            for (j, k) in step_key.iter_mut().enumerate() {
                *k = digest[j] ^ round;
            }
            out = rc4(&step_key, &out).try_into().expect("rc4 keeps length");
        }
        out
    } else {
        rc4(&digest[..5], user_pad)
            .try_into()
            .expect("rc4 keeps length")
    }
}

/// Algorithm 2: the file encryption key.
pub fn file_key(
    doc_id: &[u8],
    user_pad: &[u8; 32],
    owner_value: &[u8; 32],
    p: i32,
    key_len: usize,
    revision: i32,
    encrypt_metadata: bool,
) -> Vec<u8> {
    let mut hash = Md5::new();
    hash.update(user_pad);
    hash.update(owner_value);
    hash.update(p.to_le_bytes());
    hash.update(doc_id);
    if !encrypt_metadata {
        hash.update([0xFF, 0xFF, 0xFF, 0xFF]);
    }
    let mut digest: [u8; 16] = hash.finalize().into();
    if revision >= 3 {
        for _ in 0..50 {
            digest = md5(&[&digest[..key_len]]);
        }
    }
    digest[..key_len].to_vec()
}

/// Algorithms 4 and 5: the `/U` value.
pub fn user_value(file_key: &[u8], doc_id: &[u8], revision: i32) -> [u8; 32] {
    if revision >= 3 {
        let digest = md5(&[&PASSWORD_PAD, doc_id]);
        let mut block = rc4(file_key, &digest);
        let mut step_key = vec![0u8; file_key.len()];
        for i in 1..=19u8 {
            for (j, k) in step_key.iter_mut().enumerate() {
                *k = file_key[j] ^ i;
            }
            block = rc4(&step_key, &block);
        }
        let mut out = [0u8; 32];
        out[..16].copy_from_slice(&block);
        out
    } else {
        rc4(file_key, &PASSWORD_PAD)
            .try_into()
            .expect("rc4 keeps length")
    }
}

/// The per-object key: MD5 over the file key, the low three bytes of the
/// object number, the low two bytes of the generation, and - for AES - the
/// fixed salt. Truncated to `min(key_len + 5, 16)` bytes.
pub fn object_key(file_key: &[u8], id: Reference, aes: bool) -> Vec<u8> {
    let mut hash = Md5::new();
    hash.update(file_key);
    hash.update(&id.number.to_le_bytes()[..3]);
    hash.update(&id.generation.to_le_bytes()[..2]);
    if aes {
        hash.update(b"sAlT");
    }
    let digest: [u8; 16] = hash.finalize().into();
    let len = (file_key.len() + 5).min(16);
    digest[..len].to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_password_pads_to_the_constant() {
        assert_eq!(pad_password(b""), PASSWORD_PAD);
    }

    #[test]
    fn long_password_is_truncated() {
        let long = [b'x'; 40];
        assert_eq!(pad_password(&long), [b'x'; 32]);
    }

    #[test]
    fn partial_password_keeps_prefix() {
        let padded = pad_password(b"user");
        assert_eq!(&padded[..4], b"user");
        assert_eq!(&padded[4..], &PASSWORD_PAD[..28]);
    }

    #[test]
    fn owner_value_recovers_user_password() {
        let user_pad = pad_password(b"user-secret");
        let owner_pad = pad_password(b"owner-secret");
        for revision in [2, 3] {
            let o = owner_value(&user_pad, &owner_pad, 16, revision, false);
            let recovered = owner_value(&o, &owner_pad, 16, revision, true);
            assert_eq!(recovered, user_pad, "revision {revision}");
        }
    }

    #[test]
    fn file_key_length_follows_revision() {
        let user_pad = pad_password(b"");
        let o = [0u8; 32];
        let id = [0xAB; 16];
        let key40 = file_key(&id, &user_pad, &o, -3904, 5, 2, true);
        assert_eq!(key40.len(), 5);
        let key128 = file_key(&id, &user_pad, &o, -3904, 16, 3, true);
        assert_eq!(key128.len(), 16);
        assert_ne!(key128[..5], key40[..]);
    }

    #[test]
    fn metadata_flag_changes_the_key() {
        let user_pad = pad_password(b"");
        let o = [7u8; 32];
        let id = [1u8; 16];
        let with = file_key(&id, &user_pad, &o, -4, 16, 4, true);
        let without = file_key(&id, &user_pad, &o, -4, 16, 4, false);
        assert_ne!(with, without);
    }

    #[test]
    fn object_key_is_salted_and_truncated() {
        let fk = [0u8; 16];
        let id = Reference::new(7, 0);
        let key = object_key(&fk, id, true);
        // min(16 + 5, 16) = 16
        assert_eq!(key.len(), 16);
        let expected: [u8; 16] = md5(&[&fk, &[7, 0, 0], &[0, 0], b"sAlT"]);
        assert_eq!(key, expected[..16]);
        // Unsalted differs.
        assert_ne!(object_key(&fk, id, false), key);
    }

    #[test]
    fn object_key_for_40_bit_keys_is_10_bytes() {
        let fk = [3u8; 5];
        let key = object_key(&fk, Reference::new(1, 0), false);
        assert_eq!(key.len(), 10);
    }

    #[test]
    fn neighbouring_objects_get_distinct_keys() {
        let fk = [9u8; 16];
        let a = object_key(&fk, Reference::new(7, 0), false);
        let b = object_key(&fk, Reference::new(8, 0), false);
        let c = object_key(&fk, Reference::new(7, 1), false);
        assert_ne!(a, b);
        assert_ne!(a, c);
    }
}
