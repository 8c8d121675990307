//! AES-256 (V5/R5) key derivation per PDF 1.7 Adobe Extension Level 3.
//!
//! Passwords are SASLprep-processed and truncated to 127 bytes. `/U` and
//! `/O` are SHA-256 digests with trailing validation and key salts; `/UE`
//! and `/OE` hold the file key wrapped with AES-256-CBC (zero IV, no
//! padding); `/Perms` is the permission block under AES-256-ECB.

use aes::Aes256;
use aes::cipher::block_padding::NoPadding;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyInit, KeyIvInit};
use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::core::{ErrorKind, PdfError, Result};
use crate::encrypt::{AesHandler, AuthLevel};

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;
type Aes256EcbEnc = ecb::Encryptor<Aes256>;
type Aes256EcbDec = ecb::Decryptor<Aes256>;

const ZERO_IV: [u8; 16] = [0; 16];

fn sha256(parts: &[&[u8]]) -> [u8; 32] {
    let mut hash = Sha256::new();
    for part in parts {
        hash.update(part);
    }
    hash.finalize().into()
}

/// SASLprep, then truncate to 127 bytes.
fn preprocess_password(password: &str) -> Result<Vec<u8>> {
    let prepared = stringprep::saslprep(password).map_err(|e| {
        PdfError::new(
            ErrorKind::InvalidPassword,
            format!("SASLprep rejected the password: {e}"),
        )
    })?;
    let bytes = prepared.as_bytes();
    Ok(bytes[..bytes.len().min(127)].to_vec())
}

/// AES-256-CBC with zero IV and no padding; input must be a multiple of 16.
fn wrap_key(kek: &[u8; 32], data: &[u8]) -> Result<Vec<u8>> {
    let mut buf = data.to_vec();
    Aes256CbcEnc::new(kek.into(), (&ZERO_IV).into())
        .encrypt_padded_mut::<NoPadding>(&mut buf, data.len())
        .map_err(|_| PdfError::new(ErrorKind::InternalLogic, "key wrap length"))?;
    Ok(buf)
}

fn unwrap_key(kek: &[u8; 32], data: &[u8]) -> Result<Vec<u8>> {
    let mut buf = data.to_vec();
    Aes256CbcDec::new(kek.into(), (&ZERO_IV).into())
        .decrypt_padded_mut::<NoPadding>(&mut buf)
        .map_err(|_| PdfError::new(ErrorKind::InternalLogic, "key unwrap length"))?;
    Ok(buf)
}

impl AesHandler {
    pub(super) fn generate_keys_v3(&mut self) -> Result<()> {
        let user = preprocess_password(&self.user_password)?;
        let owner_plain = if self.owner_password.is_empty() {
            self.user_password.clone()
        } else {
            self.owner_password.clone()
        };
        let owner = preprocess_password(&owner_plain)?;

        let mut rng = rand::rng();
        let mut file_key = vec![0u8; 32];
        rng.fill_bytes(&mut file_key);
        self.file_key = file_key;

        // /U = SHA-256(password ++ validation salt) ++ both salts.
        let mut user_salts = [0u8; 16];
        rng.fill_bytes(&mut user_salts);
        let (v_salt, k_salt) = user_salts.split_at(8);
        let hash = sha256(&[&user, v_salt]);
        let mut u = Vec::with_capacity(48);
        u.extend_from_slice(&hash);
        u.extend_from_slice(v_salt);
        u.extend_from_slice(k_salt);
        self.u = u;

        // /UE wraps the file key under SHA-256(password ++ key salt).
        let kek = sha256(&[&user, k_salt]);
        self.ue = wrap_key(&kek, &self.file_key)?;

        // /O and /OE additionally hash the complete /U value.
        let mut owner_salts = [0u8; 16];
        rng.fill_bytes(&mut owner_salts);
        let (v_salt, k_salt) = owner_salts.split_at(8);
        let hash = sha256(&[&owner, v_salt, &self.u]);
        let mut o = Vec::with_capacity(48);
        o.extend_from_slice(&hash);
        o.extend_from_slice(v_salt);
        o.extend_from_slice(k_salt);
        self.o = o;

        let kek = sha256(&[&owner, k_salt, &self.u]);
        self.oe = wrap_key(&kek, &self.file_key)?;

        self.perms_value = self.build_perms_block()?;
        self.auth = Some(AuthLevel::Owner);
        Ok(())
    }

    fn build_perms_block(&self) -> Result<Vec<u8>> {
        let mut perms = [0u8; 16];
        perms[..4].copy_from_slice(&self.p.to_le_bytes());
        perms[4..8].copy_from_slice(&[0xFF; 4]);
        perms[8] = if self.encrypt_metadata { b'T' } else { b'F' };
        perms[9..12].copy_from_slice(b"adb");
        // Bytes 12..16 are ignored; left zero.
        let key: &[u8; 32] = self.file_key.as_slice().try_into().map_err(|_| {
            PdfError::new(ErrorKind::InternalLogic, "file key must be 32 bytes")
        })?;
        let mut buf = perms.to_vec();
        Aes256EcbEnc::new(key.into())
            .encrypt_padded_mut::<NoPadding>(&mut buf, 16)
            .map_err(|_| PdfError::new(ErrorKind::InternalLogic, "perms block length"))?;
        Ok(buf)
    }

    fn verify_perms_block(&self) -> Result<()> {
        let key: &[u8; 32] = self.file_key.as_slice().try_into().map_err(|_| {
            PdfError::new(ErrorKind::InternalLogic, "file key must be 32 bytes")
        })?;
        let mut buf = self.perms_value.clone();
        Aes256EcbDec::new(key.into())
            .decrypt_padded_mut::<NoPadding>(&mut buf)
            .map_err(|_| {
                PdfError::new(ErrorKind::InvalidEncryptionDict, "perms block length")
            })?;
        if &buf[9..12] != b"adb" {
            return Err(PdfError::new(
                ErrorKind::InvalidEncryptionDict,
                "/Perms does not decrypt to a permission block",
            ));
        }
        let recorded = i32::from_le_bytes(buf[..4].try_into().expect("four bytes"));
        if recorded != self.p {
            log::warn!("/Perms permissions {recorded} disagree with /P {}", self.p);
        }
        Ok(())
    }

    pub(super) fn authenticate_v3(&mut self, password: &str) -> Result<()> {
        let pswd = preprocess_password(password)?;
        if self.u.len() < 48 || self.o.len() < 48 {
            return Err(PdfError::new(
                ErrorKind::InvalidEncryptionDict,
                "/U and /O must be 48 bytes for revision 5",
            ));
        }

        // User password: SHA-256(password ++ validation salt) against U.
        let hash = sha256(&[&pswd, &self.u[32..40]]);
        if hash == self.u[..32] {
            let kek = sha256(&[&pswd, &self.u[40..48]]);
            self.file_key = unwrap_key(&kek, &self.ue)?;
            self.verify_perms_block()?;
            self.user_password = password.to_owned();
            self.auth = Some(AuthLevel::User);
            return Ok(());
        }

        // Owner password: the hashes take the complete /U as extra input.
        let hash = sha256(&[&pswd, &self.o[32..40], &self.u[..48]]);
        if hash == self.o[..32] {
            let kek = sha256(&[&pswd, &self.o[40..48], &self.u[..48]]);
            self.file_key = unwrap_key(&kek, &self.oe)?;
            self.verify_perms_block()?;
            self.owner_password = password.to_owned();
            self.auth = Some(AuthLevel::Owner);
            return Ok(());
        }

        Err(PdfError::new(ErrorKind::InvalidPassword, "wrong password"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encrypt::Permissions;

    #[test]
    fn password_preprocessing_truncates_at_127_bytes() {
        let long: String = "ä".repeat(200);
        let out = preprocess_password(&long).unwrap();
        assert!(out.len() <= 127);
    }

    #[test]
    fn key_wrap_roundtrip() {
        let kek = sha256(&[b"some kek input"]);
        let key = [0x5Au8; 32];
        let wrapped = wrap_key(&kek, &key).unwrap();
        assert_eq!(wrapped.len(), 32);
        assert_ne!(wrapped, key);
        assert_eq!(unwrap_key(&kek, &wrapped).unwrap(), key);
    }

    #[test]
    fn perms_block_records_flags_and_metadata() {
        let mut handler = AesHandler::new_v3("", "", Permissions::PRINT);
        handler.generate_keys_v3().unwrap();
        handler.verify_perms_block().unwrap();
        assert_eq!(handler.perms_value.len(), 16);
    }

    #[test]
    fn comparing_hash_is_over_first_32_bytes() {
        let mut handler = AesHandler::new_v3("pw", "", Permissions::all());
        handler.generate_keys_v3().unwrap();
        assert_eq!(handler.u.len(), 48);
        assert_eq!(handler.o.len(), 48);
        let mut other = AesHandler::v3_from_parts(
            handler.o.clone(),
            handler.oe.clone(),
            handler.u.clone(),
            handler.ue.clone(),
            handler.p,
            handler.perms_value.clone(),
        );
        other.authenticate_v3("pw").unwrap();
        assert_eq!(other.file_key, handler.file_key);
    }
}
