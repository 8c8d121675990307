//! AES-CBC block and streaming operation shared by the AES handlers.
//!
//! Streams and strings carry a fresh 16-byte IV in front of the ciphertext;
//! the payload is PKCS#7 padded. The streaming decryptor runs the explicit
//! `AwaitingIv -> Streaming -> AwaitingFinal` progression: it holds back the
//! final block until `finish` so padding can be stripped without knowing the
//! length up front.

use aes::cipher::block_padding::Pkcs7;
use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use rand::RngCore;

use crate::core::{ErrorKind, PdfError, Result};
use crate::filter::Sink;

pub const AES_BLOCK: usize = 16;
pub const AES_IV_LEN: usize = 16;

type Aes128CbcEnc = cbc::Encryptor<aes::Aes128>;
type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;
#[cfg(feature = "aes256")]
type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
#[cfg(feature = "aes256")]
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

fn bad_key_len(len: usize) -> PdfError {
    PdfError::new(
        ErrorKind::InternalLogic,
        format!("invalid AES key length {len}"),
    )
}

enum CbcEnc {
    A128(Aes128CbcEnc),
    #[cfg(feature = "aes256")]
    A256(Aes256CbcEnc),
}

impl CbcEnc {
    fn new(key: &[u8], iv: &[u8]) -> Result<Self> {
        match key.len() {
            16 => Ok(CbcEnc::A128(
                Aes128CbcEnc::new_from_slices(key, iv).map_err(|_| bad_key_len(key.len()))?,
            )),
            #[cfg(feature = "aes256")]
            32 => Ok(CbcEnc::A256(
                Aes256CbcEnc::new_from_slices(key, iv).map_err(|_| bad_key_len(key.len()))?,
            )),
            other => Err(bad_key_len(other)),
        }
    }

    fn encrypt_block(&mut self, block: &mut [u8; AES_BLOCK]) {
        let block = GenericArray::from_mut_slice(block);
        match self {
            CbcEnc::A128(c) => c.encrypt_block_mut(block),
            #[cfg(feature = "aes256")]
            CbcEnc::A256(c) => c.encrypt_block_mut(block),
        }
    }
}

enum CbcDec {
    A128(Aes128CbcDec),
    #[cfg(feature = "aes256")]
    A256(Aes256CbcDec),
}

impl CbcDec {
    fn new(key: &[u8], iv: &[u8]) -> Result<Self> {
        match key.len() {
            16 => Ok(CbcDec::A128(
                Aes128CbcDec::new_from_slices(key, iv).map_err(|_| bad_key_len(key.len()))?,
            )),
            #[cfg(feature = "aes256")]
            32 => Ok(CbcDec::A256(
                Aes256CbcDec::new_from_slices(key, iv).map_err(|_| bad_key_len(key.len()))?,
            )),
            other => Err(bad_key_len(other)),
        }
    }

    fn decrypt_block(&mut self, block: &mut [u8; AES_BLOCK]) {
        let block = GenericArray::from_mut_slice(block);
        match self {
            CbcDec::A128(c) => c.decrypt_block_mut(block),
            #[cfg(feature = "aes256")]
            CbcDec::A256(c) => c.decrypt_block_mut(block),
        }
    }
}

pub fn random_iv() -> [u8; AES_IV_LEN] {
    let mut iv = [0u8; AES_IV_LEN];
    rand::rng().fill_bytes(&mut iv);
    iv
}

/// Encrypt with PKCS#7 padding, prepending a fresh IV.
pub fn encrypt_with_iv(key: &[u8], plain: &[u8]) -> Result<Vec<u8>> {
    let iv = random_iv();
    let padded_len = (plain.len() / AES_BLOCK + 1) * AES_BLOCK;
    let mut out = Vec::with_capacity(AES_IV_LEN + padded_len);
    out.extend_from_slice(&iv);
    let mut buf = vec![0u8; padded_len];
    buf[..plain.len()].copy_from_slice(plain);
    let pad_err = || PdfError::new(ErrorKind::InternalLogic, "AES pad error");
    let ct_len = match CbcEnc::new(key, &iv)? {
        CbcEnc::A128(c) => c
            .encrypt_padded_mut::<Pkcs7>(&mut buf, plain.len())
            .map_err(|_| pad_err())?
            .len(),
        #[cfg(feature = "aes256")]
        CbcEnc::A256(c) => c
            .encrypt_padded_mut::<Pkcs7>(&mut buf, plain.len())
            .map_err(|_| pad_err())?
            .len(),
    };
    buf.truncate(ct_len);
    out.extend_from_slice(&buf);
    Ok(out)
}

/// Decrypt data laid out as IV followed by padded ciphertext. Empty and
/// IV-only inputs decrypt to nothing.
pub fn decrypt_with_iv(key: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    if data.len() <= AES_IV_LEN {
        return Ok(Vec::new());
    }
    let (iv, cipher_text) = data.split_at(AES_IV_LEN);
    if cipher_text.len() % AES_BLOCK != 0 {
        return Err(PdfError::new(
            ErrorKind::InvalidEncoding,
            "AES ciphertext length is not a multiple of the block size",
        ));
    }
    let mut buf = cipher_text.to_vec();
    let cipher = CbcDec::new(key, iv)?;
    let plain_len = match cipher {
        CbcDec::A128(c) => c
            .decrypt_padded_mut::<Pkcs7>(&mut buf)
            .map_err(|_| PdfError::new(ErrorKind::InvalidEncoding, "bad AES padding"))?
            .len(),
        #[cfg(feature = "aes256")]
        CbcDec::A256(c) => c
            .decrypt_padded_mut::<Pkcs7>(&mut buf)
            .map_err(|_| PdfError::new(ErrorKind::InvalidEncoding, "bad AES padding"))?
            .len(),
    };
    buf.truncate(plain_len);
    Ok(buf)
}

/// On-disk length of an encrypted payload: IV plus PKCS#7-padded data.
pub fn encrypted_len(plain_len: usize) -> usize {
    AES_IV_LEN + (plain_len / AES_BLOCK + 1) * AES_BLOCK
}

/// Streaming encryptor: emits the IV, then ciphertext block by block,
/// padding at `finish`.
pub struct AesEncryptSink {
    next: Box<dyn Sink>,
    key: Vec<u8>,
    cipher: Option<CbcEnc>,
    pending: Vec<u8>,
}

impl AesEncryptSink {
    pub fn new(key: &[u8], next: Box<dyn Sink>) -> Self {
        AesEncryptSink {
            next,
            key: key.to_vec(),
            cipher: None,
            pending: Vec::with_capacity(AES_BLOCK),
        }
    }

    fn cipher(&mut self) -> Result<&mut CbcEnc> {
        if self.cipher.is_none() {
            let iv = random_iv();
            self.next.write(&iv)?;
            self.cipher = Some(CbcEnc::new(&self.key, &iv)?);
        }
        Ok(self.cipher.as_mut().expect("just initialised"))
    }
}

impl Sink for AesEncryptSink {
    fn write(&mut self, data: &[u8]) -> Result<()> {
        self.pending.extend_from_slice(data);
        if self.pending.len() < AES_BLOCK {
            return Ok(());
        }
        let full = self.pending.len() / AES_BLOCK * AES_BLOCK;
        let mut blocks = std::mem::take(&mut self.pending);
        self.pending = blocks.split_off(full);
        self.cipher()?;
        for chunk in blocks.chunks_exact_mut(AES_BLOCK) {
            let block: &mut [u8; AES_BLOCK] = chunk.try_into().expect("exact chunk");
            self.cipher.as_mut().expect("initialised above").encrypt_block(block);
        }
        self.next.write(&blocks)
    }

    fn finish(&mut self) -> Result<()> {
        self.cipher()?;
        let fill = AES_BLOCK - self.pending.len() % AES_BLOCK;
        let mut block = [0u8; AES_BLOCK];
        block[..self.pending.len()].copy_from_slice(&self.pending);
        for slot in &mut block[self.pending.len()..] {
            *slot = fill as u8;
        }
        self.pending.clear();
        self.cipher.as_mut().expect("initialised above").encrypt_block(&mut block);
        self.next.write(&block)?;
        self.next.finish()
    }
}

enum DecryptState {
    AwaitingIv,
    Streaming(CbcDec),
    AwaitingFinal,
}

/// Streaming decryptor implementing the explicit state machine: gather the
/// IV, stream whole blocks while holding one back, strip padding at the
/// end.
pub struct AesDecryptSink {
    next: Box<dyn Sink>,
    key: Vec<u8>,
    state: DecryptState,
    pending: Vec<u8>,
}

impl AesDecryptSink {
    pub fn new(key: &[u8], next: Box<dyn Sink>) -> Self {
        AesDecryptSink {
            next,
            key: key.to_vec(),
            state: DecryptState::AwaitingIv,
            pending: Vec::with_capacity(2 * AES_BLOCK),
        }
    }
}

impl Sink for AesDecryptSink {
    fn write(&mut self, data: &[u8]) -> Result<()> {
        self.pending.extend_from_slice(data);

        if matches!(self.state, DecryptState::AwaitingIv) {
            if self.pending.len() < AES_IV_LEN {
                return Ok(());
            }
            let rest = self.pending.split_off(AES_IV_LEN);
            let cipher = CbcDec::new(&self.key, &self.pending)?;
            self.pending = rest;
            self.state = DecryptState::Streaming(cipher);
        }

        let DecryptState::Streaming(cipher) = &mut self.state else {
            return Err(PdfError::new(
                ErrorKind::InternalLogic,
                "write after AES stream completed",
            ));
        };

        // Keep at least one full block back; it may be the padded final one.
        let full_blocks = self.pending.len() / AES_BLOCK;
        let releasable = full_blocks.saturating_sub(1) * AES_BLOCK;
        if releasable == 0 {
            return Ok(());
        }
        let mut blocks = std::mem::take(&mut self.pending);
        self.pending = blocks.split_off(releasable);
        for chunk in blocks.chunks_exact_mut(AES_BLOCK) {
            let block: &mut [u8; AES_BLOCK] = chunk.try_into().expect("exact chunk");
            cipher.decrypt_block(block);
        }
        self.next.write(&blocks)
    }

    fn finish(&mut self) -> Result<()> {
        match std::mem::replace(&mut self.state, DecryptState::AwaitingFinal) {
            DecryptState::AwaitingIv => {
                // Empty or IV-only payloads decrypt to nothing.
                self.pending.clear();
                self.next.finish()
            }
            DecryptState::Streaming(mut cipher) => {
                if self.pending.len() != AES_BLOCK {
                    return Err(PdfError::new(
                        ErrorKind::InvalidEncoding,
                        format!(
                            "AES stream ends with {} bytes instead of one block",
                            self.pending.len()
                        ),
                    ));
                }
                let mut block = [0u8; AES_BLOCK];
                block.copy_from_slice(&self.pending);
                self.pending.clear();
                cipher.decrypt_block(&mut block);
                let pad = usize::from(block[AES_BLOCK - 1]);
                if pad == 0 || pad > AES_BLOCK {
                    return Err(PdfError::new(
                        ErrorKind::InvalidEncoding,
                        "bad AES padding",
                    ));
                }
                self.next.write(&block[..AES_BLOCK - pad])?;
                self.next.finish()
            }
            DecryptState::AwaitingFinal => self.next.finish(),
        }
    }
}
