//! Standard security handlers: RC4 V1/V2, AES-128 (V4/R4) and - behind the
//! `aes256` feature - AES-256 (V5/R5, Adobe Extension Level 3).
//!
//! A handler owns the file encryption key plus the password records from or
//! for the encryption dictionary. Strings and streams pass through
//! [`SecurityHandler::encrypt`]/[`decrypt`](SecurityHandler::decrypt) with
//! the owning object's identity; the per-object key schedule guarantees two
//! objects never share a cipher stream.

mod aes;
#[cfg(feature = "aes256")]
mod aesv3;
mod keys;
mod rc4;

pub use keys::PASSWORD_PAD;

use bitflags::bitflags;

use crate::core::{AlgorithmSet, ErrorKind, PdfError, Result};
use crate::filter::Sink;
use crate::object::{Dictionary, Name, PdfString, Reference, Value};

/// Encryption algorithm variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Algorithm {
    /// 40-bit RC4 (V1, R2).
    Rc4V1,
    /// 40..128-bit RC4 (V2, R3).
    Rc4V2,
    /// AES-128 CBC (V4, R4).
    AesV2,
    /// AES-256 CBC (V5, R5).
    #[cfg(feature = "aes256")]
    AesV3,
}

bitflags! {
    /// User access permissions (`/P`). Reserved bits are filled in when the
    /// signed value is emitted.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Permissions: u32 {
        const PRINT = 1 << 2;
        const MODIFY = 1 << 3;
        const COPY = 1 << 4;
        const ANNOTATE = 1 << 5;
        const FILL_FORMS = 1 << 8;
        const EXTRACT = 1 << 9;
        const ASSEMBLE = 1 << 10;
        const PRINT_HIGH_RES = 1 << 11;
    }
}

const PERMS_RESERVED: u32 = 0xFFFF_F0C0;

impl Permissions {
    /// The signed 32-bit `/P` value with all reserved bits set.
    pub fn to_p_value(self) -> i32 {
        (PERMS_RESERVED | self.bits()) as i32
    }

    pub fn from_p_value(p: i32) -> Self {
        Permissions::from_bits_truncate(p as u32)
    }
}

/// Which password authenticated the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthLevel {
    User,
    Owner,
}

impl std::fmt::Debug for dyn SecurityHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecurityHandler")
            .field("algorithm", &self.algorithm())
            .field("key_length", &self.key_length())
            .finish_non_exhaustive()
    }
}

/// Common surface of the standard security handlers.
pub trait SecurityHandler {
    fn algorithm(&self) -> Algorithm;
    /// Key length in bits.
    fn key_length(&self) -> u32;
    fn permissions(&self) -> i32;
    fn encrypt_metadata(&self) -> bool;
    fn authenticated(&self) -> Option<AuthLevel>;

    /// Derive the file key and password records for a fresh document.
    fn generate_keys(&mut self, doc_id: &[u8]) -> Result<()>;

    /// Validate `password` first as user then as owner password, deriving
    /// the file key on success. Failure is `InvalidPassword`.
    fn authenticate(&mut self, password: &str, doc_id: &[u8]) -> Result<()>;

    fn encrypt(&mut self, id: Reference, plain: &[u8]) -> Result<Vec<u8>>;
    fn decrypt(&mut self, id: Reference, cipher: &[u8]) -> Result<Vec<u8>>;

    /// On-disk length of an encrypted payload of `plain_len` bytes.
    fn encrypted_len(&self, plain_len: usize) -> usize;

    /// Streaming variants for payloads that are not materialised.
    fn encryption_sink(&self, id: Reference, next: Box<dyn Sink>) -> Result<Box<dyn Sink>>;
    fn decryption_sink(&self, id: Reference, next: Box<dyn Sink>) -> Result<Box<dyn Sink>>;

    /// Build the `/Encrypt` dictionary for the writer.
    fn to_dictionary(&self) -> Dictionary;
}

fn not_authenticated() -> PdfError {
    PdfError::new(
        ErrorKind::InvalidKey,
        "no file key: document not authenticated",
    )
}

// ---------------------------------------------------------------------------
// RC4 family
// ---------------------------------------------------------------------------

/// RC4 V1 (40-bit) and V2 (40..128-bit) handler.
pub struct Rc4Handler {
    algorithm: Algorithm,
    revision: i32,
    key_len: usize,
    p: i32,
    encrypt_metadata: bool,
    o: [u8; 32],
    u: [u8; 32],
    file_key: Vec<u8>,
    user_password: String,
    owner_password: String,
    auth: Option<AuthLevel>,
    cache: rc4::SboxCache,
}

impl Rc4Handler {
    /// Handler for encrypting a fresh document.
    pub fn new(
        user_password: &str,
        owner_password: &str,
        permissions: Permissions,
        algorithm: Algorithm,
        key_bits: u32,
    ) -> Result<Self> {
        let (revision, key_len) = match algorithm {
            Algorithm::Rc4V1 => (2, 5),
            Algorithm::Rc4V2 => {
                let bits = (key_bits - key_bits % 8).clamp(40, 128);
                (3, bits as usize / 8)
            }
            _ => {
                return Err(PdfError::new(
                    ErrorKind::InvalidEnumValue,
                    "Rc4Handler only covers the RC4 variants",
                ));
            }
        };
        Ok(Rc4Handler {
            algorithm,
            revision,
            key_len,
            p: permissions.to_p_value(),
            encrypt_metadata: true,
            o: [0; 32],
            u: [0; 32],
            file_key: Vec::new(),
            user_password: user_password.to_owned(),
            owner_password: owner_password.to_owned(),
            auth: None,
            cache: rc4::SboxCache::new(),
        })
    }

    /// Handler reconstructed from a parsed encryption dictionary.
    pub fn from_parts(
        algorithm: Algorithm,
        o: [u8; 32],
        u: [u8; 32],
        p: i32,
        revision: i32,
        key_bits: u32,
        encrypt_metadata: bool,
    ) -> Self {
        Rc4Handler {
            algorithm,
            revision,
            key_len: key_bits as usize / 8,
            p,
            encrypt_metadata,
            o,
            u,
            file_key: Vec::new(),
            user_password: String::new(),
            owner_password: String::new(),
            auth: None,
            cache: rc4::SboxCache::new(),
        }
    }

    /// Owner password falls back to the user password when empty.
    fn effective_owner(&self) -> &str {
        if self.owner_password.is_empty() {
            &self.user_password
        } else {
            &self.owner_password
        }
    }

    fn check_user_key(&self, candidate: &[u8; 32]) -> bool {
        let significant = if self.revision >= 3 { 16 } else { 32 };
        candidate[..significant] == self.u[..significant]
    }

    fn object_key(&self, id: Reference) -> Result<Vec<u8>> {
        if self.file_key.is_empty() {
            return Err(not_authenticated());
        }
        Ok(keys::object_key(&self.file_key, id, false))
    }
}

impl SecurityHandler for Rc4Handler {
    fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    fn key_length(&self) -> u32 {
        self.key_len as u32 * 8
    }

    fn permissions(&self) -> i32 {
        self.p
    }

    fn encrypt_metadata(&self) -> bool {
        self.encrypt_metadata
    }

    fn authenticated(&self) -> Option<AuthLevel> {
        self.auth
    }

    fn generate_keys(&mut self, doc_id: &[u8]) -> Result<()> {
        let user_pad = keys::pad_password(self.user_password.as_bytes());
        let owner_pad = keys::pad_password(self.effective_owner().as_bytes());
        self.o = keys::owner_value(&user_pad, &owner_pad, self.key_len, self.revision, false);
        self.file_key = keys::file_key(
            doc_id,
            &user_pad,
            &self.o,
            self.p,
            self.key_len,
            self.revision,
            self.encrypt_metadata,
        );
        self.u = keys::user_value(&self.file_key, doc_id, self.revision);
        self.auth = Some(AuthLevel::Owner);
        Ok(())
    }

    fn authenticate(&mut self, password: &str, doc_id: &[u8]) -> Result<()> {
        let pswd = keys::pad_password(password.as_bytes());

        let user_key = keys::file_key(
            doc_id,
            &pswd,
            &self.o,
            self.p,
            self.key_len,
            self.revision,
            self.encrypt_metadata,
        );
        let candidate = keys::user_value(&user_key, doc_id, self.revision);
        if self.check_user_key(&candidate) {
            self.file_key = user_key;
            self.user_password = password.to_owned();
            self.auth = Some(AuthLevel::User);
            return Ok(());
        }

        // Recover the padded user password from /O and retry.
        let recovered = keys::owner_value(&self.o, &pswd, self.key_len, self.revision, true);
        let owner_key = keys::file_key(
            doc_id,
            &recovered,
            &self.o,
            self.p,
            self.key_len,
            self.revision,
            self.encrypt_metadata,
        );
        let candidate = keys::user_value(&owner_key, doc_id, self.revision);
        if self.check_user_key(&candidate) {
            self.file_key = owner_key;
            self.owner_password = password.to_owned();
            self.auth = Some(AuthLevel::Owner);
            return Ok(());
        }

        Err(PdfError::new(ErrorKind::InvalidPassword, "wrong password"))
    }

    fn encrypt(&mut self, id: Reference, plain: &[u8]) -> Result<Vec<u8>> {
        let key = self.object_key(id)?;
        Ok(self.cache.keyed(&key).apply(plain))
    }

    fn decrypt(&mut self, id: Reference, cipher: &[u8]) -> Result<Vec<u8>> {
        // RC4 is symmetric.
        self.encrypt(id, cipher)
    }

    fn encrypted_len(&self, plain_len: usize) -> usize {
        plain_len
    }

    fn encryption_sink(&self, id: Reference, next: Box<dyn Sink>) -> Result<Box<dyn Sink>> {
        Ok(Box::new(Rc4Sink {
            rc4: rc4::Rc4::new(&self.object_key(id)?),
            next,
        }))
    }

    fn decryption_sink(&self, id: Reference, next: Box<dyn Sink>) -> Result<Box<dyn Sink>> {
        self.encryption_sink(id, next)
    }

    fn to_dictionary(&self) -> Dictionary {
        let mut dict = Dictionary::new();
        dict.set("Filter", Name::from("Standard"));
        match self.algorithm {
            Algorithm::Rc4V1 => {
                dict.set("V", 1i64);
                dict.set("R", i64::from(self.revision));
            }
            _ => {
                dict.set("V", 2i64);
                dict.set("R", 3i64);
                dict.set("Length", self.key_len as i64 * 8);
            }
        }
        dict.set("O", PdfString::hex(self.o.to_vec()));
        dict.set("U", PdfString::hex(self.u.to_vec()));
        dict.set("P", i64::from(self.p));
        if !self.encrypt_metadata {
            dict.set("EncryptMetadata", false);
        }
        dict
    }
}

struct Rc4Sink {
    rc4: rc4::Rc4,
    next: Box<dyn Sink>,
}

impl Sink for Rc4Sink {
    fn write(&mut self, data: &[u8]) -> Result<()> {
        let out = self.rc4.apply(data);
        self.next.write(&out)
    }

    fn finish(&mut self) -> Result<()> {
        self.next.finish()
    }
}

// ---------------------------------------------------------------------------
// AES family
// ---------------------------------------------------------------------------

/// AES-128 (V4/R4) and, with the `aes256` feature, AES-256 (V5/R5).
pub struct AesHandler {
    algorithm: Algorithm,
    revision: i32,
    key_len: usize,
    p: i32,
    encrypt_metadata: bool,
    /// 32 bytes for V4, 48 for V5.
    o: Vec<u8>,
    u: Vec<u8>,
    /// V5 only.
    oe: Vec<u8>,
    ue: Vec<u8>,
    perms_value: Vec<u8>,
    file_key: Vec<u8>,
    user_password: String,
    owner_password: String,
    auth: Option<AuthLevel>,
}

impl AesHandler {
    /// AES-128 handler for encrypting a fresh document.
    pub fn new_v2(
        user_password: &str,
        owner_password: &str,
        permissions: Permissions,
    ) -> Self {
        AesHandler {
            algorithm: Algorithm::AesV2,
            revision: 4,
            key_len: 16,
            p: permissions.to_p_value(),
            encrypt_metadata: true,
            o: vec![0; 32],
            u: vec![0; 32],
            oe: Vec::new(),
            ue: Vec::new(),
            perms_value: Vec::new(),
            file_key: Vec::new(),
            user_password: user_password.to_owned(),
            owner_password: owner_password.to_owned(),
            auth: None,
        }
    }

    /// AES-128 handler from a parsed encryption dictionary.
    pub fn v2_from_parts(o: [u8; 32], u: [u8; 32], p: i32, encrypt_metadata: bool) -> Self {
        AesHandler {
            algorithm: Algorithm::AesV2,
            revision: 4,
            key_len: 16,
            p,
            encrypt_metadata,
            o: o.to_vec(),
            u: u.to_vec(),
            oe: Vec::new(),
            ue: Vec::new(),
            perms_value: Vec::new(),
            file_key: Vec::new(),
            user_password: String::new(),
            owner_password: String::new(),
            auth: None,
        }
    }

    /// AES-256 handler for encrypting a fresh document.
    #[cfg(feature = "aes256")]
    pub fn new_v3(
        user_password: &str,
        owner_password: &str,
        permissions: Permissions,
    ) -> Self {
        AesHandler {
            algorithm: Algorithm::AesV3,
            revision: 5,
            key_len: 32,
            p: permissions.to_p_value(),
            encrypt_metadata: true,
            o: vec![0; 48],
            u: vec![0; 48],
            oe: vec![0; 32],
            ue: vec![0; 32],
            perms_value: vec![0; 16],
            file_key: Vec::new(),
            user_password: user_password.to_owned(),
            owner_password: owner_password.to_owned(),
            auth: None,
        }
    }

    /// AES-256 handler from a parsed encryption dictionary.
    #[cfg(feature = "aes256")]
    #[allow(clippy::too_many_arguments)]
    pub fn v3_from_parts(
        o: Vec<u8>,
        oe: Vec<u8>,
        u: Vec<u8>,
        ue: Vec<u8>,
        p: i32,
        perms_value: Vec<u8>,
    ) -> Self {
        AesHandler {
            algorithm: Algorithm::AesV3,
            revision: 5,
            key_len: 32,
            p,
            encrypt_metadata: true,
            o,
            u,
            oe,
            ue,
            perms_value,
            file_key: Vec::new(),
            user_password: String::new(),
            owner_password: String::new(),
            auth: None,
        }
    }

    fn effective_owner(&self) -> &str {
        if self.owner_password.is_empty() {
            &self.user_password
        } else {
            &self.owner_password
        }
    }

    fn is_v2(&self) -> bool {
        self.algorithm == Algorithm::AesV2
    }

    fn object_key(&self, id: Reference) -> Result<Vec<u8>> {
        if self.file_key.is_empty() {
            return Err(not_authenticated());
        }
        if self.is_v2() {
            Ok(keys::object_key(&self.file_key, id, true))
        } else {
            // AES-256 encrypts every object with the file key directly.
            Ok(self.file_key.clone())
        }
    }
}

impl SecurityHandler for AesHandler {
    fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    fn key_length(&self) -> u32 {
        self.key_len as u32 * 8
    }

    fn permissions(&self) -> i32 {
        self.p
    }

    fn encrypt_metadata(&self) -> bool {
        self.encrypt_metadata
    }

    fn authenticated(&self) -> Option<AuthLevel> {
        self.auth
    }

    fn generate_keys(&mut self, doc_id: &[u8]) -> Result<()> {
        if self.is_v2() {
            let user_pad = keys::pad_password(self.user_password.as_bytes());
            let owner_pad = keys::pad_password(self.effective_owner().as_bytes());
            let o = keys::owner_value(&user_pad, &owner_pad, self.key_len, self.revision, false);
            self.o = o.to_vec();
            self.file_key = keys::file_key(
                doc_id,
                &user_pad,
                &o,
                self.p,
                self.key_len,
                self.revision,
                self.encrypt_metadata,
            );
            self.u = keys::user_value(&self.file_key, doc_id, self.revision).to_vec();
            self.auth = Some(AuthLevel::Owner);
            Ok(())
        } else {
            #[cfg(feature = "aes256")]
            {
                self.generate_keys_v3()
            }
            #[cfg(not(feature = "aes256"))]
            unreachable!("AES-256 handler cannot exist without the aes256 feature")
        }
    }

    fn authenticate(&mut self, password: &str, doc_id: &[u8]) -> Result<()> {
        if self.is_v2() {
            let pswd = keys::pad_password(password.as_bytes());
            let o: [u8; 32] = self.o.as_slice().try_into().map_err(|_| {
                PdfError::new(ErrorKind::InvalidEncryptionDict, "/O must be 32 bytes")
            })?;

            let try_key = |pad: &[u8; 32]| -> (Vec<u8>, [u8; 32]) {
                let key = keys::file_key(
                    doc_id,
                    pad,
                    &o,
                    self.p,
                    self.key_len,
                    self.revision,
                    self.encrypt_metadata,
                );
                let u = keys::user_value(&key, doc_id, self.revision);
                (key, u)
            };

            let (user_key, candidate) = try_key(&pswd);
            if candidate[..16] == self.u[..16] {
                self.file_key = user_key;
                self.user_password = password.to_owned();
                self.auth = Some(AuthLevel::User);
                return Ok(());
            }

            let recovered = keys::owner_value(&o, &pswd, self.key_len, self.revision, true);
            let (owner_key, candidate) = try_key(&recovered);
            if candidate[..16] == self.u[..16] {
                self.file_key = owner_key;
                self.owner_password = password.to_owned();
                self.auth = Some(AuthLevel::Owner);
                return Ok(());
            }

            Err(PdfError::new(ErrorKind::InvalidPassword, "wrong password"))
        } else {
            #[cfg(feature = "aes256")]
            {
                self.authenticate_v3(password)
            }
            #[cfg(not(feature = "aes256"))]
            unreachable!("AES-256 handler cannot exist without the aes256 feature")
        }
    }

    fn encrypt(&mut self, id: Reference, plain: &[u8]) -> Result<Vec<u8>> {
        let key = self.object_key(id)?;
        aes::encrypt_with_iv(&key, plain)
    }

    fn decrypt(&mut self, id: Reference, cipher: &[u8]) -> Result<Vec<u8>> {
        let key = self.object_key(id)?;
        aes::decrypt_with_iv(&key, cipher)
    }

    fn encrypted_len(&self, plain_len: usize) -> usize {
        aes::encrypted_len(plain_len)
    }

    fn encryption_sink(&self, id: Reference, next: Box<dyn Sink>) -> Result<Box<dyn Sink>> {
        Ok(Box::new(aes::AesEncryptSink::new(&self.object_key(id)?, next)))
    }

    fn decryption_sink(&self, id: Reference, next: Box<dyn Sink>) -> Result<Box<dyn Sink>> {
        Ok(Box::new(aes::AesDecryptSink::new(&self.object_key(id)?, next)))
    }

    fn to_dictionary(&self) -> Dictionary {
        let mut dict = Dictionary::new();
        dict.set("Filter", Name::from("Standard"));

        let mut std_cf = Dictionary::new();
        if self.is_v2() {
            dict.set("V", 4i64);
            dict.set("R", 4i64);
            dict.set("Length", 128i64);
            std_cf.set("CFM", Name::from("AESV2"));
            std_cf.set("Length", 16i64);
        } else {
            dict.set("V", 5i64);
            dict.set("R", 5i64);
            dict.set("Length", 256i64);
            std_cf.set("CFM", Name::from("AESV3"));
            std_cf.set("Length", 32i64);
        }
        std_cf.set("AuthEvent", Name::from("DocOpen"));
        let mut cf = Dictionary::new();
        cf.set("StdCF", std_cf);
        dict.set("CF", cf);
        dict.set("StmF", Name::from("StdCF"));
        dict.set("StrF", Name::from("StdCF"));

        dict.set("O", PdfString::hex(self.o.clone()));
        dict.set("U", PdfString::hex(self.u.clone()));
        if !self.is_v2() {
            dict.set("OE", PdfString::hex(self.oe.clone()));
            dict.set("UE", PdfString::hex(self.ue.clone()));
            dict.set("Perms", PdfString::hex(self.perms_value.clone()));
        }
        dict.set("P", i64::from(self.p));
        if !self.encrypt_metadata {
            dict.set("EncryptMetadata", false);
        }
        dict
    }
}

// ---------------------------------------------------------------------------
// Construction
// ---------------------------------------------------------------------------

/// Parameters for encrypting a document.
#[derive(Debug, Clone)]
pub struct EncryptOptions {
    pub user_password: String,
    pub owner_password: String,
    pub permissions: Permissions,
    pub algorithm: Algorithm,
    /// Key length in bits; only meaningful for RC4 V2.
    pub key_length: u32,
}

impl Default for EncryptOptions {
    fn default() -> Self {
        EncryptOptions {
            user_password: String::new(),
            owner_password: String::new(),
            permissions: Permissions::all(),
            algorithm: Algorithm::AesV2,
            key_length: 128,
        }
    }
}

/// Build a handler for encrypting a fresh document.
pub fn create_handler(options: &EncryptOptions) -> Result<Box<dyn SecurityHandler>> {
    Ok(match options.algorithm {
        Algorithm::Rc4V1 | Algorithm::Rc4V2 => Box::new(Rc4Handler::new(
            &options.user_password,
            &options.owner_password,
            options.permissions,
            options.algorithm,
            options.key_length,
        )?),
        Algorithm::AesV2 => Box::new(AesHandler::new_v2(
            &options.user_password,
            &options.owner_password,
            options.permissions,
        )),
        #[cfg(feature = "aes256")]
        Algorithm::AesV3 => Box::new(AesHandler::new_v3(
            &options.user_password,
            &options.owner_password,
            options.permissions,
        )),
    })
}

fn required_int(dict: &Dictionary, key: &[u8]) -> Result<i64> {
    dict.get_integer(key).ok_or_else(|| {
        PdfError::new(
            ErrorKind::InvalidEncryptionDict,
            format!("missing /{} entry", String::from_utf8_lossy(key)),
        )
    })
}

fn required_string(dict: &Dictionary, key: &[u8], len: usize) -> Result<Vec<u8>> {
    let bytes = dict
        .get(key)
        .and_then(Value::as_string)
        .map(|s| s.as_bytes().to_vec())
        .ok_or_else(|| {
            PdfError::new(
                ErrorKind::InvalidEncryptionDict,
                format!("missing /{} entry", String::from_utf8_lossy(key)),
            )
        })?;
    if bytes.len() < len {
        return Err(PdfError::new(
            ErrorKind::InvalidEncryptionDict,
            format!(
                "/{} is {} bytes, expected at least {len}",
                String::from_utf8_lossy(key),
                bytes.len()
            ),
        ));
    }
    Ok(bytes)
}

/// The `/CFM` of the crypt filter named by `/StmF`, if any.
fn crypt_filter_method(dict: &Dictionary) -> Option<Name> {
    let stmf = dict.get_name(b"StmF")?;
    let cf = dict.get_dict(b"CF")?;
    let filter = cf.get_dict(stmf.as_bytes())?;
    filter.get_name(b"CFM").cloned()
}

/// Construct the handler described by a parsed `/Encrypt` dictionary.
pub fn from_dictionary(
    dict: &Dictionary,
    enabled: AlgorithmSet,
) -> Result<Box<dyn SecurityHandler>> {
    match dict.get_name(b"Filter") {
        Some(name) if *name == "Standard" => {}
        Some(name) => {
            return Err(PdfError::new(
                ErrorKind::UnsupportedFilter,
                format!("unsupported security handler {name:?}"),
            ));
        }
        None => {
            return Err(PdfError::new(
                ErrorKind::InvalidEncryptionDict,
                "encryption dictionary has no /Filter key",
            ));
        }
    }

    let v = required_int(dict, b"V")?;
    let r = required_int(dict, b"R")?;
    let p = required_int(dict, b"P")? as i32;
    let length = dict.get_integer(b"Length").unwrap_or(40);
    let encrypt_metadata = dict.get_bool(b"EncryptMetadata").unwrap_or(true);
    let cfm = crypt_filter_method(dict);

    if (v == 1 && (r == 2 || r == 3)) && enabled.contains(AlgorithmSet::RC4_V1) {
        let o = required_string(dict, b"O", 32)?[..32].try_into().expect("checked");
        let u = required_string(dict, b"U", 32)?[..32].try_into().expect("checked");
        return Ok(Box::new(Rc4Handler::from_parts(
            Algorithm::Rc4V1,
            o,
            u,
            p,
            r as i32,
            40,
            encrypt_metadata,
        )));
    }

    let is_v2_cfm = cfm.as_ref().is_some_and(|n| *n == "V2");
    if ((v == 2 && r == 3) || is_v2_cfm) && enabled.contains(AlgorithmSet::RC4_V2) {
        if !(40..=128).contains(&length) || length % 8 != 0 {
            return Err(PdfError::new(
                ErrorKind::InvalidEncryptionDict,
                format!("invalid key length {length}"),
            ));
        }
        let o = required_string(dict, b"O", 32)?[..32].try_into().expect("checked");
        let u = required_string(dict, b"U", 32)?[..32].try_into().expect("checked");
        return Ok(Box::new(Rc4Handler::from_parts(
            Algorithm::Rc4V2,
            o,
            u,
            p,
            r as i32,
            length as u32,
            encrypt_metadata,
        )));
    }

    if v == 4 && r == 4 && enabled.contains(AlgorithmSet::AES_V2) {
        let o = required_string(dict, b"O", 32)?[..32].try_into().expect("checked");
        let u = required_string(dict, b"U", 32)?[..32].try_into().expect("checked");
        return Ok(Box::new(AesHandler::v2_from_parts(o, u, p, encrypt_metadata)));
    }

    if v == 5 && r == 5 && enabled.contains(AlgorithmSet::AES_V3) {
        #[cfg(feature = "aes256")]
        {
            let o = required_string(dict, b"O", 48)?;
            let u = required_string(dict, b"U", 48)?;
            let oe = required_string(dict, b"OE", 32)?;
            let ue = required_string(dict, b"UE", 32)?;
            let perms = required_string(dict, b"Perms", 16)?;
            return Ok(Box::new(AesHandler::v3_from_parts(o, oe, u, ue, p, perms)));
        }
        #[cfg(not(feature = "aes256"))]
        return Err(PdfError::new(
            ErrorKind::UnsupportedFilter,
            "AES-256 support is not built in (enable the aes256 feature)",
        ));
    }

    Err(PdfError::new(
        ErrorKind::UnsupportedFilter,
        format!("unsupported encryption method Version={v} Revision={r}"),
    ))
}
