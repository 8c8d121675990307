//! The document facade: owns the object collection, trailer and optional
//! security handler, and orchestrates open / save / incremental save.

mod attachments;
pub mod dates;

use std::fs::File;
use std::io::{BufWriter, Read, Seek, Write};
use std::path::Path;
use std::sync::Arc;

use log::warn;
use md5::{Digest, Md5};

use crate::core::{
    EngineConfig, ErrorContext, ErrorKind, OutputDevice, PdfError, Result, read_device,
};
use crate::encrypt::{self, EncryptOptions, SecurityHandler};
use crate::object::{
    Dictionary, Name, Object, ObjectCollection, PdfString, Reference, Value,
};
use crate::parser;
use crate::writer::{
    self, EncryptContext, SignatureBeacon, SignatureRequest, WriteContext,
};

/// A PDF document in memory.
///
/// Loading keeps the original bytes alive: parser-deferred streams slice
/// into them and incremental saves replay them verbatim. A document is not
/// safe for concurrent mutation; distinct documents are independent.
pub struct Document {
    config: EngineConfig,
    collection: ObjectCollection,
    trailer: Dictionary,
    version: (u8, u8),
    linearized: bool,
    source: Option<Arc<Vec<u8>>>,
    prev_startxref: Option<u64>,
    encrypt: Option<Box<dyn SecurityHandler>>,
    encrypt_ref: Option<Reference>,
    pending_signature: Option<Reference>,
}

impl std::fmt::Debug for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Document")
            .field("version", &self.version)
            .field("linearized", &self.linearized)
            .finish_non_exhaustive()
    }
}

impl Document {
    /// A fresh document with a catalog and an information dictionary.
    pub fn new(config: EngineConfig) -> Self {
        let mut collection = ObjectCollection::new();
        let catalog = collection.create(Some("Catalog"));
        let info = collection.create(None);
        let mut trailer = Dictionary::new();
        trailer.set("Root", Value::Reference(catalog));
        trailer.set("Info", Value::Reference(info));
        Document {
            config,
            collection,
            trailer,
            version: (1, 7),
            linearized: false,
            source: None,
            prev_startxref: None,
            encrypt: None,
            encrypt_ref: None,
            pending_signature: None,
        }
    }

    pub fn load(path: impl AsRef<Path>, config: EngineConfig) -> Result<Self> {
        Self::load_with_password(path, "", config)
    }

    pub fn load_with_password(
        path: impl AsRef<Path>,
        password: &str,
        config: EngineConfig,
    ) -> Result<Self> {
        let mut file = File::open(path).map_err(PdfError::from)?;
        Self::from_device(&mut file, password, config)
    }

    /// Load from any readable device; the bytes are drained into memory.
    pub fn from_device(
        device: &mut impl Read,
        password: &str,
        config: EngineConfig,
    ) -> Result<Self> {
        let bytes = read_device(device)?;
        Self::from_bytes(bytes, password, config)
    }

    pub fn from_bytes(bytes: Vec<u8>, password: &str, config: EngineConfig) -> Result<Self> {
        let source = Arc::new(bytes);
        let parsed = parser::parse_document(source.clone(), &config)
            .frame("loading document")?;

        let mut doc = Document {
            config,
            collection: parsed.collection,
            trailer: parsed.trailer,
            version: parsed.version,
            linearized: parsed.linearized,
            source: Some(source),
            prev_startxref: Some(parsed.xref_offset),
            encrypt: None,
            encrypt_ref: None,
            pending_signature: None,
        };

        if let Some((enc_dict, enc_ref)) = parsed.encrypt {
            let mut handler =
                encrypt::from_dictionary(&enc_dict, doc.config.enabled_algorithms)?;
            let doc_id = doc.id_bytes();
            handler
                .authenticate(password, &doc_id)
                .frame("authenticating document")?;
            doc.encrypt_ref = enc_ref;
            doc.decrypt_all(handler.as_mut())?;
            // Object streams could not be exploded before their containers
            // were decrypted.
            parser::explode_object_streams(
                &mut doc.collection,
                parsed.pending_object_streams.into_iter(),
            );
            doc.collection.mark_all_clean();
            doc.encrypt = Some(handler);
        }
        Ok(doc)
    }

    pub fn version(&self) -> (u8, u8) {
        self.version
    }

    pub fn set_version(&mut self, version: (u8, u8)) {
        self.version = version;
    }

    pub fn is_linearized(&self) -> bool {
        self.linearized
    }

    pub fn trailer(&self) -> &Dictionary {
        &self.trailer
    }

    pub fn collection(&self) -> &ObjectCollection {
        &self.collection
    }

    pub fn collection_mut(&mut self) -> &mut ObjectCollection {
        &mut self.collection
    }

    pub fn get_object(&self, id: Reference) -> Option<&Object> {
        self.collection.get(id)
    }

    pub fn get_object_mut(&mut self, id: Reference) -> Option<&mut Object> {
        self.collection.get_mut(id)
    }

    pub fn create_object(&mut self, type_name: Option<&str>) -> Reference {
        self.collection.create(type_name)
    }

    pub fn remove_object(&mut self, id: Reference) -> Option<Object> {
        self.collection.remove(id)
    }

    /// Decoded content stream of an object.
    pub fn stream_bytes(&self, id: Reference) -> Result<Vec<u8>> {
        self.collection
            .get(id)
            .ok_or_else(|| {
                PdfError::new(ErrorKind::ObjectNotFound, format!("no object {id}"))
            })?
            .decoded_stream()
    }

    pub fn catalog_ref(&self) -> Result<Reference> {
        self.trailer
            .get(b"Root")
            .and_then(Value::as_reference)
            .ok_or_else(|| {
                PdfError::new(ErrorKind::InvalidTrailer, "trailer has no /Root reference")
            })
    }

    pub fn catalog(&self) -> Result<&Object> {
        let id = self.catalog_ref()?;
        self.collection.get(id).ok_or_else(|| {
            PdfError::new(ErrorKind::BrokenFile, format!("catalog {id} is missing"))
        })
    }

    pub fn catalog_mut(&mut self) -> Result<&mut Object> {
        let id = self.catalog_ref()?;
        self.collection.get_mut(id).ok_or_else(|| {
            PdfError::new(ErrorKind::BrokenFile, format!("catalog {id} is missing"))
        })
    }

    fn info_ref(&mut self) -> Reference {
        match self.trailer.get(b"Info").and_then(Value::as_reference) {
            Some(id) if self.collection.get(id).is_some() => id,
            _ => {
                let id = self.collection.create(None);
                self.trailer.set("Info", Value::Reference(id));
                id
            }
        }
    }

    /// Set an information dictionary entry. Non-ASCII text is stored as
    /// UTF-16BE.
    pub fn set_info_entry(&mut self, key: &str, text: &str) -> Result<()> {
        let id = self.info_ref();
        let value = if text.is_ascii() {
            PdfString::literal(text.as_bytes().to_vec())
        } else {
            PdfString::from_unicode(text)
        };
        self.collection
            .get_mut(id)
            .expect("info object exists")
            .dict_mut()?
            .set(Name::from(key), value);
        Ok(())
    }

    pub fn info_entry(&self, key: &str) -> Option<String> {
        let id = self.trailer.get(b"Info").and_then(Value::as_reference)?;
        let dict = self.collection.get(id)?.value().as_dict()?;
        dict.get(key.as_bytes())
            .and_then(Value::as_string)
            .map(PdfString::to_text)
    }

    /// Stamp `/ModDate` (and `/Producer`) with the current time. Not done
    /// implicitly: repeated saves of an unchanged document stay
    /// byte-identical.
    pub fn touch_mod_date(&mut self) -> Result<()> {
        let stamp = dates::format_pdf_date(chrono::Local::now());
        self.set_info_entry("ModDate", &stamp)
    }

    pub fn touch_creation_date(&mut self) -> Result<()> {
        let stamp = dates::format_pdf_date(chrono::Local::now());
        self.set_info_entry("CreationDate", &stamp)
    }

    /// Declare a developer extension in the catalog's `/Extensions`
    /// dictionary (e.g. `"ADBE"` at level 3 for the AES-256 handler).
    pub fn add_extension(&mut self, prefix: &str, base_version: (u8, u8), level: i64) -> Result<()> {
        let catalog_id = self.catalog_ref()?;
        let catalog = self
            .collection
            .get_mut(catalog_id)
            .ok_or_else(|| PdfError::new(ErrorKind::BrokenFile, "catalog is missing"))?
            .dict_mut()?;

        let mut entry = Dictionary::new();
        entry.set(
            "BaseVersion",
            Name::from(format!("{}.{}", base_version.0, base_version.1).as_str()),
        );
        entry.set("ExtensionLevel", level);

        match catalog.get_mut(b"Extensions").and_then(Value::as_dict_mut) {
            Some(extensions) => extensions.set(Name::from(prefix), entry),
            None => {
                let mut extensions = Dictionary::new();
                extensions.set(Name::from(prefix), entry);
                catalog.set("Extensions", extensions);
            }
        }
        Ok(())
    }

    /// Whether the catalog declares the given extension at `level` or
    /// higher.
    pub fn has_extension(&self, prefix: &str, level: i64) -> bool {
        self.catalog()
            .ok()
            .and_then(|catalog| catalog.value().as_dict())
            .and_then(|dict| dict.get_dict(b"Extensions"))
            .and_then(|extensions| extensions.get_dict(prefix.as_bytes()))
            .and_then(|entry| entry.get_integer(b"ExtensionLevel"))
            .is_some_and(|declared| declared >= level)
    }

    pub fn remove_extension(&mut self, prefix: &str) -> Result<()> {
        let catalog_id = self.catalog_ref()?;
        if let Some(obj) = self.collection.get_mut(catalog_id) {
            if let Some(extensions) = obj.dict_mut()?.get_mut(b"Extensions").and_then(Value::as_dict_mut) {
                extensions.remove(prefix.as_bytes());
            }
        }
        Ok(())
    }

    /// Encrypt on the next save with the given parameters.
    pub fn set_encryption(&mut self, options: &EncryptOptions) -> Result<()> {
        self.encrypt = Some(encrypt::create_handler(options)?);
        self.encrypt_ref = None;
        Ok(())
    }

    pub fn is_encrypted(&self) -> bool {
        self.encrypt.is_some()
    }

    pub fn security_handler(&self) -> Option<&dyn SecurityHandler> {
        self.encrypt.as_deref()
    }

    /// First half of the file identifier, used by key derivation.
    fn id_bytes(&self) -> Vec<u8> {
        self.trailer
            .get_array(b"ID")
            .and_then(|ids| ids.first())
            .and_then(Value::as_string)
            .map(|s| s.as_bytes().to_vec())
            .unwrap_or_default()
    }

    fn ensure_file_id(&mut self) {
        if self.trailer.get_array(b"ID").is_some_and(|ids| ids.len() == 2) {
            return;
        }
        let mut hash = Md5::new();
        hash.update(chrono::Local::now().timestamp_nanos_opt().unwrap_or(0).to_le_bytes());
        hash.update((self.collection.len() as u64).to_le_bytes());
        hash.update(b"pdfkern");
        let digest: [u8; 16] = hash.finalize().into();
        let id = PdfString::hex(digest.to_vec());
        self.trailer.set(
            "ID",
            vec![Value::String(id.clone()), Value::String(id)],
        );
    }

    /// Make sure the handler has keys and its dictionary object exists.
    fn prepare_encryption(&mut self) -> Result<()> {
        self.ensure_file_id();
        let doc_id = self.id_bytes();
        let Some(handler) = self.encrypt.as_mut() else {
            return Ok(());
        };
        if handler.authenticated().is_none() {
            handler.generate_keys(&doc_id)?;
        }
        let dict = handler.to_dictionary();
        match self.encrypt_ref {
            Some(id) => {
                let obj = self.collection.get_mut(id).ok_or_else(|| {
                    PdfError::new(
                        ErrorKind::InternalLogic,
                        format!("encryption object {id} vanished"),
                    )
                })?;
                *obj.value_mut() = Value::Dictionary(dict);
            }
            None => {
                let id = self.collection.create(None);
                *self
                    .collection
                    .get_mut(id)
                    .expect("just created")
                    .value_mut() = Value::Dictionary(dict);
                self.encrypt_ref = Some(id);
            }
        }
        self.trailer
            .set("Encrypt", Value::Reference(self.encrypt_ref.expect("set above")));
        Ok(())
    }

    pub fn save(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let file = File::create(path).map_err(PdfError::from)?;
        let mut device = OutputDevice::new(BufWriter::new(file));
        self.save_to(&mut device)?;
        device.flush()
    }

    /// Serialise the complete document.
    pub fn save_to<W: Write + Seek>(&mut self, device: &mut OutputDevice<W>) -> Result<()> {
        if self.encrypt.is_some() {
            self.prepare_encryption()?;
        } else {
            self.trailer.remove(b"Encrypt");
            self.ensure_file_id();
        }
        let ctx = WriteContext {
            collection: &self.collection,
            trailer: &self.trailer,
            version: self.version,
            mode: self.config.write_mode,
            encrypt: self.encrypt.as_mut().map(|handler| EncryptContext {
                handler: handler.as_mut(),
                encrypt_ref: self.encrypt_ref,
            }),
            cancel: self.config.cancel.as_ref(),
        };
        writer::write_full(ctx, device).frame("writing document")
    }

    pub fn save_incremental(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let file = File::create(path).map_err(PdfError::from)?;
        let mut device = OutputDevice::new(BufWriter::new(file));
        self.save_incremental_to(&mut device)?;
        device.flush()
    }

    /// Append the dirty objects to a verbatim replay of the source bytes.
    pub fn save_incremental_to<W: Write + Seek>(
        &mut self,
        device: &mut OutputDevice<W>,
    ) -> Result<()> {
        self.write_incremental(device, None).map(|_| ())
    }

    /// Incremental save that reserves a detached-signature region. The
    /// returned beacon names the two byte ranges to sign;
    /// [`writer::apply_signature`] patches the DER blob in afterwards.
    pub fn save_incremental_signed<W: Write + Seek>(
        &mut self,
        device: &mut OutputDevice<W>,
    ) -> Result<SignatureBeacon> {
        let sig = self.pending_signature.ok_or_else(|| {
            PdfError::new(
                ErrorKind::InvalidHandle,
                "no signature field; call create_signature_field first",
            )
        })?;
        let request = SignatureRequest {
            object: sig,
            capacity: self.config.signature_capacity,
        };
        let beacon = self.write_incremental(device, Some(request))?;
        self.pending_signature = None;
        beacon.ok_or_else(|| {
            PdfError::new(ErrorKind::InternalLogic, "writer returned no beacon")
        })
    }

    fn write_incremental<W: Write + Seek>(
        &mut self,
        device: &mut OutputDevice<W>,
        signature: Option<SignatureRequest>,
    ) -> Result<Option<SignatureBeacon>> {
        let source = self.source.clone().ok_or_else(|| {
            PdfError::new(
                ErrorKind::InvalidHandle,
                "incremental save requires a document loaded from bytes",
            )
        })?;
        let prev = self.prev_startxref.ok_or_else(|| {
            PdfError::new(ErrorKind::InvalidXRef, "source document has no startxref")
        })?;
        if self.linearized {
            warn!("incremental update of a linearised document voids its linearisation");
        }
        let ctx = WriteContext {
            collection: &self.collection,
            trailer: &self.trailer,
            version: self.version,
            mode: self.config.write_mode,
            encrypt: self.encrypt.as_mut().map(|handler| EncryptContext {
                handler: handler.as_mut(),
                encrypt_ref: self.encrypt_ref,
            }),
            cancel: self.config.cancel.as_ref(),
        };
        writer::write_incremental(ctx, &source, prev, signature, device)
            .frame("writing incremental update")
    }

    /// Create a signature dictionary plus its widget annotation on `page`,
    /// wiring `/Annots` and the catalog's `/AcroForm`. Returns the
    /// signature dictionary's reference; the next
    /// [`save_incremental_signed`](Self::save_incremental_signed) reserves
    /// its byte range.
    pub fn create_signature_field(
        &mut self,
        page: Reference,
        rect: [f64; 4],
        field_name: &str,
    ) -> Result<Reference> {
        if self.collection.get(page).is_none() {
            return Err(PdfError::new(
                ErrorKind::ObjectNotFound,
                format!("page {page} is not in this document"),
            ));
        }

        let sig = self.collection.create(Some("Sig"));
        {
            let dict = self
                .collection
                .get_mut(sig)
                .expect("just created")
                .dict_mut()?;
            dict.set("Filter", Name::from("Adobe.PPKLite"));
            dict.set("SubFilter", Name::from("adbe.pkcs7.detached"));
            dict.set("Contents", PdfString::hex(Vec::new()));
            dict.set(
                "ByteRange",
                vec![
                    Value::Integer(0),
                    Value::Integer(0),
                    Value::Integer(0),
                    Value::Integer(0),
                ],
            );
            dict.set("M", PdfString::literal(
                dates::format_pdf_date(chrono::Local::now()).into_bytes(),
            ));
        }

        let annot = self.collection.create(Some("Annot"));
        {
            let dict = self
                .collection
                .get_mut(annot)
                .expect("just created")
                .dict_mut()?;
            dict.set("Subtype", Name::from("Widget"));
            dict.set("FT", Name::from("Sig"));
            dict.set(
                "Rect",
                rect.iter().map(|&v| Value::Real(v)).collect::<Vec<_>>(),
            );
            // Print | Locked.
            dict.set("F", 132i64);
            dict.set("T", PdfString::literal(field_name.as_bytes().to_vec()));
            dict.set("V", Value::Reference(sig));
            dict.set("P", Value::Reference(page));
        }

        self.push_page_annotation(page, annot)?;
        self.register_acroform_field(annot)?;
        self.pending_signature = Some(sig);
        Ok(sig)
    }

    fn push_page_annotation(&mut self, page: Reference, annot: Reference) -> Result<()> {
        // /Annots may be inline, indirect, or absent.
        let target = {
            let page_dict = self
                .collection
                .get(page)
                .expect("checked by caller")
                .dict()?;
            page_dict.get(b"Annots").and_then(Value::as_reference)
        };
        let annots_holder = match target {
            Some(list_ref) => self.collection.get_mut(list_ref).ok_or_else(|| {
                PdfError::new(
                    ErrorKind::ObjectNotFound,
                    format!("page /Annots {list_ref} does not resolve"),
                )
            })?,
            None => self.collection.get_mut(page).expect("checked by caller"),
        };

        match target {
            Some(_) => {
                let list = annots_holder.value_mut().as_array_mut().ok_or_else(|| {
                    PdfError::new(ErrorKind::InvalidDataType, "/Annots is not an array")
                })?;
                list.push(Value::Reference(annot));
            }
            None => {
                let dict = annots_holder.dict_mut()?;
                match dict.get_mut(b"Annots").and_then(Value::as_array_mut) {
                    Some(list) => list.push(Value::Reference(annot)),
                    None => dict.set("Annots", vec![Value::Reference(annot)]),
                }
            }
        }
        Ok(())
    }

    fn register_acroform_field(&mut self, field: Reference) -> Result<()> {
        let catalog_id = self.catalog_ref()?;
        let acroform = self
            .catalog()?
            .dict()?
            .get(b"AcroForm")
            .and_then(Value::as_reference);

        match acroform {
            Some(form_ref) => {
                let form = self.collection.get_mut(form_ref).ok_or_else(|| {
                    PdfError::new(
                        ErrorKind::ObjectNotFound,
                        format!("/AcroForm {form_ref} does not resolve"),
                    )
                })?;
                let dict = form.dict_mut()?;
                dict.set("SigFlags", 3i64);
                match dict.get_mut(b"Fields").and_then(Value::as_array_mut) {
                    Some(fields) => fields.push(Value::Reference(field)),
                    None => dict.set("Fields", vec![Value::Reference(field)]),
                }
            }
            None => {
                let form = self.collection.create(None);
                {
                    let dict = self
                        .collection
                        .get_mut(form)
                        .expect("just created")
                        .dict_mut()?;
                    dict.set("Fields", vec![Value::Reference(field)]);
                    dict.set("SigFlags", 3i64);
                }
                self.collection
                    .get_mut(catalog_id)
                    .expect("catalog checked")
                    .dict_mut()?
                    .set("AcroForm", Value::Reference(form));
            }
        }
        Ok(())
    }

    /// Decrypt every string and stream in place after authentication.
    fn decrypt_all(&mut self, handler: &mut dyn SecurityHandler) -> Result<()> {
        let skip_metadata = !handler.encrypt_metadata();
        let encrypt_ref = self.encrypt_ref;
        for object in self.collection.iter_mut() {
            let id = object.reference();
            if Some(id) == encrypt_ref {
                continue;
            }
            let is_metadata = object
                .value()
                .as_dict()
                .and_then(|d| d.get_name(b"Type"))
                .is_some_and(|n| *n == "Metadata");

            decrypt_strings(object.value_mut(), id, handler)?;

            if object.has_stream() && !(skip_metadata && is_metadata) {
                let raw = object
                    .stream()
                    .expect("has_stream checked")
                    .raw_bytes()
                    .to_vec();
                let plain = handler
                    .decrypt(id, &raw)
                    .frame_with(|| format!("decrypting stream of object {id}"))?;
                object
                    .stream_mut()
                    .expect("has_stream checked")
                    .set_raw(plain);
                // /Length now reflects the plaintext.
                let len = object.stream().expect("set above").encoded_len();
                if let Ok(dict) = object.dict_mut() {
                    dict.set("Length", len as i64);
                }
            }
        }
        self.collection.mark_all_clean();
        Ok(())
    }
}

fn decrypt_strings(
    value: &mut Value,
    id: Reference,
    handler: &mut dyn SecurityHandler,
) -> Result<()> {
    match value {
        Value::String(s) => {
            let plain = handler.decrypt(id, s.as_bytes())?;
            s.set_bytes(plain);
            Ok(())
        }
        Value::Array(items) => items
            .iter_mut()
            .try_for_each(|v| decrypt_strings(v, id, handler)),
        Value::Dictionary(dict) => dict
            .iter_mut()
            .try_for_each(|(_, v)| decrypt_strings(v, id, handler)),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_document_has_catalog_and_info() {
        let doc = Document::new(EngineConfig::default());
        let catalog = doc.catalog().unwrap();
        assert_eq!(
            catalog.dict().unwrap().get_name(b"Type").unwrap().as_bytes(),
            b"Catalog"
        );
        assert!(doc.trailer().get(b"Info").is_some());
    }

    #[test]
    fn info_entries_roundtrip() {
        let mut doc = Document::new(EngineConfig::default());
        doc.set_info_entry("Title", "Jahresbericht").unwrap();
        doc.set_info_entry("Author", "Müller GmbH").unwrap();
        assert_eq!(doc.info_entry("Title").unwrap(), "Jahresbericht");
        assert_eq!(doc.info_entry("Author").unwrap(), "Müller GmbH");
    }

    #[test]
    fn incremental_save_needs_a_source() {
        let mut doc = Document::new(EngineConfig::default());
        let mut device = OutputDevice::new(std::io::Cursor::new(Vec::new()));
        let err = doc.save_incremental_to(&mut device).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidHandle);
    }

    #[test]
    fn file_id_is_generated_once() {
        let mut doc = Document::new(EngineConfig::default());
        doc.ensure_file_id();
        let first = doc.trailer().get_array(b"ID").unwrap().to_vec();
        doc.ensure_file_id();
        assert_eq!(doc.trailer().get_array(b"ID").unwrap(), &first[..]);
    }
}
