//! Embedded file attachments: `/EmbeddedFiles` name tree, file
//! specification dictionaries, and the catalog's `/AF` array.

use crate::core::{ErrorKind, PdfError, Result};
use crate::document::Document;
use crate::filter::FilterKind;
use crate::object::{Dictionary, Name, PdfString, Reference, Value};

impl Document {
    /// Embed a file under `name`. The payload lands in a Flate-compressed
    /// embedded-file stream; the file specification joins both the
    /// `/EmbeddedFiles` name tree and the catalog's `/AF` array so viewers
    /// with either lookup path find it. Re-attaching an existing name
    /// replaces it.
    pub fn attach_file(
        &mut self,
        name: &str,
        data: &[u8],
        description: Option<&str>,
    ) -> Result<Reference> {
        if self.find_attachment(name)?.is_some() {
            self.remove_attachment(name)?;
        }

        let ef_stream = self.create_object(Some("EmbeddedFile"));
        {
            let obj = self.get_object_mut(ef_stream).expect("just created");
            obj.begin_stream_append(&[FilterKind::Flate], true)?;
            obj.append_stream(data)?;
            obj.end_stream_append()?;
            let mut params = Dictionary::new();
            params.set("Size", data.len() as i64);
            obj.dict_mut()?.set("Params", params);
        }

        let filespec = self.create_object(Some("Filespec"));
        {
            let dict = self.get_object_mut(filespec).expect("just created").dict_mut()?;
            dict.set("F", PdfString::literal(name.as_bytes().to_vec()));
            dict.set("UF", PdfString::literal(name.as_bytes().to_vec()));
            if let Some(description) = description {
                dict.set(
                    "Desc",
                    PdfString::literal(description.as_bytes().to_vec()),
                );
            }
            let mut ef = Dictionary::new();
            ef.set("F", Value::Reference(ef_stream));
            ef.set("UF", Value::Reference(ef_stream));
            dict.set("EF", ef);
        }

        self.register_in_name_tree(name, filespec)?;
        self.register_in_af(filespec)?;
        Ok(filespec)
    }

    /// Names of all embedded files, in name-tree order.
    pub fn attachment_names(&self) -> Vec<String> {
        let Some(pairs) = self.embedded_files_pairs() else {
            return Vec::new();
        };
        pairs.into_iter().map(|(name, _)| name).collect()
    }

    /// Decoded payload of the attachment called `name`.
    pub fn attachment(&self, name: &str) -> Result<Vec<u8>> {
        let filespec = self.find_attachment(name)?.ok_or_else(|| {
            PdfError::new(
                ErrorKind::ObjectNotFound,
                format!("no embedded file named `{name}`"),
            )
        })?;
        self.attachment_payload(filespec)
    }

    /// Drop an attachment from the name tree and the `/AF` array. The
    /// stream object itself is freed as well.
    pub fn remove_attachment(&mut self, name: &str) -> Result<()> {
        let filespec = self.find_attachment(name)?.ok_or_else(|| {
            PdfError::new(
                ErrorKind::ObjectNotFound,
                format!("no embedded file named `{name}`"),
            )
        })?;

        if let Some(tree_ref) = self.embedded_files_tree() {
            if let Some(obj) = self.get_object_mut(tree_ref) {
                if let Some(names) = obj
                    .dict_mut()?
                    .get_mut(b"Names")
                    .and_then(Value::as_array_mut)
                {
                    let mut i = 0;
                    while i + 1 < names.len() {
                        if names[i + 1] == Value::Reference(filespec) {
                            names.drain(i..i + 2);
                        } else {
                            i += 2;
                        }
                    }
                }
            }
        }

        let catalog_id = self.catalog_ref()?;
        if let Some(obj) = self.get_object_mut(catalog_id) {
            if let Some(af) = obj.dict_mut()?.get_mut(b"AF").and_then(Value::as_array_mut) {
                af.retain(|v| *v != Value::Reference(filespec));
            }
        }

        let stream_ref = self
            .get_object(filespec)
            .and_then(|obj| obj.value().as_dict())
            .and_then(|d| d.get_dict(b"EF"))
            .and_then(|ef| ef.get(b"F").or_else(|| ef.get(b"UF")))
            .and_then(Value::as_reference);
        if let Some(stream_ref) = stream_ref {
            self.remove_object(stream_ref);
        }
        self.remove_object(filespec);
        Ok(())
    }

    /// File specification for `name`, looked up via the name tree first,
    /// then via `/AF`.
    fn find_attachment(&self, name: &str) -> Result<Option<Reference>> {
        if let Some(pairs) = self.embedded_files_pairs() {
            for (entry, filespec) in pairs {
                if entry == name {
                    return Ok(Some(filespec));
                }
            }
        }

        // Associated-files fallback: match /UF or /F on each filespec.
        let catalog = self.catalog()?.dict()?;
        let Some(af) = catalog.get_array(b"AF") else {
            return Ok(None);
        };
        for entry in af {
            let Some(filespec) = entry.as_reference() else { continue };
            let Some(dict) = self
                .get_object(filespec)
                .and_then(|o| o.value().as_dict())
            else {
                continue;
            };
            let fname = dict
                .get(b"UF")
                .or_else(|| dict.get(b"F"))
                .and_then(Value::as_string)
                .map(PdfString::to_text);
            if fname.as_deref() == Some(name) {
                return Ok(Some(filespec));
            }
        }
        Ok(None)
    }

    fn attachment_payload(&self, filespec: Reference) -> Result<Vec<u8>> {
        let dict = self
            .get_object(filespec)
            .and_then(|o| o.value().as_dict())
            .ok_or_else(|| {
                PdfError::new(
                    ErrorKind::InvalidObject,
                    format!("file specification {filespec} is not a dictionary"),
                )
            })?;
        let ef = dict.get_dict(b"EF").ok_or_else(|| {
            PdfError::new(
                ErrorKind::InvalidObject,
                format!("file specification {filespec} has no /EF entry"),
            )
        })?;
        let stream_ref = ef
            .get(b"F")
            .or_else(|| ef.get(b"UF"))
            .and_then(Value::as_reference)
            .ok_or_else(|| {
                PdfError::new(
                    ErrorKind::InvalidObject,
                    "embedded file entry is not a reference",
                )
            })?;
        self.stream_bytes(stream_ref)
    }

    /// The `/Names` -> `/EmbeddedFiles` tree object, if present. Only flat
    /// trees (a single node with `/Names`) are produced by this crate;
    /// intermediate `/Kids` nodes are left to the page-level helpers.
    fn embedded_files_tree(&self) -> Option<Reference> {
        let catalog = self.catalog().ok()?.dict().ok()?;
        let names = catalog.get(b"Names")?;
        let names_dict = match names {
            Value::Reference(r) => self.get_object(*r)?.value().as_dict()?,
            Value::Dictionary(d) => d,
            _ => return None,
        };
        names_dict.get(b"EmbeddedFiles").and_then(Value::as_reference)
    }

    fn embedded_files_pairs(&self) -> Option<Vec<(String, Reference)>> {
        let tree = self.embedded_files_tree()?;
        let names = self
            .get_object(tree)?
            .value()
            .as_dict()?
            .get_array(b"Names")?;
        let mut pairs = Vec::with_capacity(names.len() / 2);
        for chunk in names.chunks(2) {
            if let [Value::String(name), Value::Reference(filespec)] = chunk {
                pairs.push((name.to_text(), *filespec));
            }
        }
        Some(pairs)
    }

    fn register_in_name_tree(&mut self, name: &str, filespec: Reference) -> Result<()> {
        let tree = match self.embedded_files_tree() {
            Some(tree) => tree,
            None => {
                let tree = self.create_object(None);
                {
                    let dict = self.get_object_mut(tree).expect("just created").dict_mut()?;
                    dict.set("Names", Vec::<Value>::new());
                }
                // /Names may be inline or indirect; an inline dictionary is
                // extended in place.
                let names_ref = {
                    let catalog = self.catalog()?.dict()?;
                    catalog.get(b"Names").and_then(Value::as_reference)
                };
                match names_ref {
                    Some(names_ref) => {
                        self.get_object_mut(names_ref)
                            .ok_or_else(|| {
                                PdfError::new(
                                    ErrorKind::ObjectNotFound,
                                    format!("/Names {names_ref} does not resolve"),
                                )
                            })?
                            .dict_mut()?
                            .set("EmbeddedFiles", Value::Reference(tree));
                    }
                    None => {
                        let catalog_id = self.catalog_ref()?;
                        let catalog = self
                            .get_object_mut(catalog_id)
                            .expect("catalog checked")
                            .dict_mut()?;
                        match catalog.get_mut(b"Names").and_then(Value::as_dict_mut) {
                            Some(names) => names.set("EmbeddedFiles", Value::Reference(tree)),
                            None => {
                                let mut names = Dictionary::new();
                                names.set("EmbeddedFiles", Value::Reference(tree));
                                catalog.set("Names", names);
                            }
                        }
                    }
                }
                tree
            }
        };

        // Name trees are sorted by key; insert at the right position.
        let obj = self.get_object_mut(tree).ok_or_else(|| {
            PdfError::new(ErrorKind::ObjectNotFound, "name tree vanished")
        })?;
        let names = obj
            .dict_mut()?
            .get_mut(b"Names")
            .and_then(Value::as_array_mut)
            .ok_or_else(|| {
                PdfError::new(ErrorKind::InvalidDataType, "/Names is not an array")
            })?;
        let mut insert_at = names.len();
        for (i, chunk) in names.chunks(2).enumerate() {
            if let Some(Value::String(existing)) = chunk.first() {
                if existing.as_bytes() > name.as_bytes() {
                    insert_at = i * 2;
                    break;
                }
            }
        }
        names.insert(insert_at, Value::Reference(filespec));
        names.insert(insert_at, Value::String(PdfString::literal(name.as_bytes().to_vec())));
        Ok(())
    }

    fn register_in_af(&mut self, filespec: Reference) -> Result<()> {
        let catalog_id = self.catalog_ref()?;
        let catalog = self
            .get_object_mut(catalog_id)
            .ok_or_else(|| PdfError::new(ErrorKind::BrokenFile, "catalog is missing"))?
            .dict_mut()?;
        match catalog.get_mut(b"AF").and_then(Value::as_array_mut) {
            Some(af) => af.push(Value::Reference(filespec)),
            None => catalog.set("AF", vec![Value::Reference(filespec)]),
        }
        Ok(())
    }

    /// Install the document-level XMP metadata stream (uncompressed, as
    /// archival profiles require).
    pub fn set_xmp_metadata(&mut self, xmp: &[u8]) -> Result<()> {
        let existing = self
            .catalog()?
            .dict()?
            .get(b"Metadata")
            .and_then(Value::as_reference);
        let metadata = match existing {
            Some(r) if self.get_object(r).is_some() => r,
            _ => {
                let r = self.create_object(Some("Metadata"));
                let catalog_id = self.catalog_ref()?;
                self.get_object_mut(catalog_id)
                    .expect("catalog checked")
                    .dict_mut()?
                    .set("Metadata", Value::Reference(r));
                r
            }
        };
        let obj = self.get_object_mut(metadata).expect("checked above");
        obj.begin_stream_append(&[], true)?;
        obj.append_stream(xmp)?;
        obj.end_stream_append()?;
        let dict = obj.dict_mut()?;
        dict.set("Type", Name::from("Metadata"));
        dict.set("Subtype", Name::from("XML"));
        Ok(())
    }

    /// The document-level XMP metadata stream, if any.
    pub fn xmp_metadata(&self) -> Result<Option<Vec<u8>>> {
        let Some(metadata) = self
            .catalog()?
            .dict()?
            .get(b"Metadata")
            .and_then(Value::as_reference)
        else {
            return Ok(None);
        };
        self.stream_bytes(metadata).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use crate::core::EngineConfig;
    use crate::document::Document;

    #[test]
    fn attach_list_extract_remove() {
        let mut doc = Document::new(EngineConfig::default());
        doc.attach_file("report.xml", b"<xml/>", Some("invoice data"))
            .unwrap();
        doc.attach_file("data.bin", &[0u8, 1, 2, 3], None).unwrap();

        assert_eq!(doc.attachment_names(), vec!["data.bin", "report.xml"]);
        assert_eq!(doc.attachment("report.xml").unwrap(), b"<xml/>");
        assert_eq!(doc.attachment("data.bin").unwrap(), vec![0, 1, 2, 3]);

        doc.remove_attachment("report.xml").unwrap();
        assert_eq!(doc.attachment_names(), vec!["data.bin"]);
        assert!(doc.attachment("report.xml").is_err());
    }

    #[test]
    fn reattaching_replaces() {
        let mut doc = Document::new(EngineConfig::default());
        doc.attach_file("a.txt", b"one", None).unwrap();
        doc.attach_file("a.txt", b"two", None).unwrap();
        assert_eq!(doc.attachment_names(), vec!["a.txt"]);
        assert_eq!(doc.attachment("a.txt").unwrap(), b"two");
    }

    #[test]
    fn name_tree_stays_sorted() {
        let mut doc = Document::new(EngineConfig::default());
        for name in ["zulu.txt", "alpha.txt", "mike.txt"] {
            doc.attach_file(name, b"x", None).unwrap();
        }
        assert_eq!(
            doc.attachment_names(),
            vec!["alpha.txt", "mike.txt", "zulu.txt"]
        );
    }

    #[test]
    fn xmp_metadata_roundtrip() {
        let mut doc = Document::new(EngineConfig::default());
        assert!(doc.xmp_metadata().unwrap().is_none());
        let xmp = b"<?xpacket begin=\"\"?><x:xmpmeta/><?xpacket end=\"w\"?>";
        doc.set_xmp_metadata(xmp).unwrap();
        assert_eq!(doc.xmp_metadata().unwrap().unwrap(), xmp);
    }
}
