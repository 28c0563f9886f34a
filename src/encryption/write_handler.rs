//! Encrypting a parsed document in place.
//!
//! Every string and stream in every indirect object is encrypted with a
//! per-object key (Algorithm 1), then the /Encrypt dictionary is attached
//! to the trailer. The document is serialized as a full rewrite.

use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, StringFormat};
use md5::{Digest, Md5};
use rand::RngCore;
use zeroize::Zeroizing;

use super::aes::aes128_encrypt;
use super::algorithms;
use super::rc4::rc4_crypt;
use super::{EncryptionAlgorithm, Permissions};
use crate::document;
use crate::error::{Error, Result};

/// Work handed to the encryption worker.
pub(crate) struct EncryptionJob {
    pub document: Vec<u8>,
    pub user_password: Zeroizing<String>,
    pub owner_password: Zeroizing<String>,
    pub permissions: Permissions,
    pub algorithm: EncryptionAlgorithm,
}

/// Values written to the /Encrypt dictionary.
pub(crate) struct SecurityHandler {
    pub algorithm: EncryptionAlgorithm,
    pub owner_hash: Vec<u8>,
    pub user_hash: Vec<u8>,
    pub permissions: i32,
    pub file_id: Vec<u8>,
    key: Vec<u8>,
}

impl SecurityHandler {
    /// Derive /O, /U and the file key from the passwords (Algorithms 2, 3, 5).
    pub fn derive(
        user_password: &[u8],
        owner_password: &[u8],
        permissions: i32,
        file_id: Vec<u8>,
        algorithm: EncryptionAlgorithm,
    ) -> Result<Self> {
        let (_, revision) = algorithm.version_revision();
        let key_length = algorithm.key_length();

        let owner_hash =
            algorithms::compute_owner_hash(owner_password, user_password, revision, key_length);
        let key = algorithms::compute_encryption_key(
            user_password,
            &owner_hash,
            permissions,
            &file_id,
            revision,
            key_length,
        );
        let user_hash = algorithms::compute_user_hash(&key, &file_id, revision);

        let handler = Self {
            algorithm,
            owner_hash,
            user_hash,
            permissions,
            file_id,
            key,
        };
        handler.check_passwords(user_password, owner_password)?;
        Ok(handler)
    }

    /// Both passwords must open the document before it is written out.
    fn check_passwords(&self, user_password: &[u8], owner_password: &[u8]) -> Result<()> {
        let (_, revision) = self.algorithm.version_revision();
        let key_length = self.algorithm.key_length();

        let as_user = algorithms::authenticate_user_password(
            user_password,
            &self.user_hash,
            &self.owner_hash,
            self.permissions,
            &self.file_id,
            revision,
            key_length,
        );
        let as_owner = algorithms::authenticate_owner_password(
            owner_password,
            &self.user_hash,
            &self.owner_hash,
            self.permissions,
            &self.file_id,
            revision,
            key_length,
        );

        match (as_user, as_owner) {
            (Some(user_key), Some(owner_key)) if user_key == self.key && owner_key == self.key => {
                Ok(())
            },
            _ => Err(Error::Crypto(
                "Security handler self-check failed: passwords do not recover the file key"
                    .to_string(),
            )),
        }
    }

    /// Per-object key (Algorithm 1).
    fn object_key(&self, (number, generation): ObjectId) -> Vec<u8> {
        let mut hasher = Md5::new();
        hasher.update(&self.key);
        hasher.update(&number.to_le_bytes()[..3]);
        hasher.update(generation.to_le_bytes());
        if self.algorithm.is_aes() {
            hasher.update(b"sAlT");
        }
        let hash = hasher.finalize();
        hash[..(self.key.len() + 5).min(16)].to_vec()
    }

    /// Encrypt one string or stream body belonging to `id`.
    pub fn encrypt_bytes(&self, id: ObjectId, data: &[u8]) -> Result<Vec<u8>> {
        let key = self.object_key(id);
        match self.algorithm {
            EncryptionAlgorithm::Rc4_128 => Ok(rc4_crypt(&key, data)),
            EncryptionAlgorithm::Aes128 => {
                let mut iv = [0u8; 16];
                rand::thread_rng().fill_bytes(&mut iv);
                let ciphertext =
                    aes128_encrypt(&key, &iv, data).map_err(|e| Error::Crypto(e.to_string()))?;
                let mut output = Vec::with_capacity(iv.len() + ciphertext.len());
                output.extend_from_slice(&iv);
                output.extend(ciphertext);
                Ok(output)
            },
        }
    }

    /// Encrypt every string and stream reachable inside one indirect object.
    pub fn encrypt_object(&self, id: ObjectId, object: &mut Object) -> Result<()> {
        match object {
            Object::String(bytes, format) => {
                *bytes = self.encrypt_bytes(id, bytes)?;
                *format = StringFormat::Hexadecimal;
            },
            Object::Array(items) => {
                for item in items.iter_mut() {
                    self.encrypt_object(id, item)?;
                }
            },
            Object::Dictionary(dict) => self.encrypt_dictionary(id, dict)?,
            Object::Stream(stream) => {
                if is_type(&stream.dict, b"XRef") {
                    return Ok(());
                }
                self.encrypt_dictionary(id, &mut stream.dict)?;
                let content = self.encrypt_bytes(id, &stream.content)?;
                stream.set_content(content);
            },
            _ => {},
        }
        Ok(())
    }

    fn encrypt_dictionary(&self, id: ObjectId, dict: &mut Dictionary) -> Result<()> {
        // Signature values are never encrypted.
        let is_signature = is_type(dict, b"Sig");
        for (key, value) in dict.iter_mut() {
            if is_signature && key.as_slice() == b"Contents" {
                continue;
            }
            self.encrypt_object(id, value)?;
        }
        Ok(())
    }

    /// The /Encrypt dictionary.
    pub fn encrypt_dictionary_object(&self) -> Dictionary {
        let (version, revision) = self.algorithm.version_revision();
        let mut dict = dictionary! {
            "Filter" => "Standard",
            "V" => version,
            "R" => revision as i64,
            "Length" => (self.algorithm.key_length() * 8) as i64,
            "O" => Object::String(self.owner_hash.clone(), StringFormat::Hexadecimal),
            "U" => Object::String(self.user_hash.clone(), StringFormat::Hexadecimal),
            "P" => self.permissions as i64,
        };
        if self.algorithm.is_aes() {
            dict.set(
                "CF",
                dictionary! {
                    "StdCF" => dictionary! {
                        "Type" => "CryptFilter",
                        "CFM" => "AESV2",
                        "AuthEvent" => "DocOpen",
                        "Length" => self.algorithm.key_length() as i64,
                    },
                },
            );
            dict.set("StmF", "StdCF");
            dict.set("StrF", "StdCF");
            dict.set("EncryptMetadata", true);
        }
        dict
    }
}

fn is_type(dict: &Dictionary, name: &[u8]) -> bool {
    dict.get(b"Type")
        .and_then(Object::as_name)
        .map(|value| value == name)
        .unwrap_or(false)
}

/// First element of the trailer /ID, creating a fresh identifier if absent.
fn ensure_file_id(doc: &mut Document) -> Vec<u8> {
    if let Ok(Object::Array(ids)) = doc.trailer.get(b"ID") {
        if let Some(Object::String(first, _)) = ids.first() {
            if !first.is_empty() {
                return first.clone();
            }
        }
    }

    let mut id = vec![0u8; 16];
    rand::thread_rng().fill_bytes(&mut id);
    doc.trailer.set(
        "ID",
        vec![
            Object::String(id.clone(), StringFormat::Hexadecimal),
            Object::String(id.clone(), StringFormat::Hexadecimal),
        ],
    );
    id
}

fn bump_version(doc: &mut Document, minimum: &str) {
    let current: f32 = doc.version.parse().unwrap_or(1.0);
    let required: f32 = minimum.parse().unwrap_or(1.0);
    if current < required {
        log::debug!("Raising PDF version from {} to {}", doc.version, minimum);
        doc.version = minimum.to_string();
    }
}

/// Parse, encrypt, and serialize a document.
pub(crate) fn encrypt_document(job: &EncryptionJob) -> Result<Vec<u8>> {
    let mut doc = document::load(&job.document)?;

    let file_id = ensure_file_id(&mut doc);
    let handler = SecurityHandler::derive(
        job.user_password.as_bytes(),
        job.owner_password.as_bytes(),
        job.permissions.p_value(),
        file_id,
        job.algorithm,
    )?;

    let ids: Vec<ObjectId> = doc.objects.keys().copied().collect();
    for id in &ids {
        if let Some(object) = doc.objects.get_mut(id) {
            handler.encrypt_object(*id, object)?;
        }
    }
    log::debug!("Encrypted {} objects with {:?}", ids.len(), job.algorithm);

    let encrypt_id = doc.add_object(handler.encrypt_dictionary_object());
    doc.trailer.set("Encrypt", Object::Reference(encrypt_id));
    bump_version(&mut doc, job.algorithm.min_pdf_version());

    document::save(&mut doc)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handler(algorithm: EncryptionAlgorithm) -> SecurityHandler {
        SecurityHandler::derive(b"user-pass", b"owner-pass", -3904, b"0123456789abcdef".to_vec(), algorithm)
            .unwrap()
    }

    #[test]
    fn test_object_keys_differ_per_object() {
        let handler = handler(EncryptionAlgorithm::Aes128);
        let first = handler.object_key((1, 0));
        assert_eq!(first.len(), 16);
        assert_ne!(first, handler.object_key((2, 0)));
        assert_ne!(first, handler.object_key((1, 1)));
    }

    #[test]
    fn test_aes_string_has_iv_prefix() {
        let handler = handler(EncryptionAlgorithm::Aes128);
        let plain = b"Hello, AES encrypted world!";
        let encrypted = handler.encrypt_bytes((5, 0), plain).unwrap();
        assert_eq!(encrypted.len(), 16 + 32);

        let key = handler.object_key((5, 0));
        let decrypted = super::super::aes::aes128_decrypt(&key, &encrypted[..16], &encrypted[16..]).unwrap();
        assert_eq!(decrypted, plain);
    }

    #[test]
    fn test_rc4_string_roundtrip() {
        let handler = handler(EncryptionAlgorithm::Rc4_128);
        let encrypted = handler.encrypt_bytes((3, 0), b"secret").unwrap();
        assert_eq!(rc4_crypt(&handler.object_key((3, 0)), &encrypted), b"secret");
    }

    #[test]
    fn test_signature_contents_left_alone() {
        let handler = handler(EncryptionAlgorithm::Aes128);
        let mut object = Object::Dictionary(dictionary! {
            "Type" => "Sig",
            "Contents" => Object::String(vec![0xAB; 8], StringFormat::Hexadecimal),
            "Reason" => Object::string_literal("Approval"),
        });
        handler.encrypt_object((9, 0), &mut object).unwrap();

        let dict = object.as_dict().unwrap();
        assert_eq!(dict.get(b"Contents").unwrap().as_str().unwrap(), &[0xAB; 8]);
        assert_ne!(dict.get(b"Reason").unwrap().as_str().unwrap(), b"Approval");
    }

    #[test]
    fn test_encrypt_dictionary_shape() {
        let dict = handler(EncryptionAlgorithm::Aes128).encrypt_dictionary_object();
        assert_eq!(dict.get(b"V").unwrap().as_i64().unwrap(), 4);
        assert_eq!(dict.get(b"R").unwrap().as_i64().unwrap(), 4);
        assert_eq!(dict.get(b"P").unwrap().as_i64().unwrap(), -3904);
        assert_eq!(dict.get(b"StmF").unwrap().as_name().unwrap(), b"StdCF");

        let rc4 = handler(EncryptionAlgorithm::Rc4_128).encrypt_dictionary_object();
        assert_eq!(rc4.get(b"V").unwrap().as_i64().unwrap(), 2);
        assert!(!rc4.has(b"CF"));
    }

    #[test]
    fn test_encrypt_document_attaches_handler() {
        let job = EncryptionJob {
            document: crate::document::test_support::sample_pdf(2, Some("Quarterly")),
            user_password: Zeroizing::new("user-pass".to_string()),
            owner_password: Zeroizing::new("owner-pass".to_string()),
            permissions: Permissions::default(),
            algorithm: EncryptionAlgorithm::Aes128,
        };
        let output = encrypt_document(&job).unwrap();
        assert!(output.starts_with(b"%PDF-1.6"));
        assert!(!output.windows(9).any(|w| w == b"Quarterly"));
    }
}
