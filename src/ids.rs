//! Record id generators used to fill ids on add/upsert when none are supplied.

use std::fmt::Write as _;

use sha2::{Digest, Sha256};

/// Produces one id per record. `document` is the record's text, when it has one.
pub trait IdGenerator: Send + Sync {
    fn generate(&self, document: Option<&str>) -> String;
}

/// Random v4 UUIDs.
#[derive(Clone, Copy, Debug, Default)]
pub struct UuidGenerator;

impl IdGenerator for UuidGenerator {
    fn generate(&self, _document: Option<&str>) -> String {
        uuid::Uuid::new_v4().to_string()
    }
}

/// Hex SHA-256 of the document text, so identical documents share an id.
/// Records without text hash a fresh UUID instead.
#[derive(Clone, Copy, Debug, Default)]
pub struct Sha256Generator;

impl IdGenerator for Sha256Generator {
    fn generate(&self, document: Option<&str>) -> String {
        let mut hasher = Sha256::new();
        match document.filter(|d| !d.is_empty()) {
            Some(text) => hasher.update(text.as_bytes()),
            None => hasher.update(uuid::Uuid::new_v4().to_string().as_bytes()),
        }
        let digest = hasher.finalize();

        let mut out = String::with_capacity(digest.len() * 2);
        for byte in digest {
            let _ = write!(out, "{byte:02x}");
        }
        out
    }
}
