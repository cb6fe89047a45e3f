//! Helpers for collection naming and REST paths.

use crate::error::{Result, ValidationError};

pub struct CollectionNames;

impl CollectionNames {
    pub const MIN_LEN: usize = 3;
    pub const MAX_LEN: usize = 512;

    /// Validate a collection name.
    ///
    /// Current rules:
    /// - length between `MIN_LEN` and `MAX_LEN`
    /// - only ASCII letters, digits, `.`, `_` or `-`: `[a-zA-Z0-9._-]`
    /// - starts and ends with a letter or digit
    /// - no consecutive periods
    pub fn validate(name: &str) -> Result<()> {
        if name.len() < Self::MIN_LEN || name.len() > Self::MAX_LEN {
            return invalid(format!(
                "`{name}` must be between {} and {} characters",
                Self::MIN_LEN,
                Self::MAX_LEN
            ));
        }

        if !name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'_' | b'-'))
        {
            return invalid(format!("`{name}` must match [a-zA-Z0-9._-]"));
        }

        let bytes = name.as_bytes();
        if !bytes[0].is_ascii_alphanumeric() || !bytes[bytes.len() - 1].is_ascii_alphanumeric() {
            return invalid(format!("`{name}` must start and end with a letter or digit"));
        }

        if name.contains("..") {
            return invalid(format!("`{name}` must not contain consecutive periods"));
        }

        Ok(())
    }
}

fn invalid(reason: String) -> Result<()> {
    Err(ValidationError::InvalidCollectionName(reason).into())
}

/// REST paths relative to the API root.
pub struct ApiPaths;

impl ApiPaths {
    pub const HEARTBEAT: &'static str = "heartbeat";
    pub const VERSION: &'static str = "version";

    pub fn collections(tenant: &str, database: &str) -> String {
        format!("tenants/{tenant}/databases/{database}/collections")
    }

    pub fn collection(tenant: &str, database: &str, name: &str) -> String {
        format!("{}/{name}", Self::collections(tenant, database))
    }

    pub fn collections_count(tenant: &str, database: &str) -> String {
        format!("tenants/{tenant}/databases/{database}/collections_count")
    }

    /// Record endpoint of a collection, e.g. `add`, `get`, `query`, `count`.
    pub fn records(tenant: &str, database: &str, collection_id: &str, action: &str) -> String {
        format!("{}/{collection_id}/{action}", Self::collections(tenant, database))
    }
}

#[cfg(test)]
mod tests {
    use super::{ApiPaths, CollectionNames};
    use crate::error::{ChromaError, ValidationError};

    fn is_name_error(result: crate::error::Result<()>) -> bool {
        matches!(
            result,
            Err(ChromaError::Validation(ValidationError::InvalidCollectionName(_)))
        )
    }

    #[test]
    fn valid_collection_name_passes() {
        assert!(CollectionNames::validate("coll_123").is_ok());
        assert!(CollectionNames::validate("my-docs.v2").is_ok());
    }

    #[test]
    fn short_collection_name_fails() {
        assert!(is_name_error(CollectionNames::validate("ab")));
    }

    #[test]
    fn invalid_chars_collection_name_fails() {
        assert!(is_name_error(CollectionNames::validate("bad name")));
        assert!(is_name_error(CollectionNames::validate("bad$name")));
    }

    #[test]
    fn edges_must_be_alphanumeric() {
        assert!(is_name_error(CollectionNames::validate("_abc")));
        assert!(is_name_error(CollectionNames::validate("abc-")));
    }

    #[test]
    fn consecutive_periods_fail() {
        assert!(is_name_error(CollectionNames::validate("a..b")));
    }

    #[test]
    fn too_long_collection_name_fails() {
        let long_name = "a".repeat(CollectionNames::MAX_LEN + 1);
        assert!(is_name_error(CollectionNames::validate(&long_name)));
    }

    #[test]
    fn record_paths() {
        assert_eq!(
            ApiPaths::records("t", "d", "abc", "add"),
            "tenants/t/databases/d/collections/abc/add"
        );
        assert_eq!(
            ApiPaths::collection("t", "d", "docs"),
            "tenants/t/databases/d/collections/docs"
        );
    }
}
