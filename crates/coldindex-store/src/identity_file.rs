//! On-disk layout for one index: `index.db`, `identity.json`, `manifest.json`
//! beneath `indexes/idx_<16-hex>/`.
//!
//! `identity.json` is written purely for interpretability — a human or
//! another tool can read the canonical parameter tuple that produced this
//! index without opening the store. [`check_coherence`] enforces that its
//! hash matches the sole `IndexSet`'s `index_set_id`.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::error::StoreError;
use crate::Result;

/// Paths making up one index's on-disk footprint.
pub struct IndexLayout {
    pub dir: PathBuf,
}

impl IndexLayout {
    /// `<data_root>/indexes/<dir_name>/`.
    pub fn new(data_root: &Path, dir_name: &str) -> Self {
        Self {
            dir: data_root.join("indexes").join(dir_name),
        }
    }

    pub fn store_path(&self) -> PathBuf {
        self.dir.join("index.db")
    }

    pub fn identity_path(&self) -> PathBuf {
        self.dir.join("identity.json")
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.dir.join("manifest.json")
    }
}

/// Write `identity.json`, creating the index directory if needed.
pub fn write_identity_file(layout: &IndexLayout, canonical_json: &str) -> Result<()> {
    std::fs::create_dir_all(&layout.dir)?;
    std::fs::write(layout.identity_path(), canonical_json)?;
    Ok(())
}

/// Copy the manifest that produced this index alongside it, for provenance.
pub fn write_manifest_file(layout: &IndexLayout, manifest_toml: &str) -> Result<()> {
    std::fs::create_dir_all(&layout.dir)?;
    std::fs::write(layout.manifest_path(), manifest_toml)?;
    Ok(())
}

/// Hash a canonical identity payload the same way `coldindex_core::identity`
/// derives `index_set_id`, so the two can be compared directly.
pub fn hash_identity_payload(canonical_json: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(canonical_json.as_bytes());
    format!("idx_{}", hex::encode(hasher.finalize()))
}

/// If `identity.json` is present, its hash must equal `index_set_id`.
/// Absence of the file is not a fault (older stores, or stores opened by
/// path alone without the surrounding directory layout).
pub fn check_coherence(layout: &IndexLayout, index_set_id: &str) -> Result<()> {
    let path = layout.identity_path();
    if !path.exists() {
        return Ok(());
    }
    let contents = std::fs::read_to_string(&path)?;
    let actual = hash_identity_payload(&contents);
    if actual != index_set_id {
        return Err(StoreError::IdentityFileMismatch {
            path: path.display().to_string(),
            expected: index_set_id.to_string(),
            actual,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_paths_match_convention() {
        let layout = IndexLayout::new(Path::new("/data"), "idx_deadbeefcafebabe");
        assert_eq!(
            layout.store_path(),
            Path::new("/data/indexes/idx_deadbeefcafebabe/index.db")
        );
        assert_eq!(
            layout.identity_path(),
            Path::new("/data/indexes/idx_deadbeefcafebabe/identity.json")
        );
    }

    #[test]
    fn coherence_check_passes_for_matching_hash() {
        let dir = tempfile::tempdir().unwrap();
        let layout = IndexLayout::new(dir.path(), "idx_test");
        let canonical = r#"{"base_uri":"s3://bucket/"}"#;
        write_identity_file(&layout, canonical).unwrap();
        let expected_id = hash_identity_payload(canonical);
        check_coherence(&layout, &expected_id).unwrap();
    }

    #[test]
    fn coherence_check_fails_for_mismatched_hash() {
        let dir = tempfile::tempdir().unwrap();
        let layout = IndexLayout::new(dir.path(), "idx_test");
        write_identity_file(&layout, r#"{"base_uri":"s3://bucket/"}"#).unwrap();
        let err = check_coherence(&layout, "idx_wrong").unwrap_err();
        assert!(matches!(err, StoreError::IdentityFileMismatch { .. }));
    }

    #[test]
    fn coherence_check_is_noop_when_file_absent() {
        let dir = tempfile::tempdir().unwrap();
        let layout = IndexLayout::new(dir.path(), "idx_test");
        check_coherence(&layout, "idx_whatever").unwrap();
    }
}
