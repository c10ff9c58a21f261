//! A `Listing`/`DelimiterListing` implementation over a local directory
//! tree, standing in for a real object-store client so `coldindex build` is
//! runnable end to end without cloud credentials.

use std::fmt;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use coldindex_core::provider::{
    BoxProviderError, DelimiterListingPage, ListingPage, ObjectSummary, ProviderError,
};
use walkdir::WalkDir;

#[derive(Debug)]
pub struct LocalFsError(String);

impl fmt::Display for LocalFsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "local filesystem provider error: {}", self.0)
    }
}

impl std::error::Error for LocalFsError {}

impl ProviderError for LocalFsError {
    fn is_not_found(&self) -> bool {
        true
    }
}

/// Walks `root` on disk, presenting file paths relative to `root` as object
/// keys. Pagination and continuation tokens are no-ops: a local walk is
/// cheap enough to materialize in one pass.
pub struct LocalFsProvider {
    root: PathBuf,
}

impl LocalFsProvider {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn rel_key(&self, path: &Path) -> Option<String> {
        let rel = path.strip_prefix(&self.root).ok()?;
        let key = rel.to_str()?.replace(std::path::MAIN_SEPARATOR, "/");
        Some(key)
    }
}

#[async_trait]
impl coldindex_core::provider::Listing for LocalFsProvider {
    async fn list(
        &self,
        prefix: &str,
        _continuation_token: Option<&str>,
    ) -> Result<ListingPage, BoxProviderError> {
        let base = self.root.join(prefix);
        let mut objects = Vec::new();
        for entry in WalkDir::new(&base).into_iter().filter_map(|e| e.ok()) {
            if !entry.file_type().is_file() {
                continue;
            }
            let Some(key) = self.rel_key(entry.path()) else {
                continue;
            };
            let metadata = entry.metadata().map_err(|e| {
                Box::new(LocalFsError(e.to_string())) as BoxProviderError
            })?;
            objects.push(ObjectSummary {
                key,
                size: metadata.len(),
                etag: format!("{:x}", metadata.len()),
                last_modified: metadata.modified().ok().map(chrono::DateTime::<chrono::Utc>::from),
            });
        }
        Ok(ListingPage {
            objects,
            continuation_token: None,
            is_truncated: false,
        })
    }
}

#[async_trait]
impl coldindex_core::provider::DelimiterListing for LocalFsProvider {
    async fn list_with_delimiter(
        &self,
        prefix: &str,
        _delimiter: &str,
        _continuation_token: Option<&str>,
    ) -> Result<DelimiterListingPage, BoxProviderError> {
        let base = self.root.join(prefix);
        let mut objects = Vec::new();
        let mut common_prefixes = Vec::new();

        let entries = std::fs::read_dir(&base)
            .map_err(|e| Box::new(LocalFsError(e.to_string())) as BoxProviderError)?;
        for entry in entries {
            let entry = entry.map_err(|e| Box::new(LocalFsError(e.to_string())) as BoxProviderError)?;
            let path = entry.path();
            if path.is_dir() {
                if let Some(key) = self.rel_key(&path) {
                    common_prefixes.push(format!("{key}/"));
                }
            } else if let Some(key) = self.rel_key(&path) {
                let metadata = entry
                    .metadata()
                    .map_err(|e| Box::new(LocalFsError(e.to_string())) as BoxProviderError)?;
                objects.push(ObjectSummary {
                    key,
                    size: metadata.len(),
                    etag: format!("{:x}", metadata.len()),
                    last_modified: metadata.modified().ok().map(chrono::DateTime::<chrono::Utc>::from),
                });
            }
        }
        common_prefixes.sort();
        objects.sort_by(|a, b| a.key.cmp(&b.key));

        Ok(DelimiterListingPage {
            objects,
            common_prefixes,
            continuation_token: None,
            is_truncated: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coldindex_core::provider::{DelimiterListing, Listing};
    use std::fs;

    #[tokio::test]
    async fn lists_nested_files_with_relative_keys() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("2025/01")).unwrap();
        fs::write(dir.path().join("2025/01/a.txt"), b"hello").unwrap();
        fs::write(dir.path().join("2025/01/b.txt"), b"world!").unwrap();

        let provider = LocalFsProvider::new(dir.path());
        let page = provider.list("2025/01", None).await.unwrap();
        let mut keys: Vec<_> = page.objects.iter().map(|o| o.key.clone()).collect();
        keys.sort();
        assert_eq!(keys, vec!["2025/01/a.txt".to_string(), "2025/01/b.txt".to_string()]);
    }

    #[tokio::test]
    async fn delimiter_listing_reports_subdirectories_as_common_prefixes() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("2025/01")).unwrap();
        fs::create_dir_all(dir.path().join("2025/02")).unwrap();

        let provider = LocalFsProvider::new(dir.path());
        let page = provider
            .list_with_delimiter("2025", "/", None)
            .await
            .unwrap();
        assert_eq!(
            page.common_prefixes,
            vec!["2025/01/".to_string(), "2025/02/".to_string()]
        );
        assert!(page.objects.is_empty());
    }
}
