//! Local asset tree scanning
//!
//! Produces the manifest that both synchronization modes work from: one
//! entry per regular file under the asset root, keyed by its relative path
//! with `/` separators, carrying a content type and a SHA-256 fingerprint of
//! the file bytes.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sitestack_cloud::{CloudError, Result};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Component, Path, PathBuf};

/// Remote object key separator
pub const KEY_SEPARATOR: &str = "/";

/// Fixed extension → MIME mapping
const CONTENT_TYPES: &[(&str, &str)] = &[
    ("html", "text/html"),
    ("htm", "text/html"),
    ("css", "text/css"),
    ("js", "application/javascript"),
    ("mjs", "application/javascript"),
    ("json", "application/json"),
    ("map", "application/json"),
    ("webmanifest", "application/manifest+json"),
    ("xml", "application/xml"),
    ("txt", "text/plain"),
    ("md", "text/markdown"),
    ("csv", "text/csv"),
    ("svg", "image/svg+xml"),
    ("png", "image/png"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("gif", "image/gif"),
    ("webp", "image/webp"),
    ("avif", "image/avif"),
    ("ico", "image/x-icon"),
    ("woff", "font/woff"),
    ("woff2", "font/woff2"),
    ("ttf", "font/ttf"),
    ("otf", "font/otf"),
    ("eot", "application/vnd.ms-fontobject"),
    ("wasm", "application/wasm"),
    ("pdf", "application/pdf"),
    ("zip", "application/zip"),
    ("mp3", "audio/mpeg"),
    ("wav", "audio/wav"),
    ("mp4", "video/mp4"),
    ("webm", "video/webm"),
];

/// Content type for a file, `None` when the extension is not mapped
pub fn content_type_for(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    CONTENT_TYPES
        .iter()
        .find(|(e, _)| *e == ext)
        .map(|(_, mime)| *mime)
}

/// SHA-256 of the content, lower-case hex
pub fn fingerprint(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Object key for a path relative to the asset root
pub fn key_for(relative: &Path) -> Result<String> {
    let mut parts = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => {
                let part = part.to_str().ok_or_else(|| CloudError::AssetRead {
                    path: relative.display().to_string(),
                    message: "file name is not valid UTF-8".to_string(),
                })?;
                parts.push(part);
            }
            Component::CurDir => {}
            _ => {
                return Err(CloudError::AssetRead {
                    path: relative.display().to_string(),
                    message: "path is not relative to the asset root".to_string(),
                });
            }
        }
    }
    if parts.is_empty() {
        return Err(CloudError::AssetRead {
            path: relative.display().to_string(),
            message: "empty path".to_string(),
        });
    }
    Ok(parts.join(KEY_SEPARATOR))
}

/// Relative path for an object key (inverse of [`key_for`])
pub fn path_for(key: &str) -> PathBuf {
    key.split(KEY_SEPARATOR).collect()
}

/// First directory between `root` and the file that is a symlink
fn linked_ancestor(root: &Path, relative: &Path) -> Option<PathBuf> {
    let parent = relative.parent()?;
    let mut current = root.to_path_buf();
    for component in parent.components() {
        current.push(component);
        let linked = std::fs::symlink_metadata(&current)
            .map(|meta| meta.file_type().is_symlink())
            .unwrap_or(false);
        if linked {
            return Some(current);
        }
    }
    None
}

/// One file of the asset tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetManifestEntry {
    pub relative_key: String,
    pub source_path: PathBuf,
    pub content_type: Option<String>,
    pub content_fingerprint: String,
    pub size: u64,
}

/// All files of an asset tree, plus the files that could not be read
#[derive(Debug, Default)]
pub struct AssetManifest {
    pub root: PathBuf,
    entries: BTreeMap<String, AssetManifestEntry>,
    failures: Vec<CloudError>,
    /// Keys of files that exist but could not be read
    failed_keys: BTreeSet<String>,
}

impl AssetManifest {
    /// Scan every regular file under `root`
    ///
    /// A file that cannot be read is recorded in [`AssetManifest::failures`]
    /// and left out; it does not fail the scan. A missing root does.
    pub fn scan(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        if !root.is_dir() {
            return Err(CloudError::Configuration(format!(
                "asset directory {} does not exist",
                root.display()
            )));
        }
        let root = root.canonicalize()?;
        let root_str = root.to_str().ok_or_else(|| {
            CloudError::Configuration(format!(
                "asset directory {} is not valid UTF-8",
                root.display()
            ))
        })?;
        let pattern = format!("{}/**/*", glob::Pattern::escape(root_str));

        let mut manifest = AssetManifest {
            root: root.clone(),
            ..Default::default()
        };

        let paths = glob::glob(&pattern).map_err(|e| CloudError::Configuration(e.to_string()))?;
        for found in paths {
            match found {
                Ok(path) => manifest.add_file(&root, &path),
                Err(e) => {
                    let key = e
                        .path()
                        .strip_prefix(&root)
                        .ok()
                        .and_then(|relative| key_for(relative).ok());
                    manifest.record_failure(e.path(), key, e.error().to_string());
                }
            }
        }

        tracing::debug!(
            "Scanned {}: {} files, {} unreadable",
            root.display(),
            manifest.entries.len(),
            manifest.failures.len()
        );
        Ok(manifest)
    }

    fn add_file(&mut self, root: &Path, path: &Path) {
        let relative = match path.strip_prefix(root) {
            Ok(relative) => relative,
            Err(e) => {
                self.record_failure(path, None, e.to_string());
                return;
            }
        };
        if let Some(link) = linked_ancestor(root, relative) {
            tracing::debug!("Skipping {}: {} is a symlink", path.display(), link.display());
            return;
        }
        match std::fs::symlink_metadata(path) {
            Ok(meta) if meta.file_type().is_file() => {}
            Ok(_) => return,
            Err(e) => {
                self.record_failure(path, key_for(relative).ok(), e.to_string());
                return;
            }
        }

        let key = match key_for(relative) {
            Ok(key) => key,
            Err(e) => {
                tracing::warn!("Skipping {}: {}", path.display(), e);
                self.failures.push(e);
                return;
            }
        };

        match std::fs::read(path) {
            Ok(bytes) => {
                let entry = AssetManifestEntry {
                    relative_key: key.clone(),
                    source_path: path.to_path_buf(),
                    content_type: content_type_for(path).map(str::to_string),
                    content_fingerprint: fingerprint(&bytes),
                    size: bytes.len() as u64,
                };
                self.entries.insert(key, entry);
            }
            Err(e) => self.record_failure(path, Some(key), e.to_string()),
        }
    }

    /// A failure with a known key is reported under that key
    fn record_failure(&mut self, path: &Path, key: Option<String>, message: String) {
        tracing::warn!("Cannot read {}: {}", path.display(), message);
        let path = match key {
            Some(key) => {
                self.failed_keys.insert(key.clone());
                key
            }
            None => path.display().to_string(),
        };
        self.failures.push(CloudError::AssetRead { path, message });
    }

    /// Record `key` as present but unreadable, as a scan would
    pub fn with_unreadable(mut self, key: impl Into<String>, message: impl Into<String>) -> Self {
        let key = key.into();
        self.entries.remove(&key);
        self.failed_keys.insert(key.clone());
        self.failures.push(CloudError::AssetRead {
            path: key,
            message: message.into(),
        });
        self
    }

    pub fn get(&self, key: &str) -> Option<&AssetManifestEntry> {
        self.entries.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Entries ordered by key
    pub fn entries(&self) -> impl Iterator<Item = &AssetManifestEntry> {
        self.entries.values()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn failures(&self) -> &[CloudError] {
        &self.failures
    }

    /// Keys whose files exist but could not be read; their remote copies
    /// are not orphans
    pub fn failed_keys(&self) -> impl Iterator<Item = &str> {
        self.failed_keys.iter().map(String::as_str)
    }

    /// Whether `key` is, or lies under, a path that could not be read
    pub fn is_unreadable(&self, key: &str) -> bool {
        self.failed_keys.iter().any(|failed| {
            key == failed
                || key
                    .strip_prefix(failed.as_str())
                    .is_some_and(|rest| rest.starts_with(KEY_SEPARATOR))
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn site_tree() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("index.html"), "<html></html>").unwrap();
        fs::write(dir.path().join("app.js"), "console.log(1)").unwrap();
        fs::create_dir(dir.path().join("img")).unwrap();
        fs::write(dir.path().join("img").join("logo.png"), [0x89, 0x50, 0x4e, 0x47]).unwrap();
        dir
    }

    #[test]
    fn test_content_types() {
        assert_eq!(content_type_for(Path::new("index.html")), Some("text/html"));
        assert_eq!(content_type_for(Path::new("INDEX.HTML")), Some("text/html"));
        assert_eq!(
            content_type_for(Path::new("app.js")),
            Some("application/javascript")
        );
        assert_eq!(content_type_for(Path::new("img/logo.png")), Some("image/png"));
        assert_eq!(content_type_for(Path::new("data.unknownext")), None);
        assert_eq!(content_type_for(Path::new("LICENSE")), None);
    }

    #[test]
    fn test_fingerprint_is_content_based() {
        assert_eq!(fingerprint(b"hello"), fingerprint(b"hello"));
        assert_ne!(fingerprint(b"hello"), fingerprint(b"hello!"));
        assert_eq!(
            fingerprint(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_key_round_trip() {
        for rel in ["index.html", "img/logo.png", "a/b/c/d.txt", "with space/x y.css"] {
            let path = PathBuf::from(rel);
            let key = key_for(&path).unwrap();
            assert_eq!(key, rel);
            assert_eq!(path_for(&key), path);
        }
    }

    #[test]
    fn test_key_rejects_escaping_paths() {
        assert!(key_for(Path::new("../secret")).is_err());
        assert!(key_for(Path::new("/etc/passwd")).is_err());
        assert_eq!(key_for(Path::new("./index.html")).unwrap(), "index.html");
    }

    #[test]
    fn test_scan_scenario_tree() {
        let dir = site_tree();
        let manifest = AssetManifest::scan(dir.path()).unwrap();

        let keys: Vec<&str> = manifest.keys().collect();
        assert_eq!(keys, vec!["app.js", "img/logo.png", "index.html"]);
        assert!(manifest.failures().is_empty());

        let logo = manifest.get("img/logo.png").unwrap();
        assert_eq!(logo.content_type.as_deref(), Some("image/png"));
        assert_eq!(logo.size, 4);
        assert_eq!(logo.content_fingerprint, fingerprint(&[0x89, 0x50, 0x4e, 0x47]));
    }

    #[test]
    fn test_scan_skips_directories_and_includes_hidden_files() {
        let dir = site_tree();
        fs::create_dir(dir.path().join("empty")).unwrap();
        fs::write(dir.path().join(".well-known"), "x").unwrap();

        let manifest = AssetManifest::scan(dir.path()).unwrap();
        assert!(!manifest.contains("empty"));
        assert!(manifest.contains(".well-known"));
        assert_eq!(manifest.len(), 4);
    }

    #[cfg(unix)]
    #[test]
    fn test_scan_skips_symlinks() {
        let dir = site_tree();
        std::os::unix::fs::symlink(
            dir.path().join("index.html"),
            dir.path().join("alias.html"),
        )
        .unwrap();

        let manifest = AssetManifest::scan(dir.path()).unwrap();
        assert!(!manifest.contains("alias.html"));
    }

    #[cfg(unix)]
    #[test]
    fn test_scan_does_not_follow_linked_directories() {
        let dir = site_tree();
        let outside = tempfile::tempdir().unwrap();
        fs::write(outside.path().join("secret.txt"), "not for the bucket").unwrap();
        std::os::unix::fs::symlink(outside.path(), dir.path().join("linked")).unwrap();

        let manifest = AssetManifest::scan(dir.path()).unwrap();
        let keys: Vec<&str> = manifest.keys().collect();
        assert_eq!(keys, vec!["app.js", "img/logo.png", "index.html"]);
        assert!(manifest.failures().is_empty());
    }

    #[test]
    fn test_unreadable_key_is_reported_by_key() {
        let dir = site_tree();
        let manifest = AssetManifest::scan(dir.path())
            .unwrap()
            .with_unreadable("app.js", "Permission denied");

        assert!(!manifest.contains("app.js"));
        assert!(manifest.is_unreadable("app.js"));
        assert_eq!(manifest.failed_keys().collect::<Vec<_>>(), vec!["app.js"]);

        let nested = AssetManifest::scan(dir.path())
            .unwrap()
            .with_unreadable("img", "Permission denied");
        assert!(nested.is_unreadable("img/logo.png"));
        assert!(!nested.is_unreadable("img-old/logo.png"));
        assert!(matches!(
            &manifest.failures()[0],
            CloudError::AssetRead { path, .. } if path == "app.js"
        ));
    }

    #[test]
    fn test_scan_missing_root() {
        let dir = tempfile::tempdir().unwrap();
        let result = AssetManifest::scan(dir.path().join("dist"));
        assert!(matches!(result, Err(CloudError::Configuration(_))));
    }

    #[test]
    fn test_unchanged_tree_has_same_fingerprints() {
        let dir = site_tree();
        let first = AssetManifest::scan(dir.path()).unwrap();
        let second = AssetManifest::scan(dir.path()).unwrap();
        for entry in first.entries() {
            assert_eq!(
                second.get(&entry.relative_key).unwrap().content_fingerprint,
                entry.content_fingerprint
            );
        }
    }
}
