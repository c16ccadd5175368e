//! Direct asset synchronization against an object store
//!
//! Used when assets are pushed outside of a full apply. An object is written
//! only when the remote copy is missing or carries a different fingerprint.

use crate::assets::{AssetManifest, AssetManifestEntry, fingerprint};
use crate::services::{ObjectStore, ObjectUpload};
use sitestack_cloud::{CloudError, Result, RetryConfig};
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncFailure {
    pub key: String,
    pub message: String,
}

/// Outcome of one synchronization run
#[derive(Debug, Default, Clone)]
pub struct SyncReport {
    pub uploaded: Vec<String>,
    pub skipped: Vec<String>,
    pub failed: Vec<SyncFailure>,
    /// Remote keys with no local file (unreadable local files excluded)
    pub orphans: Vec<String>,
    /// Orphans actually deleted (pruning only)
    pub deleted: Vec<String>,
}

impl SyncReport {
    pub fn writes(&self) -> usize {
        self.uploaded.len() + self.deleted.len()
    }

    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

pub struct AssetSynchronizer<'a> {
    store: &'a dyn ObjectStore,
    bucket: String,
    retry: RetryConfig,
    prune: bool,
}

impl<'a> AssetSynchronizer<'a> {
    pub fn new(store: &'a dyn ObjectStore, bucket: impl Into<String>) -> Self {
        Self {
            store,
            bucket: bucket.into(),
            retry: RetryConfig::default(),
            prune: false,
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Delete remote objects that have no local file
    pub fn with_prune(mut self, prune: bool) -> Self {
        self.prune = prune;
        self
    }

    pub async fn sync(&self, manifest: &AssetManifest) -> Result<SyncReport> {
        let mut report = SyncReport::default();
        for failure in manifest.failures() {
            report.failed.push(failure_of(failure));
        }

        for entry in manifest.entries() {
            match self.sync_entry(entry).await {
                Ok(true) => report.uploaded.push(entry.relative_key.clone()),
                Ok(false) => report.skipped.push(entry.relative_key.clone()),
                Err(e) if !e.is_fatal() => {
                    tracing::warn!("Skipping {}: {}", entry.relative_key, e);
                    report.failed.push(SyncFailure {
                        key: entry.relative_key.clone(),
                        message: e.to_string(),
                    });
                }
                Err(e) => return Err(e),
            }
        }

        let local: BTreeSet<&str> = manifest.keys().collect();
        let remote = self
            .retry
            .retry("list objects", || self.store.list_keys(&self.bucket))
            .await?;
        report.orphans = remote
            .into_iter()
            .filter(|key| !local.contains(key.as_str()))
            .filter(|key| {
                let unreadable = manifest.is_unreadable(key);
                if unreadable {
                    tracing::debug!("Keeping {}: local file could not be read", key);
                }
                !unreadable
            })
            .collect();
        report.orphans.sort();

        if self.prune {
            for key in &report.orphans {
                self.retry
                    .retry(key, || self.store.delete_object(&self.bucket, key))
                    .await?;
                tracing::info!("Deleted s3://{}/{}", self.bucket, key);
                report.deleted.push(key.clone());
            }
        } else if !report.orphans.is_empty() {
            tracing::warn!(
                "{} remote objects have no local file (enable pruning to delete)",
                report.orphans.len()
            );
        }

        tracing::info!(
            "Synced {} into {}: {} uploaded, {} unchanged, {} failed",
            manifest.root.display(),
            self.bucket,
            report.uploaded.len(),
            report.skipped.len(),
            report.failed.len()
        );
        Ok(report)
    }

    /// Returns whether the object was written
    async fn sync_entry(&self, entry: &AssetManifestEntry) -> Result<bool> {
        let key = &entry.relative_key;
        let remote = self
            .retry
            .retry(key, || self.store.head_object(&self.bucket, key))
            .await?;
        let unchanged = remote.as_ref().is_some_and(|info| {
            info.fingerprint.as_deref() == Some(entry.content_fingerprint.as_str())
                && info.content_type == entry.content_type
        });
        if unchanged {
            tracing::debug!("{} is unchanged", key);
            return Ok(false);
        }

        let body = tokio::fs::read(&entry.source_path)
            .await
            .map_err(|e| CloudError::AssetRead {
                path: entry.source_path.display().to_string(),
                message: e.to_string(),
            })?;
        let upload = ObjectUpload {
            key: key.clone(),
            fingerprint: fingerprint(&body),
            content_type: entry.content_type.clone(),
            body,
        };
        self.retry
            .retry(key, || self.store.put_object(&self.bucket, upload.clone()))
            .await?;
        tracing::debug!("Uploaded {}", key);
        Ok(true)
    }
}

fn failure_of(error: &CloudError) -> SyncFailure {
    match error {
        CloudError::AssetRead { path, message } => SyncFailure {
            key: path.clone(),
            message: message.clone(),
        },
        other => SyncFailure {
            key: String::new(),
            message: other.to_string(),
        },
    }
}
