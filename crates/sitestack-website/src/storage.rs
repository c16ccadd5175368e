//! Storage container and object helpers

use crate::assets::fingerprint;
use crate::services::BucketSpec;
use crate::types::ResourceTags;
use sitestack_cloud::{CloudError, Result};
use std::path::Path;

pub fn bucket_spec(bucket: &str, tags: ResourceTags) -> BucketSpec {
    BucketSpec {
        bucket: bucket.to_string(),
        force_destroy: true,
        tags,
    }
}

pub fn bucket_arn(bucket: &str) -> String {
    format!("arn:aws:s3:::{}", bucket)
}

/// Regional endpoint the distribution uses as its origin
pub fn regional_domain_name(bucket: &str, region: &str) -> String {
    format!("{}.s3.{}.amazonaws.com", bucket, region)
}

/// Read an asset and check it still matches the fingerprint it was declared with
pub async fn read_asset(source: &Path, expected_fingerprint: &str) -> Result<Vec<u8>> {
    let body = tokio::fs::read(source)
        .await
        .map_err(|e| CloudError::AssetRead {
            path: source.display().to_string(),
            message: e.to_string(),
        })?;
    let actual = fingerprint(&body);
    if actual != expected_fingerprint {
        return Err(CloudError::AssetRead {
            path: source.display().to_string(),
            message: "file changed after the stack was synthesized".to_string(),
        });
    }
    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bucket_names() {
        assert_eq!(bucket_arn("site-assets-example"), "arn:aws:s3:::site-assets-example");
        assert_eq!(
            regional_domain_name("site-assets-example", "us-east-1"),
            "site-assets-example.s3.us-east-1.amazonaws.com"
        );
        assert!(bucket_spec("b", ResourceTags::default()).force_destroy);
    }

    #[tokio::test]
    async fn test_read_asset_checks_fingerprint() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.html");
        std::fs::write(&path, "<html></html>").unwrap();

        let body = read_asset(&path, &fingerprint(b"<html></html>")).await.unwrap();
        assert_eq!(body, b"<html></html>".to_vec());

        let stale = read_asset(&path, &fingerprint(b"old")).await.unwrap_err();
        assert!(!stale.is_fatal());

        let missing = read_asset(&dir.path().join("gone.html"), "x").await.unwrap_err();
        assert!(matches!(missing, CloudError::AssetRead { .. }));
    }
}
