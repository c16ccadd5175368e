//! Provider service traits
//!
//! Each trait covers one provider subsystem and is treated as a black box:
//! it accepts a resource specification and returns identifiers and status.
//! Throttling and temporary outages must be reported as
//! `CloudError::TransientProvider` so the executor can retry them.

use crate::distribution::DistributionConfig;
use crate::policy::BucketPolicyDocument;
use crate::types::{DomainName, ResourceTags};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sitestack_cloud::Result;

// ============ Storage ============

/// Desired storage container
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BucketSpec {
    pub bucket: String,
    pub force_destroy: bool,
    pub tags: ResourceTags,
}

/// Storage container as reported by the provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BucketInfo {
    pub name: String,
    pub arn: String,
    pub regional_domain_name: String,
}

/// Stored object metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectInfo {
    pub key: String,
    pub content_type: Option<String>,
    /// Content fingerprint stored alongside the object
    pub fingerprint: Option<String>,
}

/// Object write request
#[derive(Debug, Clone)]
pub struct ObjectUpload {
    pub key: String,
    pub body: Vec<u8>,
    pub content_type: Option<String>,
    pub fingerprint: String,
}

#[async_trait]
pub trait StorageService: Send + Sync {
    /// Create the bucket, or return it when this account already owns it
    ///
    /// A bucket name taken by someone else is a `Conflict`.
    async fn ensure_bucket(&self, spec: &BucketSpec) -> Result<BucketInfo>;

    /// Replace the bucket's access policy
    async fn put_bucket_policy(&self, bucket: &str, policy: &BucketPolicyDocument) -> Result<()>;

    async fn delete_bucket_policy(&self, bucket: &str) -> Result<()>;

    async fn delete_bucket(&self, bucket: &str, force_destroy: bool) -> Result<()>;
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn head_object(&self, bucket: &str, key: &str) -> Result<Option<ObjectInfo>>;

    async fn put_object(&self, bucket: &str, upload: ObjectUpload) -> Result<ObjectInfo>;

    async fn list_keys(&self, bucket: &str) -> Result<Vec<String>>;

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<()>;
}

// ============ Certificates ============

/// DNS record the certificate authority wants to see
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationRecord {
    pub name: String,
    pub record_type: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status", content = "reason")]
pub enum CertificateStatus {
    Pending,
    Validated,
    Failed(String),
}

/// Certificate request as reported by the provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CertificateRequest {
    pub arn: String,
    pub domain: DomainName,
    pub validation_method: String,
    pub validation_record: ValidationRecord,
    pub status: CertificateStatus,
}

#[async_trait]
pub trait CertificateAuthority: Send + Sync {
    /// Request a DNS-validated certificate
    ///
    /// A domain the authority refuses (e.g. CAA policy) is reported as a
    /// `Provider` error carrying the authority's message.
    async fn request_certificate(
        &self,
        domain: &DomainName,
        tags: &ResourceTags,
    ) -> Result<CertificateRequest>;

    async fn describe_certificate(&self, arn: &str) -> Result<CertificateRequest>;

    async fn delete_certificate(&self, arn: &str) -> Result<()>;
}

// ============ DNS ============

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostedZone {
    pub id: String,
    pub name: String,
    pub private: bool,
}

/// Alias target of an alias record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AliasTarget {
    pub dns_name: String,
    pub hosted_zone_id: String,
    pub evaluate_target_health: bool,
}

/// A DNS record set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsRecord {
    pub name: String,
    pub record_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<AliasTarget>,
}

impl DnsRecord {
    /// Record names compare without the trailing dot and case-insensitively
    pub fn same_name(&self, name: &str) -> bool {
        normalize_record_name(&self.name) == normalize_record_name(name)
    }

    pub fn fqdn(&self) -> String {
        normalize_record_name(&self.name)
    }
}

pub fn normalize_record_name(name: &str) -> String {
    name.trim_end_matches('.').to_ascii_lowercase()
}

#[async_trait]
pub trait DnsService: Send + Sync {
    /// Hosted zones whose name is exactly `name`
    async fn find_zones(&self, name: &str) -> Result<Vec<HostedZone>>;

    async fn find_record(
        &self,
        zone_id: &str,
        name: &str,
        record_type: &str,
    ) -> Result<Option<DnsRecord>>;

    /// Create a record; fails with `Conflict` if one with the same name and
    /// type already exists
    async fn create_record(&self, zone_id: &str, record: &DnsRecord) -> Result<()>;

    /// Replace a record this stack owns
    async fn replace_record(&self, zone_id: &str, record: &DnsRecord) -> Result<()>;

    async fn delete_record(&self, zone_id: &str, record: &DnsRecord) -> Result<()>;
}

// ============ CDN ============

/// Origin access control (signed requests from the CDN to the origin)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OriginAccessControlSpec {
    pub name: String,
    pub description: String,
    pub origin_type: String,
    pub signing_behavior: String,
    pub signing_protocol: String,
}

/// Distribution as reported by the provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistributionInfo {
    pub id: String,
    pub arn: String,
    pub domain_name: String,
    pub hosted_zone_id: String,
}

#[async_trait]
pub trait CdnService: Send + Sync {
    async fn create_origin_access_control(&self, spec: &OriginAccessControlSpec) -> Result<String>;

    async fn delete_origin_access_control(&self, id: &str) -> Result<()>;

    async fn create_distribution(
        &self,
        config: &DistributionConfig,
        tags: &ResourceTags,
    ) -> Result<DistributionInfo>;

    /// Replace the configuration and tags of an existing distribution
    async fn update_distribution(
        &self,
        id: &str,
        config: &DistributionConfig,
        tags: &ResourceTags,
    ) -> Result<DistributionInfo>;

    async fn delete_distribution(&self, id: &str) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_name_comparison() {
        let record = DnsRecord {
            name: "_abc.Example.com.".to_string(),
            record_type: "CNAME".to_string(),
            ttl: Some(60),
            values: vec!["_x.acm-validations.aws.".to_string()],
            alias: None,
        };
        assert!(record.same_name("_abc.example.com"));
        assert_eq!(record.fqdn(), "_abc.example.com");
    }

    #[test]
    fn test_certificate_status_serialization() {
        let json = serde_json::to_value(CertificateStatus::Failed("CAA".into())).unwrap();
        assert_eq!(json, serde_json::json!({ "status": "failed", "reason": "CAA" }));
        let json = serde_json::to_value(CertificateStatus::Validated).unwrap();
        assert_eq!(json, serde_json::json!({ "status": "validated" }));
    }
}
