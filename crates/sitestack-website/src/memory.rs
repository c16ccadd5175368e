//! In-memory cloud
//!
//! Implements every service trait against process memory so a whole stack
//! can be applied without network access: the `simulate` command and the
//! scenario tests run on it. Behaviour follows the real services where it
//! matters for provisioning: names taken elsewhere conflict, certificates
//! validate only once their validation record is published, a distribution
//! needs a validated certificate and an existing origin access control.

use crate::assets::fingerprint;
use crate::distribution::DistributionConfig;
use crate::policy::BucketPolicyDocument;
use crate::services::{
    BucketInfo, BucketSpec, CdnService, CertificateAuthority, CertificateRequest,
    CertificateStatus, DistributionInfo, DnsRecord, DnsService, HostedZone, ObjectInfo,
    ObjectStore, ObjectUpload, OriginAccessControlSpec, StorageService, ValidationRecord,
};
use crate::storage::{bucket_arn, regional_domain_name};
use crate::types::{DomainName, ResourceTags};
use async_trait::async_trait;
use sitestack_cloud::{CloudError, Result};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard};

const ACCOUNT_ID: &str = "123456789012";

/// Hosted zone id every distribution alias targets
pub const CDN_HOSTED_ZONE_ID: &str = "Z2FDTNDATAQYW2";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub body: Vec<u8>,
    pub content_type: Option<String>,
    pub fingerprint: String,
}

#[derive(Debug, Default)]
struct Bucket {
    tags: ResourceTags,
    policy: Option<BucketPolicyDocument>,
    objects: BTreeMap<String, StoredObject>,
}

#[derive(Debug)]
struct Certificate {
    request: CertificateRequest,
    tags: ResourceTags,
    polls_validated: u32,
}

#[derive(Debug)]
struct Zone {
    zone: HostedZone,
    records: Vec<DnsRecord>,
}

#[derive(Debug)]
struct Distribution {
    info: DistributionInfo,
    config: DistributionConfig,
    tags: ResourceTags,
}

#[derive(Debug)]
struct Inner {
    region: String,
    next_id: u64,
    buckets: BTreeMap<String, Bucket>,
    foreign_buckets: BTreeSet<String>,
    puts: usize,
    transient_puts: u32,
    certificates: BTreeMap<String, Certificate>,
    rejected_domains: BTreeMap<String, String>,
    validation_delay: u32,
    zones: Vec<Zone>,
    origin_access_controls: BTreeMap<String, OriginAccessControlSpec>,
    origin_access_control_failure: Option<String>,
    distributions: BTreeMap<String, Distribution>,
}

impl Inner {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn zone_mut(&mut self, zone_id: &str) -> Result<&mut Zone> {
        self.zones
            .iter_mut()
            .find(|z| z.zone.id == zone_id)
            .ok_or_else(|| {
                CloudError::provider(format!("hosted zone {}", zone_id), "NoSuchHostedZone")
            })
    }

    fn bucket_mut(&mut self, bucket: &str) -> Result<&mut Bucket> {
        self.buckets
            .get_mut(bucket)
            .ok_or_else(|| CloudError::provider(format!("bucket {}", bucket), "NoSuchBucket"))
    }

    fn record_published(&self, validation: &ValidationRecord) -> bool {
        self.zones.iter().flat_map(|z| z.records.iter()).any(|r| {
            r.same_name(&validation.name)
                && r.record_type == validation.record_type
                && r.values.contains(&validation.value)
        })
    }
}

/// Process-local implementation of every provider service
#[derive(Debug)]
pub struct MemoryCloud {
    inner: Mutex<Inner>,
}

impl Default for MemoryCloud {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryCloud {
    pub fn new() -> Self {
        Self::in_region("us-east-1")
    }

    pub fn in_region(region: &str) -> Self {
        Self {
            inner: Mutex::new(Inner {
                region: region.to_string(),
                next_id: 0,
                buckets: BTreeMap::new(),
                foreign_buckets: BTreeSet::new(),
                puts: 0,
                transient_puts: 0,
                certificates: BTreeMap::new(),
                rejected_domains: BTreeMap::new(),
                validation_delay: 0,
                zones: Vec::new(),
                origin_access_controls: BTreeMap::new(),
                origin_access_control_failure: None,
                distributions: BTreeMap::new(),
            }),
        }
    }

    fn inner(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    // ============ Setup ============

    pub fn add_zone(&self, name: &str, private: bool) -> HostedZone {
        let mut inner = self.inner();
        let id = format!("Z{:08}", inner.next_id());
        let zone = HostedZone {
            id,
            name: name.trim_end_matches('.').to_ascii_lowercase(),
            private,
        };
        inner.zones.push(Zone {
            zone: zone.clone(),
            records: Vec::new(),
        });
        zone
    }

    /// Mark a bucket name as owned by another account
    pub fn claim_bucket_elsewhere(&self, bucket: &str) {
        self.inner().foreign_buckets.insert(bucket.to_string());
    }

    /// The authority refuses to issue for `domain` with `message`
    pub fn reject_domain(&self, domain: &str, message: &str) {
        self.inner()
            .rejected_domains
            .insert(domain.to_ascii_lowercase(), message.to_string());
    }

    /// Number of polls a published validation record needs before the
    /// certificate turns validated
    pub fn set_validation_delay(&self, polls: u32) {
        self.inner().validation_delay = polls;
    }

    pub fn fail_origin_access_control(&self, message: &str) {
        self.inner().origin_access_control_failure = Some(message.to_string());
    }

    /// The next `count` object writes fail with a throttling error
    pub fn throttle_puts(&self, count: u32) {
        self.inner().transient_puts = count;
    }

    // ============ Inspection ============

    /// Successful object writes so far
    pub fn put_count(&self) -> usize {
        self.inner().puts
    }

    pub fn object(&self, bucket: &str, key: &str) -> Option<StoredObject> {
        self.inner()
            .buckets
            .get(bucket)
            .and_then(|b| b.objects.get(key).cloned())
    }

    pub fn object_keys(&self, bucket: &str) -> Vec<String> {
        self.inner()
            .buckets
            .get(bucket)
            .map(|b| b.objects.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn bucket_tags(&self, bucket: &str) -> Option<ResourceTags> {
        self.inner().buckets.get(bucket).map(|b| b.tags.clone())
    }

    pub fn bucket_policy(&self, bucket: &str) -> Option<BucketPolicyDocument> {
        self.inner()
            .buckets
            .get(bucket)
            .and_then(|b| b.policy.clone())
    }

    pub fn certificates(&self) -> Vec<CertificateRequest> {
        self.inner()
            .certificates
            .values()
            .map(|c| c.request.clone())
            .collect()
    }

    pub fn certificate_tags(&self, arn: &str) -> Option<ResourceTags> {
        self.inner().certificates.get(arn).map(|c| c.tags.clone())
    }

    pub fn distributions(&self) -> Vec<(DistributionInfo, DistributionConfig)> {
        self.inner()
            .distributions
            .values()
            .map(|d| (d.info.clone(), d.config.clone()))
            .collect()
    }

    pub fn distribution_tags(&self, id: &str) -> Option<ResourceTags> {
        self.inner().distributions.get(id).map(|d| d.tags.clone())
    }

    pub fn origin_access_control_count(&self) -> usize {
        self.inner().origin_access_controls.len()
    }

    pub fn records(&self, zone_id: &str) -> Vec<DnsRecord> {
        self.inner()
            .zones
            .iter()
            .find(|z| z.zone.id == zone_id)
            .map(|z| z.records.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl StorageService for MemoryCloud {
    async fn ensure_bucket(&self, spec: &BucketSpec) -> Result<BucketInfo> {
        let mut inner = self.inner();
        if inner.foreign_buckets.contains(&spec.bucket) {
            return Err(CloudError::conflict(
                format!("bucket {}", spec.bucket),
                "BucketAlreadyExists: the name is owned by another account",
            ));
        }
        let region = inner.region.clone();
        let bucket = inner.buckets.entry(spec.bucket.clone()).or_default();
        bucket.tags = spec.tags.clone();
        Ok(BucketInfo {
            name: spec.bucket.clone(),
            arn: bucket_arn(&spec.bucket),
            regional_domain_name: regional_domain_name(&spec.bucket, &region),
        })
    }

    async fn put_bucket_policy(&self, bucket: &str, policy: &BucketPolicyDocument) -> Result<()> {
        self.inner().bucket_mut(bucket)?.policy = Some(policy.clone());
        Ok(())
    }

    async fn delete_bucket_policy(&self, bucket: &str) -> Result<()> {
        self.inner().bucket_mut(bucket)?.policy = None;
        Ok(())
    }

    async fn delete_bucket(&self, bucket: &str, force_destroy: bool) -> Result<()> {
        let mut inner = self.inner();
        let not_empty = inner
            .buckets
            .get(bucket)
            .is_some_and(|b| !b.objects.is_empty());
        if not_empty && !force_destroy {
            return Err(CloudError::conflict(format!("bucket {}", bucket), "BucketNotEmpty"));
        }
        inner.buckets.remove(bucket);
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for MemoryCloud {
    async fn head_object(&self, bucket: &str, key: &str) -> Result<Option<ObjectInfo>> {
        let mut inner = self.inner();
        Ok(inner.bucket_mut(bucket)?.objects.get(key).map(|o| ObjectInfo {
            key: key.to_string(),
            content_type: o.content_type.clone(),
            fingerprint: Some(o.fingerprint.clone()),
        }))
    }

    async fn put_object(&self, bucket: &str, upload: ObjectUpload) -> Result<ObjectInfo> {
        let mut inner = self.inner();
        if inner.transient_puts > 0 {
            inner.transient_puts -= 1;
            return Err(CloudError::TransientProvider(
                "SlowDown: reduce your request rate".to_string(),
            ));
        }
        let stored = StoredObject {
            body: upload.body,
            content_type: upload.content_type.clone(),
            fingerprint: upload.fingerprint.clone(),
        };
        inner.bucket_mut(bucket)?.objects.insert(upload.key.clone(), stored);
        inner.puts += 1;
        Ok(ObjectInfo {
            key: upload.key,
            content_type: upload.content_type,
            fingerprint: Some(upload.fingerprint),
        })
    }

    async fn list_keys(&self, bucket: &str) -> Result<Vec<String>> {
        let mut inner = self.inner();
        Ok(inner.bucket_mut(bucket)?.objects.keys().cloned().collect())
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<()> {
        self.inner().bucket_mut(bucket)?.objects.remove(key);
        Ok(())
    }
}

#[async_trait]
impl CertificateAuthority for MemoryCloud {
    async fn request_certificate(
        &self,
        domain: &DomainName,
        tags: &ResourceTags,
    ) -> Result<CertificateRequest> {
        let mut inner = self.inner();
        let n = inner.next_id();
        let token = fingerprint(format!("{}#{}", domain, n).as_bytes());
        let status = match inner.rejected_domains.get(domain.as_str()) {
            Some(message) => CertificateStatus::Failed(message.clone()),
            None => CertificateStatus::Pending,
        };
        let request = CertificateRequest {
            arn: format!("arn:aws:acm:{}:{}:certificate/{}", inner.region, ACCOUNT_ID, n),
            domain: domain.clone(),
            validation_method: "DNS".to_string(),
            validation_record: ValidationRecord {
                name: format!("_{}.{}.", &token[..32], domain),
                record_type: "CNAME".to_string(),
                value: format!("_{}.acm-validations.aws.", &token[32..]),
            },
            status,
        };
        inner.certificates.insert(
            request.arn.clone(),
            Certificate {
                request: request.clone(),
                tags: tags.clone(),
                polls_validated: 0,
            },
        );
        Ok(request)
    }

    async fn describe_certificate(&self, arn: &str) -> Result<CertificateRequest> {
        let mut inner = self.inner();
        let (validation, pending) = match inner.certificates.get(arn) {
            Some(c) => (
                c.request.validation_record.clone(),
                c.request.status == CertificateStatus::Pending,
            ),
            None => {
                return Err(CloudError::provider(
                    format!("certificate {}", arn),
                    "ResourceNotFoundException",
                ));
            }
        };
        let published = pending && inner.record_published(&validation);
        let delay = inner.validation_delay;
        let Some(certificate) = inner.certificates.get_mut(arn) else {
            return Err(CloudError::provider(
                format!("certificate {}", arn),
                "ResourceNotFoundException",
            ));
        };
        if published {
            if certificate.polls_validated >= delay {
                certificate.request.status = CertificateStatus::Validated;
            } else {
                certificate.polls_validated += 1;
            }
        }
        Ok(certificate.request.clone())
    }

    async fn delete_certificate(&self, arn: &str) -> Result<()> {
        let mut inner = self.inner();
        let in_use = inner
            .distributions
            .values()
            .any(|d| d.config.viewer_certificate.acm_certificate_arn == arn);
        if in_use {
            return Err(CloudError::conflict(
                format!("certificate {}", arn),
                "ResourceInUseException",
            ));
        }
        inner.certificates.remove(arn);
        Ok(())
    }
}

#[async_trait]
impl DnsService for MemoryCloud {
    async fn find_zones(&self, name: &str) -> Result<Vec<HostedZone>> {
        let name = name.trim_end_matches('.').to_ascii_lowercase();
        Ok(self
            .inner()
            .zones
            .iter()
            .filter(|z| z.zone.name == name)
            .map(|z| z.zone.clone())
            .collect())
    }

    async fn find_record(
        &self,
        zone_id: &str,
        name: &str,
        record_type: &str,
    ) -> Result<Option<DnsRecord>> {
        let mut inner = self.inner();
        Ok(inner
            .zone_mut(zone_id)?
            .records
            .iter()
            .find(|r| r.same_name(name) && r.record_type == record_type)
            .cloned())
    }

    async fn create_record(&self, zone_id: &str, record: &DnsRecord) -> Result<()> {
        let mut inner = self.inner();
        let zone = inner.zone_mut(zone_id)?;
        if zone
            .records
            .iter()
            .any(|r| r.same_name(&record.name) && r.record_type == record.record_type)
        {
            return Err(CloudError::conflict(
                format!("{} {}", record.record_type, record.fqdn()),
                "InvalidChangeBatch: record already exists",
            ));
        }
        zone.records.push(record.clone());
        Ok(())
    }

    async fn replace_record(&self, zone_id: &str, record: &DnsRecord) -> Result<()> {
        let mut inner = self.inner();
        let zone = inner.zone_mut(zone_id)?;
        zone.records
            .retain(|r| !(r.same_name(&record.name) && r.record_type == record.record_type));
        zone.records.push(record.clone());
        Ok(())
    }

    async fn delete_record(&self, zone_id: &str, record: &DnsRecord) -> Result<()> {
        let mut inner = self.inner();
        let zone = inner.zone_mut(zone_id)?;
        zone.records
            .retain(|r| !(r.same_name(&record.name) && r.record_type == record.record_type));
        Ok(())
    }
}

#[async_trait]
impl CdnService for MemoryCloud {
    async fn create_origin_access_control(&self, spec: &OriginAccessControlSpec) -> Result<String> {
        let mut inner = self.inner();
        if let Some(message) = &inner.origin_access_control_failure {
            return Err(CloudError::provider(
                format!("origin access control {}", spec.name),
                message.clone(),
            ));
        }
        if inner.origin_access_controls.values().any(|o| o.name == spec.name) {
            return Err(CloudError::conflict(
                format!("origin access control {}", spec.name),
                "OriginAccessControlAlreadyExists",
            ));
        }
        let id = format!("OAC{:010}", inner.next_id());
        inner.origin_access_controls.insert(id.clone(), spec.clone());
        Ok(id)
    }

    async fn delete_origin_access_control(&self, id: &str) -> Result<()> {
        self.inner().origin_access_controls.remove(id);
        Ok(())
    }

    async fn create_distribution(
        &self,
        config: &DistributionConfig,
        tags: &ResourceTags,
    ) -> Result<DistributionInfo> {
        config.validate()?;
        let mut inner = self.inner();
        check_distribution_inputs(&inner, None, config)?;

        let n = inner.next_id();
        let id = format!("E{:012}", n);
        let info = DistributionInfo {
            arn: format!("arn:aws:cloudfront::{}:distribution/{}", ACCOUNT_ID, id),
            domain_name: format!("d{:013x}.cloudfront.net", n),
            hosted_zone_id: CDN_HOSTED_ZONE_ID.to_string(),
            id: id.clone(),
        };
        inner.distributions.insert(
            id,
            Distribution {
                info: info.clone(),
                config: config.clone(),
                tags: tags.clone(),
            },
        );
        Ok(info)
    }

    async fn update_distribution(
        &self,
        id: &str,
        config: &DistributionConfig,
        tags: &ResourceTags,
    ) -> Result<DistributionInfo> {
        config.validate()?;
        let mut inner = self.inner();
        check_distribution_inputs(&inner, Some(id), config)?;
        let distribution = inner.distributions.get_mut(id).ok_or_else(|| {
            CloudError::provider(format!("distribution {}", id), "NoSuchDistribution")
        })?;
        distribution.config = config.clone();
        distribution.tags = tags.clone();
        Ok(distribution.info.clone())
    }

    async fn delete_distribution(&self, id: &str) -> Result<()> {
        self.inner().distributions.remove(id);
        Ok(())
    }
}

fn check_distribution_inputs(
    inner: &Inner,
    updating: Option<&str>,
    config: &DistributionConfig,
) -> Result<()> {
    let arn = &config.viewer_certificate.acm_certificate_arn;
    match inner.certificates.get(arn) {
        Some(c) if c.request.status == CertificateStatus::Validated => {}
        _ => return Err(CloudError::CertificateNotValidated(arn.clone())),
    }
    let oac = &config.origin.origin_access_control_id;
    if !inner.origin_access_controls.contains_key(oac) {
        return Err(CloudError::OriginAccessControl(format!(
            "origin access control {} does not exist",
            oac
        )));
    }
    for (id, other) in &inner.distributions {
        if Some(id.as_str()) == updating {
            continue;
        }
        if let Some(alias) = config.aliases.iter().find(|a| other.config.aliases.contains(a)) {
            return Err(CloudError::conflict(
                format!("distribution alias {}", alias),
                format!("CNAMEAlreadyExists: used by {}", id),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_foreign_bucket_conflicts() {
        let cloud = MemoryCloud::new();
        cloud.claim_bucket_elsewhere("site-assets-example");
        let spec = BucketSpec {
            bucket: "site-assets-example".to_string(),
            force_destroy: true,
            tags: ResourceTags::default(),
        };
        assert!(matches!(
            cloud.ensure_bucket(&spec).await,
            Err(CloudError::Conflict { .. })
        ));
    }

    #[tokio::test]
    async fn test_validation_delay() {
        let cloud = MemoryCloud::new();
        let zone = cloud.add_zone("example.com", false);
        cloud.set_validation_delay(2);
        let domain = DomainName::parse("example.com").unwrap();
        let request = cloud
            .request_certificate(&domain, &ResourceTags::default())
            .await
            .unwrap();
        cloud
            .create_record(&zone.id, &crate::dns::validation_dns_record(&request.validation_record))
            .await
            .unwrap();

        let mut statuses = Vec::new();
        for _ in 0..3 {
            statuses.push(cloud.describe_certificate(&request.arn).await.unwrap().status);
        }
        assert_eq!(
            statuses,
            vec![
                CertificateStatus::Pending,
                CertificateStatus::Pending,
                CertificateStatus::Validated
            ]
        );
    }

    #[tokio::test]
    async fn test_throttled_put_is_transient() {
        let cloud = MemoryCloud::new();
        cloud
            .ensure_bucket(&crate::storage::bucket_spec("b", ResourceTags::default()))
            .await
            .unwrap();
        cloud.throttle_puts(1);
        let upload = ObjectUpload {
            key: "index.html".to_string(),
            body: b"x".to_vec(),
            content_type: Some("text/html".to_string()),
            fingerprint: fingerprint(b"x"),
        };
        let err = cloud.put_object("b", upload.clone()).await.unwrap_err();
        assert!(err.is_retryable());
        cloud.put_object("b", upload).await.unwrap();
        assert_eq!(cloud.put_count(), 1);
    }
}
