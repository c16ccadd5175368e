//! Resource driver for the static site topology
//!
//! Maps every resource type of the stack onto the provider services.

use crate::certificate::{ensure_validated, wait_for_validation};
use crate::distribution::DistributionConfig;
use crate::dns::{create_record, resolve_hosted_zone};
use crate::policy::BucketPolicyDocument;
use crate::services::{
    CdnService, CertificateAuthority, CertificateRequest, DistributionInfo, DnsRecord, DnsService,
    ObjectStore, ObjectUpload, OriginAccessControlSpec, StorageService,
};
use crate::storage::{bucket_spec, read_asset};
use crate::types::{
    BUCKET_POLICY, CERTIFICATE, CERTIFICATE_VALIDATION, DISTRIBUTION, DNS_RECORD, DNS_ZONE,
    DomainName, ORIGIN_ACCESS_CONTROL, ResourceTags, STORAGE_BUCKET, STORAGE_OBJECT,
};
use async_trait::async_trait;
use serde_json::json;
use sitestack_cloud::{
    Address, Attributes, CloudError, ResolvedResource, ResourceDriver, ResourceState, Result,
    RetryConfig,
};
use std::path::PathBuf;

/// Every provider service the site needs
pub trait SiteCloud:
    StorageService + ObjectStore + CertificateAuthority + DnsService + CdnService
{
}

impl<T> SiteCloud for T where
    T: StorageService + ObjectStore + CertificateAuthority + DnsService + CdnService
{
}

pub struct SiteDriver<'a, C: SiteCloud> {
    cloud: &'a C,
    validation_retry: RetryConfig,
}

impl<'a, C: SiteCloud> SiteDriver<'a, C> {
    pub fn new(cloud: &'a C) -> Self {
        Self {
            cloud,
            validation_retry: RetryConfig::certificate_validation(),
        }
    }

    /// Polling policy for certificate validation
    pub fn with_validation_retry(mut self, retry: RetryConfig) -> Self {
        self.validation_retry = retry;
        self
    }

    // ============ Storage ============

    async fn put_bucket(&self, resource: &ResolvedResource) -> Result<ResourceState> {
        let bucket: String = resource.require("bucket")?;
        let tags: ResourceTags = resource.get("tags").unwrap_or_default();
        let info = self.cloud.ensure_bucket(&bucket_spec(&bucket, tags)).await?;
        tracing::info!("Bucket ready: {}", info.name);
        Ok(ResourceState::new(&info.name, STORAGE_BUCKET)
            .with_attribute("arn", json!(info.arn))
            .with_attribute("bucket", json!(info.name))
            .with_attribute("bucket_regional_domain_name", json!(info.regional_domain_name)))
    }

    async fn put_object(&self, resource: &ResolvedResource) -> Result<ResourceState> {
        let bucket: String = resource.require("bucket")?;
        let key: String = resource.require("key")?;
        let source: PathBuf = resource.require("source")?;
        let etag: String = resource.require("etag")?;
        let content_type: Option<String> = resource.get("content_type");

        let remote = self.cloud.head_object(&bucket, &key).await?;
        let current = remote.is_some_and(|info| {
            info.fingerprint.as_deref() == Some(etag.as_str()) && info.content_type == content_type
        });
        if current {
            tracing::debug!("s3://{}/{} already up to date", bucket, key);
        } else {
            let body = read_asset(&source, &etag).await?;
            self.cloud
                .put_object(
                    &bucket,
                    ObjectUpload {
                        key: key.clone(),
                        body,
                        content_type: content_type.clone(),
                        fingerprint: etag.clone(),
                    },
                )
                .await?;
            tracing::debug!("Uploaded s3://{}/{}", bucket, key);
        }

        Ok(ResourceState::new(&key, STORAGE_OBJECT)
            .with_attribute("bucket", json!(bucket))
            .with_attribute("etag", json!(etag))
            .with_attribute("content_type", json!(content_type)))
    }

    async fn put_policy(&self, resource: &ResolvedResource) -> Result<ResourceState> {
        let bucket: String = resource.require("bucket")?;
        let policy_json: serde_json::Value = resource.require("policy")?;
        let policy = BucketPolicyDocument::from_json(&policy_json)?;
        self.cloud.put_bucket_policy(&bucket, &policy).await?;
        tracing::info!(
            "Bucket {} readable only through {}",
            bucket,
            policy.source_arn().unwrap_or_default()
        );
        Ok(ResourceState::new(&bucket, BUCKET_POLICY).with_attribute("policy", policy_json))
    }

    // ============ Certificates ============

    async fn request_certificate(&self, resource: &ResolvedResource) -> Result<ResourceState> {
        let domain: String = resource.require("domain_name")?;
        let domain = DomainName::parse(&domain)?;
        let tags: ResourceTags = resource.get("tags").unwrap_or_default();
        let request = self.cloud.request_certificate(&domain, &tags).await?;
        tracing::info!("Requested certificate for {}: {}", domain, request.arn);
        Ok(certificate_state(&request))
    }

    async fn validate_certificate(&self, resource: &ResolvedResource) -> Result<ResourceState> {
        let arn: String = resource.require("certificate_arn")?;
        let request = wait_for_validation(self.cloud, &arn, &self.validation_retry).await?;
        Ok(ResourceState::new(&arn, CERTIFICATE_VALIDATION)
            .with_attribute("certificate_arn", json!(arn))
            .with_attribute("domain_name", json!(request.domain)))
    }

    // ============ DNS ============

    async fn put_record(&self, resource: &ResolvedResource, owned: bool) -> Result<ResourceState> {
        let zone_id: String = resource.require("zone_id")?;
        let record: DnsRecord = resource.require("record")?;
        if owned {
            self.cloud.replace_record(&zone_id, &record).await?;
        } else {
            create_record(self.cloud, &zone_id, &record).await?;
        }
        Ok(ResourceState::new(
            format!("{}_{}_{}", zone_id, record.fqdn(), record.record_type),
            DNS_RECORD,
        )
        .with_attribute("zone_id", json!(zone_id))
        .with_attribute("fqdn", json!(record.fqdn()))
        .with_attribute("record", serde_json::to_value(&record)?))
    }

    // ============ CDN ============

    async fn create_origin_access_control(
        &self,
        resource: &ResolvedResource,
    ) -> Result<ResourceState> {
        let spec: OriginAccessControlSpec = serde_json::from_value(resource.config.clone())?;
        let id = self
            .cloud
            .create_origin_access_control(&spec)
            .await
            .map_err(|e| match e {
                e if e.is_retryable() => e,
                CloudError::Provider { message, .. } => CloudError::OriginAccessControl(message),
                other => CloudError::OriginAccessControl(other.to_string()),
            })?;
        tracing::info!("Created origin access control {}", id);
        Ok(ResourceState::new(id, ORIGIN_ACCESS_CONTROL).with_attribute("name", json!(spec.name)))
    }

    async fn put_distribution(
        &self,
        resource: &ResolvedResource,
        current: Option<&ResourceState>,
    ) -> Result<ResourceState> {
        let config = DistributionConfig::from_json(&resource.config)?;
        let tags: ResourceTags = resource.get("tags").unwrap_or_default();
        ensure_validated(self.cloud, &config.viewer_certificate.acm_certificate_arn).await?;

        let info = match current {
            Some(current) => {
                self.cloud
                    .update_distribution(&current.id, &config, &tags)
                    .await?
            }
            None => self.cloud.create_distribution(&config, &tags).await?,
        };
        tracing::info!("Distribution {} serves {}", info.id, config.aliases.join(", "));
        Ok(distribution_state(&info))
    }
}

fn certificate_state(request: &CertificateRequest) -> ResourceState {
    ResourceState::new(&request.arn, CERTIFICATE)
        .with_attribute("arn", json!(request.arn))
        .with_attribute("domain_name", json!(request.domain))
        .with_attribute("validation_record_name", json!(request.validation_record.name))
        .with_attribute("validation_record_type", json!(request.validation_record.record_type))
        .with_attribute("validation_record_value", json!(request.validation_record.value))
}

fn distribution_state(info: &DistributionInfo) -> ResourceState {
    ResourceState::new(&info.id, DISTRIBUTION)
        .with_attribute("arn", json!(info.arn))
        .with_attribute("domain_name", json!(info.domain_name))
        .with_attribute("hosted_zone_id", json!(info.hosted_zone_id))
}

fn unsupported(resource_type: &str) -> CloudError {
    CloudError::Configuration(format!("unsupported resource type: {}", resource_type))
}

#[async_trait]
impl<C: SiteCloud> ResourceDriver for SiteDriver<'_, C> {
    async fn read(&self, resource: &ResolvedResource) -> Result<Attributes> {
        match resource.resource_type() {
            DNS_ZONE => {
                let name: String = resource.require("name")?;
                let domain = DomainName::parse(&name)?;
                let zone = resolve_hosted_zone(self.cloud, &domain).await?;
                Ok([
                    ("id".to_string(), json!(zone.id)),
                    ("zone_id".to_string(), json!(zone.id)),
                    ("name".to_string(), json!(zone.name)),
                ]
                .into_iter()
                .collect())
            }
            other => Err(unsupported(other)),
        }
    }

    async fn create(&self, resource: &ResolvedResource) -> Result<ResourceState> {
        match resource.resource_type() {
            STORAGE_BUCKET => self.put_bucket(resource).await,
            STORAGE_OBJECT => self.put_object(resource).await,
            BUCKET_POLICY => self.put_policy(resource).await,
            CERTIFICATE => self.request_certificate(resource).await,
            CERTIFICATE_VALIDATION => self.validate_certificate(resource).await,
            DNS_RECORD => self.put_record(resource, false).await,
            ORIGIN_ACCESS_CONTROL => self.create_origin_access_control(resource).await,
            DISTRIBUTION => self.put_distribution(resource, None).await,
            other => Err(unsupported(other)),
        }
    }

    async fn update(
        &self,
        resource: &ResolvedResource,
        current: &ResourceState,
    ) -> Result<ResourceState> {
        match resource.resource_type() {
            STORAGE_BUCKET => self.put_bucket(resource).await,
            STORAGE_OBJECT => self.put_object(resource).await,
            BUCKET_POLICY => self.put_policy(resource).await,
            CERTIFICATE => {
                let domain: String = resource.require("domain_name")?;
                let requested_for = current.get_attribute::<String>("domain_name");
                if requested_for.as_deref() == Some(domain.as_str()) {
                    let request = self.cloud.describe_certificate(&current.id).await?;
                    Ok(certificate_state(&request))
                } else {
                    // The old certificate stays until nothing references it.
                    self.request_certificate(resource).await
                }
            }
            CERTIFICATE_VALIDATION => self.validate_certificate(resource).await,
            DNS_RECORD => {
                let previous: Option<String> = current.get_attribute("fqdn");
                let record: DnsRecord = resource.require("record")?;
                // A renamed record is someone else's name until proven otherwise.
                let owned = previous.as_deref() == Some(record.fqdn().as_str());
                self.put_record(resource, owned).await
            }
            ORIGIN_ACCESS_CONTROL => {
                tracing::warn!(
                    "Origin access control {} keeps its creation settings",
                    current.id
                );
                Ok(current.clone())
            }
            DISTRIBUTION => self.put_distribution(resource, Some(current)).await,
            other => Err(unsupported(other)),
        }
    }

    async fn delete(&self, address: &Address, current: &ResourceState) -> Result<()> {
        match address.resource_type() {
            STORAGE_BUCKET => self.cloud.delete_bucket(&current.id, true).await,
            STORAGE_OBJECT => {
                let bucket: String = current.get_attribute("bucket").ok_or_else(|| {
                    CloudError::StateError(format!("{} has no bucket attribute", address))
                })?;
                self.cloud.delete_object(&bucket, &current.id).await
            }
            BUCKET_POLICY => self.cloud.delete_bucket_policy(&current.id).await,
            CERTIFICATE => self.cloud.delete_certificate(&current.id).await,
            DNS_RECORD => {
                let zone_id: String = current.get_attribute("zone_id").ok_or_else(|| {
                    CloudError::StateError(format!("{} has no zone_id attribute", address))
                })?;
                let record: DnsRecord = current.get_attribute("record").ok_or_else(|| {
                    CloudError::StateError(format!("{} has no record attribute", address))
                })?;
                self.cloud.delete_record(&zone_id, &record).await
            }
            ORIGIN_ACCESS_CONTROL => self.cloud.delete_origin_access_control(&current.id).await,
            DISTRIBUTION => self.cloud.delete_distribution(&current.id).await,
            CERTIFICATE_VALIDATION | DNS_ZONE => Ok(()),
            other => Err(unsupported(other)),
        }
    }
}
