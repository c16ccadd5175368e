//! Static site stack composition
//!
//! [`Orchestrator`] declares every resource of one site into a
//! [`ResourceGraph`]. Each provisioning step returns a handle that the later
//! steps take their references from, so every ordering requirement becomes a
//! graph edge:
//!
//! ```text
//! storage_bucket ──────────────┬──> storage_object.*
//!                              │
//! certificate ──> dns_record.certificate_validation ──> certificate_validation
//!                                                               │
//! origin_access_control ──────────> distribution <──────────────┘
//!                                        │
//!                       ┌────────────────┴─────────────┐
//!                       v                              v
//!                bucket_policy                  dns_record.website
//! ```
//!
//! The distribution takes its certificate from the validation node, never
//! from the certificate request itself.

use crate::assets::AssetManifest;
use crate::distribution::{DistributionConfig, origin_access_control_spec};
use crate::dns::{alias_record, validation_dns_record};
use crate::policy::BucketPolicyDocument;
use crate::services::{DistributionInfo, ValidationRecord};
use crate::types::{
    BUCKET_POLICY, CERTIFICATE, CERTIFICATE_VALIDATION, DISTRIBUTION, DNS_RECORD, DNS_ZONE,
    DomainName, ORIGIN_ACCESS_CONTROL, ResourceTags, STORAGE_BUCKET, STORAGE_OBJECT, WEBSITE,
};
use serde::Serialize;
use serde_json::json;
use sitestack_cloud::{
    Address, ApplyOptions, ApplyResult, CloudError, Executor, GlobalState, Reference, Resource,
    ResourceDriver, ResourceGraph, Result, RetryConfig, StateManager,
};
use sitestack_config::{BackendConfig, SiteConfig};

/// Name of the run's principal output
pub const DISTRIBUTION_ID_OUTPUT: &str = "distribution_id";

/// Name of the validation record and the zone it is published in
const CERTIFICATE_VALIDATION_NAME: &str = "certificate_validation";
const CERTIFICATE_ZONE_NAME: &str = "certificate";

fn address(resource_type: &str, name: &str) -> Result<Address> {
    Address::new(resource_type, name)
}

/// Storage container and the objects synchronized into it
#[derive(Debug, Clone)]
pub struct StorageHandle {
    pub bucket: Address,
    pub objects: Vec<Address>,
}

impl StorageHandle {
    pub fn name(&self) -> Reference {
        self.bucket.attr("bucket")
    }

    pub fn regional_domain_name(&self) -> Reference {
        self.bucket.attr("bucket_regional_domain_name")
    }
}

/// Certificate that is only usable once validated
#[derive(Debug, Clone)]
pub struct ValidatedCertificate {
    pub certificate: Address,
    pub zone: Address,
    pub validation_record: Address,
    pub validation: Address,
}

impl ValidatedCertificate {
    /// Certificate ARN as exported by the validation step
    pub fn arn(&self) -> Reference {
        self.validation.attr("certificate_arn")
    }
}

#[derive(Debug, Clone)]
pub struct DistributionHandle {
    pub origin_access_control: Address,
    pub distribution: Address,
    pub policy: Address,
}

impl DistributionHandle {
    pub fn id(&self) -> Reference {
        self.distribution.attr("id")
    }

    pub fn arn(&self) -> Reference {
        self.distribution.attr("arn")
    }

    pub fn domain_name(&self) -> Reference {
        self.distribution.attr("domain_name")
    }

    pub fn hosted_zone_id(&self) -> Reference {
        self.distribution.attr("hosted_zone_id")
    }
}

#[derive(Debug, Clone)]
pub struct DnsAlias {
    pub zone: Address,
    pub record: Address,
}

#[derive(Debug, Clone)]
pub struct StackHandles {
    pub storage: StorageHandle,
    pub certificate: ValidatedCertificate,
    pub distribution: DistributionHandle,
    pub dns: DnsAlias,
}

/// Provider settings handed to the execution engine
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderSettings {
    pub region: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,
}

/// Synthesized stack: the graph plus everything needed to execute it
#[derive(Debug)]
pub struct Stack {
    pub name: String,
    pub graph: ResourceGraph,
    pub provider: ProviderSettings,
    pub backend: BackendConfig,
    pub handles: StackHandles,
    /// Assets left out because they could not be read
    pub skipped_assets: Vec<String>,
}

impl Stack {
    /// The stack document consumed by the execution engine
    pub fn to_document(&self) -> Result<serde_json::Value> {
        let mut document = self.graph.to_json()?;
        if let serde_json::Value::Object(map) = &mut document {
            map.insert("stack".to_string(), json!(self.name));
            map.insert("provider".to_string(), json!({ "aws": self.provider }));
            map.insert("backend".to_string(), json!({ "s3": self.backend }));
        }
        Ok(document)
    }

    pub fn distribution_id(&self) -> Reference {
        self.handles.distribution.id()
    }
}

/// Composes the site's provisioning steps
pub struct Orchestrator {
    config: SiteConfig,
    domain: DomainName,
    tags: ResourceTags,
    retry: RetryConfig,
}

impl Orchestrator {
    /// Validates the configuration before anything is declared
    pub fn new(mut config: SiteConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|e| CloudError::Configuration(e.to_string()))?;
        let domain = DomainName::parse(&config.domain_name)?;
        let tags = ResourceTags::for_stack(&config.stack_name);
        Ok(Self {
            config,
            domain,
            tags,
            retry: RetryConfig::default(),
        })
    }

    /// Retry policy for transient provider errors
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn config(&self) -> &SiteConfig {
        &self.config
    }

    pub fn domain(&self) -> &DomainName {
        &self.domain
    }

    pub fn tags(&self) -> &ResourceTags {
        &self.tags
    }

    /// Declare the whole stack for the given assets
    pub fn synthesize(&self, manifest: &AssetManifest) -> Result<Stack> {
        let mut graph = ResourceGraph::new();
        let mut skipped_assets: Vec<String> =
            manifest.failures().iter().map(|e| e.to_string()).collect();

        let storage = self.declare_storage(&mut graph, manifest, &mut skipped_assets)?;
        let certificate = self.declare_certificate(&mut graph)?;
        let distribution = self.declare_distribution(&mut graph, &storage, &certificate)?;
        let dns = self.declare_dns(&mut graph, &distribution)?;

        graph.add_output(DISTRIBUTION_ID_OUTPUT, distribution.id());
        graph.validate()?;

        tracing::info!(
            "Synthesized stack {} for {}: {} resources ({} objects)",
            self.config.stack_name,
            self.domain,
            graph.len(),
            storage.objects.len()
        );

        Ok(Stack {
            name: self.config.stack_name.clone(),
            graph,
            provider: ProviderSettings {
                region: self.config.region.clone(),
                profile: self.config.profile.clone(),
            },
            backend: self.config.backend(),
            handles: StackHandles {
                storage,
                certificate,
                distribution,
                dns,
            },
            skipped_assets,
        })
    }

    /// Storage container plus one object per manifest entry
    fn declare_storage(
        &self,
        graph: &mut ResourceGraph,
        manifest: &AssetManifest,
        skipped: &mut Vec<String>,
    ) -> Result<StorageHandle> {
        let bucket = graph.add(Resource::new(
            address(STORAGE_BUCKET, WEBSITE)?,
            json!({
                "bucket": self.config.website_bucket_name,
                "force_destroy": true,
                "tags": self.tags,
            }),
        ))?;

        let mut objects = Vec::with_capacity(manifest.len());
        for entry in manifest.entries() {
            let object_address = match address(STORAGE_OBJECT, &entry.relative_key) {
                Ok(a) => a,
                Err(e) => {
                    tracing::warn!("Skipping {}: {}", entry.relative_key, e);
                    skipped.push(format!("{}: {}", entry.relative_key, e));
                    continue;
                }
            };
            let object = graph.add(Resource::new(
                object_address,
                json!({
                    "bucket": bucket.attr("bucket"),
                    "key": entry.relative_key,
                    "source": entry.source_path.to_string_lossy(),
                    "content_type": entry.content_type,
                    "etag": entry.content_fingerprint,
                }),
            ))?;
            objects.push(object);
        }
        // unreadable files keep whatever is already uploaded
        for key in manifest.failed_keys() {
            if let Ok(object_address) = address(STORAGE_OBJECT, key) {
                graph.retain(object_address);
            }
        }

        Ok(StorageHandle { bucket, objects })
    }

    /// Certificate request, its DNS validation record and the validation wait
    fn declare_certificate(&self, graph: &mut ResourceGraph) -> Result<ValidatedCertificate> {
        let zone = graph.add(Resource::data(
            address(DNS_ZONE, CERTIFICATE_ZONE_NAME)?,
            json!({ "name": self.domain, "private_zone": false }),
        ))?;

        let certificate = graph.add(Resource::new(
            address(CERTIFICATE, WEBSITE)?,
            json!({
                "domain_name": self.domain,
                "validation_method": "DNS",
                "tags": self.tags,
                "create_before_destroy": true,
            }),
        ))?;

        let record = validation_dns_record(&ValidationRecord {
            name: certificate.attr("validation_record_name").token(),
            record_type: certificate.attr("validation_record_type").token(),
            value: certificate.attr("validation_record_value").token(),
        });
        let validation_record = graph.add(Resource::new(
            address(DNS_RECORD, CERTIFICATE_VALIDATION_NAME)?,
            json!({ "zone_id": zone.attr("zone_id"), "record": record }),
        ))?;

        let validation = graph.add(Resource::new(
            address(CERTIFICATE_VALIDATION, WEBSITE)?,
            json!({
                "certificate_arn": certificate.attr("arn"),
                "validation_record_fqdns": [validation_record.attr("fqdn")],
            }),
        ))?;

        Ok(ValidatedCertificate {
            certificate,
            zone,
            validation_record,
            validation,
        })
    }

    /// Origin access control, distribution, then the bucket policy scoped to it
    fn declare_distribution(
        &self,
        graph: &mut ResourceGraph,
        storage: &StorageHandle,
        certificate: &ValidatedCertificate,
    ) -> Result<DistributionHandle> {
        let oac_spec =
            origin_access_control_spec(&self.config.website_bucket_name, self.domain.as_str());
        let origin_access_control = graph.add(Resource::new(
            address(ORIGIN_ACCESS_CONTROL, WEBSITE)?,
            serde_json::to_value(&oac_spec)?,
        ))?;

        let config = DistributionConfig::for_site(
            self.domain.as_str(),
            &self.config.website_bucket_name,
            storage.regional_domain_name().token(),
            origin_access_control.attr("id").token(),
            certificate.arn().token(),
            &self.config.geo_allow_list,
        );
        let mut body = config.to_json()?;
        if let serde_json::Value::Object(map) = &mut body {
            map.insert("tags".to_string(), json!(self.tags));
        }
        let distribution = graph.add(Resource::new(address(DISTRIBUTION, WEBSITE)?, body))?;

        // Written once the distribution exists; the ordering edge is explicit.
        let policy = BucketPolicyDocument::for_distribution(
            &self.config.website_bucket_name,
            &distribution.attr("arn").token(),
        );
        let policy = graph.add(
            Resource::new(
                address(BUCKET_POLICY, WEBSITE)?,
                json!({ "bucket": storage.name(), "policy": policy.to_json()? }),
            )
            .depends_on(&distribution),
        )?;

        Ok(DistributionHandle {
            origin_access_control,
            distribution,
            policy,
        })
    }

    /// Alias record pointing the domain at the distribution
    fn declare_dns(
        &self,
        graph: &mut ResourceGraph,
        distribution: &DistributionHandle,
    ) -> Result<DnsAlias> {
        let zone = graph.add(Resource::data(
            address(DNS_ZONE, WEBSITE)?,
            json!({ "name": self.domain, "private_zone": false }),
        ))?;

        let target = DistributionInfo {
            id: distribution.id().token(),
            arn: distribution.arn().token(),
            domain_name: distribution.domain_name().token(),
            hosted_zone_id: distribution.hosted_zone_id().token(),
        };
        let record = alias_record(self.domain.as_str(), &target);
        let record = graph.add(Resource::new(
            address(DNS_RECORD, WEBSITE)?,
            json!({ "zone_id": zone.attr("zone_id"), "record": record }),
        ))?;

        Ok(DnsAlias { zone, record })
    }

    fn executor<'a>(&self, driver: &'a dyn ResourceDriver) -> Executor<'a> {
        Executor::new(driver)
            .with_retry(self.retry.clone())
            .with_options(ApplyOptions {
                prune: self.config.prune,
                ..Default::default()
            })
    }

    /// Apply the stack against state persisted under `manager`
    pub async fn provision(
        &self,
        stack: &Stack,
        driver: &dyn ResourceDriver,
        manager: &StateManager,
    ) -> Result<ApplyResult> {
        self.executor(driver).apply_persisted(&stack.graph, manager).await
    }

    /// Apply the stack against in-memory state
    pub async fn provision_in_memory(
        &self,
        stack: &Stack,
        driver: &dyn ResourceDriver,
        state: &mut GlobalState,
    ) -> Result<ApplyResult> {
        self.executor(driver).apply(&stack.graph, state).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn site_config() -> SiteConfig {
        SiteConfig {
            website_bucket_name: "site-assets-example".to_string(),
            domain_name: "example.com".to_string(),
            ..Default::default()
        }
    }

    fn manifest() -> (tempfile::TempDir, AssetManifest) {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("index.html"), "<html></html>").unwrap();
        fs::write(dir.path().join("app.js"), "console.log(1)").unwrap();
        fs::create_dir(dir.path().join("img")).unwrap();
        fs::write(dir.path().join("img").join("logo.png"), [0x89]).unwrap();
        let manifest = AssetManifest::scan(dir.path()).unwrap();
        (dir, manifest)
    }

    fn addr(t: &str, n: &str) -> Address {
        Address::new(t, n).unwrap()
    }

    #[test]
    fn test_rejects_missing_inputs() {
        let missing_domain = SiteConfig {
            website_bucket_name: "site-assets-example".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            Orchestrator::new(missing_domain),
            Err(CloudError::Configuration(_))
        ));
        let bad_bucket = SiteConfig {
            website_bucket_name: "Site_Assets".to_string(),
            ..site_config()
        };
        assert!(Orchestrator::new(bad_bucket).is_err());
    }

    #[test]
    fn test_distribution_waits_for_validated_certificate() {
        let (_dir, manifest) = manifest();
        let stack = Orchestrator::new(site_config())
            .unwrap()
            .synthesize(&manifest)
            .unwrap();
        let graph = &stack.graph;
        let distribution = addr(DISTRIBUTION, WEBSITE);

        assert!(graph.has_edge(&distribution, &addr(CERTIFICATE_VALIDATION, WEBSITE)));
        assert!(!graph.has_edge(&distribution, &addr(CERTIFICATE, WEBSITE)));
        assert!(graph.depends_transitively(&distribution, &addr(CERTIFICATE, WEBSITE)));
        assert!(graph.has_edge(
            &addr(CERTIFICATE_VALIDATION, WEBSITE),
            &addr(DNS_RECORD, CERTIFICATE_VALIDATION_NAME)
        ));
        assert!(graph.has_edge(&distribution, &addr(ORIGIN_ACCESS_CONTROL, WEBSITE)));
        assert!(graph.has_edge(&distribution, &addr(STORAGE_BUCKET, WEBSITE)));
    }

    #[test]
    fn test_policy_and_alias_follow_distribution() {
        let (_dir, manifest) = manifest();
        let stack = Orchestrator::new(site_config())
            .unwrap()
            .synthesize(&manifest)
            .unwrap();
        let graph = &stack.graph;
        let distribution = addr(DISTRIBUTION, WEBSITE);

        assert!(graph.has_edge(&addr(DNS_RECORD, WEBSITE), &distribution));
        assert!(graph.has_edge(&addr(BUCKET_POLICY, WEBSITE), &distribution));
        assert!(graph.has_edge(&addr(BUCKET_POLICY, WEBSITE), &addr(STORAGE_BUCKET, WEBSITE)));
        assert!(
            graph
                .get(&addr(BUCKET_POLICY, WEBSITE))
                .unwrap()
                .depends_on
                .contains(&distribution)
        );

        for object in &stack.handles.storage.objects {
            assert!(graph.has_edge(object, &addr(STORAGE_BUCKET, WEBSITE)));
        }
        // Certificate and storage are independent of each other.
        let certificate = addr(CERTIFICATE, WEBSITE);
        let bucket = addr(STORAGE_BUCKET, WEBSITE);
        assert!(!graph.depends_transitively(&certificate, &bucket));
        assert!(!graph.depends_transitively(&bucket, &certificate));
    }

    #[test]
    fn test_layers_order_the_stack() {
        let (_dir, manifest) = manifest();
        let stack = Orchestrator::new(site_config())
            .unwrap()
            .synthesize(&manifest)
            .unwrap();
        let layers = stack.graph.layers().unwrap();
        let layer_of = |a: &Address| layers.iter().position(|l| l.contains(a)).unwrap();

        let distribution = layer_of(&addr(DISTRIBUTION, WEBSITE));
        assert!(layer_of(&addr(CERTIFICATE_VALIDATION, WEBSITE)) < distribution);
        assert!(distribution < layer_of(&addr(BUCKET_POLICY, WEBSITE)));
        assert!(distribution < layer_of(&addr(DNS_RECORD, WEBSITE)));
        assert!(
            layer_of(&addr(STORAGE_BUCKET, WEBSITE))
                < layer_of(&addr(STORAGE_OBJECT, "index.html"))
        );
    }

    #[test]
    fn test_document_shape() {
        let (_dir, manifest) = manifest();
        let config = SiteConfig {
            profile: Some("site-admin".to_string()),
            ..site_config()
        };
        let stack = Orchestrator::new(config).unwrap().synthesize(&manifest).unwrap();
        let doc = stack.to_document().unwrap();

        assert_eq!(doc["output"]["distribution_id"]["value"], "${distribution.website.id}");
        assert_eq!(doc["provider"]["aws"]["region"], "us-east-1");
        assert_eq!(doc["provider"]["aws"]["profile"], "site-admin");
        assert_eq!(doc["backend"]["s3"]["key"], "example.com/sitestack.tfstate");
        assert_eq!(doc["backend"]["s3"]["encrypt"], true);
        assert_eq!(doc["data"]["dns_zone"]["website"]["private_zone"], false);

        let logo = &doc["resource"]["storage_object"]["img/logo.png"];
        assert_eq!(logo["key"], "img/logo.png");
        assert_eq!(logo["content_type"], "image/png");
        assert_eq!(logo["bucket"], "${storage_bucket.website.bucket}");

        let policy = &doc["resource"]["bucket_policy"]["website"];
        assert_eq!(
            policy["policy"]["Statement"][0]["Condition"]["StringEquals"]["AWS:SourceArn"],
            "${distribution.website.arn}"
        );
        assert_eq!(policy["depends_on"], json!(["distribution.website"]));

        let distribution = &doc["resource"]["distribution"]["website"];
        assert_eq!(
            distribution["viewer_certificate"]["acm_certificate_arn"],
            "${certificate_validation.website.certificate_arn}"
        );
        assert_eq!(distribution["tags"]["ManagedBy"], "sitestack");

        let record = &doc["resource"]["dns_record"]["certificate_validation"]["record"];
        assert_eq!(record["ttl"], 60);
    }

    #[test]
    fn test_synthesis_is_deterministic() {
        let (_dir, manifest) = manifest();
        let orchestrator = Orchestrator::new(site_config()).unwrap();
        let first = orchestrator.synthesize(&manifest).unwrap().to_document().unwrap();
        let second = orchestrator.synthesize(&manifest).unwrap().to_document().unwrap();
        assert_eq!(first, second);
    }
}
