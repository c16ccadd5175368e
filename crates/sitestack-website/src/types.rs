//! Shared website types: resource type names, domain names and tags

use serde::{Deserialize, Serialize};
use sitestack_cloud::{CloudError, Result};
use std::collections::BTreeMap;

pub const STORAGE_BUCKET: &str = "storage_bucket";
pub const STORAGE_OBJECT: &str = "storage_object";
pub const CERTIFICATE: &str = "certificate";
pub const CERTIFICATE_VALIDATION: &str = "certificate_validation";
pub const DNS_ZONE: &str = "dns_zone";
pub const DNS_RECORD: &str = "dns_record";
pub const ORIGIN_ACCESS_CONTROL: &str = "origin_access_control";
pub const DISTRIBUTION: &str = "distribution";
pub const BUCKET_POLICY: &str = "bucket_policy";

/// Name shared by the singleton resources of one stack
pub const WEBSITE: &str = "website";

/// A validated, normalized fully-qualified domain name
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DomainName(String);

impl DomainName {
    pub fn parse(name: &str) -> Result<Self> {
        let normalized = name.trim().trim_end_matches('.').to_ascii_lowercase();
        sitestack_config::site::validate_domain_name(&normalized)
            .map_err(|e| CloudError::Configuration(e.to_string()))?;
        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Candidate hosted zone names, most specific first
    ///
    /// `www.example.co.uk` yields `www.example.co.uk`, `example.co.uk`,
    /// `co.uk`. Single-label suffixes are never candidates.
    pub fn zone_candidates(&self) -> Vec<String> {
        let labels: Vec<&str> = self.0.split('.').collect();
        (0..labels.len().saturating_sub(1))
            .map(|i| labels[i..].join("."))
            .collect()
    }
}

impl std::fmt::Display for DomainName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for DomainName {
    type Error = CloudError;

    fn try_from(value: String) -> Result<Self> {
        DomainName::parse(&value)
    }
}

impl From<DomainName> for String {
    fn from(domain: DomainName) -> Self {
        domain.0
    }
}

/// Tag set attached to every taggable resource
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceTags(BTreeMap<String, String>);

impl ResourceTags {
    pub fn for_stack(stack_name: &str) -> Self {
        let mut tags = BTreeMap::new();
        tags.insert("ManagedBy".to_string(), "sitestack".to_string());
        tags.insert("Stack".to_string(), stack_name.to_string());
        Self(tags)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
