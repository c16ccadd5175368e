//! CDN distribution configuration
//!
//! The configuration is declared with reference tokens in place of the
//! origin, origin access control and certificate identifiers; the driver
//! receives it with every token resolved.

use crate::services::OriginAccessControlSpec;
use serde::{Deserialize, Serialize};
use sitestack_cloud::{CloudError, Result};

pub const ROOT_DOCUMENT: &str = "index.html";
pub const MIN_TTL: u64 = 0;
pub const DEFAULT_TTL: u64 = 3600;
pub const MAX_TTL: u64 = 86400;
pub const PRICE_CLASS: &str = "PriceClass_100";
pub const MINIMUM_PROTOCOL_VERSION: &str = "TLSv1.2_2021";

/// Viewer protocol versions that are never accepted
const LEGACY_PROTOCOLS: &[&str] = &["SSLv3", "TLSv1", "TLSv1_2016", "TLSv1.1_2016"];

/// Origin statuses rewritten to the root document
const FALLBACK_STATUSES: &[u16] = &[403, 404];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistributionOrigin {
    pub origin_id: String,
    pub domain_name: String,
    pub origin_access_control_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheBehavior {
    pub target_origin_id: String,
    pub allowed_methods: Vec<String>,
    pub cached_methods: Vec<String>,
    pub viewer_protocol_policy: String,
    pub min_ttl: u64,
    pub default_ttl: u64,
    pub max_ttl: u64,
    pub compress: bool,
    pub forward_query_string: bool,
    pub forward_cookies: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error_code: u16,
    pub response_code: u16,
    pub response_page_path: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GeoRestrictionType {
    Whitelist,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeoRestriction {
    pub restriction_type: GeoRestrictionType,
    pub locations: Vec<String>,
}

impl GeoRestriction {
    pub fn allows(&self, country: &str) -> bool {
        match self.restriction_type {
            GeoRestrictionType::Whitelist => self
                .locations
                .iter()
                .any(|l| l.eq_ignore_ascii_case(country)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewerCertificate {
    pub acm_certificate_arn: String,
    pub ssl_support_method: String,
    pub minimum_protocol_version: String,
}

/// Desired distribution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistributionConfig {
    pub comment: String,
    pub enabled: bool,
    pub is_ipv6_enabled: bool,
    pub aliases: Vec<String>,
    pub default_root_object: String,
    pub origin: DistributionOrigin,
    pub default_cache_behavior: CacheBehavior,
    pub custom_error_responses: Vec<ErrorResponse>,
    pub geo_restriction: GeoRestriction,
    pub viewer_certificate: ViewerCertificate,
    pub price_class: String,
}

/// What a viewer receives for an origin response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewerResponse {
    pub status: u16,
    /// Object served instead of the requested path, if rewritten
    pub rewritten_path: Option<String>,
}

impl DistributionConfig {
    /// Static site distribution for one domain and one storage origin
    pub fn for_site(
        domain: &str,
        origin_id: &str,
        origin_domain_name: String,
        origin_access_control_id: String,
        certificate_arn: String,
        geo_allow_list: &[String],
    ) -> Self {
        let methods = || {
            ["GET", "HEAD", "OPTIONS"]
                .iter()
                .map(|m| m.to_string())
                .collect::<Vec<_>>()
        };
        Self {
            comment: format!("Static site for {}", domain),
            enabled: true,
            is_ipv6_enabled: true,
            aliases: vec![domain.to_string()],
            default_root_object: ROOT_DOCUMENT.to_string(),
            origin: DistributionOrigin {
                origin_id: origin_id.to_string(),
                domain_name: origin_domain_name,
                origin_access_control_id,
            },
            default_cache_behavior: CacheBehavior {
                target_origin_id: origin_id.to_string(),
                allowed_methods: methods(),
                cached_methods: methods(),
                viewer_protocol_policy: "redirect-to-https".to_string(),
                min_ttl: MIN_TTL,
                default_ttl: DEFAULT_TTL,
                max_ttl: MAX_TTL,
                compress: true,
                forward_query_string: false,
                forward_cookies: "none".to_string(),
            },
            custom_error_responses: FALLBACK_STATUSES
                .iter()
                .map(|code| ErrorResponse {
                    error_code: *code,
                    response_code: 200,
                    response_page_path: format!("/{}", ROOT_DOCUMENT),
                })
                .collect(),
            geo_restriction: GeoRestriction {
                restriction_type: GeoRestrictionType::Whitelist,
                locations: geo_allow_list.to_vec(),
            },
            viewer_certificate: ViewerCertificate {
                acm_certificate_arn: certificate_arn,
                ssl_support_method: "sni-only".to_string(),
                minimum_protocol_version: MINIMUM_PROTOCOL_VERSION.to_string(),
            },
            price_class: PRICE_CLASS.to_string(),
        }
    }

    pub fn from_json(value: &serde_json::Value) -> Result<Self> {
        let config: Self = serde_json::from_value(value.clone())?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }

    pub fn validate(&self) -> Result<()> {
        let behavior = &self.default_cache_behavior;
        if !(behavior.min_ttl <= behavior.default_ttl && behavior.default_ttl <= behavior.max_ttl) {
            return Err(CloudError::Configuration(format!(
                "TTL bounds out of order: min={} default={} max={}",
                behavior.min_ttl, behavior.default_ttl, behavior.max_ttl
            )));
        }
        if self.geo_restriction.locations.is_empty() {
            return Err(CloudError::Configuration(
                "geographic allow-list is empty".to_string(),
            ));
        }
        if self.aliases.is_empty() {
            return Err(CloudError::Configuration(
                "distribution has no aliases".to_string(),
            ));
        }
        let version = self.viewer_certificate.minimum_protocol_version.as_str();
        if LEGACY_PROTOCOLS.contains(&version) {
            return Err(CloudError::Configuration(format!(
                "minimum protocol version {} is not allowed",
                version
            )));
        }
        if self.origin.origin_access_control_id.is_empty() {
            return Err(CloudError::OriginAccessControl(
                "distribution origin has no origin access control".to_string(),
            ));
        }
        Ok(())
    }

    pub fn allows_method(&self, method: &str) -> bool {
        self.default_cache_behavior
            .allowed_methods
            .iter()
            .any(|m| m.eq_ignore_ascii_case(method))
    }

    /// Apply the error response rules to an origin response for `path`
    pub fn route_origin_response(&self, origin_status: u16, path: &str) -> ViewerResponse {
        match self
            .custom_error_responses
            .iter()
            .find(|r| r.error_code == origin_status)
        {
            Some(rule) => ViewerResponse {
                status: rule.response_code,
                rewritten_path: Some(rule.response_page_path.clone()),
            },
            None => {
                tracing::trace!("{} {} passes through", origin_status, path);
                ViewerResponse {
                    status: origin_status,
                    rewritten_path: None,
                }
            }
        }
    }
}

/// Origin access control that signs every origin request
pub fn origin_access_control_spec(bucket: &str, domain: &str) -> OriginAccessControlSpec {
    OriginAccessControlSpec {
        name: format!("{}-oac", bucket),
        description: format!("Origin access control for {}", domain),
        origin_type: "s3".to_string(),
        signing_behavior: "always".to_string(),
        signing_protocol: "sigv4".to_string(),
    }
}
