//! Hosted zone lookup and record publication

use crate::services::{
    AliasTarget, DistributionInfo, DnsRecord, DnsService, HostedZone, ValidationRecord,
};
use crate::types::DomainName;
use sitestack_cloud::{CloudError, Result};

/// TTL of the transient certificate validation record
pub const VALIDATION_RECORD_TTL: u32 = 60;

/// Find the public hosted zone serving `domain`
///
/// Walks from the full name towards the apex and returns the most specific
/// public zone. Private zones are ignored.
pub async fn resolve_hosted_zone(dns: &dyn DnsService, domain: &DomainName) -> Result<HostedZone> {
    for candidate in domain.zone_candidates() {
        let zones = dns.find_zones(&candidate).await?;
        let mut public = zones.into_iter().filter(|z| !z.private);
        if let Some(zone) = public.next() {
            if public.next().is_some() {
                tracing::warn!(
                    "Several public hosted zones named {}; using {}",
                    candidate,
                    zone.id
                );
            }
            tracing::debug!("Hosted zone for {}: {} ({})", domain, zone.name, zone.id);
            return Ok(zone);
        }
    }
    Err(CloudError::ZoneNotFound(domain.to_string()))
}

/// Create `record`, refusing to touch an existing record of the same name
/// and type
///
/// An existing record identical to `record` counts as already created.
pub async fn create_record(dns: &dyn DnsService, zone_id: &str, record: &DnsRecord) -> Result<()> {
    match dns.find_record(zone_id, &record.name, &record.record_type).await? {
        Some(existing) if existing == *record => {
            tracing::info!("DNS record already present: {} {}", record.record_type, record.name);
            Ok(())
        }
        Some(existing) => Err(CloudError::conflict(
            format!("{} {}", record.record_type, record.fqdn()),
            format!(
                "a record already exists in zone {} ({})",
                zone_id,
                describe(&existing)
            ),
        )),
        None => {
            dns.create_record(zone_id, record).await?;
            tracing::info!("Created DNS record: {} {}", record.record_type, record.name);
            Ok(())
        }
    }
}

/// Alias `domain` to the distribution's generated name
pub fn alias_record(domain: &str, distribution: &DistributionInfo) -> DnsRecord {
    DnsRecord {
        name: domain.to_string(),
        record_type: "A".to_string(),
        ttl: None,
        values: Vec::new(),
        alias: Some(AliasTarget {
            dns_name: distribution.domain_name.clone(),
            hosted_zone_id: distribution.hosted_zone_id.clone(),
            evaluate_target_health: false,
        }),
    }
}

pub fn validation_dns_record(validation: &ValidationRecord) -> DnsRecord {
    DnsRecord {
        name: validation.name.clone(),
        record_type: validation.record_type.clone(),
        ttl: Some(VALIDATION_RECORD_TTL),
        values: vec![validation.value.clone()],
        alias: None,
    }
}

fn describe(record: &DnsRecord) -> String {
    match &record.alias {
        Some(alias) => format!("alias to {}", alias.dns_name),
        None => record.values.join(", "),
    }
}
