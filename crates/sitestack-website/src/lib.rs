//! # sitestack-website
//!
//! TLS-secured, CDN-fronted static website stack.
//!
//! - [`assets`]: local asset tree scanning and content fingerprints
//! - [`sync`]: direct, fingerprint-based asset synchronization
//! - [`orchestrator`]: declares storage, certificate, distribution and DNS
//!   resources into a dependency graph
//! - [`driver`]: applies graph nodes through the provider [`services`]
//! - [`memory`]: in-memory implementation of every provider service
//!
//! ```text
//! AssetManifest ──> Orchestrator::synthesize ──> Stack (ResourceGraph)
//!                                                   │
//!                                      Executor + SiteDriver
//!                                                   │
//!        StorageService / ObjectStore / CertificateAuthority / DnsService / CdnService
//! ```

pub mod assets;
pub mod certificate;
pub mod distribution;
pub mod dns;
pub mod driver;
pub mod memory;
pub mod orchestrator;
pub mod policy;
pub mod services;
pub mod storage;
pub mod sync;
pub mod types;

pub use assets::{AssetManifest, AssetManifestEntry, content_type_for, fingerprint};
pub use distribution::{DistributionConfig, ViewerResponse};
pub use driver::{SiteCloud, SiteDriver};
pub use memory::MemoryCloud;
pub use orchestrator::{
    DISTRIBUTION_ID_OUTPUT, DistributionHandle, DnsAlias, Orchestrator, Stack, StorageHandle,
    ValidatedCertificate,
};
pub use policy::BucketPolicyDocument;
pub use services::{
    CdnService, CertificateAuthority, CertificateStatus, DnsService, ObjectStore, StorageService,
};
pub use sync::{AssetSynchronizer, SyncReport};
pub use types::{DomainName, ResourceTags};
