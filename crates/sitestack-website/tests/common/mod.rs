use sitestack_cloud::RetryConfig;
use sitestack_config::SiteConfig;
use sitestack_website::{AssetManifest, MemoryCloud, Orchestrator, SiteDriver};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub const DOMAIN: &str = "example.com";
pub const BUCKET: &str = "site-assets-example";

/// Built asset tree plus an in-memory cloud with the domain's zone
pub struct TestSite {
    pub root: TempDir,
    pub cloud: MemoryCloud,
    pub zone_id: String,
}

impl TestSite {
    pub fn new() -> Self {
        let root = tempfile::tempdir().unwrap();
        let dist = root.path().join("dist");
        fs::create_dir_all(dist.join("img")).unwrap();
        fs::write(dist.join("index.html"), "<!doctype html><div id=app></div>").unwrap();
        fs::write(
            dist.join("app.js"),
            "document.getElementById('app').textContent = 'hi';",
        )
        .unwrap();
        fs::write(dist.join("img").join("logo.png"), [0x89, 0x50, 0x4e, 0x47, 0x0d, 0x0a]).unwrap();

        let cloud = MemoryCloud::new();
        let zone = cloud.add_zone(DOMAIN, false);
        Self {
            root,
            cloud,
            zone_id: zone.id,
        }
    }

    pub fn dist(&self) -> PathBuf {
        self.root.path().join("dist")
    }

    #[allow(dead_code)]
    pub fn write_asset(&self, relative: &str, content: &str) {
        let path = self.dist().join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }

    #[allow(dead_code)]
    pub fn remove_asset(&self, relative: &str) {
        fs::remove_file(self.dist().join(relative)).unwrap();
    }

    pub fn config(&self) -> SiteConfig {
        SiteConfig {
            website_bucket_name: BUCKET.to_string(),
            domain_name: DOMAIN.to_string(),
            asset_dir: self.dist(),
            ..Default::default()
        }
    }

    pub fn orchestrator(&self, config: SiteConfig) -> Orchestrator {
        Orchestrator::new(config)
            .unwrap()
            .with_retry(RetryConfig::immediate(3))
    }

    pub fn manifest(&self) -> AssetManifest {
        AssetManifest::scan(self.dist()).unwrap()
    }

    pub fn driver(&self) -> SiteDriver<'_, MemoryCloud> {
        SiteDriver::new(&self.cloud).with_validation_retry(RetryConfig::immediate(5))
    }

    #[allow(dead_code)]
    pub fn state_dir(&self) -> &Path {
        self.root.path()
    }
}
