//! サイト設定 (site.yaml) の読み込みと検証

use crate::error::{ConfigError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// CloudFront 用の証明書は us-east-1 にしか置けない
pub const DEFAULT_REGION: &str = "us-east-1";
pub const DEFAULT_STACK_NAME: &str = "website";
pub const DEFAULT_ASSET_DIR: &str = "dist";
pub const DEFAULT_GEO_ALLOW_LIST: &[&str] = &["US", "VI", "PR"];

const BACKEND_BUCKET: &str = "sitestack-backend-state";
const BACKEND_LOCK_TABLE: &str = "sitestack-backend-lock";
const BACKEND_STATE_FILE: &str = "sitestack.tfstate";

/// site.yaml の内容
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    /// 静的サイト用バケット名
    #[serde(alias = "websiteBucketName")]
    pub website_bucket_name: String,

    /// サイトのドメイン名 (FQDN)
    #[serde(alias = "domainName")]
    pub domain_name: String,

    /// スタック名 (タグに使用)
    #[serde(alias = "stackName")]
    pub stack_name: String,

    /// ビルド済みアセットのディレクトリ
    #[serde(alias = "assetDir")]
    pub asset_dir: PathBuf,

    /// AWS プロファイル
    pub profile: Option<String>,

    pub region: String,

    /// 配信を許可する地域 (allow-list)
    #[serde(alias = "geoAllowList")]
    pub geo_allow_list: Vec<String>,

    /// マニフェストに無いオブジェクトを削除するか
    pub prune: bool,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            website_bucket_name: String::new(),
            domain_name: String::new(),
            stack_name: DEFAULT_STACK_NAME.to_string(),
            asset_dir: PathBuf::from(DEFAULT_ASSET_DIR),
            profile: None,
            region: DEFAULT_REGION.to_string(),
            geo_allow_list: DEFAULT_GEO_ALLOW_LIST.iter().map(|s| s.to_string()).collect(),
            prune: false,
        }
    }
}

impl SiteConfig {
    /// YAML ファイルから読み込む
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: SiteConfig = serde_yaml::from_str(&content)?;
        tracing::debug!("Loaded site config from {}", path.as_ref().display());
        Ok(config)
    }

    /// 設定ファイルを探して読み込み、環境変数で上書きする
    ///
    /// 設定ファイルが無い場合は環境変数だけで構成する。
    pub fn discover() -> Result<Self> {
        let mut config = match crate::find_site_file() {
            Ok(path) => Self::load(path)?,
            Err(ConfigError::SiteFileNotFound) => {
                tracing::debug!("No site file found, using environment only");
                Self::default()
            }
            Err(e) => return Err(e),
        };
        config.apply_env();
        Ok(config)
    }

    /// 環境変数による上書き
    ///
    /// - `WEBSITE_BUCKET_NAME`
    /// - `DOMAIN_NAME`
    /// - `AWS_PROFILE`
    pub fn apply_env(&mut self) {
        if let Ok(bucket) = std::env::var("WEBSITE_BUCKET_NAME") {
            self.website_bucket_name = bucket;
        }
        if let Ok(domain) = std::env::var("DOMAIN_NAME") {
            self.domain_name = domain;
        }
        if let Ok(profile) = std::env::var("AWS_PROFILE") {
            if !profile.is_empty() {
                self.profile = Some(profile);
            }
        }
    }

    /// 入力を正規化して検証する (グラフ生成前に必ず呼ぶ)
    pub fn validate(&mut self) -> Result<()> {
        self.website_bucket_name = self.website_bucket_name.trim().to_string();
        self.domain_name = normalize_domain(&self.domain_name);

        if self.website_bucket_name.is_empty() {
            return Err(ConfigError::MissingField("website_bucket_name"));
        }
        if self.domain_name.is_empty() {
            return Err(ConfigError::MissingField("domain_name"));
        }
        validate_bucket_name(&self.website_bucket_name)?;
        validate_domain_name(&self.domain_name)?;

        for code in &self.geo_allow_list {
            if code.len() != 2 || !code.chars().all(|c| c.is_ascii_uppercase()) {
                return Err(ConfigError::InvalidGeoLocation(code.clone()));
            }
        }
        Ok(())
    }

    /// リモート状態バックエンドの設定
    pub fn backend(&self) -> BackendConfig {
        BackendConfig::for_domain(&self.domain_name)
    }
}

/// 状態を保存するリモートバックエンド (固定値)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendConfig {
    pub bucket: String,
    pub key: String,
    pub region: String,
    pub lock_table: String,
    pub encrypt: bool,
}

impl BackendConfig {
    pub fn for_domain(domain: &str) -> Self {
        Self {
            bucket: BACKEND_BUCKET.to_string(),
            key: format!("{}/{}", domain, BACKEND_STATE_FILE),
            region: DEFAULT_REGION.to_string(),
            lock_table: BACKEND_LOCK_TABLE.to_string(),
            encrypt: true,
        }
    }
}

fn normalize_domain(domain: &str) -> String {
    domain.trim().trim_end_matches('.').to_ascii_lowercase()
}

/// S3 のバケット命名規則
pub fn validate_bucket_name(name: &str) -> Result<()> {
    let invalid = |reason| ConfigError::InvalidBucketName {
        name: name.to_string(),
        reason,
    };

    if !(3..=63).contains(&name.len()) {
        return Err(invalid("3〜63文字である必要があります"));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '.')
    {
        return Err(invalid("英小文字・数字・ハイフン・ドットのみ使用できます"));
    }
    let starts_ok = name.chars().next().is_some_and(|c| c.is_ascii_alphanumeric());
    let ends_ok = name.chars().last().is_some_and(|c| c.is_ascii_alphanumeric());
    if !starts_ok || !ends_ok {
        return Err(invalid("先頭と末尾は英数字である必要があります"));
    }
    if name.contains("..") {
        return Err(invalid("ドットを連続させることはできません"));
    }
    if name.split('.').count() == 4 && name.split('.').all(|p| p.parse::<u8>().is_ok()) {
        return Err(invalid("IP アドレス形式は使用できません"));
    }
    if name.starts_with("xn--") || name.ends_with("-s3alias") {
        return Err(invalid("予約済みの接頭辞・接尾辞です"));
    }
    Ok(())
}

/// FQDN の検証 (正規化済みの値を渡す)
pub fn validate_domain_name(name: &str) -> Result<()> {
    let invalid = |reason| ConfigError::InvalidDomainName {
        name: name.to_string(),
        reason,
    };

    if name.len() > 253 {
        return Err(invalid("253文字以内である必要があります"));
    }
    let labels: Vec<&str> = name.split('.').collect();
    if labels.len() < 2 {
        return Err(invalid("完全修飾ドメイン名 (例: example.com) を指定してください"));
    }
    for label in &labels {
        if label.is_empty() || label.len() > 63 {
            return Err(invalid("各ラベルは1〜63文字である必要があります"));
        }
        if !label
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        {
            return Err(invalid("英小文字・数字・ハイフンのみ使用できます"));
        }
        if label.starts_with('-') || label.ends_with('-') {
            return Err(invalid("ラベルの先頭と末尾にハイフンは使えません"));
        }
    }
    if labels
        .last()
        .is_some_and(|tld| tld.chars().all(|c| c.is_ascii_digit()))
    {
        return Err(invalid("トップレベルドメインが数字のみです"));
    }
    Ok(())
}
