pub mod manifest;
pub mod output;
pub mod plan;
pub mod simulate;
pub mod synth;

use anyhow::Context;
use clap::Args;
use colored::Colorize;
use sitestack_config::SiteConfig;
use sitestack_website::{AssetManifest, Orchestrator, Stack};
use std::path::PathBuf;

/// サイト設定を上書きするオプション
#[derive(Args, Debug, Clone)]
pub struct SiteArgs {
    /// 設定ファイル (省略時は site.yaml を探索)
    #[arg(short, long, env = "SITESTACK_CONFIG_PATH")]
    pub config: Option<PathBuf>,
    /// 静的サイト用バケット名
    #[arg(long, env = "WEBSITE_BUCKET_NAME")]
    pub bucket: Option<String>,
    /// サイトのドメイン名
    #[arg(long, env = "DOMAIN_NAME")]
    pub domain: Option<String>,
    /// ビルド済みアセットのディレクトリ
    #[arg(short, long)]
    pub assets: Option<PathBuf>,
    /// マニフェストに無いオブジェクトを削除する
    #[arg(long)]
    pub prune: bool,
}

impl SiteArgs {
    /// 設定ファイル → 環境変数 → フラグの順に重ねて読み込む
    pub fn load(&self) -> anyhow::Result<SiteConfig> {
        let mut config = match &self.config {
            Some(path) => {
                let mut config = SiteConfig::load(path)
                    .with_context(|| format!("設定ファイルを読み込めません: {}", path.display()))?;
                config.apply_env();
                config
            }
            None => SiteConfig::discover()?,
        };

        if let Some(bucket) = &self.bucket {
            config.website_bucket_name = bucket.clone();
        }
        if let Some(domain) = &self.domain {
            config.domain_name = domain.clone();
        }
        if let Some(assets) = &self.assets {
            config.asset_dir = assets.clone();
        }
        if self.prune {
            config.prune = true;
        }
        tracing::debug!(
            "Site config: bucket={} domain={} assets={}",
            config.website_bucket_name,
            config.domain_name,
            config.asset_dir.display()
        );
        Ok(config)
    }
}

/// 設定を検証し、アセットを走査してスタックを生成する
pub fn synthesize(args: &SiteArgs) -> anyhow::Result<(Orchestrator, AssetManifest, Stack)> {
    let config = args.load()?;
    let orchestrator = Orchestrator::new(config)?;
    let asset_dir = orchestrator.config().asset_dir.clone();
    let manifest = AssetManifest::scan(&asset_dir)
        .with_context(|| format!("アセットを走査できません: {}", asset_dir.display()))?;
    let stack = orchestrator.synthesize(&manifest)?;

    for skipped in &stack.skipped_assets {
        eprintln!("{} {}", "⚠ 読み込めないアセットをスキップ:".yellow(), skipped);
    }
    Ok((orchestrator, manifest, stack))
}

/// 状態ファイルを置くプロジェクトルート (カレントディレクトリ)
pub fn project_root() -> anyhow::Result<PathBuf> {
    std::env::current_dir().context("カレントディレクトリを取得できません")
}
