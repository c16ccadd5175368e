pub mod error;
pub mod site;

pub use error::*;
pub use site::{BackendConfig, SiteConfig};

use std::path::PathBuf;

/// sitestackの設定ディレクトリを取得
pub fn get_config_dir() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .ok_or(ConfigError::ConfigDirNotFound)?
        .join("sitestack");

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)?;
    }

    Ok(config_dir)
}

/// プロジェクトのsite.yamlファイルを探す
///
/// 以下の優先順位で設定ファイルを検索:
/// 1. 環境変数 SITESTACK_CONFIG_PATH (直接パス指定)
/// 2. カレントディレクトリ: site.local.yaml, .site.local.yaml, site.yaml, .site.yaml
/// 3. ./.sitestack/ ディレクトリ内: 同様の順序
/// 4. ~/.config/sitestack/site.yaml (グローバル設定)
pub fn find_site_file() -> Result<PathBuf> {
    // 1. 環境変数で直接指定
    if let Ok(config_path) = std::env::var("SITESTACK_CONFIG_PATH") {
        let path = PathBuf::from(config_path);
        if path.exists() {
            return Ok(path);
        }
    }

    let current_dir = std::env::current_dir()?;
    let candidates = [
        "site.local.yaml",
        ".site.local.yaml",
        "site.yaml",
        ".site.yaml",
    ];

    // 2. カレントディレクトリで検索
    for filename in &candidates {
        let path = current_dir.join(filename);
        if path.exists() {
            return Ok(path);
        }
    }

    // 3. ./.sitestack/ ディレクトリで検索
    let site_dir = current_dir.join(".sitestack");
    if site_dir.is_dir() {
        for filename in &candidates {
            let path = site_dir.join(filename);
            if path.exists() {
                return Ok(path);
            }
        }
    }

    // 4. グローバル設定ファイル (~/.config/sitestack/site.yaml)
    if let Some(config_dir) = dirs::config_dir() {
        let global_config = config_dir.join("sitestack").join("site.yaml");
        if global_config.exists() {
            return Ok(global_config);
        }
    }

    Err(ConfigError::SiteFileNotFound)
}
