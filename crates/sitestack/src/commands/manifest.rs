use super::SiteArgs;
use anyhow::Context;
use colored::Colorize;
use sitestack_website::AssetManifest;

pub fn handle(args: &SiteArgs, json: bool) -> anyhow::Result<()> {
    let config = args.load()?;
    let manifest = AssetManifest::scan(&config.asset_dir)
        .with_context(|| format!("アセットを走査できません: {}", config.asset_dir.display()))?;

    if json {
        let entries: Vec<_> = manifest.entries().collect();
        println!("{}", serde_json::to_string_pretty(&entries)?);
    } else {
        println!("アセット: {}", manifest.root.display().to_string().cyan());
        for entry in manifest.entries() {
            println!(
                "  {} {} {} ({} bytes)",
                &entry.content_fingerprint[..12],
                entry.relative_key.cyan(),
                entry.content_type.as_deref().unwrap_or("(未設定)").dimmed(),
                entry.size
            );
        }
        println!("ファイル: {}個", manifest.len());
    }

    for failure in manifest.failures() {
        eprintln!("{} {}", "✗".red(), failure);
    }
    Ok(())
}
