use super::SiteArgs;
use anyhow::Context;
use colored::Colorize;
use std::path::Path;

pub const STACK_FILE: &str = "stack.json";

pub fn handle(args: &SiteArgs, out: &Path) -> anyhow::Result<()> {
    println!("{}", "スタックを生成中...".blue());
    let (orchestrator, manifest, stack) = super::synthesize(args)?;

    let document = stack.to_document()?;
    std::fs::create_dir_all(out)
        .with_context(|| format!("出力ディレクトリを作成できません: {}", out.display()))?;
    let path = out.join(STACK_FILE);
    std::fs::write(&path, serde_json::to_string_pretty(&document)?)
        .with_context(|| format!("書き込みに失敗しました: {}", path.display()))?;

    println!("{}", "✓ スタックを生成しました".green().bold());
    println!("  ドメイン: {}", orchestrator.domain().to_string().cyan());
    println!("  バケット: {}", orchestrator.config().website_bucket_name.cyan());
    println!("  リソース: {}個 (オブジェクト {}個)", stack.graph.len(), manifest.len());
    println!("  出力先: {}", path.display().to_string().cyan());
    Ok(())
}
