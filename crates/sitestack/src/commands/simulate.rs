use super::SiteArgs;
use colored::Colorize;
use sitestack_cloud::GlobalState;
use sitestack_website::{DISTRIBUTION_ID_OUTPUT, MemoryCloud, SiteDriver};

/// インメモリのクラウドにスタック全体を適用する
///
/// ドメインと同名のホストゾーンを用意した上で適用し、作成されたリソースと
/// 出力値を表示する。実際のクラウドには一切触れない。
pub async fn handle(args: &SiteArgs) -> anyhow::Result<()> {
    println!("{}", "インメモリのクラウドで適用中...".blue());
    let (orchestrator, manifest, stack) = super::synthesize(args)?;

    let cloud = MemoryCloud::in_region(&orchestrator.config().region);
    cloud.add_zone(orchestrator.domain().as_str(), false);
    let driver = SiteDriver::new(&cloud);

    let mut state = GlobalState::new();
    let result = orchestrator
        .provision_in_memory(&stack, &driver, &mut state)
        .await?;

    println!();
    println!("{}", "✓ 適用しました".green().bold());
    println!("  リソース: {}個", state.resources.len());
    println!(
        "  オブジェクト: {}/{}個",
        cloud.object_keys(&orchestrator.config().website_bucket_name).len(),
        manifest.len()
    );
    for (info, config) in cloud.distributions() {
        println!(
            "  ディストリビューション: {} ({} → {})",
            info.id.cyan(),
            config.aliases.join(", "),
            info.domain_name
        );
    }
    for failed in &result.failed {
        eprintln!(
            "{} {}: {}",
            "⚠".yellow(),
            failed.action_id,
            failed.error.as_deref().unwrap_or_default()
        );
    }
    if let Some(serde_json::Value::String(id)) = result.outputs.get(DISTRIBUTION_ID_OUTPUT) {
        println!("{} = {}", DISTRIBUTION_ID_OUTPUT, id);
    }
    Ok(())
}
