use sitestack_cloud::StateManager;

/// 状態ファイルから出力値を表示する (スクリプトから使えるよう値のみ)
pub async fn handle(name: &str) -> anyhow::Result<()> {
    let manager = StateManager::new(super::project_root()?);
    let state = manager.load().await?;
    let value = state
        .output(name)
        .ok_or_else(|| anyhow::anyhow!("出力 '{}' がありません (まだ適用されていません)", name))?;

    match value {
        serde_json::Value::String(s) => println!("{}", s),
        other => println!("{}", other),
    }
    Ok(())
}
