use super::SiteArgs;
use colored::Colorize;
use sitestack_cloud::{ActionType, StateManager};

pub async fn handle(args: &SiteArgs) -> anyhow::Result<()> {
    println!("{}", "差分を計算中...".blue());
    let (orchestrator, _, stack) = super::synthesize(args)?;

    let manager = StateManager::new(super::project_root()?);
    let state = manager.load().await?;
    let plan = sitestack_cloud::plan(&stack.graph, &state)?;

    println!();
    for action in &plan.actions {
        let line = format!("{} {}", symbol(action.action_type), action.description);
        match action.action_type {
            ActionType::Create => println!("  {}", line.green()),
            ActionType::Update => println!("  {}", line.yellow()),
            ActionType::Delete => println!("  {}", line.red()),
            ActionType::Read | ActionType::NoOp => println!("  {}", line.dimmed()),
        }
    }

    let summary = plan.summary();
    println!();
    if plan.has_changes {
        println!("{}", summary.to_string().bold());
        if summary.delete > 0 && !orchestrator.config().prune {
            println!(
                "{}",
                "  削除は --prune を指定した場合のみ実行されます".dimmed()
            );
        }
    } else {
        println!("{}", "✓ 変更はありません".green().bold());
    }
    Ok(())
}

fn symbol(action_type: ActionType) -> &'static str {
    match action_type {
        ActionType::Create => "+",
        ActionType::Update => "~",
        ActionType::Delete => "-",
        ActionType::Read => "<=",
        ActionType::NoOp => " ",
    }
}
