mod commands;

use clap::{Parser, Subcommand};
use commands::SiteArgs;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "sitestack")]
#[command(about = "静的サイトを、証明書とCDNとDNSまでまとめて。", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// スタック定義 (stack.json) を生成
    Synth {
        #[command(flatten)]
        site: SiteArgs,
        /// 出力ディレクトリ
        #[arg(short, long, default_value = "sitestack.out")]
        out: PathBuf,
    },
    /// ローカル状態との差分を表示
    Plan {
        #[command(flatten)]
        site: SiteArgs,
    },
    /// アセットのマニフェストを表示
    Manifest {
        #[command(flatten)]
        site: SiteArgs,
        /// JSON で出力
        #[arg(long)]
        json: bool,
    },
    /// 出力値 (distribution_id) を表示
    Output {
        /// 出力名
        #[arg(default_value = "distribution_id")]
        name: String,
    },
    /// インメモリのクラウドに適用して結果を確認
    Simulate {
        #[command(flatten)]
        site: SiteArgs,
    },
    /// バージョン情報を表示
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // ログはstderrへ (stdoutは出力値やJSONに使う)
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    match cli.command {
        Commands::Synth { site, out } => commands::synth::handle(&site, &out)?,
        Commands::Plan { site } => commands::plan::handle(&site).await?,
        Commands::Manifest { site, json } => commands::manifest::handle(&site, json)?,
        Commands::Output { name } => commands::output::handle(&name).await?,
        Commands::Simulate { site } => commands::simulate::handle(&site).await?,
        Commands::Version => {
            println!("sitestack {}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
