mod commands;

use clap::{Parser, Subcommand};
use colored::Colorize;
use commands::ConfigArgs;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "imgflow")]
#[command(about = "テンプレート化されたジョブ定義からコンテナイメージをビルド・公開", long_about = None)]
struct Cli {
    /// 詳細なログを出力（RUST_LOG が優先）
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// すべてのジョブをビルドして公開
    Build {
        #[command(flatten)]
        config: ConfigArgs,
        /// ビルドコンテキストのディレクトリ
        #[arg(long, env = "IMGFLOW_CONTEXT", default_value = ".")]
        context: PathBuf,
        /// ビルドのみ行い、公開しない
        #[arg(long)]
        dry_run: bool,
    },
    /// 展開・正規化した設定（JSON）を表示
    Config {
        #[command(flatten)]
        config: ConfigArgs,
        /// 整形して表示
        #[arg(long)]
        pretty: bool,
    },
    /// 設定を検証
    Validate {
        #[command(flatten)]
        config: ConfigArgs,
    },
    /// バージョン情報を表示
    Version,
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    // 標準出力はイメージ参照に使うので、ログは標準エラーへ
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(verbose)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Build {
            config,
            context,
            dry_run,
        } => {
            commands::build::handle(&config, &context, dry_run).await?;
        }
        Commands::Config { config, pretty } => {
            commands::config::handle(&config, pretty)?;
        }
        Commands::Validate { config } => {
            if !commands::validate::handle(&config)? {
                std::process::exit(1);
            }
        }
        Commands::Version => {
            println!("{} {}", "imgflow".bold(), env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
