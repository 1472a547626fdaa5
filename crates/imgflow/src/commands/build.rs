use super::{ConfigArgs, display_path, load_conf};
use anyhow::Context;
use colored::Colorize;
use imgflow_build::{BuildContext, BuildError, DockerBackend, Orchestrator, read_jobs};
use std::path::Path;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub async fn handle(args: &ConfigArgs, context: &Path, dry_run: bool) -> anyhow::Result<()> {
    let (path, conf) = load_conf(args)?;
    eprintln!(
        "{} {}",
        "設定ファイル:".dimmed(),
        display_path(&path).cyan()
    );

    // Docker に接続する前に空の設定を弾く
    read_jobs(&conf).map_err(report)?;
    let context = BuildContext::new(context).map_err(report)?;
    let backend = DockerBackend::connect()
        .await
        .map_err(report)
        .context("Docker に接続できませんでした")?;

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted; waiting for running builds to finish");
            on_signal.cancel();
        }
    });

    if dry_run {
        eprintln!("{}", "ドライラン: イメージは公開されません".yellow());
    }

    let orchestrator = Orchestrator::new(backend, context);
    let references = orchestrator
        .run_with_cancel(&conf, dry_run, cancel)
        .await
        .map_err(report)?;

    info!(count = references.len(), "Build finished");
    for reference in &references {
        println!("{}", reference);
    }

    eprintln!("{}", "✓ 完了".green().bold());
    Ok(())
}

/// 利用者向けのメッセージを表示してからエラーを返す
fn report(err: BuildError) -> anyhow::Error {
    eprintln!("{} {}", "✗".red().bold(), err.user_message());
    anyhow::Error::new(err)
}
