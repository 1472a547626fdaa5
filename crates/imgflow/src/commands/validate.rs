use super::{ConfigArgs, display_path, load_conf};
use colored::Colorize;
use imgflow_build::read_jobs;

/// 設定を検証し、ジョブの概要を表示する
///
/// ジョブがない設定や不正なタグは `read_jobs` が拒否します。問題がなければ `true`。
pub fn handle(args: &ConfigArgs) -> anyhow::Result<bool> {
    let (path, conf) = load_conf(args)?;
    println!("{}", "🔍 設定ファイルを検証中...".blue());
    println!("  {}", display_path(&path).cyan());
    println!();

    let jobs = match read_jobs(&conf) {
        Ok(jobs) => jobs,
        Err(err) => {
            println!("{} {}", "✗".red().bold(), err.user_message());
            return Ok(false);
        }
    };

    for (index, job) in jobs.iter().enumerate() {
        println!(
            "{} {} {}",
            format!("[{}]", index).dimmed(),
            job.output_name.green().bold(),
            format!("({})", job.containerfile_or_default()).dimmed()
        );

        if job.output_tags.is_empty() {
            println!("    {}", "タグなし（ビルドのみ）".yellow());
        }
        for reference in job.target_refs() {
            println!("    {} {}", "•".dimmed(), reference);
        }
        if !job.build_args.is_empty() {
            println!("    {} {}", "build-args:".dimmed(), job.build_args.len());
        }
        if !job.annotations.is_empty() || !job.labels.is_empty() {
            println!(
                "    {} {} / {}",
                "annotations / labels:".dimmed(),
                job.annotations.len(),
                job.labels.len()
            );
        }
    }

    println!();
    println!(
        "{} {}",
        "✓".green().bold(),
        format!("{} 個のジョブ", jobs.len()).green()
    );
    Ok(true)
}
