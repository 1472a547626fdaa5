pub mod build;
pub mod config;
pub mod validate;

use clap::Args;
use imgflow_build::DockerOsRelease;
use imgflow_core::{
    ConfString, FileSource, FunctionRegistry, OsReleaseFunction, ParseOptions, SecretRef,
    onepassword, parse_source, secrets_to_map,
};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// 設定ファイルの読み込みに関する共通オプション
#[derive(Args, Debug, Clone)]
pub struct ConfigArgs {
    /// 設定ファイルのパス（省略時は IMGFLOW_CONFIG_PATH、カレントディレクトリの順に探す）
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// テンプレートの `secrets` に渡すシークレット（env://NAME, file://PATH, op://...）
    #[arg(long = "secret", env = "IMGFLOW_SECRETS", value_delimiter = ',')]
    pub secrets: Vec<String>,

    /// IMGFLOW_* / CI_* / GITHUB_* 環境変数をテンプレートの `env` として公開しない
    #[arg(long)]
    pub no_env: bool,
}

/// 設定ファイルを探してパースし、正規形を返す
pub fn load_conf(args: &ConfigArgs) -> anyhow::Result<(PathBuf, ConfString)> {
    let path = imgflow_config::find_config_file(args.config.as_deref())?;
    info!(path = %path.display(), "Loading config");

    let options = parse_options(args);
    let conf = parse_source(&FileSource::new(&path), &options)?;
    Ok((path, conf))
}

fn parse_options(args: &ConfigArgs) -> ParseOptions {
    let registry = FunctionRegistry::builtin()
        .with_function("osRelease", OsReleaseFunction::new(DockerOsRelease::new()));

    ParseOptions::new(registry)
        .with_env(!args.no_env)
        .with_secrets(resolve_secrets(&args.secrets))
}

fn resolve_secrets(uris: &[String]) -> Option<imgflow_core::SecretMap> {
    let refs: Vec<SecretRef> = uris
        .iter()
        .map(|uri| uri.trim())
        .filter(|uri| !uri.is_empty())
        .map(SecretRef::new)
        .collect();

    let secrets = secrets_to_map(&refs);
    if secrets.is_none() && !refs.is_empty() {
        warn!("シークレットを解決できなかったため、secrets は未定義になります");
        if uris.iter().any(|uri| onepassword::is_op_reference(uri)) && !onepassword::is_available()
        {
            warn!("1Password CLI (op) が見つかりません");
        }
    }
    secrets
}

/// 表示用の相対パス
pub fn display_path(path: &Path) -> String {
    std::env::current_dir()
        .ok()
        .and_then(|cwd| path.strip_prefix(cwd).ok().map(Path::to_path_buf))
        .unwrap_or_else(|| path.to_path_buf())
        .display()
        .to_string()
}
