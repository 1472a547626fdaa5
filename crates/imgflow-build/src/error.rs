use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("設定にジョブがありません")]
    EmptyConfig,

    #[error("Invalid build configuration: {0}")]
    InvalidConfig(String),

    #[error("Containerfile not found: {0}")]
    ContainerfileNotFound(PathBuf),

    #[error("Build context directory not found: {0}")]
    ContextNotFound(PathBuf),

    #[error("Docker connection error: {0}")]
    DockerConnection(#[from] bollard::errors::Error),

    #[error("Build failed: {0}")]
    BuildFailed(String),

    #[error("Push failed: {message}")]
    PushFailed { message: String },

    #[error("Invalid tag: {tag}")]
    InvalidTag { tag: String },

    #[error("Registry authentication failed for {registry}: {message}")]
    AuthFailed { registry: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("ビルドがキャンセルされました")]
    Cancelled,

    #[error("Build task panicked: {0}")]
    TaskPanicked(String),

    #[error("job {index} ({output_name}) failed: {source}")]
    JobFailed {
        index: usize,
        output_name: String,
        #[source]
        source: Box<BuildError>,
    },
}

impl BuildError {
    /// ユーザー向けの分かりやすいエラーメッセージ
    pub fn user_message(&self) -> String {
        match self {
            BuildError::ContainerfileNotFound(path) => {
                format!(
                    "Containerfileが見つかりません: {}\n\
                     \n\
                     解決方法:\n\
                     1. containerfile のパスがビルドコンテキストからの相対パスか確認してください\n\
                     2. 省略した場合はコンテキスト直下の Dockerfile が使われます",
                    path.display()
                )
            }
            BuildError::BuildFailed(msg) => {
                format!(
                    "ビルドに失敗しました: {}\n\
                     \n\
                     Containerfileの内容を確認してください。",
                    msg
                )
            }
            BuildError::ContextNotFound(path) => {
                format!(
                    "ビルドコンテキストが見つかりません: {}\n\
                     \n\
                     --context または IMGFLOW_CONTEXT を確認してください。",
                    path.display()
                )
            }
            BuildError::AuthFailed { registry, .. } => {
                format!(
                    "{}\n\
                     \n\
                     `docker login {}` でログインしてください。",
                    self, registry
                )
            }
            BuildError::EmptyConfig => {
                "設定にジョブがありません。jobs に1つ以上のジョブを定義してください。".to_string()
            }
            BuildError::JobFailed {
                index,
                output_name,
                source,
            } => {
                format!(
                    "ジョブ {} ({}) が失敗しました\n{}",
                    index,
                    output_name,
                    source.user_message()
                )
            }
            _ => format!("{}", self),
        }
    }

    /// 元のジョブのエラーを返す（`JobFailed` でなければ自身）
    pub fn root(&self) -> &BuildError {
        match self {
            BuildError::JobFailed { source, .. } => source.root(),
            other => other,
        }
    }
}

pub type BuildResult<T> = std::result::Result<T, BuildError>;
