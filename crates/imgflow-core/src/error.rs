use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("設定ファイルにアクセスできません: {name}\n理由: {message}")]
    SourceUnavailable { name: String, message: String },

    #[error("未対応の設定ファイル形式: {0} (.yaml / .yml / .json のみ対応)")]
    UnsupportedFormat(String),

    #[error("設定ファイルのデコードに失敗: {file}\n理由: {message}")]
    DecodeError { file: String, message: String },

    #[error("テンプレートエラー: {template}\n理由: {message}")]
    TemplateError { template: String, message: String },

    #[error("設定にジョブがありません")]
    EmptyConfig,

    #[error("設定のシリアライズに失敗: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("シークレットの解決に失敗: {0}")]
    Secret(String),

    #[error("os-release の取得に失敗: {image}\n理由: {message}")]
    OsRelease { image: String, message: String },
}

pub type Result<T> = std::result::Result<T, ConfigError>;
