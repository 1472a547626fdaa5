use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error(
        "設定ファイルが見つかりません。以下の場所を確認してください:\n\
        - カレントディレクトリ: imgflow.local.yaml, imgflow.yaml, imgflow.yml, imgflow.json, .imgflow.yaml\n\
        - ./.imgflow/ ディレクトリ\n\
        または --config / IMGFLOW_CONFIG_PATH で直接指定できます"
    )]
    ConfigFileNotFound,

    #[error("指定された設定ファイルが存在しません: {0}")]
    ExplicitPathNotFound(PathBuf),

    #[error("IO エラー: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
