//! 設定全体とその正規形

use super::job::Job;
use crate::error::{ConfigError, Result};
use serde::Serialize;

/// [`Config`] をシリアライズしたJSON文字列
///
/// パース段階からオーケストレーション段階へ渡される唯一の状態。
pub type ConfString = String;

/// デシリアライズ（重複キーは後勝ち）は `de` モジュールで実装。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Config {
    pub jobs: Vec<Job>,
}

impl Config {
    /// ジョブが1つもない設定は実行前に拒否する
    pub fn ensure_not_empty(&self) -> Result<()> {
        if self.jobs.is_empty() {
            return Err(ConfigError::EmptyConfig);
        }
        Ok(())
    }

    /// 正規形（JSON）へ変換
    pub fn to_conf_string(&self) -> Result<ConfString> {
        Ok(serde_json::to_string(self)?)
    }
}

/// 正規形から [`Config`] を復元
pub fn read_conf_string(conf: &str) -> Result<Config> {
    serde_json::from_str(conf).map_err(|e| ConfigError::DecodeError {
        file: "<canonical config>".to_string(),
        message: e.to_string(),
    })
}
