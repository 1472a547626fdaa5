//! `op://` シークレットの解決
//!
//! `op://Vault/Item/Field` 形式の参照を 1Password CLI (`op read`) で
//! 平文に解決します。CI では `OP_SERVICE_ACCOUNT_TOKEN`、ローカルでは
//! `op signin` 済みのセッションを使います。`OP_ACCOUNT` があれば
//! `--account` として渡します。
//!
//! 平文はログにもエラーメッセージにも出しません。

use crate::error::{ConfigError, Result};
use std::process::Command;
use tracing::debug;

const SCHEME: &str = "op://";

/// 1Password CLI の呼び出し
#[derive(Debug, Clone)]
pub struct OpCli {
    binary: String,
    account: Option<String>,
}

impl Default for OpCli {
    fn default() -> Self {
        Self {
            binary: "op".to_string(),
            account: std::env::var("OP_ACCOUNT").ok().filter(|a| !a.is_empty()),
        }
    }
}

impl OpCli {
    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            ..Default::default()
        }
    }

    pub fn is_available(&self) -> bool {
        Command::new(&self.binary)
            .arg("--version")
            .output()
            .is_ok_and(|output| output.status.success())
    }

    /// 参照を平文に解決（末尾の空白は除去）
    pub fn read(&self, reference: &str) -> Result<String> {
        if !is_op_reference(reference) {
            return Err(ConfigError::Secret(format!(
                "1Password の参照ではありません: {} ({}... の形式)",
                reference, SCHEME
            )));
        }
        debug!(reference, "Reading 1Password reference");

        let mut command = Command::new(&self.binary);
        command.arg("read").arg(reference);
        if let Some(account) = &self.account {
            command.arg("--account").arg(account);
        }

        let output = command.output().map_err(|e| {
            ConfigError::Secret(format!("{} を実行できません: {}", self.binary, e))
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stderr = stderr.trim();
            let message = match failure_hint(stderr) {
                Some(hint) => format!("{} の解決に失敗: {}\nヒント: {}", reference, stderr, hint),
                None => format!("{} の解決に失敗: {}", reference, stderr),
            };
            return Err(ConfigError::Secret(message));
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim_end().to_string())
    }
}

/// `op` が PATH 上にあるか
pub fn is_available() -> bool {
    OpCli::default().is_available()
}

pub fn is_op_reference(value: &str) -> bool {
    value.starts_with(SCHEME)
}

/// 既定の `op` で参照を解決
pub fn resolve_reference(reference: &str) -> Result<String> {
    OpCli::default().read(reference)
}

fn failure_hint(stderr: &str) -> Option<&'static str> {
    if stderr.contains("not signed in") || stderr.contains("session expired") {
        Some("`op signin` を実行するか OP_SERVICE_ACCOUNT_TOKEN を設定してください")
    } else if stderr.contains("isn't an item") || stderr.contains("not found") {
        Some("Vault・Item・Field の名前を確認してください")
    } else {
        None
    }
}
