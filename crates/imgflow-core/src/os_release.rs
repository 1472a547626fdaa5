//! `/etc/os-release` の取得とパース
//!
//! ベースイメージの `/etc/os-release` を読み、テンプレートから
//! `osRelease(image="...")` として参照できるようにします。
//! イメージからファイルを取り出す処理は [`OsReleaseSource`] として
//! 外部から注入します。

use crate::error::Result;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tera::Function;
use tracing::debug;

/// イメージから `/etc/os-release` の内容を取り出す
pub trait OsReleaseSource: Send + Sync {
    fn read_os_release(&self, image: &str) -> Result<String>;
}

/// os-release 形式（`KEY=VALUE`）をパース
///
/// 空行と `#` で始まる行は無視し、値のクォートは除去します。
pub fn parse_os_release(content: &str) -> BTreeMap<String, String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.split_once('='))
        .map(|(key, value)| (key.trim().to_string(), strip_quotes(value.trim()).to_string()))
        .collect()
}

fn strip_quotes(s: &str) -> &str {
    if s.len() >= 2
        && ((s.starts_with('"') && s.ends_with('"')) || (s.starts_with('\'') && s.ends_with('\'')))
    {
        &s[1..s.len() - 1]
    } else {
        s
    }
}

/// `osRelease(image)` テンプレート関数
pub struct OsReleaseFunction {
    source: Arc<dyn OsReleaseSource>,
}

impl OsReleaseFunction {
    pub fn new(source: impl OsReleaseSource + 'static) -> Self {
        Self {
            source: Arc::new(source),
        }
    }
}

impl Function for OsReleaseFunction {
    fn call(&self, args: &HashMap<String, Value>) -> tera::Result<Value> {
        let image = match args.get("image") {
            Some(Value::String(image)) => image,
            _ => {
                return Err(tera::Error::msg(
                    "Function `osRelease` requires a string `image` argument",
                ));
            }
        };

        debug!(image = %image, "Reading os-release");
        let content = self
            .source
            .read_os_release(image)
            .map_err(|e| tera::Error::msg(e.to_string()))?;

        let map: Map<String, Value> = parse_os_release(&content)
            .into_iter()
            .map(|(k, v)| (k, Value::String(v)))
            .collect();
        Ok(Value::Object(map))
    }
}
