//! ジョブ定義

use serde::Serialize;
use std::collections::BTreeMap;

/// containerfile が空のときに使われるパス
pub const DEFAULT_CONTAINERFILE: &str = "Dockerfile";

/// ビルドと公開の単位
///
/// YAML形式：
/// ```yaml
/// jobs:
///   - containerfile: Containerfile
///     build-args:
///       BASE: fedora:40
///     labels:
///       org.opencontainers.image.title: base
///     output-name: ghcr.io/org/base
///     output-tags: [latest, "{{ nowTag() }}"]
/// ```
///
/// 各マップは `BTreeMap` なので、ラベル等はキー順で適用されます。
/// デシリアライズ（重複キーは後勝ち）は `de` モジュールで実装。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct Job {
    /// ビルドコンテキストからの相対パス
    pub containerfile: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub build_args: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    /// 出力イメージ名（レジストリ込み、タグなし）
    #[serde(skip_serializing_if = "String::is_empty")]
    pub output_name: String,
    /// 出力タグ（順序・重複はそのまま保持）
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub output_tags: Vec<String>,
}

impl Job {
    /// containerfile が空なら `Dockerfile` を返す
    pub fn containerfile_or_default(&self) -> &str {
        if self.containerfile.is_empty() {
            DEFAULT_CONTAINERFILE
        } else {
            &self.containerfile
        }
    }

    /// 出力イメージ名を小文字化する（冪等）
    pub fn normalize(&mut self) {
        self.output_name = normalize_output_name(&self.output_name);
    }

    /// `output-name:tag` 形式の公開先参照
    pub fn target_ref(&self, tag: &str) -> String {
        format!("{}:{}", self.output_name, tag)
    }

    /// すべてのタグに対する公開先参照（設定順）
    pub fn target_refs(&self) -> Vec<String> {
        self.output_tags
            .iter()
            .map(|tag| self.target_ref(tag))
            .collect()
    }
}

/// イメージ参照は大文字を受け付けないため小文字に正規化
pub fn normalize_output_name(name: &str) -> String {
    name.to_lowercase()
}
