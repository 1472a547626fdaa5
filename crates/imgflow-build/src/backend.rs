//! イメージのビルド・公開を行う外部サービスの抽象化

use crate::error::{BuildError, BuildResult};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// ビルドコンテキスト（全ジョブで共有される読み取り専用ディレクトリ）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildContext {
    dir: Arc<PathBuf>,
}

impl BuildContext {
    /// ディレクトリが存在することを確認して作成
    pub fn new(dir: impl Into<PathBuf>) -> BuildResult<Self> {
        let dir = dir.into();
        if !dir.is_dir() {
            return Err(BuildError::ContextNotFound(dir));
        }
        Ok(Self { dir: Arc::new(dir) })
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }
}

/// イメージビルダー兼パブリッシャー
///
/// `build` → `with_annotation`/`with_label` → `publish` → `release` の順に
/// 呼ばれます。ハンドルの操作は同期的です。
#[async_trait]
pub trait ImageBackend: Send + Sync + 'static {
    /// ビルド済みイメージのハンドル
    type Image: Send + Sync + 'static;

    /// コンテキストと Containerfile からイメージをビルド
    async fn build(
        &self,
        context: &BuildContext,
        containerfile: &str,
        build_args: &BTreeMap<String, String>,
    ) -> BuildResult<Self::Image>;

    fn with_annotation(&self, image: Self::Image, key: &str, value: &str) -> Self::Image;

    fn with_label(&self, image: Self::Image, key: &str, value: &str) -> Self::Image;

    /// `name:tag` 形式の参照へ公開し、公開された参照を返す
    async fn publish(&self, image: &Self::Image, target: &str) -> BuildResult<String>;

    /// ジョブがハンドルを使い終えたときに呼ばれる（成功・失敗・キャンセルを問わない）
    ///
    /// 中間イメージの削除などに使います。失敗はジョブの結果に影響しません。
    async fn release(&self, _image: Self::Image) {}
}
