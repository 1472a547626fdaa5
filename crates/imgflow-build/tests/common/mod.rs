use async_trait::async_trait;
use imgflow_build::{BuildContext, BuildError, BuildResult, ImageBackend};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;
use tempfile::TempDir;

/// 外部呼び出しの記録
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Build {
        containerfile: String,
        build_args: BTreeMap<String, String>,
    },
    Publish {
        target: String,
        /// 公開時点でハンドルに積まれていたメタデータ（付与順）
        metadata: Vec<String>,
    },
    /// ジョブがハンドルを手放した（ビルドした containerfile で識別）
    Release { containerfile: String },
}

#[derive(Debug, Clone)]
pub struct SpyImage {
    pub containerfile: String,
    pub metadata: Vec<String>,
}

/// 呼び出しを記録し、遅延や失敗を注入できるバックエンド
///
/// ジョブは containerfile で識別します。
#[derive(Default)]
pub struct SpyBackend {
    calls: Mutex<Vec<Call>>,
    build_delays: HashMap<String, Duration>,
    failing_builds: HashSet<String>,
    failing_publishes: HashSet<String>,
}

#[allow(dead_code)]
impl SpyBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_build_delay(mut self, containerfile: &str, delay: Duration) -> Self {
        self.build_delays.insert(containerfile.to_string(), delay);
        self
    }

    pub fn failing_build(mut self, containerfile: &str) -> Self {
        self.failing_builds.insert(containerfile.to_string());
        self
    }

    pub fn failing_publish(mut self, target: &str) -> Self {
        self.failing_publishes.insert(target.to_string());
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn builds(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Build { containerfile, .. } => Some(containerfile),
                _ => None,
            })
            .collect()
    }

    pub fn publishes(&self) -> Vec<(String, Vec<String>)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Publish { target, metadata } => Some((target, metadata)),
                _ => None,
            })
            .collect()
    }

    pub fn releases(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Release { containerfile } => Some(containerfile),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl ImageBackend for SpyBackend {
    type Image = SpyImage;

    async fn build(
        &self,
        _context: &BuildContext,
        containerfile: &str,
        build_args: &BTreeMap<String, String>,
    ) -> BuildResult<SpyImage> {
        self.record(Call::Build {
            containerfile: containerfile.to_string(),
            build_args: build_args.clone(),
        });

        if let Some(delay) = self.build_delays.get(containerfile) {
            tokio::time::sleep(*delay).await;
        }

        if self.failing_builds.contains(containerfile) {
            return Err(BuildError::BuildFailed(format!("{} failed", containerfile)));
        }

        Ok(SpyImage {
            containerfile: containerfile.to_string(),
            metadata: Vec::new(),
        })
    }

    fn with_annotation(&self, mut image: SpyImage, key: &str, value: &str) -> SpyImage {
        image.metadata.push(format!("annotation:{}={}", key, value));
        image
    }

    fn with_label(&self, mut image: SpyImage, key: &str, value: &str) -> SpyImage {
        image.metadata.push(format!("label:{}={}", key, value));
        image
    }

    async fn publish(&self, image: &SpyImage, target: &str) -> BuildResult<String> {
        self.record(Call::Publish {
            target: target.to_string(),
            metadata: image.metadata.clone(),
        });

        if self.failing_publishes.contains(target) {
            return Err(BuildError::PushFailed {
                message: format!("{} rejected", target),
            });
        }

        Ok(target.to_string())
    }

    async fn release(&self, image: SpyImage) {
        self.record(Call::Release {
            containerfile: image.containerfile,
        });
    }
}

/// テスト用のビルドコンテキスト
pub struct TestContext {
    pub root: TempDir,
}

impl TestContext {
    pub fn new() -> Self {
        Self {
            root: tempfile::tempdir().unwrap(),
        }
    }

    pub fn context(&self) -> BuildContext {
        BuildContext::new(self.root.path()).unwrap()
    }
}

/// 正規形の設定を組み立てる
pub fn conf(jobs: serde_json::Value) -> String {
    serde_json::json!({ "jobs": jobs }).to_string()
}
