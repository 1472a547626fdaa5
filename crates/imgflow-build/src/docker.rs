//! Docker Engine（bollard）によるビルド・公開
//!
//! ビルドは `build` の時点で実行し、一意なローカルタグを付けます。
//! アノテーションとラベルは公開時に `FROM <image>` の1行ビルドで
//! イメージラベルとして付与します（同じキーはラベルが優先）。
//! Docker Engine にはアノテーション専用の経路がないためです。

use crate::auth::RegistryAuth;
use crate::backend::{BuildContext, ImageBackend};
use crate::context::ContextBuilder;
use crate::error::{BuildError, BuildResult};
use crate::pusher::{ImagePusher, PushTarget};
use async_trait::async_trait;
use bollard::Docker;
use futures_util::stream::StreamExt;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// ビルド済みイメージのハンドル
#[derive(Debug, Clone)]
pub struct DockerImage {
    local_tag: String,
    /// アノテーション → ラベルの順に積まれたイメージラベル
    metadata: BTreeMap<String, String>,
    /// メタデータ付与後のイメージ（タグごとに作り直さない）
    finalized: Arc<OnceCell<String>>,
}

impl DockerImage {
    fn new(local_tag: String) -> Self {
        Self {
            local_tag,
            metadata: BTreeMap::new(),
            finalized: Arc::new(OnceCell::new()),
        }
    }

    pub fn local_tag(&self) -> &str {
        &self.local_tag
    }

    pub fn metadata(&self) -> &BTreeMap<String, String> {
        &self.metadata
    }

    fn with_metadata(mut self, key: &str, value: &str) -> Self {
        self.metadata.insert(key.to_string(), value.to_string());
        self.finalized = Arc::new(OnceCell::new());
        self
    }
}

/// Docker Engine バックエンド
pub struct DockerBackend {
    docker: Docker,
    pusher: ImagePusher,
}

impl DockerBackend {
    pub fn new(docker: Docker, auth: RegistryAuth) -> Self {
        let pusher = ImagePusher::new(docker.clone(), auth);
        Self { docker, pusher }
    }

    /// ローカルの Docker Engine に接続
    pub async fn connect() -> BuildResult<Self> {
        let docker = Docker::connect_with_local_defaults()?;
        docker.ping().await?;
        Ok(Self::new(docker, RegistryAuth::new()))
    }

    /// イメージをビルド
    async fn build_image(
        &self,
        context_data: Vec<u8>,
        dockerfile: &str,
        tag: &str,
        build_args: HashMap<String, String>,
        labels: HashMap<String, String>,
        pull: bool,
    ) -> BuildResult<()> {
        info!(tag, dockerfile, "Building image");
        if !build_args.is_empty() {
            debug!(?build_args, "Build args");
        }

        #[allow(deprecated)]
        let options = bollard::image::BuildImageOptions::<String> {
            dockerfile: dockerfile.to_string(),
            t: tag.to_string(),
            buildargs: build_args,
            labels,
            rm: true,      // 中間コンテナを削除
            forcerm: true, // ビルド失敗時も中間コンテナを削除
            pull,
            ..Default::default()
        };

        use bytes::Bytes;
        use http_body_util::{Either, Full};
        let body = Full::new(Bytes::from(context_data));
        let mut stream = self.docker.build_image(options, None, Some(Either::Left(body)));

        while let Some(msg) = stream.next().await {
            handle_build_output(tag, msg?)?;
        }

        info!(tag, "Successfully built");
        Ok(())
    }

    /// ローカルタグを外す（公開済みのタグが残っていればイメージ自体は残る）
    async fn remove_local(&self, tag: &str) {
        match self
            .docker
            .remove_image(tag, None::<bollard::query_parameters::RemoveImageOptions>, None)
            .await
        {
            Ok(_) => debug!(tag, "Removed local image"),
            Err(e) => warn!(tag, error = %e, "Failed to remove local image"),
        }
    }

    /// メタデータを付与したイメージを作る（なければビルド結果そのもの）
    async fn finalize(&self, image: &DockerImage) -> BuildResult<String> {
        if image.metadata.is_empty() {
            return Ok(image.local_tag.clone());
        }

        let tag = local_tag();
        let containerfile = format!("FROM {}\n", image.local_tag);
        let context = ContextBuilder::single_file("Dockerfile", containerfile.as_bytes())?;
        let labels = image
            .metadata
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        // ベースはローカルにしかないので pull しない
        self.build_image(context, "Dockerfile", &tag, HashMap::new(), labels, false)
            .await?;
        Ok(tag)
    }
}

#[async_trait]
impl ImageBackend for DockerBackend {
    type Image = DockerImage;

    async fn build(
        &self,
        context: &BuildContext,
        containerfile: &str,
        build_args: &BTreeMap<String, String>,
    ) -> BuildResult<DockerImage> {
        let dockerfile = ContextBuilder::resolve_containerfile(context.path(), containerfile)?;

        let dir = context.path().to_path_buf();
        let archive = tokio::task::spawn_blocking(move || ContextBuilder::create_context(&dir))
            .await
            .map_err(|e| BuildError::TaskPanicked(e.to_string()))??;

        let tag = local_tag();
        let build_args = build_args
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        self.build_image(archive, &dockerfile, &tag, build_args, HashMap::new(), true)
            .await?;

        Ok(DockerImage::new(tag))
    }

    fn with_annotation(&self, image: DockerImage, key: &str, value: &str) -> DockerImage {
        image.with_metadata(key, value)
    }

    fn with_label(&self, image: DockerImage, key: &str, value: &str) -> DockerImage {
        image.with_metadata(key, value)
    }

    async fn publish(&self, image: &DockerImage, target: &str) -> BuildResult<String> {
        let target = PushTarget::parse(target)?;

        let source = image
            .finalized
            .get_or_try_init(|| self.finalize(image))
            .await?;

        self.pusher.publish(source, &target).await
    }

    async fn release(&self, image: DockerImage) {
        // 付与後のイメージを先に消す（ビルド結果はその親）
        if let Some(finalized) = image.finalized.get()
            && finalized != &image.local_tag
        {
            self.remove_local(finalized).await;
        }
        self.remove_local(&image.local_tag).await;
    }
}

/// 一意なローカルタグ
fn local_tag() -> String {
    format!("imgflow-{}:build", Uuid::new_v4().simple())
}

/// ビルド出力の処理
fn handle_build_output(tag: &str, output: bollard::models::BuildInfo) -> BuildResult<()> {
    if let Some(error_detail) = output.error_detail {
        let error_msg = error_detail
            .message
            .or(output.error)
            .unwrap_or_else(|| "Unknown build error".to_string());
        return Err(BuildError::BuildFailed(error_msg));
    }

    if let Some(error) = output.error {
        return Err(BuildError::BuildFailed(error));
    }

    if let Some(stream) = output.stream {
        let line = stream.trim_end();
        if !line.is_empty() {
            debug!(target: "imgflow_build::output", image = tag, "{}", line);
        }
    }

    if let Some(status) = output.status {
        debug!(image = tag, status = %status, "Build status");
    }

    Ok(())
}
