//! イメージの公開
//!
//! 公開先の参照（`repository:tag`）を解釈し、ローカルのイメージに
//! タグを付けてレジストリへプッシュします。複数ジョブが並行して
//! プッシュするため、進捗は端末に描かず tracing のイベントとして出します。

use crate::auth::RegistryAuth;
use crate::error::{BuildError, BuildResult};
use bollard::Docker;
use bollard::models::PushImageInfo;
use futures_util::StreamExt;
use std::fmt;
use tracing::{debug, info};

/// Docker タグの最大長
const MAX_TAG_LEN: usize = 128;

/// タグを省略したときのタグ
const DEFAULT_TAG: &str = "latest";

/// 公開先（リポジトリとタグ）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushTarget {
    pub repository: String,
    pub tag: String,
}

impl PushTarget {
    /// `repository[:tag]` を解釈してタグを検証
    ///
    /// 最後の `/` より後ろの `:` だけをタグの区切りとみなします
    /// （手前の `:` はレジストリのポート）。
    ///
    /// - `ghcr.io/org/app:v1.0` -> `ghcr.io/org/app` + `v1.0`
    /// - `localhost:5000/app` -> `localhost:5000/app` + `latest`
    /// - `foo/bar:20240601` -> `foo/bar` + `20240601`
    pub fn parse(reference: &str) -> BuildResult<Self> {
        let name_start = reference.rfind('/').map_or(0, |pos| pos + 1);
        let (repository, tag) = match reference[name_start..].rfind(':') {
            Some(pos) => {
                let pos = name_start + pos;
                (&reference[..pos], &reference[pos + 1..])
            }
            None => (reference, DEFAULT_TAG),
        };

        validate_tag(tag)?;
        Ok(Self {
            repository: repository.to_string(),
            tag: tag.to_string(),
        })
    }
}

impl fmt::Display for PushTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.repository, self.tag)
    }
}

/// レジストリへのプッシュ
pub struct ImagePusher {
    docker: Docker,
    auth: RegistryAuth,
}

impl ImagePusher {
    pub fn new(docker: Docker, auth: RegistryAuth) -> Self {
        Self { docker, auth }
    }

    /// ローカルのイメージにタグを付けてプッシュし、公開した参照を返す
    pub async fn publish(&self, source: &str, target: &PushTarget) -> BuildResult<String> {
        debug!(source, target = %target, "Tagging image");
        #[allow(deprecated)]
        let options = bollard::image::TagImageOptions::<String> {
            repo: target.repository.clone(),
            tag: target.tag.clone(),
        };
        self.docker.tag_image(source, Some(options)).await?;

        self.push(target).await
    }

    async fn push(&self, target: &PushTarget) -> BuildResult<String> {
        let reference = target.to_string();
        let credentials = self.auth.get_credentials(&reference)?;

        info!(image = %reference, "Pushing");

        #[allow(deprecated)]
        let options = bollard::image::PushImageOptions::<String> {
            tag: target.tag.clone(),
        };
        #[allow(deprecated)]
        let mut stream = self
            .docker
            .push_image(&target.repository, Some(options), credentials);

        let mut progress = PushProgress::new(&reference);
        while let Some(result) = stream.next().await {
            let info = result.map_err(|e| BuildError::PushFailed {
                message: format!("{}: {}", reference, e),
            })?;
            progress.observe(info);
        }
        progress.finish()?;

        info!(image = %reference, "Pushed");
        Ok(reference)
    }
}

/// プッシュのストリームを集約する
///
/// レジストリはエラーをストリームの途中に流すので、最後まで読んでから判定します。
struct PushProgress<'a> {
    reference: &'a str,
    last_status: String,
    error: Option<String>,
}

impl<'a> PushProgress<'a> {
    fn new(reference: &'a str) -> Self {
        Self {
            reference,
            last_status: String::new(),
            error: None,
        }
    }

    fn observe(&mut self, info: PushImageInfo) {
        if let Some(error) = info.error {
            self.error = Some(error);
            return;
        }

        let Some(status) = info.status else {
            return;
        };
        // 同じステータスの連続と、レイヤーごとの細かい進捗は出さない
        if matches!(status.as_str(), "Preparing" | "Waiting" | "Pushing") || status == self.last_status
        {
            return;
        }
        debug!(
            image = self.reference,
            progress = info.progress.as_deref().unwrap_or(""),
            status = %status,
            "Push progress"
        );
        self.last_status = status;
    }

    fn finish(self) -> BuildResult<()> {
        match self.error {
            Some(message) => Err(BuildError::PushFailed {
                message: format!("{}: {}", self.reference, message),
            }),
            None => Ok(()),
        }
    }
}

/// タグのバリデーション
///
/// 128文字以下の英数字・`.`・`-`・`_` で、先頭は `.` でも `-` でもないこと。
pub fn validate_tag(tag: &str) -> BuildResult<()> {
    let invalid = |reason: String| Err(BuildError::InvalidTag { tag: reason });

    if tag.is_empty() {
        return invalid("(empty)".to_string());
    }
    if tag.len() > MAX_TAG_LEN {
        return invalid(format!(
            "Tag too long ({} characters, max {})",
            tag.len(),
            MAX_TAG_LEN
        ));
    }
    if tag.starts_with(['.', '-']) {
        return invalid(tag.to_string());
    }
    if let Some(c) = tag
        .chars()
        .find(|c| !c.is_ascii_alphanumeric() && !matches!(c, '.' | '-' | '_'))
    {
        return invalid(format!("Invalid character '{}' in tag: {}", c, tag));
    }

    Ok(())
}
