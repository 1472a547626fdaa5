//! ジョブの並行実行
//!
//! 1ジョブにつき1タスクを起動し、すべてのタスクを待ってから結果を返します。
//! 最初に失敗したジョブが共有のキャンセルトークンを発火させ、他のジョブは
//! 次の外部呼び出しの前にそれを観測して中断します。実行中の呼び出しは
//! 中断しません。
//!
//! 結果は完了順に関係なく、ジョブ番号順・タグの設定順に並びます。
//! 2つのジョブがほぼ同時に失敗した場合、どちらのエラーが返るかは不定です。

use crate::backend::{BuildContext, ImageBackend};
use crate::error::{BuildError, BuildResult};
use crate::pusher::validate_tag;
use imgflow_core::{Job, read_conf_string};
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// ビルド・公開のオーケストレーター
pub struct Orchestrator<B: ImageBackend> {
    backend: Arc<B>,
    context: BuildContext,
}

impl<B: ImageBackend> Orchestrator<B> {
    pub fn new(backend: B, context: BuildContext) -> Self {
        Self::with_shared_backend(Arc::new(backend), context)
    }

    pub fn with_shared_backend(backend: Arc<B>, context: BuildContext) -> Self {
        Self { backend, context }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// 正規形の設定を実行し、公開された参照を返す
    ///
    /// `dry_run` ならビルドとメタデータ付与のみ行い、空のリストを返します。
    pub async fn run(&self, conf: &str, dry_run: bool) -> BuildResult<Vec<String>> {
        self.run_with_cancel(conf, dry_run, CancellationToken::new())
            .await
    }

    /// 呼び出し側のキャンセルトークンの下で実行
    ///
    /// `cancel` が発火すると、各ジョブは次の外部呼び出しの前に中断します。
    /// ジョブのエラーなしにキャンセルされた場合は `BuildError::Cancelled` を返します。
    #[instrument(skip_all, fields(dry_run = dry_run))]
    pub async fn run_with_cancel(
        &self,
        conf: &str,
        dry_run: bool,
        cancel: CancellationToken,
    ) -> BuildResult<Vec<String>> {
        let jobs = read_jobs(conf)?;
        let job_count = jobs.len();
        info!(jobs = job_count, "Starting build");

        let scope = cancel.child_token();
        let mut tasks = JoinSet::new();
        for (index, job) in jobs.into_iter().enumerate() {
            let backend = Arc::clone(&self.backend);
            let context = self.context.clone();
            let scope = scope.clone();
            tasks.spawn(async move {
                let result = run_job(&*backend, &context, index, &job, dry_run, &scope).await;
                (index, job.output_name, result)
            });
        }

        // ジョブ番号ごとの結果（各タスクは自分の番号にだけ書き込む）
        let mut outputs: Vec<Option<Vec<String>>> = vec![None; job_count];
        let mut first_error: Option<BuildError> = None;

        while let Some(joined) = tasks.join_next().await {
            let error = match joined {
                Ok((index, _, Ok(refs))) => {
                    debug!(job = index, refs = refs.len(), "Job finished");
                    outputs[index] = Some(refs);
                    continue;
                }
                Ok((_, _, Err(BuildError::Cancelled))) if scope.is_cancelled() => continue,
                Ok((index, output_name, Err(source))) => BuildError::JobFailed {
                    index,
                    output_name,
                    source: Box::new(source),
                },
                Err(e) => BuildError::TaskPanicked(e.to_string()),
            };

            if first_error.is_none() {
                warn!(error = %error, "Job failed, cancelling remaining jobs");
                scope.cancel();
                first_error = Some(error);
            } else {
                debug!(error = %error, "Additional job failure ignored");
            }
        }

        if let Some(error) = first_error {
            return Err(error);
        }
        if scope.is_cancelled() {
            return Err(BuildError::Cancelled);
        }

        let refs: Vec<String> = outputs.into_iter().flatten().flatten().collect();
        info!(refs = refs.len(), "Build finished");
        Ok(refs)
    }
}

/// 正規形から実行するジョブを取り出す
///
/// ジョブがない設定と、不正なタグを持つジョブはビルドの前に拒否します。
pub fn read_jobs(conf: &str) -> BuildResult<Vec<Job>> {
    let config = read_conf_string(conf).map_err(|e| BuildError::InvalidConfig(e.to_string()))?;
    if config.jobs.is_empty() {
        return Err(BuildError::EmptyConfig);
    }

    for (index, job) in config.jobs.iter().enumerate() {
        for tag in &job.output_tags {
            validate_tag(tag).map_err(|source| BuildError::JobFailed {
                index,
                output_name: job.output_name.clone(),
                source: Box::new(source),
            })?;
        }
    }
    Ok(config.jobs)
}

/// 1つのジョブ: ビルド → アノテーション → ラベル → タグごとの公開 → 解放
#[instrument(skip_all, fields(job = index, output_name = %job.output_name))]
async fn run_job<B: ImageBackend>(
    backend: &B,
    context: &BuildContext,
    index: usize,
    job: &Job,
    dry_run: bool,
    cancel: &CancellationToken,
) -> BuildResult<Vec<String>> {
    ensure_active(cancel)?;
    let containerfile = job.containerfile_or_default();
    debug!(containerfile, "Building");
    let mut image = backend
        .build(context, containerfile, &job.build_args)
        .await?;

    for (key, value) in &job.annotations {
        image = backend.with_annotation(image, key, value);
    }
    for (key, value) in &job.labels {
        image = backend.with_label(image, key, value);
    }

    let result = if dry_run {
        info!("Dry run, skipping publish");
        Ok(Vec::new())
    } else {
        publish_tags(backend, &image, job, cancel).await
    };

    backend.release(image).await;
    result
}

async fn publish_tags<B: ImageBackend>(
    backend: &B,
    image: &B::Image,
    job: &Job,
    cancel: &CancellationToken,
) -> BuildResult<Vec<String>> {
    let mut refs = Vec::with_capacity(job.output_tags.len());
    for tag in &job.output_tags {
        ensure_active(cancel)?;
        let target = job.target_ref(tag);
        debug!(tag = %tag, target = %target, "Publishing");
        refs.push(backend.publish(image, &target).await?);
    }
    Ok(refs)
}

fn ensure_active(cancel: &CancellationToken) -> BuildResult<()> {
    if cancel.is_cancelled() {
        return Err(BuildError::Cancelled);
    }
    Ok(())
}
