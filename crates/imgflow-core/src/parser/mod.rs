//! 設定ファイルのパース
//!
//! 以下の順で処理します:
//! 1. 拡張子の判定（`.yaml` / `.yml` / `.json`）
//! 2. ドキュメント全体のテンプレート展開
//! 3. YAML / JSON のデコード（重複キーは後勝ち）
//! 4. ジョブごとのフィールド展開（そのジョブ自身がコンテキスト）
//! 5. `output-name` の小文字化
//! 6. 正規形（JSON）へのシリアライズ
//!
//! ジョブのフィールドを参照する式はドキュメント全体の展開で未定義エラーに
//! なるため、`{% raw %}` で囲んで2段目の展開まで残します。
//!
//! ```yaml
//! jobs:
//!   - build-args:
//!       tag: v1
//!       full: "{% raw %}{{ build_args.tag }}{% endraw %}-suffix"
//! ```
//!
//! ジョブのフィールドは2回展開されます。1段目で埋め込んだ値に `{{` や
//! `{%` が含まれていると（シークレットなど）、2段目でテンプレートとして
//! 解釈されてしまいます。2段目のコンテキストにも `secrets` などの
//! ドキュメント変数があるので、そうした値は参照ごと `{% raw %}` で囲み、
//! 2段目で展開します。2段目の結果は再展開されません。
//!
//! ```yaml
//! jobs:
//!   - labels:
//!       token: "{% raw %}{{ secrets.TOKEN }}{% endraw %}"
//! ```


use crate::error::{ConfigError, Result};
use crate::model::{Config, ConfString, Job};
use crate::secrets::SecretMap;
use crate::source::ConfigSource;
use crate::template::{FunctionRegistry, TemplateProcessor, Variables};
use std::collections::BTreeMap;
use std::path::Path;
use tera::Context;
use tracing::{debug, info, instrument};

/// 名前が指定されなかったときのテンプレート名
const DEFAULT_TEMPLATE_NAME: &str = "<config_file>";

/// 設定ファイルの形式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Yaml,
    Json,
}

impl Format {
    /// 拡張子から形式を判定（先頭の `.` と大文字小文字は無視）
    pub fn from_extension(extension: &str) -> Result<Self> {
        match extension.trim_start_matches('.').to_ascii_lowercase().as_str() {
            "yaml" | "yml" => Ok(Format::Yaml),
            "json" => Ok(Format::Json),
            _ => Err(ConfigError::UnsupportedFormat(extension.to_string())),
        }
    }

    /// ファイル名の拡張子から形式を判定
    pub fn from_file_name(name: &str) -> Result<Self> {
        let extension = Path::new(name)
            .extension()
            .and_then(|e| e.to_str())
            .ok_or_else(|| ConfigError::UnsupportedFormat(name.to_string()))?;
        Self::from_extension(extension)
    }
}

/// パースのオプション
#[derive(Debug, Clone)]
pub struct ParseOptions {
    /// エラーメッセージに使うテンプレート名
    pub name: String,
    pub registry: FunctionRegistry,
    /// ドキュメント全体の展開で使う変数
    pub variables: Variables,
    /// 許可された環境変数を `env` 変数として公開する
    pub env: bool,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            name: DEFAULT_TEMPLATE_NAME.to_string(),
            registry: FunctionRegistry::builtin(),
            variables: Variables::new(),
            env: false,
        }
    }
}

impl ParseOptions {
    pub fn new(registry: FunctionRegistry) -> Self {
        Self {
            registry,
            ..Default::default()
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_variable(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.variables.insert(key.into(), value);
        self
    }

    pub fn with_env(mut self, env: bool) -> Self {
        self.env = env;
        self
    }

    /// `secrets` 変数を設定（`None` なら変数自体を定義しない）
    pub fn with_secrets(self, secrets: Option<SecretMap>) -> Self {
        match secrets {
            Some(map) => {
                let value = serde_json::to_value(map).unwrap_or_default();
                self.with_variable("secrets", value)
            }
            None => self,
        }
    }
}

/// 設定テキストをパースして正規形（JSON）を返す
pub fn parse(raw: &str, extension: &str, options: &ParseOptions) -> Result<ConfString> {
    parse_config(raw, extension, options)?.to_conf_string()
}

/// 設定テキストをパースして [`Config`] を返す
#[instrument(skip(raw, options), fields(name = %options.name))]
pub fn parse_config(raw: &str, extension: &str, options: &ParseOptions) -> Result<Config> {
    // 1. 形式の判定（デコードより前に失敗させる）
    let format = Format::from_extension(extension)?;

    // 2. ドキュメント全体の展開
    debug!("Step 1: Expanding config template");
    let mut processor = TemplateProcessor::new(&options.registry);
    if options.env {
        processor.add_env_variables();
    }
    processor.add_variables(options.variables.clone());
    let rendered = processor.render_named(&options.name, raw)?;

    // 3. デコード
    debug!(?format, "Step 2: Decoding config");
    let config = decode(&rendered, format, &options.name)?;

    // 4, 5. ジョブごとのフィールド展開と正規化
    debug!(jobs = config.jobs.len(), "Step 3: Expanding job fields");
    let jobs = config
        .jobs
        .iter()
        .enumerate()
        .map(|(index, job)| render_job(&mut processor, index, job))
        .collect::<Result<Vec<_>>>()?;

    info!(jobs = jobs.len(), "Config parsed");
    Ok(Config { jobs })
}

/// 取得元から読み出してパース
pub fn parse_source(source: &impl ConfigSource, options: &ParseOptions) -> Result<ConfString> {
    source.sync()?;
    let contents = source.contents()?;
    let name = source.name()?;

    let extension = Path::new(&name)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
        .to_string();
    if extension.is_empty() {
        return Err(ConfigError::UnsupportedFormat(name));
    }

    let options = options.clone().with_name(name);
    parse(&contents, &extension, &options)
}

/// 展開済みテキストをデコード
///
/// 重複したマップキーはエラーにせず、最後の値を採用します。
/// YAML のスカラーは書かれた表記のまま文字列になります。
fn decode(rendered: &str, format: Format, name: &str) -> Result<Config> {
    let decode_error = |message: String| ConfigError::DecodeError {
        file: name.to_string(),
        message,
    };

    let config: Option<Config> = match format {
        Format::Yaml => serde_yaml::from_str(rendered).map_err(|e| decode_error(e.to_string()))?,
        Format::Json => serde_json::from_str(rendered).map_err(|e| decode_error(e.to_string()))?,
    };

    // 空のドキュメントはジョブなしの設定として扱う
    Ok(config.unwrap_or_default())
}

/// 1つのジョブのフィールドを展開して正規化
///
/// コンテキストは展開前のジョブ自身で、他のジョブは参照できません。
fn render_job(processor: &mut TemplateProcessor, index: usize, job: &Job) -> Result<Job> {
    let context = job_context(processor.context(), job);
    let mut rendered = job.clone();

    for (i, tag) in rendered.output_tags.iter_mut().enumerate() {
        let name = format!("jobs[{}].output-tags[{}]", index, i);
        *tag = processor.render_with(&name, tag.as_str(), &context)?;
    }

    let prefix = format!("jobs[{}]", index);
    render_values(processor, &context, &prefix, "build-args", &mut rendered.build_args)?;
    render_values(processor, &context, &prefix, "annotations", &mut rendered.annotations)?;
    render_values(processor, &context, &prefix, "labels", &mut rendered.labels)?;

    rendered.normalize();
    debug!(job = index, output_name = %rendered.output_name, "Job rendered");
    Ok(rendered)
}

/// マップの値（キーではない）を展開
fn render_values(
    processor: &mut TemplateProcessor,
    context: &Context,
    prefix: &str,
    field: &str,
    values: &mut BTreeMap<String, String>,
) -> Result<()> {
    for (key, value) in values.iter_mut() {
        let name = format!("{}.{}.{}", prefix, field, key);
        *value = processor.render_with(&name, value.as_str(), context)?;
    }
    Ok(())
}

/// ドキュメントの変数にジョブのフィールドを加えたコンテキスト
///
/// kebab-case はTeraの識別子にならないため snake_case で公開します。
fn job_context(document: &Context, job: &Job) -> Context {
    let mut context = document.clone();
    context.insert("containerfile", &job.containerfile);
    context.insert("build_args", &job.build_args);
    context.insert("annotations", &job.annotations);
    context.insert("labels", &job.labels);
    context.insert("output_name", &job.output_name);
    context.insert("output_tags", &job.output_tags);
    context
}
