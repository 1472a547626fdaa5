//! テンプレート展開機能
//!
//! Teraを使用して設定ファイルと各ジョブのフィールドを展開します。
//! 使える関数は [`FunctionRegistry`] で明示的に渡されたものだけです。

mod functions;

pub use functions::{FunctionRegistry, TemplateFunction};

use crate::error::{ConfigError, Result};
use std::collections::HashMap;
use tera::{Context, Tera};
use tracing::{debug, info};

/// 変数コンテキスト
pub type Variables = HashMap<String, serde_json::Value>;

/// テンプレートとして展開を許可する環境変数のプレフィックス
const ALLOWED_ENV_PREFIXES: &[&str] = &["IMGFLOW_", "CI_", "GITHUB_"];

/// テンプレートプロセッサ
pub struct TemplateProcessor {
    tera: Tera,
    context: Context,
}

impl TemplateProcessor {
    /// レジストリの関数を登録したプロセッサを作成
    pub fn new(registry: &FunctionRegistry) -> Self {
        let mut tera = Tera::default();
        registry.install(&mut tera);
        Self {
            tera,
            context: Context::new(),
        }
    }

    /// 変数を追加
    pub fn add_variable(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.context.insert(key.into(), &value);
    }

    /// 複数の変数を追加
    pub fn add_variables(&mut self, variables: Variables) {
        for (key, value) in variables {
            self.context.insert(key, &value);
        }
    }

    /// 環境変数を `env` 変数として追加（安全なもののみ）
    ///
    /// 以下のプレフィックスを持つ環境変数のみを許可:
    /// - IMGFLOW_*: imgflow専用の環境変数
    /// - CI_*, GITHUB_*: CI/CD環境の変数
    #[tracing::instrument(skip(self))]
    pub fn add_env_variables(&mut self) {
        let env: serde_json::Map<String, serde_json::Value> = std::env::vars()
            .filter(|(key, _)| {
                ALLOWED_ENV_PREFIXES
                    .iter()
                    .any(|prefix| key.starts_with(prefix))
            })
            .map(|(key, value)| {
                debug!(key = %key, "Adding environment variable");
                (key, serde_json::Value::String(value))
            })
            .collect();

        info!(env_var_count = env.len(), "Added filtered environment variables");
        self.context.insert("env", &env);
    }

    /// ドキュメント全体の展開に使うコンテキスト
    pub fn context(&self) -> &Context {
        &self.context
    }

    /// 文字列をテンプレートとして展開
    pub fn render_str(&mut self, template: &str) -> Result<String> {
        let context = self.context.clone();
        self.render_with("<inline>", template, &context)
    }

    /// 名前付きで展開（エラーメッセージに名前が出る）
    pub fn render_named(&mut self, name: &str, template: &str) -> Result<String> {
        let context = self.context.clone();
        self.render_with(name, template, &context)
    }

    /// 任意のコンテキストで展開
    pub fn render_with(&mut self, name: &str, template: &str, context: &Context) -> Result<String> {
        self.tera
            .render_str(template, context)
            .map_err(|e| ConfigError::TemplateError {
                template: name.to_string(),
                message: extract_tera_error_detail(&e),
            })
    }
}

/// Teraのエラーチェーンから詳細メッセージを組み立てる
fn extract_tera_error_detail(e: &tera::Error) -> String {
    use std::error::Error;

    // エラーチェーンを走査して詳細を収集
    let mut details = vec![e.to_string()];
    let mut source = e.source();
    while let Some(err) = source {
        details.push(err.to_string());
        source = err.source();
    }

    let full_error = details.join(" | ");

    // "Variable `xxx` not found in context"
    if full_error.contains("not found in context")
        && let Some(start) = full_error.find("Variable `")
        && let Some(end) = full_error[start..].find("` not found")
    {
        let var_name = &full_error[start + 10..start + end];
        return format!(
            "未定義の変数: `{}`\n詳細: {}",
            var_name, full_error
        );
    }

    if full_error.contains("Function") && full_error.contains("not found") {
        return format!("未定義の関数\n詳細: {full_error}");
    }

    full_error
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn processor() -> TemplateProcessor {
        let date = NaiveDate::from_ymd_opt(2025, 12, 31).unwrap();
        TemplateProcessor::new(&FunctionRegistry::with_date(date))
    }

    #[test]
    fn test_simple_variable_expansion() {
        let mut processor = processor();
        processor.add_variable("registry", serde_json::json!("ghcr.io/org"));

        let result = processor.render_str("{{ registry }}/app").unwrap();
        assert_eq!(result, "ghcr.io/org/app");
    }

    #[test]
    fn test_registry_functions_are_available() {
        let mut processor = processor();
        let result = processor.render_str("v-{{ nowTag() }}").unwrap();
        assert_eq!(result, "v-20251231");
    }

    #[test]
    fn test_if_condition() {
        let mut processor = processor();
        let mut variables = Variables::new();
        variables.insert("debug".to_string(), serde_json::json!(true));
        processor.add_variables(variables);

        let result = processor
            .render_str("{% if debug %}debug{% else %}release{% endif %}")
            .unwrap();
        assert_eq!(result, "debug");
    }

    #[test]
    fn test_undefined_variable_error() {
        let mut processor = processor();
        let err = processor.render_named("imgflow.yaml", "{{ missing }}").unwrap_err();

        match err {
            ConfigError::TemplateError { template, message } => {
                assert_eq!(template, "imgflow.yaml");
                assert!(message.contains("missing"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_unknown_function_error() {
        let mut processor = processor();
        assert!(processor.render_str("{{ osRelease(image=\"x\") }}").is_err());
    }

    #[test]
    fn test_render_with_uses_given_context_only() {
        let mut processor = processor();
        processor.add_variable("outer", serde_json::json!("no"));

        let mut context = Context::new();
        context.insert("inner", "yes");
        assert_eq!(
            processor.render_with("job", "{{ inner }}", &context).unwrap(),
            "yes"
        );
        assert!(processor.render_with("job", "{{ outer }}", &context).is_err());
    }

    #[test]
    fn test_env_variables_filtering() {
        temp_env::with_vars(
            [
                ("IMGFLOW_TEST_TAG", Some("nightly")),
                ("SECRET_TOKEN", Some("do-not-leak")),
            ],
            || {
                let mut processor = processor();
                processor.add_env_variables();

                assert_eq!(
                    processor.render_str("{{ env.IMGFLOW_TEST_TAG }}").unwrap(),
                    "nightly"
                );
                assert!(processor.render_str("{{ env.SECRET_TOKEN }}").is_err());
            },
        );
    }
}
