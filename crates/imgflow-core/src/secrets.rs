//! シークレットのテンプレート変数化
//!
//! シークレットのリストを `secrets` 変数（名前 → 平文）に変換します。
//! URI は `scheme://name` 形式で、name は `:` と `$` を含んではいけません。
//!
//! 1つでも URI や平文の読み出しに失敗した場合、マップ全体を
//! 空（`None`）として扱います。部分的なマップは返しません。

use crate::error::{ConfigError, Result};
use crate::onepassword;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info, warn};

/// 名前 → 平文
pub type SecretMap = BTreeMap<String, String>;

/// 外部から渡されるシークレット
pub trait SecretHandle {
    fn uri(&self) -> Result<String>;
    fn plaintext(&self) -> Result<String>;
}

/// URI からシークレット名を取り出す
///
/// 最後の `://` 以降が名前になります。名前が空、または `:` か `$` を
/// 含む場合は `None` を返します。
pub fn secret_name(uri: &str) -> Option<&str> {
    let (_, name) = uri.rsplit_once("://")?;
    if name.is_empty() || name.contains([':', '$']) {
        return None;
    }
    Some(name)
}

/// シークレットのリストをマップに変換
///
/// 入力が空なら `None`。名前が不正なシークレットは無視され、
/// 読み出しに失敗したシークレットが1つでもあれば `None` になります。
pub fn secrets_to_map<S: SecretHandle>(secrets: &[S]) -> Option<SecretMap> {
    if secrets.is_empty() {
        return None;
    }

    let mut map = SecretMap::new();
    for secret in secrets {
        let uri = match secret.uri() {
            Ok(uri) => uri,
            Err(e) => {
                warn!(error = %e, "Failed to read secret URI, dropping all secrets");
                return None;
            }
        };

        let Some(name) = secret_name(&uri) else {
            warn!(uri = %uri, "Ignoring secret with invalid name");
            continue;
        };

        match secret.plaintext() {
            Ok(value) => {
                debug!(name = %name, "Resolved secret");
                map.insert(name.to_string(), value);
            }
            Err(e) => {
                warn!(name = %name, error = %e, "Failed to read secret, dropping all secrets");
                return None;
            }
        }
    }

    info!(count = map.len(), "Resolved secrets");
    Some(map)
}

/// URI で指定されるシークレット
///
/// - `env://NAME`: 環境変数 `NAME`
/// - `file://PATH`: ファイルの内容（末尾の改行は除去）
/// - `op://Vault/Item/Field`: 1Password CLI
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretRef {
    uri: String,
}

impl SecretRef {
    pub fn new(uri: impl Into<String>) -> Self {
        Self { uri: uri.into() }
    }
}

impl SecretHandle for SecretRef {
    fn uri(&self) -> Result<String> {
        if !self.uri.contains("://") {
            return Err(ConfigError::Secret(format!(
                "シークレットURIの形式が不正です: {} (scheme://name)",
                self.uri
            )));
        }
        Ok(self.uri.clone())
    }

    fn plaintext(&self) -> Result<String> {
        let (scheme, rest) = self.uri.split_once("://").ok_or_else(|| {
            ConfigError::Secret(format!("シークレットURIの形式が不正です: {}", self.uri))
        })?;

        match scheme {
            "env" => std::env::var(rest).map_err(|e| {
                ConfigError::Secret(format!("環境変数 {} を読めません: {}", rest, e))
            }),
            "file" => std::fs::read_to_string(Path::new(rest))
                .map(|s| s.trim_end_matches(['\r', '\n']).to_string())
                .map_err(|e| {
                    ConfigError::Secret(format!("ファイル {} を読めません: {}", rest, e))
                }),
            "op" => onepassword::resolve_reference(&self.uri),
            other => Err(ConfigError::Secret(format!(
                "未対応のシークレットスキーム: {}",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    struct FakeSecret {
        uri: std::result::Result<&'static str, ()>,
        value: std::result::Result<&'static str, ()>,
    }

    impl FakeSecret {
        fn ok(uri: &'static str, value: &'static str) -> Self {
            Self {
                uri: Ok(uri),
                value: Ok(value),
            }
        }
    }

    impl SecretHandle for FakeSecret {
        fn uri(&self) -> Result<String> {
            self.uri
                .map(str::to_string)
                .map_err(|_| ConfigError::Secret("uri".to_string()))
        }

        fn plaintext(&self) -> Result<String> {
            self.value
                .map(str::to_string)
                .map_err(|_| ConfigError::Secret("plaintext".to_string()))
        }
    }

    #[test]
    fn test_secret_name() {
        assert_eq!(secret_name("env://TOKEN"), Some("TOKEN"));
        assert_eq!(secret_name("op://Vault/Item/Field"), Some("Vault/Item/Field"));
        assert_eq!(secret_name("a://b://c"), Some("c"));
        assert_eq!(secret_name("env://A:B"), None);
        assert_eq!(secret_name("env://$HOME"), None);
        assert_eq!(secret_name("env://"), None);
        assert_eq!(secret_name("TOKEN"), None);
    }

    #[test]
    fn test_secrets_to_map_empty_input() {
        assert_eq!(secrets_to_map::<FakeSecret>(&[]), None);
    }

    #[test]
    fn test_secrets_to_map_skips_invalid_names() {
        let secrets = vec![
            FakeSecret::ok("env://TOKEN", "t0k3n"),
            FakeSecret::ok("env://BAD:NAME", "ignored"),
        ];
        let map = secrets_to_map(&secrets).unwrap();
        assert_eq!(map.len(), 1);
        assert_eq!(map["TOKEN"], "t0k3n");
    }

    #[test]
    fn test_secrets_to_map_uri_failure_drops_everything() {
        let secrets = vec![
            FakeSecret::ok("env://TOKEN", "t0k3n"),
            FakeSecret {
                uri: Err(()),
                value: Ok("x"),
            },
        ];
        assert_eq!(secrets_to_map(&secrets), None);
    }

    #[test]
    fn test_secrets_to_map_plaintext_failure_drops_everything() {
        let secrets = vec![
            FakeSecret::ok("env://TOKEN", "t0k3n"),
            FakeSecret {
                uri: Ok("env://OTHER"),
                value: Err(()),
            },
        ];
        assert_eq!(secrets_to_map(&secrets), None);
    }

    #[test]
    fn test_secret_ref_env() {
        temp_env::with_var("IMGFLOW_TEST_SECRET", Some("s3cret"), || {
            let secret = SecretRef::new("env://IMGFLOW_TEST_SECRET");
            assert_eq!(secret.plaintext().unwrap(), "s3cret");
        });
    }

    #[test]
    fn test_secret_ref_file_trims_trailing_newline() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "from-file").unwrap();

        let secret = SecretRef::new(format!("file://{}", file.path().display()));
        assert_eq!(secret.plaintext().unwrap(), "from-file");
    }

    #[test]
    fn test_secret_ref_unknown_scheme() {
        let secret = SecretRef::new("vault://kv/token");
        assert!(secret.plaintext().is_err());
        assert!(SecretRef::new("no-scheme").uri().is_err());
    }
}
