//! レジストリ認証処理
//!
//! Docker config.json から公開先レジストリの認証情報を取得し、
//! Bollard の DockerCredentials に変換します。
//!
//! 検索順: `auths` → `credHelpers`（レジストリ個別）→ `credsStore`

use crate::error::{BuildError, BuildResult};
use base64::Engine;
use bollard::auth::DockerCredentials;
use serde::Deserialize;
use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use tracing::debug;

/// Docker Hub のデフォルトレジストリ名
const DOCKER_HUB: &str = "docker.io";

/// config.json で Docker Hub を表すキー
const DOCKER_HUB_KEYS: &[&str] = &[
    "docker.io",
    "index.docker.io",
    "https://index.docker.io/v1/",
    "registry-1.docker.io",
];

/// Docker config.json の構造
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DockerConfig {
    #[serde(default)]
    auths: HashMap<String, AuthEntry>,
    /// レジストリ個別の credential helper
    #[serde(default)]
    cred_helpers: HashMap<String, String>,
    /// 既定の credential helper 名 (例: "osxkeychain", "desktop")
    #[serde(default)]
    creds_store: Option<String>,
}

impl DockerConfig {
    /// レジストリ名のキー表記揺れ（スキーム付き等）を吸収して検索
    fn auth_for(&self, registry: &str) -> Option<&AuthEntry> {
        registry_keys(registry)
            .into_iter()
            .find_map(|key| self.auths.get(&key))
    }

    fn helper_for(&self, registry: &str) -> Option<&str> {
        registry_keys(registry)
            .into_iter()
            .find_map(|key| self.cred_helpers.get(&key))
            .or(self.creds_store.as_ref())
            .map(String::as_str)
    }
}

/// 認証エントリ
#[derive(Debug, Deserialize)]
struct AuthEntry {
    /// Base64エンコードされた "username:password"
    auth: Option<String>,
    /// `docker login` がトークンで認証した場合
    #[serde(rename = "identitytoken")]
    identity_token: Option<String>,
}

/// credential helper からのレスポンス
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CredentialResponse {
    username: String,
    secret: String,
}

/// レジストリ認証を管理
#[derive(Debug, Clone)]
pub struct RegistryAuth {
    config_path: PathBuf,
}

impl Default for RegistryAuth {
    fn default() -> Self {
        Self::new()
    }
}

impl RegistryAuth {
    /// `$DOCKER_CONFIG/config.json`、未設定なら `~/.docker/config.json` を使用
    pub fn new() -> Self {
        let config_path = std::env::var_os("DOCKER_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                dirs::home_dir()
                    .map(|h| h.join(".docker"))
                    .unwrap_or_else(|| PathBuf::from(".docker"))
            })
            .join("config.json");

        Self { config_path }
    }

    /// 指定したパスの config.json を使用
    pub fn with_config_path(config_path: PathBuf) -> Self {
        Self { config_path }
    }

    /// 公開先参照からレジストリの認証情報を取得
    ///
    /// * `Ok(Some(credentials))` - 認証情報が見つかった場合
    /// * `Ok(None)` - config.json がない、または該当する認証情報がない場合
    /// * `Err(e)` - config.json や認証情報が壊れている場合
    pub fn get_credentials(&self, image: &str) -> BuildResult<Option<DockerCredentials>> {
        let registry = extract_registry(image);

        if !self.config_path.exists() {
            debug!(path = %self.config_path.display(), "Docker config.json not found");
            return Ok(None);
        }

        let config = self.load_docker_config()?;

        if let Some(entry) = config.auth_for(&registry)
            && let Some(creds) = decode_entry(entry, &registry)?
        {
            debug!(registry = %registry, "Found credentials in auths");
            return Ok(Some(creds));
        }

        if let Some(helper) = config.helper_for(&registry) {
            debug!(registry = %registry, helper, "Trying credential helper");
            match get_from_helper(helper, &registry) {
                Ok(Some(creds)) => return Ok(Some(creds)),
                Ok(None) => {}
                Err(e) => debug!(error = %e, "Credential helper failed"),
            }
        }

        debug!(registry = %registry, "No credentials found");
        Ok(None)
    }

    fn load_docker_config(&self) -> BuildResult<DockerConfig> {
        let failed = |message: String| BuildError::AuthFailed {
            registry: self.config_path.display().to_string(),
            message,
        };

        let content = std::fs::read_to_string(&self.config_path)
            .map_err(|e| failed(format!("Failed to read config.json: {}", e)))?;

        serde_json::from_str(&content)
            .map_err(|e| failed(format!("Failed to parse config.json: {}", e)))
    }
}

/// イメージ参照からレジストリを抽出
///
/// # Examples
/// - `ghcr.io/org/app:tag` -> `ghcr.io`
/// - `myuser/app:tag` -> `docker.io`
/// - `localhost:5000/app` -> `localhost:5000`
pub fn extract_registry(image: &str) -> String {
    match image.split_once('/') {
        // `.` か `:` を含むか localhost ならレジストリ
        Some((first, _)) if first.contains(['.', ':']) || first == "localhost" => {
            first.to_string()
        }
        _ => DOCKER_HUB.to_string(),
    }
}

/// config.json 上でレジストリを表しうるキー
fn registry_keys(registry: &str) -> Vec<String> {
    if DOCKER_HUB_KEYS.contains(&registry) {
        return DOCKER_HUB_KEYS.iter().map(|k| k.to_string()).collect();
    }
    vec![
        registry.to_string(),
        format!("https://{}", registry),
        format!("http://{}", registry),
    ]
}

/// 認証エントリを DockerCredentials に変換
fn decode_entry(entry: &AuthEntry, registry: &str) -> BuildResult<Option<DockerCredentials>> {
    if let Some(token) = &entry.identity_token {
        return Ok(Some(DockerCredentials {
            identitytoken: Some(token.clone()),
            serveraddress: Some(registry.to_string()),
            ..Default::default()
        }));
    }

    let Some(auth_b64) = &entry.auth else {
        return Ok(None);
    };

    let failed = |message: String| BuildError::AuthFailed {
        registry: registry.to_string(),
        message,
    };

    let decoded = base64::engine::general_purpose::STANDARD
        .decode(auth_b64)
        .map_err(|e| failed(format!("Failed to decode auth: {}", e)))?;
    let auth_str =
        String::from_utf8(decoded).map_err(|e| failed(format!("Invalid UTF-8 in auth: {}", e)))?;

    Ok(auth_str
        .split_once(':')
        .map(|(username, password)| DockerCredentials {
            username: Some(username.to_string()),
            password: Some(password.to_string()),
            serveraddress: Some(registry.to_string()),
            ..Default::default()
        }))
}

/// `docker-credential-<helper> get` から認証情報を取得
fn get_from_helper(helper: &str, registry: &str) -> BuildResult<Option<DockerCredentials>> {
    let helper_cmd = format!("docker-credential-{}", helper);
    let failed = |message: String| BuildError::AuthFailed {
        registry: registry.to_string(),
        message,
    };

    let mut child = Command::new(&helper_cmd)
        .arg("get")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| failed(format!("Failed to run {}: {}", helper_cmd, e)))?;

    // レジストリ名を stdin に渡す
    if let Some(mut stdin) = child.stdin.take() {
        stdin.write_all(registry.as_bytes()).ok();
    }

    let output = child
        .wait_with_output()
        .map_err(|e| failed(format!("Credential helper failed: {}", e)))?;

    if !output.status.success() {
        debug!(
            registry,
            stderr = %String::from_utf8_lossy(&output.stderr).trim(),
            "Credential helper has no credentials"
        );
        return Ok(None);
    }

    let response: CredentialResponse = serde_json::from_slice(&output.stdout)
        .map_err(|e| failed(format!("Failed to parse credential helper response: {}", e)))?;

    Ok(Some(DockerCredentials {
        username: Some(response.username),
        password: Some(response.secret),
        serveraddress: Some(registry.to_string()),
        ..Default::default()
    }))
}
