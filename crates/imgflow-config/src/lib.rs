pub mod error;

pub use error::*;

use std::path::{Path, PathBuf};
use tracing::debug;

/// 設定ファイルのパスを直接指定する環境変数
pub const CONFIG_PATH_ENV: &str = "IMGFLOW_CONFIG_PATH";

/// 設定ディレクトリ名（プロジェクトルート直下）
pub const CONFIG_DIR_NAME: &str = ".imgflow";

/// 検索する設定ファイル名（優先順）
pub const CANDIDATES: &[&str] = &[
    "imgflow.local.yaml",
    "imgflow.yaml",
    "imgflow.yml",
    "imgflow.json",
    ".imgflow.yaml",
];

/// プロジェクトの設定ファイルを探す
///
/// 以下の優先順位で設定ファイルを検索:
/// 1. 引数で明示されたパス（`--config`）
/// 2. 環境変数 IMGFLOW_CONFIG_PATH
/// 3. カレントディレクトリ: [`CANDIDATES`] の順
/// 4. ./.imgflow/ ディレクトリ内: 同様の順序
///
/// 1, 2 で指定されたパスが存在しない場合は他の場所を探さずにエラーにします。
pub fn find_config_file(explicit: Option<&Path>) -> Result<PathBuf> {
    // 1, 2. 直接指定
    let direct = explicit
        .map(Path::to_path_buf)
        .or_else(|| std::env::var_os(CONFIG_PATH_ENV).map(PathBuf::from));
    if let Some(path) = direct {
        if path.is_file() {
            debug!(path = %path.display(), "Using explicitly specified config file");
            return Ok(path);
        }
        return Err(ConfigError::ExplicitPathNotFound(path));
    }

    let current_dir = std::env::current_dir()?;
    find_config_file_in(&current_dir)
}

/// 指定ディレクトリを起点に設定ファイルを探す
pub fn find_config_file_in(dir: &Path) -> Result<PathBuf> {
    // 3. ディレクトリ直下で検索
    if let Some(path) = first_existing(dir) {
        return Ok(path);
    }

    // 4. ./.imgflow/ ディレクトリで検索
    let config_dir = dir.join(CONFIG_DIR_NAME);
    if config_dir.is_dir()
        && let Some(path) = first_existing(&config_dir)
    {
        return Ok(path);
    }

    Err(ConfigError::ConfigFileNotFound)
}

fn first_existing(dir: &Path) -> Option<PathBuf> {
    CANDIDATES
        .iter()
        .map(|name| dir.join(name))
        .find(|path| path.is_file())
        .inspect(|path| debug!(path = %path.display(), "Found config file"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::fs;

    #[test]
    fn test_find_config_file_in_dir() {
        let temp_dir = tempfile::tempdir().unwrap();
        fs::write(temp_dir.path().join("imgflow.yaml"), "jobs: []").unwrap();

        let result = find_config_file_in(temp_dir.path()).unwrap();
        assert!(result.ends_with("imgflow.yaml"));
    }

    #[test]
    fn test_local_priority() {
        let temp_dir = tempfile::tempdir().unwrap();
        fs::write(temp_dir.path().join("imgflow.yaml"), "# shared").unwrap();
        fs::write(temp_dir.path().join("imgflow.local.yaml"), "# local").unwrap();

        // imgflow.local.yaml が優先される
        let result = find_config_file_in(temp_dir.path()).unwrap();
        assert!(result.ends_with("imgflow.local.yaml"));
    }

    #[test]
    fn test_json_after_yaml() {
        let temp_dir = tempfile::tempdir().unwrap();
        fs::write(temp_dir.path().join("imgflow.json"), "{}").unwrap();
        fs::write(temp_dir.path().join("imgflow.yml"), "jobs: []").unwrap();

        let result = find_config_file_in(temp_dir.path()).unwrap();
        assert!(result.ends_with("imgflow.yml"));
    }

    #[test]
    fn test_find_in_config_dir() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config_dir = temp_dir.path().join(".imgflow");
        fs::create_dir(&config_dir).unwrap();
        fs::write(config_dir.join("imgflow.json"), "{}").unwrap();

        let result = find_config_file_in(temp_dir.path()).unwrap();
        assert!(result.ends_with(".imgflow/imgflow.json"));
    }

    #[test]
    fn test_current_dir_wins_over_config_dir() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config_dir = temp_dir.path().join(".imgflow");
        fs::create_dir(&config_dir).unwrap();
        fs::write(config_dir.join("imgflow.yaml"), "# nested").unwrap();
        fs::write(temp_dir.path().join(".imgflow.yaml"), "# hidden").unwrap();

        let result = find_config_file_in(temp_dir.path()).unwrap();
        assert!(result.ends_with(".imgflow.yaml"));
        assert!(!result.parent().unwrap().ends_with(".imgflow"));
    }

    #[test]
    fn test_not_found() {
        let temp_dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            find_config_file_in(temp_dir.path()),
            Err(ConfigError::ConfigFileNotFound)
        ));
    }

    #[test]
    #[serial]
    fn test_explicit_path() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config_path = temp_dir.path().join("custom.json");
        fs::write(&config_path, "{}").unwrap();

        temp_env::with_var(CONFIG_PATH_ENV, None::<&str>, || {
            let result = find_config_file(Some(&config_path)).unwrap();
            assert_eq!(result, config_path);
        });
    }

    #[test]
    #[serial]
    fn test_explicit_path_missing() {
        let temp_dir = tempfile::tempdir().unwrap();
        let missing = temp_dir.path().join("missing.yaml");

        let result = find_config_file(Some(&missing));
        assert!(matches!(result, Err(ConfigError::ExplicitPathNotFound(p)) if p == missing));
    }

    #[test]
    #[serial]
    fn test_env_var() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config_path = temp_dir.path().join("from-env.yaml");
        fs::write(&config_path, "jobs: []").unwrap();

        temp_env::with_var(CONFIG_PATH_ENV, Some(&config_path), || {
            let result = find_config_file(None).unwrap();
            assert_eq!(result, config_path);
        });
    }

    #[test]
    #[serial]
    fn test_explicit_path_beats_env_var() {
        let temp_dir = tempfile::tempdir().unwrap();
        let explicit = temp_dir.path().join("explicit.yaml");
        let from_env = temp_dir.path().join("env.yaml");
        fs::write(&explicit, "jobs: []").unwrap();
        fs::write(&from_env, "jobs: []").unwrap();

        temp_env::with_var(CONFIG_PATH_ENV, Some(&from_env), || {
            let result = find_config_file(Some(&explicit)).unwrap();
            assert_eq!(result, explicit);
        });
    }

    #[test]
    #[serial]
    fn test_search_from_current_dir() {
        let temp_dir = tempfile::tempdir().unwrap();
        let original_dir = std::env::current_dir().unwrap();
        fs::write(temp_dir.path().join("imgflow.yaml"), "jobs: []").unwrap();

        std::env::set_current_dir(&temp_dir).unwrap();
        let result = temp_env::with_var(CONFIG_PATH_ENV, None::<&str>, || find_config_file(None));
        std::env::set_current_dir(original_dir).unwrap();

        assert!(result.unwrap().ends_with("imgflow.yaml"));
    }
}
