//! 設定ファイルの読み出し

use crate::error::{ConfigError, Result};
use std::path::{Path, PathBuf};
use tracing::debug;

/// 設定ファイルの取得元
///
/// どのメソッドの失敗も `SourceUnavailable` として扱われます。
pub trait ConfigSource {
    /// ファイルにアクセスできることを確認
    fn sync(&self) -> Result<()>;
    fn contents(&self) -> Result<String>;
    /// ファイル名（拡張子の判定に使う）
    fn name(&self) -> Result<String>;
}

/// ローカルファイルシステム上の設定ファイル
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn unavailable(&self, message: impl ToString) -> ConfigError {
        ConfigError::SourceUnavailable {
            name: self.path.display().to_string(),
            message: message.to_string(),
        }
    }
}

impl ConfigSource for FileSource {
    fn sync(&self) -> Result<()> {
        let metadata = std::fs::metadata(&self.path).map_err(|e| self.unavailable(e))?;
        if !metadata.is_file() {
            return Err(self.unavailable("not a regular file"));
        }
        debug!(path = %self.path.display(), size = metadata.len(), "Config file is accessible");
        Ok(())
    }

    fn contents(&self) -> Result<String> {
        std::fs::read_to_string(&self.path).map_err(|e| self.unavailable(e))
    }

    fn name(&self) -> Result<String> {
        self.path
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string)
            .ok_or_else(|| self.unavailable("file name could not be retrieved"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_file_source() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("imgflow.yaml");
        fs::write(&path, "jobs: []").unwrap();

        let source = FileSource::new(&path);
        assert!(source.sync().is_ok());
        assert_eq!(source.contents().unwrap(), "jobs: []");
        assert_eq!(source.name().unwrap(), "imgflow.yaml");
    }

    #[test]
    fn test_file_source_missing() {
        let dir = tempdir().unwrap();
        let source = FileSource::new(dir.path().join("missing.yaml"));
        assert!(matches!(
            source.sync(),
            Err(ConfigError::SourceUnavailable { .. })
        ));
        assert!(matches!(
            source.contents(),
            Err(ConfigError::SourceUnavailable { .. })
        ));
    }

    #[test]
    fn test_file_source_directory_is_unavailable() {
        let dir = tempdir().unwrap();
        let source = FileSource::new(dir.path());
        assert!(matches!(
            source.sync(),
            Err(ConfigError::SourceUnavailable { .. })
        ));
    }
}
