//! Docker Engine に渡すビルドコンテキスト（tar.gz）の作成

use crate::error::{BuildError, BuildResult};
use flate2::Compression;
use flate2::write::GzEncoder;
use std::path::{Component, Path};
use tar::Builder;
use tracing::{debug, warn};

/// これを超えるコンテキストは警告する
const MAX_CONTEXT_SIZE: usize = 500 * 1024 * 1024; // 500MB

pub struct ContextBuilder;

impl ContextBuilder {
    /// コンテキストディレクトリ全体を tar.gz アーカイブにする
    pub fn create_context(context_path: &Path) -> BuildResult<Vec<u8>> {
        debug!(context = %context_path.display(), "Creating build context");

        let mut archive_data = Vec::new();
        {
            let encoder = GzEncoder::new(&mut archive_data, Compression::default());
            let mut tar = Builder::new(encoder);
            tar.follow_symlinks(false);
            tar.append_dir_all(".", context_path)?;
            tar.into_inner()?.finish()?;
        }

        debug!(bytes = archive_data.len(), "Build context created");
        if archive_data.len() > MAX_CONTEXT_SIZE {
            warn!(
                size_mb = archive_data.len() / 1024 / 1024,
                "ビルドコンテキストが大きすぎます。不要なファイルを除外することを推奨します"
            );
        }

        Ok(archive_data)
    }

    /// 1つのファイルだけを含むコンテキストを作る
    pub fn single_file(name: &str, content: &[u8]) -> BuildResult<Vec<u8>> {
        let mut archive_data = Vec::new();
        {
            let encoder = GzEncoder::new(&mut archive_data, Compression::default());
            let mut tar = Builder::new(encoder);

            let mut header = tar::Header::new_gnu();
            header.set_path(name).map_err(|e| {
                BuildError::InvalidConfig(format!("Failed to set {} path: {}", name, e))
            })?;
            header.set_size(content.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();

            tar.append(&header, content)?;
            tar.into_inner()?.finish()?;
        }
        Ok(archive_data)
    }

    /// Containerfile のパスを検証し、アーカイブ内のパスを返す
    ///
    /// コンテキスト外を指すパス（絶対パスや `..`）は受け付けません。
    pub fn resolve_containerfile(context_path: &Path, containerfile: &str) -> BuildResult<String> {
        let relative = Path::new(containerfile);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        let path = context_path.join(relative);

        if escapes || !path.is_file() {
            return Err(BuildError::ContainerfileNotFound(path));
        }

        let normalized: Vec<_> = relative
            .components()
            .filter_map(|c| match c {
                Component::Normal(part) => part.to_str(),
                _ => None,
            })
            .collect();
        Ok(normalized.join("/"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn unpack(archive: Vec<u8>) -> tempfile::TempDir {
        let extract_dir = tempdir().unwrap();
        let decoder = flate2::read::GzDecoder::new(std::io::Cursor::new(archive));
        tar::Archive::new(decoder).unpack(extract_dir.path()).unwrap();
        extract_dir
    }

    #[test]
    fn test_create_context() {
        let temp_dir = tempdir().unwrap();
        fs::write(temp_dir.path().join("file1.txt"), "content1").unwrap();
        let subdir = temp_dir.path().join("images").join("base");
        fs::create_dir_all(&subdir).unwrap();
        fs::write(subdir.join("Containerfile"), "FROM alpine").unwrap();

        let archive = ContextBuilder::create_context(temp_dir.path()).unwrap();
        let extracted = unpack(archive);

        assert!(extracted.path().join("file1.txt").exists());
        assert!(extracted.path().join("images/base/Containerfile").exists());
    }

    #[test]
    fn test_single_file() {
        let archive = ContextBuilder::single_file("Dockerfile", b"FROM scratch\n").unwrap();
        let extracted = unpack(archive);
        let content = fs::read_to_string(extracted.path().join("Dockerfile")).unwrap();
        assert_eq!(content, "FROM scratch\n");
    }

    #[test]
    fn test_resolve_containerfile() {
        let temp_dir = tempdir().unwrap();
        fs::create_dir(temp_dir.path().join("images")).unwrap();
        fs::write(temp_dir.path().join("images/Containerfile"), "FROM alpine").unwrap();
        fs::write(temp_dir.path().join("Dockerfile"), "FROM alpine").unwrap();

        assert_eq!(
            ContextBuilder::resolve_containerfile(temp_dir.path(), "./images/Containerfile")
                .unwrap(),
            "images/Containerfile"
        );
        assert_eq!(
            ContextBuilder::resolve_containerfile(temp_dir.path(), "Dockerfile").unwrap(),
            "Dockerfile"
        );
    }

    #[test]
    fn test_resolve_containerfile_rejects_missing_and_outside() {
        let temp_dir = tempdir().unwrap();
        assert!(matches!(
            ContextBuilder::resolve_containerfile(temp_dir.path(), "Dockerfile"),
            Err(BuildError::ContainerfileNotFound(_))
        ));
        assert!(matches!(
            ContextBuilder::resolve_containerfile(temp_dir.path(), "../Dockerfile"),
            Err(BuildError::ContainerfileNotFound(_))
        ));
    }
}
