//! `osRelease` テンプレート関数の Docker 実装
//!
//! テンプレート関数は同期的に呼ばれるため、bollard ではなく
//! docker CLI でイメージ内の `/etc/os-release` を読み出します。

use imgflow_core::{ConfigError, OsReleaseSource};
use std::process::Command;
use tracing::debug;

const OS_RELEASE_PATH: &str = "/etc/os-release";

/// `docker run --rm --entrypoint cat <image> /etc/os-release`
#[derive(Debug, Clone)]
pub struct DockerOsRelease {
    docker_bin: String,
}

impl Default for DockerOsRelease {
    fn default() -> Self {
        Self {
            docker_bin: "docker".to_string(),
        }
    }
}

impl DockerOsRelease {
    pub fn new() -> Self {
        Self::default()
    }

    /// docker 互換 CLI（podman 等）を使う
    pub fn with_binary(docker_bin: impl Into<String>) -> Self {
        Self {
            docker_bin: docker_bin.into(),
        }
    }

    fn command(&self, image: &str) -> Command {
        let mut cmd = Command::new(&self.docker_bin);
        cmd.args(["run", "--rm", "--pull", "missing", "--entrypoint", "cat"])
            .arg(image)
            .arg(OS_RELEASE_PATH);
        cmd
    }
}

impl OsReleaseSource for DockerOsRelease {
    fn read_os_release(&self, image: &str) -> imgflow_core::Result<String> {
        debug!(image, docker = %self.docker_bin, "Reading os-release");

        let failed = |message: String| ConfigError::OsRelease {
            image: image.to_string(),
            message,
        };

        let output = self
            .command(image)
            .output()
            .map_err(|e| failed(format!("{} を実行できません: {}", self.docker_bin, e)))?;

        if !output.status.success() {
            return Err(failed(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }

        String::from_utf8(output.stdout).map_err(|e| failed(e.to_string()))
    }
}
