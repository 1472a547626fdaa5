//! モデル定義
//!
//! 設定ファイルから読み込まれるジョブと、ステージ間で受け渡す
//! 正規形（JSON文字列）を定義します。

mod config;
mod de;
mod job;

// Re-exports
pub use config::*;
pub use job::*;
