//! # ステージング領域
//!
//! ダウンロード中のアーティファクトを一時的に置くリクエスト単位のディレクトリ。
//! `StagingArea` がドロップされた時点でディレクトリごと削除されるため、
//! 成功・失敗のどの経路でも後始末が保証される。

use std::path::PathBuf;

/// ステージングディレクトリのプレフィックス
const STAGING_PREFIX: &str = "baton-staging-";

/// ステージングファイル名。
/// 追跡ファイル名はバケットのキーであり `/` を含み得るため、パスには使わない。
const ARTIFACT_FILE_NAME: &str = "artifact";

/// リクエスト単位の一時ディレクトリ。
pub struct StagingArea {
    dir: tempfile::TempDir,
}

impl StagingArea {
    pub fn new() -> std::io::Result<Self> {
        let dir = tempfile::Builder::new().prefix(STAGING_PREFIX).tempdir()?;
        Ok(Self { dir })
    }

    /// アーティファクトの書き出し先パス。
    pub fn artifact_path(&self) -> PathBuf {
        self.dir.path().join(ARTIFACT_FILE_NAME)
    }

    /// 書き出し済みのアーティファクトを読み込む。
    pub async fn read_artifact(&self) -> std::io::Result<Vec<u8>> {
        tokio::fs::read(self.artifact_path()).await
    }
}
