//! # アーティファクトストレージ
//!
//! 交換対象ファイルを保持するバケットの抽象インターフェース。
//! S3互換ストレージ実装は `s3` サブモジュールを参照。
//!
//! 古いオブジェクトの削除は行わない。アップロードされたファイル名ごとに
//! オブジェクトが残り続ける。

pub mod memory;
#[cfg(feature = "vendor-aws")]
pub mod s3;

use std::path::Path;

pub use memory::MemoryArtifactStorage;
#[cfg(feature = "vendor-aws")]
pub use s3::S3ArtifactStorage;

/// ストレージ操作のエラー型。
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// 指定キーのオブジェクトが存在しない
    #[error("オブジェクト '{0}' が存在しません")]
    NotFound(String),
    /// 上記以外の失敗（ネットワーク、権限、ローカルI/O等）
    #[error("{0}")]
    Backend(String),
}

/// アーティファクトを保持するバケットの抽象インターフェース。
///
/// S3互換ストレージ（AWS S3, MinIO等）やプロセス内ストアを実装として選択できる。
#[async_trait::async_trait]
pub trait ArtifactStorage: Send + Sync {
    /// `key` のオブジェクトをローカルファイル `dest` に書き出す。
    /// 書き出したバイト数を返す。
    async fn fetch_to(&self, key: &str, dest: &Path) -> Result<u64, StorageError>;

    /// `content` を `key` に保存する。既存オブジェクトは上書きされる。
    async fn store(&self, key: &str, content: &[u8]) -> Result<(), StorageError>;
}
