//! # S3互換 アーティファクトストレージ実装
//!
//! AWS S3, MinIO 等のS3互換APIを使用するアーティファクトストレージ実装。
//! `fail-on-err` を無効にしているため、HTTPステータスは戻り値で判定する。

use std::path::Path;

use tokio::io::AsyncWriteExt;

use super::{ArtifactStorage, StorageError};

/// S3互換ストレージによるアーティファクトストレージ実装。
pub struct S3ArtifactStorage {
    bucket: s3::Bucket,
}

impl S3ArtifactStorage {
    pub fn new(bucket: s3::Bucket) -> Self {
        Self { bucket }
    }

    /// バケット名・リージョン・任意のエンドポイントから構築する。
    ///
    /// 認証情報が解決できない場合は `Ok(None)` を返す。
    /// 呼び出し側はこれを「ストア未初期化」として扱う。
    /// `endpoint` を指定した場合はパススタイルでアクセスする（MinIO等）。
    pub fn from_config(
        bucket_name: &str,
        region: &str,
        endpoint: Option<&str>,
    ) -> anyhow::Result<Option<Self>> {
        let credentials = match s3::creds::Credentials::default() {
            Ok(credentials) => credentials,
            Err(e) => {
                tracing::error!(error = %e, "AWS認証情報が見つかりません。S3クライアントを初期化できません");
                return Ok(None);
            }
        };

        let s3_region = match endpoint {
            Some(endpoint) => s3::Region::Custom {
                region: region.to_string(),
                endpoint: endpoint.to_string(),
            },
            None => region.parse()?,
        };

        let bucket = s3::Bucket::new(bucket_name, s3_region, credentials)?;
        let bucket = if let Some(endpoint) = endpoint {
            tracing::info!(s3_endpoint = %endpoint, "S3互換エンドポイントを設定");
            bucket.with_path_style()
        } else {
            bucket
        };

        tracing::debug!(bucket = bucket_name, region, "S3クライアントを初期化しました");
        Ok(Some(Self::new(*bucket)))
    }
}

#[async_trait::async_trait]
impl ArtifactStorage for S3ArtifactStorage {
    async fn fetch_to(&self, key: &str, dest: &Path) -> Result<u64, StorageError> {
        let mut file = tokio::fs::File::create(dest)
            .await
            .map_err(|e| StorageError::Backend(format!("ステージングファイル作成に失敗: {e}")))?;

        let status = self
            .bucket
            .get_object_to_writer(key, &mut file)
            .await
            .map_err(|e| StorageError::Backend(format!("S3 get_object 失敗: {e}")))?;

        match status {
            200..=299 => {}
            404 => return Err(StorageError::NotFound(key.to_string())),
            other => {
                return Err(StorageError::Backend(format!(
                    "S3がエラーを返しました: HTTP {other}"
                )))
            }
        }

        file.flush()
            .await
            .map_err(|e| StorageError::Backend(format!("ステージングファイル書き込みに失敗: {e}")))?;

        let size = tokio::fs::metadata(dest)
            .await
            .map_err(|e| StorageError::Backend(format!("ステージングファイル参照に失敗: {e}")))?
            .len();

        Ok(size)
    }

    async fn store(&self, key: &str, content: &[u8]) -> Result<(), StorageError> {
        let response = self
            .bucket
            .put_object(key, content)
            .await
            .map_err(|e| StorageError::Backend(format!("S3 put_object 失敗: {e}")))?;

        let status = response.status_code();
        if !(200..300).contains(&status) {
            return Err(StorageError::Backend(format!(
                "S3がエラーを返しました: HTTP {status}"
            )));
        }

        Ok(())
    }
}
