//! # インメモリ アーティファクトストレージ
//!
//! テストとローカル開発（MOCK_MODE）用。

use std::collections::HashMap;
use std::path::Path;

use tokio::sync::RwLock;

use super::{ArtifactStorage, StorageError};

/// HashMapによるアーティファクトストレージ実装。
#[derive(Debug, Default)]
pub struct MemoryArtifactStorage {
    objects: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryArtifactStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// 初期オブジェクトを投入した状態で構築する。
    pub fn with_objects<I, K, V>(objects: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Vec<u8>>,
    {
        let objects = objects
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Self {
            objects: RwLock::new(objects),
        }
    }

    /// 保存済みオブジェクトの内容を返す。
    #[cfg(test)]
    pub async fn object(&self, key: &str) -> Option<Vec<u8>> {
        self.objects.read().await.get(key).cloned()
    }

    /// 保存済みオブジェクト数を返す。
    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }
}

#[async_trait::async_trait]
impl ArtifactStorage for MemoryArtifactStorage {
    async fn fetch_to(&self, key: &str, dest: &Path) -> Result<u64, StorageError> {
        let content = self
            .objects
            .read()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(key.to_string()))?;

        tokio::fs::write(dest, &content)
            .await
            .map_err(|e| StorageError::Backend(format!("ローカル書き込みに失敗: {e}")))?;

        Ok(content.len() as u64)
    }

    async fn store(&self, key: &str, content: &[u8]) -> Result<(), StorageError> {
        self.objects
            .write()
            .await
            .insert(key.to_string(), content.to_vec());
        Ok(())
    }
}
