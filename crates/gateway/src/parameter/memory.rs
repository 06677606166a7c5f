//! # インメモリ パラメータストア
//!
//! テストとローカル開発（MOCK_MODE）用。暗号化は行わないため
//! `with_decryption` は無視する。

use std::collections::HashMap;

use tokio::sync::RwLock;

use super::{ParameterError, ParameterStore};

/// HashMapによるパラメータストア実装。
#[derive(Debug, Default)]
pub struct MemoryParameterStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryParameterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 初期値を投入した状態で構築する。
    pub fn with_entries<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let entries = entries
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Self {
            entries: RwLock::new(entries),
        }
    }
}

#[async_trait::async_trait]
impl ParameterStore for MemoryParameterStore {
    async fn get(
        &self,
        name: &str,
        _with_decryption: bool,
    ) -> Result<Option<String>, ParameterError> {
        Ok(self.entries.read().await.get(name).cloned())
    }

    async fn put(&self, name: &str, value: &str) -> Result<(), ParameterError> {
        self.entries
            .write()
            .await
            .insert(name.to_string(), value.to_string());
        Ok(())
    }
}
