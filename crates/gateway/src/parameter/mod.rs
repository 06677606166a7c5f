//! # パラメータストア
//!
//! ロック値・追跡ファイル名・パスワードを保持する文字列キーバリューストアの
//! 抽象インターフェース。
//!
//! ## 実装
//! - `SsmParameterStore`: AWS Systems Manager Parameter Store（本番用）
//! - `MemoryParameterStore`: プロセス内HashMap（テスト・MOCK_MODE用）
//!
//! 条件付き書き込み（compare-and-swap）は提供しない。`put` は常に上書きする。

pub mod memory;
#[cfg(feature = "vendor-aws")]
pub mod ssm;

pub use memory::MemoryParameterStore;
#[cfg(feature = "vendor-aws")]
pub use ssm::SsmParameterStore;

/// パラメータストアのエラー型。
/// 「存在しない」はエラーではなく `Ok(None)` で表す。
#[derive(Debug, thiserror::Error)]
pub enum ParameterError {
    /// バックエンドとの通信に失敗
    #[error("パラメータ '{name}' の操作に失敗: {message}")]
    Backend { name: String, message: String },
}

impl ParameterError {
    pub fn backend(name: &str, message: impl Into<String>) -> Self {
        ParameterError::Backend {
            name: name.to_string(),
            message: message.into(),
        }
    }
}

/// 文字列キーバリューストアの抽象インターフェース。
#[async_trait::async_trait]
pub trait ParameterStore: Send + Sync {
    /// パラメータ値を取得する。存在しない場合は `None`。
    ///
    /// `with_decryption` が真の場合、暗号化保存された値を復号して返す。
    async fn get(
        &self,
        name: &str,
        with_decryption: bool,
    ) -> Result<Option<String>, ParameterError>;

    /// パラメータ値を無条件に上書きする。
    async fn put(&self, name: &str, value: &str) -> Result<(), ParameterError>;
}
