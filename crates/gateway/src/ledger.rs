//! # 交換台帳
//!
//! パラメータストア上のロック値・追跡ファイル名・パスワードへのアクセスを
//! 一箇所にまとめる。キー名は起動時の設定で決まる。
//!
//! ロックは助言的なものに過ぎない。読み取りと書き込みは独立した往復であり、
//! 同時に2件のダウンロードが「unlocked」を観測すると両方が成功し、
//! 最後に書いた側のロック値が残る。利用者が一度に一人であることが前提。

use std::fmt;
use std::sync::Arc;

use baton_types::{FILENAME_SENTINEL, LOCK_VALUE_UNLOCKED};

use crate::parameter::{ParameterError, ParameterStore};

/// パラメータストア上のキー名。
#[derive(Debug, Clone)]
pub struct ParameterKeys {
    /// ロック値のキー
    pub lock: String,
    /// 追跡ファイル名のキー
    pub filename: String,
    /// パスワードのキー（暗号化保存）
    pub password: String,
}

/// ロックの状態。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockState {
    /// ダウンロード可能
    Unlocked,
    /// 指定の名前の人がダウンロード済み
    HeldBy(String),
    /// パラメータが存在しない。ダウンロード不可、アップロード可として扱う。
    Unknown,
}

impl LockState {
    /// パラメータストアに保存された値から状態を判定する。
    pub fn from_stored(value: Option<String>) -> Self {
        match value {
            Some(v) if v == LOCK_VALUE_UNLOCKED => LockState::Unlocked,
            Some(v) => LockState::HeldBy(v),
            None => LockState::Unknown,
        }
    }

    pub fn is_unlocked(&self) -> bool {
        matches!(self, LockState::Unlocked)
    }
}

impl fmt::Display for LockState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockState::Unlocked => f.write_str(LOCK_VALUE_UNLOCKED),
            LockState::HeldBy(holder) => f.write_str(holder),
            LockState::Unknown => f.write_str("不明"),
        }
    }
}

/// パラメータストア上の交換状態へのアクセサ。
pub struct Ledger {
    store: Arc<dyn ParameterStore>,
    keys: ParameterKeys,
}

impl Ledger {
    pub fn new(store: Arc<dyn ParameterStore>, keys: ParameterKeys) -> Self {
        Self { store, keys }
    }

    /// 保存されたパスワードを復号して取得する。
    pub async fn password(&self) -> Result<Option<String>, ParameterError> {
        self.store.get(&self.keys.password, true).await
    }

    pub async fn lock(&self) -> Result<LockState, ParameterError> {
        let value = self.store.get(&self.keys.lock, false).await?;
        Ok(LockState::from_stored(value))
    }

    /// ロック値を保持者の名前で上書きする。
    pub async fn set_lock(&self, holder: &str) -> Result<(), ParameterError> {
        self.store.put(&self.keys.lock, holder).await
    }

    /// ロック値を `"unlocked"` に戻す。
    pub async fn release_lock(&self) -> Result<(), ParameterError> {
        self.store.put(&self.keys.lock, LOCK_VALUE_UNLOCKED).await
    }

    /// 追跡ファイル名を取得する。
    /// 未設定・空文字列・初期値 `"init"` の場合は `None`。
    pub async fn tracked_filename(&self) -> Result<Option<String>, ParameterError> {
        let value = self.store.get(&self.keys.filename, false).await?;
        Ok(value.filter(|name| !name.is_empty() && name != FILENAME_SENTINEL))
    }

    pub async fn set_tracked_filename(&self, filename: &str) -> Result<(), ParameterError> {
        self.store.put(&self.keys.filename, filename).await
    }
}

#[cfg(test)]
pub(crate) fn test_keys() -> ParameterKeys {
    ParameterKeys {
        lock: "/baton/lock".to_string(),
        filename: "/baton/filename".to_string(),
        password: "/baton/password".to_string(),
    }
}
