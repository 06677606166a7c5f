//! # Baton 共有型定義
//!
//! ゲートウェイとクライアントが共有するリクエスト・レスポンス型と、
//! パラメータストアに保存される値の定数を提供する。
//!
//! ## パラメータストアの値
//! - ロック: `"unlocked"` または最後にダウンロードした人の名前
//! - 追跡ファイル名: 現在のアーティファクトのキー（`"init"` は未設定）

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// パラメータストアの値
// ---------------------------------------------------------------------------

/// ロックが解放されていることを示す値。
/// これ以外の値は全て保持者の名前として扱う。
pub const LOCK_VALUE_UNLOCKED: &str = "unlocked";

/// 追跡ファイル名の初期値。有効なアーティファクトがまだ無いことを示す。
pub const FILENAME_SENTINEL: &str = "init";

/// `who_are_you` / `password` の最大文字数。
pub const MAX_QUERY_FIELD_CHARS: usize = 20;

// ---------------------------------------------------------------------------
// リクエスト / レスポンス
// ---------------------------------------------------------------------------

/// `GET /get` と `POST /post` で共通のクエリパラメータ。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeQuery {
    /// 呼び出し元の表示名。ダウンロード時にロック値として記録される。
    pub who_are_you: String,
    /// ゲートウェイのパスワード
    pub password: String,
}

impl ExchangeQuery {
    /// 各フィールドが上限文字数以内かを検査する。
    /// 超過したフィールド名を返す。
    pub fn oversized_field(&self) -> Option<&'static str> {
        if self.who_are_you.chars().count() > MAX_QUERY_FIELD_CHARS {
            Some("who_are_you")
        } else if self.password.chars().count() > MAX_QUERY_FIELD_CHARS {
            Some("password")
        } else {
            None
        }
    }
}

/// `POST /post` 成功時のレスポンス。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadResponse {
    pub message: String,
}
