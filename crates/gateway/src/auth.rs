//! # パスワード認証
//!
//! 全エンドポイント共通の認証。パラメータストアに暗号化保存された
//! パスワードを毎回復号して取得し、呼び出し元の値と比較する。

use subtle::ConstantTimeEq;

use crate::error::GatewayError;
use crate::ledger::Ledger;

/// 保存されたパスワードと一致する場合のみ通過させる。
/// パスワードが未設定の場合は常に拒否する。
pub(crate) async fn authorize(ledger: &Ledger, password: &str) -> Result<(), GatewayError> {
    let stored = ledger
        .password()
        .await
        .map_err(|e| GatewayError::Internal(e.to_string()))?;

    let Some(stored) = stored else {
        tracing::error!("パスワードパラメータが存在しません。全リクエストを拒否します");
        return Err(GatewayError::Unauthorized);
    };

    if !passwords_match(&stored, password) {
        tracing::warn!("パスワード不一致のためリクエストを拒否");
        return Err(GatewayError::Unauthorized);
    }

    Ok(())
}

/// 定数時間で文字列を比較する。長さが異なる場合は不一致。
fn passwords_match(stored: &str, provided: &str) -> bool {
    stored.as_bytes().ct_eq(provided.as_bytes()).into()
}
