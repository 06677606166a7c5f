//! # Gateway エラー型
//!
//! 全エンドポイントで共通のエラー型。各バリアントがHTTPステータスに対応する。

use axum::http::StatusCode;

/// Gatewayエラー型。
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// パスワード不一致
    #[error("パスワードが正しくありません")]
    Unauthorized,
    /// ストアクライアントが初期化されていない（認証情報の欠如等）
    #[error("ストレージサービスが利用できません: {0}")]
    ServiceUnavailable(String),
    /// 現在のロック状態では許可されない操作
    #[error("{0}")]
    Conflict(String),
    /// アーティファクトが存在しない（未設定、または追跡名とバケットの不整合）
    #[error("{0}")]
    NotFound(String),
    /// バケットへの転送に失敗
    #[error("ファイル転送に失敗: {0}")]
    Transfer(String),
    /// バケット書き込み後にパラメータ更新が失敗した。手動での整合が必要。
    #[error("重大なエラー: {0}")]
    Critical(String),
    /// 内部エラー
    #[error("内部エラー: {0}")]
    Internal(String),
    /// 不正なリクエスト
    #[error("不正なリクエスト: {0}")]
    BadRequest(String),
    /// アップロードサイズ超過
    #[error("アップロードサイズが上限を超えています: {0}")]
    PayloadTooLarge(String),
}

impl axum::response::IntoResponse for GatewayError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            GatewayError::Unauthorized => StatusCode::FORBIDDEN,
            GatewayError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::Conflict(_) => StatusCode::CONFLICT,
            GatewayError::NotFound(_) => StatusCode::NOT_FOUND,
            GatewayError::Transfer(_)
            | GatewayError::Critical(_)
            | GatewayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            GatewayError::BadRequest(_) => StatusCode::BAD_REQUEST,
            GatewayError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
        };
        (status, self.to_string()).into_response()
    }
}
