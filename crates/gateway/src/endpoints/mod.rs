//! # Gatewayエンドポイント
//!
//! - `GET /get` — ファイルのダウンロードとロック
//! - `POST /post` — ファイルのアップロードとロック解放

pub mod download;
pub mod upload;

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use baton_types::ExchangeQuery;

use crate::config::GatewayState;
use crate::error::GatewayError;

pub use download::handle_download;
pub use upload::handle_upload;

/// ルーターを構築する。`/post` のみボディ上限を `max_upload_bytes` に設定する。
pub fn router(state: Arc<GatewayState>, max_upload_bytes: usize) -> axum::Router {
    axum::Router::new()
        .route("/get", get(handle_download))
        .route(
            "/post",
            post(handle_upload).layer(DefaultBodyLimit::max(max_upload_bytes)),
        )
        .with_state(state)
}

/// クエリパラメータの長さを検査する。
pub(crate) fn validate_query(query: &ExchangeQuery) -> Result<(), GatewayError> {
    if let Some(field) = query.oversized_field() {
        return Err(GatewayError::BadRequest(format!(
            "{field} は{}文字以内で指定してください",
            baton_types::MAX_QUERY_FIELD_CHARS
        )));
    }
    Ok(())
}
