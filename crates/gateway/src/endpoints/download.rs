//! # GET /get
//!
//! ロックが `unlocked` の場合に現在のファイルを返し、呼び出し元の名前でロックする。

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::{header, HeaderValue};
use axum::response::{IntoResponse, Response};
use baton_types::{ExchangeQuery, LOCK_VALUE_UNLOCKED};

use crate::config::GatewayState;
use crate::error::GatewayError;

use super::validate_query;

/// GET /get — ファイルのダウンロード。
///
/// レスポンスはバイナリ本文と、元のファイル名を含む `Content-Disposition`。
pub async fn handle_download(
    State(state): State<Arc<GatewayState>>,
    Query(query): Query<ExchangeQuery>,
) -> Result<Response, GatewayError> {
    let exchange = state.exchange()?;
    validate_query(&query)?;

    // ロック値として記録するため、空文字列と "unlocked" は名前として使えない
    if query.who_are_you.is_empty() || query.who_are_you == LOCK_VALUE_UNLOCKED {
        return Err(GatewayError::BadRequest(format!(
            "who_are_you に '{}' は使用できません",
            query.who_are_you
        )));
    }

    let artifact = exchange
        .checkout(&query.who_are_you, &query.password)
        .await?;

    let disposition = HeaderValue::from_str(&content_disposition(&artifact.filename))
        .map_err(|e| GatewayError::Internal(format!("Content-Dispositionの構築に失敗: {e}")))?;

    Ok((
        [
            (
                header::CONTENT_TYPE,
                HeaderValue::from_static("application/octet-stream"),
            ),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        artifact.content,
    )
        .into_response())
}

/// `Content-Disposition` ヘッダー値を構築する。
///
/// ASCIIの表示可能文字のみのファイル名は `filename="..."`、
/// それ以外は RFC 5987 の `filename*=utf-8''...` でパーセントエンコードする。
pub(crate) fn content_disposition(filename: &str) -> String {
    let plain = filename
        .chars()
        .all(|c| (c.is_ascii_graphic() || c == ' ') && c != '"' && c != '\\');
    if plain {
        return format!("attachment; filename=\"{filename}\"");
    }

    let mut encoded = String::with_capacity(filename.len() * 3);
    for byte in filename.bytes() {
        if byte.is_ascii_alphanumeric() || b"-._~".contains(&byte) {
            encoded.push(byte as char);
        } else {
            encoded.push_str(&format!("%{byte:02X}"));
        }
    }
    format!("attachment; filename*=utf-8''{encoded}")
}
