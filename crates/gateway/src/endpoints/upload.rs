//! # POST /post
//!
//! ロック中の場合にファイルを受け取って保存し、ロックを解放する。

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::multipart::MultipartError;
use axum::extract::{Multipart, Query, State};
use axum::http::StatusCode;
use axum::Json;
use baton_types::{ExchangeQuery, UploadResponse};

use crate::config::GatewayState;
use crate::error::GatewayError;

use super::validate_query;

/// ファイルを受け取るマルチパートフィールド名
const FILE_FIELD: &str = "file";

/// 受信したファイル。
struct UploadedFile {
    filename: String,
    content: Bytes,
}

/// POST /post — ファイルのアップロード。
pub async fn handle_upload(
    State(state): State<Arc<GatewayState>>,
    Query(query): Query<ExchangeQuery>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, GatewayError> {
    let exchange = state.exchange()?;
    validate_query(&query)?;

    // 本文を読む前にパスワードを確認する
    let authorized = exchange.authorize(&query.password).await?;

    let upload = read_file_field(&mut multipart).await?;
    let message = exchange
        .checkin(
            &authorized,
            &query.who_are_you,
            &upload.filename,
            upload.content,
        )
        .await?;

    Ok(Json(UploadResponse { message }))
}

/// `file` フィールドを探して読み込む。他のフィールドは読み捨てる。
async fn read_file_field(multipart: &mut Multipart) -> Result<UploadedFile, GatewayError> {
    while let Some(field) = multipart.next_field().await.map_err(multipart_failure)? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        let filename = field.file_name().unwrap_or_default().to_string();
        let content = field.bytes().await.map_err(multipart_failure)?;
        return Ok(UploadedFile { filename, content });
    }

    Err(GatewayError::BadRequest(format!(
        "マルチパートに '{FILE_FIELD}' フィールドがありません"
    )))
}

fn multipart_failure(e: MultipartError) -> GatewayError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        GatewayError::PayloadTooLarge(e.body_text())
    } else {
        GatewayError::BadRequest(e.body_text())
    }
}
