//! # Baton Gateway
//!
//! 2者間で1つのファイルを受け渡すためのゲートウェイ。
//!
//! ## 役割
//! - パスワード認証（パラメータストアに暗号化保存）
//! - ロックが `unlocked` の間だけファイルをダウンロード可能にし、
//!   ダウンロードした人の名前でロックする
//! - ロック中の間だけアップロードを受け付け、追跡ファイル名を更新してロックを解放する
//!
//! ## API エンドポイント
//! - `GET /get?who_are_you=..&password=..` — ダウンロード + ロック
//! - `POST /post?who_are_you=..&password=..` — マルチパート `file` のアップロード + ロック解放
//!
//! ロックは条件付き書き込みを使わない助言的なもので、同時に一人が操作する前提。

mod auth;
mod config;
mod endpoints;
mod error;
mod exchange;
mod ledger;
mod parameter;
mod staging;
mod storage;

use std::sync::Arc;

use baton_types::FILENAME_SENTINEL;

use crate::config::{GatewayConfig, GatewayState};
use crate::exchange::Exchange;
use crate::parameter::MemoryParameterStore;
use crate::storage::MemoryArtifactStorage;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ローカル開発用に .env があれば読み込む
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    let config = GatewayConfig::from_env()?;
    tracing::info!(
        region = %config.region,
        bucket = %config.bucket,
        lock_parameter = %config.lock_parameter,
        filename_parameter = %config.filename_parameter,
        password_parameter = %config.password_parameter,
        "設定を読み込みました"
    );

    let exchange = if config.mock_mode {
        tracing::warn!("MOCK_MODEで起動します。状態はプロセス内にのみ保持されます");
        Some(mock_exchange(&config))
    } else {
        connect_exchange(&config).await?
    };

    let state = Arc::new(GatewayState { exchange });
    let app = endpoints::router(state, config.max_upload_bytes);

    tracing::info!("Gatewayを {} で起動します", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// SSMとS3のクライアントを構築する。
/// どちらかが初期化できない場合は `None` を返し、全リクエストが503になる。
#[cfg(feature = "vendor-aws")]
async fn connect_exchange(config: &GatewayConfig) -> anyhow::Result<Option<Exchange>> {
    use crate::parameter::SsmParameterStore;
    use crate::storage::S3ArtifactStorage;

    let parameters = SsmParameterStore::from_region(&config.region).await;
    let artifacts = S3ArtifactStorage::from_config(
        &config.bucket,
        &config.region,
        config.s3_endpoint.as_deref(),
    )?;

    match (parameters, artifacts) {
        (Some(parameters), Some(artifacts)) => Ok(Some(Exchange::new(
            Arc::new(parameters),
            Arc::new(artifacts),
            config.parameter_keys(),
        ))),
        _ => {
            tracing::error!("AWSクライアントを初期化できませんでした。全リクエストに503を返します");
            Ok(None)
        }
    }
}

#[cfg(not(feature = "vendor-aws"))]
async fn connect_exchange(_config: &GatewayConfig) -> anyhow::Result<Option<Exchange>> {
    tracing::error!("vendor-aws featureが無効です。MOCK_MODE=true 以外では全リクエストに503を返します");
    Ok(None)
}

/// インメモリストアで構築する。
/// ロックは未設定（最初のアップロードを受け付ける）、追跡ファイル名は初期値、
/// パスワードは `MOCK_PASSWORD`。
fn mock_exchange(config: &GatewayConfig) -> Exchange {
    let keys = config.parameter_keys();
    let parameters = MemoryParameterStore::with_entries([
        (keys.filename.clone(), FILENAME_SENTINEL.to_string()),
        (keys.password.clone(), config.mock_password.clone()),
    ]);
    Exchange::new(
        Arc::new(parameters),
        Arc::new(MemoryArtifactStorage::new()),
        keys,
    )
}
