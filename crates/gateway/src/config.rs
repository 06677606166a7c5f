//! # Gateway設定・共有状態
//!
//! 環境変数からの設定読み込みとGatewayの共有状態の定義。
//! 設定は起動時に一度だけ読み込み、以降は変更しない。

use crate::error::GatewayError;
use crate::exchange::Exchange;
use crate::ledger::ParameterKeys;

/// デフォルトのリッスンアドレス
const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8000";

/// デフォルトのアップロード上限（100 MiB）
const DEFAULT_MAX_UPLOAD_BYTES: usize = 100 * 1024 * 1024;

/// MOCK_MODEで投入するデフォルトパスワード
const DEFAULT_MOCK_PASSWORD: &str = "password";

/// 設定読み込みのエラー型。
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// 必須の環境変数が未設定（空文字列も未設定として扱う）
    #[error("必須の環境変数 {0} が設定されていません")]
    Missing(&'static str),
    /// 値の形式が不正
    #[error("環境変数 {name} の値が不正です: {message}")]
    Invalid { name: &'static str, message: String },
}

/// Gateway設定。
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// パラメータストアとバケットのリージョン（`AWS_REGION`）
    pub region: String,
    /// アーティファクトを保存するバケット名（`S3_BUCKET_NAME`）
    pub bucket: String,
    /// ロック値のパラメータ名（`SSM_PARAMETER_NAME`）
    pub lock_parameter: String,
    /// 追跡ファイル名のパラメータ名（`SSM_FILENAME_PARAMETER_NAME`）
    pub filename_parameter: String,
    /// パスワードのパラメータ名（`SSM_PASSWORD_PARAMETER_NAME`）
    pub password_parameter: String,
    /// S3互換エンドポイント（`S3_ENDPOINT`、MinIO等）
    pub s3_endpoint: Option<String>,
    /// リッスンアドレス（`BIND_ADDR`）
    pub bind_addr: String,
    /// `/post` のリクエストボディ上限（`MAX_UPLOAD_BYTES`）
    pub max_upload_bytes: usize,
    /// インメモリストアで起動する（`MOCK_MODE=true`）
    pub mock_mode: bool,
    /// MOCK_MODEで投入するパスワード（`MOCK_PASSWORD`）
    pub mock_password: String,
}

impl GatewayConfig {
    /// プロセスの環境変数から読み込む。
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// 任意の参照関数から読み込む。
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let optional = |name: &str| lookup(name).filter(|v| !v.is_empty());
        let required = |name: &'static str| optional(name).ok_or(ConfigError::Missing(name));

        let max_upload_bytes = match optional("MAX_UPLOAD_BYTES") {
            Some(v) => v.parse().map_err(|e| ConfigError::Invalid {
                name: "MAX_UPLOAD_BYTES",
                message: format!("{e}"),
            })?,
            None => DEFAULT_MAX_UPLOAD_BYTES,
        };

        Ok(Self {
            region: required("AWS_REGION")?,
            bucket: required("S3_BUCKET_NAME")?,
            lock_parameter: required("SSM_PARAMETER_NAME")?,
            filename_parameter: required("SSM_FILENAME_PARAMETER_NAME")?,
            password_parameter: required("SSM_PASSWORD_PARAMETER_NAME")?,
            s3_endpoint: optional("S3_ENDPOINT"),
            bind_addr: optional("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
            max_upload_bytes,
            mock_mode: optional("MOCK_MODE").is_some_and(|v| v == "true"),
            mock_password: optional("MOCK_PASSWORD")
                .unwrap_or_else(|| DEFAULT_MOCK_PASSWORD.to_string()),
        })
    }

    pub fn parameter_keys(&self) -> ParameterKeys {
        ParameterKeys {
            lock: self.lock_parameter.clone(),
            filename: self.filename_parameter.clone(),
            password: self.password_parameter.clone(),
        }
    }
}

/// Gatewayの共有状態。
pub struct GatewayState {
    /// ファイル交換。ストアクライアントを初期化できなかった場合は `None` で、
    /// 全リクエストが503になる。
    pub exchange: Option<Exchange>,
}

impl GatewayState {
    pub fn exchange(&self) -> Result<&Exchange, GatewayError> {
        self.exchange.as_ref().ok_or_else(|| {
            tracing::error!("ストアクライアントが初期化されていないためリクエストを拒否");
            GatewayError::ServiceUnavailable("AWSサービスクライアントが利用できません".to_string())
        })
    }
}
