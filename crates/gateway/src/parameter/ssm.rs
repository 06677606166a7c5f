//! # AWS Systems Manager Parameter Store 実装

use aws_credential_types::provider::{ProvideCredentials, SharedCredentialsProvider};
use aws_sdk_ssm::error::DisplayErrorContext;
use aws_sdk_ssm::types::ParameterType;
use aws_sdk_ssm::Client;

use super::{ParameterError, ParameterStore};

/// SSM Parameter Storeによるパラメータストア実装。
pub struct SsmParameterStore {
    client: Client,
}

impl SsmParameterStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// リージョンを指定してAWS設定を読み込み、クライアントを構築する。
    ///
    /// 認証情報を解決できない場合は `None` を返す。
    /// 呼び出し側はこれを「ストア未初期化」として扱う。
    pub async fn from_region(region: &str) -> Option<Self> {
        let config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_sdk_ssm::config::Region::new(region.to_string()))
            .load()
            .await;

        if !credentials_resolve(config.credentials_provider()).await {
            tracing::error!(region, "AWS認証情報を解決できません。SSMクライアントを初期化できません");
            return None;
        }

        tracing::debug!(region, "SSMクライアントを初期化しました");
        Some(Self::new(Client::new(&config)))
    }
}

/// プロバイダから実際に認証情報を取得できるかを確認する。
async fn credentials_resolve(provider: Option<SharedCredentialsProvider>) -> bool {
    let Some(provider) = provider else {
        return false;
    };
    match provider.provide_credentials().await {
        Ok(_) => true,
        Err(e) => {
            tracing::warn!(error = %DisplayErrorContext(&e), "AWS認証情報の取得に失敗");
            false
        }
    }
}

#[async_trait::async_trait]
impl ParameterStore for SsmParameterStore {
    async fn get(
        &self,
        name: &str,
        with_decryption: bool,
    ) -> Result<Option<String>, ParameterError> {
        match self
            .client
            .get_parameter()
            .name(name)
            .with_decryption(with_decryption)
            .send()
            .await
        {
            Ok(output) => Ok(output
                .parameter()
                .and_then(|p| p.value())
                .map(str::to_string)),
            Err(sdk_err) => {
                if sdk_err
                    .as_service_error()
                    .is_some_and(|e| e.is_parameter_not_found())
                {
                    tracing::info!(parameter = name, "SSMパラメータが存在しません");
                    return Ok(None);
                }
                let message = DisplayErrorContext(&sdk_err).to_string();
                tracing::error!(parameter = name, error = %message, "SSMパラメータの取得に失敗");
                Err(ParameterError::backend(name, message))
            }
        }
    }

    async fn put(&self, name: &str, value: &str) -> Result<(), ParameterError> {
        self.client
            .put_parameter()
            .name(name)
            .value(value)
            .r#type(ParameterType::String)
            .overwrite(true)
            .send()
            .await
            .map_err(|e| {
                let message = DisplayErrorContext(&e).to_string();
                tracing::error!(parameter = name, error = %message, "SSMパラメータの設定に失敗");
                ParameterError::backend(name, message)
            })?;

        tracing::info!(parameter = name, value, "SSMパラメータを設定しました");
        Ok(())
    }
}
