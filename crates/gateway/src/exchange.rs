//! # ファイル交換
//!
//! ロック状態に基づくダウンロード（チェックアウト）とアップロード（チェックイン）。
//!
//! ## 状態遷移
//! - `unlocked` → ダウンロード成功 → 呼び出し元の名前でロック
//! - ロック中（名前、または値なし）→ アップロード成功 → 追跡ファイル名を更新し `unlocked`
//!
//! パラメータストアに条件付き書き込みは無いため、ロックは助言的なもの。
//! 同時アクセスでの排他は保証しない（`ledger` モジュール参照）。
//! 外部呼び出しの再試行や補償処理は行わず、失敗は即座に呼び出し元へ返す。

use std::sync::Arc;

use axum::body::Bytes;

use crate::auth;
use crate::error::GatewayError;
use crate::ledger::{Ledger, ParameterKeys};
use crate::parameter::{ParameterError, ParameterStore};
use crate::staging::StagingArea;
use crate::storage::{ArtifactStorage, StorageError};

/// チェックアウトされたアーティファクト。
#[derive(Debug)]
pub struct CheckedOutArtifact {
    /// バケット上のキー（クライアントへはファイル名として返す）
    pub filename: String,
    pub content: Vec<u8>,
}

/// パスワード認証を通過したことを示す値。`Exchange::authorize` からのみ得られる。
#[derive(Debug)]
pub struct Authorized {
    _private: (),
}

/// ファイル交換の状態機械。
pub struct Exchange {
    ledger: Ledger,
    artifacts: Arc<dyn ArtifactStorage>,
}

impl Exchange {
    pub fn new(
        parameters: Arc<dyn ParameterStore>,
        artifacts: Arc<dyn ArtifactStorage>,
        keys: ParameterKeys,
    ) -> Self {
        Self {
            ledger: Ledger::new(parameters, keys),
            artifacts,
        }
    }

    /// パスワードを検査する。
    ///
    /// アップロードではリクエストボディを読む前に呼び出し、
    /// 得られた `Authorized` を `checkin` に渡す。
    pub async fn authorize(&self, password: &str) -> Result<Authorized, GatewayError> {
        auth::authorize(&self.ledger, password).await?;
        Ok(Authorized { _private: () })
    }

    /// 現在のアーティファクトを取得し、呼び出し元の名前でロックする。
    ///
    /// 1. パスワード認証
    /// 2. ロックが `unlocked` でなければ保持者名を含めて拒否
    /// 3. 追跡ファイル名を取得（未設定・初期値なら拒否）
    /// 4. バケットからステージング領域へ取得
    /// 5. ロックを呼び出し元の名前に更新
    ///
    /// ロック更新に失敗した場合、取得済みの内容は返さない。
    pub async fn checkout(
        &self,
        who: &str,
        password: &str,
    ) -> Result<CheckedOutArtifact, GatewayError> {
        self.authorize(password).await?;

        let lock = self.ledger.lock().await.map_err(parameter_failure)?;
        if !lock.is_unlocked() {
            tracing::info!(who, lock = %lock, "ロック中のためダウンロードを拒否");
            return Err(GatewayError::Conflict(format!(
                "{lock} がロックしているためダウンロードできません"
            )));
        }

        let Some(filename) = self
            .ledger
            .tracked_filename()
            .await
            .map_err(parameter_failure)?
        else {
            tracing::error!("追跡ファイル名が未設定、または初期値のままです");
            return Err(GatewayError::NotFound(
                "ダウンロード可能な有効なファイルがありません".to_string(),
            ));
        };

        tracing::info!(who, filename = %filename, "ロック解除中。ダウンロードを開始");

        let staging = StagingArea::new()
            .map_err(|e| GatewayError::Internal(format!("ステージング領域の作成に失敗: {e}")))?;

        let size = self
            .artifacts
            .fetch_to(&filename, &staging.artifact_path())
            .await
            .map_err(|e| match e {
                StorageError::NotFound(_) => {
                    tracing::error!(filename = %filename, "追跡ファイルがバケットに存在しません");
                    GatewayError::NotFound(format!(
                        "ファイル '{filename}' がバケットに存在しません"
                    ))
                }
                StorageError::Backend(message) => {
                    tracing::error!(filename = %filename, error = %message, "バケットからの取得に失敗");
                    GatewayError::Transfer(format!("'{filename}' のダウンロードに失敗しました"))
                }
            })?;
        tracing::info!(filename = %filename, size, "ステージング領域へのダウンロード完了");

        let content = staging
            .read_artifact()
            .await
            .map_err(|e| GatewayError::Internal(format!("ステージングファイルの読み込みに失敗: {e}")))?;

        self.ledger.set_lock(who).await.map_err(|e| {
            tracing::error!(who, error = %e, "ダウンロード後のロック更新に失敗");
            GatewayError::Internal("ダウンロード後のロック更新に失敗しました".to_string())
        })?;
        tracing::info!(who, "ロックを設定しました");

        Ok(CheckedOutArtifact { filename, content })
    }

    /// ファイルを保存して追跡ファイル名を更新し、ロックを解放する。
    ///
    /// パスワード認証は `authorize` で済ませておくこと。
    ///
    /// 1. ファイル名が空なら拒否
    /// 2. ロックが `unlocked` なら拒否（ダウンロード可能なファイルを上書きしない）
    /// 3. バケットへ保存
    /// 4. 追跡ファイル名を更新（失敗時は `Critical`、ロックは変更しない）
    /// 5. ロックを `unlocked` に戻す（失敗してもリクエストは成功扱い）
    ///
    /// 成功時はアップロード完了メッセージを返す。
    pub async fn checkin(
        &self,
        _authorized: &Authorized,
        who: &str,
        filename: &str,
        content: Bytes,
    ) -> Result<String, GatewayError> {
        tracing::info!(who, filename, size = content.len(), "アップロード要求を受信");
        if filename.is_empty() {
            return Err(GatewayError::BadRequest(
                "ファイル名を空にすることはできません".to_string(),
            ));
        }

        let lock = self.ledger.lock().await.map_err(parameter_failure)?;
        if lock.is_unlocked() {
            tracing::warn!(who, "ロックが unlocked のためアップロードを拒否");
            return Err(GatewayError::Conflict(
                "ロックが 'unlocked' です。ダウンロード可能なファイルが既に存在するため上書きできません"
                    .to_string(),
            ));
        }
        tracing::info!(who, lock = %lock, "ロック中のためアップロードを続行");

        self.artifacts.store(filename, &content).await.map_err(|e| {
            tracing::error!(filename, error = %e, "バケットへのアップロードに失敗");
            GatewayError::Transfer(format!("'{filename}' のアップロードに失敗しました"))
        })?;
        tracing::info!(filename, "バケットへのアップロード完了");

        self.ledger
            .set_tracked_filename(filename)
            .await
            .map_err(|e| {
                // バケットには書き込み済みだが追跡されていない。手動での整合が必要。
                tracing::error!(
                    filename,
                    error = %e,
                    "CRITICAL: アップロード後の追跡ファイル名の更新に失敗"
                );
                GatewayError::Critical(
                    "ファイルはアップロードされましたが追跡パラメータの更新に失敗しました"
                        .to_string(),
                )
            })?;
        tracing::info!(filename, "追跡ファイル名を更新しました");

        match self.ledger.release_lock().await {
            Ok(()) => tracing::info!("ロックを unlocked に戻しました"),
            Err(e) => tracing::error!(error = %e, "アップロード後のロック解放に失敗"),
        }

        Ok(format!("ファイル '{filename}' を '{who}' がアップロードしました"))
    }
}

fn parameter_failure(e: ParameterError) -> GatewayError {
    GatewayError::Internal(e.to_string())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::ledger::test_keys;
    use crate::parameter::MemoryParameterStore;
    use crate::storage::MemoryArtifactStorage;

    pub(crate) const PASSWORD: &str = "hunter2";

    /// 指定キーへの書き込みだけが失敗するパラメータストア
    pub(crate) struct FailingPuts {
        pub inner: Arc<MemoryParameterStore>,
        pub failing_key: String,
    }

    #[async_trait::async_trait]
    impl ParameterStore for FailingPuts {
        async fn get(
            &self,
            name: &str,
            with_decryption: bool,
        ) -> Result<Option<String>, ParameterError> {
            self.inner.get(name, with_decryption).await
        }

        async fn put(&self, name: &str, value: &str) -> Result<(), ParameterError> {
            if name == self.failing_key {
                return Err(ParameterError::backend(name, "injected failure"));
            }
            self.inner.put(name, value).await
        }
    }

    /// 全操作が失敗するストレージ
    struct BrokenStorage;

    #[async_trait::async_trait]
    impl ArtifactStorage for BrokenStorage {
        async fn fetch_to(
            &self,
            _key: &str,
            _dest: &std::path::Path,
        ) -> Result<u64, StorageError> {
            Err(StorageError::Backend("access denied".to_string()))
        }

        async fn store(&self, _key: &str, _content: &[u8]) -> Result<(), StorageError> {
            Err(StorageError::Backend("access denied".to_string()))
        }
    }

    /// ロック値・追跡ファイル名・パスワードを投入したパラメータストアを作る
    pub(crate) fn seeded_parameters(
        lock: Option<&str>,
        filename: Option<&str>,
    ) -> Arc<MemoryParameterStore> {
        let keys = test_keys();
        let mut entries = vec![(keys.password, PASSWORD.to_string())];
        if let Some(lock) = lock {
            entries.push((keys.lock, lock.to_string()));
        }
        if let Some(filename) = filename {
            entries.push((keys.filename, filename.to_string()));
        }
        Arc::new(MemoryParameterStore::with_entries(entries))
    }

    async fn stored(params: &MemoryParameterStore, key: &str) -> Option<String> {
        params.get(key, false).await.unwrap()
    }

    /// 正しいパスワードで認証してからチェックインする
    async fn checkin_as(
        exchange: &Exchange,
        who: &str,
        filename: &str,
        content: Bytes,
    ) -> Result<String, GatewayError> {
        let authorized = exchange.authorize(PASSWORD).await?;
        exchange.checkin(&authorized, who, filename, content).await
    }

    fn exchange(
        params: Arc<MemoryParameterStore>,
        artifacts: Arc<MemoryArtifactStorage>,
    ) -> Exchange {
        Exchange::new(params, artifacts, test_keys())
    }

    /// ダウンロード → アップロードのシナリオ全体
    #[tokio::test]
    async fn test_checkout_then_checkin() {
        let keys = test_keys();
        let params = seeded_parameters(Some("unlocked"), Some("report.csv"));
        let artifacts = Arc::new(MemoryArtifactStorage::with_objects([(
            "report.csv",
            b"a,b,c".to_vec(),
        )]));
        let exchange = exchange(params.clone(), artifacts.clone());

        let artifact = exchange.checkout("alice", PASSWORD).await.unwrap();
        assert_eq!(artifact.filename, "report.csv");
        assert_eq!(artifact.content, b"a,b,c");
        assert_eq!(stored(&params, &keys.lock).await.as_deref(), Some("alice"));

        let message = checkin_as(&exchange, "bob", "report.csv", Bytes::from_static(b"x,y,z"))
            .await
            .unwrap();
        assert!(message.contains("report.csv"));
        assert!(message.contains("bob"));
        assert_eq!(
            stored(&params, &keys.filename).await.as_deref(),
            Some("report.csv")
        );
        assert_eq!(stored(&params, &keys.lock).await.as_deref(), Some("unlocked"));
        assert_eq!(artifacts.object("report.csv").await.unwrap(), b"x,y,z");
    }

    /// ダウンロード後、アップロード前の再ダウンロードは保持者名付きで拒否される
    #[tokio::test]
    async fn test_second_checkout_names_holder() {
        let params = seeded_parameters(Some("unlocked"), Some("report.csv"));
        let artifacts = Arc::new(MemoryArtifactStorage::with_objects([(
            "report.csv",
            b"a,b,c".to_vec(),
        )]));
        let exchange = exchange(params.clone(), artifacts);

        exchange.checkout("alice", PASSWORD).await.unwrap();
        let err = exchange.checkout("carol", PASSWORD).await.unwrap_err();
        match err {
            GatewayError::Conflict(message) => assert!(message.contains("alice")),
            other => panic!("Conflictを期待: {other:?}"),
        }
        assert_eq!(
            stored(&params, &test_keys().lock).await.as_deref(),
            Some("alice")
        );
    }

    /// unlocked中のアップロードは拒否され、何も変更しない
    #[tokio::test]
    async fn test_checkin_while_unlocked_is_conflict() {
        let keys = test_keys();
        let params = seeded_parameters(Some("unlocked"), Some("report.csv"));
        let artifacts = Arc::new(MemoryArtifactStorage::with_objects([(
            "report.csv",
            b"a,b,c".to_vec(),
        )]));
        let exchange = exchange(params.clone(), artifacts.clone());

        let err = checkin_as(&exchange, "bob", "other.csv", Bytes::from_static(b"x,y,z"))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Conflict(_)));
        assert_eq!(
            stored(&params, &keys.filename).await.as_deref(),
            Some("report.csv")
        );
        assert_eq!(stored(&params, &keys.lock).await.as_deref(), Some("unlocked"));
        assert_eq!(artifacts.len().await, 1);
        assert!(artifacts.object("other.csv").await.is_none());
    }

    /// アップロードした内容がそのままダウンロードできる
    #[tokio::test]
    async fn test_checkin_then_checkout_roundtrip() {
        let params = seeded_parameters(Some("alice"), Some("init"));
        let artifacts = Arc::new(MemoryArtifactStorage::new());
        let exchange = exchange(params, artifacts);

        let content = Bytes::from_static(b"\x00\x01binary\xff");
        checkin_as(&exchange, "alice", "save.bin", content.clone())
            .await
            .unwrap();

        let artifact = exchange.checkout("bob", PASSWORD).await.unwrap();
        assert_eq!(artifact.filename, "save.bin");
        assert_eq!(artifact.content, content.to_vec());
    }

    /// 追跡ファイル名が未設定・初期値の場合はNotFoundでロックを変更しない
    #[tokio::test]
    async fn test_checkout_without_tracked_filename() {
        for filename in [None, Some("init"), Some("")] {
            let params = seeded_parameters(Some("unlocked"), filename);
            let exchange = exchange(params.clone(), Arc::new(MemoryArtifactStorage::new()));

            let err = exchange.checkout("alice", PASSWORD).await.unwrap_err();
            assert!(matches!(err, GatewayError::NotFound(_)), "{filename:?}");
            assert_eq!(
                stored(&params, &test_keys().lock).await.as_deref(),
                Some("unlocked")
            );
        }
    }

    /// 追跡ファイル名はあるがバケットに存在しない（不整合）場合
    #[tokio::test]
    async fn test_checkout_missing_blob() {
        let params = seeded_parameters(Some("unlocked"), Some("report.csv"));
        let exchange = exchange(params.clone(), Arc::new(MemoryArtifactStorage::new()));

        let err = exchange.checkout("alice", PASSWORD).await.unwrap_err();
        match err {
            GatewayError::NotFound(message) => assert!(message.contains("report.csv")),
            other => panic!("NotFoundを期待: {other:?}"),
        }
        assert_eq!(
            stored(&params, &test_keys().lock).await.as_deref(),
            Some("unlocked")
        );
    }

    /// ロックのパラメータが存在しない場合はダウンロード不可・アップロード可
    #[tokio::test]
    async fn test_missing_lock_is_locked_by_unknown() {
        let keys = test_keys();
        let params = seeded_parameters(None, Some("report.csv"));
        let artifacts = Arc::new(MemoryArtifactStorage::with_objects([(
            "report.csv",
            b"a,b,c".to_vec(),
        )]));
        let exchange = exchange(params.clone(), artifacts);

        let err = exchange.checkout("alice", PASSWORD).await.unwrap_err();
        match err {
            GatewayError::Conflict(message) => assert!(message.contains("不明")),
            other => panic!("Conflictを期待: {other:?}"),
        }
        assert_eq!(stored(&params, &keys.lock).await, None);

        checkin_as(&exchange, "alice", "new.csv", Bytes::from_static(b"1"))
            .await
            .unwrap();
        assert_eq!(stored(&params, &keys.lock).await.as_deref(), Some("unlocked"));
        assert_eq!(stored(&params, &keys.filename).await.as_deref(), Some("new.csv"));
    }

    /// パスワード不一致はロック状態に関係なく拒否され、何も変更しない
    #[tokio::test]
    async fn test_wrong_password_never_mutates() {
        let keys = test_keys();
        for lock in ["unlocked", "alice"] {
            let params = seeded_parameters(Some(lock), Some("report.csv"));
            let artifacts = Arc::new(MemoryArtifactStorage::with_objects([(
                "report.csv",
                b"a,b,c".to_vec(),
            )]));
            let exchange = exchange(params.clone(), artifacts.clone());

            let err = exchange.checkout("mallory", "wrong").await.unwrap_err();
            assert!(matches!(err, GatewayError::Unauthorized));

            let err = exchange.authorize("wrong").await.unwrap_err();
            assert!(matches!(err, GatewayError::Unauthorized));

            assert_eq!(stored(&params, &keys.lock).await.as_deref(), Some(lock));
            assert_eq!(
                stored(&params, &keys.filename).await.as_deref(),
                Some("report.csv")
            );
            assert_eq!(artifacts.object("report.csv").await.unwrap(), b"a,b,c");
            assert_eq!(artifacts.len().await, 1);
        }
    }

    #[tokio::test]
    async fn test_checkin_empty_filename() {
        let params = seeded_parameters(Some("alice"), Some("report.csv"));
        let artifacts = Arc::new(MemoryArtifactStorage::new());
        let exchange = exchange(params, artifacts.clone());

        let err = checkin_as(&exchange, "alice", "", Bytes::from_static(b"x"))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::BadRequest(_)));
        assert_eq!(artifacts.len().await, 0);
    }

    /// バケット書き込み成功後に追跡ファイル名の更新が失敗した場合はCritical。
    /// ロックはunlockedに戻さない。
    #[tokio::test]
    async fn test_checkin_tracking_failure_is_critical() {
        let keys = test_keys();
        let inner = seeded_parameters(Some("alice"), Some("report.csv"));
        let params = Arc::new(FailingPuts {
            inner: inner.clone(),
            failing_key: keys.filename.clone(),
        });
        let artifacts = Arc::new(MemoryArtifactStorage::new());
        let exchange = Exchange::new(params, artifacts.clone(), keys.clone());

        let err = checkin_as(&exchange, "alice", "next.csv", Bytes::from_static(b"x,y,z"))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Critical(_)));

        // バケットには書き込まれているが追跡されていない
        assert_eq!(artifacts.object("next.csv").await.unwrap(), b"x,y,z");
        assert_eq!(
            stored(&inner, &keys.filename).await.as_deref(),
            Some("report.csv")
        );
        assert_eq!(stored(&inner, &keys.lock).await.as_deref(), Some("alice"));
    }

    /// ロック解放の失敗はリクエストを失敗させない
    #[tokio::test]
    async fn test_checkin_lock_release_is_best_effort() {
        let keys = test_keys();
        let inner = seeded_parameters(Some("alice"), Some("report.csv"));
        let params = Arc::new(FailingPuts {
            inner: inner.clone(),
            failing_key: keys.lock.clone(),
        });
        let exchange = Exchange::new(params, Arc::new(MemoryArtifactStorage::new()), keys.clone());

        checkin_as(&exchange, "alice", "next.csv", Bytes::from_static(b"x"))
            .await
            .unwrap();
        assert_eq!(stored(&inner, &keys.filename).await.as_deref(), Some("next.csv"));
        assert_eq!(stored(&inner, &keys.lock).await.as_deref(), Some("alice"));
    }

    /// ダウンロード後のロック更新失敗は内容を返さずInternal
    #[tokio::test]
    async fn test_checkout_lock_failure_is_internal() {
        let keys = test_keys();
        let inner = seeded_parameters(Some("unlocked"), Some("report.csv"));
        let params = Arc::new(FailingPuts {
            inner: inner.clone(),
            failing_key: keys.lock.clone(),
        });
        let artifacts = Arc::new(MemoryArtifactStorage::with_objects([(
            "report.csv",
            b"a,b,c".to_vec(),
        )]));
        let exchange = Exchange::new(params, artifacts, keys.clone());

        let err = exchange.checkout("alice", PASSWORD).await.unwrap_err();
        assert!(matches!(err, GatewayError::Internal(_)));
        assert_eq!(stored(&inner, &keys.lock).await.as_deref(), Some("unlocked"));
    }

    /// バケット障害はTransfer。状態は変更しない。
    #[tokio::test]
    async fn test_storage_failure_is_transfer() {
        let keys = test_keys();
        let params = seeded_parameters(Some("unlocked"), Some("report.csv"));
        let exchange = Exchange::new(params.clone(), Arc::new(BrokenStorage), keys.clone());
        let err = exchange.checkout("alice", PASSWORD).await.unwrap_err();
        assert!(matches!(err, GatewayError::Transfer(_)));
        assert_eq!(stored(&params, &keys.lock).await.as_deref(), Some("unlocked"));

        params.put(&keys.lock, "alice").await.unwrap();
        let err = checkin_as(&exchange, "alice", "next.csv", Bytes::from_static(b"x"))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Transfer(_)));
        assert_eq!(
            stored(&params, &keys.filename).await.as_deref(),
            Some("report.csv")
        );
        assert_eq!(stored(&params, &keys.lock).await.as_deref(), Some("alice"));
    }

    /// 最初の2回のロック読み取りを揃えて返すパラメータストア
    struct LockstepLockReads {
        inner: Arc<MemoryParameterStore>,
        lock_key: String,
        reads: std::sync::atomic::AtomicUsize,
        barrier: tokio::sync::Barrier,
    }

    #[async_trait::async_trait]
    impl ParameterStore for LockstepLockReads {
        async fn get(
            &self,
            name: &str,
            with_decryption: bool,
        ) -> Result<Option<String>, ParameterError> {
            let value = self.inner.get(name, with_decryption).await?;
            if name == self.lock_key
                && self.reads.fetch_add(1, std::sync::atomic::Ordering::SeqCst) < 2
            {
                self.barrier.wait().await;
            }
            Ok(value)
        }

        async fn put(&self, name: &str, value: &str) -> Result<(), ParameterError> {
            self.inner.put(name, value).await
        }
    }

    /// ロックは条件付き書き込みではない。同時に `unlocked` を読んだ2件の
    /// ダウンロードはどちらも成功し、後から書いた名前が残る。
    #[tokio::test]
    async fn test_concurrent_checkouts_both_succeed() {
        let keys = test_keys();
        let inner = seeded_parameters(Some("unlocked"), Some("report.csv"));
        let params = Arc::new(LockstepLockReads {
            inner: inner.clone(),
            lock_key: keys.lock.clone(),
            reads: std::sync::atomic::AtomicUsize::new(0),
            barrier: tokio::sync::Barrier::new(2),
        });
        let artifacts = Arc::new(MemoryArtifactStorage::with_objects([(
            "report.csv",
            b"a,b,c".to_vec(),
        )]));
        let exchange = Exchange::new(params, artifacts, keys.clone());

        let (alice, bob) = tokio::join!(
            exchange.checkout("alice", PASSWORD),
            exchange.checkout("bob", PASSWORD)
        );
        assert_eq!(alice.unwrap().content, b"a,b,c");
        assert_eq!(bob.unwrap().content, b"a,b,c");

        let holder = stored(&inner, &keys.lock).await;
        assert!(matches!(holder.as_deref(), Some("alice") | Some("bob")));

        // 以降のダウンロードはロック保持者名で拒否される
        let err = exchange.checkout("carol", PASSWORD).await.unwrap_err();
        assert!(matches!(err, GatewayError::Conflict(_)));
    }
}
