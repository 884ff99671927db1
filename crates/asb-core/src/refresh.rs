//! Periodic merge of settings published by a peer instance.
//!
//! Failures are isolated: they are logged and the current settings stay as
//! they are. Nothing here ever blocks the sync loop.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::{
    errors::Error,
    settings::{SettingsPatch, SettingsStore},
    Result,
};

/// Where remote settings come from.
#[async_trait]
pub trait SettingsSource: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<SettingsPatch>;
}

/// Fetches the JSON settings export of another instance.
#[derive(Clone, Debug)]
pub struct HttpSettingsSource {
    http: reqwest::Client,
}

impl HttpSettingsSource {
    pub fn new(timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::External(format!("http client build failed: {e}")))?;
        Ok(Self { http })
    }
}

#[async_trait]
impl SettingsSource for HttpSettingsSource {
    async fn fetch(&self, url: &str) -> Result<SettingsPatch> {
        let resp = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| Error::External(format!("settings request error: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::External(format!(
                "settings request failed: {status} {}",
                body.chars().take(200).collect::<String>()
            )));
        }

        let txt = resp
            .text()
            .await
            .map_err(|e| Error::External(format!("settings read error: {e}")))?;
        Ok(serde_json::from_str(&txt)?)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RefreshOutcome {
    NotConfigured,
    Unchanged,
    Updated,
    Failed,
}

pub struct SettingsRefresher {
    store: Arc<SettingsStore>,
    source: Arc<dyn SettingsSource>,
    every: Duration,
}

impl SettingsRefresher {
    pub fn new(
        store: Arc<SettingsStore>,
        source: Arc<dyn SettingsSource>,
        every: Duration,
    ) -> Self {
        Self {
            store,
            source,
            every,
        }
    }

    /// Refresh immediately, then every interval, until `cancel` fires.
    pub async fn run(self, cancel: CancellationToken) {
        let mut ticker = interval(self.every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    self.refresh_once().await;
                }
            }
        }
        tracing::debug!("settings refresher stopped");
    }

    pub async fn refresh_once(&self) -> RefreshOutcome {
        let Some(url) = self.store.get().await.remote_settings_url else {
            tracing::debug!("no remote_settings_url configured, skipping refresh");
            return RefreshOutcome::NotConfigured;
        };

        tracing::debug!(url = %url, "updating settings");
        match self.source.fetch(&url).await {
            Ok(patch) => {
                if self.store.merge(patch).await {
                    tracing::info!(url = %url, "settings updated from remote");
                    RefreshOutcome::Updated
                } else {
                    RefreshOutcome::Unchanged
                }
            }
            Err(e) => {
                tracing::warn!(url = %url, error = %e, "failed to update settings");
                RefreshOutcome::Failed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{domain::Identity, settings::Settings};
    use std::sync::Mutex;

    #[derive(Default)]
    struct ScriptedSource {
        replies: Mutex<Vec<Result<SettingsPatch>>>,
        urls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl SettingsSource for ScriptedSource {
        async fn fetch(&self, url: &str) -> Result<SettingsPatch> {
            self.urls.lock().unwrap().push(url.to_string());
            self.replies
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| Err(Error::External("no reply scripted".into())))
        }
    }

    fn store_with_remote() -> Arc<SettingsStore> {
        let mut s = Settings::with_default_whitelist();
        s.remote_settings_url = Some("http://peer:7000/settings.json".into());
        s.admins.insert(Identity::new("@admin:x"));
        Arc::new(SettingsStore::in_memory(s))
    }

    #[tokio::test]
    async fn skipped_without_remote_url() {
        let store = Arc::new(SettingsStore::in_memory(Settings::default()));
        let source = Arc::new(ScriptedSource::default());
        let r = SettingsRefresher::new(store, source.clone(), Duration::from_secs(60));
        assert_eq!(r.refresh_once().await, RefreshOutcome::NotConfigured);
        assert!(source.urls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn failure_leaves_settings_untouched() {
        let store = store_with_remote();
        let before = store.get().await;
        let r = SettingsRefresher::new(
            store.clone(),
            Arc::new(ScriptedSource::default()),
            Duration::from_secs(60),
        );
        assert_eq!(r.refresh_once().await, RefreshOutcome::Failed);
        assert_eq!(store.get().await, before);
    }

    #[tokio::test]
    async fn success_merges_present_keys() {
        let store = store_with_remote();
        let source = Arc::new(ScriptedSource::default());
        source.replies.lock().unwrap().push(Ok(SettingsPatch {
            url_whitelist: Some(vec!["only.org".into()]),
            ..SettingsPatch::default()
        }));

        let r = SettingsRefresher::new(store.clone(), source.clone(), Duration::from_secs(60));
        assert_eq!(r.refresh_once().await, RefreshOutcome::Updated);

        let s = store.get().await;
        assert_eq!(s.url_whitelist, vec!["only.org"]);
        assert!(s.is_admin(&Identity::new("@admin:x")));
        assert_eq!(
            source.urls.lock().unwrap().clone(),
            vec!["http://peer:7000/settings.json"]
        );
    }

    #[tokio::test]
    async fn empty_remote_document_changes_nothing() {
        let store = store_with_remote();
        let source = Arc::new(ScriptedSource::default());
        source.replies.lock().unwrap().push(Ok(SettingsPatch::default()));
        let r = SettingsRefresher::new(store, source, Duration::from_secs(60));
        assert_eq!(r.refresh_once().await, RefreshOutcome::Unchanged);
    }

    #[tokio::test]
    async fn run_refreshes_immediately_and_stops_on_cancel() {
        let store = store_with_remote();
        let source = Arc::new(ScriptedSource::default());
        let r = SettingsRefresher::new(store, source.clone(), Duration::from_secs(3600));
        let cancel = CancellationToken::new();
        let task = tokio::spawn(r.run(cancel.clone()));

        for _ in 0..100 {
            if !source.urls.lock().unwrap().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        cancel.cancel();
        task.await.unwrap();
        assert_eq!(source.urls.lock().unwrap().len(), 1);
    }
}
