use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use asb_core::{
    config::Config,
    errors::Error,
    handler::BotHandler,
    refresh::{HttpSettingsSource, SettingsRefresher},
    settings::{SettingsStore, YamlFileBackend},
    sync::{SyncConfig, SyncLoop},
};
use asb_matrix::MatrixClient;

#[tokio::main]
async fn main() -> Result<(), Error> {
    asb_core::logging::init("asb")?;

    let cfg = Config::load()?;
    let store = Arc::new(SettingsStore::open(Arc::new(YamlFileBackend::new(
        cfg.settings_path.clone(),
    )))?);

    let matrix = Arc::new(MatrixClient::new(
        &cfg.homeserver_url,
        cfg.access_token.clone(),
        cfg.request_timeout,
    )?);

    // The bot must know who it is, or it would classify its own notices.
    let configured = store.get().await.bot_user;
    let me = match (matrix.whoami().await, configured) {
        (Ok(me), _) => {
            store.adopt_bot_identity(me.clone()).await;
            me
        }
        (Err(e), Some(me)) => {
            tracing::warn!(error = %e, user = %me, "whoami failed, using configured botuser");
            me
        }
        (Err(e), None) => {
            return Err(Error::Config(format!(
                "cannot determine bot identity: whoami failed ({e}) and no botuser is configured"
            )));
        }
    };
    tracing::info!(user = %me, homeserver = %cfg.homeserver_url, "asb started");

    let cancel = CancellationToken::new();

    let export_store = store.clone();
    let export_addr = cfg.export_addr;
    tokio::spawn(async move {
        if let Err(e) = asb_http::serve(export_addr, export_store).await {
            tracing::error!(error = %e, "settings export stopped");
        }
    });

    let refresher = SettingsRefresher::new(
        store.clone(),
        Arc::new(HttpSettingsSource::new(cfg.request_timeout)?),
        cfg.refresh_interval,
    );
    tokio::spawn(refresher.run(cancel.clone()));

    let handler = Arc::new(BotHandler::new(matrix.clone(), store.clone(), me));
    let sync_loop = SyncLoop::new(
        matrix,
        handler,
        SyncConfig {
            wait: cfg.sync_timeout,
            backoff: cfg.sync_backoff,
        },
    );
    let sync_task = tokio::spawn(sync_loop.run(cancel.clone()));

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");
    cancel.cancel();
    // An in-flight long-poll is not interrupted; leave it to process exit.
    sync_task.abort();

    Ok(())
}
