use std::{
    env, fs,
    net::SocketAddr,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::Deserialize;

use crate::{errors::Error, Result};

/// Typed startup configuration.
///
/// Runtime-mutable state (admins, allow-lists, ...) lives in the settings
/// document instead; see [`crate::settings`].
#[derive(Clone, Debug)]
pub struct Config {
    // Chat server
    pub homeserver_url: String,
    pub access_token: String,

    // Settings document
    pub settings_path: PathBuf,
    pub export_addr: SocketAddr,
    pub refresh_interval: Duration,

    // Sync loop
    pub sync_timeout: Duration,
    pub sync_backoff: Duration,
    pub request_timeout: Duration,
}

/// Private settings file (`config/privsettings.yaml`), holding secrets only.
#[derive(Debug, Default, Deserialize)]
struct PrivateSettings {
    token: Option<String>,
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));

        let private_path = env_path("ASB_PRIVATE_SETTINGS")
            .unwrap_or_else(|| PathBuf::from("config/privsettings.yaml"));
        let private = load_private_settings(&private_path)?;

        let access_token =
            resolve_access_token(env_str("ASB_ACCESS_TOKEN"), private, &private_path)?;

        let homeserver_url = env_str("ASB_HOMESERVER_URL")
            .and_then(non_empty)
            .unwrap_or_else(|| "http://localhost:8008/".to_string());

        let settings_path =
            env_path("ASB_SETTINGS_PATH").unwrap_or_else(|| PathBuf::from("settings.yaml"));

        let export_addr = match env_str("ASB_EXPORT_ADDR").and_then(non_empty) {
            Some(raw) => raw
                .trim()
                .parse::<SocketAddr>()
                .map_err(|e| Error::Config(format!("invalid ASB_EXPORT_ADDR {raw:?}: {e}")))?,
            None => SocketAddr::from(([127, 0, 0, 1], 7000)),
        };

        let refresh_interval =
            Duration::from_secs(env_u64("ASB_REFRESH_INTERVAL_SECS").unwrap_or(60).max(1));
        let sync_timeout = Duration::from_millis(env_u64("ASB_SYNC_TIMEOUT_MS").unwrap_or(30_000));
        let sync_backoff = Duration::from_millis(env_u64("ASB_SYNC_BACKOFF_MS").unwrap_or(5_000));
        let request_timeout =
            Duration::from_millis(env_u64("ASB_REQUEST_TIMEOUT_MS").unwrap_or(30_000));

        Ok(Self {
            homeserver_url,
            access_token,
            settings_path,
            export_addr,
            refresh_interval,
            sync_timeout,
            sync_backoff,
            request_timeout,
        })
    }
}

/// Env wins over the private settings file; blank values count as unset.
fn resolve_access_token(
    from_env: Option<String>,
    private: PrivateSettings,
    private_path: &Path,
) -> Result<String> {
    from_env
        .and_then(non_empty)
        .or_else(|| private.token.and_then(non_empty))
        .ok_or_else(|| {
            Error::Config(format!(
                "no access token: set ASB_ACCESS_TOKEN or `token` in {}",
                private_path.display()
            ))
        })
}

fn load_private_settings(path: &Path) -> Result<PrivateSettings> {
    let Ok(contents) = fs::read_to_string(path) else {
        return Ok(PrivateSettings::default());
    };
    if contents.trim().is_empty() {
        return Ok(PrivateSettings::default());
    }
    serde_yaml::from_str(&contents)
        .map_err(|e| Error::Config(format!("failed to parse {}: {e}", path.display())))
}

fn env_str(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }
        if env::var_os(key).is_some() {
            continue; // do not override existing env
        }

        env::set_var(key, unquote(v.trim()));
    }
}

fn unquote(val: &str) -> &str {
    if val.len() >= 2
        && ((val.starts_with('"') && val.ends_with('"'))
            || (val.starts_with('\'') && val.ends_with('\'')))
    {
        &val[1..val.len() - 1]
    } else {
        val
    }
}

fn env_u64(key: &str) -> Option<u64> {
    env_str(key).and_then(|s| s.trim().parse::<u64>().ok())
}

fn env_path(key: &str) -> Option<PathBuf> {
    env::var_os(key).map(PathBuf::from)
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}
