//! Runtime settings: the single owned store every component reads through.
//!
//! Reads get a consistent snapshot; mutations are serialized behind one
//! write lock and applied all-or-nothing.

use std::{
    collections::BTreeSet,
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use serde::{Deserialize, Deserializer, Serialize};
use tokio::sync::{Mutex, RwLock};

use crate::{domain::Identity, errors::Error, Result};

/// Allow-list a fresh install starts from.
pub const DEFAULT_URL_WHITELIST: &[&str] = &[
    "github.com",
    "reddit.com",
    "etherscan.io",
    "myetherwallet.com",
    "0xproject.com",
    "numer.ai",
    "twitter.com",
    "slack.com",
    "medium.com",
    "ethplorer.io",
    "metamask.io",
    "steemit.com",
    "youtube.com",
    "hackingdistributed.com",
    "ens.domains",
    "bittrex.com",
    "consensys.net",
    "forbes.com",
    "coinmarketcap.com",
    "liqui.io",
    "hitbtc.com",
];

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    #[serde(deserialize_with = "nullable")]
    pub admins: BTreeSet<Identity>,
    #[serde(deserialize_with = "nullable")]
    pub mods: BTreeSet<Identity>,
    #[serde(rename = "botuser", skip_serializing_if = "Option::is_none")]
    pub bot_user: Option<Identity>,
    /// Ordered, duplicate-free (case-insensitively) list of domains.
    #[serde(deserialize_with = "nullable")]
    pub url_whitelist: Vec<String>,
    pub check_wallet_address: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_settings_url: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            admins: BTreeSet::new(),
            mods: BTreeSet::new(),
            bot_user: None,
            url_whitelist: Vec::new(),
            check_wallet_address: true,
            remote_settings_url: None,
        }
    }
}

impl Settings {
    pub fn with_default_whitelist() -> Self {
        Self {
            url_whitelist: DEFAULT_URL_WHITELIST.iter().map(|d| d.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn is_admin(&self, who: &Identity) -> bool {
        self.admins.contains(who)
    }

    pub fn is_mod(&self, who: &Identity) -> bool {
        self.mods.contains(who)
    }

    pub fn is_bot(&self, who: &Identity) -> bool {
        self.bot_user.as_ref() == Some(who)
    }

    /// Admins are implicitly authorized for every mod-level action.
    pub fn can_moderate(&self, who: &Identity) -> bool {
        self.is_admin(who) || self.is_mod(who)
    }

    /// Senders that bypass classification entirely.
    pub fn is_trusted(&self, who: &Identity) -> bool {
        self.is_bot(who) || self.can_moderate(who)
    }

    /// Index of `domain` in the allow-list, compared case-insensitively.
    pub fn whitelist_position(&self, domain: &str) -> Option<usize> {
        self.url_whitelist
            .iter()
            .position(|d| d.eq_ignore_ascii_case(domain))
    }

    pub fn is_whitelisted(&self, domain: &str) -> bool {
        self.whitelist_position(domain).is_some()
    }

    /// Per-field overwrite: every `Some` in the patch replaces the field.
    pub fn apply(&mut self, patch: SettingsPatch) {
        if let Some(admins) = patch.admins {
            self.admins = admins;
        }
        if let Some(mods) = patch.mods {
            self.mods = mods;
        }
        if let Some(whitelist) = patch.url_whitelist {
            self.url_whitelist = dedup_domains(whitelist);
        }
        if let Some(check) = patch.check_wallet_address {
            self.check_wallet_address = check;
        }
    }

    /// Fully-populated patch, as served to other instances.
    pub fn export(&self) -> SettingsPatch {
        SettingsPatch {
            admins: Some(self.admins.clone()),
            mods: Some(self.mods.clone()),
            url_whitelist: Some(self.url_whitelist.clone()),
            check_wallet_address: Some(self.check_wallet_address),
        }
    }
}

/// Structured partial update.
///
/// `remote_settings_url` and `botuser` are not mergeable: a remote document
/// never redirects the refresher nor renames this bot.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingsPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admins: Option<BTreeSet<Identity>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mods: Option<BTreeSet<Identity>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url_whitelist: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check_wallet_address: Option<bool>,
}

impl SettingsPatch {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

fn nullable<'de, D, T>(d: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(d)?.unwrap_or_default())
}

fn dedup_domains(domains: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(domains.len());
    for d in domains {
        if !out.iter().any(|seen| seen.eq_ignore_ascii_case(&d)) {
            out.push(d);
        }
    }
    out
}

// ============== Durable backends ==============

/// Where the settings document is durably kept.
pub trait SettingsBackend: Send + Sync {
    /// `Ok(None)` when no document exists yet.
    fn load(&self) -> Result<Option<Settings>>;
    fn save(&self, settings: &Settings) -> Result<()>;
}

/// YAML document on local disk.
#[derive(Clone, Debug)]
pub struct YamlFileBackend {
    path: PathBuf,
}

impl YamlFileBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persistence_error(&self, reason: impl ToString) -> Error {
        Error::Persistence {
            path: self.path.clone(),
            reason: reason.to_string(),
        }
    }
}

impl SettingsBackend for YamlFileBackend {
    fn load(&self) -> Result<Option<Settings>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let txt = fs::read_to_string(&self.path)?;
        if txt.trim().is_empty() {
            return Ok(None);
        }
        serde_yaml::from_str(&txt)
            .map(Some)
            .map_err(|e| self.persistence_error(e))
    }

    fn save(&self, settings: &Settings) -> Result<()> {
        let txt = serde_yaml::to_string(settings).map_err(|e| self.persistence_error(e))?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| self.persistence_error(e))?;
        }

        // Write-then-rename so a crash never leaves a truncated document.
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        fs::write(&tmp, txt).map_err(|e| self.persistence_error(e))?;
        fs::rename(&tmp, &self.path).map_err(|e| self.persistence_error(e))?;
        Ok(())
    }
}

/// Backend for stores that never touch disk.
#[derive(Debug, Default)]
struct NoopBackend;

impl SettingsBackend for NoopBackend {
    fn load(&self) -> Result<Option<Settings>> {
        Ok(None)
    }

    fn save(&self, _settings: &Settings) -> Result<()> {
        Ok(())
    }
}

// ============== Store ==============

/// Two views of the settings.
///
/// `local` is the durable document: what was loaded plus command edits.
/// `live` is what every reader sees: `local` overlaid with remote merges
/// and the discovered bot identity. Only `local` is ever persisted.
struct StoreState {
    local: Settings,
    live: Settings,
}

pub struct SettingsStore {
    state: RwLock<StoreState>,
    backend: Arc<dyn SettingsBackend>,
    persist_lock: Mutex<()>,
}

impl SettingsStore {
    pub fn new(initial: Settings, backend: Arc<dyn SettingsBackend>) -> Self {
        Self {
            state: RwLock::new(StoreState {
                live: initial.clone(),
                local: initial,
            }),
            backend,
            persist_lock: Mutex::new(()),
        }
    }

    /// Load from `backend`, seeding the default allow-list on first run.
    pub fn open(backend: Arc<dyn SettingsBackend>) -> Result<Self> {
        let initial = match backend.load()? {
            Some(s) => s,
            None => {
                tracing::info!("no settings document yet, starting from defaults");
                Settings::with_default_whitelist()
            }
        };
        Ok(Self::new(initial, backend))
    }

    /// Store whose `persist` is a no-op.
    pub fn in_memory(initial: Settings) -> Self {
        Self::new(initial, Arc::new(NoopBackend))
    }

    /// Current live snapshot.
    pub async fn get(&self) -> Settings {
        self.state.read().await.live.clone()
    }

    /// Snapshot of the durable document.
    pub async fn local(&self) -> Settings {
        self.state.read().await.local.clone()
    }

    /// Overlay a remote patch on the live view. Returns whether anything changed.
    pub async fn merge(&self, patch: SettingsPatch) -> bool {
        if patch.is_empty() {
            return false;
        }
        let mut st = self.state.write().await;
        let before = st.live.clone();
        st.live.apply(patch);
        st.live != before
    }

    /// Fill in the bot identity when the document names none.
    ///
    /// Returns the identity the bot now runs as. The document wins over
    /// `discovered`, and `discovered` never reaches the durable document.
    pub async fn adopt_bot_identity(&self, discovered: Identity) -> Identity {
        let mut st = self.state.write().await;
        st.live.bot_user.get_or_insert(discovered).clone()
    }

    /// Read-modify-write under the write lock.
    ///
    /// The mutator runs on a copy of the live view; that copy is committed
    /// only when it returns `Ok`, so a failed command leaves no trace. The
    /// same edit is then replayed on a copy of the durable document, which
    /// keeps it only if the replay succeeds too.
    pub async fn update<T, E>(
        &self,
        mutator: impl Fn(&mut Settings) -> std::result::Result<T, E>,
    ) -> std::result::Result<T, E> {
        let mut st = self.state.write().await;
        let mut live = st.live.clone();
        let out = mutator(&mut live)?;
        let mut local = st.local.clone();
        if mutator(&mut local).is_ok() {
            st.local = local;
        }
        st.live = live;
        Ok(out)
    }

    /// Durably save the local document.
    ///
    /// Failures are logged here; the in-memory state stays authoritative.
    pub async fn persist(&self) -> Result<()> {
        let _guard = self.persist_lock.lock().await;
        let snapshot = self.local().await;
        match self.backend.save(&snapshot) {
            Ok(()) => {
                tracing::debug!("settings persisted");
                Ok(())
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to persist settings");
                Err(e)
            }
        }
    }
}
