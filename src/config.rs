//! Configuration handling for frollo-sync.
//!
//! Tuning lives in `$FROLLO_SYNC_HOME/config.json`, which is optional. Credentials are never
//! written to disk: they arrive through the command line or the environment and are carried by
//! `FrolloLogin` and the PocketSmith developer key for the lifetime of one run.

use crate::db::Db;
use crate::{utils, Result};
use anyhow::{bail, ensure, Context};
use serde::{Deserialize, Serialize};
use std::fmt::{Debug, Formatter};
use std::path::{Path, PathBuf};
use tracing::debug;

const APP_NAME: &str = "frollo-sync";
const CONFIG_VERSION: u8 = 1;
const CONFIG_JSON: &str = "config.json";
const STATE_SQLITE: &str = "state.sqlite";

const FROLLO_API_URL: &str = "https://api.frollo.us/api/v2/";
const FROLLO_AUTH_URL: &str = "https://id.frollo.us/oauth/token";
const POCKETSMITH_API_URL: &str = "https://api.pocketsmith.com/v2/";

/// The `Config` object represents the home directory of the app. You instantiate it by providing
/// the path to `$FROLLO_SYNC_HOME` and from there it loads `config.json` (if present) and opens
/// the state store.
#[derive(Debug, Clone)]
pub struct Config {
    root: PathBuf,
    config_path: PathBuf,
    sqlite_path: PathBuf,
    config_file: ConfigFile,
    db: Db,
}

impl Config {
    /// Creates the home directory, writes a default `config.json` and creates the state store.
    ///
    /// # Errors
    /// - Returns an error if `config.json` already exists or if any file operation fails.
    pub async fn create(dir: impl Into<PathBuf>) -> Result<Self> {
        let maybe_relative = dir.into();
        utils::make_dir(&maybe_relative)
            .await
            .context("Unable to create the frollo-sync home directory")?;
        let root = utils::canonicalize(&maybe_relative).await?;

        let config_path = root.join(CONFIG_JSON);
        if config_path.exists() {
            bail!(
                "A config file already exists at '{}', remove it first if you want to start over",
                config_path.display()
            );
        }
        let config_file = ConfigFile::default();
        config_file.save(&config_path).await?;

        Self::open(root, config_path, config_file).await
    }

    /// Loads the home directory, creating it if needed. A missing `config.json` means defaults.
    pub async fn load(home: impl Into<PathBuf>) -> Result<Self> {
        let maybe_relative = home.into();
        utils::make_dir(&maybe_relative)
            .await
            .context("Unable to create the frollo-sync home directory")?;
        let root = utils::canonicalize(&maybe_relative).await?;

        let config_path = root.join(CONFIG_JSON);
        let config_file = if config_path.is_file() {
            ConfigFile::load(&config_path).await?
        } else {
            debug!(
                "No config file at {}, using default settings",
                config_path.display()
            );
            ConfigFile::default()
        };

        Self::open(root, config_path, config_file).await
    }

    async fn open(root: PathBuf, config_path: PathBuf, config_file: ConfigFile) -> Result<Self> {
        let sqlite_path = root.join(STATE_SQLITE);
        let db = Db::open(&sqlite_path)
            .await
            .context("Unable to open the state store")?;
        Ok(Self {
            root,
            config_path,
            sqlite_path,
            config_file,
            db,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn sqlite_path(&self) -> &Path {
        &self.sqlite_path
    }

    pub(crate) fn db(&self) -> &Db {
        &self.db
    }

    pub fn frollo_api_url(&self) -> &str {
        &self.config_file.frollo_api_url
    }

    pub fn frollo_auth_url(&self) -> &str {
        &self.config_file.frollo_auth_url
    }

    pub fn pocketsmith_api_url(&self) -> &str {
        &self.config_file.pocketsmith_api_url
    }

    pub fn window_months(&self) -> u32 {
        self.config_file.window_months
    }

    pub fn step_months(&self) -> u32 {
        self.config_file.step_months
    }

    pub fn page_size(&self) -> u32 {
        self.config_file.page_size
    }

    pub fn match_threshold(&self) -> u32 {
        self.config_file.match_threshold
    }

    pub fn concurrency(&self) -> usize {
        self.config_file.concurrency
    }

    pub fn use_watermark(&self) -> bool {
        self.config_file.use_watermark
    }
}

/// Represents the serialization and deserialization format of the configuration file. Every
/// field except `app_name` may be omitted.
///
/// Example configuration:
/// ```json
/// {
///   "app_name": "frollo-sync",
///   "config_version": 1,
///   "window_months": 12,
///   "step_months": 6,
///   "page_size": 150,
///   "match_threshold": 10,
///   "concurrency": 1,
///   "use_watermark": false
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
#[serde(default)]
struct ConfigFile {
    /// Should always be "frollo-sync"
    app_name: String,

    config_version: u8,

    /// The width of each transaction query window, in months.
    window_months: u32,

    /// How far the window end moves back after each non-empty window, in months.
    step_months: u32,

    /// The `size` sent with each transaction query. A window holding more transactions than this
    /// is truncated by Frollo.
    page_size: u32,

    /// The importer stops once more than this many consecutive transactions already exist.
    match_threshold: u32,

    /// How many accounts are synced at the same time.
    concurrency: usize,

    /// Stop fetching and probing at the newest transaction known to exist at the destination.
    use_watermark: bool,

    frollo_api_url: String,
    frollo_auth_url: String,
    pocketsmith_api_url: String,
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            app_name: APP_NAME.to_string(),
            config_version: CONFIG_VERSION,
            window_months: 12,
            step_months: 6,
            page_size: 150,
            match_threshold: 10,
            concurrency: 1,
            use_watermark: false,
            frollo_api_url: FROLLO_API_URL.to_string(),
            frollo_auth_url: FROLLO_AUTH_URL.to_string(),
            pocketsmith_api_url: POCKETSMITH_API_URL.to_string(),
        }
    }
}

impl ConfigFile {
    async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let config: ConfigFile = utils::deserialize(path).await?;
        config
            .validate()
            .with_context(|| format!("Invalid config file at {}", path.display()))?;
        Ok(config)
    }

    async fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let data = serde_json::to_string_pretty(self).context("Unable to serialize config")?;
        utils::write(path, data)
            .await
            .context("Unable to write config file")
    }

    fn validate(&self) -> Result<()> {
        ensure!(
            self.app_name == APP_NAME,
            "Invalid app_name: expected '{APP_NAME}', got '{}'",
            self.app_name
        );
        ensure!(self.window_months >= 1, "window_months must be at least 1");
        ensure!(self.step_months >= 1, "step_months must be at least 1");
        ensure!(
            self.step_months <= self.window_months,
            "step_months ({}) cannot be larger than window_months ({}), the windows would leave \
            gaps",
            self.step_months,
            self.window_months
        );
        ensure!(self.page_size >= 1, "page_size must be at least 1");
        ensure!(self.concurrency >= 1, "concurrency must be at least 1");
        Ok(())
    }
}

/// The Frollo username and password. The password never shows up in `Debug` output.
#[derive(Clone)]
pub struct FrolloLogin {
    username: String,
    password: String,
}

impl FrolloLogin {
    pub fn new(username: Option<String>, password: Option<String>) -> Result<Self> {
        Ok(Self {
            username: require(username, "--username", "FROLLO_USERNAME")?,
            password: require(password, "--password", "FROLLO_PASSWORD")?,
        })
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn password(&self) -> &str {
        &self.password
    }
}

impl Debug for FrolloLogin {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrolloLogin")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Returns the value or an error naming both ways of providing it.
pub fn require(value: Option<String>, flag: &str, env: &str) -> Result<String> {
    match value {
        Some(value) if !value.trim().is_empty() => Ok(value),
        _ => bail!("Missing required configuration: provide {flag} or set {env}"),
    }
}

/// Parses a comma-separated list of Frollo account ids. Whitespace is trimmed and empty entries
/// are ignored.
pub fn parse_account_ids(value: &str) -> Result<Vec<u64>> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<u64>()
                .with_context(|| format!("'{s}' is not a valid account id"))
        })
        .collect()
}
