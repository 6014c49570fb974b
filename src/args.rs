//! These structs provide the CLI interface for the frollo-sync CLI.

use clap::{Parser, Subcommand};
use std::convert::Infallible;
use std::fmt::{Display, Formatter};
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::error;
use tracing_subscriber::filter::LevelFilter;

/// frollo-sync: Copies bank transactions and balances from Frollo into PocketSmith.
///
/// Frollo aggregates your bank accounts. PocketSmith is where you budget. This program reads the
/// accounts you name from Frollo, creates matching institutions and accounts in PocketSmith the
/// first time it sees them, imports the transactions PocketSmith does not have yet, and raises
/// the PocketSmith balance when it has fallen behind the bank.
///
/// Frollo is never written to. PocketSmith transactions are never edited or deleted.
#[derive(Debug, Parser, Clone)]
pub struct Args {
    #[clap(flatten)]
    common: Common,

    #[command(subcommand)]
    command: Command,
}

impl Args {
    pub fn new(common: Common, command: Command) -> Self {
        Self { common, command }
    }

    pub fn common(&self) -> &Common {
        &self.common
    }

    pub fn command(&self) -> &Command {
        &self.command
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Create the home directory with a default config.json and an empty state store.
    ///
    /// Running this is optional: every other command uses default settings when config.json is
    /// missing. Run it when you want a config.json to edit.
    Init,
    /// Sync the configured Frollo accounts into PocketSmith.
    Sync(SyncArgs),
    /// List the accounts Frollo knows about, so that you can find the ids to sync.
    Accounts(AccountsArgs),
}

/// Arguments common to all subcommands.
#[derive(Debug, Parser, Clone)]
pub struct Common {
    /// The logging verbosity. One of, from least to most verbose:
    /// off, error, warn, info, debug, trace
    ///
    /// This can be overridden by RUST_LOG.
    #[arg(long, default_value_t = LevelFilter::INFO)]
    log_level: LevelFilter,

    /// The directory where frollo-sync configuration and state are held. Defaults to
    /// ~/frollo-sync
    #[arg(long, env = "FROLLO_SYNC_HOME", default_value_t = default_home())]
    home: DisplayPath,
}

impl Common {
    pub fn new(log_level: LevelFilter, home: PathBuf) -> Self {
        Self {
            log_level,
            home: home.into(),
        }
    }

    pub fn log_level(&self) -> LevelFilter {
        self.log_level
    }

    pub fn home(&self) -> &DisplayPath {
        &self.home
    }
}

/// Frollo credentials, shared by every command that talks to Frollo.
#[derive(Debug, Parser, Clone, Default)]
pub struct FrolloArgs {
    /// Your Frollo login email.
    #[arg(long, env = "FROLLO_USERNAME")]
    username: Option<String>,

    /// Your Frollo password.
    #[arg(long, env = "FROLLO_PASSWORD", hide_env_values = true)]
    password: Option<String>,
}

impl FrolloArgs {
    pub fn new(username: Option<String>, password: Option<String>) -> Self {
        Self { username, password }
    }

    pub fn username(&self) -> Option<&String> {
        self.username.as_ref()
    }

    pub fn password(&self) -> Option<&String> {
        self.password.as_ref()
    }
}

/// (Not shown): Args for the `frollo-sync sync` command.
#[derive(Debug, Parser, Clone, Default)]
pub struct SyncArgs {
    #[clap(flatten)]
    frollo: FrolloArgs,

    /// Your PocketSmith developer key.
    #[arg(long, env = "POCKETSMITH_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Comma-separated Frollo account ids to sync, e.g. 1657651,1657652
    #[arg(long, env = "ACCOUNTS_TO_SYNC")]
    accounts: Option<String>,

    /// Stop starting new accounts after the first account fails.
    #[arg(long)]
    fail_fast: bool,
}

impl SyncArgs {
    pub fn new(
        frollo: FrolloArgs,
        token: Option<String>,
        accounts: Option<String>,
        fail_fast: bool,
    ) -> Self {
        Self {
            frollo,
            token,
            accounts,
            fail_fast,
        }
    }

    pub fn frollo(&self) -> &FrolloArgs {
        &self.frollo
    }

    pub fn token(&self) -> Option<&String> {
        self.token.as_ref()
    }

    pub fn accounts(&self) -> Option<&String> {
        self.accounts.as_ref()
    }

    pub fn fail_fast(&self) -> bool {
        self.fail_fast
    }
}

/// (Not shown): Args for the `frollo-sync accounts` command.
#[derive(Debug, Parser, Clone, Default)]
pub struct AccountsArgs {
    #[clap(flatten)]
    frollo: FrolloArgs,
}

impl AccountsArgs {
    pub fn new(frollo: FrolloArgs) -> Self {
        Self { frollo }
    }

    pub fn frollo(&self) -> &FrolloArgs {
        &self.frollo
    }
}

fn default_home() -> DisplayPath {
    DisplayPath(match dirs::home_dir() {
        Some(home) => home.join("frollo-sync"),
        None => {
            error!(
                "There was an error when trying to get your home directory. You can get around \
                this by providing --home or FROLLO_SYNC_HOME instead of relying on the default \
                home directory. If you continue using the program right now, you may have \
                problems!",
            );
            PathBuf::from("frollo-sync")
        }
    })
}

#[derive(Debug, Default, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct DisplayPath(PathBuf);

impl From<PathBuf> for DisplayPath {
    fn from(value: PathBuf) -> Self {
        DisplayPath(value)
    }
}

impl Deref for DisplayPath {
    type Target = Path;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl AsRef<Path> for DisplayPath {
    fn as_ref(&self) -> &Path {
        &self.0
    }
}

impl Display for DisplayPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_string_lossy())
    }
}

impl FromStr for DisplayPath {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(PathBuf::from(s)))
    }
}

impl DisplayPath {
    pub fn path(&self) -> &Path {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sync() {
        let args = Args::try_parse_from([
            "frollo-sync",
            "--home",
            "/tmp/fs",
            "sync",
            "--username",
            "me@example.com",
            "--password",
            "pw",
            "--token",
            "abc",
            "--accounts",
            "1,2",
            "--fail-fast",
        ])
        .unwrap();
        assert_eq!(args.common().home().path(), Path::new("/tmp/fs"));
        let Command::Sync(sync) = args.command() else {
            panic!("expected sync, got {:?}", args.command());
        };
        assert_eq!(sync.frollo().username().map(String::as_str), Some("me@example.com"));
        assert_eq!(sync.token().map(String::as_str), Some("abc"));
        assert_eq!(sync.accounts().map(String::as_str), Some("1,2"));
        assert!(sync.fail_fast());
    }

    #[test]
    fn test_parse_log_level() {
        let args =
            Args::try_parse_from(["frollo-sync", "--log-level", "debug", "--home", "x", "init"])
                .unwrap();
        assert_eq!(args.common().log_level(), LevelFilter::DEBUG);
        assert!(matches!(args.command(), Command::Init));
    }
}
