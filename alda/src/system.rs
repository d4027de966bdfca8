// Local state shared between alda and its player processes: the cache and config directories,
// player and REPL server state files, and a few process/network helpers.

use crate::error::AldaError;
use anyhow::{Context, anyhow};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use std::{fs, io};

pub mod spawner;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
/// State files that haven't been touched for this long belong to dead processes.
pub const STALE_AFTER: Duration = Duration::from_secs(120);
const RETRY_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PlayerState {
    #[serde(alias = "condition", alias = "State")]
    pub state: String,
    #[serde(alias = "Port")]
    pub port: u16,
    /// Unix time in milliseconds after which the player shuts itself down
    #[serde(alias = "Expiry", default)]
    pub expiry: i64,
    /// Taken from the state file's name
    #[serde(skip)]
    pub id: String,
}
impl PlayerState {
    /// A player known only by its port, as when the user passes `--port`.
    pub fn at_port(port: u16) -> Self {
        Self {
            state: "unknown".to_string(),
            port,
            expiry: 0,
            id: "unknown".to_string(),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.state == "ready"
    }

    /// Ready, or on its way to being ready
    pub fn is_available(&self) -> bool {
        self.is_ready() || self.state == "starting"
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ReplServerState {
    #[serde(alias = "Port")]
    pub port: u16,
    #[serde(skip)]
    pub id: String,
}

/// Where alda keeps its files. Production code uses [Dirs::from_env]; tests root everything in a
/// temporary directory with [Dirs::at].
#[derive(Debug, Clone)]
pub struct Dirs {
    pub cache: PathBuf,
    pub config: PathBuf,
}
impl Dirs {
    pub fn from_env() -> anyhow::Result<Self> {
        let mut cache = dirs::cache_dir()
            .ok_or_else(|| anyhow!("unable to determine cache directory"))?
            .join("alda");
        if cfg!(windows) {
            cache.push("cache");
        }
        let config = dirs::config_dir()
            .ok_or_else(|| anyhow!("unable to determine config directory"))?
            .join("alda");
        Ok(Self { cache, config })
    }

    pub fn at(root: &Path) -> Self {
        Self {
            cache: root.join("cache"),
            config: root.join("config"),
        }
    }

    pub fn players_dir(&self) -> PathBuf {
        self.cache.join("state").join("players").join(VERSION)
    }

    pub fn repl_servers_dir(&self) -> PathBuf {
        self.cache.join("state").join("repl-servers")
    }

    pub fn player_log_file(&self) -> PathBuf {
        self.cache.join("logs").join("alda-player.log")
    }

    pub fn history_file(&self) -> PathBuf {
        self.cache.join("history").join("alda-repl-history")
    }

    pub fn telemetry_status_file(&self) -> PathBuf {
        self.config.join("telemetry-status")
    }

    pub fn player_state_file(&self, id: &str) -> PathBuf {
        self.players_dir().join(format!("{id}.json"))
    }

    /// Delete state files older than `max_age`. Directories are left alone.
    pub fn reap_stale_files(&self, max_age: Duration) -> anyhow::Result<()> {
        let now = SystemTime::now();
        for dir in [
            self.cache.join("state").join("players"),
            self.repl_servers_dir(),
        ] {
            reap_dir(&dir, now, max_age)?;
        }
        Ok(())
    }

    /// Read all player state files for this version of alda, sorted by id.
    pub fn read_player_states(&self) -> anyhow::Result<Vec<PlayerState>> {
        if let Err(e) = self.reap_stale_files(STALE_AFTER) {
            log::warn!("failed to clean up stale state files: {e:#}");
        }
        read_states(&self.players_dir(), |p: &mut PlayerState, id| p.id = id)
    }

    pub fn read_repl_server_states(&self) -> anyhow::Result<Vec<ReplServerState>> {
        read_states(&self.repl_servers_dir(), |r: &mut ReplServerState, id| {
            r.id = id
        })
    }

    /// Remove the state file of a player that is known to be dead. A missing file is not an error.
    pub fn delete_player_state_file(&self, id: &str) -> anyhow::Result<()> {
        let path = self.player_state_file(id);
        match fs::remove_file(&path) {
            Ok(()) => {
                log::debug!("deleted player state file {}", path.display());
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("removing {}", path.display())),
        }
    }

    pub fn find_player_by_id(&self, id: &str) -> anyhow::Result<PlayerState> {
        self.read_player_states()?
            .into_iter()
            .find(|p| p.id == id)
            .ok_or_else(|| {
                AldaError::user(format!(
                    "No player was found with the ID {id}.\n\n\
                     To list the current player processes, you can run alda ps.\n\n\
                     You can also omit the -i / --player-id option, and Alda will find a player \
                     process for you automatically."
                ))
            })
    }
}

fn reap_dir(dir: &Path, now: SystemTime, max_age: Duration) -> anyhow::Result<()> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e).with_context(|| format!("reading {}", dir.display())),
    };
    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        let meta = entry.metadata()?;
        if meta.is_dir() {
            reap_dir(&path, now, max_age)?;
            continue;
        }
        let age = now
            .duration_since(meta.modified()?)
            .unwrap_or(Duration::ZERO);
        if age <= max_age {
            continue;
        }
        log::debug!("removing stale state file {}", path.display());
        match fs::remove_file(&path) {
            Ok(()) => {}
            // Another process may have reaped it first.
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e).with_context(|| format!("removing {}", path.display())),
        }
    }
    Ok(())
}

fn read_states<T, F>(dir: &Path, set_id: F) -> anyhow::Result<Vec<T>>
where
    T: for<'de> Deserialize<'de>,
    F: Fn(&mut T, String),
{
    fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    let mut paths: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| p.is_file())
        .collect();
    paths.sort();
    let mut result = Vec::new();
    for path in paths {
        let Some(id) = path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(|n| n.strip_suffix(".json"))
        else {
            continue;
        };
        let parsed = fs::read_to_string(&path)
            .map_err(anyhow::Error::from)
            .and_then(|s| serde_json::from_str::<T>(&s).map_err(anyhow::Error::from));
        match parsed {
            Ok(mut state) => {
                set_id(&mut state, id.to_string());
                result.push(state);
            }
            Err(e) => log::warn!("skipping unreadable state file {}: {e}", path.display()),
        }
    }
    Ok(result)
}

/// Return a port that was free a moment ago.
pub fn find_open_port() -> anyhow::Result<u16> {
    let listener = TcpListener::bind("0.0.0.0:0").context("allocating a port")?;
    Ok(listener.local_addr()?.port())
}

/// Call `f` every 100ms until it succeeds or `timeout` has elapsed, returning the last error on
/// timeout. An attempt that is already running when the time runs out is allowed to finish.
pub async fn await_ok<T, F, Fut>(mut f: F, timeout: Duration) -> anyhow::Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<T>>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        match f().await {
            Ok(v) => return Ok(v),
            Err(e) => {
                if tokio::time::Instant::now() >= deadline {
                    return Err(e);
                }
                tokio::time::sleep(RETRY_INTERVAL).await;
            }
        }
    }
}

#[cfg(test)]
mod tests;
