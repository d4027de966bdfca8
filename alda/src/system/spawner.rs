use super::{Dirs, VERSION};
use crate::error::AldaError;
use anyhow::Context;
use regex::Regex;
use std::env;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::{Arc, LazyLock};
use tokio::task;

pub const PLAYER_POOL_SIZE: usize = 3;
const PLAYER_BINARY: &str = "alda-player";

static PLAYER_VERSION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"alda-player (\S+)").expect("valid regex"));

/// Starts player processes. The pool filler only needs to launch them; players announce
/// themselves through their state files.
pub trait Spawner: Sync + Send {
    fn spawn_player(&self) -> anyhow::Result<()>;
}

/// Launches `alda-player run` from the PATH.
#[derive(Default)]
pub struct PlayerSpawner;
impl Spawner for PlayerSpawner {
    fn spawn_player(&self) -> anyhow::Result<()> {
        let (path, _) = locate_player()?;
        let pid = spawn_detached(&path, &["run"])?;
        log::info!("spawned player process {pid}");
        Ok(())
    }
}

/// Start `program` in its own process group with no stdio so it outlives us and ignores our
/// terminal's signals. A background task reaps it if it exits while we are still running. Must be
/// called from within a tokio runtime.
pub fn spawn_detached(program: &Path, args: &[&str]) -> anyhow::Result<u32> {
    let mut cmd = tokio::process::Command::new(program);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());
    #[cfg(unix)]
    cmd.process_group(0);
    let mut child = cmd
        .spawn()
        .with_context(|| format!("starting {}", program.display()))?;
    let pid = child.id().unwrap_or_default();
    tokio::spawn(async move {
        match child.wait().await {
            Ok(status) => log::debug!("process {pid} exited: {status}"),
            Err(e) => log::warn!("waiting for process {pid}: {e}"),
        }
    });
    Ok(pid)
}

fn find_on_path(name: &str) -> Option<PathBuf> {
    let file_name = if cfg!(windows) {
        format!("{name}.exe")
    } else {
        name.to_string()
    };
    env::split_paths(&env::var_os("PATH")?)
        .map(|dir| dir.join(&file_name))
        .find(|p| p.is_file())
}

/// Return the player's path and the version it reports. A version that differs from ours is only
/// worth a warning.
pub fn locate_player() -> anyhow::Result<(PathBuf, String)> {
    let path = find_on_path(PLAYER_BINARY).ok_or(AldaError::PlayerNotInstalled)?;
    let output = Command::new(&path)
        .arg("info")
        .stdin(Stdio::null())
        .output()
        .with_context(|| format!("running {} info", path.display()))?;
    let info = String::from_utf8_lossy(&output.stdout);
    let version = player_version(&info).unwrap_or_default();
    if version != VERSION {
        log::warn!(
            "alda ({VERSION}) and alda-player ({version}) are different versions; \
             run `alda doctor` to check your installation"
        );
    }
    Ok((path, version))
}

fn player_version(info: &str) -> Option<String> {
    PLAYER_VERSION_RE
        .captures(info)
        .map(|c| c[1].to_string())
}

pub fn spawning_disabled() -> bool {
    env::var("ALDA_DISABLE_SPAWNING").is_ok_and(|v| v == "yes")
}

/// Spawn enough players to bring the number of ready or starting players up to
/// [PLAYER_POOL_SIZE]. Returns the number of players spawned.
pub async fn fill_player_pool(dirs: &Dirs, spawner: &Arc<dyn Spawner>) -> anyhow::Result<usize> {
    if spawning_disabled() {
        log::info!("ALDA_DISABLE_SPAWNING is set; not spawning players");
        return Ok(0);
    }
    let states = dirs.read_player_states()?;
    let available = states.iter().filter(|p| p.is_available()).count();
    let needed = PLAYER_POOL_SIZE.saturating_sub(available);
    log::debug!("players available: {available}; spawning: {needed}");
    let handles: Vec<_> = (0..needed)
        .map(|_| {
            let spawner = spawner.clone();
            task::spawn_blocking(move || spawner.spawn_player())
        })
        .collect();
    let mut first_err = None;
    for h in handles {
        if let Err(e) = h.await? {
            log::error!("failed to spawn player: {e:#}");
            first_err.get_or_insert(e);
        }
    }
    match first_err {
        Some(e) => Err(e),
        None => Ok(needed),
    }
}
