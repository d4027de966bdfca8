use super::spawner::{PLAYER_POOL_SIZE, Spawner, fill_player_pool};
use super::*;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

fn write_state(dirs: &Dirs, id: &str, json: &str) -> anyhow::Result<PathBuf> {
    let path = dirs.player_state_file(id);
    fs::create_dir_all(dirs.players_dir())?;
    fs::write(&path, json)?;
    Ok(path)
}

fn age(path: &Path, by: Duration) -> anyhow::Result<()> {
    let f = fs::File::options().write(true).open(path)?;
    f.set_modified(SystemTime::now() - by)?;
    Ok(())
}

#[test]
fn test_read_player_states() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let dirs = Dirs::at(tmp.path());
    // A missing directory is created rather than reported.
    assert!(dirs.read_player_states()?.is_empty());
    assert!(dirs.players_dir().is_dir());

    write_state(&dirs, "b", r#"{"state":"starting","port":27001,"expiry":5}"#)?;
    write_state(&dirs, "a", r#"{"condition":"ready","port":27000}"#)?;
    write_state(&dirs, "junk", "not json")?;
    fs::create_dir(dirs.players_dir().join("subdir"))?;
    fs::write(dirs.players_dir().join("notes.txt"), "{}")?;

    let states = dirs.read_player_states()?;
    let summary: Vec<(&str, &str, u16)> = states
        .iter()
        .map(|p| (p.id.as_str(), p.state.as_str(), p.port))
        .collect();
    assert_eq!(summary, [("a", "ready", 27000), ("b", "starting", 27001)]);
    assert_eq!(states[1].expiry, 5);
    assert!(states[0].is_ready());
    assert!(states[1].is_available() && !states[1].is_ready());

    fs::create_dir_all(dirs.repl_servers_dir())?;
    fs::write(dirs.repl_servers_dir().join("r1.json"), r#"{"port":9000,"id":"r1"}"#)?;
    let servers = dirs.read_repl_server_states()?;
    assert_eq!(servers.len(), 1);
    assert_eq!((servers[0].id.as_str(), servers[0].port), ("r1", 9000));
    Ok(())
}

#[test]
fn test_reaper() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let dirs = Dirs::at(tmp.path());
    let fresh = write_state(&dirs, "fresh", r#"{"state":"ready","port":1}"#)?;
    let stale = write_state(&dirs, "stale", r#"{"state":"ready","port":2}"#)?;
    age(&stale, Duration::from_secs(180))?;
    // Players from other versions are reaped too.
    let other = dirs.cache.join("state/players/0.0.1");
    fs::create_dir_all(&other)?;
    let old = other.join("x.json");
    fs::write(&old, "{}")?;
    age(&old, Duration::from_secs(600))?;

    let ids: Vec<String> = dirs.read_player_states()?.into_iter().map(|p| p.id).collect();
    assert_eq!(ids, ["fresh"]);
    assert!(fresh.exists());
    assert!(!stale.exists());
    assert!(!old.exists());
    assert!(other.is_dir());
    Ok(())
}

#[test]
fn test_delete_and_find() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let dirs = Dirs::at(tmp.path());
    write_state(&dirs, "p1", r#"{"state":"ready","port":27000}"#)?;
    assert_eq!(dirs.find_player_by_id("p1")?.port, 27000);
    dirs.delete_player_state_file("p1")?;
    dirs.delete_player_state_file("p1")?;
    let e = dirs.find_player_by_id("p1").unwrap_err();
    assert!(
        crate::error::present(&e).starts_with("No player was found with the ID p1.\n\n")
    );
    Ok(())
}

#[test]
fn test_find_open_port() -> anyhow::Result<()> {
    let port = find_open_port()?;
    assert_ne!(port, 0);
    // The port was released.
    TcpListener::bind(("0.0.0.0", port))?;
    Ok(())
}

#[tokio::test]
async fn test_await_ok() -> anyhow::Result<()> {
    let calls = &AtomicUsize::new(0);
    let v = await_ok(
        move || async move {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            if n < 2 {
                anyhow::bail!("not yet");
            }
            Ok(n)
        },
        Duration::from_secs(5),
    )
    .await?;
    assert_eq!(v, 2);

    let e = await_ok(
        || async { anyhow::Result::<()>::Err(anyhow!("never")) },
        Duration::from_millis(250),
    )
    .await
    .unwrap_err();
    assert_eq!(e.to_string(), "never");
    Ok(())
}

/// Writes a "starting" state file for each player it is asked to spawn.
struct FakeSpawner {
    dirs: Dirs,
    count: AtomicUsize,
}
impl Spawner for FakeSpawner {
    fn spawn_player(&self) -> anyhow::Result<()> {
        let n = self.count.fetch_add(1, Ordering::SeqCst);
        fs::write(
            self.dirs.player_state_file(&format!("spawned{n}")),
            format!(r#"{{"state":"starting","port":{}}}"#, 28000 + n),
        )?;
        Ok(())
    }
}

#[tokio::test]
async fn test_fill_player_pool() -> anyhow::Result<()> {
    let _ = env_logger::try_init();
    let tmp = tempfile::tempdir()?;
    let dirs = Dirs::at(tmp.path());
    write_state(&dirs, "ready", r#"{"state":"ready","port":27000}"#)?;
    write_state(&dirs, "busy", r#"{"state":"busy","port":27001}"#)?;
    let fake = Arc::new(FakeSpawner {
        dirs: dirs.clone(),
        count: AtomicUsize::new(0),
    });
    let spawner: Arc<dyn Spawner> = fake.clone();
    assert_eq!(fill_player_pool(&dirs, &spawner).await?, PLAYER_POOL_SIZE - 1);
    let available = dirs
        .read_player_states()?
        .iter()
        .filter(|p| p.is_available())
        .count();
    assert_eq!(available, PLAYER_POOL_SIZE);
    // A full pool needs nothing more.
    assert_eq!(fill_player_pool(&dirs, &spawner).await?, 0);
    assert_eq!(fake.count.load(Ordering::SeqCst), PLAYER_POOL_SIZE - 1);
    Ok(())
}
