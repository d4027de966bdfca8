use super::*;
use crate::test_util::{FakePlayer, eventually};
use std::fs;
use std::sync::atomic::{AtomicUsize, Ordering};

fn options(dirs: &Dirs) -> SupervisorOptions {
    SupervisorOptions {
        fill_interval: Duration::from_millis(50),
        health_interval: Duration::from_millis(50),
        ping_timeout: Duration::from_millis(500),
        find_timeout: Duration::from_millis(500),
        ..SupervisorOptions::new(dirs.clone(), None)
    }
}

async fn dead_port() -> anyhow::Result<u16> {
    Ok(tokio::net::TcpListener::bind("127.0.0.1:0")
        .await?
        .local_addr()?
        .port())
}

#[tokio::test]
async fn test_bind_first_ready() -> anyhow::Result<()> {
    let _ = env_logger::try_init();
    let tmp = tempfile::tempdir()?;
    let dirs = Dirs::at(tmp.path());
    let mut players = Vec::new();
    for id in ["p1", "p2", "p3"] {
        let p = FakePlayer::start().await?;
        p.register(&dirs, id, "ready")?;
        players.push(p);
    }
    let sup = Supervisor::start(options(&dirs));
    let bound = sup.bind_player().await?;
    assert_eq!(bound.id, "p1");
    assert_eq!(bound.port, players[0].port);
    assert_eq!(sup.binding(), Binding::Active(bound.clone()));
    assert_eq!(sup.current(), Some(bound));
    // The rest of the pool is untouched.
    let ids: Vec<String> = dirs.read_player_states()?.into_iter().map(|p| p.id).collect();
    assert_eq!(ids, ["p1", "p2", "p3"]);
    sup.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn test_rebind_after_state_file_removed() -> anyhow::Result<()> {
    let _ = env_logger::try_init();
    let tmp = tempfile::tempdir()?;
    let dirs = Dirs::at(tmp.path());
    let first = FakePlayer::start().await?;
    first.register(&dirs, "a", "ready")?;
    let second = FakePlayer::start().await?;
    second.register(&dirs, "b", "ready")?;
    let sup = Supervisor::start(options(&dirs));
    assert_eq!(sup.bind_player().await?.id, "a");

    fs::remove_file(dirs.player_state_file("a"))?;
    assert!(eventually(|| sup.current().is_none_or(|p| p.id != "a")).await);
    let bound = sup.bind_player().await?;
    assert_eq!(bound.id, "b");
    assert_eq!(bound.port, second.port);
    sup.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn test_unbind_when_player_stops_answering() -> anyhow::Result<()> {
    let _ = env_logger::try_init();
    let tmp = tempfile::tempdir()?;
    let dirs = Dirs::at(tmp.path());
    let player = FakePlayer::start().await?;
    player.register(&dirs, "a", "ready")?;
    let sup = Supervisor::start(options(&dirs));
    assert_eq!(sup.bind_player().await?.id, "a");

    // The player goes away without removing its state file.
    drop(player);
    assert!(dirs.player_state_file("a").exists());
    assert!(eventually(|| sup.current().is_none()).await);
    assert!(eventually(|| !dirs.player_state_file("a").exists()).await);
    sup.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn test_follow_port_change() -> anyhow::Result<()> {
    let _ = env_logger::try_init();
    let tmp = tempfile::tempdir()?;
    let dirs = Dirs::at(tmp.path());
    let first = FakePlayer::start().await?;
    first.register(&dirs, "a", "ready")?;
    let sup = Supervisor::start(options(&dirs));
    assert_eq!(sup.bind_player().await?.port, first.port);

    let moved = FakePlayer::start().await?;
    moved.register(&dirs, "a", "ready")?;
    assert!(eventually(|| sup.current().is_some_and(|p| p.port == moved.port)).await);
    assert_eq!(sup.bind_player().await?.id, "a");
    sup.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn test_skip_unreachable_players() -> anyhow::Result<()> {
    let _ = env_logger::try_init();
    let tmp = tempfile::tempdir()?;
    let dirs = Dirs::at(tmp.path());
    let port = dead_port().await?;
    fs::create_dir_all(dirs.players_dir())?;
    fs::write(
        dirs.player_state_file("dead"),
        format!(r#"{{"state":"ready","port":{port}}}"#),
    )?;
    let starting = FakePlayer::start().await?;
    starting.register(&dirs, "not-yet", "starting")?;
    let live = FakePlayer::start().await?;
    live.register(&dirs, "zzz", "ready")?;

    let sup = Supervisor::start(options(&dirs));
    let bound = sup.bind_player().await?;
    assert_eq!(bound.id, "zzz");
    // The dead player was declared dead; the starting one is left alone.
    assert!(!dirs.player_state_file("dead").exists());
    assert!(dirs.player_state_file("not-yet").exists());
    sup.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn test_no_players_available() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let dirs = Dirs::at(tmp.path());
    let sup = Supervisor::start(options(&dirs));
    let e = sup.bind_player().await.unwrap_err();
    assert!(matches!(
        e.downcast_ref::<AldaError>(),
        Some(AldaError::NoPlayersAvailable { .. })
    ));
    assert_eq!(sup.binding(), Binding::None);
    sup.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn test_release() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let dirs = Dirs::at(tmp.path());
    let player = FakePlayer::start().await?;
    player.register(&dirs, "p", "ready")?;
    // Keep the health check from re-adopting the player between steps.
    let sup = Supervisor::start(SupervisorOptions {
        health_interval: Duration::from_secs(3600),
        ..options(&dirs)
    });

    sup.bind_player().await?;
    sup.release_player(false).await?;
    assert_eq!(sup.binding(), Binding::None);
    assert!(player.commands().is_empty());

    sup.bind_player().await?;
    sup.release_player(true).await?;
    assert_eq!(sup.binding(), Binding::None);
    let commands = player.wait_for_packets(1).await;
    assert_eq!(commands[0].address, "/system/shutdown");
    assert_eq!(commands[0].int_args(), [0]);
    assert!(!dirs.player_state_file("p").exists());
    // Releasing with nothing bound is fine.
    sup.release_player(true).await?;
    sup.shutdown().await?;
    Ok(())
}

struct CountingSpawner(AtomicUsize);
impl Spawner for CountingSpawner {
    fn spawn_player(&self) -> anyhow::Result<()> {
        self.0.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[tokio::test]
async fn test_filler_runs() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let dirs = Dirs::at(tmp.path());
    let counter = Arc::new(CountingSpawner(AtomicUsize::new(0)));
    let sup = Supervisor::start(SupervisorOptions {
        spawner: Some(counter.clone()),
        ..options(&dirs)
    });
    // Nothing writes state files, so every cycle asks for a full pool.
    let target = 2 * spawner::PLAYER_POOL_SIZE;
    assert!(eventually(|| counter.0.load(Ordering::SeqCst) >= target).await);
    sup.shutdown().await?;
    Ok(())
}
