// The player supervisor is an actor task that owns the binding between this process and one
// player. Callers talk to it through [Supervisor]; anyone can read the current binding through a
// lock-free snapshot. A separate task keeps the pool of idle players topped up.

use crate::error::AldaError;
use crate::system::spawner::{self, Spawner};
use crate::system::{Dirs, PlayerState, await_ok};
use crate::transmitter::OscTransmitter;
use arc_swap::ArcSwap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

pub struct SupervisorOptions {
    pub dirs: Dirs,
    /// When present, a background task spawns players to keep the pool full.
    pub spawner: Option<Arc<dyn Spawner>>,
    pub fill_interval: Duration,
    pub health_interval: Duration,
    pub ping_timeout: Duration,
    pub find_timeout: Duration,
}
impl SupervisorOptions {
    pub fn new(dirs: Dirs, spawner: Option<Arc<dyn Spawner>>) -> Self {
        Self {
            dirs,
            spawner,
            fill_interval: Duration::from_secs(10),
            health_interval: Duration::from_secs(1),
            ping_timeout: Duration::from_secs(5),
            find_timeout: Duration::from_secs(20),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundPlayer {
    pub id: String,
    pub port: u16,
}
impl From<&PlayerState> for BoundPlayer {
    fn from(p: &PlayerState) -> Self {
        Self {
            id: p.id.clone(),
            port: p.port,
        }
    }
}

/// None -> Candidate -> Active -> Draining -> None. A candidate that doesn't answer a ping and an
/// active player that stops answering both go back to None.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Binding {
    #[default]
    None,
    Candidate(BoundPlayer),
    Active(BoundPlayer),
    Draining(BoundPlayer),
}

enum Request {
    BindPlayer(oneshot::Sender<anyhow::Result<BoundPlayer>>),
    ReleasePlayer {
        shutdown: bool,
        reply: oneshot::Sender<anyhow::Result<()>>,
    },
    Shutdown,
}

pub struct Supervisor {
    tx: mpsc::Sender<Request>,
    binding: Arc<ArcSwap<Binding>>,
    actor: JoinHandle<()>,
    filler: Option<JoinHandle<()>>,
}

impl Supervisor {
    /// Start the actor and, if there is a spawner, the pool filler. Must be called from within a
    /// tokio runtime.
    pub fn start(options: SupervisorOptions) -> Self {
        let binding: Arc<ArcSwap<Binding>> = Default::default();
        let filler = options.spawner.clone().map(|s| {
            let dirs = options.dirs.clone();
            let interval = options.fill_interval;
            tokio::spawn(fill_periodically(dirs, s, interval))
        });
        let (tx, rx) = mpsc::channel(16);
        let actor = Actor {
            options,
            binding: binding.clone(),
        };
        let actor = tokio::spawn(actor.run(rx));
        Self {
            tx,
            binding,
            actor,
            filler,
        }
    }

    /// The current binding, without waiting for the actor
    pub fn binding(&self) -> Binding {
        (**self.binding.load()).clone()
    }

    /// The active player, if any
    pub fn current(&self) -> Option<BoundPlayer> {
        match &**self.binding.load() {
            Binding::Active(p) => Some(p.clone()),
            _ => None,
        }
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<anyhow::Result<T>>) -> Request,
    ) -> anyhow::Result<T> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(make(reply_tx))
            .await
            .map_err(|_| anyhow::anyhow!("player supervisor has stopped"))?;
        reply_rx
            .await
            .map_err(|_| anyhow::anyhow!("player supervisor dropped a request"))?
    }

    /// Return the active player, finding one if necessary.
    pub async fn bind_player(&self) -> anyhow::Result<BoundPlayer> {
        self.request(Request::BindPlayer).await
    }

    /// Forget the bound player. With `shutdown`, tell it to exit first.
    pub async fn release_player(&self, shutdown: bool) -> anyhow::Result<()> {
        self.request(|reply| Request::ReleasePlayer { shutdown, reply })
            .await
    }

    pub async fn shutdown(self) -> anyhow::Result<()> {
        if let Some(h) = &self.filler {
            h.abort();
        }
        // If the actor has already exited, there is nothing to stop.
        let _ = self.tx.send(Request::Shutdown).await;
        self.actor.await?;
        Ok(())
    }
}

async fn fill_periodically(dirs: Dirs, spawner: Arc<dyn Spawner>, interval: Duration) {
    let mut ticker = time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        match spawner::fill_player_pool(&dirs, &spawner).await {
            Ok(n) if n > 0 => log::info!("spawned {n} player(s)"),
            Ok(_) => {}
            Err(e) => log::error!("error filling player pool: {e:#}"),
        }
    }
}

struct Actor {
    options: SupervisorOptions,
    binding: Arc<ArcSwap<Binding>>,
}

impl Actor {
    async fn run(mut self, mut rx: mpsc::Receiver<Request>) {
        let mut health = time::interval(self.options.health_interval);
        health.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                request = rx.recv() => match request {
                    None | Some(Request::Shutdown) => break,
                    Some(Request::BindPlayer(reply)) => {
                        let _ = reply.send(self.bind().await);
                    }
                    Some(Request::ReleasePlayer { shutdown, reply }) => {
                        let _ = reply.send(self.release(shutdown).await);
                    }
                },
                _ = health.tick() => self.check_health().await,
            }
        }
        log::debug!("player supervisor stopped");
    }

    fn set(&self, binding: Binding) {
        log::debug!("player binding: {binding:?}");
        self.binding.store(Arc::new(binding));
    }

    fn active(&self) -> Option<BoundPlayer> {
        match &**self.binding.load() {
            Binding::Active(p) => Some(p.clone()),
            _ => None,
        }
    }

    fn declare_dead(&self, player: &BoundPlayer) {
        if let Err(e) = self.options.dirs.delete_player_state_file(&player.id) {
            log::warn!("unable to remove state file for player {}: {e:#}", player.id);
        }
    }

    async fn check_health(&mut self) {
        match self.active() {
            Some(p) => self.check_active(p).await,
            None => {
                self.adopt().await;
            }
        }
    }

    async fn check_active(&mut self, mut player: BoundPlayer) {
        let listed = match self.options.dirs.read_player_states() {
            Ok(states) => states.into_iter().find(|s| s.id == player.id),
            Err(e) => {
                log::warn!("unable to read player states: {e:#}");
                return;
            }
        };
        let Some(state) = listed else {
            log::info!("state file for player {} is gone; unbinding", player.id);
            self.set(Binding::None);
            return;
        };
        if state.port != player.port {
            log::info!(
                "player {} moved from port {} to {}",
                player.id,
                player.port,
                state.port
            );
            player.port = state.port;
            self.set(Binding::Active(player.clone()));
        }
        let t = OscTransmitter::new(player.port);
        let pinged = await_ok(move || async move { t.ping().await }, self.options.ping_timeout);
        if let Err(e) = pinged.await {
            log::warn!("player {} stopped responding: {e:#}", player.id);
            self.declare_dead(&player);
            self.set(Binding::None);
        }
    }

    /// Try each ready player in turn, binding to the first one that answers a ping.
    async fn adopt(&mut self) -> Option<BoundPlayer> {
        let states = match self.options.dirs.read_player_states() {
            Ok(states) => states,
            Err(e) => {
                log::warn!("unable to read player states: {e:#}");
                return None;
            }
        };
        for state in states.iter().filter(|p| p.is_ready()) {
            let candidate = BoundPlayer::from(state);
            self.set(Binding::Candidate(candidate.clone()));
            let pinged = time::timeout(
                self.options.ping_timeout,
                OscTransmitter::new(candidate.port).ping(),
            )
            .await
            .unwrap_or_else(|_| Err(anyhow::anyhow!("no answer to ping")));
            match pinged {
                Ok(()) => {
                    log::debug!("bound to player {} on port {}", candidate.id, candidate.port);
                    self.set(Binding::Active(candidate.clone()));
                    return Some(candidate);
                }
                Err(e) => {
                    log::info!("player {} is unreachable: {e:#}", candidate.id);
                    self.declare_dead(&candidate);
                    self.set(Binding::None);
                }
            }
        }
        None
    }

    async fn bind(&mut self) -> anyhow::Result<BoundPlayer> {
        if let Some(p) = self.active() {
            return Ok(p);
        }
        let deadline = Instant::now() + self.options.find_timeout;
        loop {
            if let Some(p) = self.adopt().await {
                return Ok(p);
            }
            if Instant::now() >= deadline {
                return Err(AldaError::NoPlayersAvailable {
                    log_path: self.options.dirs.player_log_file().display().to_string(),
                }
                .into());
            }
            time::sleep(Duration::from_millis(100)).await;
        }
    }

    async fn release(&mut self, shutdown: bool) -> anyhow::Result<()> {
        let Some(p) = self.active() else {
            self.set(Binding::None);
            return Ok(());
        };
        if !shutdown {
            self.set(Binding::None);
            return Ok(());
        }
        self.set(Binding::Draining(p.clone()));
        let result = OscTransmitter::new(p.port).shutdown(0).await;
        self.declare_dead(&p);
        self.set(Binding::None);
        result
    }
}

#[cfg(test)]
mod tests;
