use crate::osc::{OscMessage, OscPacket, read_frame};
use crate::system::Dirs;
use std::fs;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// A stand-in for a player process: it listens on a local port and records every packet it
/// receives.
pub struct FakePlayer {
    pub port: u16,
    received: Arc<Mutex<Vec<OscPacket>>>,
    handle: JoinHandle<()>,
}

impl FakePlayer {
    pub async fn start() -> anyhow::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let port = listener.local_addr()?.port();
        let received: Arc<Mutex<Vec<OscPacket>>> = Default::default();
        let r2 = received.clone();
        let handle = tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                loop {
                    match read_frame(&mut stream).await {
                        Ok(Some(packet)) => r2.lock().unwrap().push(packet),
                        Ok(None) => break,
                        Err(e) => {
                            log::error!("fake player on {port}: {e}");
                            break;
                        }
                    }
                }
            }
        });
        Ok(Self {
            port,
            received,
            handle,
        })
    }

    /// Write a state file advertising this player.
    pub fn register(&self, dirs: &Dirs, id: &str, state: &str) -> anyhow::Result<()> {
        fs::create_dir_all(dirs.players_dir())?;
        fs::write(
            dirs.player_state_file(id),
            format!(r#"{{"state":"{state}","port":{},"expiry":0}}"#, self.port),
        )?;
        Ok(())
    }

    pub fn packets(&self) -> Vec<OscPacket> {
        self.received.lock().unwrap().clone()
    }

    /// Every message received, with bundles flattened
    pub fn messages(&self) -> Vec<OscMessage> {
        let mut result = Vec::new();
        for p in self.packets() {
            match p {
                OscPacket::Message(m) => result.push(m),
                OscPacket::Bundle(b) => result.extend(b.messages().into_iter().cloned()),
            }
        }
        result
    }

    fn is_ping(p: &OscPacket) -> bool {
        matches!(p, OscPacket::Message(m) if m.address == "/ping")
    }

    /// Messages other than pings
    pub fn commands(&self) -> Vec<OscMessage> {
        self.messages()
            .into_iter()
            .filter(|m| m.address != "/ping")
            .collect()
    }

    /// Wait until at least `n` packets other than pings have arrived, and return their messages.
    pub async fn wait_for_packets(&self, n: usize) -> Vec<OscMessage> {
        for _ in 0..500 {
            let count = self.packets().iter().filter(|p| !Self::is_ping(p)).count();
            if count >= n {
                return self.commands();
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("timed out waiting for {n} packets on port {}", self.port);
    }
}

impl Drop for FakePlayer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Poll `f` until it returns true or a few seconds pass.
pub async fn eventually(mut f: impl FnMut() -> bool) -> bool {
    for _ in 0..500 {
        if f() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}
