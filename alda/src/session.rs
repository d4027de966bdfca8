// An interactive session: a score that grows one input at a time, with each input played as soon
// as it is compiled. Offsets are synced so that each new input starts playing right away rather
// than at its position in the whole score.

use crate::error::is_transport;
use crate::supervisor::{BoundPlayer, Supervisor};
use crate::transmitter::{OscTransmitter, TransmitOptions};
use alda_common::score::Score;

const INPUT_NAME: &str = "<input>";

/// How a session reaches its player
pub enum PlayerLink {
    /// A specific player chosen by port or id. It is never replaced.
    Fixed(BoundPlayer),
    Supervised(Supervisor),
}
impl PlayerLink {
    pub async fn player(&self) -> anyhow::Result<BoundPlayer> {
        match self {
            PlayerLink::Fixed(p) => Ok(p.clone()),
            PlayerLink::Supervised(s) => s.bind_player().await,
        }
    }

    /// Let go of the player. A fixed player can't be replaced, so instead of shutting it down,
    /// it is only stopped.
    pub async fn release(&self, shutdown: bool) -> anyhow::Result<()> {
        match self {
            PlayerLink::Fixed(p) if shutdown => OscTransmitter::new(p.port).stop().await,
            PlayerLink::Fixed(_) => Ok(()),
            PlayerLink::Supervised(s) => s.release_player(shutdown).await,
        }
    }

    pub async fn close(self) -> anyhow::Result<()> {
        match self {
            PlayerLink::Fixed(_) => Ok(()),
            PlayerLink::Supervised(s) => s.shutdown().await,
        }
    }
}

pub struct Session {
    link: PlayerLink,
    score: Score,
    /// Everything successfully applied so far
    source: String,
}

impl Session {
    pub fn new(link: PlayerLink) -> Self {
        Self {
            link,
            score: Score::new(),
            source: String::new(),
        }
    }

    pub fn score(&self) -> &Score {
        &self.score
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn link(&self) -> &PlayerLink {
        &self.link
    }

    /// Compile `input` onto the score and play just the new events. If `input` doesn't compile,
    /// the score is left as it was.
    pub async fn append(&mut self, input: &str) -> anyhow::Result<()> {
        let sync_offsets = self.score.part_offsets();
        let from_index = self.score.events.len();
        if let Err(e) = crate::update(&mut self.score, INPUT_NAME, input) {
            // A failed update may have partially modified the score.
            self.score = crate::compile(INPUT_NAME, &self.source)?;
            return Err(e);
        }
        self.source.push_str(input);
        if !input.ends_with('\n') {
            self.source.push('\n');
        }
        let options = TransmitOptions {
            from_index: Some(from_index),
            to_index: Some(self.score.events.len()),
            sync_offsets,
            ..Default::default()
        };
        self.transmit(&options).await
    }

    /// Start over on a fresh player and play everything entered so far.
    pub async fn replay(&mut self, from: Option<String>, to: Option<String>) -> anyhow::Result<()> {
        self.score = Score::new();
        if let Err(e) = self.link.release(true).await {
            log::warn!("unable to shut down the current player: {e:#}");
        }
        self.score = crate::compile(INPUT_NAME, &self.source)?;
        let options = TransmitOptions {
            from,
            to,
            ..Default::default()
        };
        self.transmit(&options).await
    }

    pub async fn stop(&self) -> anyhow::Result<()> {
        let player = self.link.player().await?;
        OscTransmitter::new(player.port).stop().await
    }

    /// Discard the score and source.
    pub fn clear(&mut self) {
        self.score = Score::new();
        self.source.clear();
    }

    async fn transmit(&self, options: &TransmitOptions) -> anyhow::Result<()> {
        let player = self.link.player().await?;
        let result = OscTransmitter::new(player.port)
            .transmit_score(&self.score, options)
            .await;
        if let Err(e) = &result
            && is_transport(e)
        {
            log::warn!("lost contact with player {}", player.id);
            self.link.release(false).await?;
        }
        result
    }

    pub async fn close(self) -> anyhow::Result<()> {
        self.link.close().await
    }
}
