// Implementation of the command-line subcommands. Each command writes its normal output to `out`
// so it can be captured in tests; errors are returned to `main`, which presents them.

use crate::error::AldaError;
use crate::session::{PlayerLink, Session};
use crate::supervisor::{BoundPlayer, Supervisor, SupervisorOptions};
use crate::system::spawner::{self, PlayerSpawner, Spawner};
use crate::system::{Dirs, PlayerState, VERSION, await_ok, find_open_port};
use crate::transmitter::{OscTransmitter, TransmitOptions};
use crate::midi;
use alda_common::score::{STOCK_INSTRUMENTS, Score};
use anyhow::Context as _;
use chrono::{DateTime, Utc};
use clap::{Args, Subcommand, ValueEnum};
use std::io::{self, IsTerminal, Read, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use std::{fs, path};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::JoinHandle;

const PING_TIMEOUT: Duration = Duration::from_secs(5);
const EXPORT_TIMEOUT: Duration = Duration::from_secs(20);
const DOCTOR_SCORE: &str = "piano: (vol 25) c12 e g > c4";

#[derive(Args, Debug, Clone, Default)]
pub struct PlayerArgs {
    /// The port of the player process to use
    #[arg(short, long)]
    pub port: Option<u16>,
    /// The ID of the player process to use
    #[arg(short = 'i', long)]
    pub player_id: Option<String>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct SourceArgs {
    /// Read Alda source code from a file
    #[arg(short, long)]
    pub file: Option<PathBuf>,
    /// Supply Alda source code as a string
    #[arg(short, long, conflicts_with = "file")]
    pub code: Option<String>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct RangeArgs {
    /// Where to start playing: a marker name or a time in the form M:SS
    #[arg(short = 'F', long)]
    pub from: Option<String>,
    /// Where to stop playing: a marker name or a time in the form M:SS
    #[arg(short = 'T', long)]
    pub to: Option<String>,
}

#[derive(ValueEnum, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ParseOutput {
    /// The parsed updates, before compilation
    Events,
    /// The compiled score
    #[default]
    Data,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Evaluate and play Alda source code. With neither --file nor --code, source is read from
    /// standard input.
    Play {
        #[command(flatten)]
        player: PlayerArgs,
        #[command(flatten)]
        source: SourceArgs,
        #[command(flatten)]
        range: RangeArgs,
    },
    /// Stop playback
    Stop {
        #[command(flatten)]
        player: PlayerArgs,
    },
    /// Shut down player processes
    Shutdown {
        #[command(flatten)]
        player: PlayerArgs,
    },
    /// List running player processes
    Ps,
    /// Check for problems with the Alda installation
    Doctor {
        /// Skip the check that plays a short score
        #[arg(long)]
        no_audio: bool,
    },
    /// Display the result of parsing Alda source code as JSON
    Parse {
        #[command(flatten)]
        source: SourceArgs,
        #[arg(short, long, value_enum, default_value_t)]
        output: ParseOutput,
    },
    /// Export a score to a MIDI file
    Export {
        #[command(flatten)]
        source: SourceArgs,
        /// Output file; standard output if omitted
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Have a player process render the file instead of writing it directly
        #[arg(long)]
        player: bool,
    },
    /// Start an interactive session
    Repl {
        #[command(flatten)]
        player: PlayerArgs,
    },
    /// List the available instruments
    Instruments,
    /// Show the version
    Version,
    /// Show or change whether telemetry is enabled
    Telemetry {
        /// Show whether telemetry is enabled
        #[arg(long)]
        status: bool,
        /// Turn telemetry on
        #[arg(long, conflicts_with = "disable")]
        enable: bool,
        /// Turn telemetry off
        #[arg(long)]
        disable: bool,
    },
}

impl Commands {
    /// Whether to top up the pool of idle players once while this command runs. The repl's
    /// supervisor fills the pool itself.
    pub fn fills_pool(&self) -> bool {
        matches!(self, Commands::Play { .. } | Commands::Export { .. })
    }
}

/// Everything a command needs from its environment
pub struct Context {
    pub dirs: Dirs,
    pub spawner: Arc<dyn Spawner>,
}
impl Context {
    pub fn new(dirs: Dirs) -> Self {
        Self {
            dirs,
            spawner: Arc::new(PlayerSpawner),
        }
    }

    fn supervisor(&self, fill: bool) -> Supervisor {
        let spawner = fill.then(|| self.spawner.clone());
        Supervisor::start(SupervisorOptions::new(self.dirs.clone(), spawner))
    }

    /// Fill the pool once, in the background.
    fn start_fill(&self) -> JoinHandle<()> {
        let dirs = self.dirs.clone();
        let spawner = self.spawner.clone();
        tokio::spawn(async move {
            if let Err(e) = spawner::fill_player_pool(&dirs, &spawner).await {
                log::warn!("failed to fill player pool: {e:#}");
            }
        })
    }

    /// The player the user asked for with `--port` or `--player-id`, if any
    fn requested_player(&self, args: &PlayerArgs) -> anyhow::Result<Option<BoundPlayer>> {
        if let Some(port) = args.port {
            return Ok(Some(BoundPlayer::from(&PlayerState::at_port(port))));
        }
        match &args.player_id {
            Some(id) => Ok(Some(BoundPlayer::from(&self.dirs.find_player_by_id(id)?))),
            None => Ok(None),
        }
    }

    /// Players to send a command to: the requested one, or all known players
    fn target_players(&self, args: &PlayerArgs) -> anyhow::Result<Vec<BoundPlayer>> {
        match self.requested_player(args)? {
            Some(p) => Ok(vec![p]),
            None => Ok(self
                .dirs
                .read_player_states()?
                .iter()
                .map(BoundPlayer::from)
                .collect()),
        }
    }
}

pub async fn run(command: Commands, ctx: &Context, out: &mut dyn Write) -> anyhow::Result<()> {
    let fill = command.fills_pool().then(|| ctx.start_fill());
    let result = match command {
        Commands::Play {
            player,
            source,
            range,
        } => play(ctx, &player, &source, range).await,
        Commands::Stop { player } => stop(ctx, &player).await,
        Commands::Shutdown { player } => shutdown(ctx, &player).await,
        Commands::Ps => ps(ctx, out, Utc::now()),
        Commands::Doctor { no_audio } => doctor(ctx, out, no_audio).await,
        Commands::Parse { source, output } => parse(&source, output, out),
        Commands::Export {
            source,
            output,
            player,
        } => export(ctx, &source, output, player, out).await,
        Commands::Repl { player } => repl(ctx, &player, out).await,
        Commands::Instruments => {
            for i in STOCK_INSTRUMENTS {
                writeln!(out, "{}", i.name)?;
            }
            Ok(())
        }
        Commands::Version => {
            writeln!(out, "alda {VERSION}")?;
            Ok(())
        }
        Commands::Telemetry {
            status,
            enable,
            disable,
        } => telemetry(ctx, status, enable, disable, out),
    };
    if let Some(h) = fill {
        log::debug!("waiting for the player pool to fill");
        h.await?;
    }
    result
}

/// Read source from a file, a string, or standard input. Returns a name for diagnostics and the
/// source.
fn read_source(source: &SourceArgs) -> anyhow::Result<(String, String)> {
    if let Some(code) = &source.code {
        return Ok(("<code>".to_string(), code.clone()));
    }
    if let Some(file) = &source.file {
        let src = fs::read_to_string(file)
            .map_err(|e| AldaError::user(format!("unable to read {}: {e}", file.display())))?;
        return Ok((file.display().to_string(), src));
    }
    let mut stdin = io::stdin();
    if stdin.is_terminal() {
        return Err(AldaError::user(
            "No input supplied. See `alda play -h` for usage information.",
        ));
    }
    let mut src = String::new();
    stdin.read_to_string(&mut src)?;
    Ok(("<stdin>".to_string(), src))
}

async fn ping(player: &BoundPlayer) -> anyhow::Result<()> {
    let t = OscTransmitter::new(player.port);
    log::debug!("waiting for player on port {} to respond", player.port);
    await_ok(move || async move { t.ping().await }, PING_TIMEOUT).await
}

async fn play(
    ctx: &Context,
    args: &PlayerArgs,
    source: &SourceArgs,
    range: RangeArgs,
) -> anyhow::Result<()> {
    let (name, src) = read_source(source)?;
    let score = crate::compile(&name, &src)?;
    let mut options = TransmitOptions {
        from: range.from,
        to: range.to,
        ..Default::default()
    };
    if let Some(player) = ctx.requested_player(args)? {
        ping(&player).await?;
        return OscTransmitter::new(player.port)
            .transmit_score(&score, &options)
            .await;
    }
    // A player from the pool plays this score and then exits.
    options.one_off = true;
    let supervisor = ctx.supervisor(false);
    let result = async {
        let player = supervisor.bind_player().await?;
        log::info!("playing on player {} (port {})", player.id, player.port);
        OscTransmitter::new(player.port)
            .transmit_score(&score, &options)
            .await
    }
    .await;
    supervisor.shutdown().await?;
    result
}

async fn stop(ctx: &Context, args: &PlayerArgs) -> anyhow::Result<()> {
    let explicit = args.port.is_some() || args.player_id.is_some();
    for player in ctx.target_players(args)? {
        match OscTransmitter::new(player.port).stop().await {
            Ok(()) => log::info!("stopped player {} on port {}", player.id, player.port),
            Err(e) if !explicit => log::warn!("player {}: {e:#}", player.id),
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

async fn shutdown(ctx: &Context, args: &PlayerArgs) -> anyhow::Result<()> {
    let explicit = args.port.is_some() || args.player_id.is_some();
    for player in ctx.target_players(args)? {
        match OscTransmitter::new(player.port).shutdown(0).await {
            Ok(()) => log::info!("shut down player {} on port {}", player.id, player.port),
            // A player that is already gone doesn't need shutting down.
            Err(e) if !explicit => log::warn!("player {}: {e:#}", player.id),
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

/// Describe `expiry` (Unix milliseconds) relative to `now`, e.g. "in 5 minutes".
pub fn relative_time(expiry: i64, now: DateTime<Utc>) -> String {
    let Some(then) = DateTime::from_timestamp_millis(expiry) else {
        return "unknown".to_string();
    };
    let delta = then.signed_duration_since(now);
    let secs = delta.num_seconds().abs();
    let amount = match secs {
        0..60 => format!("{secs} seconds"),
        60..3600 => plural(secs / 60, "minute"),
        3600..86400 => plural(secs / 3600, "hour"),
        _ => plural(secs / 86400, "day"),
    };
    if delta.num_seconds() >= 0 {
        format!("in {amount}")
    } else {
        format!("{amount} ago")
    }
}

fn plural(n: i64, unit: &str) -> String {
    if n == 1 {
        format!("1 {unit}")
    } else {
        format!("{n} {unit}s")
    }
}

fn ps(ctx: &Context, out: &mut dyn Write, now: DateTime<Utc>) -> anyhow::Result<()> {
    writeln!(out, "id\tport\tstate\texpiry")?;
    for p in ctx.dirs.read_player_states()? {
        let expiry = relative_time(p.expiry, now);
        writeln!(out, "{}\t{}\t{}\t{expiry}", p.id, p.port, p.state)?;
    }
    for r in ctx.dirs.read_repl_server_states()? {
        writeln!(out, "{}\t{}\trepl-server\t-", r.id, r.port)?;
    }
    Ok(())
}

fn parse(source: &SourceArgs, output: ParseOutput, out: &mut dyn Write) -> anyhow::Result<()> {
    let (name, src) = read_source(source)?;
    let json = match output {
        ParseOutput::Events => serde_json::to_string_pretty(&crate::parse(&name, &src)?)?,
        ParseOutput::Data => serde_json::to_string_pretty(&crate::compile(&name, &src)?)?,
    };
    writeln!(out, "{json}")?;
    Ok(())
}

async fn export(
    ctx: &Context,
    source: &SourceArgs,
    output: Option<PathBuf>,
    use_player: bool,
    out: &mut dyn Write,
) -> anyhow::Result<()> {
    let (name, src) = read_source(source)?;
    let score = crate::compile(&name, &src)?;
    match (output, use_player) {
        (Some(path), false) => midi::save(&score, path),
        (None, false) => {
            let mut data = Vec::new();
            midi::write(&score, &mut data)?;
            out.write_all(&data)?;
            Ok(())
        }
        (Some(path), true) => export_with_player(ctx, &score, path).await,
        (None, true) => Err(AldaError::user("--player requires --output")),
    }
}

/// Load the score into a player without playing it, have the player write the MIDI file, and then
/// shut the player down.
async fn export_with_player(ctx: &Context, score: &Score, path: PathBuf) -> anyhow::Result<()> {
    let path = path::absolute(&path)?;
    let supervisor = ctx.supervisor(false);
    let result = async {
        let player = supervisor.bind_player().await?;
        let t = OscTransmitter::new(player.port);
        let options = TransmitOptions {
            load_only: true,
            ..Default::default()
        };
        t.transmit_score(score, &options).await?;
        t.export(&path).await?;
        let p2 = path.clone();
        await_ok(
            move || {
                let p = p2.clone();
                async move {
                    match fs::metadata(&p) {
                        Ok(m) if m.len() > 0 => Ok(()),
                        _ => anyhow::bail!("{} has not been written", p.display()),
                    }
                }
            },
            EXPORT_TIMEOUT,
        )
        .await?;
        log::info!("MIDI file written to {}", path.display());
        supervisor.release_player(true).await
    }
    .await;
    supervisor.shutdown().await?;
    result
}

async fn doctor(ctx: &Context, out: &mut dyn Write, no_audio: bool) -> anyhow::Result<()> {
    let (_, version) = spawner::locate_player()?;
    writeln!(out, "OK  alda-player is installed (version {version})")?;

    let probe = ctx.dirs.cache.join("doctor-probe");
    fs::create_dir_all(&ctx.dirs.cache)
        .and_then(|_| fs::write(&probe, "ok"))
        .and_then(|_| fs::remove_file(&probe))
        .with_context(|| format!("cache directory {} is not writable", ctx.dirs.cache.display()))?;
    writeln!(out, "OK  cache directory is writable")?;

    let port = find_open_port()?;
    writeln!(out, "OK  found an open port ({port})")?;

    crate::compile("<doctor>", DOCTOR_SCORE)?;
    writeln!(out, "OK  parsed and compiled a score")?;

    if no_audio {
        return Ok(());
    }
    let score = crate::compile("<doctor>", DOCTOR_SCORE)?;
    ctx.start_fill().await?;
    let supervisor = ctx.supervisor(false);
    let result = async {
        let player = supervisor.bind_player().await?;
        let options = TransmitOptions {
            one_off: true,
            ..Default::default()
        };
        OscTransmitter::new(player.port)
            .transmit_score(&score, &options)
            .await
    }
    .await;
    supervisor.shutdown().await?;
    result?;
    writeln!(out, "OK  played a score on a player process")?;
    Ok(())
}

fn telemetry(
    ctx: &Context,
    status: bool,
    enable: bool,
    disable: bool,
    out: &mut dyn Write,
) -> anyhow::Result<()> {
    let file = ctx.dirs.telemetry_status_file();
    let new_status = match (enable, disable) {
        (true, _) => Some("enabled"),
        (_, true) => Some("disabled"),
        _ => None,
    };
    if let Some(s) = new_status {
        if let Some(parent) = file.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&file, s)?;
        log::info!("telemetry {s}");
        if !status {
            return Ok(());
        }
    }
    let current = match fs::read_to_string(&file) {
        Ok(s) => match s.trim() {
            "enabled" | "disabled" => s.trim().to_string(),
            other => {
                return Err(AldaError::user(format!(
                    "unrecognized telemetry status: {other}"
                )));
            }
        },
        Err(e) if e.kind() == io::ErrorKind::NotFound => "not set".to_string(),
        Err(e) => return Err(e.into()),
    };
    writeln!(out, "Telemetry is {current}.")?;
    Ok(())
}

const REPL_HELP: &str = "\
Enter Alda source code to play it. Commands:
  :replay  play everything entered so far from the beginning
  :score   show everything entered so far
  :stop    stop playback
  :new     start a new score
  :quit    exit";

async fn repl(ctx: &Context, args: &PlayerArgs, out: &mut dyn Write) -> anyhow::Result<()> {
    let link = match ctx.requested_player(args)? {
        Some(player) => {
            ping(&player).await?;
            PlayerLink::Fixed(player)
        }
        None => PlayerLink::Supervised(ctx.supervisor(true)),
    };
    let mut session = Session::new(link);
    let history_path = ctx.dirs.history_file();
    if let Some(parent) = history_path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut history = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&history_path)
        .with_context(|| format!("opening {}", history_path.display()))?;
    writeln!(out, "{REPL_HELP}")?;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        write!(out, "> ")?;
        out.flush()?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        writeln!(history, "{input}")?;
        let result = match input {
            ":quit" | ":exit" => break,
            ":help" => {
                writeln!(out, "{REPL_HELP}")?;
                Ok(())
            }
            ":score" => {
                write!(out, "{}", session.source())?;
                Ok(())
            }
            ":stop" => session.stop().await,
            ":replay" => session.replay(None, None).await,
            ":new" => {
                session.clear();
                Ok(())
            }
            _ => session.append(input).await,
        };
        if let Err(e) = result {
            anstream::eprintln!("{}", crate::error::present(&e));
        }
    }
    session.close().await
}
