use alda::commands::{self, Commands, Context};
use alda::error;
use alda::system::Dirs;
use clap::CommandFactory;
use clap::{Parser, Subcommand};
use clap_complete::Shell;
use log::LevelFilter;
use std::{env, io, process};

/// Compile alda scores and play them on alda-player processes.
/// Logging is controlled with -v or RUST_LOG; see docs for the env_logger crate.
/// Without either, only errors are logged. Each -v raises the level: warn, info, debug.
/// RUST_LOG, if set, takes precedence over -v.
/// Set RUST_LOG=alda::module::path=level to see messages for a given module.
#[derive(Parser)]
#[command(name = "alda", version, about, long_about = None, verbatim_doc_comment)]
struct Cli {
    /// Increase log verbosity; may be repeated
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: TopLevel,
}

#[derive(Subcommand)]
enum TopLevel {
    #[command(flatten)]
    Alda(Commands),
    /// Generate shell completion
    Completion {
        /// shell
        shell: Shell,
    },
}

fn log_level(verbose: u8) -> LevelFilter {
    match verbose {
        0 => LevelFilter::Error,
        1 => LevelFilter::Warn,
        2 => LevelFilter::Info,
        _ => LevelFilter::Debug,
    }
}

async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut log_builder = env_logger::builder();
    if env::var("RUST_LOG").is_err() {
        log_builder.filter_level(log_level(cli.verbose));
    }
    log_builder.init();

    let command = match cli.command {
        TopLevel::Completion { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "alda", &mut io::stdout());
            return Ok(());
        }
        TopLevel::Alda(command) => command,
    };
    let ctx = Context::new(Dirs::from_env()?);
    commands::run(command, &ctx, &mut io::stdout()).await
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        anstream::eprintln!("{}", error::present(&e));
        process::exit(1);
    }
}
