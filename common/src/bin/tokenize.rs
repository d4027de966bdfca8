use alda_common::parsing::{pass1, pass2};
use clap::Parser;
use std::{fs, io};

#[derive(Parser)]
#[command(version, about, long_about = None)]
/// Show the tokens or score updates parsed from an alda file, mainly for debugging the parser.
/// Set CLICOLOR_FORCE to force color output; set NO_COLOR to force non-color output.
struct Cli {
    #[arg(long)]
    /// Show JSON output instead of one token per line
    json: bool,
    #[arg(long)]
    /// Show score updates instead of tokens
    updates: bool,
    filename: String,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let data = fs::read(&cli.filename)?;
    let input = str::from_utf8(&data)?;
    if cli.updates {
        match pass2::parse2(input) {
            Err(diags) => anstream::eprintln!("{}", diags.render(&cli.filename, input)),
            Ok(updates) => serde_json::to_writer_pretty(io::stdout(), &updates)?,
        }
        return Ok(());
    }
    let r = pass1::parse1(input);
    if cli.json {
        serde_json::to_writer_pretty(io::stdout(), &r)?;
    } else {
        match r {
            Err(diags) => anstream::eprintln!("{}", diags.render(&cli.filename, input)),
            Ok(tokens) => {
                for t in tokens {
                    println!("{}: {:?} ⟨{}⟩", t.span, t.value.t, t.value.raw.escape_debug())
                }
            }
        }
    }
    Ok(())
}
