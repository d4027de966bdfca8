use crate::error::AldaError;
use alda_common::parsing;
use alda_common::parsing::Diagnostics;
use alda_common::score::{Score, ScoreUpdate};

pub mod commands;
pub mod error;
pub mod midi;
pub mod osc;
pub mod session;
pub mod supervisor;
pub mod system;
pub mod transmitter;
#[cfg(test)]
mod test_util;

fn source_error(diags: &Diagnostics, filename: &str, src: &str) -> anyhow::Error {
    let (line, column) = diags
        .first()
        .map(|d| d.message.span.line_column(src))
        .unwrap_or((1, 1));
    AldaError::Source {
        line,
        column,
        rendered: diags.render(filename, src),
    }
    .into()
}

/// Parse `src`, turning diagnostics into a rendered [AldaError::Source].
pub fn parse(filename: &str, src: &str) -> anyhow::Result<Vec<ScoreUpdate>> {
    parsing::parse(src).map_err(|diags| source_error(&diags, filename, src))
}

/// Parse `src` and apply it to `score`.
pub fn update(score: &mut Score, filename: &str, src: &str) -> anyhow::Result<()> {
    let updates = parse(filename, src)?;
    score
        .update(&updates)
        .map_err(|e| source_error(&e.to_diagnostics(), filename, src))
}

pub fn compile(filename: &str, src: &str) -> anyhow::Result<Score> {
    let mut score = Score::new();
    update(&mut score, filename, src)?;
    Ok(score)
}
