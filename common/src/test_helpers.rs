use crate::parsing;
use crate::score::{Event, NoteEvent, Score};

/// Parse and compile `src` into a fresh score, rendering any problems into the error.
pub fn compile(src: &str) -> anyhow::Result<Score> {
    let updates = parsing::parse(src).map_err(|d| anyhow::anyhow!("{}", d.render("test", src)))?;
    let mut score = Score::new();
    score
        .update(&updates)
        .map_err(|e| anyhow::anyhow!("{}", e.to_diagnostics().render("test", src)))?;
    Ok(score)
}

pub fn notes(score: &Score) -> Vec<&NoteEvent> {
    score
        .events
        .iter()
        .map(|e| match e {
            Event::Note(n) => n,
        })
        .collect()
}
