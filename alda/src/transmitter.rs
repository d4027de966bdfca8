// Turn a compiled score into an OSC bundle and deliver it to a player. All offsets sent to the
// player are whole milliseconds relative to the start of the transmitted window.

use crate::error::AldaError;
use crate::osc::{self, OscArg, OscBundle, OscMessage, OscPacket};
use alda_common::score::{Event, PartId, Score};
use std::collections::BTreeMap;
use std::path::Path;

/// Which part of a score to send and what the player should do with it.
#[derive(Debug, Clone, Default)]
pub struct TransmitOptions {
    /// Start of the time window: `M:SS[.fff]` or a marker name
    pub from: Option<String>,
    /// End of the time window (exclusive)
    pub to: Option<String>,
    /// Index window over the score's events, applied before sorting
    pub from_index: Option<usize>,
    pub to_index: Option<usize>,
    /// Subtracted from each event's offset, by part
    pub sync_offsets: BTreeMap<PartId, f64>,
    /// Send the events without starting playback.
    pub load_only: bool,
    /// Ask the player to shut down once it has finished playing.
    pub one_off: bool,
}

/// Scale a value in `[0, 1]` to a MIDI value using round-half-to-even.
fn to_midi_value(v: f64) -> i32 {
    (v * 127.0).round_ties_even() as i32
}

fn track_message(track: u32, what: &str, args: Vec<OscArg>) -> OscPacket {
    OscMessage::new(format!("/track/{track}/midi/{what}"), args).into()
}

fn system_message(what: &str, args: Vec<OscArg>) -> OscPacket {
    OscMessage::new(format!("/system/{what}"), args).into()
}

fn offset_ref(score: &Score, reference: Option<&str>) -> anyhow::Result<Option<f64>> {
    reference
        .map(|r| {
            score
                .interpret_offset_reference(r)
                .map_err(|e| AldaError::user(e.message))
        })
        .transpose()
}

pub fn score_to_bundle(score: &Score, options: &TransmitOptions) -> anyhow::Result<OscBundle> {
    log::debug!("transmission options: {options:?}");
    let start = offset_ref(score, options.from.as_deref())?.unwrap_or(0.0);
    let end = offset_ref(score, options.to.as_deref())?.unwrap_or(f64::INFINITY);
    let to_index = options
        .to_index
        .unwrap_or(score.events.len())
        .min(score.events.len());
    let from_index = options.from_index.unwrap_or(0).min(to_index);
    let mut events: Vec<&Event> = score.events[from_index..to_index].iter().collect();
    // Stable, so simultaneous events keep generation order.
    events.sort_by(|a, b| a.offset().total_cmp(&b.offset()));

    let mut elements = Vec::new();
    let mut current_volume = BTreeMap::new();
    let mut current_panning = BTreeMap::new();
    for part in &score.parts {
        elements.push(track_message(
            part.track,
            "patch",
            vec![0.into(), (part.instrument.program as i32).into()],
        ));
        if part.instrument.percussion {
            elements.push(track_message(part.track, "percussion", vec![0.into()]));
        }
        current_volume.insert(part.track, -1.0);
        current_panning.insert(part.track, -1.0);
    }

    let mut score_length = 0.0f64;
    for event in events {
        let offset = event.offset();
        if offset < start || offset >= end {
            continue;
        }
        match event {
            Event::Note(note) => {
                let Some(track) = score.track(note.part) else {
                    anyhow::bail!("note refers to unknown part {:?}", note.part);
                };
                let sync = options.sync_offsets.get(&note.part).copied().unwrap_or(0.0);
                let effective = (offset - start - sync).round().max(0.0);
                let at = OscArg::Int(effective as i32);
                if current_volume.insert(track, note.track_volume) != Some(note.track_volume) {
                    elements.push(track_message(
                        track,
                        "volume",
                        vec![at.clone(), to_midi_value(note.track_volume).into()],
                    ));
                }
                if current_panning.insert(track, note.panning) != Some(note.panning) {
                    elements.push(track_message(
                        track,
                        "panning",
                        vec![at.clone(), to_midi_value(note.panning).into()],
                    ));
                }
                elements.push(track_message(
                    track,
                    "note",
                    vec![
                        at,
                        (note.midi_note as i32).into(),
                        (note.duration.round() as i32).into(),
                        (note.audible_duration.round() as i32).into(),
                        to_midi_value(note.velocity).into(),
                    ],
                ));
                score_length = score_length.max(effective + note.audible_duration);
            }
        }
    }

    if !options.load_only {
        elements.push(system_message("play", vec![]));
    }
    if options.one_off {
        let at = (score_length + 1000.0).round() as i32;
        elements.push(system_message("shutdown", vec![at.into()]));
    }
    Ok(OscBundle::now(elements))
}

/// Sends to the player listening on `port`. Every call opens its own connection.
#[derive(Debug, Clone, Copy)]
pub struct OscTransmitter {
    pub port: u16,
}
impl OscTransmitter {
    pub fn new(port: u16) -> Self {
        Self { port }
    }

    pub async fn transmit_score(
        &self,
        score: &Score,
        options: &TransmitOptions,
    ) -> anyhow::Result<()> {
        let bundle = score_to_bundle(score, options)?;
        log::debug!(
            "sending bundle with {} messages to port {}",
            bundle.elements.len(),
            self.port
        );
        osc::send(self.port, &bundle.into()).await
    }

    pub async fn ping(&self) -> anyhow::Result<()> {
        osc::send(self.port, &OscMessage::new("/ping", vec![]).into()).await
    }

    pub async fn stop(&self) -> anyhow::Result<()> {
        osc::send(self.port, &system_message("stop", vec![])).await
    }

    /// Ask the player to exit after `offset_ms`.
    pub async fn shutdown(&self, offset_ms: i32) -> anyhow::Result<()> {
        osc::send(self.port, &system_message("shutdown", vec![offset_ms.into()])).await
    }

    /// Ask the player to write what it has loaded to a MIDI file at `path`.
    pub async fn export(&self, path: &Path) -> anyhow::Result<()> {
        let path = path.to_string_lossy();
        osc::send(
            self.port,
            &system_message("midi/export", vec![path.as_ref().into()]),
        )
        .await
    }
}

#[cfg(test)]
mod tests;
