use alda_common::score::{Event, Part, Score};
use anyhow::{anyhow, bail};
use midly::MetaMessage::{EndOfTrack, Tempo, TrackName};
use midly::num::{u4, u7, u24, u28};
use midly::{Arena, Format, Header, MidiMessage, Smf, Timing, TrackEvent, TrackEventKind};
use std::io;
use std::path::Path;

// Timing: a fixed tempo of 120 beats per minute (500,000 microseconds per beat) with 500 ticks per
// beat makes one tick equal to one millisecond, so score offsets map directly to ticks.
//
// Track 0 holds the tempo. Each part gets its own track and channel. Percussion parts use channel
// 9; other parts are assigned channels in declaration order, skipping 9.

const TICKS_PER_BEAT: u16 = 500;
const MICROSECONDS_PER_BEAT: u32 = 500_000;
const PERCUSSION_CHANNEL: u8 = 9;
const CONTROLLER_VOLUME: u8 = 7;
const CONTROLLER_PAN: u8 = 10;
const MAX_TICKS: u32 = 0x0fff_ffff;

/// Ordering among messages at the same tick: a note ends before the same note starts again, and
/// controller changes apply to the note they precede.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Rank {
    NoteOff,
    Controller,
    NoteOn,
}

struct Timed {
    time: u32,
    rank: Rank,
    message: MidiMessage,
}

fn to_midi_value(v: f64) -> u7 {
    ((v * 127.0).round_ties_even().clamp(0.0, 127.0) as u8).into()
}

fn ms_to_ticks(ms: f64) -> anyhow::Result<u32> {
    let ticks = ms.round();
    if !(0.0..=MAX_TICKS as f64).contains(&ticks) {
        bail!("time overflow at {ms}ms");
    }
    Ok(ticks as u32)
}

struct MidiGenerator<'a> {
    arena: &'a Arena,
    score: &'a Score,
    last_time: u32,
    tracks: Vec<Vec<TrackEvent<'a>>>,
}

impl<'a> MidiGenerator<'a> {
    fn new(score: &'a Score, arena: &'a Arena) -> Self {
        Self {
            arena,
            score,
            last_time: 0,
            tracks: Default::default(),
        }
    }

    fn channels(&self) -> Vec<u4> {
        let melodic: Vec<u8> = (0..16).filter(|c| *c != PERCUSSION_CHANNEL).collect();
        let mut next = 0;
        let channels: Vec<u4> = self
            .score
            .parts
            .iter()
            .map(|p| -> u4 {
                if p.instrument.percussion {
                    return PERCUSSION_CHANNEL.into();
                }
                let channel = melodic[next % melodic.len()];
                next += 1;
                channel.into()
            })
            .collect();
        if next > melodic.len() {
            log::warn!("more than {} melodic parts; MIDI channels will be shared", melodic.len());
        }
        channels
    }

    fn timed_messages(&self, part: &Part) -> anyhow::Result<Vec<Timed>> {
        let mut result = Vec::new();
        let mut volume = None;
        let mut panning = None;
        let notes = self.score.events.iter().filter(|e| e.part() == part.id);
        for event in notes {
            match event {
                Event::Note(note) => {
                    let time = ms_to_ticks(note.offset)?;
                    for (controller, value, last) in [
                        (CONTROLLER_VOLUME, note.track_volume, &mut volume),
                        (CONTROLLER_PAN, note.panning, &mut panning),
                    ] {
                        if *last != Some(value) {
                            *last = Some(value);
                            result.push(Timed {
                                time,
                                rank: Rank::Controller,
                                message: MidiMessage::Controller {
                                    controller: controller.into(),
                                    value: to_midi_value(value),
                                },
                            });
                        }
                    }
                    let key = u7::try_from(note.midi_note)
                        .ok_or_else(|| anyhow!("note {} out of range", note.midi_note))?;
                    result.push(Timed {
                        time,
                        rank: Rank::NoteOn,
                        message: MidiMessage::NoteOn {
                            key,
                            vel: to_midi_value(note.velocity),
                        },
                    });
                    result.push(Timed {
                        time: ms_to_ticks(note.offset + note.audible_duration)?,
                        rank: Rank::NoteOff,
                        message: MidiMessage::NoteOff { key, vel: 0.into() },
                    });
                }
            }
        }
        result.sort_by_key(|t| (t.time, t.rank));
        Ok(result)
    }

    fn generate(mut self) -> anyhow::Result<Smf<'a>> {
        self.tracks.push(vec![TrackEvent {
            delta: 0.into(),
            kind: TrackEventKind::Meta(Tempo(u24::from(MICROSECONDS_PER_BEAT))),
        }]);
        let score = self.score;
        for (part, channel) in score.parts.iter().zip(self.channels()) {
            let mut track = vec![TrackEvent {
                delta: 0.into(),
                kind: TrackEventKind::Meta(TrackName(self.arena.add(part.name.as_bytes()))),
            }];
            if !part.instrument.percussion {
                track.push(TrackEvent {
                    delta: 0.into(),
                    kind: TrackEventKind::Midi {
                        channel,
                        message: MidiMessage::ProgramChange {
                            program: part.instrument.program.into(),
                        },
                    },
                });
            }
            let mut last = 0u32;
            for t in self.timed_messages(part)? {
                if t.time < last {
                    bail!("time must be monotonically non-decreasing");
                }
                track.push(TrackEvent {
                    delta: u28::from(t.time - last),
                    kind: TrackEventKind::Midi {
                        channel,
                        message: t.message,
                    },
                });
                last = t.time;
            }
            self.last_time = self.last_time.max(last);
            self.tracks.push(track);
        }
        for track in self.tracks.iter_mut() {
            let elapsed: u32 = track.iter().map(|e| e.delta.as_int()).sum();
            track.push(TrackEvent {
                delta: u28::from(self.last_time - elapsed),
                kind: TrackEventKind::Meta(EndOfTrack),
            });
        }
        let mut smf = Smf::new(Header::new(
            Format::Parallel,
            Timing::Metrical(TICKS_PER_BEAT.into()),
        ));
        smf.tracks = self.tracks;
        Ok(smf)
    }
}

/// Write `score` as a Standard MIDI File to `out`.
pub fn write(score: &Score, out: impl io::Write) -> anyhow::Result<()> {
    let arena = Arena::new();
    let smf = MidiGenerator::new(score, &arena).generate()?;
    smf.write_std(out)?;
    Ok(())
}

pub fn save(score: &Score, path: impl AsRef<Path>) -> anyhow::Result<()> {
    let arena = Arena::new();
    let smf = MidiGenerator::new(score, &arena).generate()?;
    smf.save(&path)?;
    log::info!("MIDI file written to {}", path.as_ref().display());
    Ok(())
}

#[cfg(test)]
mod tests;
