// The score compiler. A score is built by folding a list of [ScoreUpdate] values into it with
// [Score::update]. Each update mutates per-part state (offset, octave, volume, and so on) and
// notes append [Event]s that snapshot the attributes needed for transmission. Events are kept in
// the order in which they were generated, which is part-declaration order within each update;
// consumers that need chronological order sort by offset.

use crate::parsing::model::Span;
use crate::parsing::{Diagnostic, Diagnostics, code};
use crate::pitch::KeySignature;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::fmt::{Display, Formatter};
use winnow::Parser;
use winnow::ascii::digit1;
use winnow::combinator::{opt, preceded};

mod duration;
mod instruments;
mod updates;
pub use duration::*;
pub use instruments::*;
pub use updates::*;


pub const DEFAULT_TEMPO: f64 = 120.0;
pub const DEFAULT_OCTAVE: i32 = 4;
pub const DEFAULT_VOLUME: f64 = 1.0;
pub const DEFAULT_TRACK_VOLUME: f64 = 100.0 / 127.0;
pub const DEFAULT_PANNING: f64 = 0.5;
pub const DEFAULT_QUANTIZATION: f64 = 1.0;

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct CompileError {
    pub span: Option<Span>,
    pub message: String,
}
impl CompileError {
    pub fn new(span: impl Into<Option<Span>>, message: impl Into<String>) -> Self {
        Self {
            span: span.into(),
            message: message.into(),
        }
    }

    /// One-based line and column of the offending update within `src`.
    pub fn source_context(&self, src: &str) -> Option<(usize, usize)> {
        self.span.map(|s| s.line_column(src))
    }

    pub fn to_diagnostics(&self) -> Diagnostics {
        let diags = Diagnostics::new();
        diags.push(Diagnostic::new(
            code::COMPILE,
            self.span.unwrap_or_default(),
            &self.message,
        ));
        diags
    }
}
impl Display for CompileError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}
impl std::error::Error for CompileError {}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PartId(pub usize);

/// Compositional state of one part. Attribute updates change these fields; notes read them.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct PartState {
    pub current_offset: f64,
    pub last_offset: f64,
    pub tempo: f64,
    pub octave: i32,
    pub volume: f64,
    pub track_volume: f64,
    pub panning: f64,
    pub quantization: f64,
    pub duration: Duration,
    pub key_signature: KeySignature,
    pub transposition: i32,
    #[serde(skip)]
    pub(crate) repetition: u32,
    #[serde(skip)]
    pub(crate) chord_end: f64,
}
impl Default for PartState {
    fn default() -> Self {
        Self {
            current_offset: 0.0,
            last_offset: 0.0,
            tempo: DEFAULT_TEMPO,
            octave: DEFAULT_OCTAVE,
            volume: DEFAULT_VOLUME,
            track_volume: DEFAULT_TRACK_VOLUME,
            panning: DEFAULT_PANNING,
            quantization: DEFAULT_QUANTIZATION,
            duration: Duration::note_length(4.0, 0),
            key_signature: Default::default(),
            transposition: 0,
            repetition: 0,
            chord_end: 0.0,
        }
    }
}

#[derive(Serialize, Debug, Clone)]
pub struct Part {
    pub id: PartId,
    /// The identifier used to declare the part, e.g. `piano`
    pub name: String,
    pub alias: Option<String>,
    pub instrument: &'static Instrument,
    /// Track numbers are dense, start at 1, and are never reused.
    pub track: u32,
    pub state: PartState,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct NoteEvent {
    pub part: PartId,
    pub offset: f64,
    pub duration: f64,
    pub audible_duration: f64,
    pub midi_note: u8,
    pub velocity: f64,
    pub track_volume: f64,
    pub panning: f64,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Event {
    Note(NoteEvent),
}
impl Event {
    pub fn offset(&self) -> f64 {
        match self {
            Event::Note(e) => e.offset,
        }
    }

    pub fn part(&self) -> PartId {
        match self {
            Event::Note(e) => e.part,
        }
    }
}

#[derive(Serialize, Debug, Default)]
pub struct Score {
    pub parts: Vec<Part>,
    pub events: Vec<Event>,
    pub markers: BTreeMap<String, f64>,
    aliases: BTreeMap<String, Vec<PartId>>,
    #[serde(skip)]
    current_parts: Vec<PartId>,
    #[serde(skip)]
    variables: HashMap<String, Vec<ScoreUpdate>>,
    /// Global attributes, replayed onto parts declared after they were set
    #[serde(skip)]
    global_attributes: Vec<Attribute>,
    #[serde(skip)]
    chord_mode: bool,
    #[serde(skip)]
    voice_groups: HashMap<PartId, VoiceGroup>,
}

/// The voices of one part. Each voice has its own copy of the part's state, starting from the
/// state the part had when the group began.
#[derive(Debug, Clone)]
struct VoiceGroup {
    start: PartState,
    current: Option<u32>,
    voices: BTreeMap<u32, PartState>,
}

impl Score {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply updates in order. On error, the score may be partially updated and should be
    /// discarded.
    pub fn update(&mut self, updates: &[ScoreUpdate]) -> Result<(), CompileError> {
        updates.iter().try_for_each(|u| u.apply(self))
    }

    /// Current offset of every part, in milliseconds.
    pub fn part_offsets(&self) -> BTreeMap<PartId, f64> {
        self.parts
            .iter()
            .map(|p| (p.id, p.state.current_offset))
            .collect()
    }

    pub fn part(&self, id: PartId) -> Option<&Part> {
        self.parts.get(id.0)
    }

    pub fn track(&self, id: PartId) -> Option<u32> {
        self.part(id).map(|p| p.track)
    }

    pub fn current_parts(&self) -> &[PartId] {
        &self.current_parts
    }

    /// Resolve a time marking (`M:SS` or `M:SS.fff`) or a marker name to an offset in
    /// milliseconds.
    pub fn interpret_offset_reference(&self, reference: &str) -> Result<f64, CompileError> {
        if let Some(ms) = parse_time_marking(reference) {
            return Ok(ms);
        }
        self.markers.get(reference).copied().ok_or_else(|| {
            CompileError::new(
                None,
                format!("{reference:?} is neither a time marking (M:SS) nor a defined marker"),
            )
        })
    }

    fn part_mut(&mut self, id: PartId) -> &mut Part {
        &mut self.parts[id.0]
    }

    fn add_part(&mut self, name: &str, instrument: &'static Instrument) -> PartId {
        let id = PartId(self.parts.len());
        let mut part = Part {
            id,
            name: name.to_string(),
            alias: None,
            instrument,
            track: self.parts.len() as u32 + 1,
            state: Default::default(),
        };
        for attribute in &self.global_attributes {
            attribute.apply_to(&mut part.state);
        }
        log::debug!("new part {name} on track {}", part.track);
        self.parts.push(part);
        id
    }

    pub(crate) fn switch_voice(&mut self, id: PartId, number: u32) {
        let part = &mut self.parts[id.0];
        let group = self.voice_groups.entry(id).or_insert_with(|| VoiceGroup {
            start: part.state.clone(),
            current: None,
            voices: BTreeMap::new(),
        });
        if let Some(current) = group.current {
            group.voices.insert(current, part.state.clone());
        }
        part.state = group
            .voices
            .remove(&number)
            .unwrap_or_else(|| group.start.clone());
        group.current = Some(number);
    }

    /// Leave the part in the state of the voice that ends last.
    pub(crate) fn end_voice_group(&mut self, id: PartId) {
        let Some(mut group) = self.voice_groups.remove(&id) else {
            return;
        };
        let part = &mut self.parts[id.0];
        if let Some(current) = group.current {
            group.voices.insert(current, part.state.clone());
        }
        if let Some(latest) = group
            .voices
            .into_values()
            .max_by(|a, b| a.current_offset.total_cmp(&b.current_offset))
        {
            part.state = latest;
        }
    }

    fn require_current_parts(&self, span: Span) -> Result<(), CompileError> {
        if self.current_parts.is_empty() {
            Err(CompileError::new(
                span,
                "no part has been declared; start with e.g. `piano:`",
            ))
        } else {
            Ok(())
        }
    }
}

/// Parse `M:SS` or `M:SS.fff` into milliseconds.
fn parse_time_marking(s: &str) -> Option<f64> {
    let mut input = s;
    let parsed: winnow::Result<(&str, char, &str, Option<&str>)> =
        (digit1, ':', digit1, opt(preceded('.', digit1))).parse_next(&mut input);
    let (minutes, _, seconds, frac) = parsed.ok()?;
    if !input.is_empty() {
        return None;
    }
    let minutes: f64 = minutes.parse().ok()?;
    let seconds: f64 = match frac {
        None => seconds.parse().ok()?,
        Some(frac) => format!("{seconds}.{frac}").parse().ok()?,
    };
    Some((minutes * 60.0 + seconds) * 1000.0)
}
