use crate::parsing::model::Span;
use crate::pitch::{KeySignature, WrittenPitch};
use crate::score::{
    CompileError, Duration, Event, NoteEvent, PartId, PartState, Score, stock_instrument,
};
use serde::Serialize;

/// One parsed unit of score input. [Score::update] folds a list of these into a score.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ScoreUpdate {
    PartDeclaration(PartDeclaration),
    Note(Note),
    Rest(Rest),
    Chord(Chord),
    Attribute(AttributeUpdate),
    Barline,
    Marker(Marker),
    AtMarker(AtMarker),
    Repeat(Repeat),
    OnRepetitions(OnRepetitions),
    Sequence(Sequence),
    VariableDefinition(VariableDefinition),
    VariableReference(VariableReference),
    Voice(VoiceMarker),
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct PartDeclaration {
    pub span: Span,
    pub names: Vec<String>,
    pub alias: Option<String>,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct Note {
    pub span: Span,
    pub pitch: WrittenPitch,
    pub duration: Duration,
    /// A slurred note sounds for its full written duration.
    pub slurred: bool,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct Rest {
    pub span: Span,
    pub duration: Duration,
}

/// Notes and rests that start together. Octave changes between members are allowed. The
/// optional duration becomes the default for members written without one.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct Chord {
    pub span: Span,
    pub members: Vec<ScoreUpdate>,
    pub duration: Option<Duration>,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub enum Attribute {
    OctaveSet(i32),
    OctaveUp,
    OctaveDown,
    Tempo(f64),
    /// Per-note velocity, 0..=1
    Volume(f64),
    TrackVolume(f64),
    Panning(f64),
    Quantization(f64),
    Transposition(i32),
    KeySignature(KeySignature),
    Duration(Duration),
}
impl Attribute {
    pub(crate) fn apply_to(&self, state: &mut PartState) {
        match self {
            Attribute::OctaveSet(o) => state.octave = *o,
            Attribute::OctaveUp => state.octave = state.octave.saturating_add(1),
            Attribute::OctaveDown => state.octave = state.octave.saturating_sub(1),
            Attribute::Tempo(t) => state.tempo = *t,
            Attribute::Volume(v) => state.volume = *v,
            Attribute::TrackVolume(v) => state.track_volume = *v,
            Attribute::Panning(p) => state.panning = *p,
            Attribute::Quantization(q) => state.quantization = *q,
            Attribute::Transposition(t) => state.transposition = *t,
            Attribute::KeySignature(k) => state.key_signature = k.clone(),
            Attribute::Duration(d) => state.duration = d.clone(),
        }
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct AttributeUpdate {
    pub span: Span,
    pub attribute: Attribute,
    /// Global attributes apply to every part, including parts declared later.
    pub global: bool,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct Marker {
    pub span: Span,
    pub name: String,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct AtMarker {
    pub span: Span,
    pub name: String,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct Repeat {
    pub span: Span,
    pub body: Box<ScoreUpdate>,
    pub times: u32,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct OnRepetitions {
    pub span: Span,
    /// Inclusive ranges of 1-based repetition numbers
    pub ranges: Vec<(u32, u32)>,
    pub body: Box<ScoreUpdate>,
}
impl OnRepetitions {
    pub fn applies_to(&self, repetition: u32) -> bool {
        self.ranges
            .iter()
            .any(|(first, last)| *first <= repetition && repetition <= *last)
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct Sequence {
    pub span: Span,
    pub events: Vec<ScoreUpdate>,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct VariableDefinition {
    pub span: Span,
    pub name: String,
    pub events: Vec<ScoreUpdate>,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct VariableReference {
    pub span: Span,
    pub name: String,
}

/// `Vn:` switches the current parts to voice `n`. `V0:` ends the voice group, and the part
/// continues from whichever voice ended last.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct VoiceMarker {
    pub span: Span,
    pub number: u32,
}

impl ScoreUpdate {
    pub fn apply(&self, score: &mut Score) -> Result<(), CompileError> {
        match self {
            ScoreUpdate::PartDeclaration(u) => u.apply(score),
            ScoreUpdate::Note(u) => u.apply(score),
            ScoreUpdate::Rest(u) => u.apply(score),
            ScoreUpdate::Chord(u) => u.apply(score),
            ScoreUpdate::Attribute(u) => u.apply(score),
            ScoreUpdate::Barline => Ok(()),
            ScoreUpdate::Marker(u) => u.apply(score),
            ScoreUpdate::AtMarker(u) => u.apply(score),
            ScoreUpdate::Repeat(u) => u.apply(score),
            ScoreUpdate::OnRepetitions(u) => u.apply(score),
            ScoreUpdate::Sequence(u) => score.update(&u.events),
            ScoreUpdate::VariableDefinition(u) => {
                score.variables.insert(u.name.clone(), u.events.clone());
                Ok(())
            }
            ScoreUpdate::VariableReference(u) => {
                let Some(events) = score.variables.get(&u.name).cloned() else {
                    return Err(CompileError::new(
                        u.span,
                        format!("undefined variable: {}", u.name),
                    ));
                };
                score.update(&events)
            }
            ScoreUpdate::Voice(u) => u.apply(score),
        }
    }
}

impl PartDeclaration {
    fn apply(&self, score: &mut Score) -> Result<(), CompileError> {
        for id in score.current_parts.clone() {
            score.end_voice_group(id);
        }
        // A lone name may refer to an alias defined earlier.
        if self.alias.is_none()
            && let [name] = self.names.as_slice()
            && let Some(parts) = score.aliases.get(name)
        {
            score.current_parts = parts.clone();
            return Ok(());
        }
        let mut instruments = Vec::new();
        for name in &self.names {
            let Some(instrument) = stock_instrument(name) else {
                return Err(CompileError::new(
                    self.span,
                    format!("unrecognized instrument: {name}"),
                ));
            };
            instruments.push((name, instrument));
        }
        if let Some(alias) = &self.alias {
            if let Some(parts) = score.aliases.get(alias) {
                let same = parts.len() == instruments.len()
                    && parts
                        .iter()
                        .zip(&instruments)
                        .all(|(id, (_, i))| std::ptr::eq(score.parts[id.0].instrument, *i));
                if !same {
                    return Err(CompileError::new(
                        self.span,
                        format!("the alias {alias:?} is already in use by a different part"),
                    ));
                }
                score.current_parts = parts.clone();
                return Ok(());
            }
            let ids: Vec<PartId> = instruments
                .into_iter()
                .map(|(name, instrument)| {
                    let id = score.add_part(name, instrument);
                    score.part_mut(id).alias = Some(alias.clone());
                    id
                })
                .collect();
            score.aliases.insert(alias.clone(), ids.clone());
            score.current_parts = ids;
            return Ok(());
        }
        // Without an alias, reuse the existing unaliased part for each instrument.
        let mut ids = Vec::new();
        for (name, instrument) in instruments {
            let existing = score
                .parts
                .iter()
                .find(|p| p.alias.is_none() && std::ptr::eq(p.instrument, instrument))
                .map(|p| p.id);
            ids.push(match existing {
                Some(id) => id,
                None => score.add_part(name, instrument),
            });
        }
        score.current_parts = ids;
        Ok(())
    }
}

/// Shared logic for notes and rests. `pitch` is `None` for rests.
fn add_note_or_rest(
    score: &mut Score,
    span: Span,
    duration: &Duration,
    pitch: Option<&WrittenPitch>,
    slurred: bool,
) -> Result<(), CompileError> {
    score.require_current_parts(span)?;
    let chord_mode = score.chord_mode;
    for id in score.current_parts.clone() {
        let state = &mut score.part_mut(id).state;
        // Durations are sticky: an explicit duration becomes the default for what follows.
        if !duration.is_empty() {
            state.duration = duration.clone();
        }
        let duration_ms = state.duration.ms(state.tempo);
        let offset = state.current_offset;
        let audible_duration = if slurred || pitch.is_none() {
            duration_ms
        } else {
            duration_ms * state.quantization
        };
        if chord_mode {
            // A chord ends when its last member stops sounding.
            state.chord_end = state.chord_end.max(offset + audible_duration);
        } else {
            state.last_offset = offset;
            state.current_offset += duration_ms;
        }
        let Some(pitch) = pitch else {
            continue;
        };
        let midi_note = pitch.midi_note(state.octave, &state.key_signature, state.transposition);
        let midi_note = u8::try_from(midi_note)
            .ok()
            .filter(|n| *n < 128)
            .ok_or_else(|| {
                CompileError::new(span, format!("MIDI note {midi_note} is out of range 0..127"))
            })?;
        let event = NoteEvent {
            part: id,
            offset,
            duration: duration_ms,
            audible_duration,
            midi_note,
            velocity: state.volume,
            track_volume: state.track_volume,
            panning: state.panning,
        };
        score.events.push(Event::Note(event));
    }
    Ok(())
}

impl Note {
    fn apply(&self, score: &mut Score) -> Result<(), CompileError> {
        add_note_or_rest(
            score,
            self.span,
            &self.duration,
            Some(&self.pitch),
            self.slurred,
        )
    }
}

impl Rest {
    fn apply(&self, score: &mut Score) -> Result<(), CompileError> {
        add_note_or_rest(score, self.span, &self.duration, None, false)
    }
}

impl Chord {
    fn apply(&self, score: &mut Score) -> Result<(), CompileError> {
        score.require_current_parts(self.span)?;
        for id in score.current_parts.clone() {
            let state = &mut score.part_mut(id).state;
            state.chord_end = state.current_offset;
            if let Some(d) = &self.duration {
                state.duration = d.clone();
            }
        }
        score.chord_mode = true;
        let result = score.update(&self.members);
        score.chord_mode = false;
        result?;
        for id in score.current_parts.clone() {
            let state = &mut score.part_mut(id).state;
            state.last_offset = state.current_offset;
            state.current_offset = state.chord_end;
        }
        Ok(())
    }
}

impl AttributeUpdate {
    fn apply(&self, score: &mut Score) -> Result<(), CompileError> {
        if self.global {
            for part in &mut score.parts {
                self.attribute.apply_to(&mut part.state);
            }
            score.global_attributes.push(self.attribute.clone());
            return Ok(());
        }
        score.require_current_parts(self.span)?;
        for id in score.current_parts.clone() {
            self.attribute.apply_to(&mut score.part_mut(id).state);
        }
        Ok(())
    }
}

impl Marker {
    fn apply(&self, score: &mut Score) -> Result<(), CompileError> {
        score.require_current_parts(self.span)?;
        let first = score.current_parts[0];
        let offset = score.parts[first.0].state.current_offset;
        score.markers.insert(self.name.clone(), offset);
        Ok(())
    }
}

impl AtMarker {
    fn apply(&self, score: &mut Score) -> Result<(), CompileError> {
        score.require_current_parts(self.span)?;
        let Some(offset) = score.markers.get(&self.name).copied() else {
            return Err(CompileError::new(
                self.span,
                format!("marker undefined: {}", self.name),
            ));
        };
        for id in score.current_parts.clone() {
            let state = &mut score.part_mut(id).state;
            state.last_offset = state.current_offset;
            state.current_offset = offset;
        }
        Ok(())
    }
}

impl Repeat {
    fn apply(&self, score: &mut Score) -> Result<(), CompileError> {
        for repetition in 1..=self.times {
            for id in score.current_parts.clone() {
                score.part_mut(id).state.repetition = repetition;
            }
            self.body.apply(score)?;
        }
        Ok(())
    }
}

impl OnRepetitions {
    fn apply(&self, score: &mut Score) -> Result<(), CompileError> {
        let matching: Vec<PartId> = score
            .current_parts
            .iter()
            .copied()
            .filter(|id| self.applies_to(score.parts[id.0].state.repetition))
            .collect();
        if matching.is_empty() {
            return Ok(());
        }
        let saved = std::mem::replace(&mut score.current_parts, matching);
        let result = self.body.apply(score);
        score.current_parts = saved;
        result
    }
}

impl VoiceMarker {
    fn apply(&self, score: &mut Score) -> Result<(), CompileError> {
        score.require_current_parts(self.span)?;
        for id in score.current_parts.clone() {
            if self.number == 0 {
                score.end_voice_group(id);
            } else {
                score.switch_voice(id, self.number);
            }
        }
        Ok(())
    }
}
