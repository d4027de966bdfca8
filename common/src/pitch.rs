use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NoteLetter {
    A,
    B,
    C,
    D,
    E,
    F,
    G,
}
impl NoteLetter {
    pub const ALL: [NoteLetter; 7] = [
        NoteLetter::A,
        NoteLetter::B,
        NoteLetter::C,
        NoteLetter::D,
        NoteLetter::E,
        NoteLetter::F,
        NoteLetter::G,
    ];

    pub fn from_char(ch: char) -> Option<Self> {
        Some(match ch.to_ascii_lowercase() {
            'a' => NoteLetter::A,
            'b' => NoteLetter::B,
            'c' => NoteLetter::C,
            'd' => NoteLetter::D,
            'e' => NoteLetter::E,
            'f' => NoteLetter::F,
            'g' => NoteLetter::G,
            _ => return None,
        })
    }

    /// Semitones above C in the same octave.
    pub fn interval(self) -> i32 {
        match self {
            NoteLetter::C => 0,
            NoteLetter::D => 2,
            NoteLetter::E => 4,
            NoteLetter::F => 5,
            NoteLetter::G => 7,
            NoteLetter::A => 9,
            NoteLetter::B => 11,
        }
    }
}
impl Display for NoteLetter {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let ch = match self {
            NoteLetter::A => 'a',
            NoteLetter::B => 'b',
            NoteLetter::C => 'c',
            NoteLetter::D => 'd',
            NoteLetter::E => 'e',
            NoteLetter::F => 'f',
            NoteLetter::G => 'g',
        };
        write!(f, "{ch}")
    }
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Accidental {
    Flat,
    Natural,
    Sharp,
}
impl Accidental {
    pub fn from_char(ch: char) -> Option<Self> {
        match ch {
            '-' => Some(Accidental::Flat),
            '_' => Some(Accidental::Natural),
            '+' => Some(Accidental::Sharp),
            _ => None,
        }
    }

    fn semitones(self) -> i32 {
        match self {
            Accidental::Flat => -1,
            Accidental::Natural => 0,
            Accidental::Sharp => 1,
        }
    }
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScaleType {
    Ionian,
    Dorian,
    Phrygian,
    Lydian,
    Mixolydian,
    Aeolian,
    Locrian,
}
impl ScaleType {
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "major" | "ionian" => ScaleType::Ionian,
            "minor" | "aeolian" => ScaleType::Aeolian,
            "dorian" => ScaleType::Dorian,
            "phrygian" => ScaleType::Phrygian,
            "lydian" => ScaleType::Lydian,
            "mixolydian" => ScaleType::Mixolydian,
            "locrian" => ScaleType::Locrian,
            _ => return None,
        })
    }

    /// Position of F in the circle of fifths for this mode; other letters follow in the order of
    /// sharps.
    fn circle_start(self) -> i32 {
        match self {
            ScaleType::Ionian => -1,
            ScaleType::Dorian => -3,
            ScaleType::Phrygian => -5,
            ScaleType::Lydian => 0,
            ScaleType::Mixolydian => -2,
            ScaleType::Aeolian => -4,
            ScaleType::Locrian => -6,
        }
    }
}

const ORDER_OF_SHARPS: [NoteLetter; 7] = [
    NoteLetter::F,
    NoteLetter::C,
    NoteLetter::G,
    NoteLetter::D,
    NoteLetter::A,
    NoteLetter::E,
    NoteLetter::B,
];
const ORDER_OF_FLATS: [NoteLetter; 7] = [
    NoteLetter::B,
    NoteLetter::E,
    NoteLetter::A,
    NoteLetter::D,
    NoteLetter::G,
    NoteLetter::C,
    NoteLetter::F,
];

/// Accidentals applied to letters that are written without explicit accidentals.
#[derive(Serialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct KeySignature(pub BTreeMap<NoteLetter, Vec<Accidental>>);

impl KeySignature {
    pub fn from_circle_of_fifths(fifths: i32) -> Self {
        let (order, accidental) = if fifths >= 0 {
            (ORDER_OF_SHARPS, Accidental::Sharp)
        } else {
            (ORDER_OF_FLATS, Accidental::Flat)
        };
        let mut result = BTreeMap::new();
        for i in 0..fifths.unsigned_abs() as usize {
            result
                .entry(order[i % order.len()])
                .or_insert_with(Vec::new)
                .push(accidental);
        }
        Self(result)
    }

    pub fn from_scale(tonic: NoteLetter, accidentals: &[Accidental], scale: ScaleType) -> Self {
        let position = ORDER_OF_SHARPS
            .iter()
            .position(|x| *x == tonic)
            .unwrap_or_default() as i32;
        let mut key = Self::from_circle_of_fifths(scale.circle_start() + position);
        for accidental in accidentals {
            key = match accidental {
                Accidental::Flat => key.shift(Accidental::Flat, Accidental::Sharp),
                Accidental::Sharp => key.shift(Accidental::Sharp, Accidental::Flat),
                Accidental::Natural => key,
            };
        }
        key
    }

    /// Move every letter one semitone in the direction of `this`. An accidental of the
    /// opposite kind is cancelled rather than stacked.
    fn shift(&self, this: Accidental, that: Accidental) -> Self {
        let mut result = BTreeMap::new();
        for letter in NoteLetter::ALL {
            let Some(existing) = self.0.get(&letter) else {
                result.insert(letter, vec![this]);
                continue;
            };
            let mut accidentals = existing.clone();
            if let Some(pos) = accidentals.iter().position(|x| *x == that) {
                accidentals.remove(pos);
            } else {
                accidentals.push(this);
            }
            if !accidentals.is_empty() {
                result.insert(letter, accidentals);
            }
        }
        Self(result)
    }

    pub fn accidentals(&self, letter: NoteLetter) -> &[Accidental] {
        self.0.get(&letter).map(Vec::as_slice).unwrap_or_default()
    }
}
impl Display for KeySignature {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let mut first = true;
        for (letter, accidentals) in &self.0 {
            if !first {
                write!(f, " ")?;
            }
            first = false;
            write!(f, "{letter}")?;
            for a in accidentals {
                let ch = match a {
                    Accidental::Flat => '-',
                    Accidental::Natural => '_',
                    Accidental::Sharp => '+',
                };
                write!(f, "{ch}")?;
            }
        }
        Ok(())
    }
}

/// A pitch as written: a letter with optional explicit accidentals.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct WrittenPitch {
    pub letter: NoteLetter,
    /// `None` means "use the key signature".
    pub accidentals: Option<Vec<Accidental>>,
}
impl WrittenPitch {
    /// MIDI note number before range checking. Octave and transposition are unbounded, so the
    /// result may be far outside 0..=127.
    pub fn midi_note(&self, octave: i32, key: &KeySignature, transposition: i32) -> i64 {
        let accidentals = match &self.accidentals {
            Some(a) => a.as_slice(),
            None => key.accidentals(self.letter),
        };
        let semitones: i64 = accidentals.iter().map(|a| i64::from(a.semitones())).sum();
        let base = (i64::from(octave) + 1) * 12 + i64::from(self.letter.interval());
        base + semitones + i64::from(transposition)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(entries: &[(NoteLetter, Accidental)]) -> KeySignature {
        let mut map = BTreeMap::new();
        for (l, a) in entries {
            map.entry(*l).or_insert_with(Vec::new).push(*a);
        }
        KeySignature(map)
    }

    #[test]
    fn test_circle_of_fifths() {
        use Accidental::*;
        use NoteLetter::*;
        assert_eq!(KeySignature::from_circle_of_fifths(0), KeySignature::default());
        assert_eq!(
            KeySignature::from_circle_of_fifths(2),
            key(&[(F, Sharp), (C, Sharp)])
        );
        assert_eq!(
            KeySignature::from_circle_of_fifths(-3),
            key(&[(B, Flat), (E, Flat), (A, Flat)])
        );
        // Past seven, letters pick up double accidentals.
        assert_eq!(
            KeySignature::from_circle_of_fifths(8).accidentals(F),
            [Sharp, Sharp]
        );
    }

    #[test]
    fn test_from_scale() {
        use Accidental::*;
        use NoteLetter::*;
        assert_eq!(
            KeySignature::from_scale(C, &[], ScaleType::Ionian),
            KeySignature::default()
        );
        assert_eq!(
            KeySignature::from_scale(A, &[], ScaleType::Aeolian),
            KeySignature::default()
        );
        assert_eq!(
            KeySignature::from_scale(D, &[], ScaleType::Ionian),
            key(&[(F, Sharp), (C, Sharp)])
        );
        assert_eq!(
            KeySignature::from_scale(F, &[], ScaleType::Ionian),
            key(&[(B, Flat)])
        );
        // E flat major: B, E, A flat
        assert_eq!(
            KeySignature::from_scale(E, &[Flat], ScaleType::Ionian),
            key(&[(B, Flat), (E, Flat), (A, Flat)])
        );
        // F sharp minor: F, C, G sharp
        assert_eq!(
            KeySignature::from_scale(F, &[Sharp], ScaleType::Aeolian),
            key(&[(F, Sharp), (C, Sharp), (G, Sharp)])
        );
    }

    #[test]
    fn test_midi_note() {
        let c = WrittenPitch {
            letter: NoteLetter::C,
            accidentals: None,
        };
        let key = KeySignature::default();
        assert_eq!(c.midi_note(4, &key, 0), 60);
        assert_eq!(c.midi_note(6, &key, 0), 84);
        assert_eq!(c.midi_note(-1, &key, 0), 0);
        assert_eq!(c.midi_note(4, &key, -2), 58);

        let d_major = KeySignature::from_circle_of_fifths(2);
        let f = WrittenPitch {
            letter: NoteLetter::F,
            accidentals: None,
        };
        assert_eq!(f.midi_note(4, &d_major, 0), 66);
        let f_natural = WrittenPitch {
            letter: NoteLetter::F,
            accidentals: Some(vec![Accidental::Natural]),
        };
        assert_eq!(f_natural.midi_note(4, &d_major, 0), 65);
        let b_double_flat = WrittenPitch {
            letter: NoteLetter::B,
            accidentals: Some(vec![Accidental::Flat, Accidental::Flat]),
        };
        assert_eq!(b_double_flat.midi_note(3, &key, 0), 57);
    }
}
