use serde::Serialize;

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub enum DurationComponent {
    /// A standard note length: 4 is a quarter note, 8 an eighth, and so on.
    NoteLength { denominator: f64, dots: u32 },
    /// An absolute length in milliseconds.
    Ms(f64),
}
impl DurationComponent {
    pub fn beats(&self) -> Option<f64> {
        match self {
            DurationComponent::NoteLength { denominator, dots } => {
                Some((4.0 / denominator) * (2.0 - 2f64.powi(-(*dots as i32))))
            }
            DurationComponent::Ms(_) => None,
        }
    }

    pub fn ms(&self, tempo: f64) -> f64 {
        match self {
            DurationComponent::NoteLength { .. } => {
                self.beats().unwrap_or_default() * (60000.0 / tempo)
            }
            DurationComponent::Ms(ms) => *ms,
        }
    }
}

/// One or more components tied together. An empty duration means "use the part's current
/// default".
#[derive(Serialize, Debug, Clone, PartialEq, Default)]
pub struct Duration {
    pub components: Vec<DurationComponent>,
}
impl Duration {
    pub fn note_length(denominator: f64, dots: u32) -> Self {
        Self {
            components: vec![DurationComponent::NoteLength { denominator, dots }],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    pub fn ms(&self, tempo: f64) -> f64 {
        self.components.iter().map(|c| c.ms(tempo)).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_note_lengths() {
        assert_eq!(Duration::note_length(4.0, 0).ms(120.0), 500.0);
        assert_eq!(Duration::note_length(8.0, 0).ms(120.0), 250.0);
        assert_eq!(Duration::note_length(4.0, 1).ms(120.0), 750.0);
        assert_eq!(Duration::note_length(2.0, 2).ms(60.0), 3500.0);
        assert_eq!(Duration::note_length(1.0, 0).ms(60.0), 4000.0);
    }

    #[test]
    fn test_ties() {
        let d = Duration {
            components: vec![
                DurationComponent::NoteLength {
                    denominator: 4.0,
                    dots: 0,
                },
                DurationComponent::Ms(120.0),
                DurationComponent::NoteLength {
                    denominator: 8.0,
                    dots: 0,
                },
            ],
        };
        assert_eq!(d.ms(120.0), 870.0);
        assert_eq!(
            DurationComponent::NoteLength {
                denominator: 4.0,
                dots: 1
            }
            .beats(),
            Some(1.5)
        );
        assert_eq!(DurationComponent::Ms(5.0).beats(), None);
    }
}
