use serde::Serialize;

/// A stock instrument. Every part is bound to one of these.
#[derive(Serialize, Debug, PartialEq, Eq)]
pub struct Instrument {
    pub name: &'static str,
    #[serde(skip)]
    pub aliases: &'static [&'static str],
    /// General MIDI program number, 0..=127
    pub program: u8,
    /// Percussion instruments play on the MIDI percussion channel.
    pub percussion: bool,
}
impl Instrument {
    const fn new(name: &'static str, program: u8, aliases: &'static [&'static str]) -> Self {
        Self {
            name,
            aliases,
            program,
            percussion: false,
        }
    }

    const fn percussion(name: &'static str, aliases: &'static [&'static str]) -> Self {
        Self {
            name,
            aliases,
            program: 0,
            percussion: true,
        }
    }

    pub fn matches(&self, identifier: &str) -> bool {
        self.name == identifier || self.aliases.contains(&identifier)
    }
}

pub static STOCK_INSTRUMENTS: &[Instrument] = &[
    Instrument::new(
        "midi-acoustic-grand-piano",
        0,
        &["piano", "acoustic-grand-piano", "midi-piano"],
    ),
    Instrument::new("midi-bright-acoustic-piano", 1, &["bright-acoustic-piano"]),
    Instrument::new("midi-electric-grand-piano", 2, &["electric-grand-piano"]),
    Instrument::new("midi-honky-tonk-piano", 3, &["honky-tonk-piano"]),
    Instrument::new("midi-electric-piano-1", 4, &["electric-piano", "electric-piano-1"]),
    Instrument::new("midi-electric-piano-2", 5, &["electric-piano-2"]),
    Instrument::new("midi-harpsichord", 6, &["harpsichord"]),
    Instrument::new("midi-clavi", 7, &["clavinet", "clavi"]),
    Instrument::new("midi-celesta", 8, &["celesta", "celeste"]),
    Instrument::new("midi-glockenspiel", 9, &["glockenspiel"]),
    Instrument::new("midi-music-box", 10, &["music-box"]),
    Instrument::new("midi-vibraphone", 11, &["vibraphone", "vibes"]),
    Instrument::new("midi-marimba", 12, &["marimba"]),
    Instrument::new("midi-xylophone", 13, &["xylophone"]),
    Instrument::new("midi-tubular-bells", 14, &["tubular-bells"]),
    Instrument::new("midi-dulcimer", 15, &["dulcimer"]),
    Instrument::new("midi-drawbar-organ", 16, &["drawbar-organ"]),
    Instrument::new("midi-percussive-organ", 17, &["percussive-organ"]),
    Instrument::new("midi-rock-organ", 18, &["rock-organ"]),
    Instrument::new("midi-church-organ", 19, &["organ", "church-organ"]),
    Instrument::new("midi-reed-organ", 20, &["reed-organ"]),
    Instrument::new("midi-accordion", 21, &["accordion"]),
    Instrument::new("midi-harmonica", 22, &["harmonica"]),
    Instrument::new("midi-tango-accordion", 23, &["tango-accordion"]),
    Instrument::new(
        "midi-acoustic-guitar-nylon",
        24,
        &["guitar", "acoustic-guitar", "nylon-guitar"],
    ),
    Instrument::new("midi-acoustic-guitar-steel", 25, &["steel-guitar"]),
    Instrument::new("midi-electric-guitar-jazz", 26, &["jazz-guitar"]),
    Instrument::new("midi-electric-guitar-clean", 27, &["electric-guitar"]),
    Instrument::new("midi-electric-guitar-palm-muted", 28, &["muted-guitar"]),
    Instrument::new("midi-electric-guitar-overdrive", 29, &["overdrive-guitar"]),
    Instrument::new("midi-electric-guitar-distorted", 30, &["distortion-guitar"]),
    Instrument::new("midi-electric-guitar-harmonics", 31, &["guitar-harmonics"]),
    Instrument::new("midi-acoustic-bass", 32, &["acoustic-bass", "upright-bass"]),
    Instrument::new("midi-electric-bass-finger", 33, &["bass", "electric-bass"]),
    Instrument::new("midi-electric-bass-pick", 34, &["picked-bass"]),
    Instrument::new("midi-fretless-bass", 35, &["fretless-bass"]),
    Instrument::new("midi-bass-slap", 36, &["slap-bass", "slap-bass-1"]),
    Instrument::new("midi-bass-pop", 37, &["slap-bass-2"]),
    Instrument::new("midi-synth-bass-1", 38, &["synth-bass"]),
    Instrument::new("midi-synth-bass-2", 39, &[]),
    Instrument::new("midi-violin", 40, &["violin"]),
    Instrument::new("midi-viola", 41, &["viola"]),
    Instrument::new("midi-cello", 42, &["cello", "violoncello"]),
    Instrument::new("midi-contrabass", 43, &["contrabass", "double-bass", "string-bass"]),
    Instrument::new("midi-tremolo-strings", 44, &["tremolo-strings"]),
    Instrument::new("midi-pizzicato-strings", 45, &["pizzicato-strings"]),
    Instrument::new("midi-orchestral-harp", 46, &["harp", "orchestral-harp"]),
    Instrument::new("midi-timpani", 47, &["timpani"]),
    Instrument::new("midi-string-ensemble-1", 48, &["strings", "string-ensemble"]),
    Instrument::new("midi-string-ensemble-2", 49, &[]),
    Instrument::new("midi-synth-strings-1", 50, &["synth-strings"]),
    Instrument::new("midi-synth-strings-2", 51, &[]),
    Instrument::new("midi-choir-aahs", 52, &["choir", "choir-aahs"]),
    Instrument::new("midi-voice-oohs", 53, &["voice", "voice-oohs"]),
    Instrument::new("midi-synth-voice", 54, &["synth-voice"]),
    Instrument::new("midi-orchestra-hit", 55, &["orchestra-hit"]),
    Instrument::new("midi-trumpet", 56, &["trumpet"]),
    Instrument::new("midi-trombone", 57, &["trombone"]),
    Instrument::new("midi-tuba", 58, &["tuba"]),
    Instrument::new("midi-muted-trumpet", 59, &["muted-trumpet"]),
    Instrument::new("midi-french-horn", 60, &["french-horn", "horn"]),
    Instrument::new("midi-brass-section", 61, &["brass", "brass-section"]),
    Instrument::new("midi-synth-brass-1", 62, &["synth-brass"]),
    Instrument::new("midi-synth-brass-2", 63, &[]),
    Instrument::new(
        "midi-soprano-saxophone",
        64,
        &["soprano-saxophone", "soprano-sax"],
    ),
    Instrument::new("midi-alto-saxophone", 65, &["alto-saxophone", "alto-sax"]),
    Instrument::new("midi-tenor-saxophone", 66, &["tenor-saxophone", "tenor-sax"]),
    Instrument::new(
        "midi-baritone-saxophone",
        67,
        &["baritone-saxophone", "bari-sax"],
    ),
    Instrument::new("midi-oboe", 68, &["oboe"]),
    Instrument::new("midi-english-horn", 69, &["english-horn", "cor-anglais"]),
    Instrument::new("midi-bassoon", 70, &["bassoon"]),
    Instrument::new("midi-clarinet", 71, &["clarinet"]),
    Instrument::new("midi-piccolo", 72, &["piccolo"]),
    Instrument::new("midi-flute", 73, &["flute"]),
    Instrument::new("midi-recorder", 74, &["recorder"]),
    Instrument::new("midi-pan-flute", 75, &["pan-flute"]),
    Instrument::new("midi-bottle", 76, &["bottle"]),
    Instrument::new("midi-shakuhachi", 77, &["shakuhachi"]),
    Instrument::new("midi-whistle", 78, &["whistle"]),
    Instrument::new("midi-ocarina", 79, &["ocarina"]),
    Instrument::new("midi-square-lead", 80, &["square", "square-wave"]),
    Instrument::new("midi-saw-wave", 81, &["sawtooth", "saw-wave"]),
    Instrument::new("midi-calliope-lead", 82, &["calliope"]),
    Instrument::new("midi-chiffer-lead", 83, &["chiffer"]),
    Instrument::new("midi-charang", 84, &["charang"]),
    Instrument::new("midi-solo-vox", 85, &["solo-vox"]),
    Instrument::new("midi-fifths", 86, &["fifths"]),
    Instrument::new("midi-bass-and-lead", 87, &["bass-and-lead"]),
    Instrument::new("midi-pad-new-age", 88, &["pad-new-age"]),
    Instrument::new("midi-pad-warm", 89, &["pad-warm"]),
    Instrument::new("midi-pad-polysynth", 90, &["pad-polysynth"]),
    Instrument::new("midi-pad-choir", 91, &["pad-choir"]),
    Instrument::new("midi-pad-bowed", 92, &["pad-bowed"]),
    Instrument::new("midi-pad-metallic", 93, &["pad-metallic"]),
    Instrument::new("midi-pad-halo", 94, &["pad-halo"]),
    Instrument::new("midi-pad-sweep", 95, &["pad-sweep"]),
    Instrument::new("midi-fx-rain", 96, &[]),
    Instrument::new("midi-fx-soundtrack", 97, &[]),
    Instrument::new("midi-fx-crystal", 98, &[]),
    Instrument::new("midi-fx-atmosphere", 99, &[]),
    Instrument::new("midi-fx-brightness", 100, &[]),
    Instrument::new("midi-fx-goblins", 101, &[]),
    Instrument::new("midi-fx-echoes", 102, &[]),
    Instrument::new("midi-fx-sci-fi", 103, &[]),
    Instrument::new("midi-sitar", 104, &["sitar"]),
    Instrument::new("midi-banjo", 105, &["banjo"]),
    Instrument::new("midi-shamisen", 106, &["shamisen"]),
    Instrument::new("midi-koto", 107, &["koto"]),
    Instrument::new("midi-kalimba", 108, &["kalimba"]),
    Instrument::new("midi-bagpipes", 109, &["bagpipes"]),
    Instrument::new("midi-fiddle", 110, &["fiddle"]),
    Instrument::new("midi-shehnai", 111, &["shehnai"]),
    Instrument::new("midi-tinkle-bell", 112, &["tinkle-bell"]),
    Instrument::new("midi-agogo", 113, &["agogo"]),
    Instrument::new("midi-steel-drums", 114, &["steel-drums", "steel-drum"]),
    Instrument::new("midi-woodblock", 115, &["woodblock"]),
    Instrument::new("midi-taiko-drum", 116, &["taiko-drum"]),
    Instrument::new("midi-melodic-tom", 117, &["melodic-tom"]),
    Instrument::new("midi-synth-drum", 118, &["synth-drum"]),
    Instrument::new("midi-reverse-cymbal", 119, &["reverse-cymbal"]),
    Instrument::new("midi-guitar-fret-noise", 120, &["guitar-fret-noise"]),
    Instrument::new("midi-breath-noise", 121, &["breath-noise"]),
    Instrument::new("midi-seashore", 122, &["seashore"]),
    Instrument::new("midi-bird-tweet", 123, &["bird-tweet"]),
    Instrument::new("midi-telephone-ring", 124, &["telephone-ring"]),
    Instrument::new("midi-helicopter", 125, &["helicopter"]),
    Instrument::new("midi-applause", 126, &["applause"]),
    Instrument::new("midi-gunshot", 127, &["gunshot"]),
    Instrument::percussion("midi-percussion", &["percussion"]),
];

pub fn stock_instrument(identifier: &str) -> Option<&'static Instrument> {
    STOCK_INSTRUMENTS.iter().find(|i| i.matches(identifier))
}
