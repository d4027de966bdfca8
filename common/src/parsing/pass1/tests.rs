use super::*;
use crate::parsing::diagnostics::Diagnostic;
use crate::to_anyhow;

fn kinds(src: &str) -> anyhow::Result<Vec<Token1>> {
    let tokens = parse1(src).map_err(to_anyhow)?;
    Ok(tokens
        .into_iter()
        .map(|t| t.value.t)
        .filter(|t| !matches!(t, Token1::Space))
        .collect())
}

#[test]
fn test_notes() -> anyhow::Result<()> {
    assert_eq!(
        kinds("piano: o6 c+8. > d-_4~2 r1")?,
        [
            Token1::Name,
            Token1::Colon,
            Token1::OctaveSet(6),
            Token1::Note(NoteLetter::C),
            Token1::Accidental(Accidental::Sharp),
            Token1::NoteLength {
                denominator: 8.0,
                dots: 1
            },
            Token1::OctaveUp,
            Token1::Note(NoteLetter::D),
            Token1::Accidental(Accidental::Flat),
            Token1::Accidental(Accidental::Natural),
            Token1::NoteLength {
                denominator: 4.0,
                dots: 0
            },
            Token1::Tie,
            Token1::NoteLength {
                denominator: 2.0,
                dots: 0
            },
            Token1::Rest,
            Token1::NoteLength {
                denominator: 1.0,
                dots: 0
            },
        ]
    );
    assert_eq!(
        kinds("c500ms d2s")?,
        [
            Token1::Note(NoteLetter::C),
            Token1::NoteLengthMs(500.0),
            Token1::Note(NoteLetter::D),
            Token1::NoteLengthMs(2000.0),
        ]
    );
    Ok(())
}

#[test]
fn test_spans() -> anyhow::Result<()> {
    let src = "oboe \"o\": c4";
    let tokens = parse1(src).map_err(to_anyhow)?;
    let spans: Vec<(Token1, &str)> = tokens
        .iter()
        .map(|t| (t.value.t.clone(), &src[t.span]))
        .collect();
    assert_eq!(
        spans,
        [
            (Token1::Name, "oboe"),
            (Token1::Space, " "),
            (Token1::String, "\"o\""),
            (Token1::Colon, ":"),
            (Token1::Space, " "),
            (Token1::Note(NoteLetter::C), "c"),
            (
                Token1::NoteLength {
                    denominator: 4.0,
                    dots: 0
                },
                "4"
            ),
        ]
    );
    Ok(())
}

#[test]
fn test_grouping() -> anyhow::Result<()> {
    assert_eq!(
        kinds("[c d'1-2,4]*3 {e g}8 %chorus @chorus |")?,
        [
            Token1::SequenceOpen,
            Token1::Note(NoteLetter::C),
            Token1::Note(NoteLetter::D),
            Token1::Repetitions(vec![(1, 2), (4, 4)]),
            Token1::SequenceClose,
            Token1::Repeat(3),
            Token1::ChordOpen,
            Token1::Note(NoteLetter::E),
            Token1::Note(NoteLetter::G),
            Token1::ChordClose,
            Token1::NoteLength {
                denominator: 8.0,
                dots: 0
            },
            Token1::Marker,
            Token1::AtMarker,
            Token1::Barline,
        ]
    );
    Ok(())
}

#[test]
fn test_lisp() -> anyhow::Result<()> {
    // Inside parentheses, `-` is part of a number or symbol rather than a flat.
    assert_eq!(
        kinds("(tempo! -12.5) (key-sig '(e minor)) c")?,
        [
            Token1::LispOpen,
            Token1::LispSymbol,
            Token1::LispNumber(-12.5),
            Token1::LispClose,
            Token1::LispOpen,
            Token1::LispSymbol,
            Token1::LispQuote,
            Token1::LispOpen,
            Token1::LispSymbol,
            Token1::LispSymbol,
            Token1::LispClose,
            Token1::LispClose,
            Token1::Note(NoteLetter::C),
        ]
    );
    Ok(())
}

#[test]
fn test_comments_and_variables() -> anyhow::Result<()> {
    assert_eq!(
        kinds("riff = c d # a comment\nriff")?,
        [
            Token1::Name,
            Token1::Equals,
            Token1::Note(NoteLetter::C),
            Token1::Note(NoteLetter::D),
            Token1::Comment,
            Token1::Newline,
            Token1::Name,
        ]
    );
    Ok(())
}

#[test]
fn test_string() {
    assert_eq!(get_string(r#""a \"b\"""#), r#"a "b""#);
    assert_eq!(get_string(r#""""#), "");
}

#[test]
fn test_errors() {
    let e = parse1("piano: c0 $").unwrap_err().get_all();
    assert_eq!(
        e,
        [
            Diagnostic::new(code::DURATION, 8..9, "note length may not be zero"),
            Diagnostic::new(code::LEXICAL, 10..11, "unknown character"),
        ]
    );

    let e = parse1("(tempo 60").unwrap_err().get_all();
    assert_eq!(
        e,
        [Diagnostic::new(
            code::LEXICAL,
            9..9,
            "unterminated attribute expression"
        )]
    );

    let e = parse1("c) d").unwrap_err().get_all();
    assert_eq!(e, [Diagnostic::new(code::LEXICAL, 1..2, "unmatched `)`")]);
}
