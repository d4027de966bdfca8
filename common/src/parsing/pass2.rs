// Pass 2 turns the token stream from pass 1 into a list of score updates. This is a recursive
// descent over token slices. Each item parser looks at the first token to decide which branch to
// take, consumes tokens for that branch, and reports problems through `Diagnostics` rather than
// by failing. Tokens that can't start any item are reported and skipped one at a time so that
// parsing can continue and more than one error can be reported per run.

use crate::parsing::model::{Diagnostics, Span, Spanned, SpannedToken, code};
use crate::parsing::pass1;
use crate::parsing::pass1::Token1;
use crate::pitch::{Accidental, KeySignature, NoteLetter, ScaleType, WrittenPitch};
use crate::score::{
    AtMarker, Attribute, AttributeUpdate, Chord, Duration, DurationComponent, Marker, Note,
    OnRepetitions, PartDeclaration, Repeat, Rest, ScoreUpdate, Sequence, VariableDefinition,
    VariableReference, VoiceMarker,
};
use serde::Serialize;
use winnow::Parser;
use winnow::combinator::opt;
use winnow::token::{any, one_of, take_while};

type Tokens<'a, 's> = &'a [SpannedToken<'s, Token1>];

fn consume_one<T>(items: &mut &[T]) {
    if !items.is_empty() {
        *items = &items[1..]
    }
}

fn peek<'a>(input: Tokens<'a, '_>) -> Option<&'a Token1> {
    input.first().map(|t| &t.value.t)
}

fn token<'s>(
    pred: fn(&Token1) -> bool,
) -> impl FnMut(&mut Tokens<'_, 's>) -> winnow::Result<SpannedToken<'s, Token1>> {
    move |input| one_of(|x: SpannedToken<'s, Token1>| pred(&x.value.t)).parse_next(input)
}

fn optional_space<'s>(newlines: bool) -> impl FnMut(&mut Tokens<'_, 's>) -> winnow::Result<()> {
    move |input| {
        take_while(0.., |x: SpannedToken<'s, Token1>| match x.value.t {
            Token1::Space | Token1::Comment => true,
            Token1::Newline => newlines,
            _ => false,
        })
        .void()
        .parse_next(input)
    }
}

fn duration_component<'s>(input: &mut Tokens<'_, 's>) -> winnow::Result<DurationComponent> {
    any.verify_map(|t: SpannedToken<'s, Token1>| match t.value.t {
        Token1::NoteLength { denominator, dots } => {
            Some(DurationComponent::NoteLength { denominator, dots })
        }
        Token1::NoteLengthMs(ms) => Some(DurationComponent::Ms(ms)),
        _ => None,
    })
    .parse_next(input)
}

/// Parse a possibly-empty duration with ties. A tie that isn't followed by a note length marks
/// the note as slurred.
fn duration<'s>(input: &mut Tokens<'_, 's>) -> (Duration, Option<Span>, bool) {
    let mut components = Vec::new();
    let mut span: Option<Span> = None;
    let mut slurred = false;
    let mut extend = |s: Span| span = Some(span.map_or(s, |x| x.join(s)));
    if let Ok((c, tokens)) = duration_component.with_taken().parse_next(input) {
        components.push(c);
        extend(tokens[0].span);
    }
    while let Some(Token1::Tie) = peek(input) {
        extend(input[0].span);
        consume_one(input);
        match duration_component.with_taken().parse_next(input) {
            Ok((c, tokens)) => {
                components.push(c);
                extend(tokens[0].span);
            }
            Err(_) => {
                slurred = true;
                break;
            }
        }
    }
    (Duration { components }, span, slurred)
}

/// A note or rest, without chord separators.
fn note_or_rest<'s>(input: &mut Tokens<'_, 's>) -> Option<ScoreUpdate> {
    let tokens = *input;
    let first = tokens.first()?;
    let letter = match first.value.t {
        Token1::Note(letter) => Some(letter),
        Token1::Rest => None,
        _ => return None,
    };
    let mut span = first.span;
    consume_one(input);
    let Some(letter) = letter else {
        let (duration, d_span, _) = duration(input);
        if let Some(s) = d_span {
            span = span.join(s);
        }
        return Some(ScoreUpdate::Rest(Rest { span, duration }));
    };
    let mut accidentals = Vec::new();
    while let Ok(t) = token(|t| matches!(t, Token1::Accidental(_))).parse_next(input) {
        if let Token1::Accidental(a) = t.value.t {
            accidentals.push(a);
        }
        span = span.join(t.span);
    }
    let (duration, d_span, slurred) = duration(input);
    if let Some(s) = d_span {
        span = span.join(s);
    }
    Some(ScoreUpdate::Note(Note {
        span,
        pitch: WrittenPitch {
            letter,
            accidentals: (!accidentals.is_empty()).then_some(accidentals),
        },
        duration,
        slurred,
    }))
}

fn octave_change(t: &SpannedToken<Token1>) -> Option<ScoreUpdate> {
    let attribute = match t.value.t {
        Token1::OctaveSet(n) => Attribute::OctaveSet(n),
        Token1::OctaveUp => Attribute::OctaveUp,
        Token1::OctaveDown => Attribute::OctaveDown,
        _ => return None,
    };
    Some(ScoreUpdate::Attribute(AttributeUpdate {
        span: t.span,
        attribute,
        global: false,
    }))
}

/// A note or rest optionally followed by `/`-separated chord members. Octave changes may appear
/// after a separator.
fn note_or_chord<'s>(diags: &Diagnostics, input: &mut Tokens<'_, 's>) -> Option<ScoreUpdate> {
    let first = note_or_rest(input)?;
    let mut span = update_span(&first);
    let mut members = vec![first];
    while let Some(Token1::Separator) = peek(input) {
        let separator = input[0].span;
        consume_one(input);
        while let Some(change) = input.first().and_then(octave_change) {
            members.push(change);
            consume_one(input);
        }
        match note_or_rest(input) {
            Some(member) => {
                span = span.join(update_span(&member));
                members.push(member);
            }
            None => {
                diags.err(
                    code::SYNTAX,
                    separator,
                    "a chord separator must be followed by a note or rest",
                );
                break;
            }
        }
    }
    if members.len() == 1 {
        return members.pop();
    }
    Some(ScoreUpdate::Chord(Chord {
        span,
        members,
        duration: None,
    }))
}

fn update_span(u: &ScoreUpdate) -> Span {
    match u {
        ScoreUpdate::PartDeclaration(x) => x.span,
        ScoreUpdate::Note(x) => x.span,
        ScoreUpdate::Rest(x) => x.span,
        ScoreUpdate::Chord(x) => x.span,
        ScoreUpdate::Attribute(x) => x.span,
        ScoreUpdate::Barline => Span::default(),
        ScoreUpdate::Marker(x) => x.span,
        ScoreUpdate::AtMarker(x) => x.span,
        ScoreUpdate::Repeat(x) => x.span,
        ScoreUpdate::OnRepetitions(x) => x.span,
        ScoreUpdate::Sequence(x) => x.span,
        ScoreUpdate::VariableDefinition(x) => x.span,
        ScoreUpdate::VariableReference(x) => x.span,
        ScoreUpdate::Voice(x) => x.span,
    }
}

fn name<'s>(input: &mut Tokens<'_, 's>) -> winnow::Result<Spanned<String>> {
    token(|t| matches!(t, Token1::Name))
        .parse_next(input)
        .map(|t| Spanned::new(t.span, t.value.raw))
}

/// `name(/name)* ("alias")? :`. Returns a backtrack error if the tokens don't form a
/// declaration so the caller can try a variable instead.
fn part_declaration<'s>(input: &mut Tokens<'_, 's>) -> winnow::Result<PartDeclaration> {
    let first = name(input)?;
    let mut span = first.span;
    let mut names = vec![first.value];
    while let Ok(Some((_, n))) =
        opt((token(|t| matches!(t, Token1::Separator)), name)).parse_next(input)
    {
        span = span.join(n.span);
        names.push(n.value);
    }
    optional_space(false).parse_next(input)?;
    let alias = opt(token(|t| matches!(t, Token1::String))).parse_next(input)?;
    if alias.is_some() {
        optional_space(false).parse_next(input)?;
    }
    let colon = token(|t| matches!(t, Token1::Colon)).parse_next(input)?;
    Ok(PartDeclaration {
        span: span.join(colon.span),
        names,
        alias: alias.map(|a| pass1::get_string(a.value.raw)),
    })
}

/// Items up to (but not including) a token matching `stop`. When `line` is true, a newline also
/// ends the list.
fn items<'s>(
    diags: &Diagnostics,
    input: &mut Tokens<'_, 's>,
    stop: fn(&Token1) -> bool,
    line: bool,
) -> Vec<ScoreUpdate> {
    let mut out = Vec::new();
    loop {
        _ = optional_space(!line).parse_next(input);
        match peek(input) {
            None => break,
            Some(t) if stop(t) => break,
            Some(Token1::Newline) => break,
            _ => {}
        }
        if let Some(u) = item(diags, input) {
            out.push(u);
        }
    }
    out
}

fn sequence<'s>(diags: &Diagnostics, input: &mut Tokens<'_, 's>) -> Option<ScoreUpdate> {
    let open = input.first()?.span;
    consume_one(input);
    let events = items(diags, input, |t| matches!(t, Token1::SequenceClose), false);
    match token(|t| matches!(t, Token1::SequenceClose)).parse_next(input) {
        Ok(close) => Some(ScoreUpdate::Sequence(Sequence {
            span: open.join(close.span),
            events,
        })),
        Err(_) => {
            diags.err(code::SYNTAX, open, "unterminated `[`");
            None
        }
    }
}

fn chord_group<'s>(diags: &Diagnostics, input: &mut Tokens<'_, 's>) -> Option<ScoreUpdate> {
    let open = input.first()?.span;
    consume_one(input);
    let members = items(diags, input, |t| matches!(t, Token1::ChordClose), false);
    let Ok(close) = token(|t| matches!(t, Token1::ChordClose)).parse_next(input) else {
        diags.err(code::SYNTAX, open, "unterminated `{`");
        return None;
    };
    let mut span = open.join(close.span);
    for m in &members {
        let ok = match m {
            ScoreUpdate::Note(_) | ScoreUpdate::Rest(_) => true,
            ScoreUpdate::Attribute(a) => !a.global,
            _ => false,
        };
        if !ok {
            diags.err(
                code::SYNTAX,
                update_span(m),
                "only notes, rests, and attributes may appear in a chord",
            );
        }
    }
    let (duration, d_span, _) = duration(input);
    if let Some(s) = d_span {
        span = span.join(s);
    }
    Some(ScoreUpdate::Chord(Chord {
        span,
        members,
        duration: (!duration.is_empty()).then_some(duration),
    }))
}

fn name_item<'s>(diags: &Diagnostics, input: &mut Tokens<'_, 's>) -> Option<ScoreUpdate> {
    let mut probe = *input;
    if let Ok(decl) = part_declaration(&mut probe) {
        *input = probe;
        return Some(ScoreUpdate::PartDeclaration(decl));
    }
    let n = name(input).ok()?;
    let mut probe = *input;
    if (
        optional_space(false),
        token(|t| matches!(t, Token1::Equals)),
    )
        .parse_next(&mut probe)
        .is_ok()
    {
        *input = probe;
        let events = items(diags, input, |_| false, true);
        let span = events
            .last()
            .map_or(n.span, |e| n.span.join(update_span(e)));
        return Some(ScoreUpdate::VariableDefinition(VariableDefinition {
            span,
            name: n.value,
            events,
        }));
    }
    Some(ScoreUpdate::VariableReference(VariableReference {
        span: n.span,
        name: n.value,
    }))
}

/// One item plus any `*N` or `'ranges` suffixes.
fn item<'s>(diags: &Diagnostics, input: &mut Tokens<'_, 's>) -> Option<ScoreUpdate> {
    let tokens = *input;
    let tok = tokens.first()?;
    let span = tok.span;
    let mut result = match &tok.value.t {
        Token1::Name => name_item(diags, input),
        Token1::Note(_) | Token1::Rest => note_or_chord(diags, input),
        Token1::OctaveSet(_) | Token1::OctaveUp | Token1::OctaveDown => {
            let u = octave_change(tok);
            consume_one(input);
            u
        }
        Token1::ChordOpen => chord_group(diags, input),
        Token1::SequenceOpen => sequence(diags, input),
        Token1::LispOpen => lisp_attribute(diags, input),
        Token1::Barline => {
            consume_one(input);
            Some(ScoreUpdate::Barline)
        }
        Token1::Marker => {
            let name = tok.value.raw[1..].to_string();
            consume_one(input);
            Some(ScoreUpdate::Marker(Marker { span, name }))
        }
        Token1::AtMarker => {
            let name = tok.value.raw[1..].to_string();
            consume_one(input);
            Some(ScoreUpdate::AtMarker(AtMarker { span, name }))
        }
        Token1::Voice => {
            let raw = tok.value.raw;
            consume_one(input);
            match raw[1..raw.len() - 1].parse() {
                Ok(number) => Some(ScoreUpdate::Voice(VoiceMarker { span, number })),
                Err(_) => {
                    diags.err(code::NUMBER, span, "voice number is too large");
                    None
                }
            }
        }
        Token1::Repeat(_) | Token1::Repetitions(_) => {
            diags.err(code::REPEAT, span, "nothing to repeat");
            consume_one(input);
            None
        }
        _ => {
            diags.err(code::SYNTAX, span, "unexpected item");
            consume_one(input);
            None
        }
    }?;
    loop {
        let tokens = *input;
        let Some(t) = tokens.first() else {
            break;
        };
        let span = update_span(&result).join(t.span);
        result = match &t.value.t {
            Token1::Repeat(times) => ScoreUpdate::Repeat(Repeat {
                span,
                body: Box::new(result),
                times: *times,
            }),
            Token1::Repetitions(ranges) => ScoreUpdate::OnRepetitions(OnRepetitions {
                span,
                ranges: ranges.clone(),
                body: Box::new(result),
            }),
            _ => break,
        };
        consume_one(input);
    }
    Some(result)
}

#[derive(Serialize, Debug, Clone, PartialEq)]
enum Lisp {
    Number(f64),
    Symbol(String),
    String(String),
    List(Vec<Spanned<Lisp>>),
    Quote(Box<Spanned<Lisp>>),
}

fn lisp_expr<'s>(diags: &Diagnostics, input: &mut Tokens<'_, 's>) -> Option<Spanned<Lisp>> {
    let tokens = *input;
    let tok = tokens.first()?;
    let span = tok.span;
    let raw = tok.value.raw;
    let value = match tok.value.t {
        Token1::LispNumber(n) => Lisp::Number(n),
        Token1::LispSymbol => Lisp::Symbol(raw.to_string()),
        Token1::String => Lisp::String(pass1::get_string(raw)),
        Token1::LispQuote => {
            consume_one(input);
            let quoted = lisp_expr(diags, input)?;
            return Some(Spanned::new(span.join(quoted.span), Lisp::Quote(Box::new(quoted))));
        }
        Token1::LispOpen => {
            consume_one(input);
            let mut elements = Vec::new();
            loop {
                _ = optional_space(true).parse_next(input);
                match input.first() {
                    None => return None,
                    Some(t) if matches!(t.value.t, Token1::LispClose) => {
                        let end = t.span;
                        consume_one(input);
                        return Some(Spanned::new(span.join(end), Lisp::List(elements)));
                    }
                    _ => elements.push(lisp_expr(diags, input)?),
                }
            }
        }
        _ => {
            diags.err(code::LISP, span, "unexpected item in attribute expression");
            consume_one(input);
            return None;
        }
    };
    consume_one(input);
    Some(Spanned::new(span, value))
}

fn lisp_attribute<'s>(diags: &Diagnostics, input: &mut Tokens<'_, 's>) -> Option<ScoreUpdate> {
    let expr = lisp_expr(diags, input)?;
    let Lisp::List(elements) = &expr.value else {
        return None;
    };
    let Some((head, args)) = elements.split_first() else {
        diags.err(code::LISP, expr.span, "empty attribute expression");
        return None;
    };
    let Lisp::Symbol(function) = &head.value else {
        diags.err(code::LISP, head.span, "expected an attribute name");
        return None;
    };
    let (function, global) = match function.strip_suffix('!') {
        Some(f) => (f, true),
        None => (function.as_str(), false),
    };
    let attribute = lisp_to_attribute(diags, expr.span, function, args)?;
    Some(ScoreUpdate::Attribute(AttributeUpdate {
        span: expr.span,
        attribute,
        global,
    }))
}

fn single_number(
    diags: &Diagnostics,
    span: Span,
    function: &str,
    args: &[Spanned<Lisp>],
) -> Option<f64> {
    match args {
        [
            Spanned {
                value: Lisp::Number(n),
                ..
            },
        ] => Some(*n),
        _ => {
            diags.err(
                code::LISP,
                span,
                format!("{function} requires a single numeric argument"),
            );
            None
        }
    }
}

fn percentage(
    diags: &Diagnostics,
    span: Span,
    function: &str,
    args: &[Spanned<Lisp>],
) -> Option<f64> {
    let n = single_number(diags, span, function, args)?;
    if !(0.0..=100.0).contains(&n) {
        diags.err(
            code::LISP,
            span,
            format!("{function} must be between 0 and 100"),
        );
        return None;
    }
    Some(n / 100.0)
}

fn lisp_to_attribute(
    diags: &Diagnostics,
    span: Span,
    function: &str,
    args: &[Spanned<Lisp>],
) -> Option<Attribute> {
    Some(match function {
        "tempo" => {
            let bpm = single_number(diags, span, function, args)?;
            if bpm <= 0.0 {
                diags.err(code::LISP, span, "tempo must be positive");
                return None;
            }
            Attribute::Tempo(bpm)
        }
        "octave" => match args {
            [
                Spanned {
                    value: Lisp::Symbol(s),
                    ..
                },
            ] if s == ":up" => Attribute::OctaveUp,
            [
                Spanned {
                    value: Lisp::Symbol(s),
                    ..
                },
            ] if s == ":down" => Attribute::OctaveDown,
            _ => Attribute::OctaveSet(single_number(diags, span, function, args)? as i32),
        },
        "volume" | "vol" => Attribute::Volume(percentage(diags, span, function, args)?),
        "track-volume" | "track-vol" => {
            Attribute::TrackVolume(percentage(diags, span, function, args)?)
        }
        "panning" | "pan" => Attribute::Panning(percentage(diags, span, function, args)?),
        "quantization" | "quantize" | "quant" => {
            Attribute::Quantization(single_number(diags, span, function, args)?.max(0.0) / 100.0)
        }
        "transposition" | "transpose" => {
            Attribute::Transposition(single_number(diags, span, function, args)? as i32)
        }
        "key-signature" | "key-sig" => Attribute::KeySignature(key_signature(diags, span, args)?),
        "set-note-length" => {
            let den = single_number(diags, span, function, args)?;
            if den <= 0.0 {
                diags.err(code::LISP, span, "note length must be positive");
                return None;
            }
            Attribute::Duration(Duration::note_length(den, 0))
        }
        "set-duration" => {
            let ms = single_number(diags, span, function, args)?;
            Attribute::Duration(Duration {
                components: vec![DurationComponent::Ms(ms.max(0.0))],
            })
        }
        _ => {
            diags.err(
                code::LISP,
                span,
                format!("unrecognized attribute: {function}"),
            );
            return None;
        }
    })
}

/// Either a string of explicit accidentals like `"f+ c+"` or a quoted list naming a scale like
/// `'(e flat major)`.
fn key_signature(diags: &Diagnostics, span: Span, args: &[Spanned<Lisp>]) -> Option<KeySignature> {
    let err = || {
        diags.err(
            code::LISP,
            span,
            "key signature must be a string like \"f+ c+\" or a list like '(e flat major)",
        );
        None
    };
    let [arg] = args else {
        return err();
    };
    match &arg.value {
        Lisp::String(s) => {
            let mut key = KeySignature::default();
            for word in s.split_whitespace() {
                let mut chars = word.chars();
                let Some(letter) = chars.next().and_then(NoteLetter::from_char) else {
                    return err();
                };
                let accidentals: Option<Vec<Accidental>> =
                    chars.map(Accidental::from_char).collect();
                match accidentals {
                    Some(a) if !a.is_empty() => {
                        key.0.insert(letter, a);
                    }
                    _ => return err(),
                }
            }
            Some(key)
        }
        Lisp::Quote(q) => {
            let Lisp::List(elements) = &q.value else {
                return err();
            };
            let words: Option<Vec<&str>> = elements
                .iter()
                .map(|e| match &e.value {
                    Lisp::Symbol(s) => Some(s.trim_start_matches(':')),
                    _ => None,
                })
                .collect();
            let Some(words) = words else {
                return err();
            };
            let Some((tonic, rest)) = words.split_first() else {
                return err();
            };
            let Some((scale, accidentals)) = rest.split_last() else {
                return err();
            };
            let mut tonic_chars = tonic.chars();
            let letter = tonic_chars.next().and_then(NoteLetter::from_char);
            let (Some(letter), None) = (letter, tonic_chars.next()) else {
                return err();
            };
            let Some(scale) = ScaleType::from_name(scale) else {
                return err();
            };
            let accidentals: Option<Vec<Accidental>> = accidentals
                .iter()
                .map(|a| match *a {
                    "flat" => Some(Accidental::Flat),
                    "sharp" => Some(Accidental::Sharp),
                    "natural" => Some(Accidental::Natural),
                    _ => None,
                })
                .collect();
            let Some(accidentals) = accidentals else {
                return err();
            };
            Some(KeySignature::from_scale(letter, &accidentals, scale))
        }
        _ => err(),
    }
}

pub fn parse2(src: &str) -> Result<Vec<ScoreUpdate>, Diagnostics> {
    let tokens = pass1::parse1(src)?;
    let diags = Diagnostics::new();
    let mut input = tokens.as_slice();
    let out = items(&diags, &mut input, |_| false, false);
    for u in &out {
        crate::parsing::model::trace(format!("parse pass 2: {u:?}"));
    }
    if diags.has_errors() {
        Err(diags)
    } else {
        Ok(out)
    }
}
