// This file contains the first pass of parsing from the raw input string to Vec<Token1>. Tokens
// carry already-decoded values (note letters, note lengths, repeat counts) so pass 2 only has to
// deal with structure.
//
// Lexing is mostly context-free. The exception is attribute expressions, which use a small lisp
// syntax: inside parentheses, numbers may be negative and symbols may contain characters that
// mean something else in note syntax. We track parenthesis depth and lex differently when it is
// positive.

use crate::parsing::model;
use crate::parsing::model::{Diagnostics, SpannedToken, code};
use crate::pitch::{Accidental, NoteLetter};
use serde::Serialize;
use winnow::combinator::{alt, opt, preceded, separated};
use winnow::error::{ContextError, StrContext};
use winnow::stream::{AsChar, Offset};
use winnow::token::{any, take, take_till, take_while};
use winnow::{LocatingSlice, Parser};

pub type CErr = ContextError<StrContext>;
pub type Inp<'s> = LocatingSlice<&'s str>;

#[derive(Serialize, Debug, Clone, PartialEq)]
pub enum Token1 {
    // Space, comments
    Space,
    Newline,
    Comment,
    // Part declarations, variables, aliases
    Name,
    String,
    Colon,
    Separator,
    Equals,
    Voice,
    // Notes
    Note(NoteLetter),
    Rest,
    Accidental(Accidental),
    NoteLength { denominator: f64, dots: u32 },
    NoteLengthMs(f64),
    Tie,
    Barline,
    OctaveSet(i32),
    OctaveUp,
    OctaveDown,
    // Grouping
    ChordOpen,
    ChordClose,
    SequenceOpen,
    SequenceClose,
    Repeat(u32),
    Repetitions(Vec<(u32, u32)>),
    Marker,
    AtMarker,
    // Attribute expressions
    LispOpen,
    LispClose,
    LispQuote,
    LispNumber(f64),
    LispSymbol,
}

fn is_space(x: char) -> bool {
    AsChar::is_space(x) || x == '\r'
}

fn is_name_char(x: char) -> bool {
    AsChar::is_alphanum(x) || x == '_' || x == '-'
}

fn is_lisp_symbol_char(x: char) -> bool {
    !(is_space(x) || ['\n', '(', ')', '"', '\''].contains(&x))
}

fn raw_name<'s>() -> impl Parser<Inp<'s>, &'s str, CErr> {
    (
        take_while(2, |c: char| AsChar::is_alpha(c)),
        take_while(0.., is_name_char),
    )
        .take()
        .context(StrContext::Label("name"))
}

fn decimal<'s>(diags: &Diagnostics) -> impl FnMut(&mut Inp<'s>) -> winnow::Result<u32> {
    move |input| {
        take_while(1.., AsChar::is_dec_digit)
            .with_span()
            .parse_next(input)
            .map(|(s, span)| match s.parse::<u32>() {
                Ok(n) => n,
                Err(e) => {
                    diags.err(code::NUMBER, span, format!("while parsing number: {e}"));
                    1
                }
            })
    }
}

fn note_length<'s>(diags: &Diagnostics) -> impl FnMut(&mut Inp<'s>) -> winnow::Result<Token1> {
    move |input| {
        (
            decimal(diags),
            opt(alt(("ms", "s"))),
            take_while(0.., '.'),
        )
            .with_span()
            .parse_next(input)
            .map(|((n, unit, dots), span)| match unit {
                Some(unit) => {
                    if !dots.is_empty() {
                        diags.err(
                            code::DURATION,
                            span,
                            "dots may only follow note lengths, not times",
                        );
                    }
                    let scale = if unit == "s" { 1000.0 } else { 1.0 };
                    Token1::NoteLengthMs(n as f64 * scale)
                }
                None => {
                    if n == 0 {
                        diags.err(code::DURATION, span, "note length may not be zero");
                    }
                    Token1::NoteLength {
                        denominator: n.max(1) as f64,
                        dots: dots.len() as u32,
                    }
                }
            })
    }
}

fn repetitions<'s>(diags: &Diagnostics) -> impl FnMut(&mut Inp<'s>) -> winnow::Result<Token1> {
    move |input| {
        preceded(
            '\'',
            separated(
                1..,
                (decimal(diags), opt(preceded('-', decimal(diags)))).with_span(),
                ',',
            ),
        )
        .parse_next(input)
        .map(|ranges: Vec<((u32, Option<u32>), std::ops::Range<usize>)>| {
            let ranges = ranges
                .into_iter()
                .map(|((first, last), span)| {
                    let last = last.unwrap_or(first);
                    if first == 0 || last < first {
                        diags.err(
                            code::REPEAT,
                            span,
                            "repetition ranges must be increasing and start at 1",
                        );
                    }
                    (first, last)
                })
                .collect();
            Token1::Repetitions(ranges)
        })
    }
}

/// A lisp atom is either a number or a symbol. Numbers start with a digit, optionally
/// preceded by `-`.
fn lisp_atom<'s>(diags: &Diagnostics) -> impl FnMut(&mut Inp<'s>) -> winnow::Result<Token1> {
    move |input| {
        take_while(1.., is_lisp_symbol_char)
            .with_span()
            .parse_next(input)
            .map(|(s, span)| {
                let digits = s.strip_prefix('-').unwrap_or(s);
                if !digits.starts_with(|c: char| c.is_ascii_digit()) {
                    return Token1::LispSymbol;
                }
                match s.parse::<f64>() {
                    Ok(n) => Token1::LispNumber(n),
                    Err(e) => {
                        diags.err(code::NUMBER, span, format!("while parsing number: {e}"));
                        Token1::LispNumber(0.0)
                    }
                }
            })
    }
}

fn string_literal<'s>(diags: &Diagnostics) -> impl FnMut(&mut Inp<'s>) -> winnow::Result<&'s str> {
    fn inner<'s>(input: &mut Inp<'s>) -> winnow::Result<&'s str> {
        let start = *input;
        "\"".parse_next(input)?;
        loop {
            if input.starts_with('\\') {
                take(2usize).parse_next(input)?;
            } else if input.starts_with('"') {
                any.parse_next(input)?;
                break Ok(&start[..input.offset_from(&start)]);
            } else {
                any.parse_next(input)?;
            }
        }
    }
    move |input| {
        inner.with_span().parse_next(input).map(|(s, span)| {
            if let Some(pos) = s.find(['\r', '\n']) {
                diags.err(
                    code::LEXICAL,
                    span.start + pos..span.start + pos + 1,
                    "string may not contain newline characters",
                );
            }
            s
        })
    }
}

/// Return the contents of a string token without the surrounding quotes, with backslash escapes
/// resolved.
pub fn get_string(raw: &str) -> String {
    let inner = raw
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(raw);
    let mut out = String::new();
    let mut chars = inner.chars();
    while let Some(ch) = chars.next() {
        if ch == '\\'
            && let Some(next) = chars.next()
        {
            out.push(next);
        } else {
            out.push(ch);
        }
    }
    out
}

pub fn parse1<'s>(src: &'s str) -> Result<Vec<SpannedToken<'s, Token1>>, Diagnostics> {
    let diags = Diagnostics::new();
    let mut input = LocatingSlice::new(src);
    let start = input;
    let mut out: Vec<SpannedToken<Token1>> = Vec::new();
    let mut lisp_depth: usize = 0;

    macro_rules! parse_as {
        ($parser: expr, $tok: expr) => {
            $parser
                .with_span()
                .parse_next(&mut input)
                .map(model::make_spanned(src, $tok))
        };
    }

    macro_rules! grab_char_as {
        ($tok: expr) => {
            parse_as!(any, $tok)
        };
    }

    macro_rules! parse_valued {
        ($parser: expr) => {
            $parser
                .with_span()
                .parse_next(&mut input)
                .map(|(t, span)| model::Token::new_spanned(&src[span.clone()], span, t))
        };
    }

    while let Some(ch) = input.chars().next() {
        let offset = input.offset_from(&start);
        let next = input.chars().nth(1);
        let tok: Result<SpannedToken<Token1>, CErr> = match ch {
            // Check specific characters before character classes.
            '\n' => grab_char_as!(Token1::Newline),
            '#' => parse_as!(preceded('#', take_till(0.., '\n')), Token1::Comment),
            '"' => parse_as!(string_literal(&diags), Token1::String),
            x if is_space(x) => parse_as!(take_while(1.., is_space), Token1::Space),
            '(' => {
                lisp_depth += 1;
                grab_char_as!(Token1::LispOpen)
            }
            ')' => {
                if lisp_depth == 0 {
                    diags.err(code::LEXICAL, offset..offset + 1, "unmatched `)`");
                } else {
                    lisp_depth -= 1;
                }
                grab_char_as!(Token1::LispClose)
            }
            _ if lisp_depth > 0 => match ch {
                '\'' => grab_char_as!(Token1::LispQuote),
                _ => parse_valued!(lisp_atom(&diags)),
            },
            ':' => grab_char_as!(Token1::Colon),
            '/' => grab_char_as!(Token1::Separator),
            '=' => grab_char_as!(Token1::Equals),
            '+' => grab_char_as!(Token1::Accidental(Accidental::Sharp)),
            '-' => grab_char_as!(Token1::Accidental(Accidental::Flat)),
            '_' => grab_char_as!(Token1::Accidental(Accidental::Natural)),
            '~' => grab_char_as!(Token1::Tie),
            '|' => grab_char_as!(Token1::Barline),
            '>' => grab_char_as!(Token1::OctaveUp),
            '<' => grab_char_as!(Token1::OctaveDown),
            '{' => grab_char_as!(Token1::ChordOpen),
            '}' => grab_char_as!(Token1::ChordClose),
            '[' => grab_char_as!(Token1::SequenceOpen),
            ']' => grab_char_as!(Token1::SequenceClose),
            '*' => parse_valued!(preceded('*', decimal(&diags)).map(Token1::Repeat)),
            '\'' => parse_valued!(repetitions(&diags)),
            '%' => parse_as!(
                preceded('%', take_while(1.., is_name_char)),
                Token1::Marker
            ),
            '@' => parse_as!(
                preceded('@', take_while(1.., is_name_char)),
                Token1::AtMarker
            ),
            x if AsChar::is_dec_digit(x) => parse_valued!(note_length(&diags)),
            'o' if next.is_some_and(|c| c.is_ascii_digit()) => parse_valued!(
                preceded('o', decimal(&diags)).map(|n| Token1::OctaveSet(n as i32))
            ),
            'V' if next.is_some_and(|c| c.is_ascii_digit()) => parse_as!(
                ('V', take_while(1.., AsChar::is_dec_digit), ':'),
                Token1::Voice
            ),
            x if AsChar::is_alpha(x) && next.is_some_and(|c| AsChar::is_alpha(c)) => {
                parse_as!(raw_name(), Token1::Name)
            }
            'r' => grab_char_as!(Token1::Rest),
            x if NoteLetter::from_char(x).is_some() => {
                let letter = NoteLetter::from_char(x).unwrap_or(NoteLetter::C);
                grab_char_as!(Token1::Note(letter))
            }
            _ => {
                // discard token
                _ = any::<_, CErr>.parse_next(&mut input);
                let end = offset + ch.len_utf8();
                diags.err(code::LEXICAL, offset..end, "unknown character");
                continue;
            }
        };
        match tok {
            Ok(t) => {
                model::trace(format!("lex pass 1: {t:?}"));
                out.push(t)
            }
            Err(e) => diags.err(
                code::LEXICAL,
                offset..offset + ch.len_utf8(),
                format!("unknown lexical error: {e}"),
            ),
        }
        if input.offset_from(&start) == offset {
            // Consume a single character to prevent infinite loop
            _ = any::<_, CErr>(&mut input);
        }
    }
    if lisp_depth > 0 {
        diags.err(
            code::LEXICAL,
            src.len()..src.len(),
            "unterminated attribute expression",
        );
    }
    if diags.has_errors() {
        Err(diags)
    } else {
        Ok(out)
    }
}

#[cfg(test)]
mod tests;
