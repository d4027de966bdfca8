use serde::{Serialize, Serializer};
use std::env;
use std::fmt::{Debug, Display, Formatter};
use std::ops::{Index, Range};
use std::sync::LazyLock;

pub use crate::parsing::diagnostics::{Diagnostic, Diagnostics, code};

#[derive(Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Clone, Copy)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}
impl Serialize for Span {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        [self.start, self.end].serialize(serializer)
    }
}
impl Display for Span {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{},{})", self.start, self.end)
    }
}
impl Index<Span> for str {
    type Output = str;

    fn index(&self, index: Span) -> &Self::Output {
        &self[index.start..index.end]
    }
}
impl From<Range<usize>> for Span {
    fn from(value: Range<usize>) -> Self {
        Self {
            start: value.start,
            end: value.end,
        }
    }
}
impl From<Span> for Range<usize> {
    fn from(value: Span) -> Self {
        value.start..value.end
    }
}
impl Span {
    /// Smallest span covering both spans.
    pub fn join(self, other: Span) -> Span {
        Span {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }

    /// One-based line and column of the start of the span within `src`.
    pub fn line_column(&self, src: &str) -> (usize, usize) {
        let before = &src[..self.start.min(src.len())];
        let line = before.matches('\n').count() + 1;
        let column = match before.rfind('\n') {
            None => before.chars().count() + 1,
            Some(nl) => before[nl + 1..].chars().count() + 1,
        };
        (line, column)
    }
}

macro_rules! color {
    ($f:expr, $color:literal, $( $rest:tt )* ) => {
        {
            if *crate::USE_COLOR {
                write!($f, "\x1b[38;5;{}m", $color)?;
            }
            write!($f, $($rest)*)?;
            if *crate::USE_COLOR {
                write!($f, "\x1b[0m")?;
            }
            Ok(())
        }
    };
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq, Hash)]
pub struct Spanned<T: Debug + Serialize> {
    pub span: Span,
    pub value: T,
}
impl<T: Debug + Display + Serialize> Display for Spanned<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        color!(f, 5, "{}:", self.span)?;
        write!(f, "{}", self.value)
    }
}
impl<T: Debug + Copy + Serialize> Copy for Spanned<T> {}

impl<T: Debug + Serialize> Spanned<T> {
    pub fn new(span: impl Into<Span>, value: impl Into<T>) -> Self {
        Self {
            span: span.into(),
            value: value.into(),
        }
    }

    pub fn value(self) -> T {
        self.value
    }
}

/// A lexical token along with the raw text it was scanned from.
#[derive(Serialize, Debug, Clone)]
pub struct Token<'s, T: Debug + Serialize> {
    pub raw: &'s str,
    pub t: T,
}
impl<'s, T: Debug + Display + Serialize> Display for Token<'s, T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let raw: String = self
            .raw
            .chars()
            .map(|c| match c {
                '\n' => '⏎',
                '\r' => '␍',
                _ => c,
            })
            .collect();
        write!(f, "{} ", self.t)?;
        color!(f, 248, "raw=⟨{raw}⟩")
    }
}
impl<'s, T: Debug + Serialize> Token<'s, T> {
    pub fn new_spanned(raw: &'s str, span: impl Into<Span>, t: T) -> Spanned<Self> {
        Spanned::new(span, Self { raw, t })
    }
}

pub type SpannedToken<'s, T> = Spanned<Token<'s, T>>;

pub fn make_spanned<'s, I, T: Debug + Serialize>(
    input: &'s str,
    t: T,
) -> impl FnOnce((I, Range<usize>)) -> SpannedToken<'s, T> {
    move |(_, span)| Token::new_spanned(&input[span.clone()], span, t)
}

pub fn merge_span<T: Debug + Serialize>(tokens: &[Spanned<T>]) -> Span {
    match (tokens.first(), tokens.last()) {
        (Some(first), Some(last)) => first.span.join(last.span),
        _ => Span::default(),
    }
}

pub fn trace(msg: impl Display) {
    static TRACING: LazyLock<bool> = LazyLock::new(|| env::var("ALDA_TRACE_LEXER").is_ok());
    if *TRACING {
        eprintln!("{msg}");
    }
}
