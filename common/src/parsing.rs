// Rust 1.89.0 is giving false positive on needless lifetimes.
#![allow(clippy::needless_lifetimes)]

// HOW TO UNDERSTAND THIS PARSING
//
// This code parses using the `winnow` parser combinator library, in two passes.
//
// Pass 1 (pass1.rs) works on a `LocatingSlice<&str>` and produces a flat list of tokens, each with
// the span of source text it came from. Tokens carry decoded values where that is cheap, such as
// note letters, note lengths, and repeat counts. Whitespace, newlines, and comments are kept as
// tokens since newlines end variable definitions.
//
// Pass 2 (pass2.rs) works on the token slice and produces `ScoreUpdate` values. It is a recursive
// descent parser: look at the first token to decide which branch to take, then consume tokens for
// that branch. Parsers that only match a single token use winnow's `one_of` and friends so that
// failure doesn't consume input.
//
// Neither pass uses winnow's `Cut` errors. Instead, problems are reported through `Diagnostics`,
// parsing continues after some synchronization point, and the pass fails at the end if any
// diagnostics were issued. This makes it possible to report several errors at once with good
// contextual messages.
//
// Parsing is purely syntactic. Checks that need score state, like whether an instrument exists or
// a variable has been defined, happen when updates are applied to a `Score`.

pub mod diagnostics;
pub mod model;
pub mod pass1;
pub mod pass2;
use crate::score::ScoreUpdate;
pub use diagnostics::{Diagnostic, Diagnostics, code};

pub fn parse(input: &str) -> Result<Vec<ScoreUpdate>, Diagnostics> {
    pass2::parse2(input)
}
