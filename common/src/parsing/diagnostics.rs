use crate::parsing::model::{Span, Spanned};
use annotate_snippets::renderer::DecorStyle;
use annotate_snippets::{AnnotationKind, Group, Level, Renderer, Snippet};
use serde::Serialize;
use std::cell::RefCell;
use std::collections::HashSet;
use std::fmt::{Display, Formatter};
use std::mem;

pub mod code {
    pub const LEXICAL: &str = "E1001 lexical error";
    pub const SYNTAX: &str = "E1002 syntax error";
    pub const NUMBER: &str = "E1003 incorrect number format";
    pub const DURATION: &str = "E1004 incorrect note length";
    pub const PART: &str = "E1005 incorrect part declaration";
    pub const LISP: &str = "E1006 incorrect attribute expression";
    pub const REPEAT: &str = "E1007 incorrect repeat syntax";
    pub const COMPILE: &str = "E2001 score error";
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub code: &'static str,
    pub message: Spanned<String>,
    pub context: Vec<Spanned<String>>,
}
impl Diagnostic {
    pub fn new(code: &'static str, span: impl Into<Span>, msg: impl Into<String>) -> Self {
        Self {
            code,
            message: Spanned::new(span, msg),
            context: Default::default(),
        }
    }

    pub fn with_context(mut self, span: impl Into<Span>, msg: impl Into<String>) -> Self {
        self.context.push(Spanned::new(span, msg));
        self
    }

    pub fn group<'a>(&'a self, filename: &'a str, src: &'a str) -> Group<'a> {
        let mut source = Snippet::source(src).path(filename).annotation(
            AnnotationKind::Primary
                .span(self.message.span.into())
                .label(&self.message.value),
        );
        for m in &self.context {
            source = source.annotation(AnnotationKind::Context.span(m.span.into()).label(&m.value));
        }
        Level::ERROR.primary_title(self.code).element(source)
    }
}

#[derive(Serialize, Default, Debug)]
pub struct Diagnostics {
    pub list: RefCell<Vec<Diagnostic>>,
    #[serde(skip)]
    pub seen: RefCell<HashSet<(&'static str, Span)>>,
}
impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }
}
impl Display for Diagnostics {
    /// Diagnostics can be formatted as a string, but it's better to use [Diagnostics::render].
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let list = self.list.borrow();
        if list.is_empty() {
            return writeln!(f, "no errors");
        }
        let mut first = true;
        for i in &*list {
            if first {
                write!(f, "ERRORS: ")?;
                first = false;
            } else {
                write!(f, ", ")?;
            }
            write!(
                f,
                "offset {}..{}: {}: {}",
                i.message.span.start, i.message.span.end, i.code, i.message.value
            )?;
        }
        Ok(())
    }
}
impl Diagnostics {
    /// Convenience function for adding a simple error without context
    pub fn err(&self, code: &'static str, span: impl Into<Span>, msg: impl Into<String>) {
        self.push(Diagnostic::new(code, span, msg))
    }

    pub fn push(&self, d: Diagnostic) {
        if self.seen.borrow_mut().insert((d.code, d.message.span)) {
            self.list.borrow_mut().push(d)
        }
    }

    pub fn has_errors(&self) -> bool {
        !self.list.borrow().is_empty()
    }

    pub fn get_all(&self) -> Vec<Diagnostic> {
        mem::take(&mut self.list.borrow_mut())
    }

    /// The first diagnostic, if any. Used to report a single location to callers that only
    /// want a line and column.
    pub fn first(&self) -> Option<Diagnostic> {
        self.list.borrow().first().cloned()
    }

    pub fn render(&self, filename: &str, src: &str) -> String {
        let list = self.list.borrow();
        let report: Vec<Group> = list.iter().map(|x| x.group(filename, src)).collect();
        let renderer = if *crate::USE_COLOR {
            Renderer::styled()
        } else {
            Renderer::plain()
        }
        .decor_style(DecorStyle::Unicode);
        renderer.render(&report)
    }
}
